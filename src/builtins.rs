use std::io::{self, Write};

use crate::{
    ast::{Expr, ExprKind},
    diagnostics::{error, DiagnosticKind, Result, SourceSpan},
    value::Value,
};

type Callback = fn(&mut dyn Write, &[Value]) -> io::Result<Value>;

/// A host operation reached through a fixed dotted call path.
pub struct Builtin {
    pub path: &'static [&'static str],
    pub arity: usize,
    callback: Callback,
}

const BUILTINS: &[Builtin] = &[Builtin {
    path: &["System", "out", "println"],
    arity: 1,
    callback: println,
}];

fn println(out: &mut dyn Write, args: &[Value]) -> io::Result<Value> {
    for arg in args {
        writeln!(out, "{arg}")?;
    }
    Ok(Value::void())
}

/// Matches `callee` against the builtin table. Only a chain of plain
/// identifiers qualifies, so `this.out.println` never does.
pub fn resolve(callee: &Expr) -> Option<&'static Builtin> {
    let mut path = Vec::new();
    if !dotted_path(callee, &mut path) {
        return None;
    }
    BUILTINS
        .iter()
        .find(|builtin| builtin.path.iter().copied().eq(path.iter().copied()))
}

fn dotted_path<'a>(expr: &'a Expr, path: &mut Vec<&'a str>) -> bool {
    match &expr.kind {
        ExprKind::Variable(name) => {
            path.push(name);
            true
        }
        ExprKind::Get { object, name } => {
            if !dotted_path(object, path) {
                return false;
            }
            path.push(name);
            true
        }
        _ => false,
    }
}

impl Builtin {
    pub fn name(&self) -> String {
        self.path.join(".")
    }

    pub fn call(&self, out: &mut dyn Write, args: &[Value], span: SourceSpan) -> Result<Value> {
        if args.len() != self.arity {
            return Err(error(
                DiagnosticKind::Arity,
                format!(
                    "`{}` expects {} argument(s) but received {}",
                    self.name(),
                    self.arity,
                    args.len()
                ),
                span,
            ));
        }
        Ok((self.callback)(out, args)?)
    }
}

//! Canonical source rendering of a parsed program.
//!
//! Output is fully parenthesized so it re-parses to the same tree shape
//! regardless of operator precedence. Printing a re-parsed program yields
//! the same text again.

use std::mem;

use crate::{
    ast::{ClassDecl, Declaration, Expr, ExprKind, Literal, MethodDecl, Stmt, StmtKind, VarDecl},
    stack,
    value::format_double,
};

const INDENT: &str = "    ";

pub fn print_program(declarations: &[Declaration]) -> String {
    let mut printer = Printer::default();
    for (index, declaration) in declarations.iter().enumerate() {
        if index > 0 {
            printer.out.push('\n');
        }
        printer.declaration(declaration);
    }
    printer.out
}

pub fn print_expr(expr: &Expr) -> String {
    let mut printer = Printer::default();
    printer.expr(expr, false);
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
    /// Set after `}` when the next line continues it, as in `} else {`.
    joined: bool,
    prefix: Option<&'static str>,
}

impl Printer {
    fn line(&mut self, text: &str) {
        if mem::take(&mut self.joined) {
            self.out.push(' ');
        } else {
            for _ in 0..self.indent {
                self.out.push_str(INDENT);
            }
        }
        if let Some(prefix) = self.prefix.take() {
            self.out.push_str(prefix);
            if !text.is_empty() {
                self.out.push(' ');
            }
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn declaration(&mut self, declaration: &Declaration) {
        match declaration {
            Declaration::Class(class) => self.class(class),
            Declaration::Var(var) => {
                let text = var_decl(var);
                self.line(&text);
            }
            Declaration::Stmt(stmt) => self.stmt(stmt),
        }
    }

    fn class(&mut self, class: &ClassDecl) {
        self.line(&format!("class {} {{", class.name));
        self.indent += 1;
        for field in &class.fields {
            let text = var_decl(field);
            self.line(&text);
        }
        for method in &class.methods {
            self.method(method);
        }
        self.indent -= 1;
        self.line("}");
    }

    fn method(&mut self, method: &MethodDecl) {
        let params = method
            .params
            .iter()
            .map(|param| format!("{} {}", param.ty.name(), param.name))
            .collect::<Vec<_>>()
            .join(", ");
        self.line(&format!(
            "{} {}({params}) {{",
            method.return_type.name(),
            method.name
        ));
        self.body(&method.body);
    }

    /// Statements of an already-opened `{`, followed by its `}`.
    fn body(&mut self, statements: &[Stmt]) {
        self.indent += 1;
        for stmt in statements {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.line("}");
    }

    fn join_closing_brace(&mut self) {
        self.out.pop();
        self.joined = true;
    }

    fn branch(&mut self, header: String, body: &Stmt) {
        match &body.kind {
            StmtKind::Block(statements) => {
                let open = if header.is_empty() {
                    "{".to_string()
                } else {
                    format!("{header} {{")
                };
                self.line(&open);
                self.body(statements);
            }
            _ => {
                self.line(&header);
                self.indent += 1;
                self.stmt(body);
                self.indent -= 1;
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        stack::ensure(|| self.stmt_kind(stmt));
    }

    fn stmt_kind(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let text = format!("{};", print_expr(expr));
                self.line(&text);
            }
            StmtKind::Var(var) => {
                let text = var_decl(var);
                self.line(&text);
            }
            StmtKind::Block(statements) => {
                self.line("{");
                self.body(statements);
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let header = format!("if ({})", print_expr(condition));
                let Some(else_branch) = else_branch else {
                    self.branch(header, then_branch);
                    return;
                };
                if dangles(then_branch) {
                    // Braces keep the `else` attached to this `if`.
                    self.line(&format!("{header} {{"));
                    self.body(std::slice::from_ref(then_branch.as_ref()));
                    self.join_closing_brace();
                } else {
                    self.branch(header, then_branch);
                    if matches!(then_branch.kind, StmtKind::Block(_)) {
                        self.join_closing_brace();
                    }
                }
                self.prefix = Some("else");
                match &else_branch.kind {
                    StmtKind::If { .. } => self.stmt(else_branch),
                    _ => self.branch(String::new(), else_branch),
                }
            }
            StmtKind::While { condition, body } => {
                self.branch(format!("while ({})", print_expr(condition)), body);
            }
            StmtKind::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                let init = match initializer.as_deref().map(|stmt| &stmt.kind) {
                    Some(StmtKind::Var(var)) => var_decl(var),
                    Some(StmtKind::Expr(expr)) => format!("{};", print_expr(expr)),
                    _ => ";".to_string(),
                };
                let mut header = format!("for ({init}");
                if let Some(condition) = condition {
                    header.push(' ');
                    header.push_str(&print_expr(condition));
                }
                header.push(';');
                if let Some(increment) = increment {
                    header.push(' ');
                    header.push_str(&print_expr(increment));
                }
                header.push(')');
                self.branch(header, body);
            }
            StmtKind::Return(None) => self.line("return;"),
            StmtKind::Return(Some(expr)) => {
                let text = format!("return {};", print_expr(expr));
                self.line(&text);
            }
        }
    }

    fn expr(&mut self, expr: &Expr, nested: bool) {
        stack::ensure(|| self.expr_kind(expr, nested));
    }

    fn expr_kind(&mut self, expr: &Expr, nested: bool) {
        match &expr.kind {
            ExprKind::Literal(literal) => self.literal(literal),
            ExprKind::Variable(name) => self.out.push_str(name),
            ExprKind::This => self.out.push_str("this"),
            ExprKind::Assign { name, value } => self.wrapped(nested, |printer| {
                printer.out.push_str(name);
                printer.out.push_str(" = ");
                printer.expr(value, false);
            }),
            ExprKind::Set {
                object,
                name,
                value,
            } => self.wrapped(nested, |printer| {
                printer.expr(object, true);
                printer.out.push('.');
                printer.out.push_str(name);
                printer.out.push_str(" = ");
                printer.expr(value, false);
            }),
            ExprKind::Binary { op, left, right } => self.wrapped(nested, |printer| {
                printer.expr(left, true);
                printer.out.push_str(&format!(" {} ", op.symbol()));
                printer.expr(right, true);
            }),
            ExprKind::Unary { op, expr: operand } => self.wrapped(nested, |printer| {
                printer.out.push_str(op.symbol());
                printer.expr(operand, true);
            }),
            ExprKind::Get { object, name } => {
                self.expr(object, true);
                self.out.push('.');
                self.out.push_str(name);
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee, true);
                self.args(args);
            }
            ExprKind::New { class_name, args } => {
                self.out.push_str("new ");
                self.out.push_str(class_name);
                self.args(args);
            }
        }
    }

    fn wrapped(&mut self, nested: bool, f: impl FnOnce(&mut Self)) {
        if nested {
            self.out.push('(');
        }
        f(self);
        if nested {
            self.out.push(')');
        }
    }

    fn args(&mut self, args: &[Expr]) {
        self.out.push('(');
        for (index, arg) in args.iter().enumerate() {
            if index > 0 {
                self.out.push_str(", ");
            }
            self.expr(arg, false);
        }
        self.out.push(')');
    }

    fn literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Int(n) => self.out.push_str(&n.to_string()),
            Literal::Double(n) => self.out.push_str(&format_double(*n)),
            Literal::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Literal::String(s) => {
                self.out.push('"');
                self.out.push_str(s);
                self.out.push('"');
            }
            Literal::Null => self.out.push_str("null"),
        }
    }
}

fn var_decl(var: &VarDecl) -> String {
    match &var.initializer {
        Some(expr) => format!("{} {} = {};", var.ty.name(), var.name, print_expr(expr)),
        None => format!("{} {};", var.ty.name(), var.name),
    }
}

/// True when `stmt` ends in an `if` without `else` that would capture a
/// following `else`.
fn dangles(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::If {
            else_branch: None, ..
        } => true,
        StmtKind::If {
            else_branch: Some(branch),
            ..
        } => dangles(branch),
        StmtKind::While { body, .. } | StmtKind::For { body, .. } => dangles(body),
        _ => false,
    }
}

use std::{
    io::{self, Stdout, Write},
    mem,
    rc::Rc,
};

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::{
    ast::{ClassDecl, Declaration, Expr, ExprKind, MethodDecl, Stmt, StmtKind, VarDecl},
    builtins,
    class::{ClassDescriptor, ClassRef, Instance, InstanceRef},
    diagnostics::{error, Diagnostic, DiagnosticKind, JliteError, Result, SourceSpan},
    environment::{Environment, EnvironmentRef},
    ops, parser, stack,
    value::Value,
};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Per-run knobs: which method starts the program and how deep calls may nest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub entry_class: String,
    pub entry_method: String,
    pub max_call_depth: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            entry_class: "Main".to_string(),
            entry_method: "main".to_string(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

enum FlowControl {
    Next,
    Return(Value),
}

/// Tree-walking evaluator. One interpreter owns the globals and class
/// registry of exactly one run; program output goes to `W`.
pub struct Interpreter<W: Write = Stdout> {
    globals: EnvironmentRef,
    env: EnvironmentRef,
    classes: IndexMap<String, ClassRef>,
    this: Option<InstanceRef>,
    depth: usize,
    context: ExecutionContext,
    out: W,
}

impl Interpreter<Stdout> {
    pub fn new(context: ExecutionContext) -> Self {
        Self::with_output(context, io::stdout())
    }
}

impl<W: Write> Interpreter<W> {
    pub fn with_output(context: ExecutionContext, out: W) -> Self {
        let globals = Environment::new();
        Self {
            env: Rc::clone(&globals),
            globals,
            classes: IndexMap::new(),
            this: None,
            depth: 0,
            context,
            out,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn class(&self, name: &str) -> Option<&ClassRef> {
        self.classes.get(name)
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        Environment::get(&self.globals, name)
    }

    /// Scans, parses and runs `source`. Any lexer or parser diagnostic
    /// rejects the program before evaluation starts.
    pub fn run_source(&mut self, source: &str) -> Result<()> {
        let parsed = parser::parse_source(source);
        if parsed.has_errors() {
            return Err(JliteError::Rejected(parsed.diagnostics));
        }
        self.run(&parsed.declarations)
    }

    /// Registers every class, runs top-level code in the global scope, then
    /// calls the entry method. Output written before a failure is kept.
    pub fn run(&mut self, declarations: &[Declaration]) -> Result<()> {
        let result = self.execute_program(declarations);
        let flushed = self.out.flush();
        result?;
        flushed?;
        Ok(())
    }

    fn execute_program(&mut self, declarations: &[Declaration]) -> Result<()> {
        for declaration in declarations {
            if let Declaration::Class(class) = declaration {
                self.register_class(class);
            }
        }
        for declaration in declarations {
            match declaration {
                Declaration::Class(_) => {}
                Declaration::Var(var) => self.declare(var)?,
                Declaration::Stmt(stmt) => {
                    self.execute_statement(stmt)?;
                }
            }
        }
        self.run_entry()
    }

    fn register_class(&mut self, decl: &ClassDecl) {
        let class = Rc::new(ClassDescriptor::from_decl(decl));
        debug!(
            class = %class.name,
            fields = class.fields.len(),
            methods = class.methods.len(),
            "registered class"
        );
        if self.classes.insert(decl.name.clone(), class).is_some() {
            warn!(
                class = %decl.name,
                line = decl.span.line,
                "class declared more than once; keeping the last declaration"
            );
        }
    }

    fn run_entry(&mut self) -> Result<()> {
        let ExecutionContext {
            entry_class,
            entry_method,
            ..
        } = &self.context;
        let class = self.classes.get(entry_class).cloned().ok_or_else(|| {
            Diagnostic::new(
                DiagnosticKind::Startup,
                format!("no entry class `{entry_class}` is declared"),
            )
        })?;
        let method = class.find_method(entry_method).cloned().ok_or_else(|| {
            Diagnostic::new(
                DiagnosticKind::Startup,
                format!("class `{entry_class}` has no entry method `{entry_method}`"),
            )
            .with_span(class.span)
        })?;
        if !method.params.is_empty() {
            return Err(JliteError::from(
                Diagnostic::new(
                    DiagnosticKind::Startup,
                    format!(
                        "entry method `{entry_class}.{entry_method}` must take no parameters, found {}",
                        method.params.len()
                    ),
                )
                .with_span(method.span),
            ));
        }
        debug!(class = %class.name, method = %method.name, "starting entry method");
        let instance = self.instantiate(&class, method.span)?;
        self.invoke(&instance, &method, Vec::new(), method.span)?;
        Ok(())
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        stack::ensure(|| self.execute_kind(stmt))
    }

    fn execute_kind(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.evaluate(expr)?;
                Ok(FlowControl::Next)
            }
            StmtKind::Var(var) => {
                self.declare(var)?;
                Ok(FlowControl::Next)
            }
            StmtKind::Block(statements) => {
                let child = Environment::with_parent(Rc::clone(&self.env));
                self.in_scope(child, |interpreter| interpreter.execute_sequence(statements))
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.condition(condition, "`if` condition")? {
                    self.execute_statement(then_branch)
                } else if let Some(branch) = else_branch {
                    self.execute_statement(branch)
                } else {
                    Ok(FlowControl::Next)
                }
            }
            StmtKind::While { condition, body } => {
                while self.condition(condition, "`while` condition")? {
                    if let FlowControl::Return(value) = self.execute_statement(body)? {
                        return Ok(FlowControl::Return(value));
                    }
                }
                Ok(FlowControl::Next)
            }
            StmtKind::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                let child = Environment::with_parent(Rc::clone(&self.env));
                self.in_scope(child, |interpreter| {
                    interpreter.execute_for(
                        initializer.as_deref(),
                        condition.as_ref(),
                        increment.as_ref(),
                        body,
                    )
                })
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::void(),
                };
                Ok(FlowControl::Return(value))
            }
        }
    }

    fn execute_sequence(&mut self, statements: &[Stmt]) -> Result<FlowControl> {
        for stmt in statements {
            if let FlowControl::Return(value) = self.execute_statement(stmt)? {
                return Ok(FlowControl::Return(value));
            }
        }
        Ok(FlowControl::Next)
    }

    fn execute_for(
        &mut self,
        initializer: Option<&Stmt>,
        condition: Option<&Expr>,
        increment: Option<&Expr>,
        body: &Stmt,
    ) -> Result<FlowControl> {
        if let Some(initializer) = initializer {
            self.execute_statement(initializer)?;
        }
        loop {
            if let Some(condition) = condition {
                if !self.condition(condition, "`for` condition")? {
                    break;
                }
            }
            if let FlowControl::Return(value) = self.execute_statement(body)? {
                return Ok(FlowControl::Return(value));
            }
            if let Some(increment) = increment {
                self.evaluate(increment)?;
            }
        }
        Ok(FlowControl::Next)
    }

    /// Runs `f` with `env` as the current scope; the previous scope is put
    /// back on every exit path.
    fn in_scope<T>(
        &mut self,
        env: EnvironmentRef,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let previous = mem::replace(&mut self.env, env);
        let result = f(self);
        self.env = previous;
        result
    }

    fn condition(&mut self, expr: &Expr, what: &str) -> Result<bool> {
        self.evaluate(expr)?.expect_bool(what, expr.span)
    }

    fn declare(&mut self, var: &VarDecl) -> Result<()> {
        let value = match &var.initializer {
            Some(expr) => self.evaluate(expr)?,
            None => Value::null(),
        };
        self.env.borrow_mut().define(var.name.clone(), value);
        Ok(())
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        stack::ensure(|| self.evaluate_kind(expr))
    }

    fn evaluate_kind(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(Value::from_literal(literal)),
            ExprKind::Variable(name) => self.lookup(name, expr.span),
            ExprKind::Assign { name, value } => {
                let value = self.evaluate(value)?;
                self.assign(name, value.clone(), expr.span)?;
                Ok(value)
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                ops::binary(*op, &left, &right, expr.span)
            }
            ExprKind::Unary { op, expr: operand } => {
                let value = self.evaluate(operand)?;
                ops::unary(*op, &value, expr.span)
            }
            ExprKind::Call { callee, args } => self.call(callee, args, expr.span),
            ExprKind::Get { object, name } => {
                let target = self.evaluate(object)?;
                let instance = member_target(&target, name, expr.span)?;
                instance.get(name).ok_or_else(|| {
                    error(
                        DiagnosticKind::UndefinedName,
                        format!(
                            "undefined field `{name}` on instance of `{}`",
                            instance.class().name
                        ),
                        expr.span,
                    )
                })
            }
            ExprKind::Set {
                object,
                name,
                value,
            } => {
                let target = self.evaluate(object)?;
                let instance = Rc::clone(member_target(&target, name, expr.span)?);
                let value = self.evaluate(value)?;
                instance.set(name, value.clone());
                Ok(value)
            }
            ExprKind::New { class_name, args } => {
                if !args.is_empty() {
                    return Err(error(
                        DiagnosticKind::Arity,
                        format!(
                            "`new {class_name}` takes no arguments but received {}",
                            args.len()
                        ),
                        expr.span,
                    ));
                }
                let class = self.classes.get(class_name).cloned().ok_or_else(|| {
                    error(
                        DiagnosticKind::UndefinedName,
                        format!("undefined class `{class_name}`"),
                        expr.span,
                    )
                })?;
                let instance = self.instantiate(&class, expr.span)?;
                Ok(Value::object(instance))
            }
            ExprKind::This => self.this.clone().map(Value::object).ok_or_else(|| {
                error(
                    DiagnosticKind::UndefinedName,
                    "`this` is only available inside a method",
                    expr.span,
                )
            }),
        }
    }

    /// Locals and globals shadow fields of the current instance.
    fn lookup(&self, name: &str, span: SourceSpan) -> Result<Value> {
        Environment::get(&self.env, name)
            .or_else(|| self.this.as_ref().and_then(|instance| instance.get(name)))
            .ok_or_else(|| {
                error(
                    DiagnosticKind::UndefinedName,
                    format!("undefined variable `{name}`"),
                    span,
                )
            })
    }

    fn assign(&mut self, name: &str, value: Value, span: SourceSpan) -> Result<()> {
        if Environment::assign(&self.env, name, value.clone()) {
            return Ok(());
        }
        match &self.this {
            Some(instance) if instance.has_field(name) => {
                instance.set(name, value);
                Ok(())
            }
            _ => Err(error(
                DiagnosticKind::UndefinedName,
                format!("cannot assign to undefined variable `{name}`"),
                span,
            )),
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr], span: SourceSpan) -> Result<Value> {
        if let Some(builtin) = builtins::resolve(callee) {
            let values = self.evaluate_args(args)?;
            return builtin.call(&mut self.out, &values, span);
        }
        match &callee.kind {
            ExprKind::Get { object, name } => {
                let receiver = self.evaluate(object)?;
                let instance = Rc::clone(member_target(&receiver, name, callee.span)?);
                self.call_method(&instance, name, args, span)
            }
            ExprKind::Variable(name) => match self.this.clone() {
                Some(instance) => self.call_method(&instance, name, args, span),
                None => Err(error(
                    DiagnosticKind::UndefinedName,
                    format!("undefined method `{name}`"),
                    span,
                )),
            },
            _ => Err(error(
                DiagnosticKind::Type,
                "only methods can be called",
                callee.span,
            )),
        }
    }

    fn call_method(
        &mut self,
        instance: &InstanceRef,
        name: &str,
        args: &[Expr],
        span: SourceSpan,
    ) -> Result<Value> {
        let class = instance.class();
        let method = class.find_method(name).cloned().ok_or_else(|| {
            error(
                DiagnosticKind::UndefinedName,
                format!("undefined method `{name}` on class `{}`", class.name),
                span,
            )
        })?;
        if args.len() != method.params.len() {
            return Err(error(
                DiagnosticKind::Arity,
                format!(
                    "method `{}.{name}` expects {} argument(s) but received {}",
                    class.name,
                    method.params.len(),
                    args.len()
                ),
                span,
            ));
        }
        let values = self.evaluate_args(args)?;
        self.invoke(instance, &method, values, span)
    }

    fn evaluate_args(&mut self, args: &[Expr]) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.evaluate(arg)).collect()
    }

    /// Runs a method body in a fresh scope under the globals with `this`
    /// bound to `instance`.
    fn invoke(
        &mut self,
        instance: &InstanceRef,
        method: &MethodDecl,
        args: Vec<Value>,
        span: SourceSpan,
    ) -> Result<Value> {
        self.enter_frame(span)?;
        trace!(
            class = %instance.class().name,
            method = %method.name,
            depth = self.depth,
            "invoke"
        );
        let env = Environment::with_parent(Rc::clone(&self.globals));
        {
            let mut scope = env.borrow_mut();
            for (param, value) in method.params.iter().zip(args) {
                scope.define(param.name.clone(), value);
            }
        }
        let previous = mem::replace(&mut self.this, Some(Rc::clone(instance)));
        let result = self.in_scope(env, |interpreter| interpreter.execute_sequence(&method.body));
        self.this = previous;
        self.depth -= 1;
        match result? {
            FlowControl::Return(value) => Ok(value),
            FlowControl::Next => Ok(Value::default_for(&method.return_type)),
        }
    }

    /// Fields start as `null`, then initializers run in declaration order
    /// with `this` bound to the new instance.
    fn instantiate(&mut self, class: &ClassRef, span: SourceSpan) -> Result<InstanceRef> {
        self.enter_frame(span)?;
        let instance = Instance::new(Rc::clone(class));
        let previous = mem::replace(&mut self.this, Some(Rc::clone(&instance)));
        let env = Environment::with_parent(Rc::clone(&self.globals));
        let result = self.in_scope(env, |interpreter| {
            for field in class.fields.values() {
                if let Some(initializer) = &field.initializer {
                    let value = interpreter.evaluate(initializer)?;
                    instance.set(&field.name, value);
                }
            }
            Ok(())
        });
        self.this = previous;
        self.depth -= 1;
        result?;
        Ok(instance)
    }

    fn enter_frame(&mut self, span: SourceSpan) -> Result<()> {
        if self.depth >= self.context.max_call_depth {
            return Err(error(
                DiagnosticKind::StackExhaustion,
                format!(
                    "maximum call depth of {} exceeded",
                    self.context.max_call_depth
                ),
                span,
            ));
        }
        self.depth += 1;
        Ok(())
    }
}

fn member_target<'a>(value: &'a Value, member: &str, span: SourceSpan) -> Result<&'a InstanceRef> {
    value.as_instance().ok_or_else(|| {
        error(
            DiagnosticKind::Type,
            format!("cannot access `{member}` on a {} value", value.type_name()),
            span,
        )
    })
}

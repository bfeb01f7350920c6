use std::{fmt, rc::Rc};

use crate::{
    ast::{Literal, TypeExpr},
    class::InstanceRef,
    diagnostics::{error, DiagnosticKind, Result, SourceSpan},
};

/// A runtime value. Everything except `Object` is immutable and compared by
/// content; `Object` is a shared handle to a mutable instance.
#[derive(Clone)]
pub struct Value(pub Rc<ValueKind>);

#[derive(Clone)]
pub enum ValueKind {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    Object(InstanceRef),
    Null,
    Void,
}

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn int(value: i64) -> Self {
        Self::new(ValueKind::Int(value))
    }

    pub fn double(value: f64) -> Self {
        Self::new(ValueKind::Double(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    pub fn object(instance: InstanceRef) -> Self {
        Self::new(ValueKind::Object(instance))
    }

    pub fn null() -> Self {
        Self::new(ValueKind::Null)
    }

    pub fn void() -> Self {
        Self::new(ValueKind::Void)
    }

    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Int(n) => Value::int(*n),
            Literal::Double(n) => Value::double(*n),
            Literal::Bool(b) => Value::bool(*b),
            Literal::String(s) => Value::string(s.clone()),
            Literal::Null => Value::null(),
        }
    }

    /// What a method yields when its body finishes without `return`.
    pub fn default_for(ty: &TypeExpr) -> Self {
        match ty {
            TypeExpr::Void => Value::void(),
            TypeExpr::Int => Value::int(0),
            TypeExpr::Double => Value::double(0.0),
            TypeExpr::Boolean => Value::bool(false),
            TypeExpr::Class(_) => Value::null(),
        }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.0
    }

    pub fn type_name(&self) -> &'static str {
        match &*self.0 {
            ValueKind::Int(_) => "int",
            ValueKind::Double(_) => "double",
            ValueKind::Bool(_) => "boolean",
            ValueKind::String(_) => "String",
            ValueKind::Object(_) => "object",
            ValueKind::Null => "null",
            ValueKind::Void => "void",
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(&*self.0, ValueKind::String(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match &*self.0 {
            ValueKind::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match &*self.0 {
            ValueKind::Double(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &*self.0 {
            ValueKind::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.0 {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceRef> {
        match &*self.0 {
            ValueKind::Object(instance) => Some(instance),
            _ => None,
        }
    }

    /// `what` names the construct in the error, e.g. "`if` condition".
    pub fn expect_bool(&self, what: &str, span: SourceSpan) -> Result<bool> {
        self.as_bool().ok_or_else(|| {
            error(
                DiagnosticKind::Type,
                format!("{what} must be boolean, found {}", self.type_name()),
                span,
            )
        })
    }

    /// Null equals only null; otherwise tags must match. Objects compare by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (&*self.0, &*other.0) {
            (ValueKind::Null, ValueKind::Null) => true,
            (ValueKind::Void, ValueKind::Void) => true,
            (ValueKind::Int(a), ValueKind::Int(b)) => a == b,
            (ValueKind::Double(a), ValueKind::Double(b)) => a == b,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::Object(a), ValueKind::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

/// Doubles always show a fractional part so they read back as doubles.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::String(s) => write!(f, "{s:?}"),
            _ => write!(f, "{self}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Int(n) => write!(f, "{n}"),
            ValueKind::Double(n) => f.write_str(&format_double(*n)),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::String(s) => f.write_str(s),
            ValueKind::Object(instance) => write!(f, "<instance of {}>", instance.class().name),
            ValueKind::Null => f.write_str("null"),
            ValueKind::Void => f.write_str("void"),
        }
    }
}

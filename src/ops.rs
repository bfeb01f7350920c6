//! Operator semantics over runtime values.
//!
//! Binary operators resolve their operand types in a fixed order:
//! string concatenation for `+` when either side is a `String`, then
//! widening to `double` when either side is a `double`, then exact
//! 64-bit integer arithmetic. Anything else is a type error.

use std::cmp::Ordering;

use crate::{
    ast::{BinaryOp, UnaryOp},
    diagnostics::{error, DiagnosticKind, JliteError, Result, SourceSpan},
    value::{Value, ValueKind},
};

enum Numeric {
    Ints(i64, i64),
    Doubles(f64, f64),
}

fn numeric_pair(left: &Value, right: &Value) -> Option<Numeric> {
    match (left.kind(), right.kind()) {
        (ValueKind::Int(a), ValueKind::Int(b)) => Some(Numeric::Ints(*a, *b)),
        (ValueKind::Double(a), ValueKind::Double(b)) => Some(Numeric::Doubles(*a, *b)),
        (ValueKind::Int(a), ValueKind::Double(b)) => Some(Numeric::Doubles(*a as f64, *b)),
        (ValueKind::Double(a), ValueKind::Int(b)) => Some(Numeric::Doubles(*a, *b as f64)),
        _ => None,
    }
}

fn is_numeric_zero(value: &Value) -> bool {
    match value.kind() {
        ValueKind::Int(n) => *n == 0,
        ValueKind::Double(n) => *n == 0.0,
        _ => false,
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value, span: SourceSpan) -> JliteError {
    error(
        DiagnosticKind::Type,
        format!(
            "cannot apply `{}` to {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ),
        span,
    )
}

pub fn binary(op: BinaryOp, left: &Value, right: &Value, span: SourceSpan) -> Result<Value> {
    use BinaryOp::*;
    match op {
        Add | Sub | Mul | Div | Mod => arithmetic(op, left, right, span),
        Equal => Ok(Value::bool(left.equals(right))),
        NotEqual => Ok(Value::bool(!left.equals(right))),
        Less | LessEqual | Greater | GreaterEqual => comparison(op, left, right, span),
        And | Or => logical(op, left, right, span),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value, span: SourceSpan) -> Result<Value> {
    use BinaryOp::*;
    if op == Add && (left.is_string() || right.is_string()) {
        return Ok(Value::string(format!("{left}{right}")));
    }
    if matches!(op, Div | Mod) && is_numeric_zero(right) && numeric_pair(left, right).is_some() {
        let message = if op == Div {
            "division by zero"
        } else {
            "modulo by zero"
        };
        return Err(error(DiagnosticKind::Arithmetic, message, span));
    }
    let value = match (numeric_pair(left, right), op) {
        (Some(Numeric::Ints(a, b)), Add) => Value::int(a.wrapping_add(b)),
        (Some(Numeric::Ints(a, b)), Sub) => Value::int(a.wrapping_sub(b)),
        (Some(Numeric::Ints(a, b)), Mul) => Value::int(a.wrapping_mul(b)),
        (Some(Numeric::Ints(a, b)), Div) => Value::int(a.wrapping_div(b)),
        (Some(Numeric::Ints(a, b)), Mod) => Value::int(a.wrapping_rem(b)),
        (Some(Numeric::Doubles(a, b)), Add) => Value::double(a + b),
        (Some(Numeric::Doubles(a, b)), Sub) => Value::double(a - b),
        (Some(Numeric::Doubles(a, b)), Mul) => Value::double(a * b),
        (Some(Numeric::Doubles(a, b)), Div) => Value::double(a / b),
        (Some(Numeric::Doubles(a, b)), Mod) => Value::double(a % b),
        _ => return Err(mismatch(op, left, right, span)),
    };
    Ok(value)
}

fn comparison(op: BinaryOp, left: &Value, right: &Value, span: SourceSpan) -> Result<Value> {
    let ordering = match numeric_pair(left, right) {
        Some(Numeric::Ints(a, b)) => Some(a.cmp(&b)),
        Some(Numeric::Doubles(a, b)) => a.partial_cmp(&b),
        None => return Err(mismatch(op, left, right, span)),
    };
    // NaN compares false against everything.
    let holds = ordering.is_some_and(|ordering: Ordering| match op {
        BinaryOp::Less => ordering.is_lt(),
        BinaryOp::LessEqual => ordering.is_le(),
        BinaryOp::Greater => ordering.is_gt(),
        BinaryOp::GreaterEqual => ordering.is_ge(),
        _ => false,
    });
    Ok(Value::bool(holds))
}

fn logical(op: BinaryOp, left: &Value, right: &Value, span: SourceSpan) -> Result<Value> {
    match (left.as_bool(), right.as_bool()) {
        (Some(a), Some(b)) => Ok(Value::bool(if op == BinaryOp::And { a && b } else { a || b })),
        _ => Err(error(
            DiagnosticKind::Type,
            format!(
                "operator `{}` expects boolean operands, found {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ),
            span,
        )),
    }
}

pub fn unary(op: UnaryOp, value: &Value, span: SourceSpan) -> Result<Value> {
    match (op, value.kind()) {
        (UnaryOp::Negate, ValueKind::Int(n)) => Ok(Value::int(n.wrapping_neg())),
        (UnaryOp::Negate, ValueKind::Double(n)) => Ok(Value::double(-n)),
        (UnaryOp::Not, ValueKind::Bool(b)) => Ok(Value::bool(!b)),
        (UnaryOp::Negate, _) => Err(error(
            DiagnosticKind::Type,
            format!("unary `-` expects a numeric operand, found {}", value.type_name()),
            span,
        )),
        (UnaryOp::Not, _) => Err(error(
            DiagnosticKind::Type,
            format!("unary `!` expects a boolean operand, found {}", value.type_name()),
            span,
        )),
    }
}

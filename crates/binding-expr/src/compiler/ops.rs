//! Runtime semantics of the unary and binary operators.
//!
//! Every function here resolves against the runtime variants of its operands,
//! so the same code serves statically typed operations (whose operands were
//! already converted to a common type at build time) and late-bound ones.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::Zero;
use rust_decimal::Decimal;
use smol_str::SmolStr;

use crate::{Type, Value, ast::node::{BinaryOp, UnaryOp}, error::runtime::RuntimeError};

#[cold]
fn invalid_types(op: impl std::fmt::Display, values: &[&Value]) -> RuntimeError {
    RuntimeError::invalid_types(SmolStr::new(op.to_string()), values.iter().map(|v| v.type_name()))
}

/// Converts both operands to the common numeric type of their runtime types.
fn promote(left: &Value, right: &Value) -> Option<(Value, Value)> {
    let (lt, rt) = (left.runtime_type(), right.runtime_type());
    if !lt.is_numeric() || !rt.is_numeric() {
        return None;
    }

    let common = Type::promote(&lt, &rt)?;
    Some((left.convert(&common)?, right.convert(&common)?))
}

pub(crate) fn concat(left: &Value, right: &Value) -> Value {
    Value::String(SmolStr::new(format!("{}{}", left, right)))
}

/// `==` semantics: numeric comparison when the operands promote, value
/// equality otherwise. Never fails.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match promote(left, right) {
        Some((l, r)) => compare_numbers(&l, &r) == Some(Ordering::Equal),
        None => left == right,
    }
}

fn compare_numbers(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Single(a), Value::Single(b)) => a.partial_cmp(b),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
        (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
        (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn int_arithmetic(op: BinaryOp, a: i32, b: i32) -> Result<Value, RuntimeError> {
    let n = match op {
        BinaryOp::Addition => a.wrapping_add(b),
        BinaryOp::Subtraction => a.wrapping_sub(b),
        BinaryOp::Multiplication => a.wrapping_mul(b),
        BinaryOp::Division if b == 0 => return Err(RuntimeError::ZeroDivision),
        BinaryOp::Remainder if b == 0 => return Err(RuntimeError::ZeroDivision),
        // `int.MIN / -1` is the only quotient that does not fit.
        BinaryOp::Division | BinaryOp::Remainder => {
            let checked = if op == BinaryOp::Division { a.checked_div(b) } else { a.checked_rem(b) };
            checked.ok_or_else(|| RuntimeError::Overflow(SmolStr::new(op.symbol())))?
        }
        _ => return Err(invalid_types(op, &[&Value::Int(a), &Value::Int(b)])),
    };
    Ok(Value::Int(n))
}

macro_rules! float_arithmetic {
    ($op:expr, $a:expr, $b:expr, $variant:ident) => {
        match $op {
            BinaryOp::Addition => Ok(Value::$variant($a + $b)),
            BinaryOp::Subtraction => Ok(Value::$variant($a - $b)),
            BinaryOp::Multiplication => Ok(Value::$variant($a * $b)),
            BinaryOp::Division => Ok(Value::$variant($a / $b)),
            BinaryOp::Remainder => Ok(Value::$variant($a % $b)),
            op => Err(invalid_types(op, &[&Value::$variant($a), &Value::$variant($b)])),
        }
    };
}

fn decimal_arithmetic(op: BinaryOp, a: Decimal, b: Decimal) -> Result<Value, RuntimeError> {
    if matches!(op, BinaryOp::Division | BinaryOp::Remainder) && b.is_zero() {
        return Err(RuntimeError::ZeroDivision);
    }

    let result = match op {
        BinaryOp::Addition => a.checked_add(b),
        BinaryOp::Subtraction => a.checked_sub(b),
        BinaryOp::Multiplication => a.checked_mul(b),
        BinaryOp::Division => a.checked_div(b),
        BinaryOp::Remainder => a.checked_rem(b),
        _ => return Err(invalid_types(op, &[&Value::Decimal(a), &Value::Decimal(b)])),
    };

    result
        .map(Value::Decimal)
        .ok_or_else(|| RuntimeError::Overflow(SmolStr::new(op.symbol())))
}

fn bigint_arithmetic(op: BinaryOp, a: &BigInt, b: &BigInt) -> Result<Value, RuntimeError> {
    if matches!(op, BinaryOp::Division | BinaryOp::Remainder) && b.is_zero() {
        return Err(RuntimeError::ZeroDivision);
    }

    let n = match op {
        BinaryOp::Addition => a + b,
        BinaryOp::Subtraction => a - b,
        BinaryOp::Multiplication => a * b,
        BinaryOp::Division => a / b,
        BinaryOp::Remainder => a % b,
        _ => {
            return Err(invalid_types(
                op,
                &[&Value::BigInt(a.clone()), &Value::BigInt(b.clone())],
            ));
        }
    };
    Ok(Value::BigInt(n))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, *a, *b),
        (Value::Single(a), Value::Single(b)) => float_arithmetic!(op, *a, *b, Single),
        (Value::Double(a), Value::Double(b)) => float_arithmetic!(op, *a, *b, Double),
        (Value::Decimal(a), Value::Decimal(b)) => decimal_arithmetic(op, *a, *b),
        (Value::BigInt(a), Value::BigInt(b)) => bigint_arithmetic(op, a, b),
        _ => Err(invalid_types(op, &[left, right])),
    }
}

fn relational(op: BinaryOp, ordering: Option<Ordering>) -> bool {
    let Some(ordering) = ordering else {
        return false;
    };

    match op {
        BinaryOp::LessThan => ordering == Ordering::Less,
        BinaryOp::GreaterThan => ordering == Ordering::Greater,
        BinaryOp::LessThanOrEqual => ordering != Ordering::Greater,
        BinaryOp::GreaterThanOrEqual => ordering != Ordering::Less,
        _ => false,
    }
}

/// Three-valued `&`, `^` and `|` over `bool?`.
pub(crate) fn logical(op: BinaryOp, left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match op {
        BinaryOp::LogicalAnd => match (left, right) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        BinaryOp::LogicalOr => match (left, right) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        BinaryOp::ExclusiveOr => Some(left? ^ right?),
        _ => None,
    }
}

fn bitwise(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(match op {
            BinaryOp::LogicalAnd => a & b,
            BinaryOp::ExclusiveOr => a ^ b,
            _ => a | b,
        })),
        (Value::BigInt(a), Value::BigInt(b)) => Ok(Value::BigInt(match op {
            BinaryOp::LogicalAnd => a & b,
            BinaryOp::ExclusiveOr => a ^ b,
            _ => a | b,
        })),
        _ => Err(invalid_types(op, &[left, right])),
    }
}

fn shift(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let Value::Int(count) = right else {
        return Err(invalid_types(op, &[left, right]));
    };
    let left_shift = (op == BinaryOp::LeftShift) == (*count >= 0);

    match left {
        Value::Int(n) => Ok(Value::Int(if op == BinaryOp::LeftShift {
            n.wrapping_shl(*count as u32)
        } else {
            n.wrapping_shr(*count as u32)
        })),
        Value::BigInt(n) => {
            let count = count.unsigned_abs();
            Ok(Value::BigInt(if left_shift { n << count } else { n >> count }))
        }
        _ => Err(invalid_types(op, &[left, right])),
    }
}

/// Applies a binary operator to two runtime values, promoting them to a common
/// numeric type first. `null` operands are lifted: relational operators yield
/// `false`, the rest `null`.
///
/// Short-circuit operators and `??` are evaluated by their builder and are not
/// handled here.
pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Addition if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) => {
            return Ok(concat(left, right));
        }
        BinaryOp::Equality => return Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::NotEqual => return Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::ExclusiveOr
            if matches!(left, Value::Bool(_) | Value::Null) && matches!(right, Value::Bool(_) | Value::Null) =>
        {
            return Ok(logical(op, left.as_bool(), right.as_bool()).into());
        }
        _ => {}
    }

    let is_relational = matches!(
        op,
        BinaryOp::LessThan | BinaryOp::GreaterThan | BinaryOp::LessThanOrEqual | BinaryOp::GreaterThanOrEqual
    );

    if left.is_null() || right.is_null() {
        return Ok(if is_relational { Value::FALSE } else { Value::Null });
    }

    if matches!(op, BinaryOp::LeftShift | BinaryOp::RightShift) {
        return shift(op, left, right);
    }

    let (l, r) = promote(left, right).ok_or_else(|| invalid_types(op, &[left, right]))?;

    match op {
        BinaryOp::Addition
        | BinaryOp::Subtraction
        | BinaryOp::Multiplication
        | BinaryOp::Division
        | BinaryOp::Remainder => arithmetic(op, &l, &r),
        BinaryOp::LogicalAnd | BinaryOp::ExclusiveOr | BinaryOp::LogicalOr => bitwise(op, &l, &r),
        _ if is_relational => Ok(Value::Bool(relational(op, compare_numbers(&l, &r)))),
        _ => Err(invalid_types(op, &[left, right])),
    }
}

/// Applies a unary operator to a runtime value. `null` stays `null`.
pub(crate) fn unary(op: UnaryOp, operand: &Value) -> Result<Value, RuntimeError> {
    match (op, operand) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Plus, v) if v.runtime_type().is_numeric() => Ok(v.clone()),
        (UnaryOp::Minus, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnaryOp::Minus, Value::Single(n)) => Ok(Value::Single(-n)),
        (UnaryOp::Minus, Value::Double(n)) => Ok(Value::Double(-n)),
        (UnaryOp::Minus, Value::Decimal(n)) => Ok(Value::Decimal(-n)),
        (UnaryOp::Minus, Value::BigInt(n)) => Ok(Value::BigInt(-n)),
        (UnaryOp::LogicalNegation, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::BitwiseNegation, Value::Int(n)) => Ok(Value::Int(!n)),
        (UnaryOp::BitwiseNegation, Value::BigInt(n)) => Ok(Value::BigInt(!n)),
        (op, v) => Err(invalid_types(op, &[v])),
    }
}

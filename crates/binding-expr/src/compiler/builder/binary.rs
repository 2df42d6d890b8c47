use rustc_hash::FxHashMap;

use super::{ExpressionBuilder, priority};
use crate::{
    Type, Value,
    ast::node::{BinaryOp, Expr, Node},
    compiler::{BuildContext, Executable, ops},
    convert::ConvertError,
    error::{compile::CompileError, runtime::RuntimeError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperation {
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    LeftShift,
    RightShift,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
    And,
    ExclusiveOr,
    Or,
    AndAlso,
    OrElse,
    Coalesce,
}

impl BinaryOperation {
    fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperation::Multiply
                | BinaryOperation::Divide
                | BinaryOperation::Modulo
                | BinaryOperation::Add
                | BinaryOperation::Subtract
        )
    }

    fn is_relational(&self) -> bool {
        matches!(
            self,
            BinaryOperation::LessThan
                | BinaryOperation::GreaterThan
                | BinaryOperation::LessThanOrEqual
                | BinaryOperation::GreaterThanOrEqual
        )
    }

    fn is_equality(&self) -> bool {
        matches!(self, BinaryOperation::Equal | BinaryOperation::NotEqual)
    }

    fn is_shift(&self) -> bool {
        matches!(self, BinaryOperation::LeftShift | BinaryOperation::RightShift)
    }
}

/// Builds binary operators whose op appears in the mapping table.
#[derive(Debug, Clone)]
pub struct BinaryBuilder {
    mapping: FxHashMap<BinaryOp, BinaryOperation>,
}

impl Default for BinaryBuilder {
    fn default() -> Self {
        Self {
            mapping: [
                (BinaryOp::Multiplication, BinaryOperation::Multiply),
                (BinaryOp::Division, BinaryOperation::Divide),
                (BinaryOp::Remainder, BinaryOperation::Modulo),
                (BinaryOp::Addition, BinaryOperation::Add),
                (BinaryOp::Subtraction, BinaryOperation::Subtract),
                (BinaryOp::LeftShift, BinaryOperation::LeftShift),
                (BinaryOp::RightShift, BinaryOperation::RightShift),
                (BinaryOp::LessThan, BinaryOperation::LessThan),
                (BinaryOp::GreaterThan, BinaryOperation::GreaterThan),
                (BinaryOp::LessThanOrEqual, BinaryOperation::LessThanOrEqual),
                (BinaryOp::GreaterThanOrEqual, BinaryOperation::GreaterThanOrEqual),
                (BinaryOp::Equality, BinaryOperation::Equal),
                (BinaryOp::NotEqual, BinaryOperation::NotEqual),
                (BinaryOp::LogicalAnd, BinaryOperation::And),
                (BinaryOp::ExclusiveOr, BinaryOperation::ExclusiveOr),
                (BinaryOp::LogicalOr, BinaryOperation::Or),
                (BinaryOp::ConditionalAnd, BinaryOperation::AndAlso),
                (BinaryOp::ConditionalOr, BinaryOperation::OrElse),
                (BinaryOp::NullCoalescing, BinaryOperation::Coalesce),
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl BinaryBuilder {
    pub fn mapping(&self) -> &FxHashMap<BinaryOp, BinaryOperation> {
        &self.mapping
    }

    pub fn mapping_mut(&mut self) -> &mut FxHashMap<BinaryOp, BinaryOperation> {
        &mut self.mapping
    }
}

impl ExpressionBuilder for BinaryBuilder {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn priority(&self) -> i32 {
        priority::BINARY
    }

    fn try_build(&self, ctx: &mut BuildContext<'_>, node: &Node) -> Result<Option<Executable>, CompileError> {
        let Expr::Binary { op, left, right } = &**node else {
            return Ok(None);
        };
        let Some(operation) = self.mapping.get(op).copied() else {
            return Ok(None);
        };

        let left = ctx.build(left)?;
        let right = ctx.build(right)?;

        let expr = match operation {
            BinaryOperation::Coalesce => build_coalesce(*op, left, right)?,
            BinaryOperation::AndAlso | BinaryOperation::OrElse => build_short_circuit(*op, left, right)?,
            operation => build_operator(*op, operation, left, right)?,
        };

        Ok(Some(expr))
    }
}

fn invalid_types(op: BinaryOp, left: &Type, right: &Type) -> CompileError {
    CompileError::invalid_types(op.symbol(), [left.name(), right.name()])
}

fn lift(ty: Type, lifted: bool) -> Type {
    if lifted { ty.nullable() } else { ty }
}

/// A `null` constant adopts the nullable form of the other side's type.
fn adopt_null(expr: Executable, other: &Type) -> Executable {
    if expr.is_null_constant() && !other.is_dynamic() {
        Executable::constant(Value::Null, other.clone().nullable())
    } else {
        expr
    }
}

fn evaluate(op: BinaryOp, ty: Type, left: Executable, right: Executable) -> Executable {
    let closed = left.is_closed() && right.is_closed();
    Executable::new(ty, closed, move |frame| {
        let l = left.eval(frame)?;
        let r = right.eval(frame)?;
        ops::binary(op, &l, &r)
    })
}

fn build_operator(
    op: BinaryOp,
    operation: BinaryOperation,
    left: Executable,
    right: Executable,
) -> Result<Executable, CompileError> {
    let (left, right) = if left.is_null_constant() && !right.is_null_constant() {
        let ty = right.ty().clone();
        (adopt_null(left, &ty), right)
    } else {
        let ty = left.ty().clone();
        (left, adopt_null(right, &ty))
    };
    let (lt, rt) = (left.ty().clone(), right.ty().clone());

    if operation == BinaryOperation::Add && (lt == Type::String || rt == Type::String) {
        let closed = left.is_closed() && right.is_closed();
        return Ok(Executable::new(Type::String, closed, move |frame| {
            Ok(ops::concat(&left.eval(frame)?, &right.eval(frame)?))
        }));
    }

    if operation.is_equality() {
        return Ok(evaluate(op, Type::Bool, left, right));
    }

    if lt.is_dynamic() || rt.is_dynamic() {
        let ty = if operation.is_relational() { Type::Bool } else { Type::Object };
        return Ok(evaluate(op, ty, left, right));
    }

    let (lu, ru) = (lt.underlying(), rt.underlying());
    let lifted = lt.is_lifted() || rt.is_lifted();

    if operation.is_shift() {
        if !lu.is_integral() || ru != &Type::Int {
            return Err(invalid_types(op, &lt, &rt));
        }
        let ty = lift(lu.clone(), lifted);
        return Ok(evaluate(op, ty, left, right));
    }

    if !operation.is_arithmetic() && !operation.is_relational() && lu == &Type::Bool && ru == &Type::Bool {
        return Ok(evaluate(op, lift(Type::Bool, lifted), left, right));
    }

    let bitwise = !operation.is_arithmetic() && !operation.is_relational();
    let common = Type::promote(lu, ru)
        .filter(|common| common.is_numeric() && (!bitwise || common.is_integral()))
        .ok_or_else(|| invalid_types(op, &lt, &rt))?;

    let operand_type = lift(common, lifted);
    let l = left
        .convert(&operand_type)
        .ok_or_else(|| invalid_types(op, &lt, &rt))?;
    let r = right
        .convert(&operand_type)
        .ok_or_else(|| invalid_types(op, &lt, &rt))?;

    let ty = if operation.is_relational() { Type::Bool } else { operand_type };
    Ok(evaluate(op, ty, l, r))
}

fn as_tristate(op: BinaryOp, value: &Value) -> Result<Option<bool>, RuntimeError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        v => Err(RuntimeError::invalid_types(op.symbol(), [v.type_name()])),
    }
}

fn build_short_circuit(op: BinaryOp, left: Executable, right: Executable) -> Result<Executable, CompileError> {
    let (left, right) = (adopt_null(left, &Type::Bool), adopt_null(right, &Type::Bool));
    let (lt, rt) = (left.ty().clone(), right.ty().clone());

    let is_boolean = |ty: &Type| ty.is_dynamic() || ty.underlying() == &Type::Bool;
    if !is_boolean(&lt) || !is_boolean(&rt) {
        return Err(invalid_types(op, &lt, &rt));
    }

    let ty = if lt == Type::Bool && rt == Type::Bool {
        Type::Bool
    } else {
        Type::Bool.nullable()
    };
    let (stop_on, logical) = match op {
        BinaryOp::ConditionalAnd => (false, BinaryOp::LogicalAnd),
        _ => (true, BinaryOp::LogicalOr),
    };
    let closed = left.is_closed() && right.is_closed();

    Ok(Executable::new(ty, closed, move |frame| {
        let l = as_tristate(op, &left.eval(frame)?)?;
        if l == Some(stop_on) {
            return Ok(Value::Bool(stop_on));
        }

        let r = as_tristate(op, &right.eval(frame)?)?;
        Ok(ops::logical(logical, l, r).into())
    }))
}

fn build_coalesce(op: BinaryOp, left: Executable, right: Executable) -> Result<Executable, CompileError> {
    let (lt, rt) = (left.ty().clone(), right.ty().clone());
    let underlying = lt.underlying().clone();

    let (ty, right) = if lt.is_lifted()
        && let Some(r) = right.clone().convert(&underlying)
    {
        (underlying, r)
    } else if let Some(r) = right.clone().convert(&lt) {
        (lt, r)
    } else if rt.is_assignable_from(&underlying) {
        (rt, right)
    } else {
        return Err(invalid_types(op, &lt, &rt));
    };

    let closed = left.is_closed() && right.is_closed();
    Ok(Executable::new(ty.clone(), closed, move |frame| {
        let value = left.eval(frame)?;
        if value.is_null() {
            return right.eval(frame);
        }

        value
            .convert(&ty)
            .ok_or_else(|| ConvertError::new(&value, &ty).into())
    }))
}

use std::{fmt::Debug, str::FromStr, sync::RwLock};

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::{Metadata, Type, Value};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot convert \"{value}\" to \"{target}\"")]
pub struct ConvertError {
    pub value: SmolStr,
    pub target: SmolStr,
}

impl ConvertError {
    pub fn new(value: &Value, target: &Type) -> Self {
        Self {
            value: SmolStr::new(format!("{:?}", value)),
            target: target.name(),
        }
    }
}

/// Converts values where the static type of an argument is not known until
/// invocation.
pub trait ValueConverter: Send + Sync + Debug {
    fn convert(&self, value: &Value, target: &Type, metadata: &Metadata) -> Result<Value, ConvertError>;
}

/// Resolves type names used in generic type arguments.
pub trait TypeResolver: Send + Sync + Debug {
    fn try_get_type(&self, name: &str, metadata: &Metadata) -> Option<Type>;
}

/// Implicit lattice conversions first, then explicit numeric conversions,
/// formatting to `string` and parsing from `string`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValueConverter;

impl ValueConverter for DefaultValueConverter {
    fn convert(&self, value: &Value, target: &Type, _metadata: &Metadata) -> Result<Value, ConvertError> {
        if let Some(v) = value.convert(target) {
            return Ok(v);
        }

        let error = || ConvertError::new(value, target);
        let target_inner = target.underlying();

        match (value, target_inner) {
            (Value::Null, _) => Err(error()),
            (v, Type::String) => Ok(Value::from(v.to_string())),
            (Value::String(s), ty) => parse(s, ty).ok_or_else(error),
            (v, ty) if ty.is_numeric() => convert_number(v, ty).ok_or_else(error),
            _ => Err(error()),
        }
    }
}

fn parse(s: &str, ty: &Type) -> Option<Value> {
    let s = s.trim();
    match ty {
        Type::Bool => bool::from_str(&s.to_ascii_lowercase()).ok().map(Value::Bool),
        Type::Int => s.parse().ok().map(Value::Int),
        Type::Single => s.parse().ok().map(Value::Single),
        Type::Double => s.parse().ok().map(Value::Double),
        Type::Decimal => Decimal::from_str(s).ok().map(Value::Decimal),
        Type::BigInt => BigInt::from_str(s).ok().map(Value::BigInt),
        _ => None,
    }
}

fn convert_number(value: &Value, ty: &Type) -> Option<Value> {
    match value {
        Value::Int(n) => from_f64_or_int(f64::from(*n), Some(*n), ty),
        Value::Single(n) => from_f64_or_int(f64::from(*n), None, ty),
        Value::Double(n) => from_f64_or_int(*n, None, ty),
        Value::Decimal(d) => match ty {
            Type::Int => d.trunc().to_i32().map(Value::Int),
            Type::BigInt => d.trunc().to_i128().map(|n| Value::BigInt(BigInt::from(n))),
            _ => d.to_f64().and_then(|n| from_f64_or_int(n, None, ty)),
        },
        Value::BigInt(b) => match ty {
            Type::Int => b.to_i32().map(Value::Int),
            Type::Decimal => b.to_i128().and_then(Decimal::from_i128).map(Value::Decimal),
            _ => b.to_f64().and_then(|n| from_f64_or_int(n, None, ty)),
        },
        _ => None,
    }
}

fn from_f64_or_int(n: f64, exact: Option<i32>, ty: &Type) -> Option<Value> {
    match ty {
        Type::Int => exact.or_else(|| n.trunc().to_i32()).map(Value::Int),
        Type::Single => Some(Value::Single(n as f32)),
        Type::Double => Some(Value::Double(n)),
        Type::Decimal => exact
            .map(Decimal::from)
            .or_else(|| Decimal::from_f64(n))
            .map(Value::Decimal),
        Type::BigInt => exact
            .map(BigInt::from)
            .or_else(|| BigInt::from_f64(n.trunc()))
            .map(Value::BigInt),
        _ => None,
    }
}

/// Name → type table backing generic type arguments given by name.
#[derive(Debug)]
pub struct TypeRegistry {
    types: RwLock<FxHashMap<SmolStr, Type>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let types = [
            Type::Object,
            Type::Bool,
            Type::Int,
            Type::Single,
            Type::Double,
            Type::Decimal,
            Type::BigInt,
            Type::String,
        ]
        .into_iter()
        .map(|ty| (ty.name(), ty))
        .collect();

        Self {
            types: RwLock::new(types),
        }
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<SmolStr>, ty: Type) {
        if let Ok(mut types) = self.types.write() {
            types.insert(name.into(), ty);
        }
    }
}

impl TypeResolver for TypeRegistry {
    fn try_get_type(&self, name: &str, _metadata: &Metadata) -> Option<Type> {
        let types = self.types.read().ok()?;
        types.get(name).cloned().or_else(|| {
            name.strip_suffix("[]")
                .and_then(|element| types.get(element))
                .map(|element| Type::array(element.clone()))
        })
    }
}

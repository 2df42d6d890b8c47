use std::{
    any::Any,
    borrow::Cow,
    fmt::{self, Debug, Display, Formatter},
};

use itertools::Itertools;
use num_bigint::BigInt;
use rust_decimal::Decimal;
use smol_str::SmolStr;

use crate::{LambdaSignature, Metadata, Shared, Type, error::runtime::RuntimeError};

/// Runtime value produced and consumed by compiled expressions.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    BigInt(BigInt),
    String(SmolStr),
    Array(Shared<Vec<Value>>),
    Object(HostObject),
    Type(Type),
    Function(Function),
    Metadata(Metadata),
}

/// An instance owned by the host application.
///
/// Equality is identity: two handles are equal only when they point to the
/// same allocation.
#[derive(Clone)]
pub struct HostObject {
    class: SmolStr,
    inner: Shared<dyn Any + Send + Sync>,
}

impl HostObject {
    pub fn new<T: Any + Send + Sync>(class: impl Into<SmolStr>, value: T) -> Self {
        Self::from_shared(class, Shared::new(value))
    }

    pub fn from_shared<T: Any + Send + Sync>(class: impl Into<SmolStr>, value: Shared<T>) -> Self {
        Self {
            class: class.into(),
            inner: value,
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        std::ptr::addr_eq(Shared::as_ptr(&self.inner), Shared::as_ptr(&other.inner))
    }

    /// Address of the shared allocation, used as an identity key.
    pub fn address(&self) -> usize {
        Shared::as_ptr(&self.inner) as *const () as usize
    }
}

impl Debug for HostObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.class, self.address())
    }
}

type NativeFn = dyn Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync;

/// A callable value, typically the closure built for a lambda node.
#[derive(Clone)]
pub struct Function {
    signature: Shared<LambdaSignature>,
    call: Shared<NativeFn>,
}

impl Function {
    pub fn new<F>(signature: Shared<LambdaSignature>, call: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            signature,
            call: Shared::new(call),
        }
    }

    pub fn signature(&self) -> &Shared<LambdaSignature> {
        &self.signature
    }

    pub fn arity(&self) -> usize {
        self.signature.arity()
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        if args.len() != self.arity() {
            return Err(RuntimeError::ArgumentCount {
                expected: self.arity(),
                got: args.len(),
            });
        }

        (self.call)(args)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        std::ptr::addr_eq(Shared::as_ptr(&self.call), Shared::as_ptr(&other.call))
    }

    pub fn address(&self) -> usize {
        Shared::as_ptr(&self.call) as *const () as usize
    }
}

impl Debug for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "function/{}", self.arity())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Single(a), Value::Single(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Metadata(a), Value::Metadata(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{:?}", s.as_str()),
            Value::Single(n) => write!(f, "{}f", n),
            Value::Decimal(n) => write!(f, "{}m", n),
            Value::BigInt(n) => write!(f, "{}n", n),
            Value::Array(items) => write!(f, "[{}]", items.iter().map(|v| format!("{:?}", v)).join(", ")),
            Value::Object(o) => write!(f, "{:?}", o),
            Value::Type(t) => write!(f, "typeof({})", t),
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Metadata(m) => write!(f, "{:?}", m),
            v => write!(f, "{}", v),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let value: Cow<'_, str> = match self {
            Value::Null => Cow::Borrowed(""),
            Value::Bool(b) => Cow::Owned(b.to_string()),
            Value::Int(n) => Cow::Owned(n.to_string()),
            Value::Single(n) => Cow::Owned(n.to_string()),
            Value::Double(n) => Cow::Owned(n.to_string()),
            Value::Decimal(n) => Cow::Owned(n.to_string()),
            Value::BigInt(n) => Cow::Owned(n.to_string()),
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::Array(items) => Cow::Owned(format!("[{}]", items.iter().join(", "))),
            Value::Object(o) => Cow::Borrowed(o.class()),
            Value::Type(t) => Cow::Owned(t.to_string()),
            Value::Function(func) => Cow::Owned(format!("function/{}", func.arity())),
            Value::Metadata(_) => Cow::Borrowed("metadata"),
        };
        write!(f, "{}", value)
    }
}

impl Value {
    pub const NULL: Value = Value::Null;
    pub const TRUE: Value = Value::Bool(true);
    pub const FALSE: Value = Value::Bool(false);

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Shared::new(items))
    }

    #[inline(always)]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline(always)]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Most specific static type describing this value.
    pub fn runtime_type(&self) -> Type {
        match self {
            Value::Null => Type::Object,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Single(_) => Type::Single,
            Value::Double(_) => Type::Double,
            Value::Decimal(_) => Type::Decimal,
            Value::BigInt(_) => Type::BigInt,
            Value::String(_) => Type::String,
            Value::Array(_) => Type::array(Type::Object),
            Value::Object(o) => Type::class(o.class()),
            Value::Type(_) => Type::TypeRef,
            Value::Function(func) => Type::Function(Shared::clone(func.signature())),
            Value::Metadata(_) => Type::Metadata,
        }
    }

    pub fn type_name(&self) -> SmolStr {
        match self {
            Value::Null => SmolStr::new_static("null"),
            v => v.runtime_type().name(),
        }
    }

    pub fn is_instance_of(&self, ty: &Type) -> bool {
        match (self, ty) {
            (_, Type::Object) => true,
            (Value::Null, ty) => ty.is_nullable(),
            (value, Type::Nullable(inner)) => value.is_instance_of(inner),
            (Value::Bool(_), Type::Bool)
            | (Value::Int(_), Type::Int)
            | (Value::Single(_), Type::Single)
            | (Value::Double(_), Type::Double)
            | (Value::Decimal(_), Type::Decimal)
            | (Value::BigInt(_), Type::BigInt)
            | (Value::String(_), Type::String)
            | (Value::Array(_), Type::Array(_))
            | (Value::Type(_), Type::TypeRef)
            | (Value::Function(_), Type::Function(_))
            | (Value::Metadata(_), Type::Metadata) => true,
            (Value::Object(o), Type::Class(class)) => o.class() == class.as_str(),
            _ => false,
        }
    }

    /// Applies an implicit conversion along the numeric lattice. Returns `None`
    /// when the value is not implicitly convertible to `target`.
    pub fn convert(&self, target: &Type) -> Option<Value> {
        if self.is_instance_of(target) {
            return Some(self.clone());
        }

        match (self, target.underlying()) {
            (Value::Int(n), Type::Single) => Some(Value::Single(*n as f32)),
            (Value::Int(n), Type::Double) => Some(Value::Double(*n as f64)),
            (Value::Int(n), Type::Decimal) => Some(Value::Decimal(Decimal::from(*n))),
            (Value::Int(n), Type::BigInt) => Some(Value::BigInt(BigInt::from(*n))),
            (Value::Single(n), Type::Double) => Some(Value::Double(*n as f64)),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Single(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<Decimal> for Value {
    fn from(n: Decimal) -> Self {
        Value::Decimal(n)
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::BigInt(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(SmolStr::new(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(SmolStr::from(s))
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<HostObject> for Value {
    fn from(o: HostObject) -> Self {
        Value::Object(o)
    }
}

impl From<Type> for Value {
    fn from(t: Type) -> Self {
        Value::Type(t)
    }
}

impl From<Function> for Value {
    fn from(func: Function) -> Self {
        Value::Function(func)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

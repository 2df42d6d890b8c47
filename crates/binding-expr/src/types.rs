use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use smol_str::SmolStr;

use crate::Shared;

/// Static type descriptor attached to every node and built expression.
///
/// `Object` is the dynamic type: operations on it are resolved against the
/// runtime values at invocation time instead of at build time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Type {
    #[default]
    Object,
    Bool,
    Int,
    Single,
    Double,
    Decimal,
    BigInt,
    String,
    Nullable(Box<Type>),
    Array(Box<Type>),
    Class(SmolStr),
    TypeRef,
    Function(Shared<LambdaSignature>),
    Metadata,
}

/// Parameter list and result type of a lambda or function value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LambdaSignature {
    pub parameters: Vec<Type>,
    pub return_type: Type,
}

impl LambdaSignature {
    pub fn new(parameters: Vec<Type>, return_type: Type) -> Self {
        Self {
            parameters,
            return_type,
        }
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

impl Type {
    pub fn array(element: Type) -> Self {
        Type::Array(Box::new(element))
    }

    pub fn class(name: impl Into<SmolStr>) -> Self {
        Type::Class(name.into())
    }

    pub fn function(parameters: Vec<Type>, return_type: Type) -> Self {
        Type::Function(Shared::new(LambdaSignature::new(parameters, return_type)))
    }

    /// Returns the nullable form of a value type. Reference types are already
    /// nullable and are returned unchanged.
    pub fn nullable(self) -> Self {
        if self.is_value_type() {
            Type::Nullable(Box::new(self))
        } else {
            self
        }
    }

    /// Strips one `Nullable` layer.
    #[inline(always)]
    pub fn underlying(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            ty => ty,
        }
    }

    #[inline(always)]
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Type::Bool | Type::Int | Type::Single | Type::Double | Type::Decimal | Type::BigInt
        )
    }

    /// `true` when `null` is a valid value of this type.
    #[inline(always)]
    pub fn is_nullable(&self) -> bool {
        !self.is_value_type()
    }

    #[inline(always)]
    pub fn is_lifted(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    #[inline(always)]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Object)
    }

    #[inline(always)]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Int | Type::Single | Type::Double | Type::Decimal | Type::BigInt
        )
    }

    #[inline(always)]
    pub fn is_integral(&self) -> bool {
        matches!(self, Type::Int | Type::BigInt)
    }

    /// Implicit numeric widening: `int → single → double`, `int → decimal`,
    /// `int → big-integer`.
    pub fn widens_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }

        matches!(
            (self, target),
            (Type::Int, Type::Single)
                | (Type::Int, Type::Double)
                | (Type::Int, Type::Decimal)
                | (Type::Int, Type::BigInt)
                | (Type::Single, Type::Double)
        )
    }

    /// Common type of two non-nullable operands, if the lattice has one.
    pub fn promote(left: &Type, right: &Type) -> Option<Type> {
        if left.widens_to(right) {
            Some(right.clone())
        } else if right.widens_to(left) {
            Some(left.clone())
        } else {
            None
        }
    }

    /// `true` when a value statically typed `from` can be used where `self`
    /// is expected without an explicit conversion.
    pub fn is_assignable_from(&self, from: &Type) -> bool {
        if self == from || self.is_dynamic() {
            return true;
        }

        match (self, from) {
            (Type::Nullable(target), Type::Nullable(source)) => source.widens_to(target),
            (Type::Nullable(target), source) => source.widens_to(target),
            (Type::Array(target), Type::Array(source)) => {
                target.is_dynamic() || (!source.is_value_type() && target.is_assignable_from(source))
            }
            (target, source) if target.is_numeric() => source.widens_to(target),
            _ => false,
        }
    }

    /// Result type of a two-way branch such as `cond ? a : b`.
    pub fn unify(left: &Type, right: &Type) -> Option<Type> {
        if left == right {
            return Some(left.clone());
        }

        let (left_inner, right_inner) = (left.underlying(), right.underlying());
        if left_inner.is_value_type() && right_inner.is_value_type() {
            let common = Type::promote(left_inner, right_inner)?;
            return Some(if left.is_lifted() || right.is_lifted() {
                common.nullable()
            } else {
                common
            });
        }

        if left.is_assignable_from(right) {
            Some(left.clone())
        } else if right.is_assignable_from(left) {
            Some(right.clone())
        } else {
            None
        }
    }

    pub fn name(&self) -> SmolStr {
        SmolStr::new(self.to_string())
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Type::Object => write!(f, "object"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Single => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Decimal => write!(f, "decimal"),
            Type::BigInt => write!(f, "BigInteger"),
            Type::String => write!(f, "string"),
            Type::Nullable(inner) => write!(f, "{}?", inner),
            Type::Array(element) => write!(f, "{}[]", element),
            Type::Class(name) => write!(f, "{}", name),
            Type::TypeRef => write!(f, "Type"),
            Type::Function(signature) => write!(
                f,
                "Func<{}>",
                signature
                    .parameters
                    .iter()
                    .chain(std::iter::once(&signature.return_type))
                    .join(", ")
            ),
            Type::Metadata => write!(f, "Metadata"),
        }
    }
}

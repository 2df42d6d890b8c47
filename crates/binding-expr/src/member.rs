//! Host member model.
//!
//! Members are looked up through a [`MemberManager`] by owner type, name,
//! kind and instance/static flags. Builders never reflect over values
//! themselves; everything they know about host types comes through here.
use std::fmt::{self, Debug, Formatter};

use bitflags::bitflags;
use smol_str::SmolStr;
use thiserror::Error;

use crate::{Metadata, Shared, Type, Value};

pub mod registry;

/// Name under which indexers are exposed as methods.
pub const INDEXER_GETTER_NAME: &str = "get_Item";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemberKind: u8 {
        const ACCESSOR = 0b01;
        const METHOD = 0b10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemberFlags: u8 {
        const INSTANCE = 0b01;
        const STATIC = 0b10;
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemberError {
    #[error("Member \"{1}\" cannot be used with a \"{0}\" target")]
    InvalidTarget(SmolStr, SmolStr),
    #[error("Member \"{0}\" does not take {1} type arguments")]
    GenericArity(SmolStr, usize),
    #[error("{0}")]
    Failed(String),
}

/// Infallible fast path for reading a property.
pub type Getter = Shared<dyn Fn(&Value) -> Result<Value, MemberError> + Send + Sync>;

/// A readable property or field.
pub trait AccessorMember: Send + Sync {
    fn name(&self) -> &str;

    fn ty(&self) -> &Type;

    /// A getter that does not need the invocation metadata. When present the
    /// member builder binds it directly instead of going through
    /// [`AccessorMember::get_value`].
    fn direct_getter(&self) -> Option<Getter> {
        None
    }

    fn get_value(&self, target: &Value, metadata: &Metadata) -> Result<Value, MemberError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    pub name: SmolStr,
    pub ty: Type,
    pub default: Option<Value>,
    pub is_variadic: bool,
}

impl ParameterInfo {
    pub fn new(name: impl Into<SmolStr>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            is_variadic: false,
        }
    }

    pub fn optional(name: impl Into<SmolStr>, ty: Type, default: impl Into<Value>) -> Self {
        Self {
            default: Some(default.into()),
            ..Self::new(name, ty)
        }
    }

    /// A trailing parameter that packs the remaining arguments. `element` is
    /// the type of each packed argument.
    pub fn variadic(name: impl Into<SmolStr>, element: Type) -> Self {
        Self {
            is_variadic: true,
            ..Self::new(name, Type::array(element))
        }
    }

    #[inline(always)]
    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }

    /// Element type of a variadic parameter.
    pub fn element_type(&self) -> &Type {
        match &self.ty {
            Type::Array(element) if self.is_variadic => element,
            ty => ty,
        }
    }
}

/// An invocable method. Indexers are methods named [`INDEXER_GETTER_NAME`].
pub trait MethodMember: Send + Sync {
    fn name(&self) -> &str;

    fn return_type(&self) -> &Type;

    fn parameters(&self) -> &[ParameterInfo];

    fn generic_arity(&self) -> usize {
        0
    }

    /// Closes a generic method over concrete type arguments.
    fn make_generic(&self, type_args: &[Type]) -> Result<Shared<dyn MethodMember>, MemberError> {
        Err(MemberError::GenericArity(
            SmolStr::new(self.name()),
            type_args.len(),
        ))
    }

    fn invoke(&self, target: &Value, args: &[Value], metadata: &Metadata)
    -> Result<Value, MemberError>;
}

#[derive(Clone)]
pub enum Member {
    Accessor(Shared<dyn AccessorMember>),
    Method(Shared<dyn MethodMember>),
}

impl Member {
    pub fn name(&self) -> &str {
        match self {
            Member::Accessor(accessor) => accessor.name(),
            Member::Method(method) => method.name(),
        }
    }

    pub fn as_accessor(&self) -> Option<&Shared<dyn AccessorMember>> {
        match self {
            Member::Accessor(accessor) => Some(accessor),
            Member::Method(_) => None,
        }
    }

    pub fn as_method(&self) -> Option<&Shared<dyn MethodMember>> {
        match self {
            Member::Method(method) => Some(method),
            Member::Accessor(_) => None,
        }
    }
}

impl Debug for Member {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Member::Accessor(accessor) => write!(f, "{}: {}", accessor.name(), accessor.ty()),
            Member::Method(method) => write!(
                f,
                "{}({}): {}",
                method.name(),
                method.parameters().len(),
                method.return_type()
            ),
        }
    }
}

/// Source of truth for every member the compiler can bind.
pub trait MemberManager: Send + Sync + Debug {
    /// Returns the candidates in preference order. The first applicable
    /// method candidate wins overload resolution.
    fn try_get_members(
        &self,
        owner: &Type,
        kind: MemberKind,
        flags: MemberFlags,
        name: &str,
        metadata: &Metadata,
    ) -> Vec<Member>;
}

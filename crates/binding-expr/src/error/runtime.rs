use smol_str::SmolStr;
use thiserror::Error;

use crate::{convert::ConvertError, member::MemberError};

type Name = SmolStr;
type ArgTypes = Vec<SmolStr>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error(r#"Invalid types for "{}", got {}"#, name, args.join(", "))]
    InvalidTypes { name: Name, args: ArgTypes },
    #[error("Member \"{name}\" is not found on \"{owner}\"")]
    MemberNotFound { owner: Name, name: Name },
    #[error("Cannot access \"{0}\" on a null value")]
    NullReference(Name),
    #[error("Divided by 0")]
    ZeroDivision,
    #[error("Arithmetic overflow in \"{0}\"")]
    Overflow(Name),
    #[error("Index out of bounds {index}, length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("Binding argument {index} (\"{path}\") was not supplied")]
    MissingArgument { index: usize, path: Name },
    #[error("Invalid number of arguments, expected {expected}, got {got}")]
    ArgumentCount { expected: usize, got: usize },
    #[error(transparent)]
    Conversion(#[from] ConvertError),
    #[error(transparent)]
    Member(#[from] MemberError),
}

impl RuntimeError {
    #[cold]
    pub(crate) fn invalid_types(name: impl Into<Name>, args: impl IntoIterator<Item = Name>) -> Self {
        RuntimeError::InvalidTypes {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }
}

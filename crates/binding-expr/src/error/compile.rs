use smol_str::SmolStr;
use thiserror::Error;

use crate::member::MemberError;

type Name = SmolStr;
type ArgTypes = Vec<SmolStr>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Expression \"{0}\" is not supported")]
    Unsupported(String),
    #[error(r#"Invalid types for "{}", got {}"#, name, args.join(", "))]
    InvalidTypes { name: Name, args: ArgTypes },
    #[error("Member \"{name}\" is not found on \"{owner}\"")]
    MemberNotFound { owner: Name, name: Name },
    #[error("Type \"{0}\" cannot be resolved")]
    TypeNotResolved(Name),
    #[error("Invalid arguments for \"{name}\", {message}")]
    InvalidArguments { name: Name, message: String },
    #[error("Maximum build depth exceeded \"{0}\"")]
    RecursionError(u32),
    #[error(transparent)]
    Member(#[from] MemberError),
}

impl CompileError {
    #[cold]
    pub(crate) fn invalid_types(name: impl Into<Name>, args: impl IntoIterator<Item = Name>) -> Self {
        CompileError::InvalidTypes {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }
}

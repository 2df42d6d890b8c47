use miette::Diagnostic;

pub mod compile;
pub mod runtime;

use compile::CompileError;
use runtime::RuntimeError;

/// Any failure surfaced by [`crate::Compiler::evaluate`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match self {
            Error::Compile(CompileError::Unsupported(_)) => "CompileError::Unsupported",
            Error::Compile(CompileError::InvalidTypes { .. }) => "CompileError::InvalidTypes",
            Error::Compile(CompileError::MemberNotFound { .. }) => "CompileError::MemberNotFound",
            Error::Compile(CompileError::TypeNotResolved(_)) => "CompileError::TypeNotResolved",
            Error::Compile(CompileError::InvalidArguments { .. }) => {
                "CompileError::InvalidArguments"
            }
            Error::Compile(CompileError::RecursionError(_)) => "CompileError::RecursionError",
            Error::Compile(CompileError::Member(_)) => "CompileError::Member",
            Error::Runtime(RuntimeError::InvalidTypes { .. }) => "RuntimeError::InvalidTypes",
            Error::Runtime(RuntimeError::MemberNotFound { .. }) => "RuntimeError::MemberNotFound",
            Error::Runtime(RuntimeError::NullReference(_)) => "RuntimeError::NullReference",
            Error::Runtime(RuntimeError::ZeroDivision) => "RuntimeError::ZeroDivision",
            Error::Runtime(RuntimeError::Overflow(_)) => "RuntimeError::Overflow",
            Error::Runtime(RuntimeError::IndexOutOfBounds { .. }) => {
                "RuntimeError::IndexOutOfBounds"
            }
            Error::Runtime(RuntimeError::MissingArgument { .. }) => "RuntimeError::MissingArgument",
            Error::Runtime(RuntimeError::ArgumentCount { .. }) => "RuntimeError::ArgumentCount",
            Error::Runtime(RuntimeError::Conversion(_)) => "RuntimeError::Conversion",
            Error::Runtime(RuntimeError::Member(_)) => "RuntimeError::Member",
        };

        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            Error::Compile(CompileError::Unsupported(_)) => Some(Box::new(
                "No registered expression builder accepts this node",
            )),
            Error::Compile(CompileError::TypeNotResolved(_)) => Some(Box::new(
                "Register the type name with the type resolver before compiling",
            )),
            Error::Runtime(RuntimeError::MissingArgument { .. }) => Some(Box::new(
                "Pass one argument per binding member index to `invoke`",
            )),
            _ => None,
        }
    }
}

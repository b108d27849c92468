//! Bridge errors
//!
//! Everything here is recoverable and returned to the immediate caller.
//! Broken protocol invariants (an undefined type flag, a non-object thrown
//! value, the deadlock sentinel) are not errors: they panic or park.

use crate::call::JsError;
use crate::value::Type;
use thiserror::Error;

/// Bridge result type
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge errors
#[derive(Debug, Error)]
pub enum Error {
    /// The receiver has the wrong type for the operation.
    #[error("call of {method} on {ty}")]
    WrongType { method: &'static str, ty: Type },

    /// The named member is absent or not callable.
    #[error("no such method {method}")]
    NoSuchMethod { method: String },

    /// The host threw while executing a call.
    #[error(transparent)]
    Thrown(#[from] JsError),
}

impl Error {
    pub(crate) fn wrong_type(method: &'static str, ty: Type) -> Self {
        Self::WrongType { method, ty }
    }

    pub(crate) fn no_such_method(method: impl Into<String>) -> Self {
        Self::NoSuchMethod {
            method: method.into(),
        }
    }
}

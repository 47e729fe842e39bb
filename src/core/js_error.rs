use crate::{JSError, core::Value};

/// An abrupt completion: either an engine-raised error or a value thrown by
/// user code. Both propagate verbatim through the iteration machinery.
#[derive(thiserror::Error, Debug, Clone)]
pub enum EvalError {
    #[error(transparent)]
    Js(#[from] JSError),

    #[error("Uncaught {0}")]
    Throw(Value),
}

impl EvalError {
    /// User-visible message: the thrown value rendered as a string, or the
    /// engine error's message without its kind prefix.
    pub fn message(&self) -> String {
        match self {
            EvalError::Js(e) => e.message().to_string(),
            EvalError::Throw(v) => v.to_string(),
        }
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, EvalError::Js(JSError::TypeError { .. }))
    }

    pub fn is_range_error(&self) -> bool {
        matches!(self, EvalError::Js(JSError::RangeError { .. }))
    }

    pub fn thrown_value(&self) -> Option<&Value> {
        match self {
            EvalError::Throw(v) => Some(v),
            EvalError::Js(_) => None,
        }
    }
}

impl From<Value> for EvalError {
    fn from(v: Value) -> Self {
        EvalError::Throw(v)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum JSError {
    #[error("TypeError: {message}")]
    TypeError { message: String },

    #[error("RangeError: {message}")]
    RangeError { message: String },
}

impl JSError {
    /// The message without the error-kind prefix.
    pub fn message(&self) -> &str {
        match self {
            JSError::TypeError { message } | JSError::RangeError { message } => message,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JSError::TypeError { .. } => "TypeError",
            JSError::RangeError { .. } => "RangeError",
        }
    }
}

#[macro_export]
macro_rules! raise_type_error {
    ($($arg:tt)*) => {
        $crate::JSError::TypeError {
            message: format!($($arg)*),
        }
    };
}

#[macro_export]
macro_rules! raise_range_error {
    ($($arg:tt)*) => {
        $crate::JSError::RangeError {
            message: format!($($arg)*),
        }
    };
}

use thiserror::Error;

/// Main error type for Tunespace.
///
/// Everything except [`TuneError::Backend`], [`TuneError::Io`] and
/// [`TuneError::Serialization`] is a declaration-time error: it is raised
/// while the parameter space is being built, before any trial runs, and is
/// not meant to be recovered from.
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Parameter `{name}` declares no alternatives")]
    EmptyChoice { name: String },

    #[error("Parameter `{name}` declares an empty range")]
    EmptyRange { name: String },

    #[error("Parameter `{name}` has an invalid step: {message}")]
    InvalidStep { name: String, message: String },

    #[error("Parameter `{name}` is already declared")]
    DuplicateName { name: String },

    #[error("Descriptor for `{name}` has cardinality zero")]
    ZeroCardinality { name: String },

    #[error("Invalid permutation: {message}")]
    InvalidPermutation { message: String },

    #[error("The tuning session is closed; parameters must be declared before `tune`")]
    SessionClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Search backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TuneError {
    /// Whether the error stems from a malformed parameter-space declaration.
    pub fn is_declaration_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyChoice { .. }
                | Self::EmptyRange { .. }
                | Self::InvalidStep { .. }
                | Self::DuplicateName { .. }
                | Self::ZeroCardinality { .. }
                | Self::SessionClosed
        )
    }
}

/// Result type alias for Tunespace operations
pub type TuneResult<T> = Result<T, TuneError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TuneError::Config(format!($($arg)*))
    };
}

/// Macro for creating backend errors
#[macro_export]
macro_rules! backend_error {
    ($($arg:tt)*) => {
        $crate::TuneError::Backend(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TuneError::DuplicateName {
            name: "block_size".to_string(),
        };

        assert!(error.to_string().contains("block_size"));
        assert!(error.to_string().contains("already declared"));
    }

    #[test]
    fn test_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: TuneError = io.into();

        match error {
            TuneError::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_declaration_classification() {
        assert!(TuneError::EmptyChoice { name: "x".into() }.is_declaration_error());
        assert!(TuneError::SessionClosed.is_declaration_error());
        assert!(!TuneError::Backend("pipe closed".into()).is_declaration_error());
    }

    #[test]
    fn test_macros() {
        let config_err = config_error!("test_limit must be positive, got {}", 0);
        assert!(config_err.to_string().contains("test_limit"));

        let backend_err = backend_error!("optimizer exited with status {}", 1);
        assert!(matches!(backend_err, TuneError::Backend(_)));
    }
}

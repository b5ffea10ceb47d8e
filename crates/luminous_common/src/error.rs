//! Error types for Luminous Nix.
//!
//! Only failures nobody expects end up here. Rejected input, unknown
//! intents, refused commands and failed or timed-out processes are regular
//! values returned by the components that produce them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LuminousError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LuminousError {
    /// Process exit code for this failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            // Everything in this enum is an internal failure from the
            // user's point of view.
            LuminousError::Config(_)
            | LuminousError::Storage(_)
            | LuminousError::Io(_)
            | LuminousError::Json(_)
            | LuminousError::Toml(_)
            | LuminousError::Internal(_) => 3,
        }
    }

    /// Short machine-readable tag, used in the invocation log
    pub fn code(&self) -> &'static str {
        match self {
            LuminousError::Config(_) => "config",
            LuminousError::Storage(_) => "storage",
            LuminousError::Io(_) => "io",
            LuminousError::Json(_) => "json",
            LuminousError::Toml(_) => "toml",
            LuminousError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, LuminousError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_exit_three() {
        let err = LuminousError::Internal("boom".into());
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.code(), "internal");

        let io: LuminousError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(io.exit_code(), 3);
        assert!(io.to_string().contains("disk"));
    }
}

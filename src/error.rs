//! Error types with fix suggestions
//!
//! The control core itself never fails: unknown keys are warnings and
//! duplicate registrations are ignored. Errors only come from the shell
//! around it (config files, terminal setup).

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum SteerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Invalid config value for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Terminal error: {0}")]
    Terminal(String),
}

impl FixSuggestion for SteerError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            SteerError::Io(_) => Some("Check file path and permissions"),
            SteerError::ConfigParse(_) => Some("Check YAML syntax: indentation and field names"),
            SteerError::InvalidConfig { .. } => {
                Some("Use a sleep interval between 0 and 86400 seconds and sample counts above zero")
            }
            SteerError::Terminal(_) => Some("Run in an interactive terminal or pass --headless"),
        }
    }
}

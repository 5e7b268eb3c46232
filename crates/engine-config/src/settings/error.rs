use thiserror::Error;

/// Errors raised when loading or validating copy settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The buffer must hold at least one byte.
    #[error("Invalid buffer size: {0} (must be greater than zero)")]
    InvalidBufferSize(usize),

    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment override that does not parse as a byte count.
    #[error("Invalid value {value:?} for environment variable {var}")]
    Env { var: &'static str, value: String },
}

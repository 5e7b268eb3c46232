use crate::settings::error::SettingsError;
use buffer_size::BufferSize;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub mod buffer_size;
pub mod error;

/// Environment variable that overrides the buffer size, in bytes.
pub const BUFFER_SIZE_ENV: &str = "BULK_COPY_BUFFER_SIZE";

/// Settings for one bulk copy session. Immutable once built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopySettings {
    /// Bytes buffered before a chunk is sent to the server
    #[serde(default)]
    buffer_size: BufferSize,
}

impl CopySettings {
    pub fn new(buffer_size: usize) -> Result<Self, SettingsError> {
        Ok(Self {
            buffer_size: BufferSize::new(buffer_size)?,
        })
    }

    pub fn with_buffer_size(self, buffer_size: usize) -> Result<Self, SettingsError> {
        Ok(Self {
            buffer_size: BufferSize::new(buffer_size)?,
            ..self
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size.get()
    }

    /// Parses `{"buffer_size": N}`. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: CopySettings = serde_json::from_str(json)?;
        debug!("Loaded copy settings from JSON: {}", settings.buffer_size);
        Ok(settings)
    }

    /// Defaults, overridden by `BULK_COPY_BUFFER_SIZE` when it is set.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::default().apply_env(std::env::var(BUFFER_SIZE_ENV).ok().as_deref())
    }

    fn apply_env(self, value: Option<&str>) -> Result<Self, SettingsError> {
        let Some(value) = value else {
            return Ok(self);
        };

        let bytes = value
            .trim()
            .parse::<usize>()
            .map_err(|_| SettingsError::Env {
                var: BUFFER_SIZE_ENV,
                value: value.to_string(),
            })?;
        let settings = self.with_buffer_size(bytes)?;
        info!(
            "Buffer size set to {} from {}",
            settings.buffer_size, BUFFER_SIZE_ENV
        );
        Ok(settings)
    }
}

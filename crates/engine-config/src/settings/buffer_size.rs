use crate::settings::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size in bytes the writer's buffer reaches before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct BufferSize(usize);

impl BufferSize {
    pub const DEFAULT: BufferSize = BufferSize(64 * 1024);

    pub fn new(bytes: usize) -> Result<Self, SettingsError> {
        if bytes == 0 {
            return Err(SettingsError::InvalidBufferSize(bytes));
        }
        Ok(BufferSize(bytes))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BufferSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for BufferSize {
    type Error = SettingsError;

    fn try_from(bytes: usize) -> Result<Self, Self::Error> {
        BufferSize::new(bytes)
    }
}

impl From<BufferSize> for usize {
    fn from(size: BufferSize) -> Self {
        size.0
    }
}

impl fmt::Display for BufferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_rejected() {
        assert!(matches!(
            BufferSize::new(0),
            Err(SettingsError::InvalidBufferSize(0))
        ));
        assert_eq!(BufferSize::new(1).unwrap().get(), 1);
        assert_eq!(BufferSize::default().get(), 65536);
    }
}

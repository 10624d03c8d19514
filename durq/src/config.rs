//! Queue configuration.
//!
//! A [`QueueConfig`] is consulted only when a queue's backing store is
//! created. Once a store exists its persisted control block is
//! authoritative, and the configuration passed to a later open is
//! informational.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::space::PREFIX_SIZE;

/// Capacity used when no explicit size is configured.
pub const DEFAULT_MAX_SIZE: u32 = 2048;

/// Smallest variable-size ring that admits a one-byte record: the record's
/// prefix and payload plus the prefix slack held back by free-space
/// accounting.
pub const MIN_VARIABLE_MAX_SIZE: u32 = 2 * PREFIX_SIZE + 1;

/// How records are framed inside the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElemMode {
    /// Each record carries its own 16-bit length prefix.
    Variable,
    /// Every record is exactly this many bytes and carries no prefix.
    Fixed(u16),
}

impl ElemMode {
    /// Bytes of framing stored in front of each record's payload.
    pub fn overhead(self) -> u32 {
        match self {
            ElemMode::Variable => PREFIX_SIZE,
            ElemMode::Fixed(_) => 0,
        }
    }

    /// Returns `true` for fixed-size records.
    pub fn is_fixed(self) -> bool {
        matches!(self, ElemMode::Fixed(_))
    }
}

/// Parameters for creating a new queue.
///
/// # Example
///
/// ```rust
/// use durq::config::{ElemMode, QueueConfig};
///
/// let config = QueueConfig::fixed(64, 4);
/// assert_eq!(config.elem_mode(), ElemMode::Fixed(4));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of the data region in bytes.
    pub max_size: u32,

    /// Fixed record size. `None` selects variable-size records.
    pub elem_size: Option<u16>,

    /// Exclusive upper bound on variable-size record lengths; 0 disables it.
    ///
    /// This is not persisted and has no effect in fixed mode.
    pub max_elem_size: u16,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            elem_size: None,
            max_elem_size: 0,
        }
    }
}

impl QueueConfig {
    /// Configuration for a variable-size queue with no length limit.
    pub fn variable(max_size: u32) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    /// Configuration for a queue of `elem_size`-byte records.
    pub fn fixed(max_size: u32, elem_size: u16) -> Self {
        Self {
            max_size,
            elem_size: Some(elem_size),
            max_elem_size: 0,
        }
    }

    /// Sets the exclusive record length limit.
    #[must_use]
    pub fn with_max_elem_size(mut self, max_elem_size: u16) -> Self {
        self.max_elem_size = max_elem_size;
        self
    }

    /// The record framing this configuration selects.
    pub fn elem_mode(&self) -> ElemMode {
        match self.elem_size {
            Some(n) => ElemMode::Fixed(n),
            None => ElemMode::Variable,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the capacity is zero, a fixed
    /// element size is zero or larger than the capacity, or a variable-size
    /// queue is smaller than [`MIN_VARIABLE_MAX_SIZE`] and so cannot hold
    /// even a one-byte record.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(invalid("max_size cannot be zero"));
        }

        match self.elem_mode() {
            ElemMode::Fixed(0) => return Err(invalid("fixed elem_size cannot be zero")),
            ElemMode::Fixed(n) if u32::from(n) > self.max_size => {
                return Err(invalid(format!(
                    "fixed elem_size ({n}) exceeds max_size ({})",
                    self.max_size
                )));
            }
            ElemMode::Fixed(_) => {
                if self.max_elem_size > 0 {
                    tracing::debug!(
                        max_elem_size = self.max_elem_size,
                        "max_elem_size ignored for fixed-size records"
                    );
                }
            }
            ElemMode::Variable => {
                if self.max_size < MIN_VARIABLE_MAX_SIZE {
                    return Err(invalid(format!(
                        "max_size ({}) cannot hold a one-byte record (minimum {})",
                        self.max_size,
                        MIN_VARIABLE_MAX_SIZE
                    )));
                }
            }
        }

        Ok(())
    }

    /// Loads a configuration from a JSON file and validates it.
    ///
    /// Missing fields take their [`Default`] values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] or [`ConfigError::Parse`] if the file
    /// cannot be read or parsed, and [`ConfigError::Invalid`] if the values
    /// fail validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(reason: impl Into<String>) -> crate::error::DurqError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.max_size, DEFAULT_MAX_SIZE);
        assert_eq!(config.elem_mode(), ElemMode::Variable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overhead_by_mode() {
        assert_eq!(ElemMode::Variable.overhead(), 2);
        assert_eq!(ElemMode::Fixed(8).overhead(), 0);
    }

    #[test]
    fn test_validation_failures() {
        assert!(QueueConfig::variable(0).validate().is_err());
        assert!(QueueConfig::variable(2).validate().is_err());
        assert!(QueueConfig::variable(3).validate().is_err());
        assert!(QueueConfig::variable(4).validate().is_err());
        assert!(QueueConfig::variable(5).validate().is_ok());
        assert!(QueueConfig::fixed(16, 0).validate().is_err());
        assert!(QueueConfig::fixed(16, 17).validate().is_err());
        assert!(QueueConfig::fixed(16, 16).validate().is_ok());

        let err = QueueConfig::fixed(16, 17).validate().unwrap_err();
        assert!(err.to_string().contains("exceeds max_size"));
    }

    #[test]
    fn test_load_partial_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("queue.json");
        std::fs::write(&path, r#"{ "max_size": 512, "max_elem_size": 80 }"#).unwrap();

        let config = QueueConfig::load(&path).unwrap();
        assert_eq!(config.max_size, 512);
        assert_eq!(config.max_elem_size, 80);
        assert_eq!(config.elem_size, None);
    }

    #[test]
    fn test_load_errors() {
        let temp_dir = tempfile::tempdir().unwrap();

        let missing = QueueConfig::load(temp_dir.path().join("missing.json"));
        assert!(missing.unwrap_err().to_string().contains("failed to read config"));

        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        let bad = QueueConfig::load(&path);
        assert!(bad.unwrap_err().to_string().contains("failed to parse config"));

        std::fs::write(&path, r#"{ "max_size": 0 }"#).unwrap();
        assert!(QueueConfig::load(&path).is_err());
    }
}

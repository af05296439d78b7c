use serde::{Deserialize, Serialize};

use crate::error::{MemIndexError, Result};

/// Default number of terms per copy-on-write dictionary chunk.
pub const DEFAULT_DICTIONARY_CHUNK_SIZE: usize = 64;

const MAX_DEFAULT_THREADS: usize = 8;

fn default_threads() -> usize {
    num_cpus::get().clamp(1, MAX_DEFAULT_THREADS)
}

fn default_chunk_size() -> usize {
    DEFAULT_DICTIONARY_CHUNK_SIZE
}

/// Configuration for a [`crate::MemoryIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryIndexConfig {
    /// Number of executors in the invert pool.
    #[serde(default = "default_threads")]
    pub invert_threads: usize,

    /// Number of executors in the push pool.
    #[serde(default = "default_threads")]
    pub push_threads: usize,

    /// Target number of terms per dictionary chunk.
    #[serde(default = "default_chunk_size")]
    pub dictionary_chunk_size: usize,
}

impl Default for MemoryIndexConfig {
    fn default() -> Self {
        Self {
            invert_threads: default_threads(),
            push_threads: default_threads(),
            dictionary_chunk_size: DEFAULT_DICTIONARY_CHUNK_SIZE,
        }
    }
}

impl MemoryIndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MemoryIndexConfig = serde_json::from_str(json).map_err(|e| {
            MemIndexError::invalid_config(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_invert_threads(mut self, threads: usize) -> Self {
        self.invert_threads = threads;
        self
    }

    pub fn with_push_threads(mut self, threads: usize) -> Self {
        self.push_threads = threads;
        self
    }

    pub fn with_dictionary_chunk_size(mut self, chunk_size: usize) -> Self {
        self.dictionary_chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.invert_threads == 0 {
            return Err(MemIndexError::invalid_config("invert_threads must be > 0"));
        }
        if self.push_threads == 0 {
            return Err(MemIndexError::invalid_config("push_threads must be > 0"));
        }
        if self.dictionary_chunk_size < 2 {
            return Err(MemIndexError::invalid_config(format!(
                "dictionary_chunk_size must be >= 2, got {}",
                self.dictionary_chunk_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MemoryIndexConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.invert_threads >= 1 && config.invert_threads <= MAX_DEFAULT_THREADS);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = MemoryIndexConfig::from_json_str(r#"{"push_threads": 3}"#).unwrap();
        assert_eq!(config.push_threads, 3);
        assert_eq!(config.dictionary_chunk_size, DEFAULT_DICTIONARY_CHUNK_SIZE);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(MemoryIndexConfig::new().with_invert_threads(0).validate().is_err());
        assert!(MemoryIndexConfig::new().with_push_threads(0).validate().is_err());
        assert!(
            MemoryIndexConfig::new()
                .with_dictionary_chunk_size(1)
                .validate()
                .is_err()
        );
        assert!(MemoryIndexConfig::from_json_str(r#"{"invert_threads": 0}"#).is_err());
    }
}

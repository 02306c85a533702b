//! Configuration structures for filebuf.

use crate::error::{FileBufError, Result};
use crate::page::DEFAULT_PAGE_SIZE;
use serde::{Deserialize, Serialize};

/// How resident pages are held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageStrategy {
    /// One lazily allocated buffer per touched page.
    Sparse,
    /// One buffer mirroring the whole file, allocated up front.
    Contiguous,
    /// Contiguous when the file fits in the memory budget, sparse otherwise.
    #[default]
    Auto,
}

/// Buffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Page size in bytes.
    pub page_size: u64,
    /// Storage strategy for resident pages.
    pub strategy: StorageStrategy,
    /// Upper bound on segments per vectored call (None = backing store limit).
    pub max_segments: Option<usize>,
    /// Share of available RAM a file may occupy for `Auto` to pick contiguous.
    pub auto_memory_fraction: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            strategy: StorageStrategy::Auto,
            max_segments: None,
            auto_memory_fraction: 0.25,
        }
    }
}

impl BufferConfig {
    /// Creates a config with the given page size and defaults elsewhere.
    pub fn with_page_size(page_size: u64) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    /// Checks that every field holds a usable value.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(FileBufError::InvalidParameter {
                name: "page_size".to_string(),
                value: self.page_size.to_string(),
            });
        }
        if self.max_segments == Some(0) {
            return Err(FileBufError::InvalidParameter {
                name: "max_segments".to_string(),
                value: "0".to_string(),
            });
        }
        if !(self.auto_memory_fraction > 0.0 && self.auto_memory_fraction <= 1.0) {
            return Err(FileBufError::ConfigError(format!(
                "auto_memory_fraction must be in (0, 1], got {}",
                self.auto_memory_fraction
            )));
        }
        Ok(())
    }

    /// Returns the memory budget in bytes for `Auto` given available RAM.
    pub fn auto_budget_bytes(&self, available_bytes: u64) -> u64 {
        (available_bytes as f64 * self.auto_memory_fraction) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_config_defaults() {
        let config = BufferConfig::default();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.strategy, StorageStrategy::Auto);
        assert!(config.max_segments.is_none());
        assert_eq!(config.auto_memory_fraction, 0.25);
        config.validate().unwrap();
    }

    #[test]
    fn test_buffer_config_with_page_size() {
        let config = BufferConfig::with_page_size(8);
        assert_eq!(config.page_size, 8);
        assert_eq!(config.strategy, StorageStrategy::Auto);
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = BufferConfig::with_page_size(0);
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid parameter: page_size = 0");
    }

    #[test]
    fn test_validate_rejects_zero_segments() {
        let config = BufferConfig {
            max_segments: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FileBufError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_fraction() {
        for fraction in [0.0, -0.5, 1.5, f64::NAN] {
            let config = BufferConfig {
                auto_memory_fraction: fraction,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(FileBufError::ConfigError(_))
            ));
        }
    }

    #[test]
    fn test_auto_budget_bytes() {
        let config = BufferConfig::default();
        assert_eq!(config.auto_budget_bytes(16 * 1024 * 1024), 4 * 1024 * 1024);
    }

    #[test]
    fn test_buffer_config_serde_roundtrip() {
        let original = BufferConfig {
            page_size: 8192,
            strategy: StorageStrategy::Contiguous,
            max_segments: Some(16),
            auto_memory_fraction: 0.5,
        };
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: BufferConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.page_size, deserialized.page_size);
        assert_eq!(original.strategy, deserialized.strategy);
        assert_eq!(original.max_segments, deserialized.max_segments);
        assert_eq!(
            original.auto_memory_fraction,
            deserialized.auto_memory_fraction
        );
    }

    #[test]
    fn test_buffer_config_partial_json_uses_defaults() {
        let config: BufferConfig =
            serde_json::from_str(r#"{"page_size": 512, "strategy": "sparse"}"#).unwrap();
        assert_eq!(config.page_size, 512);
        assert_eq!(config.strategy, StorageStrategy::Sparse);
        assert!(config.max_segments.is_none());
        assert_eq!(config.auto_memory_fraction, 0.25);
    }

    #[test]
    fn test_storage_strategy_serde_names() {
        for (strategy, name) in [
            (StorageStrategy::Sparse, "\"sparse\""),
            (StorageStrategy::Contiguous, "\"contiguous\""),
            (StorageStrategy::Auto, "\"auto\""),
        ] {
            assert_eq!(serde_json::to_string(&strategy).unwrap(), name);
            let parsed: StorageStrategy = serde_json::from_str(name).unwrap();
            assert_eq!(parsed, strategy);
        }
    }
}

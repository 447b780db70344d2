use crate::defaults;
use crate::error::{Result, ScribeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root pipeline configuration structure.
///
/// Immutable once passed to `Pipeline::initialize`; validation happens
/// there, so invalid values fail at initialize time, never later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub engine: EngineConfig,
    pub audio: AudioFormat,
    pub queue: QueueConfig,
    pub segment: SegmentConfig,
}

/// Transcription engine selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub model_alias: String,
    pub language: String,
}

/// PCM audio format descriptors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// Transfer queue capacity and backpressure policy.
///
/// The default is unbounded (accepted data-growth risk when the consumer
/// lags); bounded mode makes the drop/block behavior explicit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub bounded: bool,
    pub capacity: usize,
    pub backpressure: Backpressure,
    pub block_timeout_ms: u64,
}

/// Producer behavior when a bounded queue is full.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Backpressure {
    /// Wait up to `block_timeout_ms` for space, then reject the chunk.
    Block,
    /// Discard the oldest queued chunk, counting every drop.
    DropOldest,
}

/// Segment boundary policy for the accumulator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentConfig {
    /// Chunks per confirmed segment. The engine's end-of-utterance signal
    /// finalizes earlier and resets this counter.
    pub final_cadence: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_alias: defaults::DEFAULT_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            bits_per_sample: defaults::BITS_PER_SAMPLE,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            bounded: false,
            capacity: defaults::QUEUE_CAPACITY,
            backpressure: Backpressure::Block,
            block_timeout_ms: defaults::ENQUEUE_TIMEOUT_MS,
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            final_cadence: defaults::FINAL_CADENCE,
        }
    }
}

impl AudioFormat {
    /// Bytes per sample frame (one sample for every channel).
    pub fn bytes_per_frame(&self) -> u32 {
        self.channels as u32 * (self.bits_per_sample as u32 / 8)
    }

    /// Bytes of PCM per second at this format.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.bytes_per_frame()
    }

    /// Validate the format descriptors.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ScribeError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(ScribeError::ConfigInvalidValue {
                key: "audio.channels".to_string(),
                message: format!("must be 1 or 2, got {}", self.channels),
            });
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(ScribeError::ConfigInvalidValue {
                key: "audio.bits_per_sample".to_string(),
                message: format!("must be 8, 16, 24 or 32, got {}", self.bits_per_sample),
            });
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Validate every section.
    ///
    /// Called by `Pipeline::initialize`; an invalid config never reaches
    /// a running pipeline.
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;

        if self.engine.model_alias.is_empty() {
            return Err(ScribeError::ConfigInvalidValue {
                key: "engine.model_alias".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.engine.language.is_empty() {
            return Err(ScribeError::ConfigInvalidValue {
                key: "engine.language".to_string(),
                message: format!("must be a language code or \"{}\"", defaults::AUTO_LANGUAGE),
            });
        }
        if self.segment.final_cadence == 0 {
            return Err(ScribeError::ConfigInvalidValue {
                key: "segment.final_cadence".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.queue.bounded && self.queue.capacity == 0 {
            return Err(ScribeError::ConfigInvalidValue {
                key: "queue.capacity".to_string(),
                message: "must be at least 1 when bounded".to_string(),
            });
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist.
    ///
    /// Only returns defaults if the file is missing; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - STREAMSCRIBE_MODEL → engine.model_alias
    /// - STREAMSCRIBE_LANGUAGE → engine.language
    /// - STREAMSCRIBE_SAMPLE_RATE → audio.sample_rate
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("STREAMSCRIBE_MODEL")
            && !model.is_empty()
        {
            self.engine.model_alias = model;
        }

        if let Ok(language) = std::env::var("STREAMSCRIBE_LANGUAGE")
            && !language.is_empty()
        {
            self.engine.language = language;
        }

        if let Ok(rate) = std::env::var("STREAMSCRIBE_SAMPLE_RATE")
            && let Ok(rate) = rate.parse::<u32>()
        {
            self.audio.sample_rate = rate;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_streamscribe_env() {
        remove_env("STREAMSCRIBE_MODEL");
        remove_env("STREAMSCRIBE_LANGUAGE");
        remove_env("STREAMSCRIBE_SAMPLE_RATE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = PipelineConfig::default();

        assert_eq!(config.engine.model_alias, "base");
        assert_eq!(config.engine.language, "auto");

        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.bits_per_sample, 16);

        assert!(!config.queue.bounded);
        assert_eq!(config.queue.capacity, 256);
        assert_eq!(config.queue.backpressure, Backpressure::Block);

        assert_eq!(config.segment.final_cadence, 5);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sample_rate() {
        let mut config = PipelineConfig::default();
        config.audio.sample_rate = 0;

        let result = config.validate();
        assert!(matches!(
            result,
            Err(ScribeError::ConfigInvalidValue { key, .. }) if key == "audio.sample_rate"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_channel_count() {
        for channels in [0u16, 3, 7] {
            let mut config = PipelineConfig::default();
            config.audio.channels = channels;
            assert!(config.validate().is_err(), "channels={}", channels);
        }
    }

    #[test]
    fn test_validate_accepts_stereo() {
        let mut config = PipelineConfig::default();
        config.audio.channels = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_bit_depth() {
        for bits in [0u16, 12, 20, 64] {
            let mut config = PipelineConfig::default();
            config.audio.bits_per_sample = bits;
            assert!(config.validate().is_err(), "bits={}", bits);
        }
    }

    #[test]
    fn test_validate_accepts_all_standard_bit_depths() {
        for bits in [8u16, 16, 24, 32] {
            let mut config = PipelineConfig::default();
            config.audio.bits_per_sample = bits;
            assert!(config.validate().is_ok(), "bits={}", bits);
        }
    }

    #[test]
    fn test_validate_rejects_zero_cadence() {
        let mut config = PipelineConfig::default();
        config.segment.final_cadence = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_bounded_capacity() {
        let mut config = PipelineConfig::default();
        config.queue.bounded = true;
        config.queue.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_model_alias() {
        let mut config = PipelineConfig::default();
        config.engine.model_alias = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bytes_per_second() {
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
        };
        assert_eq!(format.bytes_per_frame(), 2);
        assert_eq!(format.bytes_per_second(), 32000);

        let stereo = AudioFormat {
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 16,
        };
        assert_eq!(stereo.bytes_per_frame(), 4);
        assert_eq!(stereo.bytes_per_second(), 192000);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [engine]
            model_alias = "large-v3"
            language = "es"

            [audio]
            sample_rate = 48000
            channels = 2
            bits_per_sample = 16

            [queue]
            bounded = true
            capacity = 64
            backpressure = "DropOldest"

            [segment]
            final_cadence = 10
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = PipelineConfig::load(temp_file.path()).unwrap();

        assert_eq!(config.engine.model_alias, "large-v3");
        assert_eq!(config.engine.language, "es");
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.channels, 2);
        assert!(config.queue.bounded);
        assert_eq!(config.queue.capacity, 64);
        assert_eq!(config.queue.backpressure, Backpressure::DropOldest);
        assert_eq!(config.segment.final_cadence, 10);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [engine]
            model_alias = "small"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = PipelineConfig::load(temp_file.path()).unwrap();

        assert_eq!(config.engine.model_alias, "small");
        assert_eq!(config.engine.language, "auto");
        assert_eq!(config.audio.sample_rate, 16000);
        assert!(!config.queue.bounded);
        assert_eq!(config.segment.final_cadence, 5);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [engine
            model_alias = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        let result = PipelineConfig::load(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_streamscribe_config_12345.toml");
        let config = PipelineConfig::load_or_default(missing_path).unwrap();

        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let invalid_toml = r#"
            [audio
            sample_rate = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(PipelineConfig::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_env_override_model() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_streamscribe_env();

        set_env("STREAMSCRIBE_MODEL", "tiny");
        let config = PipelineConfig::default().with_env_overrides();

        assert_eq!(config.engine.model_alias, "tiny");
        assert_eq!(config.engine.language, "auto"); // Not overridden

        clear_streamscribe_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_streamscribe_env();

        set_env("STREAMSCRIBE_MODEL", "medium");
        set_env("STREAMSCRIBE_LANGUAGE", "fr");
        set_env("STREAMSCRIBE_SAMPLE_RATE", "44100");

        let config = PipelineConfig::default().with_env_overrides();

        assert_eq!(config.engine.model_alias, "medium");
        assert_eq!(config.engine.language, "fr");
        assert_eq!(config.audio.sample_rate, 44100);

        clear_streamscribe_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_streamscribe_env();

        set_env("STREAMSCRIBE_MODEL", "");
        let config = PipelineConfig::default().with_env_overrides();

        assert_eq!(config.engine.model_alias, "base");

        clear_streamscribe_env();
    }

    #[test]
    fn test_env_override_unparseable_rate_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_streamscribe_env();

        set_env("STREAMSCRIBE_SAMPLE_RATE", "not-a-number");
        let config = PipelineConfig::default().with_env_overrides();

        assert_eq!(config.audio.sample_rate, 16000);

        clear_streamscribe_env();
    }
}

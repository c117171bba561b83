//! Run configuration, read from a TOML file with `[radio]`, `[monitor]`,
//! `[storage]` and `[dummy]` tables. Missing tables and keys fall back to
//! their defaults.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::info;

use crate::{
    assembler::DEFAULT_MAX_BURST_SAMPLES,
    error::{Error, Result},
    segment::DetectParams,
};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub radio: RadioConfig,
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
    pub dummy: DummyConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RadioConfig {
    /// Hz, recorded with every capture
    pub center_freq: f64,
    /// Samples per second
    pub sample_rate: f64,
    pub rx_gain: i32,
    pub tx_gain: i32,
    /// Serial or address of a specific device
    pub device: Option<String>,
    /// Samples per receive call
    pub chunk_capacity: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            center_freq: 2.4e9,
            sample_rate: 15e6,
            rx_gain: 74,
            tx_gain: 70,
            device: None,
            chunk_capacity: 16384,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub threshold: f32,
    /// Quiet samples tolerated inside a single burst
    pub cutoff: usize,
    /// Samples of padding on each edge of a burst
    pub packet_slack: usize,
    /// Capacity of each inter-stage queue
    pub queue_size: usize,
    /// Storage container captures are written to
    pub file_name: String,
    /// Stop after this many chunks
    pub max_loops: Option<u64>,
    /// Chunks between liveness messages
    pub heartbeat_every: u64,
    /// Longest burst held open before it is closed regardless
    pub max_burst_samples: usize,
    pub shutdown_grace_ms: u64,
    /// Treat a failed save as fatal instead of logging it and moving on
    pub abort_on_storage_error: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            cutoff: 1000,
            packet_slack: 100,
            queue_size: 64,
            file_name: "captures".to_owned(),
            max_loops: None,
            heartbeat_every: 5000,
            max_burst_samples: DEFAULT_MAX_BURST_SAMPLES,
            shutdown_grace_ms: 2000,
            abort_on_storage_error: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub format: StorageFormat,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("captured_signals"),
            format: StorageFormat::default(),
        }
    }
}

/// On-disk layout for captures
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// A directory of raw sample files per container
    #[default]
    Dir,
    /// One HDF5 file per container, needs the `storage_hdf5` feature
    Hdf5,
}

/// Settings for the synthetic radio
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DummyConfig {
    /// Samples per burst
    pub burst_len: u64,
    /// Samples from the start of one burst to the start of the next
    pub burst_period: u64,
    pub burst_amplitude: f32,
    /// Standard deviation of each noise component
    pub noise_std: f32,
    /// Baseband frequency of the burst tone
    pub tone_hz: f64,
    /// Zero samples appended to every chunk
    pub padding: usize,
    pub seed: Option<u64>,
    /// Pace chunks at the configured sample rate
    pub realtime: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            burst_len: 1500,
            burst_period: 150_000,
            burst_amplitude: 1.0,
            noise_std: 0.05,
            tone_hz: 250e3,
            padding: 512,
            seed: None,
            realtime: false,
        }
    }
}

impl DummyConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.noise_std.is_finite() && self.noise_std >= 0.0) {
            return Err(Error::Configuration(format!(
                "noise_std must be a finite, non-negative deviation (got {})",
                self.noise_std
            )));
        }
        if !self.burst_amplitude.is_finite() {
            return Err(Error::Configuration(format!(
                "burst_amplitude must be finite (got {})",
                self.burst_amplitude
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Read and validate a config file, using defaults if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&std::fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.detect_params()?;
        if self.monitor.queue_size == 0 {
            return Err(Error::Configuration(
                "queue_size must be at least 1".to_owned(),
            ));
        }
        if !(self.radio.sample_rate.is_finite() && self.radio.sample_rate > 0.0) {
            return Err(Error::Configuration(format!(
                "sample_rate must be positive (got {})",
                self.radio.sample_rate
            )));
        }
        if self.radio.chunk_capacity == 0 {
            return Err(Error::Configuration(
                "chunk_capacity must be at least 1".to_owned(),
            ));
        }
        if self.monitor.max_burst_samples == 0 {
            return Err(Error::Configuration(
                "max_burst_samples must be at least 1".to_owned(),
            ));
        }
        self.dummy.validate()
    }

    pub fn detect_params(&self) -> Result<DetectParams> {
        DetectParams::new(
            self.monitor.threshold,
            self.monitor.cutoff,
            self.monitor.packet_slack,
        )
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.monitor.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let config: Config = toml::from_str(
            r#"
            [radio]
            center_freq = 915e6
            sample_rate = 2e6
            device = "30B56D6"

            [monitor]
            threshold = 0.2
            cutoff = 40
            packet_slack = 10
            queue_size = 8
            file_name = "keyfob"
            max_loops = 100

            [storage]
            format = "hdf5"
            "#,
        )
        .unwrap();
        assert_eq!(config.radio.center_freq, 915e6);
        assert_eq!(config.radio.device.as_deref(), Some("30B56D6"));
        assert_eq!(config.radio.chunk_capacity, 16384);
        assert_eq!(config.monitor.max_loops, Some(100));
        assert_eq!(config.monitor.file_name, "keyfob");
        assert_eq!(config.monitor.max_burst_samples, DEFAULT_MAX_BURST_SAMPLES);
        assert_eq!(config.storage.format, StorageFormat::Hdf5);
        assert_eq!(config.storage.root, PathBuf::from("captured_signals"));
        assert_eq!(config.dummy, DummyConfig::default());
        assert_eq!(
            config.detect_params().unwrap(),
            DetectParams {
                threshold: 0.2,
                cutoff: 40,
                slack: 10
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.validate().unwrap();
        config.monitor.queue_size = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        config.monitor.queue_size = 1;
        config.monitor.threshold = -0.1;
        assert!(config.validate().is_err());
        config.monitor.threshold = 0.1;
        config.radio.sample_rate = 0.0;
        assert!(config.validate().is_err());
        config.radio.sample_rate = 1e6;
        config.dummy.noise_std = -0.5;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        config.dummy.noise_std = 0.0;
        config.validate().unwrap();
        config.monitor.max_burst_samples = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_bad_toml() {
        assert!(toml::from_str::<Config>("[monitor]\ncutoff = \"lots\"").is_err());
    }
}

//! Server configuration.
//!
//! Read from `<config dir>/sdr-tcp-bridge/config.toml` when present; every
//! field has a default so an empty or missing file is valid. Command-line
//! flags override what the file says.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::device::{Antenna, DeviceSettings};
use crate::error::ConfigError;
use crate::sample::RatePlan;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub device: DeviceConfig,
    pub stream: StreamConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub port: u16,
    pub nodelay: bool,
    /// SO_SNDBUF for client sockets; OS default when unset
    pub send_buffer_size: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: constants::DEFAULT_PORT,
            nodelay: true,
            send_buffer_size: None,
        }
    }
}

impl NetworkConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind address: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Receiver model for the simulated backend
    pub model: String,
    pub if_grdb: i32,
    pub lna_state: u8,
    pub ppm: f64,
    pub agc: bool,
    pub bias_t: bool,
    pub notch: bool,
    pub antenna: Antenna,
    pub tuner: u8,
    pub startup_frequency_hz: u32,
    pub sample_rate_hz: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            model: "rsp1a".into(),
            if_grdb: 20,
            lna_state: 4,
            ppm: 0.0,
            agc: false,
            bias_t: false,
            notch: false,
            antenna: Antenna::A,
            tuner: 1,
            startup_frequency_hz: constants::STARTUP_FREQUENCY,
            sample_rate_hz: constants::DEFAULT_SAMPLE_RATE,
        }
    }
}

impl DeviceConfig {
    /// How the configured client rate is produced
    pub fn rate_plan(&self) -> RatePlan {
        RatePlan::for_request(self.sample_rate_hz)
    }

    /// Settings the receiver is opened with. The sample rate is the hardware
    /// rate of [`rate_plan`](Self::rate_plan), never below the hardware minimum.
    pub fn settings(&self) -> DeviceSettings {
        DeviceSettings {
            frequency: self.startup_frequency_hz,
            sample_rate: self.rate_plan().hardware_rate,
            grdb: self.if_grdb,
            lna_state: self.lna_state,
            agc: self.agc,
            ppm: self.ppm,
            bias_t: self.bias_t,
            notch: self.notch,
            antenna: self.antenna,
            tuner: self.tuner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Sample buffer capacity in complex samples
    pub buffer_capacity: usize,
    /// Samples per outbound chunk
    pub chunk_samples: usize,
    pub poll_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: constants::BUFFER_CAPACITY,
            chunk_samples: constants::CHUNK_SAMPLES,
            poll_interval_ms: 10,
        }
    }
}

impl StreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Slice a caller waits before re-checking worker liveness
    pub command_timeout_ms: u64,
    /// Idle wake-up period of the worker's command loop
    pub idle_wait_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 1000,
            idle_wait_ms: 1000,
        }
    }
}

impl WorkerConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

impl AppConfig {
    /// Platform config file location, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "sdr-tcp-bridge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the default location. A missing default file yields
    /// the built-in defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.socket_addr()?;
        if self.stream.chunk_samples == 0 {
            return Err(ConfigError::Invalid("chunk_samples must be positive".into()));
        }
        if self.stream.buffer_capacity < self.stream.chunk_samples {
            return Err(ConfigError::Invalid(format!(
                "buffer_capacity {} is smaller than one chunk ({})",
                self.stream.buffer_capacity, self.stream.chunk_samples
            )));
        }
        if self.device.sample_rate_hz < 1000 {
            return Err(ConfigError::Invalid(format!(
                "sample rate {} Hz is too low",
                self.device.sample_rate_hz
            )));
        }
        if self.worker.command_timeout_ms == 0 || self.worker.idle_wait_ms == 0 {
            return Err(ConfigError::Invalid("worker timeouts must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.network.port, 1234);
        assert_eq!(config.stream.chunk_samples, 2048);
        assert_eq!(config.device.startup_frequency_hz, 2_200_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [network]
            port = 7373

            [device]
            model = "rspdx"
            antenna = "B"
            "#,
        )
        .unwrap();
        assert_eq!(config.network.port, 7373);
        assert_eq!(config.network.bind_address, "0.0.0.0");
        assert_eq!(config.device.antenna, Antenna::B);
        assert_eq!(config.device.if_grdb, 20);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AppConfig::from_toml("[stream]\nchunk_samples = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = AppConfig::from_toml("[network]\nbind_address = \"not an ip\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = AppConfig::from_toml("[network]\nport = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\nidle_wait_ms = 50").unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.worker.idle_wait(), Duration::from_millis(50));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/sdr.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_device_settings_from_config() {
        let settings = DeviceConfig::default().settings();
        assert_eq!(settings.frequency, 2_200_000);
        assert_eq!(settings.lna_state, 4);
        assert_eq!(settings.sample_rate, 2_048_000);
    }

    #[test]
    fn test_low_sample_rate_opens_hardware_at_minimum() {
        let config = AppConfig::from_toml("[device]\nsample_rate_hz = 1024000\n").unwrap();
        let plan = config.device.rate_plan();
        assert!(!plan.is_identity());
        assert_eq!(plan.output_rate, 1_024_000);
        assert_eq!(config.device.settings().sample_rate, 2_000_000);
    }
}

//! Error types for the SDR bridge

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Device startup failed: {0}")]
    Startup(#[from] StartupError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Rate converter error: {0}")]
    Converter(#[from] ConverterError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons the hardware worker can fail before reaching `Running`.
///
/// Every variant maps to a stable numeric code which is what gets written to
/// the error log.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StartupError {
    #[error("Could not fetch library: {0}")]
    LibraryMissing(String),

    #[error("error in fetching functions from library: {0}")]
    SymbolsMissing(String),

    #[error("sdrplay_api_Open failed: {0}")]
    ApiOpenFailed(String),

    #[error("could not open sdrplay_api_ApiVersion: {0}")]
    VersionQueryFailed(String),

    #[error("API versions do not match (found {found:.2}, need {required:.2})")]
    VersionMismatch { found: f32, required: f32 },

    #[error("sdrplay_api_GetDevices failed: {0}")]
    EnumerationFailed(String),

    #[error("no valid SDRplay device found")]
    NoDevices,

    #[error("sdrplay_api_SelectDevice failed: {0}")]
    SelectionFailed(String),

    #[error("sdrplay_api_GetDeviceParams failed: {0}")]
    ParamsFetchFailed(String),

    #[error("sdrplay_api_GetDeviceParams returns null")]
    ParamsNull,

    #[error("device initialisation failed: {0}")]
    InitFailed(String),

    #[error("worker thread exited before reporting readiness")]
    WorkerVanished,
}

impl StartupError {
    /// Numeric code identifying which startup precondition failed
    pub fn code(&self) -> u8 {
        match self {
            StartupError::LibraryMissing(_) => 1,
            StartupError::SymbolsMissing(_) => 2,
            StartupError::ApiOpenFailed(_) => 3,
            StartupError::VersionQueryFailed(_) => 4,
            StartupError::VersionMismatch { .. } => 5,
            StartupError::EnumerationFailed(_) => 6,
            StartupError::NoDevices => 7,
            StartupError::SelectionFailed(_) => 8,
            StartupError::ParamsFetchFailed(_) => 9,
            StartupError::ParamsNull => 10,
            StartupError::InitFailed(_) => 11,
            StartupError::WorkerVanished => 99,
        }
    }
}

/// Failures of the synchronous call convention
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("hardware worker is no longer running")]
    WorkerGone,

    #[error("receiver is not active")]
    Inactive,

    #[error("device rejected the command")]
    Rejected,
}

/// Rate converter construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConverterError {
    #[error("output rate {outrate} must not exceed input rate {inrate}")]
    Upsampling { inrate: u32, outrate: u32 },

    #[error("rate {0} Hz is below the 1 kHz block resolution")]
    RateTooLow(u32),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

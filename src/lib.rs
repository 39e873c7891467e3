//! # SDR TCP Bridge
//!
//! Streams I/Q samples from an SDR receiver to a network client speaking the
//! rtl_tcp protocol, and applies the client's tuning commands to the device.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                            TCP CLIENT                                     │
//! │        5-byte commands  │                  ▲  interleaved u8 I/Q          │
//! └─────────────────────────┼──────────────────┼─────────────────────────────┘
//!                           ▼                  │
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │               Streaming Session (network::session)                       │
//! │  ┌──────────────────────┐                 ┌──────────────────────────┐  │
//! │  │ FrameDecoder         │                 │ Drain task               │  │
//! │  │ (network::protocol)  │                 │ 2048-sample chunks       │  │
//! │  └──────────┬───────────┘                 └────────────▲─────────────┘  │
//! └─────────────┼──────────────────────────────────────────┼────────────────┘
//!               ▼                                          │
//! ┌───────────────────────────┐              ┌─────────────┴────────────────┐
//! │ RadioController           │              │ SamplePipeline (sample)      │
//! │  gating, gain mapping,    │─ converter ─▶│  RateConverter ─▶ Codec ─▶   │
//! │  rate policy, flushes     │    swap      │  SampleBuffer (ArrayQueue)   │
//! └─────────────┬─────────────┘              └─────────────▲────────────────┘
//!               │ Dispatcher::call (blocks, FIFO)          │ on_samples
//!               ▼                                          │
//! ┌───────────────────────────┐              ┌─────────────┴────────────────┐
//! │ Hardware worker thread    │── owns ─────▶│ RadioDevice                  │
//! │  lifecycle + interpreter  │              │  vendor callback thread      │
//! └───────────────────────────┘              └──────────────────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod errorlog;
pub mod network;
pub mod sample;
pub mod worker;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default TCP port, as used by rtl_tcp
    pub const DEFAULT_PORT: u16 = 1234;

    /// Samples per outbound chunk
    pub const CHUNK_SAMPLES: usize = 2048;

    /// Sample buffer capacity in complex samples
    pub const BUFFER_CAPACITY: usize = 32 * 32768;

    pub const DEFAULT_SAMPLE_RATE: u32 = 2_048_000;

    /// Frequency the receiver is started at before any client tunes it
    pub const STARTUP_FREQUENCY: u32 = 2_200_000;

    /// Oldest vendor API the worker accepts
    pub const MIN_API_VERSION: f32 = 3.07;

    /// AGC setpoint in dBFS
    pub const AGC_SETPOINT_DBFS: i32 = -30;

    /// Tag written with every error log entry
    pub const VERSION_TAG: &str = concat!("sdr-tcp-bridge ", env!("CARGO_PKG_VERSION"));
}

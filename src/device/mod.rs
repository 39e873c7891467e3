//! Receiver hardware seams
//!
//! [`DeviceApi`] is the vendor library: it walks the startup sequence and,
//! once a device is selected and configured, hands back a [`RadioDevice`].
//! The hardware worker is the only owner of that handle; nothing here is
//! required to be `Send` once the device exists, so it cannot leak to
//! another thread.

pub mod gain;
pub mod lna;
pub mod simulated;

use std::fmt;
use std::sync::Arc;

use crate::error::StartupError;
use crate::sample::IqSample;

pub use gain::{compute_gain, GainSetting};
pub use lna::{LnaTable, StaticLnaTable};
pub use simulated::{DeviceOp, FailAt, SimulatedApi};

/// Receiver of sample batches from the vendor's streaming callback.
///
/// Called from a thread this crate does not own. Implementations must not
/// block beyond a short critical section.
pub trait SampleSink: Send + Sync {
    fn on_samples(&self, samples: &[IqSample], reset: bool);
}

/// Hardware control surface of a configured device.
///
/// Every operation reports success or failure; failures leave no
/// rollback obligation.
pub trait RadioDevice {
    /// Start (or restart) streaming tuned to `frequency`
    fn restart(&mut self, frequency: u32) -> bool;
    fn set_vfo(&mut self, frequency: u32) -> bool;
    fn set_sample_rate(&mut self, rate: u32) -> bool;
    fn set_bandwidth(&mut self, bandwidth_khz: u32) -> bool;
    fn set_grdb(&mut self, grdb: i32) -> bool;
    fn set_lna(&mut self, state: u8) -> bool;
    /// `setpoint` is in dBFS
    fn set_agc(&mut self, setpoint: i32, enabled: bool) -> bool;
    fn set_ppm(&mut self, ppm: f64) -> bool;
    fn set_bias_t(&mut self, enabled: bool) -> bool;
    fn set_notch(&mut self, enabled: bool) -> bool;
    fn set_antenna(&mut self, antenna: Antenna) -> bool;
    fn set_tuner(&mut self, tuner: u8) -> bool;
    /// Stop streaming and release the hardware
    fn uninit(&mut self);
}

/// Vendor library lifecycle, driven step by step by the hardware worker
pub trait DeviceApi: Send {
    /// Load the shared library and resolve its entry points
    fn acquire_library(&mut self) -> Result<(), StartupError>;
    fn open(&mut self) -> Result<(), StartupError>;
    fn api_version(&mut self) -> Result<f32, StartupError>;
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, StartupError>;
    fn select(&mut self, device: &DeviceDescriptor) -> Result<(), StartupError>;
    /// Fetch device parameters, apply `settings`, register `sink` as the
    /// stream callback target.
    fn configure(
        &mut self,
        device: &DeviceDescriptor,
        settings: &DeviceSettings,
        sink: Arc<dyn SampleSink>,
    ) -> Result<Box<dyn RadioDevice>, StartupError>;
    fn release_device(&mut self);
    fn close(&mut self);
    fn release_library(&mut self);
}

/// One entry of the vendor's device enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub serial: String,
    pub hw_version: u8,
}

impl DeviceDescriptor {
    pub fn model(&self) -> RspModel {
        RspModel::from_hw_version(self.hw_version)
    }
}

/// Known receiver models, keyed by the vendor's hardware version byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RspModel {
    Rsp1,
    Rsp1A,
    Rsp1B,
    Rsp2,
    RspDuo,
    RspDx,
    RspDxR2,
    Unknown(u8),
}

impl RspModel {
    pub fn from_hw_version(hw_version: u8) -> Self {
        match hw_version {
            1 => RspModel::Rsp1,
            255 => RspModel::Rsp1A,
            6 => RspModel::Rsp1B,
            2 => RspModel::Rsp2,
            3 => RspModel::RspDuo,
            4 => RspModel::RspDx,
            7 => RspModel::RspDxR2,
            other => RspModel::Unknown(other),
        }
    }

    pub fn hw_version(&self) -> u8 {
        match self {
            RspModel::Rsp1 => 1,
            RspModel::Rsp1A => 255,
            RspModel::Rsp1B => 6,
            RspModel::Rsp2 => 2,
            RspModel::RspDuo => 3,
            RspModel::RspDx => 4,
            RspModel::RspDxR2 => 7,
            RspModel::Unknown(v) => *v,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RspModel::Rsp1 => "RSP1",
            RspModel::Rsp1A => "RSP-1A",
            RspModel::Rsp1B => "RSP-1B",
            RspModel::Rsp2 => "RSP-II",
            RspModel::RspDuo => "RSP-Duo",
            RspModel::RspDx => "RSPDx",
            RspModel::RspDxR2 => "RSPDxR2",
            RspModel::Unknown(_) => "UNKNOWN",
        }
    }

    /// ADC depth of the delivered samples, sign included
    pub fn bit_depth(&self) -> u8 {
        match self {
            RspModel::Rsp1 => 12,
            _ => 14,
        }
    }

    /// Nominal full-scale value of a sample
    pub fn denominator(&self) -> f32 {
        match self {
            RspModel::RspDx | RspModel::RspDxR2 => 8192.0,
            _ => 4096.0,
        }
    }

    pub fn lna_table(&self) -> Arc<dyn LnaTable> {
        Arc::new(lna::table_for(*self))
    }

    pub fn has_antenna_select(&self) -> bool {
        matches!(
            self,
            RspModel::Rsp2 | RspModel::RspDuo | RspModel::RspDx | RspModel::RspDxR2
        )
    }

    pub fn parse(name: &str) -> Option<Self> {
        let model = match name.to_ascii_lowercase().as_str() {
            "rsp1" => RspModel::Rsp1,
            "rsp1a" => RspModel::Rsp1A,
            "rsp1b" => RspModel::Rsp1B,
            "rsp2" => RspModel::Rsp2,
            "rspduo" => RspModel::RspDuo,
            "rspdx" => RspModel::RspDx,
            "rspdxr2" => RspModel::RspDxR2,
            _ => return None,
        };
        Some(model)
    }
}

impl fmt::Display for RspModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Antenna input selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Antenna {
    #[default]
    A,
    B,
    C,
}

impl Antenna {
    /// Vendor id is the ASCII letter of the port
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            b'A' | b'a' => Some(Antenna::A),
            b'B' | b'b' => Some(Antenna::B),
            b'C' | b'c' => Some(Antenna::C),
            _ => None,
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Antenna::A => b'A',
            Antenna::B => b'B',
            Antenna::C => b'C',
        }
    }
}

/// Initial settings applied while configuring the device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    pub frequency: u32,
    pub sample_rate: u32,
    pub grdb: i32,
    pub lna_state: u8,
    pub agc: bool,
    pub ppm: f64,
    pub bias_t: bool,
    pub notch: bool,
    pub antenna: Antenna,
    pub tuner: u8,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            frequency: crate::constants::STARTUP_FREQUENCY,
            sample_rate: crate::constants::DEFAULT_SAMPLE_RATE,
            grdb: 20,
            lna_state: 4,
            agc: false,
            ppm: 0.0,
            bias_t: false,
            notch: false,
            antenna: Antenna::A,
            tuner: 1,
        }
    }
}

/// What the worker learned about the device during startup
#[derive(Clone)]
pub struct DeviceInfo {
    pub model: RspModel,
    pub serial: String,
    pub api_version: f32,
    pub bit_depth: u8,
    pub denominator: f32,
    pub lna_table: Arc<dyn LnaTable>,
}

impl DeviceInfo {
    pub fn new(descriptor: &DeviceDescriptor, api_version: f32) -> Self {
        let model = descriptor.model();
        Self {
            model,
            serial: descriptor.serial.clone(),
            api_version,
            bit_depth: model.bit_depth(),
            denominator: model.denominator(),
            lna_table: model.lna_table(),
        }
    }

    /// `model:serial`
    pub fn device_name(&self) -> String {
        format!("{}:{}", self.model.name(), self.serial)
    }
}

impl fmt::Debug for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceInfo")
            .field("model", &self.model)
            .field("serial", &self.serial)
            .field("api_version", &self.api_version)
            .field("bit_depth", &self.bit_depth)
            .field("denominator", &self.denominator)
            .finish()
    }
}

/// Front-end filter bandwidth for a sample rate, in kHz
pub fn bandwidth_for(sample_rate: u32) -> u32 {
    match sample_rate {
        r if r >= 8_000_000 => 8000,
        r if r >= 7_000_000 => 7000,
        r if r >= 6_000_000 => 6000,
        r if r >= 5_000_000 => 5000,
        r if r >= 1_536_000 => 1536,
        r if r >= 600_000 => 600,
        r if r >= 300_000 => 300,
        _ => 200,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bandwidth_table() {
        assert_eq!(bandwidth_for(10_000_000), 8000);
        assert_eq!(bandwidth_for(2_048_000), 1536);
        assert_eq!(bandwidth_for(1_536_000), 1536);
        assert_eq!(bandwidth_for(1_000_000), 600);
        assert_eq!(bandwidth_for(250_000), 200);
    }

    #[test]
    fn test_model_properties() {
        assert_eq!(RspModel::from_hw_version(1).bit_depth(), 12);
        assert_eq!(RspModel::from_hw_version(255), RspModel::Rsp1A);
        assert_eq!(RspModel::RspDx.denominator(), 8192.0);
        assert_eq!(RspModel::from_hw_version(42), RspModel::Unknown(42));
        assert_eq!(RspModel::Unknown(42).bit_depth(), 14);
        assert_eq!(RspModel::parse("RSPdx"), Some(RspModel::RspDx));
    }

    #[test]
    fn test_device_name() {
        let descriptor = DeviceDescriptor {
            serial: "1234ABCD".into(),
            hw_version: 255,
        };
        let info = DeviceInfo::new(&descriptor, 3.15);
        assert_eq!(info.device_name(), "RSP-1A:1234ABCD");
    }

    #[test]
    fn test_antenna_ids() {
        assert_eq!(Antenna::from_id(b'B'), Some(Antenna::B));
        assert_eq!(Antenna::from_id(b'Z'), None);
        assert_eq!(Antenna::C.id(), b'C');
    }
}

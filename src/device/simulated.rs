//! In-process stand-in for the vendor library.
//!
//! Walks the same startup sequence as real hardware, records every call in a
//! shared journal and, while streaming, feeds a test tone into the sample
//! sink from its own thread the way the vendor callback would.

use parking_lot::Mutex;
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    Antenna, DeviceApi, DeviceDescriptor, DeviceSettings, RadioDevice, RspModel, SampleSink,
};
use crate::error::StartupError;
use crate::sample::IqSample;

/// Callback period of the simulated stream
const CALLBACK_PERIOD: Duration = Duration::from_millis(10);
/// Offset of the generated tone from the tuned frequency
const TONE_OFFSET_HZ: f32 = 100_000.0;

/// Startup step at which the simulated library reports an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Library,
    Symbols,
    Open,
    VersionQuery,
    Enumerate,
    Select,
    ParamsFetch,
    ParamsNull,
    Init,
}

/// One recorded call into the simulated library or device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOp {
    AcquireLibrary,
    Open,
    Enumerate,
    Select(String),
    Configure(u32),
    Restart(u32),
    SetVfo(u32),
    SetSampleRate(u32),
    SetBandwidth(u32),
    SetGrdb(i32),
    SetLna(u8),
    SetAgc { setpoint: i32, enabled: bool },
    SetPpm(f64),
    SetBiasT(bool),
    SetNotch(bool),
    SetAntenna(Antenna),
    SetTuner(u8),
    Uninit,
    ReleaseDevice,
    Close,
    ReleaseLibrary,
}

impl DeviceOp {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceOp::AcquireLibrary => "acquire_library",
            DeviceOp::Open => "open",
            DeviceOp::Enumerate => "enumerate",
            DeviceOp::Select(_) => "select",
            DeviceOp::Configure(_) => "configure",
            DeviceOp::Restart(_) => "restart",
            DeviceOp::SetVfo(_) => "set_vfo",
            DeviceOp::SetSampleRate(_) => "set_sample_rate",
            DeviceOp::SetBandwidth(_) => "set_bandwidth",
            DeviceOp::SetGrdb(_) => "set_grdb",
            DeviceOp::SetLna(_) => "set_lna",
            DeviceOp::SetAgc { .. } => "set_agc",
            DeviceOp::SetPpm(_) => "set_ppm",
            DeviceOp::SetBiasT(_) => "set_bias_t",
            DeviceOp::SetNotch(_) => "set_notch",
            DeviceOp::SetAntenna(_) => "set_antenna",
            DeviceOp::SetTuner(_) => "set_tuner",
            DeviceOp::Uninit => "uninit",
            DeviceOp::ReleaseDevice => "release_device",
            DeviceOp::Close => "close",
            DeviceOp::ReleaseLibrary => "release_library",
        }
    }
}

pub type Journal = Arc<Mutex<Vec<DeviceOp>>>;

/// Simulated vendor library
pub struct SimulatedApi {
    model: RspModel,
    serial: String,
    api_version: f32,
    device_count: usize,
    fail_at: Option<FailAt>,
    rejected: Vec<&'static str>,
    stream: bool,
    journal: Journal,
}

impl SimulatedApi {
    pub fn new(model: RspModel) -> Self {
        Self {
            model,
            serial: "SIM00001".to_string(),
            api_version: 3.15,
            device_count: 1,
            fail_at: None,
            rejected: Vec::new(),
            stream: true,
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_api_version(mut self, version: f32) -> Self {
        self.api_version = version;
        self
    }

    pub fn with_device_count(mut self, count: usize) -> Self {
        self.device_count = count;
        self
    }

    pub fn failing_at(mut self, step: FailAt) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Make the device report failure for the named operation
    /// (see [`DeviceOp::name`])
    pub fn rejecting(mut self, op: &'static str) -> Self {
        self.rejected.push(op);
        self
    }

    /// Disable the tone generator; the sink then only sees what tests push
    pub fn without_stream(mut self) -> Self {
        self.stream = false;
        self
    }

    /// Handle to the call journal, valid after the api is moved into a worker
    pub fn journal(&self) -> Journal {
        Arc::clone(&self.journal)
    }

    fn record(&self, op: DeviceOp) {
        self.journal.lock().push(op);
    }

    fn check(&self, step: FailAt) -> bool {
        self.fail_at == Some(step)
    }
}

impl DeviceApi for SimulatedApi {
    fn acquire_library(&mut self) -> Result<(), StartupError> {
        if self.check(FailAt::Library) {
            return Err(StartupError::LibraryMissing("libsdrplay_api.so".into()));
        }
        if self.check(FailAt::Symbols) {
            return Err(StartupError::SymbolsMissing("sdrplay_api_Open".into()));
        }
        self.record(DeviceOp::AcquireLibrary);
        Ok(())
    }

    fn open(&mut self) -> Result<(), StartupError> {
        if self.check(FailAt::Open) {
            return Err(StartupError::ApiOpenFailed("service not running".into()));
        }
        self.record(DeviceOp::Open);
        Ok(())
    }

    fn api_version(&mut self) -> Result<f32, StartupError> {
        if self.check(FailAt::VersionQuery) {
            return Err(StartupError::VersionQueryFailed("no response".into()));
        }
        Ok(self.api_version)
    }

    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, StartupError> {
        if self.check(FailAt::Enumerate) {
            return Err(StartupError::EnumerationFailed("api locked".into()));
        }
        self.record(DeviceOp::Enumerate);
        let devices = (0..self.device_count)
            .map(|n| DeviceDescriptor {
                serial: if n == 0 {
                    self.serial.clone()
                } else {
                    format!("{}-{}", self.serial, n)
                },
                hw_version: self.model.hw_version(),
            })
            .collect();
        Ok(devices)
    }

    fn select(&mut self, device: &DeviceDescriptor) -> Result<(), StartupError> {
        if self.check(FailAt::Select) {
            return Err(StartupError::SelectionFailed(device.serial.clone()));
        }
        self.record(DeviceOp::Select(device.serial.clone()));
        Ok(())
    }

    fn configure(
        &mut self,
        device: &DeviceDescriptor,
        settings: &DeviceSettings,
        sink: Arc<dyn SampleSink>,
    ) -> Result<Box<dyn RadioDevice>, StartupError> {
        if self.check(FailAt::ParamsFetch) {
            return Err(StartupError::ParamsFetchFailed(device.serial.clone()));
        }
        if self.check(FailAt::ParamsNull) {
            return Err(StartupError::ParamsNull);
        }
        if self.check(FailAt::Init) {
            return Err(StartupError::InitFailed("tuner did not lock".into()));
        }
        self.record(DeviceOp::Configure(settings.sample_rate));
        debug!("Simulated {} configured: {:?}", device.model(), settings);

        Ok(Box::new(SimulatedDevice {
            model: device.model(),
            journal: Arc::clone(&self.journal),
            rejected: self.rejected.clone(),
            sink,
            stream: self.stream,
            sample_rate: Arc::new(AtomicU32::new(settings.sample_rate)),
            streaming: Arc::new(AtomicBool::new(false)),
            handle: None,
        }))
    }

    fn release_device(&mut self) {
        self.record(DeviceOp::ReleaseDevice);
    }

    fn close(&mut self) {
        self.record(DeviceOp::Close);
    }

    fn release_library(&mut self) {
        self.record(DeviceOp::ReleaseLibrary);
    }
}

/// Configured simulated receiver
struct SimulatedDevice {
    model: RspModel,
    journal: Journal,
    rejected: Vec<&'static str>,
    sink: Arc<dyn SampleSink>,
    stream: bool,
    sample_rate: Arc<AtomicU32>,
    streaming: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedDevice {
    fn apply(&self, op: DeviceOp) -> bool {
        let accepted = !self.rejected.contains(&op.name());
        if !accepted {
            warn!("Simulated device rejected {}", op.name());
        }
        self.journal.lock().push(op);
        accepted
    }

    fn start_stream(&mut self) {
        if !self.stream || self.handle.is_some() {
            return;
        }

        self.streaming.store(true, Ordering::Release);
        let streaming = Arc::clone(&self.streaming);
        let sample_rate = Arc::clone(&self.sample_rate);
        let sink = Arc::clone(&self.sink);
        let amplitude = f32::from(1u16 << (self.model.bit_depth() - 2));

        let spawned = thread::Builder::new()
            .name("sdr-sim-stream".into())
            .spawn(move || {
                let mut phase = 0.0f32;
                let mut batch = Vec::new();
                let mut reset = true;

                while streaming.load(Ordering::Acquire) {
                    let rate = sample_rate.load(Ordering::Relaxed).max(1);
                    let count = (rate / 100) as usize;
                    let step = TAU * TONE_OFFSET_HZ / rate as f32;

                    batch.clear();
                    for _ in 0..count {
                        batch.push(IqSample::new(
                            (phase.cos() * amplitude) as i16,
                            (phase.sin() * amplitude) as i16,
                        ));
                        phase = (phase + step) % TAU;
                    }
                    sink.on_samples(&batch, reset);
                    reset = false;

                    thread::sleep(CALLBACK_PERIOD);
                }
            });

        match spawned {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => {
                warn!("Failed to start simulated stream: {}", e);
                self.streaming.store(false, Ordering::Release);
            }
        }
    }

    fn stop_stream(&mut self) {
        self.streaming.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl RadioDevice for SimulatedDevice {
    fn restart(&mut self, frequency: u32) -> bool {
        if !self.apply(DeviceOp::Restart(frequency)) {
            return false;
        }
        self.start_stream();
        true
    }

    fn set_vfo(&mut self, frequency: u32) -> bool {
        self.apply(DeviceOp::SetVfo(frequency))
    }

    fn set_sample_rate(&mut self, rate: u32) -> bool {
        let accepted = self.apply(DeviceOp::SetSampleRate(rate));
        if accepted {
            self.sample_rate.store(rate, Ordering::Relaxed);
        }
        accepted
    }

    fn set_bandwidth(&mut self, bandwidth_khz: u32) -> bool {
        self.apply(DeviceOp::SetBandwidth(bandwidth_khz))
    }

    fn set_grdb(&mut self, grdb: i32) -> bool {
        self.apply(DeviceOp::SetGrdb(grdb))
    }

    fn set_lna(&mut self, state: u8) -> bool {
        self.apply(DeviceOp::SetLna(state))
    }

    fn set_agc(&mut self, setpoint: i32, enabled: bool) -> bool {
        self.apply(DeviceOp::SetAgc { setpoint, enabled })
    }

    fn set_ppm(&mut self, ppm: f64) -> bool {
        self.apply(DeviceOp::SetPpm(ppm))
    }

    fn set_bias_t(&mut self, enabled: bool) -> bool {
        self.apply(DeviceOp::SetBiasT(enabled))
    }

    fn set_notch(&mut self, enabled: bool) -> bool {
        self.apply(DeviceOp::SetNotch(enabled))
    }

    fn set_antenna(&mut self, antenna: Antenna) -> bool {
        if !self.model.has_antenna_select() {
            debug!("{} has a single antenna input", self.model);
        }
        self.apply(DeviceOp::SetAntenna(antenna))
    }

    fn set_tuner(&mut self, tuner: u8) -> bool {
        self.apply(DeviceOp::SetTuner(tuner))
    }

    fn uninit(&mut self) {
        self.stop_stream();
        self.journal.lock().push(DeviceOp::Uninit);
        info!("Simulated {} released", self.model);
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

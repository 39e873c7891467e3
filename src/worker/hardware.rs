//! The hardware worker thread.
//!
//! This thread is the only code that ever touches the [`RadioDevice`]: the
//! handle is created inside the thread during startup and never leaves it.
//! Everyone else reaches the device through a [`Dispatcher`].

use crossbeam_channel::{bounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::command::{Command, Envelope};
use super::dispatcher::{self, CommandQueue, Dispatcher, QueueEvent, WorkerShared};
use super::lifecycle::{DeviceState, WorkerState};
use crate::config::WorkerConfig;
use crate::constants::{MIN_API_VERSION, VERSION_TAG};
use crate::device::{DeviceApi, DeviceInfo, DeviceSettings, RadioDevice, SampleSink};
use crate::error::StartupError;
use crate::errorlog::ErrorLog;
use crate::sample::{SampleCodec, SamplePipeline};

/// Handle to a running hardware worker
pub struct HardwareWorker {
    dispatcher: Dispatcher,
    shared: Arc<WorkerShared>,
    info: DeviceInfo,
    handle: Option<JoinHandle<()>>,
}

impl HardwareWorker {
    /// Spawn the worker and wait until the device is running or startup
    /// has failed.
    pub fn start(
        api: Box<dyn DeviceApi>,
        settings: DeviceSettings,
        pipeline: Arc<SamplePipeline>,
        error_log: Arc<ErrorLog>,
        config: &WorkerConfig,
    ) -> Result<Self, StartupError> {
        let shared = WorkerShared::new();
        let (dispatcher, queue) = dispatcher::channel(Arc::clone(&shared), config.command_timeout());
        let (ready_tx, ready_rx) = bounded(1);

        let context = WorkerContext {
            shared: Arc::clone(&shared),
            pipeline,
            error_log,
            idle_wait: config.idle_wait(),
        };

        let handle = thread::Builder::new()
            .name("sdr-worker".into())
            .spawn(move || context.run(api, settings, queue, ready_tx))
            .map_err(|e| StartupError::InitFailed(format!("cannot spawn worker: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(info)) => {
                info!("Hardware worker running with {}", info.device_name());
                Ok(Self {
                    dispatcher,
                    shared,
                    info,
                    handle: Some(handle),
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(StartupError::WorkerVanished)
            }
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Last snapshot published by the worker
    pub fn device_state(&self) -> Option<DeviceState> {
        self.shared.device_state()
    }

    pub fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    /// Stop the worker and wait for it to release the hardware.
    /// Commands still queued are abandoned.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.shared.request_stop();
        if handle.join().is_err() {
            error!("Hardware worker panicked");
        }
    }
}

impl Drop for HardwareWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Clears the liveness flag however the thread exits
struct AliveGuard(Arc<WorkerShared>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.mark_dead();
    }
}

/// Which vendor resources have been taken and need releasing
#[derive(Debug, Default)]
struct Acquired {
    library: bool,
    api: bool,
    device: bool,
}

struct WorkerContext {
    shared: Arc<WorkerShared>,
    pipeline: Arc<SamplePipeline>,
    error_log: Arc<ErrorLog>,
    idle_wait: Duration,
}

impl WorkerContext {
    fn run(
        self,
        mut api: Box<dyn DeviceApi>,
        settings: DeviceSettings,
        queue: CommandQueue,
        ready_tx: Sender<Result<DeviceInfo, StartupError>>,
    ) {
        let _alive = AliveGuard(Arc::clone(&self.shared));
        let mut acquired = Acquired::default();

        let (device, info) = match self.startup(api.as_mut(), &settings, &mut acquired) {
            Ok(started) => started,
            Err(e) => {
                error!("Device startup failed (code {}): {}", e.code(), e);
                self.error_log
                    .add(VERSION_TAG, format!("startup error {}: {}", e.code(), e));
                self.shared.transition(WorkerState::Failed(e.code()));
                release(api.as_mut(), &acquired);
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        let state = DeviceState::from_settings(&settings, info.bit_depth, info.denominator);
        self.shared.publish(&state);
        self.shared.transition(WorkerState::Running);
        let _ = ready_tx.send(Ok(info));

        let mut interpreter = Interpreter {
            device,
            state,
            pipeline: Arc::clone(&self.pipeline),
        };
        self.command_loop(&mut interpreter, &queue);

        self.shared.transition(WorkerState::Stopping);
        let abandoned = queue.abandon_pending();
        if abandoned > 0 {
            warn!("Abandoning {} queued commands", abandoned);
        }
        self.pipeline.set_active(false);
        interpreter.device.uninit();
        drop(interpreter);
        release(api.as_mut(), &acquired);
        self.shared.transition(WorkerState::Closed);
        info!("Hardware worker closed");
    }

    fn startup(
        &self,
        api: &mut dyn DeviceApi,
        settings: &DeviceSettings,
        acquired: &mut Acquired,
    ) -> Result<(Box<dyn RadioDevice>, DeviceInfo), StartupError> {
        self.shared.transition(WorkerState::AcquiringLibrary);
        api.acquire_library()?;
        acquired.library = true;

        self.shared.transition(WorkerState::OpeningApi);
        api.open()?;
        acquired.api = true;

        let version = api.api_version()?;
        if version < MIN_API_VERSION {
            return Err(StartupError::VersionMismatch {
                found: version,
                required: MIN_API_VERSION,
            });
        }
        debug!("Vendor API version {:.2}", version);

        self.shared.transition(WorkerState::EnumeratingDevices);
        let devices = api.enumerate()?;
        let descriptor = devices.into_iter().next().ok_or(StartupError::NoDevices)?;

        self.shared.transition(WorkerState::SelectingDevice);
        api.select(&descriptor)?;
        acquired.device = true;

        self.shared.transition(WorkerState::Configuring);
        let info = DeviceInfo::new(&descriptor, version);
        self.pipeline.set_codec(SampleCodec::new(info.bit_depth));
        let sink: Arc<dyn SampleSink> = Arc::clone(&self.pipeline) as Arc<dyn SampleSink>;
        let device = api.configure(&descriptor, settings, sink)?;

        info!(
            "Configured {} ({}-bit, api {:.2})",
            info.device_name(),
            info.bit_depth,
            version
        );
        Ok((device, info))
    }

    fn command_loop(&self, interpreter: &mut Interpreter, queue: &CommandQueue) {
        loop {
            if !self.shared.keep_running() {
                debug!("Stop requested");
                return;
            }
            match queue.recv(self.idle_wait) {
                QueueEvent::Command(envelope) => {
                    interpreter.handle(envelope);
                    self.shared.publish(&interpreter.state);
                }
                QueueEvent::Timeout => {}
                QueueEvent::Closed => {
                    debug!("All dispatchers dropped");
                    return;
                }
            }
        }
    }
}

fn release(api: &mut dyn DeviceApi, acquired: &Acquired) {
    if acquired.device {
        api.release_device();
    }
    if acquired.api {
        api.close();
    }
    if acquired.library {
        api.release_library();
    }
}

/// Executes commands against the device and tracks what was applied
struct Interpreter {
    device: Box<dyn RadioDevice>,
    state: DeviceState,
    pipeline: Arc<SamplePipeline>,
}

impl Interpreter {
    fn handle(&mut self, envelope: Envelope) {
        let result = self.execute(&envelope.command);
        if !result {
            warn!("Device rejected {}", envelope.command.kind());
        }
        envelope.complete(result);
    }

    fn execute(&mut self, command: &Command) -> bool {
        let device = &mut self.device;
        let state = &mut self.state;
        match *command {
            Command::Restart { frequency } => {
                let ok = device.restart(frequency);
                if ok {
                    state.frequency = frequency;
                    self.pipeline.set_active(true);
                }
                ok
            }
            Command::Stop => {
                self.pipeline.set_active(false);
                true
            }
            Command::SetFrequency(frequency) => {
                apply(device.set_vfo(frequency), || state.frequency = frequency)
            }
            Command::SetSampleRate(rate) => {
                apply(device.set_sample_rate(rate), || state.sample_rate = rate)
            }
            Command::SetBandwidth(khz) => {
                apply(device.set_bandwidth(khz), || state.bandwidth_khz = khz)
            }
            Command::SetGainReduction(grdb) => apply(device.set_grdb(grdb), || state.grdb = grdb),
            Command::SetLnaState(lna) => apply(device.set_lna(lna), || state.lna_state = lna),
            Command::SetAgc { enabled, setpoint } => {
                apply(device.set_agc(setpoint, enabled), || {
                    state.agc_enabled = enabled;
                    state.agc_setpoint = setpoint;
                })
            }
            Command::SetPpmCorrection(ppm) => apply(device.set_ppm(ppm), || state.ppm = ppm),
            Command::SetBiasTee(on) => apply(device.set_bias_t(on), || state.bias_t = on),
            Command::SetNotchFilter(on) => apply(device.set_notch(on), || state.notch = on),
            Command::SetAntenna(antenna) => {
                apply(device.set_antenna(antenna), || state.antenna = antenna)
            }
            Command::SetTuner(tuner) => apply(device.set_tuner(tuner), || state.tuner = tuner),
        }
    }
}

/// Record a setting only once the device has accepted it
#[inline]
fn apply(accepted: bool, record: impl FnOnce()) -> bool {
    if accepted {
        record();
    }
    accepted
}

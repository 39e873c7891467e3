//! Client-facing receiver control.
//!
//! Turns high-level requests (tune, change rate, set gain) into worker
//! commands, applies the activation gate and keeps the sample path in step:
//! flushing on retune and swapping the rate converter.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::constants::AGC_SETPOINT_DBFS;
use crate::device::{bandwidth_for, compute_gain, Antenna, DeviceInfo};
use crate::error::DispatchError;
use crate::sample::{RatePlan, SamplePipeline};
use crate::worker::{Command, DeviceState, Dispatcher, HardwareWorker};

/// Operations the streaming session needs from the receiver
pub trait RadioControl: Send + Sync {
    fn set_frequency(&self, frequency: u32) -> bool;
    fn set_sample_rate(&self, rate: u32) -> bool;
    /// Gain in tenths of a dB
    fn set_gain(&self, gain_tenths: u32) -> bool;
    fn set_ppm(&self, ppm: f64) -> bool;
    fn set_agc(&self, enabled: bool) -> bool;
    fn set_bias_t(&self, enabled: bool) -> bool;
}

pub struct RadioController {
    dispatcher: Dispatcher,
    pipeline: Arc<SamplePipeline>,
    info: DeviceInfo,
    last_frequency: AtomicU32,
    worker: Mutex<Option<HardwareWorker>>,
}

impl RadioController {
    pub fn new(worker: HardwareWorker, pipeline: Arc<SamplePipeline>, frequency: u32) -> Self {
        Self {
            dispatcher: worker.dispatcher(),
            info: worker.info().clone(),
            pipeline,
            last_frequency: AtomicU32::new(frequency),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn shared(worker: HardwareWorker, pipeline: Arc<SamplePipeline>, frequency: u32) -> Arc<Self> {
        Arc::new(Self::new(worker, pipeline, frequency))
    }

    /// Submit `command` unless the receiver is stopped and the command needs
    /// it running
    pub fn execute(&self, command: Command) -> Result<(), DispatchError> {
        if !command.allowed_while_inactive() && !self.pipeline.is_active() {
            return Err(DispatchError::Inactive);
        }
        self.dispatcher.call(command)
    }

    fn call(&self, command: Command) -> bool {
        let kind = command.kind();
        match self.execute(command) {
            Ok(()) => true,
            Err(e) => {
                debug!("{} not applied: {}", kind, e);
                false
            }
        }
    }

    /// Start streaming at `frequency`. A running receiver is left alone.
    pub fn restart_reader(&self, frequency: u32) -> bool {
        if self.pipeline.is_active() {
            return true;
        }
        self.last_frequency.store(frequency, Ordering::Relaxed);
        self.pipeline.flush();
        let ok = self.call(Command::Restart { frequency });
        if ok {
            info!("Receiver started at {} Hz", frequency);
        } else {
            warn!("Receiver failed to start at {} Hz", frequency);
        }
        ok
    }

    /// Start streaming and serve `rate` from the first chunk on.
    ///
    /// The receiver is opened at the planned hardware rate; a rate it cannot
    /// run at directly is then put through [`set_sample_rate`](Self::set_sample_rate).
    pub fn start_streaming(&self, frequency: u32, rate: u32) -> bool {
        if !self.restart_reader(frequency) {
            return false;
        }
        if RatePlan::for_request(rate).is_identity() {
            return true;
        }
        self.set_sample_rate(rate)
    }

    pub fn stop_reader(&self) {
        if !self.pipeline.is_active() {
            return;
        }
        self.call(Command::Stop);
        self.pipeline.flush();
        info!("Receiver stopped");
    }

    pub fn set_frequency(&self, frequency: u32) -> bool {
        if !self.pipeline.is_active() {
            return false;
        }
        self.last_frequency.store(frequency, Ordering::Relaxed);
        self.pipeline.flush();
        self.call(Command::SetFrequency(frequency))
    }

    /// Serve `rate` to the client.
    ///
    /// Rates the hardware cannot run at directly are produced by running at
    /// the minimum hardware rate and interpolating down.
    pub fn set_sample_rate(&self, rate: u32) -> bool {
        if !self.pipeline.is_active() {
            return false;
        }
        let plan = RatePlan::for_request(rate);
        let converter = match plan.converter() {
            Ok(converter) => converter,
            Err(e) => {
                warn!("Unusable sample rate {}: {}", rate, e);
                return false;
            }
        };

        // the converter must match what the hardware actually runs at
        if !self.call(Command::SetSampleRate(plan.hardware_rate)) {
            warn!("Receiver refused {} Hz, keeping the current rate", plan.hardware_rate);
            return false;
        }
        let bandwidth_ok = self.call(Command::SetBandwidth(bandwidth_for(rate)));
        self.pipeline.set_converter(converter);
        debug!(
            "Sample rate {} Hz (hardware {} Hz, {})",
            rate,
            plan.hardware_rate,
            if plan.is_identity() { "direct" } else { "interpolated" }
        );
        bandwidth_ok
    }

    /// Map a gain request onto GRdB and LNA state at the current frequency
    pub fn set_gain(&self, gain_tenths: u32) -> bool {
        if !self.pipeline.is_active() {
            return false;
        }
        let frequency = self.last_frequency();
        let setting = compute_gain(self.info.lna_table.as_ref(), frequency, gain_tenths);
        debug!(
            "Gain {} -> GRdB {} LNA {} at {} Hz",
            gain_tenths, setting.grdb, setting.lna_state, frequency
        );
        let grdb_ok = self.call(Command::SetGainReduction(setting.grdb));
        let lna_ok = self.call(Command::SetLnaState(setting.lna_state));
        grdb_ok && lna_ok
    }

    pub fn set_gain_reduction(&self, grdb: i32) -> bool {
        self.call(Command::SetGainReduction(grdb))
    }

    pub fn set_lna_state(&self, state: u8) -> bool {
        self.call(Command::SetLnaState(state))
    }

    pub fn set_agc(&self, enabled: bool) -> bool {
        self.call(Command::SetAgc {
            enabled,
            setpoint: AGC_SETPOINT_DBFS,
        })
    }

    pub fn set_ppm(&self, ppm: f64) -> bool {
        self.call(Command::SetPpmCorrection(ppm))
    }

    pub fn set_bias_t(&self, enabled: bool) -> bool {
        self.call(Command::SetBiasTee(enabled))
    }

    pub fn set_notch(&self, enabled: bool) -> bool {
        self.call(Command::SetNotchFilter(enabled))
    }

    pub fn set_antenna(&self, antenna: Antenna) -> bool {
        self.call(Command::SetAntenna(antenna))
    }

    pub fn set_tuner(&self, tuner: u8) -> bool {
        self.call(Command::SetTuner(tuner))
    }

    pub fn is_active(&self) -> bool {
        self.pipeline.is_active()
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn device_name(&self) -> String {
        self.info.device_name()
    }

    pub fn last_frequency(&self) -> u32 {
        self.last_frequency.load(Ordering::Relaxed)
    }

    pub fn device_state(&self) -> Option<DeviceState> {
        self.worker.lock().as_ref().and_then(|w| w.device_state())
    }

    pub fn pipeline(&self) -> &Arc<SamplePipeline> {
        &self.pipeline
    }

    /// Stop streaming and close the hardware worker
    pub fn shutdown(&self) {
        self.stop_reader();
        if let Some(mut worker) = self.worker.lock().take() {
            worker.shutdown();
        }
    }
}

impl RadioControl for RadioController {
    fn set_frequency(&self, frequency: u32) -> bool {
        RadioController::set_frequency(self, frequency)
    }

    fn set_sample_rate(&self, rate: u32) -> bool {
        RadioController::set_sample_rate(self, rate)
    }

    fn set_gain(&self, gain_tenths: u32) -> bool {
        RadioController::set_gain(self, gain_tenths)
    }

    fn set_ppm(&self, ppm: f64) -> bool {
        RadioController::set_ppm(self, ppm)
    }

    fn set_agc(&self, enabled: bool) -> bool {
        RadioController::set_agc(self, enabled)
    }

    fn set_bias_t(&self, enabled: bool) -> bool {
        RadioController::set_bias_t(self, enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::device::{DeviceOp, DeviceSettings, RspModel, SimulatedApi};
    use crate::device::simulated::Journal;
    use crate::errorlog::ErrorLog;
    use crate::sample::create_shared_buffer;

    fn controller(model: RspModel) -> (RadioController, Journal) {
        controller_with(SimulatedApi::new(model), DeviceSettings::default())
    }

    fn controller_with(api: SimulatedApi, settings: DeviceSettings) -> (RadioController, Journal) {
        let api = api.without_stream();
        let journal = api.journal();
        let pipeline = SamplePipeline::shared(create_shared_buffer(1 << 16), 14, 2048);
        let worker = HardwareWorker::start(
            Box::new(api),
            settings,
            Arc::clone(&pipeline),
            Arc::new(ErrorLog::new()),
            &WorkerConfig {
                command_timeout_ms: 50,
                idle_wait_ms: 10,
            },
        )
        .unwrap();
        (RadioController::new(worker, pipeline, 2_200_000), journal)
    }

    fn ops_after_startup(journal: &Journal) -> Vec<DeviceOp> {
        let ops = journal.lock();
        let start = ops
            .iter()
            .position(|op| matches!(op, DeviceOp::Configure(_)))
            .map(|i| i + 1)
            .unwrap_or(0);
        ops[start..].to_vec()
    }

    #[test]
    fn test_gate_rejects_tuning_while_stopped() {
        let (radio, journal) = controller(RspModel::Rsp1A);
        assert!(!radio.set_frequency(100_000_000));
        assert!(!radio.set_sample_rate(2_048_000));
        assert!(!radio.set_gain(300));
        assert!(!radio.set_agc(true));
        assert!(ops_after_startup(&journal).is_empty());
    }

    #[test]
    fn test_gate_passes_ppm_bias_notch_while_stopped() {
        let (radio, journal) = controller(RspModel::Rsp1A);
        assert!(radio.set_ppm(-2.0));
        assert!(radio.set_bias_t(true));
        assert!(radio.set_notch(true));
        assert_eq!(
            ops_after_startup(&journal),
            vec![
                DeviceOp::SetPpm(-2.0),
                DeviceOp::SetBiasT(true),
                DeviceOp::SetNotch(true)
            ]
        );
    }

    #[test]
    fn test_restart_is_idempotent() {
        let (radio, journal) = controller(RspModel::Rsp1A);
        assert!(radio.restart_reader(100_000_000));
        assert!(radio.restart_reader(200_000_000));
        assert_eq!(radio.last_frequency(), 100_000_000);
        assert_eq!(
            ops_after_startup(&journal),
            vec![DeviceOp::Restart(100_000_000)]
        );
    }

    #[test]
    fn test_low_rate_runs_hardware_at_minimum() {
        let (radio, journal) = controller(RspModel::Rsp1A);
        radio.restart_reader(100_000_000);
        assert!(radio.set_sample_rate(1_024_000));
        assert!(!radio.pipeline().converter_is_passthrough());

        let ops = ops_after_startup(&journal);
        assert_eq!(
            &ops[1..],
            &[DeviceOp::SetSampleRate(2_000_000), DeviceOp::SetBandwidth(600)]
        );

        assert!(radio.set_sample_rate(2_400_000));
        assert!(radio.pipeline().converter_is_passthrough());
    }

    #[test]
    fn test_refused_rate_keeps_converter() {
        let api = SimulatedApi::new(RspModel::Rsp1A).rejecting("set_sample_rate");
        let (radio, journal) = controller_with(api, DeviceSettings::default());
        radio.restart_reader(100_000_000);
        assert!(!radio.set_sample_rate(1_024_000));
        assert!(radio.pipeline().converter_is_passthrough());
        assert!(!ops_after_startup(&journal)
            .iter()
            .any(|op| matches!(op, DeviceOp::SetBandwidth(_))));
    }

    #[test]
    fn test_low_startup_rate_goes_through_rate_policy() {
        let settings = crate::config::DeviceConfig {
            sample_rate_hz: 1_024_000,
            ..Default::default()
        }
        .settings();
        assert_eq!(settings.sample_rate, 2_000_000);

        let (radio, journal) = controller_with(SimulatedApi::new(RspModel::Rsp1A), settings);
        assert!(radio.start_streaming(100_000_000, 1_024_000));
        assert!(!radio.pipeline().converter_is_passthrough());
        assert_eq!(
            ops_after_startup(&journal),
            vec![
                DeviceOp::Restart(100_000_000),
                DeviceOp::SetSampleRate(2_000_000),
                DeviceOp::SetBandwidth(600)
            ]
        );
    }

    #[test]
    fn test_direct_startup_rate_sends_nothing_extra() {
        let (radio, journal) = controller(RspModel::Rsp1A);
        assert!(radio.start_streaming(100_000_000, 2_048_000));
        assert!(radio.pipeline().converter_is_passthrough());
        assert_eq!(
            ops_after_startup(&journal),
            vec![DeviceOp::Restart(100_000_000)]
        );
    }

    #[test]
    fn test_gain_uses_last_frequency() {
        let (radio, journal) = controller(RspModel::Rsp1A);
        radio.restart_reader(100_000_000);
        assert!(radio.set_gain(0));

        let ops = ops_after_startup(&journal);
        assert_eq!(&ops[1..], &[DeviceOp::SetGrdb(46), DeviceOp::SetLna(9)]);
    }

    #[test]
    fn test_agc_uses_fixed_setpoint() {
        let (radio, journal) = controller(RspModel::Rsp2);
        radio.restart_reader(100_000_000);
        assert!(radio.set_agc(true));
        assert_eq!(
            ops_after_startup(&journal).last(),
            Some(&DeviceOp::SetAgc {
                setpoint: -30,
                enabled: true
            })
        );
    }

    #[test]
    fn test_execute_reports_why() {
        let (radio, _journal) = controller(RspModel::Rsp1A);
        assert_eq!(
            radio.execute(Command::SetTuner(2)),
            Err(DispatchError::Inactive)
        );
        assert_eq!(radio.execute(Command::SetNotchFilter(true)), Ok(()));
    }

    #[test]
    fn test_shutdown_stops_everything() {
        let (radio, _journal) = controller(RspModel::Rsp1A);
        radio.restart_reader(100_000_000);
        radio.shutdown();
        assert!(!radio.is_active());
        assert!(!radio.set_ppm(1.0));
        assert_eq!(
            radio.execute(Command::SetBiasTee(false)),
            Err(DispatchError::WorkerGone)
        );
    }
}

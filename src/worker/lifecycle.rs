//! Worker lifecycle states and the device record the worker owns

use std::fmt;

use crate::device::{Antenna, DeviceSettings};

/// Where the hardware worker is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    AcquiringLibrary,
    OpeningApi,
    EnumeratingDevices,
    SelectingDevice,
    Configuring,
    Running,
    Stopping,
    Closed,
    /// Startup failed; carries the startup error code
    Failed(u8),
}

impl WorkerState {
    /// Successor on the startup path, `None` once startup is over
    pub fn next_startup_step(self) -> Option<WorkerState> {
        use WorkerState::*;
        match self {
            Idle => Some(AcquiringLibrary),
            AcquiringLibrary => Some(OpeningApi),
            OpeningApi => Some(EnumeratingDevices),
            EnumeratingDevices => Some(SelectingDevice),
            SelectingDevice => Some(Configuring),
            Configuring => Some(Running),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        match (self, next) {
            (Running, Stopping) | (Stopping, Closed) => true,
            (Failed(_), _) | (Closed, _) => false,
            // any startup step may fail
            (from, Failed(_)) => from.is_starting(),
            (from, to) => from.next_startup_step() == Some(to),
        }
    }

    pub fn is_starting(self) -> bool {
        self.next_startup_step().is_some()
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Failed(code) => write!(f, "Failed({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Device settings as last applied by the worker.
///
/// Only the worker thread writes this; others see published snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub frequency: u32,
    pub sample_rate: u32,
    pub bandwidth_khz: u32,
    pub grdb: i32,
    pub lna_state: u8,
    pub agc_enabled: bool,
    pub agc_setpoint: i32,
    pub ppm: f64,
    pub bias_t: bool,
    pub notch: bool,
    pub antenna: Antenna,
    pub tuner: u8,
    pub bit_depth: u8,
    pub denominator: f32,
}

impl DeviceState {
    pub fn from_settings(settings: &DeviceSettings, bit_depth: u8, denominator: f32) -> Self {
        Self {
            frequency: settings.frequency,
            sample_rate: settings.sample_rate,
            bandwidth_khz: crate::device::bandwidth_for(settings.sample_rate),
            grdb: settings.grdb,
            lna_state: settings.lna_state,
            agc_enabled: settings.agc,
            agc_setpoint: crate::constants::AGC_SETPOINT_DBFS,
            ppm: settings.ppm,
            bias_t: settings.bias_t,
            notch: settings.notch,
            antenna: settings.antenna,
            tuner: settings.tuner,
            bit_depth,
            denominator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkerState::*;

    #[test]
    fn test_startup_path() {
        let mut state = Idle;
        let mut path = vec![state];
        while let Some(next) = state.next_startup_step() {
            assert!(state.can_transition_to(next));
            state = next;
            path.push(state);
        }
        assert_eq!(
            path,
            vec![
                Idle,
                AcquiringLibrary,
                OpeningApi,
                EnumeratingDevices,
                SelectingDevice,
                Configuring,
                Running
            ]
        );
    }

    #[test]
    fn test_failure_is_terminal() {
        assert!(OpeningApi.can_transition_to(Failed(3)));
        assert!(!Running.can_transition_to(Failed(3)));
        assert!(!Failed(3).can_transition_to(Idle));
        assert!(!Failed(7).can_transition_to(Stopping));
    }

    #[test]
    fn test_shutdown_path() {
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Running));
        assert!(!Idle.can_transition_to(Running));
    }
}

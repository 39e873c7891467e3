//! Command protocol between caller threads and the hardware worker

use crossbeam_channel::Sender;

use crate::device::Antenna;

/// One request for the hardware worker
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Restart { frequency: u32 },
    Stop,
    SetFrequency(u32),
    SetSampleRate(u32),
    /// Bandwidth in kHz
    SetBandwidth(u32),
    SetGainReduction(i32),
    SetLnaState(u8),
    /// `setpoint` is in dBFS
    SetAgc { enabled: bool, setpoint: i32 },
    SetPpmCorrection(f64),
    SetBiasTee(bool),
    SetNotchFilter(bool),
    SetAntenna(Antenna),
    SetTuner(u8),
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Restart { .. } => "restart",
            Command::Stop => "stop",
            Command::SetFrequency(_) => "set_frequency",
            Command::SetSampleRate(_) => "set_sample_rate",
            Command::SetBandwidth(_) => "set_bandwidth",
            Command::SetGainReduction(_) => "set_gain_reduction",
            Command::SetLnaState(_) => "set_lna_state",
            Command::SetAgc { .. } => "set_agc",
            Command::SetPpmCorrection(_) => "set_ppm_correction",
            Command::SetBiasTee(_) => "set_bias_tee",
            Command::SetNotchFilter(_) => "set_notch_filter",
            Command::SetAntenna(_) => "set_antenna",
            Command::SetTuner(_) => "set_tuner",
        }
    }

    /// Whether the command may run while the receiver is stopped.
    ///
    /// Restart and Stop drive activation themselves. PPM, bias-tee and notch
    /// are accepted at any time; everything else needs a running receiver.
    pub fn allowed_while_inactive(&self) -> bool {
        matches!(
            self,
            Command::Restart { .. }
                | Command::Stop
                | Command::SetPpmCorrection(_)
                | Command::SetBiasTee(_)
                | Command::SetNotchFilter(_)
        )
    }
}

/// A queued command together with its single-use completion signal
#[derive(Debug)]
pub struct Envelope {
    pub command: Command,
    reply: Sender<bool>,
}

impl Envelope {
    pub fn new(command: Command, reply: Sender<bool>) -> Self {
        Self { command, reply }
    }

    /// Release the caller with the command's result. Consumes the envelope
    /// so the signal fires at most once.
    pub fn complete(self, result: bool) {
        // the caller may have given up waiting
        let _ = self.reply.send(result);
    }
}

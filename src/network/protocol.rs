//! Inbound command framing.
//!
//! Every command is five bytes: an opcode followed by a big-endian 32-bit
//! argument. Unknown opcodes still occupy five bytes, so the stream stays
//! framed whatever the client sends.

use bytes::{Buf, BytesMut};

/// Bytes per inbound command frame
pub const FRAME_LEN: usize = 5;

/// One decoded client command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireCommand {
    /// 0x01, Hz
    SetFrequency(u32),
    /// 0x02, Hz
    SetSampleRate(u32),
    /// 0x03; accepted, no effect
    SetGainMode(u32),
    /// 0x04, tenths of a dB
    SetGain(u32),
    /// 0x05, ppm as a signed value
    SetFrequencyCorrection(i32),
    /// 0x06; accepted, no effect
    SetIfGain { stage: u16, gain: u16 },
    /// 0x07; accepted, no effect
    SetTestMode(u32),
    /// 0x08, non-zero enables
    SetAgc(u32),
    /// 0x09; accepted, no effect
    SetDirectSampling(u32),
    /// 0x0a; accepted, no effect
    SetOffsetTuning(u32),
    /// 0x0d; accepted, no effect
    SetGainByIndex(u32),
    /// 0x0e
    SetBiasTee(bool),
    Unknown { opcode: u8, argument: u32 },
}

impl WireCommand {
    pub fn parse(opcode: u8, argument: u32) -> Self {
        match opcode {
            0x01 => WireCommand::SetFrequency(argument),
            0x02 => WireCommand::SetSampleRate(argument),
            0x03 => WireCommand::SetGainMode(argument),
            0x04 => WireCommand::SetGain(argument),
            0x05 => WireCommand::SetFrequencyCorrection(argument as i32),
            0x06 => WireCommand::SetIfGain {
                stage: (argument >> 16) as u16,
                gain: argument as u16,
            },
            0x07 => WireCommand::SetTestMode(argument),
            0x08 => WireCommand::SetAgc(argument),
            0x09 => WireCommand::SetDirectSampling(argument),
            0x0a => WireCommand::SetOffsetTuning(argument),
            0x0d => WireCommand::SetGainByIndex(argument),
            0x0e => WireCommand::SetBiasTee(argument != 0),
            opcode => WireCommand::Unknown { opcode, argument },
        }
    }

    /// Encode as a frame, as a client would send it
    pub fn to_frame(&self) -> [u8; FRAME_LEN] {
        let (opcode, argument) = match *self {
            WireCommand::SetFrequency(v) => (0x01, v),
            WireCommand::SetSampleRate(v) => (0x02, v),
            WireCommand::SetGainMode(v) => (0x03, v),
            WireCommand::SetGain(v) => (0x04, v),
            WireCommand::SetFrequencyCorrection(v) => (0x05, v as u32),
            WireCommand::SetIfGain { stage, gain } => {
                (0x06, (u32::from(stage) << 16) | u32::from(gain))
            }
            WireCommand::SetTestMode(v) => (0x07, v),
            WireCommand::SetAgc(v) => (0x08, v),
            WireCommand::SetDirectSampling(v) => (0x09, v),
            WireCommand::SetOffsetTuning(v) => (0x0a, v),
            WireCommand::SetGainByIndex(v) => (0x0d, v),
            WireCommand::SetBiasTee(on) => (0x0e, u32::from(on)),
            WireCommand::Unknown { opcode, argument } => (opcode, argument),
        };
        let arg = argument.to_be_bytes();
        [opcode, arg[0], arg[1], arg[2], arg[3]]
    }
}

/// Incremental decoder; bytes of a frame split across reads are held until
/// the rest arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Next complete frame, if one is buffered
    pub fn next_command(&mut self) -> Option<WireCommand> {
        if self.pending.len() < FRAME_LEN {
            return None;
        }
        let opcode = self.pending.get_u8();
        let argument = self.pending.get_u32();
        Some(WireCommand::parse(opcode, argument))
    }

    /// Feed `data` and return every frame it completes
    pub fn decode(&mut self, data: &[u8]) -> Vec<WireCommand> {
        self.extend(data);
        std::iter::from_fn(|| self.next_command()).collect()
    }

    /// Bytes of an incomplete frame still waiting
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_set_frequency_frame() {
        let mut decoder = FrameDecoder::new();
        let commands = decoder.decode(&[0x01, 0x00, 0x0F, 0x42, 0x40]);
        assert_eq!(commands, vec![WireCommand::SetFrequency(1_000_000)]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_unknown_opcode_consumes_whole_frame() {
        let mut decoder = FrameDecoder::new();
        let commands = decoder.decode(&[0x42, 0xde, 0xad, 0xbe, 0xef, 0x0e, 0, 0, 0, 1]);
        assert_eq!(
            commands,
            vec![
                WireCommand::Unknown {
                    opcode: 0x42,
                    argument: 0xdeadbeef
                },
                WireCommand::SetBiasTee(true)
            ]
        );
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode(&[0x02, 0x00]).is_empty());
        assert_eq!(decoder.pending(), 2);
        assert_eq!(
            decoder.decode(&[0x1f, 0x40, 0x00, 0x04]),
            vec![WireCommand::SetSampleRate(0x001f_4000)]
        );
        assert_eq!(decoder.pending(), 1);
    }

    #[test]
    fn test_if_gain_splits_argument() {
        assert_eq!(
            WireCommand::parse(0x06, 0x0003_0010),
            WireCommand::SetIfGain { stage: 3, gain: 16 }
        );
    }

    #[test]
    fn test_negative_ppm() {
        let frame = WireCommand::SetFrequencyCorrection(-12).to_frame();
        assert_eq!(frame, [0x05, 0xff, 0xff, 0xff, 0xf4]);
        assert_eq!(
            FrameDecoder::new().decode(&frame),
            vec![WireCommand::SetFrequencyCorrection(-12)]
        );
    }

    proptest! {
        #[test]
        fn prop_frames_survive_arbitrary_splits(
            frames in proptest::collection::vec((any::<u8>(), any::<u32>()), 1..20),
            cut in 1usize..7,
        ) {
            let bytes: Vec<u8> = frames
                .iter()
                .flat_map(|&(op, arg)| WireCommand::parse(op, arg).to_frame())
                .collect();

            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            for piece in bytes.chunks(cut) {
                decoded.extend(decoder.decode(piece));
            }

            prop_assert_eq!(decoded.len(), frames.len());
            prop_assert_eq!(decoder.pending(), 0);
            for (command, &(op, arg)) in decoded.iter().zip(&frames) {
                prop_assert_eq!(*command, WireCommand::parse(op, arg));
            }
        }
    }
}

//! Hardware sample words to the 8-bit unsigned wire format
//!
//! The receiver delivers signed samples whose useful range depends on the
//! model's ADC depth. Clients expect offset-binary bytes centred at 128, one
//! byte for I and one for Q.

use super::{IqSample, WireSample};

/// Centre of the unsigned wire range
pub const WIRE_ZERO: u8 = 128;

/// Stateless converter from a known bit depth to wire bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleCodec {
    bit_depth: u8,
    shift: u32,
}

impl SampleCodec {
    /// Create a codec for samples that span `bit_depth` bits including sign.
    ///
    /// Depths below 8 are treated as 8 (no shift).
    pub fn new(bit_depth: u8) -> Self {
        Self {
            bit_depth,
            shift: u32::from(bit_depth.saturating_sub(8)),
        }
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    /// Convert one signed component.
    ///
    /// Non-negative values keep their top 7 magnitude bits above 128. Negative
    /// values are negated, shifted, and the low 7 bits of the two's complement
    /// of that magnitude are used as-is, landing below 128.
    #[inline]
    pub fn encode_component(&self, value: i16) -> u8 {
        let value = i32::from(value);
        if value >= 0 {
            ((value >> self.shift) & 0x7F) as u8 + WIRE_ZERO
        } else {
            let magnitude = (-value) >> self.shift;
            ((-magnitude) & 0x7F) as u8
        }
    }

    #[inline]
    pub fn encode(&self, sample: IqSample) -> WireSample {
        WireSample::new(self.encode_component(sample.re), self.encode_component(sample.im))
    }
}

/// Append wire samples to `out` as `I, Q, I, Q, ...`
pub fn interleave_into(samples: &[WireSample], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for sample in samples {
        out.push(sample.re);
        out.push(sample.im);
    }
}

//! Sample path: format codec, rate conversion, buffering

pub mod buffer;
pub mod codec;
pub mod converter;
pub mod pipeline;

use num_complex::Complex;

/// Complex sample as delivered by the hardware
pub type IqSample = Complex<i16>;

/// Complex sample in the unsigned 8-bit wire format
pub type WireSample = Complex<u8>;

pub use buffer::{create_shared_buffer, SampleBuffer, SharedSampleBuffer};
pub use codec::SampleCodec;
pub use converter::{Interpolator, RateConverter, RatePlan};
pub use pipeline::SamplePipeline;

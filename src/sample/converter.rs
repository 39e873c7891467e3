//! Sample-rate conversion between the hardware output rate and the rate the
//! client asked for.
//!
//! The receiver cannot run below 2 MHz, so lower client rates are produced by
//! running the hardware at 2 MHz and interpolating down. Conversion works in
//! blocks of one millisecond: `inrate / 1000` input samples become
//! `outrate / 1000` output samples.

use super::IqSample;
use crate::error::ConverterError;

/// Lowest rate the hardware is asked to run at
pub const MIN_HARDWARE_RATE: u32 = 2_000_000;

/// Samples per millisecond block at `rate`
#[inline]
fn block_len(rate: u32) -> usize {
    (rate / 1000) as usize
}

/// Hardware rate and converter output for one client request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePlan {
    pub hardware_rate: u32,
    pub output_rate: u32,
}

impl RatePlan {
    /// Choose how to serve a requested client rate
    pub fn for_request(requested: u32) -> Self {
        if requested >= MIN_HARDWARE_RATE {
            Self {
                hardware_rate: requested,
                output_rate: requested,
            }
        } else {
            Self {
                hardware_rate: MIN_HARDWARE_RATE,
                output_rate: requested,
            }
        }
    }

    pub fn is_identity(&self) -> bool {
        self.hardware_rate == self.output_rate
    }

    /// Build a fresh converter for this plan
    pub fn converter(&self) -> Result<RateConverter, ConverterError> {
        RateConverter::new(self.hardware_rate, self.output_rate)
    }
}

/// Linear-interpolation downsampler.
///
/// Output lags input by one full block. The last input sample of each block
/// seeds the next so interpolation is continuous across block boundaries.
#[derive(Debug, Clone)]
pub struct Interpolator {
    inrate: u32,
    outrate: u32,
    in_block: usize,
    /// Per output index: the buffered input sample to interpolate from
    bases: Vec<usize>,
    /// Per output index: weight of the sample after `bases[i]`
    weights: Vec<f32>,
    /// `[seed, in_0, .., in_{n-1}]`
    conv: Vec<IqSample>,
    conv_index: usize,
    out: Vec<IqSample>,
    out_counter: usize,
}

impl Interpolator {
    pub fn new(inrate: u32, outrate: u32) -> Result<Self, ConverterError> {
        if outrate > inrate {
            return Err(ConverterError::Upsampling { inrate, outrate });
        }
        if block_len(outrate) == 0 {
            return Err(ConverterError::RateTooLow(outrate));
        }

        let in_block = block_len(inrate);
        let out_block = block_len(outrate);

        let mut bases = Vec::with_capacity(out_block);
        let mut weights = Vec::with_capacity(out_block);
        for i in 0..out_block as u64 {
            let position = i * u64::from(inrate);
            let base = (position / u64::from(outrate)) as usize;
            let frac = (position % u64::from(outrate)) as f32 / outrate as f32;
            // Rates that are not whole kHz can push the last position past
            // the buffered block.
            if base >= in_block {
                bases.push(in_block - 1);
                weights.push(1.0);
            } else {
                bases.push(base);
                weights.push(frac);
            }
        }

        Ok(Self {
            inrate,
            outrate,
            in_block,
            bases,
            weights,
            conv: vec![IqSample::new(0, 0); in_block + 1],
            conv_index: 1,
            out: vec![IqSample::new(0, 0); out_block],
            // nothing to emit until the first block is complete
            out_counter: out_block,
        })
    }

    pub fn inrate(&self) -> u32 {
        self.inrate
    }

    pub fn outrate(&self) -> u32 {
        self.outrate
    }

    /// Feed one input sample; returns an output sample when one is due.
    pub fn process(&mut self, input: IqSample) -> Option<IqSample> {
        self.conv[self.conv_index] = input;
        self.conv_index += 1;

        let emitted = if self.out_counter < self.out.len() {
            let sample = self.out[self.out_counter];
            self.out_counter += 1;
            Some(sample)
        } else {
            None
        };

        if self.conv_index > self.in_block {
            self.refill();
        }

        emitted
    }

    fn refill(&mut self) {
        for (i, out) in self.out.iter_mut().enumerate() {
            let base = self.bases[i];
            let ratio = self.weights[i];
            *out = lerp(self.conv[base], self.conv[base + 1], ratio);
        }
        self.conv[0] = self.conv[self.in_block];
        self.conv_index = 1;
        self.out_counter = 0;
    }
}

#[inline]
fn lerp(a: IqSample, b: IqSample, ratio: f32) -> IqSample {
    let mix = |x: i16, y: i16| -> i16 {
        (f32::from(x) * (1.0 - ratio) + f32::from(y) * ratio).round() as i16
    };
    IqSample::new(mix(a.re, b.re), mix(a.im, b.im))
}

/// Converter selected by rate policy
#[derive(Debug, Clone, Default)]
pub enum RateConverter {
    /// Input and output rates match
    #[default]
    Passthrough,
    Interpolate(Box<Interpolator>),
}

impl RateConverter {
    pub fn new(inrate: u32, outrate: u32) -> Result<Self, ConverterError> {
        if inrate == outrate {
            Ok(RateConverter::Passthrough)
        } else {
            Ok(RateConverter::Interpolate(Box::new(Interpolator::new(
                inrate, outrate,
            )?)))
        }
    }

    #[inline]
    pub fn process(&mut self, input: IqSample) -> Option<IqSample> {
        match self {
            RateConverter::Passthrough => Some(input),
            RateConverter::Interpolate(interpolator) => interpolator.process(input),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, RateConverter::Passthrough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ramp(n: usize) -> Vec<IqSample> {
        (0..n)
            .map(|i| IqSample::new((i % 2000) as i16, -((i % 2000) as i16)))
            .collect()
    }

    #[test]
    fn test_rate_plan() {
        let plan = RatePlan::for_request(2_400_000);
        assert_eq!(plan.hardware_rate, 2_400_000);
        assert!(plan.is_identity());

        let plan = RatePlan::for_request(1_024_000);
        assert_eq!(plan.hardware_rate, MIN_HARDWARE_RATE);
        assert_eq!(plan.output_rate, 1_024_000);
        assert!(!plan.is_identity());
    }

    #[test]
    fn test_rejects_upsampling() {
        assert_eq!(
            Interpolator::new(1_000_000, 2_000_000).unwrap_err(),
            ConverterError::Upsampling {
                inrate: 1_000_000,
                outrate: 2_000_000
            }
        );
        assert!(matches!(
            Interpolator::new(2_000_000, 500),
            Err(ConverterError::RateTooLow(500))
        ));
    }

    #[test]
    fn test_half_rate_emits_one_per_two_after_first_block() {
        let mut converter = RateConverter::new(2_000_000, 1_000_000).unwrap();
        let input = ramp(2000 * 5);

        let mut outputs = Vec::new();
        for (i, sample) in input.iter().enumerate() {
            if let Some(out) = converter.process(*sample) {
                assert!(i >= 2000, "output before the first block filled");
                outputs.push(out);
            }
        }
        // first block only primes the converter
        assert_eq!(outputs.len(), 1000 * 4);
    }

    #[test]
    fn test_half_rate_values_come_from_previous_block() {
        let mut interpolator = Interpolator::new(2_000_000, 1_000_000).unwrap();
        let input: Vec<IqSample> = (1..=4000).map(|i| IqSample::new(i as i16, 0)).collect();
        let outputs: Vec<IqSample> = input
            .iter()
            .filter_map(|s| interpolator.process(*s))
            .collect();

        assert_eq!(outputs.len(), 1000);
        // seed of the first block is silence
        assert_eq!(outputs[0], IqSample::new(0, 0));
        // integer ratio: every weight is zero, output i is buffered sample 2i
        assert_eq!(outputs[1], IqSample::new(2, 0));
        assert_eq!(outputs[999], IqSample::new(1998, 0));
    }

    #[test]
    fn test_continuity_across_blocks() {
        let mut interpolator = Interpolator::new(2_000_000, 1_500_000).unwrap();
        let outputs: Vec<IqSample> = (0..6000)
            .map(|_| IqSample::new(1000, -1000))
            .filter_map(|s| interpolator.process(s))
            .collect();
        // after the silent seed of block one, a constant input stays constant
        assert!(outputs[1500..].iter().all(|s| *s == IqSample::new(1000, -1000)));
    }

    #[test]
    fn test_odd_rates_stay_in_bounds() {
        let mut interpolator = Interpolator::new(2_000_500, 1_999_999).unwrap();
        for sample in ramp(10_000) {
            let _ = interpolator.process(sample);
        }
    }

    proptest! {
        #[test]
        fn prop_passthrough_is_identity(values in proptest::collection::vec((any::<i16>(), any::<i16>()), 0..512)) {
            let mut converter = RateConverter::new(2_048_000, 2_048_000).unwrap();
            for (re, im) in values {
                let sample = IqSample::new(re, im);
                prop_assert_eq!(converter.process(sample), Some(sample));
            }
        }

        #[test]
        fn prop_no_overshoot(values in proptest::collection::vec(any::<i16>(), 4000)) {
            let mut interpolator = Interpolator::new(2_000_000, 1_500_000).unwrap();
            let peak = values.iter().map(|v| i32::from(*v).abs()).max().unwrap_or(0);
            for v in values {
                if let Some(out) = interpolator.process(IqSample::new(v, v)) {
                    prop_assert!(i32::from(out.re).abs() <= peak);
                }
            }
        }
    }
}

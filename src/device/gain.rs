//! Abstract gain request to (GRdB, LNA state) mapping

use super::LnaTable;

/// Offset added to the client's gain before mapping
const GAIN_OFFSET: i64 = 20;
/// Lowest total reduction the mapper will produce
const MIN_REDUCTION: i64 = 20;
/// GRdB at or above this moves one more step into the LNA
const GRDB_STEP_THRESHOLD: i32 = 45;

/// Hardware gain parameters derived from one gain request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainSetting {
    pub grdb: i32,
    pub lna_state: u8,
    /// Target reduction in dB; `grdb` plus the LNA's share adds up to this
    pub total_reduction: i32,
}

/// Map a gain in tenths of a dB to a GRdB / LNA state pair at `frequency`.
///
/// The total reduction is split between a coarse GRdB tier and the LNA state
/// closest to the remainder. At most one extra LNA step is taken when GRdB
/// ends up too high.
pub fn compute_gain(table: &dyn LnaTable, frequency: u32, gain_tenths: u32) -> GainSetting {
    let adjusted = i64::from(gain_tenths) + GAIN_OFFSET;
    let reduction = (110 - adjusted / 10).max(MIN_REDUCTION) as i32;

    let tier = if reduction < 40 {
        20
    } else if reduction < 60 {
        30
    } else {
        40
    };

    let mut lna_state = table.lna_state(frequency, reduction - tier);
    let lna_reduction = table.lna_reduction(frequency, lna_state);
    let mut grdb = reduction - lna_reduction;

    if grdb >= GRDB_STEP_THRESHOLD {
        let last = table.state_count(frequency).saturating_sub(1);
        lna_state = (lna_state + 1).min(last);
        grdb -= table.lna_reduction(frequency, lna_state) - lna_reduction;
    }

    GainSetting {
        grdb,
        lna_state,
        total_reduction: reduction,
    }
}

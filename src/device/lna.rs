//! LNA gain-reduction tables per receiver model.
//!
//! Each model splits the tuning range into bands; within a band, LNA state
//! `n` attenuates by `reductions[n]` dB.

use std::fmt::Debug;

use super::RspModel;

/// Lookup from (frequency, LNA state) to front-end attenuation
pub trait LnaTable: Send + Sync + Debug {
    /// LNA state whose reduction is closest to `target_reduction` dB.
    /// Ties go to the lower state.
    fn lna_state(&self, frequency: u32, target_reduction: i32) -> u8;

    /// Reduction in dB of `state` at `frequency`. States past the end of the
    /// band's table clamp to the last state.
    fn lna_reduction(&self, frequency: u32, state: u8) -> i32;

    /// Number of LNA states available at `frequency`
    fn state_count(&self, frequency: u32) -> u8;
}

/// One band of a model's table; applies below `upper_hz`
#[derive(Debug, Clone, Copy)]
pub struct LnaBand {
    pub upper_hz: u32,
    pub reductions: &'static [i32],
}

/// Table backed by static band data
#[derive(Debug, Clone, Copy)]
pub struct StaticLnaTable {
    bands: &'static [LnaBand],
}

impl StaticLnaTable {
    pub const fn new(bands: &'static [LnaBand]) -> Self {
        Self { bands }
    }

    fn band(&self, frequency: u32) -> &'static [i32] {
        self.bands
            .iter()
            .find(|band| frequency < band.upper_hz)
            .or_else(|| self.bands.last())
            .map(|band| band.reductions)
            .unwrap_or(&[0])
    }
}

impl LnaTable for StaticLnaTable {
    fn lna_state(&self, frequency: u32, target_reduction: i32) -> u8 {
        let reductions = self.band(frequency);
        let mut best = 0usize;
        for (state, reduction) in reductions.iter().enumerate() {
            if (reduction - target_reduction).abs() < (reductions[best] - target_reduction).abs() {
                best = state;
            }
        }
        best as u8
    }

    fn lna_reduction(&self, frequency: u32, state: u8) -> i32 {
        let reductions = self.band(frequency);
        let index = usize::from(state).min(reductions.len() - 1);
        reductions[index]
    }

    fn state_count(&self, frequency: u32) -> u8 {
        self.band(frequency).len() as u8
    }
}

const MHZ: u32 = 1_000_000;

static RSP1_BANDS: [LnaBand; 3] = [
    LnaBand { upper_hz: 420 * MHZ, reductions: &[0, 24, 19, 43] },
    LnaBand { upper_hz: 1000 * MHZ, reductions: &[0, 7, 19, 26] },
    LnaBand { upper_hz: u32::MAX, reductions: &[0, 5, 19, 24] },
];

static RSP1A_BANDS: [LnaBand; 4] = [
    LnaBand { upper_hz: 60 * MHZ, reductions: &[0, 6, 12, 18, 37, 42, 61] },
    LnaBand { upper_hz: 420 * MHZ, reductions: &[0, 6, 12, 18, 20, 26, 32, 38, 57, 62] },
    LnaBand { upper_hz: 1000 * MHZ, reductions: &[0, 7, 13, 19, 20, 27, 33, 39, 45, 64] },
    LnaBand { upper_hz: u32::MAX, reductions: &[0, 6, 12, 20, 26, 32, 38, 43, 62] },
];

static RSP2_BANDS: [LnaBand; 3] = [
    LnaBand { upper_hz: 420 * MHZ, reductions: &[0, 10, 15, 21, 24, 34, 39, 45, 64] },
    LnaBand { upper_hz: 1000 * MHZ, reductions: &[0, 7, 10, 17, 22, 41] },
    LnaBand { upper_hz: u32::MAX, reductions: &[0, 5, 15, 21, 32] },
];

static RSPDX_BANDS: [LnaBand; 6] = [
    LnaBand {
        upper_hz: 12 * MHZ,
        reductions: &[0, 3, 6, 9, 12, 15, 18, 21, 24, 25, 27, 30, 33, 36, 39, 42, 45, 48, 51, 54, 57, 60],
    },
    LnaBand {
        upper_hz: 60 * MHZ,
        reductions: &[0, 3, 6, 9, 12, 15, 18, 24, 27, 30, 33, 36, 39, 42, 45, 48, 51, 54, 57, 60],
    },
    LnaBand {
        upper_hz: 250 * MHZ,
        reductions: &[
            0, 3, 6, 9, 12, 15, 24, 27, 30, 33, 36, 39, 42, 45, 48, 51, 54, 57, 60, 63, 66, 69, 72,
            75, 78, 81, 84,
        ],
    },
    LnaBand {
        upper_hz: 420 * MHZ,
        reductions: &[
            0, 3, 6, 9, 12, 15, 18, 24, 27, 30, 33, 36, 39, 42, 45, 48, 51, 54, 57, 60, 63, 66, 69,
            72, 75, 78, 81, 84,
        ],
    },
    LnaBand {
        upper_hz: 1000 * MHZ,
        reductions: &[0, 7, 10, 13, 16, 19, 22, 25, 31, 34, 37, 40, 43, 46, 49, 52, 55, 58, 61, 64, 67],
    },
    LnaBand {
        upper_hz: u32::MAX,
        reductions: &[0, 5, 8, 11, 14, 17, 20, 32, 35, 38, 41, 44, 47, 50, 53, 56, 59, 62, 65],
    },
];

static GENERIC_BANDS: [LnaBand; 1] = [LnaBand { upper_hz: u32::MAX, reductions: &[0, 6, 12, 18] }];

/// Table for a receiver model; unknown hardware gets a four-state table
pub fn table_for(model: RspModel) -> StaticLnaTable {
    match model {
        RspModel::Rsp1 => StaticLnaTable::new(&RSP1_BANDS),
        // the Duo front end matches the 1A
        RspModel::Rsp1A | RspModel::Rsp1B | RspModel::RspDuo => StaticLnaTable::new(&RSP1A_BANDS),
        RspModel::Rsp2 => StaticLnaTable::new(&RSP2_BANDS),
        RspModel::RspDx | RspModel::RspDxR2 => StaticLnaTable::new(&RSPDX_BANDS),
        RspModel::Unknown(_) => StaticLnaTable::new(&GENERIC_BANDS),
    }
}

use crate::masks::{Phase, PhaseMask, CNA_INPUT_COUNT, OVERLAP_COUNT, PHASE_COUNT};
use serde::{Deserialize, Serialize};

/// Per-phase timing parameters, all in tenths of a second except
/// `SecondsPerActuation`, which is the credit (also in tenths) earned per
/// vehicle actuation toward variable initial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TimingParam {
    MinGreen = 0,
    Passage = 1,
    MaxI = 2,
    MaxII = 3,
    Walk = 4,
    PedClear = 5,
    Yellow = 6,
    RedClear = 7,
    SecondsPerActuation = 8,
    TimeToReduce = 9,
    BeforeReduction = 10,
    MinGap = 11,
}

impl TimingParam {
    pub const COUNT: usize = 12;

    pub const ALL: [TimingParam; Self::COUNT] = [
        Self::MinGreen,
        Self::Passage,
        Self::MaxI,
        Self::MaxII,
        Self::Walk,
        Self::PedClear,
        Self::Yellow,
        Self::RedClear,
        Self::SecondsPerActuation,
        Self::TimeToReduce,
        Self::BeforeReduction,
        Self::MinGap,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Raw persisted layout: `[phase][parameter]`.
pub type RawTiming = [[u16; TimingParam::COUNT]; PHASE_COUNT];

/// Factory timing shipped with the controller.
pub const DEFAULT_TIMING: RawTiming = [
    [60, 35, 120, 170, 40, 120, 25, 11, 0, 0, 0, 0],
    [120, 50, 350, 250, 75, 120, 45, 19, 0, 0, 0, 0],
    [40, 35, 140, 170, 60, 150, 20, 11, 0, 0, 0, 0],
    [100, 30, 250, 150, 60, 120, 40, 20, 0, 0, 0, 0],
    [60, 35, 120, 170, 40, 120, 25, 11, 0, 0, 0, 0],
    [120, 50, 350, 250, 75, 120, 45, 19, 0, 0, 0, 0],
    [40, 35, 140, 170, 60, 150, 20, 11, 0, 0, 0, 0],
    [100, 30, 250, 150, 60, 120, 40, 20, 0, 0, 0, 0],
];

pub const DEFAULT_OVERLAPS: [u8; OVERLAP_COUNT] = [0x03, 0x0C, 0x30, 0xC0];
pub const DEFAULT_CNA: [u8; CNA_INPUT_COUNT] = [0xAA, 0xFF];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingTable {
    values: RawTiming,
}

impl TimingTable {
    pub const fn new(values: RawTiming) -> Self {
        Self { values }
    }

    /// Every phase gets the same row.
    pub fn uniform(row: [u16; TimingParam::COUNT]) -> Self {
        Self {
            values: [row; PHASE_COUNT],
        }
    }

    pub fn get(&self, phase: Phase, param: TimingParam) -> u16 {
        self.values[phase.index()][param.index()]
    }

    pub fn set(&mut self, phase: Phase, param: TimingParam, value: u16) {
        self.values[phase.index()][param.index()] = value;
    }

    pub fn raw(&self) -> &RawTiming {
        &self.values
    }
}

impl Default for TimingTable {
    fn default() -> Self {
        Self::new(DEFAULT_TIMING)
    }
}

/// Immutable-per-session configuration handed to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub timing: TimingTable,
    pub overlaps: [PhaseMask; OVERLAP_COUNT],
    pub cna: [PhaseMask; CNA_INPUT_COUNT],
}

impl Configuration {
    /// Wraps persisted tables. Values are taken as-is; plausibility of the
    /// timing is the operator's business.
    pub fn load(
        timing: RawTiming,
        overlaps: [u8; OVERLAP_COUNT],
        cna: [u8; CNA_INPUT_COUNT],
    ) -> Self {
        Self {
            timing: TimingTable::new(timing),
            overlaps: overlaps.map(PhaseMask::from_bits),
            cna: cna.map(PhaseMask::from_bits),
        }
    }

    pub fn timing(&self, phase: Phase, param: TimingParam) -> u16 {
        self.timing.get(phase, param)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::load(DEFAULT_TIMING, DEFAULT_OVERLAPS, DEFAULT_CNA)
    }
}

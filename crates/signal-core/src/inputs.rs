//! Externally supplied input state.
//!
//! Setters never touch the running controller directly. They write into an
//! [`InputState`] that the controller merges at the top of
//! [`Controller::update`](crate::Controller::update), so a step always sees
//! one consistent set of inputs.

use crate::masks::{CnaMask, PhaseMask, RingMask};
use serde::{Deserialize, Serialize};

/// The global controller input word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerInputs(u8);

impl ControllerInputs {
    pub const INTERVAL_ADVANCE: Self = Self(0x01);
    pub const INDICATOR_LAMP_CONTROL: Self = Self(0x02);
    pub const ALL_MIN_RECALL: Self = Self(0x04);
    pub const MANUAL_CONTROL: Self = Self(0x08);
    pub const WALK_REST_MODIFIER: Self = Self(0x10);
    pub const EXTERNAL_START: Self = Self(0x20);
    pub const STOP_TIMING: Self = Self(0x40);
    /// Consumed by the persistence layer, which jitters the timing table.
    pub const RANDOMIZE_TIMING: Self = Self(0x80);

    /// Bits seeded from the persisted unit control byte.
    pub const UNIT_CONTROL_MASK: Self = Self(0x04 | 0x10 | 0x80);

    pub const EMPTY: Self = Self(0);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0 && flag.0 != 0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, flag: Self) {
        self.0 |= flag.0;
    }

    pub fn remove(&mut self, flag: Self) {
        self.0 &= !flag.0;
    }

    pub fn set(&mut self, flag: Self, on: bool) {
        if on {
            self.insert(flag);
        } else {
            self.remove(flag);
        }
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn symmetric_difference(self, other: Self) -> Self {
        Self(self.0 ^ other.0)
    }

    /// Applies a new unit control byte: only the unit-control bits move.
    pub fn apply_unit_control(&mut self, unit_control: u8) {
        let mask = Self::UNIT_CONTROL_MASK.0;
        self.0 = (self.0 & !mask) | (unit_control & mask);
    }
}

/// Per-ring operator controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RingControls {
    pub force_off: RingMask,
    pub stop_timing: RingMask,
    pub inhibit_max_termination: RingMask,
    pub red_rest_mode: RingMask,
    pub ped_recycle: RingMask,
    pub max_ii: RingMask,
    pub omit_red_clear: RingMask,
}

impl RingControls {
    /// Applies the persisted ring control byte. Bit pairs, ring 1 then ring
    /// 2: omit red clear, Max II, ped recycle, red rest.
    pub fn apply_ring_control(&mut self, ring_control: u8) {
        let pair = |shift: u8| RingMask::from_bits((ring_control >> shift) & 0x03);
        self.omit_red_clear = pair(0);
        self.max_ii = pair(2);
        self.ped_recycle = pair(4);
        self.red_rest_mode = pair(6);
    }

    pub fn ring_control_byte(&self) -> u8 {
        self.omit_red_clear.bits()
            | (self.max_ii.bits() << 2)
            | (self.ped_recycle.bits() << 4)
            | (self.red_rest_mode.bits() << 6)
    }
}

/// Everything the outside world can set. Staged, then merged atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    pub vehicle_detector: PhaseMask,
    pub ped_detector: PhaseMask,
    pub hold: PhaseMask,
    pub ped_omit: PhaseMask,
    pub phase_omit: PhaseMask,
    /// Phases whose detector calls lock in after the detector releases.
    pub vehicle_memory: PhaseMask,
    pub rings: RingControls,
    pub call_to_non_actuated: CnaMask,
    pub inputs: ControllerInputs,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            vehicle_detector: PhaseMask::EMPTY,
            ped_detector: PhaseMask::EMPTY,
            hold: PhaseMask::EMPTY,
            ped_omit: PhaseMask::EMPTY,
            phase_omit: PhaseMask::EMPTY,
            vehicle_memory: PhaseMask::ALL,
            rings: RingControls::default(),
            call_to_non_actuated: CnaMask::EMPTY,
            inputs: ControllerInputs::EMPTY,
        }
    }
}

/// Edges accumulated between two steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct InputEdges {
    pub vehicle_detector_change: PhaseMask,
    pub ped_detector_change: PhaseMask,
    pub inputs_change: ControllerInputs,
}

impl InputEdges {
    pub fn accumulate(&mut self, old: &InputState, new: &InputState) {
        self.vehicle_detector_change |= old.vehicle_detector.symmetric_difference(new.vehicle_detector);
        self.ped_detector_change |= old.ped_detector.symmetric_difference(new.ped_detector);
        self.inputs_change = self
            .inputs_change
            .union(old.inputs.symmetric_difference(new.inputs));
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

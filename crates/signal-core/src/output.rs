//! Lamp, status and display outputs derived from controller state.

use crate::masks::{PhaseMask, RING_COUNT};
use crate::overlap::OverlapState;
use crate::ring::{ClearanceReason, Interval, PedInterval, Ring, VariableInitial};
use serde::{Deserialize, Serialize};

/// Front-panel status bits for one ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RingStatus(u16);

impl RingStatus {
    pub const MIN_GREEN: Self = Self(0x0001);
    pub const WALK: Self = Self(0x0002);
    pub const PASSAGE: Self = Self(0x0004);
    pub const MAX: Self = Self(0x0008);
    pub const REST: Self = Self(0x0010);
    pub const PED_CLEAR: Self = Self(0x0020);
    pub const GAP_OUT: Self = Self(0x0040);
    pub const YELLOW: Self = Self(0x0080);
    pub const MAX_OUT: Self = Self(0x0100);
    pub const RED_CLEAR: Self = Self(0x0200);
    pub const REDUCING: Self = Self(0x0400);
    pub const MAX_II: Self = Self(0x0800);
    pub const VARIABLE_INITIAL: Self = Self(0x1000);
    pub const GREEN: Self = Self(0x2000);

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    fn insert_if(&mut self, flag: Self, on: bool) {
        if on {
            self.0 |= flag.0;
        }
    }
}

/// Everything a signal head, front panel or telemetry consumer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalOutput {
    pub red: PhaseMask,
    pub yellow: PhaseMask,
    pub green: PhaseMask,
    pub walk: PhaseMask,
    pub dont_walk: PhaseMask,
    /// Phases in service, any interval.
    pub on: PhaseMask,
    pub next: PhaseMask,
    pub vehicle_call: PhaseMask,
    pub ped_call: PhaseMask,
    pub overlap_state: OverlapState,
    pub ring_status: [RingStatus; RING_COUNT],
    pub display1: [u16; RING_COUNT],
    pub display2: [u16; RING_COUNT],
}

impl SignalOutput {
    fn lamps_differ(&self, other: &Self) -> bool {
        (
            self.red,
            self.yellow,
            self.green,
            self.walk,
            self.dont_walk,
            self.on,
            self.next,
            self.vehicle_call,
            self.ped_call,
            self.overlap_state,
        ) != (
            other.red,
            other.yellow,
            other.green,
            other.walk,
            other.dont_walk,
            other.on,
            other.next,
            other.vehicle_call,
            other.ped_call,
            other.overlap_state,
        )
    }

    fn panel_differs(&self, other: &Self) -> bool {
        self.ring_status != other.ring_status
            || self.display1 != other.display1
            || self.display2 != other.display2
    }
}

/// Change notifications for output consumers, cleared when taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputFlags {
    pub update_pending: bool,
    pub timers_changed: bool,
}

impl OutputFlags {
    /// Raises flags for whatever changed between two outputs.
    pub fn record(&mut self, before: &SignalOutput, after: &SignalOutput) {
        self.update_pending |= before.lamps_differ(after);
        self.timers_changed |= before.panel_differs(after);
    }

    pub fn any(&self) -> bool {
        self.update_pending || self.timers_changed
    }
}

pub(crate) struct ProjectionInput<'a> {
    pub rings: &'a [Ring; RING_COUNT],
    pub variable_initial: &'a [VariableInitial],
    pub reducing: [bool; RING_COUNT],
    pub vehicle_call: PhaseMask,
    pub ped_call: PhaseMask,
    pub overlap_state: OverlapState,
    pub flash: bool,
    pub blank_panel: bool,
}

pub(crate) fn project(input: &ProjectionInput<'_>) -> SignalOutput {
    let mut out = SignalOutput {
        vehicle_call: input.vehicle_call,
        ped_call: input.ped_call,
        overlap_state: input.overlap_state,
        ..SignalOutput::default()
    };

    for (r, ring) in input.rings.iter().enumerate() {
        if let Some(next) = ring.next_phase {
            out.next.insert(next);
        }

        let Some(phase) = ring.phase else {
            continue;
        };
        out.on.insert(phase);

        match ring.interval {
            interval if interval.is_green() => out.green.insert(phase),
            Interval::Yellow => out.yellow.insert(phase),
            _ => {}
        }

        match ring.ped_interval {
            PedInterval::Walk => out.walk.insert(phase),
            PedInterval::PedClear if !input.flash => out.dont_walk.insert(phase),
            _ => {}
        }

        if !input.blank_panel {
            out.ring_status[r] = status(ring, input.variable_initial[phase.index()], input.reducing[r]);
            out.display1[r] = if ring.interval.is_max() {
                ring.max_timer
            } else {
                ring.interval_timer
            };
            out.display2[r] = if ring.ped_interval == PedInterval::Invalid {
                ring.passage_timer
            } else {
                ring.ped_timer
            };
        }
    }

    let clearing = input
        .rings
        .iter()
        .filter(|ring| ring.ped_interval != PedInterval::Invalid)
        .fold(PhaseMask::EMPTY, |mask, ring| mask | ring.phase_mask());
    out.red = out.green.union(out.yellow).complement();
    out.dont_walk |= out.walk.union(clearing).complement();
    out
}

fn status(ring: &Ring, credit: VariableInitial, reducing: bool) -> RingStatus {
    let green = ring.interval.is_green();
    let mut status = RingStatus::default();
    status.insert_if(RingStatus::GREEN, green);
    status.insert_if(RingStatus::MIN_GREEN, ring.interval == Interval::MinGreen);
    status.insert_if(RingStatus::REST, ring.interval == Interval::PreMaxRest);
    status.insert_if(RingStatus::MAX, ring.interval.is_max());
    status.insert_if(RingStatus::MAX_II, ring.interval == Interval::MaxII);
    status.insert_if(RingStatus::YELLOW, ring.interval == Interval::Yellow);
    status.insert_if(RingStatus::RED_CLEAR, ring.interval == Interval::RedClear);
    status.insert_if(RingStatus::PASSAGE, green && ring.passage_timer > 0);
    status.insert_if(RingStatus::REDUCING, reducing);
    status.insert_if(
        RingStatus::VARIABLE_INITIAL,
        ring.interval == Interval::MinGreen && credit == VariableInitial::Spent,
    );
    status.insert_if(RingStatus::WALK, ring.ped_interval == PedInterval::Walk);
    status.insert_if(RingStatus::PED_CLEAR, ring.ped_interval == PedInterval::PedClear);
    status.insert_if(RingStatus::GAP_OUT, ring.clearance_reason == ClearanceReason::GapOut);
    status.insert_if(RingStatus::MAX_OUT, ring.clearance_reason == ClearanceReason::MaxOut);
    status
}

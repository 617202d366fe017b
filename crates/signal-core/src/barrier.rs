//! Barrier synchronization between the two rings.
//!
//! Crossing the barrier is a shared protocol: a ring asks for it
//! (`Requested`), both rings terminate and clear together (`Executing`), and
//! only once both have reached red does either load a phase on the new side.

use crate::controller::Controller;
use crate::error::InvariantViolation;
use crate::inputs::ControllerInputs;
use crate::masks::{PhaseMask, RING_COUNT};
use crate::ring::{BarrierState, Interval, NextStep, PedInterval};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierCrossState {
    #[default]
    NotRequested,
    Requested,
    Executing,
}

impl Controller {
    pub(crate) fn barrier_requested(&self) -> bool {
        self.barrier_cross_state != BarrierCrossState::NotRequested
    }

    pub(crate) fn barrier_executing(&self) -> bool {
        self.barrier_cross_state == BarrierCrossState::Executing
    }

    pub(crate) fn request_barrier_cross(&mut self, r: usize) {
        if self.barrier_cross_state == BarrierCrossState::NotRequested {
            self.barrier_cross_state = BarrierCrossState::Requested;
            log::debug!("ring {} requested barrier cross from side {}", r + 1, self.barrier_side);
        }
    }

    /// Ring timing is frozen, globally or for this ring.
    pub(crate) fn is_stopped(&self, r: usize) -> bool {
        self.applied.inputs.contains(ControllerInputs::STOP_TIMING)
            || self.applied.rings.stop_timing.contains(r)
    }

    /// A stopped ring may only move through the barrier on the release of
    /// interval advance.
    fn may_proceed(&self, r: usize) -> bool {
        !self.is_stopped(r) || self.interval_advance()[r]
    }

    /// Serviceable calls on the other side of the barrier, both rings.
    fn calls_across(&self, side: u8) -> PhaseMask {
        self.serviceable_calls()
            .intersection(PhaseMask::side(1 - side))
    }

    /// Decides where ring `r` goes after its current phase.
    pub(crate) fn resolve_next_phase(&mut self, r: usize) -> NextStep {
        let ring = self.rings[r];
        if let Some(next) = ring.next_phase {
            return self.checked_step(r, NextStep::Phase(next));
        }

        let serviceable = self.serviceable_calls();
        let fallback = if self.applied.rings.red_rest_mode.contains(r) {
            NextStep::RedRest
        } else {
            NextStep::Wait
        };

        if self.barrier_executing() {
            let step = (serviceable & PhaseMask::ring_side(r, self.barrier_side))
                .first()
                .map_or(fallback, NextStep::Phase);
            return self.checked_step(r, step);
        }

        let step = match ring.phase {
            None => {
                let own = serviceable & PhaseMask::ring_side(r, self.barrier_side);
                if self.barrier_requested() {
                    NextStep::CrossBarrier
                } else if let Some(phase) = own.first() {
                    NextStep::Phase(phase)
                } else if !self.calls_across(self.barrier_side).is_empty() {
                    NextStep::CrossBarrier
                } else {
                    fallback
                }
            }
            Some(phase) if phase.is_barrier_phase() => {
                let reservice = serviceable
                    .intersection(PhaseMask::ring_side(r, phase.side()))
                    .difference(PhaseMask::of(phase));
                if !self.calls_across(phase.side()).is_empty() {
                    NextStep::CrossBarrier
                } else if let Some(next) = reservice.first() {
                    self.rings[r].barrier_state = BarrierState::ConditionalReservice;
                    NextStep::Phase(next)
                } else {
                    fallback
                }
            }
            Some(phase) => {
                let forward = crate::masks::Phase::new(phase.number() + 1)
                    .filter(|next| serviceable.contains(*next));
                if let Some(next) = forward {
                    NextStep::Phase(next)
                } else if !self.calls_across(phase.side()).is_empty() {
                    NextStep::CrossBarrier
                } else {
                    fallback
                }
            }
        };

        self.checked_step(r, step)
    }

    fn checked_step(&mut self, r: usize, step: NextStep) -> NextStep {
        match step {
            NextStep::Phase(phase) if phase.ring() != r => {
                self.report(InvariantViolation::NextPhaseUnresolved { ring: r });
                self.rings[r].next_phase = None;
                if self.applied.rings.red_rest_mode.contains(r) {
                    NextStep::RedRest
                } else {
                    NextStep::Wait
                }
            }
            step => step,
        }
    }

    /// Runs once per step, after both rings have advanced.
    pub(crate) fn coordinate_barrier(&mut self) {
        self.attempt_barrier_clear();
        self.attempt_barrier_cross();
    }

    fn attempt_barrier_clear(&mut self) {
        if self.barrier_cross_state != BarrierCrossState::Requested {
            return;
        }

        if self.calls_across(self.barrier_side).is_empty() {
            self.barrier_cross_state = BarrierCrossState::NotRequested;
            log::debug!("barrier request withdrawn, no calls across");
            return;
        }

        let ready = (0..RING_COUNT).all(|r| {
            let ring = &self.rings[r];
            let held = ring
                .phase
                .is_some_and(|phase| self.applied.hold.contains(phase));
            let walking = ring.interval.is_green() && ring.ped_interval != PedInterval::Invalid;
            matches!(
                ring.barrier_state,
                BarrierState::ClearanceReady | BarrierState::CrossReady
            ) && !held
                && !walking
                && self.may_proceed(r)
        });
        if !ready {
            return;
        }

        self.barrier_cross_state = BarrierCrossState::Executing;
        self.barrier_side ^= 1;
        log::debug!("barrier clearing toward side {}", self.barrier_side);

        for r in 0..RING_COUNT {
            self.rings[r].next_phase = None;
            if self.rings[r].interval.is_green() {
                self.clear_to_yellow(r);
            }
        }
    }

    fn attempt_barrier_cross(&mut self) {
        if self.barrier_cross_state != BarrierCrossState::Executing {
            return;
        }

        let ready = (0..RING_COUNT).all(|r| {
            let ring = &self.rings[r];
            ring.barrier_state == BarrierState::CrossReady
                && ring.interval == Interval::Invalid
                && self.may_proceed(r)
        });
        if !ready {
            return;
        }

        self.barrier_cross_state = BarrierCrossState::NotRequested;
        self.barrier_crossings += 1;
        log::debug!("barrier crossed to side {}", self.barrier_side);

        let serviceable = self.serviceable_calls();
        for r in 0..RING_COUNT {
            let side = PhaseMask::ring_side(r, self.barrier_side);
            let next = self.rings[r]
                .next_phase
                .filter(|phase| side.contains(*phase))
                .or_else(|| (serviceable & side).first());
            self.rings[r].next_phase = next;
            if next.is_some() {
                self.load_next_phase(r);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masks::Phase;
    use crate::ring::ClearanceReason;
    use crate::timing::{Configuration, TimingParam};
    use crate::{InputState, InvariantPolicy};

    fn row() -> [u16; TimingParam::COUNT] {
        // min, passage, max1, max2, walk, ped clear, yellow, red clear
        [20, 5, 60, 80, 10, 10, 5, 3, 0, 0, 0, 0]
    }

    fn controller() -> Controller {
        let config = Configuration {
            timing: crate::timing::TimingTable::uniform(row()),
            ..Configuration::default()
        };
        let mut controller = Controller::with_policy(config, InvariantPolicy::Panic);
        controller.initialize(0);
        controller.update(1);
        controller
    }

    fn pulse(controller: &mut Controller, phases: &[u8]) {
        let t = controller.time();
        controller.set_vehicle_detector(PhaseMask::from_phases(phases));
        controller.update(t + 1);
        controller.set_vehicle_detector(PhaseMask::EMPTY);
        controller.update(t + 2);
    }

    #[test]
    fn gap_out_across_the_barrier_clears_both_rings_together() {
        let mut controller = controller();
        pulse(&mut controller, &[3]);
        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::NotRequested);

        // Min green ends at t=21 with passage long expired.
        controller.update(20);
        assert_eq!(controller.ring(0).interval, Interval::MinGreen);
        controller.update(21);

        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::Executing);
        assert_eq!(controller.barrier_side(), 1);
        for r in 0..2 {
            assert_eq!(controller.ring(r).interval, Interval::Yellow);
            assert_eq!(controller.ring(r).clearance_reason, ClearanceReason::GapOut);
        }
    }

    #[test]
    fn cross_loads_the_new_side_only_after_both_reach_red() {
        let mut controller = controller();
        pulse(&mut controller, &[3]);
        controller.update(21);

        // yellow 5 + red clear 3
        controller.update(28);
        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::Executing);
        assert_eq!(controller.ring(0).interval, Interval::RedClear);

        controller.update(29);
        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::NotRequested);
        assert_eq!(controller.ring(0).phase, Phase::new(3));
        assert_eq!(controller.ring(0).interval, Interval::MinGreen);
        assert_eq!(controller.ring(1).phase, None);
        assert_eq!(controller.ring(1).barrier_state, BarrierState::CrossReady);
        assert_eq!(controller.barrier_crossings(), 1);
    }

    #[test]
    fn hold_blocks_the_clear() {
        let mut controller = controller();
        let mut staged = *controller.pending();
        staged.hold = PhaseMask::from_phases(&[5]);
        controller.stage(staged);
        pulse(&mut controller, &[3]);
        controller.update(40);

        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::Requested);
        assert!(controller.ring(1).interval.is_green());
        assert_eq!(controller.ring(0).barrier_state, BarrierState::ClearanceReady);
        assert!(controller.ring(0).interval.is_green());

        controller.stage(InputState {
            hold: PhaseMask::EMPTY,
            ..*controller.pending()
        });
        controller.update(41);
        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::Executing);
    }

    fn advance(controller: &mut Controller) {
        let t = controller.time();
        controller.set_inputs(ControllerInputs::INTERVAL_ADVANCE);
        controller.update(t + 1);
        controller.set_inputs(ControllerInputs::EMPTY);
        controller.update(t + 2);
    }

    #[test]
    fn stopped_ring_crosses_only_on_interval_advance() {
        let mut controller = controller();
        controller.set_hold(PhaseMask::from_phases(&[5]));
        pulse(&mut controller, &[3]);
        controller.update(21);
        assert_eq!(controller.ring(0).barrier_state, BarrierState::ClearanceReady);

        controller.set_stop_timing(crate::masks::RingMask::from_bits(0b01));
        controller.update(30);
        controller.set_hold(PhaseMask::EMPTY);
        controller.update(40);
        assert_eq!(controller.ring(1).barrier_state, BarrierState::ClearanceReady);
        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::Requested);
        assert!(controller.ring(0).interval.is_max());

        // release clears both rings
        advance(&mut controller);
        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::Executing);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        assert_eq!(controller.ring(1).interval, Interval::Yellow);

        controller.update(60);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        assert_eq!(controller.ring(0).interval_timer, 5);
        assert_eq!(controller.ring(1).barrier_state, BarrierState::CrossReady);

        advance(&mut controller);
        assert_eq!(controller.ring(0).interval, Interval::RedClear);
        assert_eq!(controller.barrier_crossings(), 0);

        advance(&mut controller);
        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::NotRequested);
        assert_eq!(controller.barrier_crossings(), 1);
        assert_eq!(controller.ring(0).phase, Phase::new(3));
        assert_eq!(controller.ring(0).interval, Interval::MinGreen);
    }

    #[test]
    fn request_withdrawn_when_the_call_goes_away() {
        let mut controller = controller();
        controller.set_vehicle_memory(PhaseMask::EMPTY);
        controller.set_hold(PhaseMask::from_phases(&[5]));
        controller.set_vehicle_detector(PhaseMask::from_phases(&[3]));
        controller.update(30);
        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::Requested);

        controller.set_vehicle_detector(PhaseMask::EMPTY);
        controller.update(31);
        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::NotRequested);
        assert!(controller.ring(0).interval.is_green());
    }

    #[test]
    fn same_side_call_is_served_without_the_barrier() {
        let mut controller = controller();
        pulse(&mut controller, &[2]);
        controller.update(21);
        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::NotRequested);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        assert_eq!(controller.ring(0).next_phase, Phase::new(2));
        assert!(controller.ring(1).interval.is_green());
    }
}

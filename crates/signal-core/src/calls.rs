//! Call/input aggregation: detectors, recall and CNA folded into the
//! vehicle and pedestrian call masks.

use crate::controller::Controller;
use crate::inputs::ControllerInputs;
use crate::masks::{PhaseMask, RING_COUNT};
use crate::ring::{Interval, PedInterval};
use crate::timing::TimingParam;

impl Controller {
    /// Phases currently timing green.
    pub(crate) fn green_phases(&self) -> PhaseMask {
        self.rings
            .iter()
            .filter(|ring| ring.interval.is_green())
            .fold(PhaseMask::EMPTY, |mask, ring| mask | ring.phase_mask())
    }

    /// Phases currently timing walk.
    pub(crate) fn walking_phases(&self) -> PhaseMask {
        self.rings
            .iter()
            .filter(|ring| ring.ped_interval == PedInterval::Walk)
            .fold(PhaseMask::EMPTY, |mask, ring| mask | ring.phase_mask())
    }

    /// Calls the controller is allowed to act on.
    pub(crate) fn serviceable_calls(&self) -> PhaseMask {
        let ped = self.ped_call.difference(self.applied.ped_omit);
        (self.vehicle_call | ped).difference(self.applied.phase_omit)
    }

    /// A call anywhere that this ring's current phase stands in the way of:
    /// another phase of the ring, or any phase across the barrier.
    pub(crate) fn has_conflicting_call(&self, r: usize) -> bool {
        let ring = &self.rings[r];
        let side = ring.phase.map_or(self.barrier_side, |phase| phase.side());
        let conflicting = PhaseMask::ring(r) | PhaseMask::side(1 - side);
        !self
            .serviceable_calls()
            .intersection(conflicting)
            .difference(ring.phase_mask())
            .is_empty()
    }

    /// Falling edge of interval advance, per ring.
    pub(crate) fn interval_advance(&self) -> [bool; RING_COUNT] {
        let released = self.edges.inputs_change.contains(ControllerInputs::INTERVAL_ADVANCE)
            && !self.applied.inputs.contains(ControllerInputs::INTERVAL_ADVANCE);
        if !released {
            return [false; RING_COUNT];
        }

        let manual = self.applied.inputs.contains(ControllerInputs::MANUAL_CONTROL);
        std::array::from_fn(|r| !(manual && self.rings[r].interval.is_clearance()))
    }

    pub(crate) fn external_start(&self) -> bool {
        self.edges.inputs_change.contains(ControllerInputs::EXTERNAL_START)
            && self.applied.inputs.contains(ControllerInputs::EXTERNAL_START)
    }

    pub(crate) fn aggregate_calls(&mut self) {
        let green = self.green_phases();
        let walking = self.walking_phases();
        let detector = self.applied.vehicle_detector;

        self.vehicle_call |= detector.difference(green);

        let released = self.edges.vehicle_detector_change.difference(detector);
        let non_locking = self.applied.vehicle_memory.complement();
        self.vehicle_call = self
            .vehicle_call
            .difference(released.intersection(non_locking).difference(green));

        let pressed = self
            .edges
            .ped_detector_change
            .intersection(self.applied.ped_detector);
        self.ped_call |= pressed.difference(walking);

        if self.applied.inputs.contains(ControllerInputs::ALL_MIN_RECALL) {
            self.vehicle_call |= green.complement();
            self.ped_call |= walking.complement();
        }
    }

    /// Detector rising edges re-arm the passage timer of the phase in
    /// service.
    pub(crate) fn restart_passage(&mut self) {
        let rising = self.rising_vehicle_detectors();
        for ring in &mut self.rings {
            let extending = matches!(
                ring.interval,
                Interval::MinGreen | Interval::PreMaxRest | Interval::MaxI | Interval::MaxII
            );
            if extending && ring.phase.is_some_and(|phase| rising.contains(phase)) {
                ring.passage_timer = ring.reduced_passage;
            }
        }
    }

    pub(crate) fn accrue_variable_initial(&mut self) {
        let waiting = self.rising_vehicle_detectors().difference(self.green_phases());
        for phase in waiting.phases() {
            let per_actuation = self.config.timing(phase, TimingParam::SecondsPerActuation);
            self.variable_initial[phase.index()].accrue(per_actuation);
        }
    }

    pub(crate) fn inject_non_actuated_calls(&mut self) {
        let enabled = self.applied.call_to_non_actuated;
        let injected = enabled
            .indices()
            .fold(PhaseMask::EMPTY, |mask, i| mask | self.config.cna[i]);
        if injected.is_empty() {
            return;
        }

        self.vehicle_call |= injected;
        self.ped_call |= injected;
        self.vehicle_call = self.vehicle_call.difference(self.green_phases());
        self.ped_call = self.ped_call.difference(self.walking_phases());
    }

    fn rising_vehicle_detectors(&self) -> PhaseMask {
        self.edges
            .vehicle_detector_change
            .intersection(self.applied.vehicle_detector)
    }
}

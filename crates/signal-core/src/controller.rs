//! The controller aggregate and its tick driver.
//!
//! Time is counted in tenths of a second. [`Controller::update`] replays the
//! one-tenth step once per elapsed tick, so calling it every tick or once
//! after a long pause ends in the same state.

use crate::barrier::BarrierCrossState;
use crate::error::{InvariantPolicy, InvariantViolation};
use crate::gap;
use crate::inputs::{ControllerInputs, InputEdges, InputState};
use crate::masks::{CnaMask, Phase, PhaseMask, RingMask, PHASE_COUNT, PHASES_PER_RING, RING_COUNT};
use crate::output::{self, OutputFlags, ProjectionInput, SignalOutput};
use crate::overlap::{self, OverlapState};
use crate::ring::{Ring, VariableInitial};
use crate::timing::Configuration;
use serde::{Deserialize, Serialize};

/// Tenths of a second; wraps.
pub type Tenths = u32;

const FLASH_PERIOD: u8 = 10;

#[derive(Debug, Clone)]
pub struct Controller {
    pub(crate) config: Configuration,
    pub(crate) policy: InvariantPolicy,
    pub(crate) rings: [Ring; RING_COUNT],
    pub(crate) variable_initial: [VariableInitial; PHASE_COUNT],
    pub(crate) vehicle_call: PhaseMask,
    pub(crate) ped_call: PhaseMask,
    /// Inputs the running step sees.
    pub(crate) applied: InputState,
    /// Inputs staged by setters, merged at the top of `update`.
    pending: InputState,
    pub(crate) edges: InputEdges,
    pub(crate) barrier_cross_state: BarrierCrossState,
    pub(crate) barrier_side: u8,
    pub(crate) barrier_crossings: u64,
    flash_timer: u8,
    flash: bool,
    flags: OutputFlags,
    output: SignalOutput,
    time: Tenths,
    tick_count: u64,
    violations: u64,
    last_violation: Option<InvariantViolation>,
}

/// Serializable view of the controller for telemetry and replay checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub time: Tenths,
    pub tick_count: u64,
    pub rings: [Ring; RING_COUNT],
    pub barrier_cross_state: BarrierCrossState,
    pub barrier_side: u8,
    pub barrier_crossings: u64,
    pub output: SignalOutput,
    pub violations: u64,
}

impl Controller {
    pub fn new(config: Configuration) -> Self {
        Self::with_policy(config, InvariantPolicy::default())
    }

    pub fn with_policy(config: Configuration, policy: InvariantPolicy) -> Self {
        let mut controller = Self {
            config,
            policy,
            rings: [Ring::default(); RING_COUNT],
            variable_initial: [VariableInitial::Disabled; PHASE_COUNT],
            vehicle_call: PhaseMask::EMPTY,
            ped_call: PhaseMask::EMPTY,
            applied: InputState::default(),
            pending: InputState::default(),
            edges: InputEdges::default(),
            barrier_cross_state: BarrierCrossState::NotRequested,
            barrier_side: 0,
            barrier_crossings: 0,
            flash_timer: 0,
            flash: false,
            flags: OutputFlags::default(),
            output: SignalOutput::default(),
            time: 0,
            tick_count: 0,
            violations: 0,
            last_violation: None,
        };
        controller.reset_signal_state();
        controller
    }

    /// Clears every input and all signal state, then parks each ring in an
    /// expired red clearance with the first phase of its half up next.
    pub fn initialize(&mut self, now: Tenths) {
        self.applied = InputState::default();
        self.pending = InputState::default();
        self.edges.clear();
        self.barrier_crossings = 0;
        self.tick_count = 0;
        self.reset_signal_state();
        self.time = now;
        log::debug!("controller initialized at {now}");
    }

    fn reset_signal_state(&mut self) {
        self.rings = std::array::from_fn(|r| Ring::starting(Phase::from_index(r * PHASES_PER_RING)));
        self.variable_initial =
            std::array::from_fn(|i| match Phase::from_index(i) {
                Some(phase) => VariableInitial::for_phase(&self.config, phase),
                None => VariableInitial::Disabled,
            });
        self.vehicle_call = PhaseMask::EMPTY;
        self.ped_call = PhaseMask::EMPTY;
        self.barrier_cross_state = BarrierCrossState::NotRequested;
        self.barrier_side = 0;
        self.flash_timer = 0;
        self.flash = false;
        self.project_outputs();
        self.flags = OutputFlags {
            update_pending: true,
            timers_changed: true,
        };
    }

    /// Advances to `now`, one step per elapsed tenth. Returns whether the
    /// clock moved.
    pub fn update(&mut self, now: Tenths) -> bool {
        let staged = self.pending;
        self.edges.accumulate(&self.applied, &staged);
        self.applied = staged;

        let delta = now.wrapping_sub(self.time);
        for _ in 0..delta {
            self.step();
        }
        self.time = now;
        delta != 0
    }

    fn step(&mut self) {
        self.tick_count += 1;

        if self.external_start() {
            log::debug!("external start");
            self.reset_signal_state();
            self.edges.clear();
            return;
        }

        let forced = self.interval_advance();
        self.aggregate_calls();
        for (r, forced) in forced.into_iter().enumerate() {
            self.advance_ring(r, forced);
        }
        self.coordinate_barrier();

        self.flash_timer = (self.flash_timer + 1) % FLASH_PERIOD;
        self.flash = self.flash_timer >= FLASH_PERIOD / 2;

        self.restart_passage();
        self.accrue_variable_initial();
        self.inject_non_actuated_calls();
        self.project_outputs();
        self.edges.clear();
    }

    fn project_outputs(&mut self) {
        let overlap_state = overlap::project(&self.rings, &self.config.overlaps);
        let reducing = std::array::from_fn(|r| gap::is_reducing(&self.rings[r], &self.config));
        let next = output::project(&ProjectionInput {
            rings: &self.rings,
            variable_initial: &self.variable_initial,
            reducing,
            vehicle_call: self.vehicle_call,
            ped_call: self.ped_call,
            overlap_state,
            flash: self.flash,
            blank_panel: self
                .applied
                .inputs
                .contains(ControllerInputs::INDICATOR_LAMP_CONTROL),
        });
        self.flags.record(&self.output, &next);
        self.output = next;
    }

    /// Handles a broken invariant according to the policy. Callers apply
    /// their own fallback after this returns.
    pub(crate) fn report(&mut self, violation: InvariantViolation) {
        self.violations += 1;
        self.last_violation = Some(violation);
        log::error!("invariant violation: {violation}");
        if self.policy == InvariantPolicy::Panic {
            panic!("invariant violation: {violation}");
        }
    }

    pub fn set_vehicle_detector(&mut self, mask: PhaseMask) {
        self.pending.vehicle_detector = mask;
    }

    pub fn set_ped_detector(&mut self, mask: PhaseMask) {
        self.pending.ped_detector = mask;
    }

    pub fn set_hold(&mut self, mask: PhaseMask) {
        self.pending.hold = mask;
    }

    pub fn set_ped_omit(&mut self, mask: PhaseMask) {
        self.pending.ped_omit = mask;
    }

    pub fn set_phase_omit(&mut self, mask: PhaseMask) {
        self.pending.phase_omit = mask;
    }

    pub fn set_vehicle_memory(&mut self, mask: PhaseMask) {
        self.pending.vehicle_memory = mask;
    }

    pub fn set_force_off(&mut self, mask: RingMask) {
        self.pending.rings.force_off = mask;
    }

    pub fn set_stop_timing(&mut self, mask: RingMask) {
        self.pending.rings.stop_timing = mask;
    }

    pub fn set_inhibit_max_termination(&mut self, mask: RingMask) {
        self.pending.rings.inhibit_max_termination = mask;
    }

    pub fn set_red_rest_mode(&mut self, mask: RingMask) {
        self.pending.rings.red_rest_mode = mask;
    }

    pub fn set_ped_recycle(&mut self, mask: RingMask) {
        self.pending.rings.ped_recycle = mask;
    }

    pub fn set_max_ii(&mut self, mask: RingMask) {
        self.pending.rings.max_ii = mask;
    }

    pub fn set_omit_red_clear(&mut self, mask: RingMask) {
        self.pending.rings.omit_red_clear = mask;
    }

    pub fn set_call_to_non_actuated(&mut self, mask: CnaMask) {
        self.pending.call_to_non_actuated = mask;
    }

    pub fn set_inputs(&mut self, inputs: ControllerInputs) {
        self.pending.inputs = inputs;
    }

    /// Replaces the whole staged input set.
    pub fn stage(&mut self, inputs: InputState) {
        self.pending = inputs;
    }

    pub fn pending(&self) -> &InputState {
        &self.pending
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn ring(&self, r: usize) -> &Ring {
        &self.rings[r]
    }

    pub fn rings(&self) -> &[Ring; RING_COUNT] {
        &self.rings
    }

    pub fn barrier_cross_state(&self) -> BarrierCrossState {
        self.barrier_cross_state
    }

    pub fn barrier_side(&self) -> u8 {
        self.barrier_side
    }

    pub fn barrier_crossings(&self) -> u64 {
        self.barrier_crossings
    }

    pub fn overlap_state(&self) -> OverlapState {
        self.output.overlap_state
    }

    pub fn output(&self) -> &SignalOutput {
        &self.output
    }

    /// Drains the change flags.
    pub fn take_flags(&mut self) -> OutputFlags {
        std::mem::take(&mut self.flags)
    }

    pub fn variable_initial(&self, phase: Phase) -> VariableInitial {
        self.variable_initial[phase.index()]
    }

    pub fn vehicle_call(&self) -> PhaseMask {
        self.vehicle_call
    }

    pub fn ped_call(&self) -> PhaseMask {
        self.ped_call
    }

    pub fn time(&self) -> Tenths {
        self.time
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn violations(&self) -> u64 {
        self.violations
    }

    pub fn last_violation(&self) -> Option<InvariantViolation> {
        self.last_violation
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            time: self.time,
            tick_count: self.tick_count,
            rings: self.rings,
            barrier_cross_state: self.barrier_cross_state,
            barrier_side: self.barrier_side,
            barrier_crossings: self.barrier_crossings,
            output: self.output,
            violations: self.violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{ClearanceReason, Interval, PedInterval};
    use crate::timing::{TimingParam, TimingTable, DEFAULT_CNA};

    fn alternation_config() -> Configuration {
        let mut row = [0; TimingParam::COUNT];
        row[TimingParam::MinGreen.index()] = 60;
        row[TimingParam::Passage.index()] = 35;
        row[TimingParam::MaxI.index()] = 120;
        Configuration {
            timing: TimingTable::uniform(row),
            overlaps: [
                PhaseMask::from_phases(&[1, 5]),
                PhaseMask::EMPTY,
                PhaseMask::EMPTY,
                PhaseMask::EMPTY,
            ],
            cna: [PhaseMask::EMPTY; 2],
        }
    }

    fn short_config() -> Configuration {
        // min, passage, max1, max2, walk, ped clear, yellow, red clear
        let row = [20, 5, 60, 80, 30, 20, 5, 3, 0, 0, 0, 0];
        Configuration {
            timing: TimingTable::uniform(row),
            ..Configuration::default()
        }
    }

    fn controller(config: Configuration) -> Controller {
        let mut controller = Controller::with_policy(config, InvariantPolicy::Panic);
        controller.initialize(0);
        controller
    }

    #[test]
    fn two_ring_alternation_starts_on_the_first_phases() {
        let mut controller = controller(alternation_config());
        controller.set_vehicle_detector(PhaseMask::from_phases(&[1, 5]));
        assert!(controller.update(6));

        assert_eq!(controller.ring(0).phase, Phase::new(1));
        assert_eq!(controller.ring(1).phase, Phase::new(5));
        assert_eq!(controller.ring(0).interval, Interval::MinGreen);
        assert_eq!(controller.ring(1).interval, Interval::MinGreen);
        assert!(controller.overlap_state().is_green(0));
        assert_eq!(controller.output().green, PhaseMask::from_phases(&[1, 5]));
    }

    #[test]
    fn update_without_elapsed_time_does_nothing() {
        let mut controller = controller(alternation_config());
        controller.update(5);
        let before = controller.snapshot();
        assert!(!controller.update(5));
        assert_eq!(controller.snapshot(), before);
    }

    #[test]
    fn time_wraps() {
        let mut controller = Controller::with_policy(alternation_config(), InvariantPolicy::Panic);
        controller.initialize(Tenths::MAX - 2);
        assert!(controller.update(3));
        assert_eq!(controller.tick_count(), 6);
        assert_eq!(controller.time(), 3);
    }

    #[test]
    fn batched_update_matches_single_steps() {
        let mut batched = controller(short_config());
        let mut stepped = controller(short_config());
        for c in [&mut batched, &mut stepped] {
            c.set_vehicle_detector(PhaseMask::from_phases(&[3, 6]));
            c.set_ped_detector(PhaseMask::from_phases(&[2]));
        }

        batched.update(300);
        for t in 1..=300 {
            stepped.update(t);
        }
        assert_eq!(batched.snapshot(), stepped.snapshot());
    }

    #[test]
    fn ped_walk_blocks_yellow() {
        let mut controller = controller(short_config());
        controller.set_ped_detector(PhaseMask::from_phases(&[1]));
        controller.update(1);
        controller.set_ped_detector(PhaseMask::EMPTY);
        // ped press arrives before phase 1 loads, so walk starts with it
        assert_eq!(controller.ring(0).ped_interval, PedInterval::Walk);

        controller.set_vehicle_detector(PhaseMask::from_phases(&[2]));
        controller.update(21);
        assert!(controller.ring(0).interval.is_max());
        assert_eq!(controller.ring(0).passage_timer, 0);

        // walk 30 + ped clear 20 from t=1: ped clear ends at t=51
        controller.update(50);
        assert!(controller.ring(0).interval.is_green());
        assert_eq!(controller.ring(0).ped_interval, PedInterval::PedClear);

        controller.update(51);
        assert_eq!(controller.ring(0).ped_interval, PedInterval::Invalid);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        assert_eq!(controller.ring(0).next_phase, Phase::new(2));
    }

    #[test]
    fn max_out_when_detector_keeps_extending() {
        let mut controller = controller(short_config());
        controller.set_vehicle_detector(PhaseMask::from_phases(&[2]));
        controller.update(1);
        // passage keeps re-arming on fresh actuations of phase 1
        for t in 2..=80 {
            let mask = if t % 2 == 0 {
                PhaseMask::from_phases(&[1, 2])
            } else {
                PhaseMask::from_phases(&[2])
            };
            controller.set_vehicle_detector(mask);
            controller.update(t);
        }
        // min green ends at 21, max 60 runs out at 81
        assert!(controller.ring(0).interval.is_max());
        controller.update(81);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        assert_eq!(controller.ring(0).clearance_reason, ClearanceReason::MaxOut);
    }

    #[test]
    fn inhibit_max_termination_keeps_green() {
        let mut controller = controller(short_config());
        controller.set_inhibit_max_termination(RingMask::from_bits(0b01));
        for t in 1..=120 {
            let mask = if t % 2 == 0 {
                PhaseMask::from_phases(&[1, 2])
            } else {
                PhaseMask::from_phases(&[2])
            };
            controller.set_vehicle_detector(mask);
            controller.update(t);
        }
        assert!(controller.ring(0).interval.is_max());
        assert_eq!(controller.ring(0).max_timer, 0);
    }

    #[test]
    fn omit_red_clear_falls_through() {
        let mut controller = controller(short_config());
        controller.set_omit_red_clear(RingMask::from_bits(0b01));
        controller.set_vehicle_detector(PhaseMask::from_phases(&[2]));
        controller.update(21);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        // yellow 5: red clear skipped, phase 2 loads as yellow expires
        controller.update(26);
        assert_eq!(controller.ring(0).phase, Phase::new(2));
        assert_eq!(controller.ring(0).interval, Interval::MinGreen);
    }

    #[test]
    fn red_rest_clears_without_demand() {
        let mut controller = controller(short_config());
        controller.set_red_rest_mode(RingMask::from_bits(0b10));
        controller.update(21);
        assert_eq!(controller.ring(0).interval, Interval::PreMaxRest);
        assert_eq!(controller.ring(1).interval, Interval::Yellow);
        controller.update(40);
        assert_eq!(controller.ring(1).interval, Interval::Invalid);
        assert_eq!(controller.ring(1).phase, None);
    }

    #[test]
    fn interval_advance_acts_on_release() {
        let mut controller = controller(short_config());
        controller.set_vehicle_detector(PhaseMask::from_phases(&[2]));
        controller.update(5);
        controller.set_inputs(ControllerInputs::INTERVAL_ADVANCE);
        controller.update(6);
        assert_eq!(controller.ring(0).interval, Interval::MinGreen);
        controller.set_inputs(ControllerInputs::EMPTY);
        controller.update(7);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        assert_eq!(controller.ring(0).clearance_reason, ClearanceReason::ForceOff);
        assert_eq!(controller.ring(1).interval, Interval::PreMaxRest);
    }

    #[test]
    fn stop_timing_freezes_the_ring() {
        let mut controller = controller(short_config());
        controller.update(5);
        controller.set_stop_timing(RingMask::from_bits(0b01));
        controller.update(50);
        assert_eq!(controller.ring(0).interval_timer, 16);
        assert_ne!(controller.ring(1).interval_timer, 16);
    }

    #[test]
    fn stopped_ring_holds_its_interval_until_advance() {
        let mut controller = controller(short_config());
        controller.update(30);
        assert_eq!(controller.ring(0).interval, Interval::PreMaxRest);

        controller.set_stop_timing(RingMask::from_bits(0b01));
        controller.update(31);
        controller.set_vehicle_detector(PhaseMask::from_phases(&[2]));
        controller.update(200);
        assert_eq!(controller.ring(0).phase, Phase::new(1));
        assert_eq!(controller.ring(0).interval, Interval::PreMaxRest);

        controller.set_inputs(ControllerInputs::INTERVAL_ADVANCE);
        controller.update(201);
        controller.set_inputs(ControllerInputs::EMPTY);
        controller.update(202);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        assert_eq!(controller.ring(0).clearance_reason, ClearanceReason::ForceOff);

        // yellow timer is frozen as well
        controller.update(250);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        assert_eq!(controller.ring(0).interval_timer, 5);
    }

    #[test]
    fn manual_control_advance_skips_rings_in_clearance() {
        let run = |inputs: ControllerInputs| {
            let mut controller = controller(short_config());
            controller.set_vehicle_detector(PhaseMask::from_phases(&[2]));
            controller.update(21);
            assert_eq!(controller.ring(0).interval, Interval::Yellow);
            controller.set_inputs(inputs.union(ControllerInputs::INTERVAL_ADVANCE));
            controller.update(22);
            controller.set_inputs(inputs);
            controller.update(23);
            controller
        };

        let manual = run(ControllerInputs::MANUAL_CONTROL);
        assert_eq!(manual.ring(0).interval, Interval::Yellow);
        assert_eq!(manual.ring(0).interval_timer, 3);
        // the resting ring still takes the advance
        assert_eq!(manual.ring(1).clearance_reason, ClearanceReason::ForceOff);
        assert_eq!(manual.ring(1).barrier_state, crate::ring::BarrierState::ClearanceReady);

        let automatic = run(ControllerInputs::EMPTY);
        assert_eq!(automatic.ring(0).interval, Interval::RedClear);
        assert_eq!(automatic.ring(0).interval_timer, 3);
    }

    /// Phase 2 called, phase 1 kept in max by detector pulses every other tick.
    fn extend_phase_one(controller: &mut Controller, until: Tenths) {
        for t in controller.time() + 1..=until {
            let mask = if t % 2 == 0 {
                PhaseMask::from_phases(&[1, 2])
            } else {
                PhaseMask::from_phases(&[2])
            };
            controller.set_vehicle_detector(mask);
            controller.update(t);
        }
    }

    #[test]
    fn force_off_ends_max() {
        let mut controller = controller(short_config());
        controller.set_vehicle_detector(PhaseMask::from_phases(&[2]));
        controller.update(1);
        extend_phase_one(&mut controller, 30);
        assert!(controller.ring(0).interval.is_max());
        assert!(controller.ring(0).passage_timer > 0);

        controller.set_force_off(RingMask::from_bits(0b01));
        controller.update(31);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        assert_eq!(controller.ring(0).clearance_reason, ClearanceReason::ForceOff);
        assert_eq!(controller.ring(0).next_phase, Phase::new(2));
    }

    #[test]
    fn force_off_waits_for_the_ped_interval() {
        let mut controller = controller(short_config());
        controller.set_force_off(RingMask::from_bits(0b01));
        controller.set_vehicle_detector(PhaseMask::from_phases(&[2]));
        controller.set_ped_detector(PhaseMask::from_phases(&[1]));
        controller.update(1);
        controller.set_ped_detector(PhaseMask::EMPTY);
        assert_eq!(controller.ring(0).ped_interval, PedInterval::Walk);

        // walk 30 + ped clear 20 from t=1
        extend_phase_one(&mut controller, 50);
        assert!(controller.ring(0).interval.is_max());
        assert_eq!(controller.ring(0).ped_interval, PedInterval::PedClear);

        extend_phase_one(&mut controller, 51);
        assert_eq!(controller.ring(0).ped_interval, PedInterval::Invalid);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        assert_eq!(controller.ring(0).clearance_reason, ClearanceReason::ForceOff);
    }

    #[test]
    fn ped_omit_suppresses_walk_on_load() {
        let mut controller = controller(short_config());
        controller.set_ped_omit(PhaseMask::from_phases(&[1]));
        controller.set_ped_detector(PhaseMask::from_phases(&[1]));
        controller.update(1);

        assert_eq!(controller.ring(0).phase, Phase::new(1));
        assert_eq!(controller.ring(0).ped_interval, PedInterval::Invalid);
        assert_eq!(controller.ring(0).ped_timer, 0);
        assert!(!controller.output().walk.contains(Phase::new(1).unwrap()));
    }

    #[test]
    fn omitted_phases_are_not_served() {
        let mut controller = controller(short_config());
        controller.set_phase_omit(PhaseMask::from_phases(&[2, 3]));
        controller.set_vehicle_detector(PhaseMask::from_phases(&[2, 3]));
        controller.update(100);

        assert_eq!(controller.ring(0).phase, Phase::new(1));
        assert_eq!(controller.ring(0).interval, Interval::PreMaxRest);
        assert_eq!(controller.barrier_cross_state(), BarrierCrossState::NotRequested);
        assert!(controller.vehicle_call().contains(Phase::new(2).unwrap()));
        assert!(controller.vehicle_call().contains(Phase::new(3).unwrap()));

        controller.set_phase_omit(PhaseMask::EMPTY);
        controller.update(101);
        assert_eq!(controller.ring(0).interval, Interval::Yellow);
        assert_eq!(controller.ring(0).next_phase, Phase::new(2));
    }

    #[test]
    fn external_start_restarts_the_sequence() {
        let mut controller = controller(short_config());
        controller.set_vehicle_detector(PhaseMask::from_phases(&[2]));
        controller.update(30);
        assert_ne!(controller.ring(0).phase, Phase::new(1));

        controller.set_vehicle_detector(PhaseMask::EMPTY);
        controller.set_inputs(ControllerInputs::EXTERNAL_START);
        controller.update(31);
        assert_eq!(controller.ring(0).interval, Interval::RedClear);
        assert_eq!(controller.ring(0).next_phase, Phase::new(1));
        controller.update(32);
        assert_eq!(controller.ring(0).phase, Phase::new(1));
    }

    #[test]
    fn flags_drain() {
        let mut controller = controller(short_config());
        controller.take_flags();
        controller.update(1);
        assert!(controller.take_flags().update_pending);
        assert!(!controller.take_flags().any());
        controller.update(2);
        let flags = controller.take_flags();
        assert!(flags.timers_changed);
        assert!(!flags.update_pending);
    }

    #[test]
    fn idle_runs_repeat_exactly() {
        let trace = || {
            let mut controller = controller(short_config());
            (1..=200)
                .map(|t| {
                    controller.update(t);
                    controller.rings().map(|ring| (ring.phase, ring.interval))
                })
                .collect::<Vec<_>>()
        };
        let first = trace();
        assert_eq!(first, trace());
        assert_eq!(first[0][0], (Phase::new(1), Interval::MinGreen));
        assert_eq!(first[199][1], (Phase::new(5), Interval::PreMaxRest));
    }

    #[test]
    fn walk_rest_modifier_retimes_walk() {
        let mut controller = controller(short_config());
        controller.set_inputs(ControllerInputs::WALK_REST_MODIFIER);
        controller.set_ped_detector(PhaseMask::from_phases(&[1]));
        controller.update(1);
        controller.set_ped_detector(PhaseMask::EMPTY);
        controller.update(50);
        assert_eq!(controller.ring(0).interval, Interval::PreMaxRest);
        assert_eq!(controller.ring(0).ped_interval, PedInterval::Walk);

        // a conflicting call ends the rest; the re-timed walk runs out at 61
        controller.set_vehicle_detector(PhaseMask::from_phases(&[2]));
        controller.update(62);
        assert!(controller.ring(0).interval.is_max());
        assert_eq!(controller.ring(0).ped_interval, PedInterval::PedClear);
    }

    #[test]
    fn ped_recycle_restarts_walk_on_held_phase() {
        let mut controller = controller(short_config());
        controller.set_hold(PhaseMask::from_phases(&[1]));
        controller.set_ped_recycle(RingMask::from_bits(0b01));
        controller.update(24);
        assert_eq!(controller.ring(0).interval, Interval::PreMaxRest);
        assert_eq!(controller.ring(0).ped_interval, PedInterval::Invalid);

        controller.set_ped_detector(PhaseMask::from_phases(&[1]));
        controller.update(25);
        assert_eq!(controller.ring(0).ped_interval, PedInterval::Walk);
        assert!(controller.ped_call().is_empty());
    }

    #[test]
    fn variable_initial_extends_min_green() {
        let mut config = short_config();
        let p2 = Phase::new(2).unwrap();
        config.timing.set(p2, TimingParam::SecondsPerActuation, 20);
        let mut controller = controller(config);
        controller.update(1);
        for t in [2, 4, 6] {
            controller.set_vehicle_detector(PhaseMask::of(p2));
            controller.update(t);
            controller.set_vehicle_detector(PhaseMask::EMPTY);
            controller.update(t + 1);
        }
        assert_eq!(controller.variable_initial(p2), VariableInitial::Accruing(60));

        // gap out at 21, yellow 5, red clear 3
        controller.update(29);
        assert_eq!(controller.ring(0).phase, Some(p2));
        assert_eq!(controller.ring(0).interval_timer, 60);
        assert_eq!(controller.variable_initial(p2), VariableInitial::Spent);
        assert!(controller.output().ring_status[0].contains(crate::RingStatus::VARIABLE_INITIAL));
    }

    #[test]
    fn variable_initial_never_shortens_min_green() {
        let mut config = short_config();
        let p2 = Phase::new(2).unwrap();
        config.timing.set(p2, TimingParam::SecondsPerActuation, 20);
        config.timing.set(p2, TimingParam::MaxI, 10);
        let mut controller = controller(config);
        controller.update(1);
        for t in [2, 4, 6] {
            controller.set_vehicle_detector(PhaseMask::of(p2));
            controller.update(t);
            controller.set_vehicle_detector(PhaseMask::EMPTY);
            controller.update(t + 1);
        }

        controller.update(29);
        assert_eq!(controller.ring(0).phase, Some(p2));
        assert_eq!(controller.ring(0).interval, Interval::MinGreen);
        assert_eq!(controller.ring(0).interval_timer, 20);
    }

    #[test]
    fn max_ii_uses_the_second_max() {
        let mut controller = controller(short_config());
        controller.set_max_ii(RingMask::from_bits(0b01));
        controller.set_vehicle_detector(PhaseMask::from_phases(&[2]));
        controller.update(19);
        controller.set_vehicle_detector(PhaseMask::from_phases(&[1, 2]));
        controller.update(21);
        assert_eq!(controller.ring(0).interval, Interval::MaxII);
        assert_eq!(controller.ring(0).max_timer, 80);
    }

    #[test]
    fn degrade_policy_counts_instead_of_panicking() {
        let mut controller = Controller::with_policy(short_config(), InvariantPolicy::Degrade);
        controller.initialize(0);
        controller.rings[0].next_phase = Phase::new(6);
        controller.update(1);
        assert_eq!(controller.violations(), 1);
        assert_eq!(
            controller.last_violation(),
            Some(InvariantViolation::PhaseOutsideRing { ring: 0, phase: 6 })
        );
        assert_eq!(controller.ring(0).phase, None);
        assert_eq!(controller.config().cna[0].bits(), DEFAULT_CNA[0]);
    }
}

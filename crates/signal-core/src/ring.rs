//! Per-ring state and the vehicle/pedestrian interval machines.

use crate::controller::Controller;
use crate::error::InvariantViolation;
use crate::inputs::ControllerInputs;
use crate::masks::{Phase, PhaseMask};
use crate::timing::{Configuration, TimingParam};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interval {
    /// No phase in service.
    #[default]
    Invalid,
    MinGreen,
    /// Green rest with the max timer not yet running.
    PreMaxRest,
    MaxI,
    MaxII,
    Yellow,
    RedClear,
}

impl Interval {
    pub const fn is_green(self) -> bool {
        matches!(
            self,
            Self::MinGreen | Self::PreMaxRest | Self::MaxI | Self::MaxII
        )
    }

    pub const fn is_max(self) -> bool {
        matches!(self, Self::MaxI | Self::MaxII)
    }

    pub const fn is_clearance(self) -> bool {
        matches!(self, Self::Yellow | Self::RedClear)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PedInterval {
    #[default]
    Invalid,
    Walk,
    PedClear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierState {
    #[default]
    NotReady,
    /// Green has terminated; the ring may clear whenever the barrier allows.
    ClearanceReady,
    /// Going back to the other phase on the same side instead of crossing.
    ConditionalReservice,
    /// At red and waiting on the other ring.
    CrossReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearanceReason {
    #[default]
    NoReason,
    GapOut,
    MaxOut,
    ForceOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ring {
    pub interval_timer: u16,
    pub passage_timer: u16,
    pub reduced_passage: u16,
    pub max_timer: u16,
    pub ped_timer: u16,
    pub before_reduction_timer: u16,
    pub time_to_reduce_timer: u16,
    pub phase: Option<Phase>,
    pub next_phase: Option<Phase>,
    pub interval: Interval,
    pub ped_interval: PedInterval,
    pub barrier_state: BarrierState,
    pub clearance_reason: ClearanceReason,
}

impl Ring {
    /// Ring parked in an expired red clearance, about to load `next_phase`.
    pub fn starting(next_phase: Option<Phase>) -> Self {
        Self {
            next_phase,
            interval: Interval::RedClear,
            ..Self::default()
        }
    }

    pub(crate) fn decrement_timers(&mut self) {
        for timer in [
            &mut self.interval_timer,
            &mut self.passage_timer,
            &mut self.max_timer,
            &mut self.ped_timer,
        ] {
            *timer = timer.saturating_sub(1);
        }
    }

    /// Starts the walk for the current phase, falling through zero-length
    /// intervals so a running ped interval always has time on its timer.
    pub(crate) fn start_walk(&mut self, config: &Configuration, phase: Phase) {
        self.ped_interval = PedInterval::Walk;
        self.ped_timer = config.timing(phase, TimingParam::Walk);
        if self.ped_timer == 0 {
            self.start_ped_clear(config, phase);
        }
    }

    pub(crate) fn start_ped_clear(&mut self, config: &Configuration, phase: Phase) {
        self.ped_interval = PedInterval::PedClear;
        self.ped_timer = config.timing(phase, TimingParam::PedClear);
        if self.ped_timer == 0 {
            self.ped_interval = PedInterval::Invalid;
        }
    }

    /// Treats the running interval (and ped interval) as expired.
    pub(crate) fn expire_interval(&mut self) {
        self.interval_timer = 0;
        if self.ped_interval != PedInterval::Invalid {
            self.ped_timer = 0;
        }
    }

    pub(crate) fn phase_mask(&self) -> PhaseMask {
        self.phase.map(PhaseMask::of).unwrap_or_default()
    }
}

/// Variable initial credit for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableInitial {
    /// Phase does not earn extra initial green.
    Disabled,
    /// Tenths earned by actuations while the phase waited.
    Accruing(u16),
    /// Credit was used to extend the minimum green now being timed.
    Spent,
}

pub const MAX_VARIABLE_INITIAL: u16 = 300;

impl VariableInitial {
    pub fn for_phase(config: &Configuration, phase: Phase) -> Self {
        if config.timing(phase, TimingParam::SecondsPerActuation) == 0 {
            Self::Disabled
        } else {
            Self::Accruing(0)
        }
    }

    pub(crate) fn accrue(&mut self, per_actuation: u16) {
        if let Self::Accruing(credit) = self {
            *credit = credit.saturating_add(per_actuation).min(MAX_VARIABLE_INITIAL);
        }
    }

    pub(crate) fn reset(&mut self) {
        if *self != Self::Disabled {
            *self = Self::Accruing(0);
        }
    }
}

/// Outcome of next-phase resolution for one ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NextStep {
    Phase(Phase),
    CrossBarrier,
    RedRest,
    Wait,
}

impl Controller {
    /// Runs one tenth of a second for ring `r`. `forced` is an operator
    /// interval advance: the running interval is treated as expired.
    pub(crate) fn advance_ring(&mut self, r: usize, forced: bool) {
        let stopped = self.is_stopped(r);
        if !stopped {
            self.rings[r].decrement_timers();
            crate::gap::reduce_passage(&mut self.rings[r], &self.config);
        }

        if forced {
            self.rings[r].expire_interval();
        } else if stopped {
            // a stopped ring only moves on interval advance
            self.check_ring(r);
            return;
        }

        self.advance_ped(r);
        self.recycle_ped(r);

        match self.rings[r].interval {
            Interval::Invalid => self.service_idle(r),
            Interval::MinGreen => {
                if self.rings[r].interval_timer == 0 {
                    self.leave_min_green(r, forced);
                }
            }
            Interval::PreMaxRest => {
                if forced {
                    self.try_terminate(r, ClearanceReason::ForceOff);
                } else {
                    self.leave_min_green(r, false);
                }
            }
            Interval::MaxI | Interval::MaxII => self.service_max(r, forced),
            Interval::Yellow => {
                if self.rings[r].interval_timer == 0 {
                    self.start_red_clear(r);
                }
            }
            Interval::RedClear => {
                if self.rings[r].interval_timer == 0 {
                    self.finish_red_clear(r);
                }
            }
        }

        self.check_ring(r);
    }

    fn advance_ped(&mut self, r: usize) {
        let walk_rest = self.applied.inputs.contains(ControllerInputs::WALK_REST_MODIFIER)
            && self.rings[r].interval == Interval::PreMaxRest
            && !self.has_conflicting_call(r);

        let config = &self.config;
        let ring = &mut self.rings[r];
        if ring.ped_interval == PedInterval::Invalid || ring.ped_timer != 0 {
            return;
        }

        let Some(phase) = ring.phase else {
            ring.ped_interval = PedInterval::Invalid;
            return;
        };

        match ring.ped_interval {
            PedInterval::Walk if walk_rest && config.timing(phase, TimingParam::Walk) > 0 => {
                ring.ped_timer = config.timing(phase, TimingParam::Walk);
            }
            PedInterval::Walk => ring.start_ped_clear(config, phase),
            PedInterval::PedClear => ring.ped_interval = PedInterval::Invalid,
            PedInterval::Invalid => {}
        }
    }

    /// A held phase resting in green restarts its walk on a fresh ped call
    /// when the ring allows recycling.
    fn recycle_ped(&mut self, r: usize) {
        let ring = &self.rings[r];
        let Some(phase) = ring.phase else {
            return;
        };

        let resting = matches!(
            ring.interval,
            Interval::PreMaxRest | Interval::MaxI | Interval::MaxII
        );

        if resting
            && ring.ped_interval != PedInterval::Walk
            && self.applied.hold.contains(phase)
            && self.applied.rings.ped_recycle.contains(r)
            && self.ped_call.contains(phase)
            && !self.applied.ped_omit.contains(phase)
        {
            self.rings[r].start_walk(&self.config, phase);
            self.ped_call.remove(phase);
        }
    }

    /// Min green expired, or resting: decide between rest, max, and red rest.
    /// Entering max checks termination in the same tick.
    fn leave_min_green(&mut self, r: usize, forced: bool) {
        if self.has_conflicting_call(r) || self.barrier_requested() {
            self.start_max(r);
            self.service_max(r, forced);
        } else if self.applied.rings.red_rest_mode.contains(r) {
            self.rings[r].interval = Interval::PreMaxRest;
            self.try_terminate(r, ClearanceReason::NoReason);
        } else {
            let ring = &mut self.rings[r];
            ring.interval = Interval::PreMaxRest;
            ring.max_timer = 0;
        }
    }

    fn start_max(&mut self, r: usize) {
        let Some(phase) = self.rings[r].phase else {
            return;
        };

        let (interval, param) = if self.applied.rings.max_ii.contains(r) {
            (Interval::MaxII, TimingParam::MaxII)
        } else {
            (Interval::MaxI, TimingParam::MaxI)
        };

        let ring = &mut self.rings[r];
        ring.interval = interval;
        ring.max_timer = self.config.timing(phase, param);
    }

    fn service_max(&mut self, r: usize, forced: bool) {
        let ring = &self.rings[r];
        let reason = if ring.barrier_state == BarrierState::ClearanceReady {
            Some(ring.clearance_reason)
        } else if forced {
            Some(ClearanceReason::ForceOff)
        } else if ring.passage_timer == 0 {
            Some(ClearanceReason::GapOut)
        } else if ring.max_timer == 0 && !self.applied.rings.inhibit_max_termination.contains(r) {
            Some(ClearanceReason::MaxOut)
        } else if self.applied.rings.force_off.contains(r) {
            Some(ClearanceReason::ForceOff)
        } else {
            None
        };

        if let Some(reason) = reason {
            self.try_terminate(r, reason);
        }
    }

    /// Ends the green if nothing holds it, then clears to yellow only when a
    /// next phase (or red rest) is warranted. A pending ped interval or a
    /// hold keeps the phase green.
    pub(crate) fn try_terminate(&mut self, r: usize, reason: ClearanceReason) {
        let ring = &self.rings[r];
        let Some(phase) = ring.phase else {
            return;
        };

        if ring.ped_interval != PedInterval::Invalid || self.applied.hold.contains(phase) {
            return;
        }

        if ring.barrier_state != BarrierState::ClearanceReady {
            self.rings[r].clearance_reason = reason;
        }

        match self.resolve_next_phase(r) {
            NextStep::Phase(next) => {
                let ring = &mut self.rings[r];
                ring.next_phase = Some(next);
                if ring.barrier_state != BarrierState::ConditionalReservice {
                    ring.barrier_state = BarrierState::NotReady;
                }
                self.clear_to_yellow(r);
            }
            NextStep::RedRest => {
                self.rings[r].barrier_state = BarrierState::ClearanceReady;
                self.clear_to_yellow(r);
            }
            NextStep::CrossBarrier => {
                self.rings[r].barrier_state = BarrierState::ClearanceReady;
                self.request_barrier_cross(r);
            }
            NextStep::Wait => {
                self.rings[r].barrier_state = BarrierState::ClearanceReady;
            }
        }
    }

    pub(crate) fn clear_to_yellow(&mut self, r: usize) {
        let Some(phase) = self.rings[r].phase else {
            return;
        };

        let yellow = self.config.timing(phase, TimingParam::Yellow);
        let ring = &mut self.rings[r];
        ring.interval = Interval::Yellow;
        ring.interval_timer = yellow;
        ring.passage_timer = 0;
        ring.max_timer = 0;
        ring.time_to_reduce_timer = 0;
        ring.before_reduction_timer = 0;
        self.variable_initial[phase.index()].reset();
        log::debug!(
            "ring {} phase {} clearing ({:?}), next {:?}",
            r + 1,
            phase,
            ring.clearance_reason,
            ring.next_phase.map(Phase::number)
        );
    }

    fn start_red_clear(&mut self, r: usize) {
        let Some(phase) = self.rings[r].phase else {
            return;
        };

        let red_clear = if self.applied.rings.omit_red_clear.contains(r) {
            0
        } else {
            self.config.timing(phase, TimingParam::RedClear)
        };

        let ring = &mut self.rings[r];
        ring.interval = Interval::RedClear;
        ring.interval_timer = red_clear;
        if red_clear == 0 {
            self.finish_red_clear(r);
        }
    }

    fn finish_red_clear(&mut self, r: usize) {
        let executing = self.barrier_executing();
        let ring = &mut self.rings[r];
        ring.interval = Interval::Invalid;
        ring.interval_timer = 0;
        ring.phase = None;

        if !executing && ring.next_phase.is_some() {
            self.load_next_phase(r);
        } else {
            ring.barrier_state = BarrierState::CrossReady;
        }
    }

    /// Ring at red with nothing loaded: keep looking for something to serve.
    fn service_idle(&mut self, r: usize) {
        if self.barrier_executing() {
            self.rings[r].barrier_state = BarrierState::CrossReady;
            return;
        }

        if self.rings[r].next_phase.is_some() {
            self.load_next_phase(r);
            return;
        }

        match self.resolve_next_phase(r) {
            NextStep::Phase(next) => {
                self.rings[r].next_phase = Some(next);
                self.load_next_phase(r);
            }
            NextStep::CrossBarrier => {
                self.rings[r].barrier_state = BarrierState::CrossReady;
                self.request_barrier_cross(r);
            }
            NextStep::RedRest | NextStep::Wait => {
                self.rings[r].barrier_state = BarrierState::CrossReady;
            }
        }
    }

    pub(crate) fn load_next_phase(&mut self, r: usize) {
        let Some(phase) = self.rings[r].next_phase.take() else {
            return;
        };

        if phase.ring() != r {
            self.report(InvariantViolation::PhaseOutsideRing {
                ring: r,
                phase: phase.number(),
            });
            return;
        }

        let config = &self.config;
        let max = if self.applied.rings.max_ii.contains(r) {
            config.timing(phase, TimingParam::MaxII)
        } else {
            config.timing(phase, TimingParam::MaxI)
        };

        let min_green = config.timing(phase, TimingParam::MinGreen);
        let credit = &mut self.variable_initial[phase.index()];
        let initial = match *credit {
            VariableInitial::Accruing(earned) if earned > min_green => {
                *credit = VariableInitial::Spent;
                earned.min(max).max(min_green)
            }
            _ => min_green,
        };

        let walk = self.ped_call.contains(phase) && !self.applied.ped_omit.contains(phase);
        let passage = config.timing(phase, TimingParam::Passage);
        let ring = &mut self.rings[r];
        ring.phase = Some(phase);
        ring.clearance_reason = ClearanceReason::NoReason;
        ring.barrier_state = BarrierState::NotReady;
        ring.interval = Interval::MinGreen;
        ring.interval_timer = initial;
        ring.max_timer = 0;
        ring.passage_timer = passage;
        ring.reduced_passage = passage;
        ring.before_reduction_timer = config.timing(phase, TimingParam::BeforeReduction);
        ring.time_to_reduce_timer = config.timing(phase, TimingParam::TimeToReduce);
        ring.ped_interval = PedInterval::Invalid;
        ring.ped_timer = 0;
        if walk {
            ring.start_walk(config, phase);
        }

        self.vehicle_call.remove(phase);
        self.ped_call.remove(phase);
        log::debug!(
            "ring {} loaded phase {} (min green {}, walk {})",
            r + 1,
            phase,
            initial,
            walk
        );
    }

    fn check_ring(&mut self, r: usize) {
        let ring = self.rings[r];
        if ring.ped_interval == PedInterval::Invalid && ring.ped_timer != 0 {
            self.report(InvariantViolation::PedTimerWithoutInterval { ring: r });
            self.rings[r].ped_timer = 0;
        }

        if ring.ped_interval != PedInterval::Invalid && ring.ped_timer == 0 {
            self.report(InvariantViolation::PedIntervalWithoutTimer {
                ring: r,
                interval: ring.ped_interval,
            });
            self.rings[r].ped_interval = PedInterval::Invalid;
        }

        if let Some(phase) = ring.phase {
            if phase.ring() != r {
                self.report(InvariantViolation::PhaseOutsideRing {
                    ring: r,
                    phase: phase.number(),
                });
                self.rings[r].phase = None;
                self.rings[r].interval = Interval::Invalid;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_stop_at_zero() {
        let mut ring = Ring {
            interval_timer: 1,
            passage_timer: 0,
            max_timer: 5,
            ..Ring::default()
        };
        ring.decrement_timers();
        ring.decrement_timers();
        assert_eq!(ring.interval_timer, 0);
        assert_eq!(ring.passage_timer, 0);
        assert_eq!(ring.max_timer, 3);
    }

    #[test]
    fn zero_length_ped_intervals_fall_through() {
        let mut raw = crate::timing::DEFAULT_TIMING;
        raw[0][TimingParam::Walk.index()] = 0;
        raw[0][TimingParam::PedClear.index()] = 0;
        let config = Configuration::load(raw, [0; 4], [0; 2]);
        let mut ring = Ring::default();
        ring.start_walk(&config, Phase::new(1).unwrap());
        assert_eq!(ring.ped_interval, PedInterval::Invalid);
        assert_eq!(ring.ped_timer, 0);
    }

    #[test]
    fn variable_initial_caps_and_ignores_sentinels() {
        let mut credit = VariableInitial::Accruing(290);
        credit.accrue(20);
        assert_eq!(credit, VariableInitial::Accruing(MAX_VARIABLE_INITIAL));

        let mut spent = VariableInitial::Spent;
        spent.accrue(20);
        assert_eq!(spent, VariableInitial::Spent);
        spent.reset();
        assert_eq!(spent, VariableInitial::Accruing(0));

        let mut disabled = VariableInitial::Disabled;
        disabled.reset();
        assert_eq!(disabled, VariableInitial::Disabled);
    }
}

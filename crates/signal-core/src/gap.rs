//! Gap reduction: the passage time shrinks linearly toward MinGap while a
//! phase stays green under demand.

use crate::ring::Ring;
use crate::timing::{Configuration, TimingParam};

/// One tenth of gap reduction for the ring's active phase. The caller skips
/// this while the ring is stopped.
pub(crate) fn reduce_passage(ring: &mut Ring, config: &Configuration) {
    let Some(phase) = ring.phase else {
        return;
    };

    if !ring.interval.is_green() {
        return;
    }

    let time_to_reduce = config.timing(phase, TimingParam::TimeToReduce);
    if time_to_reduce == 0 {
        return;
    }

    if ring.before_reduction_timer > 0 {
        ring.before_reduction_timer -= 1;
        return;
    }

    let min_gap = config.timing(phase, TimingParam::MinGap);
    if ring.time_to_reduce_timer == 0 {
        ring.reduced_passage = min_gap;
        return;
    }

    ring.time_to_reduce_timer -= 1;
    let passage = config.timing(phase, TimingParam::Passage);
    ring.reduced_passage = interpolate(passage, min_gap, ring.time_to_reduce_timer, time_to_reduce);
}

/// `(passage * remaining + min_gap * (total - remaining)) / total`.
pub(crate) fn interpolate(passage: u16, min_gap: u16, remaining: u16, total: u16) -> u16 {
    if total == 0 {
        return min_gap;
    }

    let remaining = u32::from(remaining.min(total));
    let total = u32::from(total);
    let value = (u32::from(passage) * remaining + u32::from(min_gap) * (total - remaining)) / total;
    value as u16
}

/// True while the reduction ramp is running for this ring.
pub(crate) fn is_reducing(ring: &Ring, config: &Configuration) -> bool {
    ring.phase.is_some_and(|phase| {
        ring.interval.is_green()
            && config.timing(phase, TimingParam::TimeToReduce) > 0
            && ring.before_reduction_timer == 0
            && ring.time_to_reduce_timer > 0
    })
}

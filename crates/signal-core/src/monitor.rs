//! Conflict monitor: an independent check on the lamp outputs that latches
//! the intersection into flash if conflicting movements ever show green.

use crate::masks::{PhaseMask, RING_COUNT};
use crate::output::SignalOutput;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    #[default]
    Normal,
    /// Latched all-red flash until the monitor is reset.
    Flash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConflictFault {
    #[error("ring {ring} shows more than one green: {greens:?}")]
    RingOverlap { ring: usize, greens: PhaseMask },

    #[error("greens on both sides of the barrier: {greens:?}")]
    BarrierOverlap { greens: PhaseMask },
}

pub struct ConflictMonitor {
    state: MonitorState,
    last_fault: Option<ConflictFault>,
}

impl ConflictMonitor {
    pub fn new() -> Self {
        Self {
            state: MonitorState::Normal,
            last_fault: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn last_fault(&self) -> Option<ConflictFault> {
        self.last_fault
    }

    /// Passes `output` through, or the flash output once tripped.
    pub fn apply(&mut self, output: &SignalOutput) -> (SignalOutput, Option<ConflictFault>) {
        if self.state == MonitorState::Flash {
            return (flash_output(), None);
        }

        match check(output) {
            Ok(()) => (*output, None),
            Err(fault) => {
                self.state = MonitorState::Flash;
                self.last_fault = Some(fault);
                (flash_output(), Some(fault))
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = MonitorState::Normal;
        self.last_fault = None;
    }
}

impl Default for ConflictMonitor {
    fn default() -> Self {
        Self::new()
    }
}

pub fn check(output: &SignalOutput) -> Result<(), ConflictFault> {
    let greens = output.green | output.yellow;
    for ring in 0..RING_COUNT {
        let in_ring = greens & PhaseMask::ring(ring);
        if in_ring.phases().count() > 1 {
            return Err(ConflictFault::RingOverlap {
                ring,
                greens: in_ring,
            });
        }
    }

    if !(greens & PhaseMask::side(0)).is_empty() && !(greens & PhaseMask::side(1)).is_empty() {
        return Err(ConflictFault::BarrierOverlap { greens });
    }
    Ok(())
}

/// All vehicle heads red, all ped heads don't walk.
pub fn flash_output() -> SignalOutput {
    SignalOutput {
        red: PhaseMask::ALL,
        dont_walk: PhaseMask::ALL,
        ..SignalOutput::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_greens_pass() {
        let output = SignalOutput {
            green: PhaseMask::from_phases(&[2]),
            yellow: PhaseMask::from_phases(&[6]),
            ..SignalOutput::default()
        };
        let mut monitor = ConflictMonitor::new();
        let (passed, fault) = monitor.apply(&output);
        assert_eq!(passed, output);
        assert!(fault.is_none());
    }

    #[test]
    fn barrier_conflict_latches_flash() {
        let output = SignalOutput {
            green: PhaseMask::from_phases(&[1, 7]),
            ..SignalOutput::default()
        };
        let mut monitor = ConflictMonitor::new();
        let (flashed, fault) = monitor.apply(&output);
        assert!(matches!(fault, Some(ConflictFault::BarrierOverlap { .. })));
        assert_eq!(flashed.red, PhaseMask::ALL);
        assert_eq!(monitor.last_fault(), fault);

        let (still, fault) = monitor.apply(&SignalOutput::default());
        assert_eq!(still, flash_output());
        assert!(fault.is_none());
        assert_eq!(monitor.state(), MonitorState::Flash);

        monitor.reset();
        assert_eq!(monitor.state(), MonitorState::Normal);
        assert!(monitor.last_fault().is_none());
    }

    #[test]
    fn two_greens_in_one_ring() {
        let output = SignalOutput {
            green: PhaseMask::from_phases(&[5, 6]),
            ..SignalOutput::default()
        };
        assert_eq!(
            check(&output),
            Err(ConflictFault::RingOverlap {
                ring: 1,
                greens: PhaseMask::from_phases(&[5, 6]),
            })
        );
    }
}

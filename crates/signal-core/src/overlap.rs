use crate::masks::{OverlapMask, PhaseMask, OVERLAP_COUNT};
use crate::ring::{Interval, Ring};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapColor {
    Red,
    Yellow,
    Green,
}

/// Green bits in the low nibble, yellow bits in the high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlapState(u8);

impl OverlapState {
    pub const GREEN_SHIFT: u8 = 0;
    pub const YELLOW_SHIFT: u8 = 4;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn green(self) -> OverlapMask {
        OverlapMask::from_bits(self.0 >> Self::GREEN_SHIFT)
    }

    pub const fn yellow(self) -> OverlapMask {
        OverlapMask::from_bits(self.0 >> Self::YELLOW_SHIFT)
    }

    pub const fn is_green(self, overlap: usize) -> bool {
        overlap < OVERLAP_COUNT && self.0 & (1 << (overlap as u8 + Self::GREEN_SHIFT)) != 0
    }

    pub const fn is_yellow(self, overlap: usize) -> bool {
        overlap < OVERLAP_COUNT && self.0 & (1 << (overlap as u8 + Self::YELLOW_SHIFT)) != 0
    }

    pub const fn color(self, overlap: usize) -> OverlapColor {
        if self.is_green(overlap) {
            OverlapColor::Green
        } else if self.is_yellow(overlap) {
            OverlapColor::Yellow
        } else {
            OverlapColor::Red
        }
    }

    fn set(&mut self, overlap: usize, color: OverlapColor) {
        let green = 1 << (overlap as u8 + Self::GREEN_SHIFT);
        let yellow = 1 << (overlap as u8 + Self::YELLOW_SHIFT);
        self.0 &= !(green | yellow);
        match color {
            OverlapColor::Green => self.0 |= green,
            OverlapColor::Yellow => self.0 |= yellow,
            OverlapColor::Red => {}
        }
    }
}

/// Colors every overlap from the rings' current phases and intervals.
///
/// An overlap whose member phase is clearing stays green when a ring is about
/// to load another member phase, so the overlap does not flash yellow
/// between two of its own phases.
pub fn project(rings: &[Ring], overlaps: &[PhaseMask; OVERLAP_COUNT]) -> OverlapState {
    let upcoming = rings
        .iter()
        .filter_map(|ring| ring.next_phase)
        .fold(PhaseMask::EMPTY, |mask, phase| mask | PhaseMask::of(phase));

    let mut state = OverlapState::default();
    for (index, members) in overlaps.iter().enumerate() {
        let continues = !upcoming.intersection(*members).is_empty();
        let mut color = OverlapColor::Red;
        for ring in rings {
            let Some(phase) = ring.phase else {
                continue;
            };
            if !members.contains(phase) {
                continue;
            }

            let ring_color = match ring.interval {
                interval if interval.is_green() => OverlapColor::Green,
                Interval::Yellow if continues => OverlapColor::Green,
                Interval::Yellow => OverlapColor::Yellow,
                Interval::RedClear if continues => OverlapColor::Green,
                _ => OverlapColor::Red,
            };
            color = dominant(color, ring_color);
        }
        state.set(index, color);
    }
    state
}

fn dominant(a: OverlapColor, b: OverlapColor) -> OverlapColor {
    match (a, b) {
        (OverlapColor::Green, _) | (_, OverlapColor::Green) => OverlapColor::Green,
        (OverlapColor::Yellow, _) | (_, OverlapColor::Yellow) => OverlapColor::Yellow,
        _ => OverlapColor::Red,
    }
}

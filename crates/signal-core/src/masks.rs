//! Fixed-width bitmasks over phases, rings, overlaps and CNA inputs.
//!
//! Bit `i` always stands for item `i + 1`. The 1-based domain numbering only
//! ever crosses into storage through [`Phase::bit`] and the `from_index`
//! constructors, so a phase number can never be used as a raw shift.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const PHASE_COUNT: usize = 8;
pub const RING_COUNT: usize = 2;
pub const OVERLAP_COUNT: usize = 4;
pub const CNA_INPUT_COUNT: usize = 2;
pub const PHASES_PER_RING: usize = PHASE_COUNT / RING_COUNT;

/// A 1-based phase number in `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Phase(u8);

impl Phase {
    pub const fn new(number: u8) -> Option<Self> {
        if number >= 1 && number as usize <= PHASE_COUNT {
            Some(Self(number))
        } else {
            None
        }
    }

    /// Phase for a 0-based storage index.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < PHASE_COUNT {
            Some(Self(index as u8 + 1))
        } else {
            None
        }
    }

    pub const fn number(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize - 1
    }

    pub const fn bit(self) -> u8 {
        1 << (self.0 - 1)
    }

    /// Ring that owns this phase.
    pub const fn ring(self) -> usize {
        self.index() / PHASES_PER_RING
    }

    /// Position within the owning ring, `0..4`.
    pub const fn position(self) -> usize {
        self.index() % PHASES_PER_RING
    }

    /// Barrier side this phase sits on: the first two phases of a ring are
    /// side 0, the last two side 1.
    pub const fn side(self) -> u8 {
        (self.position() / (PHASES_PER_RING / 2)) as u8
    }

    /// True for the last phase before a barrier (2, 4, 6, 8).
    pub const fn is_barrier_phase(self) -> bool {
        self.position() % (PHASES_PER_RING / 2) == (PHASES_PER_RING / 2) - 1
    }

    pub fn all() -> impl Iterator<Item = Phase> {
        (1..=PHASE_COUNT as u8).map(Phase)
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Phase::new(value).ok_or_else(|| format!("phase {value} out of range 1..={PHASE_COUNT}"))
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> Self {
        phase.0
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! bitmask {
    ($(#[$meta:meta])* $name:ident, $width:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u8);

        impl $name {
            pub const WIDTH: usize = $width;
            pub const ALL: Self = Self((((1u16 << $width) - 1) & 0xFF) as u8);
            pub const EMPTY: Self = Self(0);

            /// Builds a mask from raw bits, dropping anything above the width.
            pub const fn from_bits(bits: u8) -> Self {
                Self(bits & Self::ALL.0)
            }

            pub const fn bits(self) -> u8 {
                self.0
            }

            pub const fn from_index(index: usize) -> Self {
                if index < $width {
                    Self(1 << index)
                } else {
                    Self(0)
                }
            }

            pub const fn contains_index(self, index: usize) -> bool {
                index < $width && (self.0 & (1 << index)) != 0
            }

            pub fn set_index(&mut self, index: usize, on: bool) {
                if index < $width {
                    if on {
                        self.0 |= 1 << index;
                    } else {
                        self.0 &= !(1 << index);
                    }
                }
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
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

            pub const fn complement(self) -> Self {
                Self(!self.0 & Self::ALL.0)
            }

            pub fn indices(self) -> impl Iterator<Item = usize> {
                (0..$width).filter(move |i| self.contains_index(*i))
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                *self = self.union(rhs);
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                self.intersection(rhs)
            }
        }

        impl std::ops::BitAndAssign for $name {
            fn bitand_assign(&mut self, rhs: Self) {
                *self = self.intersection(rhs);
            }
        }

        impl std::ops::Not for $name {
            type Output = Self;
            fn not(self) -> Self {
                self.complement()
            }
        }
    };
}

bitmask!(
    /// One bit per phase; bit 0 is phase 1.
    PhaseMask,
    PHASE_COUNT
);
bitmask!(
    /// One bit per ring.
    RingMask,
    RING_COUNT
);
bitmask!(
    /// One bit per overlap (A through D).
    OverlapMask,
    OVERLAP_COUNT
);
bitmask!(
    /// One bit per call-to-non-actuated input.
    CnaMask,
    CNA_INPUT_COUNT
);

impl PhaseMask {
    pub const fn of(phase: Phase) -> Self {
        Self(phase.bit())
    }

    pub fn from_phases(phases: &[u8]) -> Self {
        phases
            .iter()
            .filter_map(|p| Phase::new(*p))
            .fold(Self::EMPTY, |mask, p| mask | Self::of(p))
    }

    pub const fn contains(self, phase: Phase) -> bool {
        self.0 & phase.bit() != 0
    }

    pub fn insert(&mut self, phase: Phase) {
        self.0 |= phase.bit();
    }

    pub fn remove(&mut self, phase: Phase) {
        self.0 &= !phase.bit();
    }

    pub fn set(&mut self, phase: Phase, on: bool) {
        if on {
            self.insert(phase);
        } else {
            self.remove(phase);
        }
    }

    /// All four phases owned by `ring`.
    pub const fn ring(ring: usize) -> Self {
        if ring < RING_COUNT {
            Self(0x0F << (ring * PHASES_PER_RING))
        } else {
            Self(0)
        }
    }

    /// The two phases of `ring` on barrier side `side`.
    pub const fn ring_side(ring: usize, side: u8) -> Self {
        if ring < RING_COUNT && side < 2 {
            Self(0x03 << (ring * PHASES_PER_RING + side as usize * 2))
        } else {
            Self(0)
        }
    }

    /// Every phase, in both rings, on barrier side `side`.
    pub const fn side(side: u8) -> Self {
        Self(Self::ring_side(0, side).0 | Self::ring_side(1, side).0)
    }

    /// Lowest-numbered phase in the mask.
    pub fn first(self) -> Option<Phase> {
        if self.0 == 0 {
            None
        } else {
            Phase::from_index(self.0.trailing_zeros() as usize)
        }
    }

    pub fn phases(self) -> impl Iterator<Item = Phase> {
        Phase::all().filter(move |p| self.contains(*p))
    }
}

impl From<Phase> for PhaseMask {
    fn from(phase: Phase) -> Self {
        Self::of(phase)
    }
}

impl RingMask {
    pub const fn contains(self, ring: usize) -> bool {
        self.contains_index(ring)
    }

    pub fn set(&mut self, ring: usize, on: bool) {
        self.set_index(ring, on);
    }
}

impl CnaMask {
    pub const fn contains(self, input: usize) -> bool {
        self.contains_index(input)
    }
}

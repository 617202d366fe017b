//! Persisted configuration image.
//!
//! The image holds the timing table, overlap and CNA masks, detector memory
//! and the unit/ring control bytes behind a checksum. A missing or corrupt
//! image falls back to factory defaults so the intersection always runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use signal_core::masks::{CNA_INPUT_COUNT, OVERLAP_COUNT};
use signal_core::timing::{DEFAULT_CNA, DEFAULT_OVERLAPS, DEFAULT_TIMING};
use signal_core::{Configuration, ControllerInputs, InputState, PhaseMask, RawTiming};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// A timing cell left erased reads as this many tenths.
pub const ERASED_TIMING: u16 = 0xFFFF;
pub const ERASED_TIMING_VALUE: u16 = 50;

const RANDOM_TIMING_VARIATION: u16 = 100;
const RANDOM_TIMING_OFFSET: u16 = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store image is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
    #[error("checksum mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    Checksum { stored: u16, computed: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub timing: RawTiming,
    pub overlaps: [u8; OVERLAP_COUNT],
    pub cna: [u8; CNA_INPUT_COUNT],
    pub vehicle_memory: u8,
    pub unit_control: u8,
    pub ring_control: u8,
    pub checksum: u16,
}

impl Default for StoredImage {
    fn default() -> Self {
        let mut image = Self {
            timing: DEFAULT_TIMING,
            overlaps: DEFAULT_OVERLAPS,
            cna: DEFAULT_CNA,
            vehicle_memory: PhaseMask::ALL.bits(),
            unit_control: 0,
            ring_control: 0,
            checksum: 0,
        };
        image.seal();
        image
    }
}

impl StoredImage {
    /// Sum of every stored byte, little-endian for the timing words.
    pub fn compute_checksum(&self) -> u16 {
        let timing = self
            .timing
            .iter()
            .flatten()
            .flat_map(|value| value.to_le_bytes());
        timing
            .chain(self.overlaps)
            .chain(self.cna)
            .chain([self.vehicle_memory, self.unit_control, self.ring_control])
            .fold(0u16, |sum, byte| sum.wrapping_add(u16::from(byte)))
    }

    pub fn seal(&mut self) {
        self.checksum = self.compute_checksum();
    }

    pub fn verify(&self) -> Result<(), StoreError> {
        let computed = self.compute_checksum();
        if computed != self.checksum {
            return Err(StoreError::Checksum {
                stored: self.checksum,
                computed,
            });
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path)?;
        let image: Self = serde_json::from_slice(&bytes)?;
        image.verify()?;
        Ok(image)
    }

    /// Loads the image, or factory defaults when it is absent or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(image) => {
                info!(path = %path.display(), "Loaded configuration image");
                image
            }
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No configuration image, using factory defaults");
                Self::default()
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Discarding configuration image");
                Self::default()
            }
        }
    }

    /// Writes the image with a fresh checksum.
    pub fn save(&mut self, path: &Path) -> Result<(), StoreError> {
        self.seal();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn configuration(&self) -> Configuration {
        let mut timing = self.timing;
        for value in timing.iter_mut().flatten() {
            if *value == ERASED_TIMING {
                *value = ERASED_TIMING_VALUE;
            }
        }
        Configuration::load(timing, self.overlaps, self.cna)
    }

    /// Initial operator inputs seeded from the control bytes.
    pub fn input_state(&self) -> InputState {
        let mut state = InputState {
            vehicle_memory: PhaseMask::from_bits(self.vehicle_memory),
            ..InputState::default()
        };
        state.rings.apply_ring_control(self.ring_control);
        state.inputs.apply_unit_control(self.unit_control);
        state
    }

    pub fn randomize_requested(&self) -> bool {
        ControllerInputs::from_bits(self.unit_control).contains(ControllerInputs::RANDOMIZE_TIMING)
    }
}

/// Seeded random timing table for soak runs.
pub fn randomize_timing(seed: u64) -> RawTiming {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut timing = [[0u16; signal_core::TimingParam::COUNT]; signal_core::masks::PHASE_COUNT];
    for value in timing.iter_mut().flatten() {
        *value = rng.gen_range(0..RANDOM_TIMING_VARIATION) + RANDOM_TIMING_OFFSET;
    }
    timing
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_core::{Phase, TimingParam};

    #[test]
    fn default_image_is_sealed() {
        let image = StoredImage::default();
        assert!(image.verify().is_ok());
        assert_eq!(image.configuration(), Configuration::default());
    }

    #[test]
    fn erased_cells_read_as_fifty() {
        let mut image = StoredImage::default();
        image.timing[3][TimingParam::Yellow.index()] = ERASED_TIMING;
        let config = image.configuration();
        let p4 = Phase::new(4).unwrap();
        assert_eq!(config.timing(p4, TimingParam::Yellow), ERASED_TIMING_VALUE);
    }

    #[test]
    fn tampering_breaks_the_checksum() {
        let mut image = StoredImage::default();
        image.ring_control = 0x30;
        assert!(matches!(image.verify(), Err(StoreError::Checksum { .. })));
        image.seal();
        assert!(image.verify().is_ok());
    }

    #[test]
    fn control_bytes_seed_inputs() {
        let image = StoredImage {
            vehicle_memory: 0x0F,
            unit_control: 0xFF,
            ring_control: 0b0001_0010,
            ..StoredImage::default()
        };
        let state = image.input_state();
        assert_eq!(state.vehicle_memory, PhaseMask::from_phases(&[1, 2, 3, 4]));
        assert!(state.rings.omit_red_clear.contains(1));
        assert!(state.rings.ped_recycle.contains(0));
        assert!(state.inputs.contains(ControllerInputs::WALK_REST_MODIFIER));
        assert!(image.randomize_requested());
    }

    #[test]
    fn randomized_timing_is_seeded() {
        let a = randomize_timing(7);
        assert_eq!(a, randomize_timing(7));
        assert_ne!(a, randomize_timing(8));
        assert!(a.iter().flatten().all(|v| (10..110).contains(v)));
    }
}

use crate::controller::Tenths;
use crate::hal::{IntersectionIo, IoStats};
use crate::masks::{Phase, PhaseMask, PHASE_COUNT};
use crate::output::SignalOutput;
use serde::{Deserialize, Serialize};

/// Arrival pattern for the simulated approaches, in tenths of a second.
/// A period of zero means no demand on that phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand {
    pub vehicle_period: [u16; PHASE_COUNT],
    pub ped_period: [u16; PHASE_COUNT],
    /// How long a vehicle occupies the detector.
    pub occupancy: u16,
}

impl Default for Demand {
    fn default() -> Self {
        Self {
            vehicle_period: [45, 25, 70, 40, 45, 25, 70, 40],
            ped_period: [0, 300, 0, 450, 0, 300, 0, 450],
            occupancy: 3,
        }
    }
}

/// Deterministic intersection with periodic arrivals. Vehicles that arrive
/// while their phase is not green queue up and hold the detector until the
/// phase turns green.
#[derive(Debug, Clone)]
pub struct SimulatedIntersection {
    demand: Demand,
    now: Tenths,
    queued: [u16; PHASE_COUNT],
    occupied_until: [Tenths; PHASE_COUNT],
    vehicle_detector: PhaseMask,
    ped_detector: PhaseMask,
    last_output: SignalOutput,
    served: [u64; PHASE_COUNT],
    stats: IoStats,
}

impl SimulatedIntersection {
    pub fn new(demand: Demand) -> Self {
        Self {
            demand,
            now: 0,
            queued: [0; PHASE_COUNT],
            occupied_until: [0; PHASE_COUNT],
            vehicle_detector: PhaseMask::EMPTY,
            ped_detector: PhaseMask::EMPTY,
            last_output: SignalOutput::default(),
            served: [0; PHASE_COUNT],
            stats: IoStats::default(),
        }
    }

    /// Vehicles discharged per phase so far.
    pub fn served(&self) -> [u64; PHASE_COUNT] {
        self.served
    }

    pub fn queued(&self, phase: Phase) -> u16 {
        self.queued[phase.index()]
    }

    fn arrives(period: u16, now: Tenths, phase: Phase) -> bool {
        // stagger phases so arrivals do not all coincide
        period != 0 && (now + u32::from(phase.number()) * 7) % u32::from(period) == 0
    }
}

impl Default for SimulatedIntersection {
    fn default() -> Self {
        Self::new(Demand::default())
    }
}

impl IntersectionIo for SimulatedIntersection {
    fn step(&mut self, now: Tenths) {
        self.now = now;
        let before = (self.vehicle_detector, self.ped_detector);
        let green = self.last_output.green;

        let mut vehicle = PhaseMask::EMPTY;
        let mut ped = PhaseMask::EMPTY;
        for phase in Phase::all() {
            let i = phase.index();
            if Self::arrives(self.demand.vehicle_period[i], now, phase) {
                self.queued[i] = self.queued[i].saturating_add(1);
                self.occupied_until[i] = now + u32::from(self.demand.occupancy);
            }

            // one vehicle leaves per two seconds of green
            if green.contains(phase) && self.queued[i] > 0 && now % 20 == 0 {
                self.queued[i] -= 1;
                self.served[i] += 1;
            }

            let occupied = now < self.occupied_until[i];
            let waiting = self.queued[i] > 0 && !green.contains(phase);
            vehicle.set(phase, occupied || waiting);
            ped.set(phase, Self::arrives(self.demand.ped_period[i], now, phase));
        }

        self.vehicle_detector = vehicle;
        self.ped_detector = ped;
        if before != (vehicle, ped) {
            self.stats.detector_changes += 1;
        }
    }

    fn read_vehicle_detectors(&self) -> PhaseMask {
        self.vehicle_detector
    }

    fn read_ped_detectors(&self) -> PhaseMask {
        self.ped_detector
    }

    fn write_output(&mut self, output: &SignalOutput) {
        self.last_output = *output;
        self.stats.outputs_written += 1;
        self.stats.last_write_tick = self.now;
    }

    fn io_stats(&self) -> IoStats {
        self.stats.clone()
    }

    fn is_healthy(&self) -> bool {
        crate::monitor::check(&self.last_output).is_ok()
    }
}

use crate::controller::Tenths;
use crate::masks::PhaseMask;
use crate::output::SignalOutput;

#[derive(Clone, Default, Debug)]
pub struct IoStats {
    pub outputs_written: u64,
    pub detector_changes: u64,
    pub last_write_tick: Tenths,
}

/// Field I/O seen by the signal thread: detector inputs in, lamp outputs out.
pub trait IntersectionIo: Send {
    /// Advances the field to `now`. Real hardware samples here.
    fn step(&mut self, now: Tenths);
    fn read_vehicle_detectors(&self) -> PhaseMask;
    fn read_ped_detectors(&self) -> PhaseMask;
    fn write_output(&mut self, output: &SignalOutput);
    fn io_stats(&self) -> IoStats;
    fn is_healthy(&self) -> bool;
}

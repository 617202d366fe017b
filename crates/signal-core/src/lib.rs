//! Dual-ring actuated traffic signal controller core.
//!
//! [`Controller`] is a tick-driven state machine over eight phases in two
//! rings of four, with a barrier between phases {1,2,5,6} and {3,4,7,8}.
//! It does no I/O: inputs are staged through setters and merged at the top of
//! each [`Controller::update`], and outputs are read back as a
//! [`SignalOutput`].

mod barrier;
mod calls;
pub mod control_loop;
pub mod controller;
mod controller_proptest;
pub mod error;
mod gap;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod inputs;
pub mod masks;
pub mod monitor;
pub mod output;
pub mod overlap;
pub mod ring;
pub mod sync;
pub mod tags;
pub mod timebase;
pub mod timing;

pub use barrier::BarrierCrossState;
pub use control_loop::{CycleObserver, ExecutionStats, LoopConfig, SignalThread};
pub use controller::{Controller, ControllerSnapshot, Tenths};
pub use error::{InvariantPolicy, InvariantViolation};
pub use hal::{IntersectionIo, IoStats};
#[cfg(feature = "simulation")]
pub use hal_sim::{Demand, SimulatedIntersection};
pub use inputs::{ControllerInputs, InputState, RingControls};
pub use masks::{CnaMask, OverlapMask, Phase, PhaseMask, RingMask};
pub use monitor::{ConflictFault, ConflictMonitor, MonitorState};
pub use output::{OutputFlags, RingStatus, SignalOutput};
pub use overlap::{OverlapColor, OverlapState};
pub use ring::{BarrierState, ClearanceReason, Interval, PedInterval, Ring, VariableInitial};
pub use sync::{InputCommand, SignalSnapshot, StateExchange};
pub use timebase::TimeBase;
pub use timing::{Configuration, RawTiming, TimingParam, TimingTable};

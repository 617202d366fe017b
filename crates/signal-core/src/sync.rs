use crate::controller::ControllerSnapshot;
use crate::inputs::InputState;
use crate::monitor::MonitorState;
use serde::{Deserialize, Serialize};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// What the signal thread publishes once per cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub timestamp_us: u64,
    pub cycle_count: u64,
    pub cycle_jitter_us: u32,
    pub monitor: MonitorState,
    pub controller: ControllerSnapshot,
}

/// Operator input set submitted from outside the signal thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputCommand {
    pub sequence: u64,
    pub inputs: InputState,
}

struct TripleBuffer<T: Copy + Default> {
    slots: [UnsafeCell<T>; 3],
    index: AtomicUsize,
}

unsafe impl<T: Copy + Default + Send> Send for TripleBuffer<T> {}
unsafe impl<T: Copy + Default + Sync> Sync for TripleBuffer<T> {}

impl<T: Copy + Default> TripleBuffer<T> {
    fn new() -> Self {
        let slots = std::array::from_fn(|_| UnsafeCell::new(T::default()));
        Self {
            slots,
            index: AtomicUsize::new(0),
        }
    }

    fn write(&self, value: T) {
        let current = self.index.load(Ordering::Relaxed);
        let next = (current + 1) % 3;
        unsafe {
            *self.slots[next].get() = value;
        }
        self.index.store(next, Ordering::Release);
    }

    fn read(&self) -> T {
        let idx = self.index.load(Ordering::Acquire);
        unsafe { *self.slots[idx].get() }
    }
}

/// Lock-free hand-off between the signal thread and everything else.
pub struct StateExchange {
    signal_state: TripleBuffer<SignalSnapshot>,
    operator_inputs: TripleBuffer<InputCommand>,
    next_sequence: AtomicU64,
}

impl StateExchange {
    pub fn new() -> Self {
        Self {
            signal_state: TripleBuffer::new(),
            operator_inputs: TripleBuffer::new(),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Called by the signal thread every cycle.
    pub fn publish_state(&self, state: SignalSnapshot) {
        self.signal_state.write(state);
    }

    pub fn read_state(&self) -> SignalSnapshot {
        self.signal_state.read()
    }

    /// Replaces the operator input set. Returns the sequence number assigned.
    pub fn submit_inputs(&self, inputs: InputState) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        self.operator_inputs.write(InputCommand { sequence, inputs });
        sequence
    }

    /// Latest operator inputs newer than `seen`, if any.
    pub fn inputs_since(&self, seen: u64) -> Option<InputCommand> {
        let command = self.operator_inputs.read();
        (command.sequence > seen).then_some(command)
    }
}

impl Default for StateExchange {
    fn default() -> Self {
        Self::new()
    }
}

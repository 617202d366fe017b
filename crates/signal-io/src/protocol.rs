//! JSON line messages exchanged with operator consoles and recorders.

use serde::{Deserialize, Serialize};
use signal_core::{
    tags, BarrierCrossState, BarrierState, ClearanceReason, CnaMask, ControllerInputs, InputState,
    Interval, MonitorState, PedInterval, PhaseMask, Ring, RingMask, SignalSnapshot,
};
use thiserror::Error;

pub const STATE_TAGS: &[tags::Tag] = &[
    tags::RING_PHASE,
    tags::RING_INTERVAL,
    tags::OVERLAP_STATE,
    tags::VEHICLE_CALLS,
    tags::PED_CALLS,
    tags::TICKS,
    tags::BARRIER_CROSSINGS,
    tags::INVARIANT_VIOLATIONS,
    tags::MONITOR_STATE,
    tags::CYCLE_JITTER_US,
];

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const fn v1() -> Self {
        Self { major: 1, minor: 0 }
    }

    /// Messages that omit the version are taken as v1.
    pub fn is_supported(&self) -> bool {
        self.major == 1 || *self == Self::default()
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message has no type")]
    MissingType,
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(ProtocolVersion),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RingMsg {
    pub phase: u8,
    pub next_phase: u8,
    pub interval: Interval,
    pub ped_interval: PedInterval,
    pub interval_timer: u16,
    pub passage_timer: u16,
    pub max_timer: u16,
    pub ped_timer: u16,
    pub barrier_state: BarrierState,
    pub clearance_reason: ClearanceReason,
}

impl From<&Ring> for RingMsg {
    fn from(ring: &Ring) -> Self {
        Self {
            phase: ring.phase.map_or(0, |p| p.number()),
            next_phase: ring.next_phase.map_or(0, |p| p.number()),
            interval: ring.interval,
            ped_interval: ring.ped_interval,
            interval_timer: ring.interval_timer,
            passage_timer: ring.passage_timer,
            max_timer: ring.max_timer,
            ped_timer: ring.ped_timer,
            barrier_state: ring.barrier_state,
            clearance_reason: ring.clearance_reason,
        }
    }
}

/// Published controller state. Phase masks are bytes, bit 0 = phase 1.
#[derive(Debug, Serialize)]
pub struct StateMsg {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub protocol_version: ProtocolVersion,
    pub sequence: u64,
    pub timestamp_us: u64,
    pub cycle_count: u64,
    pub cycle_jitter_us: u32,
    pub time: u32,
    pub tick_count: u64,
    pub rings: [RingMsg; 2],
    pub barrier_cross_state: BarrierCrossState,
    pub barrier_side: u8,
    pub barrier_crossings: u64,
    pub red: u8,
    pub yellow: u8,
    pub green: u8,
    pub walk: u8,
    pub dont_walk: u8,
    pub vehicle_call: u8,
    pub ped_call: u8,
    pub overlap_state: u8,
    pub monitor: MonitorState,
    pub violations: u64,
}

impl StateMsg {
    pub fn from_snapshot(sequence: u64, snapshot: &SignalSnapshot) -> Self {
        let controller = &snapshot.controller;
        let output = &controller.output;
        Self {
            msg_type: "state",
            protocol_version: ProtocolVersion::v1(),
            sequence,
            timestamp_us: snapshot.timestamp_us,
            cycle_count: snapshot.cycle_count,
            cycle_jitter_us: snapshot.cycle_jitter_us,
            time: controller.time,
            tick_count: controller.tick_count,
            rings: [
                RingMsg::from(&controller.rings[0]),
                RingMsg::from(&controller.rings[1]),
            ],
            barrier_cross_state: controller.barrier_cross_state,
            barrier_side: controller.barrier_side,
            barrier_crossings: controller.barrier_crossings,
            red: output.red.bits(),
            yellow: output.yellow.bits(),
            green: output.green.bits(),
            walk: output.walk.bits(),
            dont_walk: output.dont_walk.bits(),
            vehicle_call: output.vehicle_call.bits(),
            ped_call: output.ped_call.bits(),
            overlap_state: output.overlap_state.bits(),
            monitor: snapshot.monitor,
            violations: controller.violations,
        }
    }
}

/// Operator input changes. Absent fields leave the current value alone.
#[derive(Debug, Default, Deserialize)]
pub struct InputsMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub sequence: u64,
    pub hold: Option<u8>,
    pub ped_omit: Option<u8>,
    pub phase_omit: Option<u8>,
    pub vehicle_memory: Option<u8>,
    pub force_off: Option<u8>,
    pub stop_timing: Option<u8>,
    pub inhibit_max_termination: Option<u8>,
    pub ring_control: Option<u8>,
    pub call_to_non_actuated: Option<u8>,
    pub inputs: Option<u8>,
}

impl InputsMsg {
    pub fn apply(&self, state: &mut InputState) {
        if let Some(bits) = self.hold {
            state.hold = PhaseMask::from_bits(bits);
        }
        if let Some(bits) = self.ped_omit {
            state.ped_omit = PhaseMask::from_bits(bits);
        }
        if let Some(bits) = self.phase_omit {
            state.phase_omit = PhaseMask::from_bits(bits);
        }
        if let Some(bits) = self.vehicle_memory {
            state.vehicle_memory = PhaseMask::from_bits(bits);
        }
        if let Some(bits) = self.force_off {
            state.rings.force_off = RingMask::from_bits(bits);
        }
        if let Some(bits) = self.stop_timing {
            state.rings.stop_timing = RingMask::from_bits(bits);
        }
        if let Some(bits) = self.inhibit_max_termination {
            state.rings.inhibit_max_termination = RingMask::from_bits(bits);
        }
        if let Some(byte) = self.ring_control {
            state.rings.apply_ring_control(byte);
        }
        if let Some(bits) = self.call_to_non_actuated {
            state.call_to_non_actuated = CnaMask::from_bits(bits);
        }
        if let Some(bits) = self.inputs {
            state.inputs = ControllerInputs::from_bits(bits);
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HelloMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug)]
pub enum IncomingMessage {
    Hello(HelloMsg),
    Inputs(InputsMsg),
}

impl IncomingMessage {
    pub fn parse(line: &str) -> Result<Self, MessageError> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let msg_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(MessageError::MissingType)?
            .to_string();

        let message = match msg_type.as_str() {
            "inputs" => IncomingMessage::Inputs(serde_json::from_value(value)?),
            "hello" => IncomingMessage::Hello(serde_json::from_value(value)?),
            _ => return Err(MessageError::UnknownType(msg_type)),
        };

        let version = message.protocol_version();
        if !version.is_supported() {
            return Err(MessageError::UnsupportedVersion(version));
        }
        Ok(message)
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        match self {
            Self::Hello(hello) => hello.protocol_version,
            Self::Inputs(inputs) => inputs.protocol_version,
        }
    }
}

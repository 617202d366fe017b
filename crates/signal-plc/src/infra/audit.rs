//! Audit trail of signal events.
//!
//! Every phase start, clearance and barrier crossing is appended to a JSONL
//! file together with run start/stop and monitor trips.

use serde::{Deserialize, Serialize};
use signal_core::{ClearanceReason, Interval, MonitorState, SignalSnapshot};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Types of events that are logged in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// System startup
    SystemStart,
    /// System shutdown
    SystemShutdown,
    /// Configuration image loaded or defaulted
    ConfigLoaded,
    /// A ring started timing a phase
    PhaseStart,
    /// A green phase terminated into yellow
    Clearance,
    /// Both rings crossed to the other side of the barrier
    BarrierCross,
    /// Conflict monitor latched flash
    MonitorFlash,
    /// Controller reported a logic invariant violation
    InvariantViolation,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    /// Type of event being logged
    pub event_type: AuditEventType,
    /// Additional event-specific details
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Create a new audit logger writing to the specified path.
    /// The file is opened in append mode to preserve existing logs.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    /// Log an audit entry. This is thread-safe and can be called from any thread.
    pub fn log(&self, entry: AuditEntry) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("audit writer poisoned"))?;
        serde_json::to_writer(&mut *writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Convenience method to log with just event type and details
    pub fn log_event(
        &self,
        timestamp_us: u64,
        unix_us: u64,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> std::io::Result<()> {
        self.log(AuditEntry {
            timestamp_us,
            unix_us,
            event_type,
            details,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseStartDetails {
    pub ring: usize,
    pub phase: u8,
    pub time: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearanceDetails {
    pub ring: usize,
    pub phase: u8,
    pub reason: ClearanceReason,
    pub time: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BarrierCrossDetails {
    pub side: u8,
    pub crossings: u64,
    pub time: u32,
}

/// Turns consecutive snapshots into audit events.
#[derive(Debug, Default)]
pub struct SignalEventTracker {
    last: Option<SignalSnapshot>,
}

impl SignalEventTracker {
    pub fn observe(&mut self, next: &SignalSnapshot) -> Vec<(AuditEventType, serde_json::Value)> {
        let Some(prev) = self.last.replace(*next) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let time = next.controller.time;
        for (ring, (before, after)) in prev
            .controller
            .rings
            .iter()
            .zip(next.controller.rings.iter())
            .enumerate()
        {
            if after.interval.is_clearance() && before.interval.is_green() {
                if let Some(phase) = before.phase {
                    events.push(event(
                        AuditEventType::Clearance,
                        ClearanceDetails {
                            ring,
                            phase: phase.number(),
                            reason: after.clearance_reason,
                            time,
                        },
                    ));
                }
            }

            let restarted = after.phase != before.phase || !before.interval.is_green();
            if after.interval == Interval::MinGreen && restarted {
                if let Some(phase) = after.phase {
                    events.push(event(
                        AuditEventType::PhaseStart,
                        PhaseStartDetails {
                            ring,
                            phase: phase.number(),
                            time,
                        },
                    ));
                }
            }
        }

        if next.controller.barrier_crossings > prev.controller.barrier_crossings {
            events.push(event(
                AuditEventType::BarrierCross,
                BarrierCrossDetails {
                    side: next.controller.barrier_side,
                    crossings: next.controller.barrier_crossings,
                    time,
                },
            ));
        }

        if next.monitor == MonitorState::Flash && prev.monitor != MonitorState::Flash {
            events.push((
                AuditEventType::MonitorFlash,
                serde_json::json!({ "time": time }),
            ));
        }

        if next.controller.violations > prev.controller.violations {
            events.push((
                AuditEventType::InvariantViolation,
                serde_json::json!({ "time": time, "violations": next.controller.violations }),
            ));
        }

        events
    }
}

fn event<T: Serialize>(event_type: AuditEventType, details: T) -> (AuditEventType, serde_json::Value) {
    (
        event_type,
        serde_json::to_value(details).unwrap_or(serde_json::Value::Null),
    )
}

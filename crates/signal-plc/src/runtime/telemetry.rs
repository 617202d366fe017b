use prometheus::IntCounter;
use signal_core::{Interval, MonitorState, SignalSnapshot, StateExchange};
use signal_io::metrics::{
    init_metrics, serve_metrics, BARRIER_CROSSINGS, CYCLES_EXECUTED, CYCLE_JITTER_US,
    INVARIANT_VIOLATIONS, MONITOR_STATE, OVERLAP_STATE, PED_CALLS, RING_INTERVAL, RING_PHASE,
    TICKS, VEHICLE_CALLS,
};
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Last counter values pushed to Prometheus, so counters advance by deltas.
#[derive(Debug, Default)]
pub struct MetricsCursor {
    cycles: u64,
    ticks: u64,
    crossings: u64,
    violations: u64,
}

pub fn record(snapshot: &SignalSnapshot, cursor: &mut MetricsCursor) {
    let controller = &snapshot.controller;
    for (ring, state) in controller.rings.iter().enumerate() {
        let label = ring.to_string();
        RING_PHASE
            .with_label_values(&[label.as_str()])
            .set(state.phase.map_or(0, |p| i64::from(p.number())));
        RING_INTERVAL
            .with_label_values(&[label.as_str()])
            .set(interval_code(state.interval));
    }

    let output = &controller.output;
    OVERLAP_STATE.set(i64::from(output.overlap_state.bits()));
    VEHICLE_CALLS.set(i64::from(output.vehicle_call.bits()));
    PED_CALLS.set(i64::from(output.ped_call.bits()));
    MONITOR_STATE.set(match snapshot.monitor {
        MonitorState::Normal => 0,
        MonitorState::Flash => 1,
    });
    CYCLE_JITTER_US.observe(f64::from(snapshot.cycle_jitter_us));

    advance(&CYCLES_EXECUTED, &mut cursor.cycles, snapshot.cycle_count);
    advance(&TICKS, &mut cursor.ticks, controller.tick_count);
    advance(&BARRIER_CROSSINGS, &mut cursor.crossings, controller.barrier_crossings);
    advance(&INVARIANT_VIOLATIONS, &mut cursor.violations, controller.violations);
}

fn advance(counter: &IntCounter, last: &mut u64, now: u64) {
    if now > *last {
        counter.inc_by(now - *last);
        *last = now;
    }
}

fn interval_code(interval: Interval) -> i64 {
    match interval {
        Interval::Invalid => 0,
        Interval::MinGreen => 1,
        Interval::PreMaxRest => 2,
        Interval::MaxI => 3,
        Interval::MaxII => 4,
        Interval::Yellow => 5,
        Interval::RedClear => 6,
    }
}

pub fn start_metrics_updater(
    exchange: Arc<StateExchange>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut cursor = MetricsCursor::default();
        while !stop.load(std::sync::atomic::Ordering::Relaxed) {
            record(&exchange.read_state(), &mut cursor);
            thread::sleep(Duration::from_millis(200));
        }
    })
}

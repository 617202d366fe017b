//! Prometheus metrics for the signal controller.
//!
//! Counters track the run loop; gauges mirror the latest published
//! snapshot (ring phases and intervals, calls, overlaps, monitor state).

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use signal_core::tags;
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Run Loop Metrics
// ============================================================================

/// Total signal cycles executed
pub static CYCLES_EXECUTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "signal_cycles_executed_total",
        "Total signal cycles executed",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Signal cycles missed (overruns)
pub static CYCLES_MISSED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "signal_cycles_missed_total",
        "Signal cycles missed due to timing overruns",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Cycle jitter distribution in microseconds
pub static CYCLE_JITTER_US: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            tags::CYCLE_JITTER_US.metric,
            "Signal cycle jitter distribution in microseconds",
        )
        .buckets(vec![
            10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0, 50000.0,
        ]),
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

/// Controller ticks (tenths of a second) stepped
pub static TICKS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(tags::TICKS.metric, "Controller ticks stepped").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Controller Metrics
// ============================================================================

/// Phase in service per ring (0 = none)
pub static RING_PHASE: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(tags::RING_PHASE.metric, "Phase in service per ring (0=none)"),
        &["ring"],
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Interval per ring (0=invalid,1=min green,2=rest,3=max I,4=max II,5=yellow,6=red clear)
pub static RING_INTERVAL: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(
            tags::RING_INTERVAL.metric,
            "Interval per ring (0=invalid,1=min green,2=rest,3=max I,4=max II,5=yellow,6=red clear)",
        ),
        &["ring"],
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Overlap state byte (greens in the low nibble, yellows in the high nibble)
pub static OVERLAP_STATE: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        tags::OVERLAP_STATE.metric,
        "Overlap state (green bits 0-3, yellow bits 4-7)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Vehicle calls waiting, as a phase bitmask
pub static VEHICLE_CALLS: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        tags::VEHICLE_CALLS.metric,
        "Vehicle calls waiting (phase bitmask)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Pedestrian calls waiting, as a phase bitmask
pub static PED_CALLS: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        tags::PED_CALLS.metric,
        "Pedestrian calls waiting (phase bitmask)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Completed barrier crossings
pub static BARRIER_CROSSINGS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        tags::BARRIER_CROSSINGS.metric,
        "Completed barrier crossings",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Logic invariant violations reported by the controller
pub static INVARIANT_VIOLATIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        tags::INVARIANT_VIOLATIONS.metric,
        "Controller logic invariant violations",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Monitor Metrics
// ============================================================================

/// Conflict monitor state (0=normal,1=flash)
pub static MONITOR_STATE: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        tags::MONITOR_STATE.metric,
        "Conflict monitor state (0=normal,1=flash)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            let response = match request.url() {
                "/metrics" => match encode() {
                    Ok(buffer) => Response::from_data(buffer).with_header(
                        tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        )
                        .unwrap(),
                    ),
                    Err(e) => {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        Response::from_string("Internal Server Error").with_status_code(500)
                    }
                },
                "/health" => Response::from_string("OK"),
                // Ready once the signal thread has stepped at least once
                "/ready" if CYCLES_EXECUTED.get() > 0 => Response::from_string("Ready"),
                "/ready" => Response::from_string("Not Ready").with_status_code(503),
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    })
}

/// Text exposition of everything in [`REGISTRY`].
pub fn encode() -> prometheus::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = CYCLES_EXECUTED.get();
    let _ = CYCLES_MISSED.get();
    let _ = CYCLE_JITTER_US.get_sample_count();
    let _ = TICKS.get();
    for ring in ["0", "1"] {
        let _ = RING_PHASE.with_label_values(&[ring]).get();
        let _ = RING_INTERVAL.with_label_values(&[ring]).get();
    }
    let _ = OVERLAP_STATE.get();
    let _ = VEHICLE_CALLS.get();
    let _ = PED_CALLS.get();
    let _ = BARRIER_CROSSINGS.get();
    let _ = INVARIANT_VIOLATIONS.get();
    let _ = MONITOR_STATE.get();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_signal_metrics() {
        init_metrics();
        RING_PHASE.with_label_values(&["1"]).set(6);
        let text = String::from_utf8(encode().unwrap()).unwrap();
        assert!(text.contains("signal_ring_phase{ring=\"1\"} 6"));
        assert!(text.contains(tags::BARRIER_CROSSINGS.metric));
        assert!(text.contains(tags::MONITOR_STATE.metric));
    }
}

use crate::infra::audit::{AuditEventType, AuditLogger, SignalEventTracker};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use signal_core::{
    Configuration, Controller, ExecutionStats, InputState, IntersectionIo, IoStats, LoopConfig,
    PhaseMask, SignalOutput, SignalThread, SimulatedIntersection, StateExchange, Tenths,
    TimeBase,
};
use signal_io::protocol::{IncomingMessage, MessageError, StateMsg};
use signal_io::store::{randomize_timing, StoredImage};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to open audit log {}: {source}", .path.display())]
    Audit {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read inputs file {}: {source}", .path.display())]
    InputsFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}:{line}: {source}", .path.display())]
    InputsMessage {
        path: PathBuf,
        line: usize,
        source: MessageError,
    },
    #[error("failed to write replay output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("signal thread panicked")]
    SignalThread,
}

/// Field I/O the runtime can drive.
enum FieldIo {
    Simulated(SimulatedIntersection),
    /// No field wiring: detectors read empty, outputs are only counted.
    Detached { stats: IoStats },
}

impl IntersectionIo for FieldIo {
    fn step(&mut self, now: Tenths) {
        match self {
            Self::Simulated(io) => io.step(now),
            Self::Detached { .. } => {}
        }
    }

    fn read_vehicle_detectors(&self) -> PhaseMask {
        match self {
            Self::Simulated(io) => io.read_vehicle_detectors(),
            Self::Detached { .. } => PhaseMask::EMPTY,
        }
    }

    fn read_ped_detectors(&self) -> PhaseMask {
        match self {
            Self::Simulated(io) => io.read_ped_detectors(),
            Self::Detached { .. } => PhaseMask::EMPTY,
        }
    }

    fn write_output(&mut self, output: &SignalOutput) {
        match self {
            Self::Simulated(io) => io.write_output(output),
            Self::Detached { stats } => stats.outputs_written += 1,
        }
    }

    fn io_stats(&self) -> IoStats {
        match self {
            Self::Simulated(io) => io.io_stats(),
            Self::Detached { stats } => stats.clone(),
        }
    }

    fn is_healthy(&self) -> bool {
        match self {
            Self::Simulated(io) => io.is_healthy(),
            Self::Detached { .. } => true,
        }
    }
}

pub fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "signal-plc stopped");
            eprintln!("signal-plc: {e}");
            ExitCode::FAILURE
        }
    }
}

pub fn run(config: RuntimeConfig) -> Result<(), RuntimeError> {
    // Keep the file writer alive for the whole run
    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());

    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let timebase = TimeBase::new();
    let audit_logger = init_audit_logger(config.audit_path.as_ref())?;

    if let Some(ref logger) = audit_logger {
        let _ = logger.log_event(
            timebase.now_us(),
            timebase.unix_us(),
            AuditEventType::SystemStart,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "simulation": config.simulation,
                "replay_ticks": config.replay_ticks,
                "metrics_enabled": config.metrics_addr.is_some(),
            }),
        );
    }

    let image = match config.config_path.as_deref() {
        Some(path) => StoredImage::load_or_default(path),
        None => StoredImage::default(),
    };
    let configuration = load_configuration(&image, config.seed, &timebase);
    if let Some(ref logger) = audit_logger {
        let _ = logger.log_event(
            timebase.now_us(),
            timebase.unix_us(),
            AuditEventType::ConfigLoaded,
            serde_json::json!({
                "path": config.config_path,
                "checksum": image.checksum,
                "randomized": image.randomize_requested(),
            }),
        );
    }

    let mut inputs = image.input_state();
    if let Some(path) = config.inputs_path.as_deref() {
        apply_inputs_file(path, &mut inputs)?;
    }

    let exchange = Arc::new(StateExchange::new());
    exchange.submit_inputs(inputs);

    let io = if config.simulation {
        FieldIo::Simulated(SimulatedIntersection::default())
    } else {
        info!("Simulation disabled, running without detector input");
        FieldIo::Detached {
            stats: IoStats::default(),
        }
    };

    let loop_config = LoopConfig {
        cycle_time: config.cycle_time,
        ..LoopConfig::default()
    };
    let mut signal = SignalThread::new(
        io,
        Controller::new(configuration),
        loop_config,
        Arc::clone(&exchange),
        timebase,
    );

    if let Some(ref logger) = audit_logger {
        let logger = Arc::clone(logger);
        let mut tracker = SignalEventTracker::default();
        signal.set_observer(Box::new(move |snapshot| {
            for (event_type, details) in tracker.observe(snapshot) {
                if let Err(e) = logger.log_event(
                    snapshot.timestamp_us,
                    timebase.unix_us(),
                    event_type,
                    details,
                ) {
                    warn!(error = %e, "Failed to write audit event");
                }
            }
        }));
    }

    let stats = match config.replay_ticks {
        Some(ticks) => replay(signal, ticks, &exchange)?,
        None => run_live(signal, &config, &exchange)?,
    };

    info!(
        cycles_executed = stats.cycles_executed,
        cycles_missed = stats.cycles_missed,
        conflict_trips = stats.conflict_trips,
        max_jitter_us = stats.max_jitter_us,
        "Run complete"
    );

    if let Some(ref logger) = audit_logger {
        let snapshot = exchange.read_state();
        let _ = logger.log_event(
            timebase.now_us(),
            timebase.unix_us(),
            AuditEventType::SystemShutdown,
            serde_json::json!({
                "cycles_executed": stats.cycles_executed,
                "cycles_missed": stats.cycles_missed,
                "conflict_trips": stats.conflict_trips,
                "barrier_crossings": snapshot.controller.barrier_crossings,
            }),
        );
    }
    Ok(())
}

/// Runs in simulated time and prints the final state as one JSON line.
fn replay(
    mut signal: SignalThread<FieldIo>,
    ticks: u32,
    exchange: &StateExchange,
) -> Result<ExecutionStats, RuntimeError> {
    info!(ticks, "Replaying in simulated time");
    signal.run_for_ticks(0, ticks);

    let snapshot = exchange.read_state();
    telemetry::record(&snapshot, &mut telemetry::MetricsCursor::default());
    println!(
        "{}",
        serde_json::to_string(&StateMsg::from_snapshot(1, &snapshot))?
    );
    Ok(signal.stats().clone())
}

fn run_live(
    mut signal: SignalThread<FieldIo>,
    config: &RuntimeConfig,
    exchange: &Arc<StateExchange>,
) -> Result<ExecutionStats, RuntimeError> {
    let stop = Arc::new(AtomicBool::new(false));

    info!(
        cycle_time_ms = config.cycle_time.as_millis(),
        "Starting signal thread"
    );
    let stop_signal = Arc::clone(&stop);
    let signal_handle = thread::spawn(move || {
        signal.run(&stop_signal);
        signal.stats().clone()
    });

    let updater = config.metrics_addr.as_ref().map(|_| {
        telemetry::start_metrics_updater(Arc::clone(exchange), Arc::clone(&stop))
    });

    info!("signal-plc running");

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        thread::sleep(Duration::from_secs(seconds));
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    let stats = signal_handle
        .join()
        .map_err(|_| RuntimeError::SignalThread)?;
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    if let Some(handle) = updater {
        let _ = handle.join();
    }
    Ok(stats)
}

fn load_configuration(image: &StoredImage, seed: Option<u64>, timebase: &TimeBase) -> Configuration {
    let mut configuration = image.configuration();
    if image.randomize_requested() {
        let seed = seed.unwrap_or_else(|| timebase.unix_us());
        info!(seed, "Randomizing timing table");
        configuration.timing = signal_core::TimingTable::new(randomize_timing(seed));
    }
    configuration
}

/// Folds every inputs message in a JSON lines file onto `inputs`.
fn apply_inputs_file(path: &Path, inputs: &mut InputState) -> Result<(), RuntimeError> {
    let text = std::fs::read_to_string(path).map_err(|source| RuntimeError::InputsFile {
        path: path.to_path_buf(),
        source,
    })?;

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let message =
            IncomingMessage::parse(line).map_err(|source| RuntimeError::InputsMessage {
                path: path.to_path_buf(),
                line: index + 1,
                source,
            })?;
        match message {
            IncomingMessage::Inputs(msg) => {
                debug!(sequence = msg.sequence, "Applying operator inputs");
                msg.apply(inputs);
            }
            IncomingMessage::Hello(hello) => {
                debug!(client_id = ?hello.client_id, "Ignoring hello in inputs file");
            }
        }
    }
    Ok(())
}

fn init_audit_logger(audit_path: Option<&PathBuf>) -> Result<Option<Arc<AuditLogger>>, RuntimeError> {
    let Some(path) = audit_path else {
        return Ok(None);
    };
    match AuditLogger::new(path) {
        Ok(logger) => {
            info!(path = %path.display(), "Audit logging enabled");
            Ok(Some(Arc::new(logger)))
        }
        Err(source) => Err(RuntimeError::Audit {
            path: path.clone(),
            source,
        }),
    }
}

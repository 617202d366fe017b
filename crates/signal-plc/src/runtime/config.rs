use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub config_path: Option<PathBuf>,
    pub inputs_path: Option<PathBuf>,
    pub run_seconds: Option<u64>,
    pub replay_ticks: Option<u32>,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
    pub seed: Option<u64>,
    pub cycle_time: Duration,
    pub simulation: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            config_path: None,
            inputs_path: None,
            run_seconds: None,
            replay_ticks: None,
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            audit_path: None,
            seed: None,
            cycle_time: Duration::from_millis(100),
            simulation: true,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match args[i].as_str() {
                "--config" => {
                    if let Some(path) = value {
                        cfg.config_path = Some(PathBuf::from(path));
                        i += 1;
                    }
                }
                "--inputs" => {
                    if let Some(path) = value {
                        cfg.inputs_path = Some(PathBuf::from(path));
                        i += 1;
                    }
                }
                "--run-seconds" => {
                    if let Some(secs) = value {
                        cfg.run_seconds = secs.parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--replay-ticks" => {
                    if let Some(ticks) = value {
                        cfg.replay_ticks = ticks.parse::<u32>().ok();
                        i += 1;
                    }
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    if let Some(dir) = value {
                        cfg.log_dir = Some(PathBuf::from(dir));
                        i += 1;
                    }
                }
                "--metrics-addr" => {
                    if let Some(addr) = value {
                        cfg.metrics_addr = Some(addr.clone());
                        i += 1;
                    }
                }
                "--audit-log" => {
                    if let Some(path) = value {
                        cfg.audit_path = Some(PathBuf::from(path));
                        i += 1;
                    }
                }
                "--seed" => {
                    if let Some(seed) = value {
                        cfg.seed = seed.parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--cycle-ms" => {
                    if let Some(ms) = value {
                        if let Ok(ms) = ms.parse::<u64>() {
                            cfg.cycle_time = Duration::from_millis(ms.max(1));
                        }
                        i += 1;
                    }
                }
                "--no-sim" => {
                    cfg.simulation = false;
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    pub fn print_help() {
        println!(
            r#"signal-plc - Dual-ring actuated traffic signal controller

USAGE:
    signal-plc [OPTIONS]

OPTIONS:
    --config <PATH>         Persisted configuration image (JSON); factory defaults when absent
    --inputs <PATH>         Operator input messages (JSON lines) applied before the run
    --run-seconds <SECS>    Run for a fixed duration then exit
    --replay-ticks <N>      Run N tenths in simulated time and print the final state as JSON
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-dir <DIR>         Also write daily-rolling JSON logs into DIR
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>      Enable audit logging to specified JSONL file
    --seed <N>              Seed for timing randomization
    --cycle-ms <MS>         Signal cycle time in milliseconds [default: 100]
    --no-sim                Run without the simulated intersection (no detector input)
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,signal_core=debug)

EXAMPLES:
    # Simulated intersection with metrics
    signal-plc --metrics-addr 0.0.0.0:9090

    # Deterministic replay of ten minutes
    signal-plc --replay-ticks 6000 --seed 7 --audit-log audit.jsonl

    # Short live run with a stored configuration
    signal-plc --config controller.json --run-seconds 10
"#
        );
    }
}

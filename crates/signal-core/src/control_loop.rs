use crate::controller::{Controller, Tenths};
use crate::hal::IntersectionIo;
use crate::monitor::ConflictMonitor;
use crate::sync::{SignalSnapshot, StateExchange};
use crate::timebase::TimeBase;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct LoopConfig {
    pub cycle_time: Duration,
    /// Overruns longer than this put the intersection into flash.
    pub watchdog_timeout: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_time: Duration::from_millis(100),
            watchdog_timeout: Duration::from_secs(2),
        }
    }
}

/// Called with every snapshot the thread publishes.
pub type CycleObserver = Box<dyn FnMut(&SignalSnapshot) + Send>;

#[derive(Clone, Default, Debug)]
pub struct ExecutionStats {
    pub cycles_executed: u64,
    pub cycles_missed: u64,
    pub max_jitter_us: u64,
    pub input_updates: u64,
    pub conflict_trips: u64,
    pub watchdog_trips: u64,
}

/// Owns the controller and drives it from the field I/O at a fixed cycle.
pub struct SignalThread<IO: IntersectionIo> {
    io: IO,
    controller: Controller,
    config: LoopConfig,
    exchange: Arc<StateExchange>,
    monitor: ConflictMonitor,
    stats: ExecutionStats,
    inputs_seen: u64,
    timebase: TimeBase,
    observer: Option<CycleObserver>,
}

impl<IO: IntersectionIo> SignalThread<IO> {
    pub fn new(
        io: IO,
        controller: Controller,
        config: LoopConfig,
        exchange: Arc<StateExchange>,
        timebase: TimeBase,
    ) -> Self {
        Self {
            io,
            controller,
            config,
            exchange,
            monitor: ConflictMonitor::new(),
            stats: ExecutionStats::default(),
            inputs_seen: 0,
            timebase,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: CycleObserver) {
        self.observer = Some(observer);
    }

    /// Runs in wall-clock time until `stop` is set.
    pub fn run(&mut self, stop: &AtomicBool) {
        self.controller.initialize(self.timebase.now_tenths());
        let mut next_cycle = Instant::now();

        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now < next_cycle {
                std::thread::sleep(next_cycle - now);
            } else if now > next_cycle + self.config.cycle_time {
                self.stats.cycles_missed += 1;
                let overrun = now.duration_since(next_cycle);
                if overrun > self.config.watchdog_timeout {
                    log::error!("signal cycle overran by {overrun:?}, entering flash");
                    self.stats.watchdog_trips += 1;
                    self.emergency_flash();
                    break;
                }
            }

            let cycle_start = Instant::now();
            self.run_cycle(self.timebase.now_tenths());

            let cycle_duration = cycle_start.elapsed();
            let jitter_us = cycle_duration.saturating_sub(self.config.cycle_time).as_micros() as u64;
            self.stats.max_jitter_us = self.stats.max_jitter_us.max(jitter_us);
            self.publish(jitter_us as u32);

            next_cycle += self.config.cycle_time;
        }
    }

    /// Runs `ticks` cycles in simulated time, one tenth each, without
    /// sleeping. Identical inputs give identical results.
    pub fn run_for_ticks(&mut self, start: Tenths, ticks: u32) {
        self.controller.initialize(start);
        for tick in 1..=ticks {
            self.run_cycle(start.wrapping_add(tick));
            self.publish(0);
        }
    }

    fn run_cycle(&mut self, now: Tenths) {
        self.io.step(now);

        let mut staged = *self.controller.pending();
        if let Some(command) = self.exchange.inputs_since(self.inputs_seen) {
            self.inputs_seen = command.sequence;
            self.stats.input_updates += 1;
            staged = command.inputs;
        }
        staged.vehicle_detector = self.io.read_vehicle_detectors();
        staged.ped_detector = self.io.read_ped_detectors();
        self.controller.stage(staged);

        self.controller.update(now);

        let (output, fault) = self.monitor.apply(self.controller.output());
        if let Some(fault) = fault {
            log::error!("conflict monitor tripped: {fault}");
            self.stats.conflict_trips += 1;
        }
        self.io.write_output(&output);
        self.stats.cycles_executed += 1;
    }

    fn publish(&mut self, cycle_jitter_us: u32) {
        let snapshot = SignalSnapshot {
            timestamp_us: self.timebase.now_us(),
            cycle_count: self.stats.cycles_executed,
            cycle_jitter_us,
            monitor: self.monitor.state(),
            controller: self.controller.snapshot(),
        };
        self.exchange.publish_state(snapshot);
        if let Some(observer) = self.observer.as_mut() {
            observer(&snapshot);
        }
    }

    fn emergency_flash(&mut self) {
        self.io.write_output(&crate::monitor::flash_output());
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn io(&self) -> &IO {
        &self.io
    }
}

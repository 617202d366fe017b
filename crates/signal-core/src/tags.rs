#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
}

pub const RING_PHASE: Tag = Tag {
    key: "ring_phase",
    metric: "signal_ring_phase",
};

pub const RING_INTERVAL: Tag = Tag {
    key: "ring_interval",
    metric: "signal_ring_interval",
};

pub const OVERLAP_STATE: Tag = Tag {
    key: "overlap_state",
    metric: "signal_overlap_state",
};

pub const VEHICLE_CALLS: Tag = Tag {
    key: "vehicle_call",
    metric: "signal_vehicle_calls",
};

pub const PED_CALLS: Tag = Tag {
    key: "ped_call",
    metric: "signal_ped_calls",
};

pub const TICKS: Tag = Tag {
    key: "tick_count",
    metric: "signal_ticks_total",
};

pub const BARRIER_CROSSINGS: Tag = Tag {
    key: "barrier_crossings",
    metric: "signal_barrier_crossings_total",
};

pub const INVARIANT_VIOLATIONS: Tag = Tag {
    key: "violations",
    metric: "signal_invariant_violations_total",
};

pub const MONITOR_STATE: Tag = Tag {
    key: "monitor",
    metric: "signal_monitor_state",
};

pub const CYCLE_JITTER_US: Tag = Tag {
    key: "cycle_jitter_us",
    metric: "signal_cycle_jitter_microseconds",
};

//! Metrics definitions for debug-report resolution and delivery.

use shared::metrics_defs::{MetricDef, MetricType};

pub const BEACONS_EMITTED: MetricDef = MetricDef {
    name: "debug_reports.resolve.emitted",
    metric_type: MetricType::Counter,
    description: "Resolved beacon URIs that survived validation and capping",
};

pub const BEACONS_DROPPED_INVALID: MetricDef = MetricDef {
    name: "debug_reports.resolve.dropped_invalid",
    metric_type: MetricType::Counter,
    description: "Resolved beacon URIs dropped for being non-https, unparseable or oversized",
};

pub const BEACONS_DROPPED_CAPPED: MetricDef = MetricDef {
    name: "debug_reports.resolve.dropped_capped",
    metric_type: MetricType::Counter,
    description: "Resolved beacon URIs dropped by the per-ad-tech cap",
};

pub const SEND_SUCCESS: MetricDef = MetricDef {
    name: "debug_reports.send.success",
    metric_type: MetricType::Counter,
    description: "Beacon GETs answered with a success status",
};

pub const SEND_FAILURE: MetricDef = MetricDef {
    name: "debug_reports.send.failure",
    metric_type: MetricType::Counter,
    description: "Beacon GETs that failed or were answered with an error status",
};

pub const QUEUE_INSERTED: MetricDef = MetricDef {
    name: "debug_reports.queue.inserted",
    metric_type: MetricType::Counter,
    description: "Beacons persisted to the pending queue by a batch flush",
};

pub const RUN_COMPLETED: MetricDef = MetricDef {
    name: "debug_reports.delivery_run.completed",
    metric_type: MetricType::Counter,
    description: "Worker invocations that settled before the deadline",
};

pub const RUN_TIMEOUT: MetricDef = MetricDef {
    name: "debug_reports.delivery_run.timeout",
    metric_type: MetricType::Counter,
    description: "Worker invocations abandoned at the run deadline",
};

pub const RUN_SETTLE_SECONDS: MetricDef = MetricDef {
    name: "debug_reports.delivery_run.settle_seconds",
    metric_type: MetricType::Histogram,
    description: "Time for all dispatched sends of one invocation to settle",
};

pub const ALL_METRICS: &[MetricDef] = &[
    BEACONS_EMITTED,
    BEACONS_DROPPED_INVALID,
    BEACONS_DROPPED_CAPPED,
    SEND_SUCCESS,
    SEND_FAILURE,
    QUEUE_INSERTED,
    RUN_COMPLETED,
    RUN_TIMEOUT,
    RUN_SETTLE_SECONDS,
];

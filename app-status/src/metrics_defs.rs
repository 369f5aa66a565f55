use shared::metrics_defs::{MetricDef, MetricType};

pub const STATUS_QUERIES: MetricDef = MetricDef {
    name: "status.query",
    metric_type: MetricType::Counter,
    description: "Number of app status queries. Tagged with platform, found.",
};

pub const STATUS_PUBLISHES: MetricDef = MetricDef {
    name: "status.publish",
    metric_type: MetricType::Counter,
    description: "Number of status records appended. Tagged with platform, status.",
};

pub const FLAG_FETCH_DURATION: MetricDef = MetricDef {
    name: "flags.fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to evaluate every configured flag for one identity, in seconds",
};

pub const FLAG_EVALUATIONS: MetricDef = MetricDef {
    name: "flags.evaluations",
    metric_type: MetricType::Counter,
    description: "Number of individual flag evaluations that completed",
};

pub const FLAG_FETCH_FAILURES: MetricDef = MetricDef {
    name: "flags.fetch.failure",
    metric_type: MetricType::Counter,
    description: "Number of flag aggregations that failed. Tagged with reason.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    STATUS_QUERIES,
    STATUS_PUBLISHES,
    FLAG_FETCH_DURATION,
    FLAG_EVALUATIONS,
    FLAG_FETCH_FAILURES,
];

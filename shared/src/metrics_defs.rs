//! Shared vocabulary for declaring metrics as typed constants.
//!
//! Each crate lists its metrics as `MetricDef` consts in a `metrics_defs`
//! module and emits them through the wrapper macros below, so every metric
//! name in the codebase is declared exactly once next to a description.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "Counter",
            MetricType::Histogram => "Histogram",
        }
    }
}

/// A single metric: its wire name, kind, and a human-readable description.
#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

/// Increment a counter declared as a `MetricDef`.
#[macro_export]
macro_rules! counter {
    ($def:expr) => {
        metrics::counter!($def.name)
    };
}

/// Record into a histogram declared as a `MetricDef`.
#[macro_export]
macro_rules! histogram {
    ($def:expr) => {
        metrics::histogram!($def.name)
    };
}

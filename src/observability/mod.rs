// Observability: metrics recording and the Prometheus exposition handle

pub mod metrics;

pub use metrics::{init, render, MetricName};

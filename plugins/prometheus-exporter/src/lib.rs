//! Exposes the EC2 cost metrics to Prometheus.
//!
//! [`PrometheusSink`] stores the metrics in a `prometheus-client` registry,
//! [`MetricsServer`] serves them over HTTP.

mod server;
mod sink;

pub use server::MetricsServer;
pub use sink::{MetricState, PrometheusSink};

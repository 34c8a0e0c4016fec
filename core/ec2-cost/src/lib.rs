//! Turns the EC2 inventory into labeled cost metrics.
//!
//! Every poll cycle does three things:
//! - the [instance fetcher](fetch::instances::InstanceFetcher) lists the running instances,
//!   counts them and rebuilds the [label cache](cache::LabelCache);
//! - the [reservation fetcher](fetch::reservations::ReservationFetcher) publishes the prices
//!   and time windows of the active reserved instances;
//! - the [spot fetcher](fetch::spots::SpotFetcher) publishes the active spot requests,
//!   labeled with the tags of their backing instance (looked up in the cache),
//!   and the current spot market prices.
//!
//! The [`Scheduler`](scheduler::Scheduler) drives the cycles. The cloud API and the
//! metric registry are abstracted behind the [`Ec2Api`](api::Ec2Api) and
//! [`MetricSink`](sink::MetricSink) traits, which are implemented by the plugins.

pub mod api;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod labels;
pub mod metrics;
pub mod price;
pub mod scheduler;
pub mod sink;


pub use scheduler::{Collector, Scheduler};

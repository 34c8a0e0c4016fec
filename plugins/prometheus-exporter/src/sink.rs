use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, atomic::AtomicU64},
};

use anyhow::anyhow;
use ec2_cost::{labels::LabelSet, metrics, sink::MetricSink};
use prometheus_client::{
    encoding::text::encode,
    metrics::{family::Family, gauge::Gauge},
    registry::Registry,
};

type GaugeFamily = Family<Vec<(String, String)>, Gauge<f64, AtomicU64>>;

struct RegisteredFamily {
    label_names: Vec<String>,
    gauges: GaugeFamily,
}

/// The Prometheus registry and the gauge families registered in it.
///
/// Cloning the state is cheap, the clones share the same registry.
#[derive(Clone, Default)]
pub struct MetricState {
    registry: Arc<RwLock<Registry>>,
    families: Arc<RwLock<HashMap<String, RegisteredFamily>>>,
}

// Poisoned locks are recovered: the values are atomics and families are only ever inserted.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MetricState {
    /// Encodes every registered family in the OpenMetrics text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &read(&self.registry))?;
        Ok(buf)
    }
}

/// A [`MetricSink`] backed by a Prometheus registry of `f64` gauges.
#[derive(Clone, Default)]
pub struct PrometheusSink {
    state: MetricState,
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The state to pass to the [`MetricsServer`](crate::MetricsServer).
    pub fn state(&self) -> MetricState {
        self.state.clone()
    }

    /// Runs `f` on the gauges of the family, if the family is registered
    /// and `labels` match its label names.
    fn with_gauges(&self, family: &metrics::Family, labels: Option<&LabelSet>, f: impl FnOnce(&GaugeFamily)) {
        let families = read(&self.state.families);
        let Some(registered) = families.get(family.name()) else {
            log::error!("Metric family {} is not registered, update ignored", family.name());
            return;
        };
        if let Some(labels) = labels {
            if !labels.matches_names(&registered.label_names) {
                log::error!(
                    "Labels {:?} do not match the labels of {}: {:?}",
                    labels.names().collect::<Vec<_>>(),
                    family.name(),
                    registered.label_names
                );
                return;
            }
        }
        f(&registered.gauges);
    }
}

impl MetricSink for PrometheusSink {
    fn register(&self, family: &metrics::Family) -> anyhow::Result<()> {
        check_name(family.name())?;
        for label in family.label_names() {
            check_name(label)?;
        }

        let mut families = write(&self.state.families);
        if families.contains_key(family.name()) {
            return Err(anyhow!("metric family {} is already registered", family.name()));
        }
        let gauges = GaugeFamily::default();
        write(&self.state.registry).register(family.name(), family.help(), gauges.clone());
        families.insert(
            family.name().to_owned(),
            RegisteredFamily {
                label_names: family.label_names().to_vec(),
                gauges,
            },
        );
        log::debug!("Registered metric family {}", family.name());
        Ok(())
    }

    fn reset(&self, family: &metrics::Family) {
        self.with_gauges(family, None, |gauges| gauges.clear());
    }

    fn set(&self, family: &metrics::Family, labels: &LabelSet, value: f64) {
        self.with_gauges(family, Some(labels), |gauges| {
            gauges.get_or_create(&labels.pairs().to_vec()).set(value);
        });
    }

    fn add(&self, family: &metrics::Family, labels: &LabelSet, delta: f64) {
        self.with_gauges(family, Some(labels), |gauges| {
            gauges.get_or_create(&labels.pairs().to_vec()).inc_by(delta);
        });
    }
}

/// Checks that a metric or label name follows the Prometheus
/// [naming rules](https://prometheus.io/docs/concepts/data_model/#metric-names-and-labels).
fn check_name(name: &str) -> anyhow::Result<()> {
    let valid = !name.is_empty()
        && name.chars().enumerate().all(|(i, c)| {
            if i == 0 {
                c.is_ascii_alphabetic() || c == '_'
            } else {
                c.is_ascii_alphanumeric() || c == '_'
            }
        });
    if valid {
        Ok(())
    } else {
        Err(anyhow!("invalid metric or label name {name:?}"))
    }
}

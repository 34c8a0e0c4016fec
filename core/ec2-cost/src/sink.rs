use crate::labels::LabelSet;
use crate::metrics::Family;

/// Destination of the metrics: a registry of gauge families.
///
/// The sink must be internally synchronized, the fetchers update it from several tasks.
/// Each family has a single writer, hence updates of the same family never race.
///
/// The label set passed to the update methods must contain exactly the label names of
/// the family, in the same order (see [`Family::labels`]).
pub trait MetricSink: Send + Sync {
    /// Declares a new family. Fails if a family with the same name exists.
    fn register(&self, family: &Family) -> anyhow::Result<()>;

    /// Removes every series of the family.
    fn reset(&self, family: &Family);

    /// Sets the value of a series.
    fn set(&self, family: &Family, labels: &LabelSet, value: f64);

    /// Adds `delta` to the value of a series. A new series starts at zero.
    fn add(&self, family: &Family, labels: &LabelSet, delta: f64);

    /// Adds one to the value of a series.
    fn inc(&self, family: &Family, labels: &LabelSet) {
        self.add(family, labels, 1.0);
    }
}

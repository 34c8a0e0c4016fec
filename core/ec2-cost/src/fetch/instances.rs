use std::sync::Arc;

use crate::{
    api::{Ec2Api, Instance, InstanceReservation},
    cache::{CacheSnapshot, LabelCache},
    error::FetchError,
    labels::{LabelSet, TagSchema},
    metrics::InstanceFamilies,
    sink::MetricSink,
};

/// Lifecycle of the instances that are neither spot nor scheduled.
const DEFAULT_LIFECYCLE: &str = "normal";

/// Counts the running instances and rebuilds the [`LabelCache`].
pub struct InstanceFetcher {
    families: InstanceFamilies,
    tags: Arc<TagSchema>,
    cache: Arc<LabelCache>,
}

impl InstanceFetcher {
    pub fn new(families: InstanceFamilies, tags: Arc<TagSchema>, cache: Arc<LabelCache>) -> Self {
        Self { families, tags, cache }
    }

    /// Lists the running instances, replaces the instance count series and the content
    /// of the label cache.
    ///
    /// The new cache snapshot is published once every instance has been processed.
    pub async fn fetch<A: Ec2Api>(&self, api: &A, sink: &dyn MetricSink) -> Result<(), FetchError> {
        let reservations = api
            .list_running_instances()
            .await
            .map_err(|source| FetchError::Instances {
                region: api.region().to_owned(),
                source,
            })?;

        sink.reset(&self.families.count);
        let mut snapshot = CacheSnapshot::default();
        for reservation in &reservations {
            let mut labels = self.reservation_labels(reservation);
            for instance in &reservation.instances {
                let tag_labels = self.tags.resolve(&instance.tags);
                set_instance_labels(&mut labels, instance);
                labels.overlay(&tag_labels);
                sink.inc(&self.families.count, &labels);
                snapshot.insert(instance.id.clone(), tag_labels, instance.vpc_id.is_some());
            }
        }

        log::debug!(
            "{} running instances in {} reservations ({})",
            snapshot.len(),
            reservations.len(),
            api.region()
        );
        self.cache.replace(snapshot).await;
        Ok(())
    }

    /// Labels that are common to all the instances of a reservation.
    fn reservation_labels(&self, reservation: &InstanceReservation) -> LabelSet {
        let mut groups = reservation.groups.clone();
        groups.sort();

        let mut labels = self.families.count.labels();
        labels.set("groups", groups.join(","));
        labels.set("owner_id", reservation.owner_id.clone());
        labels.set(
            "requester_id",
            reservation
                .requester_id
                .clone()
                .unwrap_or_else(|| reservation.owner_id.clone()),
        );
        labels
    }
}

fn set_instance_labels(labels: &mut LabelSet, instance: &Instance) {
    labels.set("az", instance.availability_zone.clone());
    labels.set("instance_type", instance.instance_type.clone());
    labels.set(
        "lifecycle",
        instance.lifecycle.as_deref().unwrap_or(DEFAULT_LIFECYCLE),
    );
}

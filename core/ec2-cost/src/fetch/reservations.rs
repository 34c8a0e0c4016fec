use crate::{
    api::{Ec2Api, ReservedInstances},
    error::FetchError,
    labels::LabelSet,
    metrics::ReservationFamilies,
    sink::MetricSink,
};

/// Frequency of the recurring charge that is exposed as the hourly price.
const HOURLY: &str = "Hourly";

/// Publishes the prices, size and time window of the active reserved instances.
///
/// The series are never reset: an expired reservation keeps its last values until the
/// process restarts.
pub struct ReservationFetcher {
    families: ReservationFamilies,
}

impl ReservationFetcher {
    pub fn new(families: ReservationFamilies) -> Self {
        Self { families }
    }

    pub async fn fetch<A: Ec2Api>(&self, api: &A, sink: &dyn MetricSink) -> Result<(), FetchError> {
        let reservations = api
            .list_active_reservations()
            .await
            .map_err(|source| FetchError::Reservations {
                region: api.region().to_owned(),
                source,
            })?;

        let f = &self.families;
        for ri in &reservations {
            let labels = self.labels(ri);
            sink.set(&f.usage_price, &labels, ri.usage_price);
            sink.set(&f.fixed_price, &labels, ri.fixed_price);
            sink.set(&f.hourly_price, &labels, hourly_charge(ri));
            sink.set(&f.instance_count, &labels, ri.instance_count as f64);
            sink.set(&f.start_time, &labels, ri.start.unix_timestamp() as f64);
            sink.set(&f.end_time, &labels, ri.end.unix_timestamp() as f64);
        }
        log::debug!("{} active reservations ({})", reservations.len(), api.region());
        Ok(())
    }

    fn labels(&self, ri: &ReservedInstances) -> LabelSet {
        // all the reservation families share the same labels
        let mut labels = self.families.usage_price.labels();
        labels.set("az", ri.availability_zone.clone());
        labels.set("reserved_instance_id", ri.id.clone());
        labels.set("tenancy", ri.tenancy.clone());
        labels.set("instance_type", ri.instance_type.clone());
        labels.set("offer_type", ri.offering_type.clone());
        labels.set("product", ri.product_description.clone());
        labels
    }
}

/// Returns the amount of the hourly recurring charge, or zero if there is none.
///
/// EC2 declares at most one hourly charge. If there are several, the last one is used.
fn hourly_charge(ri: &ReservedInstances) -> f64 {
    ri.recurring_charges
        .iter()
        .rev()
        .find(|c| c.frequency == HOURLY)
        .map_or(0.0, |c| c.amount)
}

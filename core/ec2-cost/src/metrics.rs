//! Definition of the metric families.

use std::sync::Arc;

use crate::labels::{LabelSet, TagSchema};
use crate::sink::MetricSink;

/// Fixed labels of the instance count.
pub const INSTANCE_LABELS: [&str; 6] = ["groups", "owner_id", "requester_id", "az", "instance_type", "lifecycle"];

/// Labels of the reserved instances metrics.
pub const RESERVATION_LABELS: [&str; 6] = [
    "az",
    "reserved_instance_id",
    "tenancy",
    "instance_type",
    "offer_type",
    "product",
];

/// Fixed labels of the spot request metrics.
pub const SPOT_REQUEST_LABELS: [&str; 6] = [
    "az",
    "product",
    "persistence",
    "instance_type",
    "launch_group",
    "instance_profile",
];

/// Labels of the spot market price.
pub const SPOT_PRICE_LABELS: [&str; 3] = ["az", "product", "instance_type"];

/// A named group of time series that share the same label names.
///
/// The label names are decided when the family is created and never change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Family {
    name: &'static str,
    help: &'static str,
    label_names: Arc<[String]>,
}

impl Family {
    pub fn new(name: &'static str, help: &'static str, label_names: Vec<String>) -> Self {
        Self {
            name,
            help,
            label_names: label_names.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Returns a label set that contains every label of the family, with empty values.
    pub fn labels(&self) -> LabelSet {
        LabelSet::with_names(&self.label_names[..])
    }
}

/// Families of the instance fetcher.
#[derive(Debug, Clone)]
pub struct InstanceFamilies {
    pub count: Family,
}

/// Families of the reservation fetcher.
#[derive(Debug, Clone)]
pub struct ReservationFamilies {
    pub usage_price: Family,
    pub fixed_price: Family,
    pub hourly_price: Family,
    pub instance_count: Family,
    pub start_time: Family,
    pub end_time: Family,
}

/// Families of the spot fetcher.
#[derive(Debug, Clone)]
pub struct SpotFamilies {
    pub count: Family,
    pub bid_price: Family,
    pub block_hourly_price: Family,
    pub market_price: Family,
}

/// Every family exposed by the exporter.
#[derive(Debug, Clone)]
pub struct Ec2Metrics {
    pub instances: InstanceFamilies,
    pub reservations: ReservationFamilies,
    pub spots: SpotFamilies,
}

impl Ec2Metrics {
    /// Creates the families. The tag-derived labels are appended to the per-instance families.
    pub fn new(tags: &TagSchema) -> Self {
        let reservation_labels = || RESERVATION_LABELS.iter().map(|l| l.to_string()).collect::<Vec<_>>();
        let spot_labels = || tags.extend_labels(&SPOT_REQUEST_LABELS);

        Self {
            instances: InstanceFamilies {
                count: Family::new(
                    "aws_ec2_instances_count",
                    "Number of running instances",
                    tags.extend_labels(&INSTANCE_LABELS),
                ),
            },
            reservations: ReservationFamilies {
                usage_price: Family::new(
                    "aws_ec2_reserved_instances_usage_price_dollars",
                    "cost of reserved instance usage in dollars",
                    reservation_labels(),
                ),
                fixed_price: Family::new(
                    "aws_ec2_reserved_instances_fixed_price_dollars",
                    "total hourly fixed cost of reserved instance in dollars",
                    reservation_labels(),
                ),
                hourly_price: Family::new(
                    "aws_ec2_reserved_instances_price_per_hour_dollars",
                    "total hourly cost of reserved instance in dollars",
                    reservation_labels(),
                ),
                instance_count: Family::new(
                    "aws_ec2_reserved_instances_count",
                    "Number of reserved instances in this reservation",
                    reservation_labels(),
                ),
                start_time: Family::new(
                    "aws_ec2_reserved_instances_start_time",
                    "Start time of this reservation",
                    reservation_labels(),
                ),
                end_time: Family::new(
                    "aws_ec2_reserved_instances_end_time",
                    "End time of this reservation",
                    reservation_labels(),
                ),
            },
            spots: SpotFamilies {
                count: Family::new(
                    "aws_ec2_spot_request_count",
                    "Number of active/fulfilled spot requests",
                    spot_labels(),
                ),
                bid_price: Family::new(
                    "aws_ec2_spot_request_bid_price_hourly_dollars",
                    "cost of spot instances hourly usage in dollars",
                    spot_labels(),
                ),
                block_hourly_price: Family::new(
                    "aws_ec2_spot_request_actual_block_price_hourly_dollars",
                    "fixed hourly cost of limited duration spot instances in dollars",
                    spot_labels(),
                ),
                market_price: Family::new(
                    "aws_ec2_spot_price_dollars",
                    "Current market price of a spot instance in dollars",
                    SPOT_PRICE_LABELS.iter().map(|l| l.to_string()).collect(),
                ),
            },
        }
    }

    pub fn families(&self) -> [&Family; 11] {
        [
            &self.instances.count,
            &self.reservations.usage_price,
            &self.reservations.fixed_price,
            &self.reservations.hourly_price,
            &self.reservations.instance_count,
            &self.reservations.start_time,
            &self.reservations.end_time,
            &self.spots.count,
            &self.spots.bid_price,
            &self.spots.block_hourly_price,
            &self.spots.market_price,
        ]
    }

    /// Registers every family to the sink.
    ///
    /// Must be called once, before the first poll cycle.
    pub fn register(&self, sink: &dyn MetricSink) -> anyhow::Result<()> {
        for family in self.families() {
            sink.register(family)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Ec2Metrics;
    use crate::labels::TagSchema;
    use crate::test::MemorySink;

    #[test]
    fn tag_labels_are_appended_to_per_instance_families() {
        let metrics = Ec2Metrics::new(&TagSchema::parse("Team,Environment"));
        assert_eq!(
            metrics.instances.count.label_names(),
            &[
                "groups",
                "owner_id",
                "requester_id",
                "az",
                "instance_type",
                "lifecycle",
                "aws_tag_team",
                "aws_tag_environment"
            ]
        );
        for family in [&metrics.spots.count, &metrics.spots.bid_price, &metrics.spots.block_hourly_price] {
            assert_eq!(family.label_names().len(), 8, "{}", family.name());
            assert_eq!(&family.label_names()[6..], &["aws_tag_team", "aws_tag_environment"]);
        }
        assert_eq!(metrics.spots.market_price.label_names(), &["az", "product", "instance_type"]);
        assert_eq!(metrics.reservations.usage_price.label_names().len(), 6);
    }

    #[test]
    fn family_labels_are_complete() {
        let metrics = Ec2Metrics::new(&TagSchema::parse("Team"));
        let labels = metrics.instances.count.labels();
        assert!(labels.matches_names(metrics.instances.count.label_names()));
        assert!(labels.pairs().iter().all(|(_, v)| v.is_empty()));
    }

    #[test]
    fn register_all_families() {
        let metrics = Ec2Metrics::new(&TagSchema::default());
        let sink = MemorySink::new();
        metrics.register(&sink).unwrap();
        let mut names = sink.family_names();
        names.sort();
        assert_eq!(names.len(), 11);
        assert!(names.contains(&"aws_ec2_spot_price_dollars".to_string()));

        // registering twice is an error
        assert!(metrics.register(&sink).is_err());
    }
}

//! [`Ec2Api`] implementation on top of the AWS SDK.
//!
//! Credentials are resolved by the default provider chain of the SDK
//! (environment, profile, instance metadata...).

mod convert;

use anyhow::anyhow;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::{Client, error::DisplayErrorContext, primitives::DateTime, types::Filter};
use ec2_cost::api::{Ec2Api, InstanceReservation, ReservedInstances, SpotInstanceRequest, SpotPrice};
use time::OffsetDateTime;

/// State code of the running instances.
const RUNNING: &str = "16";
const ACTIVE: &str = "active";

fn filter(name: &str, values: impl IntoIterator<Item = impl Into<String>>) -> Filter {
    Filter::builder()
        .name(name)
        .set_values(Some(values.into_iter().map(Into::into).collect()))
        .build()
}

fn sdk_error(e: impl std::error::Error) -> anyhow::Error {
    anyhow!("{}", DisplayErrorContext(e))
}

/// EC2 client of a single region.
#[derive(Clone)]
pub struct AwsEc2Client {
    client: Client,
    region: String,
}

impl AwsEc2Client {
    /// Loads the SDK configuration from the environment and creates a client for `region`.
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .load()
            .await;
        log::debug!("AWS configuration loaded for {region}");
        Self {
            client: Client::new(&config),
            region: region.to_owned(),
        }
    }
}

impl Ec2Api for AwsEc2Client {
    fn region(&self) -> &str {
        &self.region
    }

    async fn list_running_instances(&self) -> anyhow::Result<Vec<InstanceReservation>> {
        let reservations: Vec<_> = self
            .client
            .describe_instances()
            .filters(filter("instance-state-code", [RUNNING]))
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .map_err(sdk_error)?;
        Ok(reservations.iter().map(convert::instance_reservation).collect())
    }

    async fn list_active_reservations(&self) -> anyhow::Result<Vec<ReservedInstances>> {
        let output = self
            .client
            .describe_reserved_instances()
            .filters(filter("state", [ACTIVE]))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(output.reserved_instances().iter().map(convert::reserved_instances).collect())
    }

    async fn list_active_spot_requests(&self) -> anyhow::Result<Vec<SpotInstanceRequest>> {
        let requests: Vec<_> = self
            .client
            .describe_spot_instance_requests()
            .filters(filter("state", [ACTIVE]))
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .map_err(sdk_error)?;
        Ok(requests.iter().map(convert::spot_request).collect())
    }

    async fn spot_price_history(&self, products: &[String], at: OffsetDateTime) -> anyhow::Result<Vec<SpotPrice>> {
        let at = DateTime::from_secs(at.unix_timestamp());
        let prices: Vec<_> = self
            .client
            .describe_spot_price_history()
            .start_time(at)
            .end_time(at)
            .filters(filter("product-description", products.iter().cloned()))
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .map_err(sdk_error)?;
        Ok(prices.iter().map(convert::spot_price).collect())
    }
}

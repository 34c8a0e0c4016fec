//! Records returned by the EC2 inventory and the trait that fetches them.
//!
//! The records only keep the fields that end up in a metric. Fields that the provider
//! may leave unset are `Option`s, their defaults are applied by the fetchers.

use std::future::Future;

use time::OffsetDateTime;

/// Access to the EC2 API of a single region.
///
/// Implementations must return the complete result of each call (following pagination
/// if needed). Any error is fatal for the poll cycle that made the call.
pub trait Ec2Api: Send + Sync + 'static {
    /// The region that this client queries.
    fn region(&self) -> &str;

    /// Lists the instances that are in the `running` state, grouped by reservation.
    fn list_running_instances(&self) -> impl Future<Output = anyhow::Result<Vec<InstanceReservation>>> + Send;

    /// Lists the reserved instances that are in the `active` state.
    fn list_active_reservations(&self) -> impl Future<Output = anyhow::Result<Vec<ReservedInstances>>> + Send;

    /// Lists the spot instance requests that are in the `active` state.
    fn list_active_spot_requests(&self) -> impl Future<Output = anyhow::Result<Vec<SpotInstanceRequest>>> + Send;

    /// Returns the spot prices of the given products, for the window `[at, at]`.
    ///
    /// With an empty window, EC2 returns the most recent price of each
    /// (availability zone, product, instance type).
    fn spot_price_history(
        &self,
        products: &[String],
        at: OffsetDateTime,
    ) -> impl Future<Output = anyhow::Result<Vec<SpotPrice>>> + Send;
}

/// A group of instances launched together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceReservation {
    /// Names of the security groups.
    pub groups: Vec<String>,
    pub owner_id: String,
    /// Who launched the instances on behalf of the owner, if not the owner.
    pub requester_id: Option<String>,
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instance {
    pub id: String,
    pub availability_zone: String,
    pub instance_type: String,
    /// `spot` or `scheduled`, unset for on-demand instances.
    pub lifecycle: Option<String>,
    pub tags: Vec<Tag>,
    /// Set when the instance runs in a VPC.
    pub vpc_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReservedInstances {
    pub id: String,
    pub availability_zone: String,
    pub instance_type: String,
    pub tenancy: String,
    pub offering_type: String,
    pub product_description: String,
    pub usage_price: f64,
    pub fixed_price: f64,
    pub recurring_charges: Vec<RecurringCharge>,
    pub instance_count: i64,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecurringCharge {
    /// Only `Hourly` is used by EC2 at the moment.
    pub frequency: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotInstanceRequest {
    pub id: String,
    /// The instance that fulfills the request, unset if the request is not fulfilled yet.
    pub instance_id: Option<String>,
    pub availability_zone: String,
    pub product_description: String,
    /// `one-time` or `persistent`.
    pub request_type: Option<String>,
    pub launch_group: Option<String>,
    pub launch_specification: Option<LaunchSpecification>,
    /// Decimal string, only set for spot blocks (fixed duration).
    pub actual_block_hourly_price: Option<String>,
    /// Decimal string, the maximum hourly price of the request.
    pub spot_price: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchSpecification {
    pub instance_type: Option<String>,
    /// Name of the IAM instance profile.
    pub iam_instance_profile: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotPrice {
    pub availability_zone: String,
    pub product_description: String,
    pub instance_type: String,
    /// Decimal string.
    pub spot_price: Option<String>,
}

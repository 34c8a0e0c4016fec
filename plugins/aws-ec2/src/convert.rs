//! Conversions from the SDK types to the inventory records.
//!
//! The SDK leaves every field optional. Missing strings become empty strings,
//! missing numbers become zero and missing dates become the UNIX epoch.

use aws_sdk_ec2::{primitives::DateTime, types};
use ec2_cost::api;
use time::OffsetDateTime;

fn string(s: Option<&str>) -> String {
    s.unwrap_or_default().to_owned()
}

fn timestamp(date: Option<&DateTime>) -> OffsetDateTime {
    date.and_then(|d| OffsetDateTime::from_unix_timestamp(d.secs()).ok())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub fn instance_reservation(r: &types::Reservation) -> api::InstanceReservation {
    api::InstanceReservation {
        groups: r.groups().iter().filter_map(|g| g.group_name()).map(str::to_owned).collect(),
        owner_id: string(r.owner_id()),
        requester_id: r.requester_id().map(str::to_owned),
        instances: r.instances().iter().map(instance).collect(),
    }
}

pub fn instance(i: &types::Instance) -> api::Instance {
    api::Instance {
        id: string(i.instance_id()),
        availability_zone: string(i.placement().and_then(|p| p.availability_zone())),
        instance_type: string(i.instance_type().map(|t| t.as_str())),
        lifecycle: i.instance_lifecycle().map(|l| l.as_str().to_owned()),
        tags: i
            .tags()
            .iter()
            .map(|t| api::Tag {
                key: string(t.key()),
                value: string(t.value()),
            })
            .collect(),
        vpc_id: i.vpc_id().map(str::to_owned),
    }
}

pub fn reserved_instances(ri: &types::ReservedInstances) -> api::ReservedInstances {
    api::ReservedInstances {
        id: string(ri.reserved_instances_id()),
        availability_zone: string(ri.availability_zone()),
        instance_type: string(ri.instance_type().map(|t| t.as_str())),
        tenancy: string(ri.instance_tenancy().map(|t| t.as_str())),
        offering_type: string(ri.offering_type().map(|t| t.as_str())),
        product_description: string(ri.product_description().map(|p| p.as_str())),
        usage_price: ri.usage_price().map_or(0.0, f64::from),
        fixed_price: ri.fixed_price().map_or(0.0, f64::from),
        recurring_charges: ri
            .recurring_charges()
            .iter()
            .map(|c| api::RecurringCharge {
                frequency: string(c.frequency().map(|f| f.as_str())),
                amount: c.amount().unwrap_or_default(),
            })
            .collect(),
        instance_count: ri.instance_count().map_or(0, i64::from),
        start: timestamp(ri.start()),
        end: timestamp(ri.end()),
    }
}

pub fn spot_request(r: &types::SpotInstanceRequest) -> api::SpotInstanceRequest {
    api::SpotInstanceRequest {
        id: string(r.spot_instance_request_id()),
        instance_id: r.instance_id().map(str::to_owned),
        availability_zone: string(r.launched_availability_zone()),
        product_description: string(r.product_description().map(|p| p.as_str())),
        request_type: r.r#type().map(|t| t.as_str().to_owned()),
        launch_group: r.launch_group().map(str::to_owned),
        launch_specification: r.launch_specification().map(|s| api::LaunchSpecification {
            instance_type: s.instance_type().map(|t| t.as_str().to_owned()),
            iam_instance_profile: s
                .iam_instance_profile()
                .and_then(|p| p.name())
                .map(str::to_owned),
        }),
        actual_block_hourly_price: r.actual_block_hourly_price().map(str::to_owned),
        spot_price: r.spot_price().map(str::to_owned),
    }
}

pub fn spot_price(p: &types::SpotPrice) -> api::SpotPrice {
    api::SpotPrice {
        availability_zone: string(p.availability_zone()),
        product_description: string(p.product_description().map(|d| d.as_str())),
        instance_type: string(p.instance_type().map(|t| t.as_str())),
        spot_price: p.spot_price().map(str::to_owned),
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::{
    api::{Ec2Api, SpotInstanceRequest},
    cache::{CacheSnapshot, LabelCache},
    error::FetchError,
    labels::LabelSet,
    metrics::SpotFamilies,
    price::{parse_price, try_parse_price},
    sink::MetricSink,
};

/// Appended to the product of the requests whose instance runs in a VPC.
///
/// The spot requests do not make the difference, but the spot price history does.
pub const VPC_PRODUCT_SUFFIX: &str = " (Amazon VPC)";

const DEFAULT_PERSISTENCE: &str = "one-time";
const DEFAULT_LAUNCH_GROUP: &str = "none";
const UNKNOWN: &str = "unknown";

/// Publishes the active spot requests and the current spot market prices.
///
/// The request series carry the tag labels of the instance that fulfills the request,
/// as recorded in the [`LabelCache`] by the instance fetcher.
pub struct SpotFetcher {
    families: SpotFamilies,
    cache: Arc<LabelCache>,
}

impl SpotFetcher {
    pub fn new(families: SpotFamilies, cache: Arc<LabelCache>) -> Self {
        Self { families, cache }
    }

    pub async fn fetch<A: Ec2Api>(&self, api: &A, sink: &dyn MetricSink) -> Result<(), FetchError> {
        // One snapshot for the whole fetch, even if the cache is rebuilt in the meantime.
        let cache = self.cache.snapshot().await;

        let requests = api
            .list_active_spot_requests()
            .await
            .map_err(|source| FetchError::SpotRequests {
                region: api.region().to_owned(),
                source,
            })?;

        let f = &self.families;
        sink.reset(&f.count);
        sink.reset(&f.block_hourly_price);
        sink.reset(&f.bid_price);

        let mut products = BTreeSet::new();
        for request in &requests {
            let labels = self.request_labels(request, &cache);
            if let Some(product) = labels.get("product") {
                products.insert(product.to_owned());
            }

            // Several requests can have the same labels: their prices add up.
            let block_price = parse_price(request.actual_block_hourly_price.as_deref());
            sink.add(&f.block_hourly_price, &labels, block_price);
            let bid_price = parse_price(request.spot_price.as_deref());
            sink.add(&f.bid_price, &labels, bid_price);
            sink.inc(&f.count, &labels);
        }
        log::debug!(
            "{} active spot requests for {} products ({})",
            requests.len(),
            products.len(),
            api.region()
        );

        if products.is_empty() {
            return Ok(());
        }
        let products: Vec<String> = products.into_iter().collect();
        self.fetch_market_prices(api, sink, &products).await
    }

    /// Sets the latest market price of each (availability zone, product, instance type).
    async fn fetch_market_prices<A: Ec2Api>(
        &self,
        api: &A,
        sink: &dyn MetricSink,
        products: &[String],
    ) -> Result<(), FetchError> {
        let prices = api
            .spot_price_history(products, OffsetDateTime::now_utc())
            .await
            .map_err(|source| FetchError::SpotPriceHistory {
                region: api.region().to_owned(),
                source,
            })?;

        let family = &self.families.market_price;
        for price in &prices {
            let Some(value) = try_parse_price(price.spot_price.as_deref()) else {
                continue;
            };
            let labels = family
                .labels()
                .with("az", price.availability_zone.clone())
                .with("product", price.product_description.clone())
                .with("instance_type", price.instance_type.clone());
            sink.set(family, &labels, value);
        }
        Ok(())
    }

    fn request_labels(&self, request: &SpotInstanceRequest, cache: &CacheSnapshot) -> LabelSet {
        let mut labels = self.families.count.labels();

        // The tag labels stay empty unless the instance of the request is known.
        let instance_id = request.instance_id.as_deref();
        if let Some(tag_labels) = instance_id.and_then(|id| cache.tag_labels(id)) {
            labels.overlay(tag_labels);
        }

        let mut product = request.product_description.clone();
        if instance_id.is_some_and(|id| cache.is_vpc_member(id)) {
            product.push_str(VPC_PRODUCT_SUFFIX);
        }

        let launch = request.launch_specification.as_ref();
        let instance_type = launch.and_then(|s| s.instance_type.as_deref()).unwrap_or(UNKNOWN);
        let instance_profile = launch.and_then(|s| s.iam_instance_profile.as_deref()).unwrap_or(UNKNOWN);

        labels.set("az", request.availability_zone.clone());
        labels.set("product", product);
        labels.set(
            "persistence",
            request.request_type.as_deref().unwrap_or(DEFAULT_PERSISTENCE),
        );
        labels.set(
            "launch_group",
            request.launch_group.as_deref().unwrap_or(DEFAULT_LAUNCH_GROUP),
        );
        labels.set("instance_type", instance_type);
        labels.set("instance_profile", instance_profile);
        labels
    }
}

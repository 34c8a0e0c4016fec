//! Poll cycles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::task::{Id, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::{
    api::Ec2Api,
    cache::LabelCache,
    error::FetchError,
    fetch::{InstanceFetcher, ReservationFetcher, SpotFetcher},
    labels::TagSchema,
    metrics::Ec2Metrics,
    sink::MetricSink,
};

/// Runs the fetchers of one poll cycle.
pub struct Collector<A> {
    api: Arc<A>,
    sink: Arc<dyn MetricSink>,
    cache: Arc<LabelCache>,
    instances: Arc<InstanceFetcher>,
    reservations: Arc<ReservationFetcher>,
    spots: Arc<SpotFetcher>,
    fetch_timeout: Option<Duration>,
}

impl<A: Ec2Api> Collector<A> {
    /// Creates the fetchers of `metrics`, which must already be registered in `sink`.
    pub fn new(api: Arc<A>, sink: Arc<dyn MetricSink>, metrics: &Ec2Metrics, tags: Arc<TagSchema>) -> Self {
        let cache = Arc::new(LabelCache::new());
        Self {
            api,
            sink,
            instances: Arc::new(InstanceFetcher::new(metrics.instances.clone(), tags, cache.clone())),
            reservations: Arc::new(ReservationFetcher::new(metrics.reservations.clone())),
            spots: Arc::new(SpotFetcher::new(metrics.spots.clone(), cache.clone())),
            cache,
            fetch_timeout: None,
        }
    }

    /// Bounds the duration of each fetch. Without a timeout, a fetch can wait forever.
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<LabelCache> {
        &self.cache
    }

    pub fn region(&self) -> &str {
        self.api.region()
    }

    /// Runs the instance fetcher, then starts the reservation and spot fetchers in `tasks`.
    ///
    /// The spot fetcher therefore sees the cache rebuilt by this cycle (or a later one).
    /// Returns the error of the instance fetcher. The errors of the background
    /// fetchers are returned by [`FetchTasks::join_next`].
    pub async fn run_cycle(&self, tasks: &mut FetchTasks) -> Result<(), FetchError> {
        bounded(
            "instances",
            self.fetch_timeout,
            self.instances.fetch(self.api.as_ref(), self.sink.as_ref()),
        )
        .await?;

        let (api, sink, fetcher) = (self.api.clone(), self.sink.clone(), self.reservations.clone());
        tasks.spawn("reservations", bounded("reservations", self.fetch_timeout, async move {
            fetcher.fetch(api.as_ref(), sink.as_ref()).await
        }));

        let (api, sink, fetcher) = (self.api.clone(), self.sink.clone(), self.spots.clone());
        tasks.spawn("spots", bounded("spots", self.fetch_timeout, async move {
            fetcher.fetch(api.as_ref(), sink.as_ref()).await
        }));
        Ok(())
    }

    /// Runs a complete cycle and waits for all its fetchers.
    pub async fn collect_once(&self) -> Result<(), FetchError> {
        let mut tasks = FetchTasks::new();
        self.run_cycle(&mut tasks).await?;
        tasks.join_all().await
    }
}

async fn bounded<F>(fetcher: &'static str, timeout: Option<Duration>, fetch: F) -> Result<(), FetchError>
where
    F: Future<Output = Result<(), FetchError>>,
{
    match timeout {
        None => fetch.await,
        Some(timeout) => tokio::time::timeout(timeout, fetch)
            .await
            .map_err(|_| FetchError::Timeout { fetcher, timeout })?,
    }
}

/// The fetchers that run in the background.
#[derive(Default)]
pub struct FetchTasks {
    set: JoinSet<Result<(), FetchError>>,
    names: FxHashMap<Id, &'static str>,
}

impl FetchTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn<F>(&mut self, fetcher: &'static str, task: F)
    where
        F: Future<Output = Result<(), FetchError>> + Send + 'static,
    {
        let handle = self.set.spawn(task);
        self.names.insert(handle.id(), fetcher);
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Waits for the next fetcher to finish and returns its result,
    /// or `None` if no fetcher is running.
    pub async fn join_next(&mut self) -> Option<Result<(), FetchError>> {
        let res = match self.set.join_next_with_id().await? {
            Ok((id, res)) => {
                self.names.remove(&id);
                res
            }
            Err(e) => {
                let fetcher = self.names.remove(&e.id()).unwrap_or("unknown");
                Err(FetchError::TaskPanicked { fetcher, source: e })
            }
        };
        Some(res)
    }

    /// Waits for all the fetchers and returns the first error.
    ///
    /// The remaining fetchers are aborted after an error.
    pub async fn join_all(&mut self) -> Result<(), FetchError> {
        while let Some(res) = self.join_next().await {
            if let Err(e) = res {
                self.set.abort_all();
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Starts a poll cycle at a fixed interval, until a fetcher fails.
pub struct Scheduler<A> {
    collector: Collector<A>,
    poll_interval: Duration,
}

impl<A: Ec2Api> Scheduler<A> {
    /// # Panics
    ///
    /// [`run`](Self::run) panics if `poll_interval` is zero.
    pub fn new(collector: Collector<A>, poll_interval: Duration) -> Self {
        Self {
            collector,
            poll_interval,
        }
    }

    pub fn collector(&self) -> &Collector<A> {
        &self.collector
    }

    /// Polls now, then every `poll_interval`, and returns the first error.
    ///
    /// A new cycle does not wait for the background fetchers of the previous one.
    /// If a cycle takes longer than the interval, the next one is delayed.
    pub async fn run(self) -> Result<(), FetchError> {
        log::info!(
            "Polling EC2 in {} every {:?}",
            self.collector.region(),
            self.poll_interval
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tasks = FetchTasks::new();
        let mut cycle: u64 = 0;
        let res = loop {
            tokio::select! {
                _ = interval.tick() => {
                    cycle += 1;
                    log::info!("Starting poll cycle {cycle}");
                    if let Err(e) = self.collector.run_cycle(&mut tasks).await {
                        break Err(e);
                    }
                }
                Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = res {
                        break Err(e);
                    }
                }
            }
        };
        tasks.set.abort_all();
        res
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::{Collector, Scheduler};
    use crate::{
        api::LaunchSpecification,
        error::FetchError,
        labels::TagSchema,
        metrics::Ec2Metrics,
        sink::MetricSink,
        test::{Call, FakeEc2, MemorySink, instance, reservation, reserved_instances, spot_price, spot_request},
    };

    fn inventory() -> FakeEc2 {
        let mut request = spot_request("sir-1", Some("i-2"), "eu-west-1a", "Linux/UNIX");
        request.spot_price = Some("0.05".into());
        request.launch_specification = Some(LaunchSpecification {
            instance_type: Some("c5.large".into()),
            iam_instance_profile: None,
        });
        FakeEc2::new()
            .with_instances(vec![reservation(
                &["web"],
                vec![
                    instance("i-1", "eu-west-1a", "m5.large").tag("Team", "infra"),
                    instance("i-2", "eu-west-1a", "c5.large")
                        .tag("Team", "batch")
                        .vpc("vpc-1")
                        .lifecycle("spot"),
                ],
            )])
            .with_reservations(vec![reserved_instances("ri-1", "eu-west-1a", "m5.large")])
            .with_spot_requests(vec![request])
            .with_spot_prices(vec![spot_price(
                "eu-west-1a",
                "Linux/UNIX (Amazon VPC)",
                "c5.large",
                Some("0.031"),
            )])
    }

    fn collector(api: FakeEc2, tags: &str) -> (Collector<FakeEc2>, Ec2Metrics, Arc<MemorySink>) {
        let tags = Arc::new(TagSchema::parse(tags));
        let metrics = Ec2Metrics::new(&tags);
        let sink = Arc::new(MemorySink::new());
        metrics.register(sink.as_ref()).unwrap();
        let collector = Collector::new(Arc::new(api), sink.clone(), &metrics, tags);
        (collector, metrics, sink)
    }

    #[tokio::test]
    async fn spot_requests_inherit_the_tags_of_this_cycle() {
        let (collector, metrics, sink) = collector(inventory(), "Team");
        collector.collect_once().await.unwrap();

        let expected = metrics
            .spots
            .count
            .labels()
            .with("az", "eu-west-1a")
            .with("product", "Linux/UNIX (Amazon VPC)")
            .with("persistence", "one-time")
            .with("instance_type", "c5.large")
            .with("launch_group", "none")
            .with("instance_profile", "unknown")
            .with("aws_tag_team", "batch");
        assert_eq!(sink.value("aws_ec2_spot_request_count", &expected), Some(1.0));
        assert_eq!(
            sink.value("aws_ec2_spot_request_bid_price_hourly_dollars", &expected),
            Some(0.05)
        );
        assert_eq!(sink.series("aws_ec2_spot_price_dollars").len(), 1);
        assert_eq!(sink.series("aws_ec2_instances_count").len(), 2);
        assert_eq!(sink.series("aws_ec2_reserved_instances_count").len(), 1);
        assert_eq!(collector.cache().snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn same_inventory_same_metrics() {
        let (collector, _, sink) = collector(inventory(), "Team,Environment");
        collector.collect_once().await.unwrap();
        let first = sink.render();
        collector.collect_once().await.unwrap();
        assert_eq!(sink.render(), first);
        assert!(!first.is_empty());
    }

    #[tokio::test]
    async fn instance_error_stops_the_cycle() {
        let api = inventory();
        api.fail_instances("connection refused");
        let (collector, _, _) = collector(api, "");
        let scheduler = Scheduler::new(collector, Duration::from_secs(240));

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, FetchError::Instances { .. }), "unexpected error {err:?}");
    }

    #[tokio::test]
    async fn background_errors_are_fatal() {
        let api = inventory();
        api.fail_reservations("access denied");
        let (collector, _, _) = collector(api, "");
        let scheduler = Scheduler::new(collector, Duration::from_secs(240));

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, FetchError::Reservations { .. }), "unexpected error {err:?}");
    }

    #[tokio::test]
    async fn panicking_fetcher_is_reported() {
        let tags = Arc::new(TagSchema::default());
        let metrics = Ec2Metrics::new(&tags);
        // the spot families are missing: the memory sink panics when they are updated
        let sink = Arc::new(MemorySink::new());
        for family in &metrics.families()[..7] {
            sink.register(family).unwrap();
        }
        let collector = Collector::new(Arc::new(inventory()), sink, &metrics, tags);

        let err = collector.collect_once().await.unwrap_err();
        assert!(matches!(err, FetchError::TaskPanicked { fetcher: "spots", .. }), "unexpected error {err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let api = inventory().with_delay(Call::SpotRequests, Duration::from_secs(600));
        let (collector, _, sink) = collector(api, "");
        let collector = collector.with_fetch_timeout(Some(Duration::from_secs(30)));

        let err = collector.collect_once().await.unwrap_err();
        match err {
            FetchError::Timeout { fetcher, timeout } => {
                assert_eq!(fetcher, "spots");
                assert_eq!(timeout, Duration::from_secs(30));
            }
            err => panic!("unexpected error {err:?}"),
        }
        // the other fetchers were not affected
        assert_eq!(sink.series("aws_ec2_instances_count").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_timeout_by_default() {
        let api = inventory().with_delay(Call::SpotRequests, Duration::from_secs(600));
        let (collector, _, sink) = collector(api, "");
        collector.collect_once().await.unwrap();
        assert_eq!(sink.series("aws_ec2_spot_request_count").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_at_each_interval() {
        let api = Arc::new(inventory());
        let tags = Arc::new(TagSchema::default());
        let metrics = Ec2Metrics::new(&tags);
        let sink = Arc::new(MemorySink::new());
        metrics.register(sink.as_ref()).unwrap();
        let collector = Collector::new(api.clone(), sink, &metrics, tags);
        let scheduler = Scheduler::new(collector, Duration::from_secs(240));

        // cycles at 0, 4 and 8 minutes
        let res = tokio::time::timeout(Duration::from_secs(9 * 60), scheduler.run()).await;
        assert!(res.is_err(), "the scheduler stopped: {res:?}");
        assert_eq!(api.calls(Call::Instances), 3);
        assert_eq!(api.calls(Call::Reservations), 3);
        assert_eq!(api.calls(Call::SpotRequests), 3);
    }
}

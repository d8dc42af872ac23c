//! Dual-cadence discovery scheduler.
//!
//! Two cycles share one seen-set and one feed. Each iteration fans out one
//! discovery task per (category, discount) pair, waits for every task to
//! finish and then sleeps before the next iteration.

use async_trait::async_trait;
use deals_alerts::{DeliveryOutcome, Notifier};
use deals_core::{AgeMode, Cadence, DealRecord, DeliveryMode, FilterConfig, ScheduleTask};
use deals_engine::{FilterEngine, SeenStore};
use deals_feeds::{DealFeed, FeedError};
use futures_util::future::join_all;
use rand::Rng;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where discovery tasks get their deals from.
#[async_trait]
pub trait DealSource: Send + Sync {
    /// `Ok(None)` means the feed answered without a body.
    async fn fetch_deals(&self, task: &ScheduleTask) -> Result<Option<Vec<DealRecord>>, FeedError>;
}

/// Where newly discovered deals are delivered.
#[async_trait]
pub trait DealSink: Send + Sync {
    async fn deliver(&self, deal: &DealRecord) -> DeliveryOutcome;

    async fn deliver_to(&self, deal: &DealRecord, destinations: &[String]) -> Vec<DeliveryOutcome>;
}

#[async_trait]
impl DealSource for DealFeed {
    async fn fetch_deals(&self, task: &ScheduleTask) -> Result<Option<Vec<DealRecord>>, FeedError> {
        DealFeed::fetch_deals(self, task).await
    }
}

#[async_trait]
impl DealSink for Notifier {
    async fn deliver(&self, deal: &DealRecord) -> DeliveryOutcome {
        self.send(deal).await
    }

    async fn deliver_to(&self, deal: &DealRecord, destinations: &[String]) -> Vec<DeliveryOutcome> {
        self.send_to(deal, destinations).await
    }
}

/// Timing of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSettings {
    pub cadence: Cadence,
    /// Delay before the first iteration.
    pub initial_delay: Duration,
    /// Per-task random delay before fetching, in milliseconds.
    pub jitter_ms: Range<u64>,
    /// Sleep between iterations.
    pub pause: Duration,
}

impl CycleSettings {
    pub fn priority() -> Self {
        Self {
            cadence: Cadence::Priority,
            initial_delay: Duration::ZERO,
            jitter_ms: 500..1000,
            pause: Duration::from_secs(5),
        }
    }

    pub fn regular() -> Self {
        Self {
            cadence: Cadence::Regular,
            initial_delay: Duration::from_secs(10),
            jitter_ms: 1000..5000,
            pause: Duration::from_secs(63),
        }
    }

    fn jitter(&self) -> Duration {
        if self.jitter_ms.is_empty() {
            return Duration::from_millis(self.jitter_ms.start);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.jitter_ms.clone()))
    }
}

/// Counters for one discovery task.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Deals returned by the feed.
    pub fetched: usize,
    /// Deals not seen before.
    pub fresh: usize,
    /// Delivery attempts that failed.
    pub failed_deliveries: usize,
}

pub struct Scheduler {
    source: Arc<dyn DealSource>,
    sink: Arc<dyn DealSink>,
    seen: Arc<SeenStore>,
    filters: Arc<FilterConfig>,
    age: AgeMode,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn DealSource>,
        sink: Arc<dyn DealSink>,
        seen: Arc<SeenStore>,
        filters: Arc<FilterConfig>,
        age: AgeMode,
    ) -> Self {
        Self {
            source,
            sink,
            seen,
            filters,
            age,
        }
    }

    pub fn seen(&self) -> &Arc<SeenStore> {
        &self.seen
    }

    /// Categories polled by a cycle.
    pub fn categories(&self, cadence: Cadence) -> &[String] {
        match cadence {
            Cadence::Priority => &self.filters.priority_category,
            Cadence::Regular => &self.filters.regular_category,
        }
    }

    /// Tasks for one iteration of a cycle.
    pub fn tasks(&self, cadence: Cadence) -> Vec<ScheduleTask> {
        ScheduleTask::cross_product(
            self.categories(cadence),
            &self.filters.price_off,
            self.age,
            cadence,
        )
    }

    /// Fetch one task's deals and deliver the ones not seen before.
    ///
    /// A deal is marked seen before delivery, so a failed send is never
    /// retried by a later iteration.
    pub async fn discover(&self, task: &ScheduleTask) -> Result<DiscoveryReport, FeedError> {
        let mut report = DiscoveryReport::default();

        let deals = match self.source.fetch_deals(task).await? {
            Some(deals) => deals,
            None => {
                info!(
                    category = %task.category,
                    discount = task.discount,
                    cadence = %task.cadence,
                    "Feed returned no content"
                );
                return Ok(report);
            }
        };
        report.fetched = deals.len();

        for deal in deals {
            if !self.seen.mark_seen(deal.id.clone()) {
                continue;
            }
            report.fresh += 1;

            let deal = deal.with_category(&task.category);
            report.failed_deliveries += self
                .route(&deal)
                .await
                .iter()
                .filter(|o| o.is_failure())
                .count();
        }

        debug!(
            category = %task.category,
            discount = task.discount,
            cadence = %task.cadence,
            fetched = report.fetched,
            fresh = report.fresh,
            "Discovery task finished"
        );
        Ok(report)
    }

    async fn route(&self, deal: &DealRecord) -> Vec<DeliveryOutcome> {
        match self.filters.delivery {
            DeliveryMode::Broadcast => vec![self.sink.deliver(deal).await],
            DeliveryMode::Filtered => {
                let mut destinations = FilterEngine::resolve(deal, &self.filters.filters);
                if destinations.is_empty() {
                    destinations = self.filters.other_webhook.clone();
                }
                if destinations.is_empty() {
                    debug!(deal_id = %deal.id, "No destination for deal, skipping");
                    return Vec::new();
                }
                self.sink.deliver_to(deal, &destinations).await
            }
        }
    }

    /// Run every task of one iteration concurrently and wait for all of them.
    ///
    /// Returns the number of tasks that completed without a fetch error.
    pub async fn run_iteration(&self, settings: &CycleSettings) -> usize {
        let tasks = self.tasks(settings.cadence);

        let results = join_all(tasks.iter().map(|task| async move {
            tokio::time::sleep(settings.jitter()).await;
            (task, self.discover(task).await)
        }))
        .await;

        let mut succeeded = 0;
        for (task, result) in results {
            match result {
                Ok(_) => succeeded += 1,
                Err(e) => warn!(
                    category = %task.category,
                    discount = task.discount,
                    cadence = %task.cadence,
                    error = %e,
                    "Discovery task failed"
                ),
            }
        }
        succeeded
    }

    /// Run a cycle until `shutdown` flips to true.
    ///
    /// Shutdown is observed during the initial delay and between
    /// iterations; an iteration in flight always runs to completion.
    pub async fn run_cycle(self: Arc<Self>, settings: CycleSettings, mut shutdown: watch::Receiver<bool>) {
        if self.categories(settings.cadence).is_empty() {
            info!(cadence = %settings.cadence, "No categories configured, cycle disabled");
            return;
        }

        info!(
            cadence = %settings.cadence,
            tasks = self.tasks(settings.cadence).len(),
            pause_secs = settings.pause.as_secs(),
            "Starting discovery cycle"
        );

        if !wait_or_shutdown(settings.initial_delay, &mut shutdown).await {
            info!(cadence = %settings.cadence, "Discovery cycle stopped");
            return;
        }

        let mut iteration: u64 = 0;
        loop {
            iteration += 1;
            let succeeded = self.run_iteration(&settings).await;
            debug!(cadence = %settings.cadence, iteration, succeeded, "Iteration complete");

            if !wait_or_shutdown(settings.pause, &mut shutdown).await {
                break;
            }
        }

        info!(cadence = %settings.cadence, iterations = iteration, "Discovery cycle stopped");
    }

    /// Spawn a cycle on the runtime.
    pub fn spawn(self: &Arc<Self>, settings: CycleSettings, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run_cycle(settings, shutdown))
    }
}

/// Sleep for `duration`. Returns false if shutdown was requested first.
async fn wait_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deals_core::{Criteria, FilterRule};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn deal(id: &str, offer: f64, average: f64) -> DealRecord {
        DealRecord {
            id: id.into(),
            title: format!("Deal {}", id),
            asin: format!("B0{}", id),
            offer_price: offer,
            average_price: average,
            categories: Vec::new(),
        }
    }

    /// Source that answers per category and records call ordering.
    #[derive(Default)]
    struct FakeSource {
        deals: HashMap<String, Option<Vec<DealRecord>>>,
        failing: Vec<String>,
        /// Latency per task, keyed by discount.
        latency_ms: HashMap<u32, u64>,
        calls: AtomicUsize,
        completed: AtomicUsize,
        /// Completed count observed when each call started.
        started_after: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl DealSource for FakeSource {
        async fn fetch_deals(&self, task: &ScheduleTask) -> Result<Option<Vec<DealRecord>>, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started_after
                .lock()
                .unwrap()
                .push(self.completed.load(Ordering::SeqCst));

            let latency = self.latency_ms.get(&task.discount).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(latency)).await;
            self.completed.fetch_add(1, Ordering::SeqCst);

            if self.failing.contains(&task.category) {
                return Err(FeedError::Transport("proxy refused".to_string()));
            }
            Ok(self
                .deals
                .get(&task.category)
                .cloned()
                .unwrap_or_else(|| Some(Vec::new())))
        }
    }

    /// Sink that records deliveries as (deal id, destination).
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DealSink for RecordingSink {
        async fn deliver(&self, deal: &DealRecord) -> DeliveryOutcome {
            self.sent
                .lock()
                .unwrap()
                .push((deal.id.to_string(), "default".to_string()));
            DeliveryOutcome::Delivered
        }

        async fn deliver_to(&self, deal: &DealRecord, destinations: &[String]) -> Vec<DeliveryOutcome> {
            let mut sent = self.sent.lock().unwrap();
            destinations
                .iter()
                .map(|d| {
                    sent.push((deal.id.to_string(), d.clone()));
                    DeliveryOutcome::Delivered
                })
                .collect()
        }
    }

    fn filters(priority: &[&str], regular: &[&str], price_off: &[u32]) -> FilterConfig {
        FilterConfig {
            other_webhook: Vec::new(),
            price_off: price_off.to_vec(),
            priority_category: priority.iter().map(|c| c.to_string()).collect(),
            regular_category: regular.iter().map(|c| c.to_string()).collect(),
            filters: Vec::new(),
            delivery: DeliveryMode::Broadcast,
            destination_pattern: None,
        }
    }

    fn scheduler(
        source: Arc<FakeSource>,
        sink: Arc<RecordingSink>,
        seen: SeenStore,
        filters: FilterConfig,
    ) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(
            source,
            sink,
            Arc::new(seen),
            Arc::new(filters),
            AgeMode::New,
        ))
    }

    fn task(category: &str) -> ScheduleTask {
        ScheduleTask::new(category, 20, AgeMode::New, Cadence::Priority)
    }

    #[tokio::test]
    async fn test_only_unseen_deals_are_notified() {
        let source = Arc::new(FakeSource {
            deals: HashMap::from([(
                "electronics".to_string(),
                Some(vec![deal("d1", 50.0, 100.0), deal("d2", 60.0, 100.0)]),
            )]),
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let scheduler = scheduler(
            source,
            sink.clone(),
            SeenStore::from_ids(["d1"]),
            filters(&["electronics"], &[], &[20]),
        );

        let report = scheduler.discover(&task("electronics")).await.unwrap();

        assert_eq!(
            report,
            DiscoveryReport {
                fetched: 2,
                fresh: 1,
                failed_deliveries: 0
            }
        );
        assert_eq!(sink.sent(), vec![("d2".to_string(), "default".to_string())]);
        assert!(scheduler.seen().contains("d1"));
        assert!(scheduler.seen().contains("d2"));

        // A second pass over the same feed notifies nothing.
        let report = scheduler.discover(&task("electronics")).await.unwrap();
        assert_eq!(report.fresh, 0);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_body_ends_task_quietly() {
        let source = Arc::new(FakeSource {
            deals: HashMap::from([("toys".to_string(), None)]),
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let scheduler = scheduler(source, sink.clone(), SeenStore::new(), filters(&["toys"], &[], &[20]));

        let report = scheduler.discover(&task("toys")).await.unwrap();
        assert_eq!(report, DiscoveryReport::default());
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_from_task() {
        let source = Arc::new(FakeSource {
            failing: vec!["toys".to_string()],
            ..Default::default()
        });
        let scheduler = scheduler(
            source,
            Arc::new(RecordingSink::default()),
            SeenStore::new(),
            filters(&["toys"], &[], &[20]),
        );

        assert!(matches!(
            scheduler.discover(&task("toys")).await,
            Err(FeedError::Transport(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_waits_for_every_task() {
        let source = Arc::new(FakeSource {
            latency_ms: HashMap::from([(20, 50), (50, 3_000)]),
            failing: vec!["toys".to_string()],
            ..Default::default()
        });
        let scheduler = scheduler(
            source.clone(),
            Arc::new(RecordingSink::default()),
            SeenStore::new(),
            filters(&["electronics", "toys"], &[], &[20, 50]),
        );

        let succeeded = scheduler.run_iteration(&CycleSettings::priority()).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert_eq!(source.completed.load(Ordering::SeqCst), 4);
        assert_eq!(succeeded, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_iteration_starts_after_previous_completes() {
        let source = Arc::new(FakeSource {
            latency_ms: HashMap::from([(20, 10), (50, 4_000)]),
            ..Default::default()
        });
        let scheduler = scheduler(
            source.clone(),
            Arc::new(RecordingSink::default()),
            SeenStore::new(),
            filters(&["electronics", "toys"], &[], &[20, 50]),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = scheduler.spawn(CycleSettings::priority(), shutdown_rx);
        while source.calls.load(Ordering::SeqCst) < 8 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let started_after = source.started_after.lock().unwrap().clone();
        assert!(started_after[..4].iter().all(|&done| done < 4));
        assert!(started_after[4..8].iter().all(|&done| done >= 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_stops_during_initial_delay() {
        let source = Arc::new(FakeSource::default());
        let scheduler = scheduler(
            source.clone(),
            Arc::new(RecordingSink::default()),
            SeenStore::new(),
            filters(&[], &["home"], &[20]),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = scheduler.spawn(CycleSettings::regular(), shutdown_rx);
        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cycle_without_categories_returns() {
        let scheduler = scheduler(
            Arc::new(FakeSource::default()),
            Arc::new(RecordingSink::default()),
            SeenStore::new(),
            filters(&["electronics"], &[], &[20]),
        );
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        scheduler
            .spawn(CycleSettings::regular(), shutdown_rx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_filtered_delivery_routes_by_rules() {
        let source = Arc::new(FakeSource {
            deals: HashMap::from([(
                "electronics".to_string(),
                Some(vec![
                    // 80% off: isolated rule
                    deal("big", 20.0, 100.0),
                    // 30% off: regular rule
                    deal("mid", 70.0, 100.0),
                    // 5% off: fallback
                    deal("small", 95.0, 100.0),
                ]),
            )]),
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());

        let mut config = filters(&["electronics"], &[], &[5]);
        config.delivery = DeliveryMode::Filtered;
        config.other_webhook = vec!["fallback".to_string()];
        config.filters = vec![
            FilterRule {
                name: Some("huge".to_string()),
                role: "deals".to_string(),
                criteria: Criteria {
                    percent_off_min: Some(70.0),
                    ..Default::default()
                },
                isolated: true,
                destinations: vec!["isolated".to_string()],
            },
            FilterRule {
                name: None,
                role: "deals".to_string(),
                criteria: Criteria {
                    percent_off_min: Some(25.0),
                    categories: Some(vec!["electronics".to_string()]),
                    ..Default::default()
                },
                isolated: false,
                destinations: vec!["regular".to_string()],
            },
        ];
        let scheduler = scheduler(source, sink.clone(), SeenStore::new(), config);

        scheduler.discover(&task("electronics")).await.unwrap();

        // The isolated rule comes first, so later regular rules never match.
        assert_eq!(
            sink.sent(),
            vec![
                ("big".to_string(), "isolated".to_string()),
                ("mid".to_string(), "fallback".to_string()),
                ("small".to_string(), "fallback".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_filtered_delivery_without_destination_skips() {
        let source = Arc::new(FakeSource {
            deals: HashMap::from([("home".to_string(), Some(vec![deal("d9", 50.0, 100.0)]))]),
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let mut config = filters(&["home"], &[], &[20]);
        config.delivery = DeliveryMode::Filtered;
        let scheduler = scheduler(source, sink.clone(), SeenStore::new(), config);

        let report = scheduler.discover(&task("home")).await.unwrap();
        assert_eq!(report.fresh, 1);
        assert!(sink.sent().is_empty());
        assert!(scheduler.seen().contains("d9"));
    }

    #[test]
    fn test_cycle_settings() {
        let priority = CycleSettings::priority();
        assert_eq!(priority.initial_delay, Duration::ZERO);
        assert_eq!(priority.pause, Duration::from_secs(5));
        for _ in 0..100 {
            let jitter = priority.jitter();
            assert!(jitter >= Duration::from_millis(500) && jitter < Duration::from_millis(1000));
        }

        let regular = CycleSettings::regular();
        assert_eq!(regular.initial_delay, Duration::from_secs(10));
        assert_eq!(regular.pause, Duration::from_secs(63));
        assert_eq!(regular.jitter_ms, 1000..5000);
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::bootstrap::BootstrapInitializer;
use crate::collector::SnapshotCollector;
use crate::producer::EventProducer;

/// Background scheduler owning the snapshot and event-sampling cadences.
///
/// `start` is idempotent and performs the bootstrap check plus one
/// synchronous collection before the loops spawn. Ticks that fall due while
/// a slow collection is in flight are skipped, not stacked: the intervals
/// run with `MissedTickBehavior::Skip`, and the collection additionally
/// holds an exclusive guard that later ticks `try_lock`. Tick failures are
/// logged and never terminate a loop. `stop` cancels future ticks and awaits
/// the loops; in-flight work finishes naturally. Lifecycle transitions are
/// serialized on one lock, so a `stop` racing a `start` waits for the loops
/// to be registered and then tears them down.
pub struct TelemetryScheduler {
    collector: Arc<SnapshotCollector>,
    producer: Arc<dyn EventProducer>,
    bootstrap: Arc<BootstrapInitializer>,
    snapshot_interval: Duration,
    sampling_interval: Duration,
    running: AtomicBool,
    collect_guard: Arc<Mutex<()>>,
    lifecycle: Mutex<Lifecycle>,
}

#[derive(Default)]
struct Lifecycle {
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl TelemetryScheduler {
    pub fn new(
        collector: Arc<SnapshotCollector>,
        producer: Arc<dyn EventProducer>,
        bootstrap: Arc<BootstrapInitializer>,
        snapshot_interval: Duration,
        sampling_interval: Duration,
    ) -> Self {
        Self {
            collector,
            producer,
            bootstrap,
            snapshot_interval,
            sampling_interval,
            running: AtomicBool::new(false),
            collect_guard: Arc::new(Mutex::new(())),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub async fn start(&self) {
        // Held until the loops are registered: a concurrent stop cannot
        // observe a half-started scheduler.
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.shutdown.is_some() {
            warn!("scheduler already running, ignoring start");
            return;
        }

        if let Err(e) = self.bootstrap.run().await {
            error!(error = %e, "bootstrap check failed");
        }
        run_snapshot_tick(&self.collector, &self.collect_guard).await;

        let (tx, rx) = watch::channel(false);

        let collector = self.collector.clone();
        let guard = self.collect_guard.clone();
        let mut shutdown = rx.clone();
        let interval = self.snapshot_interval;
        let snapshot_task = tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticks.tick() => run_snapshot_tick(&collector, &guard).await,
                    _ = shutdown.changed() => break,
                }
            }
        });

        let producer = self.producer.clone();
        let mut shutdown = rx;
        let interval = self.sampling_interval;
        let sampling_task = tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        if let Err(e) = producer.produce().await {
                            error!(error = %e, "event sampling tick failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });

        lifecycle.shutdown = Some(tx);
        lifecycle.tasks = vec![snapshot_task, sampling_task];
        self.running.store(true, Ordering::SeqCst);
        info!(
            snapshot_secs = self.snapshot_interval.as_secs(),
            sampling_secs = self.sampling_interval.as_secs(),
            "telemetry scheduler started"
        );
    }

    pub async fn stop(&self) {
        let (shutdown, tasks) = {
            let mut lifecycle = self.lifecycle.lock().await;
            match lifecycle.shutdown.take() {
                Some(tx) => {
                    self.running.store(false, Ordering::SeqCst);
                    (tx, std::mem::take(&mut lifecycle.tasks))
                }
                None => {
                    info!("scheduler not running, ignoring stop");
                    return;
                }
            }
        };
        let _ = shutdown.send(true);
        for task in tasks {
            let _ = task.await;
        }
        info!("telemetry scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// One snapshot-tick unit of work. Skips when the previous collection still
/// holds the guard.
async fn run_snapshot_tick(collector: &SnapshotCollector, guard: &Mutex<()>) {
    match guard.try_lock() {
        Ok(_held) => {
            if let Err(e) = collector.collect_snapshot().await {
                error!(error = %e, "snapshot collection failed");
            }
        }
        Err(_) => warn!("previous snapshot collection still in flight, skipping tick"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceDiscovery;
    use crate::error::Result;
    use crate::models::ConnectedDevice;
    use crate::producer::SyntheticEventProducer;
    use crate::store::mem::{MemEventStore, MemRuleStore, MemSnapshotStore};
    use async_trait::async_trait;

    struct NoDevices;

    #[async_trait]
    impl DeviceDiscovery for NoDevices {
        async fn connected_devices(&self) -> Result<Vec<ConnectedDevice>> {
            Ok(vec![])
        }
    }

    struct Fixture {
        events: Arc<MemEventStore>,
        snapshots: Arc<MemSnapshotStore>,
        scheduler: Arc<TelemetryScheduler>,
    }

    fn fixture_with(snapshot_interval: Duration) -> Fixture {
        let events = Arc::new(MemEventStore::new());
        let snapshots = Arc::new(MemSnapshotStore::new());
        let rules = Arc::new(MemRuleStore::new());
        let collector = Arc::new(SnapshotCollector::new(
            events.clone(),
            snapshots.clone(),
            rules.clone(),
            Arc::new(NoDevices),
        ));
        let bootstrap = Arc::new(BootstrapInitializer::new(
            events.clone(),
            snapshots.clone(),
            rules,
            false,
        ));
        let producer = Arc::new(SyntheticEventProducer::new(events.clone()));
        // sampling stays hour-long so it never interferes with snapshot
        // counting
        let scheduler = Arc::new(TelemetryScheduler::new(
            collector,
            producer,
            bootstrap,
            snapshot_interval,
            Duration::from_secs(3600),
        ));
        Fixture {
            events,
            snapshots,
            scheduler,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Duration::from_secs(3600))
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_during_a_slow_collection_are_skipped_not_replayed() {
        // 10s cadence, then a collection that takes 25s (t=10..35). The
        // ticks falling due at +20 and +30 must collapse into one catch-up
        // collection at t=35, with the cadence resuming at the next multiple
        // (+40) — not replay as a back-to-back backlog.
        let fx = fixture_with(Duration::from_secs(10));
        fx.scheduler.start().await;
        assert_eq!(fx.snapshots.len(), 1, "initial synchronous collection");

        *fx.snapshots.append_delay.lock().unwrap() = Some(Duration::from_secs(25));
        // t=12: the +10 tick is mid-collection
        time::sleep(Duration::from_secs(12)).await;
        *fx.snapshots.append_delay.lock().unwrap() = None;

        // t=36: slow collection landed at t=35 plus one coalesced catch-up;
        // a replayed backlog would have added a snapshot per missed tick
        time::sleep(Duration::from_secs(24)).await;
        assert_eq!(
            fx.snapshots.len(),
            3,
            "ticks firing during an in-flight collection must not stack"
        );

        // t=41: the +40 tick resumed the normal cadence
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fx.snapshots.len(), 4);
        fx.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_racing_a_slow_start_leaves_nothing_running() {
        let fx = fixture_with(Duration::from_secs(10));
        *fx.snapshots.append_delay.lock().unwrap() = Some(Duration::from_secs(5));

        let starter = {
            let scheduler = fx.scheduler.clone();
            tokio::spawn(async move { scheduler.start().await })
        };
        // let start acquire the lifecycle lock and enter its slow initial
        // collection before stop arrives
        tokio::task::yield_now().await;
        fx.scheduler.stop().await;
        starter.await.unwrap();

        assert!(!fx.scheduler.is_running());
        let settled = fx.snapshots.len();
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fx.snapshots.len(), settled, "no loop survives the stop");
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let fx = fixture();
        fx.scheduler.start().await;
        fx.scheduler.start().await;
        assert!(fx.scheduler.is_running());
        assert_eq!(fx.snapshots.len(), 1, "one initial collection, no double-register");
        fx.scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_allows_restart() {
        let fx = fixture();
        fx.scheduler.stop().await; // not running: no-op
        fx.scheduler.start().await;
        fx.scheduler.stop().await;
        fx.scheduler.stop().await;
        assert!(!fx.scheduler.is_running());

        fx.scheduler.start().await;
        assert!(fx.scheduler.is_running());
        assert_eq!(fx.snapshots.len(), 2, "restart performs a fresh initial collection");
        fx.scheduler.stop().await;
    }

    #[tokio::test]
    async fn tick_failure_does_not_stop_the_scheduler() {
        let fx = fixture();
        fx.events
            .fail
            .store(true, std::sync::atomic::Ordering::SeqCst);
        fx.scheduler.start().await;
        // initial collection failed, scheduler still running
        assert!(fx.scheduler.is_running());
        assert_eq!(fx.snapshots.len(), 0);
        fx.scheduler.stop().await;
    }
}

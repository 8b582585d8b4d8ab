use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::pool::TaskPool;
use super::tasks::{CycleReport, TickCycle};
use super::types::{EntityDirectory, EventSink, JobFunction};
use crate::{Error, Result};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_millis(2);
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Cadence and pool settings for the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Ticker period, also the width of each fetch window
    pub tick_interval: Duration,
    /// Deadline for a single job
    pub job_timeout: Duration,
    /// Concurrent jobs per tick
    pub worker_count: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

/// How the ticker treats tick-cycles still in flight when it stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopMode {
    /// Let them finish on their own
    Detach,
    /// Wait for every one of them
    Drain,
}

enum RunState {
    Stopped,
    Running {
        stop_tx: oneshot::Sender<StopMode>,
        ticker: JoinHandle<()>,
    },
}

/// Periodic scheduler that fans out one job per tracked entity on every tick
///
/// Each tick spawns an independent tick-cycle; a slow cycle never delays the next
/// tick and cycles may overlap.
pub struct Scheduler {
    settings: WorkerSettings,
    directory: Option<Arc<dyn EntityDirectory>>,
    job_fn: Option<Arc<dyn JobFunction>>,
    sink: Option<Arc<dyn EventSink>>,
    state: Mutex<RunState>,
}

impl Scheduler {
    /// Create a stopped scheduler with no collaborators
    pub fn new(settings: WorkerSettings) -> Self {
        Self {
            settings,
            directory: None,
            job_fn: None,
            sink: None,
            state: Mutex::new(RunState::Stopped),
        }
    }

    /// Set the source of tracked entities
    pub fn with_directory(mut self, directory: Arc<dyn EntityDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set the per-entity job
    pub fn with_job(mut self, job_fn: Arc<dyn JobFunction>) -> Self {
        self.job_fn = Some(job_fn);
        self
    }

    /// Set the destination for fake news events
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.settings.tick_interval = interval;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.settings.job_timeout = timeout;
        self
    }

    pub fn settings(&self) -> WorkerSettings {
        self.settings
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Assemble a tick-cycle, failing if any collaborator is missing
    fn tick_cycle(&self) -> Result<TickCycle> {
        let directory = self
            .directory
            .clone()
            .ok_or_else(|| Error::Config("entity directory is not set".into()))?;
        let job_fn = self
            .job_fn
            .clone()
            .ok_or_else(|| Error::Config("job function is not set".into()))?;
        let sink = self
            .sink
            .clone()
            .ok_or_else(|| Error::Config("event sink is not set".into()))?;
        if self.settings.tick_interval.is_zero() {
            return Err(Error::Config("tick interval must be greater than zero".into()));
        }

        Ok(TickCycle {
            directory,
            sink,
            pool: TaskPool::new(job_fn, self.settings.worker_count, self.settings.job_timeout),
            tick_interval: self.settings.tick_interval,
        })
    }

    /// Start ticking. A no-op when already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(&self) -> Result<()> {
        let mut state = self.lock_state();
        if matches!(*state, RunState::Running { .. }) {
            return Ok(());
        }

        let cycle = self.tick_cycle()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Config(format!("scheduler needs a tokio runtime: {}", e)))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let ticker = runtime.spawn(tick_loop(cycle, self.settings.tick_interval, stop_rx));
        *state = RunState::Running { stop_tx, ticker };

        info!(
            "Scheduler started: interval={}s, job_timeout={}ms, workers={}",
            self.settings.tick_interval.as_secs_f64(),
            self.settings.job_timeout.as_millis(),
            self.settings.worker_count
        );
        Ok(())
    }

    pub fn running(&self) -> bool {
        matches!(*self.lock_state(), RunState::Running { .. })
    }

    /// Stop ticking. In-flight tick-cycles keep running to completion.
    ///
    /// Idempotent and never blocks.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), RunState::Stopped);
        match previous {
            RunState::Running { stop_tx, .. } => {
                info!("Stopping scheduler");
                let _ = stop_tx.send(StopMode::Detach);
            }
            RunState::Stopped => debug!("Scheduler already stopped"),
        }
    }

    /// Stop ticking and wait until every in-flight tick-cycle has finished
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), RunState::Stopped);
        if let RunState::Running { stop_tx, ticker } = previous {
            info!("Shutting down scheduler, waiting for in-flight ticks");
            let _ = stop_tx.send(StopMode::Drain);
            if let Err(e) = ticker.await {
                error!("Scheduler ticker ended abnormally: {}", e);
            }
        }
    }

    /// Run a single tick-cycle immediately, outside the ticker
    pub async fn run_cycle_now(&self) -> Result<CycleReport> {
        let cycle = self.tick_cycle()?;
        Ok(cycle.run().await)
    }
}

async fn tick_loop(cycle: TickCycle, period: Duration, mut stop_rx: oneshot::Receiver<StopMode>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Skip the first tick (fires immediately)
    ticker.tick().await;

    let mut cycles: JoinSet<CycleReport> = JoinSet::new();

    let mode = loop {
        tokio::select! {
            mode = &mut stop_rx => {
                // A dropped sender means the scheduler itself went away
                break mode.unwrap_or(StopMode::Detach);
            }

            _ = ticker.tick() => {
                info!("Scheduler tick ({} cycles in flight)", cycles.len());
                cycles.spawn(cycle.clone().run());
            }

            Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                reap(joined);
            }
        }
    };

    match mode {
        StopMode::Detach => {
            if !cycles.is_empty() {
                debug!("Leaving {} tick cycles to finish on their own", cycles.len());
            }
            cycles.detach_all();
        }
        StopMode::Drain => {
            while let Some(joined) = cycles.join_next().await {
                reap(joined);
            }
        }
    }

    info!("Scheduler stopped");
}

fn reap(joined: std::result::Result<CycleReport, tokio::task::JoinError>) {
    match joined {
        Ok(report) => debug!(
            entities = report.entities,
            failed = report.failed_jobs,
            timed_out = report.timed_out_jobs,
            events = report.events,
            delivered = report.delivered,
            "Tick cycle finished"
        ),
        Err(e) => error!("Tick cycle task failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::entity::Entity;
    use crate::scheduler::types::{DerivedItem, Event, JobError, JobRequest, JobResult};

    struct StaticDirectory {
        entities: Vec<Entity>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StaticDirectory {
        fn new(ids: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                entities: ids
                    .iter()
                    .enumerate()
                    .map(|(i, id)| Entity {
                        id: format!("id{}", i + 1),
                        external_id: id.to_string(),
                        display_name: id.to_string(),
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                entities: Vec::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EntityDirectory for StaticDirectory {
        async fn list_entities(&self) -> Result<Vec<Entity>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Other("storage unavailable".into()));
            }
            Ok(self.entities.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<Event>>>,
        fail: bool,
    }

    impl RecordingSink {
        fn batches(&self) -> Vec<Vec<Event>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, events: Vec<Event>) -> Result<()> {
            self.batches.lock().unwrap().push(events);
            if self.fail {
                return Err(Error::Queue("queue unavailable".into()));
            }
            Ok(())
        }
    }

    fn items(count: usize) -> Vec<DerivedItem> {
        (0..count)
            .map(|i| DerivedItem {
                content: format!("Tweet{}", i),
                timestamp: Utc::now(),
            })
            .collect()
    }

    fn scheduler(
        directory: Arc<StaticDirectory>,
        sink: Arc<RecordingSink>,
        job_fn: Arc<dyn JobFunction>,
    ) -> Scheduler {
        Scheduler::new(WorkerSettings {
            tick_interval: Duration::from_secs(5),
            job_timeout: Duration::from_millis(500),
            worker_count: 2,
        })
        .with_directory(directory)
        .with_event_sink(sink)
        .with_job(job_fn)
    }

    fn ten_items_each() -> Arc<dyn JobFunction> {
        Arc::new(|req: JobRequest| async move { JobResult::success(req.entity_external_id, items(10)) })
    }

    #[tokio::test]
    async fn test_run_requires_collaborators() {
        let sched = Scheduler::new(WorkerSettings::default())
            .with_directory(StaticDirectory::new(&["foo"]))
            .with_job(ten_items_each());

        let err = sched.run().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!sched.running());
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let sched = scheduler(
            StaticDirectory::new(&["foo"]),
            Arc::new(RecordingSink::default()),
            ten_items_each(),
        );

        assert!(!sched.running());
        sched.run().unwrap();
        assert!(sched.running());
        sched.run().unwrap();
        assert!(sched.running());

        sched.stop();
        assert!(!sched.running());
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_a_no_op() {
        let sched = scheduler(
            StaticDirectory::new(&["foo"]),
            Arc::new(RecordingSink::default()),
            ten_items_each(),
        );

        sched.stop();
        sched.run().unwrap();
        sched.stop();
        sched.stop();
        assert!(!sched.running());

        // Restart after stop works
        sched.run().unwrap();
        assert!(sched.running());
        sched.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tick_all_results_processed() {
        let directory = StaticDirectory::new(&["foo", "bar"]);
        let sink = Arc::new(RecordingSink::default());
        let sched = scheduler(directory.clone(), sink.clone(), ten_items_each());

        sched.run().unwrap();
        tokio::time::sleep(Duration::from_secs(8)).await;
        sched.stop();

        assert_eq!(directory.calls(), 1);
        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tick_half_results_failed() {
        let directory = StaticDirectory::new(&["foo", "bar"]);
        let sink = Arc::new(RecordingSink::default());
        let job: Arc<dyn JobFunction> = Arc::new(|req: JobRequest| async move {
            if req.entity_external_id == "foo" {
                return JobResult::failed(req.entity_external_id, JobError::Failed("big error".into()));
            }
            JobResult::success(req.entity_external_id, items(10))
        });
        let sched = scheduler(directory, sink.clone(), job);

        sched.run().unwrap();
        tokio::time::sleep(Duration::from_secs(8)).await;
        sched.stop();

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 10);
        assert!(batches[0].iter().all(|e| e.entity_external_id == "bar"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tick_processing_timeout() {
        let sink = Arc::new(RecordingSink::default());
        let job: Arc<dyn JobFunction> = Arc::new(|req: JobRequest| async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            JobResult::success(req.entity_external_id, items(5))
        });
        let sched = scheduler(StaticDirectory::new(&["foo", "bar"]), sink.clone(), job)
            .with_tick_interval(Duration::from_secs(2))
            .with_job_timeout(Duration::from_millis(2));

        let report = sched.run_cycle_now().await.unwrap();
        assert_eq!(report.entities, 2);
        assert_eq!(report.failed_jobs, 2);
        assert_eq!(report.timed_out_jobs, 2);
        assert_eq!(report.events, 0);
        assert!(report.delivered);

        assert_eq!(sink.batches(), vec![Vec::<Event>::new()]);
    }

    #[tokio::test]
    async fn test_failed_and_successful_entities() {
        let sink = Arc::new(RecordingSink::default());
        let job: Arc<dyn JobFunction> = Arc::new(|req: JobRequest| async move {
            match req.entity_external_id.as_str() {
                "A" => JobResult::failed("A", JobError::Failed("fetch failed".into())),
                _ => JobResult::success(req.entity_external_id, items(2)),
            }
        });
        let sched = scheduler(StaticDirectory::new(&["A", "B"]), sink.clone(), job);

        let report = sched.run_cycle_now().await.unwrap();
        assert_eq!(report.failed_jobs, 1);
        assert_eq!(report.timed_out_jobs, 0);

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert!(batches[0].iter().all(|e| e.entity_external_id == "B"));
        assert_eq!(batches[0][0].content, "Tweet0");
        assert_eq!(batches[0][1].content, "Tweet1");
    }

    #[tokio::test]
    async fn test_zero_entities_still_sends_empty_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let job: Arc<dyn JobFunction> = {
            let calls = Arc::clone(&calls);
            Arc::new(move |req: JobRequest| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { JobResult::success(req.entity_external_id, Vec::new()) }
            })
        };
        let sink = Arc::new(RecordingSink::default());
        let sched = scheduler(StaticDirectory::new(&[]), sink.clone(), job);

        let report = sched.run_cycle_now().await.unwrap();
        assert_eq!(report.entities, 0);
        assert!(report.delivered);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.batches(), vec![Vec::<Event>::new()]);
    }

    #[tokio::test]
    async fn test_listing_failure_skips_sink() {
        let directory = StaticDirectory::failing();
        let sink = Arc::new(RecordingSink::default());
        let sched = scheduler(directory.clone(), sink.clone(), ten_items_each());

        let report = sched.run_cycle_now().await.unwrap();
        assert_eq!(report, CycleReport::default());
        assert_eq!(directory.calls(), 1);
        assert!(sink.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticking_survives_collaborator_failures() {
        let directory = StaticDirectory::new(&["foo"]);
        let sink = Arc::new(RecordingSink {
            batches: Mutex::new(Vec::new()),
            fail: true,
        });
        let sched = scheduler(directory.clone(), sink.clone(), ten_items_each());

        sched.run().unwrap();
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(sched.running());
        sched.stop();

        // Ticks at 5s, 10s and 15s all ran even though every delivery failed
        assert_eq!(directory.calls(), 3);
        assert_eq!(sink.batches().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_activity_after_stop() {
        let directory = StaticDirectory::new(&["foo"]);
        let sink = Arc::new(RecordingSink::default());
        let sched = scheduler(directory.clone(), sink.clone(), ten_items_each());

        sched.run().unwrap();
        tokio::time::sleep(Duration::from_millis(12_500)).await;
        assert_eq!(directory.calls(), 2);

        sched.stop();
        assert!(!sched.running());
        tokio::time::sleep(Duration::from_secs(15)).await;

        assert_eq!(directory.calls(), 2);
        assert_eq!(sink.batches().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycles_overlap() {
        let directory = StaticDirectory::new(&["foo"]);
        let sink = Arc::new(RecordingSink::default());
        // Each job outlives two ticks
        let job: Arc<dyn JobFunction> = Arc::new(|req: JobRequest| async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            JobResult::success(req.entity_external_id, items(1))
        });
        let sched = scheduler(directory.clone(), sink.clone(), job)
            .with_job_timeout(Duration::from_secs(30));

        sched.run().unwrap();
        tokio::time::sleep(Duration::from_millis(15_500)).await;

        // Three ticks fired even though the first cycle is still running
        assert_eq!(directory.calls(), 3);
        assert!(sink.batches().is_empty());

        sched.shutdown().await;
        assert!(!sched.running());
        assert_eq!(sink.batches().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_does_not_cancel_in_flight_cycles() {
        let sink = Arc::new(RecordingSink::default());
        let job: Arc<dyn JobFunction> = Arc::new(|req: JobRequest| async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            JobResult::success(req.entity_external_id, items(1))
        });
        let sched = scheduler(StaticDirectory::new(&["foo"]), sink.clone(), job)
            .with_job_timeout(Duration::from_secs(30));

        sched.run().unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        sched.stop();
        assert!(sink.batches().is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.batches().len(), 1);
    }
}

//! Bounded fan-out/fan-in of entity jobs.
//!
//! Each `run_batch` call builds its own work queue and worker set. Workers pull
//! from one shared queue, race every job against the deadline, and hand results
//! to the collector over a channel. Only the collector writes the output, which
//! is ordered by submission index.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::types::{JobError, JobFunction, JobRequest, JobResult};

type WorkQueue = Arc<Mutex<std::iter::Enumerate<std::vec::IntoIter<JobRequest>>>>;

/// Runs batches of jobs on a fixed number of concurrent workers
#[derive(Clone)]
pub struct TaskPool {
    job_fn: Arc<dyn JobFunction>,
    worker_count: usize,
    job_timeout: Duration,
}

impl TaskPool {
    pub fn new(job_fn: Arc<dyn JobFunction>, worker_count: usize, job_timeout: Duration) -> Self {
        Self {
            job_fn,
            // A zero-width pool would never drain the queue
            worker_count: worker_count.max(1),
            job_timeout,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Run every job and return one result per job, in submission order
    ///
    /// Spawns `min(worker_count, jobs.len())` workers; extra workers would find
    /// the queue already empty.
    pub async fn run_batch(&self, jobs: Vec<JobRequest>) -> Vec<JobResult> {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }

        let entity_ids: Vec<String> = jobs.iter().map(|j| j.entity_external_id.clone()).collect();
        let queue: WorkQueue = Arc::new(Mutex::new(jobs.into_iter().enumerate()));
        let (result_tx, mut result_rx) = mpsc::channel::<(usize, JobResult)>(total);

        let mut workers = JoinSet::new();
        for worker_id in 0..self.worker_count.min(total) {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&queue),
                result_tx.clone(),
                Arc::clone(&self.job_fn),
                self.job_timeout,
            ));
        }
        // The channel closes once the last worker exits
        drop(result_tx);

        let mut slots: Vec<Option<JobResult>> = (0..total).map(|_| None).collect();
        while let Some((index, result)) = result_rx.recv().await {
            slots[index] = Some(result);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Pool worker terminated abnormally: {}", e);
            }
        }

        fill_missing(slots, entity_ids)
    }
}

/// Resolve collected slots into results, marking any empty slot as lost
fn fill_missing(slots: Vec<Option<JobResult>>, entity_ids: Vec<String>) -> Vec<JobResult> {
    slots
        .into_iter()
        .zip(entity_ids)
        .map(|(slot, entity_id)| {
            slot.unwrap_or_else(|| {
                error!(entity = %entity_id, "No result collected for job");
                JobResult::failed(entity_id, JobError::Lost)
            })
        })
        .collect()
}

async fn worker_loop(
    worker_id: usize,
    queue: WorkQueue,
    results: mpsc::Sender<(usize, JobResult)>,
    job_fn: Arc<dyn JobFunction>,
    job_timeout: Duration,
) {
    loop {
        let next = {
            let mut queue = queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            queue.next()
        };
        let Some((index, request)) = next else {
            break;
        };

        debug!(worker = worker_id, entity = %request.entity_external_id, "Running job");
        let result = execute(Arc::clone(&job_fn), job_timeout, request).await;

        if results.send((index, result)).await.is_err() {
            // Collector is gone (the batch future was dropped)
            break;
        }
    }
}

/// Race one job against its deadline
///
/// The job runs in its own task. When the deadline wins the handle is dropped,
/// which detaches the task: it is abandoned, not aborted.
async fn execute(job_fn: Arc<dyn JobFunction>, job_timeout: Duration, request: JobRequest) -> JobResult {
    let entity_id = request.entity_external_id.clone();
    let handle = tokio::spawn(async move { job_fn.run(request).await });

    match tokio::time::timeout(job_timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!(entity = %entity_id, "Job task failed: {}", e);
            JobResult::failed(entity_id, JobError::Panicked(e.to_string()))
        }
        Err(_) => {
            warn!(entity = %entity_id, timeout_ms = job_timeout.as_millis() as u64, "Job deadline exceeded");
            JobResult::failed(entity_id, JobError::DeadlineExceeded)
        }
    }
}

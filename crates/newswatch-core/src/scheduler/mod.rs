mod pool;
mod service;
pub mod tasks;
mod types;

pub use pool::TaskPool;
pub use service::{
    Scheduler, WorkerSettings, DEFAULT_JOB_TIMEOUT, DEFAULT_TICK_INTERVAL, DEFAULT_WORKER_COUNT,
};
pub use tasks::{post_process, CycleReport};
pub use types::{DerivedItem, EntityDirectory, Event, EventSink, JobError, JobFunction, JobRequest, JobResult};

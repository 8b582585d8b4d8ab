pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod processor;
pub mod scheduler;
pub mod storage;

pub use config::AppConfig;
pub use error::{Error, Result};

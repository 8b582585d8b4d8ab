//! Event sinks: where each tick's fake news events end up.

mod logging;
mod sqs;

pub use logging::LogEventSink;
pub use sqs::{FakeNewsMessage, SqsEventSink, SQS_MAX_BATCH};

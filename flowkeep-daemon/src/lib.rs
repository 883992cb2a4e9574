//! Scheduler runtime: one sweep at startup, then one per interval, until
//! ctrl-c.

mod error;
mod runtime;

pub use error::DaemonError;
pub use runtime::{
    init_tracing, run, start_blocking, FailedInstance, LiveRunner, Scheduler, SweepRunner,
    SweepSummary, LOG_FORMAT_ENV,
};

//! Analysis model: jobs reconstructed from a log, and load over time.
//!
//! Event logs and perf logs share no schema. Both produce a job table, and
//! the renderers only see it through [`JobTable`].

pub mod jobs;
pub mod load;

pub use jobs::reconstruct_jobs;
pub use load::{LoadProfile, LoadSample, resample, sample_load};

use std::io::{self, Write};

/// Per-stage task runtimes of one job, in stage order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRow {
    pub label: String,
    /// `None` for a task that never finished.
    pub runtimes: Vec<Option<i64>>,
}

/// A table of jobs parsed from one log file.
pub trait JobTable {
    /// Kind of log the table came from, for messages.
    fn source(&self) -> &'static str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dump every job as text.
    fn write_raw(&self, out: &mut dyn Write) -> io::Result<()>;

    /// Per-stage runtimes, or `None` when the log carries no task intervals.
    fn runtime_rows(&self) -> Option<Vec<RuntimeRow>>;
}

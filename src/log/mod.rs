//! Event log reading: line reader plus the per-line event record parser.

pub mod event;
pub mod parse;

pub use event::{EventError, LogEvent, Tag};
pub use parse::read_event_log;

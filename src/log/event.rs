use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Attribute bag of one event line (`key=value` segments of the field token).
pub type Attributes = BTreeMap<String, String>;

/// Event tags emitted by the workload-execution server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// JQ: job submitted.
    JobQueued,
    /// TQ: task enqueued.
    TaskQueued,
    /// TD: task done.
    TaskDone,
    /// JD: job done.
    JobDone,
    /// WD: work unit done.
    WorkDone,
    Other(String),
}

impl Tag {
    pub fn parse(code: &str) -> Self {
        match code {
            "JQ" => Tag::JobQueued,
            "TQ" => Tag::TaskQueued,
            "TD" => Tag::TaskDone,
            "JD" => Tag::JobDone,
            "WD" => Tag::WorkDone,
            other => Tag::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Tag::JobQueued => "JQ",
            Tag::TaskQueued => "TQ",
            Tag::TaskDone => "TD",
            Tag::JobDone => "JD",
            Tag::WorkDone => "WD",
            Tag::Other(code) => code,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Problems with the content of a well-formed event line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("line {line}: {tag} event has no `{key}` attribute")]
    MissingAttribute {
        line: usize,
        tag: String,
        key: &'static str,
    },

    #[error("bad task id {value:?}: expected <jobid>_<stage>")]
    BadTaskId { value: String },

    #[error("line {line}: bad totalwork value {value:?}")]
    BadTotalWork { line: usize, value: String },
}

/// One parsed event-log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// 1-based line number in the source file.
    pub line: usize,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub tag: Tag,
    pub attributes: Attributes,
}

impl LogEvent {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &'static str) -> Result<&str, EventError> {
        self.attr(key).ok_or_else(|| EventError::MissingAttribute {
            line: self.line,
            tag: self.tag.code().to_string(),
            key,
        })
    }

    /// Parse the `taskid` attribute of a TQ/TD event.
    pub fn task_id(&self) -> Result<TaskId, EventError> {
        self.require("taskid")?.parse()
    }
}

/// `(jobId, stageIndex)`, written in logs as `<jobId>_<stageIndex>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    pub job_id: String,
    pub stage: usize,
}

impl FromStr for TaskId {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || EventError::BadTaskId {
            value: s.to_string(),
        };
        // Split at the last '_' so job ids containing '_' survive.
        let (job_id, stage) = s.rsplit_once('_').ok_or_else(bad)?;
        if job_id.is_empty() {
            return Err(bad());
        }
        let stage = stage.parse::<usize>().map_err(|_| bad())?;
        Ok(TaskId {
            job_id: job_id.to_string(),
            stage,
        })
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.job_id, self.stage)
    }
}

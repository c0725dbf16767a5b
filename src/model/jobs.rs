//! Job/task lifecycle reconstruction from the event stream.
//!
//! Per job:
//! - JQ creates it (a repeated JQ replaces the earlier record),
//! - TQ appends a task interval; stages must arrive as 0, 1, 2, ... or the
//!   job is dropped for good,
//! - TD closes the most recent interval,
//! - JD marks it complete.
//!
//! Jobs never completed are discarded at the end of the stream.

use crate::log::{EventError, LogEvent, Tag};
use crate::model::{JobTable, RuntimeRow};
use std::collections::BTreeMap;
use std::io::{self, Write};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconstructError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error("line {line}: task {task_id} done but job {job_id} has no enqueued task")]
    TaskDoneWithoutEnqueue {
        line: usize,
        job_id: String,
        task_id: String,
    },
}

/// One task's enqueue/dequeue offsets, relative to the job's submit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInterval {
    pub enqueued: i64,
    /// `None` until the matching TD arrives.
    pub dequeued: Option<i64>,
}

impl TaskInterval {
    pub fn runtime(&self) -> Option<i64> {
        self.dequeued.map(|end| end - self.enqueued)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub display_id: String,
    pub submit_time: i64,
    /// One entry per accepted TQ, in stage order.
    pub tasks: Vec<TaskInterval>,
    pub complete_time: Option<i64>,
}

impl Job {
    fn submitted(id: &str, display_id: &str, submit_time: i64) -> Self {
        Self {
            id: id.to_string(),
            display_id: display_id.to_string(),
            submit_time,
            tasks: Vec::new(),
            complete_time: None,
        }
    }

    pub fn runtimes(&self) -> Vec<Option<i64>> {
        self.tasks.iter().map(TaskInterval::runtime).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructStats {
    /// JQ events seen.
    pub submitted: usize,
    /// Jobs dropped for an out-of-order or repeated stage.
    pub excised: usize,
    /// Records overwritten by a later JQ for the same job id.
    pub replaced: usize,
    /// Jobs still open at end of stream.
    pub incomplete: usize,
    pub completed: usize,
}

impl ReconstructStats {
    pub fn dropped(&self) -> usize {
        self.excised + self.replaced + self.incomplete
    }
}

/// Completed jobs keyed by job id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSet {
    pub jobs: BTreeMap<String, Job>,
    pub stats: ReconstructStats,
}

impl JobSet {
    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }
}

impl JobTable for JobSet {
    fn source(&self) -> &'static str {
        "event log"
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }

    fn write_raw(&self, out: &mut dyn Write) -> io::Result<()> {
        for job in self.iter() {
            let tasks = job
                .tasks
                .iter()
                .map(|t| match t.dequeued {
                    Some(end) => format!("({}, {})", t.enqueued, end),
                    None => format!("({}, -)", t.enqueued),
                })
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                out,
                "{} jid={} submit={} complete={} tasks=[{}]",
                job.id,
                job.display_id,
                job.submit_time,
                job.complete_time
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                tasks
            )?;
        }
        Ok(())
    }

    fn runtime_rows(&self) -> Option<Vec<RuntimeRow>> {
        Some(
            self.iter()
                .map(|job| RuntimeRow {
                    label: job.display_id.clone(),
                    runtimes: job.runtimes(),
                })
                .collect(),
        )
    }
}

/// Incremental state machine; feed events in log order, then [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: BTreeMap<String, Job>,
    stats: ReconstructStats,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &LogEvent) -> Result<(), ReconstructError> {
        match event.tag {
            Tag::JobQueued => {
                let id = event.require("jobid")?;
                let display_id = event.attr("jid").unwrap_or(id);
                let job = Job::submitted(id, display_id, event.timestamp);
                if self.jobs.insert(id.to_string(), job).is_some() {
                    warn!(job = id, line = event.line, "job resubmitted, replacing earlier record");
                    self.stats.replaced += 1;
                }
                self.stats.submitted += 1;
            }
            Tag::TaskQueued => {
                let task = event.task_id()?;
                let Some(job) = self.jobs.get_mut(&task.job_id) else {
                    return Ok(());
                };
                if task.stage == job.tasks.len() {
                    job.tasks.push(TaskInterval {
                        enqueued: event.timestamp - job.submit_time,
                        dequeued: None,
                    });
                } else {
                    debug!(
                        task = %task,
                        expected = job.tasks.len(),
                        line = event.line,
                        "stage out of order, dropping job"
                    );
                    self.jobs.remove(&task.job_id);
                    self.stats.excised += 1;
                }
            }
            Tag::TaskDone => {
                let task = event.task_id()?;
                let Some(job) = self.jobs.get_mut(&task.job_id) else {
                    return Ok(());
                };
                let offset = event.timestamp - job.submit_time;
                let last = job
                    .tasks
                    .last_mut()
                    .ok_or_else(|| ReconstructError::TaskDoneWithoutEnqueue {
                        line: event.line,
                        job_id: task.job_id.clone(),
                        task_id: task.to_string(),
                    })?;
                last.dequeued = Some(offset);
            }
            Tag::JobDone => {
                let id = event.require("jobid")?;
                if let Some(job) = self.jobs.get_mut(id) {
                    job.complete_time = Some(event.timestamp);
                }
            }
            Tag::WorkDone | Tag::Other(_) => {}
        }
        Ok(())
    }

    /// Drop jobs that never completed and return the rest.
    pub fn finish(self) -> JobSet {
        let mut stats = self.stats;
        let (jobs, open): (BTreeMap<String, Job>, BTreeMap<String, Job>) = self
            .jobs
            .into_iter()
            .partition(|(_, job)| job.complete_time.is_some());
        stats.completed = jobs.len();
        stats.incomplete = open.len();
        JobSet { jobs, stats }
    }
}

/// Rebuild completed jobs from a time-ordered event stream.
pub fn reconstruct_jobs<'a, I>(events: I) -> Result<JobSet, ReconstructError>
where
    I: IntoIterator<Item = &'a LogEvent>,
{
    let mut tracker = JobTracker::new();
    for event in events {
        tracker.apply(event)?;
    }
    let set = tracker.finish();
    info!(
        "{} completed jobs have been parsed from the event log ({} of {} dropped: {} out of order, {} resubmitted, {} incomplete)",
        set.stats.completed,
        set.stats.dropped(),
        set.stats.submitted,
        set.stats.excised,
        set.stats.replaced,
        set.stats.incomplete
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::event::Attributes;
    use pretty_assertions::assert_eq;

    fn ev(timestamp: i64, tag: &str, attrs: &[(&str, &str)]) -> LogEvent {
        LogEvent {
            line: 0,
            timestamp,
            tag: Tag::parse(tag),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Attributes>(),
        }
    }

    fn jq(t: i64, id: &str) -> LogEvent {
        let jid = format!("j{}", id);
        ev(t, "JQ", &[("jobid", id), ("jid", jid.as_str())])
    }

    fn tq(t: i64, task: &str) -> LogEvent {
        ev(t, "TQ", &[("taskid", task)])
    }

    fn td(t: i64, task: &str) -> LogEvent {
        ev(t, "TD", &[("taskid", task)])
    }

    fn jd(t: i64, id: &str) -> LogEvent {
        ev(t, "JD", &[("jobid", id)])
    }

    #[test]
    fn three_stage_job_round_trip() {
        let events = vec![
            jq(1000, "a"),
            tq(1002, "a_0"),
            td(1010, "a_0"),
            tq(1011, "a_1"),
            td(1030, "a_1"),
            tq(1031, "a_2"),
            td(1060, "a_2"),
            jd(1061, "a"),
        ];
        let set = reconstruct_jobs(&events).unwrap();
        let job = set.get("a").unwrap();

        assert_eq!(job.display_id, "ja");
        assert_eq!(job.tasks.len(), 3);
        for t in &job.tasks {
            assert!(t.dequeued.unwrap() >= t.enqueued);
        }
        assert!(job.complete_time.unwrap() >= job.submit_time);
        assert_eq!(
            job.tasks,
            vec![
                TaskInterval { enqueued: 2, dequeued: Some(10) },
                TaskInterval { enqueued: 11, dequeued: Some(30) },
                TaskInterval { enqueued: 31, dequeued: Some(60) },
            ]
        );
        assert_eq!(job.runtimes(), vec![Some(8), Some(19), Some(29)]);
        assert_eq!(job.complete_time.map(|t| t - job.submit_time), Some(61));
    }

    #[test]
    fn finalized_count_matches_jobs_with_jq_and_jd() {
        let events = vec![
            jq(0, "a"),
            jq(0, "b"),
            jq(0, "c"),
            tq(1, "a_0"),
            tq(1, "b_0"),
            td(2, "a_0"),
            jd(3, "a"),
            jd(4, "b"),
        ];
        let set = reconstruct_jobs(&events).unwrap();

        assert_eq!(set.jobs.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(
            set.stats,
            ReconstructStats {
                submitted: 3,
                excised: 0,
                replaced: 0,
                incomplete: 1,
                completed: 2
            }
        );
        assert_eq!(set.stats.dropped(), 1);
        assert_eq!(set.stats.dropped() + set.stats.completed, set.stats.submitted);
    }

    #[test]
    fn job_without_jd_is_never_returned() {
        let events = vec![jq(0, "a"), tq(1, "a_0"), td(2, "a_0")];
        let set = reconstruct_jobs(&events).unwrap();
        assert!(set.get("a").is_none());
        assert_eq!(set.stats.incomplete, 1);
    }

    #[test]
    fn out_of_order_stage_excises_job_for_good() {
        let events = vec![
            jq(0, "a"),
            tq(1, "a_0"),
            td(2, "a_0"),
            tq(3, "a_2"),
            // Everything after the excision must be ignored.
            tq(4, "a_1"),
            td(5, "a_1"),
            jd(6, "a"),
        ];
        let set = reconstruct_jobs(&events).unwrap();
        assert!(set.get("a").is_none());
        assert_eq!(set.stats.excised, 1);
        assert_eq!(set.stats.incomplete, 0);
    }

    #[test]
    fn repeated_stage_excises_job() {
        let events = vec![jq(0, "a"), tq(1, "a_0"), tq(2, "a_0"), td(3, "a_0"), jd(4, "a")];
        let set = reconstruct_jobs(&events).unwrap();
        assert!(set.jobs.is_empty());
        assert_eq!(set.stats.excised, 1);
    }

    #[test]
    fn events_for_unknown_jobs_are_ignored() {
        let events = vec![tq(1, "x_0"), td(2, "x_0"), jd(3, "x"), jq(4, "a"), jd(5, "a")];
        let set = reconstruct_jobs(&events).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.get("a").unwrap().tasks.is_empty());
    }

    #[test]
    fn repeated_jq_is_deterministic_and_counted() {
        let events = vec![jq(0, "a"), tq(1, "a_0"), jq(10, "a"), jd(20, "a")];
        let set = reconstruct_jobs(&events).unwrap();
        assert_eq!(reconstruct_jobs(&events).unwrap(), set);

        assert_eq!(set.len(), 1);
        assert_eq!(set.stats.submitted, 2);
        assert_eq!(set.stats.replaced, 1);
        assert_eq!(set.stats.dropped() + set.stats.completed, set.stats.submitted);
    }

    #[test]
    fn td_without_tq_is_an_error() {
        let mut done = td(5, "a_0");
        done.line = 12;
        let events = vec![jq(0, "a"), done];
        let err = reconstruct_jobs(&events).unwrap_err();
        assert_eq!(
            err,
            ReconstructError::TaskDoneWithoutEnqueue {
                line: 12,
                job_id: "a".to_string(),
                task_id: "a_0".to_string()
            }
        );
    }

    #[test]
    fn task_left_open_has_no_runtime() {
        let events = vec![jq(0, "a"), tq(3, "a_0"), jd(9, "a")];
        let set = reconstruct_jobs(&events).unwrap();
        assert_eq!(set.get("a").unwrap().runtimes(), vec![None]);
    }

    #[test]
    fn missing_jobid_is_an_error() {
        let events = vec![ev(0, "JQ", &[("jid", "1")])];
        let err = reconstruct_jobs(&events).unwrap_err();
        assert!(matches!(
            err,
            ReconstructError::Event(EventError::MissingAttribute { key: "jobid", .. })
        ));
    }

    #[test]
    fn display_id_falls_back_to_jobid() {
        let events = vec![ev(0, "JQ", &[("jobid", "a")]), jd(1, "a")];
        let set = reconstruct_jobs(&events).unwrap();
        assert_eq!(set.get("a").unwrap().display_id, "a");
    }

    #[test]
    fn raw_dump_and_runtime_rows() {
        let events = vec![jq(100, "a"), tq(101, "a_0"), td(105, "a_0"), tq(106, "a_1"), jd(110, "a")];
        let set = reconstruct_jobs(&events).unwrap();

        let mut out = Vec::new();
        set.write_raw(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "a jid=ja submit=100 complete=110 tasks=[(1, 5), (6, -)]\n"
        );

        assert_eq!(
            set.runtime_rows().unwrap(),
            vec![RuntimeRow {
                label: "ja".to_string(),
                runtimes: vec![Some(4), None]
            }]
        );
    }
}

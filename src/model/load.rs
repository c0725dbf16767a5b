//! Load over time: active jobs, active tasks and active work units.
//!
//! Each series is a sparse step function, one sample per event that moves
//! its counter. Read it back with [`value_at`] (last value held), never by
//! interpolating between samples.

use crate::log::{EventError, LogEvent, Tag};
use tracing::debug;

/// Work units assumed for a TQ event without a `totalwork` attribute.
pub const DEFAULT_TOTAL_WORK: i64 = 1;

/// Counter value at `offset` seconds after the first event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSample {
    pub offset: i64,
    pub count: i64,
}

impl From<(i64, i64)> for LoadSample {
    fn from((offset, count): (i64, i64)) -> Self {
        Self { offset, count }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadProfile {
    pub jobs: Vec<LoadSample>,
    pub tasks: Vec<LoadSample>,
    pub work: Vec<LoadSample>,
}

impl LoadProfile {
    /// The three series with their names, in a fixed order.
    pub fn series(&self) -> [(&'static str, &[LoadSample]); 3] {
        [
            ("jobs", self.jobs.as_slice()),
            ("tasks", self.tasks.as_slice()),
            ("work", self.work.as_slice()),
        ]
    }
}

#[derive(Debug)]
pub struct LoadSampler {
    tasks_per_job: i64,
    anchor: Option<i64>,
    job_count: i64,
    task_count: i64,
    work_count: i64,
    profile: LoadProfile,
}

impl LoadSampler {
    /// `tasks_per_job` is added to the task count for every submitted job.
    pub fn new(tasks_per_job: usize) -> Self {
        Self {
            tasks_per_job: tasks_per_job as i64,
            anchor: None,
            job_count: 0,
            task_count: 0,
            work_count: 0,
            profile: LoadProfile::default(),
        }
    }

    pub fn observe(&mut self, event: &LogEvent) -> Result<(), EventError> {
        // The first event of any kind is time zero.
        let anchor = *self.anchor.get_or_insert(event.timestamp);
        let offset = event.timestamp - anchor;

        match event.tag {
            Tag::JobQueued => {
                self.job_count += 1;
                self.task_count += self.tasks_per_job;
                self.profile.jobs.push((offset, self.job_count).into());
                self.profile.tasks.push((offset, self.task_count).into());
            }
            Tag::JobDone => {
                self.job_count -= 1;
                self.profile.jobs.push((offset, self.job_count).into());
            }
            Tag::TaskQueued => {
                self.work_count += total_work(event)?;
                self.profile.work.push((offset, self.work_count).into());
            }
            Tag::TaskDone => {
                self.task_count -= 1;
                self.profile.tasks.push((offset, self.task_count).into());
            }
            Tag::WorkDone => {
                self.work_count -= 1;
                self.profile.work.push((offset, self.work_count).into());
            }
            Tag::Other(_) => {}
        }
        Ok(())
    }

    pub fn finish(self) -> LoadProfile {
        self.profile
    }
}

fn total_work(event: &LogEvent) -> Result<i64, EventError> {
    match event.attr("totalwork") {
        None => Ok(DEFAULT_TOTAL_WORK),
        Some(v) => v.parse().map_err(|_| EventError::BadTotalWork {
            line: event.line,
            value: v.to_string(),
        }),
    }
}

/// Build the three load series from a time-ordered event stream.
pub fn sample_load<'a, I>(events: I, tasks_per_job: usize) -> Result<LoadProfile, EventError>
where
    I: IntoIterator<Item = &'a LogEvent>,
{
    let mut sampler = LoadSampler::new(tasks_per_job);
    for event in events {
        sampler.observe(event)?;
    }
    let profile = sampler.finish();
    debug!(
        jobs = profile.jobs.len(),
        tasks = profile.tasks.len(),
        work = profile.work.len(),
        "load samples recorded"
    );
    Ok(profile)
}

/// Last value recorded at or before `offset`; zero before the first sample.
///
/// `series` must be ordered by offset.
pub fn value_at(series: &[LoadSample], offset: i64) -> i64 {
    let idx = series.partition_point(|s| s.offset <= offset);
    if idx == 0 {
        0
    } else {
        series[idx - 1].count
    }
}

/// Resample a sparse series every `interval` seconds from 0 up to the last
/// sample, then close it with a zero point one interval later.
pub fn resample(series: &[LoadSample], interval: i64) -> Vec<LoadSample> {
    let Some(last) = series.last() else {
        return Vec::new();
    };
    if interval <= 0 {
        return Vec::new();
    }

    let points = last.offset.max(0) / interval;
    let mut out: Vec<LoadSample> = (0..=points)
        .map(|i| {
            let offset = i * interval;
            LoadSample {
                offset,
                count: value_at(series, offset),
            }
        })
        .collect();
    out.push(LoadSample {
        offset: (points + 1) * interval,
        count: 0,
    });
    out
}

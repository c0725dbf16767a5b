//! Perf log: one JSON record per completed job.
//!
//! Line shape (after a fixed 26-byte prefix):
//! {
//!   "Id": "0a7c...",
//!   "Ptasks": { "0a7c..._0": {...}, ... },
//!   "Pworks": {
//!     "0a7c..._0_0": { "DataIn": 3, "DataOut": 1, "Runtime": 40, ... },
//!     ...
//!   },
//!   ...
//! }
//!
//! We keep `Ptasks` and unknown keys as raw JSON for the dump and sum `Pworks`
//! into data movement vs compute time.

use crate::model::{JobTable, RuntimeRow};
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Bytes of log-line header in front of every JSON record.
pub const PERF_PREFIX_LEN: usize = 26;

#[derive(Debug, Error)]
pub enum PerfError {
    #[error("line {line}: shorter than the {}-byte record prefix", PERF_PREFIX_LEN)]
    ShortLine { line: usize },

    #[error("line {line}: record prefix ends inside a multi-byte character")]
    SplitPrefix { line: usize },

    #[error("line {line}: not valid UTF-8: {source}")]
    NotUtf8 {
        line: usize,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("line {line}: bad JSON record: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerfRecord {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Ptasks", default)]
    pub tasks: BTreeMap<String, Value>,

    #[serde(rename = "Pworks", default)]
    pub works: BTreeMap<String, PerfWork>,

    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Accounting for one work unit; missing numbers count as zero.
#[derive(Debug, Clone, Deserialize)]
pub struct PerfWork {
    #[serde(rename = "DataIn", default)]
    pub data_in: f64,

    #[serde(rename = "DataOut", default)]
    pub data_out: f64,

    #[serde(rename = "Runtime", default)]
    pub runtime: f64,

    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl PerfRecord {
    pub fn data_movement(&self) -> f64 {
        self.works.values().map(|w| w.data_in + w.data_out).sum()
    }

    pub fn compute(&self) -> f64 {
        self.works.values().map(|w| w.runtime).sum()
    }

    /// Share of accounted time spent moving data, in [0, 1].
    pub fn data_movement_overhead(&self) -> Option<f64> {
        let movement = self.data_movement();
        let total = movement + self.compute();
        if total > 0.0 { Some(movement / total) } else { None }
    }
}

/// Parse one non-blank perf log line.
pub fn parse_perf_line(lineno: usize, line: &str) -> Result<PerfRecord, PerfError> {
    if line.len() < PERF_PREFIX_LEN {
        return Err(PerfError::ShortLine { line: lineno });
    }
    let json = line
        .get(PERF_PREFIX_LEN..)
        .ok_or(PerfError::SplitPrefix { line: lineno })?;
    serde_json::from_str(json).map_err(|source| PerfError::Json {
        line: lineno,
        source,
    })
}

/// Perf records keyed by job id.
#[derive(Debug, Clone, Default)]
pub struct PerfJobs {
    pub jobs: BTreeMap<String, PerfRecord>,
}

impl PerfJobs {
    pub fn parse_reader<R: BufRead>(reader: R) -> anyhow::Result<Self> {
        let mut jobs = BTreeMap::new();
        for (lineno, raw) in reader.split(b'\n').enumerate() {
            let lno = lineno + 1;
            let raw = raw.with_context(|| format!("read error at line {}", lno))?;
            let bytes = raw.strip_suffix(b"\r").unwrap_or(&raw);

            if bytes.is_empty() {
                continue;
            }

            let line = std::str::from_utf8(bytes)
                .map_err(|source| PerfError::NotUtf8 { line: lno, source })?;
            let record = parse_perf_line(lno, line)?;
            jobs.insert(record.id.clone(), record);
        }
        Ok(Self { jobs })
    }

    /// One overhead line per job; `n/a` when the record has no accounting.
    pub fn write_overhead(&self, out: &mut dyn Write) -> io::Result<()> {
        for record in self.jobs.values() {
            match record.data_movement_overhead() {
                Some(o) => writeln!(out, "data movement overhead of job {}: {:.6}", record.id, o)?,
                None => writeln!(out, "data movement overhead of job {}: n/a", record.id)?,
            }
        }
        Ok(())
    }
}

impl JobTable for PerfJobs {
    fn source(&self) -> &'static str {
        "perf log"
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }

    fn write_raw(&self, out: &mut dyn Write) -> io::Result<()> {
        for record in self.jobs.values() {
            writeln!(out, "=======")?;
            writeln!(out, "Id {}", record.id)?;
            for (k, v) in &record.tasks {
                writeln!(out, "{} {}", k, v)?;
            }
            for (k, w) in &record.works {
                write!(
                    out,
                    "{} DataIn={} DataOut={} Runtime={}",
                    k, w.data_in, w.data_out, w.runtime
                )?;
                for (key, v) in &w.other {
                    write!(out, " {}={}", key, v)?;
                }
                writeln!(out)?;
            }
            for (k, v) in &record.other {
                writeln!(out, "{} {}", k, v)?;
            }
        }
        Ok(())
    }

    fn runtime_rows(&self) -> Option<Vec<RuntimeRow>> {
        None
    }
}

pub fn read_perf_log(path: &Path) -> anyhow::Result<PerfJobs> {
    let file = File::open(path).with_context(|| format!("open perf log {}", path.display()))?;
    let jobs = PerfJobs::parse_reader(BufReader::new(file))
        .with_context(|| format!("parse perf log {}", path.display()))?;
    info!("{} completed jobs have been parsed from the perf log", jobs.len());
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PREFIX: &str = "[2014/03/18 15:48:03] [P] ";

    fn line(json: &str) -> String {
        format!("{}{}", PREFIX, json)
    }

    #[test]
    fn prefix_is_twenty_six_bytes() {
        assert_eq!(PREFIX.len(), PERF_PREFIX_LEN);
    }

    #[test]
    fn parses_record_and_computes_overhead() {
        let rec = parse_perf_line(
            1,
            &line(
                r#"{"Id":"j1","Ptasks":{"j1_0":{"Runtime":9}},"Pworks":{"j1_0_0":{"DataIn":2,"DataOut":3,"Runtime":10},"j1_0_1":{"DataIn":1,"DataOut":0,"Runtime":4.5,"Client":"c1"}},"Jid":"17"}"#,
            ),
        )
        .unwrap();

        assert_eq!(rec.id, "j1");
        assert_eq!(rec.tasks.len(), 1);
        assert_eq!(rec.works.len(), 2);
        assert_eq!(rec.other.get("Jid"), Some(&Value::String("17".to_string())));
        assert_eq!(rec.works["j1_0_1"].other.get("Client"), Some(&Value::from("c1")));
        assert_eq!(rec.data_movement(), 6.0);
        assert_eq!(rec.compute(), 14.5);
        let overhead = rec.data_movement_overhead().unwrap();
        assert!((overhead - 6.0 / 20.5).abs() < 1e-12);
    }

    #[test]
    fn overhead_undefined_without_accounting() {
        let rec = parse_perf_line(1, &line(r#"{"Id":"j1"}"#)).unwrap();
        assert!(rec.data_movement_overhead().is_none());
    }

    #[test]
    fn short_line_is_an_error() {
        let err = parse_perf_line(4, "[2014/03/18]").unwrap_err();
        assert!(matches!(err, PerfError::ShortLine { line: 4 }));
    }

    #[test]
    fn prefix_ending_mid_character_is_its_own_error() {
        // "é" is two bytes, so byte 26 falls inside it.
        let text = r#"[2014/03/18 15:48:03] [P]é{"Id":"a"}"#;
        let err = parse_perf_line(7, text).unwrap_err();
        assert!(matches!(err, PerfError::SplitPrefix { line: 7 }), "{err}");
        assert_eq!(
            err.to_string(),
            "line 7: record prefix ends inside a multi-byte character"
        );
    }

    #[test]
    fn non_utf8_line_is_an_error() {
        let mut text = PREFIX.as_bytes().to_vec();
        text.extend_from_slice(b"{\"Id\":\"\xff\"}\n");
        let err = PerfJobs::parse_reader(text.as_slice()).unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<PerfError>(),
                Some(PerfError::NotUtf8 { line: 1, .. })
            ),
            "{err}"
        );
    }

    #[test]
    fn bad_json_is_an_error() {
        let err = parse_perf_line(2, &line("{not json")).unwrap_err();
        assert!(matches!(err, PerfError::Json { line: 2, .. }));
    }

    #[test]
    fn reader_keys_by_id_and_skips_blank_lines() {
        let text = format!(
            "{}\r\n\n{}\n{}\n",
            line(r#"{"Id":"b","Pworks":{"w":{"DataIn":1,"DataOut":1,"Runtime":2}}}"#),
            line(r#"{"Id":"a"}"#),
            line(r#"{"Id":"b","Pworks":{"w":{"DataIn":0,"DataOut":0,"Runtime":2}}}"#),
        );
        let jobs = PerfJobs::parse_reader(text.as_bytes()).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs.jobs["b"].data_movement(), 0.0);
        assert!(jobs.runtime_rows().is_none());

        let mut out = Vec::new();
        jobs.write_overhead(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "data movement overhead of job a: n/a\n\
             data movement overhead of job b: 0.000000\n"
        );
    }

    #[test]
    fn raw_dump_lists_sorted_entries() {
        let text = line(
            r#"{"Id":"a","Ptasks":{"t1":1,"t0":0},"Pworks":{"w":{"DataIn":1,"DataOut":2,"Runtime":3,"Client":"c1"}},"State":"done"}"#,
        );
        let jobs = PerfJobs::parse_reader(text.as_bytes()).unwrap();
        let mut out = Vec::new();
        jobs.write_raw(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "=======\nId a\nt0 0\nt1 1\nw DataIn=1 DataOut=2 Runtime=3 Client=\"c1\"\nState \"done\"\n"
        );
    }

    #[test]
    fn read_perf_log_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", line(r#"{"Id":"a"}"#)).unwrap();
        let jobs = read_perf_log(file.path()).unwrap();
        assert_eq!(jobs.len(), 1);
    }
}

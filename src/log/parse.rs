use crate::log::event::{Attributes, LogEvent, Tag};
use anyhow::Context;
use chrono::{Local, NaiveDateTime, TimeZone};
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Format of the bracketed timestamp that opens every event line.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Index of the `TAG;key=value;...` token among the whitespace-separated tokens.
const FIELD_TOKEN: usize = 4;

/// A `[`-prefixed line that could not be parsed. Always fatal.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: no closing bracket after timestamp: {text:?}")]
    MissingTimestamp { line: usize, text: String },

    #[error("line {line}: bad timestamp {value:?}: {source}")]
    BadTimestamp {
        line: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("line {line}: local time {value:?} does not exist")]
    NonexistentLocalTime { line: usize, value: String },

    #[error("line {line}: missing event field (token {})", FIELD_TOKEN + 1)]
    MissingField { line: usize },

    #[error("line {line}: attribute {segment:?} is not key=value")]
    BadAttribute { line: usize, segment: String },

    #[error("line {line}: event record is not valid UTF-8: {source}")]
    NotUtf8 {
        line: usize,
        #[source]
        source: std::str::Utf8Error,
    },
}

/// Turns raw event-log lines into [`LogEvent`]s.
///
/// Expected shape:
/// [2014/03/18 15:48:03] tok tok JQ;jobid=1234;jid=17
///
/// Timestamps carry no zone; they are interpreted in `Tz` (local time by default).
#[derive(Debug, Clone)]
pub struct EventLineParser<Tz: TimeZone = Local> {
    bracket: Regex,
    tz: Tz,
}

impl EventLineParser<Local> {
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_timezone(Local)
    }
}

impl<Tz: TimeZone> EventLineParser<Tz> {
    pub fn with_timezone(tz: Tz) -> Result<Self, regex::Error> {
        Ok(Self {
            bracket: Regex::new(r"^\[([^\]]*)\]")?,
            tz,
        })
    }

    /// Parse one line. Lines not starting with `[` are noise and yield `None`.
    pub fn parse_line(&self, lineno: usize, line: &str) -> Result<Option<LogEvent>, ParseError> {
        if !line.starts_with('[') {
            return Ok(None);
        }

        let caps = self
            .bracket
            .captures(line)
            .ok_or_else(|| ParseError::MissingTimestamp {
                line: lineno,
                text: line.to_string(),
            })?;
        // Group 1 always participates when the pattern matches.
        let value = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let timestamp = self.parse_timestamp(lineno, value)?;

        let field = line
            .split_whitespace()
            .nth(FIELD_TOKEN)
            .ok_or(ParseError::MissingField { line: lineno })?;

        let mut parts = field.split(';');
        let tag = Tag::parse(parts.next().unwrap_or_default());

        let mut attributes = Attributes::new();
        for segment in parts {
            // Tolerate trailing or doubled separators.
            if segment.is_empty() {
                continue;
            }
            let (key, val) = segment
                .split_once('=')
                .ok_or_else(|| ParseError::BadAttribute {
                    line: lineno,
                    segment: segment.to_string(),
                })?;
            attributes.insert(key.to_string(), val.to_string());
        }

        Ok(Some(LogEvent {
            line: lineno,
            timestamp,
            tag,
            attributes,
        }))
    }

    fn parse_timestamp(&self, lineno: usize, value: &str) -> Result<i64, ParseError> {
        let naive = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|source| {
            ParseError::BadTimestamp {
                line: lineno,
                value: value.to_string(),
                source,
            }
        })?;
        // On a DST fold take the earlier instant.
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.timestamp())
            .ok_or_else(|| ParseError::NonexistentLocalTime {
                line: lineno,
                value: value.to_string(),
            })
    }

    /// Parse every event line of `reader`, in order.
    ///
    /// Lines are read as bytes; only `[`-prefixed lines must be UTF-8.
    pub fn parse_reader<R: BufRead>(&self, reader: R) -> anyhow::Result<Vec<LogEvent>> {
        let mut out = Vec::new();
        for (lineno, raw) in reader.split(b'\n').enumerate() {
            let lno = lineno + 1;
            let raw = raw.with_context(|| format!("read error at line {}", lno))?;
            let bytes = raw.strip_suffix(b"\r").unwrap_or(&raw);

            // Blank and noise lines are skipped before decoding.
            if !bytes.starts_with(b"[") {
                continue;
            }

            let line = std::str::from_utf8(bytes)
                .map_err(|source| ParseError::NotUtf8 { line: lno, source })?;
            if let Some(event) = self.parse_line(lno, line)? {
                out.push(event);
            }
        }
        Ok(out)
    }
}

/// Read an event log file into its time-ordered event stream.
pub fn read_event_log(path: &Path) -> anyhow::Result<Vec<LogEvent>> {
    let file =
        File::open(path).with_context(|| format!("open event log {}", path.display()))?;
    let parser = EventLineParser::new()?;
    parser
        .parse_reader(BufReader::new(file))
        .with_context(|| format!("parse event log {}", path.display()))
}

//! Analysis and rendering settings, injected from the command line.

use anyhow::bail;
use std::path::PathBuf;

/// Pipeline stages, in the order their tasks are enqueued.
pub const DEFAULT_STAGES: [&str; 6] = ["prep", "derep", "screen", "fgs", "uclust", "blat"];

/// Bar colors, cycled when there are more jobs than colors.
pub const DEFAULT_COLORS: [&str; 6] = ["blue", "red", "black", "green", "magenta", "yellow"];

/// Ceiling on concurrently active work units.
pub const DEFAULT_CLIENT_QUOTA: i64 = 80;

/// Spacing of resampled points in the workload plot, in seconds.
pub const DEFAULT_SAMPLE_INTERVAL: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub stages: Vec<String>,
    pub colors: Vec<String>,
    pub client_quota: i64,
    pub sample_interval: i64,
    pub out_dir: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            stages: DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
            colors: DEFAULT_COLORS.iter().map(|s| s.to_string()).collect(),
            client_quota: DEFAULT_CLIENT_QUOTA,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            out_dir: PathBuf::from("."),
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stages.is_empty() {
            bail!("at least one stage label is required");
        }
        if self.colors.is_empty() {
            bail!("at least one color is required");
        }
        if self.sample_interval <= 0 {
            bail!("sample interval must be positive, got {}", self.sample_interval);
        }
        if self.client_quota < 0 {
            bail!("client quota must not be negative, got {}", self.client_quota);
        }
        Ok(())
    }

    /// Number of tasks a submitted job will eventually enqueue.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Label for stage `idx`; stages past the configured list get a generic name.
    pub fn stage_label(&self, idx: usize) -> String {
        self.stages
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("stage{}", idx))
    }

    pub fn color(&self, idx: usize) -> &str {
        if self.colors.is_empty() {
            return "black";
        }
        &self.colors[idx % self.colors.len()]
    }
}

//! Presentation of reconstructed jobs and load series: text tables and SVG charts.

pub mod chart;
pub mod text;

pub use text::{write_load_table, write_runtime_csv};

use crate::config::RenderConfig;
use crate::model::{LoadSample, RuntimeRow, resample};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use svg::Document;
use tracing::info;

/// File name of the all-jobs runtime chart.
pub const TASK_BARS_NAME: &str = "task_runtime";

fn save(doc: &Document, config: &RenderConfig, name: &str) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("create output directory {}", config.out_dir.display()))?;
    let path = config.out_dir.join(format!("{}.svg", file_safe(name)));
    svg::save(&path, doc).with_context(|| format!("write chart {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(path)
}

/// Keep job labels from escaping the output directory.
fn file_safe(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("job{}", cleaned),
        _ => cleaned,
    }
}

/// One chart per job, named after the job's display id.
pub fn write_job_charts(rows: &[RuntimeRow], config: &RenderConfig) -> anyhow::Result<Vec<PathBuf>> {
    rows.iter()
        .map(|row| save(&chart::job_bar_chart(row, config), config, &row.label))
        .collect()
}

/// All jobs in one grouped chart.
pub fn write_task_bars(rows: &[RuntimeRow], config: &RenderConfig) -> anyhow::Result<PathBuf> {
    save(&chart::grouped_bar_chart(rows, config), config, TASK_BARS_NAME)
}

/// Workload plot of a sparse work-unit series, named after the input log.
pub fn write_workload(
    work: &[LoadSample],
    input: &Path,
    config: &RenderConfig,
) -> anyhow::Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("workload");
    let points = resample(work, config.sample_interval);
    if let Some(last) = points.last() {
        info!(points = points.len(), max_offset = last.offset, "plotting workload");
    }
    save(&chart::workload_chart(&points, config), config, stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(dir: &Path) -> RenderConfig {
        RenderConfig {
            out_dir: dir.to_path_buf(),
            ..RenderConfig::default()
        }
    }

    #[test]
    fn file_names_stay_in_directory() {
        assert_eq!(file_safe("17"), "17");
        assert_eq!(file_safe("a/../b"), "a_.._b");
        assert_eq!(file_safe(".."), "job..");
        assert_eq!(file_safe(""), "job");
    }

    #[test]
    fn writes_one_chart_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            RuntimeRow { label: "17".to_string(), runtimes: vec![Some(1)] },
            RuntimeRow { label: "18".to_string(), runtimes: vec![Some(2), None] },
        ];
        let paths = write_job_charts(&rows, &config(dir.path())).unwrap();

        assert_eq!(paths, vec![dir.path().join("17.svg"), dir.path().join("18.svg")]);
        let body = fs::read_to_string(&paths[1]).unwrap();
        assert!(body.contains("<svg"));
    }

    #[test]
    fn writes_grouped_chart_into_nested_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("charts");
        let rows = vec![RuntimeRow { label: "17".to_string(), runtimes: vec![Some(1)] }];
        let path = write_task_bars(&rows, &config(&out)).unwrap();
        assert_eq!(path, out.join("task_runtime.svg"));
        assert!(path.exists());
    }

    #[test]
    fn workload_chart_is_named_after_input_stem() {
        let dir = tempfile::tempdir().unwrap();
        let work = vec![LoadSample { offset: 0, count: 3 }, LoadSample { offset: 12, count: 1 }];
        let path = write_workload(&work, Path::new("/var/log/awe/event.log"), &config(dir.path())).unwrap();
        assert_eq!(path, dir.path().join("event.svg"));
        assert!(fs::read_to_string(path).unwrap().contains("time elapsed (sec)"));
    }
}

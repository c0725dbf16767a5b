use anyhow::{Context, bail};
use clap::{Args, Parser};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod log;
mod model;
mod perf;
mod render;

use config::RenderConfig;
use model::JobTable;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser, Debug)]
#[command(name = "workload-log-analyzer")]
#[command(
    about = "Job/task timing tables and charts from workload-execution event and perf logs",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    input: Input,

    /// Print the raw job table parsed from the log.
    #[arg(short = 'r', long)]
    raw_jobs: bool,

    /// Draw one bar chart of task runtimes for all jobs.
    #[arg(short = 'b', long)]
    task_bars: bool,

    /// Draw a bar chart of task runtimes for each job.
    #[arg(long)]
    each: bool,

    /// Print task runtimes as CSV: jobid, task_1_runtime, task_2_runtime, ...
    #[arg(short = 't', long)]
    task_csv: bool,

    /// Draw the active-work-units-over-time graph.
    #[arg(short = 'w', long, requires = "event_log")]
    workload: bool,

    /// Print the job, task and work-unit load series as CSV.
    #[arg(long, requires = "event_log")]
    load_table: bool,

    /// Directory for chart files.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Concurrent work-unit ceiling drawn on the workload graph.
    #[arg(long, default_value_t = config::DEFAULT_CLIENT_QUOTA)]
    client_quota: i64,

    /// Seconds between resampled points of the workload graph.
    #[arg(long, default_value_t = config::DEFAULT_SAMPLE_INTERVAL)]
    interval: i64,

    /// Stage labels, in enqueue order.
    #[arg(long, value_delimiter = ',', default_values_t = config::DEFAULT_STAGES.map(String::from))]
    stages: Vec<String>,

    /// Bar colors, cycled across jobs.
    #[arg(long, value_delimiter = ',', default_values_t = config::DEFAULT_COLORS.map(String::from))]
    colors: Vec<String>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Input {
    /// Path of the event log file.
    #[arg(short = 'e', long)]
    event_log: Option<PathBuf>,

    /// Path of the perf log file.
    #[arg(short = 'p', long)]
    perf_log: Option<PathBuf>,
}

impl Cli {
    fn render_config(&self) -> RenderConfig {
        RenderConfig {
            stages: self.stages.clone(),
            colors: self.colors.clone(),
            client_quota: self.client_quota,
            sample_interval: self.interval,
            out_dir: self.out_dir.clone(),
        }
    }

    fn wants_runtimes(&self) -> bool {
        self.task_bars || self.each || self.task_csv
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workload_log_analyzer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.render_config();
    config.validate()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Some(path) = &cli.input.event_log {
        // 1) Parse the whole log once; both analyses walk the same events.
        let events = log::read_event_log(path)?;

        // 2) Rebuild jobs and report on them.
        let jobs = model::reconstruct_jobs(&events)
            .with_context(|| format!("reconstruct jobs from {}", path.display()))?;
        report_jobs(&cli, &jobs, &config, &mut out)?;

        // 3) Load over time.
        if cli.workload || cli.load_table {
            let profile = model::sample_load(&events, config.stage_count())
                .with_context(|| format!("sample load from {}", path.display()))?;
            if cli.load_table {
                render::write_load_table(&profile, &mut out)?;
            }
            if cli.workload {
                render::write_workload(&profile.work, path, &config)?;
            }
        }
    } else if let Some(path) = &cli.input.perf_log {
        let jobs = perf::read_perf_log(path)?;
        jobs.write_overhead(&mut out)?;
        report_jobs(&cli, &jobs, &config, &mut out)?;
    }

    out.flush()?;
    Ok(())
}

fn report_jobs(
    cli: &Cli,
    table: &dyn JobTable,
    config: &RenderConfig,
    out: &mut dyn Write,
) -> Result<()> {
    if table.is_empty() {
        tracing::warn!("no completed jobs found in the {}", table.source());
    }

    if cli.wants_runtimes() {
        let Some(rows) = table.runtime_rows() else {
            bail!("task runtimes are not available from a {}", table.source());
        };
        if cli.task_bars {
            render::write_task_bars(&rows, config)?;
        }
        if cli.each {
            render::write_job_charts(&rows, config)?;
        }
        if cli.task_csv {
            render::write_runtime_csv(&rows, out)?;
        }
    }

    if cli.raw_jobs {
        table.write_raw(out)?;
    }

    Ok(())
}

//! perfci - performance regression testing for CI
//!
//! ## Commands
//!
//! - `measure`: Run the full pipeline (measure, sync, report, optional RCA)
//! - `select`: Print the merged test selection of a revision
//! - `trend`: Print the trend ledger of a result workspace

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use uuid::Uuid;

use perfci_core::{
    init_tracing, render_measurement_summary_md, render_rca_summary_md,
    render_selection_summary_md, write_summary_md, ArtifactCodec, FsRunHost, LogFormat,
    PipelineSpan, ProcessConfigBuilder, ProcessConfigFile, RcaStrategy, ResultsFolders, Revision,
    SelectionAggregator, TrendStore,
};
use perfci_pipeline::{PipelineOrchestrator, PipelinePaths, PipelineResult, ProcessExecutor};

#[derive(Parser)]
#[command(name = "perfci")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Performance regression testing for CI pipelines", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure the current revision against its predecessor
    ///
    /// The worker command follows `--`, e.g.
    /// `perfci measure --workspace ./app --results ./perf -- perf-worker --stdin`
    Measure {
        /// Project checkout the worker measures
        #[arg(long)]
        workspace: PathBuf,

        /// Local result workspace for this job
        #[arg(long)]
        results: PathBuf,

        /// Job name (overrides the config file)
        #[arg(long, env = "PERFCI_JOB")]
        job: Option<String>,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory receiving the attached run results (default: <results>/run)
        #[arg(long)]
        run_dir: Option<PathBuf>,

        #[command(flatten)]
        overrides: MeasureOverrides,

        /// Worker command
        #[arg(last = true, required = true)]
        worker: Vec<String>,
    },

    /// Print the test selection of a revision as JSON
    Select {
        /// Local result workspace
        #[arg(long)]
        results: PathBuf,

        /// Job name the selection files belong to
        #[arg(long)]
        job: String,

        /// Revision to report on
        #[arg(long, default_value = "HEAD")]
        revision: String,

        /// Print markdown instead of JSON
        #[arg(long)]
        markdown: bool,
    },

    /// Print the trend ledger
    Trend {
        /// Local result workspace
        #[arg(long)]
        results: PathBuf,
    },
}

/// Command-line overrides of configuration file values.
#[derive(clap::Args, Debug, Default, Clone)]
struct MeasureOverrides {
    /// Number of VM starts per revision
    #[arg(long)]
    vms: Option<u32>,

    /// Measured iterations per VM
    #[arg(long)]
    iterations: Option<u32>,

    /// Warmup iterations per VM
    #[arg(long)]
    warmup: Option<u32>,

    /// Repetitions per iteration
    #[arg(long)]
    repetitions: Option<u32>,

    /// Per-test timeout in minutes
    #[arg(long)]
    timeout_minutes: Option<u64>,

    /// Significance level of the change test (0 selects the default)
    #[arg(long)]
    significance_level: Option<f64>,

    /// Distance of the baseline revision (HEAD~N)
    #[arg(long)]
    revision_diff: Option<u32>,

    /// Semicolon-separated include patterns
    #[arg(long)]
    includes: Option<String>,

    /// Whitespace-separated KEY=VALUE pairs for the worker environment
    #[arg(long)]
    properties: Option<String>,

    /// Additional KEY=VALUE worker environment (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Measure both revisions in parallel (`--parallel false` to disable)
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    parallel: Option<bool>,

    /// Instrument the sources instead of the bytecode
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    source_instrumentation: Option<bool>,

    /// Sample instead of recording every call (needs source instrumentation)
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    sampling: Option<bool>,

    /// Search root causes of detected changes
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    rca: Option<bool>,

    /// Root-cause search strategy
    #[arg(long)]
    rca_strategy: Option<RcaStrategy>,

    /// Wall-clock budget of the measurement in seconds (0 = unbounded)
    #[arg(long)]
    measure_timeout_secs: Option<u64>,

    /// Stream the worker's log output
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    show_worker_logs: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(cli.json), level);

    match cli.command {
        Commands::Measure {
            workspace,
            results,
            job,
            config,
            run_dir,
            overrides,
            worker,
        } => {
            cmd_measure(
                &workspace,
                &results,
                job,
                config.as_deref(),
                run_dir,
                overrides,
                worker,
            )
            .await
        }
        Commands::Select {
            results,
            job,
            revision,
            markdown,
        } => cmd_select(&results, &job, &revision, markdown),
        Commands::Trend { results } => cmd_trend(&results),
    }
}

/// Merge the configuration file and the command-line overrides.
fn build_config(
    job: Option<String>,
    config_file: Option<&Path>,
    overrides: &MeasureOverrides,
) -> Result<ProcessConfigBuilder> {
    let file = match config_file {
        Some(path) => ProcessConfigFile::load(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?,
        None => ProcessConfigFile::default(),
    };
    let mut builder = file.into_builder(job);

    if let Some(v) = overrides.vms {
        builder = builder.vms(v);
    }
    if let Some(v) = overrides.iterations {
        builder = builder.iterations(v);
    }
    if let Some(v) = overrides.warmup {
        builder = builder.warmup(v);
    }
    if let Some(v) = overrides.repetitions {
        builder = builder.repetitions(v);
    }
    if let Some(v) = overrides.timeout_minutes {
        builder = builder.timeout_minutes(v);
    }
    if let Some(v) = overrides.significance_level {
        builder = builder.significance_level(v);
    }
    if let Some(v) = overrides.revision_diff {
        builder = builder.revision_diff(v);
    }
    if let Some(v) = &overrides.includes {
        builder = builder.includes(v.clone());
    }
    if let Some(v) = &overrides.properties {
        builder = builder.properties(v.clone());
    }
    if let Some(v) = overrides.measure_timeout_secs {
        builder = builder.measure_timeout_secs(v);
    }
    if let Some(v) = overrides.rca_strategy {
        builder = builder.rca_strategy(v);
    }
    if let Some(v) = overrides.parallel {
        builder = builder.execute_parallel(v);
    }
    if let Some(v) = overrides.source_instrumentation {
        builder = builder.use_source_instrumentation(v);
    }
    if let Some(v) = overrides.sampling {
        builder = builder.use_sampling(v);
    }
    if let Some(v) = overrides.rca {
        builder = builder.execute_rca(v);
    }
    if let Some(v) = overrides.show_worker_logs {
        builder = builder.display_logs(v, v, v);
    }

    let mut env = Vec::new();
    for pair in &overrides.env {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid --env value '{}', expected KEY=VALUE", pair))?;
        env.push((key.to_string(), value.to_string()));
    }
    Ok(builder.ci_env(env))
}

async fn cmd_measure(
    workspace: &Path,
    results: &Path,
    job: Option<String>,
    config_file: Option<&Path>,
    run_dir: Option<PathBuf>,
    overrides: MeasureOverrides,
    worker: Vec<String>,
) -> Result<()> {
    let config = build_config(job, config_file, &overrides)?
        .build()
        .context("Invalid configuration")?;

    let codec = ArtifactCodec::default();
    let run_dir = run_dir.unwrap_or_else(|| results.join("run"));
    let host = Arc::new(
        FsRunHost::new(&run_dir, codec)
            .with_context(|| format!("Failed to prepare run directory {}", run_dir.display()))?,
    );
    let executor =
        Arc::new(ProcessExecutor::new(worker).forward_output(config.display_logs()));

    println!("Measuring job '{}' in {:?}", config.job_name(), workspace);
    println!("Revisions: {}", config.revisions());
    println!();

    let orchestrator = PipelineOrchestrator::new(
        config,
        codec,
        executor,
        host,
        PipelinePaths {
            remote_workspace: workspace.to_path_buf(),
            local_results: results.to_path_buf(),
        },
    );
    let result = orchestrator
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("Pipeline failed to start")?;

    write_summaries(&run_dir, &result)?;
    print_result(&result);

    if result.success {
        Ok(())
    } else {
        anyhow::bail!(
            "Pipeline failed at stage {}",
            result
                .failed_stage
                .map(|s| s.name())
                .unwrap_or("unknown")
        )
    }
}

fn write_summaries(run_dir: &Path, result: &PipelineResult) -> Result<()> {
    if let Some(report) = &result.measurement {
        write_summary_md(
            &run_dir.join("measurement.md"),
            &render_measurement_summary_md(report),
        )?;
    }
    if let Some(report) = &result.selection {
        write_summary_md(
            &run_dir.join("rts.md"),
            &render_selection_summary_md(report),
        )?;
    }
    if let Some(report) = &result.rca {
        write_summary_md(&run_dir.join("rca.md"), &render_rca_summary_md(report))?;
    }
    Ok(())
}

fn print_result(result: &PipelineResult) {
    println!("Run ID: {}", result.run_id);
    println!(
        "Status: {}",
        if result.success {
            "✓ PASSED"
        } else if result.cancelled {
            "✗ CANCELLED"
        } else {
            "✗ FAILED"
        }
    );
    println!("Duration: {}ms", result.duration_ms);
    println!("Files synced: {}", result.files_synced);

    let states: Vec<&str> = result.visited.iter().map(|s| s.name()).collect();
    println!("States: {}", states.join(" -> "));
    if let Some(error) = &result.error {
        println!("Error: {}", error);
    }

    if let Some(report) = &result.measurement {
        println!();
        println!(
            "Measured tests: {}, significant changes: {}",
            report.histograms.len(),
            report.statistics.change_count()
        );
    }
    if let Some(report) = &result.rca {
        println!(
            "Root-cause trees: {}/{}",
            report.analysed_count(),
            report.results.len()
        );
    }
}

fn cmd_select(results: &Path, job: &str, revision: &str, markdown: bool) -> Result<()> {
    let run_id = Uuid::new_v4().to_string();
    let _span = PipelineSpan::enter(&run_id, job);
    let folders = ResultsFolders::new(results, job);
    let codec = ArtifactCodec::default();
    let report = SelectionAggregator::new(&folders, &codec)
        .aggregate(&Revision::new(revision))
        .context("Failed to read selection artifacts")?;

    if markdown {
        print!("{}", render_selection_summary_md(&report));
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn cmd_trend(results: &Path) -> Result<()> {
    let codec = ArtifactCodec::default();
    let folders = ResultsFolders::new(results, "");
    let record = TrendStore::new(folders.trend_file(), &codec)
        .load()
        .context("Failed to read trend ledger")?;
    info!(entries = record.len(), "Loaded trend ledger");

    if record.is_empty() {
        println!("No trend entries in {:?}", results);
        return Ok(());
    }
    println!(
        "{:>4}  {:<24}  {:<20}  {:>6}  {:>7}  {}",
        "#", "revisions", "recorded", "tests", "changes", "config"
    );
    for entry in record.entries() {
        println!(
            "{:>4}  {:<24}  {:<20}  {:>6}  {:>7}  {}",
            entry.sequence,
            entry.revisions.to_string(),
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.statistics.len(),
            entry.statistics.change_count(),
            &entry.config_digest[..entry.config_digest.len().min(12)]
        );
    }
    Ok(())
}

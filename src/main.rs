mod cli;

use increasevol::{
    config::{self, persist, Config},
    inputs,
    jobs::{JobContext, JobsQueue, QueueError},
    summary,
};
use iv_av::ToolRegistry;
use iv_core::events::EventPayload;
use iv_core::JobState;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, Overrides};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "increasevol=trace,iv_av=trace,iv_core=debug".to_string()
        } else {
            "increasevol=info,iv_av=info,iv_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            paths,
            overrides,
            json,
        } => {
            let rt = runtime()?;
            rt.block_on(run_jobs(&paths, &overrides, json, cli.config.as_deref()))
        }
        Commands::Probe { file } => {
            let rt = runtime()?;
            rt.block_on(probe_file(&file, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate { file } => {
            let path = file.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::InitConfig { path, force } => {
            persist::write_default_config(&path, force)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Commands::Version => {
            println!("increasevol {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

fn discover_tools(config: &Config) -> Result<ToolRegistry> {
    let tools = ToolRegistry::discover(&config.tools);
    let missing = tools.missing();
    if !missing.is_empty() {
        anyhow::bail!(
            "Required tools not found: {} (run `increasevol check-tools`)",
            missing.join(", ")
        );
    }
    Ok(tools)
}

async fn run_jobs(
    paths: &[PathBuf],
    overrides: &Overrides,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    overrides.apply(&mut config);
    config::validate_config(&config).context("Invalid settings")?;

    let tools = discover_tools(&config)?;

    let found = inputs::collect_inputs(paths, &config.output);
    for path in &found.missing {
        tracing::warn!("Skipping missing path: {}", path.display());
    }
    if found.files.is_empty() {
        anyhow::bail!("No video files to process");
    }

    let ctx = JobContext::from_config(&config, &tools)?;
    let queue = JobsQueue::new(ctx, config.jobs.effective_max_jobs());
    tracing::info!(
        files = found.files.len(),
        max_jobs = queue.snapshot().limit,
        "Starting conversions"
    );

    let reporter = tokio::spawn(report_events(queue.clone()));

    for file in found.files {
        match queue.submit(file) {
            Ok(_) => {}
            Err(QueueError::Duplicate(path)) => {
                tracing::warn!("Skipping duplicate: {}", path.display());
            }
            Err(e) => return Err(e.into()),
        }
    }

    tokio::select! {
        _ = queue.wait_idle() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            tracing::warn!("Interrupted, cancelling conversions...");
            queue.shutdown();
            queue.wait_idle().await;
        }
    }
    reporter.abort();

    let jobs = queue.jobs();
    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    } else {
        print!("{}", summary::render(&jobs, config.display.show_milliseconds));
    }

    let totals = summary::totals(&jobs);
    if totals.failed > 0 {
        anyhow::bail!("{} of {} conversions failed", totals.failed, jobs.len());
    }
    Ok(())
}

/// Log job lifecycle events until aborted.
async fn report_events(queue: JobsQueue) {
    let mut rx = queue.subscribe();
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                tracing::debug!("Reporter skipped {n} events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event.payload {
            EventPayload::JobStateChanged { job_id, to, .. } => {
                let path = queue
                    .job(job_id)
                    .map(|info| info.path.display().to_string())
                    .unwrap_or_else(|| job_id.short());
                match to {
                    JobState::Failed { reason } => tracing::error!("{path}: {reason}"),
                    other => tracing::info!("{path}: {other}"),
                }
            }
            EventPayload::JobProgress { job_id, progress } => {
                tracing::debug!(
                    job_id = %job_id,
                    percent = ?progress.percent(),
                    eta_secs = ?progress.eta_secs,
                    speed = ?progress.speed,
                    "Progress"
                );
            }
            _ => {}
        }
    }
}

async fn probe_file(file: &Path, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools);
    let duration = iv_av::probe::probe_duration(tools.ffprobe()?, file).await?;

    println!("File: {}", file.display());
    println!(
        "Duration: {} ({duration:.3}s)",
        summary::format_seconds(duration, config.display.show_milliseconds)
    );
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to convert files.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Max jobs: {}", config.jobs.effective_max_jobs());
    println!(
        "  Audio: {} quality {} volume x{}",
        config.audio.encoder, config.audio.quality, config.audio.volume_increase
    );
    println!("  Remove subtitles: {}", config.audio.remove_subtitles);
    println!("  Keep original: {}", config.output.keep_original);
    println!(
        "  Video extensions: {}",
        config.output.video_extensions.join(", ")
    );
    for warning in config.validate() {
        println!("  warning: {warning}");
    }

    Ok(())
}

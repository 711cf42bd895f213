//! imagewarm - image preheating
//!
//! CLI entry point for preheating manifests and exercising the preheater.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::ScopedJoinHandle;
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use tokio::sync::broadcast;
use tracing::{info, warn};

use imagewarm::cli::{Cli, Command, OutputFormat, get_log_path};
use imagewarm::config::Config;
use imagewarm::events::{EventBus, ImageEvent, spawn_event_logger};
use imagewarm::executor::{PipelineExecutor, SimulatedLoader};
use imagewarm::manifest::load_manifest;
use imagewarm::preheater::Preheater;
use imagewarm::queue::TaskQueue;
use imagewarm::request::ImageRequest;

type SimulatedPreheater = Preheater<PipelineExecutor<SimulatedLoader>>;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("imagewarm")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("imagewarm.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(
        "imagewarm loaded config: preheat-concurrency={}, executor-concurrency={}",
        config.preheater.max_concurrent, config.executor.max_concurrent
    );

    match cli.command {
        Some(Command::Preheat {
            manifest,
            wait_ms,
            stop_after_ms,
            format,
        }) => cmd_preheat(&config, &manifest, wait_ms, stop_after_ms, format).await,
        Some(Command::Stress { threads, rounds, keys }) => cmd_stress(&config, threads, rounds, keys).await,
        Some(Command::Config) => cmd_config(&config),
        Some(Command::Logs { lines }) => cmd_logs(lines),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Wire a preheater to a simulated pipeline on the current runtime
fn build_preheater(config: &Config, events: Arc<EventBus>) -> Result<SimulatedPreheater> {
    let queue = TaskQueue::with_tokio(config.executor.clone())?;
    let executor = PipelineExecutor::new(SimulatedLoader::new(config.loader.clone()), queue, events.clone());
    Ok(Preheater::with_tokio(
        Arc::new(executor),
        events,
        config.preheater.clone(),
    )?)
}

/// Tally of events observed during a preheat run
#[derive(Debug, Default, serde::Serialize)]
struct RunSummary {
    requests: usize,
    distinct_keys: usize,
    tasks_created: u64,
    completed: usize,
    failed: usize,
    cancelled: usize,
    bytes: usize,
    still_active: usize,
}

impl RunSummary {
    fn record(&mut self, event: &ImageEvent) {
        match event {
            ImageEvent::TaskCompleted { bytes, .. } => {
                self.completed += 1;
                self.bytes += bytes;
            }
            ImageEvent::TaskFailed { .. } => self.failed += 1,
            ImageEvent::TaskCancelled { .. } => self.cancelled += 1,
            _ => {}
        }
    }
}

fn print_event(event: &ImageEvent) {
    let label = match event {
        ImageEvent::PreheatStarted { .. } => "preheat+".cyan(),
        ImageEvent::PreheatStopped { .. } => "preheat-".cyan(),
        ImageEvent::TaskStarted { .. } => "started".blue(),
        ImageEvent::TaskCompleted { .. } => "done".green(),
        ImageEvent::TaskFailed { .. } => "failed".red(),
        ImageEvent::TaskCancelled { .. } => "cancelled".yellow(),
    };
    let task = event.task_id().map(|id| format!("#{} ", id)).unwrap_or_default();
    match event {
        ImageEvent::TaskFailed { message, .. } => println!("{:>10} {}{} ({})", label, task, event.key(), message),
        _ => println!("{:>10} {}{}", label, task, event.key()),
    }
}

/// Preheat a manifest and report what happened
async fn cmd_preheat(
    config: &Config,
    manifest: &Path,
    wait_ms: u64,
    stop_after_ms: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let requests = load_manifest(manifest)?;

    let events = Arc::new(EventBus::new(config.events.channel_capacity));
    let (run_id, logger) = spawn_event_logger(events.clone(), config.events.runs_dir())?;
    let mut rx = events.subscribe();

    let preheater = build_preheater(config, events.clone())?;
    preheater.start_preheating(&requests);

    let mut summary = RunSummary {
        requests: requests.len(),
        distinct_keys: preheater.active_count(),
        ..Default::default()
    };
    let mut log = Vec::new();

    let started = Instant::now();
    let deadline = tokio::time::sleep(Duration::from_millis(wait_ms));
    tokio::pin!(deadline);
    let mut stop_at = stop_after_ms.map(|ms| started + Duration::from_millis(ms));

    loop {
        let pending_stop = stop_at;
        let stop_timer = async move {
            match pending_stop {
                Some(at) => tokio::time::sleep_until(at.into()).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = &mut deadline => break,
            _ = stop_timer => {
                info!("Stopping all preheating after {:?}", started.elapsed());
                preheater.stop_all();
                stop_at = None;
            }
            received = rx.recv() => match received {
                Ok(event) => {
                    summary.record(&event);
                    if format == OutputFormat::Text {
                        print_event(&event);
                    }
                    log.push(event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("Report lagged, skipped {} events", n),
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    summary.tasks_created = preheater.executor().created_task_count();
    summary.still_active = preheater.active_count();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "run_id": run_id,
                "summary": summary,
                "events": log,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!();
            println!("Preheat summary");
            println!("---------------");
            println!("Requests:      {}", summary.requests);
            println!("Distinct keys: {}", summary.distinct_keys);
            println!("Tasks created: {}", summary.tasks_created);
            println!("Completed:     {}", summary.completed.to_string().green());
            println!("Failed:        {}", summary.failed.to_string().red());
            println!("Cancelled:     {}", summary.cancelled.to_string().yellow());
            println!("Bytes loaded:  {}", summary.bytes);
            println!("Still active:  {}", summary.still_active);
            println!("Event log:     {}", config.events.runs_dir().join(run_id.to_string()).display());
        }
    }

    drop(preheater);
    drop(rx);
    drop(events);
    if tokio::time::timeout(Duration::from_millis(500), logger).await.is_err() {
        warn!("Event logger did not finish; in-flight loads still hold the bus");
    }
    Ok(())
}

/// Run paired start/stop batches from many threads and check the registry drains
async fn cmd_stress(config: &Config, threads: usize, rounds: usize, keys: usize) -> Result<()> {
    if keys == 0 {
        return Err(eyre::eyre!("--keys must be at least 1"));
    }

    let events = Arc::new(EventBus::new(config.events.channel_capacity));
    let preheater = Arc::new(build_preheater(config, events)?);
    let requests: Vec<ImageRequest> = (0..keys)
        .map(|i| ImageRequest::new(format!("https://stress.imagewarm.test/{}.jpeg", i)))
        .collect();

    println!(
        "Stressing preheater: {} threads x {} rounds over {} keys",
        threads, rounds, keys
    );
    let started = Instant::now();

    let worker = Arc::clone(&preheater);
    let report = tokio::task::spawn_blocking(move || run_stress(&worker, &requests, threads, rounds)).await?;

    let elapsed = started.elapsed();
    let active = preheater.active_count();
    let queue = preheater.queue().state();

    let mut table = BTreeMap::new();
    table.insert("batches", (threads * rounds * 2).to_string());
    table.insert("elapsed", format!("{:?}", elapsed));
    table.insert("peak active keys", report.peak_active.to_string());
    table.insert("preheat loads queued", queue.stats.total_enqueued.to_string());
    table.insert("preheat loads cancelled", queue.stats.total_cancelled.to_string());
    table.insert("executor tasks", preheater.executor().created_task_count().to_string());
    for (name, value) in &table {
        println!("  {:<24} {}", name, value);
    }

    if report.panicked != 0 {
        println!("{} {} of {} workers panicked", "FAILED".red().bold(), report.panicked, threads);
        return Err(eyre::eyre!("{} stress workers panicked", report.panicked));
    }
    if active != 0 {
        println!("{} {} keys still registered", "FAILED".red().bold(), active);
        return Err(eyre::eyre!("Registry did not drain: {} keys left", active));
    }
    println!("{} registry drained", "OK".green().bold());
    Ok(())
}

/// Outcome of one stress run
#[derive(Debug, Default, PartialEq, Eq)]
struct StressReport {
    peak_active: usize,
    panicked: usize,
}

/// Join every worker; a panicked worker is counted, not propagated
fn join_workers<T>(workers: Vec<ScopedJoinHandle<'_, T>>) -> (Vec<T>, usize) {
    let mut results = Vec::with_capacity(workers.len());
    let mut panicked = 0;
    for worker in workers {
        match worker.join() {
            Ok(result) => results.push(result),
            Err(_) => panicked += 1,
        }
    }
    (results, panicked)
}

fn run_stress(preheater: &SimulatedPreheater, requests: &[ImageRequest], threads: usize, rounds: usize) -> StressReport {
    std::thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(|| {
                    let mut rng = rand::rng();
                    let mut indices: Vec<usize> = (0..requests.len()).collect();
                    let mut peak = 0;
                    for _ in 0..rounds {
                        indices.shuffle(&mut rng);
                        let take = rng.random_range(1..=indices.len());
                        // Distinct keys per batch, so each stop undoes exactly its start
                        let batch: Vec<&ImageRequest> = indices[..take].iter().map(|&i| &requests[i]).collect();
                        debug_assert_eq!(
                            batch.iter().map(|r| r.key()).collect::<HashSet<_>>().len(),
                            batch.len()
                        );

                        preheater.start_preheating(batch.iter().copied());
                        peak = peak.max(preheater.active_count());
                        if rng.random_bool(0.5) {
                            std::thread::yield_now();
                        }
                        preheater.stop_preheating(batch.iter().copied());
                    }
                    peak
                })
            })
            .collect();

        let (peaks, panicked) = join_workers(workers);
        if panicked != 0 {
            warn!(panicked, "Stress workers panicked");
        }
        StressReport {
            peak_active: peaks.into_iter().max().unwrap_or(0),
            panicked,
        }
    })
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

/// Show logs
fn cmd_logs(lines: usize) -> Result<()> {
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let reader = BufReader::new(file);
    let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{}", line);
    }

    Ok(())
}

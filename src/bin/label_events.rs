//! Batch CLI: voxelize and label simulated events.
//!
//! Reads one configuration document and a JSON array of events, runs the
//! full per-event pipeline (image-meta selection, then labeling), and writes
//! the labeled events back out as JSON:
//!
//! ```text
//! label_events --config cfg.json --events events.json [--output out.json]
//! ```
//!
//! Events are independent; a malformed event aborts the run with a precise
//! error naming the event index.

use std::{env, fs, path::Path, process::ExitCode};

use anyhow::Context;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use larlabel::config::parse_log_level;
use larlabel::{Driver, DriverConfig, EventInput, EventOutput, ImageMeta3D};

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        if arg == key {
            return it.next().cloned();
        }
    }
    None
}

/// One fully processed event.
#[derive(Serialize)]
struct LabeledEvent {
    meta: ImageMeta3D,
    output: EventOutput,
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let config_path = parse_flag(&args, "--config")
        .context("usage: label_events --config <file> --events <file> [--output <file>]")?;
    let events_path = parse_flag(&args, "--events")
        .context("usage: label_events --config <file> --events <file> [--output <file>]")?;
    let output_path = parse_flag(&args, "--output");

    let cfg_text = fs::read_to_string(Path::new(&config_path))
        .with_context(|| format!("reading config {config_path}"))?;
    let cfg: DriverConfig =
        serde_json::from_str(&cfg_text).with_context(|| format!("parsing config {config_path}"))?;

    let level = match cfg.log_level.as_deref() {
        Some(threshold) => parse_log_level(threshold)?,
        None => tracing::Level::WARN,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::builder().with_default_directive(level.into()).from_env_lossy())
        .with_writer(std::io::stderr)
        .init();

    let mut driver = Driver::new();
    driver.configure(&cfg)?;

    let events_text = fs::read_to_string(Path::new(&events_path))
        .with_context(|| format!("reading events {events_path}"))?;
    let events: Vec<EventInput> = serde_json::from_str(&events_text)
        .with_context(|| format!("parsing events {events_path}"))?;
    info!("processing {} events", events.len());

    let mut labeled: Vec<LabeledEvent> = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        let (meta, output) = driver
            .generate(event)
            .with_context(|| format!("processing event {index}"))?;
        info!(
            "event {index}: {} particles in, {} out, {} labeled voxels",
            event.len(),
            output.particles.len(),
            output.semantic_labels.len()
        );
        labeled.push(LabeledEvent { meta, output });
    }

    match output_path {
        Some(path) => {
            let bytes = serde_json::to_vec_pretty(&labeled)?;
            fs::write(Path::new(&path), bytes).with_context(|| format!("writing {path}"))?;
            info!("wrote {} labeled events to {path}", labeled.len());
        }
        None => println!("{}", serde_json::to_string(&labeled)?),
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

//! blanket-qunit: run QUnit pages in a headless browser and gate on BlanketJS coverage.

mod app;
mod config;
mod models;
mod runner;
mod ui;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use app::{RunContext, bus::EventBus};
use config::{ColorMode, Config};
use ui::Console;

/// Capacity of the event bus; slow subscribers past this start losing events.
const BUS_CAPACITY: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "blanket-qunit")]
#[command(about = "Run QUnit tests with BlanketJS coverage in a headless browser")]
struct Args {
    /// Glob patterns of HTML test pages, added after the configured files
    files: Vec<String>,

    /// Path to a config file (default: ./blanket-qunit.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print every test name and failures as they happen
    #[arg(short, long)]
    verbose: bool,

    /// Minimum coverage percent a file must exceed
    #[arg(long)]
    threshold: Option<u32>,

    /// Milliseconds of page silence before giving up
    #[arg(long)]
    timeout: Option<u64>,

    /// Extra non-file URL to test (repeatable), run before the files
    #[arg(long = "url")]
    urls: Vec<String>,

    /// Script to inject into each page instead of the built-in bridge
    #[arg(long)]
    inject: Option<PathBuf>,

    /// Headless browser command line
    #[arg(long)]
    browser: Option<String>,

    #[arg(long, value_enum)]
    color: Option<ColorMode>,

    /// Write every bridge event to this file as NDJSON
    #[arg(long)]
    event_log: Option<PathBuf>,
}

impl Args {
    /// Layer the command line over the loaded config.
    fn apply(&self, config: &mut Config) {
        config.files.extend(self.files.iter().cloned());
        config.urls.extend(self.urls.iter().cloned());
        config.verbose |= self.verbose;
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(ref inject) = self.inject {
            config.inject = Some(inject.clone());
        }
        if let Some(ref browser) = self.browser {
            config.browser = browser.clone();
        }
        if let Some(color) = self.color {
            config.color = color;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();
    let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut config = Config::load(&workspace, args.config.as_deref())?;
    args.apply(&mut config);
    info!(
        threshold = config.threshold,
        timeout_ms = config.timeout,
        browser = %config.browser,
        verbose = config.verbose,
        "Loaded configuration"
    );

    let urls = config.url_list(&workspace)?;
    let bridge = runner::detect(&config)?;

    let console = Console::new(
        Box::new(std::io::stdout()),
        ui::styler_for(config.color.enabled()),
        config.verbose,
    );
    let bus = EventBus::new(BUS_CAPACITY);
    let event_log = match args.event_log {
        Some(ref path) => Some(app::bus::spawn_event_log(bus.subscribe(), path)?),
        None => None,
    };

    let mut ctx = RunContext::new(console, bus, config.threshold);
    let completion = app::run_series(&mut ctx, bridge, &urls).await;
    info!(?completion, status = ?ctx.status, "Run complete");

    // Closing the bus lets the event log drain and finish.
    drop(ctx);
    if let Some(handle) = event_log {
        handle.await.ok();
    }

    Ok(if completion.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

//! `rendervisor` demo shell.
//!
//! Starts a render service with one built-in template (`solid`, a flat-color
//! PPM image), renders a sample, logs pool statistics and then waits for a
//! termination signal before draining the pool.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use rendervisor::{FieldKind, ObjectSchema, RenderService, ServiceConfig, wait_for_shutdown_signal};

const MAX_SIDE: u64 = 4096;

#[derive(Parser, Debug)]
#[command(
    name = "rendervisor",
    version,
    about = "Supervised render worker pool",
    long_about = None
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "RENDERVISOR_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Number of execution units
    #[arg(long, env = "RENDERVISOR_WORKERS")]
    workers: Option<usize>,

    /// Pending tasks allowed while every unit is busy
    #[arg(long, env = "RENDERVISOR_QUEUE_SIZE")]
    queue_size: Option<usize>,

    /// Per-task deadline, e.g. `250ms` or `30s`
    #[arg(long, env = "RENDERVISOR_TASK_TIMEOUT", value_parser = parse_duration)]
    task_timeout: Option<Duration>,

    /// Log per-task lifecycle at INFO
    #[arg(long, env = "RENDERVISOR_VERBOSE")]
    verbose: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| e.to_string())
}

fn init_tracing(format: LogFormat, verbose: bool) -> anyhow::Result<()> {
    let default = if verbose { "info" } else { "warn,rendervisor=info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    let mut cfg = match &cli.config_file {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(n) = cli.workers {
        cfg.pool.worker_count = n;
    }
    if let Some(n) = cli.queue_size {
        cfg.pool.max_queue_size = n;
    }
    if let Some(t) = cli.task_timeout {
        cfg.pool.task_timeout = t;
    }
    cfg.pool.verbose |= cli.verbose;
    cfg.pool.validate()?;
    Ok(cfg)
}

/// Flat-color binary PPM (`P6`).
fn render_solid(input: &Value) -> Result<Vec<u8>, String> {
    let width = input["width"].as_u64().unwrap_or_default();
    let height = input["height"].as_u64().unwrap_or_default();
    if width == 0 || height == 0 || width > MAX_SIDE || height > MAX_SIDE {
        return Err(format!("size {width}x{height} outside 1..={MAX_SIDE}"));
    }
    let rgb = parse_color(input["color"].as_str().unwrap_or("#000000"))?;

    let header = format!("P6\n{width} {height}\n255\n");
    let pixels = (width * height) as usize;
    let mut out = Vec::with_capacity(header.len() + pixels * 3);
    out.extend_from_slice(header.as_bytes());
    for _ in 0..pixels {
        out.extend_from_slice(&rgb);
    }
    Ok(out)
}

fn parse_color(raw: &str) -> Result<[u8; 3], String> {
    let hex = raw.strip_prefix('#').unwrap_or(raw);
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("color `{raw}` is not #rrggbb"));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| format!("color `{raw}` is not #rrggbb"))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose)?;
    let cfg = load_config(&cli)?;

    let service = RenderService::new(cfg);
    service.register_template(
        "solid",
        ObjectSchema::new()
            .required("width", FieldKind::Integer)
            .required("height", FieldKind::Integer)
            .optional("color", FieldKind::String),
        render_solid,
    );
    service.initialize().await?;
    info!(templates = ?service.templates(), "render service ready");

    match service
        .render("solid", json!({"width": 4, "height": 2, "color": "#ff8800"}))
        .await
    {
        Ok(bytes) => info!(len = bytes.len(), "sample render done"),
        Err(e) => warn!(error = %e, class = ?e.class(), "sample render failed"),
    }
    let stats = serde_json::to_string(&service.stats())?;
    info!(%stats, "pool stats");

    let signal = wait_for_shutdown_signal()
        .await
        .context("failed to install signal handlers")?;
    info!(%signal, grace = ?service.config().grace, "shutting down");

    service.shutdown_with_grace().await?;
    Ok(())
}

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use leaky_limiter::config::{LimiterConfig, LoggingConfig};
use leaky_limiter::replay::{parse_events, Replay, ReplayOptions};

/// Replay a trace of `<key> <timestamp>` events through a leaky-bucket limiter.
#[derive(Debug, Parser)]
#[command(name = "leaky-limiter", version, about)]
struct Args {
    /// Event trace to replay (stdin when omitted)
    events: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bucket capacity
    #[arg(long)]
    capacity: Option<f64>,

    /// Override the configured leak rate
    #[arg(long)]
    leak_rate: Option<f64>,

    /// Run a cleanup pass whenever the trace clock advances by this much
    /// (defaults to the configured cleanup interval)
    #[arg(long)]
    cleanup_every: Option<f64>,

    /// Override the configured idle window for cleanup passes
    #[arg(long)]
    max_idle: Option<f64>,

    /// Print one JSON object per decision
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LimiterConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => LimiterConfig::default(),
    };

    init_tracing(&config.logging);

    if let Some(capacity) = args.capacity {
        config.limiter.capacity = capacity;
    }
    if let Some(leak_rate) = args.leak_rate {
        config.limiter.leak_rate = leak_rate;
    }
    if let Some(max_idle) = args.max_idle {
        config.cleanup.max_idle_time = max_idle;
    }

    let limiter = config.build_limiter().context("invalid limiter parameters")?;
    info!(
        capacity = limiter.capacity(),
        leak_rate = limiter.leak_rate(),
        "Limiter initialized"
    );

    let events = match &args.events {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            parse_events(BufReader::new(file))?
        }
        None => parse_events(io::stdin().lock())?,
    };
    info!(events = events.len(), "Trace loaded");

    let mut options = ReplayOptions::from(&config.cleanup);
    if let Some(every) = args.cleanup_every {
        anyhow::ensure!(
            every.is_finite() && every > 0.0,
            "--cleanup-every must be positive"
        );
        options.cleanup_every = Some(every);
    }
    let mut replay = Replay::new(limiter, options);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for event in &events {
        let decision = replay.apply(event)?;
        if args.json {
            serde_json::to_writer(&mut out, &decision)?;
            writeln!(out)?;
        } else {
            writeln!(
                out,
                "{}\t{}\t{}\t{}",
                decision.timestamp,
                decision.key,
                if decision.admitted { "ADMIT" } else { "REJECT" },
                decision.level
            )?;
        }
    }
    out.flush()?;

    let summary = replay.summary();
    info!(
        admitted = summary.admitted,
        rejected = summary.rejected,
        evicted = summary.evicted,
        live_buckets = summary.live_buckets,
        "Replay finished"
    );

    Ok(())
}

/// Initialize tracing to stderr; `RUST_LOG` takes precedence over the config.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

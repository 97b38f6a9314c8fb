//! SHARPLINE runner.
//!
//! Entry point. Loads configuration, initialises structured logging, reads
//! the week's slate, builds the betting card (a new version if one is
//! already published for the week) and writes it to the card directory.
//!
//! Usage: `sharpline <slate.json>`; config path from `SHARPLINE_CONFIG`
//! (default `config.toml`).

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use tracing::{info, warn};

use sharpline::config::AppConfig;
use sharpline::storage;
use sharpline::strategy::{DecisionRecord, WeeklyPipeline};

const DEFAULT_CONFIG: &str = "config.toml";

fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path = std::env::var("SHARPLINE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let cfg = if Path::new(&config_path).exists() {
        AppConfig::load(&config_path)?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        AppConfig::default()
    };

    let slate_path = std::env::args()
        .nth(1)
        .context("Usage: sharpline <slate.json>")?;

    let card_dir = cfg.output.card_dir.clone();
    let pipeline = WeeklyPipeline::new(cfg)?;
    let slate = storage::load_slate(&slate_path)?;
    let now = Utc::now();

    let (card, decisions) = match storage::latest_card(&card_dir, slate.season, slate.week)? {
        Some(previous) => {
            info!(previous = %previous.id(), version = previous.version(), "Superseding published card");
            pipeline.rerun(&previous, &slate, now)
        }
        None => pipeline.run(&slate, now),
    };

    let (mut sized, mut rejected, mut skipped) = (0, 0, 0);
    for d in &decisions {
        match d {
            DecisionRecord::Sized { .. } => sized += 1,
            DecisionRecord::Rejected { .. } => rejected += 1,
            DecisionRecord::Skipped { .. } => skipped += 1,
        }
    }

    let path = storage::save_card(&card, &card_dir)?;
    let summary = card.summary();
    info!(
        path = %path.display(),
        plays = summary.total_plays,
        allocation = %summary.capital_allocation_percent,
        units = %summary.total_units,
        ev = format!("{:.3}%", summary.expected_portfolio_return),
        sized,
        rejected,
        skipped,
        conflicts = card.conflicts().len(),
        "Run complete"
    );

    println!("{card}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sharpline=info"));

    let json_logging = std::env::var("SHARPLINE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}

//! Persistence layer.
//!
//! JSON files in and out of the engine: the weekly slate, published cards
//! and CLV records. The engine itself never touches the filesystem.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::backtest::ClvRecord;
use crate::strategy::card::BettingCard;
use crate::types::WeeklySlate;

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} from {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {what} from {}", path.display()))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn write_json<T: Serialize>(value: &T, path: &Path, what: &str) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(value).with_context(|| format!("Failed to serialise {what}"))?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {what} to {}", path.display()))
}

// ---------------------------------------------------------------------------
// Slate
// ---------------------------------------------------------------------------

/// Load a weekly slate from a JSON file.
pub fn load_slate(path: impl AsRef<Path>) -> Result<WeeklySlate> {
    let path = path.as_ref();
    let slate: WeeklySlate = read_json(path, "slate")?;
    info!(
        path = %path.display(),
        season = slate.season,
        week = slate.week,
        games = slate.games.len(),
        lines = slate.lines.len(),
        "Slate loaded"
    );
    Ok(slate)
}

// ---------------------------------------------------------------------------
// Cards
// ---------------------------------------------------------------------------

/// File name of a card version, e.g. `card_2026_w07_v1.json`.
pub fn card_file_name(season: u32, week: u32, version: u32) -> String {
    format!("card_{season}_w{week:02}_v{version}.json")
}

/// Write a card into `dir`. Existing versions are never overwritten.
pub fn save_card(card: &BettingCard, dir: impl AsRef<Path>) -> Result<PathBuf> {
    let path = dir
        .as_ref()
        .join(card_file_name(card.season(), card.week(), card.version()));
    ensure_parent(&path)?;
    // create_new fails atomically if the version is already on disk.
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => {
                anyhow::anyhow!("Card {} already published at {}", card.id(), path.display())
            }
            _ => anyhow::Error::new(e).context(format!("Failed to create card file {}", path.display())),
        })?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, card)
        .with_context(|| format!("Failed to write card to {}", path.display()))?;
    std::io::Write::flush(&mut writer).with_context(|| format!("Failed to flush {}", path.display()))?;
    info!(path = %path.display(), card_id = %card.id(), version = card.version(), "Card saved");
    Ok(path)
}

pub fn load_card(path: impl AsRef<Path>) -> Result<BettingCard> {
    read_json(path.as_ref(), "card")
}

/// Highest published version of a week's card in `dir`, if any.
pub fn latest_card(dir: impl AsRef<Path>, season: u32, week: u32) -> Result<Option<BettingCard>> {
    let dir = dir.as_ref();
    let mut version = 0;
    while dir.join(card_file_name(season, week, version + 1)).exists() {
        version += 1;
    }
    if version == 0 {
        debug!(dir = %dir.display(), season, week, "No published card");
        return Ok(None);
    }
    load_card(dir.join(card_file_name(season, week, version))).map(Some)
}

// ---------------------------------------------------------------------------
// CLV records
// ---------------------------------------------------------------------------

pub fn save_clv_records(records: &[ClvRecord], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    write_json(&records, path, "CLV records")?;
    debug!(path = %path.display(), records = records.len(), "CLV records saved");
    Ok(())
}

/// Load CLV records. A missing file means nothing has been tracked yet.
pub fn load_clv_records(path: impl AsRef<Path>) -> Result<Vec<ClvRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "No CLV records found, starting fresh");
        return Ok(Vec::new());
    }
    read_json(path, "CLV records")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

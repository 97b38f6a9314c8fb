//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section and field has a documented default, so a partial file (or none
//! of a section) is valid. Policy constants such as the Kelly damping
//! fraction and the category thresholds live here rather than in engine
//! code so they can be tuned without touching it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::types::EngineError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bankroll: BankrollConfig,
    pub model: ModelConfig,
    pub confidence: ConfidenceConfig,
    pub categories: CategoryThresholds,
    pub output: OutputConfig,
}

/// Bankroll and staking discipline. Passed by value into every sizing call.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BankrollConfig {
    /// Bankroll size in currency units.
    pub bankroll_units: f64,
    /// Fraction of full Kelly actually staked.
    pub kelly_fraction: f64,
    /// Hard cap per play, percent of bankroll.
    pub max_stake_percent: f64,
    pub min_edge_points: f64,
    /// Hard cap on the whole card, percent of bankroll.
    pub portfolio_cap_percent: f64,
    /// Units are rounded to a multiple of this (0.5 = half units).
    pub unit_granularity: f64,
    /// Percent of bankroll one unit represents.
    pub unit_percent: f64,
    /// Plays scored below this confidence are not sized.
    pub confidence_floor: f64,
}

impl Default for BankrollConfig {
    fn default() -> Self {
        Self {
            bankroll_units: 10_000.0,
            kelly_fraction: 0.5,        // Half-Kelly
            max_stake_percent: 3.0,
            min_edge_points: 1.5,
            portfolio_cap_percent: 7.5,
            unit_granularity: 0.5,
            unit_percent: 1.0,
            confidence_floor: 50.0,
        }
    }
}

/// How a line is chosen when several books quote the same market.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinePolicy {
    #[default]
    Median,
    BestPrice,
}

/// Rating-to-line mapping and win-probability calibration.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Rating points worth one point on the line.
    pub rating_points_per_line_point: f64,
    pub home_field_points: f64,
    /// Logistic scale turning a predicted margin into a win probability.
    pub margin_scale: f64,
    /// Cover probability gained per point of edge at full confidence.
    pub prob_per_point: f64,
    pub max_win_probability: f64,
    /// Ratings older than this are treated as missing.
    pub rating_max_age_hours: i64,
    /// Ratings older than this are used but flagged stale.
    pub rating_stale_hours: i64,
    pub line_stale_hours: i64,
    pub line_policy: LinePolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            rating_points_per_line_point: 1.0,
            home_field_points: 2.5,
            margin_scale: 6.0,
            prob_per_point: 0.015,
            max_win_probability: 0.80,
            rating_max_age_hours: 336,
            rating_stale_hours: 168,
            line_stale_hours: 24,
            line_policy: LinePolicy::Median,
        }
    }
}

/// Weights for the confidence score.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub base_floor: f64,
    pub base_span: f64,
    /// Edge (points) at which ~63% of the span is reached.
    pub saturation_points: f64,
    pub injury_weight: f64,
    pub injury_cap: f64,
    pub rlm_boost: f64,
    pub steam_boost: f64,
    pub wind_threshold_mph: f64,
    pub wind_weight: f64,
    pub cold_threshold_f: f64,
    pub cold_weight: f64,
    pub precipitation_boost: f64,
    pub weather_cap: f64,
    pub missing_signal_penalty: f64,
    pub stale_penalty: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            base_floor: 50.0,
            base_span: 45.0,
            saturation_points: 4.0,
            injury_weight: 2.0,
            injury_cap: 8.0,
            rlm_boost: 5.0,
            steam_boost: 5.0,
            wind_threshold_mph: 15.0,
            wind_weight: 0.5,
            cold_threshold_f: 32.0,
            cold_weight: 0.2,
            precipitation_boost: 2.0,
            weather_cap: 10.0,
            missing_signal_penalty: 2.0,
            stale_penalty: 10.0,
        }
    }
}

/// Lower bounds (inclusive, in edge points) of each play category.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CategoryThresholds {
    pub max: f64,
    pub strong: f64,
    pub moderate: f64,
    pub lean: f64,
}

impl Default for CategoryThresholds {
    fn default() -> Self {
        Self {
            max: 7.0,
            strong: 4.0,
            moderate: 2.0,
            lean: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the runner writes published cards to.
    pub card_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            card_dir: "cards".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reject any configuration under which sizing would be meaningless.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.bankroll.validate()?;
        self.model.validate()?;
        self.categories.validate()?;
        if self.confidence.saturation_points <= 0.0 {
            return Err(invalid("confidence.saturation_points must be > 0"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::InvalidConfig(msg.into())
}

fn ensure_finite(name: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be finite, got {value}")))
    }
}

impl BankrollConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, value) in [
            ("bankroll_units", self.bankroll_units),
            ("kelly_fraction", self.kelly_fraction),
            ("max_stake_percent", self.max_stake_percent),
            ("min_edge_points", self.min_edge_points),
            ("portfolio_cap_percent", self.portfolio_cap_percent),
            ("unit_granularity", self.unit_granularity),
            ("unit_percent", self.unit_percent),
            ("confidence_floor", self.confidence_floor),
        ] {
            ensure_finite(name, value)?;
        }

        if self.bankroll_units <= 0.0 {
            return Err(invalid(format!(
                "bankroll_units must be > 0, got {}",
                self.bankroll_units
            )));
        }
        if self.kelly_fraction <= 0.0 || self.kelly_fraction > 1.0 {
            return Err(invalid(format!(
                "kelly_fraction must be in (0, 1], got {}",
                self.kelly_fraction
            )));
        }
        if self.max_stake_percent <= 0.0 || self.max_stake_percent > 100.0 {
            return Err(invalid(format!(
                "max_stake_percent must be in (0, 100], got {}",
                self.max_stake_percent
            )));
        }
        if self.portfolio_cap_percent <= 0.0 || self.portfolio_cap_percent > 100.0 {
            return Err(invalid(format!(
                "portfolio_cap_percent must be in (0, 100], got {}",
                self.portfolio_cap_percent
            )));
        }
        if self.min_edge_points < 0.0 {
            return Err(invalid("min_edge_points must be >= 0"));
        }
        if self.unit_granularity <= 0.0 || self.unit_percent <= 0.0 {
            return Err(invalid("unit_granularity and unit_percent must be > 0"));
        }
        if !(0.0..=100.0).contains(&self.confidence_floor) {
            return Err(invalid("confidence_floor must be in [0, 100]"));
        }
        Ok(())
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, value) in [
            ("rating_points_per_line_point", self.rating_points_per_line_point),
            ("home_field_points", self.home_field_points),
            ("margin_scale", self.margin_scale),
            ("prob_per_point", self.prob_per_point),
            ("max_win_probability", self.max_win_probability),
        ] {
            ensure_finite(name, value)?;
        }

        if self.rating_points_per_line_point <= 0.0 {
            return Err(invalid("rating_points_per_line_point must be > 0"));
        }
        if self.margin_scale <= 0.0 {
            return Err(invalid("margin_scale must be > 0"));
        }
        if self.prob_per_point < 0.0 {
            return Err(invalid("prob_per_point must be >= 0"));
        }
        if self.max_win_probability <= 0.5 || self.max_win_probability >= 1.0 {
            return Err(invalid("max_win_probability must be in (0.5, 1)"));
        }
        if self.rating_stale_hours <= 0 || self.line_stale_hours <= 0 {
            return Err(invalid("staleness windows must be > 0 hours"));
        }
        if self.rating_stale_hours > self.rating_max_age_hours {
            return Err(invalid(
                "rating_stale_hours must not exceed rating_max_age_hours",
            ));
        }
        Ok(())
    }
}

impl CategoryThresholds {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.max > self.strong && self.strong > self.moderate && self.moderate > self.lean) {
            return Err(invalid(
                "category thresholds must be strictly descending: max > strong > moderate > lean",
            ));
        }
        if self.lean <= 0.0 {
            return Err(invalid("categories.lean must be > 0"));
        }
        Ok(())
    }
}

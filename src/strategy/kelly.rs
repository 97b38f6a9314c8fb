//! Kelly criterion position sizing.
//!
//! Calibrates a win probability from edge and confidence, computes the
//! full Kelly fraction for the quoted price, damps it by the configured
//! fraction, caps it per play, and rounds the result to whole unit steps.

use chrono::Utc;
use rust_decimal::prelude::*;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use super::card::categorize;
use super::confidence::ConfidenceScore;
use super::edge::Edge;
use crate::config::{BankrollConfig, CategoryThresholds, ModelConfig};
use crate::types::{implied_probability, payout_multiple, Market, Recommendation};

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Why an edge was not turned into a stake.
#[derive(Debug, Clone, PartialEq)]
pub enum StakeRejection {
    BelowMinimumEdge { edge: f64, min: f64 },
    /// Edge below the smallest category bound.
    Uncategorized { edge: f64 },
    LowConfidence { confidence: f64, floor: f64 },
    /// Negative expected value after calibration.
    NegativeKelly { full_kelly: f64 },
    /// Stake rounds to zero units.
    BelowMinimumUnit { stake_percent: f64 },
}

impl fmt::Display for StakeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeRejection::BelowMinimumEdge { edge, min } => {
                write!(f, "edge {edge:.2} below minimum {min:.2}")
            }
            StakeRejection::Uncategorized { edge } => {
                write!(f, "edge {edge:.2} below the lowest category")
            }
            StakeRejection::LowConfidence { confidence, floor } => {
                write!(f, "confidence {confidence:.1} below floor {floor:.1}")
            }
            StakeRejection::NegativeKelly { full_kelly } => {
                write!(f, "non-positive Kelly fraction {full_kelly:.4}")
            }
            StakeRejection::BelowMinimumUnit { stake_percent } => {
                write!(f, "stake {stake_percent:.3}% rounds to zero units")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Kelly staker
// ---------------------------------------------------------------------------

pub struct KellyStaker {
    model: ModelConfig,
    categories: CategoryThresholds,
}

impl KellyStaker {
    pub fn new(model: ModelConfig, categories: CategoryThresholds) -> Self {
        Self { model, categories }
    }

    /// Calibrated win probability for the recommended side.
    ///
    /// Starts at the break-even probability of the price and moves away from
    /// it in proportion to the edge, scaled by confidence.
    pub fn win_probability(&self, edge: &Edge, confidence: f64) -> f64 {
        let break_even = implied_probability(edge.quote.price);
        let raw_edge = match edge.market {
            Market::Moneyline => edge.probability_edge().unwrap_or(0.0),
            Market::Spread | Market::Total => edge.points * self.model.prob_per_point,
        };
        let p = break_even + raw_edge * (confidence / 100.0);
        p.clamp(0.0, self.model.max_win_probability)
    }

    /// Size a play.
    ///
    /// Kelly formula: f* = (p(b + 1) - 1) / b
    /// where:
    ///   b = net payout per unit staked
    ///   p = calibrated win probability
    pub fn size(
        &self,
        edge: &Edge,
        confidence: &ConfidenceScore,
        bankroll: &BankrollConfig,
    ) -> Result<Recommendation, StakeRejection> {
        if edge.points < bankroll.min_edge_points {
            return Err(StakeRejection::BelowMinimumEdge {
                edge: edge.points,
                min: bankroll.min_edge_points,
            });
        }

        let category = categorize(edge.points, &self.categories)
            .ok_or(StakeRejection::Uncategorized { edge: edge.points })?;

        if confidence.value < bankroll.confidence_floor {
            return Err(StakeRejection::LowConfidence {
                confidence: confidence.value,
                floor: bankroll.confidence_floor,
            });
        }

        let p = self.win_probability(edge, confidence.value);
        let b = payout_multiple(edge.quote.price);
        let full_kelly = (p * (b + 1.0) - 1.0) / b;

        if full_kelly <= 0.0 {
            debug!(
                game_id = %edge.game_id,
                market = %edge.market,
                full_kelly,
                "Negative Kelly, no bet"
            );
            return Err(StakeRejection::NegativeKelly { full_kelly });
        }

        // Fractional Kelly, then the per-play cap.
        let raw_percent = full_kelly * bankroll.kelly_fraction * 100.0;
        let capped_percent = raw_percent.min(bankroll.max_stake_percent);

        let units = round_units(capped_percent, bankroll);
        if units <= Decimal::ZERO {
            return Err(StakeRejection::BelowMinimumUnit {
                stake_percent: capped_percent,
            });
        }

        let unit_percent = to_decimal(bankroll.unit_percent);
        let stake_percent = (units * unit_percent).normalize();
        let stake_amount = (to_decimal(bankroll.bankroll_units) * stake_percent / Decimal::ONE_HUNDRED)
            .round_dp(2)
            .normalize();

        let stake_f64 = stake_percent.to_f64().unwrap_or(0.0);
        let expected_return_percent = stake_f64 * (p * b - (1.0 - p));

        let mut factors = confidence.factors.clone();
        factors.push(format!(
            "Win probability {:.1}% vs break-even {:.1}%",
            p * 100.0,
            implied_probability(edge.quote.price) * 100.0
        ));
        if raw_percent > bankroll.max_stake_percent {
            factors.push(format!(
                "Stake capped at {:.1}% (Kelly wanted {:.2}%)",
                bankroll.max_stake_percent, raw_percent
            ));
        }

        debug!(
            game_id = %edge.game_id,
            market = %edge.market,
            side = %edge.side,
            full_kelly = format!("{:.2}%", full_kelly * 100.0),
            fractional = format!("{:.2}%", raw_percent),
            stake = %stake_percent,
            units = %units,
            ev = format!("{:.3}%", expected_return_percent),
            "Play sized"
        );

        Ok(Recommendation {
            id: Uuid::new_v4(),
            game_id: edge.game_id.clone(),
            market: edge.market,
            side: edge.side,
            line: edge.quote.line,
            price: edge.quote.price,
            edge_points: edge.points,
            confidence: confidence.value,
            confidence_level: confidence.level,
            win_probability: p,
            full_kelly,
            stake_percent,
            units: units.normalize(),
            stake_amount,
            category,
            expected_return_percent,
            factors,
            warnings: edge.warnings.clone(),
            degraded: confidence.degraded,
            created_at: Utc::now(),
        })
    }
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Round a stake (percent of bankroll) to the unit grid, never above the cap.
fn round_units(stake_percent: f64, bankroll: &BankrollConfig) -> Decimal {
    let granularity = to_decimal(bankroll.unit_granularity);
    let unit_percent = to_decimal(bankroll.unit_percent);
    if granularity <= Decimal::ZERO || unit_percent <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let raw_units = to_decimal(stake_percent) / unit_percent;
    let steps = (raw_units / granularity)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let units = steps * granularity;

    let max_units = to_decimal(bankroll.max_stake_percent) / unit_percent;
    if units > max_units {
        (max_units / granularity).floor() * granularity
    } else {
        units
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Betting card assembly.
//!
//! Takes the complete set of sized recommendations for a week and turns it
//! into a published card: one play per (game, market), categorized, ranked
//! by confidence, and admitted whole in rank order until the portfolio cap
//! is reached. A published card is never mutated; later data produces a
//! new version via [`CardBuilder::rebuild`].

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{BankrollConfig, CategoryThresholds};
use crate::types::{Category, EngineError, Market, Recommendation, Side};

/// Category for an edge magnitude. Lower bounds are inclusive; below the
/// LEAN bound the play is not categorizable.
pub fn categorize(points: f64, thresholds: &CategoryThresholds) -> Option<Category> {
    let points = points.abs();
    if points >= thresholds.max {
        Some(Category::Max)
    } else if points >= thresholds.strong {
        Some(Category::Strong)
    } else if points >= thresholds.moderate {
        Some(Category::Moderate)
    } else if points >= thresholds.lean {
        Some(Category::Lean)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Card metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Ratings or lines were insufficient; the game was not evaluated.
    MissingData { reason: String },
    /// Evaluated but not staked (edge below threshold, low confidence, ...).
    NotStaked { reason: String },
    Uncategorized { edge_points: f64 },
    /// Lost a same-market conflict to another recommendation.
    Conflict { kept: Uuid },
    /// Would have pushed the card past the portfolio cap.
    PortfolioCap { allocated: Decimal, cap: Decimal },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::MissingData { reason } => write!(f, "missing data: {reason}"),
            ExclusionReason::NotStaked { reason } => write!(f, "not staked: {reason}"),
            ExclusionReason::Uncategorized { edge_points } => {
                write!(f, "edge {edge_points:.2} below the lowest category")
            }
            ExclusionReason::Conflict { kept } => write!(f, "conflict, kept {kept}"),
            ExclusionReason::PortfolioCap { allocated, cap } => {
                write!(f, "portfolio cap reached ({allocated}% of {cap}%)")
            }
        }
    }
}

/// A game or play left off the card, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub game_id: String,
    pub market: Option<Market>,
    pub side: Option<Side>,
    pub recommendation_id: Option<Uuid>,
    pub reason: ExclusionReason,
    /// Data-quality warnings raised while evaluating the excluded play.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Exclusion {
    pub fn for_game(game_id: &str, market: Option<Market>, reason: ExclusionReason) -> Self {
        Self {
            game_id: game_id.to_string(),
            market,
            side: None,
            recommendation_id: None,
            reason,
            warnings: Vec::new(),
        }
    }

    fn for_play(rec: &Recommendation, reason: ExclusionReason) -> Self {
        Self {
            game_id: rec.game_id.clone(),
            market: Some(rec.market),
            side: Some(rec.side),
            recommendation_id: Some(rec.id),
            reason,
            warnings: rec.warnings.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub game_id: String,
    pub market: Market,
    pub kept: Uuid,
    pub kept_side: Side,
    pub dropped: Uuid,
    pub dropped_side: Side,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardWarning {
    pub game_id: String,
    pub market: Market,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSummary {
    pub total_plays: usize,
    /// Sum of accepted stakes, percent of bankroll.
    pub capital_allocation_percent: Decimal,
    pub total_units: Decimal,
    /// Sum of the plays' expected returns, percent of bankroll.
    pub expected_portfolio_return: f64,
    pub by_category: BTreeMap<Category, usize>,
    /// Distinct games that produced no play at all.
    pub games_excluded: usize,
}

// ---------------------------------------------------------------------------
// Betting card
// ---------------------------------------------------------------------------

/// A published weekly card. Fields are read-only once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingCard {
    id: Uuid,
    version: u32,
    supersedes: Option<Uuid>,
    season: u32,
    week: u32,
    generated_at: DateTime<Utc>,
    plays: Vec<Recommendation>,
    excluded: Vec<Exclusion>,
    conflicts: Vec<ConflictRecord>,
    warnings: Vec<CardWarning>,
    summary: CardSummary,
}

impl BettingCard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn supersedes(&self) -> Option<Uuid> {
        self.supersedes
    }

    pub fn season(&self) -> u32 {
        self.season
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Accepted plays in rank order.
    pub fn plays(&self) -> &[Recommendation] {
        &self.plays
    }

    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }

    pub fn conflicts(&self) -> &[ConflictRecord] {
        &self.conflicts
    }

    pub fn warnings(&self) -> &[CardWarning] {
        &self.warnings
    }

    pub fn summary(&self) -> &CardSummary {
        &self.summary
    }

    pub fn play(&self, id: Uuid) -> Option<&Recommendation> {
        self.plays.iter().find(|p| p.id == id)
    }
}

impl fmt::Display for BettingCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Season {} Week {} (v{}): {} plays, {}% allocated, EV {:+.3}%",
            self.season,
            self.week,
            self.version,
            self.summary.total_plays,
            self.summary.capital_allocation_percent,
            self.summary.expected_portfolio_return,
        )?;
        for play in &self.plays {
            writeln!(f, "  {play}")?;
        }
        for ex in &self.excluded {
            let market = ex.market.map(|m| m.to_string()).unwrap_or_else(|| "-".into());
            writeln!(f, "  excluded {} {market}: {}", ex.game_id, ex.reason)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct CardBuilder {
    bankroll: BankrollConfig,
    categories: CategoryThresholds,
}

/// Confidence desc, then edge desc, then a stable key.
fn rank_order(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.edge_points
                .partial_cmp(&a.edge_points)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.game_id.cmp(&b.game_id))
        .then_with(|| a.market.cmp(&b.market))
        .then_with(|| a.id.cmp(&b.id))
}

impl CardBuilder {
    pub fn new(bankroll: BankrollConfig, categories: CategoryThresholds) -> Self {
        Self {
            bankroll,
            categories,
        }
    }

    /// Build version 1 of a week's card from the complete candidate set.
    pub fn build(
        &self,
        season: u32,
        week: u32,
        recommendations: Vec<Recommendation>,
        excluded: Vec<Exclusion>,
    ) -> BettingCard {
        self.assemble(season, week, 1, None, recommendations, excluded)
    }

    /// Build a new version superseding `previous`. The previous card is untouched.
    pub fn rebuild(
        &self,
        previous: &BettingCard,
        recommendations: Vec<Recommendation>,
        excluded: Vec<Exclusion>,
    ) -> BettingCard {
        self.assemble(
            previous.season,
            previous.week,
            previous.version + 1,
            Some(previous.id),
            recommendations,
            excluded,
        )
    }

    fn assemble(
        &self,
        season: u32,
        week: u32,
        version: u32,
        supersedes: Option<Uuid>,
        recommendations: Vec<Recommendation>,
        mut excluded: Vec<Exclusion>,
    ) -> BettingCard {
        let candidates = recommendations.len();
        let mut warnings: Vec<CardWarning> = excluded
            .iter()
            .filter_map(|ex| ex.market.map(|market| (ex, market)))
            .flat_map(|(ex, market)| {
                ex.warnings.iter().map(move |detail| CardWarning {
                    game_id: ex.game_id.clone(),
                    market,
                    detail: detail.clone(),
                })
            })
            .collect();
        let mut conflicts = Vec::new();

        // Step 1 – categorize
        let mut groups: BTreeMap<(String, Market), Vec<Recommendation>> = BTreeMap::new();
        for mut rec in recommendations {
            for detail in &rec.warnings {
                warnings.push(CardWarning {
                    game_id: rec.game_id.clone(),
                    market: rec.market,
                    detail: detail.clone(),
                });
            }
            match categorize(rec.edge_points, &self.categories) {
                Some(category) => {
                    rec.category = category;
                    groups
                        .entry((rec.game_id.clone(), rec.market))
                        .or_default()
                        .push(rec);
                }
                None => {
                    let reason = ExclusionReason::Uncategorized {
                        edge_points: rec.edge_points,
                    };
                    excluded.push(Exclusion::for_play(&rec, reason));
                }
            }
        }

        // Step 2 – one play per (game, market)
        let mut kept: Vec<Recommendation> = Vec::with_capacity(groups.len());
        for ((game_id, market), mut group) in groups {
            group.sort_by(rank_order);
            let mut group = group.into_iter();
            let Some(winner) = group.next() else {
                continue;
            };
            for loser in group {
                let err = EngineError::Conflict {
                    game_id: game_id.clone(),
                    market,
                    kept: winner.side,
                    dropped: loser.side,
                };
                warn!(
                    kept_confidence = format!("{:.1}", winner.confidence),
                    dropped_confidence = format!("{:.1}", loser.confidence),
                    "{err}"
                );
                conflicts.push(ConflictRecord {
                    game_id: game_id.clone(),
                    market,
                    kept: winner.id,
                    kept_side: winner.side,
                    dropped: loser.id,
                    dropped_side: loser.side,
                });
                excluded.push(Exclusion::for_play(
                    &loser,
                    ExclusionReason::Conflict { kept: winner.id },
                ));
            }
            kept.push(winner);
        }

        // Step 3 – rank
        kept.sort_by(rank_order);

        // Step 4 – admit whole plays until the cap would be breached
        let cap = Decimal::from_f64(self.bankroll.portfolio_cap_percent).unwrap_or(Decimal::ZERO);
        let mut allocated = Decimal::ZERO;
        let mut cap_reached = false;
        let mut plays = Vec::with_capacity(kept.len());
        for rec in kept {
            if !cap_reached && allocated + rec.stake_percent <= cap {
                allocated += rec.stake_percent;
                plays.push(rec);
            } else {
                cap_reached = true;
                info!(
                    game_id = %rec.game_id,
                    market = %rec.market,
                    stake = %rec.stake_percent,
                    allocated = %allocated,
                    cap = %cap,
                    "Play excluded by portfolio cap"
                );
                excluded.push(Exclusion::for_play(
                    &rec,
                    ExclusionReason::PortfolioCap { allocated, cap },
                ));
            }
        }

        let summary = Self::summarize(&plays, &excluded, allocated);

        info!(
            season,
            week,
            version,
            candidates,
            plays = summary.total_plays,
            allocation = %summary.capital_allocation_percent,
            ev = format!("{:.3}%", summary.expected_portfolio_return),
            excluded = excluded.len(),
            conflicts = conflicts.len(),
            "Card built"
        );

        BettingCard {
            id: Uuid::new_v4(),
            version,
            supersedes,
            season,
            week,
            generated_at: Utc::now(),
            plays,
            excluded,
            conflicts,
            warnings,
            summary,
        }
    }

    fn summarize(plays: &[Recommendation], excluded: &[Exclusion], allocated: Decimal) -> CardSummary {
        let mut by_category: BTreeMap<Category, usize> =
            Category::ALL.iter().map(|c| (*c, 0)).collect();
        for play in plays {
            *by_category.entry(play.category).or_default() += 1;
        }

        let mut excluded_games: Vec<&str> = excluded
            .iter()
            .map(|e| e.game_id.as_str())
            .filter(|g| !plays.iter().any(|p| p.game_id == *g))
            .collect();
        excluded_games.sort_unstable();
        excluded_games.dedup();

        CardSummary {
            total_plays: plays.len(),
            capital_allocation_percent: allocated.normalize(),
            total_units: plays.iter().map(|p| p.units).sum::<Decimal>().normalize(),
            expected_portfolio_return: plays.iter().map(|p| p.expected_return_percent).sum(),
            by_category,
            games_excluded: excluded_games.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

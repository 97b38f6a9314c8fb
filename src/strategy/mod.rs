//! Strategy engine: edge detection, confidence scoring, Kelly staking and
//! card assembly.

pub mod card;
pub mod confidence;
pub mod edge;
pub mod kelly;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::types::{AuxiliarySignals, EngineError, Market, Recommendation, WeeklySlate};
use card::{BettingCard, CardBuilder, Exclusion, ExclusionReason};
use confidence::ConfidenceScorer;
use edge::{Edge, EdgeCalculator};
use kelly::{KellyStaker, StakeRejection};

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// Record of every (game, market) evaluated during a run, including the
/// ones that were passed on and the reason why.
#[derive(Debug, Clone)]
pub enum DecisionRecord {
    /// Not evaluated: ratings or lines were insufficient.
    Skipped {
        game_id: String,
        market: Option<Market>,
        error: EngineError,
    },
    /// Edge computed but not staked.
    Rejected { edge: Edge, reason: StakeRejection },
    /// Sized and handed to the card builder.
    Sized { recommendation: Recommendation },
}

/// Everything a single pass over a slate produced, before card assembly.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub recommendations: Vec<Recommendation>,
    pub excluded: Vec<Exclusion>,
    pub decisions: Vec<DecisionRecord>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Pipelines edge calculation → confidence → Kelly sizing → card assembly
/// for one week's slate.
///
/// The whole slate is evaluated before the card is built, so the card
/// builder always sees the complete candidate set.
pub struct WeeklyPipeline {
    config: AppConfig,
    edges: EdgeCalculator,
    scorer: ConfidenceScorer,
    staker: KellyStaker,
    cards: CardBuilder,
}

impl WeeklyPipeline {
    /// Build a pipeline. An invalid configuration aborts here, before any
    /// play is computed.
    pub fn new(config: AppConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            edges: EdgeCalculator::new(config.model.clone()),
            scorer: ConfidenceScorer::new(config.confidence.clone()),
            staker: KellyStaker::new(config.model.clone(), config.categories.clone()),
            cards: CardBuilder::new(config.bankroll.clone(), config.categories.clone()),
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Evaluate every game × market that has at least one posted line.
    pub fn evaluate(&self, slate: &WeeklySlate, now: DateTime<Utc>) -> Evaluation {
        let mut out = Evaluation::default();
        let no_signals = AuxiliarySignals::default();

        for game in &slate.games {
            let markets: Vec<Market> = Market::ALL
                .iter()
                .copied()
                .filter(|m| slate.lines_for(&game.id, *m).next().is_some())
                .collect();

            if markets.is_empty() {
                let error = EngineError::missing(&game.id, "no lines posted");
                debug!(game_id = %game.id, "No lines posted, game skipped");
                out.excluded.push(Exclusion::for_game(
                    &game.id,
                    None,
                    ExclusionReason::MissingData {
                        reason: "no lines posted".into(),
                    },
                ));
                out.decisions.push(DecisionRecord::Skipped {
                    game_id: game.id.clone(),
                    market: None,
                    error,
                });
                continue;
            }

            let signals = slate.signals.get(&game.id).unwrap_or(&no_signals);

            for market in markets {
                let edge = match self
                    .edges
                    .compute_edge(game, market, &slate.ratings, &slate.lines, now)
                {
                    Ok(edge) => edge,
                    Err(error) => {
                        warn!(game_id = %game.id, market = %market, error = %error, "Game skipped");
                        let reason = match &error {
                            EngineError::MissingData { reason, .. } => reason.clone(),
                            other => other.to_string(),
                        };
                        out.excluded.push(Exclusion::for_game(
                            &game.id,
                            Some(market),
                            ExclusionReason::MissingData { reason },
                        ));
                        out.decisions.push(DecisionRecord::Skipped {
                            game_id: game.id.clone(),
                            market: Some(market),
                            error,
                        });
                        continue;
                    }
                };

                if edge.stale {
                    let stale = EngineError::StaleData {
                        game_id: game.id.clone(),
                        detail: edge.warnings.join("; "),
                    };
                    warn!(market = %market, "{stale}");
                }

                let confidence = self.scorer.score(&edge, game.venue, signals);

                match self.staker.size(&edge, &confidence, &self.config.bankroll) {
                    Ok(recommendation) => {
                        out.recommendations.push(recommendation.clone());
                        out.decisions.push(DecisionRecord::Sized { recommendation });
                    }
                    Err(reason) => {
                        debug!(
                            game_id = %game.id,
                            market = %market,
                            edge = format!("{:.2}", edge.points),
                            reason = %reason,
                            "Play not staked"
                        );
                        let mut exclusion = Exclusion::for_game(
                            &game.id,
                            Some(market),
                            ExclusionReason::NotStaked {
                                reason: reason.to_string(),
                            },
                        );
                        exclusion.side = Some(edge.side);
                        exclusion.warnings = edge.warnings.clone();
                        out.excluded.push(exclusion);
                        out.decisions.push(DecisionRecord::Rejected { edge, reason });
                    }
                }
            }
        }

        info!(
            games = slate.games.len(),
            sized = out.recommendations.len(),
            excluded = out.excluded.len(),
            "Slate evaluated"
        );
        out
    }

    /// Evaluate a slate and publish version 1 of its card.
    pub fn run(&self, slate: &WeeklySlate, now: DateTime<Utc>) -> (BettingCard, Vec<DecisionRecord>) {
        let eval = self.evaluate(slate, now);
        let card = self
            .cards
            .build(slate.season, slate.week, eval.recommendations, eval.excluded);
        (card, eval.decisions)
    }

    /// Re-evaluate an updated slate into a new card version superseding `previous`.
    pub fn rerun(
        &self,
        previous: &BettingCard,
        slate: &WeeklySlate,
        now: DateTime<Utc>,
    ) -> (BettingCard, Vec<DecisionRecord>) {
        let eval = self.evaluate(slate, now);
        let card = self
            .cards
            .rebuild(previous, eval.recommendations, eval.excluded);
        (card, eval.decisions)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

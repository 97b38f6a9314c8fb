//! Model-vs-market edge calculation.
//!
//! Maps power ratings to a predicted home margin (and, for totals, a
//! projected game total), selects a line across books, and measures the
//! disagreement in line points, signed toward the recommended side.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::{LinePolicy, ModelConfig};
use crate::types::{
    is_valid_price, no_vig_probability, payout_multiple, EngineError, Game, LineQuote, Market,
    MarketLine, PowerRating, Side,
};

/// Logistic function mapping a scaled margin to a probability.
#[inline]
pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Inverse of [`logistic`].
#[inline]
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-9, 1.0 - 1e-9);
    (p / (1.0 - p)).ln()
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Model disagreement with the market for one (game, market) pair.
#[derive(Debug, Clone)]
pub struct Edge {
    pub game_id: String,
    pub market: Market,
    pub side: Side,
    /// Edge magnitude in line points, always >= 0, favoring `side`.
    pub points: f64,
    /// Positive favors home/over, negative away/under.
    pub signed_points: f64,
    /// Model home margin (spread, moneyline) or projected total.
    pub model_number: f64,
    /// Market home line, total, or moneyline-implied home margin.
    pub market_number: f64,
    /// Line and price taken for `side`.
    pub quote: LineQuote,
    /// Moneyline only: model win probability for `side`.
    pub model_probability: Option<f64>,
    /// Moneyline only: vig-free market probability for `side`.
    pub market_probability: Option<f64>,
    /// Books quoting this market.
    pub books: usize,
    pub stale: bool,
    pub warnings: Vec<String>,
}

impl Edge {
    /// Model minus market win probability (moneyline only).
    pub fn probability_edge(&self) -> Option<f64> {
        Some(self.model_probability? - self.market_probability?)
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

pub struct EdgeCalculator {
    config: ModelConfig,
}

impl EdgeCalculator {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    /// Access the model configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Predicted home margin from the two ratings.
    pub fn home_margin(&self, game: &Game, home: &PowerRating, away: &PowerRating) -> f64 {
        let diff = (home.rating - away.rating) / self.config.rating_points_per_line_point;
        if game.neutral_site {
            diff
        } else {
            diff + self.config.home_field_points
        }
    }

    /// Compute the edge for one market of one game.
    ///
    /// `Err(EngineError::MissingData)` means the pair is skipped: a rating
    /// is missing or too old, or no usable line exists.
    pub fn compute_edge(
        &self,
        game: &Game,
        market: Market,
        ratings: &[PowerRating],
        lines: &[MarketLine],
        now: DateTime<Utc>,
    ) -> Result<Edge, EngineError> {
        let mut warnings = Vec::new();

        let home = self.fresh_rating(game, &game.home_team, ratings, now, &mut warnings)?;
        let away = self.fresh_rating(game, &game.away_team, ratings, now, &mut warnings)?;

        let candidates: Vec<&MarketLine> = lines
            .iter()
            .filter(|l| l.game_id == game.id && l.market == market)
            .filter(|l| is_valid_price(l.price) && l.opposite_price.map_or(true, is_valid_price))
            .filter(|l| market != Market::Moneyline || l.opposite_price.is_some())
            .collect();

        if candidates.is_empty() {
            return Err(EngineError::missing(&game.id, format!("no usable {market} lines")));
        }

        let newest = candidates.iter().map(|l| l.as_of).max().unwrap_or(now);
        let line_age = now - newest;
        if line_age > Duration::hours(self.config.line_stale_hours) {
            warnings.push(format!(
                "{market} lines are {}h old (stale after {}h)",
                line_age.num_hours(),
                self.config.line_stale_hours
            ));
        }

        let home_margin = self.home_margin(game, home, away);
        let model_number = match market {
            Market::Total => match (home.projected_points, away.projected_points) {
                (Some(h), Some(a)) => h + a,
                _ => {
                    return Err(EngineError::missing(
                        &game.id,
                        "projected points missing for total",
                    ))
                }
            },
            Market::Spread | Market::Moneyline => home_margin,
        };

        let consensus = self.consensus_line(market, &candidates);
        let consensus_signed = self.signed_points(market, model_number, &consensus);
        let (quoted, other) = market.sides();
        let side = if consensus_signed > 0.0 { quoted } else { other };

        let selected = match self.config.line_policy {
            LinePolicy::Median => consensus,
            LinePolicy::BestPrice => self.best_line_for(market, side, model_number, &candidates),
        };
        let signed_points = self.signed_points(market, model_number, &selected);

        let quote = selected.quote_for(side).ok_or_else(|| {
            EngineError::missing(&game.id, format!("no {side} price for {market}"))
        })?;

        let (market_number, model_probability, market_probability) = match market {
            Market::Moneyline => {
                let opposite = selected.opposite_price.unwrap_or(selected.price);
                let market_home = no_vig_probability(selected.price, opposite);
                let model_home = logistic(home_margin / self.config.margin_scale);
                let (model_p, market_p) = if side == Side::Home {
                    (model_home, market_home)
                } else {
                    (1.0 - model_home, 1.0 - market_home)
                };
                (
                    self.config.margin_scale * logit(market_home),
                    Some(model_p),
                    Some(market_p),
                )
            }
            Market::Spread | Market::Total => (selected.line, None, None),
        };

        let edge = Edge {
            game_id: game.id.clone(),
            market,
            side,
            points: if side.is_quoted_side() { signed_points } else { -signed_points },
            signed_points,
            model_number,
            market_number,
            quote,
            model_probability,
            market_probability,
            books: candidates.len(),
            stale: !warnings.is_empty(),
            warnings,
        };

        debug!(
            game_id = %edge.game_id,
            market = %edge.market,
            side = %edge.side,
            edge = format!("{:.2}", edge.points),
            model = format!("{:.2}", edge.model_number),
            market_line = format!("{:.2}", edge.market_number),
            books = edge.books,
            stale = edge.stale,
            "Edge computed"
        );

        Ok(edge)
    }

    /// Latest rating for a team, if it is within the hard freshness window.
    fn fresh_rating<'a>(
        &self,
        game: &Game,
        team: &str,
        ratings: &'a [PowerRating],
        now: DateTime<Utc>,
        warnings: &mut Vec<String>,
    ) -> Result<&'a PowerRating, EngineError> {
        let rating = ratings
            .iter()
            .filter(|r| r.team_id == team)
            .max_by_key(|r| r.as_of)
            .ok_or_else(|| EngineError::missing(&game.id, format!("no power rating for {team}")))?;

        let age = now - rating.as_of;
        if age > Duration::hours(self.config.rating_max_age_hours) {
            return Err(EngineError::missing(
                &game.id,
                format!(
                    "power rating for {team} is {}h old (max {}h)",
                    age.num_hours(),
                    self.config.rating_max_age_hours
                ),
            ));
        }
        if age > Duration::hours(self.config.rating_stale_hours) {
            warnings.push(format!(
                "power rating for {team} is {}h old (stale after {}h)",
                age.num_hours(),
                self.config.rating_stale_hours
            ));
        }
        Ok(rating)
    }

    /// Edge in home/over perspective against a single line.
    fn signed_points(&self, market: Market, model_number: f64, line: &MarketLine) -> f64 {
        match market {
            Market::Spread => model_number + line.line,
            Market::Total => model_number - line.line,
            Market::Moneyline => {
                let opposite = line.opposite_price.unwrap_or(line.price);
                let implied_margin =
                    self.config.margin_scale * logit(no_vig_probability(line.price, opposite));
                model_number - implied_margin
            }
        }
    }

    /// Median line across books.
    ///
    /// Spread/total use the statistical median of the line with the prices
    /// of the lower-middle book; moneyline takes the lower-middle book by
    /// vig-free home probability.
    fn consensus_line(&self, market: Market, candidates: &[&MarketLine]) -> MarketLine {
        let mut sorted: Vec<&MarketLine> = candidates.to_vec();
        let key = |l: &MarketLine| match market {
            Market::Moneyline => no_vig_probability(l.price, l.opposite_price.unwrap_or(l.price)),
            Market::Spread | Market::Total => l.line,
        };
        sorted.sort_by(|a, b| {
            key(*a)
                .partial_cmp(&key(*b))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.book_id.cmp(&b.book_id))
        });

        let n = sorted.len();
        let mut consensus = sorted[(n - 1) / 2].clone();
        if market != Market::Moneyline && n % 2 == 0 {
            consensus.line = (sorted[n / 2 - 1].line + sorted[n / 2].line) / 2.0;
        }
        if n > 1 {
            consensus.book_id = format!("median({n})");
        }
        consensus
    }

    /// The line most favorable to `side`; ties go to the better price.
    fn best_line_for(
        &self,
        market: Market,
        side: Side,
        model_number: f64,
        candidates: &[&MarketLine],
    ) -> MarketLine {
        let side_value = |l: &MarketLine| {
            let signed = self.signed_points(market, model_number, l);
            if side.is_quoted_side() {
                signed
            } else {
                -signed
            }
        };
        let payout = |l: &MarketLine| l.price_for(side).map(payout_multiple).unwrap_or(0.0);

        candidates
            .iter()
            .copied()
            .max_by(|a, b| {
                side_value(*a)
                    .partial_cmp(&side_value(*b))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        payout(*a)
                            .partial_cmp(&payout(*b))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| b.book_id.cmp(&a.book_id))
            })
            .cloned()
            .unwrap_or_else(|| candidates[0].clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

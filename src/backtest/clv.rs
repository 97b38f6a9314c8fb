//! Closing line value tracking.
//!
//! Every recommendation is followed from the moment it is published until
//! its result is known. CLV compares the line actually taken with the
//! closing line and is the primary measure of whether the model beats the
//! market, independent of short-run results.
//!
//! Lifecycle (strictly forward):
//!   PENDING → PLACED → GRADED → SETTLED

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ModelConfig;
use crate::strategy::edge::logit;
use crate::types::{
    implied_probability, payout_multiple, ClosingLine, EngineError, LineQuote, Market, Outcome,
    Recommendation, Side,
};

/// One-sided 95% critical value for the skill test.
const T_CRITICAL: f64 = 1.645;
/// Fewer settled records than this never counts as demonstrated skill.
const MIN_SKILL_SAMPLE: u64 = 3;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClvState {
    Pending,
    Placed,
    Graded,
    Settled,
}

impl ClvState {
    pub fn next(&self) -> Option<ClvState> {
        match self {
            ClvState::Pending => Some(ClvState::Placed),
            ClvState::Placed => Some(ClvState::Graded),
            ClvState::Graded => Some(ClvState::Settled),
            ClvState::Settled => None,
        }
    }
}

impl fmt::Display for ClvState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClvState::Pending => write!(f, "PENDING"),
            ClvState::Placed => write!(f, "PLACED"),
            ClvState::Graded => write!(f, "GRADED"),
            ClvState::Settled => write!(f, "SETTLED"),
        }
    }
}

/// Tracking record for one recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClvRecord {
    pub id: Uuid,
    pub recommendation_id: Uuid,
    pub game_id: String,
    pub market: Market,
    pub side: Side,
    pub units: Decimal,
    /// Win probability the play was staked at.
    pub win_probability: f64,
    /// Line and price at publication time.
    pub recommended: LineQuote,
    pub taken: Option<LineQuote>,
    pub closing: Option<LineQuote>,
    pub clv_points: Option<f64>,
    pub clv_probability: Option<f64>,
    pub outcome: Option<Outcome>,
    pub profit_units: Option<f64>,
    pub state: ClvState,
    pub tracked_at: DateTime<Utc>,
    pub placed_at: Option<DateTime<Utc>>,
    pub graded_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl ClvRecord {
    fn from_recommendation(rec: &Recommendation) -> Self {
        Self {
            id: Uuid::new_v4(),
            recommendation_id: rec.id,
            game_id: rec.game_id.clone(),
            market: rec.market,
            side: rec.side,
            units: rec.units,
            win_probability: rec.win_probability,
            recommended: LineQuote {
                line: rec.line,
                price: rec.price,
                book_id: None,
                as_of: rec.created_at,
            },
            taken: None,
            closing: None,
            clv_points: None,
            clv_probability: None,
            outcome: None,
            profit_units: None,
            state: ClvState::Pending,
            tracked_at: Utc::now(),
            placed_at: None,
            graded_at: None,
            settled_at: None,
        }
    }

    /// Beat the closing line.
    pub fn is_positive(&self) -> bool {
        self.clv_points.is_some_and(|c| c > 0.0)
    }
}

impl fmt::Display for ClvRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}]",
            self.game_id, self.market, self.side, self.state
        )?;
        if let Some(clv) = self.clv_points {
            write!(f, " clv={clv:+.2}")?;
        }
        if let Some(outcome) = self.outcome {
            write!(f, " {outcome}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CLV math
// ---------------------------------------------------------------------------

/// CLV in line points from the bettor's perspective. Positive means the
/// taken number was better than the close.
///
/// Both quotes are side-perspective: a spread taken at -2.5 that closes
/// at -3.0 is +0.5.
pub fn clv_points(market: Market, side: Side, taken: &LineQuote, closing: &LineQuote, margin_scale: f64) -> f64 {
    match market {
        Market::Spread => taken.line - closing.line,
        Market::Total => match side {
            Side::Over => closing.line - taken.line,
            _ => taken.line - closing.line,
        },
        Market::Moneyline => {
            let p_taken = implied_probability(taken.price);
            let p_close = implied_probability(closing.price);
            margin_scale * (logit(p_close) - logit(p_taken))
        }
    }
}

/// CLV in win probability: price movement plus line movement.
pub fn clv_probability(market: Market, points: f64, taken: &LineQuote, closing: &LineQuote, prob_per_point: f64) -> f64 {
    let price_term = implied_probability(closing.price) - implied_probability(taken.price);
    match market {
        Market::Moneyline => price_term,
        Market::Spread | Market::Total => price_term + points * prob_per_point,
    }
}

// ---------------------------------------------------------------------------
// Running statistics
// ---------------------------------------------------------------------------

/// Welford running mean and variance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (n − 1). Zero below two observations.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// One-sample t statistic against a zero mean.
    pub fn t_stat(&self) -> Option<f64> {
        let sd = self.std_dev();
        if self.count < 2 || sd == 0.0 {
            return None;
        }
        Some(self.mean / (sd / (self.count as f64).sqrt()))
    }
}

#[derive(Debug, Clone, Default)]
struct MarketAggregate {
    clv: RunningStats,
    positive: u64,
    profit_units: f64,
}

/// Settled-record aggregates for one market type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketClvSummary {
    pub settled: u64,
    pub mean_clv_points: f64,
    pub positive_rate: f64,
    pub profit_units: f64,
}

/// Aggregates over settled records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClvSummary {
    pub tracked: usize,
    pub settled: u64,
    pub mean_clv_points: f64,
    pub std_clv_points: f64,
    pub mean_clv_probability: f64,
    pub positive_rate: f64,
    pub wins: u64,
    pub losses: u64,
    pub pushes: u64,
    pub profit_units: f64,
    pub t_stat: Option<f64>,
    /// Mean CLV significantly above zero (one-sided, 95%).
    pub is_skill_positive: bool,
    pub by_market: BTreeMap<Market, MarketClvSummary>,
}

impl fmt::Display for ClvSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} settled | CLV {:+.2} pts (sd {:.2}) | {:.0}% positive | {}-{}-{} | {:+.2}u | skill={}",
            self.settled,
            self.mean_clv_points,
            self.std_clv_points,
            self.positive_rate * 100.0,
            self.wins,
            self.losses,
            self.pushes,
            self.profit_units,
            self.is_skill_positive,
        )
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct ClvTracker {
    margin_scale: f64,
    prob_per_point: f64,
    records: Vec<ClvRecord>,
    index: HashMap<Uuid, usize>,
    by_recommendation: HashMap<Uuid, Uuid>,
    points: RunningStats,
    probability: RunningStats,
    positive: u64,
    wins: u64,
    losses: u64,
    pushes: u64,
    profit_units: f64,
    by_market: BTreeMap<Market, MarketAggregate>,
}

impl ClvTracker {
    pub fn new(model: &ModelConfig) -> Self {
        Self {
            margin_scale: model.margin_scale,
            prob_per_point: model.prob_per_point,
            records: Vec::new(),
            index: HashMap::new(),
            by_recommendation: HashMap::new(),
            points: RunningStats::default(),
            probability: RunningStats::default(),
            positive: 0,
            wins: 0,
            losses: 0,
            pushes: 0,
            profit_units: 0.0,
            by_market: BTreeMap::new(),
        }
    }

    /// Rebuild a tracker (and its aggregates) from persisted records.
    pub fn from_records(model: &ModelConfig, records: Vec<ClvRecord>) -> Self {
        let mut tracker = Self::new(model);
        for record in records {
            let settled = record.state == ClvState::Settled;
            tracker.index.insert(record.id, tracker.records.len());
            tracker
                .by_recommendation
                .insert(record.recommendation_id, record.id);
            tracker.records.push(record);
            if settled {
                let idx = tracker.records.len() - 1;
                tracker.absorb(idx);
            }
        }
        tracker
    }

    pub fn get(&self, id: Uuid) -> Option<&ClvRecord> {
        self.index.get(&id).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[ClvRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Start tracking a recommendation. Tracking the same recommendation
    /// twice returns the existing record.
    pub fn track(&mut self, rec: &Recommendation) -> Uuid {
        if let Some(&existing) = self.by_recommendation.get(&rec.id) {
            debug!(recommendation_id = %rec.id, "Recommendation already tracked");
            return existing;
        }
        let record = ClvRecord::from_recommendation(rec);
        let id = record.id;
        debug!(record_id = %id, game_id = %record.game_id, market = %record.market, "Tracking");
        self.index.insert(id, self.records.len());
        self.by_recommendation.insert(rec.id, id);
        self.records.push(record);
        id
    }

    /// PENDING → PLACED with the line actually taken.
    pub fn place(&mut self, id: Uuid, taken: LineQuote) -> Result<(), EngineError> {
        let idx = self.transition(id, ClvState::Placed)?;
        let record = &mut self.records[idx];
        record.taken = Some(taken);
        record.placed_at = Some(Utc::now());
        record.state = ClvState::Placed;
        Ok(())
    }

    /// PLACED → GRADED against the closing line. Returns CLV in points.
    pub fn grade(&mut self, id: Uuid, closing: &ClosingLine) -> Result<f64, EngineError> {
        let idx = self.transition(id, ClvState::Graded)?;
        let (margin_scale, prob_per_point) = (self.margin_scale, self.prob_per_point);
        let record = &mut self.records[idx];

        if closing.game_id != record.game_id || closing.market != record.market {
            warn!(
                record_id = %record.id,
                expected = format!("{} {}", record.game_id, record.market),
                got = format!("{} {}", closing.game_id, closing.market),
                "Closing line rejected"
            );
            return Err(EngineError::ClosingLineMismatch {
                record_id: record.id,
                expected: format!("{} {}", record.game_id, record.market),
                got: format!("{} {}", closing.game_id, closing.market),
            });
        }

        let closing_quote = closing.quote_for(record.side).ok_or_else(|| {
            EngineError::missing(&record.game_id, format!("closing {} has no {} price", closing.market, record.side))
        })?;
        let taken = record
            .taken
            .clone()
            .ok_or_else(|| EngineError::missing(&record.game_id, "no line taken"))?;

        let points = clv_points(record.market, record.side, &taken, &closing_quote, margin_scale);
        let prob = clv_probability(record.market, points, &taken, &closing_quote, prob_per_point);

        info!(
            record_id = %record.id,
            game_id = %record.game_id,
            market = %record.market,
            taken = taken.line,
            closing = closing_quote.line,
            clv = format!("{points:+.2}"),
            "Graded"
        );

        record.closing = Some(closing_quote);
        record.clv_points = Some(points);
        record.clv_probability = Some(prob);
        record.graded_at = Some(Utc::now());
        record.state = ClvState::Graded;
        Ok(points)
    }

    /// Track, place and grade in one step. Ends in GRADED.
    pub fn record(&mut self, rec: &Recommendation, taken: LineQuote, closing: &ClosingLine) -> Result<Uuid, EngineError> {
        let id = self.track(rec);
        self.place(id, taken)?;
        self.grade(id, closing)?;
        Ok(id)
    }

    /// GRADED → SETTLED. Terminal: a second settlement is rejected and
    /// leaves the record and aggregates untouched.
    pub fn settle(&mut self, id: Uuid, outcome: Outcome) -> Result<&ClvRecord, EngineError> {
        let idx = self.transition(id, ClvState::Settled)?;
        let record = &mut self.records[idx];

        let b = payout_multiple(record.taken.as_ref().map_or(record.recommended.price, |t| t.price));
        let units = record.units.to_f64().unwrap_or(0.0);
        let profit = match outcome {
            Outcome::Win => units * b,
            Outcome::Loss => -units,
            Outcome::Push => 0.0,
        };

        record.outcome = Some(outcome);
        record.profit_units = Some(profit);
        record.settled_at = Some(Utc::now());
        record.state = ClvState::Settled;

        info!(
            record_id = %id,
            outcome = %outcome,
            profit = format!("{profit:+.2}u"),
            "Settled"
        );

        self.absorb(idx);
        Ok(&self.records[idx])
    }

    /// Aggregates over settled records.
    pub fn summary(&self) -> ClvSummary {
        let settled = self.points.count();
        let rate = |n: u64, d: u64| if d == 0 { 0.0 } else { n as f64 / d as f64 };
        let t_stat = self.points.t_stat();
        let is_skill_positive = settled >= MIN_SKILL_SAMPLE
            && match t_stat {
                Some(t) => t > T_CRITICAL,
                None => self.points.mean() > 0.0,
            };

        ClvSummary {
            tracked: self.records.len(),
            settled,
            mean_clv_points: self.points.mean(),
            std_clv_points: self.points.std_dev(),
            mean_clv_probability: self.probability.mean(),
            positive_rate: rate(self.positive, settled),
            wins: self.wins,
            losses: self.losses,
            pushes: self.pushes,
            profit_units: self.profit_units,
            t_stat,
            is_skill_positive,
            by_market: self
                .by_market
                .iter()
                .map(|(market, agg)| {
                    (
                        *market,
                        MarketClvSummary {
                            settled: agg.clv.count(),
                            mean_clv_points: agg.clv.mean(),
                            positive_rate: rate(agg.positive, agg.clv.count()),
                            profit_units: agg.profit_units,
                        },
                    )
                })
                .collect(),
        }
    }

    // ---- internals ---------------------------------------------------------

    /// Validate a forward transition and return the record's index.
    fn transition(&self, id: Uuid, to: ClvState) -> Result<usize, EngineError> {
        let idx = *self.index.get(&id).ok_or(EngineError::RecordNotFound(id))?;
        let from = self.records[idx].state;
        if from == ClvState::Settled && to == ClvState::Settled {
            warn!(record_id = %id, "Settlement rejected, record already settled");
            return Err(EngineError::DoubleSettlement { record_id: id });
        }
        if from.next() != Some(to) {
            return Err(EngineError::InvalidTransition {
                record_id: id,
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(idx)
    }

    /// Fold a newly settled record into the aggregates.
    fn absorb(&mut self, idx: usize) {
        let record = &self.records[idx];
        let points = record.clv_points.unwrap_or(0.0);
        let profit = record.profit_units.unwrap_or(0.0);
        let positive = record.is_positive();

        self.points.push(points);
        self.probability.push(record.clv_probability.unwrap_or(0.0));
        if positive {
            self.positive += 1;
        }
        match record.outcome {
            Some(Outcome::Win) => self.wins += 1,
            Some(Outcome::Loss) => self.losses += 1,
            Some(Outcome::Push) | None => self.pushes += 1,
        }
        self.profit_units += profit;

        let agg = self.by_market.entry(record.market).or_default();
        agg.clv.push(points);
        if positive {
            agg.positive += 1;
        }
        agg.profit_units += profit;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

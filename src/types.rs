//! Shared types for the SHARPLINE engine.
//!
//! These types form the data model used across all modules: the read-only
//! slate inputs handed over by the data-collection side, the sized
//! recommendation produced by the staker, and the domain error enum.
//! They are kept free of engine logic so that strategy and tracking
//! modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

/// Sport / league a game belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Nfl,
    Ncaaf,
    Nba,
    Ncaab,
    Other,
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            League::Nfl => write!(f, "NFL"),
            League::Ncaaf => write!(f, "NCAAF"),
            League::Nba => write!(f, "NBA"),
            League::Ncaab => write!(f, "NCAAB"),
            League::Other => write!(f, "Other"),
        }
    }
}

/// Attempt to parse a string into a League (case-insensitive).
impl std::str::FromStr for League {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nfl" => Ok(League::Nfl),
            "ncaaf" | "cfb" | "college football" => Ok(League::Ncaaf),
            "nba" => Ok(League::Nba),
            "ncaab" | "cbb" | "college basketball" => Ok(League::Ncaab),
            "other" => Ok(League::Other),
            _ => Err(anyhow::anyhow!("Unknown league: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Indoor,
    Outdoor,
}

/// A scheduled game for the week. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub league: League,
    pub venue: Venue,
    /// No home-field adjustment is applied on a neutral field.
    #[serde(default)]
    pub neutral_site: bool,
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} @ {} ({})",
            self.league,
            self.away_team,
            self.home_team,
            self.kickoff.format("%a %b %-d %H:%M UTC"),
        )
    }
}

impl Game {
    /// Weather only matters for games played outside.
    pub fn is_outdoor(&self) -> bool {
        self.venue == Venue::Outdoor
    }

    /// Helper to build a test/sample game with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        Game {
            id: "2026-W07-KC-BUF".to_string(),
            home_team: "BUF".to_string(),
            away_team: "KC".to_string(),
            kickoff: Utc::now() + chrono::Duration::days(3),
            league: League::Nfl,
            venue: Venue::Outdoor,
            neutral_site: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Model & market inputs
// ---------------------------------------------------------------------------

/// A team strength rating from the power-rating model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerRating {
    pub team_id: String,
    pub rating: f64,
    pub as_of: DateTime<Utc>,
    /// Points the team projects to score against a league-average opponent.
    #[serde(default)]
    pub projected_points: Option<f64>,
}

/// Market type of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Spread,
    Total,
    Moneyline,
}

impl Market {
    pub const ALL: &'static [Market] = &[Market::Spread, Market::Total, Market::Moneyline];

    /// Sides that can be bet on in this market.
    pub fn sides(&self) -> (Side, Side) {
        match self {
            Market::Spread | Market::Moneyline => (Side::Home, Side::Away),
            Market::Total => (Side::Over, Side::Under),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Spread => write!(f, "spread"),
            Market::Total => write!(f, "total"),
            Market::Moneyline => write!(f, "moneyline"),
        }
    }
}

/// Bet direction within a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
    Over,
    Under,
}

impl Side {
    /// The opposite side of the same market.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
            Side::Over => Side::Under,
            Side::Under => Side::Over,
        }
    }

    /// Home and Over are the sides lines are quoted for.
    pub fn is_quoted_side(&self) -> bool {
        matches!(self, Side::Home | Side::Over)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Home => write!(f, "HOME"),
            Side::Away => write!(f, "AWAY"),
            Side::Over => write!(f, "OVER"),
            Side::Under => write!(f, "UNDER"),
        }
    }
}

/// One sportsbook's current price for a game/market.
///
/// Spread lines are quoted from the home team's perspective (home -2.5 means
/// home favored by 2.5). `price` is the home/over price, `opposite_price` the
/// away/under price. Moneyline `line` is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketLine {
    pub game_id: String,
    pub market: Market,
    pub book_id: String,
    pub line: f64,
    pub price: i32,
    #[serde(default)]
    pub opposite_price: Option<i32>,
    pub as_of: DateTime<Utc>,
}

/// Final line captured at kickoff. Same shape as a pre-game line.
pub type ClosingLine = MarketLine;

impl MarketLine {
    /// Price for a given side. Spread/total lines without an explicit
    /// opposite price are assumed to carry the same juice on both sides.
    pub fn price_for(&self, side: Side) -> Option<i32> {
        if side.is_quoted_side() {
            return Some(self.price);
        }
        match (self.market, self.opposite_price) {
            (_, Some(p)) => Some(p),
            (Market::Moneyline, None) => None,
            (_, None) => Some(self.price),
        }
    }

    /// Line as seen by the bettor on `side` (away spread is the negated home line).
    pub fn line_for(&self, side: Side) -> f64 {
        match (self.market, side) {
            (Market::Spread, Side::Away) => -self.line,
            (Market::Moneyline, _) => 0.0,
            _ => self.line,
        }
    }

    /// The line/price a bettor on `side` would get at this book.
    pub fn quote_for(&self, side: Side) -> Option<LineQuote> {
        Some(LineQuote {
            line: self.line_for(side),
            price: self.price_for(side)?,
            book_id: Some(self.book_id.clone()),
            as_of: self.as_of,
        })
    }
}

impl fmt::Display for MarketLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {:+.1} ({:+})",
            self.book_id, self.game_id, self.market, self.line, self.price,
        )
    }
}

/// A line/price from a single side's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineQuote {
    pub line: f64,
    pub price: i32,
    #[serde(default)]
    pub book_id: Option<String>,
    pub as_of: DateTime<Utc>,
}

impl fmt::Display for LineQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.1} ({:+})", self.line, self.price)
    }
}

// ---------------------------------------------------------------------------
// Odds arithmetic
// ---------------------------------------------------------------------------

/// American odds must be at least 100 in magnitude.
pub fn is_valid_price(price: i32) -> bool {
    price.unsigned_abs() >= 100
}

/// Net payout per unit staked (b in the Kelly formula): -110 → 0.909, +150 → 1.5.
pub fn payout_multiple(price: i32) -> f64 {
    if price < 0 {
        100.0 / f64::from(price).abs()
    } else {
        f64::from(price) / 100.0
    }
}

/// Break-even probability implied by a price, vig included (-110 → 52.4%).
pub fn implied_probability(price: i32) -> f64 {
    1.0 / (1.0 + payout_multiple(price))
}

/// Vig-free probability of the side priced at `price`.
pub fn no_vig_probability(price: i32, opposite_price: i32) -> f64 {
    let p = implied_probability(price);
    let q = implied_probability(opposite_price);
    p / (p + q)
}

// ---------------------------------------------------------------------------
// Auxiliary signals
// ---------------------------------------------------------------------------

/// Injury impact per team, in line points lost to absences.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct InjuryReport {
    pub home_impact: f64,
    pub away_impact: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeatherReport {
    pub wind_mph: f64,
    pub temperature_f: f64,
    #[serde(default)]
    pub precipitation: bool,
}

/// Informed-money indicator for one side of one market.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SharpAction {
    pub market: Market,
    pub side: Side,
    #[serde(default)]
    pub reverse_line_movement: bool,
    #[serde(default)]
    pub steam_move: bool,
}

/// Optional per-game signals. Every field may be absent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuxiliarySignals {
    #[serde(default)]
    pub injuries: Option<InjuryReport>,
    #[serde(default)]
    pub weather: Option<WeatherReport>,
    #[serde(default)]
    pub sharp_action: Vec<SharpAction>,
}

impl AuxiliarySignals {
    /// Sharp-action flags reported for a market, if any.
    pub fn sharp_for(&self, market: Market) -> Option<&SharpAction> {
        self.sharp_action.iter().find(|s| s.market == market)
    }
}

/// Everything the engine needs for one week, handed over read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySlate {
    pub season: u32,
    pub week: u32,
    pub games: Vec<Game>,
    pub ratings: Vec<PowerRating>,
    pub lines: Vec<MarketLine>,
    /// Keyed by game id.
    #[serde(default)]
    pub signals: HashMap<String, AuxiliarySignals>,
}

impl WeeklySlate {
    pub fn lines_for<'a>(&'a self, game_id: &'a str, market: Market) -> impl Iterator<Item = &'a MarketLine> + 'a {
        self.lines
            .iter()
            .filter(move |l| l.game_id == game_id && l.market == market)
    }
}

// ---------------------------------------------------------------------------
// Recommendation types
// ---------------------------------------------------------------------------

/// Play strength bucket, derived from edge magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Max,
    Strong,
    Moderate,
    Lean,
}

impl Category {
    pub const ALL: &'static [Category] = &[
        Category::Max,
        Category::Strong,
        Category::Moderate,
        Category::Lean,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Max => write!(f, "MAX"),
            Category::Strong => write!(f, "STRONG"),
            Category::Moderate => write!(f, "MODERATE"),
            Category::Lean => write!(f, "LEAN"),
        }
    }
}

/// Qualitative confidence bucket. Display only; sizing uses the raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            ConfidenceLevel::VeryHigh
        } else if score >= 75.0 {
            ConfidenceLevel::High
        } else if score >= 55.0 {
            ConfidenceLevel::Moderate
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::Low => write!(f, "LOW"),
            ConfidenceLevel::Moderate => write!(f, "MODERATE"),
            ConfidenceLevel::High => write!(f, "HIGH"),
            ConfidenceLevel::VeryHigh => write!(f, "VERY_HIGH"),
        }
    }
}

/// A fully sized play, ready for the card builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub game_id: String,
    pub market: Market,
    pub side: Side,
    /// Line from the bettor's side (away spread already negated).
    pub line: f64,
    pub price: i32,
    pub edge_points: f64,
    /// Raw confidence score (0–100).
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    /// Calibrated win probability used for sizing.
    pub win_probability: f64,
    /// Undamped Kelly fraction of bankroll.
    pub full_kelly: f64,
    /// Percent of bankroll staked (3.0 = 3%).
    pub stake_percent: Decimal,
    pub units: Decimal,
    /// Stake in bankroll currency units.
    pub stake_amount: Decimal,
    pub category: Category,
    /// Expected return in percent of bankroll.
    pub expected_return_percent: f64,
    pub factors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Sized from a confidence score penalised for stale inputs.
    #[serde(default)]
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {:+.1} ({:+}) | edge={:.1} conf={:.0} ({}) | {}u ({}%) [{}]",
            self.game_id,
            self.market,
            self.side,
            self.line,
            self.price,
            self.edge_points,
            self.confidence,
            self.confidence_level,
            self.units,
            self.stake_percent,
            self.category,
        )
    }
}

impl Recommendation {
    /// Profit in units if the play wins.
    pub fn to_win_units(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.units.to_f64().unwrap_or(0.0) * payout_multiple(self.price)
    }
}

/// Final result of a settled play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Push,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "WIN"),
            Outcome::Loss => write!(f, "LOSS"),
            Outcome::Push => write!(f, "PUSH"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SHARPLINE.
///
/// Per-game variants are recoverable and end up on the card; configuration
/// errors abort the run before anything is sized.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Missing data for {game_id}: {reason}")]
    MissingData { game_id: String, reason: String },

    #[error("Stale data for {game_id}: {detail}")]
    StaleData { game_id: String, detail: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Conflicting recommendations for {game_id} {market}: kept {kept}, dropped {dropped}")]
    Conflict {
        game_id: String,
        market: Market,
        kept: Side,
        dropped: Side,
    },

    #[error("Record {record_id} is already settled")]
    DoubleSettlement { record_id: Uuid },

    #[error("Record {record_id} cannot move from {from} to {to}")]
    InvalidTransition {
        record_id: Uuid,
        from: String,
        to: String,
    },

    #[error("Record not found: {0}")]
    RecordNotFound(Uuid),

    #[error("Closing line for {got} cannot grade record {record_id} ({expected})")]
    ClosingLineMismatch {
        record_id: Uuid,
        expected: String,
        got: String,
    },
}

impl EngineError {
    pub fn missing(game_id: &str, reason: impl Into<String>) -> Self {
        EngineError::MissingData {
            game_id: game_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Recoverable errors are recorded and the batch continues.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::InvalidConfig(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_line(market: Market, line: f64, price: i32, opposite: Option<i32>) -> MarketLine {
        MarketLine {
            game_id: "g1".into(),
            market,
            book_id: "book-a".into(),
            line,
            price,
            opposite_price: opposite,
            as_of: Utc::now(),
        }
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Home.opposite(), Side::Away);
        assert_eq!(Side::Under.opposite(), Side::Over);
    }

    #[test]
    fn test_side_display() {
        assert_eq!(format!("{}", Side::Home), "HOME");
        assert_eq!(format!("{}", Side::Under), "UNDER");
    }

    #[test]
    fn test_market_sides() {
        assert_eq!(Market::Spread.sides(), (Side::Home, Side::Away));
        assert_eq!(Market::Total.sides(), (Side::Over, Side::Under));
    }

    #[test]
    fn test_league_from_str() {
        assert_eq!("NFL".parse::<League>().unwrap(), League::Nfl);
        assert_eq!("cfb".parse::<League>().unwrap(), League::Ncaaf);
        assert!("curling".parse::<League>().is_err());
    }

    #[test]
    fn test_payout_multiple() {
        assert!((payout_multiple(-110) - 0.909_090_9).abs() < 1e-6);
        assert!((payout_multiple(150) - 1.5).abs() < 1e-12);
        assert!((payout_multiple(100) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_implied_probability_standard_juice() {
        assert!((implied_probability(-110) - 0.5238).abs() < 1e-4);
        assert!((implied_probability(100) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_no_vig_removes_juice() {
        let p = no_vig_probability(-110, -110);
        assert!((p - 0.5).abs() < 1e-12);
        let fav = no_vig_probability(-200, 170);
        let dog = no_vig_probability(170, -200);
        assert!((fav + dog - 1.0).abs() < 1e-12);
        assert!(fav > 0.6);
    }

    #[test]
    fn test_valid_price() {
        assert!(is_valid_price(-110));
        assert!(is_valid_price(100));
        assert!(!is_valid_price(50));
        assert!(!is_valid_price(0));
    }

    #[test]
    fn test_extreme_prices_do_not_overflow() {
        assert!(is_valid_price(i32::MIN));
        assert!(is_valid_price(i32::MAX));
        let b = payout_multiple(i32::MIN);
        assert!(b.is_finite() && b > 0.0);
        let p = implied_probability(i32::MIN);
        assert!(p < 1.0 && p > 0.99);
    }

    #[test]
    fn test_line_for_away_negates_spread() {
        let line = make_line(Market::Spread, -2.5, -110, None);
        assert_eq!(line.line_for(Side::Home), -2.5);
        assert_eq!(line.line_for(Side::Away), 2.5);
    }

    #[test]
    fn test_price_for_defaults_to_same_juice() {
        let spread = make_line(Market::Spread, -2.5, -110, None);
        assert_eq!(spread.price_for(Side::Away), Some(-110));
        let total = make_line(Market::Total, 44.5, -105, Some(-115));
        assert_eq!(total.price_for(Side::Under), Some(-115));
    }

    #[test]
    fn test_moneyline_requires_both_prices() {
        let ml = make_line(Market::Moneyline, 0.0, -150, None);
        assert_eq!(ml.price_for(Side::Home), Some(-150));
        assert_eq!(ml.price_for(Side::Away), None);
        assert!(ml.quote_for(Side::Away).is_none());
    }

    #[test]
    fn test_confidence_level_buckets() {
        assert_eq!(ConfidenceLevel::from_score(54.99), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(55.0), ConfidenceLevel::Moderate);
        assert_eq!(ConfidenceLevel::from_score(74.99), ConfidenceLevel::Moderate);
        assert_eq!(ConfidenceLevel::from_score(75.0), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(90.0), ConfidenceLevel::VeryHigh);
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&Category::Max).unwrap();
        assert_eq!(json, "\"MAX\"");
        let parsed: Category = serde_json::from_str("\"MODERATE\"").unwrap();
        assert_eq!(parsed, Category::Moderate);
    }

    #[test]
    fn test_slate_deserializes_without_signals() {
        let json = r#"{
            "season": 2026, "week": 7,
            "games": [], "ratings": [], "lines": []
        }"#;
        let slate: WeeklySlate = serde_json::from_str(json).unwrap();
        assert!(slate.signals.is_empty());
        assert_eq!(slate.week, 7);
    }

    #[test]
    fn test_game_sample_is_outdoor() {
        let game = Game::sample();
        assert!(game.is_outdoor());
        assert!(format!("{game}").contains("KC @ BUF"));
    }

    #[test]
    fn test_engine_error_recoverability() {
        assert!(EngineError::missing("g1", "no ratings").is_recoverable());
        assert!(!EngineError::InvalidConfig("bad".into()).is_recoverable());
    }
}

//! Confidence scoring.
//!
//! Turns an edge into a bounded 0–100 score: a saturating base from the
//! edge magnitude, then optional adjustments from injuries, sharp action
//! and weather. A missing signal costs a little confidence instead of
//! failing the play.

use tracing::debug;

use super::edge::Edge;
use crate::config::ConfidenceConfig;
use crate::types::{AuxiliarySignals, ConfidenceLevel, Market, Side, Venue, WeatherReport};

/// Bounded confidence attached to one edge.
#[derive(Debug, Clone)]
pub struct ConfidenceScore {
    /// Clamped to [0, 100]. Sizing uses this, never the level.
    pub value: f64,
    pub level: ConfidenceLevel,
    /// Human-readable reasons, one per adjustment.
    pub factors: Vec<String>,
    /// Set when the edge was built from stale inputs.
    pub degraded: bool,
}

pub struct ConfidenceScorer {
    config: ConfidenceConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConfidenceConfig {
        &self.config
    }

    /// Monotonic, saturating base score for an edge magnitude.
    pub fn base(&self, points: f64) -> f64 {
        let c = &self.config;
        c.base_floor + c.base_span * (1.0 - (-points.max(0.0) / c.saturation_points).exp())
    }

    /// Weather severity (0..=weather_cap) pushing totals toward the under.
    pub fn weather_severity(&self, weather: &WeatherReport) -> f64 {
        let c = &self.config;
        let wind = (weather.wind_mph - c.wind_threshold_mph).max(0.0) * c.wind_weight;
        let cold = (c.cold_threshold_f - weather.temperature_f).max(0.0) * c.cold_weight;
        let precip = if weather.precipitation { c.precipitation_boost } else { 0.0 };
        (wind + cold + precip).min(c.weather_cap)
    }

    /// Score an edge with whatever auxiliary signals are available.
    pub fn score(&self, edge: &Edge, venue: Venue, signals: &AuxiliarySignals) -> ConfidenceScore {
        let c = &self.config;
        let base = self.base(edge.points);
        let mut value = base;
        let mut factors = vec![format!("Edge {:.1} pts (base {:.1})", edge.points, base)];

        // Injuries move side markets only.
        if edge.market != Market::Total {
            match signals.injuries {
                Some(report) => {
                    let (own, opponent) = match edge.side {
                        Side::Home => (report.home_impact, report.away_impact),
                        _ => (report.away_impact, report.home_impact),
                    };
                    let adj = ((opponent - own) * c.injury_weight).clamp(-c.injury_cap, c.injury_cap);
                    if adj != 0.0 {
                        value += adj;
                        factors.push(format!("Injury differential {:+.1} pts ({adj:+.1})", opponent - own));
                    }
                }
                None => {
                    value -= c.missing_signal_penalty;
                    factors.push(format!("No injury data ({:+.1})", -c.missing_signal_penalty));
                }
            }
        }

        match signals.sharp_for(edge.market) {
            Some(sharp) => {
                let direction = if sharp.side == edge.side {
                    1.0
                } else if sharp.side == edge.side.opposite() {
                    -1.0
                } else {
                    0.0
                };
                let mut adj = 0.0;
                if sharp.reverse_line_movement {
                    adj += c.rlm_boost;
                }
                if sharp.steam_move {
                    adj += c.steam_boost;
                }
                let adj = adj * direction;
                if adj != 0.0 {
                    value += adj;
                    let with = if direction > 0.0 { "with" } else { "against" };
                    factors.push(format!("Sharp action {with} {} ({adj:+.1})", edge.side));
                }
            }
            None => {
                value -= c.missing_signal_penalty;
                factors.push(format!("No sharp-action data ({:+.1})", -c.missing_signal_penalty));
            }
        }

        // Weather only moves outdoor totals.
        if edge.market == Market::Total && venue == Venue::Outdoor {
            match signals.weather {
                Some(weather) => {
                    let severity = self.weather_severity(&weather);
                    if severity > 0.0 {
                        let adj = if edge.side == Side::Under { severity } else { -severity };
                        value += adj;
                        factors.push(format!(
                            "Weather: wind {:.0} mph, {:.0}°F ({adj:+.1})",
                            weather.wind_mph, weather.temperature_f
                        ));
                    }
                }
                None => {
                    value -= c.missing_signal_penalty;
                    factors.push(format!("No weather data ({:+.1})", -c.missing_signal_penalty));
                }
            }
        }

        if edge.stale {
            value -= c.stale_penalty;
            factors.push(format!("Stale inputs ({:+.1})", -c.stale_penalty));
        }

        let value = value.clamp(0.0, 100.0);
        let level = ConfidenceLevel::from_score(value);

        debug!(
            game_id = %edge.game_id,
            market = %edge.market,
            side = %edge.side,
            base = format!("{base:.1}"),
            confidence = format!("{value:.1}"),
            level = %level,
            "Confidence scored"
        );

        ConfidenceScore {
            value,
            level,
            factors,
            degraded: edge.stale,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Calibration module.
//!
//! Measures how well the staked win probabilities match settled results.
//! Computes a calibration curve, Brier scores per market, and a diagnosis
//! of whether the probability model is too aggressive or too timid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::clv::{ClvRecord, ClvState};
use crate::types::{Market, Outcome};

/// Mean gap between predicted and realized win rate that is tolerated.
const TOLERANCE: f64 = 0.05;

// ---------------------------------------------------------------------------
// Calibration data
// ---------------------------------------------------------------------------

/// A single prediction–outcome pair.
#[derive(Debug, Clone)]
pub struct CalibrationPoint {
    pub recommendation_id: Uuid,
    pub market: Market,
    pub win_probability: f64,
    pub won: bool,
}

impl CalibrationPoint {
    /// Settled, non-push records only.
    pub fn from_record(record: &ClvRecord) -> Option<Self> {
        if record.state != ClvState::Settled {
            return None;
        }
        let won = match record.outcome? {
            Outcome::Win => true,
            Outcome::Loss => false,
            Outcome::Push => return None,
        };
        Some(Self {
            recommendation_id: record.recommendation_id,
            market: record.market,
            win_probability: record.win_probability,
            won,
        })
    }
}

/// Calibration analysis results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub total_predictions: usize,
    pub overall_brier: f64,
    pub market_brier: BTreeMap<Market, f64>,
    /// For each 10% bin, the predicted vs actual win rate.
    pub calibration_curve: Vec<CalibrationBucket>,
    pub diagnosis: CalibrationDiagnosis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationBucket {
    pub bin_start: f64,
    pub bin_end: f64,
    pub mean_predicted: f64,
    pub actual_rate: f64,
    pub count: usize,
    /// |mean_predicted - actual_rate|
    pub deviation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationDiagnosis {
    WellCalibrated,
    /// Staked probabilities win less often than predicted.
    OverConfident,
    /// Staked probabilities win more often than predicted.
    UnderConfident,
    InsufficientData,
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Calibration ({} settled plays): Brier {:.3}, {:?}",
            self.total_predictions, self.overall_brier, self.diagnosis
        )?;
        for (market, brier) in &self.market_brier {
            writeln!(f, "  {market} Brier: {brier:.3}")?;
        }
        for b in self.calibration_curve.iter().filter(|b| b.count > 0) {
            writeln!(
                f,
                "  [{:.1}, {:.1}) predicted {:.3} actual {:.3} (n={})",
                b.bin_start, b.bin_end, b.mean_predicted, b.actual_rate, b.count
            )?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Calibrator
// ---------------------------------------------------------------------------

pub struct Calibrator {
    points: Vec<CalibrationPoint>,
    num_bins: usize,
    /// Below this many points the diagnosis is `InsufficientData`.
    min_points: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibrator {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            num_bins: 10,
            min_points: 20,
        }
    }

    pub fn from_records(records: &[ClvRecord]) -> Self {
        let mut cal = Self::new();
        cal.add_points(records.iter().filter_map(CalibrationPoint::from_record).collect());
        cal
    }

    pub fn add_point(&mut self, point: CalibrationPoint) {
        self.points.push(point);
    }

    pub fn add_points(&mut self, points: Vec<CalibrationPoint>) {
        self.points.extend(points);
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn report(&self) -> CalibrationReport {
        if self.points.is_empty() {
            return CalibrationReport {
                total_predictions: 0,
                overall_brier: 0.0,
                market_brier: BTreeMap::new(),
                calibration_curve: Vec::new(),
                diagnosis: CalibrationDiagnosis::InsufficientData,
            };
        }

        let all: Vec<&CalibrationPoint> = self.points.iter().collect();
        let calibration_curve = self.compute_calibration_curve();

        CalibrationReport {
            total_predictions: self.points.len(),
            overall_brier: brier(&all),
            market_brier: self.compute_market_brier(),
            diagnosis: self.diagnose(),
            calibration_curve,
        }
    }

    fn compute_market_brier(&self) -> BTreeMap<Market, f64> {
        let mut by_market: BTreeMap<Market, Vec<&CalibrationPoint>> = BTreeMap::new();
        for p in &self.points {
            by_market.entry(p.market).or_default().push(p);
        }
        by_market
            .into_iter()
            .map(|(market, points)| (market, brier(&points)))
            .collect()
    }

    fn compute_calibration_curve(&self) -> Vec<CalibrationBucket> {
        let n = self.num_bins.max(1);
        let width = 1.0 / n as f64;

        // bin index -> (sum of predictions, wins, count)
        let mut tally: BTreeMap<usize, (f64, usize, usize)> = BTreeMap::new();
        for point in &self.points {
            let p = point.win_probability.clamp(0.0, 1.0);
            let bin = ((p * n as f64) as usize).min(n - 1);
            let entry = tally.entry(bin).or_default();
            entry.0 += p;
            entry.1 += usize::from(point.won);
            entry.2 += 1;
        }

        (0..n)
            .map(|i| {
                let bin_start = i as f64 * width;
                let bin_end = (i + 1) as f64 * width;
                match tally.get(&i) {
                    Some(&(sum, wins, count)) => {
                        let mean_predicted = sum / count as f64;
                        let actual_rate = wins as f64 / count as f64;
                        CalibrationBucket {
                            bin_start,
                            bin_end,
                            mean_predicted,
                            actual_rate,
                            count,
                            deviation: (mean_predicted - actual_rate).abs(),
                        }
                    }
                    None => CalibrationBucket {
                        bin_start,
                        bin_end,
                        mean_predicted: (bin_start + bin_end) / 2.0,
                        actual_rate: 0.0,
                        count: 0,
                        deviation: 0.0,
                    },
                }
            })
            .collect()
    }

    /// Staked plays all sit above 50%, so the diagnosis compares the mean
    /// predicted probability with the realized win rate.
    fn diagnose(&self) -> CalibrationDiagnosis {
        if self.points.len() < self.min_points {
            return CalibrationDiagnosis::InsufficientData;
        }
        let n = self.points.len() as f64;
        let predicted = self.points.iter().map(|p| p.win_probability).sum::<f64>() / n;
        let actual = self.points.iter().filter(|p| p.won).count() as f64 / n;

        if predicted - actual > TOLERANCE {
            CalibrationDiagnosis::OverConfident
        } else if actual - predicted > TOLERANCE {
            CalibrationDiagnosis::UnderConfident
        } else {
            CalibrationDiagnosis::WellCalibrated
        }
    }
}

/// Brier = (1/N) * Σ(predicted - outcome)². 0.25 is a coin flip at 50%.
fn brier(points: &[&CalibrationPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum: f64 = points
        .iter()
        .map(|p| {
            let outcome = if p.won { 1.0 } else { 0.0 };
            (p.win_probability - outcome).powi(2)
        })
        .sum();
    sum / points.len() as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

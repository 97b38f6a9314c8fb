//! Card plays followed through to settlement.

use chrono::Utc;
use uuid::Uuid;

use sharpline::backtest::{CalibrationDiagnosis, Calibrator, ClvState, ClvTracker};
use sharpline::config::{AppConfig, ModelConfig};
use sharpline::storage;
use sharpline::strategy::WeeklyPipeline;
use sharpline::types::{EngineError, LineQuote, Market, Outcome};

use crate::fixtures::{make_line, reference_slate};

fn quote(line: f64, price: i32) -> LineQuote {
    LineQuote {
        line,
        price,
        book_id: Some("book-a".to_string()),
        as_of: Utc::now(),
    }
}

#[test]
fn test_card_play_lifecycle() {
    let now = Utc::now();
    let (card, _) = WeeklyPipeline::new(AppConfig::default())
        .unwrap()
        .run(&reference_slate(now), now);
    let play = &card.plays()[0];

    let mut tracker = ClvTracker::new(&ModelConfig::default());
    let id = tracker.track(play);
    assert_eq!(tracker.get(id).unwrap().state, ClvState::Pending);

    tracker.place(id, quote(-2.5, -110)).unwrap();
    let closing = make_line(&play.game_id, Market::Spread, -3.0, -110, -110, now);
    let clv = tracker.grade(id, &closing).unwrap();
    assert!((clv - 0.5).abs() < 1e-9, "beating the close is positive CLV");

    let settled = tracker.settle(id, Outcome::Win).unwrap();
    assert_eq!(settled.state, ClvState::Settled);
    // 2.5 units at -110
    assert!((settled.profit_units.unwrap() - 2.5 * 100.0 / 110.0).abs() < 1e-9);

    let before = tracker.summary();
    assert_eq!(
        tracker.settle(id, Outcome::Loss).unwrap_err(),
        EngineError::DoubleSettlement { record_id: id }
    );
    let after = tracker.summary();
    assert_eq!(after.settled, before.settled);
    assert_eq!((after.wins, after.losses), (1, 0));
    assert!((after.profit_units - before.profit_units).abs() < 1e-12);
    assert_eq!(tracker.get(id).unwrap().outcome, Some(Outcome::Win));

    assert_eq!(
        tracker.settle(id, Outcome::Win).unwrap_err(),
        EngineError::DoubleSettlement { record_id: id }
    );
    let repeat = tracker.summary();
    assert_eq!(repeat.settled, before.settled);
    assert_eq!(repeat.wins, before.wins);
    assert!((repeat.profit_units - before.profit_units).abs() < 1e-12);
}

#[test]
fn test_negative_clv_when_line_moves_away() {
    let now = Utc::now();
    let (card, _) = WeeklyPipeline::new(AppConfig::default())
        .unwrap()
        .run(&reference_slate(now), now);

    let mut tracker = ClvTracker::new(&ModelConfig::default());
    let closing = make_line(&card.plays()[0].game_id, Market::Spread, -1.5, -110, -110, now);
    let id = tracker
        .record(&card.plays()[0], quote(-2.5, -110), &closing)
        .unwrap();
    let record = tracker.get(id).unwrap();
    assert_eq!(record.state, ClvState::Graded);
    assert!((record.clv_points.unwrap() + 1.0).abs() < 1e-9);
    assert!(!record.is_positive());
}

#[test]
fn test_records_persist_and_restore() {
    let now = Utc::now();
    let (card, _) = WeeklyPipeline::new(AppConfig::default())
        .unwrap()
        .run(&reference_slate(now), now);

    let mut tracker = ClvTracker::new(&ModelConfig::default());
    let closing = make_line(&card.plays()[0].game_id, Market::Spread, -3.5, -110, -110, now);
    let id = tracker
        .record(&card.plays()[0], quote(-2.5, -110), &closing)
        .unwrap();
    tracker.settle(id, Outcome::Push).unwrap();

    let path = std::env::temp_dir().join(format!("sharpline_clv_{}.json", Uuid::new_v4()));
    storage::save_clv_records(tracker.records(), &path).unwrap();
    let restored = ClvTracker::from_records(&ModelConfig::default(), storage::load_clv_records(&path).unwrap());
    std::fs::remove_file(&path).unwrap();

    let summary = restored.summary();
    assert_eq!(summary.settled, 1);
    assert_eq!(summary.pushes, 1);
    assert!((summary.mean_clv_points - 1.0).abs() < 1e-9);
    assert_eq!(summary.profit_units, 0.0);

    // Pushes carry no calibration signal.
    let report = Calibrator::from_records(restored.records()).report();
    assert_eq!(report.total_predictions, 0);
    assert_eq!(report.diagnosis, CalibrationDiagnosis::InsufficientData);
}

//! Full weekly runs: slate in, card out.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use sharpline::config::AppConfig;
use sharpline::storage;
use sharpline::strategy::card::{CardBuilder, ExclusionReason};
use sharpline::strategy::{DecisionRecord, WeeklyPipeline};
use sharpline::types::{
    Category, ConfidenceLevel, EngineError, Market, Recommendation, Side,
};

use crate::fixtures::{make_game, make_line, make_rating, reference_slate};

fn pipeline() -> WeeklyPipeline {
    WeeklyPipeline::new(AppConfig::default()).unwrap()
}

fn make_rec(game: &str, confidence: f64, stake: Decimal) -> Recommendation {
    Recommendation {
        id: Uuid::new_v4(),
        game_id: game.to_string(),
        market: Market::Spread,
        side: Side::Home,
        line: -3.0,
        price: -110,
        edge_points: 4.5,
        confidence,
        confidence_level: ConfidenceLevel::from_score(confidence),
        win_probability: 0.58,
        full_kelly: 0.12,
        stake_percent: stake,
        units: stake,
        stake_amount: stake * dec!(100),
        category: Category::Strong,
        expected_return_percent: 0.3,
        factors: Vec::new(),
        warnings: Vec::new(),
        degraded: false,
        created_at: Utc::now(),
    }
}

#[test]
fn test_reference_scenario() {
    let now = Utc::now();
    let (card, decisions) = pipeline().run(&reference_slate(now), now);

    assert_eq!(decisions.len(), 1);
    assert_eq!(card.plays().len(), 1);

    let play = &card.plays()[0];
    assert_eq!(play.side, Side::Home);
    assert!((play.edge_points - 2.5).abs() < 1e-9);
    assert_eq!(play.line, -2.5);
    assert_eq!(play.price, -110);
    assert_eq!(play.category, Category::Moderate);

    // Base 70.91 less the missing injury and sharp-action signals.
    let expected_confidence = 50.0 + 45.0 * (1.0 - (-2.5f64 / 4.0).exp()) - 4.0;
    assert!((play.confidence - expected_confidence).abs() < 1e-9);
    assert_eq!(play.confidence_level, ConfidenceLevel::Moderate);

    assert!((play.win_probability - 0.548_902).abs() < 1e-5);
    assert!((play.full_kelly - 0.052_694).abs() < 1e-5);
    assert_eq!(play.stake_percent, dec!(2.5));
    assert_eq!(play.units, dec!(2.5));
    assert_eq!(play.stake_amount, dec!(250));

    let summary = card.summary();
    assert_eq!(summary.total_plays, 1);
    assert_eq!(summary.capital_allocation_percent, dec!(2.5));
    assert_eq!(summary.by_category[&Category::Moderate], 1);
    assert!((summary.expected_portfolio_return - play.expected_return_percent).abs() < 1e-12);
    assert!(card.excluded().is_empty());
    assert!(card.conflicts().is_empty());
}

#[test]
fn test_portfolio_cap_excludes_lowest_ranked() {
    let builder = CardBuilder::new(Default::default(), Default::default());
    let recs = vec![
        make_rec("g-low", 60.0, dec!(3)),
        make_rec("g-high", 80.0, dec!(3)),
        make_rec("g-mid", 70.0, dec!(3)),
    ];
    let card = builder.build(2026, 7, recs, Vec::new());

    let ids: Vec<_> = card.plays().iter().map(|p| p.game_id.as_str()).collect();
    assert_eq!(ids, vec!["g-high", "g-mid"]);
    assert_eq!(card.summary().capital_allocation_percent, dec!(6));

    let excluded = &card.excluded()[0];
    assert_eq!(excluded.game_id, "g-low");
    assert!(matches!(excluded.reason, ExclusionReason::PortfolioCap { .. }));
}

#[test]
fn test_portfolio_cap_through_pipeline() {
    let now = Utc::now();
    let mut slate = reference_slate(now);
    slate.games.clear();
    slate.ratings.clear();
    slate.lines.clear();
    for (i, (home, away)) in [("BUF", "NYJ"), ("KC", "LV"), ("PHI", "NYG")].iter().enumerate() {
        let id = format!("g{i}");
        slate.games.push(make_game(&id, home, away, now));
        slate.ratings.push(make_rating(home, 95.0, None, now));
        slate.ratings.push(make_rating(away, 80.0, None, now));
        slate.lines.push(make_line(&id, Market::Spread, -3.0, -110, -110, now));
    }

    let (card, _) = pipeline().run(&slate, now);

    // Every play maxes out at 3%; the third would take the card to 9%.
    assert_eq!(card.plays().len(), 2);
    assert!(card.plays().iter().all(|p| p.stake_percent == dec!(3)));
    assert!(card.summary().capital_allocation_percent <= dec!(7.5));
    assert_eq!(
        card.excluded()
            .iter()
            .filter(|e| matches!(e.reason, ExclusionReason::PortfolioCap { .. }))
            .count(),
        1
    );
}

#[test]
fn test_coverage_gaps_are_listed() {
    let now = Utc::now();
    let mut slate = reference_slate(now);

    // No ratings at all.
    slate.games.push(make_game("g-missing", "NYJ", "MIA", now));
    slate.lines.push(make_line("g-missing", Market::Spread, -1.0, -110, -110, now));

    // Ratings past the hard age limit.
    slate.games.push(make_game("g-old", "DAL", "PHI", now));
    let mut old_home = make_rating("DAL", 84.0, None, now);
    old_home.as_of = now - Duration::days(30);
    slate.ratings.push(old_home);
    slate.ratings.push(make_rating("PHI", 90.0, None, now));
    slate.lines.push(make_line("g-old", Market::Spread, 3.0, -110, -110, now));

    let (card, decisions) = pipeline().run(&slate, now);

    assert_eq!(card.plays().len(), 1);
    for game in ["g-missing", "g-old"] {
        let ex = card
            .excluded()
            .iter()
            .find(|e| e.game_id == game)
            .unwrap_or_else(|| panic!("{game} not listed"));
        assert!(matches!(ex.reason, ExclusionReason::MissingData { .. }));
        assert!(decisions.iter().any(|d| matches!(
            d,
            DecisionRecord::Skipped { game_id, error: EngineError::MissingData { .. }, .. } if game_id == game
        )));
    }
    assert_eq!(card.summary().games_excluded, 2);
    let text = card.to_string();
    assert!(text.contains("g-missing"));
    assert!(text.contains("g-old"));
}

#[test]
fn test_stale_lines_degrade_confidence() {
    let now = Utc::now();
    let fresh_conf = pipeline().run(&reference_slate(now), now).0.plays()[0].confidence;

    let mut slate = reference_slate(now);
    slate.lines[0].as_of = now - Duration::hours(30);
    let (card, _) = pipeline().run(&slate, now);

    let play = &card.plays()[0];
    assert!(!play.warnings.is_empty());
    assert!(play.degraded);
    assert!(!card.warnings().is_empty());
    assert!((fresh_conf - play.confidence - 10.0).abs() < 1e-9);
    assert!(play.stake_percent <= dec!(2.5));
}

#[test]
fn test_multi_market_game() {
    let now = Utc::now();
    let mut slate = reference_slate(now);
    slate.ratings = vec![
        make_rating("BUF", 88.0, Some(27.0), now),
        make_rating("KC", 85.5, Some(24.0), now),
    ];
    let game = slate.games[0].id.clone();
    slate.lines.push(make_line(&game, Market::Total, 47.5, -110, -110, now));
    slate.lines.push(make_line(&game, Market::Moneyline, 0.0, -200, 170, now));

    let (card, decisions) = pipeline().run(&slate, now);

    assert_eq!(decisions.len(), 3);
    let total = card
        .plays()
        .iter()
        .find(|p| p.market == Market::Total)
        .expect("total play");
    assert_eq!(total.side, Side::Over);
    assert!((total.edge_points - 3.5).abs() < 1e-9);

    let mut keys: Vec<_> = card.plays().iter().map(|p| (p.game_id.clone(), p.market)).collect();
    let n = keys.len();
    keys.dedup();
    assert_eq!(keys.len(), n);
}

#[test]
fn test_invalid_config_aborts() {
    let cfg = AppConfig::from_toml_str("[bankroll]\nkelly_fraction = 1.5\n").unwrap();
    match WeeklyPipeline::new(cfg) {
        Err(EngineError::InvalidConfig(msg)) => assert!(msg.contains("kelly_fraction")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("invalid config accepted"),
    }
}

#[test]
fn test_card_versions_persisted() {
    let now = Utc::now();
    let dir = std::env::temp_dir().join(format!("sharpline_it_{}", Uuid::new_v4()));
    let pipeline = pipeline();
    let slate = reference_slate(now);

    let (first, _) = pipeline.run(&slate, now);
    storage::save_card(&first, &dir).unwrap();

    let previous = storage::latest_card(&dir, 2026, 7).unwrap().unwrap();
    let (second, _) = pipeline.rerun(&previous, &slate, now);
    storage::save_card(&second, &dir).unwrap();

    let latest = storage::latest_card(&dir, 2026, 7).unwrap().unwrap();
    assert_eq!(latest.version(), 2);
    assert_eq!(latest.supersedes(), Some(first.id()));
    assert_eq!(storage::load_card(dir.join(storage::card_file_name(2026, 7, 1))).unwrap().id(), first.id());

    std::fs::remove_dir_all(&dir).unwrap();
}

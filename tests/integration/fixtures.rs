//! Shared slate builders.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use sharpline::types::{Game, League, Market, MarketLine, PowerRating, Venue, WeeklySlate};

pub fn make_game(id: &str, home: &str, away: &str, now: DateTime<Utc>) -> Game {
    Game {
        id: id.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        kickoff: now + Duration::days(3),
        league: League::Nfl,
        venue: Venue::Outdoor,
        neutral_site: false,
    }
}

pub fn make_rating(team: &str, rating: f64, projected: Option<f64>, now: DateTime<Utc>) -> PowerRating {
    PowerRating {
        team_id: team.to_string(),
        rating,
        as_of: now - Duration::days(2),
        projected_points: projected,
    }
}

pub fn make_line(game_id: &str, market: Market, line: f64, price: i32, opposite: i32, now: DateTime<Utc>) -> MarketLine {
    MarketLine {
        game_id: game_id.to_string(),
        market,
        book_id: "book-a".to_string(),
        line,
        price,
        opposite_price: Some(opposite),
        as_of: now - Duration::hours(2),
    }
}

/// BUF 88.0 hosts KC 85.5; home -2.5 at -110.
pub fn reference_slate(now: DateTime<Utc>) -> WeeklySlate {
    WeeklySlate {
        season: 2026,
        week: 7,
        games: vec![make_game("2026-W07-KC-BUF", "BUF", "KC", now)],
        ratings: vec![
            make_rating("BUF", 88.0, None, now),
            make_rating("KC", 85.5, None, now),
        ],
        lines: vec![make_line("2026-W07-KC-BUF", Market::Spread, -2.5, -110, -110, now)],
        signals: HashMap::new(),
    }
}

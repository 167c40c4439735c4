use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::error::EventError;
use crate::roster::NameIndex;
use crate::types::{Corner, HistoryRecord, RatingSettings, RobotEntry, RobotMatchRef, WeightClassRoster};

/// How a fight ended. The label is what gets persisted in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FightOutcome {
    RedKo,
    RedJd,
    WhiteKo,
    WhiteJd,
    Draw,
}

impl FightOutcome {
    pub const ALL: [FightOutcome; 5] = [
        FightOutcome::RedKo,
        FightOutcome::RedJd,
        FightOutcome::WhiteKo,
        FightOutcome::WhiteJd,
        FightOutcome::Draw,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FightOutcome::RedKo => "Red wins KO",
            FightOutcome::RedJd => "Red wins JD",
            FightOutcome::WhiteKo => "White wins KO",
            FightOutcome::WhiteJd => "White wins JD",
            FightOutcome::Draw => "Draw",
        }
    }

    /// Actual score for the red corner: 1, 0.5 or 0.
    pub fn red_score(&self) -> f64 {
        match self {
            FightOutcome::RedKo | FightOutcome::RedJd => 1.0,
            FightOutcome::WhiteKo | FightOutcome::WhiteJd => 0.0,
            FightOutcome::Draw => 0.5,
        }
    }

    pub fn is_knockout(&self) -> bool {
        matches!(self, FightOutcome::RedKo | FightOutcome::WhiteKo)
    }

    pub fn winner(&self) -> Option<Corner> {
        match self {
            FightOutcome::RedKo | FightOutcome::RedJd => Some(Corner::Red),
            FightOutcome::WhiteKo | FightOutcome::WhiteJd => Some(Corner::White),
            FightOutcome::Draw => None,
        }
    }
}

impl fmt::Display for FightOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FightOutcome {
    type Err = EventError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_lowercase();
        FightOutcome::ALL
            .into_iter()
            .find(|outcome| outcome.label().to_lowercase() == wanted)
            .ok_or_else(|| EventError::UnknownOutcome(raw.to_string()))
    }
}

impl TryFrom<String> for FightOutcome {
    type Error = EventError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FightOutcome> for String {
    fn from(outcome: FightOutcome) -> String {
        outcome.label().to_string()
    }
}

/// Probability that a robot rated `rating_a` beats one rated `rating_b`.
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) / 400.0))
}

/// Rating deltas `(red, white)`. Knockouts move ratings `ko_weight` times
/// further than decisions; the pair always sums to zero.
pub fn rating_changes(red_rating: i32, white_rating: i32, outcome: FightOutcome, settings: &RatingSettings) -> (i32, i32) {
    let k = if outcome.is_knockout() {
        settings.k * settings.ko_weight
    } else {
        settings.k
    };
    let expected = expected_score(f64::from(red_rating), f64::from(white_rating));
    let change_red = (k * (outcome.red_score() - expected)).round() as i32;
    (change_red, -change_red)
}

fn corner_result(outcome: FightOutcome, corner: Corner) -> &'static str {
    match outcome.winner() {
        Some(winner) if winner == corner => "win",
        Some(_) => "loss",
        None => "draw",
    }
}

/// Applies a finished fight to a weight-class roster and returns the history
/// record that was appended.
///
/// Names are matched case-insensitively against the roster; robots that are
/// not on it yet are entered at the default rating.
pub fn record_fight(
    roster: &mut WeightClassRoster,
    red: &str,
    white: &str,
    outcome: FightOutcome,
    at: DateTime<Utc>,
) -> HistoryRecord {
    let names = NameIndex::for_roster(roster);
    let red = names.canonicalize(red);
    let white = names.canonicalize(white);

    let match_id = roster.allocate_match_id();
    let red_rating = roster.robots.entry(red.clone()).or_default().rating;
    let white_rating = roster.robots.entry(white.clone()).or_default().rating;
    let (change_red, change_white) = rating_changes(red_rating, white_rating, outcome, &roster.settings);

    for (name, opponent, corner, change) in [
        (&red, &white, Corner::Red, change_red),
        (&white, &red, Corner::White, change_white),
    ] {
        let entry = roster.robots.entry(name.clone()).or_insert_with(RobotEntry::default);
        entry.rating += change;
        entry.matches.push(RobotMatchRef {
            match_id,
            opponent: opponent.clone(),
            corner,
            result: corner_result(outcome, corner).to_string(),
            rating_change: change,
        });
    }

    let record = HistoryRecord {
        match_id: Some(match_id),
        red_corner: red.clone(),
        white_corner: white.clone(),
        result: outcome.label().to_string(),
        change_red,
        change_white,
        recorded_at: Some(at.to_rfc3339()),
    };
    roster.history.push(record.clone());

    info!(
        match_id,
        red = %red,
        white = %white,
        result = outcome.label(),
        change_red,
        change_white,
        "fight recorded"
    );
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap()
    }

    #[test]
    fn test_expected_score_symmetry() {
        assert!((expected_score(1000.0, 1000.0) - 0.5).abs() < 1e-12);
        let favourite = expected_score(1200.0, 1000.0);
        assert!(favourite > 0.75 && favourite < 0.77);
        assert!((favourite + expected_score(1000.0, 1200.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_even_decision_moves_sixteen_points() {
        let settings = RatingSettings::default();
        assert_eq!(rating_changes(1000, 1000, FightOutcome::RedJd, &settings), (16, -16));
        assert_eq!(rating_changes(1000, 1000, FightOutcome::WhiteJd, &settings), (-16, 16));
        assert_eq!(rating_changes(1000, 1000, FightOutcome::Draw, &settings), (0, 0));
    }

    #[test]
    fn test_knockout_weighs_more() {
        let settings = RatingSettings::default();
        assert_eq!(rating_changes(1000, 1000, FightOutcome::RedKo, &settings), (20, -20));
        let (ko, _) = rating_changes(1100, 1000, FightOutcome::RedKo, &settings);
        let (jd, _) = rating_changes(1100, 1000, FightOutcome::RedJd, &settings);
        assert!(ko > jd);
    }

    #[test]
    fn test_rating_changes_are_zero_sum() {
        let settings = RatingSettings { k: 24.0, ko_weight: 1.5 };
        for red in [800, 1000, 1234, 1500] {
            for white in [900, 1000, 1111, 1600] {
                for outcome in FightOutcome::ALL {
                    let (a, b) = rating_changes(red, white, outcome, &settings);
                    assert_eq!(a + b, 0, "{red} vs {white}: {outcome}");
                }
            }
        }
    }

    #[test]
    fn test_outcome_labels_parse_loosely() {
        assert_eq!("  red WINS jd ".parse::<FightOutcome>().unwrap(), FightOutcome::RedJd);
        assert_eq!("draw".parse::<FightOutcome>().unwrap(), FightOutcome::Draw);
        assert!(matches!(
            "Red wins on points".parse::<FightOutcome>(),
            Err(EventError::UnknownOutcome(_))
        ));
        let encoded = serde_json::to_value(FightOutcome::WhiteKo).unwrap();
        assert_eq!(encoded, "White wins KO");
    }

    #[test]
    fn test_record_fight_updates_roster() {
        let mut roster = WeightClassRoster::default();
        roster.robots.insert("Alpha".into(), RobotEntry::present());
        roster.robots.insert("Beta".into(), RobotEntry::present());

        let record = record_fight(&mut roster, "alpha", "Beta", FightOutcome::RedJd, fixed_time());
        assert_eq!(record.match_id, Some(1));
        assert_eq!(record.red_corner, "Alpha");
        assert_eq!((record.change_red, record.change_white), (16, -16));
        assert_eq!(record.recorded_at.as_deref(), Some("2024-06-01T20:00:00+00:00"));

        assert_eq!(roster.robots["Alpha"].rating, 1016);
        assert_eq!(roster.robots["Beta"].rating, 984);
        assert_eq!(roster.robots["Alpha"].matches[0].match_id, 1);
        assert_eq!(roster.robots["Alpha"].matches[0].result, "win");
        assert_eq!(roster.robots["Beta"].matches[0].corner, Corner::White);
        assert_eq!(roster.history, vec![record]);
        assert_eq!(roster.next_match_id, Some(2));
    }

    #[test]
    fn test_record_fight_recovers_id_and_adds_newcomers() {
        let mut roster: WeightClassRoster = serde_json::from_value(serde_json::json!({
            "robots": {"Gamma": {"rating": 1000}},
            "history": [{"match_id": 2}, {"match_id": "not-a-number"}, {"match_id": 7}]
        }))
        .unwrap();

        let record = record_fight(&mut roster, "Gamma", "Delta", FightOutcome::Draw, fixed_time());
        assert_eq!(record.match_id, Some(8));
        assert_eq!(roster.next_match_id, Some(9));
        assert_eq!(roster.history.len(), 4);
        assert_eq!(roster.robots["Delta"].rating, 1000);
        assert!(!roster.robots["Delta"].present);
        assert_eq!(roster.robots["Gamma"].matches[0].match_id, 8);
        assert_eq!(roster.robots["Gamma"].matches[0].result, "draw");
    }
}

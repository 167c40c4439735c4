use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::bracket::{seed_bracket, serialize_bracket, Bracket, BracketView, EliminationFormat};
use crate::error::EventError;
use crate::roster::present_robots;
use crate::types::WeightClassRoster;

/// Saved tournaments keyed by slug.
pub type TournamentBook = BTreeMap<String, TournamentRecord>;

fn default_elimination() -> String {
    EliminationFormat::Single.as_str().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TournamentRequest {
    pub name: String,
    pub weight_class: String,
    #[serde(default = "default_elimination")]
    pub elimination: String,
    #[serde(default)]
    pub max_robots: Option<usize>,
    #[serde(default)]
    pub robots: Vec<String>,
    /// Seed from the class's present robots instead of `robots`.
    #[serde(default)]
    pub use_present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentRecord {
    pub name: String,
    pub weight_class: String,
    pub elimination: EliminationFormat,
    pub max_robots: Option<usize>,
    pub robots: Vec<String>,
    pub bracket: Bracket,
    #[serde(default)]
    pub champion: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentSummary {
    pub slug: String,
    pub name: String,
    pub weight_class: String,
    pub elimination: EliminationFormat,
    pub max_robots: Option<usize>,
    pub robots: Vec<String>,
    pub champion: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentView {
    pub metadata: TournamentSummary,
    pub bracket: BracketView,
}

/// Lowercase ASCII slug: runs of anything else collapse to a single `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

pub fn create_tournament(
    request: &TournamentRequest,
    roster: &WeightClassRoster,
    at: DateTime<Utc>,
) -> Result<TournamentRecord, EventError> {
    let elimination: EliminationFormat = request.elimination.parse()?;
    let entrants = if request.use_present {
        present_robots(roster)
    } else {
        request.robots.clone()
    };
    let bracket = seed_bracket(&entrants, elimination, request.max_robots)?;

    info!(
        name = %request.name,
        weight_class = %request.weight_class,
        elimination = %elimination,
        entrants = bracket.selected.len(),
        "tournament created"
    );
    Ok(TournamentRecord {
        name: request.name.clone(),
        weight_class: request.weight_class.clone(),
        elimination,
        max_robots: request.max_robots,
        robots: bracket.selected.clone(),
        champion: bracket.champion().map(str::to_string),
        bracket,
        created_at: at.to_rfc3339(),
    })
}

/// Records a match result and refreshes the champion.
pub fn advance_tournament(record: &mut TournamentRecord, match_id: &str, winner: &str) -> Result<(), EventError> {
    record.bracket.record_match_result(match_id, winner)?;
    record.champion = record.bracket.champion().map(str::to_string);
    if let Some(champion) = &record.champion {
        info!(name = %record.name, champion = %champion, "tournament decided");
    }
    Ok(())
}

impl TournamentRecord {
    pub fn summary(&self, slug: &str) -> TournamentSummary {
        TournamentSummary {
            slug: slug.to_string(),
            name: self.name.clone(),
            weight_class: self.weight_class.clone(),
            elimination: self.elimination,
            max_robots: self.max_robots,
            robots: self.robots.clone(),
            champion: self.champion.clone(),
            created_at: self.created_at.clone(),
        }
    }

    pub fn view(&self, slug: &str) -> TournamentView {
        TournamentView {
            metadata: self.summary(slug),
            bracket: serialize_bracket(&self.bracket),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BracketError;
    use crate::types::RobotEntry;

    fn showdown_roster() -> WeightClassRoster {
        let mut roster = WeightClassRoster::default();
        for name in ["Dynamo", "Atlas", "Cyclone", "Blazer"] {
            roster.robots.insert(name.into(), RobotEntry::present());
        }
        roster.robots.insert("Echo".into(), RobotEntry::default());
        roster
    }

    fn request(body: serde_json::Value) -> TournamentRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Summer Showdown"), "summer-showdown");
        assert_eq!(slugify("  Ant -- Cup #3! "), "ant-cup-3");
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn test_tournament_creation_and_progression() {
        let req = request(serde_json::json!({
            "name": "Summer Showdown",
            "weight_class": "Antweight",
            "elimination": "single",
            "max_robots": 4,
            "use_present": true
        }));
        let mut record = create_tournament(&req, &showdown_roster(), Utc::now()).unwrap();
        assert_eq!(record.robots, vec!["Atlas", "Blazer", "Cyclone", "Dynamo"]);
        assert_eq!(record.champion, None);

        let view = record.view("summer-showdown");
        assert_eq!(view.metadata.name, "Summer Showdown");
        let first_match_id = view.bracket.order.winners[0][0].clone();
        let chosen = view.bracket.matches[&first_match_id].red.clone().unwrap();

        advance_tournament(&mut record, &first_match_id, &chosen).unwrap();
        let updated = record.view("summer-showdown");
        assert_eq!(updated.bracket.matches[&first_match_id].winner.as_deref(), Some(chosen.as_str()));

        advance_tournament(&mut record, "W2", "Cyclone").unwrap();
        assert_eq!(record.champion, None);
        advance_tournament(&mut record, "W3", "Cyclone").unwrap();
        assert_eq!(record.champion.as_deref(), Some("Cyclone"));
    }

    #[test]
    fn test_explicit_robot_list_and_defaults() {
        let req = request(serde_json::json!({
            "name": "Grudge",
            "weight_class": "Beetleweight",
            "robots": ["Zed", "Alpha"]
        }));
        assert_eq!(req.elimination, "single");
        let record = create_tournament(&req, &WeightClassRoster::default(), Utc::now()).unwrap();
        assert_eq!(record.robots, vec!["Zed", "Alpha"]);
        assert_eq!(record.bracket.order.finals, vec!["W1".to_string()]);
    }

    #[test]
    fn test_create_tournament_errors() {
        let bad_format = request(serde_json::json!({
            "name": "Odd",
            "weight_class": "Antweight",
            "elimination": "round-robin",
            "use_present": true
        }));
        assert!(matches!(
            create_tournament(&bad_format, &showdown_roster(), Utc::now()),
            Err(EventError::Bracket(BracketError::UnsupportedFormat(_)))
        ));

        let empty = request(serde_json::json!({
            "name": "Empty",
            "weight_class": "Antweight",
            "use_present": true
        }));
        assert!(matches!(
            create_tournament(&empty, &WeightClassRoster::default(), Utc::now()),
            Err(EventError::Bracket(BracketError::NotEnoughEntrants(0)))
        ));
    }

    #[test]
    fn test_advance_rejects_conflicting_result() {
        let req = request(serde_json::json!({
            "name": "Double Trouble",
            "weight_class": "Antweight",
            "elimination": "double",
            "use_present": true
        }));
        let mut record = create_tournament(&req, &showdown_roster(), Utc::now()).unwrap();
        advance_tournament(&mut record, "W1", "Atlas").unwrap();
        let err = advance_tournament(&mut record, "W1", "Blazer").unwrap_err();
        assert_eq!(err.to_string(), "Match W1 already has a different winner recorded (Atlas)");
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

// ── Constants ──────────────────────────────────────────────────────────

/// Intervening schedule slots before a robot may fight again. 1 means no back-to-back.
pub const DEFAULT_COOLDOWN_MATCHES: usize = 1;
pub const DEFAULT_FIGHTS_PER_ROBOT: u32 = 1;
pub const DEFAULT_RATING: i32 = 1000;
pub const DEFAULT_K: f64 = 32.0;
pub const KO_WEIGHT: f64 = 1.25;
pub const DEFAULT_WEIGHT_CLASSES: &[&str] = &["Antweight", "Beetleweight", "Hobbyweight"];

pub const SCHEDULE_KEY: &str = "schedule";
pub const JUDGING_KEY: &str = "judging";
pub const TOURNAMENTS_KEY: &str = "tournaments";

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedStore<S> = Arc<Mutex<S>>;

/// Per-class rosters keyed by weight class name.
pub type RosterSet = BTreeMap<String, WeightClassRoster>;

// ── Roster domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corner {
    Red,
    White,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSettings {
    #[serde(rename = "K", default = "default_k")]
    pub k: f64,
    #[serde(default = "default_ko_weight")]
    pub ko_weight: f64,
}

impl Default for RatingSettings {
    fn default() -> Self {
        RatingSettings {
            k: DEFAULT_K,
            ko_weight: KO_WEIGHT,
        }
    }
}

fn default_k() -> f64 {
    DEFAULT_K
}

fn default_ko_weight() -> f64 {
    KO_WEIGHT
}

fn default_rating() -> i32 {
    DEFAULT_RATING
}

/// A fight as seen from one robot's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotMatchRef {
    pub match_id: u64,
    pub opponent: String,
    pub corner: Corner,
    pub result: String,
    pub rating_change: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotEntry {
    #[serde(default)]
    pub present: bool,
    #[serde(default = "default_rating")]
    pub rating: i32,
    #[serde(default)]
    pub matches: Vec<RobotMatchRef>,
}

impl Default for RobotEntry {
    fn default() -> Self {
        RobotEntry {
            present: false,
            rating: DEFAULT_RATING,
            matches: Vec::new(),
        }
    }
}

impl RobotEntry {
    pub fn present() -> Self {
        RobotEntry {
            present: true,
            ..RobotEntry::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Older data files occasionally carry non-numeric ids; those read back as `None`.
    #[serde(default, deserialize_with = "lenient_match_id")]
    pub match_id: Option<u64>,
    #[serde(default)]
    pub red_corner: String,
    #[serde(default)]
    pub white_corner: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub change_red: i32,
    #[serde(default)]
    pub change_white: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
}

impl HistoryRecord {
    pub fn between(red: &str, white: &str) -> Self {
        HistoryRecord {
            red_corner: red.to_string(),
            white_corner: white.to_string(),
            ..HistoryRecord::default()
        }
    }
}

fn lenient_match_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightClassRoster {
    #[serde(default)]
    pub robots: BTreeMap<String, RobotEntry>,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_match_id: Option<u64>,
    #[serde(default)]
    pub settings: RatingSettings,
}

impl WeightClassRoster {
    /// Hands out the next history id, recovering from a missing or stale counter.
    pub fn allocate_match_id(&mut self) -> u64 {
        let max_existing = self
            .history
            .iter()
            .filter_map(|entry| entry.match_id)
            .max()
            .unwrap_or(0);
        let id = match self.next_match_id {
            Some(next) if next > max_existing => next,
            _ => max_existing + 1,
        };
        self.next_match_id = Some(id + 1);
        id
    }
}

// ── Schedule types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledFight {
    pub weight_class: String,
    pub red: String,
    pub white: String,
}

impl ScheduledFight {
    pub fn involves_pair(&self, weight_class: &str, a: &str, b: &str) -> bool {
        self.weight_class == weight_class
            && ((self.red == a && self.white == b) || (self.red == b && self.white == a))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePayload {
    #[serde(default)]
    pub list: Vec<ScheduledFight>,
}

/// Unordered pairing inside one weight class; `a < b` always.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub weight_class: String,
    pub a: String,
    pub b: String,
}

impl PairKey {
    pub fn new(weight_class: &str, x: &str, y: &str) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        PairKey {
            weight_class: weight_class.to_string(),
            a: a.to_string(),
            b: b.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_match_id_recovers_missing_counter() {
        let roster: WeightClassRoster = serde_json::from_value(serde_json::json!({
            "robots": {},
            "history": [
                {"match_id": 2},
                {"match_id": "not-a-number"},
                {"match_id": 7}
            ]
        }))
        .unwrap();
        let mut roster = roster;
        assert_eq!(roster.history[1].match_id, None);
        assert_eq!(roster.allocate_match_id(), 8);
        assert_eq!(roster.next_match_id, Some(9));
        assert_eq!(roster.allocate_match_id(), 9);
    }

    #[test]
    fn test_allocate_match_id_ignores_stale_counter() {
        let mut roster = WeightClassRoster {
            next_match_id: Some(3),
            ..WeightClassRoster::default()
        };
        roster.history.push(HistoryRecord {
            match_id: Some(5),
            ..HistoryRecord::default()
        });
        assert_eq!(roster.allocate_match_id(), 6);
    }

    #[test]
    fn test_pair_key_orders_names() {
        let key = PairKey::new("Antweight", "Zed", "Alpha");
        assert_eq!(key.a, "Alpha");
        assert_eq!(key.b, "Zed");
        assert_eq!(key, PairKey::new("Antweight", "Alpha", "Zed"));
    }

    #[test]
    fn test_rating_settings_use_capital_k() {
        let settings: RatingSettings = serde_json::from_str(r#"{"K": 24, "ko_weight": 1.5}"#).unwrap();
        assert_eq!(settings.k, 24.0);
        let encoded = serde_json::to_value(RatingSettings::default()).unwrap();
        assert_eq!(encoded["K"], 32.0);
    }
}

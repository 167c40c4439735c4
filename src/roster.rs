use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;
use unicode_normalization::UnicodeNormalization;

use crate::error::EventError;
use crate::rating::FightOutcome;
use crate::types::{PairKey, RobotEntry, RosterSet, WeightClassRoster};

/// NFKC-normalize and trim a robot name.
pub fn normalize_name(raw: &str) -> String {
    raw.nfkc().collect::<String>().trim().to_string()
}

fn fold_key(name: &str) -> String {
    name.to_lowercase()
}

/// Canonical spelling table for one weight class.
///
/// Names that differ only by case (after normalization) collapse onto the
/// lexicographically smallest spelling, so presence and history agree on the
/// same key for a robot whose display name drifted.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    by_fold: HashMap<String, String>,
}

impl NameIndex {
    pub fn from_names<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let normalized: BTreeSet<String> = names
            .into_iter()
            .map(normalize_name)
            .filter(|name| !name.is_empty())
            .collect();
        let mut by_fold = HashMap::new();
        for name in normalized {
            by_fold.entry(fold_key(&name)).or_insert(name);
        }
        NameIndex { by_fold }
    }

    pub fn for_roster(roster: &WeightClassRoster) -> Self {
        NameIndex::from_names(roster.robots.keys().map(String::as_str))
    }

    /// Roster spelling for `raw` if one matches case-insensitively, else the normalized raw name.
    pub fn canonicalize(&self, raw: &str) -> String {
        let normalized = normalize_name(raw);
        if normalized.is_empty() {
            return normalized;
        }
        self.by_fold
            .get(&fold_key(&normalized))
            .cloned()
            .unwrap_or(normalized)
    }
}

/// Present robots of one class in canonical spelling, sorted and de-duplicated.
pub fn present_robots(roster: &WeightClassRoster) -> Vec<String> {
    let names = NameIndex::for_roster(roster);
    let contenders: BTreeSet<String> = roster
        .robots
        .iter()
        .filter(|(_, entry)| entry.present)
        .map(|(name, _)| names.canonicalize(name))
        .filter(|name| !name.is_empty())
        .collect();
    contenders.into_iter().collect()
}

/// Present robots per weight class.
/// Classes with fewer than two present robots are left out.
pub fn collect_present(rosters: &RosterSet) -> BTreeMap<String, Vec<String>> {
    rosters
        .iter()
        .map(|(weight_class, roster)| (weight_class.clone(), present_robots(roster)))
        .filter(|(_, contenders)| contenders.len() >= 2)
        .collect()
}

/// How many times each pair has met before, keyed by `(class, a, b)` with `a < b`.
pub fn history_counts(rosters: &RosterSet) -> HashMap<PairKey, u32> {
    let mut counts = HashMap::new();
    for (weight_class, roster) in rosters {
        let names = NameIndex::for_roster(roster);
        for entry in &roster.history {
            let a = names.canonicalize(&entry.red_corner);
            let b = names.canonicalize(&entry.white_corner);
            if a.is_empty() || b.is_empty() {
                continue;
            }
            *counts.entry(PairKey::new(weight_class, &a, &b)).or_insert(0) += 1;
        }
    }
    counts
}

/// Enters a robot at the default rating and returns its roster spelling.
/// A robot already on the roster under any casing is left as it is.
pub fn add_robot(roster: &mut WeightClassRoster, raw: &str) -> Result<String, EventError> {
    let name = NameIndex::for_roster(roster).canonicalize(raw);
    if name.is_empty() {
        return Err(EventError::Config("Robot name must be provided".to_string()));
    }
    if !roster.robots.contains_key(&name) {
        roster.robots.insert(name.clone(), RobotEntry::default());
        info!(robot = %name, "robot added");
    }
    Ok(name)
}

/// Checks a robot in or out for tonight. Returns its roster spelling.
pub fn set_presence(roster: &mut WeightClassRoster, raw: &str, present: bool) -> Result<String, EventError> {
    let name = NameIndex::for_roster(roster).canonicalize(raw);
    let entry = roster
        .robots
        .get_mut(&name)
        .ok_or_else(|| EventError::UnknownRobot(raw.trim().to_string()))?;
    if entry.present != present {
        entry.present = present;
        info!(robot = %name, present, "presence changed");
    }
    Ok(name)
}

/// Win/loss record of one robot. `rating` is `None` when the robot is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RobotStats {
    pub name: String,
    pub rating: Option<i32>,
    pub present: bool,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub ko_wins: u32,
    pub ko_losses: u32,
}

/// Tallies a robot's fights. Pass `None` for a weight class that does not
/// exist; the result is then an empty record under the given name.
pub fn robot_stats(roster: Option<&WeightClassRoster>, raw: &str) -> RobotStats {
    let mut stats = RobotStats {
        name: normalize_name(raw),
        ..RobotStats::default()
    };
    let Some(roster) = roster else {
        return stats;
    };
    let name = NameIndex::for_roster(roster).canonicalize(raw);
    let Some(entry) = roster.robots.get(&name) else {
        return stats;
    };
    stats.name = name;
    stats.rating = Some(entry.rating);
    stats.present = entry.present;

    let knockouts: HashMap<u64, bool> = roster
        .history
        .iter()
        .filter_map(|record| {
            let outcome = record.result.parse::<FightOutcome>().ok()?;
            Some((record.match_id?, outcome.is_knockout()))
        })
        .collect();
    for fight in &entry.matches {
        let knockout = knockouts.get(&fight.match_id).copied().unwrap_or(false);
        match fight.result.as_str() {
            "win" => {
                stats.wins += 1;
                stats.ko_wins += u32::from(knockout);
            }
            "loss" => {
                stats.losses += 1;
                stats.ko_losses += u32::from(knockout);
            }
            "draw" => stats.draws += 1,
            _ => {}
        }
    }
    stats
}

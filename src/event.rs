use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::{EventError, JudgingError};
use crate::judging::{decide, Decision, JudgeScorecard};
use crate::rating::record_fight;
use crate::types::{HistoryRecord, RosterSet, ScheduledFight, SchedulePayload, WeightClassRoster};

/// The fight on the table right now, plus whatever the judges have submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgedMatch {
    pub match_id: String,
    pub weight_class: String,
    pub red: String,
    pub white: String,
    /// Scorecards keyed by judge id.
    #[serde(default)]
    pub judges: BTreeMap<String, JudgeScorecard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_match_id: Option<u64>,
}

impl JudgedMatch {
    pub fn from_fight(match_id: &str, fight: &ScheduledFight) -> Self {
        JudgedMatch {
            match_id: match_id.to_string(),
            weight_class: fight.weight_class.clone(),
            red: fight.red.clone(),
            white: fight.white.clone(),
            judges: BTreeMap::new(),
            result: None,
            history_match_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMeta {
    #[serde(default)]
    pub version: u64,
    /// Unix milliseconds of the last change.
    #[serde(default)]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgingState {
    #[serde(default)]
    pub current: Option<JudgedMatch>,
    #[serde(default)]
    pub history: Vec<JudgedMatch>,
    #[serde(rename = "_meta", default)]
    pub meta: StateMeta,
}

impl JudgingState {
    pub fn version(&self) -> u64 {
        self.meta.version
    }

    /// Puts a fight up for judging, replacing whatever was there.
    pub fn begin_match(&mut self, match_id: &str, fight: &ScheduledFight) {
        if let Some(previous) = &self.current {
            warn!(match_id = %previous.match_id, "replacing a match that was never finalized");
        }
        self.current = Some(JudgedMatch::from_fight(match_id, fight));
    }

    pub fn submit_scorecard(&mut self, card: JudgeScorecard) -> Result<(), JudgingError> {
        let current = self.current.as_mut().ok_or(JudgingError::NoCurrentMatch)?;
        current.judges.insert(card.judge_id.to_string(), card);
        Ok(())
    }
}

/// Applies `mutate` and bumps the version only when the state actually changed.
/// Returns whether it did.
pub fn update_judging_state<F>(state: &mut JudgingState, at: DateTime<Utc>, mutate: F) -> bool
where
    F: FnOnce(&mut JudgingState),
{
    let before = state.clone();
    mutate(state);
    state.meta = before.meta.clone();
    if *state == before {
        return false;
    }
    state.meta.version = before.meta.version + 1;
    state.meta.updated_at = at.timestamp_millis();
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedFight {
    pub decision: Decision,
    pub record: HistoryRecord,
    pub removed_from_schedule: bool,
}

fn roster_for<'a>(rosters: &'a mut RosterSet, weight_class: &str) -> Result<&'a mut WeightClassRoster, EventError> {
    rosters
        .iter_mut()
        .find(|(name, _)| name.eq_ignore_ascii_case(weight_class))
        .map(|(_, roster)| roster)
        .ok_or_else(|| EventError::UnknownWeightClass(weight_class.to_string()))
}

/// Settles the current match from its scorecards.
///
/// The fight is recorded in its class roster, its schedule entry is removed,
/// and the match moves into the judging history. Nothing is touched when the
/// decision or the weight-class lookup fails.
pub fn finalize_current_match(
    state: &mut JudgingState,
    schedule: &mut SchedulePayload,
    rosters: &mut RosterSet,
    at: DateTime<Utc>,
) -> Result<FinalizedFight, EventError> {
    let current = state.current.clone().ok_or(JudgingError::NoCurrentMatch)?;
    let decision = decide(current.judges.values())?;
    let roster = roster_for(rosters, &current.weight_class)?;
    let record = record_fight(roster, &current.red, &current.white, decision.outcome, at);

    let position = schedule
        .list
        .iter()
        .position(|fight| fight.involves_pair(&current.weight_class, &current.red, &current.white));
    if let Some(idx) = position {
        schedule.list.remove(idx);
    }

    let mut finished = current;
    finished.result = Some(decision.outcome.label().to_string());
    finished.history_match_id = record.match_id;
    let match_id = finished.match_id.clone();
    update_judging_state(state, at, move |s| {
        s.current = None;
        s.history.push(finished);
    });

    info!(
        match_id = %match_id,
        result = decision.outcome.label(),
        removed_from_schedule = position.is_some(),
        version = state.meta.version,
        "match finalized"
    );
    Ok(FinalizedFight {
        decision,
        record,
        removed_from_schedule: position.is_some(),
    })
}

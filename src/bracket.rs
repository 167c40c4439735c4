use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::BracketError;
use crate::types::Corner;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EliminationFormat {
  Single,
  Double,
}

impl EliminationFormat {
  pub fn as_str(&self) -> &'static str {
    match self {
      EliminationFormat::Single => "single",
      EliminationFormat::Double => "double",
    }
  }
}

impl fmt::Display for EliminationFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EliminationFormat {
  type Err = BracketError;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    match raw.trim().to_lowercase().as_str() {
      "single" => Ok(EliminationFormat::Single),
      "double" => Ok(EliminationFormat::Double),
      _ => Err(BracketError::UnsupportedFormat(raw.to_string())),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BracketSection {
  Winners,
  Losers,
  Finals,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  Winner,
  Loser,
}

/// Where one side of a match comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Source {
  Seed { index: usize },
  Match {
    #[serde(rename = "match")]
    match_id: String,
    result: Outcome,
  },
}

impl Source {
  pub fn seed(index: usize) -> Self {
    Source::Seed { index }
  }

  pub fn winner_of(match_id: &str) -> Self {
    Source::Match {
      match_id: match_id.to_string(),
      result: Outcome::Winner,
    }
  }

  pub fn loser_of(match_id: &str) -> Self {
    Source::Match {
      match_id: match_id.to_string(),
      result: Outcome::Loser,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSources {
  pub red: Source,
  pub white: Source,
}

impl MatchSources {
  pub fn get(&self, corner: Corner) -> &Source {
    match corner {
      Corner::Red => &self.red,
      Corner::White => &self.white,
    }
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
  pub winner: Option<String>,
  pub loser: Option<String>,
}

impl MatchResult {
  pub fn get(&self, outcome: Outcome) -> Option<&String> {
    match outcome {
      Outcome::Winner => self.winner.as_ref(),
      Outcome::Loser => self.loser.as_ref(),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
  #[serde(rename = "match")]
  pub match_id: String,
  pub slot: Corner,
}

/// Downstream consumers of a match's outcomes. Kept for traceability only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTargets {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub winner: Vec<TargetRef>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub loser: Vec<TargetRef>,
}

impl MatchTargets {
  fn bucket_mut(&mut self, outcome: Outcome) -> &mut Vec<TargetRef> {
    match outcome {
      Outcome::Winner => &mut self.winner,
      Outcome::Loser => &mut self.loser,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketMatch {
  pub id: String,
  #[serde(rename = "bracket")]
  pub section: BracketSection,
  pub round: u32,
  pub sources: MatchSources,
  #[serde(default)]
  pub result: MatchResult,
  #[serde(default)]
  pub targets: MatchTargets,
}

impl BracketMatch {
  pub fn is_decided(&self) -> bool {
    self.result.winner.is_some()
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketOrder {
  pub winners: Vec<Vec<String>>,
  pub losers: Vec<Vec<String>>,
  pub finals: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
  pub format: EliminationFormat,
  pub max_robots: Option<usize>,
  pub selected: Vec<String>,
  pub participants: Vec<Option<String>>,
  pub matches: BTreeMap<String, BracketMatch>,
  pub order: BracketOrder,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MatchParticipants {
  pub red: Option<String>,
  pub white: Option<String>,
}

impl MatchParticipants {
  pub fn get(&self, corner: Corner) -> Option<&str> {
    match corner {
      Corner::Red => self.red.as_deref(),
      Corner::White => self.white.as_deref(),
    }
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.red.as_deref().into_iter().chain(self.white.as_deref())
  }

  pub fn contains(&self, name: &str) -> bool {
    self.names().any(|candidate| candidate == name)
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum SlotResolution {
  Ready(String),
  Pending,
  Empty,
}

// ── Building ───────────────────────────────────────────────────────────

#[derive(Default)]
struct MatchGraph {
  matches: BTreeMap<String, BracketMatch>,
}

impl MatchGraph {
  fn push(&mut self, id: String, section: BracketSection, round: u32, red: Source, white: Source) -> String {
    self.register_target(&red, &id, Corner::Red);
    self.register_target(&white, &id, Corner::White);
    self.matches.insert(
      id.clone(),
      BracketMatch {
        id: id.clone(),
        section,
        round,
        sources: MatchSources { red, white },
        result: MatchResult::default(),
        targets: MatchTargets::default(),
      },
    );
    id
  }

  fn register_target(&mut self, source: &Source, target_id: &str, slot: Corner) {
    let Source::Match { match_id, result } = source else {
      return;
    };
    let Some(upstream) = self.matches.get_mut(match_id) else {
      return;
    };
    let entry = TargetRef {
      match_id: target_id.to_string(),
      slot,
    };
    let bucket = upstream.targets.bucket_mut(*result);
    if !bucket.contains(&entry) {
      bucket.push(entry);
    }
  }
}

fn build_winners_rounds(graph: &mut MatchGraph, slot_count: usize) -> Vec<Vec<String>> {
  let mut counter = 1u32;
  let mut current = Vec::with_capacity(slot_count / 2);
  for idx in (0..slot_count).step_by(2) {
    let id = graph.push(
      format!("W{counter}"),
      BracketSection::Winners,
      1,
      Source::seed(idx),
      Source::seed(idx + 1),
    );
    counter += 1;
    current.push(id);
  }

  let mut rounds = vec![current.clone()];
  let mut round = 1u32;
  while current.len() > 1 {
    round += 1;
    let mut next = Vec::with_capacity(current.len() / 2);
    for pair in current.chunks(2) {
      let id = graph.push(
        format!("W{counter}"),
        BracketSection::Winners,
        round,
        Source::winner_of(&pair[0]),
        Source::winner_of(&pair[1]),
      );
      counter += 1;
      next.push(id);
    }
    rounds.push(next.clone());
    current = next;
  }
  rounds
}

/// Builds the losers bracket fed by each winners round, returning its rounds
/// and the source of the sole losers-bracket survivor.
fn build_losers_rounds(graph: &mut MatchGraph, winners_rounds: &[Vec<String>]) -> (Vec<Vec<String>>, Option<Source>) {
  let mut counter = 1u32;
  let mut round = 0u32;
  let mut rounds = Vec::new();
  let mut carry: Vec<Source> = Vec::new();
  let mut feeds = winners_rounds.iter();

  loop {
    let dropped: Vec<Source> = match feeds.next() {
      Some(win_round) => win_round.iter().map(|id| Source::loser_of(id)).collect(),
      None if carry.len() > 1 => Vec::new(),
      None => break,
    };
    round += 1;

    let mut entries = std::mem::take(&mut carry).into_iter().chain(dropped);
    let mut round_ids = Vec::new();
    let mut leftover = None;
    loop {
      match (entries.next(), entries.next()) {
        (Some(red), Some(white)) => {
          let id = graph.push(format!("L{counter}"), BracketSection::Losers, round, red, white);
          counter += 1;
          round_ids.push(id);
        }
        (Some(single), None) => {
          leftover = Some(single);
          break;
        }
        _ => break,
      }
    }

    carry = round_ids.iter().map(|id| Source::winner_of(id)).collect();
    carry.extend(leftover);
    if !round_ids.is_empty() {
      rounds.push(round_ids);
    }
  }

  (rounds, carry.into_iter().next())
}

/// Seeds a bracket in input order, padding to the next power of two with byes.
///
/// `max_robots` truncates the list when positive. Byes are advanced before
/// the bracket is returned.
pub fn seed_bracket<I, S>(robots: I, format: EliminationFormat, max_robots: Option<usize>) -> Result<Bracket, BracketError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut selected: Vec<String> = robots
    .into_iter()
    .map(|name| name.as_ref().to_string())
    .filter(|name| !name.trim().is_empty())
    .collect();
  if let Some(cap) = max_robots.filter(|cap| *cap > 0) {
    selected.truncate(cap);
  }
  if selected.len() < 2 {
    return Err(BracketError::NotEnoughEntrants(selected.len()));
  }

  let size = selected.len().next_power_of_two();
  let mut participants: Vec<Option<String>> = selected.iter().cloned().map(Some).collect();
  participants.resize(size, None);

  let mut graph = MatchGraph::default();
  let winners = build_winners_rounds(&mut graph, size);
  let winners_final = winners
    .last()
    .and_then(|round| round.first())
    .cloned()
    .ok_or(BracketError::NotEnoughEntrants(selected.len()))?;

  let mut order = BracketOrder::default();
  match format {
    EliminationFormat::Single => {
      order.finals = vec![winners_final];
    }
    EliminationFormat::Double => {
      let (losers, survivor) = build_losers_rounds(&mut graph, &winners);
      let challenger = survivor.unwrap_or_else(|| Source::loser_of(&winners_final));
      let final_id = graph.push(
        "GF1".to_string(),
        BracketSection::Finals,
        1,
        Source::winner_of(&winners_final),
        challenger,
      );
      order.losers = losers;
      order.finals = vec![final_id];
    }
  }
  order.winners = winners;

  let mut bracket = Bracket {
    format,
    max_robots,
    selected,
    participants,
    matches: graph.matches,
    order,
  };
  let byes = bracket.advance_byes();
  info!(
    format = %format,
    entrants = bracket.selected.len(),
    slots = size,
    matches = bracket.matches.len(),
    byes,
    "bracket seeded"
  );
  Ok(bracket)
}

// ── Resolution & progression ───────────────────────────────────────────

impl Bracket {
  pub fn match_by_id(&self, match_id: &str) -> Result<&BracketMatch, BracketError> {
    self
      .matches
      .get(match_id)
      .ok_or_else(|| BracketError::UnknownMatch(match_id.to_string()))
  }

  /// Current red/white robots of a match; either side may still be unknown.
  pub fn resolve_match_participants(&self, match_id: &str) -> Result<MatchParticipants, BracketError> {
    let bracket_match = self.match_by_id(match_id)?;
    Ok(MatchParticipants {
      red: self.resolve_source(&bracket_match.sources.red),
      white: self.resolve_source(&bracket_match.sources.white),
    })
  }

  fn resolve_source(&self, source: &Source) -> Option<String> {
    match source {
      Source::Seed { index } => self.participants.get(*index).cloned().flatten(),
      Source::Match { match_id, result } => self
        .matches
        .get(match_id)
        .and_then(|upstream| upstream.result.get(*result).cloned()),
    }
  }

  fn slot_resolution(&self, source: &Source) -> SlotResolution {
    match source {
      Source::Seed { index } => match self.participants.get(*index).cloned().flatten() {
        Some(name) => SlotResolution::Ready(name),
        None => SlotResolution::Empty,
      },
      Source::Match { match_id, result } => {
        let Some(upstream) = self.matches.get(match_id) else {
          return SlotResolution::Empty;
        };
        if upstream.is_decided() {
          return match upstream.result.get(*result) {
            Some(name) => SlotResolution::Ready(name.clone()),
            None => SlotResolution::Empty,
          };
        }
        if self.is_void(upstream) {
          SlotResolution::Empty
        } else {
          SlotResolution::Pending
        }
      }
    }
  }

  /// An undecided match whose two sides can never be filled.
  fn is_void(&self, bracket_match: &BracketMatch) -> bool {
    !bracket_match.is_decided()
      && self.slot_resolution(&bracket_match.sources.red) == SlotResolution::Empty
      && self.slot_resolution(&bracket_match.sources.white) == SlotResolution::Empty
  }

  /// Records `winner` for a match, then advances any byes it unlocks.
  ///
  /// Repeating the recorded winner is a no-op; naming a different one is a
  /// conflict. Nothing is written when validation fails.
  pub fn record_match_result(&mut self, match_id: &str, winner: &str) -> Result<&BracketMatch, BracketError> {
    if self.write_result(match_id, winner)? {
      let advanced = self.advance_byes();
      info!(match_id, winner, byes_advanced = advanced, "match result recorded");
    } else {
      debug!(match_id, winner, "result already recorded");
    }
    self.match_by_id(match_id)
  }

  /// One validated write, no cascade. Returns whether anything changed.
  fn write_result(&mut self, match_id: &str, winner: &str) -> Result<bool, BracketError> {
    if winner.trim().is_empty() {
      return Err(BracketError::MissingWinner);
    }
    let current = self.match_by_id(match_id)?;
    if let Some(existing) = current.result.winner.as_deref() {
      if existing == winner {
        return Ok(false);
      }
      return Err(BracketError::WinnerConflict {
        match_id: match_id.to_string(),
        existing: existing.to_string(),
      });
    }

    let participants = self.resolve_match_participants(match_id)?;
    if !participants.contains(winner) {
      return Err(BracketError::NotAParticipant {
        match_id: match_id.to_string(),
        winner: winner.to_string(),
      });
    }
    let sources = current.sources.clone();
    let pending = [&sources.red, &sources.white]
      .into_iter()
      .any(|source| self.slot_resolution(source) == SlotResolution::Pending);
    if pending {
      return Err(BracketError::OpponentPending {
        match_id: match_id.to_string(),
      });
    }
    let loser = participants.names().find(|name| *name != winner).map(str::to_string);

    let bracket_match = self
      .matches
      .get_mut(match_id)
      .ok_or_else(|| BracketError::UnknownMatch(match_id.to_string()))?;
    bracket_match.result.winner = Some(winner.to_string());
    bracket_match.result.loser = loser;
    Ok(true)
  }

  /// Resolves every match that has exactly one robot and no way to get a
  /// second, repeating until a pass changes nothing. Returns how many matches
  /// were advanced.
  pub fn advance_byes(&mut self) -> usize {
    let mut advanced = 0;
    loop {
      let mut progressed = false;
      let ids: Vec<String> = self.matches.keys().cloned().collect();
      for id in ids {
        let sole = {
          let Some(bracket_match) = self.matches.get(&id) else {
            continue;
          };
          if bracket_match.is_decided() {
            continue;
          }
          match (
            self.slot_resolution(&bracket_match.sources.red),
            self.slot_resolution(&bracket_match.sources.white),
          ) {
            (SlotResolution::Ready(name), SlotResolution::Empty) => name,
            (SlotResolution::Empty, SlotResolution::Ready(name)) => name,
            _ => continue,
          }
        };
        match self.write_result(&id, &sole) {
          Ok(true) => {
            debug!(match_id = %id, robot = %sole, "bye advanced");
            advanced += 1;
            progressed = true;
          }
          Ok(false) => {}
          Err(err) => warn!(match_id = %id, error = %err, "bye could not be advanced"),
        }
      }
      if !progressed {
        break;
      }
    }
    advanced
  }

  /// Match ids in play order: winners rounds, losers rounds, finals.
  pub fn ordered_match_ids(&self) -> impl Iterator<Item = &String> {
    self
      .order
      .winners
      .iter()
      .flatten()
      .chain(self.order.losers.iter().flatten())
      .chain(self.order.finals.iter())
  }

  /// Undecided matches with both robots known, in play order.
  pub fn ready_matches(&self) -> Vec<&str> {
    self
      .ordered_match_ids()
      .filter(|id| {
        let Some(bracket_match) = self.matches.get(*id) else {
          return false;
        };
        !bracket_match.is_decided()
          && matches!(
            (
              self.slot_resolution(&bracket_match.sources.red),
              self.slot_resolution(&bracket_match.sources.white),
            ),
            (SlotResolution::Ready(_), SlotResolution::Ready(_))
          )
      })
      .map(String::as_str)
      .collect()
  }

  /// Winner of the deciding match, once recorded.
  pub fn champion(&self) -> Option<&str> {
    self
      .order
      .finals
      .last()
      .and_then(|id| self.matches.get(id))
      .and_then(|bracket_match| bracket_match.result.winner.as_deref())
  }
}

// ── External representation ────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchView {
  pub id: String,
  pub bracket: BracketSection,
  pub round: u32,
  pub sources: MatchSources,
  pub targets: MatchTargets,
  pub winner: Option<String>,
  pub loser: Option<String>,
  pub red: Option<String>,
  pub white: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BracketView {
  pub format: EliminationFormat,
  pub max_robots: Option<usize>,
  pub selected: Vec<String>,
  pub participants: Vec<Option<String>>,
  pub order: BracketOrder,
  pub matches: BTreeMap<String, MatchView>,
}

/// Read-only projection with resolved participants for view layers.
pub fn serialize_bracket(bracket: &Bracket) -> BracketView {
  let matches = bracket
    .matches
    .values()
    .map(|bracket_match| {
      let view = MatchView {
        id: bracket_match.id.clone(),
        bracket: bracket_match.section,
        round: bracket_match.round,
        sources: bracket_match.sources.clone(),
        targets: bracket_match.targets.clone(),
        winner: bracket_match.result.winner.clone(),
        loser: bracket_match.result.loser.clone(),
        red: bracket.resolve_source(&bracket_match.sources.red),
        white: bracket.resolve_source(&bracket_match.sources.white),
      };
      (bracket_match.id.clone(), view)
    })
    .collect();

  BracketView {
    format: bracket.format,
    max_robots: bracket.max_robots,
    selected: bracket.selected.clone(),
    participants: bracket.participants.clone(),
    order: bracket.order.clone(),
    matches,
  }
}

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

use crate::roster::{collect_present, history_counts};
use crate::types::{
  PairKey, RosterSet, ScheduledFight, DEFAULT_COOLDOWN_MATCHES, DEFAULT_FIGHTS_PER_ROBOT,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleOptions {
  pub desired_per_robot: u32,
  pub cooldown: usize,
  pub seed: Option<u64>,
}

impl Default for ScheduleOptions {
  fn default() -> Self {
    ScheduleOptions {
      desired_per_robot: DEFAULT_FIGHTS_PER_ROBOT,
      cooldown: DEFAULT_COOLDOWN_MATCHES,
      seed: None,
    }
  }
}

/// Counters for the schedule currently being built.
#[derive(Clone, Debug, Default)]
pub struct NightState {
  fought: HashMap<(String, String), u32>,
  used_pairs: HashSet<PairKey>,
  last_seen: HashMap<(String, String), usize>,
}

impl NightState {
  pub fn fights(&self, weight_class: &str, robot: &str) -> u32 {
    self
      .fought
      .get(&(weight_class.to_string(), robot.to_string()))
      .copied()
      .unwrap_or(0)
  }

  pub fn is_used(&self, pair: &PairKey) -> bool {
    self.used_pairs.contains(pair)
  }

  /// Whether `robot` may fight in slot `next_index` given the cooldown window.
  pub fn cooldown_ok(&self, weight_class: &str, robot: &str, next_index: usize, cooldown: usize) -> bool {
    match self.last_seen.get(&(weight_class.to_string(), robot.to_string())) {
      Some(&idx) => next_index.checked_sub(idx).is_some_and(|gap| gap > cooldown),
      None => true,
    }
  }

  /// Books `pair` into slot `index`.
  pub fn place(&mut self, pair: &PairKey, index: usize) {
    self.used_pairs.insert(pair.clone());
    for robot in [&pair.a, &pair.b] {
      let key = (pair.weight_class.clone(), robot.clone());
      *self.fought.entry(key.clone()).or_insert(0) += 1;
      self.last_seen.insert(key, index);
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NeedRule {
  Both,
  AtLeastOne,
}

#[derive(Debug)]
struct Candidate {
  history: u32,
  need_sum: i64,
  tiebreak: u64,
  pair: PairKey,
}

fn all_pairs(robots: &[String]) -> Vec<(&str, &str)> {
  let mut pairs = Vec::new();
  for i in 0..robots.len() {
    for j in (i + 1)..robots.len() {
      let (a, b) = (robots[i].as_str(), robots[j].as_str());
      if a.is_empty() || b.is_empty() || a == b {
        continue;
      }
      pairs.push(if a < b { (a, b) } else { (b, a) });
    }
  }
  pairs
}

#[allow(clippy::too_many_arguments)]
fn gather_candidates<R: Rng + ?Sized>(
  rule: NeedRule,
  present: &BTreeMap<String, Vec<String>>,
  night: &NightState,
  history: &HashMap<PairKey, u32>,
  desired_per_robot: u32,
  next_index: usize,
  cooldown: usize,
  rng: &mut R,
) -> Vec<Candidate> {
  let desired = desired_per_robot as i64;
  let mut candidates = Vec::new();
  for (weight_class, robots) in present {
    if rule == NeedRule::Both {
      let needers = robots
        .iter()
        .filter(|robot| (night.fights(weight_class, robot) as i64) < desired)
        .count();
      if needers < 2 {
        continue;
      }
    }

    for (a, b) in all_pairs(robots) {
      let need_a = desired - night.fights(weight_class, a) as i64;
      let need_b = desired - night.fights(weight_class, b) as i64;
      let needs_ok = match rule {
        NeedRule::Both => need_a > 0 && need_b > 0,
        NeedRule::AtLeastOne => need_a.max(need_b) > 0,
      };
      if !needs_ok {
        continue;
      }

      let pair = PairKey::new(weight_class, a, b);
      if night.is_used(&pair) {
        continue;
      }
      if !night.cooldown_ok(weight_class, a, next_index, cooldown)
        || !night.cooldown_ok(weight_class, b, next_index, cooldown)
      {
        continue;
      }

      candidates.push(Candidate {
        history: history.get(&pair).copied().unwrap_or(0),
        need_sum: need_a.max(0) + need_b.max(0),
        tiebreak: rng.gen(),
        pair,
      });
    }
  }
  candidates
}

/// Picks the single best next pairing across every weight class, or `None`
/// when no legal pairing remains.
///
/// Pairs where both robots still need fights win over pairs where only one
/// does. Within a tier: fewest prior meetings, then largest combined remaining
/// need, then a random draw from `rng`.
#[allow(clippy::too_many_arguments)]
pub fn choose_next_pair<R: Rng + ?Sized>(
  present: &BTreeMap<String, Vec<String>>,
  night: &NightState,
  history: &HashMap<PairKey, u32>,
  desired_per_robot: u32,
  next_index: usize,
  cooldown: usize,
  rng: &mut R,
) -> Option<PairKey> {
  let mut candidates = gather_candidates(
    NeedRule::Both,
    present,
    night,
    history,
    desired_per_robot,
    next_index,
    cooldown,
    rng,
  );
  if candidates.is_empty() {
    candidates = gather_candidates(
      NeedRule::AtLeastOne,
      present,
      night,
      history,
      desired_per_robot,
      next_index,
      cooldown,
      rng,
    );
  }
  candidates
    .into_iter()
    .min_by_key(|c| (c.history, Reverse(c.need_sum), c.tiebreak))
    .map(|c| c.pair)
}

fn someone_needs_fights(present: &BTreeMap<String, Vec<String>>, night: &NightState, desired: u32) -> bool {
  present
    .iter()
    .any(|(weight_class, robots)| robots.iter().any(|robot| night.fights(weight_class, robot) < desired))
}

/// Greedily builds a night's fight card with an explicit random source.
///
/// Stops early, without error, when no legal pairing is left.
pub fn build_schedule<R: Rng + ?Sized>(
  present: &BTreeMap<String, Vec<String>>,
  history: &HashMap<PairKey, u32>,
  options: &ScheduleOptions,
  rng: &mut R,
) -> Vec<ScheduledFight> {
  let mut night = NightState::default();
  let mut schedule: Vec<ScheduledFight> = Vec::new();

  while someone_needs_fights(present, &night, options.desired_per_robot) {
    let next_index = schedule.len();
    let Some(pair) = choose_next_pair(
      present,
      &night,
      history,
      options.desired_per_robot,
      next_index,
      options.cooldown,
      rng,
    ) else {
      debug!(placed = next_index, "no legal pairing left");
      break;
    };

    let (red, white) = if rng.gen_bool(0.5) {
      (pair.a.clone(), pair.b.clone())
    } else {
      (pair.b.clone(), pair.a.clone())
    };
    night.place(&pair, next_index);
    debug!(index = next_index, weight_class = %pair.weight_class, %red, %white, "placed fight");
    schedule.push(ScheduledFight {
      weight_class: pair.weight_class,
      red,
      white,
    });
  }

  let short = present
    .iter()
    .map(|(weight_class, robots)| {
      robots
        .iter()
        .filter(|robot| night.fights(weight_class, robot) < options.desired_per_robot)
        .count()
    })
    .sum::<usize>();
  info!(fights = schedule.len(), robots_short = short, "schedule built");
  schedule
}

/// Builds tonight's schedule from the stored rosters.
///
/// With `options.seed` set the whole run, corners included, is reproducible.
pub fn generate_schedule(rosters: &RosterSet, options: &ScheduleOptions) -> Vec<ScheduledFight> {
  let present = collect_present(rosters);
  if present.is_empty() {
    return Vec::new();
  }
  let history = history_counts(rosters);
  let mut rng = match options.seed {
    Some(seed) => ChaCha8Rng::seed_from_u64(seed),
    None => ChaCha8Rng::from_entropy(),
  };
  build_schedule(&present, &history, options, &mut rng)
}

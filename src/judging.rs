use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::JudgingError;
use crate::rating::FightOutcome;
use crate::types::Corner;

/// Points available per category; each judge splits a pool between the corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgingConfig {
    pub damage: u32,
    pub aggression: u32,
    pub control: u32,
}

impl Default for JudgingConfig {
    fn default() -> Self {
        JudgingConfig {
            damage: 8,
            aggression: 5,
            control: 6,
        }
    }
}

impl JudgingConfig {
    pub fn total(&self) -> u32 {
        self.damage + self.aggression + self.control
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScores {
    #[serde(default)]
    pub damage: u32,
    #[serde(default)]
    pub aggression: u32,
    #[serde(default)]
    pub control: u32,
}

impl CategoryScores {
    pub fn new(damage: u32, aggression: u32, control: u32) -> Self {
        CategoryScores {
            damage,
            aggression,
            control,
        }
    }

    pub fn total(&self) -> u32 {
        self.damage + self.aggression + self.control
    }
}

/// One judge's card. Only red's points are entered; white gets the rest of each pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeScorecard {
    pub judge_id: u32,
    pub judge_name: String,
    pub red: CategoryScores,
    pub white: CategoryScores,
}

impl JudgeScorecard {
    pub fn red_total(&self) -> u32 {
        self.red.total()
    }

    pub fn white_total(&self) -> u32 {
        self.white.total()
    }

    /// The corner this judge scored higher, if any.
    pub fn pick(&self) -> Option<Corner> {
        match self.red_total().cmp(&self.white_total()) {
            std::cmp::Ordering::Greater => Some(Corner::Red),
            std::cmp::Ordering::Less => Some(Corner::White),
            std::cmp::Ordering::Equal => None,
        }
    }
}

fn check_pool(judge_id: u32, category: &'static str, value: u32, max: u32) -> Result<u32, JudgingError> {
    if value > max {
        return Err(JudgingError::ScoreOutOfRange {
            judge_id,
            category,
            value,
            max,
        });
    }
    Ok(max - value)
}

/// Builds a scorecard from red's points, filling in white's share of each pool.
pub fn create_judge_record(
    judge_id: u32,
    red: CategoryScores,
    judge_name: Option<&str>,
    pools: &JudgingConfig,
) -> Result<JudgeScorecard, JudgingError> {
    let white = CategoryScores {
        damage: check_pool(judge_id, "damage", red.damage, pools.damage)?,
        aggression: check_pool(judge_id, "aggression", red.aggression, pools.aggression)?,
        control: check_pool(judge_id, "control", red.control, pools.control)?,
    };
    let judge_name = judge_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Judge {judge_id}"));
    Ok(JudgeScorecard {
        judge_id,
        judge_name,
        red,
        white,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub outcome: FightOutcome,
    pub red_votes: usize,
    pub white_votes: usize,
    pub red_points: u32,
    pub white_points: u32,
}

/// Judges' decision: most judge picks, then most total points, else a draw.
pub fn decide<'a, I>(cards: I) -> Result<Decision, JudgingError>
where
    I: IntoIterator<Item = &'a JudgeScorecard>,
{
    let mut seen = 0usize;
    let mut red_votes = 0;
    let mut white_votes = 0;
    let mut red_points = 0;
    let mut white_points = 0;
    for card in cards {
        seen += 1;
        red_points += card.red_total();
        white_points += card.white_total();
        match card.pick() {
            Some(Corner::Red) => red_votes += 1,
            Some(Corner::White) => white_votes += 1,
            None => {}
        }
    }
    if seen == 0 {
        return Err(JudgingError::NoScorecards);
    }

    let outcome = match red_votes.cmp(&white_votes).then(red_points.cmp(&white_points)) {
        std::cmp::Ordering::Greater => FightOutcome::RedJd,
        std::cmp::Ordering::Less => FightOutcome::WhiteJd,
        std::cmp::Ordering::Equal => FightOutcome::Draw,
    };
    debug!(red_votes, white_votes, red_points, white_points, outcome = outcome.label(), "judges decided");
    Ok(Decision {
        outcome,
        red_votes,
        white_votes,
        red_points,
        white_points,
    })
}

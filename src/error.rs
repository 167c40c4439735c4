use std::path::PathBuf;
use thiserror::Error;

/// Broad failure class of a bracket operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Lookup,
    Conflict,
    Validation,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BracketError {
    #[error("Unsupported elimination format: {0:?}")]
    UnsupportedFormat(String),

    #[error("At least two robots are required to seed a bracket (got {0})")]
    NotEnoughEntrants(usize),

    #[error("Unknown match: {0}")]
    UnknownMatch(String),

    #[error("Match {match_id} already has a different winner recorded ({existing})")]
    WinnerConflict { match_id: String, existing: String },

    #[error("Winner {winner} is not scheduled in match {match_id}")]
    NotAParticipant { match_id: String, winner: String },

    #[error("Winner name must be provided")]
    MissingWinner,

    #[error("Match {match_id} is still waiting on an opponent")]
    OpponentPending { match_id: String },
}

impl BracketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BracketError::UnsupportedFormat(_) | BracketError::NotEnoughEntrants(_) => {
                ErrorKind::Configuration
            }
            BracketError::UnknownMatch(_) => ErrorKind::Lookup,
            BracketError::WinnerConflict { .. } => ErrorKind::Conflict,
            BracketError::NotAParticipant { .. }
            | BracketError::MissingWinner
            | BracketError::OpponentPending { .. } => ErrorKind::Validation,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JudgingError {
    #[error("No scorecards submitted")]
    NoScorecards,

    #[error("Judge {judge_id} gave {value} {category} points (pool is {max})")]
    ScoreOutOfRange {
        judge_id: u32,
        category: &'static str,
        value: u32,
        max: u32,
    },

    #[error("No match is currently being judged")]
    NoCurrentMatch,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {key}: {source}")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level error for the event-night workflows and the command line.
#[derive(Error, Debug)]
pub enum EventError {
    #[error(transparent)]
    Bracket(#[from] BracketError),

    #[error(transparent)]
    Judging(#[from] JudgingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Unknown weight class: {0}")]
    UnknownWeightClass(String),

    #[error("Unknown tournament: {0}")]
    UnknownTournament(String),

    #[error("Tournament {0} already exists")]
    TournamentExists(String),

    #[error("Unknown robot: {0}")]
    UnknownRobot(String),

    #[error("Unknown result label: {0:?}")]
    UnknownOutcome(String),

    #[error("{0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_error_kinds() {
        assert_eq!(
            BracketError::UnsupportedFormat("swiss".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(BracketError::NotEnoughEntrants(1).kind(), ErrorKind::Configuration);
        assert_eq!(BracketError::UnknownMatch("W9".into()).kind(), ErrorKind::Lookup);
        assert_eq!(
            BracketError::WinnerConflict {
                match_id: "W1".into(),
                existing: "Atlas".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(BracketError::MissingWinner.kind(), ErrorKind::Validation);
        assert_eq!(
            BracketError::OpponentPending { match_id: "W7".into() }.kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_event_error_wraps_bracket_message() {
        let err: EventError = BracketError::UnknownMatch("L4".into()).into();
        assert_eq!(err.to_string(), "Unknown match: L4");
    }
}

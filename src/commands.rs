use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use crate::bracket::EliminationFormat;
use crate::config::AppConfig;
use crate::error::{EventError, JudgingError};
use crate::event::finalize_current_match;
use crate::judging::{create_judge_record, CategoryScores};
use crate::rating::{record_fight, FightOutcome};
use crate::roster::{add_robot, present_robots, robot_stats, set_presence};
use crate::schedule::generate_schedule;
use crate::store::*;
use crate::tournament::{advance_tournament, create_tournament, slugify, TournamentRequest};
use crate::types::SchedulePayload;

#[derive(Debug, Parser)]
#[command(name = "fight-night")]
#[command(about = "Schedule robot fights, judge them and run elimination tournaments", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build tonight's schedule from the robots marked present
    Schedule {
        /// Fights each robot should get
        #[arg(long)]
        fights: Option<u32>,

        /// Schedule slots between two fights of the same robot
        #[arg(long)]
        cooldown: Option<usize>,

        /// Seed for reproducible pairing and corners
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Record a finished fight directly
    Record {
        #[arg(long)]
        weight_class: String,

        #[arg(long)]
        red: String,

        #[arg(long)]
        white: String,

        /// e.g. "Red wins KO", "White wins JD", "Draw"
        #[arg(long)]
        result: String,
    },

    /// Roster entries and tonight's check-in
    Robot {
        #[command(subcommand)]
        action: RobotCommand,
    },

    /// Judges' scoring for the fight in progress
    Judge {
        #[command(subcommand)]
        action: JudgeCommand,
    },

    /// Elimination tournaments
    Tournament {
        #[command(subcommand)]
        action: TournamentCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum RobotCommand {
    /// Enter a robot at the default rating
    Add {
        #[arg(long)]
        weight_class: String,

        name: String,

        /// Check it in straight away
        #[arg(long)]
        present: bool,
    },

    /// Check robots in for tonight
    Present {
        #[arg(long)]
        weight_class: String,

        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Check robots out
    Absent {
        #[arg(long)]
        weight_class: String,

        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Rating and fight record of one robot
    Show {
        #[arg(long)]
        weight_class: String,

        name: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum JudgeCommand {
    /// Put a scheduled fight up for judging
    Start {
        /// Position in the schedule list
        #[arg(long, default_value_t = 0)]
        index: usize,
    },

    /// Submit one judge's points for the red corner
    Score {
        #[arg(long)]
        judge: u32,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        damage: u32,

        #[arg(long)]
        aggression: u32,

        #[arg(long)]
        control: u32,
    },

    /// Decide the current fight and record it
    Finalize,

    /// Print the judging state
    State,
}

#[derive(Debug, Subcommand)]
pub enum TournamentCommand {
    /// Seed a new bracket
    Create {
        name: String,

        #[arg(long)]
        weight_class: String,

        /// "single" or "double"
        #[arg(long, default_value = "single")]
        elimination: String,

        #[arg(long)]
        max_robots: Option<usize>,

        /// Entrant in seed order; repeat for each robot
        #[arg(long = "robot")]
        robots: Vec<String>,

        /// Seed from the class's present robots instead
        #[arg(long)]
        use_present: bool,
    },

    /// Record a bracket match winner
    Record {
        slug: String,
        match_id: String,
        winner: String,
    },

    /// Print one tournament with resolved participants
    Show { slug: String },

    /// List saved tournaments
    List,
}

/// Runs one command against `store` and returns its JSON output.
pub fn execute<S: EventStore + ?Sized>(
    command: Commands,
    config: &AppConfig,
    store: &mut S,
    now: DateTime<Utc>,
) -> Result<Value, EventError> {
    match command {
        Commands::Schedule {
            fights,
            cooldown,
            seed,
        } => {
            let mut options = config.schedule_options();
            options.desired_per_robot = fights.unwrap_or(options.desired_per_robot);
            options.cooldown = cooldown.unwrap_or(options.cooldown);
            options.seed = seed.or(options.seed);
            let rosters = load_rosters(store, &config.weight_classes, &config.rating)?;
            let schedule = SchedulePayload {
                list: generate_schedule(&rosters, &options),
            };
            save_schedule(store, &schedule)?;
            Ok(json!(schedule))
        }
        Commands::Record {
            weight_class,
            red,
            white,
            result,
        } => {
            let weight_class = config.weight_class(&weight_class)?;
            let outcome: FightOutcome = result.parse()?;
            let mut roster = load_roster(store, &weight_class, &config.rating)?;
            let record = record_fight(&mut roster, &red, &white, outcome, now);
            save_roster(store, &weight_class, &roster)?;
            Ok(json!(record))
        }
        Commands::Robot { action } => execute_robot(action, config, store),
        Commands::Judge { action } => execute_judge(action, config, store, now),
        Commands::Tournament { action } => execute_tournament(action, config, store, now),
    }
}

fn execute_robot<S: EventStore + ?Sized>(
    action: RobotCommand,
    config: &AppConfig,
    store: &mut S,
) -> Result<Value, EventError> {
    let (weight_class, names, present) = match action {
        RobotCommand::Show { weight_class, name } => {
            let roster = match config.weight_class(&weight_class) {
                Ok(weight_class) => Some(load_roster(store, &weight_class, &config.rating)?),
                Err(_) => None,
            };
            return Ok(json!(robot_stats(roster.as_ref(), &name)));
        }
        RobotCommand::Add {
            weight_class,
            name,
            present,
        } => {
            let weight_class = config.weight_class(&weight_class)?;
            let mut roster = load_roster(store, &weight_class, &config.rating)?;
            let name = add_robot(&mut roster, &name)?;
            if present {
                set_presence(&mut roster, &name, true)?;
            }
            save_roster(store, &weight_class, &roster)?;
            return Ok(json!(robot_stats(Some(&roster), &name)));
        }
        RobotCommand::Present { weight_class, names } => (weight_class, names, true),
        RobotCommand::Absent { weight_class, names } => (weight_class, names, false),
    };

    let weight_class = config.weight_class(&weight_class)?;
    let mut roster = load_roster(store, &weight_class, &config.rating)?;
    for name in &names {
        set_presence(&mut roster, name, present)?;
    }
    save_roster(store, &weight_class, &roster)?;
    Ok(json!({
        "weight_class": weight_class,
        "present": present_robots(&roster),
    }))
}

fn execute_judge<S: EventStore + ?Sized>(
    action: JudgeCommand,
    config: &AppConfig,
    store: &mut S,
    now: DateTime<Utc>,
) -> Result<Value, EventError> {
    match action {
        JudgeCommand::Start { index } => {
            let schedule = load_schedule(store)?;
            let fight = schedule
                .list
                .get(index)
                .cloned()
                .ok_or_else(|| EventError::Config(format!("No scheduled fight at position {index}")))?;
            let mut match_id = String::new();
            let state = update_judging(store, now, |state| {
                match_id = format!("fight-{}", state.history.len() + 1);
                state.begin_match(&match_id, &fight);
            })?;
            info!(match_id = %match_id, red = %fight.red, white = %fight.white, "judging started");
            Ok(json!(state))
        }
        JudgeCommand::Score {
            judge,
            name,
            damage,
            aggression,
            control,
        } => {
            let card = create_judge_record(
                judge,
                CategoryScores::new(damage, aggression, control),
                name.as_deref(),
                &config.judging,
            )?;
            let mut rejected: Option<JudgingError> = None;
            let state = update_judging(store, now, |s| {
                if let Err(err) = s.submit_scorecard(card) {
                    rejected = Some(err);
                }
            })?;
            if let Some(err) = rejected {
                return Err(err.into());
            }
            Ok(json!(state))
        }
        JudgeCommand::Finalize => {
            let mut state = load_judging(store)?;
            let mut schedule = load_schedule(store)?;
            let mut rosters = load_rosters(store, &config.weight_classes, &config.rating)?;
            let finalized = finalize_current_match(&mut state, &mut schedule, &mut rosters, now)?;
            save_rosters(store, &rosters)?;
            save_schedule(store, &schedule)?;
            save_judging(store, &state)?;
            Ok(json!({
                "decision": finalized.decision,
                "record": finalized.record,
                "removed_from_schedule": finalized.removed_from_schedule,
                "version": state.version(),
            }))
        }
        JudgeCommand::State => Ok(json!(load_judging(store)?)),
    }
}

fn execute_tournament<S: EventStore + ?Sized>(
    action: TournamentCommand,
    config: &AppConfig,
    store: &mut S,
    now: DateTime<Utc>,
) -> Result<Value, EventError> {
    match action {
        TournamentCommand::Create {
            name,
            weight_class,
            elimination,
            max_robots,
            robots,
            use_present,
        } => {
            let weight_class = config.weight_class(&weight_class)?;
            let slug = slugify(&name);
            if slug.is_empty() {
                return Err(EventError::Config(format!("Tournament name {name:?} has no usable characters")));
            }
            let request = TournamentRequest {
                name,
                weight_class: weight_class.clone(),
                elimination: elimination.parse::<EliminationFormat>()?.to_string(),
                max_robots,
                robots,
                use_present,
            };
            let mut book = load_tournaments(store)?;
            if book.contains_key(&slug) {
                return Err(EventError::TournamentExists(slug));
            }
            let roster = load_roster(store, &weight_class, &config.rating)?;
            let record = create_tournament(&request, &roster, now)?;
            let view = record.view(&slug);
            book.insert(slug, record);
            save_tournaments(store, &book)?;
            Ok(json!(view))
        }
        TournamentCommand::Record {
            slug,
            match_id,
            winner,
        } => {
            let mut book = load_tournaments(store)?;
            let record = book
                .get_mut(&slug)
                .ok_or_else(|| EventError::UnknownTournament(slug.clone()))?;
            advance_tournament(record, &match_id, &winner)?;
            let view = record.view(&slug);
            save_tournaments(store, &book)?;
            Ok(json!(view))
        }
        TournamentCommand::Show { slug } => {
            let book = load_tournaments(store)?;
            let record = book
                .get(&slug)
                .ok_or_else(|| EventError::UnknownTournament(slug.clone()))?;
            Ok(json!(record.view(&slug)))
        }
        TournamentCommand::List => {
            let book = load_tournaments(store)?;
            let listing: Vec<_> = book.iter().map(|(slug, record)| record.summary(slug)).collect();
            Ok(json!(listing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RobotEntry, WeightClassRoster};

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(std::iter::once("fight-night").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    fn seeded_store(config: &AppConfig) -> MemoryStore {
        let mut store = MemoryStore::new();
        let mut roster = WeightClassRoster::default();
        for name in ["Atlas", "Blazer", "Cyclone", "Dynamo"] {
            roster.robots.insert(name.into(), RobotEntry::present());
        }
        save_roster(&mut store, &config.weight_classes[0], &roster).unwrap();
        store
    }

    #[test]
    fn test_cli_parses_tournament_create() {
        let command = parse(&[
            "tournament",
            "create",
            "Summer Showdown",
            "--weight-class",
            "antweight",
            "--robot",
            "Atlas",
            "--robot",
            "Blazer",
        ]);
        match command {
            Commands::Tournament {
                action:
                    TournamentCommand::Create {
                        name,
                        robots,
                        elimination,
                        use_present,
                        ..
                    },
            } => {
                assert_eq!(name, "Summer Showdown");
                assert_eq!(robots, vec!["Atlas", "Blazer"]);
                assert_eq!(elimination, "single");
                assert!(!use_present);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_schedule_command_saves_schedule() {
        let config = AppConfig::default();
        let mut store = seeded_store(&config);
        let out = execute(parse(&["schedule", "--seed", "11"]), &config, &mut store, Utc::now()).unwrap();
        assert_eq!(out["list"].as_array().unwrap().len(), 2);
        assert_eq!(load_schedule(&store).unwrap().list.len(), 2);
    }

    #[test]
    fn test_judging_commands_finalize_fight() {
        let config = AppConfig::default();
        let mut store = seeded_store(&config);
        let now = Utc::now();
        execute(parse(&["schedule", "--seed", "3"]), &config, &mut store, now).unwrap();
        execute(parse(&["judge", "start"]), &config, &mut store, now).unwrap();
        for judge in ["1", "2", "3"] {
            execute(
                parse(&["judge", "score", "--judge", judge, "--damage", "6", "--aggression", "3", "--control", "4"]),
                &config,
                &mut store,
                now,
            )
            .unwrap();
        }
        let out = execute(parse(&["judge", "finalize"]), &config, &mut store, now).unwrap();
        assert_eq!(out["decision"]["outcome"], "Red wins JD");
        assert_eq!(out["removed_from_schedule"], true);
        assert_eq!(load_schedule(&store).unwrap().list.len(), 1);
        assert!(load_judging(&store).unwrap().current.is_none());
    }

    #[test]
    fn test_score_without_current_match_fails() {
        let config = AppConfig::default();
        let mut store = MemoryStore::new();
        let err = execute(
            parse(&["judge", "score", "--judge", "1", "--damage", "1", "--aggression", "1", "--control", "1"]),
            &config,
            &mut store,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, EventError::Judging(JudgingError::NoCurrentMatch)));
    }

    #[test]
    fn test_tournament_commands_round_trip_through_store() {
        let config = AppConfig::default();
        let mut store = seeded_store(&config);
        let now = Utc::now();
        let created = execute(
            parse(&["tournament", "create", "Summer Showdown", "--weight-class", "Antweight", "--use-present"]),
            &config,
            &mut store,
            now,
        )
        .unwrap();
        assert_eq!(created["metadata"]["slug"], "summer-showdown");

        let recorded = execute(
            parse(&["tournament", "record", "summer-showdown", "W1", "Atlas"]),
            &config,
            &mut store,
            now,
        )
        .unwrap();
        assert_eq!(recorded["bracket"]["matches"]["W3"]["red"], "Atlas");

        let listing = execute(parse(&["tournament", "list"]), &config, &mut store, now).unwrap();
        assert_eq!(listing.as_array().unwrap().len(), 1);

        let missing = execute(parse(&["tournament", "show", "winter"]), &config, &mut store, now).unwrap_err();
        assert!(matches!(missing, EventError::UnknownTournament(_)));
    }

    #[test]
    fn test_tournament_create_keeps_existing_slug() {
        let config = AppConfig::default();
        let mut store = seeded_store(&config);
        let now = Utc::now();
        let create = ["tournament", "create", "Summer Showdown", "--weight-class", "Antweight", "--use-present"];
        execute(parse(&create), &config, &mut store, now).unwrap();
        execute(
            parse(&["tournament", "record", "summer-showdown", "W1", "Atlas"]),
            &config,
            &mut store,
            now,
        )
        .unwrap();

        let again = ["tournament", "create", "summer showdown!", "--weight-class", "Antweight", "--robot", "Cyclone", "--robot", "Dynamo"];
        let err = execute(parse(&again), &config, &mut store, now).unwrap_err();
        assert!(matches!(err, EventError::TournamentExists(slug) if slug == "summer-showdown"));

        let book = load_tournaments(&store).unwrap();
        assert_eq!(book.len(), 1);
        assert_eq!(book["summer-showdown"].bracket.matches["W1"].result.winner.as_deref(), Some("Atlas"));
    }

    #[test]
    fn test_robot_check_in_feeds_schedule() {
        let config = AppConfig::default();
        let mut store = MemoryStore::new();
        let now = Utc::now();
        for name in ["Atlas", "Blazer", "Cyclone"] {
            execute(parse(&["robot", "add", "--weight-class", "antweight", name]), &config, &mut store, now).unwrap();
        }
        let empty = execute(parse(&["schedule", "--seed", "5"]), &config, &mut store, now).unwrap();
        assert!(empty["list"].as_array().unwrap().is_empty());

        let checked_in = execute(
            parse(&["robot", "present", "--weight-class", "Antweight", "atlas", "BLAZER", "Cyclone"]),
            &config,
            &mut store,
            now,
        )
        .unwrap();
        assert_eq!(checked_in["present"], json!(["Atlas", "Blazer", "Cyclone"]));

        let checked_out = execute(
            parse(&["robot", "absent", "--weight-class", "Antweight", "Cyclone"]),
            &config,
            &mut store,
            now,
        )
        .unwrap();
        assert_eq!(checked_out["present"], json!(["Atlas", "Blazer"]));

        let scheduled = execute(parse(&["schedule", "--seed", "5"]), &config, &mut store, now).unwrap();
        assert_eq!(scheduled["list"].as_array().unwrap().len(), 1);

        let err = execute(
            parse(&["robot", "present", "--weight-class", "Antweight", "Ghost"]),
            &config,
            &mut store,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, EventError::UnknownRobot(_)));
    }

    #[test]
    fn test_robot_show_reports_record() {
        let config = AppConfig::default();
        let mut store = seeded_store(&config);
        let now = Utc::now();
        execute(
            parse(&["record", "--weight-class", "Antweight", "--red", "Atlas", "--white", "Blazer", "--result", "Red wins KO"]),
            &config,
            &mut store,
            now,
        )
        .unwrap();

        let atlas = execute(parse(&["robot", "show", "--weight-class", "Antweight", "Atlas"]), &config, &mut store, now).unwrap();
        assert_eq!(atlas["rating"], 1020);
        assert_eq!(atlas["wins"], 1);
        assert_eq!(atlas["ko_wins"], 1);

        let unknown = execute(parse(&["robot", "show", "--weight-class", "Unknown", "TestBot"]), &config, &mut store, now).unwrap();
        assert_eq!(unknown["name"], "TestBot");
        assert!(unknown["rating"].is_null());
        assert_eq!(unknown["losses"], 0);
    }

    #[test]
    fn test_record_command_rejects_unknown_result() {
        let config = AppConfig::default();
        let mut store = seeded_store(&config);
        let err = execute(
            parse(&["record", "--weight-class", "Antweight", "--red", "Atlas", "--white", "Blazer", "--result", "Red wins TKO"]),
            &config,
            &mut store,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, EventError::UnknownOutcome(_)));
    }
}

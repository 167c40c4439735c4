use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::PoisonError,
};
use tracing::debug;

use crate::error::StoreError;
use crate::event::{update_judging_state, JudgingState};
use crate::tournament::TournamentBook;
use crate::types::{
    RatingSettings, RosterSet, SchedulePayload, SharedStore, WeightClassRoster, JUDGING_KEY, SCHEDULE_KEY,
    TOURNAMENTS_KEY,
};

/// Key-value persistence for event data. Keys are short identifiers such as
/// `schedule` or `antweight_db`; values are whole JSON documents.
pub trait EventStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn save(&mut self, key: &str, value: &Value) -> Result<(), StoreError>;
}

/// One pretty-printed `<key>.json` file per key.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonFileStore { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl EventStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        let value = serde_json::from_str(&data).map_err(|source| StoreError::Parse {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    fn save(&mut self, key: &str, value: &Value) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::Write {
            path: self.root.clone(),
            source,
        })?;
        let payload = serde_json::to_string_pretty(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        let path = self.path_for(key);
        let tmp = self.root.join(format!("{key}.json.tmp"));
        fs::write(&tmp, payload).map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(key, path = %path.display(), "saved");
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl EventStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// Lock the shared store and run `f` against it. A poisoned lock is taken over
/// as-is; every save replaces a whole document.
pub fn with_store<S, F, R>(shared: &SharedStore<S>, f: F) -> R
where
    F: FnOnce(&mut S) -> R,
{
    let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

// ── Typed documents ────────────────────────────────────────────────────

pub fn roster_key(weight_class: &str) -> String {
    format!("{}_db", weight_class.trim().to_lowercase())
}

fn load_or<S, T>(store: &S, key: &str, fallback: impl FnOnce() -> T) -> Result<T, StoreError>
where
    S: EventStore + ?Sized,
    T: DeserializeOwned,
{
    match store.load(key)? {
        Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Parse {
            key: key.to_string(),
            source,
        }),
        None => Ok(fallback()),
    }
}

fn save_as<S, T>(store: &mut S, key: &str, document: &T) -> Result<(), StoreError>
where
    S: EventStore + ?Sized,
    T: Serialize,
{
    let value = serde_json::to_value(document).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.save(key, &value)
}

/// A class that has never been saved starts empty with `settings`.
pub fn load_roster<S: EventStore + ?Sized>(
    store: &S,
    weight_class: &str,
    settings: &RatingSettings,
) -> Result<WeightClassRoster, StoreError> {
    load_or(store, &roster_key(weight_class), || WeightClassRoster {
        settings: settings.clone(),
        ..WeightClassRoster::default()
    })
}

pub fn save_roster<S: EventStore + ?Sized>(
    store: &mut S,
    weight_class: &str,
    roster: &WeightClassRoster,
) -> Result<(), StoreError> {
    save_as(store, &roster_key(weight_class), roster)
}

pub fn load_rosters<S: EventStore + ?Sized>(
    store: &S,
    weight_classes: &[String],
    settings: &RatingSettings,
) -> Result<RosterSet, StoreError> {
    weight_classes
        .iter()
        .map(|weight_class| Ok::<_, StoreError>((weight_class.clone(), load_roster(store, weight_class, settings)?)))
        .collect()
}

pub fn save_rosters<S: EventStore + ?Sized>(store: &mut S, rosters: &RosterSet) -> Result<(), StoreError> {
    for (weight_class, roster) in rosters {
        save_roster(store, weight_class, roster)?;
    }
    Ok(())
}

pub fn load_schedule<S: EventStore + ?Sized>(store: &S) -> Result<SchedulePayload, StoreError> {
    load_or(store, SCHEDULE_KEY, SchedulePayload::default)
}

pub fn save_schedule<S: EventStore + ?Sized>(store: &mut S, schedule: &SchedulePayload) -> Result<(), StoreError> {
    save_as(store, SCHEDULE_KEY, schedule)
}

pub fn load_judging<S: EventStore + ?Sized>(store: &S) -> Result<JudgingState, StoreError> {
    load_or(store, JUDGING_KEY, JudgingState::default)
}

pub fn save_judging<S: EventStore + ?Sized>(store: &mut S, state: &JudgingState) -> Result<(), StoreError> {
    save_as(store, JUDGING_KEY, state)
}

/// Load-mutate-save for the judging document; nothing is written when the
/// mutation leaves the state unchanged.
pub fn update_judging<S, F>(store: &mut S, at: DateTime<Utc>, mutate: F) -> Result<JudgingState, StoreError>
where
    S: EventStore + ?Sized,
    F: FnOnce(&mut JudgingState),
{
    let mut state = load_judging(store)?;
    if update_judging_state(&mut state, at, mutate) {
        save_judging(store, &state)?;
    }
    Ok(state)
}

pub fn load_tournaments<S: EventStore + ?Sized>(store: &S) -> Result<TournamentBook, StoreError> {
    load_or(store, TOURNAMENTS_KEY, TournamentBook::new)
}

pub fn save_tournaments<S: EventStore + ?Sized>(store: &mut S, book: &TournamentBook) -> Result<(), StoreError> {
    save_as(store, TOURNAMENTS_KEY, book)
}

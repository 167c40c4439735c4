use crate::error::EventError;
use crate::judging::JudgingConfig;
use crate::schedule::ScheduleOptions;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::{
  env,
  fs,
  path::{Path, PathBuf},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
  pub data_dir: String,
  pub log_dir: String,
  pub weight_classes: Vec<String>,
  pub fights_per_robot: u32,
  pub cooldown_matches: usize,
  pub schedule_seed: Option<u64>,
  pub rating: RatingSettings,
  pub judging: JudgingConfig,
}

impl Default for AppConfig {
  fn default() -> Self {
    AppConfig {
      data_dir: String::new(),
      log_dir: String::new(),
      weight_classes: DEFAULT_WEIGHT_CLASSES.iter().map(|s| s.to_string()).collect(),
      fights_per_robot: DEFAULT_FIGHTS_PER_ROBOT,
      cooldown_matches: DEFAULT_COOLDOWN_MATCHES,
      schedule_seed: None,
      rating: RatingSettings::default(),
      judging: JudgingConfig::default(),
    }
  }
}

impl AppConfig {
  pub fn data_path(&self) -> PathBuf {
    resolve_repo_path(non_empty_or(&self.data_dir, "data"))
  }

  pub fn log_path(&self) -> PathBuf {
    resolve_repo_path(non_empty_or(&self.log_dir, "logs"))
  }

  pub fn schedule_options(&self) -> ScheduleOptions {
    ScheduleOptions {
      desired_per_robot: self.fights_per_robot,
      cooldown: self.cooldown_matches,
      seed: self.schedule_seed,
    }
  }

  /// Configured name matching `raw` case-insensitively.
  pub fn weight_class(&self, raw: &str) -> Result<String, EventError> {
    let wanted = raw.trim();
    self
      .weight_classes
      .iter()
      .find(|name| name.eq_ignore_ascii_case(wanted))
      .cloned()
      .ok_or_else(|| EventError::UnknownWeightClass(raw.to_string()))
  }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    fallback
  } else {
    trimmed
  }
}

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  match env_default("FIGHT_NIGHT_CONFIG") {
    Some(raw) => resolve_repo_path(&raw),
    None => repo_root().join("config.json"),
  }
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

pub fn apply_env_defaults(config: AppConfig) -> AppConfig {
  apply_defaults_from(config, env_default)
}

/// Fills unset fields from `lookup`; values already in the config win.
pub fn apply_defaults_from<F>(mut config: AppConfig, lookup: F) -> AppConfig
where
  F: Fn(&str) -> Option<String>,
{
  if config.data_dir.trim().is_empty() {
    if let Some(value) = lookup("FIGHT_NIGHT_DATA_DIR") {
      config.data_dir = value;
    }
  }
  if config.log_dir.trim().is_empty() {
    if let Some(value) = lookup("FIGHT_NIGHT_LOG_DIR") {
      config.log_dir = value;
    }
  }
  if config.schedule_seed.is_none() {
    if let Some(value) = lookup("FIGHT_NIGHT_SEED") {
      match value.parse::<u64>() {
        Ok(seed) => config.schedule_seed = Some(seed),
        Err(_) => tracing::warn!("FIGHT_NIGHT_SEED={value} is not a number; schedule will be random"),
      }
    }
  }
  config
}

pub fn load_config_inner() -> Result<AppConfig, EventError> {
  load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, EventError> {
  if !path.is_file() {
    return Ok(apply_env_defaults(AppConfig::default()));
  }
  let data = fs::read_to_string(path).map_err(|e| EventError::Config(format!("read config {}: {e}", path.display())))?;
  let config = serde_json::from_str::<AppConfig>(&data)
    .map_err(|e| EventError::Config(format!("parse config {}: {e}", path.display())))?;
  Ok(apply_env_defaults(config))
}

pub fn load_env_file() {
  let env_path = repo_root().join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

pub fn log_config_warnings(config: &AppConfig) {
  if config.weight_classes.is_empty() {
    tracing::warn!("no weight classes configured; nothing can be scheduled");
  }
  if config.fights_per_robot == 0 {
    tracing::warn!("fightsPerRobot is 0; schedules will be empty");
  }
}

//! Loading service configuration (settings, proficiency configs, extra bank
//! questions, reward table) from TOML.
//!
//! Example:
//!
//! ```toml
//! [settings]
//! max_phase_transitions = 10
//! session_ttl_secs = 3600
//!
//! [[configs]]
//! name = "Short placement"
//! isActive = true
//! initialQuestions = [{ level = 1, count = 2 }]
//! branches = [
//!   { name = "low", condition = { correctRange = [0, 1], fromPhase = "initial" }, resultLevel = 1 },
//!   { name = "high", condition = { correctRange = [2, 2], fromPhase = "initial" }, resultLevel = 2 },
//! ]
//!
//! [[questions]]
//! id = "custom-1"
//! level = 1
//! prompt = "苹果"
//! answer = "apple"
//!
//! [[rewards]]
//! level = 1
//! experience = 50
//! coins = 5
//! ```

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{ProficiencyConfig, Question};
use crate::results::RewardTier;
use crate::session::DEFAULT_MAX_PHASE_TRANSITIONS;

pub const CONFIG_PATH_ENV: &str = "PROFICIENCY_CONFIG_PATH";

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
  #[serde(default)]
  pub settings: Settings,
  /// Built-in default config and HSK word list are loaded unless disabled.
  #[serde(default = "default_true")]
  pub include_seeds: bool,
  #[serde(default)]
  pub configs: Vec<ProficiencyConfig>,
  #[serde(default)]
  pub questions: Vec<Question>,
  /// Empty means the built-in reward table.
  #[serde(default)]
  pub rewards: Vec<RewardTier>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      settings: Settings::default(),
      include_seeds: true,
      configs: Vec::new(),
      questions: Vec::new(),
      rewards: Vec::new(),
    }
  }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
  /// Phase transitions a session may take before it is failed as stalled.
  pub max_phase_transitions: u32,
  /// Idle sessions older than this are dropped.
  pub session_ttl_secs: u64,
}

impl Default for Settings {
  fn default() -> Self {
    Self { max_phase_transitions: DEFAULT_MAX_PHASE_TRANSITIONS, session_ttl_secs: 3600 }
  }
}

fn default_true() -> bool {
  true
}

pub fn parse_app_config(s: &str) -> Result<AppConfig, toml::de::Error> {
  toml::from_str(s)
}

/// Attempt to load `AppConfig` from PROFICIENCY_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var(CONFIG_PATH_ENV).ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_app_config(&s) {
      Ok(cfg) => {
        info!(target: "caatuu_proficiency", %path, configs = cfg.configs.len(), questions = cfg.questions.len(), "Loaded proficiency config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "caatuu_proficiency", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "caatuu_proficiency", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Phase;

  #[test]
  fn empty_file_uses_defaults() {
    let cfg = parse_app_config("").unwrap();
    assert!(cfg.include_seeds);
    assert_eq!(cfg.settings, Settings::default());
    assert!(cfg.configs.is_empty() && cfg.rewards.is_empty());
  }

  #[test]
  fn parses_configs_questions_and_rewards() {
    let toml = r#"
      include_seeds = false

      [settings]
      max_phase_transitions = 4

      [[configs]]
      id = "short"
      name = "Short placement"
      isActive = true
      initialQuestions = [{ level = 1, count = 2 }]
      branches = [
        { name = "low", condition = { correctRange = [0, 1], fromPhase = "initial" }, resultLevel = 1 },
        { name = "high", condition = { correctRange = [2, 2], fromPhase = "initial" }, nextPhase = "final", nextQuestions = [{ level = 2, count = 1 }] },
      ]

      [[questions]]
      id = "custom-1"
      level = 1
      prompt = "苹果"
      answer = "apple"

      [[rewards]]
      level = 2
      coins = 7
    "#;
    let cfg = parse_app_config(toml).unwrap();
    assert!(!cfg.include_seeds);
    assert_eq!(cfg.settings.max_phase_transitions, 4);
    assert_eq!(cfg.settings.session_ttl_secs, 3600);
    assert_eq!(cfg.configs[0].id, "short");
    assert!(cfg.configs[0].is_active);
    assert_eq!(cfg.configs[0].branches[1].next_phase, Some(Phase::Final));
    assert_eq!(cfg.questions[0].alternatives.len(), 0);
    assert_eq!(cfg.rewards[0], RewardTier { level: 2, experience: 0, coins: 7 });
  }

  #[test]
  fn inverted_range_is_rejected_at_parse_time() {
    let toml = r#"
      [[configs]]
      name = "bad"
      initialQuestions = [{ level = 1, count = 2 }]
      branches = [{ name = "x", condition = { correctRange = [2, 0], fromPhase = "initial" }, resultLevel = 1 }]
    "#;
    assert!(parse_app_config(toml).is_err());
  }
}

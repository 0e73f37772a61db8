//! Where finished tests go: the result sink and the reward policy.
//!
//! The engine only produces a result level. Turning a level into experience and
//! coins is the reward policy's job, and the sink keeps one record per finished
//! session.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::{ResultRecord, Reward};
use crate::error::ProficiencyError;

#[async_trait]
pub trait ResultSink: Send + Sync {
  /// Persist the outcome of a completed session. Called once per session.
  async fn record_result(&self, record: ResultRecord) -> Result<(), ProficiencyError>;

  /// Results for one user, oldest first.
  async fn results_for_user(&self, user_id: &str) -> Vec<ResultRecord>;
}

#[derive(Default)]
pub struct InMemoryResultSink {
  records: RwLock<Vec<ResultRecord>>,
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
  async fn record_result(&self, record: ResultRecord) -> Result<(), ProficiencyError> {
    info!(target: "proficiency", user_id = %record.user_id, config_id = %record.config_id, result_level = record.result_level, "Proficiency result recorded");
    self.records.write().await.push(record);
    Ok(())
  }

  async fn results_for_user(&self, user_id: &str) -> Vec<ResultRecord> {
    self.records
      .read()
      .await
      .iter()
      .filter(|r| r.user_id == user_id)
      .cloned()
      .collect()
  }
}

pub trait RewardPolicy: Send + Sync {
  fn reward_for(&self, result_level: u32) -> Reward;
}

/// One row of the reward table (`[[rewards]]` in TOML).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RewardTier {
  pub level: u32,
  #[serde(default)]
  pub experience: u32,
  #[serde(default)]
  pub coins: u32,
}

/// Reward of the highest tier whose level does not exceed the result level.
/// Levels below every tier earn nothing.
#[derive(Clone, Debug)]
pub struct TableRewardPolicy {
  tiers: Vec<RewardTier>,
}

impl TableRewardPolicy {
  pub fn new(mut tiers: Vec<RewardTier>) -> Self {
    tiers.sort_by_key(|t| t.level);
    Self { tiers }
  }
}

impl RewardPolicy for TableRewardPolicy {
  fn reward_for(&self, result_level: u32) -> Reward {
    self.tiers
      .iter()
      .rev()
      .find(|t| t.level <= result_level)
      .map(|t| Reward { experience: t.experience, coins: t.coins })
      .unwrap_or_default()
  }
}

//! Config repository: stores proficiency configs and owns the "one active
//! config" invariant.
//!
//! Configs are validated before they are stored, so anything the repository
//! hands out has passed `validate_config`. Activation flips every flag under one
//! write lock. Configs are shared as `Arc` snapshots; a running session keeps the
//! snapshot it started with even if the config is edited or deactivated later.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::domain::ProficiencyConfig;
use crate::error::ProficiencyError;
use crate::validator::{validate_config, ValidationIssue, ValidationReport};

#[async_trait]
pub trait ConfigRepository: Send + Sync {
  async fn get_active_config(&self) -> Result<Arc<ProficiencyConfig>, ProficiencyError>;

  async fn get_config_by_id(&self, id: &str) -> Result<Arc<ProficiencyConfig>, ProficiencyError>;

  /// All configs in creation order, active or not.
  async fn list_configs(&self) -> Vec<Arc<ProficiencyConfig>>;

  /// Validate and store a new config. `is_active = true` activates it.
  async fn create_config(&self, config: ProficiencyConfig) -> Result<(Arc<ProficiencyConfig>, ValidationReport), ProficiencyError>;

  /// Validate and replace an existing config, keeping its id.
  async fn update_config(&self, id: &str, config: ProficiencyConfig) -> Result<(Arc<ProficiencyConfig>, ValidationReport), ProficiencyError>;

  /// Make `id` the only active config. Repeating it is a no-op.
  async fn activate_config(&self, id: &str) -> Result<Arc<ProficiencyConfig>, ProficiencyError>;

  async fn deactivate_config(&self, id: &str) -> Result<Arc<ProficiencyConfig>, ProficiencyError>;
}

#[derive(Default)]
pub struct InMemoryConfigRepository {
  configs: RwLock<Vec<Arc<ProficiencyConfig>>>,
}

impl InMemoryConfigRepository {
  pub fn new() -> Self {
    Self::default()
  }
}

/// Set `is_active` on every config so that only `id` is active.
fn set_only_active(configs: &mut [Arc<ProficiencyConfig>], id: &str) {
  for c in configs.iter_mut() {
    let should = c.id == id;
    if c.is_active != should {
      Arc::make_mut(c).is_active = should;
    }
  }
}

#[async_trait]
impl ConfigRepository for InMemoryConfigRepository {
  async fn get_active_config(&self) -> Result<Arc<ProficiencyConfig>, ProficiencyError> {
    self.configs
      .read()
      .await
      .iter()
      .find(|c| c.is_active)
      .cloned()
      .ok_or(ProficiencyError::NoActiveConfig)
  }

  async fn get_config_by_id(&self, id: &str) -> Result<Arc<ProficiencyConfig>, ProficiencyError> {
    self.configs
      .read()
      .await
      .iter()
      .find(|c| c.id == id)
      .cloned()
      .ok_or_else(|| ProficiencyError::ConfigNotFound(id.to_string()))
  }

  async fn list_configs(&self) -> Vec<Arc<ProficiencyConfig>> {
    self.configs.read().await.clone()
  }

  #[instrument(level = "info", skip(self, config), fields(config_id = %config.id, name = %config.name))]
  async fn create_config(&self, config: ProficiencyConfig) -> Result<(Arc<ProficiencyConfig>, ValidationReport), ProficiencyError> {
    let report = validate_config(&config)?;
    let mut configs = self.configs.write().await;
    if configs.iter().any(|c| c.id == config.id) {
      return Err(ProficiencyError::ConfigValidation(vec![ValidationIssue::DuplicateConfigId { id: config.id.clone() }]));
    }
    let activate = config.is_active;
    let id = config.id.clone();
    configs.push(Arc::new(config));
    if activate {
      set_only_active(&mut configs, &id);
    }
    let stored = configs.iter().find(|c| c.id == id).cloned().ok_or_else(|| ProficiencyError::ConfigNotFound(id.clone()))?;
    info!(target: "proficiency", config_id = %id, active = stored.is_active, warnings = report.warnings.len(), "Proficiency config created");
    Ok((stored, report))
  }

  #[instrument(level = "info", skip(self, config), fields(%id))]
  async fn update_config(&self, id: &str, mut config: ProficiencyConfig) -> Result<(Arc<ProficiencyConfig>, ValidationReport), ProficiencyError> {
    config.id = id.to_string();
    let report = validate_config(&config)?;
    let mut configs = self.configs.write().await;
    let slot = configs
      .iter()
      .position(|c| c.id == id)
      .ok_or_else(|| ProficiencyError::ConfigNotFound(id.to_string()))?;
    let activate = config.is_active;
    configs[slot] = Arc::new(config);
    if activate {
      set_only_active(&mut configs, id);
    }
    let stored = configs[slot].clone();
    info!(target: "proficiency", config_id = %id, active = stored.is_active, warnings = report.warnings.len(), "Proficiency config updated");
    Ok((stored, report))
  }

  #[instrument(level = "info", skip(self))]
  async fn activate_config(&self, id: &str) -> Result<Arc<ProficiencyConfig>, ProficiencyError> {
    let mut configs = self.configs.write().await;
    let slot = configs
      .iter()
      .position(|c| c.id == id)
      .ok_or_else(|| ProficiencyError::ConfigNotFound(id.to_string()))?;
    validate_config(&configs[slot])?;
    set_only_active(&mut configs, id);
    info!(target: "proficiency", config_id = %id, "Proficiency config activated");
    Ok(configs[slot].clone())
  }

  #[instrument(level = "info", skip(self))]
  async fn deactivate_config(&self, id: &str) -> Result<Arc<ProficiencyConfig>, ProficiencyError> {
    let mut configs = self.configs.write().await;
    let c = configs
      .iter_mut()
      .find(|c| c.id == id)
      .ok_or_else(|| ProficiencyError::ConfigNotFound(id.to_string()))?;
    if c.is_active {
      Arc::make_mut(c).is_active = false;
      info!(target: "proficiency", config_id = %id, "Proficiency config deactivated");
    }
    Ok(c.clone())
  }
}

//! Application state: config repository, question bank, result sink, reward
//! policy, the session orchestrator and the live session store.
//!
//! Live sessions are kept in memory keyed by id. Each entry holds the config
//! snapshot the session started with, so admin edits and re-activation never
//! reach a session that is already running. Every entry has its own lock;
//! submissions for one session are serialized without blocking the others.

use std::{collections::HashMap, sync::Arc};

use chrono::{Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::bank::{InMemoryQuestionBank, QuestionBank};
use crate::config::{load_app_config_from_env, AppConfig, Settings};
use crate::domain::ProficiencyConfig;
use crate::error::ProficiencyError;
use crate::repository::{ConfigRepository, InMemoryConfigRepository};
use crate::results::{InMemoryResultSink, ResultSink, RewardPolicy, TableRewardPolicy};
use crate::seeds::{default_config, default_reward_tiers, seed_questions};
use crate::session::{SessionOrchestrator, TestSession};

// One year; keeps timestamp arithmetic in range.
const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 3600;

/// A running (or just finished) session and the config it is pinned to.
pub struct LiveSession {
    pub session: TestSession,
    pub config: Arc<ProficiencyConfig>,
}

pub type SessionHandle = Arc<Mutex<LiveSession>>;

#[derive(Clone)]
pub struct AppState {
    pub configs: Arc<dyn ConfigRepository>,
    pub results: Arc<dyn ResultSink>,
    pub rewards: Arc<dyn RewardPolicy>,
    pub orchestrator: SessionOrchestrator,
    pub sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
    pub settings: Settings,
}

impl AppState {
    /// Build state from env: load TOML config if present, otherwise built-in seeds only.
    pub async fn new() -> Self {
        let cfg = load_app_config_from_env().unwrap_or_default();
        Self::from_config(cfg).await
    }

    /// Build state from an already-parsed config: seed the bank and repository,
    /// skipping (and logging) configs that fail validation.
    #[instrument(level = "info", skip_all)]
    pub async fn from_config(cfg: AppConfig) -> Self {
        let mut questions = if cfg.include_seeds { seed_questions() } else { Vec::new() };
        questions.extend(cfg.questions);
        let bank = InMemoryQuestionBank::new(questions);
        for (level, count) in bank.inventory().await {
            info!(target: "proficiency", level, count, "Startup question inventory");
        }

        let repo = InMemoryConfigRepository::new();
        let mut configs = Vec::new();
        if cfg.include_seeds {
            configs.push(default_config());
        }
        configs.extend(cfg.configs);
        for c in configs {
            let (id, name) = (c.id.clone(), c.name.clone());
            if let Err(e) = repo.create_config(c).await {
                error!(target: "proficiency", config_id = %id, %name, error = %e, "Skipping invalid proficiency config");
            }
        }
        match repo.get_active_config().await {
            Ok(active) => info!(target: "proficiency", config_id = %active.id, name = %active.name, "Active proficiency config"),
            Err(_) => warn!(target: "proficiency", "No active proficiency config; tests cannot start until one is activated"),
        }

        let tiers = if cfg.rewards.is_empty() { default_reward_tiers() } else { cfg.rewards };

        Self {
            configs: Arc::new(repo),
            results: Arc::new(InMemoryResultSink::default()),
            rewards: Arc::new(TableRewardPolicy::new(tiers)),
            orchestrator: SessionOrchestrator::new(Arc::new(bank) as Arc<dyn QuestionBank>, cfg.settings.max_phase_transitions),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            settings: cfg.settings,
        }
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.settings.session_ttl_secs.min(MAX_SESSION_TTL_SECS) as i64)
    }

    #[instrument(level = "debug", skip(self, live), fields(session_id = %live.session.id))]
    pub async fn insert_session(&self, live: LiveSession) {
        let id = live.session.id;
        self.sessions.write().await.insert(id, Arc::new(Mutex::new(live)));
    }

    pub async fn remove_session(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    /// Handle to a live session. Expired sessions are dropped and reported as such.
    pub async fn session_handle(&self, id: Uuid) -> Result<SessionHandle, ProficiencyError> {
        let handle = { self.sessions.read().await.get(&id).cloned() }.ok_or(ProficiencyError::SessionNotFound(id))?;
        let idle_since = handle.lock().await.session.updated_at;
        if Utc::now() - idle_since > self.ttl() {
            self.remove_session(id).await;
            info!(target: "proficiency", session_id = %id, "Session expired");
            return Err(ProficiencyError::SessionExpired(id));
        }
        Ok(handle)
    }

    /// Drop sessions idle for longer than the TTL. Sessions busy with a
    /// submission are kept.
    pub async fn sweep_expired(&self) -> usize {
        let cutoff = Utc::now() - self.ttl();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(live) => live.session.updated_at >= cutoff,
            Err(_) => true,
        });
        let swept = before - sessions.len();
        if swept > 0 {
            info!(target: "proficiency", swept, "Expired idle sessions");
        }
        swept
    }
}

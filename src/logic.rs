//! Service operations behind the HTTP handlers.
//!
//! This includes:
//!   - Starting a proficiency test against the active config
//!   - Judging submitted answers and advancing the session by one phase
//!   - Recording the result (and its reward) when a session finishes
//!   - Admin operations on configs (create, update, activate, dry-run validation)

use chrono::Utc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::domain::{AnswerOutcome, ProficiencyConfig, ResultRecord};
use crate::error::ProficiencyError;
use crate::protocol::*;
use crate::session::SessionStep;
use crate::state::{AppState, LiveSession};
use crate::util::trunc_for_log;
use crate::validator::validate_config;

#[instrument(level = "info", skip(state))]
pub async fn start_test(state: &AppState, user_id: &str) -> Result<StartOut, ProficiencyError> {
  state.sweep_expired().await;
  // Resolved once; the session keeps this snapshot for its whole life.
  let config = state.configs.get_active_config().await?;
  let (session, questions) = state.orchestrator.start(&config, user_id).await?;

  let out = StartOut {
    session_id: session.id,
    config_id: config.id.clone(),
    config_name: config.name.clone(),
    cost: config.cost,
    phase: session.phase,
    questions: questions_out(&questions),
  };
  state.insert_session(LiveSession { session, config }).await;
  Ok(out)
}

/// Judge answers against the questions of the current phase. Unknown question
/// ids are kept (and count as wrong) so the session can ignore them itself.
fn judge(live: &LiveSession, answers: &[AnswerIn]) -> Vec<AnswerOutcome> {
  answers
    .iter()
    .map(|a| {
      let correct = live
        .session
        .pending_questions
        .iter()
        .find(|q| q.id == a.question_id)
        .is_some_and(|q| q.accepts(&a.answer));
      debug!(target: "proficiency", question_id = %a.question_id, answer = %trunc_for_log(&a.answer, 40), correct, "Answer judged");
      AnswerOutcome { question_id: a.question_id.clone(), correct }
    })
    .collect()
}

#[instrument(level = "info", skip(state, answers), fields(answers = answers.len()))]
pub async fn submit_phase(state: &AppState, session_id: Uuid, answers: &[AnswerIn]) -> Result<SubmitOut, ProficiencyError> {
  let handle = state.session_handle(session_id).await?;
  let mut live = handle.lock().await;
  if live.session.is_terminal() {
    return Err(ProficiencyError::SessionFinished(session_id));
  }

  let outcomes = judge(&live, answers);
  let step = match state.orchestrator.advance_phase(&live.session, &live.config, &outcomes).await {
    Ok(step) => step,
    // The learner can fix the submission; the session stays as it was.
    Err(e @ ProficiencyError::IncompleteAnswers { .. }) => {
      info!(target: "proficiency", %session_id, error = %e, "Submission rejected");
      return Err(e);
    }
    Err(e) => {
      // Every engine failure is fatal to the session.
      error!(target: "proficiency", %session_id, config_id = %live.config.id, code = e.code(), error = %e, "Proficiency session failed");
      drop(live);
      state.remove_session(session_id).await;
      return Err(e);
    }
  };

  match step {
    SessionStep::Continue { session, questions } => {
      let last = session.history.last();
      let out = SubmitOut::Continue {
        session_id,
        phase: session.phase,
        correct_count: last.map(|h| h.correct_count).unwrap_or_default(),
        matched_branch: last.map(|h| h.matched_branch.clone()).unwrap_or_default(),
        questions: questions_out(&questions),
      };
      live.session = session;
      Ok(out)
    }
    SessionStep::Done { session, result_level, history } => {
      let reward = state.rewards.reward_for(result_level);
      let record = ResultRecord {
        id: Uuid::new_v4(),
        session_id,
        user_id: session.user_id.clone(),
        config_id: session.config_id.clone(),
        result_level,
        history: history.clone(),
        reward,
        completed_at: Utc::now(),
      };
      // Only a recorded result finishes the session; on failure it can be resubmitted.
      state.results.record_result(record).await?;
      live.session = session;
      info!(target: "proficiency", %session_id, result_level, experience = reward.experience, coins = reward.coins, "Proficiency test completed");
      Ok(SubmitOut::Done { session_id, result_level, history, reward })
    }
  }
}

#[instrument(level = "debug", skip(state))]
pub async fn get_session(state: &AppState, session_id: Uuid) -> Result<SessionOut, ProficiencyError> {
  let handle = state.session_handle(session_id).await?;
  let live = handle.lock().await;
  Ok(session_out(&live.session))
}

pub async fn results_for_user(state: &AppState, user_id: &str) -> Vec<ResultRecord> {
  state.results.results_for_user(user_id).await
}

// -------- Admin --------

pub async fn list_configs(state: &AppState) -> Vec<ProficiencyConfig> {
  state.configs.list_configs().await.iter().map(|c| c.as_ref().clone()).collect()
}

pub async fn get_config(state: &AppState, id: &str) -> Result<ProficiencyConfig, ProficiencyError> {
  Ok(state.configs.get_config_by_id(id).await?.as_ref().clone())
}

pub async fn create_config(state: &AppState, config: ProficiencyConfig) -> Result<ConfigSavedOut, ProficiencyError> {
  let (stored, report) = state.configs.create_config(config).await?;
  Ok(config_saved_out(&stored, report))
}

pub async fn update_config(state: &AppState, id: &str, config: ProficiencyConfig) -> Result<ConfigSavedOut, ProficiencyError> {
  let (stored, report) = state.configs.update_config(id, config).await?;
  Ok(config_saved_out(&stored, report))
}

pub async fn activate_config(state: &AppState, id: &str) -> Result<ProficiencyConfig, ProficiencyError> {
  Ok(state.configs.activate_config(id).await?.as_ref().clone())
}

pub async fn deactivate_config(state: &AppState, id: &str) -> Result<ProficiencyConfig, ProficiencyError> {
  Ok(state.configs.deactivate_config(id).await?.as_ref().clone())
}

/// Dry run: report what saving this config would say, without storing it.
pub fn validate_only(config: &ProficiencyConfig) -> ValidationOut {
  match validate_config(config) {
    Ok(report) => ValidationOut { valid: true, issues: vec![], warnings: report.warnings },
    Err(ProficiencyError::ConfigValidation(issues)) => ValidationOut { valid: false, issues, warnings: vec![] },
    Err(e) => {
      error!(target: "proficiency", error = %e, "Unexpected validation failure");
      ValidationOut { valid: false, issues: vec![], warnings: vec![] }
    }
  }
}

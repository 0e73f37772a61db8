//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Failures come back as `ProficiencyError`, which renders itself as `{error, code}`.

use std::sync::Arc;
use axum::{extract::{Path, State}, Json, response::IntoResponse};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{ProficiencyConfig, ResultRecord};
use crate::error::ProficiencyError;
use crate::protocol::*;
use crate::state::AppState;
use crate::logic::*;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id))]
pub async fn http_start_test(
  State(state): State<Arc<AppState>>,
  Json(body): Json<StartIn>,
) -> Result<Json<StartOut>, ProficiencyError> {
  let out = start_test(&state, &body.user_id).await?;
  info!(target: "caatuu_proficiency", session_id = %out.session_id, config_id = %out.config_id, questions = out.questions.len(), "HTTP test started");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(%id, answers = body.answers.len()))]
pub async fn http_submit_phase(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SubmitIn>,
) -> Result<Json<SubmitOut>, ProficiencyError> {
  Ok(Json(submit_phase(&state, id, &body.answers).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionOut>, ProficiencyError> {
  Ok(Json(get_session(&state, id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_results(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
) -> Json<Vec<ResultRecord>> {
  Json(results_for_user(&state, &user_id).await)
}

// -------- Admin --------

#[instrument(level = "info", skip(state))]
pub async fn http_list_configs(State(state): State<Arc<AppState>>) -> Json<Vec<ProficiencyConfig>> {
  Json(list_configs(&state).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_config(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<ProficiencyConfig>, ProficiencyError> {
  Ok(Json(get_config(&state, &id).await?))
}

#[instrument(level = "info", skip(state, body), fields(name = %body.name))]
pub async fn http_create_config(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ProficiencyConfig>,
) -> Result<Json<ConfigSavedOut>, ProficiencyError> {
  let out = create_config(&state, body).await?;
  info!(target: "caatuu_proficiency", config_id = %out.config.id, warnings = out.warnings.len(), "HTTP config created");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_update_config(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<ProficiencyConfig>,
) -> Result<Json<ConfigSavedOut>, ProficiencyError> {
  let out = update_config(&state, &id, body).await?;
  info!(target: "caatuu_proficiency", config_id = %id, warnings = out.warnings.len(), "HTTP config updated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_activate_config(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<ProficiencyConfig>, ProficiencyError> {
  Ok(Json(activate_config(&state, &id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_deactivate_config(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<ProficiencyConfig>, ProficiencyError> {
  Ok(Json(deactivate_config(&state, &id).await?))
}

#[instrument(level = "info", skip(body), fields(name = %body.name))]
pub async fn http_validate_config(Json(body): Json<ProficiencyConfig>) -> Json<ValidationOut> {
  let out = validate_only(&body);
  info!(target: "caatuu_proficiency", valid = out.valid, issues = out.issues.len(), warnings = out.warnings.len(), "HTTP config validated");
  Json(out)
}

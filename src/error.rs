//! Error taxonomy for the proficiency engine and its HTTP mapping.
//!
//! None of these are retried: each one describes a structural problem (config
//! coverage, runaway phase graph, thin question bank) or a caller mistake.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::Phase;
use crate::validator::ValidationIssue;

#[derive(Debug, Error)]
pub enum ProficiencyError {
  /// Coverage gap found at run time.
  #[error("no branch of config '{config_id}' matches phase '{phase}' with {correct_count} correct")]
  NoMatchingBranch { config_id: String, phase: Phase, correct_count: u32 },

  #[error("config validation failed: {}", summarize(.0))]
  ConfigValidation(Vec<ValidationIssue>),

  #[error("session {session_id} exceeded {cap} phase transitions on config '{config_id}'")]
  TestSessionStalled { session_id: Uuid, config_id: String, cap: u32 },

  #[error("insufficient questions at level {level}: requested {requested}, available {available}")]
  InsufficientQuestions { level: u32, requested: u32, available: u32 },

  #[error("no proficiency config is active")]
  NoActiveConfig,

  #[error("proficiency config not found: {0}")]
  ConfigNotFound(String),

  #[error("session not found: {0}")]
  SessionNotFound(Uuid),

  #[error("session already finished: {0}")]
  SessionFinished(Uuid),

  #[error("session expired: {0}")]
  SessionExpired(Uuid),

  /// Each pending question needs exactly one answer before the phase is scored.
  #[error("session {session_id} expects one answer for each of {expected} questions, got {answered} usable")]
  IncompleteAnswers { session_id: Uuid, expected: u32, answered: u32 },

  #[error("branch '{branch}' of config '{config_id}' has no usable outcome")]
  MalformedBranch { config_id: String, branch: String },
}

fn summarize(issues: &[ValidationIssue]) -> String {
  issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl ProficiencyError {
  pub fn code(&self) -> &'static str {
    match self {
      ProficiencyError::NoMatchingBranch { .. } => "NO_MATCHING_BRANCH",
      ProficiencyError::ConfigValidation(_) => "CONFIG_VALIDATION",
      ProficiencyError::TestSessionStalled { .. } => "TEST_SESSION_STALLED",
      ProficiencyError::InsufficientQuestions { .. } => "INSUFFICIENT_QUESTIONS",
      ProficiencyError::NoActiveConfig => "NO_ACTIVE_CONFIG",
      ProficiencyError::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
      ProficiencyError::SessionNotFound(_) => "SESSION_NOT_FOUND",
      ProficiencyError::SessionFinished(_) => "SESSION_FINISHED",
      ProficiencyError::SessionExpired(_) => "SESSION_EXPIRED",
      ProficiencyError::IncompleteAnswers { .. } => "INCOMPLETE_ANSWERS",
      ProficiencyError::MalformedBranch { .. } => "MALFORMED_BRANCH",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ProficiencyError::ConfigNotFound(_) | ProficiencyError::SessionNotFound(_) => StatusCode::NOT_FOUND,
      ProficiencyError::SessionFinished(_) => StatusCode::CONFLICT,
      ProficiencyError::SessionExpired(_) => StatusCode::GONE,
      ProficiencyError::ConfigValidation(_) | ProficiencyError::IncompleteAnswers { .. } => {
        StatusCode::UNPROCESSABLE_ENTITY
      }
      ProficiencyError::NoActiveConfig | ProficiencyError::InsufficientQuestions { .. } => {
        StatusCode::SERVICE_UNAVAILABLE
      }
      ProficiencyError::NoMatchingBranch { .. }
      | ProficiencyError::TestSessionStalled { .. }
      | ProficiencyError::MalformedBranch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  pub code: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub issues: Vec<ValidationIssue>,
}

impl IntoResponse for ProficiencyError {
  fn into_response(self) -> axum::response::Response {
    let status = self.status();
    let body = ErrorResponse {
      error: self.to_string(),
      code: self.code().into(),
      issues: match self {
        ProficiencyError::ConfigValidation(issues) => issues,
        _ => Vec::new(),
      },
    };
    (status, Json(body)).into_response()
  }
}

//! Public protocol structs for the HTTP endpoints (serde ready, camelCase).
//! Answers never leave the server: questions go out as `QuestionOut`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Phase, PhaseResult, ProficiencyConfig, Question, Reward};
use crate::pinyin::prompt_pinyin;
use crate::session::{SessionStatus, TestSession};
use crate::validator::{ValidationIssue, ValidationReport, ValidationWarning};

/// DTO for a question as shown to the test-taker.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub id: String,
    pub level: u32,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinyin: Option<String>,
}

pub fn question_out(q: &Question) -> QuestionOut {
    QuestionOut {
        id: q.id.clone(),
        level: q.level,
        prompt: q.prompt.clone(),
        pinyin: prompt_pinyin(&q.prompt),
    }
}

pub fn questions_out(questions: &[Question]) -> Vec<QuestionOut> {
    questions.iter().map(question_out).collect()
}

//
// Test-taker DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartIn {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOut {
    pub session_id: Uuid,
    pub config_id: String,
    pub config_name: String,
    pub cost: u32,
    pub phase: Phase,
    pub questions: Vec<QuestionOut>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerIn {
    pub question_id: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitIn {
    #[serde(default)]
    pub answers: Vec<AnswerIn>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOut {
    #[serde(rename_all = "camelCase")]
    Continue {
        session_id: Uuid,
        phase: Phase,
        correct_count: u32,
        matched_branch: String,
        questions: Vec<QuestionOut>,
    },
    #[serde(rename_all = "camelCase")]
    Done {
        session_id: Uuid,
        result_level: u32,
        history: Vec<PhaseResult>,
        reward: Reward,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub id: Uuid,
    pub user_id: String,
    pub config_id: String,
    pub phase: Phase,
    pub status: SessionStatus,
    pub correct_so_far: u32,
    pub history: Vec<PhaseResult>,
    pub pending_questions: Vec<QuestionOut>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn session_out(s: &TestSession) -> SessionOut {
    SessionOut {
        id: s.id,
        user_id: s.user_id.clone(),
        config_id: s.config_id.clone(),
        phase: s.phase,
        status: s.status.clone(),
        correct_so_far: s.correct_so_far,
        history: s.history.clone(),
        pending_questions: questions_out(&s.pending_questions),
        started_at: s.started_at,
        updated_at: s.updated_at,
    }
}

//
// Admin DTOs
//

#[derive(Debug, Serialize)]
pub struct ConfigSavedOut {
    pub config: ProficiencyConfig,
    pub warnings: Vec<ValidationWarning>,
}

pub fn config_saved_out(config: &ProficiencyConfig, report: ValidationReport) -> ConfigSavedOut {
    ConfigSavedOut { config: config.clone(), warnings: report.warnings }
}

#[derive(Debug, Serialize)]
pub struct ValidationOut {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

//! Domain models: phases, question plans, branch rules, proficiency configs,
//! vocabulary questions and the permanent result record of a finished test.

use std::{fmt, num::NonZeroU32};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::normalize_answer;

/// Phase of a proficiency test.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
  Initial,
  Followup,
  Final,
}

impl Phase {
  pub const ALL: [Phase; 3] = [Phase::Initial, Phase::Followup, Phase::Final];

  pub fn as_str(&self) -> &'static str {
    match self {
      Phase::Initial => "initial",
      Phase::Followup => "followup",
      Phase::Final => "final",
    }
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How many questions to draw from one difficulty level.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionPlanEntry {
  pub level: NonZeroU32,
  pub count: NonZeroU32,
}

impl QuestionPlanEntry {
  /// Returns None when either value is zero.
  pub fn new(level: u32, count: u32) -> Option<Self> {
    Some(Self { level: NonZeroU32::new(level)?, count: NonZeroU32::new(count)? })
  }
}

/// Total number of questions a plan asks (and so the most answers that can be correct).
pub fn plan_total(plan: &[QuestionPlanEntry]) -> u64 {
  plan.iter().map(|e| u64::from(e.count.get())).sum()
}

/// Inclusive `[min, max]` range of correct answers. Serialized as `[min, max]`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct CorrectRange {
  min: u32,
  max: u32,
}

impl CorrectRange {
  pub fn new(min: u32, max: u32) -> Result<Self, String> {
    Self::try_from((min, max))
  }

  /// Range between two bounds given in either order.
  pub fn spanning(a: u32, b: u32) -> Self {
    Self { min: a.min(b), max: a.max(b) }
  }

  pub fn min(&self) -> u32 { self.min }
  pub fn max(&self) -> u32 { self.max }

  pub fn contains(&self, n: u32) -> bool {
    self.min <= n && n <= self.max
  }

  /// Intersection of two ranges, if any.
  pub fn overlap(&self, other: &CorrectRange) -> Option<(u32, u32)> {
    let lo = self.min.max(other.min);
    let hi = self.max.min(other.max);
    (lo <= hi).then_some((lo, hi))
  }
}

impl TryFrom<(u32, u32)> for CorrectRange {
  type Error = String;

  fn try_from((min, max): (u32, u32)) -> Result<Self, Self::Error> {
    if min > max {
      return Err(format!("correctRange min ({min}) must not exceed max ({max})"));
    }
    Ok(Self { min, max })
  }
}

impl From<CorrectRange> for (u32, u32) {
  fn from(r: CorrectRange) -> Self { (r.min, r.max) }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BranchCondition {
  pub correct_range: CorrectRange,
  pub from_phase: Phase,
}

/// A branch rule. Terminal when `result_level` is set, continuing when `next_phase` is set.
/// Exactly one of the two must be present; the validator reports anything else.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
  pub name: String,
  pub condition: BranchCondition,
  #[serde(default)]
  pub next_questions: Vec<QuestionPlanEntry>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result_level: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_phase: Option<Phase>,
}

/// Well-formed reading of a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchOutcome<'a> {
  Terminal { result_level: u32 },
  Continue { next_phase: Phase, next_questions: &'a [QuestionPlanEntry] },
}

impl Branch {
  /// None for a malformed branch: both or neither outcome set, a continuing branch
  /// with an empty plan, or one that leads back to `initial`.
  pub fn outcome(&self) -> Option<BranchOutcome<'_>> {
    match (self.result_level, self.next_phase) {
      (Some(result_level), None) => Some(BranchOutcome::Terminal { result_level }),
      (None, Some(next_phase)) if next_phase != Phase::Initial && !self.next_questions.is_empty() => {
        Some(BranchOutcome::Continue { next_phase, next_questions: &self.next_questions })
      }
      _ => None,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self.outcome(), Some(BranchOutcome::Terminal { .. }))
  }
}

fn new_config_id() -> String {
  Uuid::new_v4().to_string()
}

/// Administrator-authored proficiency test definition.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProficiencyConfig {
  #[serde(default = "new_config_id")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// Coins charged to take the test.
  #[serde(default)]
  pub cost: u32,
  pub initial_questions: Vec<QuestionPlanEntry>,
  #[serde(default)]
  pub branches: Vec<Branch>,
  #[serde(default)]
  pub is_active: bool,
}

impl ProficiencyConfig {
  pub fn branches_from(&self, phase: Phase) -> impl Iterator<Item = &Branch> {
    self.branches.iter().filter(move |b| b.condition.from_phase == phase)
  }
}

/// Vocabulary question: a Chinese prompt and the accepted English meanings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  pub level: u32,
  pub prompt: String,
  pub answer: String,
  #[serde(default)]
  pub alternatives: Vec<String>,
}

impl Question {
  /// Judge a free-text answer, ignoring case, whitespace and punctuation.
  pub fn accepts(&self, answer: &str) -> bool {
    let given = normalize_answer(answer);
    if given.is_empty() {
      return false;
    }
    std::iter::once(&self.answer)
      .chain(self.alternatives.iter())
      .any(|a| normalize_answer(a) == given)
  }
}

/// A judged answer to one question.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
  pub question_id: String,
  pub correct: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseResult {
  pub phase: Phase,
  pub questions_asked: u32,
  pub correct_count: u32,
  pub matched_branch: String,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reward {
  pub experience: u32,
  pub coins: u32,
}

/// Permanent summary of a completed test.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
  pub id: Uuid,
  pub session_id: Uuid,
  pub user_id: String,
  pub config_id: String,
  pub result_level: u32,
  pub history: Vec<PhaseResult>,
  pub reward: Reward,
  pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn branch(result_level: Option<u32>, next_phase: Option<Phase>, plan: Vec<QuestionPlanEntry>) -> Branch {
    Branch {
      name: "b".into(),
      condition: BranchCondition { correct_range: CorrectRange::new(0, 1).unwrap(), from_phase: Phase::Initial },
      next_questions: plan,
      result_level,
      next_phase,
    }
  }

  #[test]
  fn correct_range_rejects_inverted_bounds() {
    assert!(CorrectRange::new(5, 3).is_err());
    let err = serde_json::from_str::<CorrectRange>("[4, 2]").unwrap_err();
    assert!(err.to_string().contains("must not exceed"));
    let r: CorrectRange = serde_json::from_str("[3, 8]").unwrap();
    assert!(r.contains(3) && r.contains(8) && !r.contains(9));
  }

  #[test]
  fn plan_entry_rejects_zero_count() {
    assert!(serde_json::from_str::<QuestionPlanEntry>(r#"{"level":1,"count":0}"#).is_err());
    assert!(QuestionPlanEntry::new(1, 0).is_none());
  }

  #[test]
  fn branch_outcome_requires_exactly_one_of_level_or_phase() {
    let plan = vec![QuestionPlanEntry::new(1, 2).unwrap()];
    assert_eq!(branch(Some(3), None, vec![]).outcome(), Some(BranchOutcome::Terminal { result_level: 3 }));
    assert!(matches!(
      branch(None, Some(Phase::Final), plan.clone()).outcome(),
      Some(BranchOutcome::Continue { next_phase: Phase::Final, .. })
    ));
    assert!(branch(Some(3), Some(Phase::Final), plan.clone()).outcome().is_none());
    assert!(branch(None, None, vec![]).outcome().is_none());
    assert!(branch(None, Some(Phase::Final), vec![]).outcome().is_none());
    assert!(branch(None, Some(Phase::Initial), plan).outcome().is_none());
  }

  #[test]
  fn config_deserializes_from_camel_case_json() {
    let json = r#"{
      "name": "HSK placement",
      "cost": 20,
      "initialQuestions": [{"level": 1, "count": 2}],
      "branches": [
        {"name": "low", "condition": {"correctRange": [0, 1], "fromPhase": "initial"}, "resultLevel": 1},
        {"name": "high", "condition": {"correctRange": [2, 2], "fromPhase": "initial"},
         "nextPhase": "final", "nextQuestions": [{"level": 2, "count": 3}]}
      ]
    }"#;
    let cfg: ProficiencyConfig = serde_json::from_str(json).unwrap();
    assert!(!cfg.id.is_empty());
    assert!(!cfg.is_active);
    assert_eq!(cfg.branches_from(Phase::Initial).count(), 2);
    assert!(cfg.branches[0].is_terminal());
    assert_eq!(plan_total(&cfg.branches[1].next_questions), 3);
  }

  #[test]
  fn question_accepts_alternatives_and_ignores_punctuation() {
    let q = Question {
      id: "q1".into(),
      level: 1,
      prompt: "吃".into(),
      answer: "to eat".into(),
      alternatives: vec!["eat".into()],
    };
    assert!(q.accepts("To eat!"));
    assert!(q.accepts("  eat "));
    assert!(!q.accepts("drink"));
    assert!(!q.accepts(""));
  }
}

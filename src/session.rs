//! Test-session orchestration: the phase state machine.
//!
//! A session starts in `initial` with the config's initial plan. Each completed
//! phase is scored, the matching branch is selected, and the session either ends
//! with that branch's result level or moves to the branch's `next_phase` with its
//! question plan. A phase is scored only once every question in it has exactly
//! one answer. The phase graph comes from the config; the only guard against a
//! runaway graph is the transition cap.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::bank::QuestionBank;
use crate::domain::{AnswerOutcome, BranchOutcome, Phase, PhaseResult, ProficiencyConfig, Question, QuestionPlanEntry};
use crate::error::ProficiencyError;
use crate::evaluator::select_branch;

pub const DEFAULT_MAX_PHASE_TRANSITIONS: u32 = 10;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
  InProgress,
  Terminal {
    #[serde(rename = "resultLevel")]
    result_level: u32,
  },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSession {
  pub id: Uuid,
  pub user_id: String,
  /// Pinned at start; never re-resolved.
  pub config_id: String,
  pub phase: Phase,
  pub status: SessionStatus,
  pub correct_so_far: u32,
  pub transitions: u32,
  pub history: Vec<PhaseResult>,
  /// Questions asked in the current phase, awaiting answers.
  pub pending_questions: Vec<Question>,
  pub started_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl TestSession {
  pub fn is_terminal(&self) -> bool {
    matches!(self.status, SessionStatus::Terminal { .. })
  }

  /// Correct answers among the pending questions, each question counted once.
  pub fn count_correct(&self, answers: &[AnswerOutcome]) -> u32 {
    let pending: HashSet<&str> = self.pending_questions.iter().map(|q| q.id.as_str()).collect();
    let mut credited = HashSet::new();
    let n = answers
      .iter()
      .filter(|a| a.correct && pending.contains(a.question_id.as_str()))
      .filter(|a| credited.insert(a.question_id.as_str()))
      .count();
    u32::try_from(n).unwrap_or(u32::MAX)
  }

  /// Whether every pending question has exactly one answer. Answers to other
  /// questions are ignored.
  fn check_complete(&self, answers: &[AnswerOutcome]) -> Result<(), ProficiencyError> {
    let mut per_question: HashMap<&str, u32> = self.pending_questions.iter().map(|q| (q.id.as_str(), 0)).collect();
    for a in answers {
      if let Some(n) = per_question.get_mut(a.question_id.as_str()) {
        *n += 1;
      }
    }
    let answered = per_question.values().filter(|&&n| n == 1).count();
    if answered == per_question.len() {
      return Ok(());
    }
    Err(ProficiencyError::IncompleteAnswers {
      session_id: self.id,
      expected: u32::try_from(per_question.len()).unwrap_or(u32::MAX),
      answered: u32::try_from(answered).unwrap_or(u32::MAX),
    })
  }
}

#[derive(Debug)]
pub enum SessionStep {
  /// The session moved to another phase; ask `questions` next.
  Continue { session: TestSession, questions: Vec<Question> },
  /// A terminal branch matched. `session` is the final, terminal state.
  Done { session: TestSession, result_level: u32, history: Vec<PhaseResult> },
}

/// Drives sessions through phases against a question bank.
#[derive(Clone)]
pub struct SessionOrchestrator {
  bank: Arc<dyn QuestionBank>,
  max_transitions: u32,
}

impl SessionOrchestrator {
  pub fn new(bank: Arc<dyn QuestionBank>, max_transitions: u32) -> Self {
    Self { bank, max_transitions }
  }

  pub fn max_transitions(&self) -> u32 {
    self.max_transitions
  }

  /// Fetch a whole plan with one draw per level, so entries sharing a level
  /// never repeat a question. Any shortfall fails the whole plan.
  async fn fetch_plan(&self, plan: &[QuestionPlanEntry]) -> Result<Vec<Question>, ProficiencyError> {
    let mut per_level: Vec<(u32, u32)> = Vec::new();
    for entry in plan {
      let (level, count) = (entry.level.get(), entry.count.get());
      match per_level.iter_mut().find(|(l, _)| *l == level) {
        Some((_, total)) => *total = total.saturating_add(count),
        None => per_level.push((level, count)),
      }
    }

    let mut questions = Vec::new();
    for (level, count) in per_level {
      questions.extend(self.bank.fetch_questions(level, count).await?);
    }
    Ok(questions)
  }

  #[instrument(level = "info", skip(self, config), fields(config_id = %config.id))]
  pub async fn start(&self, config: &ProficiencyConfig, user_id: &str) -> Result<(TestSession, Vec<Question>), ProficiencyError> {
    let questions = self.fetch_plan(&config.initial_questions).await?;
    let now = Utc::now();
    let session = TestSession {
      id: Uuid::new_v4(),
      user_id: user_id.to_string(),
      config_id: config.id.clone(),
      phase: Phase::Initial,
      status: SessionStatus::InProgress,
      correct_so_far: 0,
      transitions: 0,
      history: Vec::new(),
      pending_questions: questions.clone(),
      started_at: now,
      updated_at: now,
    };
    info!(target: "proficiency", session_id = %session.id, %user_id, questions = questions.len(), "Proficiency session started");
    Ok((session, questions))
  }

  /// Score the phase just answered and move the session on.
  ///
  /// `config` must be the config the session was started with.
  #[instrument(level = "info", skip(self, session, config, answers), fields(session_id = %session.id, phase = %session.phase))]
  pub async fn advance_phase(
    &self,
    session: &TestSession,
    config: &ProficiencyConfig,
    answers: &[AnswerOutcome],
  ) -> Result<SessionStep, ProficiencyError> {
    if session.is_terminal() {
      return Err(ProficiencyError::SessionFinished(session.id));
    }
    if config.id != session.config_id {
      return Err(ProficiencyError::ConfigNotFound(session.config_id.clone()));
    }

    session.check_complete(answers)?;
    let correct_count = session.count_correct(answers);
    let branch = select_branch(config, session.phase, correct_count)?;
    let phase_result = PhaseResult {
      phase: session.phase,
      questions_asked: u32::try_from(session.pending_questions.len()).unwrap_or(u32::MAX),
      correct_count,
      matched_branch: branch.name.clone(),
    };

    let mut next = session.clone();
    next.correct_so_far = next.correct_so_far.saturating_add(correct_count);
    next.updated_at = Utc::now();

    match branch.outcome() {
      Some(BranchOutcome::Terminal { result_level }) => {
        next.history.push(phase_result);
        next.pending_questions.clear();
        next.status = SessionStatus::Terminal { result_level };
        info!(target: "proficiency", session_id = %next.id, branch = %branch.name, correct_count, result_level, "Proficiency session finished");
        let history = next.history.clone();
        Ok(SessionStep::Done { session: next, result_level, history })
      }
      Some(BranchOutcome::Continue { next_phase, next_questions }) => {
        if next.transitions >= self.max_transitions {
          error!(target: "proficiency", session_id = %next.id, cap = self.max_transitions, "Phase transition cap reached");
          return Err(ProficiencyError::TestSessionStalled {
            session_id: next.id,
            config_id: next.config_id.clone(),
            cap: self.max_transitions,
          });
        }
        let questions = self.fetch_plan(next_questions).await?;
        next.history.push(phase_result);
        next.transitions += 1;
        next.phase = next_phase;
        next.pending_questions = questions.clone();
        info!(target: "proficiency", session_id = %next.id, branch = %branch.name, correct_count, %next_phase, questions = questions.len(), "Proficiency session advanced");
        Ok(SessionStep::Continue { session: next, questions })
      }
      None => Err(ProficiencyError::MalformedBranch { config_id: config.id.clone(), branch: branch.name.clone() }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bank::tests::bank_with;
  use crate::domain::{Branch, BranchCondition, CorrectRange};
  use crate::seeds::default_config;
  use crate::validator::validate_config;

  fn plan(entries: &[(u32, u32)]) -> Vec<QuestionPlanEntry> {
    entries.iter().map(|&(l, c)| QuestionPlanEntry::new(l, c).unwrap()).collect()
  }

  fn terminal(name: &str, phase: Phase, range: (u32, u32), level: u32) -> Branch {
    Branch {
      name: name.into(),
      condition: BranchCondition { correct_range: CorrectRange::new(range.0, range.1).unwrap(), from_phase: phase },
      next_questions: vec![],
      result_level: Some(level),
      next_phase: None,
    }
  }

  fn continuing(name: &str, phase: Phase, range: (u32, u32), next: Phase, next_plan: &[(u32, u32)]) -> Branch {
    Branch {
      name: name.into(),
      condition: BranchCondition { correct_range: CorrectRange::new(range.0, range.1).unwrap(), from_phase: phase },
      next_questions: plan(next_plan),
      result_level: None,
      next_phase: Some(next),
    }
  }

  /// Eight initial questions (2 × L1, 3 × L2, 3 × L3) routed through followup or final.
  fn placement_config() -> ProficiencyConfig {
    ProficiencyConfig {
      id: "placement".into(),
      name: "Placement".into(),
      description: String::new(),
      cost: 0,
      initial_questions: plan(&[(1, 2), (2, 3), (3, 3)]),
      branches: vec![
        continuing("initial-none", Phase::Initial, (0, 0), Phase::Final, &[(1, 4)]),
        continuing("initial-low", Phase::Initial, (1, 3), Phase::Followup, &[(2, 4)]),
        continuing("initial-mid", Phase::Initial, (4, 6), Phase::Followup, &[(3, 4)]),
        continuing("initial-top", Phase::Initial, (7, 8), Phase::Final, &[(4, 4), (5, 5), (6, 5)]),
        terminal("followup-low", Phase::Followup, (0, 1), 2),
        terminal("followup-mid", Phase::Followup, (2, 3), 3),
        terminal("followup-top", Phase::Followup, (4, 4), 4),
        terminal("final-low", Phase::Final, (0, 4), 1),
        terminal("final-mid", Phase::Final, (5, 9), 5),
        terminal("final-top", Phase::Final, (10, 14), 6),
      ],
      is_active: true,
    }
  }

  fn orchestrator() -> SessionOrchestrator {
    SessionOrchestrator::new(Arc::new(bank_with(1..=6, 6)), DEFAULT_MAX_PHASE_TRANSITIONS)
  }

  /// Mark the first `correct` pending questions right and the rest wrong.
  fn answer(questions: &[Question], correct: usize) -> Vec<AnswerOutcome> {
    questions
      .iter()
      .enumerate()
      .map(|(i, q)| AnswerOutcome { question_id: q.id.clone(), correct: i < correct })
      .collect()
  }

  fn expect_continue(step: SessionStep) -> (TestSession, Vec<Question>) {
    match step {
      SessionStep::Continue { session, questions } => (session, questions),
      SessionStep::Done { result_level, .. } => panic!("expected to continue, finished at level {result_level}"),
    }
  }

  #[tokio::test]
  async fn start_asks_the_initial_plan() {
    let orch = orchestrator();
    let cfg = placement_config();
    let (session, questions) = orch.start(&cfg, "user-1").await.unwrap();
    assert_eq!(questions.len(), 8);
    assert_eq!(questions.iter().filter(|q| q.level == 1).count(), 2);
    assert_eq!(questions.iter().filter(|q| q.level == 3).count(), 3);
    assert_eq!(session.phase, Phase::Initial);
    assert_eq!(session.config_id, "placement");
    assert_eq!(session.pending_questions.len(), 8);
  }

  #[tokio::test]
  async fn all_wrong_in_initial_goes_to_final_with_level_one_questions() {
    let orch = orchestrator();
    let cfg = placement_config();
    let (session, questions) = orch.start(&cfg, "user-1").await.unwrap();

    let step = orch.advance_phase(&session, &cfg, &answer(&questions, 0)).await.unwrap();
    let (session, questions) = expect_continue(step);
    assert_eq!(session.phase, Phase::Final);
    assert_eq!(questions.len(), 4);
    assert!(questions.iter().all(|q| q.level == 1));
    assert_eq!(
      session.history,
      vec![PhaseResult { phase: Phase::Initial, questions_asked: 8, correct_count: 0, matched_branch: "initial-none".into() }]
    );

    match orch.advance_phase(&session, &cfg, &answer(&questions, 0)).await.unwrap() {
      SessionStep::Done { result_level, history, .. } => {
        assert_eq!(result_level, 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].matched_branch, "final-low");
      }
      other => panic!("expected Done, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn seven_of_eight_then_twelve_of_fourteen_reaches_level_six() {
    let orch = orchestrator();
    let cfg = placement_config();
    let (session, questions) = orch.start(&cfg, "user-2").await.unwrap();

    let (session, questions) = expect_continue(orch.advance_phase(&session, &cfg, &answer(&questions, 7)).await.unwrap());
    assert_eq!(session.phase, Phase::Final);
    assert_eq!(session.history[0].matched_branch, "initial-top");
    assert_eq!(questions.len(), 14);
    assert_eq!(questions.iter().filter(|q| q.level == 5).count(), 5);

    match orch.advance_phase(&session, &cfg, &answer(&questions, 12)).await.unwrap() {
      SessionStep::Done { session, result_level, history } => {
        assert_eq!(result_level, 6);
        assert_eq!(history.last().map(|h| h.correct_count), Some(12));
        assert_eq!(session.correct_so_far, 19);
        assert_eq!(session.status, SessionStatus::Terminal { result_level: 6 });
        assert!(session.pending_questions.is_empty());
      }
      other => panic!("expected Done, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn terminal_session_cannot_be_rescored() {
    let orch = orchestrator();
    let cfg = placement_config();
    let (session, questions) = orch.start(&cfg, "user-3").await.unwrap();
    let (session, questions) = expect_continue(orch.advance_phase(&session, &cfg, &answer(&questions, 2)).await.unwrap());
    assert_eq!(session.phase, Phase::Followup);
    let SessionStep::Done { session, result_level, .. } = orch.advance_phase(&session, &cfg, &answer(&questions, 4)).await.unwrap() else {
      panic!("expected Done");
    };
    assert_eq!(result_level, 4);
    assert!(matches!(
      orch.advance_phase(&session, &cfg, &[]).await,
      Err(ProficiencyError::SessionFinished(id)) if id == session.id
    ));
  }

  #[tokio::test]
  async fn phase_is_not_scored_until_every_question_is_answered() {
    let orch = orchestrator();
    let cfg = placement_config();
    let (session, questions) = orch.start(&cfg, "user-3").await.unwrap();

    assert!(matches!(
      orch.advance_phase(&session, &cfg, &[]).await,
      Err(ProficiencyError::IncompleteAnswers { expected: 8, answered: 0, .. })
    ));

    let mut partial = answer(&questions, 8);
    partial.pop();
    assert!(matches!(
      orch.advance_phase(&session, &cfg, &partial).await,
      Err(ProficiencyError::IncompleteAnswers { expected: 8, answered: 7, .. })
    ));

    let mut twice = answer(&questions, 8);
    twice.push(twice[0].clone());
    assert!(matches!(
      orch.advance_phase(&session, &cfg, &twice).await,
      Err(ProficiencyError::IncompleteAnswers { expected: 8, answered: 7, .. })
    ));

    let mut with_stray = answer(&questions, 0);
    with_stray.push(AnswerOutcome { question_id: "not-asked".into(), correct: true });
    let (next, _) = expect_continue(orch.advance_phase(&session, &cfg, &with_stray).await.unwrap());
    assert_eq!(next.history[0].correct_count, 0);
  }

  #[tokio::test]
  async fn plan_entries_sharing_a_level_draw_distinct_questions() {
    let cfg = ProficiencyConfig {
      id: "split".into(),
      name: "Split".into(),
      description: String::new(),
      cost: 0,
      initial_questions: plan(&[(1, 2), (1, 2)]),
      branches: vec![terminal("low", Phase::Initial, (0, 3), 1), terminal("all", Phase::Initial, (4, 4), 2)],
      is_active: true,
    };
    validate_config(&cfg).unwrap();

    let thin = SessionOrchestrator::new(Arc::new(bank_with(1..=1, 3)), DEFAULT_MAX_PHASE_TRANSITIONS);
    assert!(matches!(
      thin.start(&cfg, "user-9").await,
      Err(ProficiencyError::InsufficientQuestions { level: 1, requested: 4, available: 3 })
    ));

    let exact = SessionOrchestrator::new(Arc::new(bank_with(1..=1, 4)), DEFAULT_MAX_PHASE_TRANSITIONS);
    for _ in 0..20 {
      let (session, questions) = exact.start(&cfg, "user-9").await.unwrap();
      let ids: HashSet<_> = questions.iter().map(|q| q.id.as_str()).collect();
      assert_eq!(ids.len(), 4);
      let SessionStep::Done { result_level, .. } = exact.advance_phase(&session, &cfg, &answer(&questions, 4)).await.unwrap() else {
        panic!("expected Done");
      };
      assert_eq!(result_level, 2);
    }
  }

  #[tokio::test]
  async fn answers_outside_the_phase_and_duplicates_do_not_count() {
    let orch = orchestrator();
    let cfg = placement_config();
    let (session, questions) = orch.start(&cfg, "user-4").await.unwrap();
    let mut answers = answer(&questions, 1);
    answers.push(answers[0].clone());
    answers.push(AnswerOutcome { question_id: "not-asked".into(), correct: true });
    assert_eq!(session.count_correct(&answers), 1);
  }

  #[tokio::test]
  async fn cyclic_graph_stalls_at_the_cap() {
    let cfg = ProficiencyConfig {
      id: "loop".into(),
      name: "Loop".into(),
      description: String::new(),
      cost: 0,
      initial_questions: plan(&[(1, 1)]),
      branches: vec![
        continuing("enter", Phase::Initial, (0, 1), Phase::Followup, &[(1, 1)]),
        continuing("again", Phase::Followup, (0, 1), Phase::Followup, &[(1, 1)]),
      ],
      is_active: true,
    };
    assert!(validate_config(&cfg).is_err());

    let orch = SessionOrchestrator::new(Arc::new(bank_with(1..=1, 3)), 3);
    let (mut session, mut questions) = orch.start(&cfg, "user-5").await.unwrap();
    let mut transitions = 0;
    loop {
      match orch.advance_phase(&session, &cfg, &answer(&questions, 0)).await {
        Ok(SessionStep::Continue { session: s, questions: q }) => {
          transitions += 1;
          session = s;
          questions = q;
        }
        Ok(SessionStep::Done { .. }) => panic!("looping config must not finish"),
        Err(ProficiencyError::TestSessionStalled { cap, .. }) => {
          assert_eq!(cap, 3);
          break;
        }
        Err(e) => panic!("unexpected error: {e}"),
      }
    }
    assert_eq!(transitions, 3);
  }

  #[tokio::test]
  async fn validated_retry_loop_still_stops_at_the_cap() {
    let cfg = ProficiencyConfig {
      id: "retry".into(),
      name: "Retry".into(),
      description: String::new(),
      cost: 0,
      initial_questions: plan(&[(1, 1)]),
      branches: vec![
        continuing("enter", Phase::Initial, (0, 1), Phase::Followup, &[(1, 1)]),
        continuing("again", Phase::Followup, (0, 0), Phase::Followup, &[(1, 1)]),
        terminal("pass", Phase::Followup, (1, 1), 2),
      ],
      is_active: true,
    };
    validate_config(&cfg).unwrap();

    let orch = SessionOrchestrator::new(Arc::new(bank_with(1..=1, 3)), 4);
    let (mut session, mut questions) = orch.start(&cfg, "user-10").await.unwrap();
    let mut transitions = 0;
    let err = loop {
      match orch.advance_phase(&session, &cfg, &answer(&questions, 0)).await {
        Ok(SessionStep::Continue { session: s, questions: q }) => {
          transitions += 1;
          session = s;
          questions = q;
        }
        Ok(SessionStep::Done { .. }) => panic!("a learner who never answers right must not finish"),
        Err(e) => break e,
      }
    };
    assert!(matches!(err, ProficiencyError::TestSessionStalled { cap: 4, .. }));
    assert_eq!(transitions, 4);

    let SessionStep::Done { result_level, .. } = orch.advance_phase(&session, &cfg, &answer(&questions, 1)).await.unwrap() else {
      panic!("a right answer leaves the loop");
    };
    assert_eq!(result_level, 2);
  }

  #[tokio::test]
  async fn thin_bank_fails_the_transition() {
    let orch = SessionOrchestrator::new(Arc::new(bank_with(1..=3, 3)), DEFAULT_MAX_PHASE_TRANSITIONS);
    let cfg = placement_config();
    let (session, questions) = orch.start(&cfg, "user-6").await.unwrap();
    // initial-low asks 4 level-2 questions; the bank only has 3.
    let err = orch.advance_phase(&session, &cfg, &answer(&questions, 1)).await.unwrap_err();
    assert!(matches!(err, ProficiencyError::InsufficientQuestions { level: 2, requested: 4, available: 3 }));
  }

  #[tokio::test]
  async fn coverage_gap_surfaces_at_run_time() {
    let mut cfg = placement_config();
    cfg.branches.retain(|b| b.name != "followup-mid");
    let orch = orchestrator();
    let (session, questions) = orch.start(&cfg, "user-7").await.unwrap();
    let (session, questions) = expect_continue(orch.advance_phase(&session, &cfg, &answer(&questions, 5)).await.unwrap());
    let err = orch.advance_phase(&session, &cfg, &answer(&questions, 3)).await.unwrap_err();
    assert!(matches!(err, ProficiencyError::NoMatchingBranch { phase: Phase::Followup, correct_count: 3, .. }));
  }

  #[tokio::test]
  async fn validated_configs_always_terminate() {
    let orch = orchestrator();
    for cfg in [placement_config(), default_config()] {
      validate_config(&cfg).unwrap();
      for first in 0..=8usize {
        for second in 0..=14usize {
          let (mut session, mut questions) = orch.start(&cfg, "user-8").await.unwrap();
          let mut score = first;
          let mut steps = 0;
          loop {
            steps += 1;
            assert!(steps <= DEFAULT_MAX_PHASE_TRANSITIONS + 1);
            match orch.advance_phase(&session, &cfg, &answer(&questions, score)).await.unwrap() {
              SessionStep::Continue { session: s, questions: q } => {
                session = s;
                questions = q;
                score = second;
              }
              SessionStep::Done { result_level, .. } => {
                assert!(result_level >= 1);
                break;
              }
            }
          }
        }
      }
    }
  }
}

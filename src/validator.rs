//! Structural validation of proficiency configs, run when an administrator
//! creates or updates one.
//!
//! Every reachable phase must have branches covering each correct count from 0 up
//! to the largest question plan that leads into it. Phases may loop, but every
//! loop must have a way out to a terminal branch; a loop that can never finish is
//! rejected. All issues are collected in one pass; overlaps and other smells come
//! back as warnings.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::domain::{plan_total, Phase, ProficiencyConfig};
use crate::error::ProficiencyError;

/// A problem that blocks a config from being stored or activated.
#[derive(Clone, Debug, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
  #[error("config name is empty")]
  EmptyName,
  #[error("initial question plan is empty")]
  EmptyInitialPlan,
  #[error("phase '{phase}' has no branch for {from}..={to} correct")]
  CoverageGap { phase: Phase, from: u32, to: u32 },
  #[error("branch '{branch}' sets both resultLevel and nextPhase")]
  AmbiguousOutcome { branch: String },
  #[error("branch '{branch}' sets neither resultLevel nor nextPhase")]
  MissingOutcome { branch: String },
  #[error("branch '{branch}' continues without nextQuestions")]
  EmptyNextQuestions { branch: String },
  #[error("branch '{branch}' cannot lead back to the initial phase")]
  InvalidNextPhase { branch: String },
  #[error("branch '{branch}' assigns result level 0")]
  ZeroResultLevel { branch: String },
  #[error("a config with id '{id}' already exists")]
  DuplicateConfigId { id: String },
  #[error("phases {phases:?} loop with no terminal branch reachable")]
  InescapableCycle { phases: Vec<Phase> },
}

/// A smell that does not block the config.
#[derive(Clone, Debug, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
  #[error("branches '{first}' and '{second}' overlap on {from}..={to} in phase '{phase}'; '{first}' wins")]
  Overlap { phase: Phase, first: String, second: String, from: u32, to: u32 },
  #[error("phase '{phase}' is unreachable but declares {branches} branch(es)")]
  UnreachablePhase { phase: Phase, branches: usize },
  #[error("branch name '{branch}' is used more than once")]
  DuplicateBranchName { branch: String },
  #[error("terminal branch '{branch}' declares nextQuestions that are never asked")]
  UnusedNextQuestions { branch: String },
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct ValidationReport {
  pub warnings: Vec<ValidationWarning>,
}

#[instrument(level = "debug", skip(config), fields(config_id = %config.id))]
pub fn validate_config(config: &ProficiencyConfig) -> Result<ValidationReport, ProficiencyError> {
  let mut issues = Vec::new();
  let mut warnings = Vec::new();

  if config.name.trim().is_empty() {
    issues.push(ValidationIssue::EmptyName);
  }
  if config.initial_questions.is_empty() {
    issues.push(ValidationIssue::EmptyInitialPlan);
  }

  check_branch_shapes(config, &mut issues, &mut warnings);

  let max_in = reachable_phases(config);
  for (&phase, &max) in &max_in {
    check_coverage(config, phase, max, &mut issues, &mut warnings);
  }

  for phase in Phase::ALL {
    let declared = config.branches_from(phase).count();
    if declared > 0 && !max_in.contains_key(&phase) {
      warnings.push(ValidationWarning::UnreachablePhase { phase, branches: declared });
    }
  }

  let finishing = phases_that_can_finish(config, &max_in);
  let trapped: Vec<Phase> = phases_on_cycles(config, &max_in).into_iter().filter(|p| !finishing.contains(p)).collect();
  if !trapped.is_empty() {
    issues.push(ValidationIssue::InescapableCycle { phases: trapped });
  }

  for w in &warnings {
    warn!(target: "proficiency", config_id = %config.id, warning = %w, "Config validation warning");
  }

  if issues.is_empty() {
    Ok(ValidationReport { warnings })
  } else {
    Err(ProficiencyError::ConfigValidation(issues))
  }
}

fn check_branch_shapes(config: &ProficiencyConfig, issues: &mut Vec<ValidationIssue>, warnings: &mut Vec<ValidationWarning>) {
  let mut seen = BTreeSet::new();
  for b in &config.branches {
    let branch = b.name.clone();
    if !seen.insert(b.name.as_str()) {
      warnings.push(ValidationWarning::DuplicateBranchName { branch: branch.clone() });
    }
    match (b.result_level, b.next_phase) {
      (Some(_), Some(_)) => issues.push(ValidationIssue::AmbiguousOutcome { branch }),
      (None, None) => issues.push(ValidationIssue::MissingOutcome { branch }),
      (Some(level), None) => {
        if level == 0 {
          issues.push(ValidationIssue::ZeroResultLevel { branch: branch.clone() });
        }
        if !b.next_questions.is_empty() {
          warnings.push(ValidationWarning::UnusedNextQuestions { branch });
        }
      }
      (None, Some(next)) => {
        if next == Phase::Initial {
          issues.push(ValidationIssue::InvalidNextPhase { branch: branch.clone() });
        }
        if b.next_questions.is_empty() {
          issues.push(ValidationIssue::EmptyNextQuestions { branch });
        }
      }
    }
  }
}

/// Reachable phases mapped to the most questions any plan leading into them asks.
fn reachable_phases(config: &ProficiencyConfig) -> BTreeMap<Phase, u64> {
  let mut max_in = BTreeMap::from([(Phase::Initial, plan_total(&config.initial_questions))]);
  let mut queue = vec![Phase::Initial];
  while let Some(phase) = queue.pop() {
    for b in config.branches_from(phase) {
      let Some(next) = b.next_phase.filter(|p| *p != Phase::Initial) else { continue };
      let total = plan_total(&b.next_questions);
      match max_in.get_mut(&next) {
        Some(max) => *max = (*max).max(total),
        None => {
          max_in.insert(next, total);
          queue.push(next);
        }
      }
    }
  }
  max_in
}

fn check_coverage(
  config: &ProficiencyConfig,
  phase: Phase,
  max: u64,
  issues: &mut Vec<ValidationIssue>,
  warnings: &mut Vec<ValidationWarning>,
) {
  let branches: Vec<_> = config.branches_from(phase).collect();

  for (i, a) in branches.iter().enumerate() {
    for b in &branches[i + 1..] {
      if let Some((from, to)) = a.condition.correct_range.overlap(&b.condition.correct_range) {
        warnings.push(ValidationWarning::Overlap {
          phase,
          first: a.name.clone(),
          second: b.name.clone(),
          from,
          to,
        });
      }
    }
  }

  let mut ranges: Vec<(u64, u64)> = branches
    .iter()
    .map(|b| (u64::from(b.condition.correct_range.min()), u64::from(b.condition.correct_range.max())))
    .collect();
  ranges.sort_unstable();

  let clamp = |n: u64| u32::try_from(n).unwrap_or(u32::MAX);
  let mut next_uncovered = 0u64;
  for (min, max_r) in ranges {
    if next_uncovered > max {
      break;
    }
    if min > next_uncovered {
      let to = (min - 1).min(max);
      issues.push(ValidationIssue::CoverageGap { phase, from: clamp(next_uncovered), to: clamp(to) });
    }
    next_uncovered = next_uncovered.max(max_r + 1);
  }
  if next_uncovered <= max {
    issues.push(ValidationIssue::CoverageGap { phase, from: clamp(next_uncovered), to: clamp(max) });
  }
}

fn successors(config: &ProficiencyConfig, reachable: &BTreeMap<Phase, u64>, phase: Phase) -> BTreeSet<Phase> {
  config
    .branches_from(phase)
    .filter(|b| b.result_level.is_none())
    .filter_map(|b| b.next_phase)
    .filter(|p| *p != Phase::Initial && reachable.contains_key(p))
    .collect()
}

/// Reachable phases from which some run of answers reaches a terminal branch.
fn phases_that_can_finish(config: &ProficiencyConfig, reachable: &BTreeMap<Phase, u64>) -> BTreeSet<Phase> {
  let mut finishing: BTreeSet<Phase> = reachable
    .keys()
    .copied()
    .filter(|&p| config.branches_from(p).any(|b| b.is_terminal()))
    .collect();
  loop {
    let before = finishing.len();
    for &p in reachable.keys() {
      if !finishing.contains(&p) && successors(config, reachable, p).iter().any(|s| finishing.contains(s)) {
        finishing.insert(p);
      }
    }
    if finishing.len() == before {
      return finishing;
    }
  }
}

/// Reachable phases that can lead back to themselves.
fn phases_on_cycles(config: &ProficiencyConfig, reachable: &BTreeMap<Phase, u64>) -> Vec<Phase> {
  let next_of = |phase: Phase| successors(config, reachable, phase);

  reachable
    .keys()
    .copied()
    .filter(|&start| {
      let mut visited = BTreeSet::new();
      let mut stack: Vec<Phase> = next_of(start).into_iter().collect();
      while let Some(p) = stack.pop() {
        if p == start {
          return true;
        }
        if visited.insert(p) {
          stack.extend(next_of(p));
        }
      }
      false
    })
    .collect()
}

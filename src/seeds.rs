//! Built-in content: a default placement config, a small HSK vocabulary bank and
//! a reward table. Together they make the service usable without a TOML file.

use crate::domain::{Branch, BranchCondition, CorrectRange, Phase, ProficiencyConfig, Question, QuestionPlanEntry};
use crate::results::RewardTier;

pub const DEFAULT_CONFIG_ID: &str = "hsk-placement-default";

fn plan(entries: &[(u32, u32)]) -> Vec<QuestionPlanEntry> {
  entries
    .iter()
    .filter_map(|&(level, count)| QuestionPlanEntry::new(level, count))
    .collect()
}

fn condition(from_phase: Phase, min: u32, max: u32) -> BranchCondition {
  BranchCondition { correct_range: CorrectRange::spanning(min, max), from_phase }
}

fn ends(name: &str, from: Phase, min: u32, max: u32, level: u32) -> Branch {
  Branch {
    name: name.into(),
    condition: condition(from, min, max),
    next_questions: vec![],
    result_level: Some(level),
    next_phase: None,
  }
}

fn goes(name: &str, from: Phase, min: u32, max: u32, next: Phase, next_plan: &[(u32, u32)]) -> Branch {
  Branch {
    name: name.into(),
    condition: condition(from, min, max),
    next_questions: plan(next_plan),
    result_level: None,
    next_phase: Some(next),
  }
}

/// Eight initial questions across HSK 1–3. Weak starts get a short
/// followup; a near-perfect start goes straight to a 14-question final on HSK 4–6.
pub fn default_config() -> ProficiencyConfig {
  use Phase::*;
  ProficiencyConfig {
    id: DEFAULT_CONFIG_ID.into(),
    name: "HSK placement".into(),
    description: "Places a learner between HSK 1 and HSK 6.".into(),
    cost: 20,
    initial_questions: plan(&[(1, 2), (2, 3), (3, 3)]),
    branches: vec![
      goes("no-correct", Initial, 0, 0, Final, &[(1, 4)]),
      goes("few-correct", Initial, 1, 3, Followup, &[(2, 3), (3, 3)]),
      goes("many-correct", Initial, 4, 6, Followup, &[(3, 3), (4, 3)]),
      goes("near-perfect", Initial, 7, 8, Final, &[(4, 4), (5, 5), (6, 5)]),
      ends("followup-weak", Followup, 0, 2, 2),
      ends("followup-fair", Followup, 3, 4, 3),
      ends("followup-strong", Followup, 5, 6, 4),
      ends("final-weak", Final, 0, 4, 1),
      ends("final-fair", Final, 5, 9, 5),
      ends("final-strong", Final, 10, 14, 6),
    ],
    is_active: true,
  }
}

/// Six words per HSK level: (prompt, meaning, alternatives).
const SEED_WORDS: [[(&str, &str, &[&str]); 6]; 6] = [
  [
    ("你好", "hello", &["hi"]),
    ("谢谢", "thank you", &["thanks"]),
    ("水", "water", &[]),
    ("吃", "to eat", &["eat"]),
    ("大", "big", &["large"]),
    ("朋友", "friend", &[]),
  ],
  [
    ("咖啡", "coffee", &[]),
    ("准备", "to prepare", &["prepare"]),
    ("旅游", "to travel", &["travel", "tourism"]),
    ("便宜", "cheap", &["inexpensive"]),
    ("快乐", "happy", &["joyful"]),
    ("身体", "body", &["health"]),
  ],
  [
    ("环境", "environment", &[]),
    ("决定", "to decide", &["decide", "decision"]),
    ("健康", "healthy", &["health"]),
    ("简单", "simple", &["easy"]),
    ("经常", "often", &["frequently"]),
    ("担心", "to worry", &["worry"]),
  ],
  [
    ("经验", "experience", &[]),
    ("责任", "responsibility", &["duty"]),
    ("积极", "positive", &["active"]),
    ("竞争", "competition", &["to compete", "compete"]),
    ("效率", "efficiency", &[]),
    ("专业", "major", &["profession", "professional"]),
  ],
  [
    ("催", "to urge", &["urge", "hurry"]),
    ("形势", "situation", &[]),
    ("谨慎", "cautious", &["careful", "prudent"]),
    ("维护", "to maintain", &["maintain", "safeguard"]),
    ("诊断", "diagnosis", &["to diagnose", "diagnose"]),
    ("妥协", "compromise", &["to compromise"]),
  ],
  [
    ("斟酌", "to deliberate", &["deliberate", "consider carefully"]),
    ("潜移默化", "imperceptible influence", &["subtle influence"]),
    ("拮据", "short of money", &["hard up", "strapped for cash"]),
    ("孜孜不倦", "diligent", &["tireless", "assiduous"]),
    ("蔓延", "to spread", &["spread"]),
    ("悖论", "paradox", &[]),
  ],
];

pub fn seed_questions() -> Vec<Question> {
  SEED_WORDS
    .iter()
    .zip(1u32..)
    .flat_map(|(words, level)| {
      words.iter().enumerate().map(move |(n, (prompt, answer, alternatives))| Question {
        id: format!("hsk{level}-{n:02}"),
        level,
        prompt: (*prompt).into(),
        answer: (*answer).into(),
        alternatives: alternatives.iter().map(|a| (*a).to_string()).collect(),
      })
    })
    .collect()
}

pub fn default_reward_tiers() -> Vec<RewardTier> {
  (1..=6)
    .map(|level| RewardTier { level, experience: 50 * level, coins: 5 * level })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  #[test]
  fn seed_bank_has_six_unique_words_per_level() {
    let questions = seed_questions();
    assert_eq!(questions.len(), 36);
    let ids: HashSet<_> = questions.iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids.len(), 36);
    for level in 1..=6 {
      assert_eq!(questions.iter().filter(|q| q.level == level).count(), 6);
    }
  }

  #[test]
  fn default_plans_fit_the_seed_bank() {
    let cfg = default_config();
    let plans = std::iter::once(&cfg.initial_questions).chain(cfg.branches.iter().map(|b| &b.next_questions));
    for plan in plans {
      for entry in plan {
        assert!(entry.count.get() <= 6 && entry.level.get() <= 6);
      }
    }
  }
}

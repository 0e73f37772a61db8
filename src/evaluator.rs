//! Branch selection: maps `(phase, correct_count)` to the branch rule that applies.
//!
//! Pure lookup. Among the branches declared for `phase`, the first one (in
//! declaration order) whose inclusive correct range holds `correct_count` wins.
//! A count no branch covers is a hard failure; the evaluator never guesses a level.

use tracing::{debug, instrument, warn};

use crate::domain::{Branch, Phase, ProficiencyConfig};
use crate::error::ProficiencyError;

#[instrument(level = "debug", skip(config), fields(config_id = %config.id))]
pub fn select_branch(config: &ProficiencyConfig, phase: Phase, correct_count: u32) -> Result<&Branch, ProficiencyError> {
  let mut matching = config
    .branches_from(phase)
    .filter(|b| b.condition.correct_range.contains(correct_count));

  let Some(chosen) = matching.next() else {
    warn!(target: "proficiency", config_id = %config.id, %phase, correct_count, "No branch covers this result");
    return Err(ProficiencyError::NoMatchingBranch {
      config_id: config.id.clone(),
      phase,
      correct_count,
    });
  };

  let shadowed = matching.count();
  if shadowed > 0 {
    debug!(target: "proficiency", branch = %chosen.name, shadowed, "Overlapping ranges; first declared branch wins");
  }
  Ok(chosen)
}

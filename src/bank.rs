//! Question bank: where the orchestrator draws vocabulary questions from.
//!
//! The bank must hand out exactly what a plan asks for or fail; asking fewer
//! questions than planned would change what the correct ranges mean.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::domain::Question;
use crate::error::ProficiencyError;

#[async_trait]
pub trait QuestionBank: Send + Sync {
  /// Draw `count` distinct questions at `level`.
  async fn fetch_questions(&self, level: u32, count: u32) -> Result<Vec<Question>, ProficiencyError>;
}

/// In-memory bank keyed by level. Draws are random without replacement.
#[derive(Default)]
pub struct InMemoryQuestionBank {
  by_level: RwLock<HashMap<u32, Vec<Question>>>,
}

impl InMemoryQuestionBank {
  pub fn new(questions: impl IntoIterator<Item = Question>) -> Self {
    let mut by_level: HashMap<u32, Vec<Question>> = HashMap::new();
    for q in questions {
      let pool = by_level.entry(q.level).or_default();
      // Later entries replace earlier ones with the same id.
      pool.retain(|existing| existing.id != q.id);
      pool.push(q);
    }
    Self { by_level: RwLock::new(by_level) }
  }

  /// Inventory summary: question count per level.
  pub async fn inventory(&self) -> BTreeMap<u32, usize> {
    self.by_level.read().await.iter().map(|(level, pool)| (*level, pool.len())).collect()
  }
}

#[async_trait]
impl QuestionBank for InMemoryQuestionBank {
  #[instrument(level = "debug", skip(self))]
  async fn fetch_questions(&self, level: u32, count: u32) -> Result<Vec<Question>, ProficiencyError> {
    let by_level = self.by_level.read().await;
    let pool = by_level.get(&level).map(Vec::as_slice).unwrap_or_default();

    if pool.len() < count as usize {
      warn!(target: "proficiency", level, requested = count, available = pool.len(), "Question bank too thin for plan");
      return Err(ProficiencyError::InsufficientQuestions {
        level,
        requested: count,
        available: u32::try_from(pool.len()).unwrap_or(u32::MAX),
      });
    }

    let drawn: Vec<Question> = {
      let mut rng = rand::thread_rng();
      pool.choose_multiple(&mut rng, count as usize).cloned().collect()
    };
    debug!(target: "proficiency", level, count, "Drew questions");
    Ok(drawn)
  }
}

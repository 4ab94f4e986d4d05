use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::market::ScoreMap;
use super::traits::ScoreProvider;

/// Score provider backed by a precomputed table, e.g. scores produced by a
/// separate screening job. Symbols missing from the table have no score.
pub struct StaticScoreProvider {
    scores: ScoreMap,
}

impl StaticScoreProvider {
    pub fn new(scores: ScoreMap) -> Self {
        Self {
            scores: scores
                .into_iter()
                .map(|(s, v)| (s.to_uppercase(), v))
                .collect(),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl ScoreProvider for StaticScoreProvider {
    fn name(&self) -> &str {
        "Static scores"
    }

    async fn get_score(&self, symbol: &str) -> Result<Option<f64>, CoreError> {
        Ok(self.scores.get(&symbol.to_uppercase()).copied())
    }
}

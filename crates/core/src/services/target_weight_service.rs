use log::{debug, warn};
use std::collections::{HashMap, HashSet};

use crate::models::market::{ScoreMap, Weights};
use crate::models::settings::EngineConfig;

/// Turns quality scores into a concentration-capped target allocation.
///
/// 1. Keep candidates with a positive score; if none, weight all candidates equally.
/// 2. Normalize scores to sum to 1.
/// 3. Cap at `cap`, hand the surplus to entries still below the cap in
///    proportion to their weight, repeat until the surplus vanishes.
/// 4. Renormalize and add unscored candidates back at 0.
///
/// When fewer than `1 / cap` candidates have a positive score the cap cannot
/// hold for all of them at once. Those entries are then weighted equally at
/// `1 / n`, which sits above the nominal cap but is the smallest possible
/// maximum weight.
#[derive(Debug, Clone, Copy)]
pub struct TargetWeightService {
    cap: f64,
    epsilon: f64,
    max_iterations: usize,
}

impl Default for TargetWeightService {
    fn default() -> Self {
        Self::new(0.25)
    }
}

impl TargetWeightService {
    pub fn new(cap: f64) -> Self {
        Self {
            cap,
            epsilon: 1e-9,
            max_iterations: 100,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            cap: config.concentration_cap,
            epsilon: config.solver_epsilon,
            max_iterations: config.solver_max_iterations,
        }
    }

    #[must_use]
    pub fn with_cap(mut self, cap: f64) -> Self {
        self.cap = cap;
        self
    }

    pub fn cap(&self) -> f64 {
        self.cap
    }

    /// Target weight for every candidate. The result always covers the
    /// full (de-duplicated) candidate set and sums to 1 when non-empty.
    pub fn suggest_weights(&self, candidates: &[String], scores: &ScoreMap) -> Weights {
        let mut seen = HashSet::new();
        let candidates: Vec<&String> = candidates
            .iter()
            .filter(|c| seen.insert(*c))
            .collect();

        let positive: Vec<(&String, f64)> = candidates
            .iter()
            .filter_map(|c| {
                let score = scores.get(c.as_str()).copied().unwrap_or(0.0);
                (score.is_finite() && score > 0.0).then_some((*c, score))
            })
            .collect();

        if positive.is_empty() {
            let n = candidates.len();
            if n > 0 {
                debug!("No positive scores among {n} candidates; weighting equally");
            }
            return candidates
                .into_iter()
                .map(|c| (c.clone(), 1.0 / n as f64))
                .collect();
        }

        let mut weights = if (positive.len() as f64) * self.cap < 1.0 - self.epsilon {
            debug!(
                "Cap {} is infeasible for {} scored candidates; weighting them equally",
                self.cap,
                positive.len()
            );
            let n = positive.len() as f64;
            positive
                .iter()
                .map(|(c, _)| ((*c).clone(), 1.0 / n))
                .collect::<HashMap<String, f64>>()
        } else {
            self.capped_weights(&positive)
        };

        for candidate in candidates {
            weights.entry(candidate.clone()).or_insert(0.0);
        }
        weights
    }

    /// Score-proportional weights with the cap enforced by iterative
    /// redistribution. `positive` must be non-empty with positive scores.
    fn capped_weights(&self, positive: &[(&String, f64)]) -> HashMap<String, f64> {
        let score_total: f64 = positive.iter().map(|(_, s)| s).sum();
        let mut weights: HashMap<String, f64> = positive
            .iter()
            .map(|(c, s)| ((*c).clone(), s / score_total))
            .collect();

        let mut converged = false;
        for iteration in 0..self.max_iterations {
            let surplus: f64 = weights
                .values()
                .filter(|w| **w > self.cap)
                .map(|w| w - self.cap)
                .sum();
            if surplus < self.epsilon {
                debug!("Target weights converged after {iteration} iterations");
                converged = true;
                break;
            }

            let mut capped: HashMap<String, f64> = weights
                .iter()
                .map(|(c, w)| (c.clone(), w.min(self.cap)))
                .collect();

            let below_cap_total: f64 = capped
                .values()
                .filter(|w| **w < self.cap - self.epsilon)
                .sum();
            if below_cap_total <= 0.0 {
                // Everything sits at the cap; renormalizing spreads the rest evenly.
                weights = capped;
                converged = true;
                break;
            }

            for w in capped.values_mut() {
                if *w < self.cap - self.epsilon {
                    *w += surplus * (*w / below_cap_total);
                }
            }
            weights = capped;
        }

        if !converged {
            warn!(
                "Target weights did not converge within {} iterations",
                self.max_iterations
            );
        }

        let total: f64 = weights.values().sum();
        if total > 0.0 {
            for w in weights.values_mut() {
                *w /= total;
            }
        }
        weights
    }
}

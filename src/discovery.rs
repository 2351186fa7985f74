//! Candidate key discovery: bounded beam search over column combinations
//!
//! Finds promising N-column keys without enumerating C(columns, N)
//! combinations. The search is an explicit per-level worklist with a hard
//! evaluation budget, so termination is auditable regardless of column count.

use crate::config::DiscoveryConfig;
use crate::dataset::Dataset;
use crate::error::{DatasetSide, Result};
use crate::evaluate::{normalize_combination, CandidateKey, UniquenessEvaluator};
use crate::profile::DatasetProfile;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Outcome of a discovery run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredCandidates {
    /// Ranked candidates, best first, at most `max_results`
    pub candidates: Vec<CandidateKey>,
    /// Uniqueness evaluations spent, including explicit combinations
    pub evaluations: usize,
    /// False when search was disabled or skipped below the trigger threshold
    pub search_ran: bool,
}

/// Beam-search generator for promising column combinations
pub struct CandidateGenerator {
    config: DiscoveryConfig,
    evaluator: UniquenessEvaluator,
}

impl CandidateGenerator {
    pub fn new(config: DiscoveryConfig, evaluator: UniquenessEvaluator) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, evaluator })
    }

    /// Run discovery against one dataset using its column profile for seeds
    /// and tie-breaking. Explicit must-include combinations are always
    /// evaluated; must-exclude combinations are never generated.
    pub fn discover(
        &self,
        dataset: &Dataset,
        profile: &DatasetProfile,
    ) -> Result<DiscoveredCandidates> {
        let config = &self.config;
        let excluded: HashSet<Vec<String>> = config
            .exclude
            .iter()
            .map(|combo| normalize_combination(combo))
            .collect();

        let mut evaluations = 0usize;
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut included: Vec<CandidateKey> = Vec::new();

        // Explicit combinations are exempt from the search budget and always
        // survive into the results: the caller asked for them by name.
        for combo in &config.include {
            let normalized = normalize_combination(combo);
            if excluded.contains(&normalized) || !seen.insert(normalized) {
                continue;
            }
            let candidate =
                self.evaluator
                    .evaluate(dataset, DatasetSide::A, combo, Some(config.sample_size))?;
            evaluations += 1;
            included.push(candidate);
        }

        let search_ran = config.enabled
            && dataset.column_count() >= config.trigger_threshold
            && config.target_size <= dataset.column_count();

        let mut searched: Vec<CandidateKey> = Vec::new();
        if search_ran {
            evaluations +=
                self.beam_search(dataset, profile, &excluded, &mut seen, &mut searched)?;
        } else if config.enabled && config.target_size > dataset.column_count() {
            log::debug!(
                "Discovery skipped: target size {} exceeds {} columns",
                config.target_size,
                dataset.column_count()
            );
        }

        self.rank(&mut included, profile);
        self.rank(&mut searched, profile);
        searched.truncate(config.max_results.saturating_sub(included.len()));
        let mut results = included;
        results.extend(searched);
        self.rank(&mut results, profile);

        // Strip sampling bias from the finalists before reporting.
        evaluations += results
            .iter()
            .take(config.verify_top)
            .filter(|c| c.sampled)
            .count();
        let verified =
            self.evaluator
                .verify_top(dataset, DatasetSide::A, &results, config.verify_top)?;

        Ok(DiscoveredCandidates {
            candidates: verified,
            evaluations,
            search_ran,
        })
    }

    /// One beam level per combination size, seeded from the profiler's top
    /// columns. Returns the number of evaluations spent.
    fn beam_search(
        &self,
        dataset: &Dataset,
        profile: &DatasetProfile,
        excluded: &HashSet<Vec<String>>,
        seen: &mut HashSet<Vec<String>>,
        results: &mut Vec<CandidateKey>,
    ) -> Result<usize> {
        let config = &self.config;
        let seeds: Vec<String> = profile
            .top_seeds(config.seed_count)
            .iter()
            .map(|p| p.name.clone())
            .collect();

        let mut evaluations = 0usize;
        let mut beam: Vec<CandidateKey> = Vec::new();

        'levels: for level in 1..=config.target_size {
            // Worklist of combinations to evaluate at this level
            let worklist: Vec<Vec<String>> = if level == 1 {
                seeds.iter().map(|s| vec![s.clone()]).collect()
            } else {
                let mut extended = Vec::new();
                for candidate in &beam {
                    for seed in &seeds {
                        if candidate.columns.contains(seed) {
                            continue;
                        }
                        let mut combo = candidate.columns.clone();
                        combo.push(seed.clone());
                        extended.push(combo);
                    }
                }
                extended
            };

            let mut level_results: Vec<CandidateKey> = Vec::new();
            for combo in worklist {
                if evaluations >= config.eval_budget {
                    log::warn!(
                        "Discovery evaluation budget ({}) exhausted at level {}",
                        config.eval_budget,
                        level
                    );
                    results.extend(level_results);
                    break 'levels;
                }
                let normalized = normalize_combination(&combo);
                if excluded.contains(&normalized) || !seen.insert(normalized) {
                    continue;
                }
                let candidate = self.evaluator.evaluate(
                    dataset,
                    DatasetSide::A,
                    &combo,
                    Some(config.sample_size),
                )?;
                evaluations += 1;
                level_results.push(candidate);
            }

            if level == config.target_size {
                results.extend(level_results);
                break;
            }

            self.rank(&mut level_results, profile);
            level_results.truncate(config.beam_width);
            if level_results.is_empty() {
                break;
            }
            beam = level_results;
        }

        Ok(evaluations)
    }

    /// Rank by score, then lower combined null ratio, then shorter
    /// combination, then lexical order.
    fn rank(&self, candidates: &mut [CandidateKey], profile: &DatasetProfile) {
        candidates.sort_by(|a, b| {
            b.uniqueness_score
                .partial_cmp(&a.uniqueness_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    combined_null_ratio(a, profile)
                        .partial_cmp(&combined_null_ratio(b, profile))
                        .unwrap_or(Ordering::Equal)
                })
                .then(a.columns.len().cmp(&b.columns.len()))
                .then(a.columns.cmp(&b.columns))
        });
    }
}

fn combined_null_ratio(candidate: &CandidateKey, profile: &DatasetProfile) -> f64 {
    if candidate.columns.is_empty() {
        return 0.0;
    }
    let sum: f64 = candidate
        .columns
        .iter()
        .map(|c| profile.null_ratio_of(c))
        .sum();
    sum / candidate.columns.len() as f64
}

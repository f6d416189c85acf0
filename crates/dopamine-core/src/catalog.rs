//! Choosing today's batch from the challenge catalog.
//!
//! The catalog store only filters out excluded ids; which of the remaining
//! candidates make up a batch is decided here by a [`SelectionPolicy`].
//!
//! # Usage
//! ```rust,ignore
//! use dopamine_core::catalog::{select_today, SelectionPolicy};
//!
//! let batch = select_today(&db, &previous_ids, &SelectionPolicy::default())?;
//! ```

use std::collections::BTreeSet;

use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::challenge::{Challenge, ProficiencyTier};
use crate::error::Result;
use crate::store::ChallengeCatalog;

/// How a batch is assembled from the eligible candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// One challenge per proficiency tier, HIGH first
    OnePerTier,
    /// The first `batch_size` candidates regardless of tier
    TopN,
}

/// Policy for assembling a daily batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    pub strategy: SelectionStrategy,
    /// Upper bound on the batch size
    pub batch_size: usize,
    /// Randomize candidate order before picking
    pub shuffle: bool,
    /// Random seed for reproducibility (None = random)
    pub seed: Option<u64>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::OnePerTier,
            batch_size: 3,
            shuffle: false,
            seed: None,
        }
    }
}

impl SelectionPolicy {
    pub fn new(strategy: SelectionStrategy, batch_size: usize) -> Self {
        Self {
            strategy,
            batch_size,
            ..Self::default()
        }
    }

    pub fn with_shuffle(mut self, seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    /// Batch size the policy aims for when the catalog is large enough.
    pub fn target_size(&self) -> usize {
        match self.strategy {
            SelectionStrategy::OnePerTier => self.batch_size.min(ProficiencyTier::ALL.len()),
            SelectionStrategy::TopN => self.batch_size,
        }
    }
}

/// Select today's batch, never returning an id from `exclude`.
///
/// A catalog too small to fill the batch yields a shorter (possibly empty)
/// batch rather than an error.
pub fn select_today<C>(
    catalog: &C,
    exclude: &BTreeSet<i64>,
    policy: &SelectionPolicy,
) -> Result<Vec<Challenge>>
where
    C: ChallengeCatalog + ?Sized,
{
    let mut candidates = catalog.eligible_challenges(exclude)?;
    candidates.retain(|c| !exclude.contains(&c.id));
    debug!(
        candidates = candidates.len(),
        excluded = exclude.len(),
        "loaded eligible challenges"
    );

    if policy.shuffle {
        let mut rng = match policy.seed {
            Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
            None => Mcg128Xsl64::from_entropy(),
        };
        candidates.shuffle(&mut rng);
    }

    let batch = pick(candidates, policy);
    if batch.len() < policy.target_size() {
        warn!(
            selected = batch.len(),
            target = policy.target_size(),
            "catalog could not fill today's batch"
        );
    }
    Ok(batch)
}

fn pick(candidates: Vec<Challenge>, policy: &SelectionPolicy) -> Vec<Challenge> {
    match policy.strategy {
        SelectionStrategy::OnePerTier => ProficiencyTier::ALL
            .iter()
            .filter_map(|tier| candidates.iter().find(|c| c.tier == *tier).cloned())
            .take(policy.batch_size)
            .collect(),
        SelectionStrategy::TopN => candidates.into_iter().take(policy.batch_size).collect(),
    }
}

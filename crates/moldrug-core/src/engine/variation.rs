use super::error::EngineError;
use super::selection::{SIMILARITY_BETA, pick_by_similarity, pick_random};
use crate::core::chem::{ChemToolkit, GrowParams, MutationParams};
use crate::core::models::individual::Individual;
use itertools::Itertools;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Structural variation of molecules through the chemistry toolkit.
#[derive(Clone, Copy)]
pub struct Variation<'a> {
    toolkit: &'a dyn ChemToolkit,
    get_similar: bool,
}

impl<'a> Variation<'a> {
    pub fn new(toolkit: &'a dyn ChemToolkit, get_similar: bool) -> Self {
        Self {
            toolkit,
            get_similar,
        }
    }

    /// `count` distinct molecules derived from `seed`: grown first, topped up
    /// with mutations when growing yields too few.
    pub fn initial_candidates<R: Rng + ?Sized>(
        &self,
        seed: &str,
        count: usize,
        grow: &GrowParams,
        mutation: &MutationParams,
        rng: &mut R,
    ) -> Result<Vec<String>, EngineError> {
        let mut candidates: Vec<String> = self
            .toolkit
            .grow(seed, grow)?
            .into_iter()
            .filter(|s| s != seed)
            .unique()
            .collect();
        debug!(grown = candidates.len(), needed = count, "Grew initial candidates.");

        if candidates.len() < count {
            let known: BTreeSet<String> = candidates.iter().cloned().collect();
            let mutated = self
                .toolkit
                .mutate(seed, mutation)?
                .into_iter()
                .filter(|s| s != seed && !known.contains(s))
                .unique()
                .collect_vec();
            debug!(mutated = mutated.len(), "Topped up initial candidates with mutations.");
            candidates.extend(mutated);
        }

        if candidates.is_empty() {
            return Err(EngineError::Initialization(format!(
                "The seed molecule {seed} yields no grown or mutated candidates"
            )));
        }
        if candidates.len() < count {
            warn!(
                available = candidates.len(),
                requested = count,
                "Fewer initial candidates than requested; the population starts smaller."
            );
        }

        let picked = self.pick(seed, &candidates, count, rng)?;
        Ok(picked.into_iter().map(|i| candidates[i].clone()).collect())
    }

    /// A mutated SMILES of `parent`. Unseen molecules are preferred; the
    /// parent's own SMILES is returned when the toolkit offers nothing.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        parent: &Individual,
        params: &MutationParams,
        seen: &BTreeSet<String>,
        rng: &mut R,
    ) -> Result<String, EngineError> {
        let candidates = self.toolkit.mutate(&parent.smiles, params)?;
        let unseen = candidates
            .iter()
            .filter(|s| !seen.contains(*s))
            .cloned()
            .unique()
            .collect_vec();
        let pool = if unseen.is_empty() { candidates } else { unseen };

        if pool.is_empty() {
            debug!(idx = parent.idx, smiles = %parent.smiles, "No mutation available; reusing the parent.");
            return Ok(parent.smiles.clone());
        }

        if self.get_similar {
            let picked = self.pick(&parent.smiles, &pool, 1, rng)?;
            return Ok(pool[picked[0]].clone());
        }
        Ok(pool
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| parent.smiles.clone()))
    }

    fn pick<R: Rng + ?Sized>(
        &self,
        reference: &str,
        candidates: &[String],
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>, EngineError> {
        if count >= candidates.len() {
            return Ok((0..candidates.len()).collect());
        }
        if self.get_similar {
            let similarities = self.toolkit.similarities(reference, candidates)?;
            Ok(pick_by_similarity(&similarities, count, SIMILARITY_BETA, rng))
        } else {
            Ok(pick_random(candidates.len(), count, rng))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::testing::MockToolkit;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn initial_candidates_are_distinct_and_exclude_the_seed() {
        let toolkit = MockToolkit::default();
        let variation = Variation::new(&toolkit, false);
        let mut rng = StdRng::seed_from_u64(1);

        let picked = variation
            .initial_candidates("CC", 4, &GrowParams::default(), &MutationParams::default(), &mut rng)
            .unwrap();

        assert_eq!(picked.len(), 4);
        assert_eq!(picked.iter().unique().count(), 4);
        assert!(!picked.contains(&"CC".to_string()));
    }

    #[test]
    fn initial_candidates_are_topped_up_with_mutations() {
        let toolkit = MockToolkit {
            grow_count: 2,
            ..MockToolkit::default()
        };
        let variation = Variation::new(&toolkit, true);
        let mut rng = StdRng::seed_from_u64(2);

        let picked = variation
            .initial_candidates("CC", 5, &GrowParams::default(), &MutationParams::default(), &mut rng)
            .unwrap();

        assert_eq!(picked.len(), 5);
        assert!(picked.contains(&"CCC".to_string()));
        assert!(picked.contains(&"CNC".to_string()));
    }

    #[test]
    fn no_candidates_is_an_initialization_error() {
        let toolkit = MockToolkit {
            grow_count: 0,
            mutate_count: 0,
            ..MockToolkit::default()
        };
        let variation = Variation::new(&toolkit, false);
        let mut rng = StdRng::seed_from_u64(3);
        let result =
            variation.initial_candidates("CC", 3, &GrowParams::default(), &MutationParams::default(), &mut rng);
        assert!(matches!(result, Err(EngineError::Initialization(_))));
    }

    #[test]
    fn mutation_avoids_seen_molecules_while_alternatives_exist() {
        let toolkit = MockToolkit::default();
        let variation = Variation::new(&toolkit, false);
        let mut rng = StdRng::seed_from_u64(4);
        let parent = Individual::new("CCO", 3);
        let all = toolkit.mutate("CCO", &MutationParams::default()).unwrap();
        let seen: BTreeSet<String> = all.iter().skip(1).cloned().collect();

        for _ in 0..20 {
            let child = variation
                .mutate(&parent, &MutationParams::default(), &seen, &mut rng)
                .unwrap();
            assert_eq!(child, all[0]);
        }
    }

    #[test]
    fn mutation_without_candidates_reuses_the_parent() {
        let toolkit = MockToolkit {
            mutate_count: 0,
            ..MockToolkit::default()
        };
        let variation = Variation::new(&toolkit, true);
        let mut rng = StdRng::seed_from_u64(5);
        let parent = Individual::new("CCO", 3);
        let child = variation
            .mutate(&parent, &MutationParams::default(), &BTreeSet::new(), &mut rng)
            .unwrap();
        assert_eq!(child, "CCO");
    }
}

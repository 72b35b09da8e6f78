use crate::core::models::individual::Individual;
use rand::Rng;
use rand::seq::index;

/// Sharpness of the similarity-biased pick.
pub const SIMILARITY_BETA: f64 = 0.01;

/// Boltzmann weights `exp(-beta * cost)` normalized to sum to one.
///
/// Costs are shifted by the lowest finite cost before exponentiation, which
/// leaves the normalized result unchanged. Infinite or NaN costs get zero
/// probability; when every entry is zero the distribution is uniform.
pub fn selection_probabilities(costs: &[f64], beta: f64) -> Vec<f64> {
    if costs.is_empty() {
        return Vec::new();
    }
    let best = costs
        .iter()
        .copied()
        .filter(|c| c.is_finite())
        .fold(f64::INFINITY, f64::min);

    let weights: Vec<f64> = costs
        .iter()
        .map(|&c| {
            if c.is_finite() {
                (-beta * (c - best)).exp()
            } else {
                0.0
            }
        })
        .collect();
    normalize(weights)
}

/// Weights `exp(beta * similarity)` normalized to sum to one.
pub fn similarity_probabilities(similarities: &[f64], beta: f64) -> Vec<f64> {
    let best = similarities
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    let weights = similarities
        .iter()
        .map(|&s| {
            if s.is_finite() {
                (beta * (s - best)).exp()
            } else {
                0.0
            }
        })
        .collect();
    normalize(weights)
}

fn normalize(mut weights: Vec<f64>) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        let uniform = 1.0 / weights.len() as f64;
        weights.iter_mut().for_each(|w| *w = uniform);
        return weights;
    }
    weights.iter_mut().for_each(|w| *w /= total);
    weights
}

/// Returns the first index whose cumulative probability reaches a uniform
/// draw in `[0, sum)`. Entries with zero probability are never returned.
///
/// # Panics
///
/// Panics if `probabilities` is empty.
pub fn roulette_wheel<R: Rng + ?Sized>(probabilities: &[f64], rng: &mut R) -> usize {
    assert!(!probabilities.is_empty(), "roulette over an empty population");
    let total: f64 = probabilities.iter().sum();
    let Some(last_positive) = probabilities.iter().rposition(|&p| p > 0.0) else {
        return rng.gen_range(0..probabilities.len());
    };

    let r = rng.r#gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, &p) in probabilities.iter().enumerate() {
        if p <= 0.0 {
            continue;
        }
        cumulative += p;
        if r <= cumulative {
            return i;
        }
    }
    last_positive
}

/// Samples `pick` distinct indices without replacement, biased toward the
/// most similar candidates. Returns every index when `pick >= len`.
pub fn pick_by_similarity<R: Rng + ?Sized>(
    similarities: &[f64],
    pick: usize,
    beta: f64,
    rng: &mut R,
) -> Vec<usize> {
    if pick >= similarities.len() {
        return (0..similarities.len()).collect();
    }
    let mut remaining = similarity_probabilities(similarities, beta);
    let mut chosen = Vec::with_capacity(pick);
    for _ in 0..pick {
        let i = roulette_wheel(&remaining, rng);
        chosen.push(i);
        remaining[i] = 0.0;
        if remaining.iter().all(|&p| p <= 0.0) {
            // Only zero-weight candidates left; fill uniformly from them.
            for (j, p) in remaining.iter_mut().enumerate() {
                if !chosen.contains(&j) {
                    *p = 1.0;
                }
            }
        }
    }
    chosen.sort_unstable();
    chosen
}

/// Uniform sample of `pick` distinct indices, sorted.
pub fn pick_random<R: Rng + ?Sized>(len: usize, pick: usize, rng: &mut R) -> Vec<usize> {
    if pick >= len {
        return (0..len).collect();
    }
    let mut chosen = index::sample(rng, len, pick).into_vec();
    chosen.sort_unstable();
    chosen
}

/// Roulette selection of one parent from a population.
pub fn select_parent<'p, R: Rng + ?Sized>(
    population: &'p [Individual],
    probabilities: &[f64],
    rng: &mut R,
) -> &'p Individual {
    &population[roulette_wheel(probabilities, rng)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn probabilities_favor_low_costs_and_ignore_infinite_ones() {
        let p = selection_probabilities(&[0.1, 0.5, f64::INFINITY], 1.0);
        assert_eq!(p[2], 0.0);
        assert!(p[0] > p[1]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        let ratio = p[0] / p[1];
        assert!((ratio - 0.4f64.exp()).abs() < 1e-12);
    }

    #[test]
    fn all_infinite_costs_give_uniform_probabilities() {
        let p = selection_probabilities(&[f64::INFINITY, f64::NAN, f64::INFINITY, f64::INFINITY], 0.001);
        assert!(p.iter().all(|&x| (x - 0.25).abs() < 1e-12));
    }

    #[test]
    fn huge_costs_do_not_underflow_to_uniform() {
        let p = selection_probabilities(&[1.0e6, 1.0e6 + 1.0], 1.0);
        assert!(p[0] > 0.7);
    }

    #[test]
    fn roulette_never_returns_zero_probability_entries() {
        let mut rng = StdRng::seed_from_u64(7);
        let probabilities = [0.0, 0.3, 0.0, 0.7, 0.0];
        let mut hits = [0usize; 5];
        for _ in 0..5_000 {
            hits[roulette_wheel(&probabilities, &mut rng)] += 1;
        }
        assert_eq!(hits[0] + hits[2] + hits[4], 0);
        assert!(hits[3] > hits[1]);
    }

    #[test]
    fn similarity_pick_is_distinct_and_sorted() {
        let mut rng = StdRng::seed_from_u64(11);
        let picked = pick_by_similarity(&[0.9, 0.1, 0.5, 0.7, 0.2], 3, SIMILARITY_BETA, &mut rng);
        assert_eq!(picked.len(), 3);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(pick_by_similarity(&[0.2, 0.3], 5, SIMILARITY_BETA, &mut rng), vec![0, 1]);
    }

    #[test]
    fn similarity_pick_prefers_similar_candidates_under_steep_beta() {
        let mut rng = StdRng::seed_from_u64(3);
        let picked = pick_by_similarity(&[0.0, 1.0, 0.0, 0.95], 2, 50.0, &mut rng);
        assert_eq!(picked, vec![1, 3]);
    }

    #[test]
    fn random_pick_is_distinct() {
        let mut rng = StdRng::seed_from_u64(5);
        let picked = pick_random(10, 4, &mut rng);
        assert_eq!(picked.len(), 4);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(pick_random(2, 4, &mut rng), vec![0, 1]);
    }
}

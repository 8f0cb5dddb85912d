//! Queue randomization.

use rand::Rng;

/// In-place uniform permutation (Durstenfeld's Fisher-Yates).
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Insertion index for a looped track in a shuffled queue of length `len`.
///
/// The larger of two uniform draws over `[0, len]`, which biases re-inserted
/// tracks toward the back so they rarely come around again right away.
pub fn biased_insert_index<R: Rng + ?Sized>(len: usize, rng: &mut R) -> usize {
    let a = rng.gen_range(0..=len);
    let b = rng.gen_range(0..=len);
    a.max(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut items: Vec<u32> = (0..20).collect();
        shuffle(&mut items, &mut rng);
        assert_ne!(items, (0..20).collect::<Vec<_>>());
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn shuffle_is_deterministic_per_seed() {
        let mut a: Vec<u32> = (0..10).collect();
        let mut b: Vec<u32> = (0..10).collect();
        shuffle(&mut a, &mut StdRng::seed_from_u64(42));
        shuffle(&mut b, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn shuffle_handles_short_slices() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut empty: Vec<u32> = Vec::new();
        shuffle(&mut empty, &mut rng);
        let mut one = vec![5];
        shuffle(&mut one, &mut rng);
        assert_eq!(one, vec![5]);
    }

    #[test]
    fn biased_index_stays_in_bounds_and_leans_back() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(biased_insert_index(0, &mut rng), 0);

        let len = 10;
        let trials = 2000;
        let mut total = 0usize;
        for _ in 0..trials {
            let idx = biased_insert_index(len, &mut rng);
            assert!(idx <= len);
            total += idx;
        }
        // Max of two uniforms over 0..=10 has mean ~6.8; a single draw has mean 5.
        let mean = total as f64 / trials as f64;
        assert!(mean > 6.0, "mean was {mean}");
    }
}

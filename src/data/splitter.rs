// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles a snapshot with a fixed seed, then cuts it in two:
//
//   [ train (≈ train_fraction) | validation (rest) ]
//
// The store is in time order, so the shuffle mixes seasons into
// both sides. The same snapshot and seed always give the same
// split, which keeps validation errors of successive versions
// comparable.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, validation).
///
/// With two or more samples both partitions are non-empty, whatever
/// the fraction, so a validation error can always be computed.
///
/// # Example
/// ```
/// use irrigation_model::data::splitter::split_train_val;
///
/// let (train, val) = split_train_val((0..10).collect::<Vec<_>>(), 0.8, 42);
/// assert_eq!((train.len(), val.len()), (8, 2));
/// ```
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    // e.g. 10 samples * 0.8 = 8 → first 8 are training
    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction.clamp(0.0, 1.0)).round() as usize;

    // Keep at least one sample on each side once there are two to share
    let split_at = if total >= 2 {
        split_at.clamp(1, total - 1)
    } else {
        split_at.min(total)
    };

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation (seed {})",
        samples.len(),
        val.len(),
        seed,
    );

    (samples, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_samples_split_eight_two() {
        let (train, val) = split_train_val((0..10).collect::<Vec<u32>>(), 0.8, 42);
        assert_eq!((train.len(), val.len()), (8, 2));
    }

    #[test]
    fn test_nothing_lost_or_duplicated() {
        let (train, val) = split_train_val((0..50).collect::<Vec<u32>>(), 0.7, 7);
        let mut seen: Vec<u32> = train.into_iter().chain(val).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = split_train_val((0..30).collect::<Vec<u32>>(), 0.8, 99);
        let b = split_train_val((0..30).collect::<Vec<u32>>(), 0.8, 99);
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_samples_no_partitions() {
        let (train, val) = split_train_val(Vec::<u32>::new(), 0.8, 42);
        assert_eq!((train.len(), val.len()), (0, 0));
    }

    #[test]
    fn test_extreme_fractions_keep_both_sides() {
        let (train, val) = split_train_val((0..10).collect::<Vec<u8>>(), 1.0, 1);
        assert_eq!((train.len(), val.len()), (9, 1));

        let (train, val) = split_train_val((0..10).collect::<Vec<u8>>(), 0.0, 1);
        assert_eq!((train.len(), val.len()), (1, 9));
    }

    #[test]
    fn test_single_sample_goes_to_training() {
        let (train, val) = split_train_val(vec![1], 0.8, 42);
        assert_eq!(train, vec![1]);
        assert!(val.is_empty());
    }
}

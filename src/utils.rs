//! Utility functions shared by the oracle, the optimizer and the heuristic,
//! primarily vote aggregation with deterministic tie-breaking and split entropy.

/// Determines the majority class from a slice of votes.
///
/// Finds the class index with the highest vote count. Ties are broken
/// by choosing the class with the lower index.
///
/// # Arguments
/// * `votes` - A slice where `votes[i]` is the number of votes for class `i`.
///
/// # Returns
/// The index of the majority class. Returns 0 if the `votes` slice is empty.
#[allow(non_snake_case, reason = "Must be FAST!")]
pub fn _FAST_get_majority_class(votes: &[u32]) -> usize {
    let mut max_votes = 0;
    let mut winning_index = 0;
    for (index, &count) in votes.iter().enumerate() {
        if index == 0 || count > max_votes {
            max_votes = count;
            winning_index = index;
        }
    }
    winning_index
}

/// Finds the heaviest class bucket of a weighted vote.
///
/// Only strictly larger buckets replace the current winner, so ties go to the
/// lowest class index and an all-zero (or empty) slice yields `(0, 0.0)`.
///
/// # Returns
/// A tuple `(winner_index, winner_weight)`.
pub fn get_heaviest_class(weights: &[f64]) -> (usize, f64) {
    let mut best_class = 0;
    let mut best_weight = 0.0;
    for (class, &weight) in weights.iter().enumerate() {
        if weight > best_weight {
            best_weight = weight;
            best_class = class;
        }
    }
    (best_class, best_weight)
}

/// Shannon entropy (base 2) of a class histogram holding `total` samples.
/// Returns 0 for an empty histogram.
pub fn entropy(class_counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total_f64 = total as f64;
    let mut entropy = 0.0;
    for &count in class_counts {
        if count > 0 {
            let frac = count as f64 / total_f64;
            entropy -= frac * frac.log2();
        }
    }
    entropy
}

/// Sample-weighted entropy of a two-sided split.
///
/// # Arguments
/// * `left_counts`, `right_counts` - Per-class sample counts on each side.
/// * `nb_left` - Number of samples on the left side.
/// * `nb_total` - Number of samples on both sides.
pub fn split_entropy(left_counts: &[usize], right_counts: &[usize], nb_left: usize, nb_total: usize) -> f64 {
    let nb_right = nb_total - nb_left;
    (nb_left as f64 * entropy(left_counts, nb_left) + nb_right as f64 * entropy(right_counts, nb_right))
        / nb_total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_majority() {
        assert_eq!(_FAST_get_majority_class(&[1, 5, 2]), 1);
        // Tie-breaking check: [5, 1, 5]. Lower index (0) wins.
        assert_eq!(_FAST_get_majority_class(&[5, 1, 5]), 0);
        assert_eq!(_FAST_get_majority_class(&[1, 1, 1]), 0);
        assert_eq!(_FAST_get_majority_class(&[]), 0);
        assert_eq!(_FAST_get_majority_class(&[0, 0, 1]), 2);
        assert_eq!(_FAST_get_majority_class(&[3, 9, 9]), 1);
    }

    #[test]
    fn test_get_heaviest_class() {
        assert_eq!(get_heaviest_class(&[1.0, 3.5, 2.0]), (1, 3.5));
        assert_eq!(get_heaviest_class(&[2.0, 2.0]), (0, 2.0));
        assert_eq!(get_heaviest_class(&[0.0, 0.0, 0.0]), (0, 0.0));
        assert_eq!(get_heaviest_class(&[]), (0, 0.0));
        assert_eq!(get_heaviest_class(&[0.0, 0.0, 4.0]), (2, 4.0));
    }

    #[test]
    fn test_entropy() {
        assert_eq!(entropy(&[4, 0], 4), 0.0);
        assert!((entropy(&[2, 2], 4) - 1.0).abs() < 1e-12);
        assert!((entropy(&[1, 1, 1, 1], 4) - 2.0).abs() < 1e-12);
        assert_eq!(entropy(&[0, 0], 0), 0.0);
    }

    #[test]
    fn test_split_entropy() {
        // A perfect split has zero weighted entropy.
        assert_eq!(split_entropy(&[3, 0], &[0, 5], 3, 8), 0.0);
        // Left pure, right balanced: 4/8 * 0 + 4/8 * 1.
        assert!((split_entropy(&[4, 0], &[2, 2], 4, 8) - 0.5).abs() < 1e-12);
    }
}

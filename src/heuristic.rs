//! Sampling-based construction of the born-again tree, for feature spaces too
//! large for the dynamic program.
//!
//! Works directly on the unfiltered hyperplane levels. A region is a box of
//! level indices `bottom_left[k]..=top_right[k]` per feature. At each region the
//! builder samples cells uniformly, asks the ensemble for their classes, and
//! either closes the region with a leaf (all samples agree, and the optional
//! purity certificate confirms it) or splits it on the hyperplane that
//! minimizes the sample-weighted entropy of the two sides.
//!
//! Search state is mutated in place and restored after each child, so the
//! recursion allocates nothing per node apart from the sample sort buffer.

use std::collections::BTreeSet;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::config::Params;
use crate::error::{BornAgainError, Result};
use crate::forest::EnsembleOracle;
use crate::tree::{NodeId, RebornTree};
use crate::utils::split_entropy;

// --- Purity Certificate ---

/// Read-only view of the region the heuristic is about to close.
#[derive(Debug, Clone, Copy)]
pub struct RegionView<'s> {
    /// Per-feature hyperplane levels (unfiltered, closed by the open level).
    pub levels: &'s [Vec<f64>],
    /// Lowest level index of the region on each feature.
    pub bottom_left: &'s [usize],
    /// Highest level index of the region on each feature.
    pub top_right: &'s [usize],
    /// Features whose range holds more than one level.
    pub non_trivial_features: &'s BTreeSet<usize>,
    /// Features that were non-trivial in the whole space.
    pub initial_non_trivial_features: &'s BTreeSet<usize>,
}

/// Proves that a region the sampling found pure really is pure.
///
/// Both methods answer the same question, "can a point of `other_class` exist
/// in the region?", and return `true` only when it certainly cannot.
/// `pre_filter` is a cheap sufficient test tried first; `certify` may be exact
/// and expensive.
pub trait PurityCertificate {
    fn pre_filter(&mut self, region: &RegionView<'_>, pure_class: usize, other_class: usize) -> bool;

    fn certify(&mut self, region: &RegionView<'_>, pure_class: usize, other_class: usize) -> bool;
}

/// Certificate that enumerates every cell of the region through the oracle.
///
/// Exact, and exponential in the number of non-trivial features: meant for
/// small spaces and for checking other certificates.
pub struct ExhaustiveCertificate<'o, O: EnsembleOracle + ?Sized> {
    oracle: &'o O,
    /// Number of cells evaluated by `certify` so far.
    pub cells_evaluated: u64,
}

impl<'o, O: EnsembleOracle + ?Sized> ExhaustiveCertificate<'o, O> {
    pub fn new(oracle: &'o O) -> Self {
        ExhaustiveCertificate { oracle, cells_evaluated: 0 }
    }
}

impl<'o, O: EnsembleOracle + ?Sized> PurityCertificate for ExhaustiveCertificate<'o, O> {
    /// A region reduced to one cell of class `pure_class` is settled by one evaluation.
    fn pre_filter(&mut self, region: &RegionView<'_>, pure_class: usize, other_class: usize) -> bool {
        if !region.non_trivial_features.is_empty() || pure_class == other_class {
            return false;
        }
        let coordinates: Vec<f64> =
            region.bottom_left.iter().enumerate().map(|(k, &b)| region.levels[k][b]).collect();
        self.oracle.majority_class(&coordinates) == pure_class
    }

    fn certify(&mut self, region: &RegionView<'_>, _pure_class: usize, other_class: usize) -> bool {
        let mut indices: Vec<usize> = region.bottom_left.to_vec();
        let mut coordinates: Vec<f64> = indices.iter().enumerate().map(|(k, &i)| region.levels[k][i]).collect();
        loop {
            self.cells_evaluated += 1;
            if self.oracle.majority_class(&coordinates) == other_class {
                return false;
            }
            // Odometer over the non-trivial features.
            let mut advanced = false;
            for &k in region.non_trivial_features.iter().rev() {
                if indices[k] < region.top_right[k] {
                    indices[k] += 1;
                    coordinates[k] = region.levels[k][indices[k]];
                    advanced = true;
                    break;
                }
                indices[k] = region.bottom_left[k];
                coordinates[k] = region.levels[k][indices[k]];
            }
            if !advanced {
                return true;
            }
        }
    }
}

// --- Search State ---

/// Region currently explored, with the bookkeeping needed to restore it.
#[derive(Debug, Clone)]
struct SearchState {
    levels: Vec<Vec<f64>>,
    bottom_left: Vec<usize>,
    top_right: Vec<usize>,
    non_trivial_features: BTreeSet<usize>,
    initial_non_trivial_features: BTreeSet<usize>,
}

/// What `SearchState::narrow` changed, consumed by `SearchState::restore`.
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    feature: usize,
    bottom: usize,
    top: usize,
    collapsed: bool,
}

impl SearchState {
    fn new(levels: Vec<Vec<f64>>) -> Self {
        let bottom_left = vec![0; levels.len()];
        let top_right: Vec<usize> = levels.iter().map(|l| l.len() - 1).collect();
        let non_trivial_features: BTreeSet<usize> =
            (0..levels.len()).filter(|&k| bottom_left[k] != top_right[k]).collect();
        SearchState {
            levels,
            bottom_left,
            top_right,
            initial_non_trivial_features: non_trivial_features.clone(),
            non_trivial_features,
        }
    }

    fn view(&self) -> RegionView<'_> {
        RegionView {
            levels: &self.levels,
            bottom_left: &self.bottom_left,
            top_right: &self.top_right,
            non_trivial_features: &self.non_trivial_features,
            initial_non_trivial_features: &self.initial_non_trivial_features,
        }
    }

    /// Restricts `feature` to `bottom..=top`.
    fn narrow(&mut self, feature: usize, bottom: usize, top: usize) -> Snapshot {
        let snapshot = Snapshot {
            feature,
            bottom: self.bottom_left[feature],
            top: self.top_right[feature],
            collapsed: bottom == top,
        };
        self.bottom_left[feature] = bottom;
        self.top_right[feature] = top;
        if snapshot.collapsed {
            self.non_trivial_features.remove(&feature);
        }
        snapshot
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.bottom_left[snapshot.feature] = snapshot.bottom;
        self.top_right[snapshot.feature] = snapshot.top;
        if snapshot.collapsed {
            self.non_trivial_features.insert(snapshot.feature);
        }
    }
}

/// Cells sampled in the current region, stored per feature.
#[derive(Debug, Clone)]
struct SampleSet {
    /// `indices[k][s]`: level index of sample `s` on feature `k`.
    indices: Vec<Vec<usize>>,
    /// `coordinates[s]`: point evaluated by the oracle for sample `s`.
    coordinates: Vec<Vec<f64>>,
    classes: Vec<usize>,
}

impl SampleSet {
    /// Every sample starts at the bottom-left corner of the whole space.
    fn new(levels: &[Vec<f64>], nb_samples: usize) -> Self {
        let corner: Vec<f64> = levels.iter().map(|l| l[0]).collect();
        SampleSet {
            indices: vec![vec![0; nb_samples]; levels.len()],
            coordinates: vec![corner; nb_samples],
            classes: vec![0; nb_samples],
        }
    }

    /// Pins every sample to level `index` of `feature`.
    fn pin(&mut self, feature: usize, index: usize, level: f64) {
        for s in 0..self.classes.len() {
            self.indices[feature][s] = index;
            self.coordinates[s][feature] = level;
        }
    }
}

// --- Heuristic Builder ---

/// Builds a born-again tree by recursive sampling and entropy splits.
pub struct HeuristicBuilder<'a, 'c, O: EnsembleOracle + ?Sized> {
    oracle: &'a O,
    certificate: Option<&'c mut dyn PurityCertificate>,
    nb_classes: usize,
    rng: Xoshiro256PlusPlus,
    state: SearchState,
    samples: SampleSet,
    tree: RebornTree,
}

impl<'a, 'c, O: EnsembleOracle + ?Sized> HeuristicBuilder<'a, 'c, O> {
    /// # Arguments
    /// * `params` - Supplies the seed, the number of classes and the samples per region.
    /// * `oracle` - The ensemble; its hyperplanes define the search space.
    /// * `certificate` - Optional proof of purity consulted before closing a region.
    pub fn new(params: &Params, oracle: &'a O, certificate: Option<&'c mut dyn PurityCertificate>) -> Self {
        let levels = oracle.hyperplanes();
        let samples = SampleSet::new(&levels, params.nb_cells_sampled);
        HeuristicBuilder {
            oracle,
            certificate,
            nb_classes: params.nb_classes,
            rng: Xoshiro256PlusPlus::seed_from_u64(params.seed),
            state: SearchState::new(levels),
            samples,
            tree: RebornTree::new(),
        }
    }

    pub fn build(mut self) -> Result<RebornTree> {
        if self.samples.classes.is_empty() {
            return Err(BornAgainError::InvalidConfig("the heuristic needs at least one sample".into()));
        }
        self.build_recursive(0)?;
        log::debug!(
            "Heuristic tree: {} splits, {} leaves, depth {}",
            self.tree.nb_splits(),
            self.tree.nb_leaves(),
            self.tree.depth()
        );
        Ok(self.tree)
    }

    fn build_recursive(&mut self, current_depth: usize) -> Result<NodeId> {
        self.draw_samples();

        let mut class_counts = vec![0usize; self.nb_classes];
        for s in 0..self.samples.classes.len() {
            let class = self.oracle.majority_class(&self.samples.coordinates[s]);
            self.samples.classes[s] = class;
            class_counts[class] += 1;
        }
        let pure_class = self.samples.classes[0];
        let mut is_pure = class_counts.iter().filter(|&&count| count > 0).count() == 1;

        if is_pure {
            if let Some(certificate) = self.certificate.as_mut() {
                let view = self.state.view();
                for other_class in (0..self.nb_classes).filter(|&c| c != pure_class) {
                    if !certificate.pre_filter(&view, pure_class, other_class)
                        && !certificate.certify(&view, pure_class, other_class)
                    {
                        is_pure = false;
                        break;
                    }
                }
            }
        }

        if is_pure {
            return Ok(self.tree.push_leaf(pure_class, current_depth));
        }

        let (best_feature, best_level) = self.best_split(&class_counts).ok_or_else(|| {
            BornAgainError::InternalInconsistency {
                stage: "growing the heuristic tree",
                detail: format!("impure region reduced to a single cell at depth {}", current_depth),
            }
        })?;
        let threshold = self.state.levels[best_feature][best_level];
        let id = self.tree.push_internal(best_feature, threshold, current_depth);

        let bottom = self.state.bottom_left[best_feature];
        let snapshot = self.state.narrow(best_feature, bottom, best_level);
        if snapshot.collapsed {
            self.samples.pin(best_feature, bottom, self.state.levels[best_feature][bottom]);
        }
        let left_result = self.build_recursive(current_depth + 1);
        self.state.restore(snapshot);
        let left_id = left_result?;

        let top = self.state.top_right[best_feature];
        let snapshot = self.state.narrow(best_feature, best_level + 1, top);
        if snapshot.collapsed {
            self.samples.pin(best_feature, top, self.state.levels[best_feature][top]);
        }
        let right_result = self.build_recursive(current_depth + 1);
        self.state.restore(snapshot);
        let right_id = right_result?;

        self.tree.set_children(id, left_id, right_id);
        Ok(id)
    }

    /// Draws every non-trivial coordinate of every sample uniformly in the region.
    /// Trivial features keep the level they were pinned to.
    fn draw_samples(&mut self) {
        let nb_samples = self.samples.classes.len();
        for &k in self.state.non_trivial_features.iter() {
            let bottom = self.state.bottom_left[k];
            let top = self.state.top_right[k];
            for s in 0..nb_samples {
                let index = self.rng.gen_range(bottom..=top);
                self.samples.indices[k][s] = index;
                self.samples.coordinates[s][k] = self.state.levels[k][index];
            }
        }
    }

    /// Hyperplane of smallest weighted entropy over the samples.
    /// Features are visited from a random start, strictly better candidates win.
    ///
    /// When every sample falls on the left of every hyperplane (possible once the
    /// certificate has refused a region the samples found pure), the middle level
    /// of the first non-trivial feature visited is used instead.
    ///
    /// # Returns
    /// `(feature, level index)`, or `None` if the region is a single cell.
    fn best_split(&mut self, class_counts: &[usize]) -> Option<(usize, usize)> {
        let nb_features = self.state.levels.len();
        let nb_samples = self.samples.classes.len();
        let k_init = self.rng.gen_range(0..nb_features);

        let mut best: Option<(usize, usize)> = None;
        let mut fallback: Option<(usize, usize)> = None;
        let mut best_entropy = f64::INFINITY;
        let mut ordered: Vec<(usize, usize)> = Vec::with_capacity(nb_samples);
        for kk in 0..nb_features {
            let k = (k_init + kk) % nb_features;
            if self.state.bottom_left[k] == self.state.top_right[k] {
                continue;
            }
            if fallback.is_none() {
                fallback = Some((k, (self.state.bottom_left[k] + self.state.top_right[k]) / 2));
            }
            ordered.clear();
            ordered.extend(self.samples.indices[k].iter().copied().zip(self.samples.classes.iter().copied()));
            ordered.sort_unstable();

            let mut left_counts = vec![0usize; self.nb_classes];
            let mut right_counts = class_counts.to_vec();
            let mut next = 0;
            for attribute in self.state.bottom_left[k]..self.state.top_right[k] {
                while next < nb_samples && ordered[next].0 <= attribute {
                    let class = ordered[next].1;
                    left_counts[class] += 1;
                    right_counts[class] -= 1;
                    next += 1;
                }
                if next == nb_samples {
                    break;
                }
                let entropy = split_entropy(&left_counts, &right_counts, next, nb_samples);
                if entropy < best_entropy {
                    best_entropy = entropy;
                    best = Some((k, attribute));
                }
            }
        }
        best.or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Objective, Params, OPEN_INTERVAL_LEVEL};
    use crate::fspace::FeatureSpace;
    use crate::testing::{grid_oracle_strategy, misclassified_cells, GridOracle};
    use proptest::prelude::*;

    fn heuristic_params(nb_features: usize, nb_classes: usize, seed: u64) -> Params {
        let mut params = Params::new(nb_features, nb_classes, Objective::Heuristic);
        params.seed = seed;
        params.nb_cells_sampled = 50;
        params
    }

    fn grid_space(oracle: &GridOracle, params: &mut Params) -> FeatureSpace {
        FeatureSpace::initialize_cells(oracle.hyperplanes(), false, params, oracle)
    }

    #[test]
    fn test_constant_ensemble_is_a_single_leaf() {
        let levels = vec![vec![1.0, 2.0, OPEN_INTERVAL_LEVEL], vec![OPEN_INTERVAL_LEVEL]];
        let oracle = GridOracle::from_fn(levels, 3, |_| 2);
        let params = heuristic_params(2, 3, 7);
        let tree = HeuristicBuilder::new(&params, &oracle, None).build().unwrap();
        assert_eq!(tree.nodes_len(), 1);
        assert_eq!(tree.get_leaf_class(0), 2);
    }

    #[test]
    fn test_threshold_ensemble_is_split_once() {
        let levels = vec![vec![1.0, 2.0, 3.0, OPEN_INTERVAL_LEVEL]];
        let oracle = GridOracle::from_fn(levels, 2, |c| usize::from(c[0] >= 2));
        let params = heuristic_params(1, 2, 3);
        let tree = HeuristicBuilder::new(&params, &oracle, None).build().unwrap();
        // Sampling all 4 levels 50 times leaves no class unseen, so the entropy split is exact.
        assert_eq!(tree.nb_splits(), 1);
        assert_eq!(tree.get_threshold(0), 2.0);
        assert_eq!(tree.predict(&[2.0]), 0);
        assert_eq!(tree.predict(&[2.5]), 1);
    }

    #[test]
    fn test_same_seed_same_tree() {
        let levels = vec![vec![1.0, 2.0, 3.0, OPEN_INTERVAL_LEVEL], vec![1.0, 2.0, OPEN_INTERVAL_LEVEL]];
        let oracle = GridOracle::from_fn(levels, 3, |c| (c[0] * 2 + c[1]) % 3);
        let params = heuristic_params(2, 3, 42);
        let first = HeuristicBuilder::new(&params, &oracle, None).build().unwrap();
        let second = HeuristicBuilder::new(&params, &oracle, None).build().unwrap();
        assert_eq!(first.to_string(), second.to_string());
    }

    /// 8 x 8 grid with a single class-1 cell at coordinates (5, 3), index 43.
    fn hidden_cell_oracle() -> GridOracle {
        let levels = vec![
            (1..8).map(f64::from).chain([OPEN_INTERVAL_LEVEL]).collect::<Vec<f64>>(),
            (1..8).map(f64::from).chain([OPEN_INTERVAL_LEVEL]).collect::<Vec<f64>>(),
        ];
        GridOracle::from_fn(levels, 2, |c| usize::from(c[0] == 5 && c[1] == 3))
    }

    #[test]
    fn test_small_samples_miss_a_hidden_class() {
        let oracle = hidden_cell_oracle();
        let mut missed = 0;
        for seed in 0..10 {
            let mut params = heuristic_params(2, 2, seed);
            params.nb_cells_sampled = 1;
            let tree = HeuristicBuilder::new(&params, &oracle, None).build().unwrap();
            let space = grid_space(&oracle, &mut params);
            if misclassified_cells(&tree, &space).contains(&43) {
                missed += 1;
            }
        }
        // The root sample hits the hidden cell with probability 1/64 per seed.
        assert!(missed > 0);
    }

    #[test]
    fn test_large_samples_find_a_hidden_class() {
        let oracle = hidden_cell_oracle();
        for seed in [1, 2, 3] {
            let mut params = heuristic_params(2, 2, seed);
            params.nb_cells_sampled = 2000;
            let tree = HeuristicBuilder::new(&params, &oracle, None).build().unwrap();
            let space = grid_space(&oracle, &mut params);
            assert!(misclassified_cells(&tree, &space).is_empty(), "seed {}", seed);
            assert!(tree.nb_splits() >= 4);
        }
    }

    #[test]
    fn test_pure_region_is_a_leaf_at_every_sample_size() {
        let oracle = GridOracle::from_fn(hidden_cell_oracle().levels, 2, |_| 1);
        for nb_cells_sampled in [1, 10, 1000] {
            let mut params = heuristic_params(2, 2, 5);
            params.nb_cells_sampled = nb_cells_sampled;
            let tree = HeuristicBuilder::new(&params, &oracle, None).build().unwrap();
            assert_eq!(tree.nodes_len(), 1);
            assert_eq!(tree.get_leaf_class(0), 1);
        }
    }

    #[test]
    fn test_exhaustive_certificate_rejects_hidden_class() {
        // One sample per region rarely sees the hidden cell.
        let oracle = hidden_cell_oracle();
        let mut params = heuristic_params(2, 2, 11);
        params.nb_cells_sampled = 1;
        let mut certificate = ExhaustiveCertificate::new(&oracle);
        let tree = HeuristicBuilder::new(&params, &oracle, Some(&mut certificate)).build().unwrap();
        let space = grid_space(&oracle, &mut params);
        assert!(misclassified_cells(&tree, &space).is_empty());
        assert!(certificate.cells_evaluated > 0);
    }

    #[test]
    fn test_exhaustive_certificate_on_a_single_cell() {
        let levels = vec![vec![1.0, OPEN_INTERVAL_LEVEL]];
        let oracle = GridOracle::from_fn(levels.clone(), 2, |c| c[0]);
        let mut certificate = ExhaustiveCertificate::new(&oracle);
        let non_trivial = BTreeSet::new();
        let initial = BTreeSet::from([0]);
        let view = RegionView {
            levels: &levels,
            bottom_left: &[1],
            top_right: &[1],
            non_trivial_features: &non_trivial,
            initial_non_trivial_features: &initial,
        };
        assert!(certificate.pre_filter(&view, 1, 0));
        assert!(!certificate.pre_filter(&view, 0, 1));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_certified_heuristic_is_faithful(oracle in grid_oracle_strategy(3, 4, 3), seed in 0u64..1000) {
            let mut params = heuristic_params(3, 3, seed);
            params.nb_cells_sampled = 5;
            let mut certificate = ExhaustiveCertificate::new(&oracle);
            let tree = HeuristicBuilder::new(&params, &oracle, Some(&mut certificate)).build().unwrap();
            let space = grid_space(&oracle, &mut params);
            prop_assert!(misclassified_cells(&tree, &space).is_empty());
            prop_assert_eq!(tree.nb_leaves(), tree.nb_splits() + 1);
        }
    }
}

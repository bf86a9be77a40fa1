//! Recursion of the bounded-depth objective: the largest weight of cells a tree
//! of limited depth can classify like the ensemble.

use super::RegionOptimizer;

impl<'a> RegionOptimizer<'a> {
    /// Maximum weight of correctly classified cells in the region `index_bottom..=index_top`
    /// with at most `depth` further splits on any path.
    ///
    /// A single cell is always classified correctly. With no depth left the region
    /// becomes one leaf predicting its heaviest class. Otherwise every split is
    /// tried and the best sum of both sides is kept.
    pub(super) fn optimize_bounded_depth(&mut self, index_bottom: usize, index_top: usize, depth: usize) -> f64 {
        self.stats.iterations += 1;
        if index_bottom == index_top {
            return self.fspace.cells[index_bottom].value;
        }
        let hash = self.fspace.key_to_hash(index_bottom, index_top);
        if let Some(value) = self.weighted_memo[depth].get(index_bottom, hash) {
            return value;
        }

        if depth == 0 {
            let (_, weight) = self.fspace.weighted_majority(index_bottom, index_top, self.nb_classes);
            return self.memorize_weight(depth, index_bottom, hash, weight);
        }

        let mut best = 0.0f64;
        for k in 0..self.fspace.nb_features() {
            let (range_low, range_up) = self.feature_range(index_bottom, index_top, k);
            for l in range_low..range_up {
                let left = self.optimize_bounded_depth(index_bottom, self.left_top(index_top, k, l, range_up), depth - 1);
                let right =
                    self.optimize_bounded_depth(self.right_bottom(index_bottom, k, l, range_low), index_top, depth - 1);
                let result = left + right;
                if result > best {
                    best = result;
                }
            }
        }
        self.memorize_weight(depth, index_bottom, hash, best)
    }

    #[inline(always)]
    fn memorize_weight(&mut self, depth: usize, index_bottom: usize, hash: usize, value: f64) -> f64 {
        self.weighted_memo[depth].set(index_bottom, hash, value);
        self.stats.regions_memorized += 1;
        value
    }

    /// Memoized weight of a region at a remaining depth, or the weight of a single cell.
    #[inline(always)]
    pub(super) fn solved_weight(&self, index_bottom: usize, index_top: usize, depth: usize) -> Option<f64> {
        if index_bottom == index_top {
            return Some(self.fspace.cells[index_bottom].value);
        }
        let hash = self.fspace.key_to_hash(index_bottom, index_top);
        self.weighted_memo[depth].get(index_bottom, hash)
    }
}

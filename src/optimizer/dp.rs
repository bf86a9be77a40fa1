//! Recursions of the minimized objectives: depth (with a bisection over the
//! levels of each feature) and the linear scans of the split-count objectives.
//!
//! Performance Critical: every call is one DP state. Regions are passed as
//! two `usize` cell indices, no allocation happens inside the recursion.

use super::{RegionOptimizer, SplitRule};

impl<'a> RegionOptimizer<'a> {
    /// Minimum depth of a tree reproducing the region `index_bottom..=index_top`.
    ///
    /// For each feature, bisects the levels of the region: a left sub-region
    /// that is already too deep moves the search down, a right one moves it up.
    /// The global lower bound is the deepest sub-region seen so far; the search
    /// stops as soon as it meets the best depth found.
    pub(super) fn optimize_depth(&mut self, index_bottom: usize, index_top: usize) -> u32 {
        self.stats.iterations += 1;
        if index_bottom == index_top {
            return 0;
        }
        let hash = self.fspace.key_to_hash(index_bottom, index_top);
        if let Some(value) = self.memo.get(index_bottom, hash) {
            return value;
        }

        let mut best_lb = 0u32;
        let mut best_ub = u32::MAX;
        for k in 0..self.fspace.nb_features() {
            if best_lb >= best_ub {
                break;
            }
            let (range_low, range_up) = self.feature_range(index_bottom, index_top, k);
            let mut tl = range_low;
            let mut tu = range_up;
            while tl < tu && best_lb < best_ub {
                let l = (tl + tu) / 2;
                let left_top = self.left_top(index_top, k, l, range_up);
                let left = self.optimize_depth(index_bottom, left_top);
                best_lb = best_lb.max(left);

                if left + 1 >= best_ub {
                    #[cfg(feature = "detailed-stats")]
                    {
                        self.stats.skipped_right_regions += 1;
                    }
                    tu = l;
                    continue;
                }

                let right_bottom = self.right_bottom(index_bottom, k, l, range_low);
                let right = self.optimize_depth(right_bottom, index_top);
                if left == 0 && right == 0 {
                    let value = u32::from(!self.corners_agree(index_bottom, index_top));
                    return self.memorize(index_bottom, hash, value);
                }
                best_lb = best_lb.max(right);
                let candidate = SplitRule::Depth.combine(left, right);
                if candidate < best_ub {
                    best_ub = candidate;
                }
                if left + 1 >= best_ub {
                    tu = l;
                }
                if right + 1 >= best_ub {
                    tl = l + 1;
                }
            }
        }
        self.memorize(index_bottom, hash, best_ub)
    }

    /// Linear scan over every level of every feature, for `NbSplits` and `DepthThenSplits`.
    ///
    /// The lower bound is the costliest sub-region seen so far; the scan stops as
    /// soon as it meets the best split found.
    pub(super) fn optimize_scan(&mut self, index_bottom: usize, index_top: usize, rule: SplitRule) -> u32 {
        self.stats.iterations += 1;
        if index_bottom == index_top {
            return 0;
        }
        let hash = self.fspace.key_to_hash(index_bottom, index_top);
        if let Some(value) = self.memo.get(index_bottom, hash) {
            return value;
        }

        let mut best_lb = 0u32;
        let mut best_ub = u32::MAX;
        'features: for k in 0..self.fspace.nb_features() {
            let (range_low, range_up) = self.feature_range(index_bottom, index_top, k);
            for l in range_low..range_up {
                if best_lb >= best_ub {
                    break 'features;
                }
                let left = self.optimize_scan(index_bottom, self.left_top(index_top, k, l, range_up), rule);
                let right = self.optimize_scan(self.right_bottom(index_bottom, k, l, range_low), index_top, rule);
                if left == 0 && right == 0 {
                    let value = if self.corners_agree(index_bottom, index_top) { 0 } else { rule.combine(0, 0) };
                    return self.memorize(index_bottom, hash, value);
                }
                best_lb = best_lb.max(left).max(right);
                best_ub = best_ub.min(rule.combine(left, right));
            }
        }
        self.memorize(index_bottom, hash, best_ub)
    }

    /// Whether the two corner cells of a region share their class.
    #[inline(always)]
    pub(super) fn corners_agree(&self, index_bottom: usize, index_top: usize) -> bool {
        self.fspace.cells[index_bottom].classification == self.fspace.cells[index_top].classification
    }

    #[inline(always)]
    fn memorize(&mut self, index_bottom: usize, hash: usize, value: u32) -> u32 {
        self.memo.set(index_bottom, hash, value);
        self.stats.regions_memorized += 1;
        value
    }
}

//! Exact construction of the born-again tree by dynamic programming over the
//! regions of a (filtered) feature space.
//!
//! A region is identified by its two corner cells. Every objective shares the
//! same recursive shape: try each hyperplane `l` of each feature `k` strictly
//! inside the region, solve the two sub-regions it induces, and combine them.
//! Values are memoized per (anchor cell, region hash) in dense tables built
//! before the solve, see `RegionMemo`.
//!
//! Provides the optimizer (`RegionOptimizer::solve`) and, once solved, the
//! extraction of an optimal tree from the memo (`TreeReconstructor`).

mod bounded_depth;
mod dp;
mod memo;
mod reconstruct;

pub use memo::RegionMemo;
pub use reconstruct::TreeReconstructor;

use crate::config::{Objective, BIG_M};
use crate::error::{BornAgainError, Result};
use crate::fspace::FeatureSpace;
use crate::tree::RebornTree;

/// Sentinel of an unsolved entry for the split-count objectives.
pub const UNSOLVED: u32 = u32::MAX;
/// Sentinel of an unsolved entry for the bounded-depth objective (weights are never negative).
pub const UNSOLVED_WEIGHT: f64 = -1.0;

/// Optimal value of the root region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RootValue {
    /// Depth, number of splits, or `depth * BIG_M + splits`.
    Size(u32),
    /// Weight of the correctly classified cells.
    Weight(f64),
}

impl RootValue {
    pub fn as_f64(self) -> f64 {
        match self {
            RootValue::Size(value) => value as f64,
            RootValue::Weight(value) => value,
        }
    }
}

/// How two sub-region values combine into the value of a split, for the minimized objectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SplitRule {
    Depth,
    NbSplits,
    DepthThenSplits,
}

impl SplitRule {
    pub(crate) fn for_objective(objective: Objective) -> Option<Self> {
        match objective {
            Objective::Depth => Some(SplitRule::Depth),
            Objective::NbSplits => Some(SplitRule::NbSplits),
            Objective::DepthThenSplits => Some(SplitRule::DepthThenSplits),
            Objective::Heuristic | Objective::BoundedDepth => None,
        }
    }

    /// Value of a region split into sub-regions of values `left` and `right`.
    #[inline(always)]
    pub(crate) fn combine(self, left: u32, right: u32) -> u32 {
        match self {
            SplitRule::Depth => 1 + left.max(right),
            SplitRule::NbSplits => 1 + left + right,
            // depth * BIG_M + splits
            SplitRule::DepthThenSplits => {
                BIG_M + 1 + BIG_M * (left / BIG_M).max(right / BIG_M) + left % BIG_M + right % BIG_M
            }
        }
    }
}

/// Counters reported in the run statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptimizerStats {
    /// Number of recursive calls.
    pub iterations: u64,
    /// Number of regions whose value was memoized.
    pub regions_memorized: u64,
    /// [Detailed Stats] Right sub-regions never solved thanks to the depth bounds.
    #[cfg(feature = "detailed-stats")]
    pub skipped_right_regions: u64,
}

/// Dynamic program over the regions of one feature space, for one objective.
#[derive(Debug)]
pub struct RegionOptimizer<'a> {
    fspace: &'a FeatureSpace,
    objective: Objective,
    nb_classes: usize,
    depth_budget: usize,
    /// Values of the split-count objectives.
    memo: RegionMemo<u32>,
    /// Values of the bounded-depth objective, one layer per remaining depth `0..=depth_budget`.
    weighted_memo: Vec<RegionMemo<f64>>,
    stats: OptimizerStats,
}

impl<'a> RegionOptimizer<'a> {
    /// Allocates the memo tables needed by `objective`.
    ///
    /// # Arguments
    /// * `fspace` - The (filtered) feature space; must have valued cells for `BoundedDepth`.
    /// * `objective` - Any exact objective.
    /// * `depth_budget` - Maximum depth, only read by `BoundedDepth`. Budgets deeper
    ///   than the number of hyperplanes allow no further split and are clamped.
    /// * `nb_classes` - Number of classes of the ensemble.
    pub fn new(fspace: &'a FeatureSpace, objective: Objective, depth_budget: usize, nb_classes: usize) -> Result<Self> {
        let max_useful_depth: usize = fspace.ordered_hyperplane_levels.iter().map(|levels| levels.len() - 1).sum();
        if depth_budget > max_useful_depth && objective == Objective::BoundedDepth {
            log::debug!("Depth budget {} clamped to {}, the number of hyperplanes", depth_budget, max_useful_depth);
        }
        let depth_budget = depth_budget.min(max_useful_depth);
        let (memo, weighted_memo) = match objective {
            Objective::Heuristic => {
                return Err(BornAgainError::InvalidConfig(
                    "the heuristic objective is not solved by dynamic programming".into(),
                ))
            }
            Objective::BoundedDepth => (
                RegionMemo::empty(UNSOLVED),
                (0..=depth_budget).map(|_| RegionMemo::allocate(fspace, UNSOLVED_WEIGHT)).collect(),
            ),
            _ => (RegionMemo::allocate(fspace, UNSOLVED), Vec::new()),
        };
        let entries = memo.capacity() + weighted_memo.iter().map(RegionMemo::capacity).sum::<usize>();
        log::debug!(
            "Allocated {} memo entries for {} cells ({} possible regions)",
            entries,
            fspace.nb_cells,
            fspace.nb_possible_regions
        );

        Ok(RegionOptimizer {
            fspace,
            objective,
            nb_classes,
            depth_budget,
            memo,
            weighted_memo,
            stats: OptimizerStats::default(),
        })
    }

    /// Solves the region spanning the whole feature space.
    pub fn solve(&mut self) -> RootValue {
        let index_top = self.fspace.nb_cells - 1;
        match self.objective {
            Objective::BoundedDepth => RootValue::Weight(self.optimize_bounded_depth(0, index_top, self.depth_budget)),
            Objective::Depth => RootValue::Size(self.optimize_depth(0, index_top)),
            Objective::NbSplits => RootValue::Size(self.optimize_scan(0, index_top, SplitRule::NbSplits)),
            Objective::DepthThenSplits => {
                RootValue::Size(self.optimize_scan(0, index_top, SplitRule::DepthThenSplits))
            }
            // Rejected by `new`.
            Objective::Heuristic => RootValue::Size(0),
        }
    }

    /// Extracts a tree achieving `root` from the solved memo.
    pub fn reconstruct(&self, root: RootValue) -> Result<RebornTree> {
        TreeReconstructor::new(self).build(root)
    }

    pub fn stats(&self) -> &OptimizerStats {
        &self.stats
    }

    pub fn fspace(&self) -> &FeatureSpace {
        self.fspace
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Range of feature `k` covered by the region: `(range_low, range_up)`.
    #[inline(always)]
    fn feature_range(&self, index_bottom: usize, index_top: usize, k: usize) -> (usize, usize) {
        (self.fspace.key_to_cell(index_bottom, k), self.fspace.key_to_cell(index_top, k))
    }

    /// Top corner of the left sub-region when splitting at level `l` of feature `k`.
    #[inline(always)]
    fn left_top(&self, index_top: usize, k: usize, l: usize, range_up: usize) -> usize {
        index_top - self.fspace.code_book[k] * (range_up - l)
    }

    /// Bottom corner of the right sub-region when splitting at level `l` of feature `k`.
    #[inline(always)]
    fn right_bottom(&self, index_bottom: usize, k: usize, l: usize, range_low: usize) -> usize {
        index_bottom + self.fspace.code_book[k] * (l + 1 - range_low)
    }
}

//! Extraction of an optimal tree from a solved `RegionOptimizer`.
//!
//! Walks the regions top-down: at each region, enumerates the splits in the
//! same order as the solve and keeps the first one whose memoized sub-region
//! values combine into the region's value. Nodes are pushed parent-first.

use super::{RegionOptimizer, RootValue, SplitRule};
use crate::config::BIG_M;
use crate::error::{BornAgainError, Result};
use crate::tree::{NodeId, RebornTree};

/// Rebuilds the tree of a solved optimizer. Does not mutate the optimizer.
pub struct TreeReconstructor<'o, 'a> {
    optimizer: &'o RegionOptimizer<'a>,
    tree: RebornTree,
}

impl<'o, 'a> TreeReconstructor<'o, 'a> {
    pub fn new(optimizer: &'o RegionOptimizer<'a>) -> Self {
        TreeReconstructor { optimizer, tree: RebornTree::new() }
    }

    /// Builds the tree achieving `root` over the whole feature space.
    ///
    /// # Returns
    /// `InternalInconsistency` if some region has no split matching its value,
    /// which only happens when `root` was not produced by the optimizer's solve.
    pub fn build(mut self, root: RootValue) -> Result<RebornTree> {
        let index_top = self.optimizer.fspace.nb_cells - 1;
        match root {
            RootValue::Size(value) => {
                let rule = SplitRule::for_objective(self.optimizer.objective).ok_or_else(|| {
                    BornAgainError::InternalInconsistency {
                        stage: "reconstructing the tree",
                        detail: format!("objective {} does not produce sizes", self.optimizer.objective),
                    }
                })?;
                if let Some(nodes) = expected_nodes(rule, value) {
                    self.tree = RebornTree::with_capacity(nodes);
                }
                self.collect_sized(0, index_top, value, 0, rule)?;
            }
            RootValue::Weight(value) => {
                self.collect_weighted(0, index_top, value, 0, self.optimizer.depth_budget)?;
            }
        }
        Ok(self.tree)
    }

    /// Value of a sub-region found while enumerating splits. `None` if never solved.
    fn solved_size(&self, index_bottom: usize, index_top: usize) -> Option<u32> {
        if index_bottom == index_top {
            return Some(0);
        }
        let hash = self.optimizer.fspace.key_to_hash(index_bottom, index_top);
        self.optimizer.memo.get(index_bottom, hash)
    }

    fn collect_sized(
        &mut self,
        index_bottom: usize,
        index_top: usize,
        opt_value: u32,
        current_depth: usize,
        rule: SplitRule,
    ) -> Result<NodeId> {
        let fspace = self.optimizer.fspace;
        if opt_value == 0 {
            return Ok(self.tree.push_leaf(fspace.cells[index_bottom].classification, current_depth));
        }

        for k in 0..fspace.nb_features() {
            let (range_low, range_up) = self.optimizer.feature_range(index_bottom, index_top, k);
            for l in range_low..range_up {
                let left_top = self.optimizer.left_top(index_top, k, l, range_up);
                let right_bottom = self.optimizer.right_bottom(index_bottom, k, l, range_low);
                let (Some(left), Some(right)) =
                    (self.solved_size(index_bottom, left_top), self.solved_size(right_bottom, index_top))
                else {
                    continue;
                };
                if rule.combine(left, right) == opt_value {
                    let id = self.tree.push_internal(k, fspace.ordered_hyperplane_levels[k][l], current_depth);
                    let left_id = self.collect_sized(index_bottom, left_top, left, current_depth + 1, rule)?;
                    let right_id = self.collect_sized(right_bottom, index_top, right, current_depth + 1, rule)?;
                    self.tree.set_children(id, left_id, right_id);
                    return Ok(id);
                }
            }
        }

        Err(BornAgainError::InternalInconsistency {
            stage: "reconstructing the tree",
            detail: format!("no split of region ({}, {}) reaches value {}", index_bottom, index_top, opt_value),
        })
    }

    fn collect_weighted(
        &mut self,
        index_bottom: usize,
        index_top: usize,
        opt_value: f64,
        current_depth: usize,
        depth: usize,
    ) -> Result<NodeId> {
        let fspace = self.optimizer.fspace;
        if index_bottom == index_top {
            return Ok(self.tree.push_leaf(fspace.cells[index_bottom].classification, current_depth));
        }
        if depth == 0 {
            let (class, _) = fspace.weighted_majority(index_bottom, index_top, self.optimizer.nb_classes);
            return Ok(self.tree.push_leaf(class, current_depth));
        }

        for k in 0..fspace.nb_features() {
            let (range_low, range_up) = self.optimizer.feature_range(index_bottom, index_top, k);
            for l in range_low..range_up {
                let left_top = self.optimizer.left_top(index_top, k, l, range_up);
                let right_bottom = self.optimizer.right_bottom(index_bottom, k, l, range_low);
                let (Some(left), Some(right)) = (
                    self.optimizer.solved_weight(index_bottom, left_top, depth - 1),
                    self.optimizer.solved_weight(right_bottom, index_top, depth - 1),
                ) else {
                    continue;
                };
                // Same summation as the solve: exact equality holds on the optimal split.
                if left + right == opt_value {
                    let id = self.tree.push_internal(k, fspace.ordered_hyperplane_levels[k][l], current_depth);
                    let left_id = self.collect_weighted(index_bottom, left_top, left, current_depth + 1, depth - 1)?;
                    let right_id = self.collect_weighted(right_bottom, index_top, right, current_depth + 1, depth - 1)?;
                    self.tree.set_children(id, left_id, right_id);
                    return Ok(id);
                }
            }
        }

        Err(BornAgainError::InternalInconsistency {
            stage: "reconstructing the tree",
            detail: format!(
                "no split of region ({}, {}) reaches weight {} with depth {}",
                index_bottom, index_top, opt_value, depth
            ),
        })
    }
}

/// Node count of the tree achieving `value`, when the objective counts splits.
fn expected_nodes(rule: SplitRule, value: u32) -> Option<usize> {
    match rule {
        SplitRule::Depth => None,
        SplitRule::NbSplits => Some(2 * value as usize + 1),
        SplitRule::DepthThenSplits => Some(2 * (value % BIG_M) as usize + 1),
    }
}

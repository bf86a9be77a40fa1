//! The ensemble collaborator: the `EnsembleOracle` capability consumed by the
//! feature space and the heuristic, and a concrete `RandomForest` loaded from
//! a JSON file in scikit-learn's parallel-array layout.
//!
//! This module does not have performance critical code. Safety checks are allowed!

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::config::OPEN_INTERVAL_LEVEL;
use crate::error::{BornAgainError, Result};
use crate::tree::{FEATURE_LEAF_SENTINEL, INTERNAL_NODE_CLASS_SENTINEL};
use crate::utils::_FAST_get_majority_class;

/// What the born-again construction needs to know about an ensemble.
pub trait EnsembleOracle {
    fn nb_features(&self) -> usize;

    fn nb_classes(&self) -> usize;

    /// Per-feature split levels: ascending, deduplicated, each list closed by
    /// `OPEN_INTERVAL_LEVEL` (the open upper interval).
    fn hyperplanes(&self) -> Vec<Vec<f64>>;

    /// Class predicted by the ensemble's majority vote at `coordinates`.
    /// Must be deterministic.
    fn majority_class(&self, coordinates: &[f64]) -> usize;
}

/// Random forest loaded from a JSON file.
///
/// Tree structures are stored as parallel arrays, one vector per tree.
/// A node goes left when `x[feature] <= threshold`.
#[derive(Deserialize, Debug, Clone)]
pub struct RandomForest {
    #[serde(default = "default_dataset_name")]
    pub dataset_name: String,
    #[serde(default = "default_ensemble_method")]
    pub ensemble_method: String,
    pub n_features: usize,
    pub n_classes: usize,
    /// Maximum depth of the input trees (informational).
    #[serde(default)]
    pub max_depth: usize,
    /// The total number of trees in the forest.
    pub n_total_trees: usize,
    /// `features[tree_idx][node_idx]`: split feature, or -2 for leaves.
    pub features: Vec<Vec<i64>>,
    /// `thresholds[tree_idx][node_idx]`: split threshold (ignored for leaves).
    pub thresholds: Vec<Vec<f64>>,
    /// `children_left[tree_idx][node_idx]`: child taken when `x[feature] <= threshold`, -1 for leaves.
    pub children_left: Vec<Vec<i64>>,
    /// `children_right[tree_idx][node_idx]`: child taken when `x[feature] > threshold`, -1 for leaves.
    pub children_right: Vec<Vec<i64>>,
    /// `values[tree_idx][node_idx][class_idx]`: class distribution at the node.
    pub values: Vec<Vec<Vec<f64>>>,
    /// Precomputed majority class for each leaf. `usize::MAX` for non-leaves.
    #[serde(skip)]
    pub leaf_classes: Vec<Vec<usize>>,
}

fn default_dataset_name() -> String {
    String::from("unknown")
}

fn default_ensemble_method() -> String {
    String::from("RF")
}

impl RandomForest {
    /// Loads a random forest from a JSON file, validates it and precomputes leaf classes.
    pub fn load<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let filename_ref = filename.as_ref();
        let content = fs::read_to_string(filename_ref)?;
        let forest = Self::from_json_str(&content)?;
        log::info!(
            "Loaded random forest {:?}: {} trees, {} features, {} classes",
            filename_ref, forest.n_total_trees, forest.n_features, forest.n_classes
        );
        Ok(forest)
    }

    /// Parses and validates a random forest from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let mut forest: RandomForest = serde_json::from_str(content)?;
        forest.validate()?;
        forest.leaf_classes = (0..forest.n_total_trees)
            .map(|i| compute_leaf_classes(&forest.features[i], &forest.values[i], forest.n_classes))
            .collect();
        Ok(forest)
    }

    fn validate(&self) -> Result<()> {
        if self.n_total_trees != self.features.len()
            || self.n_total_trees != self.thresholds.len()
            || self.n_total_trees != self.children_left.len()
            || self.n_total_trees != self.children_right.len()
            || self.n_total_trees != self.values.len()
        {
            return Err(BornAgainError::InvalidForest(format!(
                "inconsistent number of trees ({}) across the node arrays",
                self.n_total_trees
            )));
        }
        if self.n_classes == 0 {
            return Err(BornAgainError::InvalidForest("the forest declares no class".into()));
        }

        for tree_idx in 0..self.n_total_trees {
            let n_nodes = self.features[tree_idx].len();
            if n_nodes == 0
                || self.thresholds[tree_idx].len() != n_nodes
                || self.children_left[tree_idx].len() != n_nodes
                || self.children_right[tree_idx].len() != n_nodes
                || self.values[tree_idx].len() != n_nodes
            {
                return Err(BornAgainError::InvalidForest(format!(
                    "tree {} has empty or inconsistent node arrays",
                    tree_idx
                )));
            }
            for node_idx in 0..n_nodes {
                let feature = self.features[tree_idx][node_idx];
                if feature == FEATURE_LEAF_SENTINEL {
                    continue;
                }
                if feature < 0 || feature as usize >= self.n_features {
                    return Err(BornAgainError::InvalidForest(format!(
                        "feature index {} at tree {}, node {} is out of bounds (n_features = {})",
                        feature, tree_idx, node_idx, self.n_features
                    )));
                }
                for child in [self.children_left[tree_idx][node_idx], self.children_right[tree_idx][node_idx]] {
                    if child <= node_idx as i64 || child as usize >= n_nodes {
                        return Err(BornAgainError::InvalidForest(format!(
                            "child {} of tree {}, node {} is not a later node of the tree",
                            child, tree_idx, node_idx
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Keeps only the first `nb_trees` trees of the forest.
    pub fn truncate(&mut self, nb_trees: usize) {
        if nb_trees >= self.n_total_trees {
            return;
        }
        self.n_total_trees = nb_trees;
        self.features.truncate(nb_trees);
        self.thresholds.truncate(nb_trees);
        self.children_left.truncate(nb_trees);
        self.children_right.truncate(nb_trees);
        self.values.truncate(nb_trees);
        self.leaf_classes.truncate(nb_trees);
    }

    /// Class predicted by a single tree.
    pub fn predict_tree(&self, tree_idx: usize, coordinates: &[f64]) -> usize {
        let mut node = 0usize;
        loop {
            let feature = self.features[tree_idx][node];
            if feature == FEATURE_LEAF_SENTINEL {
                return self.leaf_classes[tree_idx][node];
            }
            node = if coordinates[feature as usize] <= self.thresholds[tree_idx][node] {
                self.children_left[tree_idx][node] as usize
            } else {
                self.children_right[tree_idx][node] as usize
            };
        }
    }

    /// Vote counts of every tree of the forest at `coordinates`.
    pub fn votes(&self, coordinates: &[f64]) -> Vec<u32> {
        let mut votes = vec![0u32; self.n_classes];
        for tree_idx in 0..self.n_total_trees {
            let class = self.predict_tree(tree_idx, coordinates);
            if class < self.n_classes {
                votes[class] += 1;
            } else {
                log::warn!("Invalid leaf class {} reached in tree {}", class, tree_idx);
            }
        }
        votes
    }
}

impl EnsembleOracle for RandomForest {
    fn nb_features(&self) -> usize {
        self.n_features
    }

    fn nb_classes(&self) -> usize {
        self.n_classes
    }

    fn hyperplanes(&self) -> Vec<Vec<f64>> {
        let mut levels: Vec<Vec<f64>> = vec![Vec::new(); self.n_features];
        for tree_idx in 0..self.n_total_trees {
            for (node_idx, &feature) in self.features[tree_idx].iter().enumerate() {
                if feature != FEATURE_LEAF_SENTINEL {
                    let threshold = self.thresholds[tree_idx][node_idx];
                    if threshold < OPEN_INTERVAL_LEVEL {
                        levels[feature as usize].push(threshold);
                    }
                }
            }
        }
        for feature_levels in levels.iter_mut() {
            feature_levels.sort_by(|a, b| a.total_cmp(b));
            feature_levels.dedup();
            feature_levels.push(OPEN_INTERVAL_LEVEL);
        }
        levels
    }

    fn majority_class(&self, coordinates: &[f64]) -> usize {
        _FAST_get_majority_class(&self.votes(coordinates))
    }
}

/// Helper to compute leaf classes for a single tree's nodes.
/// Argmax of the leaf's class distribution, lower index on ties.
pub(crate) fn compute_leaf_classes(features: &[i64], values: &[Vec<f64>], n_classes: usize) -> Vec<usize> {
    features
        .iter()
        .zip(values)
        .enumerate()
        .map(|(node_idx, (&feature, node_values))| {
            if feature != FEATURE_LEAF_SENTINEL {
                return INTERNAL_NODE_CLASS_SENTINEL;
            }
            if node_values.len() != n_classes {
                log::warn!("Inconsistent values array for leaf node {}, defaulting to class 0", node_idx);
                return 0;
            }
            let mut max_val = f64::NEG_INFINITY;
            let mut leaf_class = 0;
            for (class_idx, &val) in node_values.iter().enumerate() {
                if val > max_val {
                    max_val = val;
                    leaf_class = class_idx;
                }
            }
            leaf_class
        })
        .collect()
}

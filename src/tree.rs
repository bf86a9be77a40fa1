//! Defines the born-again tree: an append-only arena of nodes stored as a
//! Structure of Arrays with scikit-learn style sentinels.
//!
//! Node ids follow creation order. Both builders push a node before its
//! subtrees (preorder), so the root is always node 0 and the children of an
//! internal node are filled in once both subtrees exist.

use std::fmt;

/// Type alias for a node identifier within the `RebornTree`.
pub type NodeId = usize;

// --- Sklearn-Style Sentinels ---
/// Sentinel value for child ids indicating a leaf node (or a child not yet attached).
pub const CHILD_LEAF_SENTINEL: i64 = -1;
/// Sentinel value for feature index indicating a leaf node.
pub const FEATURE_LEAF_SENTINEL: i64 = -2;
/// Sentinel f64 value for threshold indicating a leaf node.
pub const THRESHOLD_LEAF_SENTINEL_F64: f64 = -2.0;
/// Sentinel value for leaf class indicating an internal node.
pub const INTERNAL_NODE_CLASS_SENTINEL: usize = usize::MAX;
// --- End Sentinels ---

/// Read-only view of one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    /// Test `x[feature] <= threshold`: true goes left.
    Internal { feature: usize, threshold: f64, left: NodeId, right: NodeId, depth: usize },
    Leaf { class: usize, depth: usize },
}

/// The single decision tree produced by the optimizer or the heuristic.
#[derive(Debug, Clone, Default)]
pub struct RebornTree {
    // --- SoA Data Storage ---
    features: Vec<i64>,
    thresholds: Vec<f64>,
    left_ids: Vec<i64>,
    right_ids: Vec<i64>,
    depths: Vec<usize>,
    leaf_classes: Vec<usize>,
}

impl RebornTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty tree with room for `node_capacity` nodes.
    pub fn with_capacity(node_capacity: usize) -> Self {
        RebornTree {
            features: Vec::with_capacity(node_capacity),
            thresholds: Vec::with_capacity(node_capacity),
            left_ids: Vec::with_capacity(node_capacity),
            right_ids: Vec::with_capacity(node_capacity),
            depths: Vec::with_capacity(node_capacity),
            leaf_classes: Vec::with_capacity(node_capacity),
        }
    }

    /// Appends a leaf predicting `class`.
    #[inline(always)]
    pub fn push_leaf(&mut self, class: usize, depth: usize) -> NodeId {
        debug_assert!(class != INTERNAL_NODE_CLASS_SENTINEL, "Leaf class collides with the internal node sentinel");
        let id = self.nodes_len();
        self.features.push(FEATURE_LEAF_SENTINEL);
        self.thresholds.push(THRESHOLD_LEAF_SENTINEL_F64);
        self.left_ids.push(CHILD_LEAF_SENTINEL);
        self.right_ids.push(CHILD_LEAF_SENTINEL);
        self.depths.push(depth);
        self.leaf_classes.push(class);
        id
    }

    /// Appends an internal node whose children are attached later with `set_children`.
    #[inline(always)]
    pub fn push_internal(&mut self, feature: usize, threshold: f64, depth: usize) -> NodeId {
        let id = self.nodes_len();
        self.features.push(feature as i64);
        self.thresholds.push(threshold);
        self.left_ids.push(CHILD_LEAF_SENTINEL);
        self.right_ids.push(CHILD_LEAF_SENTINEL);
        self.depths.push(depth);
        self.leaf_classes.push(INTERNAL_NODE_CLASS_SENTINEL);
        id
    }

    #[inline(always)]
    pub fn set_children(&mut self, id: NodeId, left: NodeId, right: NodeId) {
        debug_assert!(!self.is_leaf(id), "Attempted to attach children to a leaf");
        self.left_ids[id] = left as i64;
        self.right_ids[id] = right as i64;
    }

    // --- SoA Accessor Methods (using sklearn sentinels) ---

    /// # Panics
    /// Panics if the `id` is out of bounds.
    #[inline(always)]
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.features[id] == FEATURE_LEAF_SENTINEL
    }

    /// Gets the raw feature index. Returns FEATURE_LEAF_SENTINEL (-2) for leaves.
    #[inline(always)]
    pub fn get_feature_raw(&self, id: NodeId) -> i64 {
        self.features[id]
    }

    /// Returns THRESHOLD_LEAF_SENTINEL_F64 (-2.0) for leaves.
    #[inline(always)]
    pub fn get_threshold(&self, id: NodeId) -> f64 {
        self.thresholds[id]
    }

    /// Gets the raw left child id. Returns CHILD_LEAF_SENTINEL (-1) for leaves.
    #[inline(always)]
    pub fn get_left_id_raw(&self, id: NodeId) -> i64 {
        self.left_ids[id]
    }

    /// Gets the raw right child id. Returns CHILD_LEAF_SENTINEL (-1) for leaves.
    #[inline(always)]
    pub fn get_right_id_raw(&self, id: NodeId) -> i64 {
        self.right_ids[id]
    }

    #[inline(always)]
    pub fn get_depth(&self, id: NodeId) -> usize {
        self.depths[id]
    }

    /// Returns INTERNAL_NODE_CLASS_SENTINEL for internal nodes.
    #[inline(always)]
    pub fn get_leaf_class(&self, id: NodeId) -> usize {
        self.leaf_classes[id]
    }

    /// Typed view of a node.
    /// # Panics
    /// Panics if the `id` is out of bounds.
    pub fn node(&self, id: NodeId) -> Node {
        if self.is_leaf(id) {
            Node::Leaf { class: self.leaf_classes[id], depth: self.depths[id] }
        } else {
            Node::Internal {
                feature: self.features[id] as usize,
                threshold: self.thresholds[id],
                left: self.left_ids[id] as NodeId,
                right: self.right_ids[id] as NodeId,
                depth: self.depths[id],
            }
        }
    }

    // --- Tree Info Methods ---

    #[inline(always)]
    pub fn nodes_len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn nb_leaves(&self) -> usize {
        self.features.iter().filter(|&&f| f == FEATURE_LEAF_SENTINEL).count()
    }

    pub fn nb_splits(&self) -> usize {
        self.nodes_len() - self.nb_leaves()
    }

    /// Deepest leaf depth (root at depth 0). 0 for an empty tree.
    pub fn depth(&self) -> usize {
        self.depths.iter().copied().max().unwrap_or(0)
    }

    /// Walks the tree from the root: `x[feature] <= threshold` goes left.
    ///
    /// # Panics
    /// Panics if the tree is empty or `x` is shorter than the largest tested feature.
    pub fn predict(&self, x: &[f64]) -> usize {
        let mut id: NodeId = 0;
        while !self.is_leaf(id) {
            let feature = self.features[id] as usize;
            let child = if x[feature] <= self.thresholds[id] { self.left_ids[id] } else { self.right_ids[id] };
            id = child as NodeId;
        }
        self.leaf_classes[id]
    }

    /// Recursive helper for `Display`.
    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, prefix: &str) -> fmt::Result {
        match self.node(id) {
            Node::Leaf { class, .. } => writeln!(f, "{}Leaf(class = {}) [ID: {}]", prefix, class, id),
            Node::Internal { feature, threshold, left, right, .. } => {
                writeln!(f, "{}Node(feature[{}] <= {:.4}?) [ID: {}]", prefix, feature, threshold, id)?;
                self.fmt_node(f, left, &format!("{}  |-- True: ", prefix))?;
                self.fmt_node(f, right, &format!("{}  `-- False:", prefix))
            }
        }
    }
}

impl fmt::Display for RebornTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "<empty tree>");
        }
        self.fmt_node(f, 0, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// x0 <= 1.0 ? class 0 : (x1 <= 5.0 ? class 0 : class 1), built in preorder.
    fn sample_tree() -> RebornTree {
        let mut tree = RebornTree::new();
        let root = tree.push_internal(0, 1.0, 0);
        let left = tree.push_leaf(0, 1);
        let right = tree.push_internal(1, 5.0, 1);
        let right_left = tree.push_leaf(0, 2);
        let right_right = tree.push_leaf(1, 2);
        tree.set_children(right, right_left, right_right);
        tree.set_children(root, left, right);
        tree
    }

    #[test]
    fn test_counts_and_depth() {
        let tree = sample_tree();
        assert_eq!(tree.nodes_len(), 5);
        assert_eq!(tree.nb_leaves(), 3);
        assert_eq!(tree.nb_splits(), 2);
        assert_eq!(tree.depth(), 2);
        assert_eq!(RebornTree::new().depth(), 0);
    }

    #[test]
    fn test_predict_left_is_inclusive() {
        let tree = sample_tree();
        assert_eq!(tree.predict(&[1.0, 9.0]), 0);
        assert_eq!(tree.predict(&[1.5, 5.0]), 0);
        assert_eq!(tree.predict(&[1.5, 5.5]), 1);
    }

    #[test]
    fn test_sentinels_and_node_view() {
        let tree = sample_tree();
        assert!(tree.is_leaf(1));
        assert_eq!(tree.get_feature_raw(1), FEATURE_LEAF_SENTINEL);
        assert_eq!(tree.get_left_id_raw(4), CHILD_LEAF_SENTINEL);
        assert_eq!(tree.get_leaf_class(0), INTERNAL_NODE_CLASS_SENTINEL);
        assert_eq!(tree.node(2), Node::Internal { feature: 1, threshold: 5.0, left: 3, right: 4, depth: 1 });
        assert_eq!(tree.node(4), Node::Leaf { class: 1, depth: 2 });
    }

    #[test]
    fn test_display_lists_every_node() {
        let rendered = sample_tree().to_string();
        assert_eq!(rendered.lines().count(), 5);
        assert!(rendered.starts_with("Node(feature[0] <= 1.0000?) [ID: 0]"));
    }
}

//! Writers for the two output files of a run: the born-again tree in the
//! line-oriented forest text format (`.tree`) and the one-line CSV run
//! statistics (`.out`).
//!
//! This module does not have performance critical code.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::WriterBuilder;

use crate::born_again::RunStatistics;
use crate::config::Params;
use crate::error::Result;
use crate::tree::{Node, RebornTree};

/// Header line describing the node columns, kept verbatim for readers of the format.
const NODE_FORMAT_LINE: &str = "Format: node / node type(LN - leave node, IN - internal node) left child / right child / feature / threshold / node_depth / majority class (starts with index 0)";

/// Writes `tree` as a single-tree ensemble named `BA`.
///
/// Nodes are listed in id order (root first):
/// `i IN left right feature threshold depth -1` or `i LN -1 -1 -1 -1 depth class`.
pub fn write_tree<W: Write>(writer: &mut W, tree: &RebornTree, params: &Params) -> Result<()> {
    writeln!(writer, "DATASET_NAME: {}", params.dataset_name)?;
    writeln!(writer, "ENSEMBLE: BA")?;
    writeln!(writer, "NB_TREES: 1")?;
    writeln!(writer, "NB_FEATURES: {}", params.nb_features)?;
    writeln!(writer, "NB_CLASSES: {}", params.nb_classes)?;
    writeln!(writer, "MAX_TREE_DEPTH: {}", tree.depth())?;
    writeln!(writer, "{}", NODE_FORMAT_LINE)?;
    writeln!(writer)?;
    writeln!(writer, "[TREE 0]")?;
    writeln!(writer, "NB_NODES: {}", tree.nodes_len())?;
    for id in 0..tree.nodes_len() {
        match tree.node(id) {
            Node::Internal { feature, threshold, left, right, depth } => {
                writeln!(writer, "{} IN {} {} {} {} {} -1", id, left, right, feature, threshold, depth)?
            }
            Node::Leaf { class, depth } => writeln!(writer, "{} LN -1 -1 -1 -1 {} {}", id, depth, class)?,
        }
    }
    Ok(())
}

/// Writes the tree file at `path`, replacing any previous content.
pub fn export_tree<P: AsRef<Path>>(path: P, tree: &RebornTree, params: &Params) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    write_tree(&mut writer, tree, params)?;
    writer.flush()?;
    Ok(())
}

/// Writes one CSV record: dataset, ensemble method, number of trees, features,
/// classes, objective id, depth, splits, leaves, number of runs (always 1),
/// CPU seconds, filtered cells, memoized regions and recursive calls.
pub fn write_run_statistics<W: Write>(writer: W, params: &Params, stats: &RunStatistics) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record([
        params.dataset_name.clone(),
        params.ensemble_method.clone(),
        params.nb_trees.to_string(),
        params.nb_features.to_string(),
        params.nb_classes.to_string(),
        stats.objective.id().to_string(),
        stats.final_depth.to_string(),
        stats.final_splits.to_string(),
        stats.final_leaves.to_string(),
        1.to_string(),
        stats.cpu_seconds.to_string(),
        stats.filtered_cells.to_string(),
        stats.regions_memorized.to_string(),
        stats.iterations.to_string(),
    ])?;
    wtr.flush()?;
    Ok(())
}

/// Writes the statistics file at `path`, replacing any previous content.
pub fn export_run_statistics<P: AsRef<Path>>(path: P, params: &Params, stats: &RunStatistics) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_run_statistics(file, params, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Objective;

    fn sample_params() -> Params {
        let mut params = Params::new(2, 2, Objective::NbSplits);
        params.dataset_name = String::from("toy");
        params.nb_trees = 3;
        params
    }

    fn sample_tree() -> RebornTree {
        let mut tree = RebornTree::new();
        let root = tree.push_internal(0, 2.0, 0);
        let left = tree.push_leaf(0, 1);
        let right = tree.push_internal(1, 5.0, 1);
        let right_left = tree.push_leaf(0, 2);
        let right_right = tree.push_leaf(1, 2);
        tree.set_children(right, right_left, right_right);
        tree.set_children(root, left, right);
        tree
    }

    #[test]
    fn test_tree_format() {
        let mut buffer = Vec::new();
        write_tree(&mut buffer, &sample_tree(), &sample_params()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "DATASET_NAME: toy");
        assert_eq!(lines[1], "ENSEMBLE: BA");
        assert_eq!(lines[2], "NB_TREES: 1");
        assert_eq!(lines[5], "MAX_TREE_DEPTH: 2");
        assert_eq!(lines[6], NODE_FORMAT_LINE);
        assert_eq!(lines[7], "");
        assert_eq!(lines[8], "[TREE 0]");
        assert_eq!(lines[9], "NB_NODES: 5");
        assert_eq!(lines[10], "0 IN 1 2 0 2 0 -1");
        assert_eq!(lines[11], "1 LN -1 -1 -1 -1 1 0");
        assert_eq!(lines[12], "2 IN 3 4 1 5 1 -1");
        assert_eq!(lines[14], "4 LN -1 -1 -1 -1 2 1");
        assert_eq!(lines.len(), 15);
    }

    #[test]
    fn test_fractional_threshold_round_trips() {
        let mut tree = RebornTree::new();
        let root = tree.push_internal(0, 0.1 + 0.2, 0);
        let left = tree.push_leaf(0, 1);
        let right = tree.push_leaf(1, 1);
        tree.set_children(root, left, right);
        let mut buffer = Vec::new();
        write_tree(&mut buffer, &tree, &sample_params()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let node_line = text.lines().nth(10).unwrap();
        let threshold: f64 = node_line.split(' ').nth(5).unwrap().parse().unwrap();
        assert_eq!(threshold, 0.1 + 0.2);
    }

    #[test]
    fn test_statistics_line() {
        let stats = RunStatistics {
            objective: Objective::NbSplits,
            final_objective: 2.0,
            final_depth: 2,
            final_splits: 2,
            final_leaves: 3,
            original_cells: 6,
            filtered_cells: 4,
            regions_memorized: 5,
            iterations: 17,
            cpu_seconds: 0.5,
        };
        let mut buffer = Vec::new();
        write_run_statistics(&mut buffer, &sample_params(), &stats).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "toy,RF,3,2,2,1,2,2,3,1,0.5,4,5,17\n");
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let path = std::env::temp_dir().join("born_again_missing_dir").join("nested").join("run.tree");
        assert!(export_tree(&path, &sample_tree(), &sample_params()).is_err());
    }
}

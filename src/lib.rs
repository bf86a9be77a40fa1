//! Born-again tree ensembles: compiles a tree ensemble into a single decision
//! tree that reproduces the ensemble's majority vote on the whole feature space.
//!
//! The ensemble's split thresholds cut the feature space into cells. The exact
//! construction (`optimizer`) searches the regions of that cell lattice by
//! dynamic programming for the smallest faithful tree, or the most faithful
//! tree within a depth budget. The heuristic construction (`heuristic`) samples
//! cells recursively when the lattice is too large to enumerate.

pub mod born_again;
pub mod config;
pub mod cpu_time;
pub mod error;
pub mod export;
pub mod forest;
pub mod fspace;
pub mod heuristic;
pub mod optimizer;
pub mod tree;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use born_again::{BornAgainTree, RunStatistics};
pub use config::{CellValueMode, Objective, Params, RunConfig};
pub use error::{BornAgainError, Result};
pub use forest::{EnsembleOracle, RandomForest};
pub use fspace::{Cell, FeatureSpace};
pub use heuristic::{ExhaustiveCertificate, HeuristicBuilder, PurityCertificate, RegionView};
pub use optimizer::{RegionOptimizer, RootValue, TreeReconstructor};
pub use tree::{Node, NodeId, RebornTree};

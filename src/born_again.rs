//! Orchestrates the construction of a born-again tree: a single decision tree
//! that reproduces the ensemble's majority vote on the whole feature space.
//!
//! Provides two build paths, selected by the objective:
//! 1. `build_optimal`: enumerates the cells induced by the ensemble's
//!    hyperplanes, drops the hyperplanes that separate nothing, then solves the
//!    dynamic program over the filtered space and reconstructs the tree.
//! 2. `build_heuristic`: recursive sampling on the unfiltered levels, for
//!    spaces too large to enumerate.

use std::fmt;
use std::path::Path;

use crate::config::{Objective, Params};
use crate::cpu_time::CpuTimer;
use crate::error::{BornAgainError, Result};
use crate::export;
use crate::forest::EnsembleOracle;
use crate::fspace::FeatureSpace;
use crate::heuristic::{HeuristicBuilder, PurityCertificate};
use crate::optimizer::RegionOptimizer;
use crate::tree::RebornTree;

// --- Run Statistics ---

/// Outcome of one build, as reported on the console and in the `.out` file.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub objective: Objective,
    /// Root value of the dynamic program (0 for the heuristic).
    pub final_objective: f64,
    pub final_depth: usize,
    pub final_splits: usize,
    pub final_leaves: usize,
    pub original_cells: usize,
    pub filtered_cells: usize,
    pub regions_memorized: u64,
    /// Number of recursive calls of the dynamic program.
    pub iterations: u64,
    pub cpu_seconds: f64,
}

impl RunStatistics {
    fn reset(objective: Objective) -> Self {
        RunStatistics {
            objective,
            final_objective: 0.0,
            final_depth: 0,
            final_splits: 0,
            final_leaves: 0,
            original_cells: 0,
            filtered_cells: 0,
            regions_memorized: 0,
            iterations: 0,
            cpu_seconds: 0.0,
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "----- OPTIMAL SOLUTION FOUND")?;
        writeln!(f, "----- OBJECTIVE:                                  {}", self.objective)?;
        writeln!(f, "----- CPU TIME(s):                                {}", self.cpu_seconds)?;
        writeln!(f, "----- ORIGINAL CELLS:                             {}", self.original_cells)?;
        writeln!(f, "----- FILTERED CELLS:                             {}", self.filtered_cells)?;
        writeln!(f, "----- NB SUBPROBLEMS:                             {}", self.regions_memorized)?;
        writeln!(f, "----- NB RECURSIVE CALLS:                         {}", self.iterations)?;
        writeln!(f, "----- BA TREE DEPTH:                              {}", self.final_depth)?;
        write!(f, "----- BA TREE LEAVES:                             {}", self.final_leaves)
    }
}

// --- Orchestrator ---

/// Builds and reports the born-again tree of one ensemble.
pub struct BornAgainTree<'a, O: EnsembleOracle + ?Sized> {
    params: &'a mut Params,
    oracle: &'a O,
    tree: RebornTree,
    filtered_space: Option<FeatureSpace>,
    stats: RunStatistics,
}

impl<'a, O: EnsembleOracle + ?Sized> BornAgainTree<'a, O> {
    /// # Arguments
    /// * `params` - Run parameters. Point-count data points are consumed by the build.
    /// * `oracle` - The ensemble to reproduce; its dimensions must match `params`.
    pub fn new(params: &'a mut Params, oracle: &'a O) -> Self {
        let stats = RunStatistics::reset(params.objective);
        BornAgainTree { params, oracle, tree: RebornTree::new(), filtered_space: None, stats }
    }

    /// Runs the build path of the configured objective and records its CPU time.
    pub fn build(&mut self) -> Result<()> {
        let timer = CpuTimer::start();
        let result = if self.params.objective.is_exact() { self.build_optimal() } else { self.build_heuristic(None) };
        self.stats.cpu_seconds = timer.elapsed().as_secs_f64();
        result
    }

    fn check_dimensions(&self) -> Result<()> {
        self.params.validate()?;
        if self.oracle.nb_features() != self.params.nb_features {
            return Err(BornAgainError::InvalidConfig(format!(
                "the ensemble has {} features, the parameters {}",
                self.oracle.nb_features(),
                self.params.nb_features
            )));
        }
        if self.oracle.nb_classes() != self.params.nb_classes {
            return Err(BornAgainError::InvalidConfig(format!(
                "the ensemble has {} classes, the parameters {}",
                self.oracle.nb_classes(),
                self.params.nb_classes
            )));
        }
        Ok(())
    }

    /// Exact construction for objectives 0, 1, 2 and 5.
    pub fn build_optimal(&mut self) -> Result<()> {
        self.stats = RunStatistics::reset(self.params.objective);
        self.check_dimensions()?;
        let objective = self.params.objective;
        if !objective.is_exact() {
            return Err(BornAgainError::InvalidConfig(format!("objective {} has no exact construction", objective)));
        }

        log::info!("Building the born-again tree (objective: {})", objective);
        let original = FeatureSpace::initialize_cells(self.oracle.hyperplanes(), false, self.params, self.oracle);
        let filtered =
            FeatureSpace::initialize_cells(original.export_useful_hyperplanes(), true, self.params, self.oracle);
        log::info!(
            "{} cells before filtering, {} after, at most {} regions",
            original.nb_cells,
            filtered.nb_cells,
            filtered.nb_possible_regions
        );

        let (root, tree, optimizer_stats) = {
            let mut optimizer =
                RegionOptimizer::new(&filtered, objective, self.params.depth, self.params.nb_classes)?;
            let root = optimizer.solve();
            let tree = optimizer.reconstruct(root)?;
            (root, tree, *optimizer.stats())
        };

        self.stats.final_objective = root.as_f64();
        self.stats.original_cells = original.nb_cells;
        self.stats.filtered_cells = filtered.nb_cells;
        self.stats.regions_memorized = optimizer_stats.regions_memorized;
        self.stats.iterations = optimizer_stats.iterations;
        #[cfg(feature = "detailed-stats")]
        log::debug!("Right sub-regions skipped by the depth bounds: {}", optimizer_stats.skipped_right_regions);

        self.set_tree(tree);
        self.filtered_space = Some(filtered);
        Ok(())
    }

    /// Sampling construction (objective 4). Without certificate, a region is
    /// closed as soon as all its samples agree.
    pub fn build_heuristic(&mut self, certificate: Option<&mut dyn PurityCertificate>) -> Result<()> {
        self.stats = RunStatistics::reset(self.params.objective);
        self.check_dimensions()?;
        log::info!("Building the born-again tree heuristically ({} samples per region)", self.params.nb_cells_sampled);
        let tree = HeuristicBuilder::new(&*self.params, self.oracle, certificate).build()?;
        self.set_tree(tree);
        Ok(())
    }

    fn set_tree(&mut self, tree: RebornTree) {
        self.stats.final_depth = tree.depth();
        self.stats.final_splits = tree.nb_splits();
        self.stats.final_leaves = tree.nb_leaves();
        self.tree = tree;
    }

    pub fn tree(&self) -> &RebornTree {
        &self.tree
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    /// The filtered feature space of the last exact build.
    pub fn filtered_space(&self) -> Option<&FeatureSpace> {
        self.filtered_space.as_ref()
    }

    pub fn display_run_statistics(&self) {
        println!("{}", self.stats);
    }

    /// Writes the `.out` statistics line. A failure is logged and the run goes on.
    pub fn export_run_statistics<P: AsRef<Path>>(&self, path: P) {
        let path_ref = path.as_ref();
        log::info!("Exporting statistics in {:?}", path_ref);
        if let Err(e) = export::export_run_statistics(path_ref, &*self.params, &self.stats) {
            log::error!("Problem writing statistics to {:?}: {}", path_ref, e);
        }
    }

    /// Writes the `.tree` file. A failure is logged and the run goes on.
    pub fn export_tree<P: AsRef<Path>>(&self, path: P) {
        let path_ref = path.as_ref();
        log::info!("Exporting born-again tree in {:?}", path_ref);
        if let Err(e) = export::export_tree(path_ref, &self.tree, &*self.params) {
            log::error!("Problem writing the tree to {:?}: {}", path_ref, e);
        }
    }
}

//! Run configuration: constants of the algorithm, the objective selector,
//! the cell valuation modes and the `Params` consumed by the core.
//!
//! This module does not have performance critical code. Safety checks are allowed!

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use serde::Deserialize;

use crate::error::{BornAgainError, Result};
use crate::forest::RandomForest;

// --- Algorithm Constants ---

/// Weight of the depth in the lexicographic (depth, splits) objective.
pub const BIG_M: u32 = 100_000;
/// Level closing every feature: the open-ended top interval.
pub const OPEN_INTERVAL_LEVEL: f64 = 1.0e30;
/// Lower edge of the first interval of every feature when measuring cell volumes.
pub const FEATURE_LOWER_BOUND: f64 = 0.0;
/// Soft limit on the number of cells before hyperplane filtering.
pub const UNFILTERED_CELL_WARNING: usize = 10_000_000;
/// Soft limit on the number of cells after hyperplane filtering.
pub const FILTERED_CELL_WARNING: usize = 200_000;
/// Number of cells sampled per region by the heuristic.
pub const DEFAULT_CELLS_SAMPLED: usize = 1000;

// --- Objective Selector ---

/// The objective optimized when building the born-again tree.
/// Ids follow the historical numbering (3 was never implemented).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Minimize depth (id 0).
    Depth,
    /// Minimize the number of splits, equivalently leaves (id 1).
    NbSplits,
    /// Minimize depth, then the number of splits (id 2).
    DepthThenSplits,
    /// Sampling-based construction for large feature spaces (id 4).
    Heuristic,
    /// Maximize the weight of correctly classified cells under a depth budget (id 5).
    BoundedDepth,
}

impl Objective {
    pub fn from_id(id: i32) -> Result<Self> {
        match id {
            0 => Ok(Objective::Depth),
            1 => Ok(Objective::NbSplits),
            2 => Ok(Objective::DepthThenSplits),
            4 => Ok(Objective::Heuristic),
            5 => Ok(Objective::BoundedDepth),
            other => Err(BornAgainError::UnknownObjective(other)),
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Objective::Depth => 0,
            Objective::NbSplits => 1,
            Objective::DepthThenSplits => 2,
            Objective::Heuristic => 4,
            Objective::BoundedDepth => 5,
        }
    }

    /// Whether the objective is solved by the dynamic program.
    pub fn is_exact(self) -> bool {
        self != Objective::Heuristic
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::Depth => write!(f, "Depth"),
            Objective::NbSplits => write!(f, "NbLeaves"),
            Objective::DepthThenSplits => write!(f, "Depth then NbLeaves"),
            Objective::Heuristic => write!(f, "Heuristic"),
            Objective::BoundedDepth => write!(f, "New Depth"),
        }
    }
}

// --- Cell Valuation ---

/// How much each cell of the filtered feature space weighs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellValueMode {
    /// Every cell weighs 1.
    Uniform,
    /// A cell weighs its hypervolume.
    Volume,
    /// A cell weighs the number of data points it contains.
    PointCount,
}

impl CellValueMode {
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(CellValueMode::Uniform),
            1 => Ok(CellValueMode::Volume),
            2 => Ok(CellValueMode::PointCount),
            other => Err(BornAgainError::InvalidConfig(format!("unknown cell value mode {}", other))),
        }
    }
}

// --- Run Parameters ---

/// Parameters consumed by the feature space, the optimizer and the heuristic.
///
/// `data_points` is a working set: in `PointCount` mode every point is removed
/// once it has been attributed to a cell, so a point is counted at most once per run
/// even when several feature spaces are built from the same `Params`.
#[derive(Debug, Clone)]
pub struct Params {
    pub dataset_name: String,
    pub ensemble_method: String,
    pub nb_trees: usize,
    pub nb_features: usize,
    pub nb_classes: usize,
    /// Maximum depth of the trees received in input.
    pub max_depth: usize,
    pub objective: Objective,
    /// Depth budget, only read by `Objective::BoundedDepth`.
    pub depth: usize,
    pub cell_value: CellValueMode,
    pub nb_cells_sampled: usize,
    pub seed: u64,
    pub data_points: Vec<Vec<f64>>,
}

impl Params {
    /// Creates parameters with uniform cell values, the default sample count and seed 0.
    pub fn new(nb_features: usize, nb_classes: usize, objective: Objective) -> Self {
        Params {
            dataset_name: String::from("unknown"),
            ensemble_method: String::from("RF"),
            nb_trees: 0,
            nb_features,
            nb_classes,
            max_depth: 0,
            objective,
            depth: 0,
            cell_value: CellValueMode::Uniform,
            nb_cells_sampled: DEFAULT_CELLS_SAMPLED,
            seed: 0,
            data_points: Vec::new(),
        }
    }

    /// Checks the parameters before any computation starts.
    pub fn validate(&self) -> Result<()> {
        if self.nb_features == 0 {
            return Err(BornAgainError::InvalidConfig("the feature space has no feature".into()));
        }
        if self.nb_classes == 0 {
            return Err(BornAgainError::InvalidConfig("the ensemble has no class".into()));
        }
        if self.objective == Objective::Heuristic && self.nb_cells_sampled == 0 {
            return Err(BornAgainError::InvalidConfig("the heuristic needs at least one sample".into()));
        }
        Ok(())
    }
}

// --- Run Description File ---

/// JSON description of a run, read by the `born-again` binary.
#[derive(Deserialize, Debug, Clone)]
pub struct RunConfig {
    /// Random forest in scikit-learn array layout (see `forest::RandomForest`).
    pub forest_path: PathBuf,
    /// Outputs are written to `<output_prefix>.out` and `<output_prefix>.tree`.
    pub output_prefix: PathBuf,
    pub objective: i32,
    #[serde(default)]
    pub depth: Option<usize>,
    #[serde(default)]
    pub cell_value: u8,
    /// CSV with a header row; required when `cell_value` is 2.
    #[serde(default)]
    pub dataset_path: Option<PathBuf>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub nb_cells_sampled: Option<usize>,
    /// Keeps only the first `nb_trees` trees of the forest.
    #[serde(default)]
    pub nb_trees: Option<usize>,
}

impl RunConfig {
    /// Reads and validates a run description.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref)?;
        let config: RunConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let objective = Objective::from_id(self.objective)?;
        let cell_value = CellValueMode::from_id(self.cell_value)?;
        if objective == Objective::BoundedDepth && self.depth.is_none() {
            return Err(BornAgainError::InvalidConfig("objective 5 requires a depth budget".into()));
        }
        if cell_value == CellValueMode::PointCount && self.dataset_path.is_none() {
            return Err(BornAgainError::InvalidConfig("cell value mode 2 requires a dataset".into()));
        }
        Ok(())
    }

    /// Resolves the run description against the loaded forest.
    /// Loads the dataset points when the cell values are point counts.
    pub fn to_params(&self, forest: &RandomForest) -> Result<Params> {
        let objective = Objective::from_id(self.objective)?;
        let mut params = Params::new(forest.n_features, forest.n_classes, objective);
        params.dataset_name = forest.dataset_name.clone();
        params.ensemble_method = forest.ensemble_method.clone();
        params.nb_trees = forest.n_total_trees;
        params.max_depth = forest.max_depth;
        params.depth = self.depth.unwrap_or(0);
        params.cell_value = CellValueMode::from_id(self.cell_value)?;
        params.seed = self.seed;
        if let Some(nb_cells_sampled) = self.nb_cells_sampled {
            params.nb_cells_sampled = nb_cells_sampled;
        }
        if params.cell_value == CellValueMode::PointCount {
            if let Some(dataset_path) = &self.dataset_path {
                params.data_points = load_data_points(dataset_path, forest.n_features)?;
                log::info!("Loaded {} data points from {:?}", params.data_points.len(), dataset_path);
            }
        }
        params.validate()?;
        Ok(params)
    }
}

/// Loads dataset points from a CSV file with a header row.
///
/// Only the first `nb_features` columns of each row are kept (a trailing label
/// column is ignored).
pub fn load_data_points<P: AsRef<Path>>(path: P, nb_features: usize) -> Result<Vec<Vec<f64>>> {
    let path_ref = path.as_ref();
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path_ref)?;
    let mut points = Vec::new();
    for (row_idx, result) in rdr.records().enumerate() {
        let record = result?;
        if record.len() < nb_features {
            return Err(BornAgainError::InvalidConfig(format!(
                "row {} of {:?} has {} columns, expected at least {}",
                row_idx + 1, path_ref, record.len(), nb_features
            )));
        }
        let mut point = Vec::with_capacity(nb_features);
        for j in 0..nb_features {
            let value: f64 = record[j].trim().parse().map_err(|e| {
                BornAgainError::InvalidConfig(format!("row {}, column {} of {:?}: {}", row_idx + 1, j + 1, path_ref, e))
            })?;
            point.push(value);
        }
        points.push(point);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_objective_ids() {
        for id in [0, 1, 2, 4, 5] {
            assert_eq!(Objective::from_id(id).unwrap().id(), id);
        }
        assert!(matches!(Objective::from_id(3), Err(BornAgainError::UnknownObjective(3))));
        assert!(matches!(Objective::from_id(-1), Err(BornAgainError::UnknownObjective(-1))));
        assert!(!Objective::Heuristic.is_exact());
        assert!(Objective::BoundedDepth.is_exact());
    }

    #[test]
    fn test_cell_value_ids() {
        assert_eq!(CellValueMode::from_id(2).unwrap(), CellValueMode::PointCount);
        assert!(CellValueMode::from_id(3).is_err());
    }

    #[test]
    fn test_run_config_requires_depth_for_bounded_objective() {
        let json = r#"{"forest_path": "f.json", "output_prefix": "out", "objective": 5}"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(BornAgainError::InvalidConfig(_))));

        let json = r#"{"forest_path": "f.json", "output_prefix": "out", "objective": 5, "depth": 2}"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_config_rejects_unknown_objective() {
        let json = r#"{"forest_path": "f.json", "output_prefix": "out", "objective": 3}"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(BornAgainError::UnknownObjective(3))));
    }

    #[test]
    fn test_load_data_points_skips_header_and_label() {
        let path = std::env::temp_dir().join(format!("born_again_points_{}.csv", std::process::id()));
        {
            let mut file = fs::File::create(&path).unwrap();
            writeln!(file, "x0,x1,label").unwrap();
            writeln!(file, "0.5,1.5,0").unwrap();
            writeln!(file, "2.0,0.25,1").unwrap();
        }
        let points = load_data_points(&path, 2).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(points, vec![vec![0.5, 1.5], vec![2.0, 0.25]]);
    }
}

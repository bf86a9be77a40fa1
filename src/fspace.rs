//! The feature space induced by the ensemble's hyperplanes: the cell lattice,
//! the mixed-radix codebook that turns a coordinate tuple into a cell index, and
//! the perfect hash that maps a region (relative to its bottom-left anchor cell)
//! to a dense integer so the optimizer can memoize regions in plain vectors.
//!
//! Conventions:
//! * Feature 0 is the most significant digit of a cell index: the codebook entry of
//!   the last feature is 1 and `code_book[k] = code_book[k + 1] * levels[k + 1].len()`.
//! * Coordinate `i` on feature `k` is the interval `(levels[k][i - 1], levels[k][i]]`,
//!   the first interval being open below. For volumes it starts at
//!   `FEATURE_LOWER_BOUND`, or one unit below its level when that level is not above it.
//! * A region is a pair `(index_bottom, index_top)` of corner cells with
//!   `key_to_cell(index_bottom, k) <= key_to_cell(index_top, k)` on every feature.

use crate::config::{
    CellValueMode, Params, FEATURE_LOWER_BOUND, FILTERED_CELL_WARNING, OPEN_INTERVAL_LEVEL,
    UNFILTERED_CELL_WARNING,
};
use crate::forest::EnsembleOracle;
use crate::utils::get_heaviest_class;

/// An axis-aligned hyperrectangle on which the ensemble's vote is constant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    /// Weight of the cell (0 in unfiltered spaces, where it is never read).
    pub value: f64,
    /// Majority class of the ensemble on this cell.
    pub classification: usize,
    /// Lower boundary on each feature (`-inf` on the first coordinate).
    pub begins: Vec<f64>,
    /// Upper boundary on each feature.
    pub ends: Vec<f64>,
}

/// Cell lattice built from an ordered set of per-feature hyperplane levels.
/// Built once, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct FeatureSpace {
    /// Sorted levels of each feature; the last level of each feature closes the open top interval.
    pub ordered_hyperplane_levels: Vec<Vec<f64>>,
    /// Mixed-radix multipliers: `index = sum_k coordinate_k * code_book[k]`.
    pub code_book: Vec<usize>,
    /// Cells indexed through the codebook.
    pub cells: Vec<Cell>,
    pub nb_cells: usize,
    /// Bound on the number of regions (DP states): `prod_k n_k (n_k + 1) / 2`.
    pub nb_possible_regions: f64,
    /// Whether the levels come from hyperplane filtering (cells are valued only then).
    pub filtered: bool,
}

impl FeatureSpace {
    /// Builds the codebook and enumerates every cell of the cartesian product of levels.
    ///
    /// Each cell receives the ensemble's majority class, evaluated at its upper corner,
    /// and, for a filtered space, a weight according to `params.cell_value`.
    /// In `PointCount` mode the points attributed to a cell are removed from
    /// `params.data_points`.
    ///
    /// Oversized lattices only raise a warning: the run continues.
    ///
    /// # Arguments
    /// * `hyperplanes` - Per-feature ascending levels, each list non-empty.
    /// * `filtered` - Whether these levels are the output of `export_useful_hyperplanes`.
    /// * `params` - Run parameters; its data points may be consumed.
    /// * `oracle` - The ensemble whose majority vote classifies the cells.
    pub fn initialize_cells<O: EnsembleOracle + ?Sized>(
        hyperplanes: Vec<Vec<f64>>,
        filtered: bool,
        params: &mut Params,
        oracle: &O,
    ) -> Self {
        let nb_features = hyperplanes.len();
        debug_assert!(hyperplanes.iter().all(|levels| !levels.is_empty()), "Every feature needs at least one level");

        let mut nb_cells = 1usize;
        let mut nb_possible_regions = 1.0f64;
        for levels in hyperplanes.iter() {
            let size = levels.len();
            nb_cells = nb_cells.saturating_mul(size);
            nb_possible_regions *= size as f64 * (size as f64 + 1.0) / 2.0;
        }

        let limit = if filtered { FILTERED_CELL_WARNING } else { UNFILTERED_CELL_WARNING };
        if nb_cells > limit {
            log::warn!(
                "This case leads to {} cells {} filtering. Memory consumption can be high, the heuristic objective (4) is recommended.",
                nb_cells,
                if filtered { "after" } else { "before" }
            );
        }

        let mut code_book = vec![1usize; nb_features];
        for k in (0..nb_features.saturating_sub(1)).rev() {
            code_book[k] = code_book[k + 1] * hyperplanes[k + 1].len();
        }

        let mut space = FeatureSpace {
            ordered_hyperplane_levels: hyperplanes,
            code_book,
            cells: Vec::with_capacity(nb_cells),
            nb_cells,
            nb_possible_regions,
            filtered,
        };
        space.enumerate_cells(params, oracle);
        space
    }

    /// Fills `cells` in index order (feature 0 varies slowest).
    fn enumerate_cells<O: EnsembleOracle + ?Sized>(&mut self, params: &mut Params, oracle: &O) {
        let nb_features = self.ordered_hyperplane_levels.len();
        for index in 0..self.nb_cells {
            let mut begins = Vec::with_capacity(nb_features);
            let mut ends = Vec::with_capacity(nb_features);
            for k in 0..nb_features {
                let coordinate = self.key_to_cell(index, k);
                let levels = &self.ordered_hyperplane_levels[k];
                begins.push(if coordinate == 0 { f64::NEG_INFINITY } else { levels[coordinate - 1] });
                ends.push(levels[coordinate]);
            }

            let classification = oracle.majority_class(&ends);
            let value = if self.filtered {
                match params.cell_value {
                    CellValueMode::Uniform => 1.0,
                    CellValueMode::Volume => (0..nb_features)
                        .map(|k| interval_extent(&self.ordered_hyperplane_levels[k], self.key_to_cell(index, k)))
                        .product(),
                    CellValueMode::PointCount => {
                        let mut count = 0usize;
                        params.data_points.retain(|point| {
                            let inside = (0..nb_features).all(|j| begins[j] <= point[j] && point[j] <= ends[j]);
                            if inside {
                                count += 1;
                            }
                            !inside
                        });
                        count as f64
                    }
                }
            } else {
                0.0
            };

            self.cells.push(Cell { value, classification, begins, ends });
        }
    }

    pub fn nb_features(&self) -> usize {
        self.ordered_hyperplane_levels.len()
    }

    /// Converts a coordinate tuple to its cell index.
    #[inline(always)]
    pub fn cell_to_key(&self, coordinates: &[usize]) -> usize {
        coordinates.iter().zip(&self.code_book).map(|(c, code)| c * code).sum()
    }

    /// Coordinate of cell `key` on feature `k` (inverse codebook lookup).
    #[inline(always)]
    pub fn key_to_cell(&self, key: usize, k: usize) -> usize {
        if k > 0 {
            (key % self.code_book[k - 1]) / self.code_book[k]
        } else {
            key / self.code_book[0]
        }
    }

    /// Perfect hash of the region spanned by `key_bottom_left` and `key_top_right`.
    ///
    /// For a fixed anchor `key_bottom_left`, the hash is a mixed-radix number whose
    /// digit on feature `k` is `top_k - bottom_k` in radix `n_k - bottom_k`: it
    /// enumerates exactly the regions anchored there, densely, from 0 to
    /// `hash_range(key_bottom_left) - 1`. Features with a single level carry no digit.
    #[inline(always)]
    pub fn key_to_hash(&self, key_bottom_left: usize, key_top_right: usize) -> usize {
        let mut key_left = key_bottom_left;
        let mut key_right = key_top_right;
        let mut code = 1usize;
        let mut new_key = 0usize;
        for k in (0..self.ordered_hyperplane_levels.len()).rev() {
            let size = self.ordered_hyperplane_levels[k].len();
            if size != 1 {
                let value_left = key_left % size;
                let value_right = key_right % size;
                key_left /= size;
                key_right /= size;
                new_key += (value_right - value_left) * code;
                code *= size - value_left;
            }
        }
        new_key
    }

    /// Number of regions anchored at `key_bottom_left`.
    #[inline]
    pub fn hash_range(&self, key_bottom_left: usize) -> usize {
        self.key_to_hash(key_bottom_left, self.nb_cells - 1) + 1
    }

    /// Lists the hyperplanes that separate at least one pair of adjacent cells of
    /// different classes. Every feature's list is closed by `OPEN_INTERVAL_LEVEL`.
    pub fn export_useful_hyperplanes(&self) -> Vec<Vec<f64>> {
        let nb_features = self.nb_features();
        let mut hyperplanes = vec![Vec::new(); nb_features];
        for hyp_feature in 0..nb_features {
            let code = self.code_book[hyp_feature];
            let nb_levels = self.ordered_hyperplane_levels[hyp_feature].len();
            // Cells with coordinate 0 on `hyp_feature`: every slice orthogonal to it is an offset of these.
            let slice_bases: Vec<usize> =
                (0..self.nb_cells).filter(|&index| self.key_to_cell(index, hyp_feature) == 0).collect();

            for hyp_level in 0..nb_levels.saturating_sub(1) {
                let detected_difference = slice_bases.iter().any(|&base| {
                    let below = base + code * hyp_level;
                    self.cells[below].classification != self.cells[below + code].classification
                });
                if detected_difference {
                    hyperplanes[hyp_feature].push(self.ordered_hyperplane_levels[hyp_feature][hyp_level]);
                }
            }
            hyperplanes[hyp_feature].push(OPEN_INTERVAL_LEVEL);
        }
        hyperplanes
    }

    /// Weighted majority vote of the cells covered by a region.
    ///
    /// Scans the index range `index_bottom..=index_top` and keeps the cells whose
    /// coordinates lie between the corner coordinates on every feature, then sums
    /// their weights per class.
    ///
    /// # Returns
    /// `(class, weight)` of the heaviest class bucket, lowest class on ties.
    pub fn weighted_majority(&self, index_bottom: usize, index_top: usize, nb_classes: usize) -> (usize, f64) {
        let nb_features = self.nb_features();
        let bottom: Vec<usize> = (0..nb_features).map(|k| self.key_to_cell(index_bottom, k)).collect();
        let top: Vec<usize> = (0..nb_features).map(|k| self.key_to_cell(index_top, k)).collect();

        let mut buckets = vec![0.0f64; nb_classes];
        for i in index_bottom..=index_top {
            let covered = (0..nb_features).all(|k| {
                let coordinate = self.key_to_cell(i, k);
                bottom[k] <= coordinate && coordinate <= top[k]
            });
            if covered {
                buckets[self.cells[i].classification] += self.cells[i].value;
            }
        }
        get_heaviest_class(&buckets)
    }
}

/// Length of interval `coordinate` of a feature, always positive.
#[inline]
fn interval_extent(levels: &[f64], coordinate: usize) -> f64 {
    if coordinate > 0 {
        return levels[coordinate] - levels[coordinate - 1];
    }
    if levels[0] > FEATURE_LOWER_BOUND {
        levels[0] - FEATURE_LOWER_BOUND
    } else {
        1.0
    }
}

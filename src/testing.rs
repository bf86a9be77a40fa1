//! Shared fixtures for the unit tests: a grid-shaped ensemble oracle, a
//! proptest strategy generating random grids, and an exhaustive search of the
//! minimum depth and number of splits.

use std::collections::HashMap;
use std::iter;

use proptest::prelude::*;

use crate::config::{Objective, OPEN_INTERVAL_LEVEL};
use crate::forest::EnsembleOracle;
use crate::fspace::FeatureSpace;
use crate::tree::RebornTree;

/// Oracle whose decision is an explicit class table over a grid of levels.
/// A value `x` on feature `k` falls in the first coordinate whose level is `>= x`.
#[derive(Debug, Clone)]
pub(crate) struct GridOracle {
    pub levels: Vec<Vec<f64>>,
    classes: Vec<usize>,
    code_book: Vec<usize>,
    nb_classes: usize,
}

impl GridOracle {
    /// `classes` is indexed like the cells of a `FeatureSpace` built on `levels`.
    pub fn new(levels: Vec<Vec<f64>>, classes: Vec<usize>, nb_classes: usize) -> Self {
        let mut code_book = vec![1usize; levels.len()];
        for k in (0..levels.len().saturating_sub(1)).rev() {
            code_book[k] = code_book[k + 1] * levels[k + 1].len();
        }
        assert_eq!(classes.len(), levels.iter().map(Vec::len).product::<usize>());
        GridOracle { levels, classes, code_book, nb_classes }
    }

    /// Builds the class table from a function of the coordinate tuple.
    pub fn from_fn(levels: Vec<Vec<f64>>, nb_classes: usize, class_of: impl Fn(&[usize]) -> usize) -> Self {
        let nb_cells: usize = levels.iter().map(Vec::len).product();
        let sizes: Vec<usize> = levels.iter().map(Vec::len).collect();
        let classes = (0..nb_cells)
            .map(|index| {
                let mut rest = index;
                let mut coordinates = vec![0; sizes.len()];
                for k in (0..sizes.len()).rev() {
                    coordinates[k] = rest % sizes[k];
                    rest /= sizes[k];
                }
                class_of(&coordinates)
            })
            .collect();
        GridOracle::new(levels, classes, nb_classes)
    }

    fn coordinate(&self, k: usize, x: f64) -> usize {
        let levels = &self.levels[k];
        levels.iter().position(|&level| x <= level).unwrap_or(levels.len() - 1)
    }
}

impl EnsembleOracle for GridOracle {
    fn nb_features(&self) -> usize {
        self.levels.len()
    }

    fn nb_classes(&self) -> usize {
        self.nb_classes
    }

    fn hyperplanes(&self) -> Vec<Vec<f64>> {
        self.levels.clone()
    }

    fn majority_class(&self, coordinates: &[f64]) -> usize {
        let index: usize = coordinates
            .iter()
            .enumerate()
            .map(|(k, &x)| self.coordinate(k, x) * self.code_book[k])
            .sum();
        self.classes[index]
    }
}

/// Random grids with `nb_features` features of 1 to `max_levels` levels each
/// (integer levels closed by `OPEN_INTERVAL_LEVEL`) and a random class table.
pub(crate) fn grid_oracle_strategy(
    nb_features: usize,
    max_levels: usize,
    nb_classes: usize,
) -> impl Strategy<Value = GridOracle> {
    proptest::collection::vec(1..=max_levels, nb_features).prop_flat_map(move |sizes| {
        let nb_cells: usize = sizes.iter().product();
        let levels: Vec<Vec<f64>> = sizes
            .iter()
            .map(|&size| (1..size).map(|i| i as f64).chain(iter::once(OPEN_INTERVAL_LEVEL)).collect())
            .collect();
        proptest::collection::vec(0..nb_classes, nb_cells)
            .prop_map(move |classes| GridOracle::new(levels.clone(), classes, nb_classes))
    })
}

/// Minimum depth (`Objective::Depth`) or minimum number of splits (`Objective::NbSplits`)
/// of a tree reproducing every cell of the space, by trying every split of every region.
pub(crate) fn exhaustive_optimum(space: &FeatureSpace, objective: Objective) -> u32 {
    let nb_features = space.nb_features();
    let bottom = vec![0; nb_features];
    let top: Vec<usize> = space.ordered_hyperplane_levels.iter().map(|levels| levels.len() - 1).collect();
    let mut memo = HashMap::new();
    exhaustive_region(space, objective, bottom, top, &mut memo)
}

fn exhaustive_region(
    space: &FeatureSpace,
    objective: Objective,
    bottom: Vec<usize>,
    top: Vec<usize>,
    memo: &mut HashMap<(Vec<usize>, Vec<usize>), u32>,
) -> u32 {
    if let Some(&value) = memo.get(&(bottom.clone(), top.clone())) {
        return value;
    }

    let mut classes = Vec::new();
    for index in 0..space.nb_cells {
        let inside = (0..space.nb_features()).all(|k| {
            let c = space.key_to_cell(index, k);
            bottom[k] <= c && c <= top[k]
        });
        if inside {
            classes.push(space.cells[index].classification);
        }
    }
    let pure = classes.windows(2).all(|w| w[0] == w[1]);

    let value = if pure {
        0
    } else {
        let mut best = u32::MAX;
        for k in 0..space.nb_features() {
            for l in bottom[k]..top[k] {
                let mut left_top = top.clone();
                left_top[k] = l;
                let mut right_bottom = bottom.clone();
                right_bottom[k] = l + 1;
                let left = exhaustive_region(space, objective, bottom.clone(), left_top, memo);
                let right = exhaustive_region(space, objective, right_bottom, top.clone(), memo);
                let combined = match objective {
                    Objective::Depth => 1 + left.max(right),
                    Objective::NbSplits => 1 + left + right,
                    other => unreachable!("no exhaustive search for objective {}", other),
                };
                best = best.min(combined);
            }
        }
        best
    };
    memo.insert((bottom, top), value);
    value
}

/// Indices of the cells whose class differs from the tree's prediction at their upper corner.
pub(crate) fn misclassified_cells(tree: &RebornTree, space: &FeatureSpace) -> Vec<usize> {
    (0..space.nb_cells)
        .filter(|&index| tree.predict(&space.cells[index].ends) != space.cells[index].classification)
        .collect()
}

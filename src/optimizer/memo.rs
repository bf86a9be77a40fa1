//! Dense memo tables indexed by (anchor cell, region hash).

use crate::fspace::FeatureSpace;

/// One table per anchor cell, each sized to the number of regions anchored there.
/// Every table is allocated before the solve starts: no resizing during recursion.
#[derive(Debug, Clone)]
pub struct RegionMemo<T> {
    tables: Vec<Vec<T>>,
    unsolved: T,
}

impl<T: Copy + PartialEq> RegionMemo<T> {
    /// Allocates one table per cell of `fspace`, every entry set to `unsolved`.
    pub fn allocate(fspace: &FeatureSpace, unsolved: T) -> Self {
        let tables = (0..fspace.nb_cells).map(|anchor| vec![unsolved; fspace.hash_range(anchor)]).collect();
        RegionMemo { tables, unsolved }
    }

    /// A memo with no table, for objectives that never read it.
    pub fn empty(unsolved: T) -> Self {
        RegionMemo { tables: Vec::new(), unsolved }
    }

    /// `None` while the region has not been solved.
    #[inline(always)]
    pub fn get(&self, anchor: usize, hash: usize) -> Option<T> {
        let value = self.tables[anchor][hash];
        if value == self.unsolved {
            None
        } else {
            Some(value)
        }
    }

    #[inline(always)]
    pub fn set(&mut self, anchor: usize, hash: usize, value: T) {
        debug_assert!(value != self.unsolved, "Memoized value collides with the unsolved sentinel");
        self.tables[anchor][hash] = value;
    }

    /// Total number of entries over all tables.
    pub fn capacity(&self) -> usize {
        self.tables.iter().map(Vec::len).sum()
    }
}

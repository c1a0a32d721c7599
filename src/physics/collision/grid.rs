//! The broad phase: a uniform grid that finds pairs of possibly
//! intersecting shapes for more accurate narrow phase inspection.

use super::AABB;
use crate::{
    math as m,
    physics::{
        bitmatrix::{BitMatrix, BitSet},
        PhysicsError,
    },
};

/// Parameters for the creation of the spatial grid.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct GridParams {
    /// Bottom left corner of the area covered by the grid.
    ///
    /// The grid doesn't need to cover the whole world because it wraps around
    /// toroidally to cover all of space, however, the larger the grid, the less
    /// far-apart objects will be tested due to said wrapping.
    pub bounds_min: [f64; 2],
    /// Top right corner, extended to fit a whole number of cells.
    pub bounds_max: [f64; 2],
    /// Side length of a cell. A likely good value is a little larger
    /// than a typical moving object, e.g. a tile.
    pub cell_size: f64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            bounds_min: [-2048.0, -2048.0],
            bounds_max: [2048.0, 2048.0],
            cell_size: 64.0,
        }
    }
}

impl GridParams {
    pub(crate) fn validate(&self) -> Result<(), PhysicsError> {
        let finite = self.bounds_min.iter().chain(&self.bounds_max).all(|c| c.is_finite());
        let [min_x, min_y] = self.bounds_min;
        let [max_x, max_y] = self.bounds_max;
        let empty = max_x <= min_x || max_y <= min_y;
        if !finite || empty {
            return Err(PhysicsError::InvalidConfig(format!(
                "grid bounds {:?}..{:?} are empty or not finite",
                self.bounds_min, self.bounds_max
            )));
        }
        if !(self.cell_size > 0.0 && self.cell_size.is_finite()) {
            return Err(PhysicsError::InvalidConfig(format!(
                "grid cell size must be positive, got {}",
                self.cell_size
            )));
        }
        Ok(())
    }
}

/// A uniform grid with a bitset per column and per row.
///
/// A shape is marked in every column and row its AABB touches. Shapes that might
/// touch an AABB are those found both in a column and a row the AABB spans.
/// Recreated every step, which is cheap because it's just clearing bits.
#[derive(Clone, Debug)]
pub(crate) struct SpatialGrid {
    origin: m::Vec2,
    cell_size: f64,
    column_count: usize,
    row_count: usize,
    columns: BitMatrix,
    rows: BitMatrix,
    aabbs: Vec<AABB>,
    column_scratch: BitSet,
    row_scratch: BitSet,
}

impl SpatialGrid {
    /// Create a grid. The parameters must have been validated.
    pub fn new(params: &GridParams) -> Self {
        let origin = m::Vec2::from(params.bounds_min);
        let size = m::Vec2::from(params.bounds_max) - origin;
        let column_count = ((size.x / params.cell_size).ceil() as usize).max(1);
        let row_count = ((size.y / params.cell_size).ceil() as usize).max(1);
        Self {
            origin,
            cell_size: params.cell_size,
            column_count,
            row_count,
            columns: BitMatrix::new(column_count),
            rows: BitMatrix::new(row_count),
            aabbs: Vec::new(),
            column_scratch: BitSet::default(),
            row_scratch: BitSet::default(),
        }
    }

    /// Clear the grid and make space for `shape_count` shapes.
    pub fn prepare(&mut self, shape_count: usize) {
        self.columns.reset(shape_count);
        self.rows.reset(shape_count);
        let empty = AABB {
            min: m::Vec2::zero(),
            max: m::Vec2::zero(),
        };
        self.aabbs.clear();
        self.aabbs.resize(shape_count, empty);
    }

    pub fn insert(&mut self, id: usize, aabb: AABB) {
        self.aabbs[id] = aabb;
        for col in self.columns_of(&aabb) {
            self.columns.set(col, id);
        }
        for row in self.rows_of(&aabb) {
            self.rows.set(row, id);
        }
    }

    /// Find already inserted shapes that may overlap `aabb`, then insert `id`.
    /// Inserting in ascending id order produces every overlapping pair exactly once.
    pub fn test_and_insert(&mut self, id: usize, aabb: AABB) -> impl '_ + Iterator<Item = usize> {
        self.gather(&aabb);
        self.insert(id, aabb);
        self.culled_candidates(aabb)
    }

    fn culled_candidates(&self, aabb: AABB) -> impl '_ + Iterator<Item = usize> {
        let aabbs = &self.aabbs;
        // things may share a cell because of wrapping or just being close enough
        self.column_scratch
            .ones()
            .filter(move |&other| aabbs[other].overlaps(&aabb))
    }

    /// Collect the shapes in the columns and rows spanned by an AABB into the scratch sets
    /// and leave their intersection in `column_scratch`.
    fn gather(&mut self, aabb: &AABB) {
        let word_count = self.columns.words_per_row();
        self.column_scratch.reset(word_count);
        self.row_scratch.reset(word_count);
        for col in self.columns_of(aabb) {
            self.column_scratch.or_assign(self.columns.row(col));
        }
        for row in self.rows_of(aabb) {
            self.row_scratch.or_assign(self.rows.row(row));
        }
        self.column_scratch.and_assign(&self.row_scratch);
    }

    fn columns_of(&self, aabb: &AABB) -> impl Iterator<Item = usize> {
        cell_span(aabb.min.x, aabb.max.x, self.origin.x, self.cell_size, self.column_count)
    }

    fn rows_of(&self, aabb: &AABB) -> impl Iterator<Item = usize> {
        cell_span(aabb.min.y, aabb.max.y, self.origin.y, self.cell_size, self.row_count)
    }
}

/// Indices of the cells covering `lo..=hi` along one axis, wrapped toroidally.
/// Spans wider than the grid visit each cell once.
fn cell_span(
    lo: f64,
    hi: f64,
    origin: f64,
    cell_size: f64,
    count: usize,
) -> impl Iterator<Item = usize> {
    let first = ((lo - origin) / cell_size).floor() as i64;
    let last = ((hi - origin) / cell_size).floor() as i64;
    let count = count as i64;
    let len = last.saturating_sub(first).saturating_add(1).clamp(0, count);
    (0..len).map(move |i| first.wrapping_add(i).rem_euclid(count) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aabb(min: [f64; 2], max: [f64; 2]) -> AABB {
        AABB {
            min: min.into(),
            max: max.into(),
        }
    }

    fn small_grid() -> SpatialGrid {
        SpatialGrid::new(&GridParams {
            bounds_min: [0.0, 0.0],
            bounds_max: [100.0, 100.0],
            cell_size: 10.0,
        })
    }

    #[test]
    fn cell_spans_wrap_and_cap() {
        itertools::assert_equal(cell_span(5.0, 25.0, 0.0, 10.0, 10), [0, 1, 2]);
        itertools::assert_equal(cell_span(-15.0, -5.0, 0.0, 10.0, 10), [8, 9]);
        itertools::assert_equal(cell_span(95.0, 105.0, 0.0, 10.0, 10), [9, 0]);
        // wider than the whole grid
        assert_eq!(cell_span(-500.0, 500.0, 0.0, 10.0, 10).count(), 10);
        assert_eq!(cell_span(25.0, 1.0, 0.0, 10.0, 10).count(), 0);
    }

    #[test]
    fn pairs_are_found_once() {
        let mut grid = small_grid();
        let boxes = [
            aabb([1.0, 1.0], [12.0, 12.0]),
            aabb([11.0, 11.0], [15.0, 15.0]),
            aabb([50.0, 50.0], [52.0, 52.0]),
            aabb([0.0, 0.0], [30.0, 3.0]),
        ];
        grid.prepare(boxes.len());
        let mut pairs = Vec::new();
        for (id, b) in boxes.iter().enumerate() {
            pairs.extend(grid.test_and_insert(id, *b).map(|other| (other, id)));
        }
        assert_eq!(pairs, vec![(0, 1), (0, 3)]);
    }

    #[test]
    fn wrapped_neighbors_are_culled() {
        let mut grid = small_grid();
        grid.prepare(3);
        // same cells after wrapping, but far apart
        grid.insert(0, aabb([1.0, 1.0], [2.0, 2.0]));
        let hits: Vec<usize> = grid.test_and_insert(1, aabb([101.0, 1.0], [102.0, 2.0])).collect();
        assert!(hits.is_empty());
        // an aabb that reaches the first one through wrapping space is still only a hit if real
        let hits: Vec<usize> = grid.test_and_insert(2, aabb([-5.0, -5.0], [1.5, 1.5])).collect();
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn bad_params_are_rejected() {
        let mut params = GridParams::default();
        params.cell_size = 0.0;
        assert!(params.validate().is_err());
        let mut params = GridParams::default();
        params.bounds_max = params.bounds_min;
        assert!(params.validate().is_err());
        assert!(GridParams::default().validate().is_ok());
    }
}

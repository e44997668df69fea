//! Uniform-cell broad-phase
//!
//! Rebuilt from scratch every tick. Pairs are enumerated once per cell plus a
//! forward half-stencil, so every adjacent-cell pair is seen exactly once.
//!
//! Cells are also sorted into color classes. Visiting a cell touches the cell
//! itself and its stencil neighbours, a footprint spanning `x..=x+1` and
//! `y-1..=y+1`. Coloring with period 2 on x and 3 on y keeps the footprints of
//! same-color cells disjoint, so one color can be processed by many workers
//! at once without two of them reaching the same particle.

use std::collections::HashMap;

use glam::{IVec2, Vec2};

use crate::error::{Error, Result};

/// Forward neighbours; the mirrored offsets are covered from the other cell
pub const HALF_STENCIL: [IVec2; 4] = [
    IVec2::new(0, 1),
    IVec2::new(1, 0),
    IVec2::new(1, 1),
    IVec2::new(1, -1),
];

/// Color period along each axis
pub const COLOR_PERIOD: IVec2 = IVec2::new(2, 3);
/// Number of color classes
pub const COLOR_COUNT: usize = (COLOR_PERIOD.x * COLOR_PERIOD.y) as usize;

/// Color class of a cell
#[inline]
pub fn color_of(cell: IVec2) -> usize {
    let x = cell.x.rem_euclid(COLOR_PERIOD.x);
    let y = cell.y.rem_euclid(COLOR_PERIOD.y);
    (x + COLOR_PERIOD.x * y) as usize
}

/// Occupancy summary for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridStats {
    pub occupied_cells: usize,
    pub largest_cell: usize,
    pub particles: usize,
}

/// Cell coordinate → particle indices
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<IVec2, Vec<usize>>,
    colors: [Vec<IVec2>; COLOR_COUNT],
    particles: usize,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Result<Self> {
        validate_cell_size(cell_size)?;
        Ok(Self {
            cell_size,
            cells: HashMap::new(),
            colors: Default::default(),
            particles: 0,
        })
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Change the cell size; takes effect on the next rebuild
    pub fn set_cell_size(&mut self, cell_size: f32) -> Result<()> {
        validate_cell_size(cell_size)?;
        self.cell_size = cell_size;
        Ok(())
    }

    /// `(floor(x / cell_size), floor(y / cell_size))`
    #[inline]
    pub fn cell_of(&self, position: Vec2) -> IVec2 {
        (position / self.cell_size).floor().as_ivec2()
    }

    /// Clear and re-insert every position; indices follow iteration order
    pub fn rebuild<I>(&mut self, positions: I)
    where
        I: IntoIterator<Item = Vec2>,
    {
        self.cells.clear();
        self.particles = 0;
        for (index, position) in positions.into_iter().enumerate() {
            let cell = self.cell_of(position);
            self.cells.entry(cell).or_default().push(index);
            self.particles += 1;
        }

        for class in &mut self.colors {
            class.clear();
        }
        for &cell in self.cells.keys() {
            self.colors[color_of(cell)].push(cell);
        }
        // HashMap order is arbitrary; sort so traversal is reproducible
        for class in &mut self.colors {
            class.sort_unstable_by_key(|c| (c.x, c.y));
        }
    }

    /// Particle indices in `cell`
    pub fn particles_in(&self, cell: IVec2) -> &[usize] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Occupied cells of one color, sorted
    pub fn color_class(&self, color: usize) -> &[IVec2] {
        self.colors.get(color).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stats(&self) -> GridStats {
        GridStats {
            occupied_cells: self.cells.len(),
            largest_cell: self.cells.values().map(Vec::len).max().unwrap_or(0),
            particles: self.particles,
        }
    }

    /// Visit the intra-cell pairs of `cell` and its pairs against the half-stencil
    pub fn for_each_pair_from_cell<F>(&self, cell: IVec2, mut visit: F)
    where
        F: FnMut(usize, usize),
    {
        let Some(members) = self.cells.get(&cell) else {
            return;
        };

        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                visit(a, b);
            }
        }

        for offset in HALF_STENCIL {
            let Some(neighbours) = neighbour(cell, offset).and_then(|n| self.cells.get(&n)) else {
                continue;
            };
            for &a in members {
                for &b in neighbours {
                    visit(a, b);
                }
            }
        }
    }

    /// Visit every candidate pair once, color by color
    pub fn for_each_unique_pair<F>(&self, mut visit: F)
    where
        F: FnMut(usize, usize),
    {
        for class in &self.colors {
            for &cell in class {
                self.for_each_pair_from_cell(cell, &mut visit);
            }
        }
    }
}

/// `cell + offset`, or `None` past the edge of the `i32` cell range.
/// Far positions saturate into the edge cells in `cell_of`.
#[inline]
fn neighbour(cell: IVec2, offset: IVec2) -> Option<IVec2> {
    Some(IVec2::new(
        cell.x.checked_add(offset.x)?,
        cell.y.checked_add(offset.y)?,
    ))
}

fn validate_cell_size(cell_size: f32) -> Result<()> {
    if cell_size.is_finite() && cell_size > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "cell size must be finite and > 0, got {cell_size}"
        )))
    }
}

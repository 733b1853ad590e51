//! Node placement across the simulated area.
//!
//! A placement strategy hands out one position per node. The grid strategy
//! fills rows (or columns) of `grid_width` cells with fixed spacing,
//! starting at the configured origin, so the layout depends only on
//! (count, spacing, origin).

use serde::{Deserialize, Serialize};

use super::types::Position;

/// Order in which grid cells are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GridLayout {
    /// Fill a row of `grid_width` nodes, then move down one row.
    #[default]
    RowFirst,
    /// Fill a column of `grid_width` nodes, then move right one column.
    ColumnFirst,
}

/// Grid position allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridPositionAllocator {
    pub min_x: f64,
    pub min_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    /// Cells per row (`RowFirst`) or per column (`ColumnFirst`).
    pub grid_width: u32,
    pub layout: GridLayout,
}

impl Default for GridPositionAllocator {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            delta_x: 10.0,
            delta_y: 10.0,
            grid_width: 3,
            layout: GridLayout::RowFirst,
        }
    }
}

impl GridPositionAllocator {
    /// Position of the `index`-th node.
    pub fn position(&self, index: usize) -> Position {
        let width = self.grid_width.max(1) as usize;
        let (major, minor) = (index / width, index % width);
        match self.layout {
            GridLayout::RowFirst => Position::new(
                self.min_x + self.delta_x * minor as f64,
                self.min_y + self.delta_y * major as f64,
            ),
            GridLayout::ColumnFirst => Position::new(
                self.min_x + self.delta_x * major as f64,
                self.min_y + self.delta_y * minor as f64,
            ),
        }
    }

    /// Positions for `count` nodes, in node id order.
    pub fn allocate(&self, count: usize) -> Vec<Position> {
        (0..count).map(|i| self.position(i)).collect()
    }
}

/// Placement strategies available to a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Placement {
    Grid(GridPositionAllocator),
    /// Explicit positions; nodes beyond the list fall back to the origin.
    List { positions: Vec<Position> },
}

impl Default for Placement {
    fn default() -> Self {
        Placement::Grid(GridPositionAllocator::default())
    }
}

impl Placement {
    pub fn allocate(&self, count: usize) -> Vec<Position> {
        match self {
            Placement::Grid(grid) => grid.allocate(count),
            Placement::List { positions } => (0..count)
                .map(|i| positions.get(i).copied().unwrap_or_default())
                .collect(),
        }
    }
}

//! Tile grid of environmental cells.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::world::PopulationId;

pub const MAX_HEALTH: f64 = 100.0;
pub const MAX_RESOURCE: f64 = 100.0;

/// Cell position in the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    City,
    Forest,
    Lake,
    Land,
}

impl CellType {
    pub const ALL: [CellType; 4] = [
        CellType::City,
        CellType::Forest,
        CellType::Lake,
        CellType::Land,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CellType::City => "city",
            CellType::Forest => "forest",
            CellType::Lake => "lake",
            CellType::Land => "land",
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'C' | 'c' => Some(CellType::City),
            'F' | 'f' => Some(CellType::Forest),
            'L' | 'l' => Some(CellType::Lake),
            '.' => Some(CellType::Land),
            _ => None,
        }
    }

    /// Forests and lakes count as nature for nearby residents.
    pub fn is_nature(self) -> bool {
        matches!(self, CellType::Forest | CellType::Lake)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub position: Position,
    pub cell_type: CellType,
    pub air_pollution: f64,
    pub ground_pollution: f64,
    pub health: f64,
    pub resource_level: f64,
    pub populations: Vec<PopulationId>,
    /// Consecutive days a land cell went without non-tree residents.
    pub days_unused: u32,
    /// Days a city has spent below viable occupancy.
    pub abandonment_days: u32,
}

impl Cell {
    pub fn new(position: Position, cell_type: CellType) -> Self {
        Self {
            position,
            cell_type,
            air_pollution: 0.0,
            ground_pollution: 0.0,
            health: MAX_HEALTH,
            resource_level: 50.0,
            populations: Vec::new(),
            days_unused: 0,
            abandonment_days: 0,
        }
    }

    pub fn clamp(&mut self) {
        self.air_pollution = clamp_pollution(self.air_pollution);
        self.ground_pollution = clamp_pollution(self.ground_pollution);
        self.health = clamp_unit(self.health, MAX_HEALTH);
        self.resource_level = clamp_unit(self.resource_level, MAX_RESOURCE);
    }

    pub fn total_pollution(&self) -> f64 {
        self.air_pollution + self.ground_pollution
    }

    /// Combined pollution as a 0..1 fraction of the nominal 100-unit scale.
    pub fn pollution_fraction(&self) -> f64 {
        (self.total_pollution() / 100.0).clamp(0.0, 1.0)
    }

    /// Quality of resources drawn from this cell, degraded by pollution.
    pub fn resource_quality(&self) -> f64 {
        1.0 - self.pollution_fraction()
    }
}

fn clamp_pollution(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn clamp_unit(value: f64, cap: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, cap)
    } else {
        0.0
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("grid must have non-zero width and height (got {width}x{height})")]
    EmptyGrid { width: u32, height: u32 },
    #[error("position ({}, {}) lies outside the grid", .0.x, .0.y)]
    OutOfBounds(Position),
    #[error("malformed layout: {0}")]
    MalformedLayout(String),
}

/// Row-major grid of cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl Grid {
    /// Grid filled with land cells.
    pub fn new(width: u32, height: u32) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::EmptyGrid { width, height });
        }
        let mut cells = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                cells.push(Cell::new(Position::new(x, y), CellType::Land));
            }
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn from_layout<S: AsRef<str>>(rows: &[S]) -> Result<Self, GridError> {
        let height = rows.len() as u32;
        let width = rows
            .first()
            .map(|row| row.as_ref().chars().count() as u32)
            .unwrap_or(0);
        let mut grid = Self::new(width, height)?;
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() as u32 != width {
                return Err(GridError::MalformedLayout(format!(
                    "row {y} has {} cells, expected {width}",
                    row.chars().count()
                )));
            }
            for (x, symbol) in row.chars().enumerate() {
                let cell_type = CellType::from_symbol(symbol).ok_or_else(|| {
                    GridError::MalformedLayout(format!(
                        "unknown cell symbol '{symbol}' at ({x}, {y})"
                    ))
                })?;
                grid.cells[y * width as usize + x].cell_type = cell_type;
            }
        }
        Ok(grid)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn index(&self, pos: Position) -> Option<usize> {
        if pos.x < self.width && pos.y < self.height {
            Some((pos.y * self.width + pos.x) as usize)
        } else {
            None
        }
    }

    pub fn position_of(&self, index: usize) -> Option<Position> {
        if index < self.cells.len() {
            let index = index as u32;
            Some(Position::new(index % self.width, index / self.width))
        } else {
            None
        }
    }

    pub fn cell(&self, pos: Position) -> Option<&Cell> {
        self.index(pos).map(|idx| &self.cells[idx])
    }

    pub fn cell_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        self.index(pos).map(move |idx| &mut self.cells[idx])
    }

    pub fn try_cell(&self, pos: Position) -> Result<&Cell, GridError> {
        self.cell(pos).ok_or(GridError::OutOfBounds(pos))
    }

    pub fn try_cell_mut(&mut self, pos: Position) -> Result<&mut Cell, GridError> {
        self.cell_mut(pos).ok_or(GridError::OutOfBounds(pos))
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Neighboring cells (4-connectivity), ordered north, south, west, east.
    pub fn neighbors(&self, pos: Position) -> Vec<Position> {
        let mut neighbors = Vec::with_capacity(4);
        if pos.y > 0 {
            neighbors.push(Position::new(pos.x, pos.y - 1));
        }
        if pos.y + 1 < self.height {
            neighbors.push(Position::new(pos.x, pos.y + 1));
        }
        if pos.x > 0 {
            neighbors.push(Position::new(pos.x - 1, pos.y));
        }
        if pos.x + 1 < self.width {
            neighbors.push(Position::new(pos.x + 1, pos.y));
        }
        neighbors
    }

    /// Manhattan distance between two positions
    pub fn distance(&self, a: Position, b: Position) -> u32 {
        a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
    }

    /// Cells within `radius` steps of `pos` (excluding `pos`), nearest first,
    /// ties broken in row-major order.
    pub fn cells_within(&self, pos: Position, radius: u32) -> Vec<(Position, u32)> {
        let min_x = pos.x.saturating_sub(radius);
        let max_x = pos.x.saturating_add(radius).min(self.width.saturating_sub(1));
        let min_y = pos.y.saturating_sub(radius);
        let max_y = pos.y.saturating_add(radius).min(self.height.saturating_sub(1));
        let mut found = Vec::new();
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let candidate = Position::new(x, y);
                let distance = self.distance(pos, candidate);
                if distance > 0 && distance <= radius {
                    found.push((candidate, distance));
                }
            }
        }
        found.sort_by_key(|(candidate, distance)| (*distance, candidate.y, candidate.x));
        found
    }

    /// Adjacent lake holding at least `min_level` water; the fullest wins.
    pub fn adjacent_lake_with(&self, pos: Position, min_level: f64) -> Option<Position> {
        let mut best: Option<(Position, f64)> = None;
        for neighbor in self.neighbors(pos) {
            let Some(cell) = self.cell(neighbor) else {
                continue;
            };
            if cell.cell_type != CellType::Lake || cell.resource_level < min_level {
                continue;
            }
            match best {
                Some((_, level)) if level >= cell.resource_level => {}
                _ => best = Some((neighbor, cell.resource_level)),
            }
        }
        best.map(|(pos, _)| pos)
    }

    pub fn count_type(&self, cell_type: CellType) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.cell_type == cell_type)
            .count()
    }
}

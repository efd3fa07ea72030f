//! Air and ground pollution transport.
//!
//! Each tick runs, in order: simultaneous redistribution to 4-neighbors,
//! air-to-ground settling, then decay weighted by cell type and health.
//! Cells are clamped after every step.

use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    grid::{CellType, Grid},
    rng::SystemRng,
    scenario::PollutionParams,
    world::World,
};

pub struct PollutionSystem {
    field: Vec<f64>,
    scratch: Vec<f64>,
}

impl PollutionSystem {
    pub fn new() -> Self {
        Self {
            field: Vec::new(),
            scratch: Vec::new(),
        }
    }
}

impl Default for PollutionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for PollutionSystem {
    fn name(&self) -> &str {
        "pollution"
    }

    fn run(
        &mut self,
        _ctx: &mut SystemContext<'_>,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let params = world.params.pollution.clone();
        spread_with_buffers(&mut world.grid, &params, &mut self.field, &mut self.scratch);
        settle(&mut world.grid, params.air_to_ground_rate);
        decay(&mut world.grid, params.base_decay_rate);
        Ok(())
    }
}

/// Redistributes `rate` of every cell's value evenly over its neighbors.
///
/// Inflow is accumulated into `scratch` so the result does not depend on
/// visiting order. A cell without neighbors keeps its value, so the field
/// total is conserved.
pub fn diffuse_field(grid: &Grid, field: &mut [f64], rate: f64, scratch: &mut Vec<f64>) {
    scratch.clear();
    scratch.resize(field.len(), 0.0);
    let rate = rate.clamp(0.0, 1.0);
    for (index, value) in field.iter().enumerate() {
        let Some(pos) = grid.position_of(index) else {
            continue;
        };
        let neighbors = grid.neighbors(pos);
        if neighbors.is_empty() {
            scratch[index] += value;
            continue;
        }
        let outflow = value * rate;
        scratch[index] += value - outflow;
        let share = outflow / neighbors.len() as f64;
        for neighbor in neighbors {
            if let Some(target) = grid.index(neighbor) {
                scratch[target] += share;
            }
        }
    }
    field.copy_from_slice(scratch);
}

/// Redistribution step only: both layers diffuse at their own rates.
pub fn spread_pollution(grid: &mut Grid, params: &PollutionParams) {
    let mut field = Vec::new();
    let mut scratch = Vec::new();
    spread_with_buffers(grid, params, &mut field, &mut scratch);
}

fn spread_with_buffers(
    grid: &mut Grid,
    params: &PollutionParams,
    field: &mut Vec<f64>,
    scratch: &mut Vec<f64>,
) {
    field.clear();
    field.extend(grid.cells().iter().map(|cell| cell.air_pollution));
    diffuse_field(grid, field, params.air_spread_rate, scratch);
    for (cell, value) in grid.cells_mut().iter_mut().zip(field.iter()) {
        cell.air_pollution = *value;
        cell.clamp();
    }

    field.clear();
    field.extend(grid.cells().iter().map(|cell| cell.ground_pollution));
    diffuse_field(grid, field, params.ground_spread_rate, scratch);
    for (cell, value) in grid.cells_mut().iter_mut().zip(field.iter()) {
        cell.ground_pollution = *value;
        cell.clamp();
    }
}

pub fn settle(grid: &mut Grid, rate: f64) {
    let rate = rate.clamp(0.0, 1.0);
    for cell in grid.cells_mut() {
        let settled = cell.air_pollution * rate;
        cell.air_pollution -= settled;
        cell.ground_pollution += settled;
        cell.clamp();
    }
}

pub fn decay(grid: &mut Grid, base_rate: f64) {
    for cell in grid.cells_mut() {
        let weight = base_rate * type_multiplier(cell.cell_type) * health_multiplier(cell.health);
        cell.air_pollution -= cell.air_pollution * decay_fraction(weight, cell.air_pollution);
        cell.ground_pollution -=
            cell.ground_pollution * decay_fraction(weight, cell.ground_pollution);
        cell.clamp();
    }
}

fn type_multiplier(cell_type: CellType) -> f64 {
    match cell_type {
        CellType::Forest => 2.0,
        CellType::Lake => 1.5,
        CellType::Land => 1.2,
        CellType::City => 0.8,
    }
}

/// 0.5 for a dead cell up to 1.0 at full health.
fn health_multiplier(health: f64) -> f64 {
    0.5 + health.clamp(0.0, 100.0) / 200.0
}

fn decay_fraction(weight: f64, level: f64) -> f64 {
    (weight / (1.0 + level.max(0.0) / 100.0)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Position;

    fn total(grid: &Grid) -> f64 {
        grid.cells().iter().map(|c| c.total_pollution()).sum()
    }

    #[test]
    fn spread_splits_outflow_among_neighbors() {
        let mut grid = Grid::new(3, 3).unwrap();
        grid.cell_mut(Position::new(1, 1)).unwrap().air_pollution = 100.0;
        spread_pollution(&mut grid, &PollutionParams::default());

        assert!((grid.cell(Position::new(1, 1)).unwrap().air_pollution - 60.0).abs() < 1e-9);
        for pos in [(1, 0), (1, 2), (0, 1), (2, 1)] {
            let cell = grid.cell(Position::new(pos.0, pos.1)).unwrap();
            assert!((cell.air_pollution - 10.0).abs() < 1e-9);
        }
        assert_eq!(grid.cell(Position::new(0, 0)).unwrap().air_pollution, 0.0);
        assert!((total(&grid) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn corner_cells_split_between_two_neighbors() {
        let mut grid = Grid::new(2, 2).unwrap();
        grid.cell_mut(Position::new(0, 0)).unwrap().ground_pollution = 40.0;
        spread_pollution(&mut grid, &PollutionParams::default());
        assert!((grid.cell(Position::new(0, 0)).unwrap().ground_pollution - 36.0).abs() < 1e-9);
        assert!((grid.cell(Position::new(1, 0)).unwrap().ground_pollution - 2.0).abs() < 1e-9);
        assert!((grid.cell(Position::new(0, 1)).unwrap().ground_pollution - 2.0).abs() < 1e-9);
    }

    #[test]
    fn isolated_cell_keeps_its_pollution() {
        let mut grid = Grid::new(1, 1).unwrap();
        grid.cell_mut(Position::new(0, 0)).unwrap().air_pollution = 12.0;
        spread_pollution(&mut grid, &PollutionParams::default());
        assert_eq!(grid.cell(Position::new(0, 0)).unwrap().air_pollution, 12.0);
    }

    #[test]
    fn settling_moves_air_into_ground() {
        let mut grid = Grid::new(1, 1).unwrap();
        grid.cell_mut(Position::new(0, 0)).unwrap().air_pollution = 50.0;
        settle(&mut grid, 0.2);
        let cell = grid.cell(Position::new(0, 0)).unwrap();
        assert!((cell.air_pollution - 40.0).abs() < 1e-9);
        assert!((cell.ground_pollution - 10.0).abs() < 1e-9);
    }

    #[test]
    fn forests_clean_faster_than_cities() {
        let mut grid = Grid::from_layout(&["FC"]).unwrap();
        for cell in grid.cells_mut() {
            cell.air_pollution = 20.0;
        }
        decay(&mut grid, 0.01);
        let forest = grid.cell(Position::new(0, 0)).unwrap().air_pollution;
        let city = grid.cell(Position::new(1, 0)).unwrap().air_pollution;
        assert!(forest < city);
        assert!(city < 20.0);
    }

    #[test]
    fn heavy_pollution_decays_proportionally_slower() {
        let mut grid = Grid::new(2, 1).unwrap();
        grid.cell_mut(Position::new(0, 0)).unwrap().air_pollution = 10.0;
        grid.cell_mut(Position::new(1, 0)).unwrap().air_pollution = 400.0;
        decay(&mut grid, 0.01);
        let light = 1.0 - grid.cell(Position::new(0, 0)).unwrap().air_pollution / 10.0;
        let heavy = 1.0 - grid.cell(Position::new(1, 0)).unwrap().air_pollution / 400.0;
        assert!(heavy < light);
    }
}

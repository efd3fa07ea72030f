//! Lake networks: 4-connected lake cells mixed as one body of water.

use std::collections::{BTreeSet, VecDeque};

use anyhow::Result;
use tracing::warn;

use crate::{
    engine::{System, SystemContext},
    grid::{Cell, CellType, Grid, Position},
    rng::SystemRng,
    world::World,
};

/// Connected components of lake cells, discovered in row-major order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LakeNetworks {
    networks: Vec<Vec<Position>>,
}

impl LakeNetworks {
    pub fn detect(grid: &Grid) -> Self {
        let mut visited = vec![false; grid.len()];
        let mut networks = Vec::new();
        let mut queue = VecDeque::new();

        for (start, cell) in grid.cells().iter().enumerate() {
            if visited[start] || cell.cell_type != CellType::Lake {
                continue;
            }
            visited[start] = true;
            queue.push_back(cell.position);
            let mut members = Vec::new();
            while let Some(pos) = queue.pop_front() {
                members.push(pos);
                for neighbor in grid.neighbors(pos) {
                    let Some(idx) = grid.index(neighbor) else {
                        continue;
                    };
                    if !visited[idx] && grid.cells()[idx].cell_type == CellType::Lake {
                        visited[idx] = true;
                        queue.push_back(neighbor);
                    }
                }
            }
            members.sort_by_key(|pos| (pos.y, pos.x));
            networks.push(members);
        }
        Self { networks }
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Position]> {
        self.networks.iter().map(Vec::as_slice)
    }

    pub fn network_of(&self, pos: Position) -> Option<usize> {
        self.networks
            .iter()
            .position(|members| members.contains(&pos))
    }
}

pub fn update_lake_networks(grid: &Grid) -> LakeNetworks {
    LakeNetworks::detect(grid)
}

/// Sets every lake's water to its network's mean.
pub fn balance_water_levels(grid: &mut Grid, networks: &LakeNetworks) {
    mix(grid, networks, |cell| &mut cell.resource_level);
}

/// Sets every lake's ground pollution to its network's mean.
pub fn spread_water_pollution(grid: &mut Grid, networks: &LakeNetworks) {
    mix(grid, networks, |cell| &mut cell.ground_pollution);
}

fn mix<F>(grid: &mut Grid, networks: &LakeNetworks, mut field: F)
where
    F: FnMut(&mut Cell) -> &mut f64,
{
    for members in networks.iter() {
        let indices: Vec<usize> = members.iter().filter_map(|pos| grid.index(*pos)).collect();
        if indices.is_empty() {
            continue;
        }
        let cells = grid.cells_mut();
        let values: Vec<f64> = indices.iter().map(|idx| *field(&mut cells[*idx])).collect();
        if values.iter().all(|value| *value == values[0]) {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        for idx in indices {
            *field(&mut cells[idx]) = mean;
            cells[idx].clamp();
        }
    }
}

pub struct WaterSystem {
    networks: LakeNetworks,
    drained: BTreeSet<Position>,
}

impl WaterSystem {
    pub fn new() -> Self {
        Self {
            networks: LakeNetworks::default(),
            drained: BTreeSet::new(),
        }
    }

    pub fn networks(&self) -> &LakeNetworks {
        &self.networks
    }
}

impl Default for WaterSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for WaterSystem {
    fn name(&self) -> &str {
        "water"
    }

    fn run(
        &mut self,
        ctx: &mut SystemContext<'_>,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        self.networks = update_lake_networks(&world.grid);
        balance_water_levels(&mut world.grid, &self.networks);
        spread_water_pollution(&mut world.grid, &self.networks);

        // Networks are keyed by their first cell in row-major order.
        let mut drained_now = BTreeSet::new();
        for members in self.networks.iter() {
            let Some(anchor) = members.first().copied() else {
                continue;
            };
            let level = world
                .grid
                .cell(anchor)
                .map(|cell| cell.resource_level)
                .unwrap_or(0.0);
            if level <= 0.0 {
                if !self.drained.contains(&anchor) {
                    warn!(
                        tick = ctx.tick,
                        x = anchor.x,
                        y = anchor.y,
                        cells = members.len(),
                        "lake network drained"
                    );
                }
                drained_now.insert(anchor);
            }
        }
        self.drained = drained_now;
        Ok(())
    }
}

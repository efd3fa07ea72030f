//! Cell health drift and land-use conversions.

use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    grid::{CellType, Position},
    population::PopulationKind,
    rng::SystemRng,
    world::World,
};

pub struct LandUseSystem;

impl LandUseSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LandUseSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for LandUseSystem {
    fn name(&self) -> &str {
        "land_use"
    }

    fn run(
        &mut self,
        _ctx: &mut SystemContext<'_>,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        update_land_use(world)
    }
}

/// One day of cell health drift, idle-land tracking and conversions.
///
/// Health falls with pollution and recovers with resources. Land without
/// non-tree residents accrues idle days. Cities without humans accrue
/// abandonment days and revert to land at the threshold; forests that lost
/// their trees revert immediately.
pub fn update_land_use(world: &mut World) -> Result<()> {
    let abandonment_threshold = world.params.conversion.city_abandonment_days;
    let mut conversions: Vec<Position> = Vec::new();

    for index in 0..world.grid.len() {
        let Some(pos) = world.grid.position_of(index) else {
            continue;
        };
        let residents: Vec<PopulationKind> =
            world.populations_at(pos).iter().map(|p| p.kind).collect();
        let cell = &mut world.grid.cells_mut()[index];
        cell.health += -(cell.air_pollution + cell.ground_pollution) / 100.0
            + cell.resource_level / 100.0;
        cell.clamp();

        match cell.cell_type {
            CellType::Land => {
                if residents.iter().any(|kind| *kind != PopulationKind::Trees) {
                    cell.days_unused = 0;
                } else {
                    cell.days_unused += 1;
                }
            }
            CellType::City => {
                if !residents.contains(&PopulationKind::Humans) {
                    cell.abandonment_days += 1;
                    if cell.abandonment_days >= abandonment_threshold {
                        conversions.push(pos);
                    }
                }
            }
            CellType::Forest => {
                if !residents.contains(&PopulationKind::Trees) {
                    conversions.push(pos);
                }
            }
            CellType::Lake => {}
        }
    }

    for pos in conversions {
        world.convert_cell(pos, CellType::Land)?;
    }
    Ok(())
}

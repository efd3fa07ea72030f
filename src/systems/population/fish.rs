use anyhow::Result;

use super::{feed, grow_capped, scale};
use crate::world::{PopulationId, World};

pub(super) fn daily(world: &mut World, id: PopulationId) -> Result<()> {
    feed(world, id);
    let Some(population) = world.population(id) else {
        return Ok(());
    };
    let params = world.params.fish.clone();
    let cell = world.grid.try_cell(population.position)?;
    let (ground, cell_health) = (cell.ground_pollution, cell.health);

    if ground > params.pollution_threshold {
        scale(world, id, params.decline_rate);
        if let Some(population) = world.population_mut(id) {
            population.adjust_health(params.pollution_health_impact * ground);
        }
    } else if cell_health > params.growth_health {
        grow_capped(world, id, params.growth_rate);
    }
    Ok(())
}

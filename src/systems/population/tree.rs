use anyhow::Result;
use rand::Rng;
use tracing::info;

use super::{feed, grow_capped};
use crate::{
    engine::SystemContext,
    grid::{CellType, Position},
    population::PopulationKind,
    world::{PopulationId, World},
};

pub(super) fn daily(world: &mut World, id: PopulationId, ctx: &mut SystemContext<'_>) -> Result<()> {
    feed(world, id);
    let Some(population) = world.population(id) else {
        return Ok(());
    };
    let cell = world.grid.try_cell(population.position)?;
    let absorbed = population.size as f64
        * world.params.trees.absorption_factor
        * (population.health / 100.0)
        * (1.0 - cell.pollution_fraction());
    ctx.carbon.absorb(absorbed);
    Ok(())
}

/// Growth check, then spread onto long-unused land or empty cities.
pub(super) fn monthly<R: Rng + ?Sized>(
    world: &mut World,
    id: PopulationId,
    rng: &mut R,
) -> Result<()> {
    let Some(population) = world.population(id) else {
        return Ok(());
    };
    let pos = population.position;
    let params = world.params.trees.clone();
    let cell = world.grid.try_cell(pos)?;
    if cell.health > params.growth_health && cell.resource_level > params.growth_resources {
        grow_capped(world, id, params.growth_rate);
    }

    let Some(population) = world.population(id) else {
        return Ok(());
    };
    let (size, health) = (population.size, population.health);
    let seed = (size as f64 * params.seed_share).floor() as u64;
    // Too few trees to seed a stand; a bare forest would revert next tick.
    if seed == 0 {
        return Ok(());
    }
    let candidates: Vec<Position> = world
        .grid
        .neighbors(pos)
        .into_iter()
        .filter(|n| can_reforest(world, *n))
        .collect();
    for target in candidates {
        if !rng.gen_bool(params.spread_chance.clamp(0.0, 1.0)) {
            continue;
        }
        world.convert_cell(target, CellType::Forest)?;
        world.settle(PopulationKind::Trees, target, seed, health)?;
        info!(x = target.x, y = target.y, seedlings = seed, "forest spread");
    }
    Ok(())
}

fn can_reforest(world: &World, pos: Position) -> bool {
    let Some(cell) = world.grid.cell(pos) else {
        return false;
    };
    match cell.cell_type {
        CellType::Land => {
            cell.days_unused >= world.params.conversion.land_to_forest_days
                && cell.health > world.params.thresholds.good
        }
        CellType::City => world.size_of(pos, PopulationKind::Humans) == 0,
        _ => false,
    }
}

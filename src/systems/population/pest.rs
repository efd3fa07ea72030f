use anyhow::Result;
use rand::Rng;

use super::{feed, grow_capped};
use crate::{
    population::{profile, PopulationKind},
    world::{PopulationId, World},
};

/// Pests thrive on pollution and occasionally seed a pest-free neighbor.
pub(super) fn daily<R: Rng + ?Sized>(
    world: &mut World,
    id: PopulationId,
    rng: &mut R,
) -> Result<()> {
    feed(world, id);
    let Some(population) = world.population(id) else {
        return Ok(());
    };
    let pos = population.position;
    let params = world.params.pests.clone();
    let pollution = world.grid.try_cell(pos)?.total_pollution();
    grow_capped(world, id, params.growth_rate * (1.0 + pollution / 200.0));

    if !rng.gen_bool(params.spread_chance.clamp(0.0, 1.0)) {
        return Ok(());
    }
    let Some(population) = world.population(id) else {
        return Ok(());
    };
    let (size, health) = (population.size, population.health);
    let seed = (size as f64 * params.seed_share).floor() as u64;
    if seed == 0 {
        return Ok(());
    }
    let habitats = profile(PopulationKind::Pests).habitats;
    let target = world.grid.neighbors(pos).into_iter().find(|n| {
        world
            .grid
            .cell(*n)
            .is_some_and(|cell| habitats.contains(&cell.cell_type))
            && world.size_of(*n, PopulationKind::Pests) == 0
    });
    if let Some(target) = target {
        world.settle(PopulationKind::Pests, target, seed, health)?;
    }
    Ok(())
}

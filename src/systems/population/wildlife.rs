use anyhow::Result;
use rand::Rng;
use tracing::info;

use super::{feed, grow_capped, scale};
use crate::{
    grid::{CellType, Position},
    population::{profile, PopulationKind},
    world::{PopulationId, World},
};

/// Feeding, growth in good habitat, and flight from collapsing cells.
pub(super) fn daily(world: &mut World, id: PopulationId) -> Result<()> {
    let allocation = feed(world, id);
    let params = world.params.wildlife.clone();
    let critical = world.params.thresholds.critical;
    let delta = allocation.satisfaction() * allocation.quality * params.nourishment
        - params.base_health_decline;
    let Some(population) = world.population_mut(id) else {
        return Ok(());
    };
    population.adjust_health(delta);
    let pos = population.position;

    let cell = world.grid.try_cell(pos)?;
    let (cell_type, cell_health) = (cell.cell_type, cell.health);
    if cell.health > params.growth_health
        && cell.total_pollution() < params.growth_pollution_limit
        && cell.resource_level > params.growth_resources
    {
        let bonus = if cell_type == CellType::Forest {
            params.forest_growth_bonus
        } else {
            1.0
        };
        grow_capped(world, id, params.growth_rate * bonus);
    }

    if cell_health < critical {
        match find_refuge(world, pos) {
            Some(refuge) => {
                let landed = world.relocate(id, refuge)?;
                info!(
                    from_x = pos.x,
                    from_y = pos.y,
                    x = refuge.x,
                    y = refuge.y,
                    population = landed.raw(),
                    "wildlife relocated"
                );
            }
            None => scale(world, id, params.decline_rate),
        }
    }
    Ok(())
}

/// Nearest healthy home cell within the movement radius.
fn find_refuge(world: &World, from: Position) -> Option<Position> {
    let params = &world.params.wildlife;
    let good = world.params.thresholds.good;
    let home = profile(PopulationKind::Wildlife).home;
    world
        .grid
        .cells_within(from, params.movement_radius)
        .into_iter()
        .map(|(pos, _)| pos)
        .find(|pos| {
            world.grid.cell(*pos).is_some_and(|cell| {
                cell.cell_type == home
                    && cell.health >= good
                    && cell.resource_level > params.min_habitat_resources
            })
        })
}

/// Nearest unoccupied habitat within the movement radius.
fn find_colony_site(world: &World, from: Position) -> Option<(Position, u32)> {
    let params = &world.params.wildlife;
    let good = world.params.thresholds.good;
    let habitats = profile(PopulationKind::Wildlife).habitats;
    world
        .grid
        .cells_within(from, params.movement_radius)
        .into_iter()
        .find(|(pos, _)| {
            world.grid.cell(*pos).is_some_and(|cell| {
                habitats.contains(&cell.cell_type)
                    && cell.health >= good
                    && cell.resource_level > params.min_habitat_resources
            }) && world.size_of(*pos, PopulationKind::Wildlife) == 0
        })
}

/// Colonization attempt for large, healthy populations.
pub(super) fn monthly<R: Rng + ?Sized>(
    world: &mut World,
    id: PopulationId,
    rng: &mut R,
) -> Result<()> {
    let Some(population) = world.population(id) else {
        return Ok(());
    };
    let (pos, size, health) = (population.position, population.size, population.health);
    let params = world.params.wildlife.clone();
    if size < params.min_colony_size || health < params.min_colony_health {
        return Ok(());
    }
    let Some((site, distance)) = find_colony_site(world, pos) else {
        return Ok(());
    };

    let chance = (params.base_success_rate + params.health_bonus * health / 100.0
        - params.distance_penalty * f64::from(distance))
    .clamp(0.0, 1.0);
    if rng.gen_bool(chance) {
        let share = if params.colony_share_max > params.colony_share_min {
            rng.gen_range(params.colony_share_min..=params.colony_share_max)
        } else {
            params.colony_share_min
        };
        let settlers = (size as f64 * share).floor() as u64;
        if settlers == 0 {
            return Ok(());
        }
        if let Some(population) = world.population_mut(id) {
            population.size -= settlers;
        }
        world.settle(
            PopulationKind::Wildlife,
            site,
            settlers,
            health - params.colony_health_penalty,
        )?;
        info!(x = site.x, y = site.y, settlers, "wildlife colony founded");
    } else {
        scale(world, id, 1.0 - params.failed_colony_loss);
    }
    Ok(())
}

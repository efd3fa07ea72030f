use anyhow::Result;
use tracing::info;

use super::{feed, scale};
use crate::{
    engine::SystemContext,
    grid::CellType,
    population::PopulationKind,
    world::{PopulationId, World},
};

/// Commute emissions, resource draw and the pollution/nature health drift.
pub(super) fn daily(world: &mut World, id: PopulationId, ctx: &mut SystemContext<'_>) -> Result<()> {
    let Some(population) = world.population(id) else {
        return Ok(());
    };
    let pos = population.position;
    let params = world.params.humans.clone();
    let emission =
        population.pollution_generation_rate * population.size as f64 * params.commute_multiplier;

    let cell = world.grid.try_cell_mut(pos)?;
    cell.air_pollution += emission;
    cell.clamp();
    let (air, ground) = (cell.air_pollution, cell.ground_pollution);
    ctx.carbon.emit(emission);

    let nature = world
        .grid
        .neighbors(pos)
        .into_iter()
        .filter(|n| world.grid.cell(*n).is_some_and(|c| c.cell_type.is_nature()))
        .count();

    feed(world, id);
    let delta = params.air_health_impact * air
        + params.ground_health_impact * ground
        + params.nature_bonus * nature as f64;
    if let Some(population) = world.population_mut(id) {
        population.adjust_health(delta);
    }
    Ok(())
}

/// Growth or decline, city founding at full density, and abandonment.
pub(super) fn weekly(world: &mut World, id: PopulationId) -> Result<()> {
    let Some(population) = world.population(id) else {
        return Ok(());
    };
    let (pos, size) = (population.position, population.size);
    let cell = world.grid.try_cell(pos)?;
    let (cell_health, resources) = (cell.health, cell.resource_level);
    let thresholds = world.params.thresholds.clone();
    let growth = world.params.growth.clone();
    let params = world.params.humans.clone();
    let cap = PopulationKind::Humans.max_density();

    if cell_health > thresholds.good && resources > growth.growth {
        if size >= cap {
            if let Some(population) = world.population_mut(id) {
                population.size = cap;
            }
            found_city(world, id)?;
        } else {
            super::grow_capped(world, id, params.growth_rate);
        }
    } else if cell_health < thresholds.poor || resources < growth.decline {
        scale(world, id, params.decline_rate);
    }

    let size = world.population(id).map(|p| p.size).unwrap_or(0);
    let threshold_days = world.params.conversion.city_abandonment_days;
    let cell = world.grid.try_cell_mut(pos)?;
    if (size as f64) < cap as f64 * params.abandonment_occupancy {
        cell.abandonment_days += 7;
        if cell.abandonment_days >= threshold_days {
            world.convert_cell(pos, CellType::Land)?;
            world.retire(id, "abandonment");
        }
    } else {
        cell.abandonment_days = 0;
    }
    Ok(())
}

/// Seeds a new city on the first eligible land neighbor (north, south,
/// west, east). Returns the new population, if one was founded.
pub fn found_city(world: &mut World, id: PopulationId) -> Result<Option<PopulationId>> {
    let Some(population) = world.population(id) else {
        return Ok(None);
    };
    let (pos, size, health) = (population.position, population.size, population.health);
    let seed = (size as f64 * world.params.humans.expansion_share).floor() as u64;
    if seed == 0 {
        return Ok(None);
    }
    let good = world.params.thresholds.good;
    let min_resources = world.params.conversion.land_to_city;

    let target = world.grid.neighbors(pos).into_iter().find(|n| {
        world.grid.cell(*n).is_some_and(|cell| {
            cell.cell_type == CellType::Land
                && cell.health > good
                && cell.resource_level > min_resources
        }) && world.size_of(*n, PopulationKind::Humans) == 0
    });
    let Some(target) = target else {
        return Ok(None);
    };

    world.convert_cell(target, CellType::City)?;
    if let Some(population) = world.population_mut(id) {
        population.size -= seed;
    }
    let founded = world.settle(PopulationKind::Humans, target, seed, health)?;
    info!(
        from_x = pos.x,
        from_y = pos.y,
        x = target.x,
        y = target.y,
        settlers = seed,
        "city founded"
    );
    Ok(Some(founded))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::grid::Position;

    fn crowded_city() -> (World, PopulationId) {
        let mut world = bare_world(&["C."]);
        let city = Position::new(0, 0);
        {
            let cell = world.grid_mut().cell_mut(city).unwrap();
            cell.health = 90.0;
            cell.resource_level = 5.0;
        }
        let id = world
            .settle(PopulationKind::Humans, city, 1_000, 100.0)
            .unwrap();
        (world, id)
    }

    #[test]
    fn full_city_founds_a_neighbor() {
        let (mut world, id) = crowded_city();
        weekly(&mut world, id).unwrap();

        let neighbor = Position::new(1, 0);
        assert_eq!(
            world.grid().cell(neighbor).unwrap().cell_type,
            CellType::City
        );
        assert_eq!(world.size_of(neighbor, PopulationKind::Humans), 100);
        assert_eq!(world.population(id).unwrap().size, 900);
    }

    #[test]
    fn no_eligible_land_means_no_founding() {
        let (mut world, id) = crowded_city();
        world
            .grid_mut()
            .cell_mut(Position::new(1, 0))
            .unwrap()
            .health = 60.0;
        weekly(&mut world, id).unwrap();
        assert_eq!(world.population(id).unwrap().size, 1_000);
        assert_eq!(
            world.grid().cell(Position::new(1, 0)).unwrap().cell_type,
            CellType::Land
        );
    }

    #[test]
    fn poor_cities_shrink() {
        let mut world = bare_world(&["C"]);
        let pos = Position::new(0, 0);
        world.grid_mut().cell_mut(pos).unwrap().health = 40.0;
        let id = world.settle(PopulationKind::Humans, pos, 500, 100.0).unwrap();
        weekly(&mut world, id).unwrap();
        assert_eq!(world.population(id).unwrap().size, 450);
    }

    #[test]
    fn near_empty_city_is_abandoned() {
        let mut params = crate::scenario::EcologyParams::default();
        params.conversion.city_abandonment_days = 14;
        let mut world = bare_world_with(&["C"], params);
        let pos = Position::new(0, 0);
        let id = world.settle(PopulationKind::Humans, pos, 20, 100.0).unwrap();

        weekly(&mut world, id).unwrap();
        assert_eq!(world.grid().cell(pos).unwrap().abandonment_days, 7);
        weekly(&mut world, id).unwrap();
        assert_eq!(world.grid().cell(pos).unwrap().cell_type, CellType::Land);
        assert!(world.population(id).is_none());
        assert_eq!(world.bookkeeping().extinctions[0].cause, "abandonment");
    }

    #[test]
    fn commuting_emits_into_air_and_ledger() {
        let mut world = bare_world(&["CF"]);
        let pos = Position::new(0, 0);
        let id = world.settle(PopulationKind::Humans, pos, 1_000, 50.0).unwrap();
        let mut carbon = ledger();
        let mut ctx = SystemContext {
            tick: 0,
            scenario_name: "test",
            carbon: &mut carbon,
        };
        daily(&mut world, id, &mut ctx).unwrap();

        // 1000 * 0.0005 * 2
        assert!((ctx.carbon.level() - 1.0).abs() < 1e-9);
        assert!((world.grid().cell(pos).unwrap().air_pollution - 1.0).abs() < 1e-9);
        // -0.15 * 1.0 + 0.05 * one forest neighbor
        assert!((world.population(id).unwrap().health - 49.9).abs() < 1e-9);
    }
}

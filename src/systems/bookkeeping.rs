use anyhow::Result;
use tracing::debug;

use crate::{
    engine::{System, SystemContext},
    rng::SystemRng,
    world::World,
};

pub struct BookkeepingSystem;

impl BookkeepingSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BookkeepingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for BookkeepingSystem {
    fn name(&self) -> &str {
        "bookkeeping"
    }

    fn run(
        &mut self,
        ctx: &mut SystemContext<'_>,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        world.sweep_extinct("collapse");
        for cell in world.grid.cells_mut() {
            cell.clamp();
        }
        // Allocations not consumed this tick expire.
        for population in world.populations.values_mut() {
            population.allocation = None;
        }
        debug!(
            tick = ctx.tick,
            extinctions = world.bookkeeping.extinctions.len(),
            conversions = world.bookkeeping.conversions.len(),
            "bookkeeping"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CarbonLedger;
    use crate::grid::Position;
    use crate::population::PopulationKind;
    use crate::rng::RngManager;
    use crate::scenario::{EcologyParams, InitialPopulations};

    #[test]
    fn sweeps_dead_populations_and_clamps_cells() {
        let seeding = InitialPopulations {
            pest_chance: 0.0,
            ..InitialPopulations::default()
        };
        let mut world = World::from_layout(&["L"], 1, EcologyParams::default(), &seeding).unwrap();
        let pos = Position::new(0, 0);
        let fish = world.population_of(pos, PopulationKind::Fish).unwrap();
        world.population_mut(fish).unwrap().health = 0.0;
        world.grid_mut().cell_mut(pos).unwrap().resource_level = 140.0;

        let mut ledger = CarbonLedger::default();
        let mut ctx = SystemContext {
            tick: 4,
            scenario_name: "test",
            carbon: &mut ledger,
        };
        let mut rngs = RngManager::new(1);
        BookkeepingSystem::new()
            .run(&mut ctx, &mut world, &mut rngs.stream("bookkeeping"))
            .unwrap();

        assert!(world.population(fish).is_none());
        assert_eq!(world.grid().cell(pos).unwrap().resource_level, 100.0);
        assert_eq!(world.bookkeeping().extinctions.len(), 1);
    }
}

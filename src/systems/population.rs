mod fish;
mod human;
mod pest;
mod tree;
mod wildlife;

use anyhow::Result;
use rand::Rng;

use crate::{
    engine::{System, SystemContext},
    population::{Allocation, Cadence, PopulationKind},
    rng::SystemRng,
    scheduler::WakeEvent,
    world::{PopulationId, World},
};

pub use human::found_city;

/// Drains the wake queue and runs each due routine.
pub struct PopulationSystem {
    due: Vec<WakeEvent>,
}

impl PopulationSystem {
    pub fn new() -> Self {
        Self { due: Vec::new() }
    }
}

impl Default for PopulationSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for PopulationSystem {
    fn name(&self) -> &str {
        "population"
    }

    fn run(
        &mut self,
        ctx: &mut SystemContext<'_>,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let now = ctx.tick;
        // Populations founded during this pass wait for the next tick.
        self.due.clear();
        while let Some(event) = world.wake_queue.pop_due(now) {
            self.due.push(event);
        }

        for event in self.due.drain(..) {
            let id = event.population;
            if !is_alive(world, id) {
                continue;
            }
            run_routine(world, id, event.cadence, ctx, rng)?;
            if is_alive(world, id) {
                world
                    .wake_queue
                    .schedule(id, event.cadence, now + event.cadence.period_days());
            }
        }

        world.sweep_extinct("decline");
        Ok(())
    }
}

fn is_alive(world: &World, id: PopulationId) -> bool {
    world.population(id).is_some_and(|p| !p.is_extinct())
}

/// Dispatches one routine by kind and cadence.
pub fn run_routine<R: Rng + ?Sized>(
    world: &mut World,
    id: PopulationId,
    cadence: Cadence,
    ctx: &mut SystemContext<'_>,
    rng: &mut R,
) -> Result<()> {
    let Some(kind) = world.population(id).map(|p| p.kind) else {
        return Ok(());
    };
    match (kind, cadence) {
        (PopulationKind::Humans, Cadence::Daily) => human::daily(world, id, ctx),
        (PopulationKind::Humans, Cadence::Weekly) => human::weekly(world, id),
        (PopulationKind::Trees, Cadence::Daily) => tree::daily(world, id, ctx),
        (PopulationKind::Trees, Cadence::Monthly) => tree::monthly(world, id, rng),
        (PopulationKind::Wildlife, Cadence::Daily) => wildlife::daily(world, id),
        (PopulationKind::Wildlife, Cadence::Monthly) => wildlife::monthly(world, id, rng),
        (PopulationKind::Fish, Cadence::Daily) => fish::daily(world, id),
        (PopulationKind::Pests, Cadence::Daily) => pest::daily(world, id, rng),
        _ => Ok(()),
    }
}

/// Takes this tick's grant, charging a health penalty for any shortfall.
fn feed(world: &mut World, id: PopulationId) -> Allocation {
    let penalty = world.params.starvation_health_penalty;
    let Some(population) = world.population_mut(id) else {
        return Allocation {
            requested: 0.0,
            granted: 0.0,
            quality: 1.0,
        };
    };
    let allocation = population.take_allocation();
    let shortfall = 1.0 - allocation.satisfaction();
    if shortfall > 0.0 {
        population.adjust_health(-penalty * shortfall);
    }
    allocation
}

/// Grows by `factor`, never past the kind's density cap.
fn grow_capped(world: &mut World, id: PopulationId, factor: f64) {
    if let Some(population) = world.population_mut(id) {
        let cap = population.kind.max_density();
        let grown = (population.size as f64 * factor).floor().max(0.0) as u64;
        population.size = grown.min(cap);
    }
}

fn scale(world: &mut World, id: PopulationId, factor: f64) {
    if let Some(population) = world.population_mut(id) {
        population.scale_size(factor);
    }
}

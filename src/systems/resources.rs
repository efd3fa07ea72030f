//! Resource regeneration and priority allocation.
//!
//! Allocation is a three-phase barrier: every living population registers
//! its request, each cell's pool is then split by priority tier, and only
//! after every grant is known are pools drawn down. Routines read their grant
//! later in the tick from `Population::allocation`.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    grid::{CellType, Grid, Position},
    population::{Allocation, Priority},
    rng::SystemRng,
    scenario::EcologyParams,
    world::{PopulationId, World},
};

/// Splits `available` among `(priority, amount)` requests.
///
/// Tiers are served from highest priority down. A tier whose total request
/// fits in the remaining pool is served in full; otherwise the pool is shared
/// in proportion to request size and lower tiers get nothing. Non-positive
/// requests receive nothing, and an empty request set allocates nothing.
pub fn allocate_pool(available: f64, requests: &[(Priority, f64)]) -> Vec<f64> {
    let mut grants = vec![0.0; requests.len()];
    let mut remaining = if available.is_finite() {
        available.max(0.0)
    } else {
        0.0
    };

    let mut tiers: BTreeMap<Priority, Vec<usize>> = BTreeMap::new();
    for (index, (priority, amount)) in requests.iter().enumerate() {
        if amount.is_finite() && *amount > 0.0 {
            tiers.entry(*priority).or_default().push(index);
        }
    }

    for members in tiers.values() {
        if remaining <= 0.0 {
            break;
        }
        let total: f64 = members.iter().map(|idx| requests[*idx].1).sum();
        if total <= remaining {
            for idx in members {
                grants[*idx] = requests[*idx].1;
            }
            remaining -= total;
        } else {
            for idx in members {
                grants[*idx] = requests[*idx].1 / total * remaining;
            }
            remaining = 0.0;
        }
    }
    grants
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceRequest {
    pub population: PopulationId,
    pub position: Position,
    pub priority: Priority,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grant {
    pub population: PopulationId,
    pub position: Position,
    pub allocation: Allocation,
}

/// Collects requests for one tick and distributes them per cell.
#[derive(Debug, Default)]
pub struct ResourceAllocator {
    requests: BTreeMap<usize, Vec<ResourceRequest>>,
}

impl ResourceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, grid: &Grid, request: ResourceRequest) {
        if let Some(index) = grid.index(request.position) {
            self.requests.entry(index).or_default().push(request);
        }
    }

    pub fn pending(&self) -> usize {
        self.requests.values().map(Vec::len).sum()
    }

    /// Splits each cell's pool without touching the grid.
    pub fn distribute(&mut self, grid: &Grid) -> Vec<Grant> {
        let mut grants = Vec::with_capacity(self.pending());
        for (index, requests) in std::mem::take(&mut self.requests) {
            let Some(cell) = grid.cells().get(index) else {
                continue;
            };
            let quality = cell.resource_quality();
            let asks: Vec<(Priority, f64)> = requests
                .iter()
                .map(|request| (request.priority, request.amount))
                .collect();
            let amounts = allocate_pool(cell.resource_level, &asks);
            for (request, granted) in requests.iter().zip(amounts) {
                grants.push(Grant {
                    population: request.population,
                    position: request.position,
                    allocation: Allocation {
                        requested: request.amount,
                        granted,
                        quality,
                    },
                });
            }
        }
        grants
    }
}

/// Registers every living population's daily need.
fn register_requests(world: &World, allocator: &mut ResourceAllocator, only: Option<Position>) {
    for id in world.population_ids() {
        let Some(population) = world.population(id) else {
            continue;
        };
        if population.is_extinct() || only.is_some_and(|pos| pos != population.position) {
            continue;
        }
        allocator.request(
            &world.grid,
            ResourceRequest {
                population: id,
                position: population.position,
                priority: population.kind.priority(),
                amount: population.daily_need(),
            },
        );
    }
}

/// Draws grants from their cells and stores them on the populations.
///
/// Consumption strips ground pollution in proportion to the share of the
/// pool consumed.
fn apply_grants(world: &mut World, grants: &[Grant]) {
    let mut drawn: BTreeMap<usize, f64> = BTreeMap::new();
    for grant in grants {
        if let Some(index) = world.grid.index(grant.position) {
            *drawn.entry(index).or_default() += grant.allocation.granted;
        }
        if let Some(population) = world.populations.get_mut(&grant.population) {
            population.allocation = Some(grant.allocation);
        }
    }
    for (index, amount) in drawn {
        let cell = &mut world.grid.cells_mut()[index];
        let prior = cell.resource_level;
        if prior > 0.0 && amount > 0.0 {
            let fraction = (amount / prior).min(1.0);
            cell.ground_pollution -= fraction * cell.ground_pollution;
            cell.resource_level = prior - amount;
        }
        cell.clamp();
    }
}

/// Allocates and consumes one cell's pool, returning what each resident got.
pub fn consume_resources(world: &mut World, pos: Position) -> Vec<(PopulationId, f64)> {
    let mut allocator = ResourceAllocator::new();
    register_requests(world, &mut allocator, Some(pos));
    let grants = allocator.distribute(&world.grid);
    apply_grants(world, &grants);
    grants
        .iter()
        .map(|grant| (grant.population, grant.allocation.granted))
        .collect()
}

/// One day of regeneration for every cell, in row-major order.
///
/// Land and forest cells irrigate from the fullest adjacent lake when it
/// holds enough water; otherwise they fall back to reduced rates.
pub fn regenerate_resources(grid: &mut Grid, params: &EcologyParams) {
    let rates = &params.regeneration;
    let irrigation = &params.irrigation;
    for index in 0..grid.len() {
        let Some(pos) = grid.position_of(index) else {
            continue;
        };
        let (cell_type, health) = {
            let cell = &grid.cells()[index];
            (cell.cell_type, cell.health)
        };
        let health_factor = (health / 100.0).clamp(0.0, 1.0);

        let gain = match cell_type {
            CellType::City => rates.city * health_factor,
            CellType::Lake => rates.lake * health_factor,
            CellType::Land => match grid.adjacent_lake_with(pos, irrigation.land_draw) {
                Some(lake) => {
                    draw_water(grid, lake, irrigation.land_draw);
                    let cell = &mut grid.cells_mut()[index];
                    cell.ground_pollution -= irrigation.land_draw * irrigation.cleaning_per_unit;
                    rates.land * irrigation.land_boost * health_factor
                }
                None => rates.land * health_factor,
            },
            CellType::Forest => match grid.adjacent_lake_with(pos, irrigation.forest_draw) {
                Some(lake) => {
                    draw_water(grid, lake, irrigation.forest_draw);
                    rates.forest * health_factor
                }
                None => rates.forest * irrigation.forest_drought_factor * health_factor,
            },
        };

        let cell = &mut grid.cells_mut()[index];
        cell.resource_level += gain;
        cell.clamp();
    }
}

fn draw_water(grid: &mut Grid, lake: Position, amount: f64) {
    if let Some(cell) = grid.cell_mut(lake) {
        cell.resource_level -= amount;
        cell.clamp();
    }
}

pub struct ResourceSystem {
    allocator: ResourceAllocator,
}

impl ResourceSystem {
    pub fn new() -> Self {
        Self {
            allocator: ResourceAllocator::new(),
        }
    }
}

impl Default for ResourceSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ResourceSystem {
    fn name(&self) -> &str {
        "resources"
    }

    fn run(
        &mut self,
        _ctx: &mut SystemContext<'_>,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let params = world.params.clone();
        regenerate_resources(&mut world.grid, &params);

        register_requests(world, &mut self.allocator, None);
        let grants = self.allocator.distribute(&world.grid);
        apply_grants(world, &grants);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::PopulationKind;
    use crate::scenario::InitialPopulations;

    fn bare_world(rows: &[&str]) -> World {
        let seeding = InitialPopulations {
            humans: 0,
            trees: 0,
            wildlife: 0,
            fish: 0,
            pests: 0,
            pest_chance: 0.0,
        };
        World::from_layout(rows, 1, EcologyParams::default(), &seeding).unwrap()
    }

    #[test]
    fn single_consumer_drains_a_short_pool() {
        let grants = allocate_pool(30.0, &[(Priority::High, 50.0)]);
        assert_eq!(grants, vec![30.0]);
    }

    #[test]
    fn same_tier_splits_in_proportion() {
        let grants = allocate_pool(30.0, &[(Priority::High, 10.0), (Priority::High, 50.0)]);
        assert!((grants[0] - 5.0).abs() < 1e-9);
        assert!((grants[1] - 25.0).abs() < 1e-9);
    }

    #[test]
    fn lower_tiers_wait_for_higher_ones() {
        let grants = allocate_pool(
            40.0,
            &[
                (Priority::Low, 10.0),
                (Priority::Highest, 30.0),
                (Priority::Medium, 20.0),
            ],
        );
        assert_eq!(grants[1], 30.0);
        assert_eq!(grants[2], 10.0);
        assert_eq!(grants[0], 0.0);
    }

    #[test]
    fn empty_requests_allocate_nothing() {
        assert!(allocate_pool(10.0, &[]).is_empty());
        assert_eq!(
            allocate_pool(10.0, &[(Priority::High, 0.0), (Priority::Low, 0.0)]),
            vec![0.0, 0.0]
        );
    }

    #[test]
    fn consumption_respects_kind_priority() {
        let mut world = bare_world(&["C"]);
        let pos = Position::new(0, 0);
        world.grid_mut().cell_mut(pos).unwrap().resource_level = 2.5;
        let humans = world.settle(PopulationKind::Humans, pos, 500, 100.0).unwrap();
        let pests = world.settle(PopulationKind::Pests, pos, 250, 100.0).unwrap();

        let consumed = consume_resources(&mut world, pos);
        let got = |id| consumed.iter().find(|(p, _)| *p == id).map(|(_, a)| *a);
        // 500 * 0.004 first, then 250 * 0.002 from what is left
        assert!((got(humans).unwrap() - 2.0).abs() < 1e-9);
        assert!((got(pests).unwrap() - 0.5).abs() < 1e-9);
        assert!(world.grid().cell(pos).unwrap().resource_level.abs() < 1e-9);
        let allocation = world.population(pests).unwrap().allocation.unwrap();
        assert!((allocation.satisfaction() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn consumption_strips_ground_pollution() {
        let mut world = bare_world(&["L"]);
        let pos = Position::new(0, 0);
        {
            let cell = world.grid_mut().cell_mut(pos).unwrap();
            cell.resource_level = 40.0;
            cell.ground_pollution = 20.0;
        }
        let fish = world.settle(PopulationKind::Fish, pos, 800, 100.0).unwrap();
        world.population_mut(fish).unwrap().resource_consumption_rate = 0.0125;
        consume_resources(&mut world, pos);
        let cell = world.grid().cell(pos).unwrap();
        assert!((cell.resource_level - 30.0).abs() < 1e-9);
        assert!((cell.ground_pollution - 15.0).abs() < 1e-9);
    }

    #[test]
    fn land_irrigates_from_a_full_lake() {
        let mut grid = Grid::from_layout(&["L."]).unwrap();
        {
            let land = grid.cell_mut(Position::new(1, 0)).unwrap();
            land.resource_level = 10.0;
            land.ground_pollution = 5.0;
        }
        regenerate_resources(&mut grid, &EcologyParams::default());
        let lake = grid.cell(Position::new(0, 0)).unwrap();
        let land = grid.cell(Position::new(1, 0)).unwrap();
        assert!((lake.resource_level - 32.5).abs() < 1e-9);
        assert!((land.resource_level - 13.0).abs() < 1e-9);
        assert!((land.ground_pollution - 3.0).abs() < 1e-9);
    }

    #[test]
    fn dry_forest_regrows_at_half_rate() {
        let mut grid = Grid::from_layout(&["F."]).unwrap();
        grid.cell_mut(Position::new(0, 0)).unwrap().resource_level = 10.0;
        regenerate_resources(&mut grid, &EcologyParams::default());
        assert!((grid.cell(Position::new(0, 0)).unwrap().resource_level - 11.5).abs() < 1e-9);
    }
}

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::grid::{CellType, Grid, GridError, Position, MAX_HEALTH};
use crate::population::{profile, Population, PopulationKind};
use crate::rng::RngManager;
use crate::scenario::{CellComposition, EcologyParams, InitialPopulations};
use crate::scheduler::WakeQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PopulationId(u64);

impl PopulationId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtinctionRecord {
    pub tick: u64,
    pub kind: PopulationKind,
    pub position: Position,
    pub cause: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub tick: u64,
    pub position: Position,
    pub from: CellType,
    pub to: CellType,
}

/// Events recorded during the current tick.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BookkeepingState {
    pub extinctions: Vec<ExtinctionRecord>,
    pub conversions: Vec<ConversionRecord>,
    pub total_extinctions: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub id: u64,
    pub kind: PopulationKind,
    pub size: u64,
    pub health: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub x: u32,
    pub y: u32,
    pub cell_type: CellType,
    pub air_pollution: f64,
    pub ground_pollution: f64,
    pub health: f64,
    pub resource_level: f64,
    pub populations: Vec<PopulationSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub scenario: String,
    pub tick: u64,
    pub width: u32,
    pub height: u32,
    pub co2_level: f64,
    pub total_population: u64,
    pub total_pollution: f64,
    pub population_counts: BTreeMap<String, u64>,
    pub extinctions: Vec<ExtinctionRecord>,
    pub cells: Vec<CellSnapshot>,
}

#[derive(Debug, Clone)]
pub struct World {
    next_population: u64,
    tick: u64,
    pub(crate) grid: Grid,
    pub(crate) params: EcologyParams,
    pub(crate) populations: HashMap<PopulationId, Population>,
    pub(crate) wake_queue: WakeQueue,
    pub(crate) bookkeeping: BookkeepingState,
}

/// Random world using the default composition and starting populations.
pub fn initialize_grid(
    width: u32,
    height: u32,
    seed: u64,
    params: EcologyParams,
) -> Result<World, GridError> {
    initialize_grid_with(
        width,
        height,
        seed,
        params,
        &CellComposition::default(),
        &InitialPopulations::default(),
    )
}

pub fn initialize_grid_with(
    width: u32,
    height: u32,
    seed: u64,
    params: EcologyParams,
    composition: &CellComposition,
    seeding: &InitialPopulations,
) -> Result<World, GridError> {
    let mut grid = Grid::new(width, height)?;
    let mut rngs = RngManager::new(seed);
    let mut rng = rngs.stream("terrain");
    for cell in grid.cells_mut() {
        cell.cell_type = draw_cell_type(&mut rng, composition);
    }
    let mut world = World::new(grid, params);
    world.seed_populations(seeding, &mut rng)?;
    Ok(world)
}

fn draw_cell_type<R: Rng + ?Sized>(rng: &mut R, composition: &CellComposition) -> CellType {
    let weights = [
        (CellType::City, composition.city.max(0.0)),
        (CellType::Forest, composition.forest.max(0.0)),
        (CellType::Lake, composition.lake.max(0.0)),
        (CellType::Land, composition.land.max(0.0)),
    ];
    let total: f64 = weights.iter().map(|(_, weight)| weight).sum();
    if !(total > 0.0) {
        return CellType::Land;
    }
    let mut roll = rng.gen::<f64>() * total;
    for (cell_type, weight) in weights {
        if roll < weight {
            return cell_type;
        }
        roll -= weight;
    }
    CellType::Land
}

impl World {
    pub fn new(grid: Grid, params: EcologyParams) -> Self {
        Self {
            next_population: 0,
            tick: 0,
            grid,
            params,
            populations: HashMap::new(),
            wake_queue: WakeQueue::new(),
            bookkeeping: BookkeepingState::default(),
        }
    }

    /// World with an explicit layout, seeded with the starting populations.
    pub fn from_layout<S: AsRef<str>>(
        rows: &[S],
        seed: u64,
        params: EcologyParams,
        seeding: &InitialPopulations,
    ) -> Result<Self, GridError> {
        let grid = Grid::from_layout(rows)?;
        let mut world = Self::new(grid, params);
        let mut rngs = RngManager::new(seed);
        world.seed_populations(seeding, &mut rngs.stream("terrain"))?;
        Ok(world)
    }

    fn seed_populations<R: Rng + ?Sized>(
        &mut self,
        seeding: &InitialPopulations,
        rng: &mut R,
    ) -> Result<(), GridError> {
        let plan: Vec<(Position, CellType)> = self
            .grid
            .cells()
            .iter()
            .map(|cell| (cell.position, cell.cell_type))
            .collect();
        for (pos, cell_type) in plan {
            for kind in PopulationKind::ALL {
                let size = seeding.size(kind);
                if size == 0 || profile(kind).home != cell_type {
                    continue;
                }
                if kind == PopulationKind::Pests
                    && !rng.gen_bool(seeding.pest_chance.clamp(0.0, 1.0))
                {
                    continue;
                }
                self.settle(kind, pos, size, MAX_HEALTH)?;
            }
        }
        Ok(())
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn advance_time(&mut self) {
        self.tick += 1;
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    pub fn params(&self) -> &EcologyParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut EcologyParams {
        &mut self.params
    }

    pub fn bookkeeping(&self) -> &BookkeepingState {
        &self.bookkeeping
    }

    /// Clears the per-tick event logs.
    pub fn begin_tick(&mut self) {
        self.bookkeeping.extinctions.clear();
        self.bookkeeping.conversions.clear();
    }

    /// Places a population in a cell, merging with a resident of the same
    /// kind (sizes add, health is size-weighted). The result never exceeds
    /// the kind's density cap.
    pub fn settle(
        &mut self,
        kind: PopulationKind,
        pos: Position,
        size: u64,
        health: f64,
    ) -> Result<PopulationId, GridError> {
        let index = self.grid.index(pos).ok_or(GridError::OutOfBounds(pos))?;
        let health = if health.is_finite() {
            health.clamp(0.0, MAX_HEALTH)
        } else {
            0.0
        };

        if let Some(existing) = self.population_of(pos, kind) {
            if let Some(resident) = self.populations.get_mut(&existing) {
                let total = resident.size + size;
                if total > 0 {
                    resident.health = (resident.health * resident.size as f64
                        + health * size as f64)
                        / total as f64;
                }
                resident.size = total.min(kind.max_density());
                return Ok(existing);
            }
        }

        let size = size.min(kind.max_density());
        let id = self.allocate();
        self.grid.cells_mut()[index].populations.push(id);
        self.populations.insert(
            id,
            Population {
                id,
                kind,
                position: pos,
                size,
                health,
                resource_consumption_rate: self.params.consumption.rate(kind),
                pollution_generation_rate: match kind {
                    PopulationKind::Humans => self.params.humans.emission_rate,
                    _ => 0.0,
                },
                allocation: None,
            },
        );
        self.wake_queue
            .schedule_cadences(id, self.tick, profile(kind).cadences);
        Ok(id)
    }

    pub fn remove_population(&mut self, id: PopulationId) -> Option<Population> {
        let population = self.populations.remove(&id)?;
        if let Some(cell) = self.grid.cell_mut(population.position) {
            cell.populations.retain(|resident| *resident != id);
        }
        Some(population)
    }

    /// Removes a population and records its extinction.
    pub fn retire(&mut self, id: PopulationId, cause: &str) -> Option<Population> {
        let population = self.remove_population(id)?;
        info!(
            kind = population.kind.label(),
            x = population.position.x,
            y = population.position.y,
            cause,
            "population extinct"
        );
        self.bookkeeping.extinctions.push(ExtinctionRecord {
            tick: self.tick,
            kind: population.kind,
            position: population.position,
            cause: cause.to_string(),
        });
        self.bookkeeping.total_extinctions += 1;
        Some(population)
    }

    /// Retires every extinct population, returning how many were removed.
    pub fn sweep_extinct(&mut self, cause: &str) -> usize {
        let extinct: Vec<PopulationId> = self
            .population_ids()
            .into_iter()
            .filter(|id| self.populations.get(id).is_some_and(|p| p.is_extinct()))
            .collect();
        for id in &extinct {
            self.retire(*id, cause);
        }
        extinct.len()
    }

    /// Moves a whole population, merging into a resident of the same kind.
    pub fn relocate(&mut self, id: PopulationId, to: Position) -> Result<PopulationId, GridError> {
        self.grid.try_cell(to)?;
        let Some(population) = self.remove_population(id) else {
            return Ok(id);
        };
        self.settle(population.kind, to, population.size, population.health)
    }

    /// Changes a cell's type, resetting its land-use counters.
    pub fn convert_cell(&mut self, pos: Position, to: CellType) -> Result<(), GridError> {
        let tick = self.tick;
        let cell = self.grid.try_cell_mut(pos)?;
        let from = cell.cell_type;
        if from == to {
            return Ok(());
        }
        cell.cell_type = to;
        cell.days_unused = 0;
        cell.abandonment_days = 0;
        info!(
            x = pos.x,
            y = pos.y,
            from = from.label(),
            to = to.label(),
            "cell converted"
        );
        self.bookkeeping.conversions.push(ConversionRecord {
            tick,
            position: pos,
            from,
            to,
        });
        Ok(())
    }

    pub fn population(&self, id: PopulationId) -> Option<&Population> {
        self.populations.get(&id)
    }

    pub fn population_mut(&mut self, id: PopulationId) -> Option<&mut Population> {
        self.populations.get_mut(&id)
    }

    pub fn population_ids(&self) -> Vec<PopulationId> {
        let mut ids: Vec<_> = self.populations.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn populations_at(&self, pos: Position) -> Vec<&Population> {
        self.grid
            .cell(pos)
            .map(|cell| {
                cell.populations
                    .iter()
                    .filter_map(|id| self.populations.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn population_of(&self, pos: Position, kind: PopulationKind) -> Option<PopulationId> {
        self.populations_at(pos)
            .into_iter()
            .find(|population| population.kind == kind)
            .map(|population| population.id)
    }

    pub fn size_of(&self, pos: Position, kind: PopulationKind) -> u64 {
        self.population_of(pos, kind)
            .and_then(|id| self.populations.get(&id))
            .map(|population| population.size)
            .unwrap_or(0)
    }

    pub fn total_population(&self) -> u64 {
        self.populations.values().map(|p| p.size).sum()
    }

    pub fn population_counts(&self) -> BTreeMap<PopulationKind, u64> {
        let mut counts: BTreeMap<PopulationKind, u64> =
            PopulationKind::ALL.iter().map(|kind| (*kind, 0)).collect();
        for population in self.populations.values() {
            *counts.entry(population.kind).or_default() += population.size;
        }
        counts
    }

    pub fn cell_counts(&self) -> BTreeMap<CellType, usize> {
        CellType::ALL
            .iter()
            .map(|cell_type| (*cell_type, self.grid.count_type(*cell_type)))
            .collect()
    }

    pub fn total_pollution(&self) -> f64 {
        self.grid.cells().iter().map(|cell| cell.total_pollution()).sum()
    }

    pub fn average_pollution(&self) -> f64 {
        self.total_pollution() / self.grid.len().max(1) as f64
    }

    pub fn average_health(&self) -> f64 {
        let sum: f64 = self.grid.cells().iter().map(|cell| cell.health).sum();
        sum / self.grid.len().max(1) as f64
    }

    pub fn snapshot(&self, scenario: &str, co2_level: f64) -> WorldSnapshot {
        let cells = self
            .grid
            .cells()
            .iter()
            .map(|cell| {
                let mut populations: Vec<PopulationSnapshot> = cell
                    .populations
                    .iter()
                    .filter_map(|id| self.populations.get(id))
                    .map(|population| PopulationSnapshot {
                        id: population.id.raw(),
                        kind: population.kind,
                        size: population.size,
                        health: population.health,
                    })
                    .collect();
                populations.sort_by_key(|p| p.id);
                CellSnapshot {
                    x: cell.position.x,
                    y: cell.position.y,
                    cell_type: cell.cell_type,
                    air_pollution: cell.air_pollution,
                    ground_pollution: cell.ground_pollution,
                    health: cell.health,
                    resource_level: cell.resource_level,
                    populations,
                }
            })
            .collect();
        WorldSnapshot {
            scenario: scenario.to_string(),
            tick: self.tick,
            width: self.grid.width(),
            height: self.grid.height(),
            co2_level,
            total_population: self.total_population(),
            total_pollution: self.total_pollution(),
            population_counts: self
                .population_counts()
                .into_iter()
                .map(|(kind, count)| (kind.label().to_string(), count))
                .collect(),
            extinctions: self.bookkeeping.extinctions.clone(),
            cells,
        }
    }

    fn allocate(&mut self) -> PopulationId {
        let id = PopulationId(self.next_population);
        self.next_population += 1;
        id
    }
}

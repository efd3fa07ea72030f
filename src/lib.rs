pub mod engine;
pub mod export;
pub mod grid;
pub mod population;
pub mod rng;
pub mod scenario;
pub mod scheduler;
pub mod snapshot;
pub mod systems;
pub mod web;
pub mod world;

pub use engine::{CarbonLedger, Engine, EngineBuilder, EngineSettings, TickSummary};
pub use grid::{Cell, CellType, Grid, Position};
pub use population::{Population, PopulationKind};
pub use scenario::{Scenario, ScenarioLoader};
pub use world::{initialize_grid, World};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    grid::CellType,
    population::PopulationKind,
    rng::{RngManager, SystemRng},
    scenario::Scenario,
    snapshot::SnapshotWriter,
    systems::{
        BookkeepingSystem, LandUseSystem, PollutionSystem, PopulationSystem, ResourceSystem,
        WaterSystem,
    },
    world::{ExtinctionRecord, World},
};

pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    pub snapshot_interval_ticks: u64,
    pub snapshot_dir: PathBuf,
    pub initial_co2: f64,
    /// Ticks between progress log lines; 0 disables them.
    pub progress_interval_ticks: u64,
}

impl EngineSettings {
    pub fn for_scenario(scenario: &Scenario, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            scenario_name: scenario.name.clone(),
            seed: scenario.seed,
            snapshot_interval_ticks: scenario.snapshot_interval_ticks,
            snapshot_dir: snapshot_dir.into(),
            initial_co2: scenario.ecology.initial_co2_level,
            progress_interval_ticks: scenario.logging.progress_interval_days,
        }
    }
}

/// Simulation-wide CO2 level, floored at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CarbonLedger {
    level: f64,
}

impl CarbonLedger {
    pub fn new(level: f64) -> Self {
        Self {
            level: level.max(0.0),
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn emit(&mut self, amount: f64) {
        if amount.is_finite() && amount > 0.0 {
            self.level += amount;
        }
    }

    pub fn absorb(&mut self, amount: f64) {
        if amount.is_finite() && amount > 0.0 {
            self.level = (self.level - amount).max(0.0);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemRunReport {
    pub name: String,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub tick: u64,
    pub total_co2: f64,
    pub total_pollution: f64,
    pub population_counts: BTreeMap<PopulationKind, u64>,
    pub cell_counts: BTreeMap<CellType, usize>,
    pub extinctions: Vec<ExtinctionRecord>,
    pub conversions: usize,
    pub system_reports: Vec<SystemRunReport>,
}

impl TickSummary {
    pub fn total_population(&self) -> u64 {
        self.population_counts.values().sum()
    }
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
        }
    }

    /// Builder with every phase installed in tick order.
    pub fn standard(settings: EngineSettings) -> Self {
        Self::new(settings)
            .with_system(PollutionSystem::new())
            .with_system(WaterSystem::new())
            .with_system(ResourceSystem::new())
            .with_system(PopulationSystem::new())
            .with_system(LandUseSystem::new())
            .with_system(BookkeepingSystem::new())
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn push_system(&mut self, system: impl System + 'static) {
        self.systems.push(Box::new(system));
    }

    pub fn build(self) -> Engine {
        Engine {
            rng: RngManager::new(self.settings.seed),
            carbon: CarbonLedger::new(self.settings.initial_co2),
            systems: self.systems,
            snapshot_writer: SnapshotWriter::new(
                &self.settings.snapshot_dir,
                self.settings.snapshot_interval_ticks,
            ),
            settings: self.settings,
        }
    }
}

pub struct Engine {
    rng: RngManager,
    carbon: CarbonLedger,
    systems: Vec<Box<dyn System>>,
    snapshot_writer: SnapshotWriter,
    settings: EngineSettings,
}

impl Engine {
    pub fn carbon(&self) -> &CarbonLedger {
        &self.carbon
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|system| system.name()).collect()
    }

    /// Runs every system once, in order, then advances the clock.
    pub fn advance_tick(&mut self, world: &mut World) -> Result<TickSummary> {
        world.begin_tick();
        let current_tick = world.tick();
        let mut system_reports = Vec::with_capacity(self.systems.len());

        for system in &mut self.systems {
            let mut rng_stream = self.rng.stream(system.name());
            let mut ctx = SystemContext {
                tick: current_tick,
                scenario_name: &self.settings.scenario_name,
                carbon: &mut self.carbon,
            };
            let started = Instant::now();
            system
                .run(&mut ctx, world, &mut rng_stream)
                .with_context(|| {
                    format!("system '{}' failed at tick {current_tick}", system.name())
                })?;
            system_reports.push(SystemRunReport {
                name: system.name().to_string(),
                duration_ms: started.elapsed().as_secs_f64() * 1_000.0,
            });
        }

        world.advance_time();
        self.snapshot_writer
            .maybe_write(world, &self.settings.scenario_name, self.carbon.level())?;

        let summary = TickSummary {
            tick: world.tick(),
            total_co2: self.carbon.level(),
            total_pollution: world.total_pollution(),
            population_counts: world.population_counts(),
            cell_counts: world.cell_counts(),
            extinctions: world.bookkeeping().extinctions.clone(),
            conversions: world.bookkeeping().conversions.len(),
            system_reports,
        };
        debug!(
            tick = summary.tick,
            co2 = summary.total_co2,
            pollution = summary.total_pollution,
            population = summary.total_population(),
            extinctions = summary.extinctions.len(),
            "tick complete"
        );
        Ok(summary)
    }

    pub fn run(&mut self, world: &mut World, ticks: u64) -> Result<()> {
        self.run_with_hook(world, ticks, |_, _| {})
    }

    pub fn run_with_hook<F>(&mut self, world: &mut World, ticks: u64, mut hook: F) -> Result<()>
    where
        F: FnMut(&TickSummary, &World),
    {
        for _ in 0..ticks {
            let summary = self.advance_tick(world)?;
            let interval = self.settings.progress_interval_ticks;
            if interval > 0 && summary.tick % interval == 0 {
                info!(
                    scenario = %self.settings.scenario_name,
                    day = summary.tick,
                    population = summary.total_population(),
                    co2 = summary.total_co2,
                    pollution = summary.total_pollution,
                    "progress"
                );
            }
            hook(&summary, world);
        }
        Ok(())
    }
}

pub struct SystemContext<'a> {
    pub tick: u64,
    pub scenario_name: &'a str,
    pub carbon: &'a mut CarbonLedger,
}

pub trait System: Send {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &mut SystemContext<'_>,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()>;
}

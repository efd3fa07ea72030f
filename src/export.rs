//! Per-tick data collection and CSV/JSON run export.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;

use crate::{
    engine::TickSummary,
    grid::{CellType, Position},
    population::PopulationKind,
    scenario::Scenario,
    world::World,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalRow {
    pub step: u64,
    pub co2_level: f64,
    pub total_population: u64,
    pub average_pollution: f64,
    pub average_health: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellRow {
    pub step: u64,
    pub position: Position,
    pub health_level: f64,
    pub resource_level: f64,
    pub air_pollution: f64,
    pub ground_pollution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationRow {
    pub step: u64,
    pub position: Position,
    pub cell_type: CellType,
    pub size: u64,
    pub health_level: f64,
    pub resource_consumption: f64,
    pub pollution_generation: f64,
}

/// Accumulates rows after every tick for export at the end of a run.
#[derive(Debug, Default)]
pub struct DataCollector {
    global: Vec<GlobalRow>,
    cells: BTreeMap<CellType, Vec<CellRow>>,
    populations: BTreeMap<PopulationKind, Vec<PopulationRow>>,
}

impl DataCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, summary: &TickSummary, world: &World) {
        let step = summary.tick;
        self.global.push(GlobalRow {
            step,
            co2_level: summary.total_co2,
            total_population: summary.total_population(),
            average_pollution: world.average_pollution(),
            average_health: world.average_health(),
        });

        for cell in world.grid().cells() {
            self.cells.entry(cell.cell_type).or_default().push(CellRow {
                step,
                position: cell.position,
                health_level: cell.health,
                resource_level: cell.resource_level,
                air_pollution: cell.air_pollution,
                ground_pollution: cell.ground_pollution,
            });
            for population in world.populations_at(cell.position) {
                self.populations
                    .entry(population.kind)
                    .or_default()
                    .push(PopulationRow {
                        step,
                        position: cell.position,
                        cell_type: cell.cell_type,
                        size: population.size,
                        health_level: population.health,
                        resource_consumption: population.resource_consumption_rate,
                        pollution_generation: population.pollution_generation_rate,
                    });
            }
        }
    }

    pub fn global_rows(&self) -> &[GlobalRow] {
        &self.global
    }

    pub fn cell_rows(&self, cell_type: CellType) -> &[CellRow] {
        self.cells.get(&cell_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn population_rows(&self, kind: PopulationKind) -> &[PopulationRow] {
        self.populations.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Files written by one export.
#[derive(Debug, Clone)]
pub struct ExportedFiles {
    pub global_metrics: PathBuf,
    pub cell_data: BTreeMap<CellType, PathBuf>,
    pub population_metrics: BTreeMap<PopulationKind, PathBuf>,
    pub config: PathBuf,
}

pub struct CsvExporter {
    output_dir: PathBuf,
}

impl CsvExporter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// `runs/run_<timestamp>` under `base`.
    pub fn timestamped(base: impl AsRef<Path>) -> Self {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        Self::new(base.as_ref().join(format!("run_{stamp}")))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes every table plus the scenario dump. Empty tables still get a
    /// header row so readers can rely on the file set.
    pub fn export_all(&self, collector: &DataCollector, scenario: &Scenario) -> Result<ExportedFiles> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create export dir {}", self.output_dir.display())
        })?;

        let global_metrics = self.export_global(collector)?;
        let mut cell_data = BTreeMap::new();
        for cell_type in CellType::ALL {
            cell_data.insert(cell_type, self.export_cells(collector, cell_type)?);
        }
        let mut population_metrics = BTreeMap::new();
        for kind in PopulationKind::ALL {
            population_metrics.insert(kind, self.export_populations(collector, kind)?);
        }
        let config = self.export_config(scenario)?;

        Ok(ExportedFiles {
            global_metrics,
            cell_data,
            population_metrics,
            config,
        })
    }

    fn export_global(&self, collector: &DataCollector) -> Result<PathBuf> {
        let path = self.output_dir.join("global_metrics.csv");
        let mut out = self.create(&path)?;
        writeln!(out, "step,co2_level,total_population,average_pollution,average_health")?;
        for row in collector.global_rows() {
            writeln!(
                out,
                "{},{},{},{},{}",
                row.step, row.co2_level, row.total_population, row.average_pollution, row.average_health
            )?;
        }
        out.flush()?;
        Ok(path)
    }

    fn export_cells(&self, collector: &DataCollector, cell_type: CellType) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("cell_data_{}.csv", cell_type.label()));
        let mut out = self.create(&path)?;
        writeln!(
            out,
            "step,x,y,health_level,resource_level,air_pollution,ground_pollution"
        )?;
        for row in collector.cell_rows(cell_type) {
            writeln!(
                out,
                "{},{},{},{},{},{},{}",
                row.step,
                row.position.x,
                row.position.y,
                row.health_level,
                row.resource_level,
                row.air_pollution,
                row.ground_pollution
            )?;
        }
        out.flush()?;
        Ok(path)
    }

    fn export_populations(&self, collector: &DataCollector, kind: PopulationKind) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("population_{}.csv", kind.label()));
        let mut out = self.create(&path)?;
        writeln!(
            out,
            "step,x,y,cell_type,population_size,health_level,resource_consumption,pollution_generation"
        )?;
        for row in collector.population_rows(kind) {
            writeln!(
                out,
                "{},{},{},{},{},{},{},{}",
                row.step,
                row.position.x,
                row.position.y,
                row.cell_type.label(),
                row.size,
                row.health_level,
                row.resource_consumption,
                row.pollution_generation
            )?;
        }
        out.flush()?;
        Ok(path)
    }

    fn export_config(&self, scenario: &Scenario) -> Result<PathBuf> {
        let path = self.output_dir.join("config.json");
        let json = serde_json::to_string_pretty(scenario)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(path)
    }

    fn create(&self, path: &Path) -> Result<BufWriter<File>> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineBuilder, EngineSettings};

    fn small_scenario() -> Scenario {
        let yaml = r#"
name: export-check
seed: 5
layout:
  - "C.F"
  - ".LL"
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    fn collect(scenario: &Scenario, ticks: u64) -> DataCollector {
        let mut world = scenario.build_world().unwrap();
        let settings = EngineSettings {
            snapshot_interval_ticks: 0,
            progress_interval_ticks: 0,
            ..EngineSettings::for_scenario(scenario, "unused")
        };
        let mut engine = EngineBuilder::standard(settings).build();
        let mut collector = DataCollector::new();
        engine
            .run_with_hook(&mut world, ticks, |summary, world| {
                collector.record(summary, world)
            })
            .unwrap();
        collector
    }

    #[test]
    fn collector_keys_rows_by_step_and_cell_type() {
        let scenario = small_scenario();
        let collector = collect(&scenario, 3);
        assert_eq!(collector.global_rows().len(), 3);
        assert_eq!(collector.global_rows()[0].step, 1);
        assert_eq!(collector.cell_rows(CellType::Lake).len(), 6);
        assert!(collector
            .population_rows(PopulationKind::Fish)
            .iter()
            .all(|row| row.cell_type == CellType::Lake));
    }

    #[test]
    fn export_writes_every_table() {
        let scenario = small_scenario();
        let collector = collect(&scenario, 2);
        let temp = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(temp.path().join("run"));
        let files = exporter.export_all(&collector, &scenario).unwrap();

        let global = fs::read_to_string(&files.global_metrics).unwrap();
        assert_eq!(global.lines().count(), 3);
        assert!(global.starts_with("step,co2_level"));
        assert_eq!(files.cell_data.len(), 4);
        assert_eq!(files.population_metrics.len(), 5);
        assert!(temp.path().join("run/cell_data_forest.csv").exists());
        assert!(temp.path().join("run/population_humans.csv").exists());

        let config: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&files.config).unwrap()).unwrap();
        assert_eq!(config["name"], "export-check");
    }
}

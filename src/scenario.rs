use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::{Grid, GridError};
use crate::population::PopulationKind;
use crate::world::World;

fn default_ticks() -> u64 {
    365
}

fn default_snapshot_interval_ticks() -> u64 {
    30
}

fn default_width() -> u32 {
    24
}

fn default_height() -> u32 {
    16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub seed: u64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub ticks: Option<u64>,
    #[serde(default = "default_snapshot_interval_ticks")]
    pub snapshot_interval_ticks: u64,
    /// Explicit map rows (`C` city, `F` forest, `L` lake, `.` land).
    #[serde(default)]
    pub layout: Option<Vec<String>>,
    #[serde(default)]
    pub composition: CellComposition,
    #[serde(default)]
    pub seeding: InitialPopulations,
    #[serde(default)]
    pub ecology: EcologyParams,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relative weights used when cell types are drawn at random.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CellComposition {
    pub city: f64,
    pub forest: f64,
    pub lake: f64,
    pub land: f64,
}

impl Default for CellComposition {
    fn default() -> Self {
        Self {
            city: 0.10,
            forest: 0.30,
            lake: 0.20,
            land: 0.40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialPopulations {
    pub humans: u64,
    pub trees: u64,
    pub wildlife: u64,
    pub fish: u64,
    pub pests: u64,
    /// Chance that a land cell starts with a pest population.
    pub pest_chance: f64,
}

impl InitialPopulations {
    pub fn size(&self, kind: PopulationKind) -> u64 {
        match kind {
            PopulationKind::Humans => self.humans,
            PopulationKind::Wildlife => self.wildlife,
            PopulationKind::Fish => self.fish,
            PopulationKind::Pests => self.pests,
            PopulationKind::Trees => self.trees,
        }
    }
}

impl Default for InitialPopulations {
    fn default() -> Self {
        Self {
            humans: 500,
            trees: 250,
            wildlife: 120,
            fish: 320,
            pests: 60,
            pest_chance: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub progress_interval_days: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            progress_interval_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EcologyParams {
    pub initial_co2_level: f64,
    pub starvation_health_penalty: f64,
    pub pollution: PollutionParams,
    pub thresholds: HealthThresholds,
    pub regeneration: CellRates,
    pub irrigation: IrrigationParams,
    pub growth: GrowthThresholds,
    pub conversion: ConversionParams,
    pub consumption: KindRates,
    pub humans: HumanParams,
    pub trees: TreeParams,
    pub wildlife: WildlifeParams,
    pub fish: FishParams,
    pub pests: PestParams,
}

impl Default for EcologyParams {
    fn default() -> Self {
        Self {
            initial_co2_level: 0.0,
            starvation_health_penalty: 5.0,
            pollution: PollutionParams::default(),
            thresholds: HealthThresholds::default(),
            regeneration: CellRates::default(),
            irrigation: IrrigationParams::default(),
            growth: GrowthThresholds::default(),
            conversion: ConversionParams::default(),
            consumption: KindRates::default(),
            humans: HumanParams::default(),
            trees: TreeParams::default(),
            wildlife: WildlifeParams::default(),
            fish: FishParams::default(),
            pests: PestParams::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollutionParams {
    pub air_spread_rate: f64,
    pub ground_spread_rate: f64,
    pub air_to_ground_rate: f64,
    pub base_decay_rate: f64,
}

impl Default for PollutionParams {
    fn default() -> Self {
        Self {
            air_spread_rate: 0.4,
            ground_spread_rate: 0.1,
            air_to_ground_rate: 0.2,
            base_decay_rate: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub critical: f64,
    pub poor: f64,
    pub good: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            critical: 20.0,
            poor: 50.0,
            good: 80.0,
        }
    }
}

/// Per-day resource regeneration by cell type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CellRates {
    pub city: f64,
    pub forest: f64,
    pub lake: f64,
    pub land: f64,
}

impl Default for CellRates {
    fn default() -> Self {
        Self {
            city: 1.0,
            forest: 3.0,
            lake: 2.5,
            land: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IrrigationParams {
    pub land_draw: f64,
    pub land_boost: f64,
    pub cleaning_per_unit: f64,
    pub forest_draw: f64,
    pub forest_drought_factor: f64,
}

impl Default for IrrigationParams {
    fn default() -> Self {
        Self {
            land_draw: 20.0,
            land_boost: 1.5,
            cleaning_per_unit: 0.1,
            forest_draw: 10.0,
            forest_drought_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthThresholds {
    pub growth: f64,
    pub decline: f64,
}

impl Default for GrowthThresholds {
    fn default() -> Self {
        Self {
            growth: 0.2,
            decline: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionParams {
    pub land_to_city: f64,
    pub land_to_forest_days: u32,
    pub city_abandonment_days: u32,
}

impl Default for ConversionParams {
    fn default() -> Self {
        Self {
            land_to_city: 0.5,
            land_to_forest_days: 1_825,
            city_abandonment_days: 365,
        }
    }
}

/// Per-capita daily resource consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KindRates {
    pub humans: f64,
    pub wildlife: f64,
    pub fish: f64,
    pub pests: f64,
    pub trees: f64,
}

impl KindRates {
    pub fn rate(&self, kind: PopulationKind) -> f64 {
        match kind {
            PopulationKind::Humans => self.humans,
            PopulationKind::Wildlife => self.wildlife,
            PopulationKind::Fish => self.fish,
            PopulationKind::Pests => self.pests,
            PopulationKind::Trees => self.trees,
        }
    }
}

impl Default for KindRates {
    fn default() -> Self {
        Self {
            humans: 0.004,
            wildlife: 0.01,
            fish: 0.005,
            pests: 0.002,
            trees: 0.004,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanParams {
    pub emission_rate: f64,
    pub commute_multiplier: f64,
    pub growth_rate: f64,
    pub decline_rate: f64,
    pub air_health_impact: f64,
    pub ground_health_impact: f64,
    pub nature_bonus: f64,
    pub expansion_share: f64,
    pub abandonment_occupancy: f64,
}

impl Default for HumanParams {
    fn default() -> Self {
        Self {
            emission_rate: 0.0005,
            commute_multiplier: 2.0,
            growth_rate: 1.1,
            decline_rate: 0.9,
            air_health_impact: -0.15,
            ground_health_impact: -0.05,
            nature_bonus: 0.05,
            expansion_share: 0.1,
            abandonment_occupancy: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    pub absorption_factor: f64,
    pub growth_rate: f64,
    pub growth_health: f64,
    /// Resource level a forest cell needs before its trees grow.
    pub growth_resources: f64,
    pub spread_chance: f64,
    pub seed_share: f64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            absorption_factor: 0.002,
            growth_rate: 1.05,
            growth_health: 70.0,
            growth_resources: 3.0,
            spread_chance: 0.1,
            seed_share: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WildlifeParams {
    pub base_health_decline: f64,
    pub nourishment: f64,
    pub decline_rate: f64,
    pub growth_rate: f64,
    pub forest_growth_bonus: f64,
    pub growth_health: f64,
    pub growth_pollution_limit: f64,
    pub growth_resources: f64,
    pub movement_radius: u32,
    pub min_habitat_resources: f64,
    pub base_success_rate: f64,
    pub health_bonus: f64,
    pub distance_penalty: f64,
    pub min_colony_size: u64,
    pub min_colony_health: f64,
    pub colony_share_min: f64,
    pub colony_share_max: f64,
    pub colony_health_penalty: f64,
    pub failed_colony_loss: f64,
}

impl Default for WildlifeParams {
    fn default() -> Self {
        Self {
            base_health_decline: 0.1,
            nourishment: 0.5,
            decline_rate: 0.5,
            growth_rate: 1.02,
            forest_growth_bonus: 1.2,
            growth_health: 70.0,
            growth_pollution_limit: 30.0,
            growth_resources: 50.0,
            movement_radius: 3,
            min_habitat_resources: 10.0,
            base_success_rate: 0.7,
            health_bonus: 0.3,
            distance_penalty: 0.2,
            min_colony_size: 50,
            min_colony_health: 60.0,
            colony_share_min: 0.10,
            colony_share_max: 0.20,
            colony_health_penalty: 5.0,
            failed_colony_loss: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FishParams {
    pub growth_rate: f64,
    pub decline_rate: f64,
    pub pollution_threshold: f64,
    pub growth_health: f64,
    pub pollution_health_impact: f64,
}

impl Default for FishParams {
    fn default() -> Self {
        Self {
            growth_rate: 1.03,
            decline_rate: 0.9,
            pollution_threshold: 30.0,
            growth_health: 70.0,
            pollution_health_impact: -0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PestParams {
    pub growth_rate: f64,
    pub spread_chance: f64,
    pub seed_share: f64,
}

impl Default for PestParams {
    fn default() -> Self {
        Self {
            growth_rate: 1.04,
            spread_chance: 0.1,
            seed_share: 0.1,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("health thresholds must satisfy 0 <= critical < poor < good <= 100")]
    Thresholds,
    #[error("cell composition weights must be non-negative with a positive sum")]
    Composition,
    #[error("parameter `{name}` is out of range: {value}")]
    Parameter { name: &'static str, value: f64 },
}

impl Scenario {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let (width, height) = match &self.layout {
            Some(rows) => {
                let grid = Grid::from_layout(rows)?;
                (grid.width(), grid.height())
            }
            None => {
                if self.width == 0 || self.height == 0 {
                    return Err(GridError::EmptyGrid {
                        width: self.width,
                        height: self.height,
                    }
                    .into());
                }
                (self.width, self.height)
            }
        };

        // No search needs to reach further than the grid's longest path.
        let radius = self.ecology.wildlife.movement_radius;
        if u64::from(radius) > u64::from(width) + u64::from(height) {
            return Err(ScenarioError::Parameter {
                name: "wildlife.movement_radius",
                value: f64::from(radius),
            });
        }

        let t = &self.ecology.thresholds;
        if !(0.0 <= t.critical && t.critical < t.poor && t.poor < t.good && t.good <= 100.0) {
            return Err(ScenarioError::Thresholds);
        }

        let c = &self.composition;
        let weights = [c.city, c.forest, c.lake, c.land];
        if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) || weights.iter().sum::<f64>() <= 0.0
        {
            return Err(ScenarioError::Composition);
        }

        let e = &self.ecology;
        let probabilities = [
            ("seeding.pest_chance", self.seeding.pest_chance),
            ("pollution.air_spread_rate", e.pollution.air_spread_rate),
            ("pollution.ground_spread_rate", e.pollution.ground_spread_rate),
            ("pollution.air_to_ground_rate", e.pollution.air_to_ground_rate),
            ("pollution.base_decay_rate", e.pollution.base_decay_rate),
            ("trees.spread_chance", e.trees.spread_chance),
            ("pests.spread_chance", e.pests.spread_chance),
            ("wildlife.colony_share_min", e.wildlife.colony_share_min),
            ("wildlife.colony_share_max", e.wildlife.colony_share_max),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ScenarioError::Parameter { name, value });
            }
        }
        if e.wildlife.colony_share_min > e.wildlife.colony_share_max {
            return Err(ScenarioError::Parameter {
                name: "wildlife.colony_share_min",
                value: e.wildlife.colony_share_min,
            });
        }

        let rates = [
            ("consumption.humans", e.consumption.humans),
            ("consumption.wildlife", e.consumption.wildlife),
            ("consumption.fish", e.consumption.fish),
            ("consumption.pests", e.consumption.pests),
            ("consumption.trees", e.consumption.trees),
            ("regeneration.city", e.regeneration.city),
            ("regeneration.forest", e.regeneration.forest),
            ("regeneration.lake", e.regeneration.lake),
            ("regeneration.land", e.regeneration.land),
        ];
        for (name, value) in rates {
            if value < 0.0 || !value.is_finite() {
                return Err(ScenarioError::Parameter { name, value });
            }
        }
        Ok(())
    }

    pub fn build_world(&self) -> Result<World, ScenarioError> {
        self.validate()?;
        let world = match &self.layout {
            Some(rows) => World::from_layout(rows, self.seed, self.ecology.clone(), &self.seeding)?,
            None => crate::world::initialize_grid_with(
                self.width,
                self.height,
                self.seed,
                self.ecology.clone(),
                &self.composition,
                &self.seeding,
            )?,
        };
        Ok(world)
    }

    pub fn ticks(&self, override_ticks: Option<u64>) -> u64 {
        override_ticks.or(self.ticks).unwrap_or_else(default_ticks)
    }
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        scenario
            .validate()
            .with_context(|| format!("Invalid scenario {}", path.display()))?;
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(yaml: &str) -> Scenario {
        serde_yaml::from_str(yaml).expect("scenario parses")
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let scenario = minimal("name: bare\nseed: 3\n");
        assert_eq!(scenario.width, 24);
        assert_eq!(scenario.ecology.thresholds.good, 80.0);
        assert_eq!(scenario.ecology.regeneration.lake, 2.5);
        assert_eq!(scenario.ecology.starvation_health_penalty, 5.0);
        assert_eq!(scenario.ticks(None), 365);
        assert_eq!(scenario.ticks(Some(10)), 10);
        scenario.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let scenario = minimal(
            "name: tuned\nseed: 1\necology:\n  thresholds:\n    good: 90\n  pollution:\n    air_spread_rate: 0.3\n",
        );
        assert_eq!(scenario.ecology.thresholds.good, 90.0);
        assert_eq!(scenario.ecology.thresholds.poor, 50.0);
        assert_eq!(scenario.ecology.pollution.air_spread_rate, 0.3);
        assert_eq!(scenario.ecology.pollution.ground_spread_rate, 0.1);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let scenario = minimal(
            "name: broken\nseed: 1\necology:\n  thresholds:\n    critical: 60\n    poor: 50\n",
        );
        assert!(matches!(scenario.validate(), Err(ScenarioError::Thresholds)));
    }

    #[test]
    fn malformed_layout_is_fatal() {
        let scenario = minimal("name: broken\nseed: 1\nlayout:\n  - \"CF\"\n  - \"C\"\n");
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::Grid(GridError::MalformedLayout(_)))
        ));
        assert!(scenario.build_world().is_err());
    }

    #[test]
    fn oversized_movement_radius_is_rejected() {
        let scenario = minimal(
            "name: far\nseed: 1\nlayout:\n  - \".F\"\necology:\n  wildlife:\n    movement_radius: 4294967295\n",
        );
        match scenario.validate() {
            Err(ScenarioError::Parameter { name, .. }) => {
                assert_eq!(name, "wildlife.movement_radius");
            }
            other => panic!("unexpected validation result: {other:?}"),
        }
        assert!(minimal("name: near\nseed: 1\nwidth: 4\nheight: 3\necology:\n  wildlife:\n    movement_radius: 7\n")
            .validate()
            .is_ok());
    }

    #[test]
    fn out_of_range_probability_is_reported() {
        let scenario = minimal("name: broken\nseed: 1\nseeding:\n  pest_chance: 1.5\n");
        match scenario.validate() {
            Err(ScenarioError::Parameter { name, value }) => {
                assert_eq!(name, "seeding.pest_chance");
                assert_eq!(value, 1.5);
            }
            other => panic!("unexpected validation result: {other:?}"),
        }
    }
}

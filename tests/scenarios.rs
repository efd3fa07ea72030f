use std::path::PathBuf;

use ecogrid::{
    engine::{EngineBuilder, EngineSettings},
    grid::CellType,
    scenario::{Scenario, ScenarioLoader},
    world::World,
};

fn scenario_loader() -> ScenarioLoader {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
}

fn load(name: &str) -> Scenario {
    scenario_loader()
        .load(PathBuf::from("scenarios").join(name))
        .unwrap()
}

fn run(scenario: &Scenario, ticks: u64, snapshot_dir: PathBuf, interval: u64) -> (World, f64) {
    let mut world = scenario.build_world().unwrap();
    let settings = EngineSettings {
        snapshot_interval_ticks: interval,
        progress_interval_ticks: 0,
        ..EngineSettings::for_scenario(scenario, snapshot_dir)
    };
    let mut engine = EngineBuilder::standard(settings).build();
    engine.run(&mut world, ticks).unwrap();
    let co2 = engine.carbon().level();
    (world, co2)
}

#[test]
fn fixtures_load_and_validate() {
    let meadow = load("meadowbrook.yaml");
    assert_eq!(meadow.name, "meadowbrook");
    assert_eq!(meadow.ticks(None), 365);
    assert_eq!(meadow.ticks(Some(10)), 10);

    let lakes = load("twin_lakes.yaml");
    assert_eq!(lakes.seeding.humans, 600);
    assert_eq!(lakes.seeding.trees, 250);
    assert_eq!(lakes.ecology.humans.emission_rate, 0.0008);
    assert_eq!(lakes.ecology.starvation_health_penalty, 5.0);
    let world = lakes.build_world().unwrap();
    assert_eq!(world.grid().width(), 10);
    assert_eq!(world.grid().count_type(CellType::Lake), 8);
}

#[test]
fn missing_scenario_reports_path() {
    let err = scenario_loader()
        .load("scenarios/does_not_exist.yaml")
        .unwrap_err();
    assert!(format!("{err:#}").contains("does_not_exist.yaml"));
}

#[test]
fn same_seed_same_history() {
    let scenario = load("meadowbrook.yaml");
    let temp = tempfile::tempdir().unwrap();
    let (world_a, co2_a) = run(&scenario, 45, temp.path().join("a"), 0);
    let (world_b, co2_b) = run(&scenario, 45, temp.path().join("b"), 0);

    let a = serde_json::to_value(world_a.snapshot("meadowbrook", co2_a)).unwrap();
    let b = serde_json::to_value(world_b.snapshot("meadowbrook", co2_b)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn seed_changes_the_terrain() {
    let mut scenario = load("meadowbrook.yaml");
    let first: Vec<CellType> = scenario
        .build_world()
        .unwrap()
        .grid()
        .cells()
        .iter()
        .map(|cell| cell.cell_type)
        .collect();
    scenario.seed += 1;
    let second: Vec<CellType> = scenario
        .build_world()
        .unwrap()
        .grid()
        .cells()
        .iter()
        .map(|cell| cell.cell_type)
        .collect();
    assert_ne!(first, second);
}

#[test]
fn engine_emits_snapshots() {
    let scenario = load("twin_lakes.yaml");
    let temp_dir = tempfile::tempdir().unwrap();
    let snapshot_dir = temp_dir.path().join("snaps");
    run(&scenario, 30, snapshot_dir.clone(), 10);

    for tick in [10, 20, 30] {
        let expected = snapshot_dir
            .join("twin_lakes")
            .join(format!("tick_{tick:06}.json"));
        assert!(
            expected.exists(),
            "expected snapshot {} to exist",
            expected.display()
        );
    }
    let data =
        std::fs::read_to_string(snapshot_dir.join("twin_lakes/tick_000010.json")).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&data).unwrap();
    assert_eq!(snapshot["scenario"], "twin_lakes");
    assert_eq!(snapshot["tick"], 10);
    assert_eq!(snapshot["cells"].as_array().unwrap().len(), 50);
}

#[test]
fn cells_stay_in_range_over_a_season() {
    let scenario = load("twin_lakes.yaml");
    let temp = tempfile::tempdir().unwrap();
    let (world, co2) = run(&scenario, 90, temp.path().to_path_buf(), 0);
    assert!(co2 >= 0.0);
    for cell in world.grid().cells() {
        assert!((0.0..=100.0).contains(&cell.resource_level));
        assert!((0.0..=100.0).contains(&cell.health));
        assert!(cell.air_pollution >= 0.0);
        assert!(cell.ground_pollution >= 0.0);
    }
    for id in world.population_ids() {
        let population = world.population(id).unwrap();
        assert!(population.size <= population.kind.max_density());
        assert!(population.size > 0);
    }
}

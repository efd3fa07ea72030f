use ecogrid::{
    grid::{CellType, Grid, Position},
    population::{PopulationKind, Priority},
    scenario::{EcologyParams, InitialPopulations},
    systems::{
        allocate_pool, balance_water_levels, consume_resources, found_city, spread_pollution,
        update_lake_networks,
    },
    world::World,
};

fn empty_seeding() -> InitialPopulations {
    InitialPopulations {
        humans: 0,
        trees: 0,
        wildlife: 0,
        fish: 0,
        pests: 0,
        pest_chance: 0.0,
    }
}

fn world(rows: &[&str]) -> World {
    World::from_layout(rows, 1, EcologyParams::default(), &empty_seeding()).unwrap()
}

#[test]
fn connected_lakes_share_their_water() {
    let mut grid = Grid::from_layout(&["...", ".LL", "..."]).unwrap();
    grid.cell_mut(Position::new(1, 1)).unwrap().resource_level = 40.0;
    grid.cell_mut(Position::new(2, 1)).unwrap().resource_level = 80.0;
    grid.cell_mut(Position::new(0, 0)).unwrap().resource_level = 10.0;

    let networks = update_lake_networks(&grid);
    assert_eq!(networks.len(), 1);
    balance_water_levels(&mut grid, &networks);

    assert_eq!(grid.cell(Position::new(1, 1)).unwrap().resource_level, 60.0);
    assert_eq!(grid.cell(Position::new(2, 1)).unwrap().resource_level, 60.0);
    assert_eq!(grid.cell(Position::new(0, 0)).unwrap().resource_level, 10.0);
}

#[test]
fn full_city_seeds_adjacent_land() {
    let mut world = world(&["C.", ".."]);
    let city = Position::new(0, 0);
    {
        let cell = world.grid_mut().cell_mut(city).unwrap();
        cell.health = 90.0;
        cell.resource_level = 5.0;
    }
    let id = world.settle(PopulationKind::Humans, city, 1_000, 100.0).unwrap();

    let founded = found_city(&mut world, id).unwrap().expect("a city is founded");

    let site = world.population(founded).unwrap().position;
    assert_eq!(world.grid().cell(site).unwrap().cell_type, CellType::City);
    assert_eq!(world.population(founded).unwrap().size, 100);
    assert_eq!(world.population(id).unwrap().size, 900);
    assert_eq!(world.bookkeeping().conversions.len(), 1);
}

#[test]
fn lone_consumer_empties_a_short_pool() {
    assert_eq!(allocate_pool(30.0, &[(Priority::Highest, 50.0)]), vec![30.0]);
    assert!(allocate_pool(30.0, &[]).is_empty());
    assert_eq!(allocate_pool(30.0, &[(Priority::Low, 0.0)]), vec![0.0]);

    let mut world = world(&["L"]);
    let pos = Position::new(0, 0);
    world.grid_mut().cell_mut(pos).unwrap().resource_level = 30.0;
    let fish = world.settle(PopulationKind::Fish, pos, 800, 100.0).unwrap();
    world.params_mut().consumption.fish = 0.0625;
    world.population_mut(fish).unwrap().resource_consumption_rate = 0.0625;

    let grants = consume_resources(&mut world, pos);
    assert_eq!(grants, vec![(fish, 30.0)]);
    assert_eq!(world.grid().cell(pos).unwrap().resource_level, 0.0);
    let allocation = world.population(fish).unwrap().allocation.unwrap();
    assert_eq!(allocation.requested, 50.0);
}

#[test]
fn spreading_moves_but_keeps_pollution() {
    let mut grid = Grid::from_layout(&["...", "...", "..."]).unwrap();
    grid.cell_mut(Position::new(1, 1)).unwrap().air_pollution = 100.0;
    grid.cell_mut(Position::new(0, 0)).unwrap().ground_pollution = 50.0;
    let before: f64 = grid.cells().iter().map(|cell| cell.total_pollution()).sum();

    spread_pollution(&mut grid, &EcologyParams::default().pollution);

    let after: f64 = grid.cells().iter().map(|cell| cell.total_pollution()).sum();
    assert!((before - after).abs() < 1e-9);
    assert!((grid.cell(Position::new(1, 0)).unwrap().air_pollution - 10.0).abs() < 1e-9);
}

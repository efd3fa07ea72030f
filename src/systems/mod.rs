mod bookkeeping;
mod land_use;
mod pollution;
mod population;
mod resources;
mod water;

pub use bookkeeping::BookkeepingSystem;
pub use land_use::{update_land_use, LandUseSystem};
pub use pollution::{decay, diffuse_field, settle, spread_pollution, PollutionSystem};
pub use population::{found_city, run_routine, PopulationSystem};
pub use resources::{
    allocate_pool, consume_resources, regenerate_resources, Grant, ResourceAllocator,
    ResourceRequest, ResourceSystem,
};
pub use water::{
    balance_water_levels, spread_water_pollution, update_lake_networks, LakeNetworks,
    WaterSystem,
};

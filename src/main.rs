use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ecogrid::{
    engine::{EngineBuilder, EngineSettings},
    export::{CsvExporter, DataCollector},
    scenario::ScenarioLoader,
    web::{self, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Grid ecology simulation runner")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/meadowbrook.yaml")]
    scenario: PathBuf,

    /// Override tick count (uses scenario default when omitted)
    #[arg(long)]
    ticks: Option<u64>,

    /// Override snapshot interval in ticks
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Directory for CSV export (defaults to runs/run_<timestamp>)
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Skip the CSV export
    #[arg(long)]
    no_export: bool,

    /// Serve a live JSON feed instead of running headless
    #[arg(long)]
    serve: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&scenario.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let ticks = scenario.ticks(cli.ticks);
    let snapshot_interval = cli
        .snapshot_interval
        .unwrap_or(scenario.snapshot_interval_ticks);
    let snapshot_dir = cli
        .snapshot_dir
        .unwrap_or_else(|| PathBuf::from("snapshots"));

    if cli.serve {
        let runtime = tokio::runtime::Runtime::new()?;
        return runtime.block_on(web::run(WebServerConfig {
            scenario,
            ticks,
            snapshot_interval,
            snapshot_dir,
            host: cli.host,
            port: cli.port,
        }));
    }

    let mut world = scenario.build_world()?;
    let settings = EngineSettings {
        snapshot_interval_ticks: snapshot_interval,
        ..EngineSettings::for_scenario(&scenario, snapshot_dir)
    };
    let mut engine = EngineBuilder::standard(settings).build();

    let mut collector = DataCollector::new();
    engine.run_with_hook(&mut world, ticks, |summary, world| {
        if !cli.no_export {
            collector.record(summary, world);
        }
    })?;

    info!(
        scenario = %scenario.name,
        ticks,
        population = world.total_population(),
        co2 = engine.carbon().level(),
        "run complete"
    );

    if !cli.no_export {
        let exporter = match cli.export_dir {
            Some(dir) => CsvExporter::new(dir),
            None => CsvExporter::timestamped("runs"),
        };
        let files = exporter.export_all(&collector, &scenario)?;
        info!(
            dir = %exporter.output_dir().display(),
            tables = files.cell_data.len() + files.population_metrics.len() + 1,
            "export written"
        );
    }
    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::world::World;

/// Writes a JSON snapshot of the world every `interval` ticks.
pub struct SnapshotWriter {
    output_dir: PathBuf,
    interval: u64,
}

impl SnapshotWriter {
    pub fn new(output_dir: impl AsRef<Path>, interval: u64) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            interval,
        }
    }

    pub fn maybe_write(
        &self,
        world: &World,
        scenario_name: &str,
        co2_level: f64,
    ) -> Result<Option<PathBuf>> {
        if self.interval == 0 || world.tick() % self.interval != 0 {
            return Ok(None);
        }

        let dir = self.output_dir.join(scenario_name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot dir {}", dir.display()))?;
        let path = dir.join(format!("tick_{:06}.json", world.tick()));
        let snapshot = world.snapshot(scenario_name, co2_level);
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::EcologyParams;
    use crate::world::initialize_grid;

    #[test]
    fn zero_interval_never_writes() {
        let temp = tempfile::tempdir().unwrap();
        let world = initialize_grid(3, 3, 1, EcologyParams::default()).unwrap();
        let writer = SnapshotWriter::new(temp.path(), 0);
        assert!(writer.maybe_write(&world, "quiet", 0.0).unwrap().is_none());
    }

    #[test]
    fn writes_on_interval_boundaries() {
        let temp = tempfile::tempdir().unwrap();
        let mut world = initialize_grid(3, 3, 1, EcologyParams::default()).unwrap();
        let writer = SnapshotWriter::new(temp.path(), 2);

        world.advance_time();
        assert!(writer.maybe_write(&world, "demo", 1.0).unwrap().is_none());
        world.advance_time();
        let path = writer.maybe_write(&world, "demo", 1.0).unwrap().unwrap();
        assert!(path.ends_with("demo/tick_000002.json"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["tick"], 2);
        assert_eq!(json["cells"].as_array().unwrap().len(), 9);
    }
}

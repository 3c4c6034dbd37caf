//! Settings management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tessera_asset::PathVariables;
use tessera_bus::BusConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bus: BusConfig,
    pub world: WorldSettings,
    pub workers: WorkerSettings,
    pub objects: ObjectSettings,
    /// Namespaces hosted by the generic property-bag plugin.
    pub property_bags: Vec<String>,
    /// Log counter and timing snapshots at shutdown.
    pub report_metrics: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub home_dir: PathBuf,
    pub world_name: String,
    /// Defaults to `$HOME_DIR/config/$WORLD_NAME`.
    pub world_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Kind of worker instances are placed onto.
    pub hosting_kind: String,
    /// Identifier of this server run; `None` derives one from the start time.
    pub epoch: Option<u64>,
    /// Workers hosted by this process.
    pub local: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectSettings {
    /// Lowest id the allocator hands out; raised past anything in the store.
    pub first_object_id: u64,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn path_variables(&self) -> PathVariables {
        let vars = PathVariables::new(&self.world.home_dir, self.world.world_name.clone());
        match &self.world.world_dir {
            Some(dir) => vars.with_world_dir(dir),
            None => vars,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.workers.epoch.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(1)
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            world: WorldSettings::default(),
            workers: WorkerSettings::default(),
            objects: ObjectSettings::default(),
            property_bags: vec!["WorldManager".into(), "Inventory".into()],
            report_metrics: false,
        }
    }
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            home_dir: PathBuf::from("."),
            world_name: "default".into(),
            world_dir: None,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            hosting_kind: crate::workers::WORLD_MANAGER_KIND.into(),
            epoch: None,
            local: vec!["world-manager-1".into()],
        }
    }
}

impl Default for ObjectSettings {
    fn default() -> Self {
        Self { first_object_id: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{ "world": { "home_dir": "/srv/tessera", "world_name": "sample" },
                 "bus": { "broadcast_timeout_ms": 500 } }"#,
        )
        .unwrap();
        assert_eq!(settings.bus.broadcast_timeout_ms, Some(500));
        assert_eq!(settings.workers.hosting_kind, "world-manager");
        assert_eq!(settings.property_bags, vec!["WorldManager", "Inventory"]);
        assert_eq!(
            settings.path_variables().expand("$WORLD_DIR/a.json"),
            PathBuf::from("/srv/tessera/config/sample/a.json")
        );
    }

    #[test]
    fn explicit_epoch_wins() {
        let mut settings = Settings::default();
        settings.workers.epoch = Some(42);
        assert_eq!(settings.epoch(), 42);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Settings::load(Path::new("/nonexistent/tessera.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }
}

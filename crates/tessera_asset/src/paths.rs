//! Path-variable expansion
//!
//! Instance templates reference their world file and scripts with paths like
//! `$WORLD_DIR/dungeon.json`. Expansion happens once, at instance create or
//! load, against the server's configured directories.

use crate::WorldFileError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct PathVariables {
    pub home_dir: PathBuf,
    pub world_name: String,
    world_dir: Option<PathBuf>,
}

impl PathVariables {
    pub fn new(home_dir: impl Into<PathBuf>, world_name: impl Into<String>) -> Self {
        Self {
            home_dir: home_dir.into(),
            world_name: world_name.into(),
            world_dir: None,
        }
    }

    /// Override the world directory (defaults to `$HOME_DIR/config/$WORLD_NAME`).
    pub fn with_world_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.world_dir = Some(dir.into());
        self
    }

    pub fn world_dir(&self) -> PathBuf {
        match &self.world_dir {
            Some(dir) => dir.clone(),
            None => self.home_dir.join("config").join(&self.world_name),
        }
    }

    /// Replace `$HOME_DIR`, `$WORLD_NAME` and `$WORLD_DIR`.
    pub fn expand(&self, raw: &str) -> PathBuf {
        // WORLD_DIR first: it may itself contain the world name
        let world_dir = self.world_dir();
        let expanded = raw
            .replace("$WORLD_DIR", &world_dir.to_string_lossy())
            .replace("$HOME_DIR", &self.home_dir.to_string_lossy())
            .replace("$WORLD_NAME", &self.world_name);
        PathBuf::from(expanded)
    }

    /// Expand and verify the file can be opened for reading.
    pub fn resolve_readable(&self, raw: &str) -> Result<PathBuf, WorldFileError> {
        let path = self.expand(raw);
        check_readable(&path)?;
        Ok(path)
    }
}

pub fn check_readable(path: &Path) -> Result<(), WorldFileError> {
    std::fs::File::open(path)
        .map(|_| ())
        .map_err(|source| WorldFileError::Unreadable {
            path: path.to_path_buf(),
            source,
        })
}

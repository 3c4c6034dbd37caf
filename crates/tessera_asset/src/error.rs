use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldFileError {
    #[error("file {path} is not readable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("world file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("world file {path} declares {what} '{name}' twice")]
    Duplicate {
        path: PathBuf,
        what: &'static str,
        name: String,
    },
}

impl WorldFileError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            WorldFileError::Unreadable { path, .. }
            | WorldFileError::Malformed { path, .. }
            | WorldFileError::Duplicate { path, .. } => path,
        }
    }
}

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("cannot read script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("script engine: {0}")]
    Engine(#[from] rquickjs::Error),

    #[error("script threw: {0}")]
    Exception(String),
}

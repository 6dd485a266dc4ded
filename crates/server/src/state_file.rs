//! The subscription state file shared with `closelink webhook subscribe`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use closelink_core::domain::state::StaticState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateFileError {
    #[error("could not read webhook state `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("webhook state `{path}` is not valid JSON: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("could not write webhook state `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Clone, Debug)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or empty file reads as "nothing subscribed yet".
    pub async fn load(&self) -> Result<StaticState, StateFileError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(StaticState::default()),
            Err(source) => return Err(StateFileError::Read { path: self.path.clone(), source }),
        };
        if raw.trim().is_empty() {
            return Ok(StaticState::default());
        }

        serde_json::from_str(&raw)
            .map_err(|source| StateFileError::Parse { path: self.path.clone(), source })
    }

    pub async fn save(&self, state: &StaticState) -> Result<(), StateFileError> {
        let serialized = serde_json::to_string_pretty(state).map_err(|source| {
            StateFileError::Parse { path: self.path.clone(), source }
        })?;
        tokio::fs::write(&self.path, serialized)
            .await
            .map_err(|source| StateFileError::Write { path: self.path.clone(), source })
    }
}

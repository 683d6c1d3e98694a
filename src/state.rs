use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::MonitorState;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// While the file cannot be written, `load` returns the last saved copy.
pub struct StateStore {
    path: PathBuf,
    cached: MonitorState,
    write_failed: bool,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: MonitorState::default(),
            write_failed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&mut self) -> MonitorState {
        if self.write_failed {
            return self.cached.clone();
        }

        match self.read().await {
            Ok(Some(state)) => {
                self.cached = state.clone();
                state
            }
            Ok(None) => {
                debug!("No state file at {}, starting fresh", self.path.display());
                MonitorState::default()
            }
            Err(e) => {
                warn!(
                    "⚠️  Could not read state from {} ({}), using defaults",
                    self.path.display(),
                    e
                );
                MonitorState::default()
            }
        }
    }

    pub async fn read(&self) -> Result<Option<MonitorState>, StateError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&mut self, state: &MonitorState) -> Result<(), StateError> {
        self.cached = state.clone();

        match self.write(state).await {
            Ok(()) => {
                self.write_failed = false;
                Ok(())
            }
            Err(e) => {
                self.write_failed = true;
                Err(e)
            }
        }
    }

    async fn write(&self, state: &MonitorState) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(state)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::config::{ConfigError, GuardConfig};
use crate::ports::ConfigSource;

// ============================================================================
// TomlConfigSource - Hot-reloaded config file
// ============================================================================

/// TOML configuration file, re-read whenever its modification time changes.
///
/// A file that fails to parse is reported once per modification; the caller
/// keeps the previous configuration until the file is fixed.
#[derive(Debug, Clone)]
pub struct TomlConfigSource {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl TomlConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file regardless of its modification time.
    pub fn load(&mut self) -> Result<GuardConfig, ConfigError> {
        let modified = self.modified()?;
        self.read(modified)
    }

    fn modified(&self) -> Result<SystemTime, ConfigError> {
        fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|source| ConfigError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn read(&mut self, modified: SystemTime) -> Result<GuardConfig, ConfigError> {
        self.last_modified = Some(modified);
        let content = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        GuardConfig::from_toml_str(&content)
    }
}

impl ConfigSource for TomlConfigSource {
    fn poll(&mut self) -> Result<Option<GuardConfig>, ConfigError> {
        let modified = self.modified()?;
        if self.last_modified == Some(modified) {
            return Ok(None);
        }
        debug!(path = %self.path.display(), "Config file changed, reloading");
        self.read(modified).map(Some)
    }
}

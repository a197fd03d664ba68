use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::{Config, ConfigError};

/// Live view of one configuration section.
///
/// A chunkserver holds one manager per section it owns and reads it on every
/// operation through [`ConfigManager::get`], a lock-free snapshot. When an
/// operator edits the file and triggers [`ConfigManager::reload`], a new
/// snapshot is swapped in where only the section's hot fields moved: the
/// formatter's pacing interval can be turned up on a running pool, but cold
/// fields such as chunk geometry, directory layout and thread counts keep
/// the values the process booted with, since changing those under live
/// workers would corrupt the pool they are writing.
#[derive(Debug)]
pub struct ConfigManager<T: Config> {
    current: ArcSwap<T>,
    source: Option<PathBuf>,
}

impl<T: Config> ConfigManager<T> {
    /// Manage a section built in code. There is no backing file, so the
    /// section can be replaced with [`ConfigManager::update`] but never
    /// reloaded.
    pub fn new(section: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(section),
            source: None,
        }
    }

    /// Parse and validate a section from a TOML file, remembering the path
    /// for later reloads.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let section = read_section::<T>(path)?;
        Ok(Self {
            current: ArcSwap::from_pointee(section),
            source: Some(path.to_path_buf()),
        })
    }

    /// Lock-free snapshot of the current section.
    pub fn get(&self) -> arc_swap::Guard<Arc<T>> {
        self.current.load()
    }

    /// Replace the whole section, cold fields included.
    ///
    /// The replacement must validate on its own; a rejected replacement
    /// leaves the current section in place.
    pub fn update(&self, section: T) -> Result<(), ConfigError> {
        section.validate()?;
        self.current.store(Arc::new(section));
        Ok(())
    }
}

impl<T: Config + Clone> ConfigManager<T> {
    /// Owned copy of the current section.
    pub fn snapshot(&self) -> T {
        self.current.load_full().as_ref().clone()
    }

    /// Re-read the backing file and fold its hot fields into the running
    /// section. Returns `false` when the manager has no backing file.
    ///
    /// The file must parse and validate as a complete section before any of
    /// it is applied, so a half-edited file never reaches a worker, and a
    /// reload can never smuggle a cold-field change past the boot-time
    /// values: the incoming section is only consulted through
    /// [`Config::hot_update`].
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let path = match &self.source {
            Some(path) => path,
            None => return Ok(false),
        };
        let incoming = read_section::<T>(path)?;

        let mut merged = self.snapshot();
        merged.hot_update(&incoming);
        self.current.store(Arc::new(merged));

        tracing::info!(path = %path.display(), "applied hot config fields from file");
        Ok(true)
    }
}

fn read_section<T: Config>(path: &Path) -> Result<T, ConfigError> {
    let document: toml::Value = std::fs::read_to_string(path)?.parse()?;
    let section = T::from_toml(&document)?;
    section.validate()?;
    Ok(section)
}

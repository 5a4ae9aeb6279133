use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Initial theme when nothing has been persisted yet.
pub const DEFAULT_THEME: &str = "fantasy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// The story theme to pre-fill on the next run.
    pub theme: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage backends
// ---------------------------------------------------------------------------

/// Storage seam for the preference: file-backed in production, in-memory in
/// tests.
pub trait SettingsStore {
    /// `Ok(None)` means nothing has been stored yet.
    fn load(&self) -> Result<Option<Settings>>;
    fn save(&mut self, settings: &Settings) -> Result<()>;
}

/// Test backend; nothing survives the process.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Option<Settings>,
}

impl MemoryStore {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Option<Settings>> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, settings: &Settings) -> Result<()> {
        self.saved = Some(settings.clone());
        Ok(())
    }
}

/// Persists settings as JSON at a fixed path.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// The conventional location: `<platform config dir>/storyflow/settings.json`.
    pub fn in_config_dir() -> Result<Self> {
        let dir = dirs::config_dir().context("no config directory on this platform")?;
        Ok(Self::at(dir.join("storyflow").join("settings.json")))
    }
}

impl SettingsStore for FileStore {
    fn load(&self) -> Result<Option<Settings>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let settings = serde_json::from_str(&raw)
            .with_context(|| format!("malformed settings in {}", self.path.display()))?;
        Ok(Some(settings))
    }

    fn save(&mut self, settings: &Settings) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let raw = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Settings with their backing store. Loading falls back to defaults when the
/// store is empty or unreadable; saving is best-effort with a logged warning,
/// since a broken preference file should never block story generation.
pub struct SettingsService<S> {
    store: S,
    settings: Settings,
}

impl<S: SettingsStore> SettingsService<S> {
    pub fn load(store: S) -> Self {
        let settings = match store.load() {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(err) => {
                warn!("could not load settings, using defaults: {err:#}");
                Settings::default()
            }
        };
        debug!("settings loaded: theme \"{}\"", settings.theme);
        Self { store, settings }
    }

    pub fn theme(&self) -> &str {
        &self.settings.theme
    }

    pub fn set_theme(&mut self, theme: impl Into<String>) {
        self.settings.theme = theme.into();
        if let Err(err) = self.store.save(&self.settings) {
            warn!("could not persist settings: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_store_is_empty() {
        let service = SettingsService::load(MemoryStore::new());
        assert_eq!(service.theme(), DEFAULT_THEME);
    }

    #[test]
    fn set_theme_round_trips_through_memory_store() {
        let mut store = MemoryStore::new();
        store
            .save(&Settings {
                theme: "pirates".to_string(),
            })
            .unwrap();
        let mut service = SettingsService::load(store);
        assert_eq!(service.theme(), "pirates");

        service.set_theme("haunted lighthouse");
        assert_eq!(service.theme(), "haunted lighthouse");
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut store = FileStore::at(path.clone());
        assert!(store.load().unwrap().is_none());

        store
            .save(&Settings {
                theme: "space opera".to_string(),
            })
            .unwrap();

        let reloaded = FileStore::at(path).load().unwrap().unwrap();
        assert_eq!(reloaded.theme, "space opera");
    }

    #[test]
    fn malformed_file_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        assert!(FileStore::at(path.clone()).load().is_err());
        // The service absorbs the error and falls back to defaults.
        let service = SettingsService::load(FileStore::at(path));
        assert_eq!(service.theme(), DEFAULT_THEME);
    }
}

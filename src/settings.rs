//! Application settings persistence.

use log::warn;
use skiff_core::types::Settings;
use std::path::PathBuf;
use std::sync::Arc;

pub struct SettingsStore {
    path: PathBuf,
}

pub type SettingsStoreState = Arc<SettingsStore>;

impl SettingsStore {
    pub fn new(path: PathBuf) -> Arc<Self> {
        Arc::new(Self { path })
    }

    pub fn default_path() -> PathBuf {
        crate::app_data_dir().join("settings.json")
    }

    /// Read settings, falling back to defaults on a missing or damaged file.
    pub fn load(&self) -> Settings {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("settings: ignoring malformed {}: {}", self.path.display(), e);
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), String> {
        let json = serde_json::to_string_pretty(settings).map_err(|e| e.to_string())?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_core::types::Theme;

    #[test]
    fn defaults_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let settings = store.load();
        assert_eq!(settings.theme, Theme::System);
        assert!(settings.confirm_on_delete);
        assert!(!settings.show_hidden);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let mut settings = store.load();
        settings.theme = Theme::Dark;
        settings.show_hidden = true;
        store.save(&settings).unwrap();

        let reloaded = store.load();
        assert_eq!(reloaded.theme, Theme::Dark);
        assert!(reloaded.show_hidden);
    }
}

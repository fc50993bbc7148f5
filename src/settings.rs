use std::path::PathBuf;

use log::LevelFilter;

// ============================================================================
// EDITOR SETTINGS – persisted as key=value lines
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Undo chains kept before the oldest is dropped
    pub max_undo_steps: usize,
    /// History memory budget in MB; 0 means unlimited
    pub max_history_mb: usize,
    /// Tile side length for new documents
    pub default_tile_size: u32,
    /// Frames per sheet row for new documents
    pub sheet_columns: u32,
    /// Default for pixel brushes: edit shared frames in place
    pub sync_identical: bool,
    /// Drop empty chunks before writing a document
    pub compact_on_save: bool,
    pub log_level: LevelFilter,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: 50,
            max_history_mb: 100,
            default_tile_size: 16,
            sheet_columns: 16,
            sync_identical: true,
            compact_on_save: false,
            log_level: LevelFilter::Info,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/tilecanvas/tilecanvas_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\tilecanvas\tilecanvas_settings.cfg
    /// On macOS:   ~/Library/Application Support/tilecanvas/tilecanvas_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        let base = std::env::var("APPDATA")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()
            .map(PathBuf::from);
        #[cfg(target_os = "macos")]
        let base = std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join("Library").join("Application Support"));
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let base = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
            .ok();

        let config_dir = base?.join("tilecanvas");
        let _ = std::fs::create_dir_all(&config_dir);
        Some(config_dir.join("tilecanvas_settings.cfg"))
    }

    /// History memory budget in bytes, `None` when unlimited.
    pub fn history_memory_bytes(&self) -> Option<usize> {
        (self.max_history_mb > 0).then(|| self.max_history_mb * 1024 * 1024)
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_undo_steps={}\n\
             max_history_mb={}\n\
             default_tile_size={}\n\
             sheet_columns={}\n\
             sync_identical={}\n\
             compact_on_save={}\n\
             log_level={}\n",
            self.max_undo_steps,
            self.max_history_mb,
            self.default_tile_size,
            self.sheet_columns,
            self.sync_identical,
            self.compact_on_save,
            self.log_level.as_str().to_lowercase(),
        )
    }

    /// Parse settings text. Unknown keys and unparsable values keep defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().unwrap_or(50);
                }
                "max_history_mb" => {
                    s.max_history_mb = val.parse().unwrap_or(100);
                }
                "default_tile_size" => {
                    s.default_tile_size = val.parse().ok().filter(|&n| n > 0).unwrap_or(16);
                }
                "sheet_columns" => {
                    s.sheet_columns = val.parse().ok().filter(|&n| n > 0).unwrap_or(16);
                }
                "sync_identical" => {
                    s.sync_identical = val == "true";
                }
                "compact_on_save" => {
                    s.compact_on_save = val == "true";
                }
                "log_level" => {
                    s.log_level = val.parse().unwrap_or(LevelFilter::Info);
                }
                _ => {
                    log::debug!("settings: ignoring unknown key '{}'", key);
                }
            }
        }
        s
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            log::warn!("settings: failed to write {}: {}", path.display(), e);
        }
    }
}

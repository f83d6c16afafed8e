// ============================================================================
// PREFERENCES — persisted user options
// ============================================================================

use std::path::{Path, PathBuf};

/// User preferences persisted across sessions.
///
/// The editor session reads these once at startup and writes them back on
/// every change, so the file on disk always reflects the last toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preferences {
    /// When true, generative operations are asked to return output with a
    /// transparent background instead of synthesising a backdrop.
    pub prefer_transparent: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            prefer_transparent: false,
        }
    }
}

impl Preferences {
    /// Path to the preferences file.
    /// On Linux:   `~/.config/photofe/photofe_settings.cfg` (XDG_CONFIG_HOME respected)
    /// On Windows: `%APPDATA%\PhotoFE\photofe_settings.cfg`
    /// On macOS:   `~/Library/Application Support/PhotoFE/photofe_settings.cfg`
    /// Fallback:   same directory as the executable.
    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("photofe");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("photofe_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .unwrap_or_else(|_| {
                    std::env::current_exe()
                        .ok()
                        .and_then(|p| p.parent().map(|d| d.to_string_lossy().into_owned()))
                        .unwrap_or_default()
                });
            let config_dir = PathBuf::from(appdata).join("PhotoFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("photofe_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("PhotoFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("photofe_settings.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("photofe_settings.cfg")))
        }
    }

    /// Load preferences from the default location.  Missing or unreadable
    /// files yield the defaults.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load preferences from an explicit path.
    pub fn load_from(path: &Path) -> Self {
        let mut prefs = Self::default();
        let Ok(content) = std::fs::read_to_string(path) else {
            return prefs;
        };
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "prefer_transparent" => {
                    prefs.prefer_transparent = value.trim() == "true";
                }
                _ => {} // Unknown keys from newer versions are ignored
            }
        }
        prefs
    }

    /// Save preferences to the default location.  Failures are logged and
    /// otherwise ignored — a read-only config dir must not break editing.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else {
            return;
        };
        self.save_to(&path);
    }

    /// Save preferences to an explicit path.
    pub fn save_to(&self, path: &Path) {
        let content = format!(
            "# PhotoFE preferences\nprefer_transparent={}\n",
            self.prefer_transparent
        );
        if let Err(e) = std::fs::write(path, content) {
            crate::log_warn!("Failed to save preferences to {:?}: {}", path, e);
        }
    }
}

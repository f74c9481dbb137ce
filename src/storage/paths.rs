//! Application paths for config and data.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application paths.
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Data directory.
    pub data: PathBuf,
}

impl AppPaths {
    /// Create paths for the ustat application.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("ai", "vanus", "ustat") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            // Fallback to home directory
            let home = directories::BaseDirs::new()
                .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
            Self {
                config: home.join(".config/ustat"),
                data: home.join(".local/share/ustat"),
            }
        }
    }

    /// Path to the default config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Path to the default document store.
    #[must_use]
    pub fn store_file(&self) -> PathBuf {
        self.data.join("ustat.sqlite")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

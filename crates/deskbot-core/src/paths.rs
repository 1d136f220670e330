//! Centralized path utilities
//!
//! All application paths in one place for consistency

use std::path::PathBuf;

use crate::constants::app;

/// Get the deskbot config directory (~/.deskbot)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(app::CONFIG_DIR_NAME)
}

/// Get the config file (~/.deskbot/config.toml)
pub fn config_file() -> PathBuf {
    config_dir().join(app::CONFIG_FILE_NAME)
}

/// Get the logs directory (~/.deskbot/logs)
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Get the shared key-value store (~/.deskbot/store.db)
///
/// Every running instance opens the same file; it plays the role of
/// origin-wide persistent storage.
pub fn store_path() -> PathBuf {
    config_dir().join(app::STORE_FILE_NAME)
}

mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, DatabaseConfig, RotationConfig, SelectionConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the directory holding `dopamine.db` and `config.toml`.
///
/// `DOPAMINE_DATA_DIR` wins when set. Otherwise `~/.config/dopamine[-dev]/`
/// based on `DOPAMINE_ENV` (set `DOPAMINE_ENV=dev` for a development copy).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("DOPAMINE_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("DOPAMINE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("dopamine-dev")
            } else {
                base_dir.join("dopamine")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

//! Default paths for safeguard components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/safeguard/config.toml` or `~/.config/safeguard/config.toml`
//! - Data: `$XDG_DATA_HOME/safeguard` or `~/.local/share/safeguard`

use std::path::PathBuf;

/// Environment variable for overriding the config path
pub const SAFEGUARD_CONFIG_ENV: &str = "SAFEGUARD_CONFIG";

/// Environment variable for overriding the data directory
pub const SAFEGUARD_DATA_DIR_ENV: &str = "SAFEGUARD_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "safeguard";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Block log database filename within the data directory
pub const DATABASE_FILENAME: &str = "safeguard.db";

fn xdg_dir(var: &str, home_fallback: &[&str], last_resort: &str) -> PathBuf {
    if let Ok(dir) = std::env::var(var) {
        return PathBuf::from(dir).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        let mut path = PathBuf::from(home);
        for part in home_fallback {
            path.push(part);
        }
        return path.join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join(last_resort)
}

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$SAFEGUARD_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/safeguard/config.toml`
/// 3. `~/.config/safeguard/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(SAFEGUARD_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    xdg_dir("XDG_CONFIG_HOME", &[".config"], "config").join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$SAFEGUARD_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/safeguard`
/// 3. `~/.local/share/safeguard`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(SAFEGUARD_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking SAFEGUARD_DATA_DIR env var.
/// Used for default values in configs where the env var is checked separately.
pub fn data_dir_without_env() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", &[".local", "share"], "data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_toml() {
        let path = default_config_path();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
    }

    #[test]
    fn data_dir_contains_app_name() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains("safeguard"));
    }
}

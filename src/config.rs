//! Configuration and paths

use std::path::PathBuf;
use std::time::Duration;

/// All configurable paths and constants
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub settings_db: PathBuf,
    pub sims_file: PathBuf,
    pub default_primary_url: String,
    pub default_secondary_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().expect("Could not find home directory");
        let data_dir = home.join(".simrelay");

        Self {
            settings_db: data_dir.join("settings.db"),
            sims_file: data_dir.join("sims.json"),
            data_dir,
            default_primary_url: DEFAULT_PRIMARY_URL.to_string(),
            default_secondary_url: DEFAULT_SECONDARY_URL.to_string(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &std::path::Path) -> Self {
        Self {
            data_dir: temp_dir.to_path_buf(),
            settings_db: temp_dir.join("settings.db"),
            sims_file: temp_dir.join("sims.json"),
            default_primary_url: DEFAULT_PRIMARY_URL.to_string(),
            default_secondary_url: DEFAULT_SECONDARY_URL.to_string(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
        }
    }
}

/// Factory-default base URL of the primary backend
pub const DEFAULT_PRIMARY_URL: &str = "http://127.0.0.1:5000/";

/// Factory-default base URL of the secondary backend
pub const DEFAULT_SECONDARY_URL: &str = "http://127.0.0.1:3000/";

/// App version reported in event metadata
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.settings_db.to_string_lossy().contains("settings.db"));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_test_config() {
        let temp = std::env::temp_dir();
        let config = Config::for_test(&temp);
        assert_eq!(config.data_dir, temp);
        assert_eq!(config.sims_file, temp.join("sims.json"));
    }

    #[test]
    fn test_default_urls_end_with_slash() {
        assert!(DEFAULT_PRIMARY_URL.ends_with('/'));
        assert!(DEFAULT_SECONDARY_URL.ends_with('/'));
    }
}

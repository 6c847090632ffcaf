//! Standard locations of bandtake files

use std::path::PathBuf;

/// Name of the application's config file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// `<platform config dir>/bandtake`, or `./bandtake` when the platform has none
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bandtake")
}

/// `<config dir>/bandtake/config.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}

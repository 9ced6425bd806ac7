// src/infra/paths.rs — XDG-compliant path management
//
// All paths respect the LABLOOP_HOME environment variable for isolation.
// When LABLOOP_HOME is set, config and reports live under that directory.
// When unset, config uses ~/.labloop/ and reports use XDG_DATA_HOME/labloop.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Returns the LABLOOP_HOME override, if set.
fn labloop_home() -> Option<PathBuf> {
    std::env::var_os("LABLOOP_HOME").map(PathBuf::from)
}

/// Home directory, or the current directory when none can be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $LABLOOP_HOME/ or ~/.labloop/
pub fn config_dir() -> PathBuf {
    if let Some(home) = labloop_home() {
        return home;
    }
    dirs_home().join(".labloop")
}

/// Data directory: $LABLOOP_HOME/data/ or ~/.local/share/labloop/
pub fn data_dir() -> PathBuf {
    if let Some(home) = labloop_home() {
        return home.join("data");
    }
    ProjectDirs::from("", "", "labloop")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default location for persisted run reports.
pub fn reports_dir() -> PathBuf {
    data_dir().join("reports")
}

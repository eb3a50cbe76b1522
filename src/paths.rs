//! XDG directory helpers for config/data locations.

use std::path::PathBuf;

/// Base directory for persistent data (the database).
///
/// Uses `TAPLINK_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/taplink` or
/// `~/.local/share/taplink`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TAPLINK_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("taplink")
}

/// Base directory for configuration files.
///
/// Uses `TAPLINK_CONFIG_DIR` if set, otherwise `$XDG_CONFIG_HOME/taplink` or
/// `~/.config/taplink`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TAPLINK_CONFIG_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".config")
        })
        .join("taplink")
}

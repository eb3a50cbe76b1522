//! Config loading: TOML file, env overrides, atomic default write.

use std::fs;
use std::path::{Path, PathBuf};

use super::{Config, ConfigError, LogFormat};

pub fn config_path() -> PathBuf {
    crate::paths::config_dir().join("config.toml")
}

pub fn load() -> Result<Config, ConfigError> {
    let path = config_path();
    let mut config = if path.exists() {
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load, falling back to defaults on failure, and seed a default config file
/// on first run.
pub fn load_or_init() -> Config {
    let path = config_path();
    let had_config = path.exists();

    let config = match load() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("config load failed, using defaults: {e}");
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            cfg
        }
    };

    if !had_config
        && let Err(e) = write_config(&path, &Config::default())
    {
        tracing::warn!("failed to write default config: {e}");
    }

    config
}

/// `TAPLINK_*` variables win over file values.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(path) = env_var("TAPLINK_DB_PATH") {
        config.database.path = Some(PathBuf::from(path));
    }
    if let Some(filter) = env_var("TAPLINK_LOG_FILTER") {
        config.logging.filter = filter;
    }
    if let Some(format) = env_var("TAPLINK_LOG_FORMAT") {
        match format.as_str() {
            "pretty" => config.logging.format = LogFormat::Pretty,
            "compact" => config.logging.format = LogFormat::Compact,
            "json" => config.logging.format = LogFormat::Json,
            other => tracing::warn!("unknown TAPLINK_LOG_FORMAT `{other}`, keeping configured"),
        }
    }
    if let Some(hours) = env_var("TAPLINK_RECONCILE_HOURS") {
        match hours.parse() {
            Ok(h) => config.reconcile.interval_hours = h,
            Err(_) => tracing::warn!("invalid TAPLINK_RECONCILE_HOURS `{hours}`, keeping configured"),
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn write_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let contents = toml::to_string_pretty(config)?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let tmp = path.with_extension("toml.tmp");
    fs::write(&tmp, data).map_err(|source| ConfigError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = Config::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.codes.default_kind, "profile");
        assert_eq!(parsed.reconcile.interval_hours, 24);
    }

    #[test]
    fn empty_file_parses_to_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.logging.filter, "info");
        assert_eq!(parsed.codes.generated_length, 8);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let parsed: Config = toml::from_str("[codes]\ndefault_kind = \"card\"\n").unwrap();
        assert_eq!(parsed.codes.default_kind, "card");
        assert_eq!(parsed.codes.generated_length, 8);
        assert_eq!(parsed.reconcile.interval_hours, 24);
    }

    #[test]
    #[allow(unsafe_code)]
    fn env_overrides_win_over_file_values() {
        unsafe {
            std::env::set_var("TAPLINK_DB_PATH", "/tmp/override.sqlite");
            std::env::set_var("TAPLINK_LOG_FORMAT", "json");
        }

        let mut config: Config = toml::from_str("[logging]\nformat = \"pretty\"\n").unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        apply_env_overrides(&mut config);

        assert_eq!(
            config.database.path.as_deref(),
            Some(Path::new("/tmp/override.sqlite"))
        );
        assert_eq!(config.logging.format, LogFormat::Json);

        unsafe {
            std::env::remove_var("TAPLINK_DB_PATH");
            std::env::remove_var("TAPLINK_LOG_FORMAT");
        }
    }
}

//! Loads the protocol configuration from TOML.
//!
//! Lookup order: `--config <file>` if given, otherwise `config.toml` in the
//! platform config directory if it exists, otherwise built-in defaults.
//! Fields missing from the file keep their defaults.

use crate::error::CliError;
use directories::ProjectDirs;
use hamtab_xtab_core::XtabConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "hamtab", "xtabctl").map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn load(explicit: Option<&Path>) -> Result<XtabConfig, CliError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|path| path.exists()),
    };
    let config = match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            let text = fs::read_to_string(&path).map_err(|source| CliError::ConfigRead {
                path: path.clone(),
                source,
            })?;
            parse(&text).map_err(|source| CliError::ConfigParse { path, source })?
        }
        None => XtabConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn parse(text: &str) -> Result<XtabConfig, toml::de::Error> {
    toml::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse("heartbeat_ms = 1000\nlease_ms = 4000\n").unwrap();
        assert_eq!(config.heartbeat_ms, 1000);
        assert_eq!(config.lease_ms, 4000);
        assert_eq!(config.leader_key, XtabConfig::default().leader_key);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "heartbeat_ms = 5000\nlease_ms = 1000").unwrap();
        let err = load(Some(file.path())).unwrap_err();
        assert!(matches!(err, CliError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = load(Some(Path::new("/nonexistent/xtabctl.toml"))).unwrap_err();
        assert!(matches!(err, CliError::ConfigRead { .. }));
    }
}

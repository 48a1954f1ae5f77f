//! Configuration file and command-line merging

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use docfork_core::{DatabaseConfig, ResolverKind};
use serde::Deserialize;

/// Contents of a `docfork.toml` file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub db: Option<PathBuf>,
    pub resolver: Option<ResolverKind>,
    pub resolver_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Values given on the command line (or through the environment)
#[derive(Debug, Default)]
pub struct Overrides {
    pub db: Option<PathBuf>,
    pub resolver: Option<ResolverKind>,
    pub resolver_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
}

/// Effective settings after merging file and command line
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db: PathBuf,
    pub resolver: ResolverKind,
    pub resolver_timeout: Option<Duration>,
    pub log_level: String,
}

impl Settings {
    /// Command-line values win over the file; the database path is required
    pub fn resolve(file: FileConfig, cli: Overrides) -> Result<Self> {
        let db = cli
            .db
            .or(file.db)
            .context("no database path: pass --db or set `db` in the config file")?;

        Ok(Self {
            db,
            resolver: cli.resolver.or(file.resolver).unwrap_or_default(),
            resolver_timeout: cli
                .resolver_timeout_ms
                .or(file.resolver_timeout_ms)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            log_level: cli
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| "warn".to_string()),
        })
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            resolver_timeout: self.resolver_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let file = FileConfig::parse(
            r#"
            db = "/var/lib/docfork/docs.db"
            resolver = "merge"
            resolver_timeout_ms = 250
            log_level = "debug"
            "#,
        )
        .unwrap();

        let settings = Settings::resolve(file, Overrides::default()).unwrap();
        assert_eq!(settings.db, PathBuf::from("/var/lib/docfork/docs.db"));
        assert_eq!(settings.resolver, ResolverKind::Merge);
        assert_eq!(settings.resolver_timeout, Some(Duration::from_millis(250)));
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_command_line_overrides_file() {
        let file = FileConfig::parse("db = \"a.db\"\nresolver = \"give-up\"").unwrap();
        let cli = Overrides {
            db: Some(PathBuf::from("b.db")),
            resolver: Some(ResolverKind::TargetWins),
            ..Default::default()
        };

        let settings = Settings::resolve(file, cli).unwrap();
        assert_eq!(settings.db, PathBuf::from("b.db"));
        assert_eq!(settings.resolver, ResolverKind::TargetWins);
        assert_eq!(settings.resolver_timeout, None);
    }

    #[test]
    fn test_missing_database_path_is_an_error() {
        assert!(Settings::resolve(FileConfig::default(), Overrides::default()).is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(FileConfig::parse("dbpath = \"x\"").is_err());
        assert!(FileConfig::parse("resolver = \"coin-flip\"").is_err());
    }
}

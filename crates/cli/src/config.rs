//! Project configuration: `elif.yaml` plus `DATABASE_*` overrides

use elif_migrate::{DbOptions, Driver, MigrateError, MigrateResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "elif.yaml";

/// Deployment environment, from `ELIF_ENV` then `APP_ENV`
#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Testing,
    Staging,
    Production,
    Custom(String),
}

impl Environment {
    pub fn from_name(env: &str) -> Self {
        match env.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "testing" | "test" => Environment::Testing,
            "staging" | "stage" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            custom => Environment::Custom(custom.to_string()),
        }
    }

    pub fn current() -> Self {
        std::env::var("ELIF_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .map(|env| Environment::from_name(&env))
            .unwrap_or(Environment::Development)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Custom(name) => name,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSection {
    pub driver: Option<Driver>,
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceSection {
    pub directory: Option<PathBuf>,
    pub module: Option<String>,
    /// Ledger table; only meaningful for migrations
    pub table: Option<String>,
}

/// Contents of `elif.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    pub database: Option<DatabaseSection>,
    #[serde(default)]
    pub migrations: SourceSection,
    #[serde(default)]
    pub seeders: SourceSection,
}

impl ProjectConfig {
    /// Read `<project>/elif.yaml`; a missing file yields the defaults
    pub fn load(project_dir: &Path) -> MigrateResult<Self> {
        let path = project_dir.join(CONFIG_FILE);
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no project config, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        Self::parse(&content)
            .map_err(|e| MigrateError::Configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Apply `DATABASE_HOST`, `DATABASE_USERNAME`, `DATABASE_PASSWORD`,
    /// `DATABASE_NAME` and `DATABASE_DRIVER` on top of the file values
    pub fn apply_env<F>(&mut self, lookup: F) -> MigrateResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = [
            "DATABASE_HOST",
            "DATABASE_USERNAME",
            "DATABASE_PASSWORD",
            "DATABASE_NAME",
            "DATABASE_DRIVER",
        ]
        .map(|key| lookup(key).filter(|value| !value.is_empty()));

        if overrides.iter().all(Option::is_none) {
            return Ok(());
        }

        let [host, username, password, database, driver] = overrides;
        let section = self.database.get_or_insert_with(DatabaseSection::default);
        if let Some(host) = host {
            section.host = Some(host);
        }
        if let Some(username) = username {
            section.username = Some(username);
        }
        if let Some(password) = password {
            section.password = Some(password);
        }
        if let Some(database) = database {
            section.database = Some(database);
        }
        if let Some(driver) = driver {
            section.driver = Some(driver.parse()?);
        }
        Ok(())
    }

    /// Connection options, or `None` when nothing configures a database
    pub fn db_options(&self) -> Option<DbOptions> {
        self.database.as_ref().map(|section| DbOptions {
            driver: section.driver.unwrap_or_default(),
            host: section.host.clone().unwrap_or_default(),
            username: section.username.clone().unwrap_or_default(),
            password: section.password.clone().unwrap_or_default(),
            database: section.database.clone().unwrap_or_default(),
        })
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.migrations
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("src/database/migrations"))
    }

    pub fn migrations_module(&self) -> String {
        self.migrations
            .module
            .clone()
            .unwrap_or_else(|| "database::migrations".to_string())
    }

    pub fn seeders_dir(&self) -> PathBuf {
        self.seeders
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("src/database/seeders"))
    }

    pub fn seeders_module(&self) -> String {
        self.seeders
            .module
            .clone()
            .unwrap_or_else(|| "database::seeders".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
database:
  driver: mysql
  host: 127.0.0.1:3306
  username: blog
  password: secret
  database: blog_dev
migrations:
  directory: db/migrations
  module: db::migrations
  table: schema_log
"#;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_full_config() {
        let config = ProjectConfig::parse(SAMPLE).unwrap();
        let db = config.db_options().unwrap();

        assert_eq!(db.driver, Driver::Mysql);
        assert_eq!(db.host, "127.0.0.1:3306");
        assert_eq!(db.database, "blog_dev");
        assert_eq!(config.migrations_dir(), PathBuf::from("db/migrations"));
        assert_eq!(config.migrations_module(), "db::migrations");
        assert_eq!(config.migrations.table.as_deref(), Some("schema_log"));
        assert_eq!(config.seeders_module(), "database::seeders");
    }

    #[test]
    fn test_defaults_without_database() {
        let config = ProjectConfig::parse("").unwrap();
        assert!(config.db_options().is_none());
        assert_eq!(config.migrations_dir(), PathBuf::from("src/database/migrations"));
        assert_eq!(config.seeders_dir(), PathBuf::from("src/database/seeders"));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = ProjectConfig::parse(SAMPLE).unwrap();
        config
            .apply_env(env(&[("DATABASE_HOST", "db.internal"), ("DATABASE_DRIVER", "postgres")]))
            .unwrap();

        let db = config.db_options().unwrap();
        assert_eq!(db.host, "db.internal");
        assert_eq!(db.driver, Driver::Postgres);
        assert_eq!(db.username, "blog");
    }

    #[test]
    fn test_env_alone_configures_database() {
        let mut config = ProjectConfig::default();
        config.apply_env(env(&[("DATABASE_NAME", "blog_test")])).unwrap();
        assert_eq!(config.db_options().unwrap().database, "blog_test");

        let mut untouched = ProjectConfig::default();
        untouched.apply_env(env(&[])).unwrap();
        assert!(untouched.db_options().is_none());
    }

    #[test]
    fn test_unknown_driver_is_rejected() {
        let mut config = ProjectConfig::default();
        assert!(config.apply_env(env(&[("DATABASE_DRIVER", "oracle")])).is_err());
    }

    #[test]
    fn test_environment_names() {
        assert!(Environment::from_name("PROD").is_production());
        assert!(!Environment::from_name("staging").is_production());
        assert_eq!(Environment::from_name("qa").as_str(), "qa");
    }
}

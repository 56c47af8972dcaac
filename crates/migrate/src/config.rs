//! Migration configuration and database connection options

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

use crate::error::{MigrateError, MigrateResult};

/// Default name of the ledger table
pub const DEFAULT_MIGRATIONS_TABLE: &str = "elif_migrations";

/// Environment variable that overrides the default ledger table name
pub const MIGRATIONS_TABLE_ENV: &str = "ELIF_MIGRATE_TABLE";

/// Configuration for the migration ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Table name for tracking migrations
    pub migrations_table: String,
}

impl MigrationConfig {
    /// Resolve the ledger table name.
    ///
    /// An explicit, non-empty value wins; otherwise `ELIF_MIGRATE_TABLE`;
    /// otherwise [`DEFAULT_MIGRATIONS_TABLE`].
    pub fn resolve(explicit: Option<&str>) -> MigrateResult<Self> {
        let table = explicit
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.trim().to_string())
            .or_else(|| {
                std::env::var(MIGRATIONS_TABLE_ENV)
                    .ok()
                    .filter(|t| !t.trim().is_empty())
            })
            .unwrap_or_else(|| DEFAULT_MIGRATIONS_TABLE.to_string());

        Self::with_table(table)
    }

    /// Use the given table name, validating it as a plain SQL identifier
    pub fn with_table(table: impl Into<String>) -> MigrateResult<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self {
            migrations_table: table,
        })
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
        }
    }
}

/// Ledger table names are interpolated into DDL, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> MigrateResult<()> {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    let ident = IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

    if ident.is_match(name) && name.len() <= 64 {
        Ok(())
    } else {
        Err(MigrateError::Configuration(format!(
            "'{}' is not a valid table name (letters, digits and underscores only)",
            name
        )))
    }
}

/// Supported database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
}

impl Driver {
    /// URL scheme for this driver
    pub fn scheme(&self) -> &'static str {
        match self {
            Driver::Postgres => "postgres",
            Driver::Mysql => "mysql",
            Driver::Sqlite => "sqlite",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.scheme()
    }

    /// Detect the driver from a connection URL
    pub fn from_url(url: &str) -> MigrateResult<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        scheme.parse()
    }
}

impl FromStr for Driver {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Driver::Postgres),
            "mysql" | "mariadb" => Ok(Driver::Mysql),
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            other => Err(MigrateError::Configuration(format!(
                "Unsupported database driver '{}' (expected postgres, mysql or sqlite)",
                other
            ))),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured database credentials handed to the runner and the compiled child
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DbOptions {
    #[serde(default)]
    pub driver: Driver,
    /// Host, optionally with `:port`
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Database name, or the database file for SQLite
    #[serde(default)]
    pub database: String,
}

impl DbOptions {
    /// Build a connection URL with credentials percent-encoded
    pub fn url(&self) -> MigrateResult<String> {
        if self.driver == Driver::Sqlite {
            return Ok(match self.database.as_str() {
                "" | ":memory:" => "sqlite::memory:".to_string(),
                path => format!("sqlite://{}?mode=rwc", path),
            });
        }

        if self.host.is_empty() {
            return Err(MigrateError::ConfigMissing("database host is empty".to_string()));
        }

        let mut url = Url::parse(&format!("{}://{}", self.driver.scheme(), self.host))
            .map_err(|e| MigrateError::Configuration(format!("Invalid database host '{}': {}", self.host, e)))?;

        if !self.username.is_empty() {
            url.set_username(&self.username)
                .map_err(|_| MigrateError::Configuration("Invalid database username".to_string()))?;
        }
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| MigrateError::Configuration("Invalid database password".to_string()))?;
        }
        url.set_path(&format!("/{}", self.database));

        Ok(url.to_string())
    }
}

impl fmt::Debug for DbOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbOptions")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

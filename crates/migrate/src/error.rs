//! Error types for the migration engine
//!
//! Pre-flight failures (`ConfigMissing`, `DirectoryMissing`) are kept apart from
//! build and runtime failures so operators can tell "not configured" from
//! "does not compile" from "a migration broke".

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error types for migration, seeding and runner operations
#[derive(Error, Debug)]
pub enum MigrateError {
    /// No database configuration was supplied
    #[error("Database configuration not found: {0}")]
    ConfigMissing(String),

    /// The migration or seeder source directory does not exist
    #[error("Source directory not found: {}", .0.display())]
    DirectoryMissing(PathBuf),

    /// The generated entry-point program failed to compile
    #[error("Build failed (use --verbose for details): {0}")]
    BuildFailed(String),

    /// The compiled child process exited unsuccessfully
    #[error("{}", child_failure(.code))]
    ChildProcessFailed { code: Option<i32> },

    /// A single migration step failed; earlier steps of the same call stay applied
    #[error("Migration '{name}' failed: {message}")]
    MigrationStepFailed { name: String, message: String },

    /// A seeder routine failed
    #[error("Seeder '{name}' failed: {message}")]
    SeederFailed { name: String, message: String },

    /// `--seeder` named a routine that is not registered
    #[error("Seeder '{0}' is not registered")]
    SeederNotFound(String),

    /// The ledger table could not be created or read
    #[error("Migration table '{table}' is unavailable: {message}")]
    LedgerTableUnavailable { table: String, message: String },

    /// A registry received the same name twice
    #[error("'{0}' is already registered")]
    DuplicateName(String),

    /// The project's Cargo.toml could not be used
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// A configuration value is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Entry-point or scaffold generation failed
    #[error("Template error: {0}")]
    Template(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn child_failure(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("Child process exited with status {}", code),
        None => "Child process was terminated by a signal".to_string(),
    }
}

impl MigrateError {
    /// Wrap a user migration failure, keeping the whole context chain
    pub fn step_failed(name: impl Into<String>, err: anyhow::Error) -> Self {
        MigrateError::MigrationStepFailed {
            name: name.into(),
            message: format!("{:#}", err),
        }
    }

    /// Wrap a user seeder failure, keeping the whole context chain
    pub fn seeder_failed(name: impl Into<String>, err: anyhow::Error) -> Self {
        MigrateError::SeederFailed {
            name: name.into(),
            message: format!("{:#}", err),
        }
    }

    /// True for errors raised before any build or execution work
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            MigrateError::ConfigMissing(_) | MigrateError::DirectoryMissing(_)
        )
    }

    /// Process exit code to report for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrateError::ChildProcessFailed { code: Some(code) } if *code != 0 => *code,
            _ => 1,
        }
    }
}

impl From<tera::Error> for MigrateError {
    fn from(err: tera::Error) -> Self {
        MigrateError::Template(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_step_failure_keeps_context_chain() {
        let err = Err::<(), _>(anyhow::anyhow!("column exists"))
            .context("adding email column")
            .unwrap_err();

        let err = MigrateError::step_failed("20240101_add_email", err);
        let message = err.to_string();
        assert!(message.contains("20240101_add_email"));
        assert!(message.contains("adding email column"));
        assert!(message.contains("column exists"));
    }

    #[test]
    fn test_database_error_is_reported_once() {
        let err = anyhow::Error::from(MigrateError::from(sqlx::Error::RowNotFound));
        let message = MigrateError::step_failed("20240101_users", err).to_string();

        assert_eq!(message.matches("no rows returned").count(), 1, "{}", message);
    }

    #[test]
    fn test_preflight_classification() {
        assert!(MigrateError::ConfigMissing("elif.yaml".into()).is_preflight());
        assert!(MigrateError::DirectoryMissing(PathBuf::from("x")).is_preflight());
        assert!(!MigrateError::BuildFailed("boom".into()).is_preflight());
    }

    #[test]
    fn test_exit_code_follows_child() {
        assert_eq!(MigrateError::ChildProcessFailed { code: Some(3) }.exit_code(), 3);
        assert_eq!(MigrateError::ChildProcessFailed { code: None }.exit_code(), 1);
        assert_eq!(MigrateError::Configuration("x".into()).exit_code(), 1);
    }
}

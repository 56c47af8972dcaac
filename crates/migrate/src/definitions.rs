//! Migration Definitions - Core types shared by the migrator and the runner
//!
//! Defines ledger records, operation results and the ledger commands that
//! travel from the CLI to the compiled migrator program.

use std::fmt;
use std::str::FromStr;

use crate::error::MigrateError;

/// A row of the ledger table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Database-assigned, monotonically increasing id
    pub id: i64,
    /// Migration name
    pub migration: String,
    /// Batch number (for grouping migrations)
    pub batch: i64,
}

/// Result of running migrations
#[derive(Debug, Default)]
pub struct MigrationRunResult {
    /// Names of migrations that were applied, in order
    pub applied_migrations: Vec<String>,
    /// Batch the applied migrations were recorded under
    pub batch: Option<i64>,
    /// Number of migrations that were skipped (already applied)
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }

    /// True when there was nothing to migrate
    pub fn is_empty(&self) -> bool {
        self.applied_migrations.is_empty()
    }
}

/// Result of rolling back migrations
#[derive(Debug, Default)]
pub struct RollbackResult {
    /// Names of migrations that were rolled back, newest first
    pub rolled_back_migrations: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl RollbackResult {
    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back_migrations.len()
    }

    /// True when there was nothing to rollback
    pub fn is_empty(&self) -> bool {
        self.rolled_back_migrations.is_empty()
    }
}

/// Result of `refresh`
#[derive(Debug, Default)]
pub struct RefreshResult {
    pub reset: RollbackResult,
    pub run: MigrationRunResult,
}

/// Result of `fresh`
#[derive(Debug, Default)]
pub struct FreshResult {
    /// Tables removed during the drop phase (the ledger included)
    pub dropped_tables: Vec<String>,
    pub run: MigrationRunResult,
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        /// Batch number
        batch: i64,
    },
}

/// Status line for one registered migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub name: String,
    pub state: MigrationState,
}

/// Ledger operation requested of a migrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::Subcommand)]
pub enum LedgerCommand {
    /// Run pending migrations
    Up,
    /// Rollback the last batch of migrations
    Rollback,
    /// Rollback every applied migration
    Reset,
    /// Reset and re-run all migrations
    Refresh,
    /// Drop all tables and re-run all migrations
    Fresh,
    /// Show migration status
    Status,
}

impl LedgerCommand {
    /// Subcommand name on the child-process command line
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerCommand::Up => "up",
            LedgerCommand::Rollback => "rollback",
            LedgerCommand::Reset => "reset",
            LedgerCommand::Refresh => "refresh",
            LedgerCommand::Fresh => "fresh",
            LedgerCommand::Status => "status",
        }
    }

    /// Whether the command changes the database
    pub fn is_mutating(&self) -> bool {
        !matches!(self, LedgerCommand::Status)
    }

    /// Whether the command deletes data irreversibly
    pub fn is_destructive(&self) -> bool {
        matches!(self, LedgerCommand::Fresh)
    }
}

impl fmt::Display for LedgerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerCommand {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(LedgerCommand::Up),
            "rollback" => Ok(LedgerCommand::Rollback),
            "reset" => Ok(LedgerCommand::Reset),
            "refresh" => Ok(LedgerCommand::Refresh),
            "fresh" => Ok(LedgerCommand::Fresh),
            "status" => Ok(LedgerCommand::Status),
            other => Err(MigrateError::Configuration(format!(
                "Unknown migrate command '{}'",
                other
            ))),
        }
    }
}

/// One unit of work for an executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Migrate(LedgerCommand),
    Seed { seeder: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_round_trip() {
        for command in [
            LedgerCommand::Up,
            LedgerCommand::Rollback,
            LedgerCommand::Reset,
            LedgerCommand::Refresh,
            LedgerCommand::Fresh,
            LedgerCommand::Status,
        ] {
            assert_eq!(command.as_str().parse::<LedgerCommand>().unwrap(), command);
        }
        assert!("sideways".parse::<LedgerCommand>().is_err());
    }

    #[test]
    fn test_command_classification() {
        assert!(LedgerCommand::Up.is_mutating());
        assert!(!LedgerCommand::Status.is_mutating());
        assert!(LedgerCommand::Fresh.is_destructive());
        assert!(!LedgerCommand::Reset.is_destructive());
    }
}

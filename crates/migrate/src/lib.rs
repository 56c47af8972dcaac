//! # elif-migrate
//!
//! Ledger-tracked schema migrations and seeders for elif.rs projects.
//!
//! Migrations are Rust code owned by the application crate. A project exposes
//! them through a registry hook:
//!
//! ```ignore
//! // src/database/migrations/mod.rs
//! use elif_migrate::{MigrateResult, MigrationRegistry};
//!
//! mod m20240101_120000_create_users;
//!
//! pub fn registry() -> MigrateResult<MigrationRegistry> {
//!     MigrationRegistry::new().with(m20240101_120000_create_users::CreateUsers)
//! }
//! ```
//!
//! `elifrs migrate up` compiles a small program calling that hook (see
//! [`runner`]), caches it per project and runs it against the configured
//! database. Code that already links the migrations can drive a [`Migrator`]
//! directly instead; both paths sit behind [`Executor`].

pub mod checksum;
pub mod child;
pub mod config;
pub mod database;
pub mod definitions;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod logging;
pub mod migrator;
pub mod registry;
pub mod runner;
pub mod scaffold;
pub mod seeder;
pub mod templates;

pub use checksum::{calculate_checksum, path_hash};
pub use config::{DbOptions, Driver, MigrationConfig, DEFAULT_MIGRATIONS_TABLE, MIGRATIONS_TABLE_ENV};
pub use database::{Database, Dialect};
pub use definitions::{
    FreshResult, Invocation, LedgerCommand, MigrationRecord, MigrationRunResult, MigrationState,
    MigrationStatus, RefreshResult, RollbackResult,
};
pub use error::{MigrateError, MigrateResult};
pub use executor::{select_executor, CompiledExecutor, DirectExecutor, Executor};
pub use ledger::Ledger;
pub use migrator::Migrator;
pub use registry::{FnMigration, Migration, MigrationRegistry, SqlMigration};
pub use runner::{Runner, RunnerKind, RunnerSettings};
pub use seeder::{FnSeeder, SeedRunner, Seeder, SeederRegistry};

// Used by generated and scaffolded project code
pub use anyhow;
pub use async_trait::async_trait;

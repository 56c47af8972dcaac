//! Entry points of the generated migrator and seeder programs
//!
//! The generated `main.rs` is a single call into this module:
//!
//! ```ignore
//! fn main() -> std::process::ExitCode {
//!     elif_migrate::child::migrate_main(my_app::database::migrations::registry())
//! }
//! ```
//!
//! Everything the parent passes arrives as command-line flags; credentials are
//! never read from the environment.

use clap::{Args, Parser};
use console::style;
use std::future::Future;
use std::process::ExitCode;

use crate::config::{DbOptions, Driver, MigrationConfig};
use crate::database::Database;
use crate::definitions::LedgerCommand;
use crate::error::MigrateResult;
use crate::logging::{init_logging, LoggingConfig};
use crate::migrator::Migrator;
use crate::registry::MigrationRegistry;
use crate::seeder::{SeedRunner, SeederRegistry};

/// Database connection flags shared by both programs
#[derive(Debug, Clone, Args)]
pub struct DbArgs {
    #[arg(long, value_enum, global = true, default_value_t = Driver::Postgres)]
    pub driver: Driver,

    #[arg(long, global = true, default_value = "", allow_hyphen_values = true)]
    pub host: String,

    #[arg(long, global = true, default_value = "", allow_hyphen_values = true)]
    pub username: String,

    #[arg(long, global = true, default_value = "", allow_hyphen_values = true)]
    pub password: String,

    #[arg(long, global = true, default_value = "", allow_hyphen_values = true)]
    pub database: String,
}

impl DbArgs {
    pub fn into_options(self) -> DbOptions {
        DbOptions {
            driver: self.driver,
            host: self.host,
            username: self.username,
            password: self.password,
            database: self.database,
        }
    }
}

/// Flags understood by the DbArgs parser, in order
pub fn db_flags(options: &DbOptions) -> Vec<String> {
    vec![
        "--driver".to_string(),
        options.driver.to_string(),
        "--host".to_string(),
        options.host.clone(),
        "--username".to_string(),
        options.username.clone(),
        "--password".to_string(),
        options.password.clone(),
        "--database".to_string(),
        options.database.clone(),
    ]
}

#[derive(Debug, Parser)]
#[command(name = "elif-migrator", about = "Project migrations compiled by elifrs")]
pub struct ChildMigrateArgs {
    #[command(subcommand)]
    pub command: LedgerCommand,

    #[command(flatten)]
    pub db: DbArgs,

    /// Ledger table name
    #[arg(long, global = true)]
    pub table: Option<String>,
}

#[derive(Debug, Parser)]
#[command(name = "elif-seeder", about = "Project seeders compiled by elifrs")]
pub struct ChildSeedArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Run only this seeder
    #[arg(long)]
    pub seeder: Option<String>,
}

/// `main` of the generated migrator program
pub fn migrate_main(registry: MigrateResult<MigrationRegistry>) -> ExitCode {
    let args = ChildMigrateArgs::parse();
    init_logging(LoggingConfig::from_env());
    block_on(async move { run_migrate(args, registry?).await })
}

/// `main` of the generated seeder program
pub fn seed_main(registry: MigrateResult<SeederRegistry>) -> ExitCode {
    let args = ChildSeedArgs::parse();
    init_logging(LoggingConfig::from_env());
    block_on(async move { run_seed(args, registry?).await })
}

pub async fn run_migrate(args: ChildMigrateArgs, registry: MigrationRegistry) -> MigrateResult<()> {
    let config = MigrationConfig::resolve(args.table.as_deref())?;
    let db = Database::connect_with(&args.db.into_options()).await?;
    tracing::debug!(command = %args.command, table = %config.migrations_table, "migrator started");

    let migrator = Migrator::new(db, registry, config).await?;
    let result = migrator.run(args.command).await;
    migrator.database().close().await;
    result
}

pub async fn run_seed(args: ChildSeedArgs, registry: SeederRegistry) -> MigrateResult<()> {
    let db = Database::connect_with(&args.db.into_options()).await?;
    tracing::debug!(seeder = ?args.seeder, "seeder started");

    let result = SeedRunner::new(&registry)
        .run(&db, args.seeder.as_deref())
        .await
        .map(|_| ());
    db.close().await;
    result
}

fn block_on<F>(future: F) -> ExitCode
where
    F: Future<Output = MigrateResult<()>>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(future) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

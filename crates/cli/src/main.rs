mod commands;
mod config;

use clap::{Args, Parser, Subcommand};
use console::style;
use elif_migrate::logging::{init_logging, LoggingConfig};
use elif_migrate::{LedgerCommand, MigrateResult};
use std::path::PathBuf;
use std::process::ExitCode;

use commands::{CommandContext, GlobalArgs};

#[derive(Parser)]
#[command(name = "elifrs")]
#[command(about = "elif.rs database tooling: migrations and seeders")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalFlags,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalFlags {
    /// Project root holding Cargo.toml and elif.yaml
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Skip confirmations and allow running in production
    #[arg(long, short, global = true)]
    force: bool,

    /// Stream build output and raise log verbosity
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Rebuild the cached migrator even if sources are unchanged
    #[arg(long, global = true)]
    rebuild: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migrations
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },

    /// Database seeding
    Db {
        #[command(subcommand)]
        db_command: DbCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    #[command(flatten)]
    Ledger(LedgerCommand),

    /// Create a new migration
    Create {
        /// Migration name, e.g. create_users_table
        name: String,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Run database seeders
    Seed {
        /// Run only the named seeder
        #[arg(long)]
        seeder: Option<String>,
    },

    /// Create a new seeder
    MakeSeeder {
        /// Seeder name, e.g. UserSeeder
        name: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(LoggingConfig::from_env().verbose(cli.global.verbose));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("❌").red(), e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> MigrateResult<()> {
    let ctx = CommandContext::load(GlobalArgs {
        project: cli.global.project,
        force: cli.global.force,
        verbose: cli.global.verbose,
        rebuild: cli.global.rebuild,
    })?;

    match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Ledger(command) => commands::migrate::run(&ctx, command).await,
            MigrateCommands::Create { name } => commands::migrate::create(&ctx, &name),
        },
        Commands::Db { db_command } => match db_command {
            DbCommands::Seed { seeder } => commands::db::seed(&ctx, seeder).await,
            DbCommands::MakeSeeder { name } => commands::db::make_seeder(&ctx, &name),
        },
    }
}

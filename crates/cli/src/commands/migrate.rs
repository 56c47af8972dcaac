use chrono::Utc;
use console::style;
use elif_migrate::{scaffold, Invocation, LedgerCommand, MigrateError, MigrateResult};
use inquire::Confirm;

use super::CommandContext;

/// `elifrs migrate <up|rollback|refresh|reset|fresh|status>`
pub async fn run(ctx: &CommandContext, command: LedgerCommand) -> MigrateResult<()> {
    if command.is_mutating() {
        ctx.guard(&format!("run `migrate {}`", command))?;
    }

    if command.is_destructive() && !ctx.args.force && !confirm_fresh(ctx)? {
        println!("Cancelled.");
        return Ok(());
    }

    ctx.executor()?
        .execute(&Invocation::Migrate(command))
        .await
}

/// `elifrs migrate create NAME`
pub fn create(ctx: &CommandContext, name: &str) -> MigrateResult<()> {
    let dir = ctx.args.project.join(ctx.config.migrations_dir());
    let created = scaffold::create_migration(&dir, name, Utc::now())?;

    println!("{} {}", style("Created migration:").green(), created.path.display());
    println!();
    println!("Register it in {}:", dir.join("mod.rs").display());
    println!("    mod {};", created.module);
    println!("    {}", created.registration);
    Ok(())
}

fn confirm_fresh(ctx: &CommandContext) -> MigrateResult<bool> {
    let target = ctx
        .config
        .db_options()
        .map(|db| db.database)
        .unwrap_or_else(|| "the configured database".to_string());

    println!(
        "{} `migrate fresh` drops every table in {} ({} environment).",
        style("WARNING:").red().bold(),
        target,
        ctx.environment.as_str()
    );

    Confirm::new("Drop all tables and re-run every migration?")
        .with_default(false)
        .with_help_message("Pass --force to skip this prompt")
        .prompt()
        .map_err(|e| MigrateError::Configuration(format!("Failed to get confirmation: {}", e)))
}

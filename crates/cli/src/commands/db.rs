use console::style;
use elif_migrate::{scaffold, Invocation, MigrateResult};

use super::CommandContext;

/// `elifrs db seed [--seeder NAME]`
pub async fn seed(ctx: &CommandContext, seeder: Option<String>) -> MigrateResult<()> {
    ctx.guard("seed the database")?;

    ctx.executor()?
        .execute(&Invocation::Seed { seeder })
        .await
}

/// `elifrs db make-seeder NAME`
pub fn make_seeder(ctx: &CommandContext, name: &str) -> MigrateResult<()> {
    let dir = ctx.args.project.join(ctx.config.seeders_dir());
    let created = scaffold::create_seeder(&dir, name)?;

    println!("{} {}", style("Created seeder:").green(), created.path.display());
    println!();
    println!("Register it in {}:", dir.join("mod.rs").display());
    println!("    mod {};", created.module);
    println!("    {}", created.registration);
    println!("Run it alone with: elifrs db seed --seeder {}", created.name);
    Ok(())
}

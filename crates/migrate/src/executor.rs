//! Executors - one capability, two ways of running project migrations
//!
//! [`DirectExecutor`] runs in-process against a live handle when the caller
//! already links the migrations. [`CompiledExecutor`] goes through the
//! [`Runner`] bridge when it does not.

use async_trait::async_trait;

use crate::definitions::Invocation;
use crate::error::{MigrateError, MigrateResult};
use crate::migrator::Migrator;
use crate::runner::Runner;
use crate::seeder::{SeedRunner, SeederRegistry};

/// Apply a named set of migrations or seeders
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> MigrateResult<()>;

    /// Short name for logs
    fn mode(&self) -> &'static str;
}

/// In-process executor over a live database handle
pub struct DirectExecutor {
    migrator: Migrator,
    seeders: SeederRegistry,
}

impl DirectExecutor {
    pub fn new(migrator: Migrator, seeders: SeederRegistry) -> Self {
        Self { migrator, seeders }
    }

    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }
}

#[async_trait]
impl Executor for DirectExecutor {
    async fn execute(&self, invocation: &Invocation) -> MigrateResult<()> {
        match invocation {
            Invocation::Migrate(command) => self.migrator.run(*command).await,
            Invocation::Seed { seeder } => {
                SeedRunner::new(&self.seeders)
                    .run(self.migrator.database(), seeder.as_deref())
                    .await?;
                Ok(())
            }
        }
    }

    fn mode(&self) -> &'static str {
        "direct"
    }
}

/// Executor that builds and spawns the project's compiled programs
#[derive(Debug, Clone)]
pub struct CompiledExecutor {
    migrator: Runner,
    seeder: Runner,
}

impl CompiledExecutor {
    pub fn new(migrator: Runner, seeder: Runner) -> Self {
        Self { migrator, seeder }
    }
}

#[async_trait]
impl Executor for CompiledExecutor {
    async fn execute(&self, invocation: &Invocation) -> MigrateResult<()> {
        let runner = match invocation {
            Invocation::Migrate(_) => self.migrator.clone(),
            Invocation::Seed { .. } => self.seeder.clone(),
        };
        let invocation = invocation.clone();

        // Building and waiting on the child block; keep them off the async workers.
        tokio::task::spawn_blocking(move || runner.run(&invocation))
            .await
            .map_err(|e| MigrateError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    fn mode(&self) -> &'static str {
        "compiled"
    }
}

/// Prefer the in-process executor whenever a live handle exists
pub fn select_executor<F>(direct: Option<DirectExecutor>, compiled: F) -> MigrateResult<Box<dyn Executor>>
where
    F: FnOnce() -> MigrateResult<CompiledExecutor>,
{
    let executor: Box<dyn Executor> = match direct {
        Some(direct) => Box::new(direct),
        None => Box::new(compiled()?),
    };
    tracing::debug!(mode = executor.mode(), "executor selected");
    Ok(executor)
}

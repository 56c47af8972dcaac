pub mod db;
pub mod migrate;

use elif_migrate::{
    select_executor, CompiledExecutor, Executor, MigrateError, MigrateResult, Runner, RunnerKind,
    RunnerSettings,
};
use std::path::PathBuf;

use crate::config::{Environment, ProjectConfig};

/// Flags shared by every database command
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub project: PathBuf,
    pub force: bool,
    pub verbose: bool,
    pub rebuild: bool,
}

/// Everything a command needs about the project it runs in
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub args: GlobalArgs,
    pub config: ProjectConfig,
    pub environment: Environment,
}

impl CommandContext {
    pub fn load(args: GlobalArgs) -> MigrateResult<Self> {
        let mut config = ProjectConfig::load(&args.project)?;
        config.apply_env(|key| std::env::var(key).ok())?;

        Ok(Self {
            args,
            config,
            environment: Environment::current(),
        })
    }

    /// Refuse to change a production database without `--force`
    pub fn guard(&self, action: &str) -> MigrateResult<()> {
        if self.environment.is_production() && !self.args.force {
            return Err(MigrateError::Configuration(format!(
                "refusing to {} in production; re-run with --force",
                action
            )));
        }
        Ok(())
    }

    pub fn runner_settings(&self, kind: RunnerKind) -> RunnerSettings {
        let project = &self.args.project;
        let (source_dir, module_path) = match kind {
            RunnerKind::Migrate => (self.config.migrations_dir(), self.config.migrations_module()),
            RunnerKind::Seed => (self.config.seeders_dir(), self.config.seeders_module()),
        };

        let mut settings = RunnerSettings::new(project, project.join(source_dir), module_path);
        settings.db = self.config.db_options();
        settings.table = self.config.migrations.table.clone();
        settings.verbose = self.args.verbose;
        settings.rebuild = self.args.rebuild;
        settings
    }

    /// The CLI never links project code, so it always goes through the compiled runner
    pub fn executor(&self) -> MigrateResult<Box<dyn Executor>> {
        select_executor(None, || {
            Ok(CompiledExecutor::new(
                Runner::new(RunnerKind::Migrate, self.runner_settings(RunnerKind::Migrate)),
                Runner::new(RunnerKind::Seed, self.runner_settings(RunnerKind::Seed)),
            ))
        })
    }
}

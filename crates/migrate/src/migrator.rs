//! Migrator - executes ledger operations against a connected database
//!
//! No transaction spans a whole `up` or `rollback` call: each migration owns its
//! own atomicity, since most schema statements cannot be rolled back anyway.
//! A failing step stops the call and leaves the ledger as it was after the
//! last successful step; re-running `up` skips every name already recorded.

use console::style;
use std::collections::HashSet;
use std::time::Instant;

use crate::config::MigrationConfig;
use crate::database::Database;
use crate::definitions::{
    FreshResult, LedgerCommand, MigrationRecord, MigrationRunResult, MigrationState,
    MigrationStatus, RefreshResult, RollbackResult,
};
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::Ledger;
use crate::registry::MigrationRegistry;

/// Migrator bound to one database handle and one registry
pub struct Migrator {
    db: Database,
    registry: MigrationRegistry,
    ledger: Ledger,
}

impl Migrator {
    /// Create a migrator, creating the ledger table if it is missing
    pub async fn new(
        db: Database,
        registry: MigrationRegistry,
        config: MigrationConfig,
    ) -> MigrateResult<Self> {
        let ledger = Ledger::new(config.migrations_table, db.dialect());
        ledger.ensure_table(&db).await?;

        Ok(Self {
            db,
            registry,
            ledger,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Apply every registered migration not yet in the ledger, in registration order
    pub async fn up(&self) -> MigrateResult<MigrationRunResult> {
        let start_time = Instant::now();
        self.ledger.ensure_table(&self.db).await?;

        let applied: HashSet<String> = self
            .ledger
            .records(&self.db)
            .await?
            .into_iter()
            .map(|record| record.migration)
            .collect();

        let pending: Vec<_> = self
            .registry
            .iter()
            .filter(|migration| !applied.contains(migration.name()))
            .collect();

        if pending.is_empty() {
            return Ok(MigrationRunResult {
                skipped_count: applied.len(),
                execution_time_ms: start_time.elapsed().as_millis(),
                ..Default::default()
            });
        }

        let batch = self.ledger.next_batch(&self.db).await?;
        tracing::info!(batch, pending = pending.len(), "applying migrations");

        let mut applied_migrations = Vec::with_capacity(pending.len());
        for migration in pending {
            let name = migration.name();
            println!("{} {}", style("Migrating:").yellow(), name);

            migration
                .up(&self.db)
                .await
                .map_err(|e| MigrateError::step_failed(name, e))?;
            self.ledger.insert(&self.db, name, batch).await?;

            println!("{}  {}", style("Migrated:").green(), name);
            applied_migrations.push(name.to_string());
        }

        Ok(MigrationRunResult {
            applied_migrations,
            batch: Some(batch),
            skipped_count: applied.len(),
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Revert the batch with the highest batch number
    pub async fn rollback(&self) -> MigrateResult<RollbackResult> {
        let start_time = Instant::now();
        self.ledger.ensure_table(&self.db).await?;

        let Some(batch) = self.ledger.max_batch(&self.db).await? else {
            return Ok(RollbackResult {
                execution_time_ms: start_time.elapsed().as_millis(),
                ..Default::default()
            });
        };

        let records = self.ledger.records_in_batch(&self.db, batch).await?;
        tracing::info!(batch, count = records.len(), "rolling back batch");

        let rolled_back_migrations = self.rollback_records(records).await?;
        Ok(RollbackResult {
            rolled_back_migrations,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Revert every applied migration regardless of batch, newest first
    pub async fn reset(&self) -> MigrateResult<RollbackResult> {
        let start_time = Instant::now();
        self.ledger.ensure_table(&self.db).await?;

        let records = self.ledger.records_newest_first(&self.db).await?;
        let rolled_back_migrations = self.rollback_records(records).await?;

        Ok(RollbackResult {
            rolled_back_migrations,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// `reset` followed by `up`
    pub async fn refresh(&self) -> MigrateResult<RefreshResult> {
        let reset = self.reset().await?;
        let run = self.up().await?;
        Ok(RefreshResult { reset, run })
    }

    /// Drop every table, recreate the ledger and run all migrations.
    ///
    /// Irreversible. Confirmation belongs to the caller; this drops unconditionally.
    pub async fn fresh(&self) -> MigrateResult<FreshResult> {
        let dropped_tables = self.db.drop_all_tables().await?;
        println!("{}", style("Dropped all tables successfully.").cyan());

        self.ledger.ensure_table(&self.db).await?;
        println!("{}", style("Migration table created successfully.").cyan());

        let run = self.up().await?;
        Ok(FreshResult {
            dropped_tables,
            run,
        })
    }

    /// Status of every registered migration, in registration order
    pub async fn status(&self) -> MigrateResult<Vec<MigrationStatus>> {
        self.ledger.ensure_table(&self.db).await?;
        let records = self.ledger.records(&self.db).await?;

        Ok(self
            .registry
            .iter()
            .map(|migration| {
                let state = records
                    .iter()
                    .find(|record| record.migration == migration.name())
                    .map_or(MigrationState::Pending, |record| MigrationState::Applied {
                        batch: record.batch,
                    });
                MigrationStatus {
                    name: migration.name().to_string(),
                    state,
                }
            })
            .collect())
    }

    /// Run a ledger command and print its outcome
    pub async fn run(&self, command: LedgerCommand) -> MigrateResult<()> {
        match command {
            LedgerCommand::Up => report_run(&self.up().await?),
            LedgerCommand::Rollback => report_rollback(&self.rollback().await?),
            LedgerCommand::Reset => report_rollback(&self.reset().await?),
            LedgerCommand::Refresh => {
                let result = self.refresh().await?;
                report_rollback(&result.reset);
                report_run(&result.run);
            }
            LedgerCommand::Fresh => report_run(&self.fresh().await?.run),
            LedgerCommand::Status => report_status(&self.status().await?),
        }
        Ok(())
    }

    async fn rollback_records(&self, records: Vec<MigrationRecord>) -> MigrateResult<Vec<String>> {
        let mut rolled_back = Vec::with_capacity(records.len());

        for record in records {
            println!("{} {}", style("Rolling back:").yellow(), record.migration);

            match self.registry.get(&record.migration) {
                Some(migration) if migration.reversible() => {
                    migration
                        .down(&self.db)
                        .await
                        .map_err(|e| MigrateError::step_failed(&record.migration, e))?;
                }
                Some(_) => {
                    tracing::debug!(migration = %record.migration, "no down step defined");
                }
                None => {
                    tracing::warn!(
                        migration = %record.migration,
                        "applied migration is not registered; removing ledger entry only"
                    );
                }
            }

            self.ledger.delete(&self.db, record.id).await?;
            println!("{}  {}", style("Rolled back:").green(), record.migration);
            rolled_back.push(record.migration);
        }

        Ok(rolled_back)
    }
}

fn report_run(result: &MigrationRunResult) {
    if result.is_empty() {
        println!("{}", style("Nothing to migrate.").cyan());
    } else {
        tracing::info!(
            applied = result.applied_count(),
            elapsed_ms = result.execution_time_ms as u64,
            "migrations applied"
        );
    }
}

fn report_rollback(result: &RollbackResult) {
    if result.is_empty() {
        println!("{}", style("Nothing to rollback.").cyan());
    } else {
        tracing::info!(
            rolled_back = result.rolled_back_count(),
            elapsed_ms = result.execution_time_ms as u64,
            "migrations rolled back"
        );
    }
}

fn report_status(statuses: &[MigrationStatus]) {
    if statuses.is_empty() {
        println!("No migrations registered.");
        return;
    }

    for status in statuses {
        match status.state {
            MigrationState::Applied { batch } => {
                println!("  {} {} (batch {})", style("Ran").green(), status.name, batch)
            }
            MigrationState::Pending => println!("  {} {}", style("Pending").yellow(), status.name),
        }
    }
}

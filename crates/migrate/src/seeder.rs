//! Database seeding
//!
//! Seeders are registered the same way migrations are: a project's seeder
//! module exposes `pub fn registry() -> MigrateResult<SeederRegistry>`.

use async_trait::async_trait;
use console::style;
use std::future::Future;
use std::pin::Pin;

use crate::database::Database;
use crate::error::{MigrateError, MigrateResult};

/// Seeder trait for implementing database seeders
#[async_trait]
pub trait Seeder: Send + Sync {
    /// Get the seeder name for logging and `--seeder` selection
    fn name(&self) -> &str;

    /// Run the seeder
    async fn run(&self, db: &Database) -> anyhow::Result<()>;
}

type SeedFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Custom seeder implementation backed by an async closure
pub struct FnSeeder {
    name: String,
    run_fn: Box<dyn for<'a> Fn(&'a Database) -> SeedFuture<'a> + Send + Sync>,
}

impl FnSeeder {
    pub fn new<F>(name: impl Into<String>, run_fn: F) -> Self
    where
        F: for<'a> Fn(&'a Database) -> SeedFuture<'a> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            run_fn: Box::new(run_fn),
        }
    }
}

#[async_trait]
impl Seeder for FnSeeder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, db: &Database) -> anyhow::Result<()> {
        (self.run_fn)(db).await
    }
}

/// Ordered set of seeders
#[derive(Default)]
pub struct SeederRegistry {
    seeders: Vec<Box<dyn Seeder>>,
}

impl std::fmt::Debug for SeederRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeederRegistry")
            .field("seeders", &self.names())
            .finish()
    }
}

impl SeederRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a seeder, rejecting duplicate names
    pub fn register<S: Seeder + 'static>(&mut self, seeder: S) -> MigrateResult<()> {
        if self.get(seeder.name()).is_some() {
            return Err(MigrateError::DuplicateName(seeder.name().to_string()));
        }
        self.seeders.push(Box::new(seeder));
        Ok(())
    }

    pub fn with<S: Seeder + 'static>(mut self, seeder: S) -> MigrateResult<Self> {
        self.register(seeder)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Seeder> {
        self.seeders
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.seeders.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.seeders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeders.is_empty()
    }
}

/// Runs registered seeders against a database
pub struct SeedRunner<'r> {
    registry: &'r SeederRegistry,
}

impl<'r> SeedRunner<'r> {
    pub fn new(registry: &'r SeederRegistry) -> Self {
        Self { registry }
    }

    /// Run one named seeder, or every seeder in registration order.
    ///
    /// Stops at the first failure. Returns the names that ran.
    pub async fn run(&self, db: &Database, selector: Option<&str>) -> MigrateResult<Vec<String>> {
        let selected: Vec<&dyn Seeder> = match selector {
            Some(name) => vec![self
                .registry
                .get(name)
                .ok_or_else(|| MigrateError::SeederNotFound(name.to_string()))?],
            None => self.registry.seeders.iter().map(|s| s.as_ref()).collect(),
        };

        if selected.is_empty() {
            println!("{}", style("Nothing to seed.").cyan());
            return Ok(Vec::new());
        }

        let mut ran = Vec::with_capacity(selected.len());
        for seeder in selected {
            println!("{} {}", style("Seeding:").yellow(), seeder.name());
            seeder
                .run(db)
                .await
                .map_err(|e| MigrateError::seeder_failed(seeder.name(), e))?;
            println!("{}  {}", style("Seeded:").green(), seeder.name());
            ran.push(seeder.name().to_string());
        }

        tracing::info!(count = ran.len(), "seeders completed");
        Ok(ran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_seeder(name: &'static str) -> FnSeeder {
        FnSeeder::new(name, move |db| {
            Box::pin(async move {
                db.execute(&format!("INSERT INTO seeded (name) VALUES ('{}')", name))
                    .await?;
                Ok(())
            })
        })
    }

    async fn seeded_names(db: &Database) -> Vec<String> {
        use sqlx::Row;
        sqlx::query("SELECT name FROM seeded ORDER BY rowid")
            .fetch_all(db.pool())
            .await
            .unwrap()
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect()
    }

    async fn setup() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.execute("CREATE TABLE seeded (name TEXT NOT NULL)").await.unwrap();
        db
    }

    fn registry() -> SeederRegistry {
        SeederRegistry::new()
            .with(insert_seeder("users"))
            .unwrap()
            .with(insert_seeder("posts"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_runs_all_seeders_in_registration_order() {
        let db = setup().await;
        let registry = registry();

        let ran = SeedRunner::new(&registry).run(&db, None).await.unwrap();
        assert_eq!(ran, vec!["users", "posts"]);
        assert_eq!(seeded_names(&db).await, vec!["users", "posts"]);
    }

    #[tokio::test]
    async fn test_runs_only_selected_seeder() {
        let db = setup().await;
        let registry = registry();

        let ran = SeedRunner::new(&registry).run(&db, Some("posts")).await.unwrap();
        assert_eq!(ran, vec!["posts"]);
        assert_eq!(seeded_names(&db).await, vec!["posts"]);
    }

    #[tokio::test]
    async fn test_unknown_seeder_is_an_error() {
        let db = setup().await;
        let registry = registry();

        let err = SeedRunner::new(&registry).run(&db, Some("comments")).await.unwrap_err();
        assert!(matches!(err, MigrateError::SeederNotFound(name) if name == "comments"));
        assert!(seeded_names(&db).await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_seeders() {
        let db = setup().await;
        let registry = SeederRegistry::new()
            .with(FnSeeder::new("broken", |_db| {
                Box::pin(async { Err(anyhow::anyhow!("constraint violated")) })
            }))
            .unwrap()
            .with(insert_seeder("users"))
            .unwrap();

        let err = SeedRunner::new(&registry).run(&db, None).await.unwrap_err();
        assert!(matches!(err, MigrateError::SeederFailed { ref name, .. } if name == "broken"));
        assert!(seeded_names(&db).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_registry_is_not_an_error() {
        let db = setup().await;
        let registry = SeederRegistry::new();
        assert!(SeedRunner::new(&registry).run(&db, None).await.unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_seeder_names_are_rejected() {
        let err = SeederRegistry::new()
            .with(insert_seeder("users"))
            .unwrap()
            .with(insert_seeder("users"))
            .unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateName(_)));
    }

    #[test]
    fn test_debug_lists_seeder_names() {
        let registry = SeederRegistry::new()
            .with(insert_seeder("users"))
            .unwrap()
            .with(insert_seeder("posts"))
            .unwrap();
        let debug = format!("{:?}", registry);
        assert!(debug.contains("\"users\""));
        assert!(debug.contains("\"posts\""));
    }
}

//! Migration Registry - the compiled-in set of named migrations
//!
//! A project's migration module exposes
//! `pub fn registry() -> MigrateResult<MigrationRegistry>`; the generated
//! migrator program calls it so every migration registers itself.
//! Iteration order is registration order, never a runtime sort.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

use crate::database::Database;
use crate::error::{MigrateError, MigrateResult};

/// A named apply/revert pair
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique name, conventionally timestamp-prefixed
    fn name(&self) -> &str;

    /// Apply the schema change
    async fn up(&self, db: &Database) -> anyhow::Result<()>;

    /// Revert the schema change
    async fn down(&self, _db: &Database) -> anyhow::Result<()> {
        Ok(())
    }

    /// Whether `down` is defined; irreversible migrations are only removed from the ledger
    fn reversible(&self) -> bool {
        true
    }
}

/// Migration backed by SQL scripts
#[derive(Debug, Clone)]
pub struct SqlMigration {
    name: String,
    up_sql: String,
    down_sql: Option<String>,
}

impl SqlMigration {
    pub fn new(name: impl Into<String>, up_sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up_sql: up_sql.into(),
            down_sql: None,
        }
    }

    pub fn with_down(mut self, down_sql: impl Into<String>) -> Self {
        self.down_sql = Some(down_sql.into());
        self
    }
}

#[async_trait]
impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, db: &Database) -> anyhow::Result<()> {
        db.execute_script(&self.up_sql).await?;
        Ok(())
    }

    async fn down(&self, db: &Database) -> anyhow::Result<()> {
        if let Some(sql) = &self.down_sql {
            db.execute_script(sql).await?;
        }
        Ok(())
    }

    fn reversible(&self) -> bool {
        self.down_sql.is_some()
    }
}

type StepFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
type StepFn = Box<dyn for<'a> Fn(&'a Database) -> StepFuture<'a> + Send + Sync>;

/// Migration backed by async closures
///
/// ```ignore
/// FnMigration::new("20240101_120000_create_users", |db| Box::pin(async move {
///     db.execute("CREATE TABLE users (id BIGINT PRIMARY KEY)").await?;
///     Ok(())
/// }))
/// .with_down(|db| Box::pin(async move {
///     db.execute("DROP TABLE users").await?;
///     Ok(())
/// }));
/// ```
pub struct FnMigration {
    name: String,
    up_fn: StepFn,
    down_fn: Option<StepFn>,
}

impl FnMigration {
    pub fn new<F>(name: impl Into<String>, up: F) -> Self
    where
        F: for<'a> Fn(&'a Database) -> StepFuture<'a> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            up_fn: Box::new(up),
            down_fn: None,
        }
    }

    pub fn with_down<F>(mut self, down: F) -> Self
    where
        F: for<'a> Fn(&'a Database) -> StepFuture<'a> + Send + Sync + 'static,
    {
        self.down_fn = Some(Box::new(down));
        self
    }
}

#[async_trait]
impl Migration for FnMigration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, db: &Database) -> anyhow::Result<()> {
        (self.up_fn)(db).await
    }

    async fn down(&self, db: &Database) -> anyhow::Result<()> {
        match &self.down_fn {
            Some(down) => down(db).await,
            None => Ok(()),
        }
    }

    fn reversible(&self) -> bool {
        self.down_fn.is_some()
    }
}

/// Ordered set of migration definitions
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration, rejecting duplicate names
    pub fn register<M: Migration + 'static>(&mut self, migration: M) -> MigrateResult<()> {
        if self.get(migration.name()).is_some() {
            return Err(MigrateError::DuplicateName(migration.name().to_string()));
        }
        self.migrations.push(Box::new(migration));
        Ok(())
    }

    /// Builder-style registration
    pub fn with<M: Migration + 'static>(mut self, migration: M) -> MigrateResult<Self> {
        self.register(migration)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Migration> {
        self.migrations
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Migration> {
        self.migrations.iter().map(|m| m.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.migrations.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("migrations", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_is_preserved() {
        let registry = MigrationRegistry::new()
            .with(SqlMigration::new("20240301_create_posts", "CREATE TABLE posts (id INTEGER)"))
            .unwrap()
            .with(SqlMigration::new("20240101_create_users", "CREATE TABLE users (id INTEGER)"))
            .unwrap();

        // Not sorted by name
        assert_eq!(
            registry.names(),
            vec!["20240301_create_posts", "20240101_create_users"]
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut registry = MigrationRegistry::new();
        registry.register(SqlMigration::new("a", "SELECT 1")).unwrap();

        let err = registry.register(SqlMigration::new("a", "SELECT 2")).unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateName(name) if name == "a"));
    }

    #[test]
    fn test_reversibility() {
        assert!(!SqlMigration::new("a", "SELECT 1").reversible());
        assert!(SqlMigration::new("a", "SELECT 1").with_down("SELECT 2").reversible());

        let up_only = FnMigration::new("b", |_db| Box::pin(async { Ok(()) }));
        assert!(!up_only.reversible());
        let both = FnMigration::new("c", |_db| Box::pin(async { Ok(()) }))
            .with_down(|_db| Box::pin(async { Ok(()) }));
        assert!(both.reversible());
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = MigrationRegistry::new()
            .with(SqlMigration::new("create_users", "CREATE TABLE users (id INTEGER)"))
            .unwrap();

        assert!(registry.get("create_users").is_some());
        assert!(registry.get("missing").is_none());
    }
}

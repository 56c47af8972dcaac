//! Migration Ledger - the table recording applied migrations and their batches

use sqlx::any::AnyRow;
use sqlx::Row;

use crate::database::{Database, Dialect};
use crate::definitions::MigrationRecord;
use crate::error::{MigrateError, MigrateResult};

/// Row access to the ledger table
#[derive(Debug, Clone)]
pub struct Ledger {
    table: String,
    dialect: Dialect,
}

impl Ledger {
    pub fn new(table: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            table: table.into(),
            dialect,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// SQL to create the migrations tracking table
    pub fn create_table_sql(&self) -> String {
        self.dialect.create_ledger_sql(&self.table)
    }

    /// SQL to get applied migrations in application order
    pub fn select_records_sql(&self) -> String {
        format!(
            "SELECT id, migration, batch FROM {} ORDER BY id ASC",
            self.quoted()
        )
    }

    /// SQL to get the highest batch number; NULL when the ledger is empty
    pub fn max_batch_sql(&self) -> String {
        format!("SELECT batch FROM {} ORDER BY batch DESC LIMIT 1", self.quoted())
    }

    /// SQL to get one batch, newest first
    pub fn select_batch_sql(&self) -> String {
        format!(
            "SELECT id, migration, batch FROM {} WHERE batch = {} ORDER BY id DESC",
            self.quoted(),
            self.dialect.placeholder(1)
        )
    }

    /// SQL to get every record, newest first
    pub fn select_newest_first_sql(&self) -> String {
        format!(
            "SELECT id, migration, batch FROM {} ORDER BY id DESC",
            self.quoted()
        )
    }

    /// SQL to record a migration as applied
    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (migration, batch) VALUES ({}, {})",
            self.quoted(),
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        )
    }

    /// SQL to remove a migration record (for rollback)
    pub fn delete_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE id = {}",
            self.quoted(),
            self.dialect.placeholder(1)
        )
    }

    /// Create the ledger table if it is absent
    pub async fn ensure_table(&self, db: &Database) -> MigrateResult<()> {
        db.execute(&self.create_table_sql())
            .await
            .map_err(|e| MigrateError::LedgerTableUnavailable {
                table: self.table.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// All records in application (id) order
    pub async fn records(&self, db: &Database) -> MigrateResult<Vec<MigrationRecord>> {
        let rows = sqlx::query(&self.select_records_sql())
            .fetch_all(db.pool())
            .await
            .map_err(|e| self.unavailable(e))?;
        rows.iter().map(Self::record_from_row).collect()
    }

    /// All records, highest id first
    pub async fn records_newest_first(&self, db: &Database) -> MigrateResult<Vec<MigrationRecord>> {
        let rows = sqlx::query(&self.select_newest_first_sql())
            .fetch_all(db.pool())
            .await
            .map_err(|e| self.unavailable(e))?;
        rows.iter().map(Self::record_from_row).collect()
    }

    /// Records of one batch, highest id first
    pub async fn records_in_batch(&self, db: &Database, batch: i64) -> MigrateResult<Vec<MigrationRecord>> {
        let rows = sqlx::query(&self.select_batch_sql())
            .bind(batch)
            .fetch_all(db.pool())
            .await
            .map_err(|e| self.unavailable(e))?;
        rows.iter().map(Self::record_from_row).collect()
    }

    /// The maximum batch present, never the batch of the highest id
    pub async fn max_batch(&self, db: &Database) -> MigrateResult<Option<i64>> {
        let row = sqlx::query(&self.max_batch_sql())
            .fetch_optional(db.pool())
            .await
            .map_err(|e| self.unavailable(e))?;

        match row {
            Some(row) => Ok(Some(row.try_get("batch")?)),
            None => Ok(None),
        }
    }

    /// Batch number for the next `up`: max + 1, or 1 for an empty ledger
    pub async fn next_batch(&self, db: &Database) -> MigrateResult<i64> {
        Ok(self.max_batch(db).await?.map_or(1, |batch| batch + 1))
    }

    /// Whether a migration name is recorded
    pub async fn contains(&self, db: &Database, name: &str) -> MigrateResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) AS total FROM {} WHERE migration = {}",
            self.quoted(),
            self.dialect.placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(name.to_string())
            .fetch_one(db.pool())
            .await
            .map_err(|e| self.unavailable(e))?;

        let total: i64 = row.try_get("total")?;
        Ok(total > 0)
    }

    pub async fn insert(&self, db: &Database, name: &str, batch: i64) -> MigrateResult<()> {
        sqlx::query(&self.insert_sql())
            .bind(name.to_string())
            .bind(batch)
            .execute(db.pool())
            .await?;
        Ok(())
    }

    pub async fn delete(&self, db: &Database, id: i64) -> MigrateResult<()> {
        sqlx::query(&self.delete_sql())
            .bind(id)
            .execute(db.pool())
            .await?;
        Ok(())
    }

    fn record_from_row(row: &AnyRow) -> MigrateResult<MigrationRecord> {
        Ok(MigrationRecord {
            id: row.try_get("id")?,
            migration: row.try_get("migration")?,
            batch: row.try_get("batch")?,
        })
    }

    fn quoted(&self) -> String {
        self.dialect.quote(&self.table)
    }

    fn unavailable(&self, err: sqlx::Error) -> MigrateError {
        MigrateError::LedgerTableUnavailable {
            table: self.table.clone(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_sql_generation() {
        let ledger = Ledger::new("elif_migrations", Dialect::Postgres);

        assert!(ledger
            .create_table_sql()
            .contains("CREATE TABLE IF NOT EXISTS \"elif_migrations\""));
        assert_eq!(
            ledger.insert_sql(),
            "INSERT INTO \"elif_migrations\" (migration, batch) VALUES ($1, $2)"
        );
        assert_eq!(
            ledger.delete_sql(),
            "DELETE FROM \"elif_migrations\" WHERE id = $1"
        );
        assert!(ledger.max_batch_sql().ends_with("ORDER BY batch DESC LIMIT 1"));
        assert!(ledger.select_batch_sql().ends_with("WHERE batch = $1 ORDER BY id DESC"));
    }

    #[test]
    fn test_mysql_placeholders() {
        let ledger = Ledger::new("schema_history", Dialect::MySql);
        assert_eq!(
            ledger.insert_sql(),
            "INSERT INTO `schema_history` (migration, batch) VALUES (?, ?)"
        );
    }

    #[tokio::test]
    async fn test_empty_ledger_starts_at_batch_one() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let ledger = Ledger::new("elif_migrations", db.dialect());
        ledger.ensure_table(&db).await.unwrap();

        assert_eq!(ledger.max_batch(&db).await.unwrap(), None);
        assert_eq!(ledger.next_batch(&db).await.unwrap(), 1);
        assert!(ledger.records(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_max_batch_ignores_insertion_order() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let ledger = Ledger::new("elif_migrations", db.dialect());
        ledger.ensure_table(&db).await.unwrap();
        ledger.insert(&db, "a", 3).await.unwrap();
        ledger.insert(&db, "b", 1).await.unwrap();

        assert_eq!(ledger.max_batch(&db).await.unwrap(), Some(3));
        assert_eq!(ledger.next_batch(&db).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let ledger = Ledger::new("elif_migrations", db.dialect());
        ledger.ensure_table(&db).await.unwrap();
        ledger.insert(&db, "a", 1).await.unwrap();
        ledger.ensure_table(&db).await.unwrap();

        assert_eq!(ledger.records(&db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_contains_and_delete() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let ledger = Ledger::new("elif_migrations", db.dialect());
        ledger.ensure_table(&db).await.unwrap();
        ledger.insert(&db, "a", 1).await.unwrap();

        assert!(ledger.contains(&db, "a").await.unwrap());
        assert!(!ledger.contains(&db, "b").await.unwrap());

        let id = ledger.records(&db).await.unwrap()[0].id;
        ledger.delete(&db, id).await.unwrap();
        assert!(!ledger.contains(&db, "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let ledger = Ledger::new("elif_migrations", db.dialect());
        ledger.ensure_table(&db).await.unwrap();
        ledger.insert(&db, "a", 1).await.unwrap();

        assert!(ledger.insert(&db, "a", 2).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_table_is_reported_as_unavailable() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let ledger = Ledger::new("never_created", db.dialect());

        let err = ledger.records(&db).await.unwrap_err();
        assert!(matches!(err, MigrateError::LedgerTableUnavailable { table, .. } if table == "never_created"));
    }
}

//! Database handle shared by the migrator, migrations and seeders
//!
//! Wraps a `sqlx::AnyPool` together with the [`Dialect`] that knows the
//! backend-specific SQL the ledger and `fresh` need.

use sqlparser::dialect::{MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};

use crate::config::{DbOptions, Driver};
use crate::error::MigrateResult;

/// Backend-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn from_driver(driver: Driver) -> Self {
        match driver {
            Driver::Postgres => Dialect::Postgres,
            Driver::Mysql => Dialect::MySql,
            Driver::Sqlite => Dialect::Sqlite,
        }
    }

    /// Bind placeholder for the `n`th (1-based) parameter
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Quote an identifier
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// DDL for the ledger table
    pub fn create_ledger_sql(&self, table: &str) -> String {
        let id_column = match self {
            Dialect::Postgres => "id BIGSERIAL PRIMARY KEY",
            Dialect::MySql => "id BIGINT AUTO_INCREMENT PRIMARY KEY",
            Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        };

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                {},\n    \
                migration VARCHAR(255) NOT NULL UNIQUE,\n    \
                batch BIGINT NOT NULL\n\
            )",
            self.quote(table),
            id_column
        )
    }

    /// Query listing every user table visible in the current schema, as column `name`
    pub fn list_tables_sql(&self) -> &'static str {
        match self {
            Dialect::Postgres => {
                "SELECT CAST(tablename AS TEXT) AS name FROM pg_catalog.pg_tables \
                 WHERE schemaname = current_schema() ORDER BY tablename"
            }
            Dialect::MySql => {
                "SELECT CAST(table_name AS CHAR) AS name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name"
            }
            Dialect::Sqlite => {
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
        }
    }

    pub fn drop_table_sql(&self, table: &str) -> String {
        match self {
            Dialect::Postgres => format!("DROP TABLE IF EXISTS {} CASCADE", self.quote(table)),
            Dialect::MySql | Dialect::Sqlite => format!("DROP TABLE IF EXISTS {}", self.quote(table)),
        }
    }

    /// Statements toggling foreign key enforcement around a bulk drop
    pub fn foreign_key_checks_sql(&self, enabled: bool) -> Option<&'static str> {
        match (self, enabled) {
            (Dialect::MySql, false) => Some("SET FOREIGN_KEY_CHECKS = 0"),
            (Dialect::MySql, true) => Some("SET FOREIGN_KEY_CHECKS = 1"),
            (Dialect::Sqlite, false) => Some("PRAGMA foreign_keys = OFF"),
            (Dialect::Sqlite, true) => Some("PRAGMA foreign_keys = ON"),
            (Dialect::Postgres, _) => None,
        }
    }

    /// Split a SQL script into statements using proper SQL parsing
    pub fn split_statements(&self, sql: &str) -> Vec<String> {
        let parsed = match self {
            Dialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql),
            Dialect::MySql => Parser::parse_sql(&MySqlDialect {}, sql),
            Dialect::Sqlite => Parser::parse_sql(&SQLiteDialect {}, sql),
        };

        match parsed {
            Ok(statements) => statements.into_iter().map(|stmt| stmt.to_string()).collect(),
            Err(e) => {
                // Dialect extensions the parser does not know still have to run
                tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
                sql.split(';')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect()
            }
        }
    }
}

/// Live database handle
#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
    dialect: Dialect,
}

impl Database {
    /// Connect with a single-connection pool; one session per invocation
    pub async fn connect(url: &str) -> MigrateResult<Self> {
        sqlx::any::install_default_drivers();

        let dialect = Dialect::from_driver(Driver::from_url(url)?);
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await?;

        tracing::debug!(?dialect, "connected to database");
        Ok(Self { pool, dialect })
    }

    /// Connect from structured credentials
    pub async fn connect_with(options: &DbOptions) -> MigrateResult<Self> {
        Self::connect(&options.url()?).await
    }

    /// Wrap an already-open pool
    pub fn from_pool(pool: AnyPool, dialect: Dialect) -> Self {
        Self { pool, dialect }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Execute a single statement, returning the affected row count
    pub async fn execute(&self, sql: &str) -> MigrateResult<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Execute every statement of a script in order
    pub async fn execute_script(&self, sql: &str) -> MigrateResult<()> {
        for statement in self.dialect.split_statements(sql) {
            if !statement.trim().is_empty() {
                sqlx::query(&statement).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    /// Names of all user tables in the current schema
    pub async fn table_names(&self) -> MigrateResult<Vec<String>> {
        let rows = sqlx::query(self.dialect.list_tables_sql())
            .fetch_all(&self.pool)
            .await?;

        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get::<String, _>("name")?);
        }
        Ok(names)
    }

    pub async fn has_table(&self, table: &str) -> MigrateResult<bool> {
        Ok(self.table_names().await?.iter().any(|name| name == table))
    }

    /// Drop every table visible to schema introspection.
    ///
    /// A table that fails to drop is logged and skipped. Returns the dropped names.
    pub async fn drop_all_tables(&self) -> MigrateResult<Vec<String>> {
        let tables = self.table_names().await?;
        let mut conn = self.pool.acquire().await?;

        if let Some(sql) = self.dialect.foreign_key_checks_sql(false) {
            sqlx::query(sql).execute(&mut *conn).await?;
        }

        let mut dropped = Vec::new();
        for table in tables {
            match sqlx::query(&self.dialect.drop_table_sql(&table))
                .execute(&mut *conn)
                .await
            {
                Ok(_) => dropped.push(table),
                Err(e) => tracing::warn!(table = %table, "failed to drop table: {}", e),
            }
        }

        if let Some(sql) = self.dialect.foreign_key_checks_sql(true) {
            sqlx::query(sql).execute(&mut *conn).await?;
        }

        Ok(dropped)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::MySql.placeholder(2), "?");
        assert_eq!(Dialect::Sqlite.placeholder(1), "?");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(Dialect::Postgres.quote("users"), "\"users\"");
        assert_eq!(Dialect::MySql.quote("users"), "`users`");
        assert_eq!(Dialect::Sqlite.quote("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_ledger_ddl_per_dialect() {
        let pg = Dialect::Postgres.create_ledger_sql("elif_migrations");
        assert!(pg.contains("CREATE TABLE IF NOT EXISTS \"elif_migrations\""));
        assert!(pg.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(pg.contains("migration VARCHAR(255) NOT NULL UNIQUE"));

        let mysql = Dialect::MySql.create_ledger_sql("elif_migrations");
        assert!(mysql.contains("AUTO_INCREMENT"));
        assert!(mysql.contains("`elif_migrations`"));

        let sqlite = Dialect::Sqlite.create_ledger_sql("elif_migrations");
        assert!(sqlite.contains("INTEGER PRIMARY KEY AUTOINCREMENT"));
    }

    #[test]
    fn test_split_statements() {
        let statements = Dialect::Sqlite.split_statements(
            "CREATE TABLE a (id INTEGER); CREATE TABLE b (id INTEGER);",
        );
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE a"));
    }

    #[test]
    fn test_split_falls_back_on_unparseable_sql() {
        let statements = Dialect::Postgres.split_statements("FROBNICATE things; FROBNICATE more");
        assert_eq!(statements, vec!["FROBNICATE things", "FROBNICATE more"]);
    }

    #[tokio::test]
    async fn test_sqlite_table_introspection_and_drop() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.execute_script("CREATE TABLE users (id INTEGER PRIMARY KEY); CREATE TABLE posts (id INTEGER PRIMARY KEY);")
            .await
            .unwrap();

        assert_eq!(db.table_names().await.unwrap(), vec!["posts", "users"]);
        assert!(db.has_table("users").await.unwrap());

        let dropped = db.drop_all_tables().await.unwrap();
        assert_eq!(dropped.len(), 2);
        assert!(db.table_names().await.unwrap().is_empty());
    }
}

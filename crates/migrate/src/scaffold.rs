//! Source file generation for `elifrs migrate create` and new seeders
//!
//! Only the file is written. Registering it in the module's `registry()` is
//! left to the developer; [`Scaffolded::registration`] holds the line to add.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tera::Context;

use crate::error::{MigrateError, MigrateResult};
use crate::templates::{TemplateEngine, MIGRATION, SEEDER};

/// A freshly written source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaffolded {
    pub path: PathBuf,
    /// Rust module name of the file
    pub module: String,
    pub struct_name: String,
    /// Registered name (ledger name for migrations, `--seeder` name for seeders)
    pub name: String,
    /// Builder call to add to `registry()`
    pub registration: String,
}

/// Write `m<YYYYmmdd_HHMMSS>_<snake_name>.rs` with empty `up`/`down` steps
pub fn create_migration(dir: &Path, name: &str, now: DateTime<Utc>) -> MigrateResult<Scaffolded> {
    let snake = snake_name(name)?;
    let timestamp = now.format("%Y%m%d_%H%M%S").to_string();
    let migration_name = format!("{}_{}", timestamp, snake);
    let module = format!("m{}", migration_name);
    let struct_name = to_pascal_case(&snake);

    let mut context = Context::new();
    context.insert("struct_name", &struct_name);
    context.insert("migration_name", &migration_name);
    context.insert("description", &format!("Migration: {}", name.trim()));

    let path = write_new(dir, &module, MIGRATION, &context)?;
    Ok(Scaffolded {
        path,
        registration: format!(".with({}::{})?", module, struct_name),
        module,
        struct_name,
        name: migration_name,
    })
}

/// Write `<snake_name>.rs` with an empty `run`
pub fn create_seeder(dir: &Path, name: &str) -> MigrateResult<Scaffolded> {
    let snake = snake_name(name)?;
    let seeder_name = snake.trim_end_matches("_seeder").to_string();
    let module = if snake.ends_with("_seeder") {
        snake.clone()
    } else {
        format!("{}_seeder", snake)
    };
    let struct_name = to_pascal_case(&module);

    let mut context = Context::new();
    context.insert("struct_name", &struct_name);
    context.insert("seeder_name", &seeder_name);

    let path = write_new(dir, &module, SEEDER, &context)?;
    Ok(Scaffolded {
        path,
        registration: format!(".with({}::{})?", module, struct_name),
        module,
        struct_name,
        name: seeder_name,
    })
}

fn write_new(dir: &Path, module: &str, template: &str, context: &Context) -> MigrateResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.rs", module));
    if path.exists() {
        return Err(MigrateError::Configuration(format!(
            "{} already exists",
            path.display()
        )));
    }

    let source = TemplateEngine::new()?.render_with_context(template, context)?;
    fs::write(&path, source)?;
    tracing::info!(path = %path.display(), "scaffolded");
    Ok(path)
}

fn snake_name(name: &str) -> MigrateResult<String> {
    let snake = to_snake_case(name.trim());
    if snake.is_empty() || snake.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(MigrateError::Configuration(format!(
            "'{}' cannot be used as a name; use letters, digits and underscores",
            name
        )));
    }
    Ok(snake)
}

/// `CreateUsers`, `create users` and `create-users` all become `create_users`
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    let mut prev_lower = false;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !result.is_empty() && !result.ends_with('_') {
                result.push('_');
            }
            prev_lower = false;
        }
    }
    result.trim_end_matches('_').to_string()
}

pub fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(to_snake_case("CreateUsers"), "create_users");
        assert_eq!(to_snake_case("create users table"), "create_users_table");
        assert_eq!(to_snake_case("add-email--to_users"), "add_email_to_users");
        assert_eq!(to_pascal_case("create_users"), "CreateUsers");
    }

    #[test]
    fn test_create_migration_file() {
        let temp = TempDir::new().unwrap();
        let created = create_migration(temp.path(), "CreateUsers", now()).unwrap();

        assert_eq!(created.module, "m20240309_140507_create_users");
        assert_eq!(created.name, "20240309_140507_create_users");
        assert_eq!(created.struct_name, "CreateUsers");
        assert_eq!(
            created.path,
            temp.path().join("m20240309_140507_create_users.rs")
        );
        assert_eq!(
            created.registration,
            ".with(m20240309_140507_create_users::CreateUsers)?"
        );

        let source = fs::read_to_string(&created.path).unwrap();
        assert!(source.contains("pub struct CreateUsers;"));
        assert!(source.contains("\"20240309_140507_create_users\""));
        assert!(source.contains("async fn up(&self, db: &Database)"));
        assert!(source.contains("async fn down(&self, db: &Database)"));
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let temp = TempDir::new().unwrap();
        create_migration(temp.path(), "create_users", now()).unwrap();
        let err = create_migration(temp.path(), "create_users", now()).unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(msg) if msg.contains("already exists")));
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(create_migration(temp.path(), "  --  ", now()).is_err());
        assert!(create_seeder(temp.path(), "9lives").is_err());
    }

    #[test]
    fn test_create_seeder_file() {
        let temp = TempDir::new().unwrap();
        let created = create_seeder(&temp.path().join("seeders"), "UserSeeder").unwrap();

        assert_eq!(created.module, "user_seeder");
        assert_eq!(created.struct_name, "UserSeeder");
        assert_eq!(created.name, "user");

        let source = fs::read_to_string(&created.path).unwrap();
        assert!(source.contains("impl Seeder for UserSeeder"));
        assert!(source.contains("\"user\""));
    }
}

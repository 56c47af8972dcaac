use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn elifrs(project: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_elifrs"))
        .arg("--project")
        .arg(project)
        .args(args)
        .env_remove("ELIF_ENV")
        .env_remove("APP_ENV")
        .env_remove("DATABASE_HOST")
        .env_remove("DATABASE_USERNAME")
        .env_remove("DATABASE_PASSWORD")
        .env_remove("DATABASE_NAME")
        .env_remove("DATABASE_DRIVER")
        .env("ELIF_CACHE_DIR", project.join(".cache"))
        .output()
        .expect("failed to run elifrs")
}

fn project_with_config(config: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("elif.yaml"), config).unwrap();
    temp
}

#[test]
fn test_migrate_create_writes_timestamped_file() {
    let project = project_with_config("");

    let output = elifrs(project.path(), &["migrate", "create", "CreateUsers"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let dir = project.path().join("src/database/migrations");
    let files: Vec<String> = fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with('m'));
    assert!(files[0].ends_with("_create_users.rs"));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("::CreateUsers)?"));
}

#[test]
fn test_make_seeder_uses_configured_directory() {
    let project = project_with_config("seeders:\n  directory: db/seeds\n");

    let output = elifrs(project.path(), &["db", "make-seeder", "UserSeeder"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(project.path().join("db/seeds/user_seeder.rs").is_file());
}

#[test]
fn test_missing_migrations_directory_fails_before_building() {
    let project = project_with_config("database:\n  driver: sqlite\n  database: app.db\n");

    let output = elifrs(project.path(), &["migrate", "up"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Source directory not found"), "{}", stderr);
    assert!(!project.path().join(".cache").exists());
}

#[test]
fn test_missing_database_config_is_reported() {
    let project = project_with_config("");
    fs::create_dir_all(project.path().join("src/database/migrations")).unwrap();

    let output = elifrs(project.path(), &["migrate", "up"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Database configuration not found"), "{}", stderr);
}

#[test]
fn test_production_requires_force() {
    let project = project_with_config("database:\n  driver: sqlite\n  database: app.db\n");
    fs::create_dir_all(project.path().join("src/database/migrations")).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_elifrs"))
        .arg("--project")
        .arg(project.path())
        .args(["migrate", "up"])
        .env("ELIF_ENV", "production")
        .env("ELIF_CACHE_DIR", project.path().join(".cache"))
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--force"), "{}", stderr);
}

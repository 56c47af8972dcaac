//! The user's project as seen by the runner: its manifest and cache identity

use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

use crate::checksum::path_hash;
use crate::error::{MigrateError, MigrateResult};

/// Package name of this library, as the user's manifest names it
pub const MIGRATE_PACKAGE: &str = "elif-migrate";

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "ELIF_CACHE_DIR";

/// What the generated crate needs to know about the user's `Cargo.toml`
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectManifest {
    pub dir: PathBuf,
    pub package_name: String,
    /// Name used in `use` paths: `[lib].name`, or the package name with `-` → `_`
    pub lib_name: String,
    /// The project's own `elif-migrate` dependency entry, paths made absolute
    pub migrate_dependency: Table,
}

impl ProjectManifest {
    pub fn read(project_dir: &Path) -> MigrateResult<Self> {
        let dir = project_dir
            .canonicalize()
            .map_err(|_| MigrateError::DirectoryMissing(project_dir.to_path_buf()))?;
        let manifest = read_table(&dir.join("Cargo.toml"))?;

        let package_name = manifest
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| MigrateError::Manifest("missing [package].name".to_string()))?
            .to_string();

        let has_lib = manifest.contains_key("lib") || dir.join("src/lib.rs").exists();
        if !has_lib {
            return Err(MigrateError::Manifest(format!(
                "package '{}' has no library target; migrations must be reachable from src/lib.rs",
                package_name
            )));
        }

        let lib_name = manifest
            .get("lib")
            .and_then(|lib| lib.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| package_name.replace('-', "_"));

        let migrate_dependency = migrate_dependency(&dir, &manifest)?;

        Ok(Self {
            dir,
            package_name,
            lib_name,
            migrate_dependency,
        })
    }

    /// `[dependencies.<package>]` body pointing at the project itself
    pub fn project_dependency_toml(&self) -> MigrateResult<String> {
        let mut table = Table::new();
        table.insert(
            "path".to_string(),
            Value::String(self.dir.to_string_lossy().into_owned()),
        );
        to_toml(&table)
    }

    /// `[dependencies.elif-migrate]` body
    pub fn migrate_dependency_toml(&self) -> MigrateResult<String> {
        to_toml(&self.migrate_dependency)
    }

    /// Nearest `Cargo.lock`, walking up from the project through its workspace
    pub fn lockfile(&self) -> Option<PathBuf> {
        self.dir
            .ancestors()
            .map(|dir| dir.join("Cargo.lock"))
            .find(|path| path.is_file())
    }
}

/// Stable per-project cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    pub name: String,
    pub path_hash: String,
}

impl ProjectIdentity {
    pub fn new(manifest: &ProjectManifest) -> Self {
        Self {
            name: manifest.package_name.clone(),
            path_hash: path_hash(&manifest.dir),
        }
    }

    /// `<cache_root>/<kind_dir>/<name>_<hash>`
    pub fn cache_dir(&self, cache_root: &Path, kind_dir: &str) -> PathBuf {
        cache_root
            .join(kind_dir)
            .join(format!("{}_{}", self.name, self.path_hash))
    }
}

/// `ELIF_CACHE_DIR`, else `~/.elif`
pub fn default_cache_root() -> MigrateResult<PathBuf> {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::home_dir()
        .map(|home| home.join(".elif"))
        .ok_or_else(|| {
            MigrateError::Configuration(format!(
                "cannot determine the home directory; set {}",
                CACHE_DIR_ENV
            ))
        })
}

fn read_table(path: &Path) -> MigrateResult<Table> {
    let content = fs::read_to_string(path)
        .map_err(|e| MigrateError::Manifest(format!("cannot read {}: {}", path.display(), e)))?;
    content
        .parse::<Table>()
        .map_err(|e| MigrateError::Manifest(format!("invalid {}: {}", path.display(), e)))
}

fn migrate_dependency(dir: &Path, manifest: &Table) -> MigrateResult<Table> {
    let entry = ["dependencies", "dev-dependencies"]
        .iter()
        .filter_map(|section| manifest.get(*section))
        .find_map(|deps| deps.get(MIGRATE_PACKAGE))
        .ok_or_else(|| {
            MigrateError::Manifest(format!(
                "package does not depend on {}; add it to [dependencies]",
                MIGRATE_PACKAGE
            ))
        })?;

    let mut table = match entry {
        Value::String(version) => {
            let mut table = Table::new();
            table.insert("version".to_string(), Value::String(version.clone()));
            return Ok(table);
        }
        Value::Table(table) => table.clone(),
        _ => {
            return Err(MigrateError::Manifest(format!(
                "unsupported {} dependency entry",
                MIGRATE_PACKAGE
            )))
        }
    };

    if table.get("workspace").and_then(Value::as_bool) == Some(true) {
        let (workspace_dir, inherited) = workspace_dependency(dir)?;
        let features = table.remove("features");
        table = absolutize(&workspace_dir, inherited);
        if let Some(features) = features {
            table.insert("features".to_string(), features);
        }
        return Ok(table);
    }

    table.remove("optional");
    Ok(absolutize(dir, table))
}

fn workspace_dependency(dir: &Path) -> MigrateResult<(PathBuf, Table)> {
    for ancestor in dir.ancestors().skip(1) {
        let path = ancestor.join("Cargo.toml");
        if !path.is_file() {
            continue;
        }

        let manifest = read_table(&path)?;
        let Some(workspace) = manifest.get("workspace") else {
            continue;
        };

        let entry = workspace
            .get("dependencies")
            .and_then(|deps| deps.get(MIGRATE_PACKAGE))
            .ok_or_else(|| {
                MigrateError::Manifest(format!(
                    "{} is inherited from the workspace but not declared in {}",
                    MIGRATE_PACKAGE,
                    path.display()
                ))
            })?;

        let table = match entry {
            Value::String(version) => {
                let mut table = Table::new();
                table.insert("version".to_string(), Value::String(version.clone()));
                table
            }
            Value::Table(table) => table.clone(),
            _ => {
                return Err(MigrateError::Manifest(format!(
                    "unsupported {} entry in {}",
                    MIGRATE_PACKAGE,
                    path.display()
                )))
            }
        };
        return Ok((ancestor.to_path_buf(), table));
    }

    Err(MigrateError::Manifest(format!(
        "{} uses workspace = true but no workspace manifest was found",
        MIGRATE_PACKAGE
    )))
}

fn absolutize(base: &Path, mut table: Table) -> Table {
    if let Some(Value::String(path)) = table.get("path") {
        let path = Path::new(path);
        if path.is_relative() {
            let absolute = base.join(path);
            table.insert(
                "path".to_string(),
                Value::String(absolute.to_string_lossy().into_owned()),
            );
        }
    }
    table
}

fn to_toml(table: &Table) -> MigrateResult<String> {
    toml::to_string(table).map_err(|e| MigrateError::Manifest(e.to_string()))
}

//! Compiled runner - builds, caches and executes the project's migrator program
//!
//! Migrations live in the user's crate, which this binary cannot link. The
//! runner writes a throwaway crate that depends on the project, builds it with
//! the project as working directory, caches the executable per project and
//! reuses it until the migration sources change.
//!
//! Cache layout: `<cache_root>/<kind>/<package>_<path-hash>/` holding the
//! binary, a `.checksum` marker, a `.lock` file and the cargo `target/` dir.

mod lock;
mod project;

pub use lock::CacheLock;
pub use project::{default_cache_root, ProjectIdentity, ProjectManifest, CACHE_DIR_ENV, MIGRATE_PACKAGE};

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use tera::Context;

use crate::checksum::calculate_checksum;
use crate::child::db_flags;
use crate::config::{DbOptions, MigrationConfig};
use crate::definitions::Invocation;
use crate::error::{MigrateError, MigrateResult};
use crate::templates::{TemplateEngine, ENTRY_CARGO_TOML, ENTRY_MAIN};

const CHECKSUM_FILE: &str = ".checksum";
const TEMP_DIR: &str = ".elif_tmp";
const BUILD_LOG_TAIL: usize = 40;

/// Which generated program a runner manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    Migrate,
    Seed,
}

impl RunnerKind {
    pub fn bin_name(&self) -> String {
        let base = match self {
            RunnerKind::Migrate => "elif-migrator",
            RunnerKind::Seed => "elif-seeder",
        };
        format!("{}{}", base, std::env::consts::EXE_SUFFIX)
    }

    /// Subdirectory of the cache root and of the project's temp dir
    pub fn dir_name(&self) -> &'static str {
        match self {
            RunnerKind::Migrate => "migrator",
            RunnerKind::Seed => "seeder",
        }
    }

    fn entry_fn(&self) -> &'static str {
        match self {
            RunnerKind::Migrate => "migrate_main",
            RunnerKind::Seed => "seed_main",
        }
    }

    fn package_name(&self) -> &'static str {
        match self {
            RunnerKind::Migrate => "elif-migrator",
            RunnerKind::Seed => "elif-seeder",
        }
    }
}

/// Inputs from the CLI
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Root of the user's crate (holds `Cargo.toml`)
    pub project_dir: PathBuf,
    /// Migration or seeder sources; hashed for staleness
    pub source_dir: PathBuf,
    /// Module exposing `registry()`, relative to the crate root, e.g. `database::migrations`
    pub module_path: String,
    pub db: Option<DbOptions>,
    /// Ledger table override
    pub table: Option<String>,
    /// Stream cargo output instead of capturing it
    pub verbose: bool,
    /// Rebuild even when the cache is fresh
    pub rebuild: bool,
    /// Defaults to [`default_cache_root`]
    pub cache_root: Option<PathBuf>,
}

impl RunnerSettings {
    pub fn new(project_dir: impl Into<PathBuf>, source_dir: impl Into<PathBuf>, module_path: impl Into<String>) -> Self {
        Self {
            project_dir: project_dir.into(),
            source_dir: source_dir.into(),
            module_path: module_path.into(),
            db: None,
            table: None,
            verbose: false,
            rebuild: false,
            cache_root: None,
        }
    }
}

/// Build-and-execute bridge for one program kind
#[derive(Debug, Clone)]
pub struct Runner {
    kind: RunnerKind,
    settings: RunnerSettings,
}

impl Runner {
    pub fn new(kind: RunnerKind, settings: RunnerSettings) -> Self {
        Self { kind, settings }
    }

    pub fn kind(&self) -> RunnerKind {
        self.kind
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Pre-flight checks, before any build or execution work
    pub fn validate(&self) -> MigrateResult<()> {
        if !self.settings.source_dir.is_dir() {
            return Err(MigrateError::DirectoryMissing(self.settings.source_dir.clone()));
        }
        if self.settings.db.is_none() {
            return Err(MigrateError::ConfigMissing(
                "no database section in elif.yaml and no DATABASE_* variables".to_string(),
            ));
        }
        validate_module_path(&self.settings.module_path)
    }

    pub fn manifest(&self) -> MigrateResult<ProjectManifest> {
        ProjectManifest::read(&self.settings.project_dir)
    }

    pub fn cache_dir(&self) -> MigrateResult<PathBuf> {
        let manifest = self.manifest()?;
        self.cache_dir_for(&manifest)
    }

    pub fn binary_path(&self) -> MigrateResult<PathBuf> {
        Ok(self.cache_dir()?.join(self.kind.bin_name()))
    }

    /// True when there is no cached binary, no readable marker, the sources
    /// changed since the last build, or a rebuild was requested.
    pub fn needs_build(&self) -> MigrateResult<bool> {
        let cache_dir = self.cache_dir()?;
        self.needs_build_in(&cache_dir)
    }

    /// Generate, compile and install the program
    pub fn build(&self) -> MigrateResult<()> {
        let manifest = self.manifest()?;
        let cache_dir = self.cache_dir_for(&manifest)?;
        fs::create_dir_all(&cache_dir)?;

        let checksum = calculate_checksum(&self.settings.source_dir)?;
        let temp_dir = manifest.dir.join(TEMP_DIR).join(self.kind.dir_name());

        let result = self
            .write_entry_crate(&manifest, &temp_dir)
            .and_then(|()| self.compile(&manifest, &temp_dir, &cache_dir));

        if let Err(e) = fs::remove_dir_all(&temp_dir) {
            tracing::debug!("could not remove {}: {}", temp_dir.display(), e);
        }
        // Only succeeds once the other kind's temp crate is gone too.
        let temp_root = manifest.dir.join(TEMP_DIR);
        if let Err(e) = fs::remove_dir(&temp_root) {
            tracing::debug!("keeping {}: {}", temp_root.display(), e);
        }

        let artifact = result?;
        self.install_artifact(&cache_dir, &artifact, &checksum)?;
        tracing::info!(binary = %cache_dir.join(self.kind.bin_name()).display(), "build cached");
        Ok(())
    }

    /// Replace the cached binary and then the checksum marker, each by atomic rename
    pub fn install_artifact(&self, cache_dir: &Path, artifact: &Path, checksum: &str) -> MigrateResult<()> {
        let binary = cache_dir.join(self.kind.bin_name());
        let partial = cache_dir.join(format!("{}.partial", self.kind.bin_name()));
        fs::copy(artifact, &partial)?;
        fs::rename(&partial, &binary)?;

        let marker = cache_dir.join(CHECKSUM_FILE);
        let marker_partial = cache_dir.join(format!("{}.partial", CHECKSUM_FILE));
        fs::write(&marker_partial, checksum)?;
        fs::rename(&marker_partial, &marker)?;
        Ok(())
    }

    /// Spawn the cached program with inherited stdio
    pub fn execute(&self, invocation: &Invocation) -> MigrateResult<()> {
        let binary = self.binary_path()?;
        let args = self.child_args(invocation)?;

        tracing::debug!(binary = %binary.display(), command = %args[0], "spawning child");
        let status = Command::new(&binary)
            .args(&args)
            .current_dir(&self.settings.project_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(MigrateError::ChildProcessFailed { code: status.code() })
        }
    }

    /// validate → lock → (build) → unlock → execute
    pub fn run(&self, invocation: &Invocation) -> MigrateResult<()> {
        self.validate()?;
        self.check_invocation(invocation)?;

        let manifest = self.manifest()?;
        let cache_dir = self.cache_dir_for(&manifest)?;
        {
            let _lock = CacheLock::acquire(&cache_dir)?;
            if self.needs_build_in(&cache_dir)? {
                println!("Building {}...", self.kind.bin_name());
                self.build()?;
            } else {
                tracing::debug!(cache = %cache_dir.display(), "reusing cached binary");
            }
        }

        self.execute(invocation)
    }

    /// Arguments for the child program: subcommand or selector plus DB flags
    pub fn child_args(&self, invocation: &Invocation) -> MigrateResult<Vec<String>> {
        self.check_invocation(invocation)?;
        let db = self.settings.db.as_ref().ok_or_else(|| {
            MigrateError::ConfigMissing("database options are required to run the program".to_string())
        })?;

        let mut args = Vec::new();
        match invocation {
            Invocation::Migrate(command) => {
                args.push(command.as_str().to_string());
                args.extend(db_flags(db));
                let config = MigrationConfig::resolve(self.settings.table.as_deref())?;
                args.push("--table".to_string());
                args.push(config.migrations_table);
            }
            Invocation::Seed { seeder } => {
                args.extend(db_flags(db));
                if let Some(name) = seeder {
                    args.push("--seeder".to_string());
                    args.push(name.clone());
                }
            }
        }
        Ok(args)
    }

    fn check_invocation(&self, invocation: &Invocation) -> MigrateResult<()> {
        let matches = matches!(
            (self.kind, invocation),
            (RunnerKind::Migrate, Invocation::Migrate(_)) | (RunnerKind::Seed, Invocation::Seed { .. })
        );
        if matches {
            Ok(())
        } else {
            Err(MigrateError::Configuration(format!(
                "{} cannot run {:?}",
                self.kind.bin_name(),
                invocation
            )))
        }
    }

    fn cache_dir_for(&self, manifest: &ProjectManifest) -> MigrateResult<PathBuf> {
        let root = match &self.settings.cache_root {
            Some(root) => root.clone(),
            None => default_cache_root()?,
        };
        Ok(ProjectIdentity::new(manifest).cache_dir(&root, self.kind.dir_name()))
    }

    fn needs_build_in(&self, cache_dir: &Path) -> MigrateResult<bool> {
        if self.settings.rebuild {
            tracing::debug!("rebuild requested");
            return Ok(true);
        }
        if !cache_dir.join(self.kind.bin_name()).is_file() {
            tracing::debug!("no cached binary");
            return Ok(true);
        }

        let stored = match fs::read_to_string(cache_dir.join(CHECKSUM_FILE)) {
            Ok(stored) => stored,
            Err(_) => {
                tracing::debug!("checksum marker missing");
                return Ok(true);
            }
        };

        let current = calculate_checksum(&self.settings.source_dir)?;
        let stale = stored.trim() != current;
        tracing::debug!(stale, "compared source checksum");
        Ok(stale)
    }

    fn write_entry_crate(&self, manifest: &ProjectManifest, temp_dir: &Path) -> MigrateResult<()> {
        if temp_dir.exists() {
            fs::remove_dir_all(temp_dir)?;
        }
        fs::create_dir_all(temp_dir.join("src"))?;

        let engine = TemplateEngine::new()?;
        let mut context = Context::new();
        context.insert("bin_name", self.kind.package_name());
        context.insert("project_package", &manifest.package_name);
        context.insert("project_dependency", &manifest.project_dependency_toml()?);
        context.insert("migrate_dependency", &manifest.migrate_dependency_toml()?);
        context.insert("entry_fn", self.kind.entry_fn());
        context.insert("crate_name", &manifest.lib_name);
        context.insert("module_path", &self.settings.module_path);

        fs::write(
            temp_dir.join("Cargo.toml"),
            engine.render_with_context(ENTRY_CARGO_TOML, &context)?,
        )?;
        fs::write(
            temp_dir.join("src/main.rs"),
            engine.render_with_context(ENTRY_MAIN, &context)?,
        )?;

        if let Some(lockfile) = manifest.lockfile() {
            fs::copy(lockfile, temp_dir.join("Cargo.lock"))?;
        }
        Ok(())
    }

    /// Run cargo; returns the path of the built executable
    fn compile(&self, manifest: &ProjectManifest, temp_dir: &Path, cache_dir: &Path) -> MigrateResult<PathBuf> {
        let target_dir = cache_dir.join("target");
        let cargo = std::env::var_os("CARGO").unwrap_or_else(|| "cargo".into());

        let mut command = Command::new(cargo);
        command
            .arg("build")
            .arg("--manifest-path")
            .arg(temp_dir.join("Cargo.toml"))
            .arg("--target-dir")
            .arg(&target_dir)
            .current_dir(&manifest.dir);

        tracing::debug!(?command, "building entry crate");
        let status = if self.settings.verbose {
            command
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()?
        } else {
            let output = command.output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(MigrateError::BuildFailed(tail(&stderr, BUILD_LOG_TAIL)));
            }
            output.status
        };

        if !status.success() {
            return Err(MigrateError::BuildFailed(format!("cargo exited with {}", status)));
        }

        let artifact = target_dir.join("debug").join(self.kind.bin_name());
        if !artifact.is_file() {
            return Err(MigrateError::BuildFailed(format!(
                "cargo succeeded but {} was not produced",
                artifact.display()
            )));
        }
        Ok(artifact)
    }
}

fn validate_module_path(module_path: &str) -> MigrateResult<()> {
    static MODULE_PATH: OnceLock<Regex> = OnceLock::new();
    let pattern = MODULE_PATH.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid regex")
    });

    if pattern.is_match(module_path) {
        Ok(())
    } else {
        Err(MigrateError::Configuration(format!(
            "'{}' is not a Rust module path",
            module_path
        )))
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

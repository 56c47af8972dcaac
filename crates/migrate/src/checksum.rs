//! SHA-256 checksum over a source tree, used to decide whether a cached
//! migrator binary is stale.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Compute the checksum of every `.rs` file below `dir`.
///
/// Files are hashed in sorted relative-path order, content first and then path,
/// so the result does not depend on directory iteration order. A missing
/// directory, or one without Rust sources, yields an empty string.
pub fn calculate_checksum(dir: &Path) -> io::Result<String> {
    if !dir.is_dir() {
        return Ok(String::new());
    }

    let mut files = Vec::new();
    collect_sources(dir, dir, &mut files)?;
    if files.is_empty() {
        return Ok(String::new());
    }
    files.sort();

    let mut hasher = Sha256::new();
    for relative in &files {
        let bytes = fs::read(dir.join(relative))?;
        hasher.update(&bytes);
        hasher.update(normalized(relative).as_bytes());
    }

    Ok(hex::encode(hasher.finalize()))
}

/// First 8 hex chars of the SHA-256 of an absolute path
pub fn path_hash(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
    hex::encode(digest)[..8].to_string()
}

fn collect_sources(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_sources(root, &path, out)?;
        } else if file_type.is_file() && path.extension().is_some_and(|ext| ext == "rs") {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    Ok(())
}

// Same digest on every platform.
fn normalized(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, contents: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let checksum = calculate_checksum(&temp.path().join("nope")).unwrap();
        assert!(checksum.is_empty());
    }

    #[test]
    fn test_directory_without_sources_is_empty() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "README.md", "# migrations");
        assert!(calculate_checksum(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_stable_for_unchanged_contents() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "mod.rs", "pub mod m1;");
        write(temp.path(), "m1.rs", "// create users");

        let first = calculate_checksum(temp.path()).unwrap();
        let second = calculate_checksum(temp.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_changes_when_bytes_change() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "m1.rs", "// create users");
        let before = calculate_checksum(temp.path()).unwrap();

        write(temp.path(), "m1.rs", "// create users and posts");
        assert_ne!(before, calculate_checksum(temp.path()).unwrap());
    }

    #[test]
    fn test_changes_when_path_changes() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "m1.rs", "// create users");
        let before = calculate_checksum(temp.path()).unwrap();

        fs::rename(temp.path().join("m1.rs"), temp.path().join("m2.rs")).unwrap();
        assert_ne!(before, calculate_checksum(temp.path()).unwrap());
    }

    #[test]
    fn test_nested_files_and_other_extensions() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "nested/m1.rs", "// nested");
        let before = calculate_checksum(temp.path()).unwrap();
        assert!(!before.is_empty());

        write(temp.path(), "notes.txt", "ignored");
        assert_eq!(before, calculate_checksum(temp.path()).unwrap());
    }

    #[test]
    fn test_path_hash_is_short_and_stable() {
        let hash = path_hash(Path::new("/srv/app"));
        assert_eq!(hash.len(), 8);
        assert_eq!(hash, path_hash(Path::new("/srv/app")));
        assert_ne!(hash, path_hash(Path::new("/srv/other")));
    }
}

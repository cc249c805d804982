//! Owner-only file helpers for credentials and session state.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Create `dir` (and missing parents) readable only by the current user.
///
/// Directories that already exist keep their permissions.
pub fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// Write `content` to `path` with mode 0600, creating a missing parent directory.
pub fn write_private_file(path: &Path, content: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_private_dir(parent)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    // An existing file keeps its old mode on open.
    restrict_file(&file, path)?;
    file.write_all(content.as_ref())
        .with_context(|| format!("Failed to write file: {}", path.display()))
}

/// Write `content` to `path` through a sibling temp file and a rename, so
/// `path` either holds the full content or does not exist.
pub fn write_file_atomic(path: &Path, content: impl AsRef<[u8]>) -> Result<()> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".part");
    let tmp = path.with_file_name(tmp_name);

    let written = std::fs::write(&tmp, content)
        .with_context(|| format!("Failed to write file: {}", tmp.display()))
        .and_then(|()| {
            std::fs::rename(&tmp, path)
                .with_context(|| format!("Failed to move file into place: {}", path.display()))
        });
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}

/// Remove a file or directory tree if it exists. Returns whether anything was removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to inspect {}", path.display()));
        }
    };

    if meta.is_dir() {
        std::fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    } else {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove file: {}", path.display()))?;
    }
    Ok(true)
}

#[cfg(unix)]
fn restrict_file(file: &std::fs::File, path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_file(_file: &std::fs::File, _path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn private_file_and_parent_are_owner_only() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new()?;
        let path = dir.path().join("state").join("secret.json");
        write_private_file(&path, "{}")?;

        let file_mode = std::fs::metadata(&path)?.permissions().mode() & 0o777;
        let dir_mode = std::fs::metadata(path.parent().unwrap())?.permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode, 0o700);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn existing_parent_keeps_its_mode() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new()?;
        let shared = dir.path().join("shared");
        std::fs::create_dir(&shared)?;
        std::fs::set_permissions(&shared, std::fs::Permissions::from_mode(0o755))?;

        write_private_file(&shared.join("credentials.json"), "{}")?;

        let dir_mode = std::fs::metadata(&shared)?.permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o755);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn rewriting_a_wide_file_restricts_it() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new()?;
        let path = dir.path().join("session.json");
        std::fs::write(&path, "old content that is longer")?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))?;

        write_private_file(&path, "new")?;

        assert_eq!(std::fs::read_to_string(&path)?, "new");
        assert_eq!(std::fs::metadata(&path)?.permissions().mode() & 0o777, 0o600);
        Ok(())
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("doc.pdf");

        write_file_atomic(&path, b"%PDF")?;

        assert_eq!(std::fs::read(&path)?, b"%PDF");
        let names: Vec<_> = std::fs::read_dir(dir.path())?
            .map(|e| e.map(|e| e.file_name()))
            .collect::<Result<_, _>>()?;
        assert_eq!(names, ["doc.pdf"]);
        Ok(())
    }

    #[test]
    fn failed_atomic_write_leaves_target_missing() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("missing-dir").join("doc.pdf");

        assert!(write_file_atomic(&path, b"%PDF").is_err());
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn remove_if_exists_handles_files_dirs_and_missing() -> Result<()> {
        let dir = TempDir::new()?;
        let file = dir.path().join("a.txt");
        let tree = dir.path().join("tree");
        std::fs::write(&file, "x")?;
        std::fs::create_dir_all(tree.join("nested"))?;

        assert!(remove_if_exists(&file)?);
        assert!(remove_if_exists(&tree)?);
        assert!(!remove_if_exists(&file)?);
        assert!(!file.exists());
        assert!(!tree.exists());
        Ok(())
    }
}

//! File system helpers

use std::io;
use std::path::Path;

/// Permission bits for directories created by the toolkit (`rwxr-xr-x`).
pub const DIR_MODE: u32 = 0o755;

/// Create `path` (and any missing parents) unless it already exists.
///
/// Idempotent: calling it on an existing directory is a no-op and leaves its
/// contents untouched.
pub async fn ensure_dir(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();

    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }

    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(path).await?;

    tracing::debug!(path = %path.display(), "Created directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_dir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("uploads");

        ensure_dir(&dir).await.unwrap();
        std::fs::write(dir.join("keep.txt"), b"keep").unwrap();

        ensure_dir(&dir).await.unwrap();
        assert_eq!(std::fs::read(dir.join("keep.txt")).unwrap(), b"keep");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ensure_dir_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("created");
        ensure_dir(&dir).await.unwrap();

        let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        // umask may only clear bits
        assert_eq!(mode & !DIR_MODE, 0);
        assert!(mode & 0o700 == 0o700);
    }
}

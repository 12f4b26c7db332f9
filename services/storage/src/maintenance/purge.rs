//! services/storage/src/maintenance/purge.rs
//!
//! Bulk deletion of workspaces under a root, used for "delete everything but
//! my session" and for clearing out a legacy storage location at startup.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use mdpdf_core::domain::META_FILENAME;
use mdpdf_core::{confine, normalize_token, SessionToken, StorageResult};
use tracing::{info, warn};

use crate::adapters::fs_workspace::remove_tree;

/// Returns the token of `path` if it looks like one of our workspaces.
///
/// A workspace is a real directory (not a symlink) whose name is a canonical
/// token and which holds a metadata file. Both checks are required so that
/// unrelated directories sharing the root are never touched.
pub fn workspace_token(path: &Path) -> Option<SessionToken> {
    let meta = fs::symlink_metadata(path).ok()?;
    if !meta.is_dir() {
        return None;
    }
    let token = normalize_token(path.file_name()?.to_str()?).ok()?;
    let meta_path = confine(path, [META_FILENAME]).ok()?;
    meta_path.is_file().then_some(token)
}

/// Deletes every workspace directly under `root` except those in `keep`.
///
/// Invalid keep entries are dropped. Returns how many workspaces are gone
/// afterwards, including ones another actor removed concurrently.
pub fn purge<I, S>(root: &Path, keep: I) -> StorageResult<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let keep: HashSet<SessionToken> = keep
        .into_iter()
        .filter_map(|raw| normalize_token(raw.as_ref()).ok())
        .collect();

    let root = match root.canonicalize() {
        Ok(root) => root,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut deleted = 0;
    for entry in fs::read_dir(&root)? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry during purge.");
                continue;
            }
        };
        let Some(token) = workspace_token(&path) else {
            continue;
        };
        if keep.contains(&token) {
            continue;
        }
        match remove_tree(&path) {
            Ok(()) => deleted += 1,
            Err(e) => warn!(error = %e, "Failed to purge workspace."),
        }
    }
    Ok(deleted)
}

/// One-time cleanup of workspaces left in a previous storage location.
///
/// Does nothing if the legacy root is missing or is the current root.
pub fn migrate_legacy_root(legacy_root: &Path, current_root: &Path) -> StorageResult<usize> {
    let legacy = match legacy_root.canonicalize() {
        Ok(path) => path,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    if current_root.canonicalize().ok().as_deref() == Some(legacy.as_path()) {
        return Ok(0);
    }
    let deleted = purge(&legacy, std::iter::empty::<&str>())?;
    if deleted > 0 {
        info!("Removed {} workspaces from the legacy storage root.", deleted);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fs_workspace::SessionWorkspace;
    use tempfile::TempDir;

    fn temp_root() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    #[test]
    fn purge_keeps_listed_and_foreign_directories() {
        let (_dir, root) = temp_root();
        let keep = SessionWorkspace::create(&root).unwrap();
        let drop_a = SessionWorkspace::create(&root).unwrap();
        let drop_b = SessionWorkspace::create(&root).unwrap();

        // Token-shaped but without metadata: not ours.
        let stray = root.join(SessionToken::generate().to_string());
        fs::create_dir(&stray).unwrap();
        // Has metadata but is not token-shaped.
        let other = root.join("photos");
        fs::create_dir(&other).unwrap();
        fs::write(other.join(META_FILENAME), b"{}").unwrap();

        let keep_list = [keep.token().to_string(), "not-a-token".to_string()];
        assert_eq!(purge(&root, &keep_list).unwrap(), 2);

        assert!(keep.exists());
        assert!(!drop_a.exists());
        assert!(!drop_b.exists());
        assert!(stray.is_dir());
        assert!(other.is_dir());
    }

    #[test]
    fn purge_of_missing_root_is_zero() {
        let (_dir, root) = temp_root();
        assert_eq!(purge(&root.join("absent"), std::iter::empty::<&str>()).unwrap(), 0);
    }

    #[test]
    fn purge_is_idempotent() {
        let (_dir, root) = temp_root();
        SessionWorkspace::create(&root).unwrap();
        assert_eq!(purge(&root, std::iter::empty::<&str>()).unwrap(), 1);
        assert_eq!(purge(&root, std::iter::empty::<&str>()).unwrap(), 0);
    }

    #[test]
    fn legacy_migration_skips_the_current_root() {
        let (_dir, root) = temp_root();
        SessionWorkspace::create(&root).unwrap();
        assert_eq!(migrate_legacy_root(&root, &root).unwrap(), 0);

        let (_legacy_dir, legacy) = temp_root();
        SessionWorkspace::create(&legacy).unwrap();
        assert_eq!(migrate_legacy_root(&legacy, &root).unwrap(), 1);
        assert_eq!(fs::read_dir(&root).unwrap().count(), 1);
    }
}

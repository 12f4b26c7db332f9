//! services/storage/src/adapters/fs_workspace.rs
//!
//! The filesystem-backed session workspace. Every path it touches is derived
//! through `confine`, and every file it writes is written atomically so a
//! failed write never leaves a half-written document, image or meta record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mdpdf_core::domain::{DOCUMENT_FILENAME, IMAGES_SUBDIR, META_FILENAME};
use mdpdf_core::images::{extension_for_content_type, is_allowed_image};
use mdpdf_core::{
    confine, is_safe_basename, normalize_token, SessionToken, StorageError, StorageResult,
    WorkspaceMeta,
};
use tracing::{debug, warn};
use uuid::Uuid;

//=========================================================================================
// The Workspace Struct
//=========================================================================================

/// One session's sandbox: `<root>/<token>/{document.md, images/, .meta.json}`.
#[derive(Debug, Clone)]
pub struct SessionWorkspace {
    token: SessionToken,
    root: PathBuf,
    document_path: PathBuf,
    images_dir: PathBuf,
    meta_path: PathBuf,
}

impl SessionWorkspace {
    /// Mints a fresh token and lays out its directory tree and metadata.
    ///
    /// `storage_root` must be canonical.
    pub fn create(storage_root: &Path) -> StorageResult<Self> {
        let workspace = Self::for_token(storage_root, SessionToken::generate())?;
        fs::create_dir_all(&workspace.images_dir)?;
        write_atomic(&workspace.meta_path, &WorkspaceMeta::fresh().to_json()?)?;
        debug!(token = %workspace.token, "Workspace created.");
        Ok(workspace)
    }

    /// Validates `raw_token` and computes the workspace paths.
    ///
    /// The directory is not required to exist; callers check with [`Self::exists`].
    pub fn open(storage_root: &Path, raw_token: &str) -> StorageResult<Self> {
        let token = normalize_token(raw_token)?;
        Self::for_token(storage_root, token)
    }

    pub fn for_token(storage_root: &Path, token: SessionToken) -> StorageResult<Self> {
        let root = confine(storage_root, [token.to_string()])?;
        Ok(Self {
            token,
            document_path: confine(&root, [DOCUMENT_FILENAME])?,
            images_dir: confine(&root, [IMAGES_SUBDIR])?,
            meta_path: confine(&root, [META_FILENAME])?,
            root,
        })
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    //=====================================================================================
    // Lifecycle
    //=====================================================================================

    /// Idempotently creates `images/` and a metadata record if either is missing.
    pub fn ensure_dirs(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.images_dir)?;
        if !self.meta_path.is_file() {
            write_atomic(&self.meta_path, &WorkspaceMeta::fresh().to_json()?)?;
        }
        Ok(())
    }

    /// Refreshes `last_access`. Fails with `NotFound` if the workspace is gone.
    pub fn touch(&self) -> StorageResult<()> {
        if !self.exists() {
            return Err(StorageError::NotFound);
        }
        self.ensure_dirs()?;
        let meta = self.read_meta().unwrap_or_else(|e| {
            warn!(error = %e, "Unreadable workspace metadata; rewriting it.");
            WorkspaceMeta::fresh()
        });
        write_atomic(&self.meta_path, &meta.touched().to_json()?)
    }

    pub fn read_meta(&self) -> StorageResult<WorkspaceMeta> {
        WorkspaceMeta::from_json(&fs::read(&self.meta_path)?)
    }

    /// Best-effort recursive removal. A workspace that is already gone is fine.
    pub fn delete(&self) {
        match remove_tree(&self.root) {
            Ok(()) => debug!(token = %self.token, "Workspace deleted."),
            Err(e) => warn!(error = %e, "Failed to remove workspace directory."),
        }
    }

    //=====================================================================================
    // Document and images
    //=====================================================================================

    pub fn save_document(&self, text: &str) -> StorageResult<()> {
        self.ensure_dirs()?;
        write_atomic(&self.document_path, text.as_bytes())?;
        self.touch()
    }

    /// Reads the document; a workspace without one yet reads as empty text.
    pub fn load_document(&self) -> StorageResult<String> {
        if !self.exists() {
            return Err(StorageError::NotFound);
        }
        match fs::read(&self.document_path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores an uploaded image under a fresh random name.
    ///
    /// Returns the document-relative URL, `images/<uuid>.<ext>`.
    pub fn save_image(&self, data: &[u8], content_type: Option<&str>) -> StorageResult<String> {
        self.ensure_dirs()?;
        let ext = extension_for_content_type(content_type);
        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        let dest = confine(&self.images_dir, [&filename])?;
        write_atomic(&dest, data)?;
        self.touch()?;
        Ok(format!("{IMAGES_SUBDIR}/{filename}"))
    }

    /// Writes an image under a caller-chosen basename (used by archive import).
    pub fn write_image(&self, basename: &str, data: &[u8]) -> StorageResult<()> {
        if !is_safe_basename(basename) || !is_allowed_image(basename) {
            return Err(StorageError::UnsafeMember);
        }
        fs::create_dir_all(&self.images_dir)?;
        let dest = confine(&self.images_dir, [basename])?;
        write_atomic(&dest, data)
    }

    /// Reads an image back; `None` if it does not exist.
    pub fn read_image(&self, basename: &str) -> StorageResult<Option<Vec<u8>>> {
        if !is_safe_basename(basename) {
            return Err(StorageError::PathTraversal);
        }
        let path = confine(&self.images_dir, [basename])?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

//=========================================================================================
// Filesystem helpers
//=========================================================================================

/// `remove_dir_all` that treats an already-missing directory as success.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Writes to a hidden temp sibling, then renames over `dest`.
pub fn write_atomic(dest: &Path, data: &[u8]) -> StorageResult<()> {
    let file_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(StorageError::PathTraversal)?;
    let tmp = dest.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let result = fs::write(&tmp, data).and_then(|()| fs::rename(&tmp, dest));
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage_root() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    #[test]
    fn create_lays_out_images_and_meta() {
        let (_dir, root) = storage_root();
        let ws = SessionWorkspace::create(&root).unwrap();
        assert_eq!(ws.root(), root.join(ws.token().to_string()));
        assert!(ws.root().join("images").is_dir());
        let meta = ws.read_meta().unwrap();
        assert_eq!(meta.version, 1);
        assert_eq!(meta.created_at, meta.last_access);
    }

    #[test]
    fn open_rejects_forged_tokens() {
        let (_dir, root) = storage_root();
        assert!(matches!(
            SessionWorkspace::open(&root, "../escape"),
            Err(StorageError::InvalidToken)
        ));
    }

    #[test]
    fn touch_requires_existing_workspace_and_advances_last_access() {
        let (_dir, root) = storage_root();
        let missing = SessionWorkspace::for_token(&root, SessionToken::generate()).unwrap();
        assert!(matches!(missing.touch(), Err(StorageError::NotFound)));

        let ws = SessionWorkspace::create(&root).unwrap();
        let stale = WorkspaceMeta {
            created_at: Some(10.0),
            last_access: Some(10.0),
            version: 1,
        };
        fs::write(root.join(ws.token().to_string()).join(META_FILENAME), stale.to_json().unwrap())
            .unwrap();
        ws.touch().unwrap();
        let meta = ws.read_meta().unwrap();
        assert_eq!(meta.created_at, Some(10.0));
        assert!(meta.last_access.unwrap() > 10.0);
    }

    #[test]
    fn touch_repairs_corrupt_meta() {
        let (_dir, root) = storage_root();
        let ws = SessionWorkspace::create(&root).unwrap();
        fs::write(ws.root().join(META_FILENAME), b"{not json").unwrap();
        ws.touch().unwrap();
        assert!(ws.read_meta().is_ok());
    }

    #[test]
    fn document_round_trip_and_empty_default() {
        let (_dir, root) = storage_root();
        let ws = SessionWorkspace::create(&root).unwrap();
        assert_eq!(ws.load_document().unwrap(), "");
        ws.save_document("# Hello").unwrap();
        assert_eq!(ws.load_document().unwrap(), "# Hello");
        ws.save_document("").unwrap();
        assert_eq!(ws.load_document().unwrap(), "");
    }

    #[test]
    fn save_image_uses_content_type_and_random_name() {
        let (_dir, root) = storage_root();
        let ws = SessionWorkspace::create(&root).unwrap();

        let jpg = ws.save_image(b"jpeg", Some("image/jpeg")).unwrap();
        assert!(jpg.starts_with("images/") && jpg.ends_with(".jpg"));
        let fallback = ws.save_image(b"??", Some("application/x-evil")).unwrap();
        assert!(fallback.ends_with(".png"));
        assert_ne!(jpg, fallback);

        let basename = jpg.trim_start_matches("images/");
        assert_eq!(ws.read_image(basename).unwrap().unwrap(), b"jpeg");
    }

    #[test]
    fn image_names_are_confined() {
        let (_dir, root) = storage_root();
        let ws = SessionWorkspace::create(&root).unwrap();
        assert!(ws.write_image("../a.png", b"x").is_err());
        assert!(ws.write_image("run.sh", b"x").is_err());
        assert!(ws.read_image("../.meta.json").is_err());
        assert_eq!(ws.read_image("missing.png").unwrap(), None);
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, root) = storage_root();
        let ws = SessionWorkspace::create(&root).unwrap();
        ws.delete();
        assert!(!ws.exists());
        ws.delete();
        assert!(matches!(ws.touch(), Err(StorageError::NotFound)));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_dir, root) = storage_root();
        let ws = SessionWorkspace::create(&root).unwrap();
        ws.save_document("text").unwrap();
        let leftovers: Vec<_> = fs::read_dir(ws.root())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}

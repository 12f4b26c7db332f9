//! services/storage/src/store.rs
//!
//! The collaborator-facing session store.
//!
//! This is the only surface an outer layer (HTTP handlers, a CLI) should call.
//! Tokens arrive as untrusted strings; a forged token and a missing session
//! produce the same `NotFound` error.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use mdpdf_core::{
    export_archive, import_archive, read_limited, rewrite_image_urls, scan_referenced_images,
    ExportBundle, SessionToken, StorageError, StorageResult,
};
use tracing::{debug, info, warn};

use crate::adapters::fs_workspace::SessionWorkspace;
use crate::config::Config;
use crate::maintenance::purge;

/// Byte ceilings for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_image_bytes: u64,
    pub max_archive_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,
            max_archive_bytes: 50 * 1024 * 1024,
        }
    }
}

/// A session freshly populated from an imported archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedSession {
    pub token: SessionToken,
    /// The document text after image URLs were pointed at `images/`.
    pub document: String,
    pub image_count: usize,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
    limits: UploadLimits,
}

impl SessionStore {
    /// Creates the root if needed and pins its canonical path.
    pub fn open(root: &Path, limits: UploadLimits) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.canonicalize()?,
            limits,
        })
    }

    pub fn from_config(config: &Config) -> StorageResult<Self> {
        Self::open(
            &config.workspaces_root,
            UploadLimits {
                max_image_bytes: config.max_image_upload_bytes,
                max_archive_bytes: config.max_zip_upload_bytes,
            },
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn workspace(&self, raw_token: &str) -> StorageResult<SessionWorkspace> {
        SessionWorkspace::open(&self.root, raw_token).map_err(StorageError::for_caller)
    }

    fn existing_workspace(&self, raw_token: &str) -> StorageResult<SessionWorkspace> {
        let workspace = self.workspace(raw_token)?;
        if !workspace.exists() {
            return Err(StorageError::NotFound);
        }
        Ok(workspace)
    }

    //=====================================================================================
    // Session lifecycle
    //=====================================================================================

    pub fn create_session(&self) -> StorageResult<SessionToken> {
        let workspace = SessionWorkspace::create(&self.root)?;
        info!("New session workspace created.");
        Ok(workspace.token())
    }

    pub fn touch(&self, token: &str) -> StorageResult<()> {
        self.workspace(token)?.touch()
    }

    /// Removes a session. Deleting an already-deleted session succeeds.
    pub fn delete_session(&self, token: &str) -> StorageResult<()> {
        self.workspace(token)?.delete();
        Ok(())
    }

    /// Deletes every workspace except the listed tokens; returns how many went.
    pub fn purge_all<I, S>(&self, except: I) -> StorageResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let deleted = purge(&self.root, except)?;
        info!("Purged {} session workspaces.", deleted);
        Ok(deleted)
    }

    //=====================================================================================
    // Document and images
    //=====================================================================================

    pub fn save_document(&self, token: &str, text: &str) -> StorageResult<()> {
        self.workspace(token)?.save_document(text)
    }

    pub fn load_document(&self, token: &str) -> StorageResult<String> {
        self.workspace(token)?.load_document()
    }

    /// Stores a pasted image and returns its `images/<name>` URL.
    pub fn save_image(
        &self,
        token: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> StorageResult<String> {
        if data.len() as u64 > self.limits.max_image_bytes {
            return Err(StorageError::TooLarge {
                limit: self.limits.max_image_bytes,
            });
        }
        self.workspace(token)?.save_image(data, content_type)
    }

    /// Like [`Self::save_image`], reading the body without trusting its declared length.
    pub fn save_image_from_reader<R: Read>(
        &self,
        token: &str,
        reader: R,
        content_type: Option<&str>,
    ) -> StorageResult<String> {
        let workspace = self.workspace(token)?;
        let data = read_limited(reader, self.limits.max_image_bytes)?;
        workspace.save_image(&data, content_type)
    }

    //=====================================================================================
    // Archives
    //=====================================================================================

    /// Unpacks an archive into a brand-new session.
    ///
    /// Nothing touches disk until the archive has been fully validated. If
    /// writing fails part-way the new workspace is removed again.
    pub fn import_archive(&self, bytes: &[u8]) -> StorageResult<ImportedSession> {
        let limit = self.limits.max_archive_bytes;
        if bytes.len() as u64 > limit {
            return Err(StorageError::TooLarge { limit });
        }
        let imported = import_archive(bytes, limit)?;
        let document = rewrite_image_urls(&imported.document, imported.images.keys());

        let workspace = SessionWorkspace::create(&self.root)?;
        let written = imported
            .images
            .iter()
            .try_for_each(|(name, data)| workspace.write_image(name, data))
            .and_then(|()| workspace.save_document(&document));
        if let Err(e) = written {
            warn!(error = %e, "Archive import failed while writing; removing the workspace.");
            workspace.delete();
            return Err(e);
        }

        info!("Imported archive with {} images.", imported.images.len());
        Ok(ImportedSession {
            token: workspace.token(),
            document,
            image_count: imported.images.len(),
        })
    }

    pub fn import_archive_from_reader<R: Read>(&self, reader: R) -> StorageResult<ImportedSession> {
        let bytes = read_limited(reader, self.limits.max_archive_bytes)?;
        self.import_archive(&bytes)
    }

    /// Bundles `text` with the workspace images it references.
    ///
    /// Falls back to the bare document when no referenced image is present.
    pub fn export_archive(&self, token: &str, text: &str) -> StorageResult<ExportBundle> {
        let workspace = self.existing_workspace(token)?;
        workspace.touch()?;

        let mut images = BTreeMap::new();
        for basename in scan_referenced_images(text) {
            match workspace.read_image(&basename)? {
                Some(data) => {
                    images.insert(basename, data);
                }
                None => debug!(image = %basename, "Referenced image missing from workspace."),
            }
        }

        if images.is_empty() {
            return Ok(ExportBundle::Document(text.to_string()));
        }
        Ok(ExportBundle::Archive(export_archive(text, &images)?))
    }
}

//! crates/mdpdf_core/src/domain.rs
//!
//! Defines the pure, core data structures for session storage.
//! These types are independent of where a workspace lives on disk.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::security::normalize_token;

/// Current schema version written into `.meta.json`.
pub const META_VERSION: u32 = 1;

/// Name of the document file inside a workspace and inside exported archives.
pub const DOCUMENT_FILENAME: &str = "document.md";

/// Name of the per-workspace metadata record.
pub const META_FILENAME: &str = ".meta.json";

/// The only subfolder images are written to or served from.
pub const IMAGES_SUBDIR: &str = "images";

//=========================================================================================
// SessionToken
//=========================================================================================

/// A capability token: a random v4 UUID in canonical lowercase hyphenated form.
///
/// The only ways to obtain one are [`SessionToken::generate`] and
/// [`normalize_token`], so holding a `SessionToken` proves the string is safe
/// to use as a single directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(Uuid);

impl SessionToken {
    /// Mints a fresh token from 122 bits of randomness.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and canonicalizes an untrusted token string.
    pub fn parse(raw: &str) -> StorageResult<Self> {
        normalize_token(raw)
    }

    pub(crate) fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

//=========================================================================================
// WorkspaceMeta
//=========================================================================================

/// Liveness record persisted as `<root>/<token>/.meta.json`.
///
/// Timestamps are epoch seconds. Both are optional on read so that historic
/// records missing a field still parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMeta {
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub last_access: Option<f64>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    META_VERSION
}

impl WorkspaceMeta {
    /// A record for a workspace created right now.
    pub fn fresh() -> Self {
        let now = now_epoch();
        Self {
            created_at: Some(now),
            last_access: Some(now),
            version: META_VERSION,
        }
    }

    /// A record for a workspace that was never accessed; maximally eligible for expiry.
    pub fn never_accessed() -> Self {
        Self {
            created_at: None,
            last_access: None,
            version: META_VERSION,
        }
    }

    /// Last access, falling back to creation time, then to the epoch.
    pub fn effective_last_access(&self) -> f64 {
        self.last_access.or(self.created_at).unwrap_or(0.0)
    }

    pub fn touched(mut self) -> Self {
        self.last_access = Some(now_epoch());
        if self.created_at.is_none() {
            self.created_at = self.last_access;
        }
        self
    }

    pub fn to_json(&self) -> StorageResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> StorageResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Current wall-clock time as fractional epoch seconds.
pub fn now_epoch() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

//=========================================================================================
// Archive payloads
//=========================================================================================

/// The result of unpacking an untrusted archive; nothing has touched disk yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedArchive {
    pub document: String,
    /// Image bytes keyed by basename.
    pub images: BTreeMap<String, Vec<u8>>,
}

/// What an export hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportBundle {
    /// The document references no stored image; download it as plain markdown.
    Document(String),
    /// A ZIP holding `document.md` and the referenced `images/*`.
    Archive(Vec<u8>),
}

impl ExportBundle {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportBundle::Document(_) => "text/markdown; charset=utf-8",
            ExportBundle::Archive(_) => "application/zip",
        }
    }
}

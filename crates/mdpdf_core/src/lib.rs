pub mod archive;
pub mod domain;
pub mod error;
pub mod images;
pub mod ports;
pub mod security;

pub use archive::{decode_document_text, export_archive, import_archive};
pub use domain::{ExportBundle, ImportedArchive, SessionToken, WorkspaceMeta};
pub use error::{StorageError, StorageResult};
pub use images::{extension_for_content_type, rewrite_image_urls, scan_referenced_images};
pub use ports::{DocumentRenderer, IdentityLayout, LayoutTransform, PortError, PortResult};
pub use security::{confine, is_safe_basename, normalize_token, read_limited};

pub mod adapters;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod store;

pub use adapters::{attachment_filename, PdfPipeline, SessionWorkspace};
pub use config::{Config, ConfigError, MetaFallback};
pub use error::ServiceError;
pub use maintenance::{ExpirySweeper, SweepReport};
pub use store::{ImportedSession, SessionStore, UploadLimits};

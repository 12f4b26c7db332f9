//! crates/mdpdf_core/src/ports.rs
//!
//! Defines the contracts for collaborators that live outside session storage.
//! The storage core never renders PDFs or rewrites layout markup itself; it only
//! calls through these traits.

use async_trait::async_trait;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for collaborator calls.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Renderer unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Prints a complete HTML document to PDF bytes.
    async fn render(&self, html: &str) -> PortResult<Vec<u8>>;
}

/// The custom `<row>`/`<col>` layout rewrite applied before rendering.
pub trait LayoutTransform: Send + Sync {
    fn transform(&self, html: &str) -> String;
}

/// A layout transform that leaves markup untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityLayout;

impl LayoutTransform for IdentityLayout {
    fn transform(&self, html: &str) -> String {
        html.to_string()
    }
}

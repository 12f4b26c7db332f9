//! services/storage/src/adapters/render.rs
//!
//! Glue between a document's HTML and the external PDF renderer: apply the
//! layout transform, render, and pick a safe download filename.

use std::sync::Arc;
use std::time::Instant;

use mdpdf_core::{DocumentRenderer, LayoutTransform, PortError};
use tracing::info;

use crate::error::ServiceError;

const DEFAULT_PDF_FILENAME: &str = "document.pdf";
const MAX_FILENAME_CHARS: usize = 120;

#[derive(Clone)]
pub struct PdfPipeline {
    layout: Arc<dyn LayoutTransform>,
    renderer: Arc<dyn DocumentRenderer>,
}

impl PdfPipeline {
    pub fn new(layout: Arc<dyn LayoutTransform>, renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self { layout, renderer }
    }

    /// Rewrites layout tags, then hands the HTML to the renderer.
    pub async fn render_pdf(&self, html: &str) -> Result<Vec<u8>, ServiceError> {
        let start = Instant::now();
        let transformed = self.layout.transform(html);
        let pdf = self.renderer.render(&transformed).await?;
        if pdf.is_empty() {
            return Err(PortError::Unexpected("Renderer returned an empty document.".to_string()).into());
        }
        info!("PDF render took: {:?} ({} bytes)", start.elapsed(), pdf.len());
        Ok(pdf)
    }
}

/// Sanitizes a requested download name for a `Content-Disposition` header.
///
/// Keeps the final path segment, drops anything but letters, digits, space,
/// `-`, `_` and `.`, and forces a `.pdf` suffix.
pub fn attachment_filename(requested: Option<&str>) -> String {
    let last = requested
        .unwrap_or("")
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("");
    let cleaned: String = last
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
        .take(MAX_FILENAME_CHARS)
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() {
        return DEFAULT_PDF_FILENAME.to_string();
    }
    if cleaned.to_ascii_lowercase().ends_with(".pdf") {
        cleaned.to_string()
    } else {
        format!("{cleaned}.pdf")
    }
}

pub mod fs_workspace;
pub mod render;

pub use fs_workspace::SessionWorkspace;
pub use render::{attachment_filename, PdfPipeline};

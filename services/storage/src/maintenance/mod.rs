//! services/storage/src/maintenance/mod.rs
//!
//! Background and bulk operations over the whole workspaces root.

pub mod purge;
pub mod sweeper;

pub use purge::{migrate_legacy_root, purge, workspace_token};
pub use sweeper::{ExpirySweeper, SweepReport};

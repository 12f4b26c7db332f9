//! Session lifecycle, bulk purge and expiry through the public API.

mod common;

use std::fs;
use std::time::Duration;

use common::temp_store;
use mdpdf_core::domain::{now_epoch, META_FILENAME};
use mdpdf_core::{StorageError, WorkspaceMeta};
use storage_lib::{ExpirySweeper, MetaFallback};
use tokio_util::sync::CancellationToken;

#[test]
fn saved_image_is_served_back_in_export() {
    let (_dir, store) = temp_store();
    let token = store.create_session().unwrap().to_string();
    let url = store.save_image(&token, b"GIF89a", Some("image/gif")).unwrap();
    assert!(url.starts_with("images/") && url.ends_with(".gif"));

    let doc = format!("![pasted]({url})");
    store.save_document(&token, &doc).unwrap();
    let bundle = store.export_archive(&token, &doc).unwrap();
    assert_eq!(bundle.content_type(), "application/zip");
}

#[test]
fn purge_all_keeps_the_active_session() {
    let (_dir, store) = temp_store();
    let active = store.create_session().unwrap().to_string();
    let others: Vec<String> = (0..3)
        .map(|_| store.create_session().unwrap().to_string())
        .collect();

    assert_eq!(store.purge_all([active.as_str(), "garbage"]).unwrap(), 3);
    store.touch(&active).unwrap();
    for token in &others {
        assert!(matches!(store.touch(token), Err(StorageError::NotFound)));
    }
}

#[test]
fn sweep_expires_only_idle_sessions() {
    let (_dir, store) = temp_store();
    let idle = store.create_session().unwrap().to_string();
    let busy = store.create_session().unwrap().to_string();

    let then = now_epoch() - 10.0 * 3600.0;
    let stale = WorkspaceMeta {
        created_at: Some(then),
        last_access: Some(then),
        version: 1,
    };
    fs::write(
        store.root().join(&idle).join(META_FILENAME),
        stale.to_json().unwrap(),
    )
    .unwrap();

    let sweeper = ExpirySweeper::new(
        store.root().to_path_buf(),
        Some(6.0 * 3600.0),
        Duration::from_secs(600),
        MetaFallback::Expire,
    );
    let report = sweeper.sweep_once(&CancellationToken::new());
    assert_eq!(report.deleted, 1);

    assert!(matches!(store.touch(&idle), Err(StorageError::NotFound)));
    store.touch(&busy).unwrap();
}

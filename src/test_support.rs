//! Shared fixtures for the in-crate unit tests.

use std::sync::Arc;

use tempfile::TempDir;

use crate::config::Config;
use crate::device::Device;
use crate::folder::Folder;
use crate::media::{Media, MediaType};
use crate::store::Store;

pub fn test_store() -> (Store, TempDir) {
    let dir = TempDir::new().expect("can't create temp dir");
    let config = Config::new(dir.path().join("medialib.db"), dir.path().join("thumbs"));
    let store = Store::open(&config).expect("can't open test store");
    (store, dir)
}

pub fn test_folder(store: &Store) -> Arc<Folder> {
    let device = Device::create(store, "test-device", "/mnt/test", false).unwrap();
    Folder::create(store, "music", None, device.id, true).unwrap()
}

pub fn test_media(store: &Store, media_type: MediaType, title: &str) -> Arc<Media> {
    let conn = store.writer();
    Media::create_with(store, &conn, media_type, Some(title)).unwrap()
}

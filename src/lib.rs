//! Embedded media library: discovers media files on the host's
//! filesystems, runs them through a multi-stage metadata pipeline and
//! maintains a relational catalogue of media, albums, artists, genres,
//! shows, playlists and labels.
//!
//! The embedding application drives everything through [`MediaLibrary`].

#[macro_use]
extern crate log;

pub mod album;
pub mod album_track;
pub mod artist;
pub mod config;
pub mod db_meta;
pub mod device;
pub mod discovery;
pub mod error;
pub mod file;
pub mod folder;
pub mod genre;
pub mod label;
pub mod library;
pub mod logger;
pub mod media;
pub mod mrl;
pub mod parser;
pub mod persister;
pub mod playlist;
pub mod probe;
pub mod schema;
pub mod show;
pub mod store;
pub mod thumbnailer;
pub mod vfs;
pub mod vfs_local;

#[cfg(test)]
mod test_support;

use serde::Serialize;

pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::library::{MediaLibrary, MediaLibraryCb};

pub const MEDIALIB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sort order for the entity listers. Entities without a natural mapping
/// for a criterion fall back to their default ordering.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum SortingCriteria {
    Default,
    Alpha,
    Duration,
    InsertionDate,
    LastModified,
    ReleaseDate,
    PlayCount,
}

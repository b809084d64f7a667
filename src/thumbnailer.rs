//! Thumbnail stage. Frame synthesis belongs to the external decoding
//! library behind `ThumbnailRenderer`; this stage only derives the
//! destination path and records the result. Failures are non-fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::library::Notifier;
use crate::media::{Media, MediaType};
use crate::mrl;
use crate::parser::{MetadataService, Status, Task};
use crate::store::Store;

/// Produces a representative frame for a media and writes it to
/// `destination`.
pub trait ThumbnailRenderer: Send + Sync {
    fn render(&self, mrl: &str, destination: &Path) -> std::result::Result<(), String>;
}

pub struct Thumbnailer {
    store: Arc<Store>,
    notifier: Arc<Notifier>,
    renderer: Option<Arc<dyn ThumbnailRenderer>>,
    thumbnail_dir: PathBuf,
}

impl Thumbnailer {
    pub fn new(
        store: Arc<Store>,
        notifier: Arc<Notifier>,
        renderer: Option<Arc<dyn ThumbnailRenderer>>,
        thumbnail_dir: PathBuf,
    ) -> Thumbnailer {
        Thumbnailer {
            store,
            notifier,
            renderer,
            thumbnail_dir,
        }
    }
}

impl MetadataService for Thumbnailer {
    fn name(&self) -> &'static str {
        "Thumbnailer"
    }

    fn run(&self, task: &mut Task) -> Status {
        let media_id = match task.media_id {
            Some(id) => id,
            None => return Status::Success,
        };

        let media = match Media::fetch(&self.store, media_id) {
            Ok(Some(media)) => media,
            _ => return Status::Success,
        };

        if media.media_type != MediaType::Video || media.thumbnail.is_some() {
            return Status::Success;
        }

        let renderer = match &self.renderer {
            Some(renderer) => renderer,
            None => return Status::Success,
        };

        let destination = self.thumbnail_dir.join(format!("{}.jpg", media_id));
        match renderer.render(&task.mrl, &destination) {
            Ok(()) => {
                let thumbnail_mrl = mrl::from_path(&destination);
                debug!("thumbnail for media {} at '{}'", media_id, thumbnail_mrl);

                if Media::set_thumbnail(&self.store, media_id, &thumbnail_mrl).is_ok() {
                    if let Ok(Some(media)) = Media::fetch(&self.store, media_id) {
                        self.notifier.media_modified(media);
                    }
                }
            }
            Err(reason) => {
                warn!("thumbnailing media {} failed: {}", media_id, reason);
            }
        }

        Status::Success
    }
}

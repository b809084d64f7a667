//! Metadata persistence stage. Everything a probe produced lands in the
//! catalogue inside one write transaction: the Media row, stream tracks,
//! and the album/artist/genre or show resolution, with the parser cursor
//! stamped in the same transaction.

use std::sync::Arc;

use rusqlite::{OptionalExtension, Transaction};

use crate::album::Album;
use crate::album_track::AlbumTrack;
use crate::artist::Artist;
use crate::error::Result;
use crate::file::{File, FileType, ParserStep};
use crate::genre::Genre;
use crate::library::Notifier;
use crate::media::{Media, MediaSubtype, MediaType};
use crate::mrl;
use crate::parser::{MetadataService, Status, Task};
use crate::show::{Show, ShowEpisode};
use crate::store::Store;

pub struct MetadataPersister {
    store: Arc<Store>,
    notifier: Arc<Notifier>,
}

impl MetadataPersister {
    pub fn new(store: Arc<Store>, notifier: Arc<Notifier>) -> MetadataPersister {
        MetadataPersister { store, notifier }
    }

    fn persist(&self, tx: &Transaction, task: &mut Task) -> Result<(i64, bool)> {
        let store = &self.store;

        let file_media: Option<i64> = tx
            .prepare_cached("SELECT media_id FROM File WHERE id_file = ?")?
            .query_row([task.file_id], |row| row.get(0))
            .optional()?
            .flatten();

        let (media_id, created) = match task.media_id.or(file_media) {
            Some(id) => (id, false),
            None => {
                let media_type = if task.item.video_tracks.is_empty() {
                    MediaType::Audio
                } else {
                    MediaType::Video
                };
                let media = Media::create_with(store, tx, media_type, None)?;
                File::set_media_id_with(store, tx, task.file_id, media.id)?;
                (media.id, true)
            }
        };
        task.media_id = Some(media_id);

        let title = match &task.item.title {
            Some(title) => title.clone(),
            None => mrl::file_stem(&task.mrl).to_string(),
        };
        Media::set_title_with(store, tx, media_id, &title)?;
        Media::set_duration_with(store, tx, media_id, task.item.duration)?;

        let release_year = parse_year(task.item.release_date.as_deref());
        Media::set_release_date_with(store, tx, media_id, release_year)?;

        Media::replace_tracks_with(
            tx,
            media_id,
            &task.item.audio_tracks,
            &task.item.video_tracks,
        )?;

        if task.item.album_name.is_some() || task.item.album_artist.is_some() {
            self.persist_audio(tx, task, media_id, release_year)?;
        } else if task.item.show_name.is_some() || task.item.episode > 0 {
            self.persist_video(tx, task, media_id)?;
        } else if task.item.video_tracks.is_empty() {
            Media::set_types_with(store, tx, media_id, MediaType::Audio, MediaSubtype::None)?;
            File::set_file_type_with(store, tx, task.file_id, FileType::Audio)?;
        } else {
            Media::set_types_with(store, tx, media_id, MediaType::Video, MediaSubtype::None)?;
            File::set_file_type_with(store, tx, task.file_id, FileType::Video)?;
        }

        File::set_parser_step_with(store, tx, task.file_id, ParserStep::Persisted as i64)?;

        Ok((media_id, created))
    }

    fn persist_audio(
        &self,
        tx: &Transaction,
        task: &Task,
        media_id: i64,
        release_year: Option<i64>,
    ) -> Result<()> {
        let store = &self.store;

        let artist = match task.item.artist.as_deref() {
            Some(name) => Some(self.artist_for(tx, name)?),
            None => None,
        };
        let explicit_album_artist = match task.item.album_artist.as_deref() {
            Some(name) => Some(self.artist_for(tx, name)?),
            None => None,
        };

        let primary_artist_id = explicit_album_artist
            .as_ref()
            .or(artist.as_ref())
            .map(|a| a.id)
            .unwrap_or(Artist::UNKNOWN_ID);

        let genre = match task.item.genre.as_deref() {
            Some(name) => match Genre::by_name_with(store, tx, name)? {
                Some(genre) => Some(genre),
                None => Some(Genre::create_with(store, tx, name)?),
            },
            None => None,
        };

        if let Some(album_name) = task.item.album_name.as_deref() {
            let explicit_id = explicit_album_artist.as_ref().map(|a| a.id);
            let album = match Album::find_with(store, tx, album_name, explicit_id)? {
                Some(album) => {
                    // Two distinct performing artists with no explicit
                    // album artist turn the album into Various Artists.
                    if explicit_id.is_none() {
                        match album.album_artist_id {
                            Some(current)
                                if current != Artist::VARIOUS_ID
                                    && current != primary_artist_id =>
                            {
                                Album::set_album_artist_with(
                                    store,
                                    tx,
                                    album.id,
                                    Artist::VARIOUS_ID,
                                )?;
                            }
                            None => {
                                Album::set_album_artist_with(
                                    store,
                                    tx,
                                    album.id,
                                    primary_artist_id,
                                )?;
                            }
                            _ => {}
                        }
                    }
                    album
                }
                None => Album::create_with(store, tx, album_name, Some(primary_artist_id))?,
            };

            AlbumTrack::upsert_with(
                store,
                tx,
                media_id,
                album.id,
                artist.as_ref().map(|a| a.id),
                genre.as_ref().map(|g| g.id),
                task.item.track_number,
                task.item.disc_number,
            )?;

            if let Some(year) = release_year {
                Album::set_release_year_with(store, tx, album.id, year)?;
            }
            if let Some(artwork) = task.item.artwork_mrl.as_deref() {
                Album::set_artwork_with(store, tx, album.id, artwork)?;
            }
            Album::refresh_aggregates_with(store, tx, album.id)?;

            Media::set_types_with(store, tx, media_id, MediaType::Audio, MediaSubtype::AlbumTrack)?;
            File::set_file_type_with(store, tx, task.file_id, FileType::AlbumTrack)?;
        } else {
            // An album artist tag alone doesn't make an album.
            Media::set_types_with(store, tx, media_id, MediaType::Audio, MediaSubtype::None)?;
            File::set_file_type_with(store, tx, task.file_id, FileType::Audio)?;
        }

        Ok(())
    }

    fn persist_video(&self, tx: &Transaction, task: &Task, media_id: i64) -> Result<()> {
        let store = &self.store;

        if let Some(show_name) = task.item.show_name.as_deref() {
            let show = match Show::by_title_with(store, tx, show_name)? {
                Some(show) => show,
                None => Show::create_with(store, tx, show_name)?,
            };

            ShowEpisode::upsert_with(
                store,
                tx,
                media_id,
                show.id,
                task.item.episode,
                0,
                task.item.title.as_deref(),
            )?;

            Media::set_types_with(
                store,
                tx,
                media_id,
                MediaType::Video,
                MediaSubtype::ShowEpisode,
            )?;
            File::set_file_type_with(store, tx, task.file_id, FileType::ShowEpisode)?;
        } else {
            // An episode number without a show name stays a plain video.
            Media::set_types_with(store, tx, media_id, MediaType::Video, MediaSubtype::None)?;
            File::set_file_type_with(store, tx, task.file_id, FileType::Video)?;
        }

        Ok(())
    }

    fn artist_for(&self, tx: &Transaction, name: &str) -> Result<Arc<Artist>> {
        match Artist::by_name_with(&self.store, tx, name)? {
            Some(artist) => Ok(artist),
            None => Artist::create_with(&self.store, tx, name),
        }
    }
}

/// Leading year of a date tag ("2006", "2006-05-01"); anything else is
/// no release date.
fn parse_year(date: Option<&str>) -> Option<i64> {
    let date = date?.trim();
    let digits: String = date.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() == 4 {
        digits.parse().ok()
    } else {
        None
    }
}

impl MetadataService for MetadataPersister {
    fn name(&self) -> &'static str {
        "MetadataPersister"
    }

    fn run(&self, task: &mut Task) -> Status {
        let mut conn = self.store.writer();

        let result = (|| -> Result<(i64, bool)> {
            let tx = conn.transaction()?;
            let outcome = self.persist(&tx, task)?;
            tx.commit()?;
            Ok(outcome)
        })();

        match result {
            Ok((media_id, created)) => {
                // Still holding the write lock: notification order follows
                // commit order.
                self.store.caches.media.invalidate(media_id);
                if let Ok(Some(media)) = Media::fetch(&self.store, media_id) {
                    if created {
                        self.notifier.media_added(media);
                    } else {
                        self.notifier.media_modified(media);
                    }
                }
                Status::Success
            }
            Err(e) => {
                // Snapshots primed inside the aborted transaction are
                // stale now.
                self.store.caches.clear_all();

                if task.retry_count == 0 {
                    warn!(
                        "persisting file {} failed ({}), retrying once",
                        task.file_id, e
                    );
                    Status::Retry
                } else {
                    error!("persisting file {} failed again: {}", task.file_id, e);
                    Status::Fatal
                }
            }
        }
    }
}

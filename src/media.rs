use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::Result;
use crate::store::{self, Entity, Store};
use crate::SortingCriteria;

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum MediaType {
    Unknown = 0,
    Video = 1,
    Audio = 2,
}

impl MediaType {
    pub fn from_i64(v: i64) -> MediaType {
        match v {
            1 => MediaType::Video,
            2 => MediaType::Audio,
            _ => MediaType::Unknown,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum MediaSubtype {
    None = 0,
    ShowEpisode = 1,
    AlbumTrack = 2,
}

impl MediaSubtype {
    pub fn from_i64(v: i64) -> MediaSubtype {
        match v {
            1 => MediaSubtype::ShowEpisode,
            2 => MediaSubtype::AlbumTrack,
            _ => MediaSubtype::None,
        }
    }
}

/// The user-visible unit of the catalogue. Every Media is backed by one
/// or more File rows; presence is the AND over those files.
#[derive(Debug, Clone, Serialize)]
pub struct Media {
    pub id: i64,
    pub media_type: MediaType,
    pub subtype: MediaSubtype,
    pub title: Option<String>,
    /// Milliseconds; -1 while unknown.
    pub duration: i64,
    pub play_count: i64,
    pub last_played_date: Option<i64>,
    pub insertion_date: i64,
    pub release_date: Option<i64>,
    pub thumbnail: Option<String>,
    pub is_favorite: bool,
    pub is_present: bool,
}

impl Entity for Media {
    fn id(&self) -> i64 {
        self.id
    }
}

/// One decoded audio stream of a Media.
#[derive(Debug, Clone, Serialize)]
pub struct AudioTrack {
    pub id: i64,
    pub media_id: i64,
    pub codec: Option<String>,
    pub bitrate: i64,
    pub samplerate: i64,
    pub nb_channels: i64,
    pub language: Option<String>,
    pub description: Option<String>,
}

/// One decoded video stream of a Media. The sample aspect ratio stays
/// unset unless the embedding application opted in.
#[derive(Debug, Clone, Serialize)]
pub struct VideoTrack {
    pub id: i64,
    pub media_id: i64,
    pub codec: Option<String>,
    pub fps: f64,
    pub width: i64,
    pub height: i64,
    pub sar_num: Option<i64>,
    pub sar_den: Option<i64>,
}

impl Media {
    pub const TABLE: &'static str = "Media";
    pub const PRIMARY_KEY: &'static str = "id_media";

    const COLUMNS: &'static str = "id_media, type, subtype, title, duration, play_count,
        last_played_date, insertion_date, release_date, thumbnail, is_favorite, is_present";

    fn from_row(row: &Row) -> rusqlite::Result<Media> {
        let media_type: i64 = row.get(1)?;
        let subtype: i64 = row.get(2)?;
        Ok(Media {
            id: row.get(0)?,
            media_type: MediaType::from_i64(media_type),
            subtype: MediaSubtype::from_i64(subtype),
            title: row.get(3)?,
            duration: row.get(4)?,
            play_count: row.get(5)?,
            last_played_date: row.get(6)?,
            insertion_date: row.get(7)?,
            release_date: row.get(8)?,
            thumbnail: row.get(9)?,
            is_favorite: row.get(10)?,
            is_present: row.get(11)?,
        })
    }

    pub fn create_with(
        store: &Store,
        conn: &Connection,
        media_type: MediaType,
        title: Option<&str>,
    ) -> Result<Arc<Media>> {
        let insertion_date = Utc::now().timestamp();
        let id = store::insert(
            conn,
            "INSERT INTO Media (type, subtype, title, duration, insertion_date)
            VALUES (?, 0, ?, -1, ?)",
            &[&(media_type as i64), &title, &insertion_date],
        )?;

        debug!("create media {} title={:?}", id, title);

        let media = Arc::new(Media {
            id,
            media_type,
            subtype: MediaSubtype::None,
            title: title.map(str::to_string),
            duration: -1,
            play_count: 0,
            last_played_date: None,
            insertion_date,
            release_date: None,
            thumbnail: None,
            is_favorite: false,
            is_present: true,
        });
        store.caches.media.put(id, &media);

        Ok(media)
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<Media>>> {
        store::cached_fetch(&store.caches.media, id, || {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached(&format!(
                "SELECT {} FROM Media WHERE id_media = ?",
                Self::COLUMNS
            ))?;
            let mut rows = st.query([id])?;

            match rows.next()? {
                Some(row) => Ok(Some(Self::from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    fn sort_clause(sort: SortingCriteria, desc: bool) -> String {
        let column = match sort {
            SortingCriteria::Duration => "duration",
            SortingCriteria::InsertionDate => "insertion_date",
            SortingCriteria::ReleaseDate => "release_date",
            SortingCriteria::PlayCount => "play_count",
            SortingCriteria::LastModified => "last_played_date",
            _ => "title",
        };
        format!("ORDER BY {} {}", column, if desc { "DESC" } else { "ASC" })
    }

    pub fn list_all(
        store: &Store,
        media_type: MediaType,
        sort: SortingCriteria,
        desc: bool,
    ) -> Result<Vec<Arc<Media>>> {
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM Media WHERE type = ? AND is_present = 1 {}",
                    Self::COLUMNS,
                    Self::sort_clause(sort, desc)
                ),
                &[&(media_type as i64)],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.media, items))
    }

    pub fn search(store: &Store, title: &str) -> Result<Vec<Arc<Media>>> {
        let pattern = format!("{}*", title);
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM Media WHERE id_media IN
                        (SELECT rowid FROM MediaFts WHERE title MATCH ?)
                    AND is_present = 1",
                    Self::COLUMNS
                ),
                &[&pattern],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.media, items))
    }

    pub fn set_title(store: &Store, id: i64, title: &str) -> Result<()> {
        let conn = store.writer();
        Self::set_title_with(store, &conn, id, title)
    }

    pub fn set_title_with(store: &Store, conn: &Connection, id: i64, title: &str) -> Result<()> {
        conn.prepare_cached("UPDATE Media SET title = ? WHERE id_media = ?")?
            .execute(params![title, id])?;
        store.caches.media.invalidate(id);
        Ok(())
    }

    pub fn set_duration_with(store: &Store, conn: &Connection, id: i64, duration: i64) -> Result<()> {
        conn.prepare_cached("UPDATE Media SET duration = ? WHERE id_media = ?")?
            .execute(params![duration, id])?;
        store.caches.media.invalidate(id);
        Ok(())
    }

    pub fn set_types_with(
        store: &Store,
        conn: &Connection,
        id: i64,
        media_type: MediaType,
        subtype: MediaSubtype,
    ) -> Result<()> {
        conn.prepare_cached("UPDATE Media SET type = ?, subtype = ? WHERE id_media = ?")?
            .execute(params![media_type as i64, subtype as i64, id])?;
        store.caches.media.invalidate(id);
        Ok(())
    }

    pub fn set_release_date_with(
        store: &Store,
        conn: &Connection,
        id: i64,
        release_date: Option<i64>,
    ) -> Result<()> {
        conn.prepare_cached("UPDATE Media SET release_date = ? WHERE id_media = ?")?
            .execute(params![release_date, id])?;
        store.caches.media.invalidate(id);
        Ok(())
    }

    pub fn set_thumbnail(store: &Store, id: i64, mrl: &str) -> Result<()> {
        let conn = store.writer();
        conn.prepare_cached("UPDATE Media SET thumbnail = ? WHERE id_media = ?")?
            .execute(params![mrl, id])?;
        drop(conn);

        store.caches.media.invalidate(id);
        Ok(())
    }

    pub fn set_favorite(store: &Store, id: i64, favorite: bool) -> Result<()> {
        let conn = store.writer();
        conn.prepare_cached("UPDATE Media SET is_favorite = ? WHERE id_media = ?")?
            .execute(params![favorite, id])?;
        drop(conn);

        store.caches.media.invalidate(id);
        Ok(())
    }

    pub fn increase_play_count(store: &Store, id: i64) -> Result<()> {
        let now = Utc::now().timestamp();
        let conn = store.writer();
        conn.prepare_cached(
            "UPDATE Media SET play_count = play_count + 1, last_played_date = ?
            WHERE id_media = ?",
        )?
        .execute(params![now, id])?;
        drop(conn);

        store.caches.media.invalidate(id);
        Ok(())
    }

    /// Replaces the persisted stream tracks of this media, the re-parse
    /// path included.
    pub fn replace_tracks_with(
        conn: &Connection,
        id: i64,
        audio: &[AudioTrack],
        video: &[VideoTrack],
    ) -> Result<()> {
        conn.prepare_cached("DELETE FROM AudioTrack WHERE media_id = ?")?
            .execute([id])?;
        conn.prepare_cached("DELETE FROM VideoTrack WHERE media_id = ?")?
            .execute([id])?;

        for track in audio {
            conn.prepare_cached(
                "INSERT INTO AudioTrack (media_id, codec, bitrate, samplerate,
                    nb_channels, language, description)
                VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?
            .execute(params![
                id,
                track.codec,
                track.bitrate,
                track.samplerate,
                track.nb_channels,
                track.language,
                track.description,
            ])?;
        }

        for track in video {
            conn.prepare_cached(
                "INSERT INTO VideoTrack (media_id, codec, fps, width, height,
                    sar_num, sar_den)
                VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?
            .execute(params![
                id,
                track.codec,
                track.fps,
                track.width,
                track.height,
                track.sar_num,
                track.sar_den,
            ])?;
        }

        Ok(())
    }

    pub fn audio_tracks(store: &Store, media_id: i64) -> Result<Vec<AudioTrack>> {
        let conn = store.reader()?;
        store::fetch_all(
            &conn,
            "SELECT id_track, media_id, codec, bitrate, samplerate, nb_channels,
                language, description
            FROM AudioTrack WHERE media_id = ? ORDER BY id_track",
            &[&media_id],
            |row| {
                Ok(AudioTrack {
                    id: row.get(0)?,
                    media_id: row.get(1)?,
                    codec: row.get(2)?,
                    bitrate: row.get(3)?,
                    samplerate: row.get(4)?,
                    nb_channels: row.get(5)?,
                    language: row.get(6)?,
                    description: row.get(7)?,
                })
            },
        )
    }

    pub fn video_tracks(store: &Store, media_id: i64) -> Result<Vec<VideoTrack>> {
        let conn = store.reader()?;
        store::fetch_all(
            &conn,
            "SELECT id_track, media_id, codec, fps, width, height, sar_num, sar_den
            FROM VideoTrack WHERE media_id = ? ORDER BY id_track",
            &[&media_id],
            |row| {
                Ok(VideoTrack {
                    id: row.get(0)?,
                    media_id: row.get(1)?,
                    codec: row.get(2)?,
                    fps: row.get(3)?,
                    width: row.get(4)?,
                    height: row.get(5)?,
                    sar_num: row.get(6)?,
                    sar_den: row.get(7)?,
                })
            },
        )
    }

    /// Media attached to the file, if the file was parsed already.
    pub fn by_file(store: &Store, file_id: i64) -> Result<Option<Arc<Media>>> {
        let media_id: Option<i64> = {
            let conn = store.reader()?;
            let mut stmt = conn.prepare_cached("SELECT media_id FROM File WHERE id_file = ?")?;
            stmt.query_row([file_id], |row| row.get(0))
                .optional()?
                .flatten()
        };

        match media_id {
            Some(id) => Self::fetch(store, id),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_media, test_store};

    #[test]
    fn create_and_fetch_round_trip() {
        let (store, _dir) = test_store();
        let media = {
            let conn = store.writer();
            Media::create_with(&store, &conn, MediaType::Audio, Some("Zebra")).unwrap()
        };

        store.caches.media.invalidate(media.id);
        let fetched = Media::fetch(&store, media.id).unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("Zebra"));
        assert_eq!(fetched.media_type, MediaType::Audio);
        assert_eq!(fetched.duration, -1);
        assert!(fetched.is_present);
    }

    #[test]
    fn search_uses_prefix_semantics() {
        let (store, _dir) = test_store();
        test_media(&store, MediaType::Audio, "Zebra");
        test_media(&store, MediaType::Audio, "Zealot");
        test_media(&store, MediaType::Audio, "Aardvark");

        let hits = Media::search(&store, "Ze").unwrap();
        assert_eq!(hits.len(), 2);

        let hits = Media::search(&store, "Aardvark").unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn fts_mirror_follows_title_updates() {
        let (store, _dir) = test_store();
        let media = test_media(&store, MediaType::Audio, "Old Name");

        Media::set_title(&store, media.id, "New Name").unwrap();
        assert!(Media::search(&store, "Old").unwrap().is_empty());
        assert_eq!(Media::search(&store, "New").unwrap().len(), 1);
    }

    #[test]
    fn fts_mirror_stays_row_identical() {
        let (store, _dir) = test_store();
        let a = test_media(&store, MediaType::Audio, "Alpha");
        let b = test_media(&store, MediaType::Audio, "Beta");
        test_media(&store, MediaType::Audio, "Gamma");

        Media::set_title(&store, a.id, "Delta").unwrap();
        {
            let conn = store.writer();
            conn.execute("DELETE FROM Media WHERE id_media = ?", [b.id])
                .unwrap();
        }
        store.caches.clear_all();

        let conn = store.reader().unwrap();
        let base: i64 = conn
            .query_row("SELECT COUNT(*) FROM Media", [], |row| row.get(0))
            .unwrap();
        let mirror: i64 = conn
            .query_row("SELECT COUNT(*) FROM MediaFts", [], |row| row.get(0))
            .unwrap();
        let matching: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM Media m
                INNER JOIN MediaFts f ON f.rowid = m.id_media
                WHERE f.title = m.title",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(base, 2);
        assert_eq!(mirror, base);
        assert_eq!(matching, base);
    }

    #[test]
    fn play_count_and_favorite_mutators_persist() {
        let (store, _dir) = test_store();
        let media = test_media(&store, MediaType::Audio, "Track");

        Media::increase_play_count(&store, media.id).unwrap();
        Media::increase_play_count(&store, media.id).unwrap();
        Media::set_favorite(&store, media.id, true).unwrap();

        let fetched = Media::fetch(&store, media.id).unwrap().unwrap();
        assert_eq!(fetched.play_count, 2);
        assert!(fetched.is_favorite);
        assert!(fetched.last_played_date.is_some());
    }

    #[test]
    fn replacing_tracks_is_idempotent() {
        let (store, _dir) = test_store();
        let media = test_media(&store, MediaType::Audio, "Track");

        let audio = vec![AudioTrack {
            id: 0,
            media_id: media.id,
            codec: Some("mp4a".to_string()),
            bitrate: 320_000,
            samplerate: 44_100,
            nb_channels: 2,
            language: None,
            description: None,
        }];

        for _ in 0..2 {
            let conn = store.writer();
            Media::replace_tracks_with(&conn, media.id, &audio, &[]).unwrap();
        }

        let tracks = Media::audio_tracks(&store, media.id).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].samplerate, 44_100);
    }
}

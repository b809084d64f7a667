use std::sync::Arc;

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::{self, Entity, Store};

/// Links an audio Media to its album, performing artist and genre.
/// One row per media; re-parses update the existing row in place so
/// recovery stays idempotent.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumTrack {
    pub id: i64,
    pub media_id: i64,
    pub album_id: i64,
    pub artist_id: Option<i64>,
    pub genre_id: Option<i64>,
    pub track_number: i64,
    pub disc_number: i64,
}

impl Entity for AlbumTrack {
    fn id(&self) -> i64 {
        self.id
    }
}

impl AlbumTrack {
    pub const TABLE: &'static str = "AlbumTrack";
    pub const PRIMARY_KEY: &'static str = "id_track";

    const COLUMNS: &'static str =
        "id_track, media_id, album_id, artist_id, genre_id, track_number, disc_number";

    fn from_row(row: &Row) -> rusqlite::Result<AlbumTrack> {
        Ok(AlbumTrack {
            id: row.get(0)?,
            media_id: row.get(1)?,
            album_id: row.get(2)?,
            artist_id: row.get(3)?,
            genre_id: row.get(4)?,
            track_number: row.get(5)?,
            disc_number: row.get(6)?,
        })
    }

    /// Upsert keyed by the media id. The album counter triggers fire on
    /// both paths and recompute absolutely.
    pub fn upsert_with(
        store: &Store,
        conn: &Connection,
        media_id: i64,
        album_id: i64,
        artist_id: Option<i64>,
        genre_id: Option<i64>,
        track_number: i64,
        disc_number: i64,
    ) -> Result<Arc<AlbumTrack>> {
        let existing: Option<AlbumTrack> = {
            let mut st = conn.prepare_cached(&format!(
                "SELECT {} FROM AlbumTrack WHERE media_id = ?",
                Self::COLUMNS
            ))?;
            let mut rows = st.query([media_id])?;
            match rows.next()? {
                Some(row) => Some(Self::from_row(row)?),
                None => None,
            }
        };

        let id = match existing {
            // Identical content on a replay is a no-op.
            Some(ref track)
                if track.album_id == album_id
                    && track.artist_id == artist_id
                    && track.genre_id == genre_id
                    && track.track_number == track_number
                    && track.disc_number == disc_number =>
            {
                track.id
            }
            Some(track) => {
                Self::check_position_free(
                    conn,
                    media_id,
                    album_id,
                    track_number,
                    disc_number,
                )?;
                // An in-place update would skip the counter triggers;
                // rebuild the aggregates by deleting and re-inserting.
                conn.prepare_cached("DELETE FROM AlbumTrack WHERE id_track = ?")?
                    .execute([track.id])?;
                store::insert(
                    conn,
                    "INSERT INTO AlbumTrack
                        (media_id, album_id, artist_id, genre_id, track_number, disc_number)
                    VALUES (?, ?, ?, ?, ?, ?)",
                    &[
                        &media_id,
                        &album_id,
                        &artist_id,
                        &genre_id,
                        &track_number,
                        &disc_number,
                    ],
                )?
            }
            None => {
                Self::check_position_free(
                    conn,
                    media_id,
                    album_id,
                    track_number,
                    disc_number,
                )?;
                store::insert(
                    conn,
                    "INSERT INTO AlbumTrack
                        (media_id, album_id, artist_id, genre_id, track_number, disc_number)
                    VALUES (?, ?, ?, ?, ?, ?)",
                    &[
                        &media_id,
                        &album_id,
                        &artist_id,
                        &genre_id,
                        &track_number,
                        &disc_number,
                    ],
                )?
            }
        };

        debug!(
            "upsert album track {} media={} album={} track_number={}",
            id, media_id, album_id, track_number
        );

        let track = Arc::new(AlbumTrack {
            id,
            media_id,
            album_id,
            artist_id,
            genre_id,
            track_number,
            disc_number,
        });
        store.caches.album_track.put(id, &track);
        store.caches.album.invalidate(album_id);
        if let Some(artist_id) = artist_id {
            store.caches.artist.invalidate(artist_id);
        }

        Ok(track)
    }

    /// Fully known positions are unique per album; a second media
    /// claiming one is reported before the unique index gets a say, so
    /// the caller sees its documented constraint-violation path rather
    /// than a bare SQLite error.
    fn check_position_free(
        conn: &Connection,
        media_id: i64,
        album_id: i64,
        track_number: i64,
        disc_number: i64,
    ) -> Result<()> {
        if track_number <= 0 || disc_number <= 0 {
            return Ok(());
        }

        let holder: Option<i64> = {
            let mut st = conn.prepare_cached(
                "SELECT media_id FROM AlbumTrack
                WHERE album_id = ? AND disc_number = ? AND track_number = ?
                AND media_id != ?",
            )?;
            let mut rows = st.query(params![album_id, disc_number, track_number, media_id])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };

        match holder {
            Some(holder) => {
                warn!(
                    "album {} disc {} track {} is already held by media {}",
                    album_id, disc_number, track_number, holder
                );
                Err(Error::Invariant(format!(
                    "duplicate track position {}/{} on album {}",
                    disc_number, track_number, album_id
                )))
            }
            None => Ok(()),
        }
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<AlbumTrack>>> {
        store::cached_fetch(&store.caches.album_track, id, || {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached(&format!(
                "SELECT {} FROM AlbumTrack WHERE id_track = ?",
                Self::COLUMNS
            ))?;
            let mut rows = st.query([id])?;

            match rows.next()? {
                Some(row) => Ok(Some(Self::from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn by_media(store: &Store, media_id: i64) -> Result<Option<Arc<AlbumTrack>>> {
        let id: Option<i64> = {
            let conn = store.reader()?;
            let mut st =
                conn.prepare_cached("SELECT id_track FROM AlbumTrack WHERE media_id = ?")?;
            let mut rows = st.query([media_id])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };

        match id {
            Some(id) => Self::fetch(store, id),
            None => Ok(None),
        }
    }

    pub fn by_album(store: &Store, album_id: i64) -> Result<Vec<Arc<AlbumTrack>>> {
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM AlbumTrack WHERE album_id = ?
                    ORDER BY disc_number, track_number, id_track",
                    Self::COLUMNS
                ),
                &[&album_id],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.album_track, items))
    }

    /// Distinct performing artists observed across an album's tracks;
    /// drives the Various Artists upgrade.
    pub fn distinct_artists_with(conn: &Connection, album_id: i64) -> Result<Vec<i64>> {
        store::fetch_all(
            conn,
            "SELECT DISTINCT artist_id FROM AlbumTrack
            WHERE album_id = ? AND artist_id IS NOT NULL",
            &[&album_id],
            |row| row.get(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::Album;
    use crate::artist::Artist;
    use crate::media::{Media, MediaType};
    use crate::test_support::{test_media, test_store};

    #[test]
    fn upsert_keeps_one_row_per_media() {
        let (store, _dir) = test_store();
        let media = test_media(&store, MediaType::Audio, "Zebra");
        let artist = Artist::create(&store, "Ratatat").unwrap();

        let album = {
            let conn = store.writer();
            Album::create_with(&store, &conn, "Classics", Some(artist.id)).unwrap()
        };

        for track_number in [3, 4] {
            let conn = store.writer();
            AlbumTrack::upsert_with(
                &store,
                &conn,
                media.id,
                album.id,
                Some(artist.id),
                None,
                track_number,
                1,
            )
            .unwrap();
        }

        let tracks = AlbumTrack::by_album(&store, album.id).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_number, 4);

        let refreshed = Album::fetch(&store, album.id).unwrap().unwrap();
        assert_eq!(refreshed.nb_tracks, 1);
    }

    #[test]
    fn album_aggregates_track_media_duration() {
        let (store, _dir) = test_store();
        let m1 = test_media(&store, MediaType::Audio, "One");
        let m2 = test_media(&store, MediaType::Audio, "Two");

        {
            let conn = store.writer();
            Media::set_duration_with(&store, &conn, m1.id, 100_000).unwrap();
            Media::set_duration_with(&store, &conn, m2.id, 50_000).unwrap();
        }

        let album = {
            let conn = store.writer();
            Album::create_with(&store, &conn, "Mix", None).unwrap()
        };

        {
            let conn = store.writer();
            AlbumTrack::upsert_with(&store, &conn, m1.id, album.id, None, None, 1, 1).unwrap();
            AlbumTrack::upsert_with(&store, &conn, m2.id, album.id, None, None, 2, 1).unwrap();
        }

        let refreshed = Album::fetch(&store, album.id).unwrap().unwrap();
        assert_eq!(refreshed.nb_tracks, 2);
        assert_eq!(refreshed.duration, 150_000);
    }

    #[test]
    fn duplicate_known_positions_are_rejected() {
        let (store, _dir) = test_store();
        let m1 = test_media(&store, MediaType::Audio, "One");
        let m2 = test_media(&store, MediaType::Audio, "Two");
        let album = {
            let conn = store.writer();
            Album::create_with(&store, &conn, "Classics", None).unwrap()
        };

        {
            let conn = store.writer();
            AlbumTrack::upsert_with(&store, &conn, m1.id, album.id, None, None, 3, 1).unwrap();
            assert!(
                AlbumTrack::upsert_with(&store, &conn, m2.id, album.id, None, None, 3, 1)
                    .is_err()
            );
            // Replaying the holder's own position is still a no-op.
            AlbumTrack::upsert_with(&store, &conn, m1.id, album.id, None, None, 3, 1).unwrap();
        }

        // An unknown disc number means the position isn't fully known,
        // so no uniqueness applies.
        let conn = store.writer();
        AlbumTrack::upsert_with(&store, &conn, m2.id, album.id, None, None, 3, 0).unwrap();

        let tracks = AlbumTrack::by_album(&store, album.id).unwrap();
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn cascade_from_media_deletion_updates_counters() {
        let (store, _dir) = test_store();
        let media = test_media(&store, MediaType::Audio, "Zebra");
        let artist = Artist::create(&store, "Ratatat").unwrap();
        let album = {
            let conn = store.writer();
            Album::create_with(&store, &conn, "Classics", Some(artist.id)).unwrap()
        };
        {
            let conn = store.writer();
            AlbumTrack::upsert_with(&store, &conn, media.id, album.id, Some(artist.id), None, 3, 1)
                .unwrap();
        }

        {
            let conn = store.writer();
            conn.execute("DELETE FROM Media WHERE id_media = ?", [media.id])
                .unwrap();
        }
        store.caches.clear_all();

        assert!(AlbumTrack::by_media(&store, media.id).unwrap().is_none());
        let refreshed = Album::fetch(&store, album.id).unwrap().unwrap();
        assert_eq!(refreshed.nb_tracks, 0);
        assert_eq!(
            Artist::fetch(&store, artist.id).unwrap().unwrap().nb_tracks,
            0
        );
    }
}

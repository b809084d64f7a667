use std::sync::Arc;

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::Result;
use crate::media::Media;
use crate::store::{self, Entity, Store};
use crate::SortingCriteria;

/// `nb_tracks` and `duration` are maintained as absolute recomputes, by
/// the AlbumTrack triggers and by the persister after duration updates,
/// so they always equal the track count and duration sum.
#[derive(Debug, Clone, Serialize)]
pub struct Album {
    pub id: i64,
    pub title: String,
    pub release_year: Option<i64>,
    pub short_summary: Option<String>,
    pub artwork_mrl: Option<String>,
    pub nb_tracks: i64,
    pub duration: i64,
    pub album_artist_id: Option<i64>,
}

impl Entity for Album {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Album {
    pub const TABLE: &'static str = "Album";
    pub const PRIMARY_KEY: &'static str = "id_album";

    const COLUMNS: &'static str = "id_album, title, release_year, short_summary,
        artwork_mrl, nb_tracks, duration, album_artist_id";

    fn from_row(row: &Row) -> rusqlite::Result<Album> {
        Ok(Album {
            id: row.get(0)?,
            title: row.get(1)?,
            release_year: row.get(2)?,
            short_summary: row.get(3)?,
            artwork_mrl: row.get(4)?,
            nb_tracks: row.get(5)?,
            duration: row.get(6)?,
            album_artist_id: row.get(7)?,
        })
    }

    pub fn create_with(
        store: &Store,
        conn: &Connection,
        title: &str,
        album_artist_id: Option<i64>,
    ) -> Result<Arc<Album>> {
        let id = store::insert(
            conn,
            "INSERT INTO Album (title, album_artist_id) VALUES (?, ?)",
            &[&title, &album_artist_id],
        )?;

        debug!("create album {} '{}' artist={:?}", id, title, album_artist_id);

        let album = Arc::new(Album {
            id,
            title: title.to_string(),
            release_year: None,
            short_summary: None,
            artwork_mrl: None,
            nb_tracks: 0,
            duration: 0,
            album_artist_id,
        });
        store.caches.album.put(id, &album);

        Ok(album)
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<Album>>> {
        store::cached_fetch(&store.caches.album, id, || {
            let conn = store.reader()?;
            Self::load(&conn, id)
        })
    }

    fn load(conn: &Connection, id: i64) -> Result<Option<Album>> {
        let mut st = conn.prepare_cached(&format!(
            "SELECT {} FROM Album WHERE id_album = ?",
            Self::COLUMNS
        ))?;
        let mut rows = st.query([id])?;

        match rows.next()? {
            Some(row) => Ok(Some(Self::from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn fetch_with(store: &Store, conn: &Connection, id: i64) -> Result<Option<Arc<Album>>> {
        store::cached_fetch(&store.caches.album, id, || Self::load(conn, id))
    }

    /// Album resolution for the persister: with a pinned album artist the
    /// match requires both title and artist; without one, any album with
    /// a matching title wins and the Various Artists upgrade takes over
    /// from there.
    pub fn find_with(
        store: &Store,
        conn: &Connection,
        title: &str,
        album_artist_id: Option<i64>,
    ) -> Result<Option<Arc<Album>>> {
        let id: Option<i64> = {
            let mut rows_id = None;
            match album_artist_id {
                Some(artist_id) => {
                    let mut st = conn.prepare_cached(
                        "SELECT id_album FROM Album
                        WHERE title = ? AND album_artist_id = ?
                        ORDER BY id_album LIMIT 1",
                    )?;
                    let mut rows = st.query(params![title, artist_id])?;
                    if let Some(row) = rows.next()? {
                        rows_id = Some(row.get(0)?);
                    }
                }
                None => {
                    let mut st = conn.prepare_cached(
                        "SELECT id_album FROM Album WHERE title = ?
                        ORDER BY id_album LIMIT 1",
                    )?;
                    let mut rows = st.query([title])?;
                    if let Some(row) = rows.next()? {
                        rows_id = Some(row.get(0)?);
                    }
                }
            }
            rows_id
        };

        match id {
            Some(id) => Self::fetch_with(store, conn, id),
            None => Ok(None),
        }
    }

    pub fn set_album_artist_with(
        store: &Store,
        conn: &Connection,
        id: i64,
        album_artist_id: i64,
    ) -> Result<()> {
        debug!("album {} album_artist={}", id, album_artist_id);

        conn.prepare_cached("UPDATE Album SET album_artist_id = ? WHERE id_album = ?")?
            .execute(params![album_artist_id, id])?;
        store.caches.album.invalidate(id);
        store.caches.artist.clear();
        Ok(())
    }

    pub fn set_release_year_with(
        store: &Store,
        conn: &Connection,
        id: i64,
        year: i64,
    ) -> Result<()> {
        conn.prepare_cached("UPDATE Album SET release_year = ? WHERE id_album = ?")?
            .execute(params![year, id])?;
        store.caches.album.invalidate(id);
        Ok(())
    }

    pub fn set_artwork_with(store: &Store, conn: &Connection, id: i64, mrl: &str) -> Result<()> {
        conn.prepare_cached("UPDATE Album SET artwork_mrl = ? WHERE id_album = ?")?
            .execute(params![mrl, id])?;
        store.caches.album.invalidate(id);
        Ok(())
    }

    /// Absolute recompute of `nb_tracks` and `duration`; idempotent, used
    /// after media duration changes.
    pub fn refresh_aggregates_with(store: &Store, conn: &Connection, id: i64) -> Result<()> {
        conn.prepare_cached(
            "UPDATE Album SET
                nb_tracks = (SELECT COUNT(*) FROM AlbumTrack WHERE album_id = ?),
                duration = (SELECT IFNULL(SUM(MAX(m.duration, 0)), 0)
                    FROM AlbumTrack t
                    INNER JOIN Media m ON m.id_media = t.media_id
                    WHERE t.album_id = ?)
            WHERE id_album = ?",
        )?
        .execute(params![id, id, id])?;
        store.caches.album.invalidate(id);
        Ok(())
    }

    pub fn list_all(store: &Store, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Album>>> {
        let column = match sort {
            SortingCriteria::ReleaseDate => "release_year",
            SortingCriteria::Duration => "duration",
            SortingCriteria::InsertionDate => "id_album",
            _ => "title",
        };
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM Album ORDER BY {} {}",
                    Self::COLUMNS,
                    column,
                    if desc { "DESC" } else { "ASC" }
                ),
                &[],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.album, items))
    }

    pub fn search(store: &Store, title: &str) -> Result<Vec<Arc<Album>>> {
        let pattern = format!("{}*", title);
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM Album WHERE id_album IN
                        (SELECT rowid FROM AlbumFts WHERE title MATCH ?)",
                    Self::COLUMNS
                ),
                &[&pattern],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.album, items))
    }

    /// Media of this album ordered by disc then track number.
    pub fn tracks(store: &Store, album_id: i64) -> Result<Vec<Arc<Media>>> {
        let ids: Vec<i64> = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                "SELECT media_id FROM AlbumTrack
                WHERE album_id = ?
                ORDER BY disc_number, track_number, media_id",
                &[&album_id],
                |row| row.get(0),
            )?
        };

        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(media) = Media::fetch(store, id)? {
                result.push(media);
            }
        }
        Ok(result)
    }
}

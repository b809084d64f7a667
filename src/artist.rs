use std::sync::Arc;

use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::schema::{UNKNOWN_ARTIST_ID, VARIOUS_ARTISTS_ID};
use crate::store::{self, Entity, Store};
use crate::SortingCriteria;

/// Two synthetic rows exist from the first migration onwards: Unknown
/// Artist and Various Artists, with well-known ids.
#[derive(Debug, Clone, Serialize)]
pub struct Artist {
    pub id: i64,
    pub name: Option<String>,
    pub short_bio: Option<String>,
    pub artwork_mrl: Option<String>,
    pub musicbrainz_id: Option<String>,
    pub nb_albums: i64,
    pub nb_tracks: i64,
    pub is_present: bool,
}

impl Entity for Artist {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Artist {
    pub const TABLE: &'static str = "Artist";
    pub const PRIMARY_KEY: &'static str = "id_artist";

    pub const UNKNOWN_ID: i64 = UNKNOWN_ARTIST_ID;
    pub const VARIOUS_ID: i64 = VARIOUS_ARTISTS_ID;

    const COLUMNS: &'static str = "id_artist, name, short_bio, artwork_mrl,
        musicbrainz_id, nb_albums, nb_tracks, is_present";

    fn from_row(row: &Row) -> rusqlite::Result<Artist> {
        Ok(Artist {
            id: row.get(0)?,
            name: row.get(1)?,
            short_bio: row.get(2)?,
            artwork_mrl: row.get(3)?,
            musicbrainz_id: row.get(4)?,
            nb_albums: row.get(5)?,
            nb_tracks: row.get(6)?,
            is_present: row.get(7)?,
        })
    }

    pub fn create(store: &Store, name: &str) -> Result<Arc<Artist>> {
        let conn = store.writer();
        Self::create_with(store, &conn, name)
    }

    pub fn create_with(store: &Store, conn: &Connection, name: &str) -> Result<Arc<Artist>> {
        let id = store::insert(conn, "INSERT INTO Artist (name) VALUES (?)", &[&name])?;

        debug!("create artist {} '{}'", id, name);

        let artist = Arc::new(Artist {
            id,
            name: Some(name.to_string()),
            short_bio: None,
            artwork_mrl: None,
            musicbrainz_id: None,
            nb_albums: 0,
            nb_tracks: 0,
            is_present: true,
        });
        store.caches.artist.put(id, &artist);

        Ok(artist)
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<Artist>>> {
        store::cached_fetch(&store.caches.artist, id, || {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached(&format!(
                "SELECT {} FROM Artist WHERE id_artist = ?",
                Self::COLUMNS
            ))?;
            let mut rows = st.query([id])?;

            match rows.next()? {
                Some(row) => Ok(Some(Self::from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Case-insensitive exact match; the column collates NOCASE.
    pub fn by_name(store: &Store, name: &str) -> Result<Option<Arc<Artist>>> {
        let id: Option<i64> = {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached("SELECT id_artist FROM Artist WHERE name = ?")?;
            let mut rows = st.query([name])?;
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

    pub fn by_name_with(
        store: &Store,
        conn: &Connection,
        name: &str,
    ) -> Result<Option<Arc<Artist>>> {
        let id: Option<i64> = {
            let mut st = conn.prepare_cached("SELECT id_artist FROM Artist WHERE name = ?")?;
            let mut rows = st.query([name])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };

        match id {
            Some(id) => store::cached_fetch(&store.caches.artist, id, || {
                let mut st = conn.prepare_cached(&format!(
                    "SELECT {} FROM Artist WHERE id_artist = ?",
                    Self::COLUMNS
                ))?;
                let mut rows = st.query([id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(Self::from_row(row)?)),
                    None => Ok(None),
                }
            }),
            None => Ok(None),
        }
    }

    /// Lists artists with at least one album, the synthetic rows included
    /// once they earned albums.
    pub fn list_all(store: &Store, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Artist>>> {
        let column = match sort {
            SortingCriteria::InsertionDate => "id_artist",
            _ => "name",
        };
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM Artist
                    WHERE (id_artist > 2 OR nb_albums > 0) AND is_present = 1
                    ORDER BY {} {}",
                    Self::COLUMNS,
                    column,
                    if desc { "DESC" } else { "ASC" }
                ),
                &[],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.artist, items))
    }

    pub fn search(store: &Store, name: &str) -> Result<Vec<Arc<Artist>>> {
        let pattern = format!("{}*", name);
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM Artist WHERE id_artist IN
                        (SELECT rowid FROM ArtistFts WHERE name MATCH ?)",
                    Self::COLUMNS
                ),
                &[&pattern],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.artist, items))
    }

    /// Deleting an artist still referenced by tracks or albums is
    /// forbidden.
    pub fn delete(store: &Store, id: i64) -> Result<()> {
        let conn = store.writer();

        let (nb_albums, nb_tracks): (i64, i64) = conn
            .prepare_cached("SELECT nb_albums, nb_tracks FROM Artist WHERE id_artist = ?")?
            .query_row([id], |row| Ok((row.get(0)?, row.get(1)?)))?;

        if nb_albums > 0 || nb_tracks > 0 {
            return Err(Error::Invariant(format!(
                "artist {} still has {} albums and {} tracks",
                id, nb_albums, nb_tracks
            )));
        }

        debug!("delete artist {}", id);
        conn.prepare_cached("DELETE FROM Artist WHERE id_artist = ?")?
            .execute([id])?;
        drop(conn);

        store.caches.artist.invalidate(id);
        Ok(())
    }
}

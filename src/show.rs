use std::sync::Arc;

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::Result;
use crate::store::{self, Entity, Store};
use crate::SortingCriteria;

#[derive(Debug, Clone, Serialize)]
pub struct Show {
    pub id: i64,
    pub title: Option<String>,
    pub release_date: Option<i64>,
    pub short_summary: Option<String>,
    pub artwork_mrl: Option<String>,
    pub tvdb_id: Option<String>,
}

impl Entity for Show {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowEpisode {
    pub id: i64,
    pub media_id: i64,
    pub show_id: i64,
    pub episode_number: i64,
    pub season_number: i64,
    pub title: Option<String>,
    pub short_summary: Option<String>,
}

impl Entity for ShowEpisode {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Show {
    pub const TABLE: &'static str = "Show";
    pub const PRIMARY_KEY: &'static str = "id_show";

    const COLUMNS: &'static str =
        "id_show, title, release_date, short_summary, artwork_mrl, tvdb_id";

    fn from_row(row: &Row) -> rusqlite::Result<Show> {
        Ok(Show {
            id: row.get(0)?,
            title: row.get(1)?,
            release_date: row.get(2)?,
            short_summary: row.get(3)?,
            artwork_mrl: row.get(4)?,
            tvdb_id: row.get(5)?,
        })
    }

    pub fn create_with(store: &Store, conn: &Connection, title: &str) -> Result<Arc<Show>> {
        let id = store::insert(conn, "INSERT INTO Show (title) VALUES (?)", &[&title])?;

        debug!("create show {} '{}'", id, title);

        let show = Arc::new(Show {
            id,
            title: Some(title.to_string()),
            release_date: None,
            short_summary: None,
            artwork_mrl: None,
            tvdb_id: None,
        });
        store.caches.show.put(id, &show);

        Ok(show)
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<Show>>> {
        store::cached_fetch(&store.caches.show, id, || {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached(&format!(
                "SELECT {} FROM Show WHERE id_show = ?",
                Self::COLUMNS
            ))?;
            let mut rows = st.query([id])?;

            match rows.next()? {
                Some(row) => Ok(Some(Self::from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn by_title_with(store: &Store, conn: &Connection, title: &str) -> Result<Option<Arc<Show>>> {
        let id: Option<i64> = {
            let mut st = conn.prepare_cached(
                "SELECT id_show FROM Show WHERE title = ? ORDER BY id_show LIMIT 1",
            )?;
            let mut rows = st.query([title])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };

        match id {
            Some(id) => store::cached_fetch(&store.caches.show, id, || {
                let mut st = conn.prepare_cached(&format!(
                    "SELECT {} FROM Show WHERE id_show = ?",
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

    pub fn list_all(store: &Store, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Show>>> {
        let column = match sort {
            SortingCriteria::ReleaseDate => "release_date",
            SortingCriteria::InsertionDate => "id_show",
            _ => "title",
        };
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM Show ORDER BY {} {}",
                    Self::COLUMNS,
                    column,
                    if desc { "DESC" } else { "ASC" }
                ),
                &[],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.show, items))
    }

    pub fn search(store: &Store, title: &str) -> Result<Vec<Arc<Show>>> {
        let pattern = format!("{}*", title);
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM Show WHERE id_show IN
                        (SELECT rowid FROM ShowFts WHERE title MATCH ?)",
                    Self::COLUMNS
                ),
                &[&pattern],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.show, items))
    }

    pub fn episodes(store: &Store, show_id: i64) -> Result<Vec<Arc<ShowEpisode>>> {
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM ShowEpisode WHERE show_id = ?
                    ORDER BY season_number, episode_number, id_episode",
                    ShowEpisode::COLUMNS
                ),
                &[&show_id],
                ShowEpisode::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.show_episode, items))
    }
}

impl ShowEpisode {
    pub const TABLE: &'static str = "ShowEpisode";
    pub const PRIMARY_KEY: &'static str = "id_episode";

    const COLUMNS: &'static str = "id_episode, media_id, show_id, episode_number,
        season_number, title, short_summary";

    fn from_row(row: &Row) -> rusqlite::Result<ShowEpisode> {
        Ok(ShowEpisode {
            id: row.get(0)?,
            media_id: row.get(1)?,
            show_id: row.get(2)?,
            episode_number: row.get(3)?,
            season_number: row.get(4)?,
            title: row.get(5)?,
            short_summary: row.get(6)?,
        })
    }

    /// Upsert keyed by the media id, mirroring AlbumTrack.
    pub fn upsert_with(
        store: &Store,
        conn: &Connection,
        media_id: i64,
        show_id: i64,
        episode_number: i64,
        season_number: i64,
        title: Option<&str>,
    ) -> Result<Arc<ShowEpisode>> {
        let existing: Option<i64> = {
            let mut st =
                conn.prepare_cached("SELECT id_episode FROM ShowEpisode WHERE media_id = ?")?;
            let mut rows = st.query([media_id])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };

        let id = match existing {
            Some(id) => {
                conn.prepare_cached(
                    "UPDATE ShowEpisode SET show_id = ?, episode_number = ?,
                        season_number = ?, title = ?
                    WHERE id_episode = ?",
                )?
                .execute(params![show_id, episode_number, season_number, title, id])?;
                id
            }
            None => store::insert(
                conn,
                "INSERT INTO ShowEpisode
                    (media_id, show_id, episode_number, season_number, title)
                VALUES (?, ?, ?, ?, ?)",
                &[&media_id, &show_id, &episode_number, &season_number, &title],
            )?,
        };

        debug!(
            "upsert show episode {} media={} show={} s{:02}e{:02}",
            id, media_id, show_id, season_number, episode_number
        );

        let episode = Arc::new(ShowEpisode {
            id,
            media_id,
            show_id,
            episode_number,
            season_number,
            title: title.map(str::to_string),
            short_summary: None,
        });
        store.caches.show_episode.put(id, &episode);

        Ok(episode)
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<ShowEpisode>>> {
        store::cached_fetch(&store.caches.show_episode, id, || {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached(&format!(
                "SELECT {} FROM ShowEpisode WHERE id_episode = ?",
                Self::COLUMNS
            ))?;
            let mut rows = st.query([id])?;

            match rows.next()? {
                Some(row) => Ok(Some(Self::from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn by_media(store: &Store, media_id: i64) -> Result<Option<Arc<ShowEpisode>>> {
        let id: Option<i64> = {
            let conn = store.reader()?;
            let mut st =
                conn.prepare_cached("SELECT id_episode FROM ShowEpisode WHERE media_id = ?")?;
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
}

use std::sync::Arc;

use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::error::Result;
use crate::store::{self, Entity, Store};
use crate::SortingCriteria;

#[derive(Debug, Clone, Serialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

impl Entity for Genre {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Genre {
    pub const TABLE: &'static str = "Genre";
    pub const PRIMARY_KEY: &'static str = "id_genre";

    fn from_row(row: &Row) -> rusqlite::Result<Genre> {
        Ok(Genre {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }

    pub fn create(store: &Store, name: &str) -> Result<Arc<Genre>> {
        let conn = store.writer();
        Self::create_with(store, &conn, name)
    }

    pub fn create_with(store: &Store, conn: &Connection, name: &str) -> Result<Arc<Genre>> {
        let id = store::insert(conn, "INSERT INTO Genre (name) VALUES (?)", &[&name])?;

        debug!("create genre {} '{}'", id, name);

        let genre = Arc::new(Genre {
            id,
            name: name.to_string(),
        });
        store.caches.genre.put(id, &genre);

        Ok(genre)
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<Genre>>> {
        store::cached_fetch(&store.caches.genre, id, || {
            let conn = store.reader()?;
            let mut st =
                conn.prepare_cached("SELECT id_genre, name FROM Genre WHERE id_genre = ?")?;
            let mut rows = st.query([id])?;

            match rows.next()? {
                Some(row) => Ok(Some(Self::from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Case-insensitive exact match; the column collates NOCASE.
    pub fn by_name_with(store: &Store, conn: &Connection, name: &str) -> Result<Option<Arc<Genre>>> {
        let id: Option<i64> = {
            let mut st = conn.prepare_cached("SELECT id_genre FROM Genre WHERE name = ?")?;
            let mut rows = st.query([name])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };

        match id {
            Some(id) => store::cached_fetch(&store.caches.genre, id, || {
                let mut st =
                    conn.prepare_cached("SELECT id_genre, name FROM Genre WHERE id_genre = ?")?;
                let mut rows = st.query([id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(Self::from_row(row)?)),
                    None => Ok(None),
                }
            }),
            None => Ok(None),
        }
    }

    pub fn by_name(store: &Store, name: &str) -> Result<Option<Arc<Genre>>> {
        let conn = store.reader()?;
        let id: Option<i64> = {
            let mut st = conn.prepare_cached("SELECT id_genre FROM Genre WHERE name = ?")?;
            let mut rows = st.query([name])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };
        drop(conn);

        match id {
            Some(id) => Self::fetch(store, id),
            None => Ok(None),
        }
    }

    pub fn list_all(store: &Store, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Genre>>> {
        let column = match sort {
            SortingCriteria::InsertionDate => "id_genre",
            _ => "name",
        };
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT id_genre, name FROM Genre ORDER BY {} {}",
                    column,
                    if desc { "DESC" } else { "ASC" }
                ),
                &[],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.genre, items))
    }

    pub fn search(store: &Store, name: &str) -> Result<Vec<Arc<Genre>>> {
        let pattern = format!("{}*", name);
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                "SELECT id_genre, name FROM Genre WHERE id_genre IN
                    (SELECT rowid FROM GenreFts WHERE name MATCH ?)",
                &[&pattern],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.genre, items))
    }
}

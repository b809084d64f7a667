use std::sync::Arc;

use rusqlite::{params, Row};
use serde::Serialize;

use crate::error::Result;
use crate::media::Media;
use crate::store::{self, Entity, Store};

/// User-defined tag, many-to-many with Media.
#[derive(Debug, Clone, Serialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
}

impl Entity for Label {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Label {
    pub const TABLE: &'static str = "Label";
    pub const PRIMARY_KEY: &'static str = "id_label";

    fn from_row(row: &Row) -> rusqlite::Result<Label> {
        Ok(Label {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }

    pub fn create(store: &Store, name: &str) -> Result<Arc<Label>> {
        let conn = store.writer();
        let id = store::insert(&conn, "INSERT INTO Label (name) VALUES (?)", &[&name])?;
        drop(conn);

        debug!("create label {} '{}'", id, name);

        let label = Arc::new(Label {
            id,
            name: name.to_string(),
        });
        store.caches.label.put(id, &label);

        Ok(label)
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<Label>>> {
        store::cached_fetch(&store.caches.label, id, || {
            let conn = store.reader()?;
            let mut st =
                conn.prepare_cached("SELECT id_label, name FROM Label WHERE id_label = ?")?;
            let mut rows = st.query([id])?;

            match rows.next()? {
                Some(row) => Ok(Some(Self::from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn by_name(store: &Store, name: &str) -> Result<Option<Arc<Label>>> {
        let id: Option<i64> = {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached("SELECT id_label FROM Label WHERE name = ?")?;
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

    pub fn list_all(store: &Store) -> Result<Vec<Arc<Label>>> {
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                "SELECT id_label, name FROM Label ORDER BY name",
                &[],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.label, items))
    }

    pub fn attach(store: &Store, label_id: i64, media_id: i64) -> Result<()> {
        trace!("attach label {} to media {}", label_id, media_id);

        let conn = store.writer();
        conn.prepare_cached(
            "INSERT OR IGNORE INTO MediaLabelRelation (label_id, media_id) VALUES (?, ?)",
        )?
        .execute(params![label_id, media_id])?;
        Ok(())
    }

    pub fn detach(store: &Store, label_id: i64, media_id: i64) -> Result<()> {
        trace!("detach label {} from media {}", label_id, media_id);

        let conn = store.writer();
        conn.prepare_cached(
            "DELETE FROM MediaLabelRelation WHERE label_id = ? AND media_id = ?",
        )?
        .execute(params![label_id, media_id])?;
        Ok(())
    }

    pub fn for_media(store: &Store, media_id: i64) -> Result<Vec<Arc<Label>>> {
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                "SELECT l.id_label, l.name FROM Label l
                INNER JOIN MediaLabelRelation r ON r.label_id = l.id_label
                WHERE r.media_id = ?
                ORDER BY l.name",
                &[&media_id],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.label, items))
    }

    pub fn media(store: &Store, label_id: i64) -> Result<Vec<Arc<Media>>> {
        let ids: Vec<i64> = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                "SELECT media_id FROM MediaLabelRelation WHERE label_id = ?
                ORDER BY media_id",
                &[&label_id],
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

    pub fn delete(store: &Store, id: i64) -> Result<()> {
        debug!("delete label {}", id);

        let conn = store.writer();
        conn.prepare_cached("DELETE FROM Label WHERE id_label = ?")?
            .execute([id])?;
        drop(conn);

        store.caches.label.invalidate(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaType;
    use crate::test_support::{test_media, test_store};

    #[test]
    fn attach_detach_round_trip() {
        let (store, _dir) = test_store();
        let media = test_media(&store, MediaType::Audio, "Track");
        let label = Label::create(&store, "favorites").unwrap();

        Label::attach(&store, label.id, media.id).unwrap();
        Label::attach(&store, label.id, media.id).unwrap();
        assert_eq!(Label::for_media(&store, media.id).unwrap().len(), 1);
        assert_eq!(Label::media(&store, label.id).unwrap().len(), 1);

        Label::detach(&store, label.id, media.id).unwrap();
        assert!(Label::for_media(&store, media.id).unwrap().is_empty());
    }

    #[test]
    fn deleting_label_clears_relations() {
        let (store, _dir) = test_store();
        let media = test_media(&store, MediaType::Audio, "Track");
        let label = Label::create(&store, "gone").unwrap();
        Label::attach(&store, label.id, media.id).unwrap();

        Label::delete(&store, label.id).unwrap();
        assert!(Label::for_media(&store, media.id).unwrap().is_empty());
    }

    #[test]
    fn names_are_unique() {
        let (store, _dir) = test_store();
        Label::create(&store, "dup").unwrap();
        assert!(Label::create(&store, "dup").is_err());
    }
}

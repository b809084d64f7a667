use std::sync::Arc;

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::Result;
use crate::store::{self, Entity, Store};

/// A directory known to the catalogue. `path` is stored relative to the
/// owning device's mountpoint so a remount elsewhere keeps every child
/// row valid.
#[derive(Debug, Clone, Serialize)]
pub struct Folder {
    pub id: i64,
    pub path: String,
    pub parent_id: Option<i64>,
    pub device_id: i64,
    pub is_root: bool,
    pub is_blacklisted: bool,
    pub is_present: bool,
}

impl Entity for Folder {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Folder {
    pub const TABLE: &'static str = "Folder";
    pub const PRIMARY_KEY: &'static str = "id_folder";

    const COLUMNS: &'static str =
        "id_folder, path, parent_id, device_id, is_root, is_blacklisted, is_present";

    fn from_row(row: &Row) -> rusqlite::Result<Folder> {
        Ok(Folder {
            id: row.get(0)?,
            path: row.get(1)?,
            parent_id: row.get(2)?,
            device_id: row.get(3)?,
            is_root: row.get(4)?,
            is_blacklisted: row.get(5)?,
            is_present: row.get(6)?,
        })
    }

    pub fn create(
        store: &Store,
        path: &str,
        parent_id: Option<i64>,
        device_id: i64,
        is_root: bool,
    ) -> Result<Arc<Folder>> {
        let conn = store.writer();
        Self::create_with(store, &conn, path, parent_id, device_id, is_root)
    }

    pub fn create_with(
        store: &Store,
        conn: &Connection,
        path: &str,
        parent_id: Option<i64>,
        device_id: i64,
        is_root: bool,
    ) -> Result<Arc<Folder>> {
        let id = store::insert(
            conn,
            "INSERT INTO Folder (path, parent_id, device_id, is_root, is_present)
            VALUES (?, ?, ?, ?, 1)",
            &[&path, &parent_id, &device_id, &is_root],
        )?;

        debug!("create folder {} device={} path='{}'", id, device_id, path);

        let folder = Arc::new(Folder {
            id,
            path: path.to_string(),
            parent_id,
            device_id,
            is_root,
            is_blacklisted: false,
            is_present: true,
        });
        store.caches.folder.put(id, &folder);

        Ok(folder)
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<Folder>>> {
        store::cached_fetch(&store.caches.folder, id, || {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached(&format!(
                "SELECT {} FROM Folder WHERE id_folder = ?",
                Self::COLUMNS
            ))?;
            let mut rows = st.query([id])?;

            match rows.next()? {
                Some(row) => Ok(Some(Self::from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn by_path(store: &Store, device_id: i64, path: &str) -> Result<Option<Arc<Folder>>> {
        let id: Option<i64> = {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached(
                "SELECT id_folder FROM Folder WHERE device_id = ? AND path = ?",
            )?;
            let mut rows = st.query(params![device_id, path])?;
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

    pub fn children(store: &Store, parent_id: i64) -> Result<Vec<Arc<Folder>>> {
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM Folder WHERE parent_id = ? ORDER BY path",
                    Self::COLUMNS
                ),
                &[&parent_id],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.folder, items))
    }

    /// Entry points: root folders that have not been banned.
    pub fn entry_points(store: &Store) -> Result<Vec<Arc<Folder>>> {
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM Folder
                    WHERE is_root = 1 AND is_blacklisted = 0
                    ORDER BY id_folder",
                    Self::COLUMNS
                ),
                &[],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.folder, items))
    }

    pub fn set_present(store: &Store, id: i64, present: bool) -> Result<()> {
        trace!("folder {} present={}", id, present);

        let conn = store.writer();
        conn.prepare_cached("UPDATE Folder SET is_present = ? WHERE id_folder = ?")?
            .execute(params![present, id])?;
        drop(conn);

        store.caches.clear_presence();
        Ok(())
    }

    pub fn set_blacklisted(store: &Store, id: i64, blacklisted: bool) -> Result<()> {
        debug!("folder {} blacklisted={}", id, blacklisted);

        let conn = store.writer();
        conn.prepare_cached("UPDATE Folder SET is_blacklisted = ? WHERE id_folder = ?")?
            .execute(params![blacklisted, id])?;
        drop(conn);

        store.caches.folder.invalidate(id);
        Ok(())
    }

    /// Removes the folder row; files and subfolders go with it through
    /// the cascades, media left without files included.
    pub fn delete(store: &Store, id: i64) -> Result<()> {
        debug!("delete folder {}", id);

        let conn = store.writer();
        conn.prepare_cached("DELETE FROM Folder WHERE id_folder = ?")?
            .execute([id])?;
        drop(conn);

        store.caches.clear_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::test_support::test_store;

    #[test]
    fn path_is_unique_per_device() {
        let (store, _dir) = test_store();
        let device = Device::create(&store, "uuid-1", "/mnt", false).unwrap();
        Folder::create(&store, "music", None, device.id, true).unwrap();

        assert!(Folder::create(&store, "music", None, device.id, true).is_err());
    }

    #[test]
    fn entry_points_exclude_banned_roots() {
        let (store, _dir) = test_store();
        let device = Device::create(&store, "uuid-1", "/mnt", false).unwrap();
        let a = Folder::create(&store, "a", None, device.id, true).unwrap();
        let b = Folder::create(&store, "b", None, device.id, true).unwrap();
        Folder::create(&store, "a/sub", Some(a.id), device.id, false).unwrap();

        Folder::set_blacklisted(&store, b.id, true).unwrap();

        let roots = Folder::entry_points(&store).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, a.id);
    }

    #[test]
    fn device_presence_cascades_to_folders() {
        let (store, _dir) = test_store();
        let device = Device::create(&store, "uuid-1", "/mnt", true).unwrap();
        let folder = Folder::create(&store, "music", None, device.id, true).unwrap();

        Device::set_present(&store, device.id, false).unwrap();
        assert!(!Folder::fetch(&store, folder.id).unwrap().unwrap().is_present);

        Device::set_present(&store, device.id, true).unwrap();
        assert!(Folder::fetch(&store, folder.id).unwrap().unwrap().is_present);
    }
}

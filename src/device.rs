use std::sync::Arc;

use rusqlite::{params, Row};
use serde::Serialize;

use crate::error::Result;
use crate::store::{self, Entity, Store};

/// A storage device known to the catalogue. Devices are never deleted;
/// history is preserved so files on a returning removable device can be
/// re-attached without a re-parse.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: i64,
    pub uuid: String,
    pub mountpoint: String,
    pub is_removable: bool,
    pub is_present: bool,
}

impl Entity for Device {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Device {
    pub const TABLE: &'static str = "Device";
    pub const PRIMARY_KEY: &'static str = "id_device";

    fn from_row(row: &Row) -> rusqlite::Result<Device> {
        Ok(Device {
            id: row.get(0)?,
            uuid: row.get(1)?,
            mountpoint: row.get(2)?,
            is_removable: row.get(3)?,
            is_present: row.get(4)?,
        })
    }

    const COLUMNS: &'static str = "id_device, uuid, mountpoint, is_removable, is_present";

    pub fn create(
        store: &Store,
        uuid: &str,
        mountpoint: &str,
        is_removable: bool,
    ) -> Result<Arc<Device>> {
        let conn = store.writer();
        let id = store::insert(
            &conn,
            "INSERT INTO Device (uuid, mountpoint, is_removable, is_present)
            VALUES (?, ?, ?, 1)",
            &[&uuid, &mountpoint, &is_removable],
        )?;

        debug!("create device {} uuid={} at '{}'", id, uuid, mountpoint);

        let device = Arc::new(Device {
            id,
            uuid: uuid.to_string(),
            mountpoint: mountpoint.to_string(),
            is_removable,
            is_present: true,
        });
        store.caches.device.put(id, &device);

        Ok(device)
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<Device>>> {
        store::cached_fetch(&store.caches.device, id, || {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached(
                "SELECT id_device, uuid, mountpoint, is_removable, is_present
                FROM Device WHERE id_device = ?",
            )?;
            let mut rows = st.query([id])?;

            match rows.next()? {
                Some(row) => Ok(Some(Self::from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn by_uuid(store: &Store, uuid: &str) -> Result<Option<Arc<Device>>> {
        let id: Option<i64> = {
            let conn = store.reader()?;
            let mut st =
                conn.prepare_cached("SELECT id_device FROM Device WHERE uuid = ?")?;
            let mut rows = st.query([uuid])?;
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

    pub fn list_all(store: &Store) -> Result<Vec<Arc<Device>>> {
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!("SELECT {} FROM Device ORDER BY id_device", Self::COLUMNS),
                &[],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.device, items))
    }

    /// Flips the presence flag; the cascade triggers propagate it through
    /// Folder and File down to Media.
    pub fn set_present(store: &Store, id: i64, present: bool) -> Result<()> {
        debug!("device {} present={}", id, present);

        let conn = store.writer();
        conn.prepare_cached("UPDATE Device SET is_present = ? WHERE id_device = ?")?
            .execute(params![present, id])?;
        drop(conn);

        store.caches.clear_presence();
        Ok(())
    }

    /// Records a new mountpoint after a remount. Folder paths are stored
    /// device-relative, so nothing else needs rewriting.
    pub fn set_mountpoint(store: &Store, id: i64, mountpoint: &str) -> Result<()> {
        debug!("device {} mountpoint='{}'", id, mountpoint);

        let conn = store.writer();
        conn.prepare_cached("UPDATE Device SET mountpoint = ? WHERE id_device = ?")?
            .execute(params![mountpoint, id])?;
        drop(conn);

        store.caches.device.invalidate(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_store;

    #[test]
    fn create_and_fetch_round_trip() {
        let (store, _dir) = test_store();
        let device = Device::create(&store, "uuid-1", "/mnt/usb", true).unwrap();

        let fetched = Device::fetch(&store, device.id).unwrap().unwrap();
        assert_eq!(fetched.uuid, "uuid-1");
        assert_eq!(fetched.mountpoint, "/mnt/usb");
        assert!(fetched.is_removable);
        assert!(fetched.is_present);
    }

    #[test]
    fn uuid_lookup_is_case_insensitive() {
        let (store, _dir) = test_store();
        Device::create(&store, "ABCD-1234", "/mnt/usb", true).unwrap();

        assert!(Device::by_uuid(&store, "abcd-1234").unwrap().is_some());
    }

    #[test]
    fn remount_keeps_identity() {
        let (store, _dir) = test_store();
        let device = Device::create(&store, "uuid-1", "/mnt/a", true).unwrap();

        Device::set_mountpoint(&store, device.id, "/mnt/b").unwrap();
        let fetched = Device::by_uuid(&store, "uuid-1").unwrap().unwrap();
        assert_eq!(fetched.id, device.id);
        assert_eq!(fetched.mountpoint, "/mnt/b");
    }
}

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::Result;
use crate::store::{self, Entity, Store};

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum FileType {
    Unknown = 0,
    Video = 1,
    Audio = 2,
    ShowEpisode = 3,
    AlbumTrack = 4,
    Playlist = 5,
}

impl FileType {
    pub fn from_i64(v: i64) -> FileType {
        match v {
            1 => FileType::Video,
            2 => FileType::Audio,
            3 => FileType::ShowEpisode,
            4 => FileType::AlbumTrack,
            5 => FileType::Playlist,
            _ => FileType::Unknown,
        }
    }
}

/// Pipeline cursor persisted on the File row: the next stage to run, or
/// one of the two terminal states.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum ParserStep {
    None = 0,
    Probed = 1,
    Persisted = 2,
    Completed = 3,
}

pub const PARSER_STEP_FATAL: i64 = -1;

impl ParserStep {
    pub fn from_i64(v: i64) -> Option<ParserStep> {
        match v {
            0 => Some(ParserStep::None),
            1 => Some(ParserStep::Probed),
            2 => Some(ParserStep::Persisted),
            3 => Some(ParserStep::Completed),
            _ => None,
        }
    }
}

/// Raw filesystem facts for one on-disk file plus its pipeline progress.
/// `parser_step` holds a `ParserStep` value or `PARSER_STEP_FATAL`.
#[derive(Debug, Clone, Serialize)]
pub struct File {
    pub id: i64,
    pub media_id: Option<i64>,
    pub mrl: String,
    pub name: String,
    pub file_type: FileType,
    pub folder_id: i64,
    pub last_modification_date: i64,
    pub size: i64,
    pub parser_step: i64,
    pub is_present: bool,
}

impl Entity for File {
    fn id(&self) -> i64 {
        self.id
    }
}

impl File {
    pub const TABLE: &'static str = "File";
    pub const PRIMARY_KEY: &'static str = "id_file";

    const COLUMNS: &'static str = "id_file, media_id, mrl, name, file_type, folder_id,
        last_modification_date, size, parser_step, is_present";

    fn from_row(row: &Row) -> rusqlite::Result<File> {
        let file_type: i64 = row.get(4)?;
        Ok(File {
            id: row.get(0)?,
            media_id: row.get(1)?,
            mrl: row.get(2)?,
            name: row.get(3)?,
            file_type: FileType::from_i64(file_type),
            folder_id: row.get(5)?,
            last_modification_date: row.get(6)?,
            size: row.get(7)?,
            parser_step: row.get(8)?,
            is_present: row.get(9)?,
        })
    }

    pub fn create(
        store: &Store,
        mrl: &str,
        name: &str,
        file_type: FileType,
        folder_id: i64,
        last_modification_date: i64,
        size: i64,
    ) -> Result<Arc<File>> {
        let conn = store.writer();
        let id = store::insert(
            &conn,
            "INSERT INTO File (mrl, name, file_type, folder_id,
                last_modification_date, size, parser_step, is_present)
            VALUES (?, ?, ?, ?, ?, ?, 0, 1)",
            &[
                &mrl,
                &name,
                &(file_type as i64),
                &folder_id,
                &last_modification_date,
                &size,
            ],
        )?;

        debug!("create file {} '{}'", id, mrl);

        let file = Arc::new(File {
            id,
            media_id: None,
            mrl: mrl.to_string(),
            name: name.to_string(),
            file_type,
            folder_id,
            last_modification_date,
            size,
            parser_step: ParserStep::None as i64,
            is_present: true,
        });
        store.caches.file.put(id, &file);

        Ok(file)
    }

    /// Direct presence flip for a single vanished or reappeared file;
    /// the trigger recomputes the owning media's presence.
    pub fn set_present(store: &Store, id: i64, present: bool) -> Result<()> {
        trace!("file {} present={}", id, present);

        let conn = store.writer();
        conn.prepare_cached("UPDATE File SET is_present = ? WHERE id_file = ?")?
            .execute(params![present, id])?;
        drop(conn);

        store.caches.clear_presence();
        Ok(())
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<File>>> {
        store::cached_fetch(&store.caches.file, id, || {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached(&format!(
                "SELECT {} FROM File WHERE id_file = ?",
                Self::COLUMNS
            ))?;
            let mut rows = st.query([id])?;

            match rows.next()? {
                Some(row) => Ok(Some(Self::from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Reconciliation identity: a file is the same file as long as it
    /// keeps its name inside the same (device-relative) folder.
    pub fn by_folder_and_name(
        store: &Store,
        folder_id: i64,
        name: &str,
    ) -> Result<Option<Arc<File>>> {
        let id: Option<i64> = {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached(
                "SELECT id_file FROM File WHERE folder_id = ? AND name = ?",
            )?;
            let mut rows = st.query(params![folder_id, name])?;
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

    pub fn by_folder(store: &Store, folder_id: i64) -> Result<Vec<Arc<File>>> {
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM File WHERE folder_id = ? ORDER BY name",
                    Self::COLUMNS
                ),
                &[&folder_id],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.file, items))
    }

    pub fn by_media(store: &Store, media_id: i64) -> Result<Vec<Arc<File>>> {
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM File WHERE media_id = ? ORDER BY id_file",
                    Self::COLUMNS
                ),
                &[&media_id],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.file, items))
    }

    /// Files whose parsing never reached `completed_step`; re-enqueued
    /// on startup.
    pub fn incomplete(store: &Store, completed_step: i64) -> Result<Vec<Arc<File>>> {
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT {} FROM File
                    WHERE parser_step >= ? AND parser_step < ?
                    ORDER BY id_file",
                    Self::COLUMNS
                ),
                &[&(ParserStep::None as i64), &completed_step],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.file, items))
    }

    pub fn set_parser_step(store: &Store, id: i64, step: i64) -> Result<()> {
        let conn = store.writer();
        Self::set_parser_step_with(store, &conn, id, step)
    }

    pub fn set_parser_step_with(
        store: &Store,
        conn: &Connection,
        id: i64,
        step: i64,
    ) -> Result<()> {
        trace!("file {} parser_step={}", id, step);

        // No-op when the stage already stamped the step inside its own
        // transaction; keeps recovery idempotent.
        conn.prepare_cached("UPDATE File SET parser_step = ? WHERE id_file = ? AND parser_step != ?")?
            .execute(params![step, id, step])?;
        store.caches.file.invalidate(id);
        Ok(())
    }

    pub fn set_media_id_with(
        store: &Store,
        conn: &Connection,
        id: i64,
        media_id: i64,
    ) -> Result<()> {
        trace!("file {} media_id={}", id, media_id);

        conn.prepare_cached("UPDATE File SET media_id = ? WHERE id_file = ?")?
            .execute(params![media_id, id])?;
        store.caches.file.invalidate(id);
        Ok(())
    }

    pub fn set_file_type_with(
        store: &Store,
        conn: &Connection,
        id: i64,
        file_type: FileType,
    ) -> Result<()> {
        conn.prepare_cached("UPDATE File SET file_type = ? WHERE id_file = ?")?
            .execute(params![file_type as i64, id])?;
        store.caches.file.invalidate(id);
        Ok(())
    }

    /// A modified file keeps its id but loses everything derived from the
    /// old content: parsed classification rows, stream tracks and the
    /// pipeline cursor. The Media row itself survives so playlists and
    /// labels pointing at it stay intact.
    pub fn reset_for_reparse(
        store: &Store,
        id: i64,
        last_modification_date: i64,
        size: i64,
    ) -> Result<()> {
        debug!("file {} modified, resetting parser state", id);

        let mut conn = store.writer();
        let tx = conn.transaction()?;

        let media_id: Option<i64> = tx
            .prepare_cached("SELECT media_id FROM File WHERE id_file = ?")?
            .query_row([id], |row| row.get(0))
            .optional()?
            .flatten();

        if let Some(media_id) = media_id {
            tx.prepare_cached("DELETE FROM AlbumTrack WHERE media_id = ?")?
                .execute([media_id])?;
            tx.prepare_cached("DELETE FROM ShowEpisode WHERE media_id = ?")?
                .execute([media_id])?;
            tx.prepare_cached("DELETE FROM AudioTrack WHERE media_id = ?")?
                .execute([media_id])?;
            tx.prepare_cached("DELETE FROM VideoTrack WHERE media_id = ?")?
                .execute([media_id])?;
        }

        tx.prepare_cached(
            "UPDATE File SET parser_step = 0, last_modification_date = ?, size = ?
            WHERE id_file = ?",
        )?
        .execute(params![last_modification_date, size, id])?;

        tx.commit()?;
        drop(conn);

        store.caches.clear_all();
        Ok(())
    }

    /// Refreshes the stored MRL after a device came back under a new
    /// mountpoint. Not a content modification; no re-parse.
    pub fn set_mrl(store: &Store, id: i64, mrl: &str) -> Result<()> {
        trace!("file {} mrl='{}'", id, mrl);

        let conn = store.writer();
        conn.prepare_cached("UPDATE File SET mrl = ? WHERE id_file = ?")?
            .execute(params![mrl, id])?;
        drop(conn);

        store.caches.file.invalidate(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_folder, test_store};

    #[test]
    fn incomplete_excludes_terminal_steps() {
        let (store, _dir) = test_store();
        let folder = test_folder(&store);

        let pending = File::create(
            &store,
            "file:///m/a.mp3",
            "a.mp3",
            FileType::Audio,
            folder.id,
            1,
            10,
        )
        .unwrap();
        let done = File::create(
            &store,
            "file:///m/b.mp3",
            "b.mp3",
            FileType::Audio,
            folder.id,
            1,
            10,
        )
        .unwrap();
        let failed = File::create(
            &store,
            "file:///m/c.mp3",
            "c.mp3",
            FileType::Audio,
            folder.id,
            1,
            10,
        )
        .unwrap();

        File::set_parser_step(&store, done.id, ParserStep::Completed as i64).unwrap();
        File::set_parser_step(&store, failed.id, PARSER_STEP_FATAL).unwrap();

        let incomplete = File::incomplete(&store, ParserStep::Completed as i64).unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].id, pending.id);
    }

    #[test]
    fn reconciliation_identity_survives_mrl_refresh() {
        let (store, _dir) = test_store();
        let folder = test_folder(&store);

        let file = File::create(
            &store,
            "file:///old/a.mp3",
            "a.mp3",
            FileType::Audio,
            folder.id,
            1,
            10,
        )
        .unwrap();
        File::set_mrl(&store, file.id, "file:///new/a.mp3").unwrap();

        let found = File::by_folder_and_name(&store, folder.id, "a.mp3")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, file.id);
        assert_eq!(found.mrl, "file:///new/a.mp3");
        assert_eq!(found.parser_step, ParserStep::None as i64);
    }
}

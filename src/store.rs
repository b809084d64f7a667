use std::collections::HashMap;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::{Connection, OpenFlags, ToSql, Transaction};

use crate::album::Album;
use crate::album_track::AlbumTrack;
use crate::artist::Artist;
use crate::config::Config;
use crate::db_meta;
use crate::device::Device;
use crate::error::Result;
use crate::file::File;
use crate::folder::Folder;
use crate::genre::Genre;
use crate::label::Label;
use crate::media::Media;
use crate::playlist::Playlist;
use crate::show::{Show, ShowEpisode};

/// Implemented by every catalogue entity; the id is the table's primary
/// key as assigned on first persistence.
pub trait Entity {
    fn id(&self) -> i64;
}

/// Maps a 0 id to NULL on insert so triggers can auto-assign the value.
/// Used for playlist positions and optional foreign keys.
pub struct ForeignKey(pub i64);

impl ToSql for ForeignKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        if self.0 == 0 {
            Ok(ToSqlOutput::Owned(Value::Null))
        } else {
            Ok(ToSqlOutput::Owned(Value::Integer(self.0)))
        }
    }
}

/// Identity map for one table. Fetches hand out the same `Arc` for the
/// same row id as long as a client still holds it; the weak entries die
/// with the last strong reference.
pub struct EntityCache<T> {
    entries: RwLock<HashMap<i64, Weak<T>>>,
}

impl<T> EntityCache<T> {
    fn new() -> EntityCache<T> {
        EntityCache {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: i64) -> Option<Arc<T>> {
        self.entries.read().unwrap().get(&id).and_then(Weak::upgrade)
    }

    pub fn put(&self, id: i64, entity: &Arc<T>) {
        self.entries
            .write()
            .unwrap()
            .insert(id, Arc::downgrade(entity));
    }

    pub fn invalidate(&self, id: i64) {
        self.entries.write().unwrap().remove(&id);
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

/// One identity map per table.
pub struct EntityCaches {
    pub device: EntityCache<Device>,
    pub folder: EntityCache<Folder>,
    pub file: EntityCache<File>,
    pub media: EntityCache<Media>,
    pub album: EntityCache<Album>,
    pub album_track: EntityCache<AlbumTrack>,
    pub artist: EntityCache<Artist>,
    pub genre: EntityCache<Genre>,
    pub show: EntityCache<Show>,
    pub show_episode: EntityCache<ShowEpisode>,
    pub label: EntityCache<Label>,
    pub playlist: EntityCache<Playlist>,
}

impl EntityCaches {
    fn new() -> EntityCaches {
        EntityCaches {
            device: EntityCache::new(),
            folder: EntityCache::new(),
            file: EntityCache::new(),
            media: EntityCache::new(),
            album: EntityCache::new(),
            album_track: EntityCache::new(),
            artist: EntityCache::new(),
            genre: EntityCache::new(),
            show: EntityCache::new(),
            show_episode: EntityCache::new(),
            label: EntityCache::new(),
            playlist: EntityCache::new(),
        }
    }

    pub fn clear_all(&self) {
        self.device.clear();
        self.folder.clear();
        self.file.clear();
        self.media.clear();
        self.album.clear();
        self.album_track.clear();
        self.artist.clear();
        self.genre.clear();
        self.show.clear();
        self.show_episode.clear();
        self.label.clear();
        self.playlist.clear();
    }

    /// The presence cascade rewrites Folder, File and Media rows behind
    /// our back through triggers; drop every snapshot they may touch.
    pub fn clear_presence(&self) {
        self.device.clear();
        self.folder.clear();
        self.file.clear();
        self.media.clear();
    }
}

/// Catalogue store. One writable connection serialised by a mutex plus a
/// pool of read-only connections checked out per reader thread; WAL keeps
/// readers unblocked while the writer commits.
pub struct Store {
    db_path: PathBuf,
    stmt_cache_size: usize,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
    pub caches: EntityCaches,
}

impl Store {
    pub fn open(config: &Config) -> Result<Store> {
        info!("using '{}'", config.db_path.to_string_lossy());

        let mut conn = match Connection::open(&config.db_path) {
            Ok(c) => c,
            Err(e) => {
                error!(
                    "can't open sqlite database '{}': {}",
                    config.db_path.to_string_lossy(),
                    e
                );
                return Err(e.into());
            }
        };

        Self::configure(&conn, config.stmt_cache_size)?;
        db_meta::ensure_schema(&mut conn)?;

        Ok(Store {
            db_path: config.db_path.clone(),
            stmt_cache_size: config.stmt_cache_size,
            writer: Mutex::new(conn),
            readers: Mutex::new(Vec::new()),
            caches: EntityCaches::new(),
        })
    }

    // Trigger chains in the schema are acyclic (no trigger re-fires
    // itself), so SQLite's default recursive_triggers = OFF stands.
    fn configure(conn: &Connection, stmt_cache_size: usize) -> Result<()> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;",
        )?;
        conn.set_prepared_statement_cache_capacity(stmt_cache_size);
        Ok(())
    }

    /// Exclusive handle on the write connection. Hold it across a commit
    /// when follow-up work (notifications) must observe commit order.
    pub fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().unwrap()
    }

    /// Runs `f` inside a write transaction; commit on Ok, rollback on any
    /// error or early exit. Nested scopes go through `Transaction::savepoint`.
    pub fn with_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let mut conn = self.writer();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Checks a read-only connection out of the pool, opening a fresh one
    /// when the pool is dry. The guard returns it on drop.
    pub fn reader(&self) -> Result<ReadConn<'_>> {
        let pooled = self.readers.lock().unwrap().pop();
        let conn = match pooled {
            Some(c) => c,
            None => {
                let c = Connection::open_with_flags(
                    &self.db_path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                Self::configure(&c, self.stmt_cache_size)?;
                c
            }
        };

        Ok(ReadConn {
            store: self,
            conn: Some(conn),
        })
    }
}

pub struct ReadConn<'a> {
    store: &'a Store,
    conn: Option<Connection>,
}

impl Deref for ReadConn<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().unwrap()
    }
}

impl Drop for ReadConn<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.store.readers.lock().unwrap().push(conn);
        }
    }
}

/// Runs an insert and hands back the generated row id.
pub fn insert(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<i64> {
    let mut st = conn.prepare_cached(sql)?;
    st.execute(params)?;
    Ok(conn.last_insert_rowid())
}

/// Fetch-through-cache: identity-map hit returns the shared snapshot,
/// otherwise `load` produces the value and the map is primed.
pub fn cached_fetch<T, F>(cache: &EntityCache<T>, id: i64, load: F) -> Result<Option<Arc<T>>>
where
    F: FnOnce() -> Result<Option<T>>,
{
    if let Some(entity) = cache.get(id) {
        return Ok(Some(entity));
    }

    match load()? {
        Some(entity) => {
            let entity = Arc::new(entity);
            cache.put(id, &entity);
            Ok(Some(entity))
        }
        None => Ok(None),
    }
}

/// Routes freshly loaded rows through the identity map so list results
/// share instances with prior fetches.
pub fn cache_list<T: Entity>(cache: &EntityCache<T>, items: Vec<T>) -> Vec<Arc<T>> {
    items
        .into_iter()
        .map(|entity| match cache.get(entity.id()) {
            Some(existing) => existing,
            None => {
                let entity = Arc::new(entity);
                cache.put(entity.id(), &entity);
                entity
            }
        })
        .collect()
}

/// Maps every row of a query through `map`.
pub fn fetch_all<T, F>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
    map: F,
) -> Result<Vec<T>>
where
    F: Fn(&rusqlite::Row) -> rusqlite::Result<T>,
{
    let mut st = conn.prepare_cached(sql)?;
    let mut rows = st.query(params)?;

    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(map(row)?);
    }

    Ok(result)
}

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::media::Media;
use crate::store::{self, Entity, ForeignKey, Store};
use crate::SortingCriteria;

/// Positions in the media relation are a dense permutation of `1..=N`.
/// Appends ride the insertion triggers (a NULL position auto-assigns the
/// tail slot); moves and removals renumber explicitly inside one
/// transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub creation_date: i64,
}

impl Entity for Playlist {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Playlist {
    pub const TABLE: &'static str = "Playlist";
    pub const PRIMARY_KEY: &'static str = "id_playlist";

    fn from_row(row: &Row) -> rusqlite::Result<Playlist> {
        Ok(Playlist {
            id: row.get(0)?,
            name: row.get(1)?,
            creation_date: row.get(2)?,
        })
    }

    pub fn create(store: &Store, name: &str) -> Result<Arc<Playlist>> {
        let creation_date = Utc::now().timestamp();
        let conn = store.writer();
        let id = store::insert(
            &conn,
            "INSERT INTO Playlist (name, creation_date) VALUES (?, ?)",
            &[&name, &creation_date],
        )?;
        drop(conn);

        debug!("create playlist {} '{}'", id, name);

        let playlist = Arc::new(Playlist {
            id,
            name: name.to_string(),
            creation_date,
        });
        store.caches.playlist.put(id, &playlist);

        Ok(playlist)
    }

    pub fn fetch(store: &Store, id: i64) -> Result<Option<Arc<Playlist>>> {
        store::cached_fetch(&store.caches.playlist, id, || {
            let conn = store.reader()?;
            let mut st = conn.prepare_cached(
                "SELECT id_playlist, name, creation_date FROM Playlist WHERE id_playlist = ?",
            )?;
            let mut rows = st.query([id])?;

            match rows.next()? {
                Some(row) => Ok(Some(Self::from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn rename(store: &Store, id: i64, name: &str) -> Result<()> {
        debug!("rename playlist {} to '{}'", id, name);

        let conn = store.writer();
        conn.prepare_cached("UPDATE Playlist SET name = ? WHERE id_playlist = ?")?
            .execute(params![name, id])?;
        drop(conn);

        store.caches.playlist.invalidate(id);
        Ok(())
    }

    pub fn delete(store: &Store, id: i64) -> Result<()> {
        debug!("delete playlist {}", id);

        let conn = store.writer();
        conn.prepare_cached("DELETE FROM Playlist WHERE id_playlist = ?")?
            .execute([id])?;
        drop(conn);

        store.caches.playlist.invalidate(id);
        Ok(())
    }

    pub fn list_all(store: &Store, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Playlist>>> {
        let column = match sort {
            SortingCriteria::InsertionDate => "creation_date",
            _ => "name",
        };
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                &format!(
                    "SELECT id_playlist, name, creation_date FROM Playlist
                    ORDER BY {} {}",
                    column,
                    if desc { "DESC" } else { "ASC" }
                ),
                &[],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.playlist, items))
    }

    pub fn search(store: &Store, name: &str) -> Result<Vec<Arc<Playlist>>> {
        let pattern = format!("{}*", name);
        let items = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                "SELECT id_playlist, name, creation_date FROM Playlist
                WHERE id_playlist IN
                    (SELECT rowid FROM PlaylistFts WHERE name MATCH ?)",
                &[&pattern],
                Self::from_row,
            )?
        };
        Ok(store::cache_list(&store.caches.playlist, items))
    }

    /// Present media of this playlist, in playlist order.
    pub fn media(store: &Store, playlist_id: i64) -> Result<Vec<Arc<Media>>> {
        let ids: Vec<i64> = {
            let conn = store.reader()?;
            store::fetch_all(
                &conn,
                "SELECT m.id_media FROM Media m
                LEFT JOIN PlaylistMediaRelation pmr ON pmr.media_id = m.id_media
                WHERE pmr.playlist_id = ? AND m.is_present = 1
                ORDER BY pmr.position",
                &[&playlist_id],
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

    pub fn positions(store: &Store, playlist_id: i64) -> Result<Vec<(i64, i64)>> {
        let conn = store.reader()?;
        store::fetch_all(
            &conn,
            "SELECT media_id, position FROM PlaylistMediaRelation
            WHERE playlist_id = ? ORDER BY position",
            &[&playlist_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
    }

    pub fn append(store: &Store, playlist_id: i64, media_id: i64) -> Result<()> {
        Self::add(store, playlist_id, media_id, 0)
    }

    /// Inserts at `position`; 0 appends. The position isn't a foreign
    /// key, but the sentinel turns 0 into NULL so the insertion trigger
    /// counts the records and appends. Out-of-range positions clamp to
    /// the tail so the dense numbering never gains a gap.
    pub fn add(store: &Store, playlist_id: i64, media_id: i64, position: i64) -> Result<()> {
        trace!(
            "playlist {} add media {} at {}",
            playlist_id,
            media_id,
            position
        );

        store.with_tx(|tx| {
            let position = if position > 0 {
                let count: i64 = tx
                    .prepare_cached(
                        "SELECT COUNT(*) FROM PlaylistMediaRelation WHERE playlist_id = ?",
                    )?
                    .query_row([playlist_id], |row| row.get(0))?;
                position.min(count + 1)
            } else {
                0
            };

            tx.prepare_cached(
                "INSERT INTO PlaylistMediaRelation (media_id, playlist_id, position)
                VALUES (?, ?, ?)",
            )?
            .execute(params![media_id, playlist_id, ForeignKey(position)])?;
            Ok(())
        })
    }

    /// Moves a member to `position` (1-based; 0 is rejected). The vacated
    /// slot closes first, then the destination slot opens, so positions
    /// stay a dense `1..=N` throughout.
    pub fn move_media(
        store: &Store,
        playlist_id: i64,
        media_id: i64,
        position: i64,
    ) -> Result<()> {
        if position == 0 {
            return Err(Error::Invariant(
                "playlist positions are 1-based; cannot move to 0".to_string(),
            ));
        }

        trace!(
            "playlist {} move media {} to {}",
            playlist_id,
            media_id,
            position
        );

        store.with_tx(|tx| {
            let old: Option<i64> = tx
                .prepare_cached(
                    "SELECT position FROM PlaylistMediaRelation
                    WHERE playlist_id = ? AND media_id = ?",
                )?
                .query_row(params![playlist_id, media_id], |row| row.get(0))
                .optional()?;

            let old = match old {
                Some(p) => p,
                None => {
                    return Err(Error::Invariant(format!(
                        "media {} is not part of playlist {}",
                        media_id, playlist_id
                    )))
                }
            };

            let count: i64 = tx
                .prepare_cached(
                    "SELECT COUNT(*) FROM PlaylistMediaRelation WHERE playlist_id = ?",
                )?
                .query_row([playlist_id], |row| row.get(0))?;
            let position = position.min(count);

            tx.prepare_cached(
                "UPDATE PlaylistMediaRelation SET position = position - 1
                WHERE playlist_id = ? AND position > ? AND media_id != ?",
            )?
            .execute(params![playlist_id, old, media_id])?;

            tx.prepare_cached(
                "UPDATE PlaylistMediaRelation SET position = position + 1
                WHERE playlist_id = ? AND position >= ? AND media_id != ?",
            )?
            .execute(params![playlist_id, position, media_id])?;

            tx.prepare_cached(
                "UPDATE PlaylistMediaRelation SET position = ?
                WHERE playlist_id = ? AND media_id = ?",
            )?
            .execute(params![position, playlist_id, media_id])?;

            Ok(())
        })
    }

    /// The deletion trigger closes the vacated slot; the same trigger
    /// keeps positions dense when a media row disappears through the
    /// cascades.
    pub fn remove_media(store: &Store, playlist_id: i64, media_id: i64) -> Result<()> {
        trace!("playlist {} remove media {}", playlist_id, media_id);

        let conn = store.writer();
        conn.prepare_cached(
            "DELETE FROM PlaylistMediaRelation
            WHERE playlist_id = ? AND media_id = ?",
        )?
        .execute(params![playlist_id, media_id])?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaType;
    use crate::test_support::{test_media, test_store};

    fn assert_dense(store: &Store, playlist_id: i64) {
        let positions = Playlist::positions(store, playlist_id).unwrap();
        for (index, (_, position)) in positions.iter().enumerate() {
            assert_eq!(*position, index as i64 + 1, "positions must be 1..=N");
        }
    }

    #[test]
    fn append_on_empty_playlist_yields_position_one() {
        let (store, _dir) = test_store();
        let playlist = Playlist::create(&store, "p").unwrap();
        let media = test_media(&store, MediaType::Audio, "a");

        Playlist::append(&store, playlist.id, media.id).unwrap();

        let positions = Playlist::positions(&store, playlist.id).unwrap();
        assert_eq!(positions, vec![(media.id, 1)]);
    }

    #[test]
    fn move_to_head_swaps_two_items() {
        let (store, _dir) = test_store();
        let playlist = Playlist::create(&store, "p").unwrap();
        let m1 = test_media(&store, MediaType::Audio, "a");
        let m2 = test_media(&store, MediaType::Audio, "b");

        Playlist::append(&store, playlist.id, m1.id).unwrap();
        Playlist::append(&store, playlist.id, m2.id).unwrap();
        Playlist::move_media(&store, playlist.id, m2.id, 1).unwrap();

        let positions = Playlist::positions(&store, playlist.id).unwrap();
        assert_eq!(positions, vec![(m2.id, 1), (m1.id, 2)]);
    }

    #[test]
    fn insert_past_the_end_appends() {
        let (store, _dir) = test_store();
        let playlist = Playlist::create(&store, "p").unwrap();
        let m1 = test_media(&store, MediaType::Audio, "a");
        let m2 = test_media(&store, MediaType::Audio, "b");
        let m3 = test_media(&store, MediaType::Audio, "c");

        Playlist::append(&store, playlist.id, m1.id).unwrap();
        Playlist::append(&store, playlist.id, m2.id).unwrap();
        Playlist::add(&store, playlist.id, m3.id, 3).unwrap();

        let positions = Playlist::positions(&store, playlist.id).unwrap();
        assert_eq!(positions, vec![(m1.id, 1), (m2.id, 2), (m3.id, 3)]);
        assert_dense(&store, playlist.id);
    }

    #[test]
    fn explicit_insert_shifts_following_members() {
        let (store, _dir) = test_store();
        let playlist = Playlist::create(&store, "p").unwrap();
        let m1 = test_media(&store, MediaType::Audio, "a");
        let m2 = test_media(&store, MediaType::Audio, "b");
        let m3 = test_media(&store, MediaType::Audio, "c");

        Playlist::append(&store, playlist.id, m1.id).unwrap();
        Playlist::append(&store, playlist.id, m2.id).unwrap();
        Playlist::add(&store, playlist.id, m3.id, 1).unwrap();

        let positions = Playlist::positions(&store, playlist.id).unwrap();
        assert_eq!(positions, vec![(m3.id, 1), (m1.id, 2), (m2.id, 3)]);
    }

    #[test]
    fn move_sequence_reorders_as_expected() {
        let (store, _dir) = test_store();
        let playlist = Playlist::create(&store, "p").unwrap();
        let m1 = test_media(&store, MediaType::Audio, "a");
        let m2 = test_media(&store, MediaType::Audio, "b");
        let m3 = test_media(&store, MediaType::Audio, "c");

        Playlist::append(&store, playlist.id, m1.id).unwrap();
        Playlist::append(&store, playlist.id, m2.id).unwrap();
        Playlist::append(&store, playlist.id, m3.id).unwrap();

        Playlist::move_media(&store, playlist.id, m3.id, 1).unwrap();
        Playlist::move_media(&store, playlist.id, m1.id, 3).unwrap();

        let positions = Playlist::positions(&store, playlist.id).unwrap();
        assert_eq!(positions, vec![(m3.id, 1), (m2.id, 2), (m1.id, 3)]);
        assert_dense(&store, playlist.id);
    }

    #[test]
    fn move_to_position_zero_is_rejected() {
        let (store, _dir) = test_store();
        let playlist = Playlist::create(&store, "p").unwrap();
        let media = test_media(&store, MediaType::Audio, "a");
        Playlist::append(&store, playlist.id, media.id).unwrap();

        assert!(Playlist::move_media(&store, playlist.id, media.id, 0).is_err());
    }

    #[test]
    fn removal_closes_the_hole() {
        let (store, _dir) = test_store();
        let playlist = Playlist::create(&store, "p").unwrap();
        let m1 = test_media(&store, MediaType::Audio, "a");
        let m2 = test_media(&store, MediaType::Audio, "b");
        let m3 = test_media(&store, MediaType::Audio, "c");

        for media in [&m1, &m2, &m3] {
            Playlist::append(&store, playlist.id, media.id).unwrap();
        }
        Playlist::remove_media(&store, playlist.id, m2.id).unwrap();

        let positions = Playlist::positions(&store, playlist.id).unwrap();
        assert_eq!(positions, vec![(m1.id, 1), (m3.id, 2)]);
        assert_dense(&store, playlist.id);
    }

    #[test]
    fn media_deletion_cascade_keeps_positions_dense() {
        let (store, _dir) = test_store();
        let playlist = Playlist::create(&store, "p").unwrap();
        let m1 = test_media(&store, MediaType::Audio, "a");
        let m2 = test_media(&store, MediaType::Audio, "b");
        let m3 = test_media(&store, MediaType::Audio, "c");

        for media in [&m1, &m2, &m3] {
            Playlist::append(&store, playlist.id, media.id).unwrap();
        }

        {
            let conn = store.writer();
            conn.execute("DELETE FROM Media WHERE id_media = ?", [m2.id])
                .unwrap();
        }
        store.caches.clear_all();

        let positions = Playlist::positions(&store, playlist.id).unwrap();
        assert_eq!(positions, vec![(m1.id, 1), (m3.id, 2)]);
    }

    #[test]
    fn rename_updates_search_mirror() {
        let (store, _dir) = test_store();
        let playlist = Playlist::create(&store, "road trip").unwrap();

        Playlist::rename(&store, playlist.id, "workout").unwrap();
        assert!(Playlist::search(&store, "road").unwrap().is_empty());
        assert_eq!(Playlist::search(&store, "work").unwrap().len(), 1);
    }

    #[test]
    fn replaying_ops_reproduces_order() {
        let (store, _dir) = test_store();
        let media: Vec<_> = (0..4)
            .map(|i| test_media(&store, MediaType::Audio, &format!("t{}", i)))
            .collect();

        let run = |name: &str| -> Vec<i64> {
            let playlist = Playlist::create(&store, name).unwrap();
            Playlist::append(&store, playlist.id, media[0].id).unwrap();
            Playlist::append(&store, playlist.id, media[1].id).unwrap();
            Playlist::add(&store, playlist.id, media[2].id, 2).unwrap();
            Playlist::append(&store, playlist.id, media[3].id).unwrap();
            Playlist::move_media(&store, playlist.id, media[3].id, 1).unwrap();
            Playlist::remove_media(&store, playlist.id, media[0].id).unwrap();
            Playlist::positions(&store, playlist.id)
                .unwrap()
                .into_iter()
                .map(|(media_id, _)| media_id)
                .collect()
        };

        let first = run("first");
        let second = run("second");
        assert_eq!(first, second);
        assert_eq!(first, vec![media[3].id, media[2].id, media[1].id]);
    }
}

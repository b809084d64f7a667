//! Catalogue schema. `MIGRATIONS` is the ordered list applied by
//! `db_meta::ensure_schema`; each migration runs in a single transaction
//! and stamps its version into `Settings`.

/// Schema version this build targets.
pub const DB_VERSION: u32 = 1;

/// Well-known artist rows seeded by the first migration.
pub const UNKNOWN_ARTIST_ID: i64 = 1;
pub const VARIOUS_ARTISTS_ID: i64 = 2;

pub const SETTINGS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS Settings (
    db_version INTEGER NOT NULL);
";

pub struct Migration {
    pub version: u32,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    statements: MIGRATION_1,
}];

const MIGRATION_1: &[&str] = &[
    // ---- tables ----
    "CREATE TABLE Device (
        id_device INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid TEXT UNIQUE ON CONFLICT FAIL COLLATE NOCASE,
        mountpoint TEXT NOT NULL,
        is_removable BOOLEAN NOT NULL,
        is_present BOOLEAN NOT NULL DEFAULT 1)",
    "CREATE TABLE Folder (
        id_folder INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL,
        parent_id INTEGER,
        device_id INTEGER NOT NULL,
        is_root BOOLEAN NOT NULL DEFAULT 0,
        is_blacklisted BOOLEAN NOT NULL DEFAULT 0,
        is_present BOOLEAN NOT NULL DEFAULT 1,
        UNIQUE(device_id, path),
        FOREIGN KEY(parent_id) REFERENCES Folder(id_folder) ON DELETE CASCADE,
        FOREIGN KEY(device_id) REFERENCES Device(id_device) ON DELETE CASCADE)",
    "CREATE INDEX Folder_device_id ON Folder (device_id)",
    "CREATE INDEX Folder_parent_id ON Folder (parent_id)",
    "CREATE TABLE Media (
        id_media INTEGER PRIMARY KEY AUTOINCREMENT,
        type INTEGER NOT NULL,
        subtype INTEGER NOT NULL DEFAULT 0,
        title TEXT,
        duration INTEGER NOT NULL DEFAULT -1,
        play_count INTEGER NOT NULL DEFAULT 0,
        last_played_date INTEGER,
        insertion_date INTEGER NOT NULL,
        release_date INTEGER,
        thumbnail TEXT,
        is_favorite BOOLEAN NOT NULL DEFAULT 0,
        is_present BOOLEAN NOT NULL DEFAULT 1)",
    "CREATE TABLE File (
        id_file INTEGER PRIMARY KEY AUTOINCREMENT,
        media_id INTEGER,
        mrl TEXT NOT NULL,
        name TEXT NOT NULL,
        file_type INTEGER NOT NULL DEFAULT 0,
        folder_id INTEGER NOT NULL,
        last_modification_date INTEGER NOT NULL,
        size INTEGER NOT NULL DEFAULT 0,
        parser_step INTEGER NOT NULL DEFAULT 0,
        is_present BOOLEAN NOT NULL DEFAULT 1,
        UNIQUE(folder_id, name),
        FOREIGN KEY(media_id) REFERENCES Media(id_media) ON DELETE CASCADE,
        FOREIGN KEY(folder_id) REFERENCES Folder(id_folder) ON DELETE CASCADE)",
    "CREATE INDEX File_media_id ON File (media_id)",
    "CREATE INDEX File_folder_id ON File (folder_id)",
    "CREATE TABLE Artist (
        id_artist INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE COLLATE NOCASE,
        short_bio TEXT,
        artwork_mrl TEXT,
        musicbrainz_id TEXT,
        nb_albums INTEGER NOT NULL DEFAULT 0,
        nb_tracks INTEGER NOT NULL DEFAULT 0,
        is_present BOOLEAN NOT NULL DEFAULT 1)",
    "CREATE TABLE Album (
        id_album INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        release_year INTEGER,
        short_summary TEXT,
        artwork_mrl TEXT,
        nb_tracks INTEGER NOT NULL DEFAULT 0,
        duration INTEGER NOT NULL DEFAULT 0,
        album_artist_id INTEGER,
        FOREIGN KEY(album_artist_id) REFERENCES Artist(id_artist) ON DELETE SET NULL)",
    "CREATE INDEX Album_album_artist_id ON Album (album_artist_id)",
    "CREATE TABLE Genre (
        id_genre INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL COLLATE NOCASE)",
    "CREATE TABLE AlbumTrack (
        id_track INTEGER PRIMARY KEY AUTOINCREMENT,
        media_id INTEGER NOT NULL UNIQUE,
        album_id INTEGER NOT NULL,
        artist_id INTEGER,
        genre_id INTEGER,
        track_number INTEGER NOT NULL DEFAULT 0,
        disc_number INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY(media_id) REFERENCES Media(id_media) ON DELETE CASCADE,
        FOREIGN KEY(album_id) REFERENCES Album(id_album) ON DELETE CASCADE,
        FOREIGN KEY(artist_id) REFERENCES Artist(id_artist) ON DELETE SET NULL,
        FOREIGN KEY(genre_id) REFERENCES Genre(id_genre) ON DELETE SET NULL)",
    "CREATE INDEX AlbumTrack_album_id ON AlbumTrack (album_id)",
    "CREATE INDEX AlbumTrack_artist_id ON AlbumTrack (artist_id)",
    "CREATE INDEX AlbumTrack_genre_id ON AlbumTrack (genre_id)",
    // A disc/track number of 0 means the tag was missing or invalid;
    // positions are only unique once all of them are known.
    "CREATE UNIQUE INDEX AlbumTrack_position ON AlbumTrack
        (album_id, disc_number, track_number)
        WHERE disc_number > 0 AND track_number > 0",
    "CREATE TABLE Show (
        id_show INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT,
        release_date INTEGER,
        short_summary TEXT,
        artwork_mrl TEXT,
        tvdb_id TEXT)",
    "CREATE TABLE ShowEpisode (
        id_episode INTEGER PRIMARY KEY AUTOINCREMENT,
        media_id INTEGER NOT NULL UNIQUE,
        show_id INTEGER NOT NULL,
        episode_number INTEGER NOT NULL DEFAULT 0,
        season_number INTEGER NOT NULL DEFAULT 0,
        title TEXT,
        short_summary TEXT,
        FOREIGN KEY(media_id) REFERENCES Media(id_media) ON DELETE CASCADE,
        FOREIGN KEY(show_id) REFERENCES Show(id_show) ON DELETE CASCADE)",
    "CREATE INDEX ShowEpisode_show_id ON ShowEpisode (show_id)",
    "CREATE TABLE AudioTrack (
        id_track INTEGER PRIMARY KEY AUTOINCREMENT,
        media_id INTEGER NOT NULL,
        codec TEXT,
        bitrate INTEGER NOT NULL DEFAULT 0,
        samplerate INTEGER NOT NULL DEFAULT 0,
        nb_channels INTEGER NOT NULL DEFAULT 0,
        language TEXT,
        description TEXT,
        FOREIGN KEY(media_id) REFERENCES Media(id_media) ON DELETE CASCADE)",
    "CREATE INDEX AudioTrack_media_id ON AudioTrack (media_id)",
    "CREATE TABLE VideoTrack (
        id_track INTEGER PRIMARY KEY AUTOINCREMENT,
        media_id INTEGER NOT NULL,
        codec TEXT,
        fps REAL NOT NULL DEFAULT 0,
        width INTEGER NOT NULL DEFAULT 0,
        height INTEGER NOT NULL DEFAULT 0,
        sar_num INTEGER,
        sar_den INTEGER,
        FOREIGN KEY(media_id) REFERENCES Media(id_media) ON DELETE CASCADE)",
    "CREATE INDEX VideoTrack_media_id ON VideoTrack (media_id)",
    "CREATE TABLE Label (
        id_label INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL)",
    "CREATE TABLE MediaLabelRelation (
        label_id INTEGER,
        media_id INTEGER,
        PRIMARY KEY(label_id, media_id),
        FOREIGN KEY(label_id) REFERENCES Label(id_label) ON DELETE CASCADE,
        FOREIGN KEY(media_id) REFERENCES Media(id_media) ON DELETE CASCADE)",
    "CREATE TABLE Playlist (
        id_playlist INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        creation_date INTEGER NOT NULL)",
    "CREATE TABLE PlaylistMediaRelation (
        media_id INTEGER,
        playlist_id INTEGER,
        position INTEGER,
        PRIMARY KEY(media_id, playlist_id),
        FOREIGN KEY(media_id) REFERENCES Media(id_media) ON DELETE CASCADE,
        FOREIGN KEY(playlist_id) REFERENCES Playlist(id_playlist) ON DELETE CASCADE)",
    "CREATE INDEX PlaylistMediaRelation_playlist_id
        ON PlaylistMediaRelation (playlist_id)",
    // ---- full text mirrors ----
    "CREATE VIRTUAL TABLE MediaFts USING FTS4(title)",
    "CREATE VIRTUAL TABLE AlbumFts USING FTS4(title)",
    "CREATE VIRTUAL TABLE ArtistFts USING FTS4(name)",
    "CREATE VIRTUAL TABLE GenreFts USING FTS4(name)",
    "CREATE VIRTUAL TABLE PlaylistFts USING FTS4(name)",
    "CREATE VIRTUAL TABLE ShowFts USING FTS4(title)",
    "CREATE TRIGGER insert_media_fts AFTER INSERT ON Media
        BEGIN
            INSERT INTO MediaFts(rowid, title) VALUES(new.id_media, new.title);
        END",
    "CREATE TRIGGER update_media_fts AFTER UPDATE OF title ON Media
        BEGIN
            UPDATE MediaFts SET title = new.title WHERE rowid = new.id_media;
        END",
    "CREATE TRIGGER delete_media_fts BEFORE DELETE ON Media
        BEGIN
            DELETE FROM MediaFts WHERE rowid = old.id_media;
        END",
    "CREATE TRIGGER insert_album_fts AFTER INSERT ON Album
        BEGIN
            INSERT INTO AlbumFts(rowid, title) VALUES(new.id_album, new.title);
        END",
    "CREATE TRIGGER update_album_fts AFTER UPDATE OF title ON Album
        BEGIN
            UPDATE AlbumFts SET title = new.title WHERE rowid = new.id_album;
        END",
    "CREATE TRIGGER delete_album_fts BEFORE DELETE ON Album
        BEGIN
            DELETE FROM AlbumFts WHERE rowid = old.id_album;
        END",
    "CREATE TRIGGER insert_artist_fts AFTER INSERT ON Artist
        BEGIN
            INSERT INTO ArtistFts(rowid, name) VALUES(new.id_artist, new.name);
        END",
    "CREATE TRIGGER update_artist_fts AFTER UPDATE OF name ON Artist
        BEGIN
            UPDATE ArtistFts SET name = new.name WHERE rowid = new.id_artist;
        END",
    "CREATE TRIGGER delete_artist_fts BEFORE DELETE ON Artist
        BEGIN
            DELETE FROM ArtistFts WHERE rowid = old.id_artist;
        END",
    "CREATE TRIGGER insert_genre_fts AFTER INSERT ON Genre
        BEGIN
            INSERT INTO GenreFts(rowid, name) VALUES(new.id_genre, new.name);
        END",
    "CREATE TRIGGER update_genre_fts AFTER UPDATE OF name ON Genre
        BEGIN
            UPDATE GenreFts SET name = new.name WHERE rowid = new.id_genre;
        END",
    "CREATE TRIGGER delete_genre_fts BEFORE DELETE ON Genre
        BEGIN
            DELETE FROM GenreFts WHERE rowid = old.id_genre;
        END",
    "CREATE TRIGGER insert_playlist_fts AFTER INSERT ON Playlist
        BEGIN
            INSERT INTO PlaylistFts(rowid, name) VALUES(new.id_playlist, new.name);
        END",
    "CREATE TRIGGER update_playlist_fts AFTER UPDATE OF name ON Playlist
        BEGIN
            UPDATE PlaylistFts SET name = new.name WHERE rowid = new.id_playlist;
        END",
    "CREATE TRIGGER delete_playlist_fts BEFORE DELETE ON Playlist
        BEGIN
            DELETE FROM PlaylistFts WHERE rowid = old.id_playlist;
        END",
    "CREATE TRIGGER insert_show_fts AFTER INSERT ON Show
        BEGIN
            INSERT INTO ShowFts(rowid, title) VALUES(new.id_show, new.title);
        END",
    "CREATE TRIGGER update_show_fts AFTER UPDATE OF title ON Show
        BEGIN
            UPDATE ShowFts SET title = new.title WHERE rowid = new.id_show;
        END",
    "CREATE TRIGGER delete_show_fts BEFORE DELETE ON Show
        BEGIN
            DELETE FROM ShowFts WHERE rowid = old.id_show;
        END",
    // ---- playlist ordering ----
    // A NULL position counts the records already in the playlist, the
    // freshly inserted row included, which nets out to append-at-end.
    "CREATE TRIGGER append_new_playlist_record AFTER INSERT ON PlaylistMediaRelation
        WHEN new.position IS NULL
        BEGIN
            UPDATE PlaylistMediaRelation SET position = (
                SELECT COUNT(media_id) FROM PlaylistMediaRelation
                    WHERE playlist_id = new.playlist_id
            ) WHERE playlist_id = new.playlist_id AND media_id = new.media_id;
        END",
    "CREATE TRIGGER update_playlist_order_on_insert AFTER INSERT ON PlaylistMediaRelation
        WHEN new.position IS NOT NULL
        BEGIN
            UPDATE PlaylistMediaRelation SET position = position + 1
                WHERE playlist_id = new.playlist_id
                AND position >= new.position
                AND media_id != new.media_id;
        END",
    // Closes the hole a removal leaves, whether it came from an explicit
    // removal or from a media deletion cascade.
    "CREATE TRIGGER update_playlist_order_on_delete AFTER DELETE ON PlaylistMediaRelation
        BEGIN
            UPDATE PlaylistMediaRelation SET position = position - 1
                WHERE playlist_id = old.playlist_id
                AND position > old.position;
        END",
    // ---- presence cascade ----
    "CREATE TRIGGER device_presence_changed AFTER UPDATE OF is_present ON Device
        BEGIN
            UPDATE Folder SET is_present = new.is_present
                WHERE device_id = new.id_device;
        END",
    "CREATE TRIGGER folder_presence_changed AFTER UPDATE OF is_present ON Folder
        BEGIN
            UPDATE File SET is_present = new.is_present
                WHERE folder_id = new.id_folder;
        END",
    // A media is present when every one of its files is.
    "CREATE TRIGGER file_presence_changed AFTER UPDATE OF is_present ON File
        WHEN new.media_id IS NOT NULL
        BEGIN
            UPDATE Media SET is_present = (
                SELECT MIN(is_present) FROM File WHERE media_id = new.media_id
            ) WHERE id_media = new.media_id;
        END",
    // ---- cascading deletes ----
    "CREATE TRIGGER delete_media_when_empty AFTER DELETE ON File
        WHEN old.media_id IS NOT NULL
        BEGIN
            DELETE FROM Media WHERE id_media = old.media_id
                AND NOT EXISTS (SELECT 1 FROM File WHERE media_id = old.media_id);
        END",
    // ---- aggregate maintenance ----
    "CREATE TRIGGER album_counters_on_track_added AFTER INSERT ON AlbumTrack
        BEGIN
            UPDATE Album SET
                nb_tracks = (SELECT COUNT(*) FROM AlbumTrack
                    WHERE album_id = new.album_id),
                duration = (SELECT IFNULL(SUM(MAX(m.duration, 0)), 0)
                    FROM AlbumTrack t
                    INNER JOIN Media m ON m.id_media = t.media_id
                    WHERE t.album_id = new.album_id)
            WHERE id_album = new.album_id;
        END",
    "CREATE TRIGGER album_counters_on_track_deleted AFTER DELETE ON AlbumTrack
        BEGIN
            UPDATE Album SET
                nb_tracks = (SELECT COUNT(*) FROM AlbumTrack
                    WHERE album_id = old.album_id),
                duration = (SELECT IFNULL(SUM(MAX(m.duration, 0)), 0)
                    FROM AlbumTrack t
                    INNER JOIN Media m ON m.id_media = t.media_id
                    WHERE t.album_id = old.album_id)
            WHERE id_album = old.album_id;
        END",
    "CREATE TRIGGER artist_counters_on_track_added AFTER INSERT ON AlbumTrack
        WHEN new.artist_id IS NOT NULL
        BEGIN
            UPDATE Artist SET nb_tracks = (SELECT COUNT(*) FROM AlbumTrack
                WHERE artist_id = new.artist_id)
            WHERE id_artist = new.artist_id;
        END",
    "CREATE TRIGGER artist_counters_on_track_deleted AFTER DELETE ON AlbumTrack
        WHEN old.artist_id IS NOT NULL
        BEGIN
            UPDATE Artist SET nb_tracks = (SELECT COUNT(*) FROM AlbumTrack
                WHERE artist_id = old.artist_id)
            WHERE id_artist = old.artist_id;
        END",
    "CREATE TRIGGER artist_counters_on_album_added AFTER INSERT ON Album
        WHEN new.album_artist_id IS NOT NULL
        BEGIN
            UPDATE Artist SET nb_albums = (SELECT COUNT(*) FROM Album
                WHERE album_artist_id = new.album_artist_id)
            WHERE id_artist = new.album_artist_id;
        END",
    "CREATE TRIGGER artist_counters_on_album_deleted AFTER DELETE ON Album
        WHEN old.album_artist_id IS NOT NULL
        BEGIN
            UPDATE Artist SET nb_albums = (SELECT COUNT(*) FROM Album
                WHERE album_artist_id = old.album_artist_id)
            WHERE id_artist = old.album_artist_id;
        END",
    "CREATE TRIGGER artist_counters_on_album_artist_changed
        AFTER UPDATE OF album_artist_id ON Album
        BEGIN
            UPDATE Artist SET nb_albums = (SELECT COUNT(*) FROM Album
                WHERE album_artist_id = id_artist)
            WHERE id_artist IN (old.album_artist_id, new.album_artist_id);
        END",
    // ---- seeded rows ----
    "INSERT INTO Artist(id_artist, name, nb_albums, nb_tracks, is_present)
        VALUES(1, 'Unknown Artist', 0, 0, 1)",
    "INSERT INTO Artist(id_artist, name, nb_albums, nb_tracks, is_present)
        VALUES(2, 'Various Artists', 0, 0, 1)",
];

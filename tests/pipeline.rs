//! End-to-end scenarios: a real temp directory walked by the real
//! discovery thread, parsed by the real pipeline, with only the decoder
//! mocked out.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{audio_result, wait_until, MockProber, Recorder, SwitchableLister};
use medialib::album::Album;
use medialib::album_track::AlbumTrack;
use medialib::artist::Artist;
use medialib::file::PARSER_STEP_FATAL;
use medialib::genre::Genre;
use medialib::media::{Media, MediaType};
use medialib::mrl;
use medialib::probe::MetaKey;
use medialib::vfs::DeviceDescription;
use medialib::{Config, MediaLibrary, SortingCriteria};

struct Fixture {
    library: MediaLibrary,
    recorder: Arc<Recorder>,
    prober: Arc<MockProber>,
    root: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path().join("music");
    fs::create_dir_all(&root).unwrap();

    let mut config = Config::new(dir.path().join("medialib.db"), dir.path().join("thumbs"));
    config.probe_timeout = Duration::from_millis(300);

    let prober = Arc::new(MockProber::new());
    let lister = Arc::new(SwitchableLister::new(vec![DeviceDescription {
        uuid: "fixture-device".to_string(),
        mountpoint: mrl::from_path(dir.path()),
        is_removable: false,
    }]));

    let library = MediaLibrary::builder(config)
        .with_prober(prober.clone())
        .with_device_lister(lister)
        .build()
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    library.set_callbacks(recorder.clone());

    Fixture {
        library,
        recorder,
        prober,
        root,
        _dir: dir,
    }
}

impl Fixture {
    fn discover_and_drain(&self, expected_discoveries: usize) {
        self.library.add_entry_point(&mrl::from_path(&self.root));
        self.drain(expected_discoveries);
    }

    fn drain(&self, expected_discoveries: usize) {
        wait_until("discovery to complete", || {
            self.recorder.discoveries() >= expected_discoveries
        });
        wait_until("pipeline to drain", || self.library.is_idle());
    }

    fn touch(&self, name: &str) {
        fs::write(self.root.join(name), name.as_bytes()).unwrap();
    }

    fn file_step(&self, name: &str) -> i64 {
        let store = self.library.store();
        let conn = store.reader().unwrap();
        conn.query_row(
            "SELECT parser_step FROM File WHERE name = ?",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }
}

#[test]
fn single_mp3_ingest() {
    let fixture = fixture();
    fixture.prober.insert(
        "track.mp3",
        audio_result(&[
            (MetaKey::Title, "Zebra"),
            (MetaKey::Artist, "Ratatat"),
            (MetaKey::Album, "Classics"),
            (MetaKey::TrackNumber, "3"),
            (MetaKey::Genre, "Electronic"),
        ]),
    );
    fixture.touch("track.mp3");
    fixture.discover_and_drain(1);

    let store = fixture.library.store();

    let media = Media::list_all(store, MediaType::Audio, SortingCriteria::Alpha, false).unwrap();
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].title.as_deref(), Some("Zebra"));
    assert_eq!(media[0].duration, 183_000);

    let albums = Album::list_all(store, SortingCriteria::Default, false).unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].title, "Classics");
    assert_eq!(albums[0].nb_tracks, 1);
    assert_eq!(albums[0].duration, 183_000);

    let artist = Artist::by_name(store, "Ratatat").unwrap().unwrap();
    assert_eq!(albums[0].album_artist_id, Some(artist.id));

    assert!(Genre::by_name(store, "Electronic").unwrap().is_some());

    let track = AlbumTrack::by_media(store, media[0].id).unwrap().unwrap();
    assert_eq!(track.track_number, 3);

    assert_eq!(
        fixture.recorder.added_titles.lock().unwrap().as_slice(),
        ["Zebra"]
    );
}

#[test]
fn same_album_with_two_artists_becomes_various() {
    let fixture = fixture();
    fixture.prober.insert(
        "one.mp3",
        audio_result(&[
            (MetaKey::Title, "One"),
            (MetaKey::Artist, "First Artist"),
            (MetaKey::Album, "Mix"),
        ]),
    );
    fixture.prober.insert(
        "two.mp3",
        audio_result(&[
            (MetaKey::Title, "Two"),
            (MetaKey::Artist, "Second Artist"),
            (MetaKey::Album, "Mix"),
        ]),
    );
    fixture.touch("one.mp3");
    fixture.touch("two.mp3");
    fixture.discover_and_drain(1);

    let store = fixture.library.store();

    let albums = Album::list_all(store, SortingCriteria::Default, false).unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].nb_tracks, 2);
    assert_eq!(albums[0].album_artist_id, Some(Artist::VARIOUS_ID));
}

#[test]
fn rescan_without_changes_emits_no_tasks() {
    let fixture = fixture();
    fixture.touch("a.mp3");
    fixture.touch("b.mp3");
    fixture.discover_and_drain(1);

    let stats_before = fixture.library.parsing_stats();
    assert_eq!(stats_before, (2, 2));

    fixture.library.reload();
    fixture.drain(2);

    assert_eq!(fixture.library.parsing_stats(), stats_before);

    // Aggregate invariants still hold after the no-op pass.
    let store = fixture.library.store();
    for album in Album::list_all(store, SortingCriteria::Default, false).unwrap() {
        let tracks = AlbumTrack::by_album(store, album.id).unwrap();
        assert_eq!(album.nb_tracks as usize, tracks.len());
    }
    for media in Media::list_all(store, MediaType::Audio, SortingCriteria::Alpha, false).unwrap() {
        assert!(media.is_present);
    }
}

#[test]
fn modified_file_is_reparsed_to_the_same_catalogue() {
    let fixture = fixture();
    fixture.prober.insert(
        "track.mp3",
        audio_result(&[
            (MetaKey::Title, "Zebra"),
            (MetaKey::Artist, "Ratatat"),
            (MetaKey::Album, "Classics"),
            (MetaKey::TrackNumber, "3"),
        ]),
    );
    fixture.touch("track.mp3");
    fixture.discover_and_drain(1);

    let store = fixture.library.store();
    let before: Vec<i64> =
        Media::list_all(store, MediaType::Audio, SortingCriteria::Alpha, false)
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();

    // Same tags, new modification date: the file re-enters the pipeline
    // and the persister's upserts must land on the same rows.
    std::thread::sleep(Duration::from_millis(1100));
    fs::write(fixture.root.join("track.mp3"), b"track.mp3 v2").unwrap();

    fixture.library.reload();
    fixture.drain(2);

    assert_eq!(fixture.library.parsing_stats(), (2, 2));

    let after: Vec<i64> = Media::list_all(store, MediaType::Audio, SortingCriteria::Alpha, false)
        .unwrap()
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(before, after);

    let albums = Album::list_all(store, SortingCriteria::Default, false).unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].nb_tracks, 1);
}

#[test]
fn probe_timeout_fails_the_file_and_spares_the_rest() {
    let fixture = fixture();
    fixture.prober.make_silent("stuck.mp3");
    fixture.prober.insert(
        "fine.mp3",
        audio_result(&[(MetaKey::Title, "Fine")]),
    );
    fixture.touch("stuck.mp3");
    fixture.touch("fine.mp3");
    fixture.discover_and_drain(1);

    assert_eq!(fixture.file_step("stuck.mp3"), PARSER_STEP_FATAL);

    let store = fixture.library.store();
    let media = Media::list_all(store, MediaType::Audio, SortingCriteria::Alpha, false).unwrap();
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].title.as_deref(), Some("Fine"));

    let added = fixture.recorder.added_titles.lock().unwrap();
    assert_eq!(added.as_slice(), ["Fine"]);
}

#[test]
fn removing_an_entry_point_deletes_its_media() {
    let fixture = fixture();
    fixture.touch("a.mp3");
    fixture.discover_and_drain(1);

    let entry_point = mrl::from_path(&fixture.root);
    fixture.library.remove_entry_point(&entry_point).unwrap();

    let store = fixture.library.store();
    let media = Media::list_all(store, MediaType::Audio, SortingCriteria::Alpha, false).unwrap();
    assert!(media.is_empty());

    wait_until("deletion callback", || {
        !fixture.recorder.deleted_ids.lock().unwrap().is_empty()
    });
}

//! Removable-device scenarios: unmount flips presence without deleting
//! anything; a remount under a different mountpoint restores the exact
//! same catalogue without re-parsing.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{wait_until, MockProber, Recorder, SwitchableLister};
use medialib::media::{Media, MediaType};
use medialib::mrl;
use medialib::vfs::DeviceDescription;
use medialib::{Config, MediaLibrary, SortingCriteria};

const UUID: &str = "usb-device";

#[test]
fn unmount_and_remount_preserve_the_catalogue() {
    let dir = tempfile::TempDir::new().unwrap();
    let mount_a = dir.path().join("mnt_a");
    let music_rel = "music";
    fs::create_dir_all(mount_a.join(music_rel)).unwrap();

    for index in 0..10 {
        fs::write(
            mount_a.join(music_rel).join(format!("track{:02}.mp3", index)),
            b"data",
        )
        .unwrap();
    }

    let mut config = Config::new(dir.path().join("medialib.db"), dir.path().join("thumbs"));
    config.probe_timeout = Duration::from_millis(300);

    let lister = Arc::new(SwitchableLister::new(vec![DeviceDescription {
        uuid: UUID.to_string(),
        mountpoint: mrl::from_path(&mount_a),
        is_removable: true,
    }]));

    let library = MediaLibrary::builder(config)
        .with_prober(Arc::new(MockProber::new()))
        .with_device_lister(lister.clone())
        .build()
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    library.set_callbacks(recorder.clone());

    library.add_entry_point(&mrl::from_path(&mount_a.join(music_rel)));
    wait_until("initial discovery", || recorder.discoveries() >= 1);
    wait_until("pipeline drain", || library.is_idle());

    let store = library.store();
    let present = |expected: usize| {
        let media =
            Media::list_all(store, MediaType::Audio, SortingCriteria::Alpha, false).unwrap();
        assert_eq!(media.len(), expected);
        media.iter().map(|m| m.id).collect::<Vec<i64>>()
    };

    let ids_before = present(10);
    let stats_before = library.parsing_stats();
    assert_eq!(stats_before, (10, 10));

    // Unmount: rows stay, presence flips, the lister loses the device.
    lister.set(Vec::new());
    library.on_device_unmounted(UUID).unwrap();

    assert!(present(0).is_empty());
    let conn = store.reader().unwrap();
    let absent: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM Media WHERE is_present = 0",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(absent, 10);
    drop(conn);

    // Remount under a different path with identical content.
    let mount_b = dir.path().join("mnt_b");
    fs::rename(&mount_a, &mount_b).unwrap();
    lister.set(vec![DeviceDescription {
        uuid: UUID.to_string(),
        mountpoint: mrl::from_path(&mount_b),
        is_removable: true,
    }]);
    library
        .on_device_mounted(UUID, &mrl::from_path(&mount_b))
        .unwrap();

    wait_until("re-discovery", || recorder.discoveries() >= 2);
    wait_until("pipeline drain", || library.is_idle());

    let ids_after = present(10);
    assert_eq!(ids_before, ids_after);

    // Nothing was re-parsed: unchanged modification dates short-circuit
    // reconciliation.
    assert_eq!(library.parsing_stats(), stats_before);

    // Stored MRLs now point at the new mountpoint.
    let conn = store.reader().unwrap();
    let stale: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM File WHERE mrl LIKE ?",
            [format!("{}%", mrl::from_path(&mount_a))],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stale, 0);
}

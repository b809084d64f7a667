//! Shared fixtures for the end-to-end tests: a canned-response prober, a
//! switchable device lister and a callback recorder. The pipeline and
//! discovery threads are the real ones.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use medialib::media::{AudioTrack, Media, VideoTrack};
use medialib::mrl;
use medialib::probe::{MediaProber, MetaKey, ProbeResult, ProbeWaiter};
use medialib::vfs::{DeviceDescription, DeviceLister};
use medialib::MediaLibraryCb;

/// Prober answering from a canned map keyed by file name. Unknown files
/// get a plain audio track titled after the file; names registered as
/// silent never complete, which is how the timeout path is exercised.
pub struct MockProber {
    results: Mutex<HashMap<String, ProbeResult>>,
    silent: Mutex<HashSet<String>>,
}

impl MockProber {
    pub fn new() -> MockProber {
        MockProber {
            results: Mutex::new(HashMap::new()),
            silent: Mutex::new(HashSet::new()),
        }
    }

    pub fn insert(&self, file_name: &str, result: ProbeResult) {
        self.results
            .lock()
            .unwrap()
            .insert(file_name.to_string(), result);
    }

    pub fn make_silent(&self, file_name: &str) {
        self.silent.lock().unwrap().insert(file_name.to_string());
    }
}

impl MediaProber for MockProber {
    fn start_probe(&self, target: &str, waiter: Arc<ProbeWaiter>) {
        let name = mrl::file_name(target).to_string();

        if self.silent.lock().unwrap().contains(&name) {
            return;
        }

        let canned = self.results.lock().unwrap().get(&name).cloned();
        match canned {
            Some(result) => waiter.complete(Ok(result)),
            None => {
                let mut result = audio_result(&[]);
                result
                    .meta
                    .insert(MetaKey::Title, mrl::file_stem(target).to_string());
                waiter.complete(Ok(result));
            }
        }
    }
}

/// One audio track plus the given meta tags.
pub fn audio_result(tags: &[(MetaKey, &str)]) -> ProbeResult {
    let mut result = ProbeResult {
        audio_tracks: vec![AudioTrack {
            id: 0,
            media_id: 0,
            codec: Some("mp4a".to_string()),
            bitrate: 320_000,
            samplerate: 44_100,
            nb_channels: 2,
            language: None,
            description: None,
        }],
        video_tracks: Vec::new(),
        meta: HashMap::new(),
        duration: 183_000,
    };
    for (key, value) in tags {
        result.meta.insert(*key, value.to_string());
    }
    result
}

/// One video track plus the given meta tags.
pub fn video_result(tags: &[(MetaKey, &str)]) -> ProbeResult {
    let mut result = ProbeResult {
        audio_tracks: Vec::new(),
        video_tracks: vec![VideoTrack {
            id: 0,
            media_id: 0,
            codec: Some("h264".to_string()),
            fps: 24.0,
            width: 1920,
            height: 1080,
            sar_num: None,
            sar_den: None,
        }],
        meta: HashMap::new(),
        duration: 5_400_000,
    };
    for (key, value) in tags {
        result.meta.insert(*key, value.to_string());
    }
    result
}

/// Lister whose device set can be swapped mid-test to play mount and
/// unmount scenarios.
pub struct SwitchableLister {
    devices: Mutex<Vec<DeviceDescription>>,
}

impl SwitchableLister {
    pub fn new(devices: Vec<DeviceDescription>) -> SwitchableLister {
        SwitchableLister {
            devices: Mutex::new(devices),
        }
    }

    pub fn set(&self, devices: Vec<DeviceDescription>) {
        *self.devices.lock().unwrap() = devices;
    }
}

impl DeviceLister for SwitchableLister {
    fn devices(&self) -> Vec<DeviceDescription> {
        self.devices.lock().unwrap().clone()
    }
}

/// Records every callback for later assertions.
#[derive(Default)]
pub struct Recorder {
    pub added_titles: Mutex<Vec<String>>,
    pub deleted_ids: Mutex<Vec<i64>>,
    pub discoveries_completed: AtomicUsize,
}

impl MediaLibraryCb for Recorder {
    fn on_media_added(&self, media: Arc<Media>) {
        if let Some(title) = &media.title {
            self.added_titles.lock().unwrap().push(title.clone());
        }
    }

    fn on_media_deleted(&self, media_id: i64) {
        self.deleted_ids.lock().unwrap().push(media_id);
    }

    fn on_discovery_completed(&self, _entry_point: &str) {
        self.discoveries_completed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Recorder {
    pub fn discoveries(&self) -> usize {
        self.discoveries_completed.load(Ordering::SeqCst)
    }
}

pub fn wait_until<F: Fn() -> bool>(what: &str, predicate: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !predicate() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(20));
    }
}

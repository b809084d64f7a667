//! Media probe stage. The external decoding library sits behind the
//! `MediaProber` trait: the stage starts an asynchronous probe and waits
//! on a condition variable for its completion callback, bounded by the
//! configured timeout.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::media::{AudioTrack, VideoTrack};
use crate::parser::{MetadataService, Status, Task};

/// Meta tags reported by the decoder.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MetaKey {
    Title,
    Artist,
    AlbumArtist,
    Album,
    Genre,
    Date,
    ShowName,
    TrackNumber,
    Episode,
    DiscNumber,
    DiscTotal,
    ArtworkUrl,
}

#[derive(Debug, Default, Clone)]
pub struct ProbeResult {
    pub audio_tracks: Vec<AudioTrack>,
    pub video_tracks: Vec<VideoTrack>,
    pub meta: HashMap<MetaKey, String>,
    /// Milliseconds; -1 when the decoder couldn't tell.
    pub duration: i64,
}

/// One waiter (the stage worker), one waker (the decoder callback). The
/// predicate is checked under the mutex, so a spurious wakeup or a
/// completion delivered before the wait starts are both harmless.
pub struct ProbeWaiter {
    slot: Mutex<Option<Result<ProbeResult, String>>>,
    cond: Condvar,
}

impl ProbeWaiter {
    pub fn new() -> ProbeWaiter {
        ProbeWaiter {
            slot: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// Called by the prober when the probe finishes, successfully or not.
    pub fn complete(&self, result: Result<ProbeResult, String>) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some(result);
        self.cond.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Option<Result<ProbeResult, String>> {
        let slot = self.slot.lock().unwrap();
        let (mut slot, _) = self
            .cond
            .wait_timeout_while(slot, timeout, |slot| slot.is_none())
            .unwrap();
        slot.take()
    }
}

impl Default for ProbeWaiter {
    fn default() -> ProbeWaiter {
        ProbeWaiter::new()
    }
}

/// Interface to the external media decoder. Implementations must call
/// `waiter.complete` exactly once per started probe, from any thread.
pub trait MediaProber: Send + Sync {
    fn start_probe(&self, mrl: &str, waiter: Arc<ProbeWaiter>);
}

pub struct ProbeService {
    prober: Arc<dyn MediaProber>,
    timeout: Duration,
    emit_sar: bool,
}

impl ProbeService {
    pub fn new(prober: Arc<dyn MediaProber>, timeout: Duration, emit_sar: bool) -> ProbeService {
        ProbeService {
            prober,
            timeout,
            emit_sar,
        }
    }

    fn store_meta(task: &mut Task, mut result: ProbeResult, emit_sar: bool) {
        let mut meta = result.meta;

        task.item.title = meta.remove(&MetaKey::Title);
        task.item.artist = meta.remove(&MetaKey::Artist);
        task.item.album_artist = meta.remove(&MetaKey::AlbumArtist);
        task.item.album_name = meta.remove(&MetaKey::Album);
        task.item.genre = meta.remove(&MetaKey::Genre);
        task.item.release_date = meta.remove(&MetaKey::Date);
        task.item.show_name = meta.remove(&MetaKey::ShowName);
        task.item.artwork_mrl = meta.remove(&MetaKey::ArtworkUrl);

        task.item.track_number = to_int(meta.remove(&MetaKey::TrackNumber), "track number");
        task.item.episode = to_int(meta.remove(&MetaKey::Episode), "episode number");
        task.item.disc_number = to_int(meta.remove(&MetaKey::DiscNumber), "disc number");
        task.item.disc_total = to_int(meta.remove(&MetaKey::DiscTotal), "disc total");

        task.item.duration = result.duration;

        if !emit_sar {
            // Persisted SAR feeds transcoder decisions downstream; stay
            // silent unless the embedder opted in.
            for track in &mut result.video_tracks {
                track.sar_num = None;
                track.sar_den = None;
            }
        }

        task.item.audio_tracks = result.audio_tracks;
        task.item.video_tracks = result.video_tracks;
    }
}

/// Lenient integer parsing for decoder-provided tags; anything invalid
/// maps to 0 with a warning.
fn to_int(value: Option<String>, name: &str) -> i64 {
    match value {
        Some(text) if !text.is_empty() => match text.trim().parse() {
            Ok(number) => number,
            Err(_) => {
                warn!("invalid {} provided ({})", name, text);
                0
            }
        },
        _ => 0,
    }
}

impl MetadataService for ProbeService {
    fn name(&self) -> &'static str {
        "MediaProbe"
    }

    fn run(&self, task: &mut Task) -> Status {
        info!("probing '{}'", task.mrl);
        let chrono = Instant::now();

        let waiter = Arc::new(ProbeWaiter::new());
        self.prober.start_probe(&task.mrl, waiter.clone());

        let result = match waiter.wait(self.timeout) {
            Some(result) => result,
            None => {
                error!("probe of '{}' timed out", task.mrl);
                return Status::Fatal;
            }
        };

        let result = match result {
            Ok(result) => result,
            Err(reason) => {
                error!("probe of '{}' failed: {}", task.mrl, reason);
                return Status::Fatal;
            }
        };

        if result.audio_tracks.is_empty() && result.video_tracks.is_empty() {
            error!("failed to fetch any tracks from '{}'", task.mrl);
            return Status::Fatal;
        }

        Self::store_meta(task, result, self.emit_sar);

        debug!("probe done in {}ms", chrono.elapsed().as_millis());
        Status::Success
    }
}

#[macro_use]
extern crate log;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Arg;

use medialib::logger;
use medialib::media::AudioTrack;
use medialib::mrl;
use medialib::probe::{MediaProber, MetaKey, ProbeResult, ProbeWaiter};
use medialib::{Config, MediaLibrary, MediaLibraryCb, SortingCriteria};

/// Development prober: no decoder is linked into this binary, so it
/// fabricates a single audio track and derives the title from the file
/// name. Embedding applications plug a real decoder in instead.
struct FilenameProber;

impl MediaProber for FilenameProber {
    fn start_probe(&self, target: &str, waiter: Arc<ProbeWaiter>) {
        let mut result = ProbeResult::default();
        result.duration = 0;
        result.audio_tracks.push(AudioTrack {
            id: 0,
            media_id: 0,
            codec: None,
            bitrate: 0,
            samplerate: 0,
            nb_channels: 0,
            language: None,
            description: None,
        });
        result
            .meta
            .insert(MetaKey::Title, mrl::file_stem(target).to_string());

        waiter.complete(Ok(result));
    }
}

struct ConsoleCb {
    discoveries_completed: AtomicUsize,
}

impl MediaLibraryCb for ConsoleCb {
    fn on_media_added(&self, media: Arc<medialib::media::Media>) {
        info!("media added: {:?}", media.title);
    }

    fn on_discovery_started(&self, entry_point: &str) {
        info!("discovery started: {}", entry_point);
    }

    fn on_discovery_completed(&self, entry_point: &str) {
        info!("discovery completed: {}", entry_point);
        self.discoveries_completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_parsing_stats_updated(&self, done: u32, scheduled: u32) {
        info!("parsing {}/{}", done, scheduled);
    }
}

fn main() {
    let matches = clap::Command::new("medialibd")
        .version(medialib::MEDIALIB_VERSION)
        .arg(
            Arg::new("database")
                .long("database")
                .help("Catalogue database file")
                .default_value("~/.medialib/medialib.db"),
        )
        .arg(
            Arg::new("thumbnails")
                .long("thumbnails")
                .help("Thumbnail output directory")
                .default_value("~/.medialib/thumbnails"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("Log level")
                .default_value("info")
                .value_parser(["error", "warn", "info", "debug", "trace"]),
        )
        .arg(
            Arg::new("entry-point")
                .help("One or more directories to index")
                .num_args(1..)
                .required(true),
        )
        .get_matches();

    logger::init(matches.get_one::<String>("log-level").unwrap());

    let db_path = shellexpand::tilde(matches.get_one::<String>("database").unwrap()).into_owned();
    let thumbnail_path =
        shellexpand::tilde(matches.get_one::<String>("thumbnails").unwrap()).into_owned();

    let config = Config::new(&db_path, &thumbnail_path);

    let library = MediaLibrary::builder(config)
        .with_prober(Arc::new(FilenameProber))
        .build()
        .expect("can't initialize the media library");

    let callbacks = Arc::new(ConsoleCb {
        discoveries_completed: AtomicUsize::new(0),
    });
    library.set_callbacks(callbacks.clone());

    let entry_points: Vec<String> = matches
        .get_many::<String>("entry-point")
        .unwrap()
        .map(|p| mrl::from_path(Path::new(&shellexpand::tilde(p).into_owned())))
        .collect();

    for entry_point in &entry_points {
        library.add_entry_point(entry_point);
    }

    while callbacks.discoveries_completed.load(Ordering::SeqCst) < entry_points.len() {
        std::thread::sleep(Duration::from_millis(100));
    }
    while !library.is_idle() {
        std::thread::sleep(Duration::from_millis(100));
    }

    let audio = library
        .audio_files(SortingCriteria::Alpha, false)
        .expect("can't list audio");
    let albums = library
        .albums(SortingCriteria::Default, false)
        .expect("can't list albums");
    let artists = library
        .artists(SortingCriteria::Default, false)
        .expect("can't list artists");

    let (done, scheduled) = library.parsing_stats();
    info!(
        "catalogue: {} audio media, {} albums, {} artists ({}/{} files parsed)",
        audio.len(),
        albums.len(),
        artists.len(),
        done,
        scheduled
    );
}

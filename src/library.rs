//! Media library facade. Owns the store, the filesystem factory, the
//! parser pipeline, the discovery thread and the notifier; everything
//! the embedding application touches goes through here.

use std::fs;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};

use crate::album::Album;
use crate::artist::Artist;
use crate::config::Config;
use crate::device::Device;
use crate::discovery::{Discoverer, DiscoveryThread, FsDiscoverer};
use crate::error::{Error, Result};
use crate::folder::Folder;
use crate::genre::Genre;
use crate::media::{Media, MediaType};
use crate::parser::{MetadataService, Parser};
use crate::persister::MetadataPersister;
use crate::playlist::Playlist;
use crate::probe::{MediaProber, ProbeService};
use crate::show::Show;
use crate::store::{self, Store};
use crate::thumbnailer::{ThumbnailRenderer, Thumbnailer};
use crate::vfs::{DeviceLister, FsFactory};
use crate::vfs_local::{LocalFsFactory, SingleDeviceLister};
use crate::SortingCriteria;

/// Callbacks all fire on the single notifier thread and receive snapshot
/// values only. Do not call back into the facade from that thread.
pub trait MediaLibraryCb: Send + Sync {
    fn on_media_added(&self, _media: Arc<Media>) {}
    fn on_media_modified(&self, _media: Arc<Media>) {}
    fn on_media_deleted(&self, _media_id: i64) {}
    fn on_discovery_started(&self, _entry_point: &str) {}
    fn on_discovery_completed(&self, _entry_point: &str) {}
    fn on_parsing_stats_updated(&self, _done: u32, _scheduled: u32) {}
}

pub type CallbackSlot = Arc<RwLock<Option<Arc<dyn MediaLibraryCb>>>>;

enum Event {
    MediaAdded(Arc<Media>),
    MediaModified(Arc<Media>),
    MediaDeleted(i64),
    DiscoveryStarted(String),
    DiscoveryCompleted(String),
    ParsingStats(u32, u32),
}

/// Single dispatch thread behind a bounded queue; senders block when the
/// embedder's callbacks can't keep up.
pub struct Notifier {
    sender: Mutex<Option<Sender<Event>>>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    pub fn new(callbacks: CallbackSlot, queue_cap: usize) -> Notifier {
        let (sender, receiver) = bounded::<Event>(queue_cap);

        let join_handle = std::thread::spawn(move || {
            while let Ok(event) = receiver.recv() {
                let cb = callbacks.read().unwrap().clone();
                let cb = match cb {
                    Some(cb) => cb,
                    None => continue,
                };

                match event {
                    Event::MediaAdded(media) => cb.on_media_added(media),
                    Event::MediaModified(media) => cb.on_media_modified(media),
                    Event::MediaDeleted(id) => cb.on_media_deleted(id),
                    Event::DiscoveryStarted(entry) => cb.on_discovery_started(&entry),
                    Event::DiscoveryCompleted(entry) => cb.on_discovery_completed(&entry),
                    Event::ParsingStats(done, scheduled) => {
                        cb.on_parsing_stats_updated(done, scheduled)
                    }
                }
            }
        });

        Notifier {
            sender: Mutex::new(Some(sender)),
            join_handle: Mutex::new(Some(join_handle)),
        }
    }

    fn send(&self, event: Event) {
        let sender = self.sender.lock().unwrap();
        if let Some(sender) = &*sender {
            let _ = sender.send(event);
        }
    }

    pub fn media_added(&self, media: Arc<Media>) {
        self.send(Event::MediaAdded(media));
    }

    pub fn media_modified(&self, media: Arc<Media>) {
        self.send(Event::MediaModified(media));
    }

    pub fn media_deleted(&self, media_id: i64) {
        self.send(Event::MediaDeleted(media_id));
    }

    pub fn discovery_started(&self, entry_point: &str) {
        self.send(Event::DiscoveryStarted(entry_point.to_string()));
    }

    pub fn discovery_completed(&self, entry_point: &str) {
        self.send(Event::DiscoveryCompleted(entry_point.to_string()));
    }

    pub fn parsing_stats_updated(&self, done: u32, scheduled: u32) {
        self.send(Event::ParsingStats(done, scheduled));
    }

    pub fn stop(&self) {
        self.sender.lock().unwrap().take();
        if let Some(handle) = self.join_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

pub struct MediaLibraryBuilder {
    config: Config,
    prober: Option<Arc<dyn MediaProber>>,
    renderer: Option<Arc<dyn ThumbnailRenderer>>,
    lister: Option<Arc<dyn DeviceLister>>,
    factory: Option<Arc<dyn FsFactory>>,
    discoverer: Option<Arc<dyn Discoverer>>,
    extra_services: Vec<Arc<dyn MetadataService>>,
}

impl MediaLibraryBuilder {
    pub fn with_prober(mut self, prober: Arc<dyn MediaProber>) -> MediaLibraryBuilder {
        self.prober = Some(prober);
        self
    }

    pub fn with_thumbnail_renderer(
        mut self,
        renderer: Arc<dyn ThumbnailRenderer>,
    ) -> MediaLibraryBuilder {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_device_lister(mut self, lister: Arc<dyn DeviceLister>) -> MediaLibraryBuilder {
        self.lister = Some(lister);
        self
    }

    pub fn with_fs_factory(mut self, factory: Arc<dyn FsFactory>) -> MediaLibraryBuilder {
        self.factory = Some(factory);
        self
    }

    /// Replaces the built-in filesystem discoverer.
    pub fn with_discoverer(mut self, discoverer: Arc<dyn Discoverer>) -> MediaLibraryBuilder {
        self.discoverer = Some(discoverer);
        self
    }

    /// Appends a custom stage after the default chain.
    pub fn add_metadata_service(
        mut self,
        service: Arc<dyn MetadataService>,
    ) -> MediaLibraryBuilder {
        self.extra_services.push(service);
        self
    }

    pub fn build(self) -> Result<MediaLibrary> {
        MediaLibrary::initialize(self)
    }
}

pub struct MediaLibrary {
    config: Config,
    store: Arc<Store>,
    factory: Arc<dyn FsFactory>,
    lister: Arc<dyn DeviceLister>,
    parser: Arc<Parser>,
    discovery: DiscoveryThread,
    notifier: Arc<Notifier>,
    callbacks: CallbackSlot,
}

impl MediaLibrary {
    pub fn builder(config: Config) -> MediaLibraryBuilder {
        MediaLibraryBuilder {
            config,
            prober: None,
            renderer: None,
            lister: None,
            factory: None,
            discoverer: None,
            extra_services: Vec::new(),
        }
    }

    fn initialize(builder: MediaLibraryBuilder) -> Result<MediaLibrary> {
        let config = builder.config;

        info!("{}", crate::MEDIALIB_VERSION);

        let prober = builder.prober.ok_or_else(|| {
            Error::Invariant("a MediaProber is required to build the library".to_string())
        })?;

        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&config.thumbnail_path)?;

        let store = Arc::new(Store::open(&config)?);

        let callbacks: CallbackSlot = Arc::new(RwLock::new(None));
        let notifier = Arc::new(Notifier::new(callbacks.clone(), 256));

        let lister: Arc<dyn DeviceLister> = match builder.lister {
            Some(lister) => lister,
            None => Arc::new(SingleDeviceLister::new("/")),
        };
        let factory: Arc<dyn FsFactory> = match builder.factory {
            Some(factory) => factory,
            None => Arc::new(LocalFsFactory::new(lister.clone())),
        };

        let mut services: Vec<Arc<dyn MetadataService>> = vec![
            Arc::new(ProbeService::new(
                prober,
                config.probe_timeout,
                config.emit_sar,
            )),
            Arc::new(MetadataPersister::new(store.clone(), notifier.clone())),
            Arc::new(Thumbnailer::new(
                store.clone(),
                notifier.clone(),
                builder.renderer,
                config.thumbnail_path.clone(),
            )),
        ];
        services.extend(builder.extra_services);

        let parser = Arc::new(Parser::new(
            store.clone(),
            notifier.clone(),
            &config,
            services,
        ));

        let discoverer: Arc<dyn Discoverer> = match builder.discoverer {
            Some(discoverer) => discoverer,
            None => Arc::new(FsDiscoverer::new(
                store.clone(),
                factory.clone(),
                parser.clone(),
                notifier.clone(),
            )),
        };
        let discovery = DiscoveryThread::start(discoverer);

        let library = MediaLibrary {
            config,
            store,
            factory,
            lister,
            parser,
            discovery,
            notifier,
            callbacks,
        };

        library.refresh_devices()?;
        library.parser.start();
        library.parser.restore()?;

        Ok(library)
    }

    pub fn set_callbacks(&self, cb: Arc<dyn MediaLibraryCb>) {
        *self.callbacks.write().unwrap() = Some(cb);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Reconciles catalogue device rows with the lister's snapshot.
    pub fn refresh_devices(&self) -> Result<()> {
        self.factory.refresh_devices();

        let listed = self.lister.devices();

        for description in &listed {
            let mountpoint = if description.mountpoint.ends_with('/') {
                description.mountpoint.clone()
            } else {
                format!("{}/", description.mountpoint)
            };

            match Device::by_uuid(&self.store, &description.uuid)? {
                Some(device) => {
                    if device.mountpoint != mountpoint {
                        Device::set_mountpoint(&self.store, device.id, &mountpoint)?;
                    }
                    if !device.is_present {
                        Device::set_present(&self.store, device.id, true)?;
                    }
                }
                None => {
                    Device::create(
                        &self.store,
                        &description.uuid,
                        &mountpoint,
                        description.is_removable,
                    )?;
                }
            }
        }

        for device in Device::list_all(&self.store)? {
            let still_listed = listed.iter().any(|d| {
                d.uuid.eq_ignore_ascii_case(&device.uuid)
            });
            if !still_listed && device.is_removable && device.is_present {
                Device::set_present(&self.store, device.id, false)?;
            }
        }

        Ok(())
    }

    pub fn add_entry_point(&self, entry_point: &str) {
        info!("adding entry point '{}'", entry_point);
        self.discovery.queue_discover(entry_point);
    }

    pub fn remove_entry_point(&self, entry_point: &str) -> Result<()> {
        info!("removing entry point '{}'", entry_point);

        let folder = match self.resolve_folder(entry_point, false)? {
            Some(folder) => folder,
            None => return Ok(()),
        };

        // Media ids under the subtree, to report deletions after the
        // cascade ran.
        let media_ids: Vec<i64> = {
            let conn = self.store.reader()?;
            store::fetch_all(
                &conn,
                "WITH RECURSIVE subtree(id) AS (
                    SELECT ?
                    UNION ALL
                    SELECT f.id_folder FROM Folder f
                    INNER JOIN subtree ON f.parent_id = subtree.id
                )
                SELECT DISTINCT media_id FROM File
                WHERE folder_id IN (SELECT id FROM subtree)
                AND media_id IS NOT NULL",
                &[&folder.id],
                |row| row.get(0),
            )?
        };

        Folder::delete(&self.store, folder.id)?;

        for media_id in media_ids {
            if Media::fetch(&self.store, media_id)?.is_none() {
                self.notifier.media_deleted(media_id);
            }
        }

        Ok(())
    }

    pub fn ban_folder(&self, folder_mrl: &str) -> Result<()> {
        info!("banning folder '{}'", folder_mrl);

        let folder = match self.resolve_folder(folder_mrl, true)? {
            Some(folder) => folder,
            None => return Ok(()),
        };
        Folder::set_blacklisted(&self.store, folder.id, true)
    }

    pub fn unban_folder(&self, folder_mrl: &str) -> Result<()> {
        info!("unbanning folder '{}'", folder_mrl);

        let folder = match self.resolve_folder(folder_mrl, false)? {
            Some(folder) => folder,
            None => return Ok(()),
        };
        Folder::set_blacklisted(&self.store, folder.id, false)
    }

    fn resolve_folder(&self, folder_mrl: &str, create: bool) -> Result<Option<Arc<Folder>>> {
        let folder_mrl = folder_mrl.trim_end_matches('/');

        let device = match self.factory.create_device_from_mrl(folder_mrl) {
            Some(device) => device,
            None => return Ok(None),
        };
        let device_row = match Device::by_uuid(&self.store, device.uuid())? {
            Some(row) => row,
            None => return Ok(None),
        };

        let relative = folder_mrl
            .strip_prefix(device.mountpoint().trim_end_matches('/'))
            .unwrap_or(folder_mrl)
            .trim_matches('/')
            .to_string();

        match Folder::by_path(&self.store, device_row.id, &relative)? {
            Some(folder) => Ok(Some(folder)),
            None if create => Ok(Some(Folder::create(
                &self.store,
                &relative,
                None,
                device_row.id,
                false,
            )?)),
            None => Ok(None),
        }
    }

    /// Re-walks every entry point whose device is present.
    pub fn reload(&self) {
        self.discovery.queue_reload();
    }

    pub fn pause(&self) {
        self.parser.pause();
    }

    pub fn resume(&self) {
        self.parser.resume();
    }

    pub fn parsing_stats(&self) -> (u32, u32) {
        self.parser.stats()
    }

    pub fn is_idle(&self) -> bool {
        self.parser.is_idle()
    }

    /// Mount callback from the host. Known devices keep their folder
    /// rows (paths are device-relative); only the mountpoint and the
    /// presence cascade change. First-time devices get discovered.
    pub fn on_device_mounted(&self, uuid: &str, mountpoint: &str) -> Result<()> {
        info!("device {} mounted on '{}'", uuid, mountpoint);

        let mountpoint = if mountpoint.ends_with('/') {
            mountpoint.to_string()
        } else {
            format!("{}/", mountpoint)
        };

        self.factory.refresh_devices();

        match Device::by_uuid(&self.store, uuid)? {
            Some(device) => {
                if device.mountpoint != mountpoint {
                    Device::set_mountpoint(&self.store, device.id, &mountpoint)?;
                }
                Device::set_present(&self.store, device.id, true)?;
                self.reload();
            }
            None => {
                self.discovery
                    .queue_discover(mountpoint.trim_end_matches('/'));
            }
        }

        Ok(())
    }

    pub fn on_device_unmounted(&self, uuid: &str) -> Result<()> {
        info!("device {} unmounted", uuid);

        self.factory.refresh_devices();

        if let Some(device) = Device::by_uuid(&self.store, uuid)? {
            Device::set_present(&self.store, device.id, false)?;
        }
        Ok(())
    }

    // ---- entity listers ----

    pub fn audio_files(&self, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Media>>> {
        Media::list_all(&self.store, MediaType::Audio, sort, desc)
    }

    pub fn video_files(&self, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Media>>> {
        Media::list_all(&self.store, MediaType::Video, sort, desc)
    }

    pub fn albums(&self, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Album>>> {
        Album::list_all(&self.store, sort, desc)
    }

    pub fn artists(&self, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Artist>>> {
        Artist::list_all(&self.store, sort, desc)
    }

    pub fn genres(&self, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Genre>>> {
        Genre::list_all(&self.store, sort, desc)
    }

    pub fn playlists(&self, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Playlist>>> {
        Playlist::list_all(&self.store, sort, desc)
    }

    pub fn shows(&self, sort: SortingCriteria, desc: bool) -> Result<Vec<Arc<Show>>> {
        Show::list_all(&self.store, sort, desc)
    }

    pub fn search_media(&self, title: &str) -> Result<Vec<Arc<Media>>> {
        Media::search(&self.store, title)
    }

    pub fn search_albums(&self, title: &str) -> Result<Vec<Arc<Album>>> {
        Album::search(&self.store, title)
    }

    pub fn search_artists(&self, name: &str) -> Result<Vec<Arc<Artist>>> {
        Artist::search(&self.store, name)
    }

    pub fn search_genres(&self, name: &str) -> Result<Vec<Arc<Genre>>> {
        Genre::search(&self.store, name)
    }

    pub fn search_playlists(&self, name: &str) -> Result<Vec<Arc<Playlist>>> {
        Playlist::search(&self.store, name)
    }

    pub fn search_shows(&self, title: &str) -> Result<Vec<Arc<Show>>> {
        Show::search(&self.store, title)
    }

    pub fn create_playlist(&self, name: &str) -> Result<Arc<Playlist>> {
        Playlist::create(&self.store, name)
    }

    fn shutdown(&self) {
        debug!("shutting down");
        self.discovery.stop();
        self.parser.stop();
        self.notifier.stop();
    }
}

impl Drop for MediaLibrary {
    fn drop(&mut self) {
        self.shutdown();
    }
}

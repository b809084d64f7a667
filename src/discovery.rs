//! Discovery engine. One thread drains a job queue of entry points,
//! walks each directory tree through the filesystem abstraction and
//! reconciles what it sees against the catalogue, emitting parse tasks
//! for new and modified files. Absent devices only ever flip presence
//! flags; rows are never deleted for them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};

use crate::device::Device;
use crate::error::Result;
use crate::file::{File, FileType};
use crate::folder::Folder;
use crate::library::Notifier;
use crate::mrl;
use crate::parser::{Parser, Task};
use crate::store::Store;
use crate::vfs::{FsFactory, VfsDirectory};

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "aac", "ac3", "aiff", "ape", "flac", "m4a", "m4b", "mka", "mp2", "mp3", "oga", "ogg",
    "opus", "wav", "wma", "wv",
];

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "avi", "divx", "flv", "m2ts", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "mts", "ogm",
    "ts", "webm", "wmv",
];

pub const PLAYLIST_EXTENSIONS: &[&str] = &["m3u", "m3u8", "pls", "xspf"];

fn file_type_for_extension(extension: &str) -> Option<FileType> {
    if AUDIO_EXTENSIONS.iter().any(|&e| e == extension) {
        Some(FileType::Audio)
    } else if VIDEO_EXTENSIONS.iter().any(|&e| e == extension) {
        Some(FileType::Video)
    } else if PLAYLIST_EXTENSIONS.iter().any(|&e| e == extension) {
        Some(FileType::Playlist)
    } else {
        None
    }
}

#[derive(Debug, Default)]
struct DiscoveryStat {
    added: i32,
    refreshed: i32,
}

impl DiscoveryStat {
    fn add(&mut self, other: &DiscoveryStat) {
        self.added += other.added;
        self.refreshed += other.refreshed;
    }
}

pub trait Discoverer: Send + Sync {
    fn discover(&self, entry_point: &str) -> Result<()>;
    fn reload(&self) -> Result<()>;
}

/// Walks `file://`-style trees through an `FsFactory`.
pub struct FsDiscoverer {
    store: Arc<Store>,
    factory: Arc<dyn FsFactory>,
    parser: Arc<Parser>,
    notifier: Arc<Notifier>,
}

impl FsDiscoverer {
    pub fn new(
        store: Arc<Store>,
        factory: Arc<dyn FsFactory>,
        parser: Arc<Parser>,
        notifier: Arc<Notifier>,
    ) -> FsDiscoverer {
        FsDiscoverer {
            store,
            factory,
            parser,
            notifier,
        }
    }

    fn discover_root(&self, entry_point: &str) -> Result<()> {
        let entry_point = entry_point.trim_end_matches('/');

        let device = match self.factory.create_device_from_mrl(entry_point) {
            Some(device) => device,
            None => {
                warn!("no device for '{}', skipping", entry_point);
                return Ok(());
            }
        };

        let device_row = match Device::by_uuid(&self.store, device.uuid())? {
            Some(row) => row,
            None => Device::create(
                &self.store,
                device.uuid(),
                device.mountpoint(),
                device.is_removable(),
            )?,
        };

        let relative = Self::relative_path(entry_point, device.mountpoint());
        let folder = match Folder::by_path(&self.store, device_row.id, &relative)? {
            Some(folder) => folder,
            None => Folder::create(&self.store, &relative, None, device_row.id, true)?,
        };

        if folder.is_blacklisted {
            debug!("'{}' is blacklisted, skipping", entry_point);
            return Ok(());
        }

        let dir = match self.factory.create_directory(entry_point) {
            Some(dir) => dir,
            None => {
                // Device is up but the tree is gone; flip presence and
                // keep every row for its return.
                Folder::set_present(&self.store, folder.id, false)?;
                return Ok(());
            }
        };

        if !folder.is_present {
            Folder::set_present(&self.store, folder.id, true)?;
        }

        let start_instant = Instant::now();
        let mut stat = DiscoveryStat::default();
        self.walk(
            dir.as_ref(),
            folder.id,
            device_row.id,
            device.mountpoint(),
            &mut stat,
        )?;

        info!(
            "discovered '{}' in {}ms: {:?}",
            entry_point,
            start_instant.elapsed().as_millis(),
            stat
        );
        Ok(())
    }

    fn walk(
        &self,
        dir: &dyn VfsDirectory,
        folder_id: i64,
        device_id: i64,
        mountpoint: &str,
        stat: &mut DiscoveryStat,
    ) -> Result<()> {
        trace!("directory '{}'", dir.mrl());

        let disk_files = dir.files()?;
        let known_files = File::by_folder(&self.store, folder_id)?;

        for disk_file in &disk_files {
            let file_type = match disk_file.extension().and_then(|e| file_type_for_extension(&e))
            {
                Some(file_type) => file_type,
                None => continue,
            };

            let known = known_files.iter().find(|f| f.name == disk_file.name());
            match known {
                None => {
                    let file = File::create(
                        &self.store,
                        disk_file.full_path(),
                        disk_file.name(),
                        file_type,
                        folder_id,
                        disk_file.last_modification_date(),
                        disk_file.size(),
                    )?;
                    stat.added += 1;
                    self.parser
                        .push(Task::new(file.id, &file.mrl, file.file_type));
                }
                Some(existing)
                    if existing.last_modification_date
                        != disk_file.last_modification_date() =>
                {
                    File::reset_for_reparse(
                        &self.store,
                        existing.id,
                        disk_file.last_modification_date(),
                        disk_file.size(),
                    )?;
                    if existing.mrl != disk_file.full_path() {
                        File::set_mrl(&self.store, existing.id, disk_file.full_path())?;
                    }
                    stat.refreshed += 1;

                    let mut task = Task::new(existing.id, disk_file.full_path(), file_type);
                    task.media_id = existing.media_id;
                    self.parser.push(task);
                }
                Some(existing) => {
                    // Unchanged content; refresh bookkeeping only.
                    if existing.mrl != disk_file.full_path() {
                        File::set_mrl(&self.store, existing.id, disk_file.full_path())?;
                    }
                    if !existing.is_present {
                        File::set_present(&self.store, existing.id, true)?;
                    }
                }
            }
        }

        for known in &known_files {
            let on_disk = disk_files.iter().any(|f| f.name() == known.name);
            if !on_disk && known.is_present {
                debug!("file '{}' vanished", known.mrl);
                File::set_present(&self.store, known.id, false)?;
            }
        }

        let disk_dirs = dir.dirs()?;
        let known_children = Folder::children(&self.store, folder_id)?;

        for disk_dir in &disk_dirs {
            let relative = Self::relative_path(disk_dir.mrl(), mountpoint);
            let child = match Folder::by_path(&self.store, device_id, &relative)? {
                Some(child) => child,
                None => Folder::create(
                    &self.store,
                    &relative,
                    Some(folder_id),
                    device_id,
                    false,
                )?,
            };

            if child.is_blacklisted {
                debug!("'{}' is blacklisted, skipping", disk_dir.mrl());
                continue;
            }
            if !child.is_present {
                Folder::set_present(&self.store, child.id, true)?;
            }

            let mut child_stat = DiscoveryStat::default();
            if let Err(e) =
                self.walk(disk_dir.as_ref(), child.id, device_id, mountpoint, &mut child_stat)
            {
                error!("can't walk '{}': {}", disk_dir.mrl(), e);
            }
            stat.add(&child_stat);
        }

        for child in &known_children {
            let on_disk = disk_dirs
                .iter()
                .any(|d| Self::relative_path(d.mrl(), mountpoint) == child.path);
            if !on_disk && child.is_present {
                debug!("folder '{}' vanished", child.path);
                Folder::set_present(&self.store, child.id, false)?;
            }
        }

        Ok(())
    }

    fn relative_path(target: &str, mountpoint: &str) -> String {
        target
            .strip_prefix(mountpoint.trim_end_matches('/'))
            .unwrap_or(target)
            .trim_matches('/')
            .to_string()
    }
}

impl Discoverer for FsDiscoverer {
    fn discover(&self, entry_point: &str) -> Result<()> {
        if !self.factory.is_mrl_supported(entry_point) {
            warn!("unsupported MRL '{}'", entry_point);
            return Err(crate::vfs::FsError::NotSupported.into());
        }

        info!("discovering '{}'", entry_point);
        self.notifier.discovery_started(entry_point);
        let result = self.discover_root(entry_point);
        self.notifier.discovery_completed(entry_point);
        result
    }

    fn reload(&self) -> Result<()> {
        for folder in Folder::entry_points(&self.store)? {
            let device = match Device::fetch(&self.store, folder.device_id)? {
                Some(device) => device,
                None => continue,
            };
            if !device.is_present {
                debug!(
                    "device {} absent, not reloading '{}'",
                    device.uuid, folder.path
                );
                continue;
            }

            let entry_point = if folder.path.is_empty() {
                device.mountpoint.trim_end_matches('/').to_string()
            } else {
                mrl::join(&device.mountpoint, &folder.path)
            };

            if let Err(e) = self.discover(&entry_point) {
                error!("can't reload '{}': {}", entry_point, e);
            }
        }
        Ok(())
    }
}

enum DiscoveryJob {
    Discover(String),
    Reload,
}

/// Serialises every discovery request onto one worker thread, in the
/// order they were queued.
pub struct DiscoveryThread {
    sender: Sender<DiscoveryJob>,
    running: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryThread {
    pub fn start(discoverer: Arc<dyn Discoverer>) -> DiscoveryThread {
        let (sender, receiver) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let thread_running = running.clone();
        let join_handle = std::thread::spawn(move || loop {
            match receiver.recv_timeout(Duration::from_millis(200)) {
                Ok(DiscoveryJob::Discover(entry_point)) => {
                    if let Err(e) = discoverer.discover(&entry_point) {
                        error!("can't discover '{}': {}", entry_point, e);
                    }
                }
                Ok(DiscoveryJob::Reload) => {
                    if let Err(e) = discoverer.reload() {
                        error!("reload failed: {}", e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }

            if !thread_running.load(Ordering::SeqCst) {
                return;
            }
        });

        DiscoveryThread {
            sender,
            running,
            join_handle: Mutex::new(Some(join_handle)),
        }
    }

    pub fn queue_discover(&self, entry_point: &str) {
        let _ = self
            .sender
            .send(DiscoveryJob::Discover(entry_point.to_string()));
    }

    pub fn queue_reload(&self) {
        let _ = self.sender.send(DiscoveryJob::Reload);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

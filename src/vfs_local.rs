//! `file://` filesystem backed by `std::fs`, plus the fallback device
//! lister used when the host application does not provide one.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::mrl;
use crate::vfs::{
    DeviceDescription, DeviceLister, FsError, FsFactory, VfsDevice, VfsDirectory, VfsFile,
};

pub struct LocalFile {
    name: String,
    path: String,
    full_path: String,
    last_modification_date: i64,
    size: i64,
}

impl VfsFile for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn full_path(&self) -> &str {
        &self.full_path
    }

    fn extension(&self) -> Option<String> {
        mrl::extension(&self.full_path)
    }

    fn last_modification_date(&self) -> i64 {
        self.last_modification_date
    }

    fn size(&self) -> i64 {
        self.size
    }
}

pub struct LocalDevice {
    uuid: String,
    mountpoint: String,
    is_removable: bool,
}

impl VfsDevice for LocalDevice {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn mountpoint(&self) -> &str {
        &self.mountpoint
    }

    fn is_removable(&self) -> bool {
        self.is_removable
    }

    fn is_present(&self) -> bool {
        // Only currently listed devices make it into the cache.
        true
    }
}

pub struct LocalDirectory {
    mrl: String,
    fs_path: PathBuf,
    device: Option<Arc<dyn VfsDevice>>,
}

impl LocalDirectory {
    fn timestamp(time: std::io::Result<SystemTime>) -> i64 {
        time.ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

impl VfsDirectory for LocalDirectory {
    fn mrl(&self) -> &str {
        &self.mrl
    }

    fn files(&self) -> Result<Vec<Arc<dyn VfsFile>>, FsError> {
        let mut result: Vec<Arc<dyn VfsFile>> = Vec::new();

        for entry in fs::read_dir(&self.fs_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            result.push(Arc::new(LocalFile {
                full_path: mrl::join(&self.mrl, &name),
                path: self.mrl.clone(),
                name,
                last_modification_date: Self::timestamp(metadata.modified()),
                size: metadata.len() as i64,
            }));
        }

        result.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(result)
    }

    fn dirs(&self) -> Result<Vec<Arc<dyn VfsDirectory>>, FsError> {
        let mut result: Vec<Arc<dyn VfsDirectory>> = Vec::new();

        for entry in fs::read_dir(&self.fs_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            if !entry.metadata()?.is_dir() {
                continue;
            }

            result.push(Arc::new(LocalDirectory {
                mrl: mrl::join(&self.mrl, &name),
                fs_path: self.fs_path.join(&name),
                device: self.device.clone(),
            }));
        }

        result.sort_by(|a, b| a.mrl().cmp(b.mrl()));
        Ok(result)
    }

    fn device(&self) -> Option<Arc<dyn VfsDevice>> {
        self.device.clone()
    }
}

/// Factory for `file://` MRLs. Directory instances are cached by MRL
/// behind a mutex; the device cache is rebuilt from the lister on every
/// `refresh_devices`.
pub struct LocalFsFactory {
    lister: Arc<dyn DeviceLister>,
    dirs: Mutex<HashMap<String, Arc<LocalDirectory>>>,
    devices: Mutex<HashMap<String, Arc<LocalDevice>>>,
}

impl LocalFsFactory {
    pub fn new(lister: Arc<dyn DeviceLister>) -> LocalFsFactory {
        let factory = LocalFsFactory {
            lister,
            dirs: Mutex::new(HashMap::new()),
            devices: Mutex::new(HashMap::new()),
        };
        factory.refresh_devices();
        factory
    }
}

impl FsFactory for LocalFsFactory {
    fn is_mrl_supported(&self, mrl: &str) -> bool {
        mrl.starts_with(mrl::FILE_SCHEME)
    }

    fn create_directory(&self, dir_mrl: &str) -> Option<Arc<dyn VfsDirectory>> {
        let mut dirs = self.dirs.lock().unwrap();
        if let Some(dir) = dirs.get(dir_mrl) {
            return Some(dir.clone());
        }

        let fs_path = mrl::to_path(dir_mrl)?;
        match fs::metadata(&fs_path) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                error!("'{}' is not a directory", dir_mrl);
                return None;
            }
            Err(e) => {
                error!("failed to open directory '{}': {}", dir_mrl, e);
                return None;
            }
        }

        let device = self.create_device_from_mrl(dir_mrl);
        let dir = Arc::new(LocalDirectory {
            mrl: dir_mrl.trim_end_matches('/').to_string(),
            fs_path,
            device,
        });
        dirs.insert(dir_mrl.to_string(), dir.clone());
        Some(dir)
    }

    fn create_device(&self, uuid: &str) -> Option<Arc<dyn VfsDevice>> {
        self.devices
            .lock()
            .unwrap()
            .get(uuid)
            .map(|d| d.clone() as Arc<dyn VfsDevice>)
    }

    fn create_device_from_mrl(&self, target: &str) -> Option<Arc<dyn VfsDevice>> {
        let devices = self.devices.lock().unwrap();
        let mut result: Option<Arc<LocalDevice>> = None;

        for device in devices.values() {
            if target.starts_with(&device.mountpoint)
                || target == device.mountpoint.trim_end_matches('/')
            {
                let better = match &result {
                    Some(current) => current.mountpoint.len() < device.mountpoint.len(),
                    None => true,
                };
                if better {
                    result = Some(device.clone());
                }
            }
        }

        result.map(|d| d as Arc<dyn VfsDevice>)
    }

    fn refresh_devices(&self) {
        self.dirs.lock().unwrap().clear();

        let mut devices = self.devices.lock().unwrap();
        devices.clear();

        info!("refreshing devices from the device lister");
        let listed = self.lister.devices();
        if listed.is_empty() {
            warn!("no device detected");
            return;
        }

        for description in listed {
            info!(
                "caching device {} mounted on '{}', removable: {}",
                description.uuid, description.mountpoint, description.is_removable
            );

            let mountpoint = if description.mountpoint.ends_with('/') {
                description.mountpoint.clone()
            } else {
                format!("{}/", description.mountpoint)
            };

            devices.insert(
                description.uuid.clone(),
                Arc::new(LocalDevice {
                    uuid: description.uuid,
                    mountpoint,
                    is_removable: description.is_removable,
                }),
            );
        }
    }
}

/// Fallback lister exposing the root filesystem as one fixed device.
pub struct SingleDeviceLister {
    root: PathBuf,
}

impl SingleDeviceLister {
    pub fn new<P: AsRef<Path>>(root: P) -> SingleDeviceLister {
        SingleDeviceLister {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl DeviceLister for SingleDeviceLister {
    fn devices(&self) -> Vec<DeviceDescription> {
        vec![DeviceDescription {
            uuid: "local-fs".to_string(),
            mountpoint: mrl::from_path(&self.root),
            is_removable: false,
        }]
    }
}

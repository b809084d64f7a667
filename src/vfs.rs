//! Filesystem abstraction. Discovery only ever sees these traits; the
//! concrete `file://` implementation lives in `vfs_local` and network
//! schemes can be plugged in through their own factory.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum FsError {
    NotFound,
    AccessDenied,
    NotSupported,
    Io(String),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "not found"),
            FsError::AccessDenied => write!(f, "access denied"),
            FsError::NotSupported => write!(f, "not supported"),
            FsError::Io(msg) => write!(f, "i/o failure: {}", msg),
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> FsError {
        match err.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound,
            std::io::ErrorKind::PermissionDenied => FsError::AccessDenied,
            _ => FsError::Io(err.to_string()),
        }
    }
}

pub trait VfsFile: Send + Sync {
    /// Filename, extension included.
    fn name(&self) -> &str;
    /// MRL of the containing directory.
    fn path(&self) -> &str;
    /// Full MRL of the file itself.
    fn full_path(&self) -> &str;
    fn extension(&self) -> Option<String>;
    fn last_modification_date(&self) -> i64;
    fn size(&self) -> i64;
}

pub trait VfsDirectory: Send + Sync {
    fn mrl(&self) -> &str;
    /// Re-reads the directory on every call; both listings are finite
    /// and restartable.
    fn files(&self) -> Result<Vec<Arc<dyn VfsFile>>, FsError>;
    fn dirs(&self) -> Result<Vec<Arc<dyn VfsDirectory>>, FsError>;
    fn device(&self) -> Option<Arc<dyn VfsDevice>>;
}

pub trait VfsDevice: Send + Sync {
    fn uuid(&self) -> &str;
    /// Mountpoint as an MRL prefix, trailing slash included.
    fn mountpoint(&self) -> &str;
    fn is_removable(&self) -> bool;
    fn is_present(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct DeviceDescription {
    pub uuid: String,
    /// MRL prefix of the mountpoint.
    pub mountpoint: String,
    pub is_removable: bool,
}

/// Enumerates the devices currently visible to the host. The embedding
/// application supplies the platform implementation and calls back into
/// the facade on mount and unmount.
pub trait DeviceLister: Send + Sync {
    fn devices(&self) -> Vec<DeviceDescription>;
}

/// Converts MRLs into directories and devices for one scheme. Directory
/// instances are cached per MRL; the device cache is seeded from the
/// `DeviceLister` and refreshed explicitly.
pub trait FsFactory: Send + Sync {
    fn is_mrl_supported(&self, mrl: &str) -> bool;

    fn is_network_file_system(&self) -> bool {
        false
    }

    /// None when the directory can't be opened, so callers skip rather
    /// than abort the whole walk.
    fn create_directory(&self, mrl: &str) -> Option<Arc<dyn VfsDirectory>>;

    fn create_device(&self, uuid: &str) -> Option<Arc<dyn VfsDevice>>;

    /// Picks the device whose mountpoint is the longest prefix of the
    /// MRL; the longer mountpoint wins a tie.
    fn create_device_from_mrl(&self, mrl: &str) -> Option<Arc<dyn VfsDevice>>;

    fn refresh_devices(&self);
}

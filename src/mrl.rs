//! Media Resource Locator helpers. The built-in filesystem speaks
//! `file://` only; other schemes come from plug-in factories.

use std::path::{Path, PathBuf};

pub const FILE_SCHEME: &str = "file://";

/// Returns the scheme part of an MRL ("file" for "file:///a/b"), if any.
pub fn scheme(mrl: &str) -> Option<&str> {
    mrl.find("://").map(|pos| &mrl[..pos])
}

/// Converts a `file://` MRL to a filesystem path.
pub fn to_path(mrl: &str) -> Option<PathBuf> {
    mrl.strip_prefix(FILE_SCHEME).map(PathBuf::from)
}

/// Converts a filesystem path to a `file://` MRL.
pub fn from_path(path: &Path) -> String {
    format!("{}{}", FILE_SCHEME, path.to_string_lossy())
}

/// Last path component of an MRL, extension included.
pub fn file_name(mrl: &str) -> &str {
    mrl.trim_end_matches('/').rsplit('/').next().unwrap_or(mrl)
}

/// Last path component with the extension stripped.
pub fn file_stem(mrl: &str) -> &str {
    let name = file_name(mrl);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

/// Lowercased extension of the MRL's last component, if any.
pub fn extension(mrl: &str) -> Option<String> {
    let name = file_name(mrl);
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    Some(name[dot + 1..].to_ascii_lowercase())
}

/// Joins a directory MRL and a child name with exactly one separator.
pub fn join(dir_mrl: &str, name: &str) -> String {
    format!("{}/{}", dir_mrl.trim_end_matches('/'), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_and_path() {
        assert_eq!(scheme("file:///music/a.mp3"), Some("file"));
        assert_eq!(scheme("/music/a.mp3"), None);
        assert_eq!(
            to_path("file:///music/a.mp3"),
            Some(PathBuf::from("/music/a.mp3"))
        );
        assert_eq!(to_path("smb://host/share"), None);
        assert_eq!(from_path(Path::new("/music")), "file:///music");
    }

    #[test]
    fn names_and_extensions() {
        assert_eq!(file_name("file:///music/a.mp3"), "a.mp3");
        assert_eq!(file_name("file:///music/dir/"), "dir");
        assert_eq!(file_stem("file:///music/a.mp3"), "a");
        assert_eq!(file_stem("file:///music/noext"), "noext");
        assert_eq!(extension("file:///music/a.MP3"), Some("mp3".to_string()));
        assert_eq!(extension("file:///music/noext"), None);
        assert_eq!(extension("file:///music/.hidden"), None);
    }

    #[test]
    fn join_normalises_separators() {
        assert_eq!(join("file:///music/", "a.mp3"), "file:///music/a.mp3");
        assert_eq!(join("file:///music", "a.mp3"), "file:///music/a.mp3");
    }
}

//! Small path building helpers.

use std::path::{Path, PathBuf};
use std::ffi::OsStr;


/// Build `<dir>/<name>.<extension>` without formatting the file name through a
/// temporary string.
pub fn file_with_extension(dir: &Path, name: &str, extension: &str) -> PathBuf {
    let mut buf = dir.join(name).into_os_string();
    buf.push(".");
    buf.push(extension);
    PathBuf::from(buf)
}

/// Append a raw suffix to a path, without introducing any separator. Used for the
/// `.part` and `.tmp` siblings of atomically written files.
pub fn with_suffix(file: &Path, suffix: impl AsRef<OsStr>) -> PathBuf {
    let mut buf = file.to_path_buf().into_os_string();
    buf.push(suffix);
    PathBuf::from(buf)
}

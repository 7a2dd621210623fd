//! OxMC is a library for resolving, installing and launching Minecraft versions, with
//! support for Forge mod loader installers and Mojang/Microsoft account sessions.
//!
//! The installation is organized as a sequence of tasks sharing a typed state
//! container, see [`task::Sequence`]; the standard tasks are wired by
//! [`standard::add_standard_tasks`] and extended for mod loaders by
//! [`forge::add_forge_tasks`].

use std::path::Path;
use std::io;

mod path;

pub mod serde;
pub mod http;
pub mod task;
pub mod maven;
pub mod download;
pub mod auth;

pub mod standard;
pub mod forge;


/// An error aborting the installation pipeline. Partial on-disk state is left intact,
/// every write is either atomic or content-addressed, so a subsequent run resumes.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A system I/O error with an optional file source.
    #[error("io: {error} @ {file:?}")]
    Io {
        #[source]
        error: io::Error,
        file: Option<Box<Path>>,
    },
    /// A JSON deserialization error with its origin (file path, URL or archive entry).
    #[error("json: {error} @ {origin}")]
    Json {
        #[source]
        error: serde_path_to_error::Error<serde_json::Error>,
        origin: String,
    },
    /// A zip error with a file source.
    #[error("zip: {error} @ {file:?}")]
    Zip {
        #[source]
        error: zip::result::ZipError,
        file: Box<Path>,
    },
    /// An HTTP transport or decoding error.
    #[error("http: {0}")]
    Http(#[from] http::Error),
    /// An entry of a download batch persistently failed.
    #[error("download: {0}")]
    Download(#[from] download::EntryError),
    /// The requested version is found neither on disk nor in its repository.
    #[error("version not found: {id}")]
    VersionNotFound {
        id: String,
    },
    /// The version metadata provides no download for the main jar file, and the file
    /// is not already present.
    #[error("jar not found")]
    JarNotFound {},
    /// The version references an asset index that has no download information and is
    /// not already cached.
    #[error("assets not found: {id}")]
    AssetsNotFound {
        id: String,
    },
    /// A library has no download information and is missing from the libraries
    /// directory.
    #[error("library not found: {gav}")]
    LibraryNotFound {
        gav: maven::Gav,
    },
    /// The `inheritsFrom` chain of a version exceeded the maximum depth.
    #[error("inheritance cycle: {id}")]
    InheritanceCycle {
        id: String,
    },
    /// A task requires a state value that no previous task has produced.
    #[error("missing state: {name}")]
    MissingState {
        name: &'static str,
    },
    /// An error specific to the mod loader installer.
    #[error("forge: {0}")]
    Forge(#[from] forge::Error),
}

/// Type alias for a result with the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {

    #[inline]
    pub(crate) fn new_io_file(error: io::Error, file: impl Into<Box<Path>>) -> Self {
        Self::Io { error, file: Some(file.into()) }
    }

    #[inline]
    pub(crate) fn new_json(error: serde_path_to_error::Error<serde_json::Error>, origin: impl Into<String>) -> Self {
        Self::Json { error, origin: origin.into() }
    }

    #[inline]
    pub(crate) fn new_zip(error: zip::result::ZipError, file: impl Into<Box<Path>>) -> Self {
        Self::Zip { error, file: file.into() }
    }

}

//! Standard installation procedure: version metadata resolution with inheritance,
//! main jar, assets, libraries and logger configuration planning.

pub mod serde;

use std::collections::{HashMap, HashSet};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::fs::{self, File};
use std::env;

use ::serde::de::DeserializeOwned;
use serde_json::Value;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::path::{file_with_extension, with_suffix};
use crate::download::{DownloadList, Entry};
use crate::task::{State, Task, Watcher};
use crate::{http, Error};


/// Static URL to the version manifest.
pub const VERSION_MANIFEST_URL: &str = "https://piston-meta.mojang.com/mc/game/version_manifest.json";

/// Base URL for downloading game's assets.
pub const RESOURCES_URL: &str = "https://resources.download.minecraft.net/";

/// Maximum depth of the version inheritance chain, defeating cycles.
const MAX_INHERIT_DEPTH: usize = 10;

/// Root paths of an installation, immutable after construction.
#[derive(Debug, Clone)]
pub struct Context {
    /// The main directory where versions, assets and libraries are stored.
    pub main_dir: PathBuf,
    /// The working directory from where the game is run, the game stores saves,
    /// resource packs, options and mods there if relevant.
    pub work_dir: PathBuf,
    /// One directory per version, each with its metadata and main jar file.
    pub versions_dir: PathBuf,
    /// The content-addressed assets store, indexes and log configs.
    pub assets_dir: PathBuf,
    /// Libraries organized like a maven repository.
    pub libraries_dir: PathBuf,
    /// Parent of the per-run temporary directories.
    pub bin_dir: PathBuf,
}

impl Context {

    /// Create a context from the main directory, also used as the working directory.
    pub fn new(main_dir: impl Into<PathBuf>) -> Self {
        let main_dir = main_dir.into();
        Self::with_work_dir(main_dir.clone(), main_dir)
    }

    /// Create a context with distinct main and working directories.
    pub fn with_work_dir(main_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        let main_dir = main_dir.into();
        Self {
            work_dir: work_dir.into(),
            versions_dir: main_dir.join("versions"),
            assets_dir: main_dir.join("assets"),
            libraries_dir: main_dir.join("libraries"),
            bin_dir: main_dir.join("bin"),
            main_dir,
        }
    }

    /// Return a new unique per-run temporary directory path, not created yet.
    pub fn gen_bin_dir(&self) -> PathBuf {
        self.bin_dir.join(Uuid::new_v4().to_string())
    }

}

/// Return the default main directory, depending on the platform family.
pub fn default_main_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        dirs::data_dir().map(|dir| dir.join(".minecraft"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|dir| dir.join("minecraft"))
    } else {
        dirs::home_dir().map(|dir| dir.join(".minecraft"))
    }
}

/// The remote index of known versions with its alias mapping.
#[derive(Debug, Clone)]
pub struct VersionManifest {
    data: serde::Manifest,
}

impl VersionManifest {

    pub fn new(data: serde::Manifest) -> Self {
        Self { data }
    }

    /// Request the remote manifest index.
    pub fn request() -> crate::Result<Self> {
        let (_, document) = http::json_get(VERSION_MANIFEST_URL)?;
        Ok(Self::new(parse_json(document, VERSION_MANIFEST_URL)?))
    }

    /// Translate an alias, such as `release` or `snapshot`, to its concrete version
    /// id, returning the input unchanged (and false) when it is not an alias.
    pub fn filter_latest<'a>(&'a self, id: &'a str) -> (&'a str, bool) {
        match self.data.latest.get(id) {
            Some(concrete) => (concrete.as_str(), true),
            None => (id, false),
        }
    }

    /// Return the descriptor of a version from its id or alias.
    pub fn get(&self, id: &str) -> Option<&serde::ManifestVersion> {
        let (id, _) = self.filter_latest(id);
        self.data.versions.iter().find(|version| version.id == id)
    }

    /// Lazily yield the exact alias hit, or every version whose id contains the given
    /// input. The iterator is finite and not restartable, collect it for several
    /// passes.
    pub fn search<'a>(&'a self, input: &'a str) -> impl Iterator<Item = &'a serde::ManifestVersion> + 'a {
        let (input, alias) = self.filter_latest(input);
        self.data.versions.iter()
            .filter(move |version| if alias {
                version.id == input
            } else {
                version.id.contains(input)
            })
    }

    /// All version descriptors, most recent first.
    pub fn versions(&self) -> &[serde::ManifestVersion] {
        &self.data.versions
    }

}

/// State for the root version id that the metadata task resolves.
#[derive(Debug, Clone)]
pub struct MetadataRoot(pub String);

/// A version being resolved or fully resolved, its metadata is the canonical merged
/// document.
#[derive(Debug, Clone)]
pub struct Version {
    /// Identifier of this version.
    pub id: String,
    /// Directory of that version, where metadata is stored with the jar file.
    pub dir: PathBuf,
    /// The resolved metadata document.
    pub metadata: Value,
}

impl Version {

    pub fn new(id: String, dir: PathBuf) -> Self {
        Self { id, dir, metadata: Value::Null }
    }

    pub fn metadata_file(&self) -> PathBuf {
        file_with_extension(&self.dir, &self.id, "json")
    }

    pub fn jar_file(&self) -> PathBuf {
        file_with_extension(&self.dir, &self.id, "jar")
    }

    /// Write the metadata document, pretty-printed, to the version directory.
    pub fn write_metadata_file(&self) -> crate::Result<()> {
        write_json_file(&self.metadata_file(), &self.metadata, true)
    }

}

/// How one version id is loaded and fetched. Mod loader installers register custom
/// repositories for their virtual version ids.
pub trait VersionRepository {

    /// Try loading the version from its metadata file, returning false to trigger a
    /// fetch when the file is absent or not decodable.
    fn load_version(&mut self, version: &mut Version) -> crate::Result<bool> {
        match try_read_json::<Value>(&version.metadata_file()) {
            Some(metadata) => {
                version.metadata = metadata;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetch the version metadata from its remote source, and persist it.
    fn fetch_version(&mut self, version: &mut Version, state: &mut State, watcher: &mut dyn Watcher) -> crate::Result<()>;

}

/// The default repository, fetching versions known to the remote manifest.
#[derive(Debug, Default)]
pub struct ManifestRepository {
    manifest: Option<VersionManifest>,
}

impl VersionRepository for ManifestRepository {

    fn fetch_version(&mut self, version: &mut Version, _state: &mut State, _watcher: &mut dyn Watcher) -> crate::Result<()> {

        if self.manifest.is_none() {
            self.manifest = Some(VersionManifest::request()?);
        }

        // Just assigned above when absent.
        let manifest = self.manifest.as_ref().unwrap();

        let Some(descriptor) = manifest.get(&version.id) else {
            return Err(Error::VersionNotFound { id: version.id.clone() });
        };

        let (_, document) = http::json_get(&descriptor.url)?;
        version.metadata = document;
        version.write_metadata_file()?;
        Ok(())

    }

}

/// State mapping version ids to the repository resolving them, with the manifest
/// repository as the fallback.
#[derive(Default)]
pub struct VersionRepositories {
    default: ManifestRepository,
    custom: HashMap<String, Box<dyn VersionRepository>>,
}

impl VersionRepositories {

    /// Register a custom repository for the given version id.
    pub fn insert(&mut self, id: impl Into<String>, repository: Box<dyn VersionRepository>) {
        self.custom.insert(id.into(), repository);
    }

    fn get_mut(&mut self, id: &str) -> &mut dyn VersionRepository {
        match self.custom.get_mut(id) {
            Some(repository) => &mut **repository,
            None => &mut self.default,
        }
    }

}

/// Feature flags used when evaluating library rules.
#[derive(Debug, Clone, Default)]
pub struct Features(pub HashSet<String>);

/// State for the resolved main jar file.
#[derive(Debug, Clone)]
pub struct Jar {
    pub file: PathBuf,
}

/// State for the JVM running the game and the installer post-processors, only its
/// executable path matters here, selecting it is up to the embedding application.
#[derive(Debug, Clone)]
pub struct Jvm {
    pub file: PathBuf,
}

/// State for the logger launch argument, with `${path}` already substituted.
#[derive(Debug, Clone)]
pub struct LoggerArgument(pub String);

/// State for the class path and natives files resolved from libraries.
#[derive(Debug, Clone, Default)]
pub struct LibrariesFiles {
    pub class_files: Vec<PathBuf>,
    pub natives_files: Vec<PathBuf>,
}

/// Task resolving the version metadata designated by [`MetadataRoot`], following and
/// merging the full inheritance chain.
#[derive(Debug, Default)]
pub struct MetadataTask;

impl Task for MetadataTask {

    fn execute(&mut self, state: &mut State, watcher: &mut dyn Watcher) -> Result<(), Error> {

        let Some(root) = state.get::<MetadataRoot>() else {
            return Ok(());
        };

        let root_id = root.0.clone();
        let versions_dir = state.require::<Context>()?.versions_dir.clone();

        // Temporarily taken out of the state so that repositories can access it.
        let mut repositories = state.remove::<VersionRepositories>().unwrap_or_default();
        let res = resolve_root(&root_id, &versions_dir, &mut repositories, state, watcher);
        state.insert(repositories);

        state.insert(res?);
        Ok(())

    }

}

fn resolve_root(
    root_id: &str,
    versions_dir: &Path,
    repositories: &mut VersionRepositories,
    state: &mut State,
    watcher: &mut dyn Watcher,
) -> crate::Result<Version> {

    let mut version = resolve_version(root_id, versions_dir, repositories, state, watcher)?;
    let mut depth = 0;

    while let Some(parent_id) = version.metadata.get("inheritsFrom").and_then(Value::as_str).map(str::to_string) {

        depth += 1;
        if depth > MAX_INHERIT_DEPTH {
            return Err(Error::InheritanceCycle { id: root_id.to_string() });
        }

        let parent = resolve_version(&parent_id, versions_dir, repositories, state, watcher)?;

        if let Some(object) = version.metadata.as_object_mut() {
            object.remove("inheritsFrom");
        }

        merge_metadata(&mut version.metadata, parent.metadata);

    }

    // The resolved document keeps the originally requested id.
    if let Some(object) = version.metadata.as_object_mut() {
        object.insert("id".to_string(), Value::String(root_id.to_string()));
    }

    version.write_metadata_file()?;
    Ok(version)

}

fn resolve_version(
    id: &str,
    versions_dir: &Path,
    repositories: &mut VersionRepositories,
    state: &mut State,
    watcher: &mut dyn Watcher,
) -> crate::Result<Version> {

    if id.is_empty() {
        return Err(Error::VersionNotFound { id: String::new() });
    }

    let mut version = Version::new(id.to_string(), versions_dir.join(id));
    let repository = repositories.get_mut(id);

    if !repository.load_version(&mut version)? {
        repository.fetch_version(&mut version, state, watcher)?;
    }

    Ok(version)

}

/// Merge the parent document into the child one: keys missing from the child are
/// copied, maps are merged recursively, lists are concatenated parent-first, any
/// other collision keeps the child value.
pub fn merge_metadata(child: &mut Value, parent: Value) {

    let (Value::Object(child), Value::Object(parent)) = (child, parent) else {
        return;
    };

    for (key, parent_value) in parent {
        match child.entry(key) {
            serde_json::map::Entry::Vacant(entry) => {
                entry.insert(parent_value);
            }
            serde_json::map::Entry::Occupied(mut entry) => {
                match (entry.get_mut(), parent_value) {
                    (child_value @ Value::Object(_), parent_value @ Value::Object(_)) => {
                        merge_metadata(child_value, parent_value);
                    }
                    (Value::Array(child_items), Value::Array(mut parent_items)) => {
                        parent_items.append(child_items);
                        *child_items = parent_items;
                    }
                    _ => (),
                }
            }
        }
    }

}

/// Task planning the download of the version's main jar file.
#[derive(Debug, Default)]
pub struct JarTask;

impl Task for JarTask {

    fn execute(&mut self, state: &mut State, _watcher: &mut dyn Watcher) -> Result<(), Error> {

        let (jar_file, download, name) = {
            let version = state.require::<Version>()?;
            let download = version.metadata.pointer("/downloads/client").cloned();
            (version.jar_file(), download, format!("{}.jar", version.id))
        };

        if let Some(download) = download {
            let download: serde::Download = parse_json(download, "downloads.client")?;
            if !check_file(&jar_file, download.size, None)? {
                let entry = Entry::from_download(&download, jar_file.clone()).with_name(name);
                state.require_mut::<DownloadList>()?.push(entry)?;
            }
        } else if !jar_file.is_file() {
            return Err(Error::JarNotFound {});
        }

        state.insert(Jar { file: jar_file });
        Ok(())

    }

}

/// Task planning asset downloads from the version's asset index, with the legacy
/// resources and virtual mirrors handled by a finalize callback.
#[derive(Debug, Default)]
pub struct AssetsTask;

impl Task for AssetsTask {

    fn execute(&mut self, state: &mut State, _watcher: &mut dyn Watcher) -> Result<(), Error> {

        let (assets_dir, work_dir) = {
            let context = state.require::<Context>()?;
            (context.assets_dir.clone(), context.work_dir.clone())
        };

        let (index_name, index_info) = {
            let version = state.require::<Version>()?;
            let name = version.metadata.get("assets").and_then(Value::as_str).map(str::to_string);
            (name, version.metadata.get("assetIndex").cloned())
        };

        let index_info = match index_info {
            Some(value) => Some(parse_json::<serde::AssetIndexInfo>(value, "assetIndex")?),
            None => None,
        };

        let Some(index_name) = index_name.or_else(|| index_info.as_ref().map(|info| info.id.clone())) else {
            return Ok(());  // The version simply has no assets.
        };

        let index_file = file_with_extension(&assets_dir.join("indexes"), &index_name, "json");
        let index: serde::AssetIndex = match try_read_json(&index_file) {
            Some(index) => index,
            None => {
                let Some(info) = &index_info else {
                    return Err(Error::AssetsNotFound { id: index_name });
                };
                let (_, document) = http::json_get(&info.download.url)?;
                write_json_file(&index_file, &document, false)?;
                parse_json(document, &info.download.url)?
            }
        };

        let objects_dir = assets_dir.join("objects");
        let virtual_dir = assets_dir.join("virtual").join(&index_name);
        let resources_dir = work_dir.join("resources");

        let mut mapped_objects = Vec::new();
        let mut unique_hashes = HashSet::new();
        let mut entries = Vec::new();

        for (asset_path, object) in &index.objects {

            let hash_name = crate::serde::format_hex_bytes(&object.hash.0);
            let hash_prefix = &hash_name[0..2];
            let object_file = objects_dir.join(hash_prefix).join(&hash_name);

            if index.map_to_resources || index.r#virtual {
                mapped_objects.push((PathBuf::from(asset_path), object_file.clone()));
            }

            // Some assets are repeated under multiple paths, download the object once.
            if !unique_hashes.insert(object.hash.0) {
                continue;
            }

            if !check_file(&object_file, Some(object.size), None)? {
                entries.push(Entry::new(format!("{RESOURCES_URL}{hash_prefix}/{hash_name}"), object_file)
                    .with_size(Some(object.size))
                    .with_sha1(Some(object.hash.0))
                    .with_name(asset_path.as_str()));
            }

        }

        let list = state.require_mut::<DownloadList>()?;
        for entry in entries {
            list.push(entry)?;
        }

        if index.map_to_resources || index.r#virtual {

            let map_to_resources = index.map_to_resources;
            let mirror_virtual = index.r#virtual;

            list.push_callback(Box::new(move || {
                for (asset_path, object_file) in &mapped_objects {
                    if map_to_resources {
                        copy_asset_object(object_file, &resources_dir.join(asset_path))?;
                    }
                    if mirror_virtual {
                        copy_asset_object(object_file, &virtual_dir.join(asset_path))?;
                    }
                }
                Ok(())
            }));

        }

        Ok(())

    }

}

/// Copy an asset object to its mapped destination, existing destinations are kept.
fn copy_asset_object(object_file: &Path, dst_file: &Path) -> crate::Result<()> {

    if dst_file.is_file() {
        return Ok(());
    }

    if let Some(parent) = dst_file.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::new_io_file(e, parent))?;
    }

    fs::copy(object_file, dst_file)
        .map_err(|e| Error::new_io_file(e, dst_file))?;

    Ok(())

}

/// Task planning library downloads and resolving the class path and natives files.
#[derive(Debug, Default)]
pub struct LibrariesTask;

impl Task for LibrariesTask {

    fn execute(&mut self, state: &mut State, _watcher: &mut dyn Watcher) -> Result<(), Error> {

        let libraries_dir = state.require::<Context>()?.libraries_dir.clone();
        let libraries = state.require::<Version>()?.metadata.get("libraries").cloned();

        let libraries: Vec<serde::Library> = match libraries {
            Some(value) => parse_json(value, "libraries")?,
            None => Vec::new(),
        };

        let features = state.get::<Features>().cloned().unwrap_or_default();

        let mut files = LibrariesFiles::default();

        // Old versions seem to prefer having the main jar first in the class path.
        files.class_files.push(state.require::<Jar>()?.file.clone());

        // Tracking libraries that are already defined and should not be overridden by
        // inherited versions, any version of a same artifact matches.
        let mut libraries_set = HashSet::new();
        let mut entries = Vec::new();

        for library in &libraries {

            let mut gav = library.name.clone();
            let natives = library.natives.is_some();

            if let Some(library_natives) = &library.natives {

                let (Some(os_name), Some(os_bits)) = (os_name(), os_bits()) else {
                    continue;
                };

                // The classifier associated to the OS overrides the specifier's one,
                // the library is skipped when natives are missing for this OS.
                let Some(classifier) = library_natives.get(os_name) else {
                    continue;
                };

                gav.set_classifier(Some(&classifier.replace("${arch}", os_bits)));

            }

            if let Some(rules) = &library.rules {
                if !check_rules(rules, &features.0) {
                    continue;
                }
            }

            let key = (gav.group().to_string(), gav.artifact().to_string(),
                gav.classifier().to_string(), gav.extension().to_string());
            if !libraries_set.insert(key) {
                continue;
            }

            let download = if natives {
                library.downloads.classifiers.get(gav.classifier())
            } else {
                library.downloads.artifact.as_ref()
            };

            let library_file;
            if let Some(download) = download.filter(|dl| !dl.download.url.is_empty()) {

                library_file = match &download.path {
                    Some(path) => libraries_dir.join(path),
                    None => gav.file(&libraries_dir),
                };

                if !check_file(&library_file, download.download.size, None)? {
                    entries.push(Entry::from_download(&download.download, library_file.clone())
                        .with_name(gav.to_string()));
                }

            } else if let Some(repository_url) = &library.url {

                // Derive the URL from the repository base and the maven path.
                library_file = gav.file(&libraries_dir);
                if !library_file.is_file() {
                    let mut url = repository_url.trim_end_matches('/').to_string();
                    url.push('/');
                    url.push_str(&gav.url());
                    entries.push(Entry::new(url, library_file.clone())
                        .with_name(gav.to_string()));
                }

            } else {

                // No download method left, the file must already be installed.
                library_file = gav.file(&libraries_dir);
                if !library_file.is_file() {
                    return Err(Error::LibraryNotFound { gav: gav.clone() });
                }

            }

            (if natives {
                &mut files.natives_files
            } else {
                &mut files.class_files
            }).push(library_file);

        }

        let list = state.require_mut::<DownloadList>()?;
        for entry in entries {
            list.push(entry)?;
        }

        state.insert(files);
        Ok(())

    }

}

/// Task planning the logger configuration download and its launch argument.
#[derive(Debug, Default)]
pub struct LoggerTask;

impl Task for LoggerTask {

    fn execute(&mut self, state: &mut State, _watcher: &mut dyn Watcher) -> Result<(), Error> {

        let assets_dir = state.require::<Context>()?.assets_dir.clone();
        let Some(logging) = state.require::<Version>()?.metadata.pointer("/logging/client").cloned() else {
            return Ok(());
        };

        let logging: serde::Logging = parse_json(logging, "logging.client")?;
        let file = assets_dir.join("log_configs").join(&logging.file.id);

        let download = &logging.file.download;
        if !check_file(&file, download.size, download.sha1.as_deref())? {
            let entry = Entry::from_download(download, file.clone())
                .with_name(logging.file.id.as_str());
            state.require_mut::<DownloadList>()?.push(entry)?;
        }

        let argument = logging.argument.replace("${path}", &file.to_string_lossy());
        state.insert(LoggerArgument(argument));
        Ok(())

    }

}

/// Task draining the download list through the executor and running the finalize
/// callbacks.
#[derive(Debug, Default)]
pub struct DownloadTask;

impl Task for DownloadTask {

    fn execute(&mut self, state: &mut State, watcher: &mut dyn Watcher) -> Result<(), Error> {
        state.require_mut::<DownloadList>()?.download(watcher)
    }

}

/// Add the standard installation tasks, in order, to the given sequence. The state
/// must contain a [`Context`], a [`DownloadList`] and a [`MetadataRoot`].
pub fn add_standard_tasks(seq: &mut crate::task::Sequence) {
    seq.push(MetadataTask);
    seq.push(JarTask);
    seq.push(AssetsTask);
    seq.push(LibrariesTask);
    seq.push(LoggerTask);
    seq.push(DownloadTask);
}

// ========================== //
// Following code is internal //
// ========================== //

/// Resolve the given JSON array as rules and return true if allowed, the last
/// matching rule wins.
fn check_rules(rules: &[serde::Rule], features: &HashSet<String>) -> bool {

    let mut allowed = false;

    'rules: for rule in rules {

        if !check_rule_os(&rule.os) {
            continue;
        }

        for (feature, expected) in &rule.features {
            if features.contains(feature) != *expected {
                continue 'rules;
            }
        }

        allowed = match rule.action {
            serde::RuleAction::Allow => true,
            serde::RuleAction::Disallow => false,
        };

    }

    allowed

}

fn check_rule_os(rule_os: &serde::RuleOs) -> bool {

    if let (Some(name), Some(os_name)) = (&rule_os.name, os_name()) {
        if name != os_name {
            return false;
        }
    }

    if let (Some(arch), Some(os_arch)) = (&rule_os.arch, os_arch()) {
        if arch != os_arch {
            return false;
        }
    }

    if let (Some(version), Some(os_version)) = (&rule_os.version, os_version()) {
        if !version.is_match(os_version) {
            return false;
        }
    }

    true

}

/// Return the OS name used by metadata rules, for the OS this binary is compiled for.
fn os_name() -> Option<&'static str> {
    Some(match env::consts::OS {
        "windows" => "windows",
        "linux" => "linux",
        "macos" => "osx",
        "freebsd" => "freebsd",
        "openbsd" => "openbsd",
        "netbsd" => "netbsd",
        _ => return None
    })
}

/// Return the OS architecture name used by metadata rules.
fn os_arch() -> Option<&'static str> {
    Some(match env::consts::ARCH {
        "x86" => "x86",
        "x86_64" => "x86_64",
        "arm" => "arm32",
        "aarch64" => "arm64",
        _ => return None
    })
}

/// Return the architecture bit-ness, substituted in natives classifiers.
fn os_bits() -> Option<&'static str> {
    Some(match env::consts::ARCH {
        "x86" | "arm" => "32",
        "x86_64" | "aarch64" => "64",
        _ => return None
    })
}

fn os_version() -> Option<&'static str> {

    use std::sync::OnceLock;

    static VERSION: OnceLock<Option<String>> = OnceLock::new();

    VERSION.get_or_init(|| {
        use os_info::Version;
        match os_info::get().version() {
            Version::Unknown => None,
            version => Some(version.to_string())
        }
    }).as_deref()

}

/// Check if a file at a given path has the corresponding properties (size and/or
/// SHA-1), returning true if it is valid, false is returned anyway if the file
/// doesn't exist.
pub(crate) fn check_file(
    file: &Path,
    size: Option<u32>,
    sha1: Option<&[u8; 20]>,
) -> crate::Result<bool> {
    check_file_inner(file, size, sha1)
        .map_err(|e| Error::new_io_file(e, file))
}

fn check_file_inner(
    file: &Path,
    size: Option<u32>,
    sha1: Option<&[u8; 20]>,
) -> io::Result<bool> {

    if let Some(sha1) = sha1 {
        match File::open(file) {
            Ok(reader) => {

                if let Some(size) = size {
                    if reader.metadata()?.len() != size as u64 {
                        return Ok(false);
                    }
                }

                let mut reader = BufReader::new(reader);
                let mut digest = Sha1::new();
                io::copy(&mut reader, &mut digest)?;
                Ok(digest.finalize().as_slice() == sha1)

            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    } else {
        match (file.metadata(), size) {
            (Ok(metadata), Some(size)) => Ok(metadata.len() == size as u64),
            (Ok(_metadata), None) => Ok(true),
            (Err(e), _) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            (Err(e), _) => Err(e),
        }
    }

}

/// Compute the canonical, absolute form of an existing path.
pub(crate) fn canonicalize_file(file: &Path) -> crate::Result<PathBuf> {
    dunce::canonicalize(file)
        .map_err(|e| Error::new_io_file(e, file))
}

/// Decode a typed document from a JSON value, keeping the path of schema errors.
pub(crate) fn parse_json<T: DeserializeOwned>(value: Value, origin: &str) -> crate::Result<T> {
    serde_path_to_error::deserialize(value)
        .map_err(|e| Error::new_json(e, origin))
}

/// Read and decode a JSON file, any I/O or decode failure yields none so that the
/// caller can fall back to fetching.
pub(crate) fn try_read_json<T: DeserializeOwned>(file: &Path) -> Option<T> {
    let reader = BufReader::new(File::open(file).ok()?);
    serde_json::from_reader(reader).ok()
}

/// Write a JSON document to a file, atomically through a temporary sibling, creating
/// parent directories as needed.
pub(crate) fn write_json_file(file: &Path, value: &Value, pretty: bool) -> crate::Result<()> {

    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::new_io_file(e, parent))?;
    }

    let tmp_file = with_suffix(file, ".tmp");

    let writer = File::create(&tmp_file)
        .map(BufWriter::new)
        .map_err(|e| Error::new_io_file(e, tmp_file.as_path()))?;

    let res = if pretty {
        serde_json::to_writer_pretty(writer, value)
    } else {
        serde_json::to_writer(writer, value)
    };

    res.map_err(|e| Error::new_io_file(io::Error::other(e), tmp_file.as_path()))?;

    fs::rename(&tmp_file, file)
        .map_err(|e| Error::new_io_file(e, file))?;

    Ok(())

}

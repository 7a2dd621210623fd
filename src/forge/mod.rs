//! Forge mod loader installation: fetching the installer archive, parsing its install
//! profile (modern and legacy schemas), harvesting its libraries and running its
//! post-processors.

pub mod serde;

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, BufWriter, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::fs::{self, File};
use std::env;

use serde_json::Value;
use sha1::{Digest, Sha1};
use zip::ZipArchive;

use crate::standard::{self, Context, Jvm, MetadataRoot, Version, VersionRepositories, VersionRepository};
use crate::task::{Event, Sequence, State, Task, Watcher};
use crate::download::{DownloadList, Entry};
use crate::maven::Gav;
use crate::http;


/// Base URL of the maven repository serving the installer archives.
const INSTALLER_REPO_URL: &str = "https://maven.minecraftforge.net/net/minecraftforge/forge";

/// URL of the promotion index, mapping game versions to recommended loader versions.
const PROMO_VERSIONS_URL: &str = "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json";

/// URL of the maven metadata document listing every released loader version.
const MAVEN_METADATA_URL: &str = "https://maven.minecraftforge.net/net/minecraftforge/forge/maven-metadata.xml";

/// The mod loader installation could not proceed.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The installer archive has no `install_profile.json` entry.
    #[error("install profile missing")]
    InstallProfileMissing {},
    /// The install profile references no version metadata, or the referenced archive
    /// entry is absent.
    #[error("version metadata missing")]
    VersionMetadataMissing {},
    /// A file to extract from the installer archive was not found.
    #[error("installer entry not found: {entry}")]
    InstallerEntryNotFound {
        entry: String,
    },
    /// The installer archive request failed with an HTTP status other than 404.
    #[error("installer request failed: status {status}")]
    InstallerRequestFailed {
        status: u16,
    },
    /// A post-processor references a jar that the install profile never declared.
    #[error("unknown processor jar: {name}")]
    UnknownProcessorJar {
        name: Gav,
    },
    /// The manifest of a processor jar declares no main class.
    #[error("missing main class in {file:?}")]
    MissingMainClass {
        file: Box<Path>,
    },
    /// A post-processor terminated with a nonzero exit code.
    #[error("post-processor {task} failed with code {code:?}")]
    PostProcessorFailed {
        task: String,
        code: Option<i32>,
    },
    /// A file produced by a post-processor has a wrong SHA-1.
    #[error("corrupt post-processor output {file:?}: got {got}, expected {expected}")]
    PostOutputCorrupt {
        file: Box<Path>,
        got: String,
        expected: String,
    },
}

/// State for the mod loader version to install, `prefix` names the resulting virtual
/// version (`{prefix}-{version}`).
#[derive(Debug, Clone)]
pub struct ForgeRoot {
    pub prefix: String,
    pub version: String,
}

/// Declared model of a single post-processor run.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    pub jar: Gav,
    pub classpath: Vec<Gav>,
    pub args: Vec<String>,
    pub outputs: HashMap<String, String>,
}

/// State carried from installer profile parsing to the finalize task: the temporary
/// extraction directory, substitution variables, install-time libraries and the
/// ordered post-processors.
#[derive(Debug)]
pub struct PostInfo {
    pub tmp_dir: PathBuf,
    pub variables: HashMap<String, String>,
    pub libraries: HashMap<Gav, PathBuf>,
    pub processors: Vec<PostProcessor>,
}

/// Task routing the resolution of the virtual loader version through a dedicated
/// repository, when a [`ForgeRoot`] is present.
#[derive(Debug, Default)]
pub struct ForgeInitTask;

impl Task for ForgeInitTask {

    fn execute(&mut self, state: &mut State, _watcher: &mut dyn Watcher) -> Result<(), crate::Error> {

        let Some(root) = state.get::<ForgeRoot>() else {
            return Ok(());
        };

        let version_id = format!("{}-{}", root.prefix, root.version);
        let forge_version = root.version.clone();

        state.insert(MetadataRoot(version_id.clone()));

        if !state.contains::<VersionRepositories>() {
            state.insert(VersionRepositories::default());
        }

        state.require_mut::<VersionRepositories>()?
            .insert(version_id, Box::new(ForgeRepository { version: forge_version }));

        Ok(())

    }

}

/// Repository fetching the virtual loader version from its installer archive.
#[derive(Debug)]
pub struct ForgeRepository {
    version: String,
}

impl VersionRepository for ForgeRepository {

    fn fetch_version(&mut self, version: &mut Version, state: &mut State, _watcher: &mut dyn Watcher) -> crate::Result<()> {

        // The game version prefix selects the odd suffixes used by some old releases.
        let game_version = self.version.split('-').next().unwrap_or("");

        let mut installer = None;
        for suffix in [""].into_iter().chain(installer_suffixes(game_version).iter().copied()) {
            let full_version = format!("{}{suffix}", self.version);
            let url = format!("{INSTALLER_REPO_URL}/{full_version}/forge-{full_version}-installer.jar");
            match http::binary_get(&url)? {
                (200, body) => {
                    installer = Some((url, body));
                    break;
                }
                // Not found, silently try the next suffix.
                (404, _) => continue,
                (status, _) => return Err(Error::InstallerRequestFailed { status }.into()),
            }
        }

        let Some((url, body)) = installer else {
            return Err(crate::Error::VersionNotFound { id: version.id.clone() });
        };

        let mut archive = ZipArchive::new(Cursor::new(body))
            .map_err(|e| crate::Error::new_zip(e, PathBuf::from(&url)))?;

        let profile: Value = {
            let reader = archive.by_name("install_profile.json")
                .map_err(|_| Error::InstallProfileMissing {})?;
            let mut deserializer = serde_json::Deserializer::from_reader(reader);
            serde_path_to_error::deserialize(&mut deserializer)
                .map_err(|e| crate::Error::new_json(e, format!("install_profile.json from {url}")))?
        };

        // Modern profiles point to the version metadata with a top-level 'json' key,
        // legacy ones embed it under 'versionInfo'.
        if profile.get("json").is_some() {
            self.fetch_modern(version, state, &mut archive, profile)?;
        } else {
            self.fetch_legacy(version, state, &mut archive, profile)?;
        }

        // The installed document is stored under the virtual version id.
        if let Some(object) = version.metadata.as_object_mut() {
            object.insert("id".to_string(), Value::String(version.id.clone()));
        }

        version.write_metadata_file()?;
        Ok(())

    }

}

impl ForgeRepository {

    fn fetch_modern(
        &mut self,
        version: &mut Version,
        state: &mut State,
        archive: &mut ZipArchive<Cursor<Vec<u8>>>,
        profile: Value,
    ) -> crate::Result<()> {

        let profile: serde::ModernInstallProfile = standard::parse_json(profile, "install_profile.json")?;

        let metadata_entry = profile.json.strip_prefix('/').unwrap_or(&profile.json).to_string();
        version.metadata = {
            let reader = archive.by_name(&metadata_entry)
                .map_err(|_| Error::VersionMetadataMissing {})?;
            let mut deserializer = serde_json::Deserializer::from_reader(reader);
            serde_path_to_error::deserialize(&mut deserializer)
                .map_err(|e| crate::Error::new_json(e, format!("installer entry: {metadata_entry}")))?
        };

        let (libraries_dir, tmp_dir) = {
            let context = state.require::<Context>()?;
            (context.libraries_dir.clone(), context.gen_bin_dir())
        };

        let mut post = PostInfo {
            tmp_dir,
            variables: HashMap::new(),
            libraries: HashMap::new(),
            processors: Vec::new(),
        };

        // Only processors running on the client side are relevant here.
        for processor in profile.processors {
            if !processor.sides.is_empty() && !processor.sides.contains(&serde::InstallSide::Client) {
                continue;
            }
            post.processors.push(PostProcessor {
                jar: processor.jar,
                classpath: processor.classpath,
                args: processor.args,
                outputs: processor.outputs,
            });
        }

        // Install-time libraries are downloaded when they have a URL, or extracted
        // from the archive's embedded maven tree.
        let mut entries = Vec::new();
        for library in profile.libraries {

            // Duplicated libraries have been seen in the wild.
            if post.libraries.contains_key(&library.name) {
                continue;
            }

            let artifact = library.downloads.artifact;
            let library_file = match &artifact.path {
                Some(path) => libraries_dir.join(path),
                None => library.name.file(&libraries_dir),
            };

            if !artifact.download.url.is_empty() {
                if !standard::check_file(&library_file, artifact.download.size, artifact.download.sha1.as_deref())? {
                    entries.push(Entry::from_download(&artifact.download, library_file.clone())
                        .with_name(library.name.to_string()));
                }
            } else {
                extract_archive_file(archive, &format!("maven/{}", library.name.url()), &library_file)?;
            }

            post.libraries.insert(library.name, library_file);

        }

        // Data entries keep their client value, entries referring to archive files
        // are extracted to the temporary directory and replaced by the path.
        for (key, entry) in profile.data {
            let value = entry.client;
            let value = if let Some(entry_path) = value.strip_prefix('/') {
                let dst_file = post.tmp_dir.join(entry_path);
                extract_archive_file(archive, entry_path, &dst_file)?;
                dst_file.display().to_string()
            } else {
                value
            };
            post.variables.insert(key, value);
        }

        let list = state.require_mut::<DownloadList>()?;
        for entry in entries {
            list.push(entry)?;
        }

        state.insert(post);
        Ok(())

    }

    fn fetch_legacy(
        &mut self,
        version: &mut Version,
        state: &mut State,
        archive: &mut ZipArchive<Cursor<Vec<u8>>>,
        profile: Value,
    ) -> crate::Result<()> {

        let Some(metadata) = profile.get("versionInfo").cloned() else {
            return Err(Error::VersionMetadataMissing {}.into());
        };
        version.metadata = metadata;

        // Legacy profiles carry non-standard per-library keys.
        if let Some(libraries) = version.metadata.get_mut("libraries").and_then(Value::as_array_mut) {
            for library in libraries {
                if let Some(object) = library.as_object_mut() {
                    object.remove("serverreq");
                    object.remove("clientreq");
                    object.remove("checksums");
                }
            }
        }

        let install: serde::LegacyInstall = standard::parse_json(
            profile.get("install").cloned().unwrap_or(Value::Null),
            "install_profile.json: install")?;

        // The loader's own jar is embedded in the installer.
        let libraries_dir = state.require::<Context>()?.libraries_dir.clone();
        let jar_file = install.path.file(&libraries_dir);
        extract_archive_file(archive, &install.file_path, &jar_file)?;

        Ok(())

    }

}

/// Task running the declared post-processors in order, after downloads and with the
/// JVM resolved, then checking their output hashes and removing the temporary
/// directory.
#[derive(Debug, Default)]
pub struct ForgeFinalizeTask;

impl Task for ForgeFinalizeTask {

    fn execute(&mut self, state: &mut State, watcher: &mut dyn Watcher) -> Result<(), crate::Error> {

        let Some(mut post) = state.remove::<PostInfo>() else {
            return Ok(());  // Nothing to post-process, legacy installer or no forge.
        };

        let (libraries_dir, work_dir) = {
            let context = state.require::<Context>()?;
            (context.libraries_dir.clone(), context.work_dir.clone())
        };

        let jvm_file = state.require::<Jvm>()?.file.clone();

        // The jar path is computed unconditionally, the file itself has been
        // downloaded alongside the other entries.
        let jar_file = standard::canonicalize_file(&state.require::<Version>()?.jar_file())?;

        post.variables.insert("SIDE".to_string(), "client".to_string());
        post.variables.insert("MINECRAFT_JAR".to_string(), jar_file.display().to_string());

        for processor in &post.processors {

            let Some(jar_path) = post.libraries.get(&processor.jar) else {
                return Err(Error::UnknownProcessorJar { name: processor.jar.clone() }.into());
            };

            // The main class comes from the jar manifest because -cp and -jar are
            // mutually exclusive on the JVM command line.
            let main_class = find_jar_main_class(jar_path)?
                .ok_or_else(|| Error::MissingMainClass { file: jar_path.clone().into_boxed_path() })?;

            let mut class_files = vec![jar_path.as_path()];
            for dependency in &processor.classpath {
                let Some(dependency_path) = post.libraries.get(dependency) else {
                    return Err(Error::UnknownProcessorJar { name: dependency.clone() }.into());
                };
                class_files.push(dependency_path.as_path());
            }

            let task = processor_task_name(processor);
            watcher.on_event(Event::PostProcessorStarted { task: &task });

            let mut command = Command::new(&jvm_file);
            command
                .current_dir(&work_dir)
                .arg("-cp")
                .arg(env::join_paths(class_files).unwrap())
                .arg(&main_class);

            for arg in &processor.args {
                match substitute_arg(arg, &post.variables, &libraries_dir) {
                    Some(arg) => command.arg(arg),
                    // Malformed arguments are passed through untouched.
                    None => command.arg(arg),
                };
            }

            let output = command.output()
                .map_err(|e| crate::Error::new_io_file(e, jvm_file.as_path()))?;

            if !output.status.success() {
                return Err(Error::PostProcessorFailed {
                    task,
                    code: output.status.code(),
                }.into());
            }

            // Both sides of each output mapping may be variables.
            for (file, expected) in &processor.outputs {
                let Some(file) = substitute_arg(file, &post.variables, &libraries_dir) else { continue };
                let Some(expected) = substitute_arg(expected, &post.variables, &libraries_dir) else { continue };
                let file = Path::new(&file);
                let got = file_sha1(file)?;
                if !got.eq_ignore_ascii_case(&expected) {
                    return Err(Error::PostOutputCorrupt {
                        file: file.to_path_buf().into_boxed_path(),
                        got,
                        expected,
                    }.into());
                }
            }

        }

        // Kept on failure above, for diagnosis.
        let _ = fs::remove_dir_all(&post.tmp_dir);

        watcher.on_event(Event::PostProcessed {});
        Ok(())

    }

}

/// Add the mod loader tasks around the standard ones: initialization before metadata
/// resolution, and a dedicated download phase followed by the finalization right
/// after the main jar is planned.
pub fn add_forge_tasks(seq: &mut Sequence) {
    seq.prepend_task::<standard::MetadataTask, _>(ForgeInitTask);
    seq.append_task::<standard::JarTask, _>(ForgeFinalizeTask);
    seq.prepend_task::<ForgeFinalizeTask, _>(standard::DownloadTask);
}

/// Request the promotion index, mapping `<game version>-{latest,recommended}` keys to
/// loader versions.
pub fn request_promo_versions() -> crate::Result<HashMap<String, String>> {
    let (_, document) = http::json_get(PROMO_VERSIONS_URL)?;
    standard::parse_json(document.get("promos").cloned().unwrap_or(Value::Null), PROMO_VERSIONS_URL)
}

/// Request every released loader version from the repository metadata.
pub fn request_maven_versions() -> crate::Result<Vec<String>> {
    let (_, body) = http::binary_get(MAVEN_METADATA_URL)?;
    Ok(parse_maven_versions(&String::from_utf8_lossy(&body)))
}

/// Scan the maven metadata document for `<version>` elements. This is a deliberate
/// substring scan of a schema-pinned document, not a general XML consumer.
fn parse_maven_versions(text: &str) -> Vec<String> {

    let mut versions = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("<version>") {
        rest = &rest[start + "<version>".len()..];
        let Some(end) = rest.find("</version>") else { break };
        versions.push(rest[..end].to_string());
        rest = &rest[end + "</version>".len()..];
    }

    versions

}

/// Odd installer name suffixes used by some old game versions, tried in order after
/// the plain version.
fn installer_suffixes(game_version: &str) -> &'static [&'static str] {
    match game_version {
        "1.11" => &["-1.11.x"],
        "1.10.2" | "1.10" => &["-1.10.0"],
        "1.9.4" => &["-1.9.4"],
        "1.9" => &["-1.9.0", "-1.9"],
        "1.8.9" => &["-1.8.9"],
        "1.8.8" => &["-1.8.8"],
        "1.8" => &["-1.8"],
        "1.7.10" => &["-1.7.10", "-1710ls", "-new"],
        "1.7.2" => &["-mc172"],
        _ => &[],
    }
}

/// Find a human label for the processor, from its `--task` argument or well-known
/// jar names.
fn processor_task_name(processor: &PostProcessor) -> String {
    if processor.args.len() >= 2 && processor.args[0] == "--task" {
        processor.args[1].clone()
    } else if processor.jar.group() == "net.minecraftforge" {
        match processor.jar.artifact() {
            "jarsplitter" => "JAR_SPLITTER".to_string(),
            "ForgeAutoRenamingTool" => "AUTO_RENAMING".to_string(),
            "binarypatcher" => "BINARY_PATCHER".to_string(),
            _ => "UNKNOWN".to_string(),
        }
    } else {
        "UNKNOWN".to_string()
    }
}

/// Substitute one argument or path string: `{VAR}` patterns are replaced from the
/// variables, then a full `[group:artifact:version]` result is rewritten to its path
/// under the libraries directory and a `'quoted'` result is unquoted. Returns none
/// for unknown variables or malformed input.
fn substitute_arg(input: &str, variables: &HashMap<String, String>, libraries_dir: &Path) -> Option<String> {

    let mut out = String::new();
    let mut rest = input;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let len = rest[open..].find('}')?;
        let name = &rest[open + 1..open + len];
        out.push_str(variables.get(name)?);
        rest = &rest[open + len + 1..];
    }
    out.push_str(rest);

    if out.len() >= 2 {
        if let Some(spec) = out.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let gav = spec.parse::<Gav>().ok()?;
            return Some(gav.file(libraries_dir).display().to_string());
        }
        if let Some(literal) = out.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            return Some(literal.to_string());
        }
    }

    Some(out)

}

/// Extract a single archive entry to a destination file, creating parent directories.
fn extract_archive_file<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    entry: &str,
    dst_file: &Path,
) -> crate::Result<()> {

    let mut reader = archive.by_name(entry)
        .map_err(|_| Error::InstallerEntryNotFound { entry: entry.to_string() })?;

    if let Some(parent) = dst_file.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| crate::Error::new_io_file(e, parent))?;
    }

    let mut writer = File::create(dst_file)
        .map(BufWriter::new)
        .map_err(|e| crate::Error::new_io_file(e, dst_file))?;

    io::copy(&mut reader, &mut writer)
        .map_err(|e| crate::Error::new_io_file(e, dst_file))?;

    Ok(())

}

/// From a jar file path, open it and find the main class in its manifest.
fn find_jar_main_class(jar_file: &Path) -> crate::Result<Option<String>> {

    let reader = File::open(jar_file)
        .map(BufReader::new)
        .map_err(|e| crate::Error::new_io_file(e, jar_file))?;

    let mut archive = ZipArchive::new(reader)
        .map_err(|e| crate::Error::new_zip(e, jar_file))?;

    let Ok(manifest) = archive.by_name("META-INF/MANIFEST.MF") else {
        return Ok(None);
    };

    const MAIN_CLASS_KEY: &str = "Main-Class: ";

    for line in BufReader::new(manifest).lines() {
        let line = line.map_err(|e| crate::Error::new_io_file(e, jar_file))?;
        if let Some(main_class) = line.strip_prefix(MAIN_CLASS_KEY) {
            let main_class = main_class.trim_end();
            if main_class.is_empty() {
                return Ok(None);
            }
            return Ok(Some(main_class.to_string()));
        }
    }

    Ok(None)

}

/// Compute the SHA-1 of a file, formatted as lowercase hex.
fn file_sha1(file: &Path) -> crate::Result<String> {

    let mut reader = File::open(file)
        .map(BufReader::new)
        .map_err(|e| crate::Error::new_io_file(e, file))?;

    let mut digest = Sha1::new();
    io::copy(&mut reader, &mut digest)
        .map_err(|e| crate::Error::new_io_file(e, file))?;

    Ok(crate::serde::format_hex_bytes(&digest.finalize()))

}

#[cfg(test)]
mod tests {

    use std::io::Write;
    use super::*;

    #[test]
    fn suffix_tables() {
        assert_eq!(installer_suffixes("1.7.10"), &["-1.7.10", "-1710ls", "-new"]);
        assert_eq!(installer_suffixes("1.9"), &["-1.9.0", "-1.9"]);
        assert!(installer_suffixes("1.16.5").is_empty());
    }

    #[test]
    fn maven_versions_scan() {
        let text = "<metadata><versioning><versions>\
            <version>1.16.5-36.2.39</version>\
            <version>1.7.10-10.13.4.1614-1.7.10</version>\
            </versions></versioning></metadata>";
        assert_eq!(parse_maven_versions(text), [
            "1.16.5-36.2.39",
            "1.7.10-10.13.4.1614-1.7.10",
        ]);
        assert!(parse_maven_versions("<metadata><version>truncated").is_empty());
    }

    #[test]
    fn argument_substitution() {

        let mut variables = HashMap::new();
        variables.insert("SIDE".to_string(), "client".to_string());
        variables.insert("OUT".to_string(), "/tmp/out.jar".to_string());

        let libs = Path::new("/libs");

        assert_eq!(substitute_arg("{SIDE}", &variables, libs).unwrap(), "client");
        assert_eq!(substitute_arg("--out={OUT}", &variables, libs).unwrap(), "--out=/tmp/out.jar");
        assert_eq!(substitute_arg("'{SIDE}'", &variables, libs).unwrap(), "client");
        assert_eq!(substitute_arg("plain", &variables, libs).unwrap(), "plain");
        assert_eq!(substitute_arg("{MISSING}", &variables, libs), None);
        assert_eq!(substitute_arg("{SIDE", &variables, libs), None);

        let path = substitute_arg("[foo.bar:baz:1.0]", &variables, libs).unwrap();
        assert!(path.ends_with(&["foo", "bar", "baz", "1.0", "baz-1.0.jar"].join(std::path::MAIN_SEPARATOR_STR)));

    }

    #[test]
    fn task_name_inference() {

        let mut processor = PostProcessor {
            jar: "net.minecraftforge:jarsplitter:1.0".parse().unwrap(),
            classpath: Vec::new(),
            args: Vec::new(),
            outputs: HashMap::new(),
        };

        assert_eq!(processor_task_name(&processor), "JAR_SPLITTER");

        processor.jar = "net.minecraftforge:binarypatcher:1.0".parse().unwrap();
        assert_eq!(processor_task_name(&processor), "BINARY_PATCHER");

        processor.args = vec!["--task".to_string(), "MCP_DATA".to_string()];
        assert_eq!(processor_task_name(&processor), "MCP_DATA");

        processor.args.clear();
        processor.jar = "org.example:custom:1.0".parse().unwrap();
        assert_eq!(processor_task_name(&processor), "UNKNOWN");

    }

    fn build_archive(entries: &[(&str, &[u8])]) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        ZipArchive::new(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn modern_profile_parsing() {

        let dir = tempfile::tempdir().unwrap();
        let context = Context::new(dir.path());

        let mut state = State::new();
        state.insert(context.clone());
        state.insert(DownloadList::new());

        let mut archive = build_archive(&[
            ("version.json", br#"{ "id": "whatever", "mainClass": "modded.Main" }"#),
            ("maven/org/example/embedded/1.0/embedded-1.0.jar", b"embedded jar"),
            ("data/mappings.txt", b"mappings"),
        ]);

        let profile = serde_json::json!({
            "json": "/version.json",
            "libraries": [
                {
                    "name": "org.example:embedded:1.0",
                    "downloads": { "artifact": { "url": "" } },
                },
            ],
            "processors": [
                { "jar": "net.minecraftforge:binarypatcher:1.0", "sides": ["client"] },
                { "jar": "net.minecraftforge:jarsplitter:1.0", "sides": ["server"] },
                { "jar": "org.example:any-side:1.0" },
            ],
            "data": {
                "MAPPINGS": { "client": "/data/mappings.txt", "server": "" },
                "MOJMAPS": { "client": "[net.minecraft:client:1.16.5:mappings@txt]", "server": "" },
                "SIGNATURE": { "client": "'literal'", "server": "" },
            },
        });

        let mut repository = ForgeRepository { version: "1.16.5-36.2.39".to_string() };
        let mut version = Version::new(
            "forge-1.16.5-36.2.39".to_string(),
            context.versions_dir.join("forge-1.16.5-36.2.39"));

        repository.fetch_modern(&mut version, &mut state, &mut archive, profile).unwrap();

        assert_eq!(version.metadata["mainClass"], "modded.Main");

        let post = state.get::<PostInfo>().unwrap();

        // Server-only processors are dropped, no-side ones kept.
        assert_eq!(post.processors.len(), 2);
        assert_eq!(post.processors[0].jar.artifact(), "binarypatcher");
        assert_eq!(post.processors[1].jar.artifact(), "any-side");

        // The URL-less library was extracted from the embedded maven tree.
        let embedded: Gav = "org.example:embedded:1.0".parse().unwrap();
        let embedded_file = post.libraries.get(&embedded).unwrap();
        assert_eq!(fs::read(embedded_file).unwrap(), b"embedded jar");

        // Archive-backed data entries are extracted, others kept verbatim.
        let mappings = Path::new(&post.variables["MAPPINGS"]);
        assert!(mappings.starts_with(&post.tmp_dir));
        assert_eq!(fs::read(mappings).unwrap(), b"mappings");
        assert_eq!(post.variables["MOJMAPS"], "[net.minecraft:client:1.16.5:mappings@txt]");
        assert_eq!(post.variables["SIGNATURE"], "'literal'");

    }

    #[test]
    fn legacy_profile_parsing() {

        let dir = tempfile::tempdir().unwrap();
        let context = Context::new(dir.path());

        let mut state = State::new();
        state.insert(context.clone());
        state.insert(DownloadList::new());

        let mut archive = build_archive(&[
            ("forge-universal.jar", b"universal jar"),
        ]);

        let profile = serde_json::json!({
            "install": {
                "minecraft": "1.7.10",
                "path": "net.minecraftforge:forge:1.7.10-10.13.4.1614",
                "filePath": "forge-universal.jar",
            },
            "versionInfo": {
                "id": "whatever",
                "inheritsFrom": "1.7.10",
                "libraries": [
                    { "name": "a:b:1", "serverreq": true, "clientreq": false, "checksums": ["x"] },
                ],
            },
        });

        let mut repository = ForgeRepository { version: "1.7.10-10.13.4.1614".to_string() };
        let mut version = Version::new(
            "forge-1.7.10-10.13.4.1614".to_string(),
            context.versions_dir.join("forge-1.7.10-10.13.4.1614"));

        repository.fetch_legacy(&mut version, &mut state, &mut archive, profile).unwrap();

        // The loader's own jar is extracted under its maven path.
        let jar: Gav = "net.minecraftforge:forge:1.7.10-10.13.4.1614".parse().unwrap();
        assert_eq!(fs::read(jar.file(&context.libraries_dir)).unwrap(), b"universal jar");

        // Non-standard library keys are stripped, inheritance is preserved.
        assert_eq!(version.metadata["inheritsFrom"], "1.7.10");
        let library = &version.metadata["libraries"][0];
        assert_eq!(library["name"], "a:b:1");
        assert!(library.get("serverreq").is_none());
        assert!(library.get("clientreq").is_none());
        assert!(library.get("checksums").is_none());

    }

    #[test]
    fn jar_main_class() {

        let dir = tempfile::tempdir().unwrap();
        let jar_file = dir.path().join("processor.jar");

        let mut writer = zip::ZipWriter::new(File::create(&jar_file).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
        writer.write_all(b"Manifest-Version: 1.0\r\nMain-Class: net.example.Main\r\n").unwrap();
        writer.finish().unwrap();

        assert_eq!(find_jar_main_class(&jar_file).unwrap().as_deref(), Some("net.example.Main"));

        let empty_file = dir.path().join("empty.jar");
        let mut writer = zip::ZipWriter::new(File::create(&empty_file).unwrap());
        writer.start_file("other.txt", options).unwrap();
        writer.write_all(b"nothing").unwrap();
        writer.finish().unwrap();

        assert_eq!(find_jar_main_class(&empty_file).unwrap(), None);

    }

}

//! JSON schemas structures for serde deserialization.

use std::collections::HashMap;

use crate::standard;
use crate::maven::Gav;


/// Install profile of modern installers (with a top-level `json` key), the version
/// metadata itself lives in a separate archive entry.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct ModernInstallProfile {
    /// Path, within the installer archive, of the version metadata document.
    pub json: String,
    /// Libraries required by the post-processors.
    #[serde(default)]
    pub libraries: Vec<InstallLibrary>,
    /// Post-processors used to generate the final client libraries.
    #[serde(default)]
    pub processors: Vec<InstallProcessor>,
    /// Constant data used for variable replacement in post-processor arguments.
    #[serde(default)]
    pub data: HashMap<String, InstallDataEntry>,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct InstallLibrary {
    pub name: Gav,
    pub downloads: InstallLibraryDownloads,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct InstallLibraryDownloads {
    pub artifact: standard::serde::LibraryDownload,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct InstallProcessor {
    pub jar: Gav,
    /// Sides the processor applies to, all of them when absent or empty.
    #[serde(default)]
    pub sides: Vec<InstallSide>,
    #[serde(default)]
    pub classpath: Vec<Gav>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Expected SHA-1 of produced files, both keys and values may be variables.
    #[serde(default)]
    pub outputs: HashMap<String, String>,
}

/// Per-side value of a data entry.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct InstallDataEntry {
    pub client: String,
    #[allow(unused)]
    pub server: String,
}

#[derive(serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstallSide {
    Client,
    Server,
}

/// The `install` section of legacy installers (without a top-level `json` key), the
/// version metadata lives in the profile's `versionInfo` key.
#[derive(serde::Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LegacyInstall {
    /// Specifier of the mod loader's own jar, giving its destination path under the
    /// libraries directory.
    pub path: Gav,
    /// The path, within the installer archive, where that jar is located.
    pub file_path: String,
}

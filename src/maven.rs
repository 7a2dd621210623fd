//! Maven-style library specifier, used to locate libraries in repository trees.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::fmt;

/// A maven-style library specifier, known as GAV for Group, Artifact, Version. It also
/// carries an optional classifier and extension for the pointed file, the canonical
/// string form is `group:artifact:version[:classifier][@extension]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gav {
    group: String,
    artifact: String,
    version: String,
    classifier: Option<String>,
    extension: Option<String>,
}

impl Gav {

    /// Create a new library specifier from its components, no component should be an
    /// empty string.
    pub fn new(group: &str, artifact: &str, version: &str, classifier: Option<&str>, extension: Option<&str>) -> Self {
        Self {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
            classifier: classifier.map(str::to_string),
            extension: extension.map(str::to_string),
        }
    }

    #[inline]
    pub fn group(&self) -> &str {
        &self.group
    }

    #[inline]
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Return the classifier of the library, empty if there is none.
    #[inline]
    pub fn classifier(&self) -> &str {
        self.classifier.as_deref().unwrap_or("")
    }

    pub fn set_classifier(&mut self, classifier: Option<&str>) {
        self.classifier = classifier.map(str::to_string);
    }

    /// Return the extension of the library, defaults to "jar".
    #[inline]
    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or("jar")
    }

    /// Return the repository-relative path of the file pointed by this specifier,
    /// with forward slashes, suited for URLs.
    pub fn url(&self) -> String {
        let mut buf = String::new();
        for part in self.group.split('.') {
            buf.push_str(part);
            buf.push('/');
        }
        buf.push_str(&self.artifact);
        buf.push('/');
        buf.push_str(&self.version);
        buf.push('/');
        buf.push_str(&self.file_name());
        buf
    }

    /// Return the terminal file name of this specifier,
    /// `artifact-version[-classifier].extension`.
    pub fn file_name(&self) -> String {
        let mut buf = format!("{}-{}", self.artifact, self.version);
        if let Some(classifier) = self.classifier.as_deref() {
            buf.push('-');
            buf.push_str(classifier);
        }
        buf.push('.');
        buf.push_str(self.extension());
        buf
    }

    /// Create the file path of this specifier under a base repository directory.
    pub fn file<P: AsRef<Path>>(&self, dir: P) -> PathBuf {
        let mut buf = dir.as_ref().to_path_buf();
        for part in self.group.split('.') {
            buf.push(part);
        }
        buf.push(&self.artifact);
        buf.push(&self.version);
        buf.push(self.file_name());
        buf
    }

}

impl FromStr for Gav {

    type Err = GavParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {

        let (s, extension) = match s.split_once('@') {
            Some((s, extension)) => (s, Some(extension)),
            None => (s, None),
        };

        let mut parts = s.split(':');
        let group = parts.next().unwrap_or("");
        let artifact = parts.next().unwrap_or("");
        let version = parts.next().unwrap_or("");
        let classifier = parts.next();

        if group.is_empty() || artifact.is_empty() || version.is_empty() || parts.next().is_some() {
            return Err(GavParseError);
        }

        if classifier.map(str::is_empty).unwrap_or(false) || extension.map(str::is_empty).unwrap_or(false) {
            return Err(GavParseError);
        }

        Ok(Self::new(group, artifact, version, classifier, extension))

    }

}

impl fmt::Display for Gav {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = self.classifier.as_deref() {
            write!(f, ":{classifier}")?;
        }
        if let Some(extension) = self.extension.as_deref() {
            write!(f, "@{extension}")?;
        }
        Ok(())
    }

}

/// The string is not a valid `group:artifact:version[:classifier][@extension]` form.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid gav")]
pub struct GavParseError;

impl serde::Serialize for Gav {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Gav {

    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {

        struct Visitor;
        impl serde::de::Visitor<'_> for Visitor {

            type Value = Gav;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a string gav (group:artifact:version[:classifier][@extension])")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(|_| E::custom("invalid string gav (group:artifact:version[:classifier][@extension])"))
            }

        }

        deserializer.deserialize_str(Visitor)

    }

}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn from_str_wrong() {

        const WRONG_CASES: &[&str] = &[
            "", ":", "::",
            "foo.bar::", ":baz:", "::0.1.2-beta",
            "foo.bar:baz:", "foo.bar::0.1.2-beta", ":baz:0.1.2-beta",
            "foo.bar:baz:0.1.2-beta:",
            "foo.bar:baz:0.1.2-beta@",
        ];

        for case in WRONG_CASES {
            assert_eq!(Gav::from_str(case), Err(GavParseError), "case: {case}");
        }

    }

    #[test]
    fn from_str_correct() {

        let gav = Gav::from_str("foo.bar:baz:0.1.2-beta").unwrap();
        assert_eq!(gav.group(), "foo.bar");
        assert_eq!(gav.artifact(), "baz");
        assert_eq!(gav.version(), "0.1.2-beta");
        assert_eq!(gav.classifier(), "");
        assert_eq!(gav.extension(), "jar");

        let gav = Gav::from_str("foo.bar:baz:0.1.2-beta:natives@txt").unwrap();
        assert_eq!(gav.classifier(), "natives");
        assert_eq!(gav.extension(), "txt");

    }

    #[test]
    fn display_round_trip() {
        for case in ["foo.bar:baz:0.1", "foo.bar:baz:0.1:natives", "foo.bar:baz:0.1:natives@txt", "foo.bar:baz:0.1@zip"] {
            assert_eq!(Gav::from_str(case).unwrap().to_string(), *case);
        }
    }

    #[test]
    fn file_path() {
        let gav = Gav::from_str("net.minecraftforge:forge:1.16.5-36.2.39").unwrap();
        assert_eq!(gav.url(), "net/minecraftforge/forge/1.16.5-36.2.39/forge-1.16.5-36.2.39.jar");
        let file = gav.file("/libs");
        assert!(file.ends_with("net/minecraftforge/forge/1.16.5-36.2.39/forge-1.16.5-36.2.39.jar"));
    }

}

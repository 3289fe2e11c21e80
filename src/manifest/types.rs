//! Manifest data structures.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MetarrError;

/// Filename of the manifest inside each plugin directory.
pub const MANIFEST_FILE: &str = "plugin.json";

/// Category of a plugin within the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginCategory {
    /// Produces work items (one match per item).
    Input,
    /// Enriches a match with additional data.
    Output,
}

impl PluginCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginCategory::Input => "input",
            PluginCategory::Output => "output",
        }
    }
}

impl fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A data path declared in a manifest's `expects` list.
///
/// Either a single top-level key (`renamer`) or a key plus one first-level
/// subkey (`renamer.parsed`). Segments are non-empty identifiers made of
/// alphanumerics and underscores.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataPath {
    key: String,
    subkey: Option<String>,
}

impl DataPath {
    /// Top-level key (the first path segment).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Optional first-level subkey.
    pub fn subkey(&self) -> Option<&str> {
        self.subkey.as_deref()
    }

    fn valid_segment(seg: &str) -> bool {
        !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

impl FromStr for DataPath {
    type Err = MetarrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let key = parts.next().unwrap_or_default();
        let subkey = parts.next();

        if parts.next().is_some() {
            return Err(MetarrError::Manifest(format!(
                "Invalid expects path '{}': at most two segments allowed",
                s
            )));
        }

        if !Self::valid_segment(key) || !subkey.map_or(true, Self::valid_segment) {
            return Err(MetarrError::Manifest(format!(
                "Invalid expects path '{}': segments must be non-empty identifiers",
                s
            )));
        }

        Ok(DataPath {
            key: key.to_string(),
            subkey: subkey.map(str::to_string),
        })
    }
}

impl TryFrom<String> for DataPath {
    type Error = MetarrError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DataPath> for String {
    fn from(path: DataPath) -> String {
        path.to_string()
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subkey {
            Some(sub) => write!(f, "{}.{}", self.key, sub),
            None => f.write_str(&self.key),
        }
    }
}

/// The manifest loaded from a plugin's `plugin.json` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Plugin name. Must be unique across the registry; lowercase
    /// alphanumerics with hyphens or underscores, 1-64 characters.
    pub name: String,

    /// Version string (e.g. "1.0.0").
    pub version: String,

    /// Whether this plugin produces work items or enriches them.
    pub category: PluginCategory,

    /// Optional constructor locator; when absent the loader derives it from
    /// the plugin name.
    #[serde(default)]
    pub class_hint: Option<String>,

    /// Names of output plugins that must run before this one.
    #[serde(default)]
    pub depends_on: BTreeSet<String>,

    /// Data paths that must be present in the accumulated match results for
    /// this plugin to run.
    #[serde(default)]
    pub expects: Vec<DataPath>,

    /// Media categories this plugin supports; empty means all.
    #[serde(default)]
    pub categories_supported: BTreeSet<String>,
}

impl Manifest {
    /// Validate manifest contents beyond what deserialization enforces.
    ///
    /// Checks:
    /// - name is 1-64 characters, `[a-z0-9]` with `-`/`_` separators,
    ///   starting with an alphanumeric
    /// - version is non-empty
    pub fn validate(&self) -> crate::error::Result<()> {
        let mut chars = self.name.chars();
        let head_ok = chars
            .next()
            .map(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .unwrap_or(false);
        let tail_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

        if !head_ok || !tail_ok || self.name.len() > 64 {
            return Err(MetarrError::Manifest(format!(
                "Invalid plugin name '{}': must be 1-64 lowercase alphanumerics, hyphens, or underscores, starting with an alphanumeric",
                self.name
            )));
        }

        if self.version.trim().is_empty() {
            return Err(MetarrError::Manifest(format!(
                "Plugin '{}' has an empty version string",
                self.name
            )));
        }

        Ok(())
    }
}

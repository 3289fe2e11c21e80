//! Manifest discovery and the name-indexed registry.
//!
//! The registry scans the immediate subdirectories of the plugin root for
//! `plugin.json` files, parses and validates each one, and indexes the
//! result by plugin name. Any malformed manifest or duplicate name makes
//! the whole load fail; the registry never partially loads.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{MetarrError, Result};

use super::types::{Manifest, PluginCategory, MANIFEST_FILE};

/// A validated, name-indexed set of plugin manifests.
///
/// Immutable after [`ManifestRegistry::load`]; safe to share across the
/// whole process lifetime.
#[derive(Debug, Clone, Default)]
pub struct ManifestRegistry {
    manifests: BTreeMap<String, Manifest>,
}

impl ManifestRegistry {
    /// Scan `root_dir` and load every plugin manifest beneath it.
    ///
    /// A missing root directory yields an empty registry (a fresh install
    /// has no plugins yet). Every other problem is fatal: unreadable
    /// directories, malformed JSON, validation failures, and duplicate
    /// plugin names all abort the load, with the error message naming each
    /// offending file.
    pub fn load(root_dir: &Path) -> Result<Self> {
        let mut manifests = BTreeMap::new();
        let mut problems: Vec<String> = Vec::new();

        if !root_dir.exists() {
            debug!(dir = %root_dir.display(), "Plugin directory does not exist");
            return Ok(Self { manifests });
        }

        let entries = std::fs::read_dir(root_dir).map_err(|e| {
            MetarrError::Manifest(format!(
                "Failed to read plugin directory {}: {}",
                root_dir.display(),
                e
            ))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                MetarrError::Manifest(format!("Failed to read directory entry: {}", e))
            })?;

            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }

            let manifest_path = dir.join(MANIFEST_FILE);
            if !manifest_path.exists() {
                continue;
            }

            match Self::load_one(&manifest_path) {
                Ok(manifest) => {
                    debug!(
                        plugin = %manifest.name,
                        version = %manifest.version,
                        category = %manifest.category,
                        "Discovered plugin manifest"
                    );
                    if let Some(previous) = manifests.insert(manifest.name.clone(), manifest) {
                        problems.push(format!(
                            "{}: duplicate plugin name '{}'",
                            manifest_path.display(),
                            previous.name
                        ));
                    }
                }
                Err(e) => problems.push(format!("{}: {}", manifest_path.display(), e)),
            }
        }

        if !problems.is_empty() {
            return Err(MetarrError::Manifest(problems.join("; ")));
        }

        info!(count = manifests.len(), "Loaded plugin manifests");
        Ok(Self { manifests })
    }

    fn load_one(path: &Path) -> Result<Manifest> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Look up a manifest by plugin name.
    pub fn get(&self, name: &str) -> Option<&Manifest> {
        self.manifests.get(name)
    }

    /// All manifests, ordered by plugin name.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Manifest)> {
        self.manifests.iter()
    }

    /// Names of manifests in the given category, ordered ascending.
    pub fn names_in_category(&self, category: PluginCategory) -> Vec<String> {
        self.manifests
            .values()
            .filter(|m| m.category == category)
            .map(|m| m.name.clone())
            .collect()
    }

    /// Number of registered manifests.
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Build a registry directly from manifests (test and embedding support).
    pub fn from_manifests(list: Vec<Manifest>) -> Result<Self> {
        let mut manifests = BTreeMap::new();
        for manifest in list {
            manifest.validate()?;
            let name = manifest.name.clone();
            if manifests.insert(name.clone(), manifest).is_some() {
                return Err(MetarrError::Manifest(format!(
                    "duplicate plugin name '{}'",
                    name
                )));
            }
        }
        Ok(Self { manifests })
    }
}

//! Instantiation of enabled plugins.
//!
//! For every manifest whose configuration entry carries `enabled = true`,
//! the loader resolves a constructor through the factory registry (using
//! the manifest's `class_hint`, or the name-derived convention) and invokes
//! it with the plugin's opaque config slice. Any lookup or construction
//! failure is fatal; the loader never partially loads.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{MetarrError, Result};
use crate::manifest::ManifestRegistry;

use super::{derive_class_hint, FactoryRegistry, Plugin};

/// Instantiate every enabled plugin.
///
/// Returns a name-indexed map of live plugin instances, one per manifest
/// with `enabled = true` in the configuration. Plugins without a config
/// entry are treated as disabled.
pub fn load_enabled(
    factories: &FactoryRegistry,
    registry: &ManifestRegistry,
    config: &Config,
) -> Result<BTreeMap<String, Arc<dyn Plugin>>> {
    let mut plugins: BTreeMap<String, Arc<dyn Plugin>> = BTreeMap::new();

    for (name, manifest) in registry.iter() {
        if !config.plugin_enabled(name) {
            debug!(plugin = %name, "Plugin disabled, skipping");
            continue;
        }

        let hint = manifest
            .class_hint
            .clone()
            .unwrap_or_else(|| derive_class_hint(name));

        let constructor = factories.get(&hint).ok_or_else(|| {
            MetarrError::Loader(format!(
                "No constructor registered for '{}' (plugin '{}')",
                hint, name
            ))
        })?;

        let instance = constructor(config.plugin_slice(name)).map_err(|e| {
            MetarrError::Loader(format!("Failed to construct plugin '{}': {}", name, e))
        })?;

        debug!(plugin = %name, class = %hint, "Constructed plugin");
        plugins.insert(name.clone(), instance);
    }

    info!(count = plugins.len(), "Loaded enabled plugins");
    Ok(plugins)
}

//! Plugin system for metarr
//!
//! Plugins are opaque to the engine: each one is constructed with an opaque
//! configuration value and exposes a single `execute` method. Input plugins
//! are called with an empty context and return a JSON array of work items;
//! output plugins receive a snapshot of the accumulated match results and
//! return an object whose `status` subtree (and optional top-level
//! `category`) are the only parts the engine inspects.
//!
//! # Architecture
//!
//! - **mod**: the [`Plugin`] trait, the constructor [`FactoryRegistry`], and
//!   class-hint derivation
//! - **loader**: instantiation of enabled plugins from manifests + config
//! - **scanner** / **file_reader**: built-in input plugins
//! - **renamer** / **probe** / **mock_test**: built-in output plugins
//!
//! The engine never branches on a plugin's name. The only lookup mechanism
//! is the class hint: either the manifest's `class_hint` field, or the
//! convention derived from the plugin name (`mock_test` → `MockTestPlugin`).

mod file_reader;
mod loader;
mod mock_test;
mod probe;
mod renamer;
mod scanner;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::error::Result;

pub use file_reader::FileReaderPlugin;
pub use loader::load_enabled;
pub use mock_test::MockTestPlugin;
pub use probe::ProbePlugin;
pub use renamer::RenamerPlugin;
pub use scanner::ScannerPlugin;

/// A live plugin instance.
///
/// Instances are created once at startup, shared read-only across all
/// matches, and dropped at process shutdown. Any internal caching is the
/// plugin's own concern, which is why the trait requires `Send + Sync`.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Run the plugin against the given context.
    ///
    /// Input plugins receive `{}` and return an array of work items; output
    /// plugins receive the match-results snapshot (including any
    /// previously-set top-level `category`) and return a result object.
    async fn execute(&self, context: &Value) -> Result<Value>;
}

/// Constructor signature looked up through the factory registry.
pub type PluginConstructor = fn(Value) -> Result<Arc<dyn Plugin>>;

/// Registry of plugin constructors, keyed by class hint.
///
/// Built-in plugins register themselves in [`FactoryRegistry::with_builtins`];
/// embedders can add their own constructors before loading.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, PluginConstructor>,
}

impl FactoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ScannerPlugin", scanner::construct);
        registry.register("FileReaderPlugin", file_reader::construct);
        registry.register("RenamerPlugin", renamer::construct);
        registry.register("ProbePlugin", probe::construct);
        registry.register("MockTestPlugin", mock_test::construct);
        registry
    }

    /// Register a constructor under a class hint.
    pub fn register(&mut self, hint: &str, constructor: PluginConstructor) {
        self.factories.insert(hint.to_string(), constructor);
    }

    /// Look up a constructor by class hint.
    pub fn get(&self, hint: &str) -> Option<PluginConstructor> {
        self.factories.get(hint).copied()
    }

    /// Number of registered constructors.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Derive a class hint from a plugin name.
///
/// Splits on `_` and `-`, capitalizes each part, and appends `Plugin`:
/// `mock_test` → `MockTestPlugin`, `file-reader` → `FileReaderPlugin`.
/// Manifests override this via `class_hint` (acronyms and other special
/// spellings).
pub fn derive_class_hint(name: &str) -> String {
    let mut hint = String::with_capacity(name.len() + 6);
    for part in name.split(['_', '-']).filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            hint.extend(first.to_uppercase());
            hint.push_str(chars.as_str());
        }
    }
    hint.push_str("Plugin");
    hint
}

/// Current timestamp in the format used throughout result documents.
pub(crate) fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A successful `status` subtree stamped with the given timings.
pub(crate) fn ok_status(started_at: &str, duration_ms: u64) -> Value {
    json!({
        "success": true,
        "started_at": started_at,
        "finished_at": now_stamp(),
        "duration_ms": duration_ms,
    })
}

/// A not-supported `status` subtree with a human-readable reason.
pub(crate) fn not_supported_status(started_at: &str, reason: &str) -> Value {
    json!({
        "success": false,
        "not_supported": true,
        "reason": reason,
        "started_at": started_at,
        "finished_at": now_stamp(),
        "duration_ms": 0,
    })
}

/// The `input` path string from an output-plugin context, if present.
pub(crate) fn input_path_of(context: &Value) -> Option<&str> {
    context.get("input").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_class_hint_snake_case() {
        assert_eq!(derive_class_hint("mock_test"), "MockTestPlugin");
    }

    #[test]
    fn test_derive_class_hint_kebab_case() {
        assert_eq!(derive_class_hint("file-reader"), "FileReaderPlugin");
    }

    #[test]
    fn test_derive_class_hint_single_word() {
        assert_eq!(derive_class_hint("scanner"), "ScannerPlugin");
        assert_eq!(derive_class_hint("tmdb"), "TmdbPlugin");
    }

    #[test]
    fn test_derive_class_hint_collapses_repeated_separators() {
        assert_eq!(derive_class_hint("a__b--c"), "ABCPlugin");
    }

    #[test]
    fn test_with_builtins_registers_all() {
        let registry = FactoryRegistry::with_builtins();
        for hint in [
            "ScannerPlugin",
            "FileReaderPlugin",
            "RenamerPlugin",
            "ProbePlugin",
            "MockTestPlugin",
        ] {
            assert!(registry.get(hint).is_some(), "missing builtin {}", hint);
        }
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_register_custom_constructor() {
        let mut registry = FactoryRegistry::new();
        assert!(registry.is_empty());
        registry.register("CustomPlugin", mock_test::construct);
        assert!(registry.get("CustomPlugin").is_some());
        assert!(registry.get("OtherPlugin").is_none());
    }

    #[test]
    fn test_status_helpers_shape() {
        let started = now_stamp();
        let ok = ok_status(&started, 12);
        assert_eq!(ok["success"], true);
        assert_eq!(ok["duration_ms"], 12);
        assert!(ok.get("not_supported").is_none());

        let ns = not_supported_status(&started, "no input");
        assert_eq!(ns["success"], false);
        assert_eq!(ns["not_supported"], true);
        assert_eq!(ns["reason"], "no input");
    }

    #[test]
    fn test_input_path_of() {
        let ctx = json!({ "input": "/media/a.mkv", "other": 1 });
        assert_eq!(input_path_of(&ctx), Some("/media/a.mkv"));
        assert_eq!(input_path_of(&json!({ "input": 42 })), None);
        assert_eq!(input_path_of(&json!({})), None);
    }
}

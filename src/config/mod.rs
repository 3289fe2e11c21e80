//! Configuration for metarr
//!
//! The engine is driven by a single JSON configuration file with three
//! sections:
//!
//! - `options`: engine-level switches (dry-run, debug, hardlink placement,
//!   worker pool size, per-plugin timeout, plugin root directory)
//! - `plugins`: one entry per plugin name with an `enabled` flag; every other
//!   key in the entry is opaque to the engine and handed to the plugin
//!   constructor unchanged
//! - `tasks`: an ordered list of user-defined output tasks (print / save /
//!   summary)
//!
//! The raw document is kept alongside the typed view so the response can
//! carry a verbatim snapshot of the load-time configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MetarrError, Result};

/// Default configuration filename looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "metarr.json";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine-level options.
    pub options: Options,

    /// Per-plugin settings, keyed by plugin name.
    pub plugins: BTreeMap<String, PluginSettings>,

    /// Ordered list of output tasks.
    pub tasks: Vec<TaskConfig>,

    /// The raw document as loaded, snapshotted verbatim into the response.
    #[serde(skip)]
    pub raw: Value,
}

/// Engine-level options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// When true, save tasks record their would-be destination without
    /// touching the filesystem.
    pub dry_run: bool,

    /// Emit structured diagnostic events for every executor state change.
    pub debug: bool,

    /// Place files via hardlink instead of move in save tasks.
    pub hardlink: bool,

    /// Bound on concurrent plugin invocations within one execution group.
    /// `None` runs every ready plugin in the group at once.
    pub worker_pool_size: Option<usize>,

    /// Per-plugin deadline in milliseconds. `0` disables the timeout.
    pub plugin_timeout_ms: u64,

    /// Root directory scanned for plugin manifests.
    pub plugins_dir: PathBuf,

    /// Optional path the final response document is persisted to.
    pub report_path: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dry_run: true,
            debug: false,
            hardlink: false,
            worker_pool_size: None,
            plugin_timeout_ms: 0,
            plugins_dir: PathBuf::from("plugins"),
            report_path: None,
        }
    }
}

/// Settings for a single plugin.
///
/// Only `enabled` is interpreted by the engine; the flattened remainder is
/// the plugin's opaque configuration slice, passed to its constructor
/// unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginSettings {
    /// The opaque configuration slice handed to the plugin constructor.
    pub fn slice(&self) -> Value {
        Value::Object(self.extra.clone())
    }
}

/// Kind of a user-defined task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Render a template and emit it on the user-output stream.
    Print,
    /// Render a destination and place the match's input file there.
    Save,
    /// Like print, but fires only once, on the last match of the batch.
    Summary,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Print => "print",
            TaskKind::Save => "save",
            TaskKind::Summary => "summary",
        }
    }
}

/// A user-defined output task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name, used in outcome records and logs.
    pub name: String,

    /// Task kind.
    #[serde(rename = "type")]
    pub kind: TaskKind,

    /// Optional template expression; a falsy rendering skips the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Body template (print / summary output text).
    #[serde(default)]
    pub template: String,

    /// Destination template for save tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// - `MetarrError::Config` if the file does not exist or is not valid
    ///   JSON for the expected shape.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MetarrError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            MetarrError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_str(&content)
    }

    /// Parse configuration from a JSON string.
    pub fn from_str(content: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(content)
            .map_err(|e| MetarrError::Config(format!("Invalid configuration JSON: {}", e)))?;

        let mut config: Config = serde_json::from_value(raw.clone())
            .map_err(|e| MetarrError::Config(format!("Invalid configuration: {}", e)))?;
        config.raw = raw;

        Ok(config)
    }

    /// Whether the named plugin is enabled.
    pub fn plugin_enabled(&self, name: &str) -> bool {
        self.plugins.get(name).map(|s| s.enabled).unwrap_or(false)
    }

    /// The opaque config slice for the named plugin (empty object when the
    /// plugin has no entry).
    pub fn plugin_slice(&self, name: &str) -> Value {
        self.plugins
            .get(name)
            .map(|s| s.slice())
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Verbatim snapshot of the load-time configuration for the response.
    pub fn snapshot(&self) -> Value {
        if self.raw.is_object() {
            self.raw.clone()
        } else {
            // Config built in code rather than loaded from a file.
            serde_json::to_value(self).unwrap_or(Value::Null)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"{
        "options": {
            "dry_run": false,
            "debug": true,
            "plugin_timeout_ms": 5000,
            "plugins_dir": "my_plugins"
        },
        "plugins": {
            "scanner": { "enabled": true, "targets": ["/media"] },
            "renamer": { "enabled": true },
            "tmdb": { "enabled": false, "api_key": "secret" }
        },
        "tasks": [
            { "name": "report", "type": "print", "template": "$renamer.parsed.title" },
            { "name": "place", "type": "save", "destination": "/library/$renamer.parsed.title.mkv" },
            { "name": "totals", "type": "summary", "template": "done" }
        ]
    }"#;

    #[test]
    fn test_load_sample_config() {
        let config = Config::from_str(SAMPLE).unwrap();
        assert!(!config.options.dry_run);
        assert!(config.options.debug);
        assert_eq!(config.options.plugin_timeout_ms, 5000);
        assert_eq!(config.options.plugins_dir, PathBuf::from("my_plugins"));
        assert_eq!(config.plugins.len(), 3);
        assert_eq!(config.tasks.len(), 3);
        assert_eq!(config.tasks[0].kind, TaskKind::Print);
        assert_eq!(config.tasks[1].kind, TaskKind::Save);
        assert_eq!(config.tasks[2].kind, TaskKind::Summary);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = Config::from_str("{}").unwrap();
        assert!(config.options.dry_run);
        assert!(!config.options.debug);
        assert!(!config.options.hardlink);
        assert!(config.options.worker_pool_size.is_none());
        assert_eq!(config.options.plugin_timeout_ms, 0);
        assert_eq!(config.options.plugins_dir, PathBuf::from("plugins"));
        assert!(config.plugins.is_empty());
        assert!(config.tasks.is_empty());
    }

    #[test]
    fn test_plugin_enabled() {
        let config = Config::from_str(SAMPLE).unwrap();
        assert!(config.plugin_enabled("scanner"));
        assert!(!config.plugin_enabled("tmdb"));
        assert!(!config.plugin_enabled("nonexistent"));
    }

    #[test]
    fn test_plugin_slice_excludes_enabled_flag() {
        let config = Config::from_str(SAMPLE).unwrap();
        let slice = config.plugin_slice("scanner");
        assert_eq!(slice["targets"], json!(["/media"]));
        assert!(slice.get("enabled").is_none());
    }

    #[test]
    fn test_plugin_slice_for_unknown_plugin_is_empty_object() {
        let config = Config::from_str(SAMPLE).unwrap();
        assert_eq!(config.plugin_slice("nonexistent"), json!({}));
    }

    #[test]
    fn test_opaque_keys_pass_through() {
        let config = Config::from_str(SAMPLE).unwrap();
        let slice = config.plugin_slice("tmdb");
        assert_eq!(slice["api_key"], "secret");
    }

    #[test]
    fn test_snapshot_is_verbatim() {
        let config = Config::from_str(SAMPLE).unwrap();
        let snapshot = config.snapshot();
        assert_eq!(snapshot["options"]["debug"], json!(true));
        assert_eq!(snapshot["plugins"]["tmdb"]["api_key"], "secret");
        assert_eq!(snapshot["tasks"][0]["name"], "report");
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let result = Config::from_str("{ broken");
        assert!(matches!(result, Err(MetarrError::Config(_))));
    }

    #[test]
    fn test_unknown_task_type_rejected() {
        let result = Config::from_str(
            r#"{ "tasks": [ { "name": "x", "type": "upload", "template": "" } ] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/metarr.json"));
        assert!(matches!(result, Err(MetarrError::Config(_))));
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_load_from_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metarr.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.plugin_enabled("renamer"));
    }
}

//! Canonical response assembly
//!
//! Folds processed matches into the aggregated response document. The
//! assembler is strictly plugin-agnostic: every plugin result is copied
//! into `matches[i].plugins` verbatim, and the only fields it computes are
//! the core-owned per-match globals and the batch-level status and summary.
//!
//! Plugin maps are keyed maps with deterministic (sorted) key order, so the
//! same inputs always serialize to the same document.
//!
//! Document shape:
//!
//! ```text
//! {
//!   globals: {
//!     status:  { success, started_at, finished_at, duration_ms,
//!                matches, tasks, errors },
//!     summary: { input_plugin_used, output_plugins_used, categories,
//!                total_size_bytes, total_duration_seconds },
//!     config:  <verbatim load-time configuration>
//!   },
//!   matches: [
//!     { globals: { index, input_path, category?, status, output: { tasks } },
//!       plugins: { <plugin_name>: <verbatim plugin_result>, ... } },
//!     ...
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Config;
use crate::executor::{Match, MatchStatus};
use crate::manifest::ManifestRegistry;
use crate::tasks::TaskOutcome;

/// Conventional payload key summed into `summary.total_size_bytes`.
const SIZE_KEY: &str = "size_bytes";
/// Conventional payload key summed into `summary.total_duration_seconds`.
const DURATION_KEY: &str = "duration_seconds";

/// Batch-level status block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStatus {
    pub success: bool,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
    pub matches: usize,
    pub tasks: usize,
    /// Number of matches with at least one failed plugin. Not-supported
    /// outcomes never count here.
    pub errors: usize,
}

/// Batch-level summary block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    /// First enabled input plugin by name.
    pub input_plugin_used: Option<String>,
    /// Sorted names of enabled output plugins.
    pub output_plugins_used: Vec<String>,
    /// Sorted union of `categories_supported` across enabled plugins.
    pub categories: Vec<String>,
    pub total_size_bytes: u64,
    pub total_duration_seconds: f64,
}

/// Batch-level globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseGlobals {
    pub status: GlobalStatus,
    pub summary: Summary,
    pub config: Value,
}

/// Core-owned per-match globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchGlobals {
    pub index: usize,
    pub input_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub status: MatchStatus,
    pub output: MatchOutput,
}

/// Task outcomes attached to one match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchOutput {
    pub tasks: Vec<TaskOutcome>,
}

/// One match in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEntry {
    pub globals: MatchGlobals,
    pub plugins: Map<String, Value>,
}

/// The canonical aggregated document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub globals: ResponseGlobals,
    pub matches: Vec<MatchEntry>,
}

impl Response {
    /// The document as a JSON value (task templates render against this).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Builds the response incrementally as matches complete.
pub struct ResponseBuilder {
    config_snapshot: Value,
    input_plugin_used: Option<String>,
    output_plugins_used: Vec<String>,
    categories: Vec<String>,
    started_at: String,
    t0: Instant,
}

impl ResponseBuilder {
    /// Capture the batch-level facts that do not depend on matches.
    pub fn new(
        config: &Config,
        registry: &ManifestRegistry,
        input_plugins: &[String],
        output_plugins: &[String],
    ) -> Self {
        let mut categories: BTreeSet<String> = BTreeSet::new();
        for name in input_plugins.iter().chain(output_plugins) {
            if let Some(manifest) = registry.get(name) {
                categories.extend(manifest.categories_supported.iter().cloned());
            }
        }

        Self {
            config_snapshot: config.snapshot(),
            input_plugin_used: input_plugins.first().cloned(),
            output_plugins_used: output_plugins.to_vec(),
            categories: categories.into_iter().collect(),
            started_at: crate::plugins::now_stamp(),
            t0: Instant::now(),
        }
    }

    /// Fold the matches processed so far into a full document.
    ///
    /// `tasks` is the number of task outcomes that actually fired; callable
    /// repeatedly, so tasks can render against the response-in-progress.
    pub fn build(&self, matches: &[Match], tasks: usize) -> Response {
        let mut entries = Vec::with_capacity(matches.len());
        let mut errors = 0usize;
        let mut total_size_bytes = 0u64;
        let mut total_duration_seconds = 0f64;

        for m in matches {
            if !m.status.failed_plugins.is_empty() {
                errors += 1;
            }

            for value in m.results.values() {
                if let Value::Object(payload) = value {
                    if let Some(size) = payload.get(SIZE_KEY).and_then(Value::as_u64) {
                        total_size_bytes += size;
                    }
                    if let Some(secs) = payload.get(DURATION_KEY).and_then(Value::as_f64) {
                        total_duration_seconds += secs;
                    }
                }
            }

            entries.push(MatchEntry {
                globals: MatchGlobals {
                    index: m.index,
                    input_path: m.input_path.clone(),
                    category: m.category.clone(),
                    status: m.status.clone(),
                    output: MatchOutput {
                        tasks: m.task_outcomes.clone(),
                    },
                },
                plugins: m.results.clone(),
            });
        }

        Response {
            globals: ResponseGlobals {
                status: GlobalStatus {
                    success: errors == 0,
                    started_at: self.started_at.clone(),
                    finished_at: crate::plugins::now_stamp(),
                    duration_ms: self.t0.elapsed().as_millis() as u64,
                    matches: matches.len(),
                    tasks,
                    errors,
                },
                summary: Summary {
                    input_plugin_used: self.input_plugin_used.clone(),
                    output_plugins_used: self.output_plugins_used.clone(),
                    categories: self.categories.clone(),
                    total_size_bytes,
                    total_duration_seconds,
                },
                config: self.config_snapshot.clone(),
            },
            matches: entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use serde_json::json;

    fn registry() -> ManifestRegistry {
        let manifests: Vec<Manifest> = vec![
            serde_json::from_value(json!({
                "name": "scanner", "version": "1", "category": "input",
                "categories_supported": ["movie"]
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "name": "renamer", "version": "1", "category": "output",
                "categories_supported": ["show", "movie"]
            }))
            .unwrap(),
        ];
        ManifestRegistry::from_manifests(manifests).unwrap()
    }

    fn builder() -> ResponseBuilder {
        let config = Config::from_str(r#"{ "options": { "debug": true } }"#).unwrap();
        ResponseBuilder::new(
            &config,
            &registry(),
            &["scanner".to_string()],
            &["renamer".to_string()],
        )
    }

    fn match_with(index: usize, results: Value, failed: Vec<String>) -> Match {
        let mut m = Match::from_item(results).unwrap();
        m.index = index;
        m.status.failed_plugins = failed;
        m.status.success = m.status.failed_plugins.is_empty();
        m
    }

    #[test]
    fn test_empty_batch_succeeds() {
        let response = builder().build(&[], 0);
        assert!(response.globals.status.success);
        assert_eq!(response.globals.status.matches, 0);
        assert_eq!(response.globals.status.errors, 0);
        assert!(response.matches.is_empty());
    }

    #[test]
    fn test_errors_count_matches_not_invocations() {
        let matches = vec![
            match_with(
                0,
                json!({ "input": "/a" }),
                vec!["x".to_string(), "y".to_string()],
            ),
            match_with(1, json!({ "input": "/b" }), vec![]),
        ];

        let response = builder().build(&matches, 0);
        // Two failed invocations in one match count as one error.
        assert_eq!(response.globals.status.errors, 1);
        assert!(!response.globals.status.success);
    }

    #[test]
    fn test_not_supported_contributes_no_errors() {
        let mut m = match_with(0, json!({ "input": "/a" }), vec![]);
        m.status.not_supported_plugins = vec!["skip".to_string()];

        let response = builder().build(&[m], 0);
        assert_eq!(response.globals.status.errors, 0);
        assert!(response.globals.status.success);
    }

    #[test]
    fn test_plugin_results_copied_verbatim() {
        let payload = json!({
            "status": { "success": true, "validation": { "warnings": [1, 2] } },
            "anything": { "deep": [true, null, "x"] },
        });
        let m = match_with(
            0,
            json!({ "probe": payload.clone(), "input": "/a" }),
            vec![],
        );

        let response = builder().build(&[m], 0);
        assert_eq!(response.matches[0].plugins["probe"], payload);
    }

    #[test]
    fn test_summary_totals_read_conventional_keys() {
        let m = match_with(
            0,
            json!({
                "probe": { "status": { "success": true }, "size_bytes": 1000 },
                "media": { "status": { "success": true }, "duration_seconds": 120.5 },
                "other": { "status": { "success": true } },
                "input": "/a",
            }),
            vec![],
        );
        let m2 = match_with(
            1,
            json!({
                "probe": { "status": { "success": true }, "size_bytes": 24 },
                "input": "/b",
            }),
            vec![],
        );

        let response = builder().build(&[m, m2], 0);
        assert_eq!(response.globals.summary.total_size_bytes, 1024);
        assert!((response.globals.summary.total_duration_seconds - 120.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_identity_fields() {
        let response = builder().build(&[], 0);
        let summary = &response.globals.summary;
        assert_eq!(summary.input_plugin_used.as_deref(), Some("scanner"));
        assert_eq!(summary.output_plugins_used, vec!["renamer"]);
        assert_eq!(summary.categories, vec!["movie", "show"]);
    }

    #[test]
    fn test_config_snapshot_embedded() {
        let response = builder().build(&[], 0);
        assert_eq!(response.globals.config["options"]["debug"], json!(true));
    }

    #[test]
    fn test_matches_keep_input_order() {
        let matches = vec![
            match_with(0, json!({ "input": "/a" }), vec![]),
            match_with(1, json!({ "input": "/b" }), vec![]),
            match_with(2, json!({ "input": "/c" }), vec![]),
        ];
        let response = builder().build(&matches, 0);
        let order: Vec<usize> = response.matches.iter().map(|e| e.globals.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_category_serialized_only_when_set() {
        let mut m = match_with(0, json!({ "input": "/a" }), vec![]);
        m.category = Some("movie".to_string());
        let with = builder().build(&[m], 0).to_value();
        assert_eq!(with["matches"][0]["globals"]["category"], "movie");

        let m = match_with(0, json!({ "input": "/a" }), vec![]);
        let without = builder().build(&[m], 0).to_value();
        assert!(without["matches"][0]["globals"].get("category").is_none());
    }

    #[test]
    fn test_task_counter_passthrough() {
        let response = builder().build(&[], 7);
        assert_eq!(response.globals.status.tasks, 7);
    }
}

//! Per-match mutable state.
//!
//! A [`Match`] is one unit of work: the seed item produced by an input
//! plugin plus everything output plugins accumulate on top of it. The
//! executor owns a match exclusively while processing it, so no locking
//! happens inside a match; it is sealed before task execution and then
//! emitted into the response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::tasks::TaskOutcome;

/// How a single plugin invocation turned out.
///
/// Not-supported is a first-class outcome: the plugin had nothing to do for
/// this match. It never counts as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    NotSupported,
    Failed,
}

/// Classify a plugin result by its `status` subtree.
///
/// `status.success = true` wins; otherwise `status.not_supported = true`
/// means not-supported; anything else (including a missing status) is a
/// failure.
pub fn classify(result: &Value) -> Outcome {
    let status = result.get("status");

    let flag = |key: &str| {
        status
            .and_then(|s| s.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };

    if flag("success") {
        Outcome::Success
    } else if flag("not_supported") {
        Outcome::NotSupported
    } else {
        Outcome::Failed
    }
}

/// Core-owned status of one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStatus {
    pub success: bool,
    pub success_plugins: Vec<String>,
    pub failed_plugins: Vec<String>,
    pub not_supported_plugins: Vec<String>,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
}

impl Default for MatchStatus {
    fn default() -> Self {
        Self {
            success: true,
            success_plugins: Vec::new(),
            failed_plugins: Vec::new(),
            not_supported_plugins: Vec::new(),
            started_at: String::new(),
            finished_at: String::new(),
            duration_ms: 0,
        }
    }
}

/// One unit of work in the batch.
#[derive(Debug, Clone)]
pub struct Match {
    /// 0-based position in the batch.
    pub index: usize,

    /// Opaque work-item identifier, used for logging and tasks only.
    pub input_path: String,

    /// Accumulated plugin results, keyed by plugin name (plus whatever keys
    /// the seeding input item carried).
    pub results: Map<String, Value>,

    /// Category signal propagated from plugin results.
    pub category: Option<String>,

    /// Core-owned outcome bookkeeping.
    pub status: MatchStatus,

    /// Outcomes of user tasks executed for this match.
    pub task_outcomes: Vec<TaskOutcome>,
}

impl Match {
    /// Build a match from one input-plugin work item.
    ///
    /// The entire item map seeds `results`; `input_path` is read from the
    /// item's `input` key when it is a string. Non-object items are not
    /// valid work items.
    pub fn from_item(item: Value) -> Option<Self> {
        let Value::Object(results) = item else {
            return None;
        };

        let input_path = results
            .get("input")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(Self {
            index: 0,
            input_path,
            results,
            category: None,
            status: MatchStatus::default(),
            task_outcomes: Vec::new(),
        })
    }

    /// Snapshot of the results map handed to an output plugin, including
    /// the previously-set category signal.
    pub fn snapshot(&self) -> Value {
        let mut map = self.results.clone();
        if let Some(category) = &self.category {
            map.insert("category".to_string(), Value::String(category.clone()));
        }
        Value::Object(map)
    }

    /// Splice a plugin result into the match.
    ///
    /// Classifies the outcome, propagates a top-level `category` string if
    /// present (plugin-agnostic: no name check), and stores the result
    /// verbatim under the plugin's name.
    pub fn absorb(&mut self, name: String, result: Value) {
        match classify(&result) {
            Outcome::Success => self.status.success_plugins.push(name.clone()),
            Outcome::NotSupported => self.status.not_supported_plugins.push(name.clone()),
            Outcome::Failed => self.status.failed_plugins.push(name.clone()),
        }

        if let Some(category) = result.get("category").and_then(Value::as_str) {
            debug!(index = self.index, plugin = %name, category = %category, "Category propagated");
            self.category = Some(category.to_string());
        }

        self.results.insert(name, result);
    }

    /// Seal the match after the output phase: stamp timing and derive the
    /// overall success flag.
    pub fn seal(&mut self, started_at: String, finished_at: String, duration_ms: u64) {
        self.status.started_at = started_at;
        self.status.finished_at = finished_at;
        self.status.duration_ms = duration_ms;
        self.status.success = self.status.failed_plugins.is_empty();
    }
}

//! Task execution
//!
//! After each match completes its output phase, the task runner walks the
//! user-defined tasks in configuration order and records one
//! [`TaskOutcome`] per task, whether it fired, failed, or was skipped.
//!
//! - `print` renders its template and emits it on the user-output stream
//! - `save` renders a destination and places the match's input file there
//!   (move or hardlink per configuration; dry-run records the destination
//!   without touching the filesystem)
//! - `summary` behaves like print but fires exactly once, on the last match
//!   of the batch, after that match's non-summary tasks
//!
//! Task errors never escape the runner; they land in the outcome record.

mod template;

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{Config, TaskConfig, TaskKind};
use crate::error::{MetarrError, Result};

pub use template::{truthy, TemplateEngine};

/// Outcome of one task for one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub success: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl TaskOutcome {
    fn skipped(task: &TaskConfig) -> Self {
        Self {
            name: task.name.clone(),
            kind: task.kind,
            success: true,
            skipped: true,
            rendered: None,
            destination: None,
            dry_run: None,
            error: None,
        }
    }
}

/// Executes user tasks against the response-in-progress.
pub struct TaskRunner {
    tasks: Vec<TaskConfig>,
    engine: TemplateEngine,
    dry_run: bool,
    hardlink: bool,
}

impl TaskRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            tasks: config.tasks.clone(),
            engine: TemplateEngine::new(),
            dry_run: config.options.dry_run,
            hardlink: config.options.hardlink,
        }
    }

    /// Run every task for the match at `index`.
    ///
    /// Non-summary tasks run first in configuration order; summary tasks
    /// follow, and only when `is_last` is set. One outcome is recorded per
    /// task regardless of skip, success, or failure.
    pub fn run_for_match(
        &self,
        response: &Value,
        index: usize,
        is_last: bool,
        input_path: &str,
    ) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());

        let (regular, summary): (Vec<&TaskConfig>, Vec<&TaskConfig>) = self
            .tasks
            .iter()
            .partition(|t| t.kind != TaskKind::Summary);

        for task in regular {
            outcomes.push(self.run_task(task, response, index, input_path));
        }

        for task in summary {
            if is_last {
                outcomes.push(self.run_task(task, response, index, input_path));
            } else {
                debug!(task = %task.name, index, "Summary task deferred to last match");
                outcomes.push(TaskOutcome::skipped(task));
            }
        }

        outcomes
    }

    fn run_task(
        &self,
        task: &TaskConfig,
        response: &Value,
        index: usize,
        input_path: &str,
    ) -> TaskOutcome {
        if !self
            .engine
            .evaluate_condition(task.condition.as_deref(), response, index)
        {
            debug!(task = %task.name, index, "Condition not met, skipping");
            return TaskOutcome::skipped(task);
        }

        debug!(task = %task.name, kind = %task.kind.as_str(), index, "Running task");

        match task.kind {
            TaskKind::Print | TaskKind::Summary => self.run_print(task, response, index),
            TaskKind::Save => self.run_save(task, response, index, input_path),
        }
    }

    fn run_print(&self, task: &TaskConfig, response: &Value, index: usize) -> TaskOutcome {
        let rendered = self.engine.render(&task.template, response, index);

        // stdout's lock keeps task output line-atomic alongside plugin logs.
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let write_result = writeln!(lock, "{}", rendered);

        TaskOutcome {
            name: task.name.clone(),
            kind: task.kind,
            success: write_result.is_ok(),
            skipped: false,
            rendered: Some(rendered),
            destination: None,
            dry_run: None,
            error: write_result.err().map(|e| e.to_string()),
        }
    }

    fn run_save(
        &self,
        task: &TaskConfig,
        response: &Value,
        index: usize,
        input_path: &str,
    ) -> TaskOutcome {
        let mut outcome = TaskOutcome {
            name: task.name.clone(),
            kind: task.kind,
            success: false,
            skipped: false,
            rendered: None,
            destination: None,
            dry_run: Some(self.dry_run),
            error: None,
        };

        let Some(destination_template) = task.destination.as_deref() else {
            outcome.error = Some("save task has no destination template".to_string());
            return outcome;
        };

        let destination = self.engine.render(destination_template, response, index);
        if destination.trim().is_empty() {
            outcome.error = Some("destination rendered empty".to_string());
            return outcome;
        }

        if self.dry_run {
            outcome.destination = Some(destination);
            outcome.success = true;
            return outcome;
        }

        if input_path.is_empty() {
            outcome.error = Some("match has no input path to place".to_string());
            return outcome;
        }

        match self.place(Path::new(input_path), Path::new(&destination)) {
            Ok(final_destination) => {
                outcome.destination = Some(final_destination.to_string_lossy().into_owned());
                outcome.success = true;
            }
            Err(e) => {
                warn!(task = %task.name, error = %e, "Save task failed");
                outcome.destination = Some(destination);
                outcome.error = Some(e.to_string());
            }
        }

        outcome
    }

    /// Place `source` at `destination`, hardlinking or moving per config.
    ///
    /// An existing target gets a ` (N)` stem suffix instead of being
    /// clobbered. Returns the path actually written.
    fn place(&self, source: &Path, destination: &Path) -> Result<PathBuf> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let target = unique_path(destination);

        if self.hardlink {
            std::fs::hard_link(source, &target)?;
        } else if let Err(rename_err) = std::fs::rename(source, &target) {
            // Cross-device moves fall back to copy + remove.
            std::fs::copy(source, &target).map_err(|_| MetarrError::Io(rename_err))?;
            std::fs::remove_file(source)?;
        }

        Ok(target)
    }
}

/// First non-existing variant of `path`, adding ` (1)`, ` (2)`, … to the
/// file stem.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for i in 1.. {
        let name = match &extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

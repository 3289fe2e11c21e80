//! Batch orchestration
//!
//! Wires the startup phases (manifest discovery, plugin loading, edge
//! validation, plan layering) and drives the batch: input phase, per-match
//! output phase, task execution against the response-in-progress, and
//! final response assembly.
//!
//! Matches are processed serially in input order; the response therefore
//! lists them in that order structurally, with no buffering needed.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{MetarrError, Result};
use crate::executor::PipelineExecutor;
use crate::manifest::{ManifestRegistry, PluginCategory};
use crate::plugins::{load_enabled, FactoryRegistry};
use crate::response::{Response, ResponseBuilder};
use crate::tasks::TaskRunner;

/// Result of one batch run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The assembled response; partial when the batch was aborted.
    pub response: Response,
    /// Whether an external abort ended the batch early.
    pub aborted: bool,
}

impl RunOutcome {
    /// Process exit code per the response contents.
    pub fn exit_code(&self) -> i32 {
        if self.aborted {
            3
        } else if self.response.globals.status.success {
            0
        } else {
            1
        }
    }
}

/// Run a full batch with the built-in plugin factories.
pub async fn run_batch(config: &Config, abort: watch::Receiver<bool>) -> Result<RunOutcome> {
    run_batch_with(FactoryRegistry::with_builtins(), config, abort).await
}

/// Run a full batch with a caller-supplied factory registry.
pub async fn run_batch_with(
    factories: FactoryRegistry,
    config: &Config,
    abort: watch::Receiver<bool>,
) -> Result<RunOutcome> {
    // Startup: discover, load, validate, plan. All failures here are fatal.
    let registry = ManifestRegistry::load(&config.options.plugins_dir)?;
    let plugins = load_enabled(&factories, &registry, config)?;

    let enabled: std::collections::BTreeSet<String> = plugins.keys().cloned().collect();
    crate::resolver::validate_edges(&registry, &enabled)?;

    let enabled_outputs: Vec<String> = registry
        .names_in_category(PluginCategory::Output)
        .into_iter()
        .filter(|name| enabled.contains(name))
        .collect();
    let plan = crate::resolver::plan(&registry, &enabled_outputs)?;
    debug!(groups = ?plan.groups(), "Execution plan ready");

    let executor = PipelineExecutor::new(registry.clone(), plugins, plan, &config.options, abort);
    let builder = ResponseBuilder::new(
        config,
        &registry,
        &executor.input_plugin_names(),
        &enabled_outputs,
    );
    let task_runner = TaskRunner::new(config);

    // Input phase.
    let matches = executor.collect_matches().await?;
    info!(count = matches.len(), "Batch collected");

    // Output phase, serial across matches.
    let total = matches.len();
    let mut processed = Vec::with_capacity(total);
    let mut fired_tasks = 0usize;
    let mut aborted = false;

    for (position, mut m) in matches.into_iter().enumerate() {
        match executor.process_match(&mut m).await {
            Ok(()) => {}
            Err(MetarrError::Aborted) => {
                warn!(index = m.index, "Batch aborted; dropping unfinished matches");
                aborted = true;
                break;
            }
            Err(e) => return Err(e),
        }

        // Tasks see the response as it stands with this match included.
        processed.push(m);
        let is_last = position + 1 == total;
        let snapshot = builder.build(&processed, fired_tasks).to_value();
        let current = processed.last_mut().expect("just pushed");
        let outcomes =
            task_runner.run_for_match(&snapshot, current.index, is_last, &current.input_path);
        fired_tasks += outcomes.iter().filter(|o| !o.skipped).count();
        current.task_outcomes = outcomes;
    }

    let response = builder.build(&processed, fired_tasks);
    Ok(RunOutcome { response, aborted })
}

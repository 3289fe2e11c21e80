//! Pipeline executor
//!
//! Drives a batch end to end: the input phase asks every enabled input
//! plugin for work items and seeds one [`Match`] per item; the output phase
//! walks the execution plan for each match, running ready plugins of each
//! group concurrently and carrying plugins with unsatisfied `expects`
//! forward to the next group.
//!
//! Isolation guarantees at the plugin boundary:
//! - an `execute` error, a panic inside the plugin task, or a deadline hit
//!   becomes a failed outcome with a synthesized status; the group, match,
//!   and batch continue
//! - plugins left deferred when groups run out are tagged not-supported
//!   with reason `expects unsatisfied`
//! - an external abort signal cancels in-flight plugin tasks and ends the
//!   batch; completed matches are kept
//!
//! The executor never branches on a plugin's name; ordering is always by
//! name for determinism.

mod match_state;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Options;
use crate::error::{MetarrError, Result};
use crate::manifest::{ManifestRegistry, PluginCategory};
use crate::plugins::Plugin;
use crate::resolver::{availability, expects_satisfied, ExecutionPlan};

pub use match_state::{classify, Match, MatchStatus, Outcome};

/// Reason recorded on plugins that never ran because their expected data
/// paths never appeared.
pub const EXPECTS_UNSATISFIED: &str = "expects unsatisfied";

/// Executes the pipeline for one batch.
pub struct PipelineExecutor {
    registry: ManifestRegistry,
    input_plugins: BTreeMap<String, Arc<dyn Plugin>>,
    output_plugins: BTreeMap<String, Arc<dyn Plugin>>,
    plan: ExecutionPlan,
    timeout: Option<Duration>,
    semaphore: Option<Arc<Semaphore>>,
    abort: watch::Receiver<bool>,
}

impl PipelineExecutor {
    /// Build an executor from loaded plugins and a resolved plan.
    pub fn new(
        registry: ManifestRegistry,
        plugins: BTreeMap<String, Arc<dyn Plugin>>,
        plan: ExecutionPlan,
        options: &Options,
        abort: watch::Receiver<bool>,
    ) -> Self {
        let mut input_plugins = BTreeMap::new();
        let mut output_plugins = BTreeMap::new();

        for (name, plugin) in plugins {
            match registry.get(&name).map(|m| m.category) {
                Some(PluginCategory::Input) => {
                    input_plugins.insert(name, plugin);
                }
                Some(PluginCategory::Output) | None => {
                    output_plugins.insert(name, plugin);
                }
            }
        }

        let timeout = match options.plugin_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let semaphore = options
            .worker_pool_size
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        Self {
            registry,
            input_plugins,
            output_plugins,
            plan,
            timeout,
            semaphore,
            abort,
        }
    }

    /// Names of enabled input plugins, ascending.
    pub fn input_plugin_names(&self) -> Vec<String> {
        self.input_plugins.keys().cloned().collect()
    }

    /// Names of enabled output plugins, ascending.
    pub fn output_plugin_names(&self) -> Vec<String> {
        self.output_plugins.keys().cloned().collect()
    }

    fn aborted(&self) -> bool {
        *self.abort.borrow()
    }

    /// Input phase: run every enabled input plugin and seed matches.
    ///
    /// Plugins run serially in name order; item order within a plugin is
    /// preserved. A faulting input plugin contributes zero items and does
    /// not end the batch.
    pub async fn collect_matches(&self) -> Result<Vec<Match>> {
        let mut matches = Vec::new();
        let empty = json!({});

        for (name, plugin) in &self.input_plugins {
            if self.aborted() {
                return Err(MetarrError::Aborted);
            }

            debug!(plugin = %name, "Running input plugin");
            let items = match plugin.execute(&empty).await {
                Ok(Value::Array(items)) => items,
                Ok(_) => {
                    warn!(plugin = %name, "Input plugin returned a non-array result, ignoring");
                    continue;
                }
                Err(e) => {
                    warn!(plugin = %name, error = %e, "Input plugin failed, ignoring");
                    continue;
                }
            };

            info!(plugin = %name, count = items.len(), "Input plugin produced work items");
            for item in items {
                match Match::from_item(item) {
                    Some(m) => matches.push(m),
                    None => warn!(plugin = %name, "Skipping non-object work item"),
                }
            }
        }

        for (index, m) in matches.iter_mut().enumerate() {
            m.index = index;
        }

        Ok(matches)
    }

    /// Output phase for one match: walk the plan's groups, gate by
    /// `expects`, run ready plugins concurrently, splice results.
    pub async fn process_match(&self, m: &mut Match) -> Result<()> {
        let started_at = crate::plugins::now_stamp();
        let t0 = Instant::now();
        let mut deferred: Vec<String> = Vec::new();

        for (group_index, group) in self.plan.groups().iter().enumerate() {
            if self.aborted() {
                return Err(MetarrError::Aborted);
            }

            let mut candidates: Vec<String> = deferred;
            candidates.extend(group.iter().cloned());
            candidates.sort();
            deferred = Vec::new();

            let available = availability(&m.results);
            debug!(
                index = m.index,
                group = group_index,
                available = ?available,
                "Availability recomputed"
            );

            let mut ready = Vec::new();
            for name in candidates {
                let expects = self
                    .registry
                    .get(&name)
                    .map(|manifest| manifest.expects.as_slice())
                    .unwrap_or_default();
                if expects_satisfied(expects, &available) {
                    ready.push(name);
                } else {
                    debug!(index = m.index, plugin = %name, "Deferred: expects not yet satisfied");
                    deferred.push(name);
                }
            }

            if ready.is_empty() {
                continue;
            }

            debug!(index = m.index, group = group_index, plugins = ?ready, "Group start");
            let results = self.run_group(&ready, m.snapshot()).await?;
            for (name, result) in results {
                m.absorb(name, result);
            }
        }

        // Whatever is still deferred never got its data; that is a
        // first-class not-supported outcome, not an error.
        for name in deferred {
            debug!(index = m.index, plugin = %name, "Never ready, tagging not supported");
            let stamp = crate::plugins::now_stamp();
            m.absorb(
                name,
                json!({
                    "status": {
                        "success": false,
                        "not_supported": true,
                        "reason": EXPECTS_UNSATISFIED,
                        "started_at": stamp,
                        "finished_at": stamp,
                        "duration_ms": 0,
                    }
                }),
            );
        }

        m.seal(
            started_at,
            crate::plugins::now_stamp(),
            t0.elapsed().as_millis() as u64,
        );

        info!(
            index = m.index,
            success = m.status.success_plugins.len(),
            failed = m.status.failed_plugins.len(),
            not_supported = m.status.not_supported_plugins.len(),
            "Match complete"
        );
        Ok(())
    }

    /// Run one group of ready plugins concurrently and collect their
    /// results in name order.
    async fn run_group(&self, ready: &[String], snapshot: Value) -> Result<Vec<(String, Value)>> {
        let mut handles: Vec<(String, JoinHandle<Value>)> = Vec::with_capacity(ready.len());

        for name in ready {
            let Some(plugin) = self.output_plugins.get(name).cloned() else {
                // Plan and plugin map are built from the same enabled set;
                // a miss here means a broken embedding, not a user error.
                warn!(plugin = %name, "No instance for planned plugin");
                continue;
            };

            debug!(plugin = %name, "Plugin start");
            let context = snapshot.clone();
            let timeout = self.timeout;
            let semaphore = self.semaphore.clone();
            let label = name.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore {
                    Some(s) => s.acquire_owned().await.ok(),
                    None => None,
                };

                let started_at = crate::plugins::now_stamp();
                let t0 = Instant::now();

                let outcome = match timeout {
                    Some(deadline) => {
                        match tokio::time::timeout(deadline, plugin.execute(&context)).await {
                            Ok(result) => result,
                            Err(_) => {
                                warn!(plugin = %label, "Plugin hit its deadline");
                                return synthesized_failure(
                                    "timeout",
                                    &started_at,
                                    t0.elapsed().as_millis() as u64,
                                );
                            }
                        }
                    }
                    None => plugin.execute(&context).await,
                };

                let duration_ms = t0.elapsed().as_millis() as u64;
                match outcome {
                    Ok(result @ Value::Object(_)) => result,
                    Ok(_) => synthesized_failure(
                        "plugin returned a non-object result",
                        &started_at,
                        duration_ms,
                    ),
                    Err(e) => {
                        warn!(plugin = %label, error = %e, "Plugin failed");
                        synthesized_failure(&e.to_string(), &started_at, duration_ms)
                    }
                }
            });

            handles.push((name.clone(), handle));
        }

        let mut abort = self.abort.clone();
        let mut results = Vec::with_capacity(handles.len());
        let mut iter = handles.into_iter();

        while let Some((name, mut handle)) = iter.next() {
            tokio::select! {
                _ = wait_for_abort(&mut abort) => {
                    handle.abort();
                    for (_, pending) in iter {
                        pending.abort();
                    }
                    return Err(MetarrError::Aborted);
                }
                joined = &mut handle => {
                    let result = match joined {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(plugin = %name, error = %e, "Plugin task panicked");
                            let stamp = crate::plugins::now_stamp();
                            synthesized_failure(
                                &format!("plugin task panicked: {}", e),
                                &stamp,
                                0,
                            )
                        }
                    };
                    debug!(plugin = %name, "Plugin finish");
                    results.push((name, result));
                }
            }
        }

        Ok(results)
    }
}

/// Resolve once the abort flag flips to true; never resolves otherwise.
async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without ever aborting.
            std::future::pending::<()>().await;
        }
    }
}

/// A result whose synthesized status marks the plugin failed with a
/// diagnostic.
fn synthesized_failure(error: &str, started_at: &str, duration_ms: u64) -> Value {
    json!({
        "status": {
            "success": false,
            "not_supported": false,
            "error": error,
            "started_at": started_at,
            "finished_at": crate::plugins::now_stamp(),
            "duration_ms": duration_ms,
        }
    })
}

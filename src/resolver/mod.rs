//! Dependency resolution for output plugins
//!
//! Two concerns live here, deliberately kept pure:
//!
//! - **Static planning**: layer the enabled output plugins into an ordered
//!   sequence of groups via Kahn's algorithm over their `depends_on` edges.
//!   Members of one group have no ordering constraints between them and may
//!   run concurrently. Cycles and edges to unknown or disabled plugins are
//!   startup errors.
//! - **Runtime gating**: the `expects` predicate, evaluated against the
//!   availability set of a match's accumulated results just before each
//!   group fires. A plugin whose declared data paths are not yet present is
//!   deferred rather than run.
//!
//! Determinism: groups are emitted with members sorted by name, and the
//! availability set is an ordered set, so identical inputs always produce
//! identical plans and gating decisions.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{MetarrError, Result};
use crate::manifest::{DataPath, ManifestRegistry, PluginCategory};

/// Keys owned by the match record itself, never part of the availability set.
const RESERVED_KEYS: &[&str] = &["index", "input_path", "match_status"];

/// An ordered sequence of parallel-safe execution groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    groups: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// The groups in execution order; members sorted by name.
    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    /// Total number of plugins across all groups.
    pub fn plugin_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// 0-based group index of a plugin, if planned.
    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g.iter().any(|n| n == name))
    }
}

/// Validate dependency edges of every enabled plugin.
///
/// Every name in `depends_on`, and the first segment of every `expects`
/// path, must resolve to a known, enabled plugin of category `output`.
pub fn validate_edges(registry: &ManifestRegistry, enabled: &BTreeSet<String>) -> Result<()> {
    let enabled_outputs: BTreeSet<&str> = enabled
        .iter()
        .filter(|name| {
            registry
                .get(name)
                .map(|m| m.category == PluginCategory::Output)
                .unwrap_or(false)
        })
        .map(String::as_str)
        .collect();

    for name in enabled {
        let Some(manifest) = registry.get(name) else {
            continue;
        };

        for dep in &manifest.depends_on {
            if !enabled_outputs.contains(dep.as_str()) {
                return Err(MetarrError::Dependency(format!(
                    "Plugin '{}' depends on '{}', which is not an enabled output plugin",
                    name, dep
                )));
            }
        }

        for path in &manifest.expects {
            if !enabled_outputs.contains(path.key()) {
                return Err(MetarrError::Dependency(format!(
                    "Plugin '{}' expects '{}', but '{}' is not an enabled output plugin",
                    name,
                    path,
                    path.key()
                )));
            }
        }
    }

    Ok(())
}

/// Layer the enabled output plugins into an execution plan.
///
/// Kahn's algorithm over the subgraph induced by `enabled_outputs`: each
/// round emits all currently zero-indegree plugins as one group (sorted by
/// name), removes them, and decrements their dependents. Residual nodes
/// after a round with no zero-indegree plugin form a cycle and fail the
/// load.
pub fn plan(registry: &ManifestRegistry, enabled_outputs: &[String]) -> Result<ExecutionPlan> {
    let member_set: BTreeSet<&str> = enabled_outputs.iter().map(String::as_str).collect();

    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for &name in &member_set {
        indegree.entry(name).or_insert(0);
        let Some(manifest) = registry.get(name) else {
            continue;
        };
        for dep in &manifest.depends_on {
            if member_set.contains(dep.as_str()) {
                *indegree.entry(name).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(name);
            }
        }
    }

    let mut groups: Vec<Vec<String>> = Vec::new();

    while !indegree.is_empty() {
        // BTreeMap iteration keeps each group sorted by name.
        let ready: Vec<&str> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(name, _)| *name)
            .collect();

        if ready.is_empty() {
            let residual: Vec<String> = indegree.keys().map(|n| n.to_string()).collect();
            return Err(MetarrError::Cycle(residual));
        }

        for name in &ready {
            indegree.remove(name);
            for dependent in dependents.remove(name).unwrap_or_default() {
                if let Some(deg) = indegree.get_mut(dependent) {
                    *deg -= 1;
                }
            }
        }

        groups.push(ready.into_iter().map(str::to_string).collect());
    }

    debug!(groups = groups.len(), "Built execution plan");
    Ok(ExecutionPlan { groups })
}

/// Compute the availability set of a match's accumulated results.
///
/// Contains every non-reserved top-level key `K`, plus `K.S` for every
/// first-level subkey `S` of object values, skipping the `status` subtree.
pub fn availability(results: &Map<String, Value>) -> BTreeSet<String> {
    let mut available = BTreeSet::new();

    for (key, value) in results {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }

        available.insert(key.clone());

        if let Value::Object(map) = value {
            for subkey in map.keys() {
                if subkey != "status" {
                    available.insert(format!("{}.{}", key, subkey));
                }
            }
        }
    }

    available
}

/// Whether every declared data path is present in the availability set.
pub fn expects_satisfied(expects: &[DataPath], available: &BTreeSet<String>) -> bool {
    expects.iter().all(|path| available.contains(&path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use serde_json::json;

    fn output(name: &str, depends_on: &[&str], expects: &[&str]) -> Manifest {
        serde_json::from_value(json!({
            "name": name,
            "version": "1.0.0",
            "category": "output",
            "depends_on": depends_on,
            "expects": expects,
        }))
        .unwrap()
    }

    fn registry(manifests: Vec<Manifest>) -> ManifestRegistry {
        ManifestRegistry::from_manifests(manifests).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plan_independent_plugins_form_one_group() {
        let reg = registry(vec![
            output("c", &[], &[]),
            output("a", &[], &[]),
            output("b", &[], &[]),
        ]);
        let plan = plan(&reg, &names(&["a", "b", "c"])).unwrap();
        assert_eq!(plan.groups(), &[names(&["a", "b", "c"])]);
    }

    #[test]
    fn test_plan_linear_chain() {
        let reg = registry(vec![
            output("b", &[], &[]),
            output("c", &["b"], &[]),
            output("d", &["c"], &[]),
        ]);
        let plan = plan(&reg, &names(&["b", "c", "d"])).unwrap();
        assert_eq!(
            plan.groups(),
            &[names(&["b"]), names(&["c"]), names(&["d"])]
        );
    }

    #[test]
    fn test_plan_diamond_layers_correctly() {
        let reg = registry(vec![
            output("root", &[], &[]),
            output("left", &["root"], &[]),
            output("right", &["root"], &[]),
            output("sink", &["left", "right"], &[]),
        ]);
        let plan = plan(&reg, &names(&["root", "left", "right", "sink"])).unwrap();
        assert_eq!(
            plan.groups(),
            &[names(&["root"]), names(&["left", "right"]), names(&["sink"])]
        );
    }

    #[test]
    fn test_plan_respects_edge_ordering() {
        // For every edge u -> v, group_index(u) < group_index(v).
        let reg = registry(vec![
            output("a", &[], &[]),
            output("b", &["a"], &[]),
            output("c", &["a"], &[]),
            output("d", &["b", "c"], &[]),
            output("e", &["a"], &[]),
        ]);
        let plan = plan(&reg, &names(&["a", "b", "c", "d", "e"])).unwrap();

        for (from, to) in [("a", "b"), ("a", "c"), ("a", "e"), ("b", "d"), ("c", "d")] {
            assert!(plan.group_index(from).unwrap() < plan.group_index(to).unwrap());
        }
    }

    #[test]
    fn test_plan_ignores_edges_to_non_members() {
        // "b" depends on "a", but "a" is not enabled; the induced subgraph
        // has no such edge. (validate_edges rejects this earlier in startup.)
        let reg = registry(vec![output("a", &[], &[]), output("b", &["a"], &[])]);
        let plan = plan(&reg, &names(&["b"])).unwrap();
        assert_eq!(plan.groups(), &[names(&["b"])]);
    }

    #[test]
    fn test_plan_detects_two_cycle() {
        let reg = registry(vec![output("b", &["c"], &[]), output("c", &["b"], &[])]);
        let result = plan(&reg, &names(&["b", "c"]));
        match result {
            Err(MetarrError::Cycle(members)) => {
                assert_eq!(members, names(&["b", "c"]));
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_cycle_reports_only_residual_nodes() {
        let reg = registry(vec![
            output("ok", &[], &[]),
            output("x", &["y"], &[]),
            output("y", &["x"], &[]),
        ]);
        let result = plan(&reg, &names(&["ok", "x", "y"]));
        match result {
            Err(MetarrError::Cycle(members)) => assert_eq!(members, names(&["x", "y"])),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_empty_is_empty() {
        let reg = registry(vec![]);
        let plan = plan(&reg, &[]).unwrap();
        assert!(plan.groups().is_empty());
        assert_eq!(plan.plugin_count(), 0);
    }

    #[test]
    fn test_validate_edges_accepts_valid_graph() {
        let reg = registry(vec![
            output("b", &[], &[]),
            output("c", &["b"], &["b.parsed"]),
        ]);
        let enabled: BTreeSet<String> = names(&["b", "c"]).into_iter().collect();
        assert!(validate_edges(&reg, &enabled).is_ok());
    }

    #[test]
    fn test_validate_edges_rejects_unknown_dependency() {
        let reg = registry(vec![output("c", &["ghost"], &[])]);
        let enabled: BTreeSet<String> = names(&["c"]).into_iter().collect();
        let result = validate_edges(&reg, &enabled);
        assert!(matches!(result, Err(MetarrError::Dependency(_))));
    }

    #[test]
    fn test_validate_edges_rejects_disabled_dependency() {
        let reg = registry(vec![output("b", &[], &[]), output("c", &["b"], &[])]);
        let enabled: BTreeSet<String> = names(&["c"]).into_iter().collect();
        assert!(validate_edges(&reg, &enabled).is_err());
    }

    #[test]
    fn test_validate_edges_rejects_expects_on_non_output() {
        let scanner: Manifest = serde_json::from_value(json!({
            "name": "scanner", "version": "1", "category": "input"
        }))
        .unwrap();
        let reg = ManifestRegistry::from_manifests(vec![
            scanner,
            output("c", &[], &["scanner.files"]),
        ])
        .unwrap();
        let enabled: BTreeSet<String> = names(&["scanner", "c"]).into_iter().collect();
        assert!(validate_edges(&reg, &enabled).is_err());
    }

    #[test]
    fn test_availability_top_level_and_nested() {
        let results = json!({
            "renamer": { "status": { "success": true }, "parsed": { "title": "x" } },
            "input": "/media/a.mkv",
        });
        let available = availability(results.as_object().unwrap());

        assert!(available.contains("renamer"));
        assert!(available.contains("renamer.parsed"));
        assert!(available.contains("input"));
        assert!(!available.contains("renamer.status"));
    }

    #[test]
    fn test_availability_skips_reserved_keys() {
        let results = json!({
            "index": 0,
            "input_path": "/x",
            "match_status": {},
            "probe": { "size_bytes": 1 },
        });
        let available = availability(results.as_object().unwrap());
        assert_eq!(
            available,
            ["probe", "probe.size_bytes"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        );
    }

    #[test]
    fn test_availability_is_idempotent() {
        let results = json!({ "a": { "b": 1 } });
        let map = results.as_object().unwrap();
        assert_eq!(availability(map), availability(map));
    }

    #[test]
    fn test_expects_satisfied() {
        let available: BTreeSet<String> = ["renamer", "renamer.parsed", "input"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let satisfied: Vec<DataPath> = vec!["renamer.parsed".parse().unwrap()];
        let unsatisfied: Vec<DataPath> =
            vec!["renamer.parsed".parse().unwrap(), "probe".parse().unwrap()];

        assert!(expects_satisfied(&satisfied, &available));
        assert!(!expects_satisfied(&unsatisfied, &available));
        assert!(expects_satisfied(&[], &available));
        assert!(expects_satisfied(&[], &BTreeSet::new()));
    }
}

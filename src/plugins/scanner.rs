//! Filesystem scanner input plugin.
//!
//! Walks the configured `targets` and emits one work item per discovered
//! media file. Plain-text targets (`.txt`) are left for the file-reader
//! plugin. With `allow_virtual_paths`, nonexistent targets are emitted
//! as-is, letting downstream plugins operate on paths that only exist
//! remotely.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;

use super::{now_stamp, ok_status, Plugin};

const DEFAULT_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "m4v", "ts"];

fn default_recursive() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ScannerConfig {
    targets: Vec<String>,
    recursive: bool,
    extensions: Vec<String>,
    allow_virtual_paths: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            recursive: default_recursive(),
            extensions: default_extensions(),
            allow_virtual_paths: false,
        }
    }
}

/// Input plugin that discovers media files from configured targets.
pub struct ScannerPlugin {
    config: ScannerConfig,
}

/// Factory-registry constructor.
pub(super) fn construct(config: Value) -> Result<Arc<dyn Plugin>> {
    let config: ScannerConfig = serde_json::from_value(config)?;
    Ok(Arc::new(ScannerPlugin { config }))
}

impl ScannerPlugin {
    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.config.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    fn collect_dir(&self, dir: &Path, found: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };

        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            if path.is_dir() {
                if self.config.recursive {
                    self.collect_dir(&path, found);
                }
            } else if self.matches_extension(&path) {
                found.push(path);
            }
        }
    }

    fn work_item(path: &str, started_at: &str, t0: Instant) -> Value {
        json!({
            "status": ok_status(started_at, t0.elapsed().as_millis() as u64),
            "input": path,
        })
    }
}

#[async_trait]
impl Plugin for ScannerPlugin {
    async fn execute(&self, _context: &Value) -> Result<Value> {
        let mut items = Vec::new();

        for target in &self.config.targets {
            // .txt targets belong to the file-reader plugin.
            if target.ends_with(".txt") {
                continue;
            }

            let started_at = now_stamp();
            let t0 = Instant::now();
            let target_path = Path::new(target);

            if target_path.is_file() {
                items.push(Self::work_item(target, &started_at, t0));
            } else if target_path.is_dir() {
                let mut found = Vec::new();
                self.collect_dir(target_path, &mut found);
                for file in found {
                    items.push(Self::work_item(
                        &file.to_string_lossy(),
                        &started_at,
                        t0,
                    ));
                }
            } else if self.config.allow_virtual_paths {
                items.push(Self::work_item(target, &started_at, t0));
            }
        }

        Ok(Value::Array(items))
    }
}

//! File-list reader input plugin.
//!
//! Reads work-item paths from plain-text targets, one per line. Lines are
//! trimmed; empty lines and `#` comments are skipped. Paths that do not
//! exist on disk are dropped unless `allow_virtual_paths` is set.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;

use super::{now_stamp, ok_status, Plugin};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileReaderConfig {
    targets: Vec<String>,
    allow_virtual_paths: bool,
}

/// Input plugin that reads file paths from text-file lists.
pub struct FileReaderPlugin {
    config: FileReaderConfig,
}

/// Factory-registry constructor.
pub(super) fn construct(config: Value) -> Result<Arc<dyn Plugin>> {
    let config: FileReaderConfig = serde_json::from_value(config)?;
    Ok(Arc::new(FileReaderPlugin { config }))
}

#[async_trait]
impl Plugin for FileReaderPlugin {
    async fn execute(&self, _context: &Value) -> Result<Value> {
        let mut items = Vec::new();

        for target in &self.config.targets {
            if !target.ends_with(".txt") {
                continue;
            }

            let target_path = Path::new(target);
            if !target_path.exists() {
                continue;
            }

            let content = std::fs::read_to_string(target_path)?;

            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if !self.config.allow_virtual_paths && !Path::new(line).exists() {
                    continue;
                }

                let started_at = now_stamp();
                let t0 = Instant::now();
                items.push(json!({
                    "status": ok_status(&started_at, t0.elapsed().as_millis() as u64),
                    "input": line,
                }));
            }
        }

        Ok(Value::Array(items))
    }
}

//! File metadata probe output plugin.
//!
//! Stats the file behind the match's `input` path and reports its size,
//! extension, and modification time. The `size_bytes` field feeds the
//! response summary's size aggregate.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;

use super::{input_path_of, not_supported_status, now_stamp, ok_status, Plugin};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProbeConfig {}

/// Output plugin reporting filesystem metadata for the input file.
pub struct ProbePlugin;

/// Factory-registry constructor.
pub(super) fn construct(config: Value) -> Result<Arc<dyn Plugin>> {
    let _config: ProbeConfig = serde_json::from_value(config)?;
    Ok(Arc::new(ProbePlugin))
}

#[async_trait]
impl Plugin for ProbePlugin {
    async fn execute(&self, context: &Value) -> Result<Value> {
        let started_at = now_stamp();
        let t0 = Instant::now();

        let Some(input) = input_path_of(context) else {
            return Ok(json!({
                "status": not_supported_status(&started_at, "no input path in context"),
            }));
        };

        let path = Path::new(input);
        let Ok(meta) = std::fs::metadata(path) else {
            return Ok(json!({
                "status": not_supported_status(&started_at, "input file not found"),
            }));
        };

        let modified = meta
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true));
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        Ok(json!({
            "status": ok_status(&started_at, t0.elapsed().as_millis() as u64),
            "size_bytes": meta.len(),
            "extension": extension,
            "modified": modified,
        }))
    }
}

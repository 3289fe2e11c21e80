//! Mock output plugin for tests and demo configurations.
//!
//! Returns a canned payload, optionally overridden through its config
//! slice. Useful for exercising the pipeline without real media on disk:
//! the `payload` keys are spliced into the result verbatim, `category`
//! adds the top-level category signal, and `fail` / `not_supported` force
//! the corresponding outcome.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::Result;

use super::{input_path_of, not_supported_status, now_stamp, ok_status, Plugin};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MockTestConfig {
    /// Extra keys spliced into the result at the top level.
    payload: Map<String, Value>,
    /// Optional top-level category signal.
    category: Option<String>,
    /// Force a failed outcome.
    fail: bool,
    /// Force a not-supported outcome.
    not_supported: bool,
}

/// Output plugin returning configurable mock data.
pub struct MockTestPlugin {
    config: MockTestConfig,
}

/// Factory-registry constructor.
pub(super) fn construct(config: Value) -> Result<Arc<dyn Plugin>> {
    let config: MockTestConfig = serde_json::from_value(config)?;
    Ok(Arc::new(MockTestPlugin { config }))
}

#[async_trait]
impl Plugin for MockTestPlugin {
    async fn execute(&self, context: &Value) -> Result<Value> {
        let started_at = now_stamp();
        let t0 = Instant::now();

        if self.config.not_supported {
            return Ok(json!({
                "status": not_supported_status(&started_at, "forced by config"),
            }));
        }

        if self.config.fail {
            return Ok(json!({
                "status": {
                    "success": false,
                    "error": "forced by config",
                    "started_at": started_at,
                    "finished_at": now_stamp(),
                    "duration_ms": t0.elapsed().as_millis() as u64,
                }
            }));
        }

        let mut result = Map::new();
        result.insert(
            "status".into(),
            ok_status(&started_at, t0.elapsed().as_millis() as u64),
        );

        if self.config.payload.is_empty() {
            result.insert(
                "mock_data".into(),
                json!({
                    "test_field": "mock plugin is working",
                    "input_received": input_path_of(context),
                    "processed": true,
                }),
            );
        } else {
            for (key, value) in &self.config.payload {
                result.insert(key.clone(), value.clone());
            }
        }

        if let Some(category) = &self.config.category {
            result.insert("category".into(), Value::String(category.clone()));
        }

        Ok(Value::Object(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_canned_payload() {
        let plugin = construct(json!({})).unwrap();
        let result = plugin
            .execute(&json!({ "input": "/media/a.mkv" }))
            .await
            .unwrap();

        assert_eq!(result["status"]["success"], true);
        assert_eq!(result["mock_data"]["input_received"], "/media/a.mkv");
        assert_eq!(result["mock_data"]["processed"], true);
    }

    #[tokio::test]
    async fn test_configured_payload_is_spliced_verbatim() {
        let plugin = construct(json!({
            "payload": { "parsed": { "title": "Stub" }, "size_bytes": 7 }
        }))
        .unwrap();
        let result = plugin.execute(&json!({})).await.unwrap();

        assert_eq!(result["parsed"]["title"], "Stub");
        assert_eq!(result["size_bytes"], 7);
        assert!(result.get("mock_data").is_none());
    }

    #[tokio::test]
    async fn test_category_signal() {
        let plugin = construct(json!({ "category": "movie" })).unwrap();
        let result = plugin.execute(&json!({})).await.unwrap();
        assert_eq!(result["category"], "movie");
    }

    #[tokio::test]
    async fn test_forced_failure() {
        let plugin = construct(json!({ "fail": true })).unwrap();
        let result = plugin.execute(&json!({})).await.unwrap();
        assert_eq!(result["status"]["success"], false);
        assert!(result["status"].get("not_supported").is_none());
        assert_eq!(result["status"]["error"], "forced by config");
    }

    #[tokio::test]
    async fn test_forced_not_supported() {
        let plugin = construct(json!({ "not_supported": true })).unwrap();
        let result = plugin.execute(&json!({})).await.unwrap();
        assert_eq!(result["status"]["not_supported"], true);
    }
}

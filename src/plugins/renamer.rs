//! Filename parser output plugin.
//!
//! Derives a clean title and, where present, year / season / episode
//! numbers from the filename behind the match's `input` path. Release
//! tags (quality, codec, language) and bracketed segments are stripped
//! before matching. Emits a top-level `category` signal (`movie` or
//! `show`) that the executor propagates onto the match.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{MetarrError, Result};

use super::{input_path_of, not_supported_status, now_stamp, ok_status, Plugin};

const RELEASE_KEYWORDS: &[&str] = &[
    "4K", "2160p", "1080p", "720p", "480p", "UHD", "BluRay", "BDRip", "BRRip", "WEB-DL",
    "WEBDL", "WEBRip", "HDTV", "DVDRip", "PROPER", "EXTENDED", "REMUX", "x264", "x265",
    "H264", "H265", "HEVC", "10bit", "DTS", "Atmos", "TrueHD", "AC3", "AAC", "MULTI",
    "DUAL", "SUBBED", "DUBBED",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RenamerConfig {
    /// Extra keywords stripped from filenames in addition to the built-in
    /// release-tag list.
    delete_keywords: Vec<String>,
}

/// Output plugin that parses media filenames.
pub struct RenamerPlugin {
    keywords: Regex,
    brackets: Regex,
    separators: Regex,
    spaces: Regex,
    season_episode: Regex,
    year: Regex,
}

/// Factory-registry constructor.
pub(super) fn construct(config: Value) -> Result<Arc<dyn Plugin>> {
    let config: RenamerConfig = serde_json::from_value(config)?;

    let mut keywords: Vec<String> = RELEASE_KEYWORDS.iter().map(|k| regex::escape(k)).collect();
    keywords.extend(config.delete_keywords.iter().map(|k| regex::escape(k)));

    let compile = |pattern: &str| {
        Regex::new(pattern).map_err(|e| MetarrError::Plugin(format!("bad pattern: {}", e)))
    };

    Ok(Arc::new(RenamerPlugin {
        keywords: compile(&format!(r"(?i)\b({})\b", keywords.join("|")))?,
        brackets: compile(r"[\(\[][^\)\]]*[\)\]]")?,
        separators: compile(r"[._]")?,
        spaces: compile(r"\s+")?,
        season_episode: compile(r"(?i)\b(?:S(?P<s1>\d{1,2})\s*E(?P<e1>\d{1,3})|(?P<s2>\d{1,2})x(?P<e2>\d{1,3}))\b")?,
        year: compile(r"\b(19\d{2}|20\d{2})\b")?,
    }))
}

impl RenamerPlugin {
    fn sanitize(&self, stem: &str) -> String {
        let text = self.separators.replace_all(stem, " ");
        let text = self.brackets.replace_all(&text, " ");
        let text = self.keywords.replace_all(&text, " ");
        self.spaces.replace_all(&text, " ").trim().to_string()
    }

    fn parse(&self, stem: &str) -> (Map<String, Value>, &'static str) {
        let cleaned = self.sanitize(stem);
        let mut parsed = Map::new();

        if let Some(caps) = self.season_episode.captures(&cleaned) {
            let season = caps
                .name("s1")
                .or_else(|| caps.name("s2"))
                .and_then(|m| m.as_str().parse::<u32>().ok());
            let episode = caps
                .name("e1")
                .or_else(|| caps.name("e2"))
                .and_then(|m| m.as_str().parse::<u32>().ok());
            let title = cleaned[..caps.get(0).map(|m| m.start()).unwrap_or(0)]
                .trim()
                .to_string();

            parsed.insert("title".into(), Value::String(title));
            if let Some(s) = season {
                parsed.insert("season".into(), Value::from(s));
            }
            if let Some(e) = episode {
                parsed.insert("episode".into(), Value::from(e));
            }
            return (parsed, "show");
        }

        if let Some(caps) = self.year.captures(&cleaned) {
            let m = caps.get(1).expect("year group");
            let title = cleaned[..m.start()].trim().to_string();
            // A leading year is part of the title, not a release year.
            if !title.is_empty() {
                parsed.insert("title".into(), Value::String(title));
                if let Ok(year) = m.as_str().parse::<u32>() {
                    parsed.insert("year".into(), Value::from(year));
                }
                return (parsed, "movie");
            }
        }

        parsed.insert("title".into(), Value::String(cleaned));
        (parsed, "movie")
    }
}

#[async_trait]
impl Plugin for RenamerPlugin {
    async fn execute(&self, context: &Value) -> Result<Value> {
        let started_at = now_stamp();
        let t0 = Instant::now();

        let Some(input) = input_path_of(context) else {
            return Ok(json!({
                "status": not_supported_status(&started_at, "no input path in context"),
            }));
        };

        let stem = Path::new(input)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| input.to_string());

        let (parsed, category) = self.parse(&stem);

        Ok(json!({
            "status": ok_status(&started_at, t0.elapsed().as_millis() as u64),
            "parsed": parsed,
            "category": category,
        }))
    }
}

//! Template rendering for task output.
//!
//! Tasks render `$`-prefixed dotted paths against the response-in-progress.
//! Routing of the first path segment:
//!
//! - `$response.xxx`: the document root
//! - `$globals.xxx`: the current match's globals
//! - `$options.xxx`: `globals.config.options`
//! - `$index` / `$total`: current match index / match count
//! - `$3.xxx`: match 3 (second segment `globals` or a plugin name)
//! - anything else: a plugin entry of the current match
//!
//! `$$` escapes a literal dollar sign. Missing paths render as the empty
//! string; strings render bare, other scalars via their JSON form, and
//! composites as compact JSON.

use regex::{Captures, Regex};
use serde_json::Value;

/// Renders task templates against the response document.
pub struct TemplateEngine {
    token: Regex,
}

impl TemplateEngine {
    pub fn new() -> Self {
        // Compiled once; the pattern is a constant.
        let token = Regex::new(r"\$(\$|[A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)")
            .expect("template token pattern");
        Self { token }
    }

    /// Render `template` for the match at `index`.
    pub fn render(&self, template: &str, response: &Value, index: usize) -> String {
        let total = response
            .get("matches")
            .and_then(Value::as_array)
            .map(|m| m.len())
            .unwrap_or(0);

        self.token
            .replace_all(template, |caps: &Captures| {
                let path = &caps[1];
                match path {
                    "$" => "$".to_string(),
                    "index" => index.to_string(),
                    "total" => total.to_string(),
                    _ => resolve(path, response, index)
                        .map(format_value)
                        .unwrap_or_default(),
                }
            })
            .into_owned()
    }

    /// Evaluate a condition expression: render it, then test truthiness.
    ///
    /// Falsy renderings: empty (after trimming), `false`, `0`, `null`.
    /// An absent condition is truthy.
    pub fn evaluate_condition(
        &self,
        condition: Option<&str>,
        response: &Value,
        index: usize,
    ) -> bool {
        match condition {
            None => true,
            Some(expr) => truthy(&self.render(expr, response, index)),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a routed path to a value in the document.
fn resolve<'a>(path: &'a str, response: &'a Value, index: usize) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let matches = response.get("matches")?;

    match first {
        "response" => walk(response, segments),
        "options" => walk(
            response.get("globals")?.get("config")?.get("options")?,
            segments,
        ),
        "globals" => walk(matches.get(index)?.get("globals")?, segments),
        digits if digits.chars().all(|c| c.is_ascii_digit()) => {
            let n: usize = digits.parse().ok()?;
            let entry = matches.get(n)?;
            match segments.next() {
                None => Some(entry),
                Some("globals") => walk(entry.get("globals")?, segments),
                Some(plugin) => walk(entry.get("plugins")?.get(plugin)?, segments),
            }
        }
        plugin => walk(matches.get(index)?.get("plugins")?.get(plugin)?, segments),
    }
}

/// Navigate nested objects by the remaining path segments.
fn walk<'a, I>(mut value: &'a Value, segments: I) -> Option<&'a Value>
where
    I: Iterator<Item = &'a str>,
{
    for segment in segments {
        value = value.get(segment)?;
    }
    Some(value)
}

/// Textual form of a resolved value.
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}

/// Truthiness of a rendered string.
pub fn truthy(rendered: &str) -> bool {
    !matches!(rendered.trim(), "" | "false" | "0" | "null")
}

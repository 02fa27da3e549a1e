//! Declarative field extraction
//!
//! Runs a request's `ExtractionRule`s against fetched content. Every rule runs
//! independently and in order; a rule that cannot be evaluated or finds
//! nothing falls back to its default and never stops the others.
//!
//! | Rule outcome | Field | Warning |
//! |--------------|-------|---------|
//! | Match | extracted value | no |
//! | No match, required | default (or null) | yes |
//! | No match, optional | default, or omitted | no |
//! | Invalid locator or transform | default (or null when required) | yes |

mod path;

pub use path::JsonPath;

use crate::model::{ExtractionRule, ExtractionWarning, Locator, Transform};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::BTreeMap;

/// Fields and warnings produced by one extraction pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub fields: BTreeMap<String, Value>,
    pub warnings: Vec<ExtractionWarning>,
}

/// Content a pass runs against
///
/// The markup and JSON views are built lazily and at most once.
struct Content<'a> {
    raw: &'a str,
    content_type: Option<&'a str>,
    document: Option<Html>,
    json: Option<Vec<Value>>,
}

impl<'a> Content<'a> {
    fn new(raw: &'a str, content_type: Option<&'a str>) -> Self {
        Self {
            raw,
            content_type,
            document: None,
            json: None,
        }
    }

    fn document(&mut self) -> &Html {
        let raw = self.raw;
        self.document.get_or_insert_with(|| Html::parse_document(raw))
    }

    /// JSON documents available to path queries
    ///
    /// The body itself when it parses as JSON, otherwise every JSON and
    /// JSON-LD script block in the markup.
    fn json(&mut self) -> &[Value] {
        if self.json.is_none() {
            let docs = self.collect_json();
            self.json = Some(docs);
        }
        self.json.as_deref().unwrap_or_default()
    }

    fn collect_json(&mut self) -> Vec<Value> {
        let looks_json = self
            .content_type
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
            || self.raw.trim_start().starts_with(['{', '[']);
        if looks_json {
            if let Ok(value) = serde_json::from_str::<Value>(self.raw) {
                return vec![value];
            }
        }

        let Ok(selector) = Selector::parse(
            r#"script[type="application/json"], script[type="application/ld+json"]"#,
        ) else {
            return Vec::new();
        };
        self.document()
            .select(&selector)
            .filter_map(|el| serde_json::from_str(&el.inner_html()).ok())
            .collect()
    }
}

/// Runs `rules` against fetched content
///
/// `raw` is the body as fetched (or the rendered DOM); `content_type` decides
/// whether a JSON body is queried directly.
pub fn extract(raw: &str, content_type: Option<&str>, rules: &[ExtractionRule]) -> Extraction {
    let mut content = Content::new(raw, content_type);
    let mut extraction = Extraction::default();

    for rule in rules {
        let outcome = match &rule.locator {
            Locator::Selector(query) => by_selector(&mut content, query, &rule.transform),
            Locator::Path(query) => by_path(&mut content, query, &rule.transform),
            Locator::Regex(pattern) => by_regex(content.raw, pattern, &rule.transform),
        };

        match outcome {
            Ok(values) if !values.is_empty() => {
                let value = if rule.multiple {
                    Value::Array(values)
                } else {
                    values.into_iter().next().unwrap_or(Value::Null)
                };
                extraction.fields.insert(rule.name.clone(), value);
            }
            Ok(_) => {
                if rule.required {
                    extraction.warn(rule, "required field not found");
                }
                extraction.fall_back(rule);
            }
            Err(message) => {
                tracing::debug!("Extraction rule '{}' failed: {}", rule.name, message);
                extraction.warn(rule, message);
                extraction.fall_back(rule);
            }
        }
    }

    extraction
}

impl Extraction {
    fn warn(&mut self, rule: &ExtractionRule, message: impl Into<String>) {
        self.warnings.push(ExtractionWarning {
            rule: rule.name.clone(),
            message: message.into(),
        });
    }

    fn fall_back(&mut self, rule: &ExtractionRule) {
        match (&rule.default, rule.required) {
            (Some(default), _) => {
                self.fields.insert(rule.name.clone(), default.clone());
            }
            (None, true) => {
                self.fields.insert(rule.name.clone(), Value::Null);
            }
            (None, false) => {}
        }
    }
}

fn by_selector(
    content: &mut Content<'_>,
    query: &str,
    transform: &Transform,
) -> Result<Vec<Value>, String> {
    let selector =
        Selector::parse(query).map_err(|e| format!("invalid selector '{}': {}", query, e))?;

    content
        .document()
        .select(&selector)
        .filter_map(|el| element_value(el, transform).transpose())
        .collect()
}

fn element_value(el: ElementRef<'_>, transform: &Transform) -> Result<Option<Value>, String> {
    Ok(match transform {
        Transform::Text => Some(Value::String(collapse(&el.text().collect::<String>()))),
        Transform::Html => Some(Value::String(el.html())),
        Transform::Attribute(name) => el
            .value()
            .attr(name)
            .map(|v| Value::String(v.to_string())),
        Transform::Json => Some(parse_json(&el.text().collect::<String>())?),
    })
}

fn by_path(
    content: &mut Content<'_>,
    query: &str,
    transform: &Transform,
) -> Result<Vec<Value>, String> {
    let path = JsonPath::parse(query)?;

    let mut values = Vec::new();
    for doc in content.json() {
        for found in path.select(doc) {
            let value = match transform {
                Transform::Json | Transform::Html => Some(found.clone()),
                Transform::Text => Some(Value::String(match found {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })),
                Transform::Attribute(name) => found.get(name).cloned(),
            };
            values.extend(value);
        }
    }
    Ok(values)
}

fn by_regex(raw: &str, pattern: &str, transform: &Transform) -> Result<Vec<Value>, String> {
    let re = Regex::new(pattern).map_err(|e| format!("invalid regex '{}': {}", pattern, e))?;

    re.captures_iter(raw)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| match transform {
            Transform::Text => Ok(Value::String(collapse(m.as_str()))),
            Transform::Html => Ok(Value::String(m.as_str().to_string())),
            Transform::Json => parse_json(m.as_str()),
            Transform::Attribute(name) => Err(format!(
                "attribute transform '{}' does not apply to regex matches",
                name
            )),
        })
        .collect()
}

fn parse_json(text: &str) -> Result<Value, String> {
    serde_json::from_str(text.trim()).map_err(|e| format!("matched text is not JSON: {}", e))
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

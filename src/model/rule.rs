use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a rule looks for its value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "query", rename_all = "lowercase")]
pub enum Locator {
    /// CSS selector over the parsed markup
    Selector(String),
    /// Path query over JSON content, e.g. `$.items[*].name`
    Path(String),
    /// Regular expression over the raw text; capture group 1 if present
    Regex(String),
}

/// How a located value becomes a field value
///
/// Closed set of statically known transforms.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Transform {
    /// Whitespace-collapsed text content
    #[default]
    Text,
    /// Outer markup of the matched element
    Html,
    /// Value of the named attribute
    Attribute(String),
    /// Parse the located text as JSON
    Json,
}

/// A named field extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub name: String,
    pub locator: Locator,
    #[serde(default)]
    pub transform: Transform,
    /// Collect every match into an array instead of the first one
    #[serde(default)]
    pub multiple: bool,
    /// Emit a warning when nothing matches
    #[serde(default)]
    pub required: bool,
    /// Value used when the locator yields nothing
    #[serde(default)]
    pub default: Option<Value>,
}

impl ExtractionRule {
    fn with_locator(name: impl Into<String>, locator: Locator) -> Self {
        Self {
            name: name.into(),
            locator,
            transform: Transform::Text,
            multiple: false,
            required: false,
            default: None,
        }
    }

    pub fn selector(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self::with_locator(name, Locator::Selector(query.into()))
    }

    pub fn path(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self::with_locator(name, Locator::Path(query.into()))
    }

    pub fn regex(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::with_locator(name, Locator::Regex(pattern.into()))
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn attribute(self, name: impl Into<String>) -> Self {
        self.transform(Transform::Attribute(name.into()))
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Marks the rule required with the value used when nothing matches
    pub fn required(mut self, default: Value) -> Self {
        self.required = true;
        self.default = Some(default);
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_from_json() {
        let rule: ExtractionRule = serde_json::from_value(json!({
            "name": "price",
            "locator": {"kind": "selector", "query": ".price"},
            "transform": {"kind": "attribute", "name": "content"},
            "required": true,
            "default": "0"
        }))
        .unwrap();

        assert_eq!(rule.locator, Locator::Selector(".price".to_string()));
        assert_eq!(rule.transform, Transform::Attribute("content".to_string()));
        assert!(rule.required);
        assert_eq!(rule.default, Some(json!("0")));
    }

    #[test]
    fn test_transform_defaults_to_text() {
        let rule: ExtractionRule = serde_json::from_value(json!({
            "name": "title",
            "locator": {"kind": "regex", "query": "<title>(.*)</title>"}
        }))
        .unwrap();
        assert_eq!(rule.transform, Transform::Text);
        assert!(!rule.multiple);
    }
}

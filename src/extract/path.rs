//! Minimal JSON path queries
//!
//! Supported syntax: `$` root, `.key`, `['key']`, `[n]` index, and `[*]` /
//! `.*` wildcards. Filters and recursive descent are not supported.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// A parsed path query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Parses a query such as `$.items[*].name`
    ///
    /// The leading `$` is optional.
    pub fn parse(query: &str) -> Result<Self, String> {
        let query = query.trim();
        let body = match query.strip_prefix('$') {
            Some(rest) => rest.to_string(),
            None if query.starts_with('[') => query.to_string(),
            // Bare leading key: `items.name`
            None => format!(".{}", query),
        };

        let mut rest = body.as_str();
        let mut segments = Vec::new();

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let end = after.find(['.', '[']).unwrap_or(after.len());
                let key = &after[..end];
                if key.is_empty() {
                    return Err(format!("empty key in path '{}'", query));
                }
                segments.push(if key == "*" {
                    Segment::Wildcard
                } else {
                    Segment::Key(key.to_string())
                });
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let end = after
                    .find(']')
                    .ok_or_else(|| format!("unclosed '[' in path '{}'", query))?;
                segments.push(parse_bracket(&after[..end], query)?);
                rest = &after[end + 1..];
            } else {
                return Err(format!("unexpected '{}' in path '{}'", rest, query));
            }
        }

        Ok(Self { segments })
    }

    /// All values the path selects, in document order
    pub fn select<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match (segment, value) {
                    (Segment::Key(key), Value::Object(map)) => next.extend(map.get(key)),
                    (Segment::Index(i), Value::Array(items)) => next.extend(items.get(*i)),
                    (Segment::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                    (Segment::Wildcard, Value::Object(map)) => next.extend(map.values()),
                    _ => {}
                }
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }
}

fn parse_bracket(inner: &str, query: &str) -> Result<Segment, String> {
    let inner = inner.trim();
    if inner == "*" {
        return Ok(Segment::Wildcard);
    }
    if let Some(quoted) = inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
    {
        return Ok(Segment::Key(quoted.to_string()));
    }
    inner
        .parse::<usize>()
        .map(Segment::Index)
        .map_err(|_| format!("invalid index '[{}]' in path '{}'", inner, query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "title": "Catalog",
            "items": [
                {"name": "a", "price": 1},
                {"name": "b", "price": 2},
                {"sku": "c"}
            ],
            "meta": {"the key": true}
        })
    }

    fn select(query: &str) -> Vec<Value> {
        let doc = doc();
        JsonPath::parse(query)
            .unwrap()
            .select(&doc)
            .into_iter()
            .cloned()
            .collect()
    }

    #[test]
    fn test_key_and_index() {
        assert_eq!(select("$.title"), vec![json!("Catalog")]);
        assert_eq!(select("$.items[1].name"), vec![json!("b")]);
        assert_eq!(select("items[0].price"), vec![json!(1)]);
    }

    #[test]
    fn test_wildcard_skips_missing_keys() {
        assert_eq!(select("$.items[*].name"), vec![json!("a"), json!("b")]);
        assert_eq!(select("$.items.*.sku"), vec![json!("c")]);
    }

    #[test]
    fn test_quoted_key() {
        assert_eq!(select("$.meta['the key']"), vec![json!(true)]);
    }

    #[test]
    fn test_root_and_miss() {
        assert_eq!(select("$").len(), 1);
        assert!(select("$.nothing.here").is_empty());
        assert!(select("$.items[10]").is_empty());
    }

    #[test]
    fn test_invalid_paths() {
        assert!(JsonPath::parse("$.items[").is_err());
        assert!(JsonPath::parse("$.items[x]").is_err());
        assert!(JsonPath::parse("$..name").is_err());
    }
}

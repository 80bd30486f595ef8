use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Values available to `{{name}}` placeholders in gear configs.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderContext {
    pub values: HashMap<String, String>,
}

impl PlaceholderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Replace known placeholders in a string. Unknown placeholders are left
    /// as written so the receiving gear sees exactly what was configured.
    pub fn interpolate(&self, input: &str) -> String {
        PLACEHOLDER
            .replace_all(input, |caps: &regex::Captures| {
                let key = caps.get(1).map_or("", |m| m.as_str());
                match self.values.get(key) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .to_string()
    }

    /// Interpolate every string inside a JSON value, recursively.
    pub fn interpolate_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.interpolate(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.interpolate_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.interpolate_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_substitutes_known_placeholders() {
        let ctx = PlaceholderContext::new()
            .with("source", "ingest-form")
            .with("target", "sandbox-form");
        assert_eq!(
            ctx.interpolate("copy {{source}} -> {{ target }}"),
            "copy ingest-form -> sandbox-form"
        );
    }

    #[test]
    fn test_unknown_placeholder_is_kept() {
        let ctx = PlaceholderContext::new().with("source", "a");
        assert_eq!(ctx.interpolate("{{other}}/{{source}}"), "{{other}}/a");
    }

    #[test]
    fn test_nested_values() {
        let ctx = PlaceholderContext::new().with("source", "ingest");
        let value = json!({"projects": ["{{source}}", 3], "debug": true});
        assert_eq!(
            ctx.interpolate_value(&value),
            json!({"projects": ["ingest", 3], "debug": true})
        );
    }
}

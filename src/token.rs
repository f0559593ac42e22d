//! Token object shape and field access
//!
//! A token is a JSON object carrying a `value` plus optional `type`, `unit`,
//! `meta` and `respond` fields. Every field may appear bare or
//! dollar-prefixed (`value` / `$value`); the accessors here check both forms
//! so no other module has to.

use serde_json::{Map, Value};
use std::collections::HashSet;

pub const FIELD_VALUE: &str = "value";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_UNIT: &str = "unit";
pub const FIELD_META: &str = "meta";
pub const FIELD_RESPOND: &str = "respond";

/// The service fields `core` expands to.
pub const CORE_FIELDS: [&str; 3] = [FIELD_VALUE, FIELD_TYPE, FIELD_UNIT];

/// Look up a token field, accepting the bare and `$`-prefixed spellings.
pub fn field<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    obj.get(name).or_else(|| obj.get(&format!("${}", name)))
}

/// Whether a JSON value is token-shaped (an object with a `value` field).
pub fn is_token_object(value: &Value) -> bool {
    match value {
        Value::Object(obj) => field(obj, FIELD_VALUE).is_some(),
        _ => false,
    }
}

/// The fixed `type` vocabulary, used to select conversion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Number,
    String,
    Boolean,
    Color,
    Dimension,
    Alias,
    FontFamily,
    FontWeight,
    Other,
}

impl TokenType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "number" => TokenType::Number,
            "string" => TokenType::String,
            "boolean" => TokenType::Boolean,
            "color" => TokenType::Color,
            "dimension" => TokenType::Dimension,
            "alias" => TokenType::Alias,
            "fontFamily" | "font-family" => TokenType::FontFamily,
            "fontWeight" | "font-weight" => TokenType::FontWeight,
            _ => TokenType::Other,
        }
    }

    /// Types whose numeric values are emitted without a unit suffix.
    pub fn is_unitless(self) -> bool {
        matches!(
            self,
            TokenType::Number | TokenType::FontWeight | TokenType::Boolean
        )
    }
}

/// Declared `type` of a token object, if any.
pub fn token_type(obj: &Map<String, Value>) -> Option<TokenType> {
    field(obj, FIELD_TYPE)
        .and_then(Value::as_str)
        .map(TokenType::from_name)
}

/// Declared `unit` of a token object, if any.
pub fn token_unit(obj: &Map<String, Value>) -> Option<&str> {
    field(obj, FIELD_UNIT).and_then(Value::as_str)
}

/// Walk `meta.build.web` and return the named field.
fn build_web_field<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    let meta = field(obj, FIELD_META)?.as_object()?;
    let build = field(meta, "build")?.as_object()?;
    let web = field(build, "web")?.as_object()?;
    field(web, name)
}

/// Whether `meta.build.web.exportAsVar` marks this token exportable.
pub fn export_as_var(obj: &Map<String, Value>) -> bool {
    build_web_field(obj, "exportAsVar")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Explicit CSS variable name from `meta.build.web.varName`, unresolved.
pub fn var_name_override(obj: &Map<String, Value>) -> Option<&str> {
    build_web_field(obj, "varName").and_then(Value::as_str)
}

/// Which service fields to include when emitting a token as a sub-map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFieldSet {
    pub include_all: bool,
    pub fields: HashSet<String>,
}

impl ServiceFieldSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !self.include_all && self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.include_all || self.fields.contains(name)
    }
}

/// Resolve the effective service-field set.
///
/// An explicit per-call list overrides the global default; absence of both
/// yields plain values only. The sentinels `*` / `all`, `none` and `core`
/// are honored in either list.
pub fn resolve_service_fields(
    local: Option<&[String]>,
    global: Option<&[String]>,
) -> ServiceFieldSet {
    let chosen = match (local, global) {
        (Some(list), _) => list,
        (None, Some(list)) => list,
        (None, None) => return ServiceFieldSet::none(),
    };

    let mut set = ServiceFieldSet::none();
    for entry in chosen {
        match entry.as_str() {
            "*" | "all" => set.include_all = true,
            "none" => return ServiceFieldSet::none(),
            "core" => {
                for name in CORE_FIELDS {
                    set.fields.insert(name.to_string());
                }
            }
            other => {
                set.fields.insert(other.trim_start_matches('$').to_string());
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_field_accepts_dollar_prefix() {
        let bare = obj(json!({"value": 8, "type": "number"}));
        let dollar = obj(json!({"$value": 8, "$type": "number"}));

        assert_eq!(field(&bare, "value"), Some(&json!(8)));
        assert_eq!(field(&dollar, "value"), Some(&json!(8)));
        assert_eq!(field(&dollar, "type"), Some(&json!("number")));
    }

    #[test]
    fn test_is_token_object() {
        assert!(is_token_object(&json!({"value": "#fff"})));
        assert!(is_token_object(&json!({"$value": "#fff"})));
        assert!(!is_token_object(&json!({"spacing": {"value": 8}})));
        assert!(!is_token_object(&json!("#fff")));
    }

    #[test]
    fn test_export_metadata() {
        let token = obj(json!({
            "value": "#0ea5e9",
            "meta": {"build": {"web": {"exportAsVar": true, "varName": "--brand"}}}
        }));
        assert!(export_as_var(&token));
        assert_eq!(var_name_override(&token), Some("--brand"));

        let plain = obj(json!({"value": 8}));
        assert!(!export_as_var(&plain));
        assert_eq!(var_name_override(&plain), None);
    }

    #[test]
    fn test_resolve_service_fields_precedence() {
        let global = vec!["core".to_string()];
        let local = vec!["value".to_string(), "meta".to_string()];

        // Local list overrides global.
        let set = resolve_service_fields(Some(&local), Some(&global));
        assert!(set.contains("value"));
        assert!(set.contains("meta"));
        assert!(!set.contains("type"));

        // Global applies when no local list is given.
        let set = resolve_service_fields(None, Some(&global));
        assert!(set.contains("value"));
        assert!(set.contains("type"));
        assert!(set.contains("unit"));
        assert!(!set.contains("respond"));

        // Absence of both yields plain values.
        assert!(resolve_service_fields(None, None).is_empty());
    }

    #[test]
    fn test_resolve_service_fields_sentinels() {
        let all = vec!["*".to_string()];
        let set = resolve_service_fields(Some(&all), None);
        assert!(set.contains("value"));
        assert!(set.contains("respond"));

        let none = vec!["none".to_string()];
        assert!(resolve_service_fields(Some(&none), None).is_empty());
    }
}

//! Style-map and CSS-variable serialization
//!
//! Walks a resolved token tree and produces nested SCSS map literals. While
//! rendering token values it also accumulates exportable tokens into a CSS
//! variable table shared across every document of a build pass, with a
//! configurable first-wins/last-wins policy for conflicting names.

use crate::color::{self, ColorFormat};
use crate::resolver::TokenResolver;
use crate::token;
use crate::utils::{format_number, quote_if_needed, to_kebab_case};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const INDENT: &str = "  ";

/// Keys whose numeric values are font metrics rendered in `em`.
const EM_KEYS: [&str; 2] = ["line-height", "letter-spacing"];

/// Keys whose numeric values carry no unit even without a declared type.
const UNITLESS_KEYS: [&str; 3] = ["font-weight", "z-index", "opacity"];

/// Which value wins when two tokens target the same CSS variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarPreference {
    First,
    #[default]
    Last,
}

impl VarPreference {
    pub fn from_name(name: &str) -> Self {
        match name {
            "first" => VarPreference::First,
            _ => VarPreference::Last,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CssVarOptions {
    /// Convert every token to a CSS variable, not just flagged ones.
    pub convert_all: bool,
    pub prefix: Option<String>,
    /// Patterns matched against candidate file-path strings; a match
    /// excludes the whole document from variable collection.
    pub exclude: Vec<String>,
    pub prefer: VarPreference,
}

#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    pub kebab_case_keys: bool,
    /// Map-options prefix; takes precedence over the CSS-var prefix when
    /// naming variables.
    pub prefix: Option<String>,
    /// Prepend the kebab-cased source file name to variable names.
    pub include_file_name: bool,
    /// Emit service-field keys as `$value` instead of `value`.
    pub dollar_service_keys: bool,
    /// Per-call service-field list; overrides the global default.
    pub service_fields: Option<Vec<String>>,
    pub global_service_fields: Option<Vec<String>>,
    /// Unit applied to numbers that carry no `unit` of their own.
    pub default_unit: Option<String>,
    /// Roots used to build exclusion candidates.
    pub roots: Vec<PathBuf>,
    pub css: CssVarOptions,
}

/// One collected CSS custom property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssVariable {
    /// Includes the `--` prefix.
    pub name: String,
    pub value: String,
    /// Base name of the document that produced the retained value.
    pub source: String,
}

pub struct Emitter {
    options: EmitOptions,
    file_name: String,
    file_excluded: bool,
    variables: Vec<CssVariable>,
}

impl Emitter {
    pub fn new(options: EmitOptions) -> Self {
        Self {
            options,
            file_name: String::new(),
            file_excluded: false,
            variables: Vec::new(),
        }
    }

    pub fn options(&self) -> &EmitOptions {
        &self.options
    }

    /// Switch the emitter to a new source document. The variable table is
    /// kept; it accumulates across all files of one pass.
    pub fn begin_file(&mut self, name: &str, source_path: Option<&Path>) {
        self.file_name = name.to_string();
        self.file_excluded = self.is_excluded(name, source_path);
    }

    /// Serialize a token tree (or a single token) into a map literal.
    pub fn serialize(&mut self, resolver: &mut TokenResolver, value: &Value, path: &[String]) -> String {
        self.serialize_node(resolver, value, path, 0)
    }

    pub fn variables(&self) -> &[CssVariable] {
        &self.variables
    }

    /// The accumulated variable table as a `:root` block, or an empty
    /// string when nothing was collected.
    pub fn render_root_block(&self) -> String {
        if self.variables.is_empty() {
            return String::new();
        }
        let mut out = String::from(":root {\n");
        for var in &self.variables {
            out.push_str(&format!("{}{}: {};\n", INDENT, var.name, var.value));
        }
        out.push_str("}\n");
        out
    }

    fn serialize_node(
        &mut self,
        resolver: &mut TokenResolver,
        value: &Value,
        path: &[String],
        indent: usize,
    ) -> String {
        match value {
            Value::Object(obj) if token::is_token_object(value) => {
                self.serialize_token(resolver, obj, path, indent)
            }
            Value::Object(obj) => {
                let mut entries = Vec::with_capacity(obj.len());
                for (key, child) in obj {
                    let mut child_path = path.to_vec();
                    child_path.push(key.clone());
                    let rendered = self.serialize_node(resolver, child, &child_path, indent + 1);
                    entries.push((self.map_key(key), rendered));
                }
                map_literal(&entries, indent)
            }
            other => self.render_value(resolver, other, path, None, None),
        }
    }

    fn serialize_token(
        &mut self,
        resolver: &mut TokenResolver,
        obj: &Map<String, Value>,
        path: &[String],
        indent: usize,
    ) -> String {
        let fields = token::resolve_service_fields(
            self.options.service_fields.as_deref(),
            self.options.global_service_fields.as_deref(),
        );

        let rendered_value = self.render_token_value(resolver, obj, path);
        self.collect_css_variable(resolver, obj, path, &rendered_value);

        if fields.is_empty() {
            return rendered_value;
        }

        let mut entries = Vec::new();
        if fields.contains(token::FIELD_VALUE) {
            entries.push((self.service_key(token::FIELD_VALUE), rendered_value));
        }
        if fields.contains(token::FIELD_TYPE) {
            if let Some(t) = token::field(obj, token::FIELD_TYPE).and_then(Value::as_str) {
                entries.push((self.service_key(token::FIELD_TYPE), format!("\"{}\"", t)));
            }
        }
        if fields.contains(token::FIELD_UNIT) {
            if let Some(u) = token::field(obj, token::FIELD_UNIT).and_then(Value::as_str) {
                entries.push((self.service_key(token::FIELD_UNIT), format!("\"{}\"", u)));
            }
        }
        if fields.contains(token::FIELD_META) {
            if let Some(meta) = token::field(obj, token::FIELD_META) {
                let rendered = self.serialize_node(resolver, meta, path, indent + 1);
                entries.push((self.service_key(token::FIELD_META), rendered));
            }
        }
        if fields.contains(token::FIELD_RESPOND) {
            if let Some(Value::Object(respond)) = token::field(obj, token::FIELD_RESPOND) {
                let mut breakpoints = Vec::with_capacity(respond.len());
                for (breakpoint, child) in respond {
                    let mut child_path = path.to_vec();
                    child_path.push(breakpoint.clone());
                    let rendered =
                        self.serialize_node(resolver, child, &child_path, indent + 2);
                    breakpoints.push((self.map_key(breakpoint), rendered));
                }
                entries.push((
                    self.service_key(token::FIELD_RESPOND),
                    map_literal(&breakpoints, indent + 1),
                ));
            }
        }

        // A sub-map holding nothing but the value is a redundant level.
        if entries.len() == 1 && entries[0].0.trim_start_matches('$') == token::FIELD_VALUE {
            return entries.pop().unwrap().1;
        }

        map_literal(&entries, indent)
    }

    /// Resolve and render a token's `value` field.
    pub fn render_token_value(
        &mut self,
        resolver: &mut TokenResolver,
        obj: &Map<String, Value>,
        path: &[String],
    ) -> String {
        let raw = match token::field(obj, token::FIELD_VALUE) {
            Some(value) => value,
            None => return String::from("null"),
        };
        let resolved = match raw {
            Value::String(s) => resolver.resolve_value(s, &self.file_name),
            other => other.clone(),
        };
        let token_type = token::token_type(obj);
        let unit = token::token_unit(obj).map(str::to_string);
        self.render_value(resolver, &resolved, path, token_type, unit.as_deref())
    }

    fn render_value(
        &mut self,
        resolver: &mut TokenResolver,
        value: &Value,
        path: &[String],
        token_type: Option<token::TokenType>,
        unit: Option<&str>,
    ) -> String {
        match value {
            Value::Number(n) => {
                let number = n.as_f64().unwrap_or(0.0);
                let suffix = self.unit_for(path, token_type, unit);
                format!("{}{}", format_number(number), suffix)
            }
            Value::String(s) => {
                let format = ColorFormat::from_unit(unit);
                if let Some(rendered) =
                    color::try_parse_color(s, format, resolver, &self.file_name)
                {
                    return rendered;
                }
                if s.parse::<f64>().is_ok() || is_dimension_literal(s) {
                    return s.clone();
                }
                quote_if_needed(s)
            }
            Value::Bool(b) => b.to_string(),
            Value::Array(items) => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|item| self.render_value(resolver, item, path, token_type, unit))
                    .collect();
                format!("({})", rendered.join(", "))
            }
            Value::Object(_) => self.serialize_node(resolver, value, path, 0),
            Value::Null => String::from("null"),
        }
    }

    fn unit_for(
        &self,
        path: &[String],
        token_type: Option<token::TokenType>,
        unit: Option<&str>,
    ) -> String {
        if let Some(u) = unit {
            return u.to_string();
        }
        if token_type.map(token::TokenType::is_unitless).unwrap_or(false) {
            return String::new();
        }
        let key = path
            .last()
            .map(|k| to_kebab_case(k))
            .unwrap_or_default();
        if UNITLESS_KEYS.contains(&key.as_str()) {
            return String::new();
        }
        if EM_KEYS.contains(&key.as_str()) {
            return String::from("em");
        }
        self.options
            .default_unit
            .clone()
            .unwrap_or_else(|| String::from("px"))
    }

    /// Variable name for a token at `path`, honoring an explicit
    /// (reference-resolved) `varName` override and the prefix precedence.
    pub fn variable_name(
        &mut self,
        resolver: &mut TokenResolver,
        obj: &Map<String, Value>,
        path: &[String],
    ) -> String {
        let base = match token::var_name_override(obj) {
            Some(explicit) => {
                let resolved = resolver.resolve_value(explicit, &self.file_name);
                let text = match resolved {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                text.trim_start_matches('-').to_string()
            }
            None => {
                let mut parts: Vec<String> = Vec::with_capacity(path.len() + 1);
                if self.options.include_file_name && !self.file_name.is_empty() {
                    parts.push(to_kebab_case(&self.file_name));
                }
                parts.extend(path.iter().map(|p| to_kebab_case(p)));
                parts.join("-")
            }
        };

        let prefix = self
            .options
            .prefix
            .as_deref()
            .or(self.options.css.prefix.as_deref());
        match prefix {
            Some(p) => format!("--{}-{}", to_kebab_case(p), base),
            None => format!("--{}", base),
        }
    }

    fn collect_css_variable(
        &mut self,
        resolver: &mut TokenResolver,
        obj: &Map<String, Value>,
        path: &[String],
        rendered: &str,
    ) {
        if self.file_excluded {
            return;
        }
        if !(token::export_as_var(obj) || self.options.css.convert_all) {
            return;
        }

        let name = self.variable_name(resolver, obj, path);
        let source = self.file_name.clone();

        if let Some(existing) = self.variables.iter_mut().find(|v| v.name == name) {
            if existing.value != rendered {
                log::warn!(
                    "CSS variable {} redefined: '{}' ({}) vs '{}' ({})",
                    name,
                    existing.value,
                    existing.source,
                    rendered,
                    source
                );
            }
            if self.options.css.prefer == VarPreference::Last {
                existing.value = rendered.to_string();
                existing.source = source;
            }
        } else {
            self.variables.push(CssVariable {
                name,
                value: rendered.to_string(),
                source,
            });
        }
    }

    fn is_excluded(&self, name: &str, source_path: Option<&Path>) -> bool {
        if self.options.css.exclude.is_empty() {
            return false;
        }
        let mut candidates: Vec<String> = vec![name.to_string(), format!("{}.json", name)];
        if let Some(path) = source_path {
            candidates.push(path.display().to_string());
        }
        for root in &self.options.roots {
            candidates.push(root.join(format!("{}.json", name)).display().to_string());
        }
        self.options.css.exclude.iter().any(|pattern| {
            candidates
                .iter()
                .any(|c| c == pattern || c.ends_with(pattern))
        })
    }

    fn map_key(&self, key: &str) -> String {
        if self.options.kebab_case_keys {
            to_kebab_case(key)
        } else {
            key.to_string()
        }
    }

    fn service_key(&self, name: &str) -> String {
        if self.options.dollar_service_keys {
            format!("${}", name)
        } else {
            name.to_string()
        }
    }
}

fn map_literal(entries: &[(String, String)], indent: usize) -> String {
    if entries.is_empty() {
        return String::from("()");
    }
    let inner = INDENT.repeat(indent + 1);
    let outer = INDENT.repeat(indent);
    let body: Vec<String> = entries
        .iter()
        .map(|(key, value)| format!("{}{}: {}", inner, key, value))
        .collect();
    format!("(\n{}\n{})", body.join(",\n"), outer)
}

fn is_dimension_literal(value: &str) -> bool {
    const UNITS: [&str; 12] = [
        "px", "rem", "em", "%", "vh", "vw", "vmin", "vmax", "pt", "ch", "ms", "s",
    ];
    UNITS.iter().any(|unit| {
        value
            .strip_suffix(unit)
            .map(|n| !n.is_empty() && n.parse::<f64>().is_ok())
            .unwrap_or(false)
    })
}

//! Token reference resolution
//!
//! Dereferences `{dotted.path}` pointers across token documents. The first
//! path segment names a source file; the rest walk keys inside it. Two
//! lookup strategies are supported: flat (`<name>.json` in any root) and
//! structural (segments walked as subdirectories and files under the
//! roots). Unresolved references are never hard failures; the literal
//! `{path}` text is retained and a diagnostic recorded.

use crate::error::{Diagnostic, UnresolvedReason};
use crate::token;
use crate::utils;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

/// Guard against runaway or accidental deep nesting.
pub const MAX_RESOLUTION_DEPTH: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Directories searched for token source files.
    pub roots: Vec<PathBuf>,
    /// Fall back to walking the roots as a filesystem tree when no file
    /// matches the first path segment by name.
    pub structural_lookup: bool,
}

/// Resolves token references against a per-run file cache.
///
/// The cache is owned by the resolver instance, so repeated runs are
/// isolated from each other. A file must not change while a run is active.
pub struct TokenResolver {
    options: ResolverOptions,
    /// Cache key -> parsed document. `None` records a known miss.
    file_cache: HashMap<String, Option<Value>>,
    /// Memoized structural walks: dotted path -> (cache key, segments consumed).
    structural_cache: HashMap<String, Option<(String, usize)>>,
    diagnostics: Vec<Diagnostic>,
    reference_re: Regex,
}

impl TokenResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self {
            options,
            file_cache: HashMap::new(),
            structural_cache: HashMap::new(),
            diagnostics: Vec::new(),
            reference_re: Regex::new(r"\{([^{}]+)\}").unwrap(),
        }
    }

    /// Seed the file cache with an already-parsed document.
    pub fn insert_document(&mut self, name: &str, doc: Value) {
        self.file_cache.insert(name.to_string(), Some(doc));
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// If the value is token-shaped, unwrap it to its `value` field.
    pub fn coerce_token_to_scalar(value: &Value) -> Value {
        if let Value::Object(obj) = value {
            if let Some(inner) = token::field(obj, token::FIELD_VALUE) {
                return inner.clone();
            }
        }
        value.clone()
    }

    /// Fully dereference a document tree. The result carries no reference
    /// spans except those that were genuinely unresolvable, which makes the
    /// operation idempotent.
    pub fn resolve_document(&mut self, name: &str, doc: &Value) -> Value {
        self.insert_document(name, doc.clone());
        let mut visited = HashSet::new();
        self.resolve_tree(doc, name, 0, &mut visited)
    }

    /// Resolve a single value string, substituting every `{path}` span.
    /// A value that is exactly one span keeps the referent's native type.
    pub fn resolve_value(&mut self, raw: &str, source: &str) -> Value {
        let mut visited = HashSet::new();
        self.resolve_value_guarded(raw, source, 0, &mut visited)
    }

    /// Resolve a dotted path to its terminal value, following nested
    /// references. `None` means the path did not resolve; a diagnostic has
    /// been recorded.
    pub fn resolve_reference(&mut self, path: &str, source: &str) -> Option<Value> {
        let mut visited = HashSet::new();
        self.resolve_span(path, source, 0, &mut visited)
    }

    fn resolve_tree(
        &mut self,
        value: &Value,
        source: &str,
        depth: usize,
        visited: &mut HashSet<String>,
    ) -> Value {
        match value {
            Value::String(s) => self.resolve_value_guarded(s, source, depth, visited),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    out.insert(key.clone(), self.resolve_tree(child, source, depth, visited));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve_tree(item, source, depth, visited))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn resolve_value_guarded(
        &mut self,
        raw: &str,
        source: &str,
        depth: usize,
        visited: &mut HashSet<String>,
    ) -> Value {
        if depth > MAX_RESOLUTION_DEPTH {
            self.record(source, raw, UnresolvedReason::DepthLimit);
            return Value::String(raw.to_string());
        }

        let spans: Vec<(usize, usize, String)> = self
            .reference_re
            .captures_iter(raw)
            .map(|caps| {
                let whole = caps.get(0).unwrap();
                (whole.start(), whole.end(), caps[1].trim().to_string())
            })
            .collect();

        if spans.is_empty() {
            return Value::String(raw.to_string());
        }

        // A value that is exactly one reference keeps its native type.
        let trimmed = raw.trim();
        if spans.len() == 1 {
            let (start, end, ref path) = spans[0];
            if raw[start..end].len() == trimmed.len() {
                return match self.resolve_span(path, source, depth, visited) {
                    Some(value) => value,
                    None => Value::String(raw.to_string()),
                };
            }
        }

        let mut out = String::with_capacity(raw.len());
        let mut cursor = 0;
        let mut substituted = false;

        for (start, end, path) in &spans {
            out.push_str(&raw[cursor..*start]);
            match self.resolve_span(path, source, depth, visited) {
                Some(value) => {
                    out.push_str(&scalar_to_string(&value));
                    substituted = true;
                }
                None => out.push_str(&raw[*start..*end]),
            }
            cursor = *end;
        }
        out.push_str(&raw[cursor..]);

        if substituted {
            if let Some(result) = utils::evaluate_arithmetic(&out) {
                return number_value(result);
            }
        }

        Value::String(out)
    }

    fn resolve_span(
        &mut self,
        path: &str,
        source: &str,
        depth: usize,
        visited: &mut HashSet<String>,
    ) -> Option<Value> {
        if visited.contains(path) {
            self.record(source, path, UnresolvedReason::Cycle);
            return None;
        }
        if depth > MAX_RESOLUTION_DEPTH {
            self.record(source, path, UnresolvedReason::DepthLimit);
            return None;
        }

        let raw = match self.lookup_path(path) {
            Some(value) => value,
            None => {
                self.record(source, path, UnresolvedReason::NotFound);
                return None;
            }
        };

        let coerced = Self::coerce_token_to_scalar(&raw);

        visited.insert(path.to_string());
        let resolved = match &coerced {
            Value::String(s) if self.reference_re.is_match(s) => {
                self.resolve_value_guarded(s, source, depth + 1, visited)
            }
            Value::Object(_) | Value::Array(_) => {
                self.resolve_tree(&coerced, source, depth + 1, visited)
            }
            _ => coerced,
        };
        visited.remove(path);

        Some(resolved)
    }

    /// Raw value at a dotted path, trying the flat strategy first and the
    /// structural strategy second.
    fn lookup_path(&mut self, path: &str) -> Option<Value> {
        let segments: Vec<String> = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return None;
        }

        self.ensure_document(&segments[0]);
        if let Some(Some(doc)) = self.file_cache.get(&segments[0]) {
            if let Some(found) = reduce(doc, &segments[1..]) {
                return Some(found.clone());
            }
        }

        if self.options.structural_lookup {
            if let Some((key, consumed)) = self.ensure_structural(&segments) {
                if let Some(Some(doc)) = self.file_cache.get(&key) {
                    if let Some(found) = reduce(doc, &segments[consumed..]) {
                        return Some(found.clone());
                    }
                }
            }
        }

        None
    }

    /// Memoized load-once-per-path: check cache, else load and store.
    fn ensure_document(&mut self, name: &str) {
        if self.file_cache.contains_key(name) {
            return;
        }
        let mut loaded = None;
        for root in &self.options.roots {
            let candidate = root.join(format!("{}.json", name));
            if candidate.is_file() {
                loaded = parse_file(&candidate);
                break;
            }
        }
        self.file_cache.insert(name.to_string(), loaded);
    }

    /// Walk the roots as a directory tree: each segment is either a
    /// subdirectory, a `<segment>.json` file, or the start of the longest
    /// run of segments joining to a relative file path.
    fn ensure_structural(&mut self, segments: &[String]) -> Option<(String, usize)> {
        let memo_key = segments.join(".");
        if let Some(hit) = self.structural_cache.get(&memo_key) {
            return hit.clone();
        }

        let mut result = None;
        'roots: for root in &self.options.roots {
            let mut dir = root.clone();
            let mut index = 0;
            while index < segments.len() {
                let segment = &segments[index];

                let file = dir.join(format!("{}.json", segment));
                if file.is_file() {
                    result = Some((file, index + 1));
                    break 'roots;
                }

                let sub = dir.join(segment);
                if sub.is_dir() {
                    dir = sub;
                    index += 1;
                    continue;
                }

                // Longest run of remaining segments joined as a path.
                for end in (index..segments.len()).rev() {
                    let joined = segments[index..=end].join("/");
                    let file = dir.join(format!("{}.json", joined));
                    if file.is_file() {
                        result = Some((file, end + 1));
                        break 'roots;
                    }
                }
                break;
            }
        }

        let entry = result.and_then(|(file, consumed)| {
            let key = format!("struct:{}", file.display());
            if !self.file_cache.contains_key(&key) {
                let parsed = parse_file(&file);
                self.file_cache.insert(key.clone(), parsed);
            }
            Some((key, consumed))
        });

        self.structural_cache.insert(memo_key, entry.clone());
        entry
    }

    fn record(&mut self, source: &str, reference: &str, reason: UnresolvedReason) {
        let diag = Diagnostic::new(source, reference, reason);
        if !self.diagnostics.contains(&diag) {
            log::warn!("Unresolved reference {}", diag.render());
            self.diagnostics.push(diag);
        }
    }
}

/// Walk key segments into a document, honoring `$`-prefixed spellings and
/// numeric array indices.
fn reduce<'v>(doc: &'v Value, segments: &[String]) -> Option<&'v Value> {
    let mut current = doc;
    for segment in segments {
        current = match current {
            Value::Object(map) => token::field(map, segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

fn parse_file(path: &std::path::Path) -> Option<Value> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::error!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!("Malformed JSON in {}: {}", path.display(), e);
            None
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n
            .as_f64()
            .map(utils::format_number)
            .unwrap_or_else(|| n.to_string()),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Prefer integer JSON numbers when the result is whole.
fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < (i64::MAX as f64) {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn resolver_with(files: &[(&str, Value)]) -> (TempDir, TokenResolver) {
        let dir = TempDir::new().unwrap();
        for (name, doc) in files {
            fs::write(
                dir.path().join(format!("{}.json", name)),
                serde_json::to_string(doc).unwrap(),
            )
            .unwrap();
        }
        let resolver = TokenResolver::new(ResolverOptions {
            roots: vec![dir.path().to_path_buf()],
            structural_lookup: false,
        });
        (dir, resolver)
    }

    #[test]
    fn test_cross_file_reference_keeps_native_type() {
        let (_dir, mut resolver) = resolver_with(&[
            ("core", json!({"spacing": {"sm": {"value": 8}}})),
            ("aliases", json!({"spacing": {"md": {"value": "{core.spacing.sm.value}"}}})),
        ]);

        let resolved = resolver.resolve_value("{core.spacing.sm.value}", "aliases");
        assert_eq!(resolved, json!(8));

        // Through the token coercion: referencing the token object itself.
        let resolved = resolver.resolve_value("{core.spacing.sm}", "aliases");
        assert_eq!(resolved, json!(8));
    }

    #[test]
    fn test_string_templating() {
        let (_dir, mut resolver) = resolver_with(&[(
            "core",
            json!({"font": {"family": {"value": "Inter"}}, "size": {"value": 14}}),
        )]);

        let resolved = resolver.resolve_value("{core.size} {core.font.family}", "core");
        assert_eq!(resolved, json!("14 Inter"));
    }

    #[test]
    fn test_arithmetic_over_references() {
        let (_dir, mut resolver) = resolver_with(&[
            ("roundness", json!({"xxl": {"value": 32}})),
            ("spacing", json!({"xxs": {"value": 4}})),
            ("scale", json!({"ratio": {"value": 0.5}})),
        ]);

        let resolved = resolver.resolve_value("{roundness.xxl} - {spacing.xxs}", "aliases");
        assert_eq!(resolved, json!(28));

        let resolved =
            resolver.resolve_value("({roundness.xxl} * {scale.ratio}) + {spacing.xxs}", "aliases");
        assert_eq!(resolved, json!(20));
    }

    #[test]
    fn test_cycle_is_non_fatal() {
        let (_dir, mut resolver) =
            resolver_with(&[("selfref", json!({"a": {"value": "{selfref.a}"}}))]);

        let resolved = resolver.resolve_value("{selfref.a}", "selfref");
        assert_eq!(resolved, json!("{selfref.a}"));
        assert_eq!(resolver.diagnostics().len(), 1);
        assert_eq!(resolver.diagnostics()[0].reason, UnresolvedReason::Cycle);
    }

    #[test]
    fn test_unresolved_reference_retained() {
        let (_dir, mut resolver) = resolver_with(&[("core", json!({}))]);

        let resolved = resolver.resolve_value("{core.missing.key}", "core");
        assert_eq!(resolved, json!("{core.missing.key}"));
        assert_eq!(resolver.diagnostics()[0].reason, UnresolvedReason::NotFound);
    }

    #[test]
    fn test_resolve_document_is_idempotent() {
        let (_dir, mut resolver) = resolver_with(&[
            ("core", json!({"spacing": {"sm": {"value": 8}}})),
        ]);
        let doc = json!({
            "spacing": {"md": {"value": "{core.spacing.sm}", "type": "dimension"}},
            "label": {"value": "plain text"}
        });

        let once = resolver.resolve_document("aliases", &doc);
        assert_eq!(once["spacing"]["md"]["value"], json!(8));

        let twice = resolver.resolve_document("aliases", &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_reference_into_aliased_object_is_fully_resolved() {
        let (_dir, mut resolver) = resolver_with(&[
            ("core", json!({"color": {"primary": {"value": "#0ea5e9"}}})),
            (
                "button",
                json!({"root": {"bg": {"value": "{core.color.primary}"}}}),
            ),
        ]);

        // An alias to a whole subtree resolves the subtree's own references.
        let resolved = resolver.resolve_value("{button.root}", "aliases");
        assert_eq!(resolved, json!({"bg": {"value": "#0ea5e9"}}));
    }

    #[test]
    fn test_dollar_prefixed_fields_resolve() {
        let (_dir, mut resolver) = resolver_with(&[
            ("core", json!({"spacing": {"sm": {"$value": 8, "$type": "number"}}})),
        ]);

        let resolved = resolver.resolve_value("{core.spacing.sm}", "aliases");
        assert_eq!(resolved, json!(8));
    }

    #[test]
    fn test_structural_lookup() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("colors")).unwrap();
        fs::write(
            dir.path().join("colors/brand.json"),
            serde_json::to_string(&json!({"primary": {"value": "#0ea5e9"}})).unwrap(),
        )
        .unwrap();

        let mut resolver = TokenResolver::new(ResolverOptions {
            roots: vec![dir.path().to_path_buf()],
            structural_lookup: true,
        });

        let resolved = resolver.resolve_value("{colors.brand.primary}", "aliases");
        assert_eq!(resolved, json!("#0ea5e9"));

        // Memoized walk answers the second hit from cache.
        let resolved = resolver.resolve_value("{colors.brand.primary.value}", "aliases");
        assert_eq!(resolved, json!("#0ea5e9"));
    }

    #[test]
    fn test_structural_lookup_longest_run() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("component")).unwrap();
        fs::write(
            dir.path().join("component/button-primary.json"),
            serde_json::to_string(&json!({"radius": {"value": 6}})).unwrap(),
        )
        .unwrap();

        let mut resolver = TokenResolver::new(ResolverOptions {
            roots: vec![dir.path().to_path_buf()],
            structural_lookup: true,
        });

        let resolved = resolver.resolve_value("{component.button-primary.radius}", "aliases");
        assert_eq!(resolved, json!(6));
    }

    #[test]
    fn test_date_like_strings_are_not_arithmetic() {
        let (_dir, mut resolver) = resolver_with(&[
            ("meta", json!({"year": {"value": "2025"}})),
        ]);

        let resolved = resolver.resolve_value("{meta.year}-06-01", "meta");
        assert_eq!(resolved, json!("2025-06-01"));
    }
}

//! Per-theme CSS generation
//!
//! Walks named theme trees and emits one `[data-theme="x"]` block per
//! theme, containing that theme's exportable variables. Naming and value
//! rendering are shared with the emitter so a token produces the same
//! variable text whether it lands in `:root` or in a theme block.

use crate::emitter::{EmitOptions, Emitter};
use crate::resolver::TokenResolver;
use crate::token;
use crate::utils::to_kebab_case;
use serde_json::{Map, Value};

const INDENT: &str = "  ";

pub struct ThemeGenerator {
    emitter: Emitter,
}

impl ThemeGenerator {
    /// Theme variables are named from their in-theme path alone, so the
    /// file-name prefix is disabled regardless of the build options.
    pub fn new(options: &EmitOptions) -> Self {
        let mut options = options.clone();
        options.include_file_name = false;
        Self {
            emitter: Emitter::new(options),
        }
    }

    /// Render all themes. `include_only_exportable` limits each block to
    /// tokens flagged via `meta.build.web.exportAsVar`; themes with no
    /// matching tokens produce no block.
    pub fn generate(
        &mut self,
        resolver: &mut TokenResolver,
        themes: &Map<String, Value>,
        include_only_exportable: bool,
    ) -> String {
        let themes = unwrap_single_wrapper(themes);
        let mut out = String::new();

        for (name, tree) in themes {
            let mut lines = Vec::new();
            self.emitter.begin_file(name, None);
            self.collect(resolver, tree, &mut Vec::new(), include_only_exportable, &mut lines);
            if lines.is_empty() {
                log::debug!("Theme '{}' has no exportable variables, skipping", name);
                continue;
            }
            out.push_str(&format!("[data-theme=\"{}\"] {{\n", to_kebab_case(name)));
            for line in lines {
                out.push_str(&line);
            }
            out.push_str("}\n");
        }

        out
    }

    fn collect(
        &mut self,
        resolver: &mut TokenResolver,
        value: &Value,
        path: &mut Vec<String>,
        only_exportable: bool,
        lines: &mut Vec<String>,
    ) {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => return,
        };

        if token::is_token_object(value) {
            if only_exportable && !token::export_as_var(obj) {
                return;
            }
            let name = self.emitter.variable_name(resolver, obj, path);
            let rendered = self.emitter.render_token_value(resolver, obj, path);
            lines.push(format!("{}{}: {};\n", INDENT, name, rendered));
            return;
        }

        for (key, child) in obj {
            path.push(key.clone());
            self.collect(resolver, child, path, only_exportable, lines);
            path.pop();
        }
    }
}

/// Themes sometimes arrive nested one level deeper than expected: a
/// single-key wrapper whose sole value is the actual name -> tree map.
/// A genuine single theme also has one top-level key, so the wrapper is
/// only unwrapped when the grandchildren are still trees rather than
/// tokens: real theme groups carry token leaves one level down.
fn unwrap_single_wrapper(themes: &Map<String, Value>) -> &Map<String, Value> {
    if themes.len() != 1 {
        return themes;
    }
    let inner = match themes.values().next() {
        Some(Value::Object(inner)) if !inner.is_empty() => inner,
        _ => return themes,
    };
    let is_tree = |v: &Value| v.is_object() && !token::is_token_object(v);
    let wrapper_shaped = inner.values().all(|candidate| {
        is_tree(candidate)
            && candidate
                .as_object()
                .map(|groups| !groups.is_empty() && groups.values().all(is_tree))
                .unwrap_or(false)
    });
    if wrapper_shaped {
        inner
    } else {
        themes
    }
}

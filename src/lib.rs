//! Tokc Design Token Compiler
//!
//! A compiler for design-token JSON documents that produces the two build
//! artifacts a front-end styling pipeline consumes: nested SCSS map
//! literals and flat CSS custom-property declarations, including per-theme
//! `[data-theme="x"]` blocks.
//!
//! # Features
//!
//! - `{dotted.path}` reference resolution across files with cycle detection
//! - Flat and structural (directory-tree) source lookup strategies
//! - Arithmetic over resolved numeric values
//! - Functional color algebra with perceptual OKLab/OKLCH math and
//!   WCAG-contrast-driven color selection
//! - CSS variable collection with configurable naming, exclusion and
//!   first-wins/last-wins conflict policy
//! - Theme CSS generation from named theme trees
//! - Resolved-JSON mirrors, entry module and diagnostics log per build
//!
//! # Basic Usage
//!
//! ```no_run
//! use tokc::{build, BuildOptions, Result};
//!
//! fn main() -> Result<()> {
//!     let options = BuildOptions {
//!         source_dirs: vec!["tokens".into()],
//!         scss_dir: Some("styles/generated".into()),
//!         ..Default::default()
//!     };
//!     build(&options)?;
//!     Ok(())
//! }
//! ```
//!
//! # Build Pipeline
//!
//! 1. **Phase 1**: Collect source files (stable lexicographic order)
//! 2. **Phase 2**: Resolve each document and mirror it into the cache
//! 3. **Phase 3**: Serialize map literals and collect CSS variables
//! 4. **Phase 4**: Write map/CSS artifacts and the entry module
//! 5. **Phase 5**: Generate theme CSS blocks
//! 6. **Phase 6**: Write the unresolved-reference diagnostics log

pub mod cli;
pub mod color;
pub mod emitter;
pub mod error;
pub mod resolver;
pub mod theme;
pub mod token;
pub mod utils;

use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

// Re-export commonly used types and functions
pub use cli::TokenCli;
pub use color::{contrast_ratio, try_parse_color, ColorFormat, Rgba};
pub use emitter::{CssVarOptions, CssVariable, EmitOptions, Emitter, VarPreference};
pub use error::{Diagnostic, Result, TokenError, UnresolvedReason};
pub use resolver::{ResolverOptions, TokenResolver, MAX_RESOLUTION_DEPTH};
pub use theme::ThemeGenerator;
pub use token::{resolve_service_fields, ServiceFieldSet, TokenType};

/// Compiler version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Name of the diagnostics log written to the cache directory.
pub const DIAGNOSTICS_LOG: &str = "unresolved.log";

/// Where theme trees come from: one file of name -> tree, or a directory
/// where each JSON file is a theme named by its base name.
#[derive(Debug, Clone)]
pub struct ThemeOptions {
    pub source: PathBuf,
    pub output: PathBuf,
    pub include_only_exportable: bool,
}

/// Build configuration and settings
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directories scanned for token source files
    pub source_dirs: Vec<PathBuf>,

    /// Directory for resolved-JSON mirrors and the diagnostics log
    pub cache_dir: PathBuf,

    /// Directory for generated `_<file>.scss` map files
    pub scss_dir: Option<PathBuf>,

    /// Entry module re-exporting every resolved document
    pub entry_file: Option<PathBuf>,

    /// Spread resolved documents into one merged object instead of a
    /// keyed module map
    pub entry_merged: bool,

    /// Write the collected `:root` block to this file
    pub css_file: Option<PathBuf>,

    /// Append each file's variables to its map file instead
    pub append_css_to_maps: bool,

    /// Enable the filesystem-tree lookup fallback
    pub structural_lookup: bool,

    /// Serialization and CSS-variable options
    pub emit: EmitOptions,

    /// Theme generation, when configured
    pub themes: Option<ThemeOptions>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            source_dirs: vec![PathBuf::from("tokens")],
            cache_dir: PathBuf::from(".tokc-cache"),
            scss_dir: None,
            entry_file: None,
            entry_merged: false,
            css_file: None,
            append_css_to_maps: false,
            structural_lookup: false,
            emit: EmitOptions::default(),
            themes: None,
        }
    }
}

/// Build statistics and metrics
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStats {
    /// Number of source files processed
    pub file_count: usize,

    /// Files skipped because their JSON failed to parse
    pub skipped_files: usize,

    /// Token objects seen across all resolved documents
    pub token_count: usize,

    /// CSS variables collected
    pub variable_count: usize,

    /// Theme blocks emitted
    pub theme_count: usize,

    /// Unresolved reference occurrences
    pub unresolved_count: usize,

    /// Build time in milliseconds
    pub build_time_ms: u64,
}

/// Run a full build, writing every configured artifact.
pub fn build(options: &BuildOptions) -> Result<BuildStats> {
    run(options, true)
}

/// Run the resolution pass without writing artifacts and fail when any
/// reference is unresolved. This is the "no unresolved tokens" policy
/// layered above the engine, not part of its own success contract.
pub fn check(options: &BuildOptions) -> Result<BuildStats> {
    let stats = run(options, false)?;
    if stats.unresolved_count > 0 {
        return Err(TokenError::UnresolvedReferences {
            count: stats.unresolved_count,
            log: options.cache_dir.join(DIAGNOSTICS_LOG).display().to_string(),
        });
    }
    Ok(stats)
}

fn run(options: &BuildOptions, write_artifacts: bool) -> Result<BuildStats> {
    let start_time = Instant::now();
    let mut stats = BuildStats::default();

    if write_artifacts {
        fs::create_dir_all(&options.cache_dir)?;
        if let Some(dir) = &options.scss_dir {
            fs::create_dir_all(dir)?;
        }
    }

    log::debug!("Phase 1: Collecting source files...");
    let files = collect_source_files(&options.source_dirs);
    log::debug!("Phase 1 complete. {} source file(s)", files.len());

    let mut resolver = TokenResolver::new(ResolverOptions {
        roots: options.source_dirs.clone(),
        structural_lookup: options.structural_lookup,
    });

    let mut emit_options = options.emit.clone();
    emit_options.roots = options.source_dirs.clone();
    let mut emitter = Emitter::new(emit_options);

    log::debug!("Phase 2: Resolving documents...");
    let mut resolved_docs: Vec<(String, Value)> = Vec::new();
    let mut map_texts: Vec<(String, String)> = Vec::new();

    for path in &files {
        let name = utils::file_stem_of(path);
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::error!("Failed to read {}: {}", path.display(), e);
                stats.skipped_files += 1;
                continue;
            }
        };
        let doc: Value = match serde_json::from_str(&content) {
            Ok(doc) => doc,
            Err(e) => {
                // A malformed file is fatal for itself only.
                log::error!("Malformed JSON in {}: {}", path.display(), e);
                stats.skipped_files += 1;
                continue;
            }
        };

        let resolved = resolver.resolve_document(&name, &doc);
        stats.token_count += count_tokens(&resolved);

        if write_artifacts {
            let mirror = options.cache_dir.join(format!("{}.json", name));
            let pretty = serde_json::to_string_pretty(&resolved)
                .map_err(|e| TokenError::output(mirror.display().to_string(), e.to_string()))?;
            write_if_changed(&mirror, &pretty)?;
        }

        emitter.begin_file(&name, Some(path.as_path()));
        let map_text = emitter.serialize(&mut resolver, &resolved, &[]);
        map_texts.push((name.clone(), map_text));
        resolved_docs.push((name, resolved));
        stats.file_count += 1;
    }
    log::debug!(
        "Phase 2 complete. {} document(s) resolved, {} skipped",
        stats.file_count,
        stats.skipped_files
    );

    stats.variable_count = emitter.variables().len();

    if write_artifacts {
        log::debug!("Phase 3: Writing map and CSS artifacts...");
        if let Some(scss_dir) = &options.scss_dir {
            for (name, text) in &map_texts {
                let mut content =
                    format!("${}-map: {};\n", utils::to_kebab_case(name), text);
                if options.append_css_to_maps {
                    let own: Vec<&CssVariable> = emitter
                        .variables()
                        .iter()
                        .filter(|v| &v.source == name)
                        .collect();
                    if !own.is_empty() {
                        content.push_str("\n:root {\n");
                        for var in own {
                            content.push_str(&format!("  {}: {};\n", var.name, var.value));
                        }
                        content.push_str("}\n");
                    }
                }
                write_if_changed(&scss_dir.join(format!("_{}.scss", name)), &content)?;
            }
        }
        if let Some(css_file) = &options.css_file {
            if let Some(parent) = css_file.parent() {
                fs::create_dir_all(parent)?;
            }
            write_if_changed(css_file, &emitter.render_root_block())?;
        }

        log::debug!("Phase 4: Writing entry module...");
        if let Some(entry_file) = &options.entry_file {
            let entry = render_entry(&resolved_docs, options.entry_merged);
            let pretty = serde_json::to_string_pretty(&entry)
                .map_err(|e| TokenError::output(entry_file.display().to_string(), e.to_string()))?;
            if let Some(parent) = entry_file.parent() {
                fs::create_dir_all(parent)?;
            }
            write_if_changed(entry_file, &pretty)?;
        }
    }

    if let Some(theme_options) = &options.themes {
        log::debug!("Phase 5: Generating theme CSS...");
        let themes = load_themes(&theme_options.source)?;
        let mut generator = ThemeGenerator::new(&options.emit);
        let css = generator.generate(
            &mut resolver,
            &themes,
            theme_options.include_only_exportable,
        );
        stats.theme_count = css.matches("[data-theme=").count();
        if write_artifacts {
            if let Some(parent) = theme_options.output.parent() {
                fs::create_dir_all(parent)?;
            }
            write_if_changed(&theme_options.output, &css)?;
        }
        log::debug!("Phase 5 complete. {} theme block(s)", stats.theme_count);
    }

    log::debug!("Phase 6: Writing diagnostics log...");
    let diagnostics = resolver.take_diagnostics();
    stats.unresolved_count = diagnostics.len();
    if write_artifacts {
        let mut log_text = String::new();
        for diag in &diagnostics {
            log_text.push_str(&diag.render());
            log_text.push('\n');
        }
        write_if_changed(&options.cache_dir.join(DIAGNOSTICS_LOG), &log_text)?;
    }

    stats.build_time_ms = start_time.elapsed().as_millis() as u64;
    log::info!(
        "Build complete: {} file(s), {} token(s), {} CSS variable(s), {} unresolved, {}ms",
        stats.file_count,
        stats.token_count,
        stats.variable_count,
        stats.unresolved_count,
        stats.build_time_ms
    );

    Ok(stats)
}

/// Token source files in stable lexicographic order, skipping dotfiles and
/// underscore-prefixed files and directories.
fn collect_source_files(source_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in source_dirs {
        let walker = WalkDir::new(dir)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !utils::is_hidden_or_partial(e.path()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path.to_path_buf());
            }
        }
    }
    files.sort();
    files
}

fn render_entry(resolved_docs: &[(String, Value)], merged: bool) -> Value {
    let mut out = Map::new();
    for (name, doc) in resolved_docs {
        if merged {
            if let Value::Object(obj) = doc {
                for (key, value) in obj {
                    out.insert(key.clone(), value.clone());
                }
            }
        } else {
            out.insert(name.clone(), doc.clone());
        }
    }
    Value::Object(out)
}

fn load_themes(source: &Path) -> Result<Map<String, Value>> {
    if source.is_dir() {
        let mut themes = Map::new();
        for path in collect_source_files(&[source.to_path_buf()]) {
            let content = fs::read_to_string(&path)?;
            let doc: Value = serde_json::from_str(&content)
                .map_err(|e| TokenError::theme(format!("{}: {}", path.display(), e)))?;
            themes.insert(utils::file_stem_of(&path), doc);
        }
        Ok(themes)
    } else {
        let content = fs::read_to_string(source).map_err(|_| TokenError::FileNotFound {
            path: source.display().to_string(),
        })?;
        let doc: Value = serde_json::from_str(&content)
            .map_err(|e| TokenError::theme(format!("{}: {}", source.display(), e)))?;
        match doc {
            Value::Object(map) => Ok(map),
            _ => Err(TokenError::theme(format!(
                "{}: theme source must be a JSON object",
                source.display()
            ))),
        }
    }
}

fn count_tokens(value: &Value) -> usize {
    match value {
        Value::Object(obj) => {
            if token::is_token_object(value) {
                1
            } else {
                obj.values().map(count_tokens).sum()
            }
        }
        Value::Array(items) => items.iter().map(count_tokens).sum(),
        _ => 0,
    }
}

/// Skip the write when the on-disk content already matches, so unchanged
/// artifacts keep their timestamps.
fn write_if_changed(path: &Path, content: &str) -> Result<()> {
    if let Ok(existing) = fs::read(path) {
        if md5::compute(&existing) == md5::compute(content.as_bytes()) {
            log::debug!("Unchanged, skipping write: {}", path.display());
            return Ok(());
        }
    }
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        options: BuildOptions,
    }

    fn fixture(files: &[(&str, Value)]) -> Fixture {
        let root = TempDir::new().unwrap();
        let source = root.path().join("tokens");
        fs::create_dir_all(&source).unwrap();
        for (name, doc) in files {
            fs::write(
                source.join(format!("{}.json", name)),
                serde_json::to_string_pretty(doc).unwrap(),
            )
            .unwrap();
        }
        let options = BuildOptions {
            source_dirs: vec![source],
            cache_dir: root.path().join("cache"),
            scss_dir: Some(root.path().join("scss")),
            entry_file: Some(root.path().join("cache/entry.json")),
            ..Default::default()
        };
        Fixture {
            _root: root,
            options,
        }
    }

    fn core_and_aliases() -> Vec<(&'static str, Value)> {
        vec![
            ("core", json!({"spacing": {"sm": {"value": 8}}})),
            (
                "aliases",
                json!({
                    "spacing": {
                        "md": {
                            "value": "{core.spacing.sm.value}",
                            "meta": {"build": {"web": {"exportAsVar": true}}}
                        }
                    }
                }),
            ),
        ]
    }

    #[test]
    fn test_build_writes_resolved_mirrors_and_maps() {
        let fixture = fixture(&core_and_aliases());
        let stats = build(&fixture.options).unwrap();

        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.unresolved_count, 0);

        let mirror: Value = serde_json::from_str(
            &fs::read_to_string(fixture.options.cache_dir.join("aliases.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(mirror["spacing"]["md"]["value"], json!(8));

        let map = fs::read_to_string(
            fixture.options.scss_dir.as_ref().unwrap().join("_aliases.scss"),
        )
        .unwrap();
        assert!(map.starts_with("$aliases-map: ("));
        assert!(map.contains("md: 8px"));
    }

    #[test]
    fn test_build_is_idempotent() {
        let fixture = fixture(&core_and_aliases());
        build(&fixture.options).unwrap();
        let first =
            fs::read_to_string(fixture.options.cache_dir.join("aliases.json")).unwrap();

        build(&fixture.options).unwrap();
        let second =
            fs::read_to_string(fixture.options.cache_dir.join("aliases.json")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_entry_module_keyed_and_merged() {
        let mut fixture = fixture(&core_and_aliases());
        build(&fixture.options).unwrap();
        let entry: Value = serde_json::from_str(
            &fs::read_to_string(fixture.options.entry_file.as_ref().unwrap()).unwrap(),
        )
        .unwrap();
        assert!(entry.get("core").is_some());
        assert!(entry.get("aliases").is_some());

        fixture.options.entry_merged = true;
        build(&fixture.options).unwrap();
        let entry: Value = serde_json::from_str(
            &fs::read_to_string(fixture.options.entry_file.as_ref().unwrap()).unwrap(),
        )
        .unwrap();
        // Merged entries spread top-level keys directly.
        assert!(entry.get("spacing").is_some());
        assert!(entry.get("core").is_none());
    }

    #[test]
    fn test_css_file_contains_exported_variable() {
        let mut fixture = fixture(&core_and_aliases());
        fixture.options.css_file = Some(fixture.options.cache_dir.join("tokens.css"));
        fixture.options.emit.prefix = Some("ds".to_string());
        fixture.options.emit.include_file_name = true;

        build(&fixture.options).unwrap();
        let css =
            fs::read_to_string(fixture.options.css_file.as_ref().unwrap()).unwrap();
        assert!(css.contains("  --ds-aliases-spacing-md: 8px;\n"), "{}", css);
    }

    #[test]
    fn test_malformed_file_skipped_but_build_succeeds() {
        let fixture = fixture(&core_and_aliases());
        fs::write(
            fixture.options.source_dirs[0].join("broken.json"),
            "{ not json",
        )
        .unwrap();

        let stats = build(&fixture.options).unwrap();
        assert_eq!(stats.skipped_files, 1);
        assert_eq!(stats.file_count, 2);
    }

    #[test]
    fn test_hidden_and_partial_files_skipped() {
        let fixture = fixture(&core_and_aliases());
        fs::write(fixture.options.source_dirs[0].join("_draft.json"), "{}").unwrap();
        fs::write(fixture.options.source_dirs[0].join(".hidden.json"), "{}").unwrap();

        let stats = build(&fixture.options).unwrap();
        assert_eq!(stats.file_count, 2);
    }

    #[test]
    fn test_unresolved_reference_reaches_diagnostics_log() {
        let fixture = fixture(&[(
            "aliases",
            json!({"gap": {"value": "{core.spacing.missing}"}}),
        )]);

        let stats = build(&fixture.options).unwrap();
        assert_eq!(stats.unresolved_count, 1);

        let log = fs::read_to_string(fixture.options.cache_dir.join(DIAGNOSTICS_LOG)).unwrap();
        assert!(log.contains("{core.spacing.missing}"));

        // The literal text is retained in the mirror.
        let mirror: Value = serde_json::from_str(
            &fs::read_to_string(fixture.options.cache_dir.join("aliases.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(mirror["gap"]["value"], json!("{core.spacing.missing}"));
    }

    #[test]
    fn test_check_fails_on_unresolved() {
        let good = fixture(&core_and_aliases());
        let bad = fixture(&[(
            "aliases",
            json!({"gap": {"value": "{core.spacing.missing}"}}),
        )]);

        let result = check(&bad.options);
        assert!(matches!(
            result,
            Err(TokenError::UnresolvedReferences { count: 1, .. })
        ));

        assert!(check(&good.options).is_ok());
    }

    #[test]
    fn test_theme_generation_end_to_end() {
        let mut fixture = fixture(&core_and_aliases());
        let themes_path = fixture.options.cache_dir.join("../themes.json");
        fs::create_dir_all(themes_path.parent().unwrap()).unwrap();
        fs::write(
            &themes_path,
            serde_json::to_string(&json!({
                "light": {"surface": {"neutral": {
                    "value": "#ffffff",
                    "meta": {"build": {"web": {"exportAsVar": true}}}
                }}},
                "dark": {"surface": {"neutral": {
                    "value": "#111111",
                    "meta": {"build": {"web": {"exportAsVar": true}}}
                }}}
            }))
            .unwrap(),
        )
        .unwrap();

        let output = fixture.options.cache_dir.join("themes.css");
        fixture.options.themes = Some(ThemeOptions {
            source: themes_path,
            output: output.clone(),
            include_only_exportable: true,
        });

        let stats = build(&fixture.options).unwrap();
        assert_eq!(stats.theme_count, 2);

        let css = fs::read_to_string(output).unwrap();
        assert!(css.contains("[data-theme=\"light\"]"));
        assert!(css.contains("--surface-neutral: #111111;"));
    }

    #[test]
    fn test_append_css_to_maps() {
        let mut fixture = fixture(&core_and_aliases());
        fixture.options.append_css_to_maps = true;

        build(&fixture.options).unwrap();
        let map = fs::read_to_string(
            fixture.options.scss_dir.as_ref().unwrap().join("_aliases.scss"),
        )
        .unwrap();
        assert!(map.contains(":root {"));
        assert!(map.contains("--spacing-md: 8px;"));

        // core.json exports nothing, so no block is appended there.
        let core = fs::read_to_string(
            fixture.options.scss_dir.as_ref().unwrap().join("_core.scss"),
        )
        .unwrap();
        assert!(!core.contains(":root"));
    }

    #[test]
    fn test_count_tokens() {
        let doc = json!({
            "a": {"value": 1},
            "b": {"nested": {"value": 2}, "other": {"$value": 3}}
        });
        assert_eq!(count_tokens(&doc), 3);
    }
}

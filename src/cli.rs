//! Command-line interface for the Tokc compiler

use crate::error::{Result, TokenError};
use crate::{build, check, BuildOptions, BuildStats, CssVarOptions, ThemeOptions, VarPreference};
use clap::{Arg, ArgAction, Command};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::time::Duration;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigFile {
    source_dirs: Option<Vec<String>>,
    cache_dir: Option<String>,
    scss_dir: Option<String>,
    entry_file: Option<String>,
    entry_merged: Option<bool>,
    css_file: Option<String>,
    append_css_to_maps: Option<bool>,
    structural_lookup: Option<bool>,
    kebab_case_keys: Option<bool>,
    prefix: Option<String>,
    include_file_name: Option<bool>,
    dollar_service_keys: Option<bool>,
    service_fields: Option<Vec<String>>,
    default_unit: Option<String>,
    css_vars: Option<bool>,
    css_prefix: Option<String>,
    css_exclude: Option<Vec<String>>,
    css_prefer: Option<String>,
    theme_source: Option<String>,
    theme_output: Option<String>,
    theme_only_exportable: Option<bool>,
}

const SAMPLE_CONFIG: &str = r#"# Tokc build configuration
source_dirs = ["tokens"]
cache_dir = ".tokc-cache"
scss_dir = "styles/generated"
entry_file = ".tokc-cache/entry.json"

prefix = "ds"
include_file_name = true
kebab_case_keys = true

css_file = "styles/generated/tokens.css"
css_prefer = "last"

# theme_source = "tokens/themes.json"
# theme_output = "styles/generated/themes.css"
# theme_only_exportable = true
"#;

pub struct TokenCli {
    config: ConfigFile,
}

impl TokenCli {
    pub fn new() -> Self {
        Self {
            config: ConfigFile::default(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let matches = self.build_cli().get_matches();

        if let Some(config_path) = matches.get_one::<String>("config") {
            self.load_config_file(config_path)?;
        }

        let verbose = matches.get_count("verbose");
        setup_logging(verbose);

        match matches.subcommand() {
            Some(("build", sub_matches)) => self.handle_build_command(sub_matches),
            Some(("check", sub_matches)) => self.handle_check_command(sub_matches),
            Some(("init", sub_matches)) => self.handle_init_command(sub_matches),
            _ => {
                println!("No subcommand specified. Use --help for usage information.");
                Ok(())
            }
        }
    }

    fn build_cli(&self) -> Command {
        Command::new(crate::NAME)
            .version(crate::VERSION)
            .about(crate::DESCRIPTION)
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path (.json or .toml)")
                    .action(ArgAction::Set)
                    .global(true),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Increase verbosity (can be used multiple times)")
                    .action(ArgAction::Count)
                    .global(true),
            )
            .subcommand(
                Command::new("build")
                    .about("Compile token sources into SCSS maps and CSS variables")
                    .arg(
                        Arg::new("source")
                            .short('s')
                            .long("source")
                            .value_name("DIR")
                            .help("Add a token source directory")
                            .action(ArgAction::Append),
                    )
                    .arg(
                        Arg::new("cache")
                            .long("cache")
                            .value_name("DIR")
                            .help("Cache directory for resolved JSON and diagnostics"),
                    )
                    .arg(
                        Arg::new("scss")
                            .short('o')
                            .long("scss")
                            .value_name("DIR")
                            .help("Output directory for generated map files"),
                    )
                    .arg(
                        Arg::new("css")
                            .long("css")
                            .value_name("FILE")
                            .help("Write the collected :root block to this file"),
                    )
                    .arg(
                        Arg::new("entry")
                            .long("entry")
                            .value_name("FILE")
                            .help("Write the resolved-module entry file"),
                    )
                    .arg(
                        Arg::new("prefix")
                            .short('p')
                            .long("prefix")
                            .value_name("NAME")
                            .help("Prefix for CSS variable names"),
                    )
                    .arg(
                        Arg::new("css-vars")
                            .long("css-vars")
                            .help("Convert every token to a CSS variable")
                            .action(ArgAction::SetTrue),
                    )
                    .arg(
                        Arg::new("themes")
                            .long("themes")
                            .value_name("PATH")
                            .help("Theme source file or directory"),
                    )
                    .arg(
                        Arg::new("theme-out")
                            .long("theme-out")
                            .value_name("FILE")
                            .help("Output file for theme CSS blocks"),
                    )
                    .arg(
                        Arg::new("stats")
                            .long("stats")
                            .help("Show detailed build statistics")
                            .action(ArgAction::SetTrue),
                    )
                    .arg(
                        Arg::new("watch")
                            .short('w')
                            .long("watch")
                            .help("Watch source directories and rebuild on changes")
                            .action(ArgAction::SetTrue),
                    ),
            )
            .subcommand(
                Command::new("check")
                    .about("Verify that every token reference resolves")
                    .arg(
                        Arg::new("source")
                            .short('s')
                            .long("source")
                            .value_name("DIR")
                            .help("Add a token source directory")
                            .action(ArgAction::Append),
                    ),
            )
            .subcommand(
                Command::new("init")
                    .about("Write a starter configuration file")
                    .arg(
                        Arg::new("path")
                            .help("Destination path")
                            .default_value("tokc.toml")
                            .index(1),
                    ),
            )
    }

    fn load_config_file(&mut self, config_path: &str) -> Result<()> {
        let content = fs::read_to_string(config_path).map_err(|e| TokenError::FileNotFound {
            path: format!("Config file {}: {}", config_path, e),
        })?;

        self.config = if config_path.ends_with(".json") {
            serde_json::from_str(&content).map_err(|e| TokenError::InvalidFormat {
                message: format!("Invalid JSON config: {}", e),
            })?
        } else if config_path.ends_with(".toml") {
            toml::from_str(&content).map_err(|e| TokenError::InvalidFormat {
                message: format!("Invalid TOML config: {}", e),
            })?
        } else {
            return Err(TokenError::InvalidFormat {
                message: "Config file must be .json or .toml format".to_string(),
            });
        };

        log::info!("Loaded configuration from {}", config_path);
        Ok(())
    }

    fn build_options(&self, matches: &clap::ArgMatches) -> BuildOptions {
        let mut options = BuildOptions::default();

        let mut sources: Vec<PathBuf> = Vec::new();
        if let Some(dirs) = matches.try_get_many::<String>("source").ok().flatten() {
            sources.extend(dirs.map(PathBuf::from));
        }
        if sources.is_empty() {
            if let Some(dirs) = &self.config.source_dirs {
                sources.extend(dirs.iter().map(PathBuf::from));
            }
        }
        if !sources.is_empty() {
            options.source_dirs = sources;
        }

        let string_arg = |name: &str| -> Option<String> {
            matches.try_get_one::<String>(name).ok().flatten().cloned()
        };
        let flag = |name: &str| matches.try_get_one::<bool>(name).ok().flatten() == Some(&true);

        if let Some(dir) = string_arg("cache").or_else(|| self.config.cache_dir.clone()) {
            options.cache_dir = PathBuf::from(dir);
        }
        options.scss_dir = string_arg("scss")
            .or_else(|| self.config.scss_dir.clone())
            .map(PathBuf::from);
        options.css_file = string_arg("css")
            .or_else(|| self.config.css_file.clone())
            .map(PathBuf::from);
        options.entry_file = string_arg("entry")
            .or_else(|| self.config.entry_file.clone())
            .map(PathBuf::from);
        options.entry_merged = self.config.entry_merged.unwrap_or(false);
        options.append_css_to_maps = self.config.append_css_to_maps.unwrap_or(false);
        options.structural_lookup = self.config.structural_lookup.unwrap_or(false);

        options.emit.kebab_case_keys = self.config.kebab_case_keys.unwrap_or(false);
        options.emit.prefix = string_arg("prefix").or_else(|| self.config.prefix.clone());
        options.emit.include_file_name = self.config.include_file_name.unwrap_or(false);
        options.emit.dollar_service_keys = self.config.dollar_service_keys.unwrap_or(false);
        options.emit.global_service_fields = self.config.service_fields.clone();
        options.emit.default_unit = self.config.default_unit.clone();
        options.emit.css = CssVarOptions {
            convert_all: flag("css-vars") || self.config.css_vars.unwrap_or(false),
            prefix: self.config.css_prefix.clone(),
            exclude: self.config.css_exclude.clone().unwrap_or_default(),
            prefer: self
                .config
                .css_prefer
                .as_deref()
                .map(VarPreference::from_name)
                .unwrap_or_default(),
        };

        let theme_source = string_arg("themes").or_else(|| self.config.theme_source.clone());
        let theme_output = string_arg("theme-out").or_else(|| self.config.theme_output.clone());
        if let (Some(source), Some(output)) = (theme_source, theme_output) {
            options.themes = Some(ThemeOptions {
                source: PathBuf::from(source),
                output: PathBuf::from(output),
                include_only_exportable: self.config.theme_only_exportable.unwrap_or(true),
            });
        }

        options
    }

    fn handle_build_command(&self, matches: &clap::ArgMatches) -> Result<()> {
        let options = self.build_options(matches);

        if matches.get_flag("watch") {
            return self.watch_and_build(options);
        }

        let stats = build(&options)?;
        println!("Build successful!");
        println!(
            "   {} file(s), {} token(s), {} CSS variable(s)",
            stats.file_count, stats.token_count, stats.variable_count
        );
        if stats.unresolved_count > 0 {
            println!(
                "   {} unresolved reference(s), see {}",
                stats.unresolved_count,
                options.cache_dir.join(crate::DIAGNOSTICS_LOG).display()
            );
        }
        if matches.get_flag("stats") {
            print_detailed_stats(&stats);
        }
        Ok(())
    }

    fn handle_check_command(&self, matches: &clap::ArgMatches) -> Result<()> {
        let options = self.build_options(matches);
        let stats = check(&options)?;
        println!(
            "All references resolve: {} file(s), {} token(s)",
            stats.file_count, stats.token_count
        );
        Ok(())
    }

    fn handle_init_command(&self, matches: &clap::ArgMatches) -> Result<()> {
        let path = matches.get_one::<String>("path").unwrap();
        if std::path::Path::new(path).exists() {
            return Err(TokenError::config(format!(
                "{} already exists, not overwriting",
                path
            )));
        }
        fs::write(path, SAMPLE_CONFIG)?;
        println!("Wrote starter configuration to {}", path);
        Ok(())
    }

    fn watch_and_build(&self, options: BuildOptions) -> Result<()> {
        println!(
            "Watching {} for changes...",
            options
                .source_dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Err(e) = tx.send(event) {
                        eprintln!("Watch error: {}", e);
                    }
                }
                Err(e) => eprintln!("Watch error: {}", e),
            },
            notify::Config::default(),
        )
        .map_err(|e| TokenError::watch(format!("Failed to create file watcher: {}", e)))?;

        for dir in &options.source_dirs {
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .map_err(|e| TokenError::watch(format!("Failed to watch {}: {}", dir.display(), e)))?;
        }

        // Initial build
        match build(&options) {
            Ok(stats) => println!(
                "Initial build successful ({} file(s), {}ms)",
                stats.file_count, stats.build_time_ms
            ),
            Err(e) => eprintln!("Initial build failed: {}", e),
        }

        loop {
            match rx.recv() {
                Ok(_event) => {
                    // Coalesce bursts of events into one rebuild.
                    std::thread::sleep(Duration::from_millis(100));
                    while rx.try_recv().is_ok() {}

                    match build(&options) {
                        Ok(stats) => {
                            println!(
                                "Rebuilt: {} file(s), {} variable(s), {}ms",
                                stats.file_count, stats.variable_count, stats.build_time_ms
                            );
                            if stats.unresolved_count > 0 {
                                println!(
                                    "   {} unresolved reference(s)",
                                    stats.unresolved_count
                                );
                            }
                        }
                        Err(e) => eprintln!("Build failed: {}", e),
                    }
                }
                Err(e) => {
                    return Err(TokenError::watch(format!("Watch channel closed: {}", e)));
                }
            }
        }
    }
}

impl Default for TokenCli {
    fn default() -> Self {
        Self::new()
    }
}

fn setup_logging(verbose_count: u8) {
    let log_level = match verbose_count {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let _ = env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .try_init();
}

fn print_detailed_stats(stats: &BuildStats) {
    println!("\nDetailed statistics:");
    println!("   Source files:    {}", stats.file_count);
    println!("   Skipped files:   {}", stats.skipped_files);
    println!("   Tokens:          {}", stats.token_count);
    println!("   CSS variables:   {}", stats.variable_count);
    println!("   Theme blocks:    {}", stats.theme_count);
    println!("   Unresolved refs: {}", stats.unresolved_count);
    println!("   Build time:      {}ms", stats.build_time_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_config_parses() {
        let config: ConfigFile = toml::from_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.source_dirs, Some(vec!["tokens".to_string()]));
        assert_eq!(config.prefix, Some("ds".to_string()));
        assert_eq!(config.css_prefer, Some("last".to_string()));
        assert_eq!(config.theme_source, None);
    }

    #[test]
    fn test_json_config_parses() {
        let config: ConfigFile = serde_json::from_str(
            r#"{"source_dirs": ["a", "b"], "css_vars": true, "css_prefer": "first"}"#,
        )
        .unwrap();
        assert_eq!(
            config.source_dirs,
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(config.css_vars, Some(true));
        assert_eq!(
            config.css_prefer.as_deref().map(VarPreference::from_name),
            Some(VarPreference::First)
        );
    }

    #[test]
    fn test_build_options_from_config() {
        let mut cli = TokenCli::new();
        cli.config = toml::from_str(SAMPLE_CONFIG).unwrap();

        let matches = cli
            .build_cli()
            .get_matches_from(["tokc", "build"]);
        let (_, sub) = matches.subcommand().unwrap();
        let options = cli.build_options(sub);

        assert_eq!(options.source_dirs, vec![PathBuf::from("tokens")]);
        assert_eq!(options.emit.prefix, Some("ds".to_string()));
        assert!(options.emit.include_file_name);
        assert_eq!(options.emit.css.prefer, VarPreference::Last);
        assert!(options.themes.is_none());
    }

    #[test]
    fn test_cli_flags_override_config() {
        let mut cli = TokenCli::new();
        cli.config = toml::from_str(SAMPLE_CONFIG).unwrap();

        let matches = cli.build_cli().get_matches_from([
            "tokc", "build", "--source", "other", "--prefix", "brand", "--css-vars",
        ]);
        let (_, sub) = matches.subcommand().unwrap();
        let options = cli.build_options(sub);

        assert_eq!(options.source_dirs, vec![PathBuf::from("other")]);
        assert_eq!(options.emit.prefix, Some("brand".to_string()));
        assert!(options.emit.css.convert_all);
    }
}

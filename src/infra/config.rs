use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::matcher::MatchConfig;

/// Config file names, first match wins
const CONFIG_FILES: [&str; 4] = [
    "chatedit.toml",
    "chatedit.yaml",
    "chatedit.json",
    ".chatedit.toml",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model for the main chat
    pub main_model: String,

    /// Cheaper model for escalated edits and commit messages
    pub edit_model: String,

    /// Where the last reply is saved, relative to the working directory
    pub last_edit_path: PathBuf,

    /// Program plus arguments that answers model requests
    pub model_command: Vec<String>,

    /// Colored console output
    pub pretty: bool,

    /// Fuzzy matcher tunables
    pub matcher: MatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            main_model: "gpt-4".to_string(),
            edit_model: "gpt-3.5-turbo".to_string(),
            last_edit_path: PathBuf::from(".chatedit.last-edit.md"),
            model_command: Vec::new(),
            pretty: true,
            matcher: MatchConfig::default(),
        }
    }
}

pub fn load_config() -> Result<Config> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    load_config_from(&cwd)
}

/// Layer the first config file found in `dir` under `CHATEDIT_*` variables.
/// Nested keys use a double underscore: `CHATEDIT_MATCHER__THRESHOLD`.
pub fn load_config_from(dir: &Path) -> Result<Config> {
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    for name in &CONFIG_FILES {
        let path = dir.join(name);
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading config");
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CHATEDIT")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(" ")
            .with_list_parse_key("model_command"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(args: InitArgs, ctx: &AppContext) -> Result<()> {
    let config_path = args.path.join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

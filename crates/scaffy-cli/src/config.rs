use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use indexmap::IndexMap;
use scaffy_core::DEFAULT_TEMPLATE_SUFFIX;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "scaffy.toml";

/// The scaffy configuration file structure (scaffy.toml)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ScaffyConfig {
    /// Template processing settings
    pub template: TemplateConfig,

    /// Context values applied before command-line properties
    pub defaults: IndexMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Filename suffix marking files to render (default ".vtlg")
    pub suffix: Option<String>,

    /// Fail on undefined template references
    pub strict: Option<bool>,
}

impl ScaffyConfig {
    /// Load configuration from scaffy.toml, searching upward from the given directory
    pub fn load(start_dir: &Path) -> Result<Option<Self>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE);

            if config_path.exists() {
                return Self::load_file(&config_path).map(Some);
            }

            if !current.pop() {
                return Ok(None);
            }
        }
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Location of the per-user configuration file
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "scaffy").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Find the configuration for this invocation: the nearest scaffy.toml
    /// above the working directory, else the user config, else defaults.
    /// Environment overrides are applied on top.
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let mut config = match Self::load(&cwd)? {
            Some(config) => config,
            None => match Self::user_config_path().filter(|path| path.exists()) {
                Some(path) => Self::load_file(&path)?,
                None => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply SCAFFY_TEMPLATE_SUFFIX and SCAFFY_STRICT
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(suffix) = get("SCAFFY_TEMPLATE_SUFFIX") {
            self.template.suffix = Some(suffix);
        }

        if let Some(strict) = get("SCAFFY_STRICT") {
            self.template.strict = Some(parse_bool(&strict).context("Invalid SCAFFY_STRICT")?);
        }

        Ok(())
    }

    pub fn template_suffix(&self) -> &str {
        self.template.suffix.as_deref().unwrap_or(DEFAULT_TEMPLATE_SUFFIX)
    }

    pub fn strict(&self) -> bool {
        self.template.strict.unwrap_or(false)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got \"{}\"", other),
    }
}

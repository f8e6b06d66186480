use anyhow::{Context, Result};
use jsonc_parser::{parse_to_serde_value, ParseOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::Config;

const CONFIG_FILE_NAMES: [&str; 2] = ["relaychat.jsonc", "relaychat.json"];

static ENV_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{env:([^}]+)\}").expect("valid env placeholder pattern"));

pub struct ConfigLoader {
    config: Config,
    config_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            config_paths: Vec::new(),
        }
    }

    pub fn load_from_str(&mut self, content: &str) -> Result<()> {
        let content = substitute_env_vars(content, |name| std::env::var(name).ok());
        let config = parse_jsonc(&content).with_context(|| "Failed to parse config content")?;
        self.config.merge(config);
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let content = substitute_env_vars(&content, |name| std::env::var(name).ok());

        let config = parse_jsonc(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        self.config.merge(config);
        self.config_paths.push(path.to_path_buf());
        Ok(())
    }

    pub fn load_global(&mut self) -> Result<()> {
        let Some(dir) = global_config_dir() else {
            return Ok(());
        };
        self.load_first_in(&dir)
    }

    pub fn load_project<P: AsRef<Path>>(&mut self, project_dir: P) -> Result<()> {
        self.load_first_in(project_dir.as_ref())
    }

    fn load_first_in(&mut self, dir: &Path) -> Result<()> {
        for name in CONFIG_FILE_NAMES {
            let path = dir.join(name);
            if path.exists() {
                return self.load_from_file(&path);
            }
        }
        Ok(())
    }

    /// Applies environment overrides on top of everything loaded from files.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("DEEPSEEK_API_KEY") {
            self.config.upstream.api_key = Some(key);
        }
        if let Some(base) = get("DEEPSEEK_BASE") {
            self.config.upstream.base_url = Some(base);
        }
        if let Some(model) = get("RELAYCHAT_MODEL") {
            self.config.model = Some(model);
        }
        if let Some(url) = get("RELAYCHAT_RELAY_URL") {
            self.config.client.relay_url = Some(url);
        }
        if let Some(path) = get("RELAYCHAT_DB_PATH") {
            self.config.storage.path = Some(PathBuf::from(path));
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Global config, then the project directory, then an explicit file, then env.
pub fn load_config(project_dir: &Path, explicit: Option<&Path>) -> Result<Config> {
    let mut loader = ConfigLoader::new();
    loader.load_global()?;
    loader.load_project(project_dir)?;
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        loader.load_from_file(path)?;
    }
    loader.apply_env();

    for path in loader.config_paths() {
        tracing::debug!(path = %path.display(), "loaded config file");
    }
    Ok(loader.build())
}

fn global_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("relaychat"))
}

fn substitute_env_vars<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_PATTERN
        .replace_all(text, |caps: &regex::Captures| {
            lookup(&caps[1]).unwrap_or_default()
        })
        .to_string()
}

fn parse_jsonc(content: &str) -> Result<Config> {
    let parse_options = ParseOptions {
        allow_trailing_commas: true,
        ..Default::default()
    };
    let parsed = parse_to_serde_value(content, &parse_options)
        .with_context(|| "Failed to parse JSONC")?
        .context("Config content is empty")?;
    serde_json::from_value(parsed).with_context(|| "Failed to parse config JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_jsonc_with_comments() {
        let content = r#"{
            // upstream provider
            "model": "deepseek-chat",
            "stream": { "merge_reasoning": true, },
        }"#;
        let config = parse_jsonc(content).unwrap();
        assert_eq!(config.model(), "deepseek-chat");
        assert!(config.merge_reasoning());
    }

    #[test]
    fn env_placeholders_are_substituted() {
        let vars: HashMap<&str, &str> = [("RELAYCHAT_TEST_KEY", "sk-123")].into_iter().collect();
        let text = r#"{"upstream": {"api_key": "{env:RELAYCHAT_TEST_KEY}"}}"#;
        let out = substitute_env_vars(text, |name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(out, r#"{"upstream": {"api_key": "sk-123"}}"#);

        let missing = substitute_env_vars("{env:NOPE}", |_| None);
        assert_eq!(missing, "");
    }

    #[test]
    fn project_file_overrides_earlier_values() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("relaychat.jsonc"),
            r#"{ "server": { "port": 4100 }, "client": { "user_id": "alice" } }"#,
        )
        .unwrap();

        let mut loader = ConfigLoader::new();
        loader
            .load_from_str(r#"{ "server": { "port": 3000, "hostname": "0.0.0.0" } }"#)
            .unwrap();
        loader.load_project(dir.path()).unwrap();

        let config = loader.build();
        assert_eq!(config.port(), 4100);
        assert_eq!(config.hostname(), "0.0.0.0");
        assert_eq!(config.user_id(), "alice");
    }

    #[test]
    fn env_overrides_win_over_files() {
        let mut loader = ConfigLoader::new();
        loader
            .load_from_str(r#"{ "upstream": { "api_key": "from-file" } }"#)
            .unwrap();

        let vars: HashMap<&str, &str> = [
            ("DEEPSEEK_API_KEY", "from-env"),
            ("DEEPSEEK_BASE", "http://127.0.0.1:9999"),
            ("RELAYCHAT_MODEL", " "),
        ]
        .into_iter()
        .collect();
        loader.apply_env_with(|name| vars.get(name).map(|v| v.to_string()));

        let config = loader.build();
        assert_eq!(config.upstream_api_key(), Some("from-env"));
        assert_eq!(config.upstream_base(), "http://127.0.0.1:9999");
        assert_eq!(config.model(), "deepseek-reasoner");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.jsonc");
        assert!(load_config(dir.path(), Some(&missing)).is_err());
    }
}

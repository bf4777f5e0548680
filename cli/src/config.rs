//! `${CODEX_HOME}/config.toml` loading (SPEC_FULL.md §6 expansion).
//!
//! A missing file, missing keys, or unparseable TOML are all non-fatal:
//! every field falls back to a documented default and the caller logs a
//! warning, rather than refusing to start.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: String,
    pub model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { kind: "mock".to_string(), model: "gpt-5-codex".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub mode: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { mode: "prompt".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub rules_dir: String,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self { rules_dir: "rules".to_string() }
    }
}

impl ExecConfig {
    /// Resolves `rules_dir` against `codex_home` unless it's already
    /// absolute.
    #[must_use]
    pub fn resolve(&self, codex_home: &Path) -> PathBuf {
        let configured = Path::new(&self.rules_dir);
        if configured.is_absolute() { configured.to_path_buf() } else { codex_home.join(configured) }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub approval: ApprovalConfig,
    pub exec: ExecConfig,
}

/// Loads `{codex_home}/config.toml`, falling back to [`Config::default`]
/// (mock provider, prompt approval mode) on any failure to read or parse
/// it.
#[must_use]
pub fn load(codex_home: &Path) -> Config {
    let path = codex_home.join("config.toml");
    match std::fs::read_to_string(&path) {
        Ok(text) => toml::from_str(&text).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), error = %err, "failed to parse config.toml, using defaults");
            Config::default()
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read config.toml, using defaults");
            Config::default()
        }
    }
}

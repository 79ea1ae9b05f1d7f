//! Configuration loading for Foldyx.
//! Reads foldyx.toml from the current directory or the path in FOLDYX_CONFIG.
//! A missing file is not an error: every field has a default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use foldyx_common::{RunOptions, StructureFormat};

pub const CONFIG_ENV: &str = "FOLDYX_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "foldyx.toml";
/// Upper bound for `tool.timeout_minutes` (one week).
pub const MAX_TIMEOUT_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Initial values of the run options form
    #[serde(default)]
    pub defaults: RunOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    /// Editor sessions untouched for this long are dropped
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: u64,
}

fn default_bind()                 -> String { "0.0.0.0:7860".to_string() }
fn default_static_dir()           -> String { "crates/foldyx-web/static".to_string() }
fn default_session_idle_minutes() -> u64    { 12 * 60 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            static_dir: default_static_dir(),
            session_idle_minutes: default_session_idle_minutes(),
        }
    }
}

/// How the external prediction tool is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable name or path
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default)]
    pub output_format: StructureFormat,
    /// Wall-clock limit per run; 0 disables the limit
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    /// Utility used to count GPUs
    #[serde(default = "default_gpu_probe")]
    pub gpu_probe: String,
}

fn default_executable()      -> String { "boltz".to_string() }
fn default_timeout_minutes() -> u64    { 120 }
fn default_gpu_probe()       -> String { "nvidia-smi".to_string() }

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            output_format: StructureFormat::default(),
            timeout_minutes: default_timeout_minutes(),
            gpu_probe: default_gpu_probe(),
        }
    }
}

impl ToolConfig {
    pub fn timeout(&self) -> Option<std::time::Duration> {
        if self.timeout_minutes == 0 {
            None
        } else {
            Some(std::time::Duration::from_secs(self.timeout_minutes.saturating_mul(60)))
        }
    }
}

/// Where run directories are created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_path")]
    pub path: String,
    /// Stem of the job file; the tool names its outputs after it
    #[serde(default = "default_job_name")]
    pub job_name: String,
}

fn default_workspace_path() -> String { "./runs".to_string() }
fn default_job_name()       -> String { "prediction_config".to_string() }

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: default_workspace_path(),
            job_name: default_job_name(),
        }
    }
}

impl Config {
    /// Load configuration from foldyx.toml.
    /// Checks FOLDYX_CONFIG env var first, then current directory.
    /// Environment overrides are applied on top.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply FOLDYX_BIND / FOLDYX_TOOL / FOLDYX_WORKSPACE overrides.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("FOLDYX_BIND").filter(|v| !v.is_empty()) {
            self.server.bind = bind;
        }
        if let Some(exe) = lookup("FOLDYX_TOOL").filter(|v| !v.is_empty()) {
            self.tool.executable = exe;
        }
        if let Some(ws) = lookup("FOLDYX_WORKSPACE").filter(|v| !v.is_empty()) {
            self.workspace.path = ws;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tool.executable.trim().is_empty() {
            return Err(ConfigError::Invalid("tool.executable must not be empty".into()));
        }
        if self.tool.timeout_minutes > MAX_TIMEOUT_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "tool.timeout_minutes must be at most {} (0 disables the limit)",
                MAX_TIMEOUT_MINUTES
            )));
        }
        if self.server.session_idle_minutes == 0 {
            return Err(ConfigError::Invalid("server.session_idle_minutes must be positive".into()));
        }
        let job = self.workspace.job_name.trim();
        if job.is_empty() || job.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "workspace.job_name '{}' must be a plain file stem",
                self.workspace.job_name
            )));
        }
        // gpu_count is re-checked against detected devices at run time
        self.defaults
            .validate(u32::MAX)
            .map_err(|e| ConfigError::Invalid(format!("defaults: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:7860");
        assert_eq!(config.tool.executable, "boltz");
        assert_eq!(config.tool.output_format, StructureFormat::Mmcif);
        assert_eq!(config.workspace.job_name, "prediction_config");
        assert_eq!(config.defaults, RunOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml_str(
            r#"
            [tool]
            executable = "/opt/boltz/bin/boltz"
            output_format = "pdb"
            timeout_minutes = 0

            [defaults]
            recycling_steps = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.tool.executable, "/opt/boltz/bin/boltz");
        assert_eq!(config.tool.output_format, StructureFormat::Pdb);
        assert!(config.tool.timeout().is_none());
        assert_eq!(config.defaults.recycling_steps, 5);
        assert!(config.defaults.use_msa_server);
        assert_eq!(config.workspace.path, "./runs");
    }

    #[test]
    fn test_default_timeout_is_two_hours() {
        let tool = ToolConfig::default();
        assert_eq!(tool.timeout(), Some(std::time::Duration::from_secs(7200)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FOLDYX_BIND", "127.0.0.1:9000"),
            ("FOLDYX_TOOL", "/usr/local/bin/boltz"),
            ("FOLDYX_WORKSPACE", ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.tool.executable, "/usr/local/bin/boltz");
        // empty values are ignored
        assert_eq!(config.workspace.path, "./runs");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.workspace.job_name = "../escape".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.defaults.diffusion_samples = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tool.executable = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_timeout_is_rejected_without_overflow() {
        let config = Config::from_toml_str(
            r#"
            [tool]
            timeout_minutes = 9223372036854775807
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_minutes"));
        assert!(config.tool.timeout().is_some());

        let mut config = Config::default();
        config.tool.timeout_minutes = MAX_TIMEOUT_MINUTES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_idle_must_be_positive() {
        let mut config = Config::default();
        assert_eq!(config.server.session_idle_minutes, 720);
        config.server.session_idle_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_reports_parse_error_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foldyx.toml");
        std::fs::write(&path, "[tool\nexecutable = 1").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("foldyx.toml"));
    }
}

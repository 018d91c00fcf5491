use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchboardError};
use crate::security::{ToolTrust, TrustPolicy};

/// Top-level Switchboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    /// Prompt overrides keyed by skill id.
    #[serde(default)]
    pub skills: HashMap<String, SkillConfig>,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Graph transitions allowed in a single step.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Extra attempts after an empty model response.
    #[serde(default = "default_max_empty_retries")]
    pub max_empty_retries: usize,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// SQLite file for session state. Default: <workspace>/sessions.db
    #[serde(default)]
    pub store_path: Option<String>,
    /// Tool run once per session to populate the customer context.
    #[serde(default = "default_context_tool")]
    pub context_tool: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_empty_retries: default_max_empty_retries(),
            workspace: default_workspace(),
            store_path: None,
            context_tool: default_context_tool(),
        }
    }
}

fn default_max_iterations() -> usize { 25 }
fn default_max_empty_retries() -> usize { 2 }
fn default_workspace() -> String { "~/.switchboard".to_string() }
fn default_context_tool() -> Option<String> { Some("search_user_info".to_string()) }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: <workspace>/logs
    #[serde(default)]
    pub log_dir: Option<String>,
    /// 1 = step outcomes, 2 = routing and approvals, 3 = model and tool calls (default: 2).
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
            level: 2,
        }
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_level() -> u8 { 2 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Azure deployment name. Defaults to `model_id`.
    #[serde(default)]
    pub azure_deployment: Option<String>,
    #[serde(default = "default_azure_api_version")]
    pub azure_api_version: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            azure_deployment: None,
            azure_api_version: default_azure_api_version(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_azure_api_version() -> String { "2024-06-01".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Per-tool trust overrides, applied on top of each tool's declared trust.
    #[serde(default)]
    pub tool_overrides: HashMap<String, ToolTrust>,
}

impl SecurityConfig {
    pub fn to_policy(&self) -> TrustPolicy {
        TrustPolicy {
            tool_overrides: self.tool_overrides.clone(),
        }
    }
}

/// Customer directory backend. Without `base_url` an in-memory directory is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub access_code: Option<String>,
    #[serde(default = "default_directory_timeout")]
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            access_code: None,
            timeout_secs: default_directory_timeout(),
        }
    }
}

fn default_directory_timeout() -> u64 { 10 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillConfig {
    /// Inline prompt text, or `file:<path>` to read it from disk.
    #[serde(default)]
    pub prompt: Option<String>,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchboardError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Parse config text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| SwitchboardError::Config(e.to_string()))
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.agent.workspace)
    }

    pub fn store_path(&self) -> PathBuf {
        match &self.agent.store_path {
            Some(p) => expand_home(p),
            None => self.workspace_dir().join("sessions.db"),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        match self.log.as_ref().and_then(|l| l.log_dir.as_deref()) {
            Some(dir) => expand_home(dir),
            None => self.workspace_dir().join("logs"),
        }
    }

    /// Prompt override for a skill, reading `file:` references relative to the workspace.
    pub fn skill_prompt(&self, skill: &str) -> Result<Option<String>> {
        let Some(raw) = self.skills.get(skill).and_then(|s| s.prompt.as_deref()) else {
            return Ok(None);
        };
        match raw.strip_prefix("file:") {
            Some(path) => {
                let mut resolved = expand_home(path.trim());
                if resolved.is_relative() {
                    resolved = self.workspace_dir().join(resolved);
                }
                std::fs::read_to_string(&resolved).map(Some).map_err(|e| {
                    SwitchboardError::Config(format!(
                        "prompt for skill '{}' ({}): {}",
                        skill,
                        resolved.display(),
                        e
                    ))
                })
            }
            None => Ok(Some(raw.to_string())),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables stay as written.
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_SWITCHBOARD_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_SWITCHBOARD_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_SWITCHBOARD_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_SWITCHBOARD_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_SWITCHBOARD_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config = AppConfig::parse(
            r#"
[model]
model_id = "gpt-4o"
"#,
        )
        .unwrap();
        assert_eq!(config.agent.max_iterations, 25);
        assert_eq!(config.agent.max_empty_retries, 2);
        assert_eq!(config.agent.context_tool.as_deref(), Some("search_user_info"));
        assert_eq!(config.model.provider, "openai");
        assert!(config.directory.base_url.is_none());
        assert!(config.security.tool_overrides.is_empty());
        assert!(config.log.is_none());
    }

    #[test]
    fn test_security_overrides_and_azure() {
        let config = AppConfig::parse(
            r#"
[agent]
workspace = "/tmp/sb"
max_empty_retries = 3

[model]
provider = "azure"
model_id = "gpt-4o"
azure_deployment = "prod-gpt4o"
base_url = "https://acme.openai.azure.com"

[security.tool_overrides]
update_customer_info = "sensitive"
create_ticket = "safe"

[log]
level = 3
"#,
        )
        .unwrap();
        let policy = config.security.to_policy();
        assert_eq!(
            policy.decide(ToolTrust::Safe, "update_customer_info"),
            ToolTrust::Sensitive
        );
        assert_eq!(policy.decide(ToolTrust::Sensitive, "create_ticket"), ToolTrust::Safe);
        assert_eq!(config.model.azure_deployment.as_deref(), Some("prod-gpt4o"));
        assert_eq!(config.store_path(), PathBuf::from("/tmp/sb/sessions.db"));
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/sb/logs"));
        assert_eq!(config.log.unwrap().level, 3);
    }

    #[test]
    fn test_missing_model_section_is_config_error() {
        let err = AppConfig::parse("[agent]\nmax_iterations = 5\n").unwrap_err();
        assert!(matches!(err, SwitchboardError::Config(_)));
    }

    #[test]
    fn test_inline_skill_prompt() {
        let config = AppConfig::parse(
            r#"
[model]
model_id = "gpt-4o"

[skills.renewal]
prompt = "You renew mortgages. {context}"
"#,
        )
        .unwrap();
        assert_eq!(
            config.skill_prompt("renewal").unwrap().as_deref(),
            Some("You renew mortgages. {context}")
        );
        assert!(config.skill_prompt("servicing").unwrap().is_none());
    }

    #[test]
    fn test_missing_prompt_file_is_error() {
        let config = AppConfig::parse(
            r#"
[agent]
workspace = "/nonexistent-switchboard-ws"

[model]
model_id = "gpt-4o"

[skills.primary]
prompt = "file:prompts/primary.md"
"#,
        )
        .unwrap();
        assert!(config.skill_prompt("primary").is_err());
    }
}

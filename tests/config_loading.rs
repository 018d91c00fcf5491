use std::io::Write;

use switchboard_core::config::AppConfig;
use switchboard_core::security::ToolTrust;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[agent]
max_iterations = 10
max_empty_retries = 1
workspace = "/tmp/switchboard-test"
context_tool = "search_user_info"

[model]
provider = "azure"
model_id = "gpt-4o"
api_key = "sk-test-key"
base_url = "https://example.openai.azure.com"
azure_deployment = "gpt4o-prod"
max_tokens = 2048
temperature = 0.2

[model.retry]
max_retries = 5

[[fallback_models]]
provider = "openai"
model_id = "gpt-4o-mini"

[security.tool_overrides]
create_ticket = "safe"
update_customer_info = "sensitive"

[directory]
base_url = "https://crm.example.com/api"
access_code = "abc123"

[skills.renewal]
prompt = "You handle renewals. {context}"

[log]
level = 3
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.agent.max_iterations, 10);
    assert_eq!(config.agent.max_empty_retries, 1);
    assert_eq!(config.model.provider, "azure");
    assert_eq!(config.model.azure_deployment.as_deref(), Some("gpt4o-prod"));
    assert_eq!(config.model.max_tokens, 2048);
    assert_eq!(config.model.retry.as_ref().map(|r| r.max_retries), Some(5));
    assert_eq!(config.fallback_models.len(), 1);

    let policy = config.security.to_policy();
    assert_eq!(policy.decide(ToolTrust::Sensitive, "create_ticket"), ToolTrust::Safe);
    assert_eq!(policy.decide(ToolTrust::Safe, "update_customer_info"), ToolTrust::Sensitive);

    assert_eq!(config.directory.access_code.as_deref(), Some("abc123"));
    assert_eq!(
        config.skill_prompt("renewal").unwrap().as_deref(),
        Some("You handle renewals. {context}")
    );

    let log = config.log.expect("log present");
    assert!(log.enabled);
    assert_eq!(log.level, 3);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SWITCHBOARD_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${SWITCHBOARD_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("SWITCHBOARD_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "gpt-4o-mini"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.agent.max_iterations, 25);
    assert_eq!(config.agent.max_empty_retries, 2);
    assert_eq!(config.agent.context_tool.as_deref(), Some("search_user_info"));
    assert_eq!(config.model.provider, "openai");
    assert!(config.fallback_models.is_empty());
    assert!(config.security.tool_overrides.is_empty());
    assert!(config.directory.base_url.is_none());
    assert!(config.skills.is_empty());
    assert!(config.log.is_none());
    assert!(config.store_path().ends_with("sessions.db"));
}

#[test]
fn test_prompt_file_is_read_relative_to_workspace() {
    let workspace = tempfile::tempdir().expect("create workspace");
    std::fs::write(workspace.path().join("servicing.md"), "Servicing prompt from disk.").expect("write prompt");

    let toml_content = format!(
        r#"
[agent]
workspace = "{}"

[model]
model_id = "gpt-4o"

[skills.servicing]
prompt = "file:servicing.md"

[skills.missing]
prompt = "file:nope.md"
"#,
        workspace.path().display()
    );

    let config = AppConfig::parse(&toml_content).expect("parse config");
    assert_eq!(
        config.skill_prompt("servicing").unwrap().as_deref(),
        Some("Servicing prompt from disk.")
    );
    assert!(config.skill_prompt("missing").is_err());
    assert!(config.skill_prompt("renewal").unwrap().is_none());
}

#[test]
fn test_missing_file_is_reported() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/switchboard.toml")).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

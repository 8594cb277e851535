use std::path::Path;

use tracing::{debug, warn};

use crate::errors::HeliosError;
use crate::pipeline::stage::StageFlag;
use crate::scope::ScopeOptions;
use super::schema::CONFIG_SCHEMA;
use super::security::validate_security_patterns;
use super::types::{HeliosConfig, LoginMethod};

const MAX_CONFIG_BYTES: u64 = 1_048_576;

pub async fn parse_config(path: &Path) -> Result<HeliosConfig, HeliosError> {
    if !path.exists() {
        return Err(HeliosError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(HeliosError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let config = parse_config_str(&content)?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}

pub fn parse_config_str(content: &str) -> Result<HeliosConfig, HeliosError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;

    validate_security_patterns(&yaml)?;
    validate_schema(&yaml)?;

    let config: HeliosConfig = serde_yaml::from_value(yaml)?;
    validate_conflicts(&config)?;
    Ok(config)
}

/// Advisory structural validation. Violations are logged, never fatal.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), HeliosError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| HeliosError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| HeliosError::Config(format!("Schema compilation error: {}", e)))?;

    if let Err(errors) = compiled.validate(&json_value) {
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }

    Ok(())
}

fn validate_conflicts(config: &HeliosConfig) -> Result<(), HeliosError> {
    if let Some(scan) = &config.scan {
        if scan.threads == Some(0) {
            return Err(HeliosError::Config("scan.threads must not be 0".into()));
        }
        if scan.max_urls == Some(0) {
            return Err(HeliosError::Config("scan.max_urls must not be 0".into()));
        }
        for stage in scan.stages.iter().flatten() {
            if !stage.trim().eq_ignore_ascii_case("all") {
                stage.parse::<StageFlag>()?;
            }
        }
    }

    if let Some(scope) = &config.scope {
        if let Some(options) = &scope.options {
            ScopeOptions::parse(Some(&options.join(",")))?;
        }
    }

    if let Some(login) = &config.login {
        match login.method {
            Some(LoginMethod::Form | LoginMethod::FormCsrf) if login.url.is_none() => {
                return Err(HeliosError::Config(format!(
                    "login method '{}' requires login.url",
                    login.method.map(|m| m.as_str()).unwrap_or_default()
                )));
            }
            Some(LoginMethod::Basic) if login.credentials.is_none() => {
                warn!("Basic login configured but no credentials provided");
            }
            _ => {}
        }
    }

    Ok(())
}

use tracing::debug;

use crate::errors::HeliosError;

/// Resolve a credential value. If the value starts with '$', treat it as an
/// environment variable reference and resolve from the environment.
pub fn resolve_credential(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix('$') {
        match std::env::var(var_name) {
            Ok(resolved) => {
                debug!(var = %var_name, "Resolved credential from environment");
                resolved
            }
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, using literal");
                value.to_string()
            }
        }
    } else {
        value.to_string()
    }
}

/// Split a `username:password` pair. Only the first ':' separates, so
/// passwords may contain colons.
pub fn parse_user_pass(value: &str) -> Result<(String, String), HeliosError> {
    let resolved = resolve_credential(value);
    match resolved.split_once(':') {
        Some((user, pass)) if !user.is_empty() => Ok((user.to_string(), pass.to_string())),
        _ => Err(HeliosError::CredentialFormat(
            "expected credentials in the form username:password".into(),
        )),
    }
}

/// Replace each secret of four or more characters with [REDACTED].
pub fn redact_credentials(text: &str, secrets: &[&str]) -> String {
    let mut result = text.to_string();
    for secret in secrets {
        if secret.len() >= 4 {
            result = result.replace(secret, "[REDACTED]");
        }
    }
    result
}

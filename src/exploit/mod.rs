pub mod detect;
pub mod metasploit;

use async_trait::async_trait;

use crate::config::parse_user_pass;
use crate::errors::HeliosError;
use crate::models::scan_tree::ExploitResults;

pub use metasploit::MetasploitBridge;

/// Username and password for the exploit framework's RPC service.
#[derive(Clone, PartialEq, Eq)]
pub struct BridgeCredentials {
    pub username: String,
    pub password: String,
}

impl BridgeCredentials {
    /// Parse `username:password` (or `$ENV_VAR`).
    pub fn parse(raw: &str) -> Result<Self, HeliosError> {
        let (username, password) = parse_user_pass(raw)?;
        Ok(Self { username, password })
    }
}

impl std::fmt::Debug for BridgeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[async_trait]
pub trait ExploitBridge: Send + Sync {
    /// Connect to the framework for a target. A client that could not log in
    /// is returned with `is_working() == false`.
    async fn connect(&self, url: &str, credentials: &BridgeCredentials) -> Result<Box<dyn ExploitClient>, HeliosError>;
}

#[async_trait]
pub trait ExploitClient: Send + Sync {
    fn is_working(&self) -> bool;

    async fn load_exploit_modules(&mut self) -> Result<usize, HeliosError>;

    /// Identify the products running on the target.
    async fn detect(&mut self) -> Result<(), HeliosError>;

    fn build_queries(&self) -> Vec<String>;

    async fn run_queries(&mut self, queries: &[String]) -> Result<(), HeliosError>;

    fn results(&self) -> ExploitResults;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials() {
        let creds = BridgeCredentials::parse("msf:msfrpcd").unwrap();
        assert_eq!(creds.username, "msf");
        assert_eq!(creds.password, "msfrpcd");
        assert!(!format!("{:?}", creds).contains("msfrpcd"));
    }

    #[test]
    fn test_parse_malformed_credentials() {
        assert!(matches!(BridgeCredentials::parse("nocolon"), Err(HeliosError::CredentialFormat(_))));
    }
}

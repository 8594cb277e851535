use std::collections::BTreeSet;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::credentials::redact_credentials;
use crate::config::ExploitBridgeConfig;
use crate::errors::{with_retry, HeliosError};
use crate::http::{build_client, HttpSettings};
use crate::models::scan_tree::ExploitResults;
use super::detect::{detect_products, match_modules};
use super::{BridgeCredentials, ExploitBridge, ExploitClient};

/// Time given to a freshly spawned msfrpcd before logging in again.
const AUTOSTART_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Minimal JSON-RPC 2.0 client for the Metasploit RPC service.
struct RpcClient {
    http: Client,
    endpoint: String,
    token: Option<String>,
    next_id: AtomicU64,
}

impl RpcClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value, HeliosError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": id });
        let mut request = self.http.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response: RpcResponse = request.send().await?.json().await?;
        unwrap_response(method, response)
    }
}

fn unwrap_response(method: &str, response: RpcResponse) -> Result<Value, HeliosError> {
    if let Some(err) = response.error {
        return Err(HeliosError::ExploitBridge(format!("{} failed ({}): {}", method, err.code, err.message)));
    }
    response
        .result
        .ok_or_else(|| HeliosError::ExploitBridge(format!("{} returned no result", method)))
}

fn login_token(result: &Value) -> Result<String, HeliosError> {
    if result.get("result").and_then(Value::as_str) != Some("success") {
        return Err(HeliosError::Authentication("msfrpcd rejected credentials".into()));
    }
    result
        .get("token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HeliosError::ExploitBridge("auth.login returned no token".into()))
}

fn module_names(result: &Value) -> Vec<String> {
    result
        .get("modules")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(|name| {
                    if name.starts_with("exploit/") {
                        name.to_string()
                    } else {
                        format!("exploit/{}", name)
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Connects to msfrpcd, optionally starting it first.
pub struct MetasploitBridge {
    config: ExploitBridgeConfig,
    settings: HttpSettings,
}

impl MetasploitBridge {
    pub fn new(config: ExploitBridgeConfig, settings: HttpSettings) -> Self {
        Self { config, settings }
    }

    pub fn endpoint(&self) -> String {
        let scheme = if self.config.ssl { "https" } else { "http" };
        let path = if self.config.endpoint.starts_with('/') {
            self.config.endpoint.clone()
        } else {
            format!("/{}", self.config.endpoint)
        };
        format!("{}://{}:{}{}", scheme, self.config.host, self.config.port, path)
    }

    async fn login(&self, rpc: &RpcClient, credentials: &BridgeCredentials) -> Result<String, HeliosError> {
        let params = json!([credentials.username, credentials.password]);
        let result = with_retry("msf auth.login", &self.settings.retry(), || rpc.call("auth.login", params.clone())).await?;
        login_token(&result)
    }

    fn start_daemon(&self, credentials: &BridgeCredentials) -> Result<tokio::process::Child, HeliosError> {
        let mut command = tokio::process::Command::new("msfrpcd");
        command
            .arg("-U")
            .arg(&credentials.username)
            .arg("-P")
            .arg(&credentials.password)
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg("-a")
            .arg(&self.config.host)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if !self.config.ssl {
            command.arg("-S");
        }
        let shown = format!(
            "msfrpcd -U {} -P {} -p {} -a {}",
            credentials.username, credentials.password, self.config.port, self.config.host
        );
        debug!(command = %redact_credentials(&shown, &[&credentials.password]), "Starting msfrpcd");
        command
            .spawn()
            .map_err(|e| HeliosError::ExploitBridge(format!("Failed to start msfrpcd: {}", e)))
    }
}

#[async_trait]
impl ExploitBridge for MetasploitBridge {
    async fn connect(&self, url: &str, credentials: &BridgeCredentials) -> Result<Box<dyn ExploitClient>, HeliosError> {
        // msfrpcd ships a self-signed certificate
        let rpc_settings = HttpSettings { ssl_verify: false, ..self.settings.clone() };
        let mut rpc = RpcClient {
            http: build_client(&rpc_settings, None)?,
            endpoint: self.endpoint(),
            token: None,
            next_id: AtomicU64::new(1),
        };
        let target_http = build_client(&self.settings, None)?;
        let mut client = MetasploitClient::new(url, target_http);

        let mut token = self.login(&rpc, credentials).await;
        if token.is_err() && self.config.autostart {
            info!(host = %self.config.host, port = self.config.port, "Starting msfrpcd");
            match self.start_daemon(credentials) {
                Ok(_daemon) => {
                    tokio::time::sleep(AUTOSTART_GRACE).await;
                    token = self.login(&rpc, credentials).await;
                }
                Err(e) => warn!(error = %e, "Could not start msfrpcd"),
            }
        }

        match token {
            Ok(token) => {
                rpc.token = Some(token);
                match rpc.call("core.version", json!([])).await {
                    Ok(reply) => {
                        let version = reply.get("version").and_then(serde_json::Value::as_str).unwrap_or("unknown");
                        info!(version, "Connected to Metasploit");
                    }
                    Err(e) => debug!(error = %e, "core.version failed"),
                }
                client.rpc = Some(rpc);
            }
            Err(e) => warn!(endpoint = %rpc.endpoint, error = %e, "Metasploit login failed"),
        }
        Ok(Box::new(client))
    }
}

/// Session against msfrpcd for one target.
pub struct MetasploitClient {
    target: String,
    http: Client,
    rpc: Option<RpcClient>,
    modules: Vec<String>,
    products: BTreeSet<String>,
    results: ExploitResults,
}

impl MetasploitClient {
    fn new(target: &str, http: Client) -> Self {
        Self {
            target: target.to_string(),
            http,
            rpc: None,
            modules: Vec::new(),
            products: BTreeSet::new(),
            results: ExploitResults::new(),
        }
    }

    fn rpc(&self) -> Result<&RpcClient, HeliosError> {
        self.rpc
            .as_ref()
            .ok_or_else(|| HeliosError::ExploitBridge("Not connected to msfrpcd".into()))
    }
}

#[async_trait]
impl ExploitClient for MetasploitClient {
    fn is_working(&self) -> bool {
        self.rpc.is_some()
    }

    async fn load_exploit_modules(&mut self) -> Result<usize, HeliosError> {
        let result = self.rpc()?.call("module.exploits", json!([])).await?;
        self.modules = module_names(&result);
        info!(count = self.modules.len(), "Loaded exploit modules");
        Ok(self.modules.len())
    }

    async fn detect(&mut self) -> Result<(), HeliosError> {
        let response = self.http.get(&self.target).send().await?;
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.text().await.unwrap_or_default();
        self.products = detect_products(headers.iter().map(|(k, v)| (k.as_str(), v.as_str())), &body);
        info!(products = ?self.products, "Detected target products");
        Ok(())
    }

    fn build_queries(&self) -> Vec<String> {
        self.products.iter().cloned().collect()
    }

    async fn run_queries(&mut self, queries: &[String]) -> Result<(), HeliosError> {
        for query in queries {
            let matches = match_modules(&self.modules, query);
            debug!(query = %query, matches = matches.len(), "Exploit query");
            self.results.insert(query.clone(), matches);
        }
        Ok(())
    }

    fn results(&self) -> ExploitResults {
        self.results.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge(config: ExploitBridgeConfig) -> MetasploitBridge {
        MetasploitBridge::new(config, HttpSettings { retries: 0, ..Default::default() })
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(bridge(ExploitBridgeConfig::default()).endpoint(), "https://localhost:55553/api/");
        let config = ExploitBridgeConfig {
            ssl: false,
            endpoint: "rpc".to_string(),
            host: "10.0.0.5".to_string(),
            ..Default::default()
        };
        assert_eq!(bridge(config).endpoint(), "http://10.0.0.5:55553/rpc");
    }

    #[test]
    fn test_unwrap_response_error() {
        let response: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"no such method"},"id":1}"#).unwrap();
        let err = unwrap_response("core.version", response).unwrap_err();
        assert!(err.to_string().contains("no such method"));
    }

    #[test]
    fn test_login_token() {
        assert_eq!(login_token(&json!({"result": "success", "token": "TEMP1"})).unwrap(), "TEMP1");
        assert!(matches!(login_token(&json!({"result": "failure"})), Err(HeliosError::Authentication(_))));
    }

    #[test]
    fn test_module_names_prefixed() {
        let names = module_names(&json!({"modules": ["multi/http/tomcat_mgr_upload", "exploit/unix/ftp/vsftpd_234_backdoor"]}));
        assert_eq!(names, vec!["exploit/multi/http/tomcat_mgr_upload", "exploit/unix/ftp/vsftpd_234_backdoor"]);
        assert!(module_names(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn test_connect_unreachable_returns_non_working_client() {
        let config = ExploitBridgeConfig { host: "127.0.0.1".to_string(), port: 9, ..Default::default() };
        let creds = BridgeCredentials::parse("msf:msfrpcd").unwrap();
        let client = bridge(config).connect("http://127.0.0.1:9/", &creds).await.unwrap();
        assert!(!client.is_working());
        assert!(client.results().is_empty());
    }

    #[tokio::test]
    async fn test_run_queries_records_every_query() {
        let mut client = MetasploitClient::new("http://a/", Client::new());
        client.modules = vec!["exploit/multi/http/tomcat_mgr_upload".to_string()];
        client
            .run_queries(&["tomcat".to_string(), "nginx".to_string()])
            .await
            .unwrap();
        let results = client.results();
        assert_eq!(results["tomcat"], vec!["exploit/multi/http/tomcat_mgr_upload"]);
        assert!(results["nginx"].is_empty());
    }
}

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::errors::HeliosError;
use crate::models::work_item::WorkItem;
use super::BrowserBridge;

/// Bridge to an external browser driver process.
///
/// The driver receives the work list on stdin as one JSON `WorkItem` per line
/// and writes each candidate it discovers to stdout in the same format.
pub struct DriverBridge {
    config: BrowserConfig,
    leading_args: Vec<String>,
}

impl DriverBridge {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config, leading_args: Vec::new() }
    }

    /// Arguments passed to the driver before the bridge's own flags.
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    pub fn driver_args(&self, https: bool, interactive: bool) -> Vec<String> {
        let mut args = self.leading_args.clone();
        if self.config.proxy {
            args.push("--proxy-port".to_string());
            args.push(self.config.proxy_port.to_string());
        } else {
            args.push("--no-proxy".to_string());
        }
        if self.config.show || interactive {
            args.push("--show".to_string());
        }
        if interactive {
            args.push("--interactive".to_string());
        }
        if https {
            args.push("--https".to_string());
        }
        args
    }
}

pub fn parse_candidate(line: &str) -> Option<WorkItem> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<WorkItem>(line) {
        Ok(item) => Some(item),
        Err(e) => {
            debug!(line, error = %e, "Ignoring non-JSON driver output");
            None
        }
    }
}

#[async_trait]
impl BrowserBridge for DriverBridge {
    async fn run(&self, work: &[WorkItem], interactive: bool) -> Result<Vec<WorkItem>, HeliosError> {
        let https = work.first().is_some_and(|item| item.url.starts_with("https://"));
        let args = self.driver_args(https, interactive);
        debug!(driver = %self.config.driver_path, ?args, "Spawning browser driver");

        let mut child = Command::new(&self.config.driver_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HeliosError::Browser(format!("Failed to start driver '{}': {}", self.config.driver_path, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| HeliosError::Browser("Driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HeliosError::Browser("Driver stdout unavailable".into()))?;

        let mut payload = String::new();
        for item in work {
            payload.push_str(&serde_json::to_string(item)?);
            payload.push('\n');
        }
        let writer = tokio::spawn(async move {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.shutdown().await
        });

        let mut candidates = Vec::new();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(item) = parse_candidate(&line) {
                candidates.push(item);
            }
        }

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Driver closed stdin early"),
            Err(e) => warn!(error = %e, "Driver input task failed"),
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(HeliosError::Browser(format!("Driver exited with {}", status)));
        }
        info!(candidates = candidates.len(), "Browser driver finished");
        Ok(candidates)
    }
}

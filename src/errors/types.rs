use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeliosError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<HeliosError>,
    },

    #[error("Interrupted by user")]
    Interrupted,

    #[error("Malformed credentials: {0}")]
    CredentialFormat(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Exploit bridge error: {0}")]
    ExploitBridge(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HeliosError {
    /// Attribute a collaborator failure to the stage that was running.
    /// Interrupts and configuration errors pass through untouched.
    pub fn in_stage(self, stage: &'static str) -> Self {
        match self {
            HeliosError::Interrupted
            | HeliosError::Config(_)
            | HeliosError::InvalidTarget(_)
            | HeliosError::Stage { .. } => self,
            other => HeliosError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }
}

impl From<reqwest::Error> for HeliosError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HeliosError::Timeout(e.to_string())
        } else {
            HeliosError::Network(e.to_string())
        }
    }
}

impl From<rusqlite::Error> for HeliosError {
    fn from(e: rusqlite::Error) -> Self {
        HeliosError::Database(e.to_string())
    }
}

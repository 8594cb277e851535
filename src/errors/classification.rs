use super::types::HeliosError;

/// How the pipeline treats an error at its top-level boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid run configuration, fatal before any stage runs.
    Config,
    /// A collaborator failed while its stage was running.
    Stage,
    /// User-requested stop. Not a failure.
    Interrupt,
    /// Exploit-bridge credentials malformed. Only that stage is skipped.
    CredentialFormat,
}

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
    pub kind: ErrorKind,
}

impl HeliosError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            HeliosError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
                kind: ErrorKind::Config,
            },
            HeliosError::InvalidTarget(_) => ErrorClassification {
                error_type: "InvalidTargetError",
                retryable: false,
                kind: ErrorKind::Config,
            },
            HeliosError::Interrupted => ErrorClassification {
                error_type: "InterruptSignal",
                retryable: false,
                kind: ErrorKind::Interrupt,
            },
            HeliosError::CredentialFormat(_) => ErrorClassification {
                error_type: "CredentialFormatError",
                retryable: false,
                kind: ErrorKind::CredentialFormat,
            },
            HeliosError::Stage { source, .. } => ErrorClassification {
                error_type: "StageError",
                retryable: source.classify().retryable,
                kind: ErrorKind::Stage,
            },

            // Transient transport failures
            HeliosError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                retryable: true,
                kind: ErrorKind::Stage,
            },
            HeliosError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                retryable: true,
                kind: ErrorKind::Stage,
            },

            HeliosError::Authentication(_) => ErrorClassification {
                error_type: "AuthenticationError",
                retryable: false,
                kind: ErrorKind::Stage,
            },
            HeliosError::Browser(_) => ErrorClassification {
                error_type: "BrowserError",
                retryable: false,
                kind: ErrorKind::Stage,
            },
            HeliosError::ExploitBridge(_) => ErrorClassification {
                error_type: "ExploitBridgeError",
                retryable: false,
                kind: ErrorKind::Stage,
            },
            HeliosError::Database(_) => ErrorClassification {
                error_type: "DatabaseError",
                retryable: false,
                kind: ErrorKind::Stage,
            },
            HeliosError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: false,
                kind: ErrorKind::Stage,
            },
            HeliosError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
                kind: ErrorKind::Stage,
            },
            HeliosError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
                kind: ErrorKind::Config,
            },
            HeliosError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: false,
                kind: ErrorKind::Stage,
            },
        }
    }
}

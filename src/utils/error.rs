use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Report error: {message}")]
    ReportError { message: String },
}

/// 錯誤分類，用於日誌與退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Data,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ScanError {
    pub fn config(message: impl Into<String>) -> Self {
        ScanError::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ScanError::ConfigError { .. }
            | ScanError::InvalidConfigValueError { .. }
            | ScanError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            ScanError::CsvError(_) | ScanError::SerializationError(_) => ErrorCategory::Data,
            ScanError::IoError(_) | ScanError::ReportError { .. } => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ScanError::ReportError { .. } => ErrorSeverity::Low,
            ScanError::ConfigError { .. }
            | ScanError::InvalidConfigValueError { .. }
            | ScanError::ConfigValidationError { .. }
            | ScanError::CsvError(_)
            | ScanError::SerializationError(_) => ErrorSeverity::High,
            ScanError::IoError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Review the scan configuration file and make sure at least one source is enabled"
            }
            ErrorCategory::Data => "Inspect the generated output; the data may be malformed",
            ErrorCategory::System => "Check file permissions and free disk space",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ScanError::ConfigError { message } => format!("Configuration problem: {}", message),
            ScanError::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            ScanError::ConfigValidationError { field, message } => {
                format!("Setting '{}' could not be read: {}", field, message)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// 目錄頁面抓取失敗
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),
}

impl FetchError {
    /// 4xx 以外的錯誤才值得重試
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) => true,
            FetchError::Status(code) => *code == 429 || *code >= 500,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalkError {
    #[error("invalid catalog URL '{url}': {reason}")]
    InvalidSeedUrl { url: String, reason: String },
}

/// 參考市場 OAuth 交換失敗
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("reference marketplace credentials are not configured")]
    MissingCredentials,

    #[error("{field} looks malformed ({length} chars, expected at least {expected})")]
    MalformedCredentials {
        field: &'static str,
        length: usize,
        expected: usize,
    },

    #[error("token exchange rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("token exchange failed: {0}")]
    Transport(String),

    #[error("token response could not be parsed: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    pub fn diagnostic(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => {
                "Set EBAY_CLIENT_ID and EBAY_CLIENT_SECRET to enable price lookups"
            }
            AuthError::MalformedCredentials { .. } => {
                "The credential value is shorter than a production key; check for truncation or stray quotes in the environment"
            }
            AuthError::Rejected { status, .. } if *status == 401 => {
                "The client id/secret pair was refused; make sure both belong to the same production keyset"
            }
            AuthError::Rejected { .. } => "The OAuth endpoint refused the request; verify the requested scope",
            AuthError::Transport(_) => "The OAuth endpoint could not be reached; check connectivity",
            AuthError::InvalidResponse(_) => "The OAuth endpoint answered with an unexpected payload",
        }
    }
}

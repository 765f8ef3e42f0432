use thiserror::Error;

/// Top-level error type for the payout service
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Where in the build/sign/broadcast pipeline a submission broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Connect,
    Build,
    Sign,
    Broadcast,
}

impl std::fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubmissionStage::Connect => "connect",
            SubmissionStage::Build => "build",
            SubmissionStage::Sign => "sign",
            SubmissionStage::Broadcast => "broadcast",
        };
        write!(f, "{}", name)
    }
}

/// Ledger client errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Connection to {endpoint} failed: {message}")]
    ConnectionFailed { endpoint: String, message: String },

    #[error("Connection to {endpoint} timed out after {secs}s")]
    ConnectTimeout { endpoint: String, secs: u64 },

    #[error("No ledger endpoint reachable ({attempted} attempted)")]
    NoEndpointReachable { attempted: usize },

    #[error("Node reports network {actual}, expected {expected}")]
    NetworkMismatch { expected: String, actual: String },

    #[error("RPC error from {method}: {message}")]
    Rpc { method: String, message: String },

    #[error("Invalid treasury key: {0}")]
    InvalidKey(String),

    /// `broadcast` holds the ids of transactions that already went out
    /// before the failure; those are not rolled back.
    #[error("Submission failed at {stage} of transaction {index}/{total}: {message} ({} already broadcast)", .broadcast.len())]
    SubmissionFailed {
        stage: SubmissionStage,
        index: usize,
        total: usize,
        broadcast: Vec<String>,
        message: String,
    },
}

impl LedgerError {
    /// Transport-level failures that mean the connection should be rebuilt.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LedgerError::ConnectionFailed { .. }
                | LedgerError::ConnectTimeout { .. }
                | LedgerError::NoEndpointReachable { .. }
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::StoreUnavailable(sqlx::Error::Migrate(Box::new(error)))
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

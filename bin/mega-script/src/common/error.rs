use mega_sender::{RegistryError, SenderError};

/// Error types for the mega-script commands
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Orchestration error
    #[error("{0}")]
    Sender(#[from] SenderError),

    /// Registry error
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// Failed to read or write a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON input
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for the mega-script commands
pub type Result<T> = std::result::Result<T, ScriptError>;

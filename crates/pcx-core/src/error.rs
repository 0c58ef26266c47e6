use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Agent is not connected")]
    NotConnected,

    #[error("No process attached")]
    NoProcess,

    #[error("Request '{kind}' timed out after {millis}ms")]
    Timeout { kind: &'static str, millis: u64 },

    #[error("Request '{kind}' failed: {message}")]
    Remote { kind: &'static str, message: String },

    #[error("Malformed '{kind}' response: {message}")]
    MalformedResponse { kind: &'static str, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid address expression: {0}")]
    InvalidAddress(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// A missing file, as opposed to an unreadable or invalid one.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Errors that mean the agent side is unavailable rather than the request being bad.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::NotConnected | Error::NoProcess | Error::Transport(_)
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

// Error types for the scheduling engine

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the engine
///
/// Lookups that find nothing return `None` and redundant transitions are
/// ignored; only configuration problems and failing callbacks end up here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tick callback failed: {0}")]
    Callback(String),
}

impl EngineError {
    /// Convenience constructor for callbacks reporting a failure
    pub fn callback(message: impl Into<String>) -> Self {
        EngineError::Callback(message.into())
    }
}

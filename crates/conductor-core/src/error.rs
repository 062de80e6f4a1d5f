use thiserror::Error;

/// A convenience `Result` alias using [`ConductorError`].
pub type ConductorResult<T> = Result<T, ConductorError>;

/// Top-level error type for the Conductor engine.
///
/// Variants map onto the failure classes of a request: some abort the whole
/// request (see [`ConductorError::is_fatal`]), the rest are contained where
/// they occur and turned into data.
#[derive(Error, Debug)]
pub enum ConductorError {
    /// No enabled completion provider, or missing credentials.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The completion API answered with a non-success status.
    #[error("Completion provider error {status}: {body}")]
    CompletionProvider {
        /// Upstream HTTP status code.
        status: u16,
        /// Upstream response body, verbatim.
        body: String,
    },

    /// A tool name that is not present in the registry snapshot.
    #[error("Tool not found: {0}")]
    ToolResolution(String),

    /// A downstream tool server failed while executing a call.
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// A JSON-RPC or completion payload that does not follow the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport-level failure of an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A call did not finish within its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The request was cancelled by its caller.
    #[error("Request cancelled")]
    Cancelled,

    /// The conversation store could not be written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConductorError {
    /// Whether this error aborts the whole request when raised at the
    /// completion boundary. Tool and persistence failures are contained.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ToolResolution(_) | Self::ToolExecution(_) | Self::Persistence(_)
        )
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::CompletionProvider { .. } => "completion_provider",
            Self::ToolResolution(_) => "tool_resolution",
            Self::ToolExecution(_) => "tool_execution",
            Self::Protocol(_) => "protocol",
            Self::Http(_) => "http",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Persistence(_) => "persistence",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
        }
    }
}

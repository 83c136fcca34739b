use serde::Serialize;
use std::fmt;

/// Pipeline error types.
///
/// Stage-local failures never escape `PipelineEngine::run`; they are captured
/// into `LeadState::error` as a [`StageFailure`]. The variants stay public so
/// collaborators and decision delegates can report which kind of failure
/// happened.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A required input field is absent (e.g. the company name).
    MissingInput(String),
    /// The enrichment source has no record for the requested company.
    NoData(String),
    /// An enrichment/opportunity/decision collaborator failed.
    Provider(String),
    /// A decision delegate returned output that could not be parsed or validated.
    DecisionParse(String),
    /// A stage did not finish within the configured timeout.
    Timeout(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<PipelineError>,
        /// Additional context message.
        context: String,
    },
}

/// Coarse error classification stored alongside a captured failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    NoData,
    Provider,
    DecisionParse,
    Timeout,
}

impl PipelineError {
    /// Returns the kind of the innermost error, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::MissingInput(_) => ErrorKind::MissingInput,
            PipelineError::NoData(_) => ErrorKind::NoData,
            PipelineError::Provider(_) => ErrorKind::Provider,
            PipelineError::DecisionParse(_) => ErrorKind::DecisionParse,
            PipelineError::Timeout(_) => ErrorKind::Timeout,
            PipelineError::WithContext { source, .. } => source.kind(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::MissingInput(msg) => write!(f, "Missing input: {}", msg),
            PipelineError::NoData(msg) => write!(f, "No data: {}", msg),
            PipelineError::Provider(msg) => write!(f, "Provider error: {}", msg),
            PipelineError::DecisionParse(msg) => write!(f, "Decision parse error: {}", msg),
            PipelineError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            PipelineError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Timeout(err.to_string())
        } else {
            PipelineError::Provider(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::DecisionParse(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `PipelineError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, PipelineError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

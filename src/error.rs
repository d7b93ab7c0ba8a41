//! Error taxonomy shared by tenant resolution, Workday acquisition, and the
//! rendering pipeline.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Maximum number of characters of a backend error body carried in
/// [`Error::BackendHttpError`].
pub const BODY_EXCERPT_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid tenant '{0}': must be one of csc, gms")]
    InvalidTenant(String),

    #[error(
        "configuration file not found: {}\n\
         tenant: {tenant} (from request or WORKDAY_TENANT)\n\
         production expects workday_config_production-{tenant}.json, \
         local development expects workday_config-{tenant}.json",
        .path.display()
    )]
    ConfigNotFound { path: PathBuf, tenant: String },

    #[error("configuration file {} is unreadable: {reason}", .path.display())]
    InvalidConfigFile { path: PathBuf, reason: String },

    #[error("missing required configuration fields: {}", .0.join(", "))]
    MissingConfigField(Vec<String>),

    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    #[error("employee {0} not found")]
    EmployeeNotFound(String),

    #[error("backend returned HTTP {status}: {body}")]
    BackendHttpError { status: u16, body: String },

    #[error("invalid profile response: {0}")]
    InvalidProfileResponse(String),

    #[error("SOAP envelope template not loaded; photo retrieval is disabled")]
    ProtocolUnavailable,

    #[error("Workday API returned error: {0}")]
    BackendFault(String),

    #[error("failed to parse XML response: {0}")]
    MalformedResponse(String),

    #[error("backend request timed out")]
    Timeout,

    #[error("backend request failed: {0}")]
    Transport(String),

    #[error("no rendering engine produced a PDF: {}", FailureList(.0))]
    RenderingUnavailable(Vec<EngineFailure>),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("template error: {0}")]
    Template(String),

    #[error("invalid setting {key}: {reason}")]
    Settings { key: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Trims a response body to [`BODY_EXCERPT_CHARS`] for error reporting.
    pub fn backend_http(status: u16, body: &str) -> Self {
        let body = if body.chars().count() > BODY_EXCERPT_CHARS {
            let mut cut: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
            cut.push_str("...");
            cut
        } else {
            body.to_string()
        };
        Error::BackendHttpError { status, body }
    }
}

/// A single engine's failure, raised while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{engine}: {cause}")]
pub struct EngineError {
    pub engine: String,
    pub cause: String,
}

impl EngineError {
    pub fn new(engine: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            cause: cause.into(),
        }
    }
}

/// Why an engine in the fallback chain did not produce output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The engine's probe reported it missing; it was never invoked.
    Unavailable,
    /// The engine was invoked and raised an error.
    Failed,
}

/// One entry of the aggregate [`Error::RenderingUnavailable`] report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    pub engine: String,
    pub kind: FailureKind,
    pub reason: String,
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FailureKind::Unavailable => "unavailable",
            FailureKind::Failed => "failed",
        };
        write!(f, "{} {} ({})", self.engine, kind, self.reason)
    }
}

struct FailureList<'a>(&'a [EngineFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no engines configured");
        }
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

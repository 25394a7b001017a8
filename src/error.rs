//! Error types for Strata
//!
//! All modules use `StrataResult<T>` as their return type.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for Strata operations
pub type StrataResult<T> = Result<T, StrataError>;

/// Broad classification used by the HTTP layer and CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input, rejected before touching the cache
    Validation,
    /// Result not available yet; the caller should retry later
    NotReady,
    /// The analysis itself failed
    Analysis,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Stable lowercase name, used in error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotReady => "not_ready",
            Self::Analysis => "analysis",
            Self::Internal => "internal",
        }
    }
}

/// All errors that can occur in Strata
#[derive(Error, Debug)]
pub enum StrataError {
    // Validation errors
    #[error("layer can not be empty")]
    LayerMissing,

    #[error("invalid layer index {value:?}: expected a non-negative integer")]
    LayerInvalid { value: String },

    #[error("layer index {index} is out of range (image has {count} layers)")]
    LayerOutOfRange { index: usize, count: usize },

    #[error("image name can not be empty")]
    ImageNameMissing,

    #[error("invalid image name {name:?}: {reason}")]
    ImageNameInvalid { name: String, reason: &'static str },

    // Availability
    #[error("no analysis available for {0}, request its detail first")]
    AnalysisUnknown(String),

    #[error("{0} is being analyzed, please wait for a moment")]
    AnalysisPending(String),

    // Analysis errors
    #[error("analysis of {image} failed: {source}")]
    AnalysisFailed {
        image: String,
        #[source]
        source: Arc<StrataError>,
    },

    #[error("Container engine not found: {0}")]
    EngineNotFound(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Image export failed: {image}: {reason}")]
    ImageExport { image: String, reason: String },

    #[error("Malformed image archive: {0}")]
    ArchiveInvalid(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid listen address {addr}: {reason}")]
    ListenAddress { addr: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl StrataError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Wrap a cached analysis failure so it can be replayed to every caller
    pub fn analysis_failed(image: impl Into<String>, source: Arc<StrataError>) -> Self {
        Self::AnalysisFailed {
            image: image.into(),
            source,
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LayerMissing
            | Self::LayerInvalid { .. }
            | Self::LayerOutOfRange { .. }
            | Self::ImageNameMissing
            | Self::ImageNameInvalid { .. }
            | Self::User(_) => ErrorKind::Validation,
            Self::AnalysisUnknown(_) | Self::AnalysisPending(_) => ErrorKind::NotReady,
            Self::AnalysisFailed { .. }
            | Self::EngineNotFound(_)
            | Self::ImageNotFound(_)
            | Self::ImagePull { .. }
            | Self::ImageExport { .. }
            | Self::ArchiveInvalid(_) => ErrorKind::Analysis,
            _ => ErrorKind::Internal,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::EngineNotFound(_) => Some("Install podman, or set analyzer.engine = \"docker\""),
            Self::ImageNotFound(_) => Some("Pull the image first, or set analyzer.pull = true"),
            Self::AnalysisUnknown(_) => Some("Request /images/detail/<name> to start the analysis"),
            Self::AnalysisPending(_) => Some("Retry in a few seconds"),
            Self::AnalysisFailed { source, .. } => source.hint(),
            _ => None,
        }
    }
}

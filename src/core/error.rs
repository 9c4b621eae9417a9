use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a model could not be brought into memory.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model {name} not found at {}", path.display())]
    NotFound { name: String, path: PathBuf },

    #[error("failed to load tokenizer for {name}: {reason}")]
    Tokenizer { name: String, reason: String },

    #[error("failed to load weights for {name}: {source}")]
    Weights {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unsupported model {name}: {reason}")]
    Unsupported { name: String, reason: String },

    #[error("loading {name} was interrupted: {reason}")]
    Interrupted { name: String, reason: String },
}

/// The single failure the registry reports for a load, whatever the cause.
#[derive(Debug, Error)]
#[error("failed to load model {name}: {source}")]
pub struct ModelLoadError {
    pub name: String,
    #[source]
    pub source: LoadError,
}

impl ModelLoadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self.source, LoadError::NotFound { .. })
    }
}

impl From<LoadError> for ModelLoadError {
    fn from(source: LoadError) -> Self {
        let name = match &source {
            LoadError::NotFound { name, .. }
            | LoadError::Tokenizer { name, .. }
            | LoadError::Weights { name, .. }
            | LoadError::Unsupported { name, .. }
            | LoadError::Interrupted { name, .. } => name.clone(),
        };
        Self { name, source }
    }
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("invalid sampling parameters: {0}")]
    InvalidParameters(String),

    #[error("inference failed: {0:#}")]
    Runtime(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Load(#[from] ModelLoadError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("worker failed: {0}")]
    Worker(String),
}

/// Coarse classification used by the protocol boundaries to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    LoadFailed,
    InferenceFailed,
    InvalidRequest,
    Timeout,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::Load(e) if e.is_not_found() => ErrorKind::NotFound,
            Error::Load(_) => ErrorKind::LoadFailed,
            Error::Inference(InferenceError::InvalidParameters(_)) => ErrorKind::InvalidRequest,
            Error::Inference(_) => ErrorKind::InferenceFailed,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Worker(_) => ErrorKind::Internal,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Worker(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

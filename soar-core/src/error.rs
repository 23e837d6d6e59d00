use soar_model::{MissingPropertyError, ModelError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoarError {
    /// An identity accessor ran without the required field. Never retried.
    #[error(transparent)]
    MissingProperty(#[from] MissingPropertyError),

    /// The remote command wrote to stderr or the backend reported failure.
    #[error("Execution failed: {message}")]
    Execution { message: String },

    /// No usable backend configuration, or the target never became ready.
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    /// Batch memorizer call with mismatched input/output lengths.
    #[error("Cache consistency violated: {inputs} inputs but {outputs} outputs")]
    CacheConsistency { inputs: usize, outputs: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// A runner failed; wraps its error with the stage name.
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<SoarError>,
    },
}

impl SoarError {
    pub fn execution(message: impl Into<String>) -> Self {
        SoarError::Execution {
            message: message.into(),
        }
    }

    pub fn provisioning(message: impl Into<String>) -> Self {
        SoarError::Provisioning(message.into())
    }

    pub fn stage(stage: impl Into<String>, source: SoarError) -> Self {
        SoarError::Stage {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through stage wrappers.
    pub fn root(&self) -> &SoarError {
        match self {
            SoarError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_execution(&self) -> bool {
        matches!(self.root(), SoarError::Execution { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), SoarError::Cancelled(_))
    }
}

impl From<ModelError> for SoarError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::MissingProperty(err) => SoarError::MissingProperty(err),
            ModelError::Json(err) => SoarError::InvalidPayload(err.to_string()),
            other => SoarError::InvalidPayload(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SoarError>;

use fieldmemo_protocol::ClassificationError;
use fieldmemo_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("{name} failed: {message}")]
    Collaborator { name: String, message: String },

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    pub fn collaborator(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Collaborator {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

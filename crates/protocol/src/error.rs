use thiserror::Error;

use crate::field::InstanceType;

pub type Result<T> = std::result::Result<T, ClassificationError>;

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("field {selector} is already classified as {existing:?}")]
    AlreadyAssigned {
        selector: String,
        existing: InstanceType,
    },

    #[error("Invalid field record: {0}")]
    InvalidRecord(String),
}

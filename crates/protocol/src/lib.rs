//! # fieldmemo protocol
//!
//! Shared data model for the form-field memoization engine: the normalized
//! [`FieldDescriptor`], its write-once structural classification, semantic key shapes,
//! and the resolved-value records the pipeline hands back to its caller.

mod error;
mod field;
pub mod key;
mod raw;
mod value;

pub use error::{ClassificationError, Result};
pub use field::{
    Classification, ControlType, DateRole, FieldDescriptor, IndexSource, InstanceType,
    MlPrediction, Scope, SectionType,
};
pub use raw::RawField;
pub use value::{ResolvedValue, ResultsMap, ValueSource};

/// Version of the persisted cache layout and of the engine configuration schema.
pub const SCHEMA_VERSION: u32 = 1;

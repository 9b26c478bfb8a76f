//! Services the pipeline consults but does not implement.
//!
//! Every collaborator is optional: [`Noop`] answers nothing and [`FieldIndexing`] trusts
//! the index the scanner already put on the field.

use async_trait::async_trait;
use fieldmemo_protocol::{
    FieldDescriptor, IndexSource, MlPrediction, ResolvedValue, ResultsMap, SectionType,
};
use fieldmemo_semantics::derive_base_key;

use crate::error::Result;

/// Predicts a semantic label for a field.
#[async_trait]
pub trait MlClassifier: Send + Sync {
    async fn predict(&self, field: &FieldDescriptor) -> Result<Option<MlPrediction>>;
}

/// Row position assigned to a field inside a repeating section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexAssignment {
    pub index: u32,
    pub confidence: f32,
    pub source: IndexSource,
}

impl IndexAssignment {
    /// Confidence given to an index read from the document structure.
    pub const STRUCTURAL_CONFIDENCE: f32 = 1.0;
    /// Confidence given to an index inferred by counting.
    pub const SYNTHETIC_CONFIDENCE: f32 = 0.6;

    pub fn new(index: u32, source: IndexSource) -> Self {
        let confidence = match source {
            IndexSource::Structural => Self::STRUCTURAL_CONFIDENCE,
            IndexSource::Synthetic => Self::SYNTHETIC_CONFIDENCE,
            IndexSource::None => 0.0,
        };
        Self {
            index,
            confidence,
            source,
        }
    }
}

/// Row index and base-key identity of a field.
#[async_trait]
pub trait IndexingService: Send + Sync {
    /// `section_type` is whatever the scanner already knows about the field's section.
    async fn index_of(
        &self,
        field: &FieldDescriptor,
        _section_type: Option<&SectionType>,
    ) -> Result<Option<IndexAssignment>> {
        Ok(field
            .field_index
            .map(|index| IndexAssignment::new(index, field.index_source)))
    }

    fn base_key(&self, field: &FieldDescriptor) -> String {
        derive_base_key(field)
    }
}

/// Deterministic values from the user's profile. Results are keyed by selector.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    async fn resolve(&self, fields: &[FieldDescriptor]) -> Result<ResultsMap>;
}

/// Fills whole repeating-section rows.
#[async_trait]
pub trait SectionHandler: Send + Sync {
    async fn resolve_rows(&self, fields: &[FieldDescriptor]) -> Result<ResultsMap>;
}

/// Answers multi-value sets (skills, languages, ...).
#[async_trait]
pub trait CompositeHandler: Send + Sync {
    async fn resolve_sets(&self, fields: &[FieldDescriptor]) -> Result<ResultsMap>;
}

/// Last-resort batched inference for whatever is still unresolved.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(&self, fields: &[FieldDescriptor]) -> Result<ResultsMap>;
}

/// Applies a resolved value to the live form.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn fill(&self, field: &FieldDescriptor, value: &ResolvedValue) -> Result<()>;
}

/// Uses the index the field already carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldIndexing;

impl IndexingService for FieldIndexing {}

/// Collaborator that knows nothing and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

#[async_trait]
impl MlClassifier for Noop {
    async fn predict(&self, _field: &FieldDescriptor) -> Result<Option<MlPrediction>> {
        Ok(None)
    }
}

#[async_trait]
impl RuleEngine for Noop {
    async fn resolve(&self, _fields: &[FieldDescriptor]) -> Result<ResultsMap> {
        Ok(ResultsMap::new())
    }
}

#[async_trait]
impl SectionHandler for Noop {
    async fn resolve_rows(&self, _fields: &[FieldDescriptor]) -> Result<ResultsMap> {
        Ok(ResultsMap::new())
    }
}

#[async_trait]
impl CompositeHandler for Noop {
    async fn resolve_sets(&self, _fields: &[FieldDescriptor]) -> Result<ResultsMap> {
        Ok(ResultsMap::new())
    }
}

#[async_trait]
impl InferenceClient for Noop {
    async fn infer(&self, _fields: &[FieldDescriptor]) -> Result<ResultsMap> {
        Ok(ResultsMap::new())
    }
}

#[async_trait]
impl Executor for Noop {
    async fn fill(&self, _field: &FieldDescriptor, _value: &ResolvedValue) -> Result<()> {
        Ok(())
    }
}

//! # fieldmemo pipeline
//!
//! One scan pass, end to end.
//!
//! ## Stages
//!
//! ```text
//! fields
//!   │
//!   ├──> prepare: ML label, index, section, base key, duplicates, date roles,
//!   │             classification (frozen), semantic key
//!   ├──> group:   single / multi / repeater / candidate / unclassified
//!   ├──> atomic:  history -> rule engine -> memory fallback
//!   ├──> rows:    history -> SectionHandler
//!   ├──> sets:    history -> CompositeHandler
//!   ├──> inference (batched, whatever is left)
//!   └──> execute in input order, write back what was learned
//! ```
//!
//! Failures of any collaborator are logged and cost only that collaborator's answers.

mod collaborators;
mod config;
mod error;
mod pipeline;
mod strategies;

pub use collaborators::{
    CompositeHandler, Executor, FieldIndexing, IndexAssignment, IndexingService, InferenceClient, MlClassifier,
    Noop, RuleEngine, SectionHandler,
};
pub use config::{EngineConfig, PipelineConfig, CONFIG_ENV};
pub use error::{PipelineError, Result};
pub use pipeline::{PassStats, PipelineReport, PreparedPass, ResolutionPipeline, ResolutionPipelineBuilder};
pub use strategies::{HistoryStrategy, MemoryFallbackStrategy, ResolutionStrategy, RuleEngineStrategy};

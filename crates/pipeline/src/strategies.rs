use async_trait::async_trait;
use fieldmemo_protocol::{DateRole, FieldDescriptor, ResolvedValue, ResultsMap, ValueSource};
use fieldmemo_store::TieredCacheStore;
use std::sync::Arc;

use crate::collaborators::RuleEngine;
use crate::error::Result;

const MEMORY_CONFIDENCE_FACTOR: f32 = 0.9;

/// One link of the atomic resolution chain. Each strategy only ever sees fields that the
/// strategies before it left unresolved.
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, fields: &[FieldDescriptor]) -> Result<ResultsMap>;
}

/// Replays values from the cache at the store's own threshold.
pub struct HistoryStrategy {
    store: Arc<TieredCacheStore>,
}

impl HistoryStrategy {
    pub fn new(store: Arc<TieredCacheStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResolutionStrategy for HistoryStrategy {
    fn name(&self) -> &'static str {
        "history"
    }

    async fn resolve(&self, fields: &[FieldDescriptor]) -> Result<ResultsMap> {
        let mut results = ResultsMap::new();
        for field in fields {
            // A third date in a row has no stable identity; replaying it would guess.
            if field.date_role == Some(DateRole::Unknown) {
                continue;
            }
            if let Some(hit) = self.store.read(field, "").await {
                results.insert(
                    field.selector.clone(),
                    ResolvedValue::new(hit.value, hit.confidence, ValueSource::Cache),
                );
            }
        }
        Ok(results)
    }
}

/// Delegates to the rule engine, keeping only answers for the fields asked about.
pub struct RuleEngineStrategy {
    engine: Arc<dyn RuleEngine>,
}

impl RuleEngineStrategy {
    pub fn new(engine: Arc<dyn RuleEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ResolutionStrategy for RuleEngineStrategy {
    fn name(&self) -> &'static str {
        "rule_engine"
    }

    async fn resolve(&self, fields: &[FieldDescriptor]) -> Result<ResultsMap> {
        let mut results = self.engine.resolve(fields).await?;
        results.retain(|selector, _| fields.iter().any(|f| &f.selector == selector));
        Ok(results)
    }
}

/// Broad cache lookup at a relaxed threshold, also trying the ML label as the field's
/// label.
pub struct MemoryFallbackStrategy {
    store: Arc<TieredCacheStore>,
    threshold: f32,
}

impl MemoryFallbackStrategy {
    pub fn new(store: Arc<TieredCacheStore>, threshold: f32) -> Self {
        Self { store, threshold }
    }
}

#[async_trait]
impl ResolutionStrategy for MemoryFallbackStrategy {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn resolve(&self, fields: &[FieldDescriptor]) -> Result<ResultsMap> {
        let mut results = ResultsMap::new();
        for field in fields {
            if field.date_role == Some(DateRole::Unknown) {
                continue;
            }
            let mut labels = vec![field.display_label().to_string()];
            if let Some(prediction) = &field.ml_prediction {
                labels.push(prediction.label.replace('_', " "));
            }
            for label in labels.iter().filter(|l| !l.trim().is_empty()) {
                if let Some(hit) = self
                    .store
                    .read_with_threshold(field, label, self.threshold)
                    .await
                {
                    results.insert(
                        field.selector.clone(),
                        ResolvedValue::new(
                            hit.value,
                            hit.confidence * MEMORY_CONFIDENCE_FACTOR,
                            ValueSource::Memory,
                        ),
                    );
                    break;
                }
            }
        }
        Ok(results)
    }
}

use fieldmemo_protocol::{
    FieldDescriptor, IndexSource, InstanceType, ResolvedValue, ResultsMap, SectionType,
};
use fieldmemo_semantics::patterns::infer_section_name;
use fieldmemo_semantics::{
    DateRoleSequencer, FieldClassifier, RepeaterRegistry, SemanticKeyGenerator,
};
use fieldmemo_store::{TieredCacheStore, WriteOutcome};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::collaborators::{
    CompositeHandler, Executor, FieldIndexing, IndexAssignment, IndexingService, InferenceClient,
    MlClassifier, Noop, RuleEngine, SectionHandler,
};
use crate::config::{EngineConfig, PipelineConfig};
use crate::error::Result;
use crate::strategies::{
    HistoryStrategy, MemoryFallbackStrategy, ResolutionStrategy, RuleEngineStrategy,
};

/// A scan pass after enrichment: every field classified (or knowingly left
/// unclassified) and keyed.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedPass {
    pub fields: Vec<FieldDescriptor>,
    /// selector -> semantic key
    pub keys: BTreeMap<String, String>,
    /// Base keys proven repeating during the pass.
    pub proven_repeaters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassStats {
    pub fields: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub by_source: BTreeMap<String, usize>,
    pub strategy_failures: usize,
    pub filled: usize,
    pub skipped: usize,
    pub fill_failures: usize,
    pub written_back: usize,
    pub proven_repeaters: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// selector -> resolved value
    pub results: ResultsMap,
    /// Selectors nothing could answer, in input order.
    pub unresolved: Vec<String>,
    pub keys: BTreeMap<String, String>,
    pub stats: PassStats,
}

#[derive(Default)]
struct Groups {
    atomic_single: Vec<usize>,
    atomic_multi: Vec<usize>,
    section_repeater: Vec<usize>,
    section_candidate: Vec<usize>,
    unclassified: Vec<usize>,
}

/// Orchestrates one scan pass: enrich, classify, resolve, execute, learn.
pub struct ResolutionPipeline {
    store: Arc<TieredCacheStore>,
    classifier: FieldClassifier,
    keys: SemanticKeyGenerator,
    config: PipelineConfig,
    ml: Arc<dyn MlClassifier>,
    indexing: Arc<dyn IndexingService>,
    rules: Arc<dyn RuleEngine>,
    sections: Arc<dyn SectionHandler>,
    composites: Arc<dyn CompositeHandler>,
    inference: Arc<dyn InferenceClient>,
    executor: Arc<dyn Executor>,
}

pub struct ResolutionPipelineBuilder {
    store: Arc<TieredCacheStore>,
    classifier: FieldClassifier,
    keys: SemanticKeyGenerator,
    config: PipelineConfig,
    ml: Arc<dyn MlClassifier>,
    indexing: Arc<dyn IndexingService>,
    rules: Arc<dyn RuleEngine>,
    sections: Arc<dyn SectionHandler>,
    composites: Arc<dyn CompositeHandler>,
    inference: Arc<dyn InferenceClient>,
    executor: Arc<dyn Executor>,
}

impl ResolutionPipelineBuilder {
    #[must_use]
    pub fn engine_config(mut self, config: &EngineConfig) -> Self {
        self.classifier = FieldClassifier::new(config.classifier);
        self.keys = SemanticKeyGenerator::new(config.keys);
        self.config = config.pipeline;
        self
    }

    #[must_use]
    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn ml_classifier(mut self, ml: Arc<dyn MlClassifier>) -> Self {
        self.ml = ml;
        self
    }

    #[must_use]
    pub fn indexing(mut self, indexing: Arc<dyn IndexingService>) -> Self {
        self.indexing = indexing;
        self
    }

    #[must_use]
    pub fn rule_engine(mut self, rules: Arc<dyn RuleEngine>) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn section_handler(mut self, sections: Arc<dyn SectionHandler>) -> Self {
        self.sections = sections;
        self
    }

    #[must_use]
    pub fn composite_handler(mut self, composites: Arc<dyn CompositeHandler>) -> Self {
        self.composites = composites;
        self
    }

    #[must_use]
    pub fn inference_client(mut self, inference: Arc<dyn InferenceClient>) -> Self {
        self.inference = inference;
        self
    }

    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn build(self) -> ResolutionPipeline {
        ResolutionPipeline {
            store: self.store,
            classifier: self.classifier,
            keys: self.keys,
            config: self.config,
            ml: self.ml,
            indexing: self.indexing,
            rules: self.rules,
            sections: self.sections,
            composites: self.composites,
            inference: self.inference,
            executor: self.executor,
        }
    }
}

impl ResolutionPipeline {
    pub fn builder(store: Arc<TieredCacheStore>) -> ResolutionPipelineBuilder {
        ResolutionPipelineBuilder {
            store,
            classifier: FieldClassifier::default(),
            keys: SemanticKeyGenerator::default(),
            config: PipelineConfig::default(),
            ml: Arc::new(Noop),
            indexing: Arc::new(FieldIndexing),
            rules: Arc::new(Noop),
            sections: Arc::new(Noop),
            composites: Arc::new(Noop),
            inference: Arc::new(Noop),
            executor: Arc::new(Noop),
        }
    }

    pub fn store(&self) -> &Arc<TieredCacheStore> {
        &self.store
    }

    /// Enrich stage: ML prediction, index and section context, base keys, duplicate
    /// counts, date roles, frozen classification, semantic keys.
    ///
    /// The repeater registry lives exactly as long as this call.
    pub async fn prepare(&self, mut fields: Vec<FieldDescriptor>) -> PreparedPass {
        for field in &mut fields {
            if field.ml_prediction.is_none() {
                match self.ml.predict(field).await {
                    Ok(prediction) => field.ml_prediction = prediction,
                    Err(err) => log::warn!("{}: ML prediction failed: {err}", field.selector),
                }
            }
            match self.indexing.index_of(field, field.section_type.as_ref()).await {
                Ok(Some(assignment)) if outranks(field, &assignment) => {
                    log::debug!(
                        "{}: row {} ({:?}, confidence {:.2})",
                        field.selector,
                        assignment.index,
                        assignment.source,
                        assignment.confidence
                    );
                    field.field_index = Some(assignment.index);
                    field.index_source = assignment.source;
                }
                Ok(Some(assignment)) => log::debug!(
                    "{}: kept structural row over {:?} guess {}",
                    field.selector,
                    assignment.source,
                    assignment.index
                ),
                Ok(None) => {}
                Err(err) => log::warn!("{}: indexing failed: {err}", field.selector),
            }
            if field.section_type.is_none() && field.field_index.is_some() {
                field.section_type = infer_section_name(&field.parent_context)
                    .or_else(|| infer_section_name(&field.combined_text()))
                    .and_then(SectionType::parse);
            }
            if field.base_key.is_none() {
                field.base_key = Some(self.indexing.base_key(field));
            }
        }

        let mut duplicates: HashMap<String, usize> = HashMap::new();
        for field in &fields {
            if let Some(base_key) = &field.base_key {
                *duplicates.entry(base_key.clone()).or_default() += 1;
            }
        }

        let mut dates = DateRoleSequencer::new();
        for field in &mut fields {
            if field.date_role.is_none() {
                field.date_role = dates.assign(field);
            }
        }

        let mut registry = RepeaterRegistry::new();
        for field in &mut fields {
            let count = field
                .base_key
                .as_ref()
                .and_then(|key| duplicates.get(key))
                .copied()
                .unwrap_or(1);
            if field.classification().is_some() {
                continue;
            }
            if let Err(err) = self.classifier.classify(field, count, &mut registry) {
                log::warn!("{}: classification skipped: {err}", field.selector);
            }
        }

        let keys: BTreeMap<String, String> = fields
            .iter()
            .map(|field| {
                let key = self.keys.generate_key(field, "").key;
                (field.selector.clone(), key)
            })
            .collect();
        log::debug!(
            "Prepared {} fields ({} proven repeaters)",
            fields.len(),
            registry.len()
        );

        let mut proven_repeaters: Vec<String> = registry.iter().map(str::to_string).collect();
        proven_repeaters.sort();
        PreparedPass {
            fields,
            keys,
            proven_repeaters,
        }
    }

    /// Runs a whole pass. Collaborator failures are logged and isolated; only the final
    /// report is returned.
    pub async fn run(&self, fields: Vec<FieldDescriptor>) -> Result<PipelineReport> {
        let started = Instant::now();
        let prepared = self.prepare(fields).await;
        let fields = prepared.fields;
        let mut stats = PassStats {
            fields: fields.len(),
            proven_repeaters: prepared.proven_repeaters.len(),
            ..PassStats::default()
        };

        let groups = group_fields(&fields);
        log::debug!(
            "Groups: {} single, {} multi, {} repeater, {} candidate, {} unclassified",
            groups.atomic_single.len(),
            groups.atomic_multi.len(),
            groups.section_repeater.len(),
            groups.section_candidate.len(),
            groups.unclassified.len()
        );

        let mut results = ResultsMap::new();

        let atomic: Vec<usize> = groups
            .atomic_single
            .iter()
            .chain(&groups.section_candidate)
            .chain(&groups.unclassified)
            .copied()
            .collect();
        let history = HistoryStrategy::new(Arc::clone(&self.store));
        let rules = RuleEngineStrategy::new(Arc::clone(&self.rules));
        let memory = MemoryFallbackStrategy::new(
            Arc::clone(&self.store),
            self.config.memory_fallback_threshold,
        );
        let chain: [&dyn ResolutionStrategy; 3] = [&history, &rules, &memory];
        for strategy in chain {
            let pending = pending_fields(&fields, &atomic, &results);
            if pending.is_empty() {
                break;
            }
            match strategy.resolve(&pending).await {
                Ok(found) => {
                    let added = absorb(&mut results, &pending, found);
                    log::debug!("{}: {added}/{} resolved", strategy.name(), pending.len());
                }
                Err(err) => {
                    stats.strategy_failures += 1;
                    log::warn!("{} strategy failed: {err}", strategy.name());
                }
            }
        }

        // Rows and sets: history first, then their dedicated handler.
        for (indices, name) in [
            (&groups.section_repeater, "section_handler"),
            (&groups.atomic_multi, "composite_handler"),
        ] {
            let pending = pending_fields(&fields, indices, &results);
            if pending.is_empty() {
                continue;
            }
            match history.resolve(&pending).await {
                Ok(found) => {
                    absorb(&mut results, &pending, found);
                }
                Err(err) => {
                    stats.strategy_failures += 1;
                    log::warn!("history strategy failed: {err}");
                }
            }
            let pending = pending_fields(&fields, indices, &results);
            if pending.is_empty() {
                continue;
            }
            let handled = if name == "section_handler" {
                self.sections.resolve_rows(&pending).await
            } else {
                self.composites.resolve_sets(&pending).await
            };
            match handled {
                Ok(found) => {
                    let added = absorb(&mut results, &pending, found);
                    log::debug!("{name}: {added}/{} resolved", pending.len());
                }
                Err(err) => {
                    stats.strategy_failures += 1;
                    log::warn!("{name} failed: {err}");
                }
            }
        }

        let all: Vec<usize> = (0..fields.len()).collect();
        let unresolved = pending_fields(&fields, &all, &results);
        if !unresolved.is_empty() {
            let batch_size = self.config.inference_batch_size.max(1);
            for batch in unresolved.chunks(batch_size) {
                match self.inference.infer(batch).await {
                    Ok(found) => {
                        absorb(&mut results, batch, found);
                    }
                    Err(err) => {
                        stats.strategy_failures += 1;
                        log::warn!("Inference batch of {} failed: {err}", batch.len());
                    }
                }
            }
        }

        self.execute(&fields, &results, &mut stats).await;

        let unresolved: Vec<String> = fields
            .iter()
            .filter(|f| !results.contains_key(&f.selector))
            .map(|f| f.selector.clone())
            .collect();
        stats.resolved = results.len();
        stats.unresolved = unresolved.len();
        for value in results.values() {
            *stats
                .by_source
                .entry(value.source.as_str().to_string())
                .or_default() += 1;
        }
        stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "Pass complete: {}/{} resolved, {} filled, {} learned in {}ms",
            stats.resolved,
            stats.fields,
            stats.filled,
            stats.written_back,
            stats.elapsed_ms
        );

        Ok(PipelineReport {
            results,
            unresolved,
            keys: prepared.keys,
            stats,
        })
    }

    /// Fills in input order and learns every value that did not come from the cache.
    async fn execute(&self, fields: &[FieldDescriptor], results: &ResultsMap, stats: &mut PassStats) {
        let mut paced = false;
        for field in fields {
            let Some(value) = results.get(&field.selector) else {
                continue;
            };
            if value.skip_execution {
                stats.skipped += 1;
            } else {
                if paced {
                    let delay = pacing_delay(self.config.pacing_min_ms, self.config.pacing_max_ms);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                paced = true;
                if let Err(err) = self.executor.fill(field, value).await {
                    stats.fill_failures += 1;
                    log::warn!("{}: fill failed: {err}", field.selector);
                    continue;
                }
                stats.filled += 1;
            }

            if self.config.write_back && !value.source.is_cached() && self.write_back(field, value).await {
                stats.written_back += 1;
            }
        }
    }

    async fn write_back(&self, field: &FieldDescriptor, value: &ResolvedValue) -> bool {
        let outcome = if field.instance_type() == Some(InstanceType::AtomicMulti) {
            self.store
                .update_multi_selection(field, "", value.value.clone(), true)
                .await
                .map(|_| true)
        } else {
            self.store
                .write_with_confidence(field, "", value.value.clone(), value.confidence)
                .await
                .map(|outcome| matches!(outcome, WriteOutcome::Stored { .. }))
        };
        match outcome {
            Ok(stored) => stored,
            Err(err) => {
                log::warn!("{}: write-back failed: {err}", field.selector);
                false
            }
        }
    }
}

/// A structural index read by the scanner is never replaced by a counted guess.
fn outranks(field: &FieldDescriptor, assignment: &IndexAssignment) -> bool {
    field.index_source != IndexSource::Structural
        || field.field_index.is_none()
        || assignment.source == IndexSource::Structural
}

fn group_fields(fields: &[FieldDescriptor]) -> Groups {
    let mut groups = Groups::default();
    for (index, field) in fields.iter().enumerate() {
        match field.instance_type() {
            Some(InstanceType::AtomicSingle) => groups.atomic_single.push(index),
            Some(InstanceType::AtomicMulti) => groups.atomic_multi.push(index),
            Some(InstanceType::SectionRepeater) => groups.section_repeater.push(index),
            Some(InstanceType::SectionCandidate) => groups.section_candidate.push(index),
            None => groups.unclassified.push(index),
        }
    }
    groups
}

fn pending_fields(fields: &[FieldDescriptor], indices: &[usize], results: &ResultsMap) -> Vec<FieldDescriptor> {
    indices
        .iter()
        .map(|&index| &fields[index])
        .filter(|field| !results.contains_key(&field.selector))
        .cloned()
        .collect()
}

/// Merges `found` into `results`, keeping only answers for `asked` fields that are not
/// already resolved. Returns the number of new answers.
fn absorb(results: &mut ResultsMap, asked: &[FieldDescriptor], found: ResultsMap) -> usize {
    let asked: HashSet<&str> = asked.iter().map(|f| f.selector.as_str()).collect();
    let mut added = 0;
    for (selector, value) in found {
        if !asked.contains(selector.as_str()) || value.value.is_null() {
            continue;
        }
        if let std::collections::hash_map::Entry::Vacant(slot) = results.entry(selector) {
            slot.insert(value);
            added += 1;
        }
    }
    added
}

/// Uniform delay in `[min_ms, max_ms]`.
fn pacing_delay(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    let mut bytes = [0u8; 8];
    if getrandom::getrandom(&mut bytes).is_err() {
        return Duration::from_millis(min_ms);
    }
    let span = max_ms - min_ms + 1;
    Duration::from_millis(min_ms + u64::from_le_bytes(bytes) % span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmemo_protocol::ValueSource;
    use serde_json::json;

    #[test]
    fn pacing_stays_in_range() {
        for _ in 0..100 {
            let delay = pacing_delay(10, 20).as_millis();
            assert!((10..=20).contains(&delay), "{delay}");
        }
        assert_eq!(pacing_delay(0, 0), Duration::ZERO);
        assert_eq!(pacing_delay(30, 10), Duration::from_millis(30));
    }

    #[test]
    fn absorb_ignores_strangers_and_existing() {
        let asked = vec![FieldDescriptor::new("#a"), FieldDescriptor::new("#b")];
        let mut results = ResultsMap::new();
        results.insert(
            "#a".into(),
            ResolvedValue::new(json!("first"), 1.0, ValueSource::Cache),
        );

        let mut found = ResultsMap::new();
        for selector in ["#a", "#b", "#zzz"] {
            found.insert(
                selector.into(),
                ResolvedValue::new(json!("late"), 0.5, ValueSource::RuleEngine),
            );
        }
        assert_eq!(absorb(&mut results, &asked, found), 1);
        assert_eq!(results["#a"].value, json!("first"));
        assert_eq!(results["#b"].value, json!("late"));
        assert!(!results.contains_key("#zzz"));
    }
}

use fieldmemo_protocol::key::{base_part, split_scoped};
use fieldmemo_protocol::{FieldDescriptor, Scope};
use fieldmemo_semantics::patterns::{FLAT_SURVEY_RE, REPEATER_CONTAINER_RE, SECTION_KEYWORD_RE};
use fieldmemo_semantics::{get_canonical_key, FuzzyKeyMatcher, MatchHint, SemanticKeyGenerator};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::entry::{unix_ms_now, Bucket, CacheEntry, CacheMetadata};
use crate::error::Result;
use crate::lock::MutationLock;
use crate::repository::CacheRepository;
use crate::section::resolve_section_name;

const SECTION_ROW_CONFIDENCE: f32 = 0.9;
const SECTION_ROW_FUZZY_CONFIDENCE: f32 = 0.8;
const CROSS_BUCKET_FACTOR: f32 = 0.9;
const VARIANT_CONFIDENCE: f32 = 0.6;
const MIN_VARIANT_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    Stored { bucket: Bucket, key: String },
    Rejected { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    Exact,
    Fuzzy,
    /// A scalar lookup answered from the multi-value bucket.
    CrossBucket,
    /// Whole-word match against a recorded label variant.
    Variant,
    SectionRow,
    SectionRowFuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHit {
    pub value: Value,
    pub confidence: f32,
    pub source: HitSource,
    pub bucket: Bucket,
    /// Repository key the value was read from (the section name for row hits).
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub atomic_single: usize,
    pub atomic_multi: usize,
    pub sections: usize,
    pub section_rows: usize,
    pub metadata: CacheMetadata,
    pub lock_wait_ms_last: u64,
    pub lock_wait_ms_max: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: usize,
    pub last_cleanup_ms: u64,
}

/// Bucket a field's values live in: its frozen instance type, else keyword heuristics.
pub fn bucket_for(field: &FieldDescriptor) -> Bucket {
    if let Some(instance_type) = field.instance_type() {
        return Bucket::for_instance_type(instance_type);
    }
    if field.is_multi_valued() {
        return Bucket::AtomicMulti;
    }
    let text = field.combined_text();
    let sectional_context = field.in_repeater_container
        || SECTION_KEYWORD_RE.is_match(&text)
        || REPEATER_CONTAINER_RE.is_match(&field.parent_context);
    if field.field_index.is_some() && sectional_context && !FLAT_SURVEY_RE.is_match(&text) {
        Bucket::SectionRepeater
    } else {
        Bucket::AtomicSingle
    }
}

/// Three-bucket answer cache.
///
/// All mutations go through one [`MutationLock`]; reads run unlocked and only take the
/// lock to refresh `last_used_ms` on a hit.
pub struct TieredCacheStore {
    repository: Arc<dyn CacheRepository>,
    config: StoreConfig,
    keys: SemanticKeyGenerator,
    matcher: FuzzyKeyMatcher,
    lock: MutationLock,
}

impl TieredCacheStore {
    /// Wraps `repository`, sweeping expired entries when the last sweep is older than
    /// the configured interval.
    pub async fn open(repository: Arc<dyn CacheRepository>, config: StoreConfig) -> Result<Self> {
        let store = Self {
            repository,
            config,
            keys: SemanticKeyGenerator::default(),
            matcher: FuzzyKeyMatcher::default(),
            lock: MutationLock::new(),
        };
        store.sweep_if_due(unix_ms_now()).await?;
        Ok(store)
    }

    #[must_use]
    pub fn with_semantics(mut self, keys: SemanticKeyGenerator, matcher: FuzzyKeyMatcher) -> Self {
        self.keys = keys;
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn CacheRepository> {
        &self.repository
    }

    /// Canonical storage key of `field` (before section/row resolution).
    pub fn storage_key(&self, field: &FieldDescriptor, label: &str) -> String {
        get_canonical_key(&self.keys.generate_key(field, label).key)
    }

    pub async fn write(&self, field: &FieldDescriptor, label: &str, value: Value) -> Result<WriteOutcome> {
        self.write_with_confidence(field, label, value, 1.0).await
    }

    /// Stores `value` for `field`. Multi-value sets are rejected here; they change only
    /// through [`Self::update_multi_selection`].
    pub async fn write_with_confidence(
        &self,
        field: &FieldDescriptor,
        label: &str,
        value: Value,
        confidence: f32,
    ) -> Result<WriteOutcome> {
        let bucket = bucket_for(field);
        if bucket == Bucket::AtomicMulti {
            log::debug!("{}: generic write to a multi-value set rejected", field.selector);
            return Ok(WriteOutcome::Rejected {
                reason: "multi-value sets change only through update_multi_selection".into(),
            });
        }
        if is_empty_value(&value) {
            return Ok(WriteOutcome::Rejected {
                reason: "empty value".into(),
            });
        }

        let generated = self.keys.generate_key(field, label);
        let variant = variant_label(field, label);
        let now = unix_ms_now();
        let _guard = self.lock.acquire().await;

        if bucket == Bucket::SectionRepeater {
            let Some(index) = self.row_index(field) else {
                log::warn!(
                    "{}: row index {:?} out of range, not stored",
                    field.selector,
                    field.field_index
                );
                return Ok(WriteOutcome::Rejected {
                    reason: format!(
                        "row index must be below {}",
                        self.config.max_row_index
                    ),
                });
            };
            let section = resolve_section_name(field);
            let column = get_canonical_key(base_part(&generated.key));
            let mut entry = self
                .repository
                .get(bucket, &section)
                .await?
                .unwrap_or_else(|| CacheEntry::new(Value::Array(Vec::new()), bucket, Some(Scope::Section), now));
            set_row_value(&mut entry.value, index, &column, value);
            entry.record_write(variant, confidence, now);
            self.repository.set(bucket, &section, entry).await?;
            log::debug!("{}: stored {section}[{index}].{column}", field.selector);
            return Ok(WriteOutcome::Stored {
                bucket,
                key: section,
            });
        }

        let key = get_canonical_key(&generated.key);
        let mut entry = match self.repository.get(bucket, &key).await? {
            Some(mut existing) => {
                existing.value = value;
                existing
            }
            None => CacheEntry::new(value, bucket, field.scope(), now),
        };
        if let Some(scope) = field.scope() {
            entry.scope = Some(scope);
        }
        entry.record_write(variant, confidence, now);
        self.repository.set(bucket, &key, entry).await?;
        log::debug!("{}: stored {} '{key}'", field.selector, bucket.as_str());
        Ok(WriteOutcome::Stored { bucket, key })
    }

    /// Adds (`is_selected`) or removes `value` from the set stored for `field`, returning
    /// the resulting set. Array values apply element-wise. Row-scoped keys are reduced to
    /// their base part: sets are global.
    pub async fn update_multi_selection(
        &self,
        field: &FieldDescriptor,
        label: &str,
        value: Value,
        is_selected: bool,
    ) -> Result<Vec<Value>> {
        let generated = self.keys.generate_key(field, label);
        let key = get_canonical_key(base_part(&generated.key));
        let variant = variant_label(field, label);
        let items = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        let now = unix_ms_now();
        let _guard = self.lock.acquire().await;

        let mut entry = self
            .repository
            .get(Bucket::AtomicMulti, &key)
            .await?
            .unwrap_or_else(|| CacheEntry::new(Value::Array(Vec::new()), Bucket::AtomicMulti, Some(Scope::Global), now));
        let mut set = match entry.value.take() {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        for item in items.into_iter().filter(|item| !is_empty_value(item)) {
            if is_selected {
                if !set.iter().any(|known| same_value(known, &item)) {
                    set.push(item);
                }
            } else {
                set.retain(|known| !same_value(known, &item));
            }
        }
        entry.value = Value::Array(set.clone());
        entry.record_write(variant, 1.0, now);
        self.repository.set(Bucket::AtomicMulti, &key, entry).await?;
        log::debug!("{}: set '{key}' now has {} values", field.selector, set.len());
        Ok(set)
    }

    /// Looks up a remembered value for `field`. Repository failures are logged and read
    /// as a miss.
    pub async fn read(&self, field: &FieldDescriptor, label: &str) -> Option<CacheHit> {
        self.read_with_threshold(field, label, self.config.read_threshold)
            .await
    }

    /// [`Self::read`] with an explicit fuzzy-match threshold.
    pub async fn read_with_threshold(
        &self,
        field: &FieldDescriptor,
        label: &str,
        threshold: f32,
    ) -> Option<CacheHit> {
        match self.lookup(field, label, threshold).await {
            Ok(Some(hit)) => {
                if let Err(err) = self.touch(hit.bucket, &hit.key).await {
                    log::warn!("Failed to refresh cache entry '{}': {err}", hit.key);
                }
                Some(hit)
            }
            Ok(None) => None,
            Err(err) => {
                log::warn!("Cache read for {} failed: {err}", field.selector);
                None
            }
        }
    }

    async fn lookup(
        &self,
        field: &FieldDescriptor,
        label: &str,
        threshold: f32,
    ) -> Result<Option<CacheHit>> {
        let generated = self.keys.generate_key(field, label);
        let mut candidates = vec![get_canonical_key(&generated.key)];
        let fallback = get_canonical_key(&generated.fallback_key);
        if !candidates.contains(&fallback) {
            candidates.push(fallback);
        }

        let bucket = bucket_for(field);
        if bucket == Bucket::SectionRepeater {
            return self.read_section_row(field, &candidates).await;
        }

        let hint_label = variant_label(field, label);
        let hint = MatchHint {
            label: Some(hint_label).filter(|l| !l.is_empty()),
            ml_label: field.ml_prediction.as_ref().map(|p| p.label.as_str()),
        };

        if let Some(hit) = self
            .match_in_bucket(field, bucket, &candidates, &hint, threshold)
            .await?
        {
            return Ok(Some(hit));
        }

        // A scalar control may replay a set; a set never replays a scalar.
        if bucket == Bucket::AtomicSingle {
            let bases: Vec<String> = candidates
                .iter()
                .map(|c| get_canonical_key(base_part(c)))
                .collect();
            if let Some(mut hit) = self
                .match_in_bucket(field, Bucket::AtomicMulti, &bases, &hint, threshold)
                .await?
            {
                hit.confidence *= CROSS_BUCKET_FACTOR;
                hit.source = HitSource::CrossBucket;
                return Ok(Some(hit));
            }
        }

        let scope = split_scoped(&candidates[0]).map(|(context, _)| context);
        self.match_variant(field, bucket, hint_label, scope).await
    }

    async fn match_in_bucket(
        &self,
        field: &FieldDescriptor,
        bucket: Bucket,
        candidates: &[String],
        hint: &MatchHint<'_>,
        threshold: f32,
    ) -> Result<Option<CacheHit>> {
        for key in candidates {
            if let Some(entry) = self.repository.get(bucket, key).await? {
                if let Some(value) = shape_value(field, bucket, &entry.value) {
                    return Ok(Some(CacheHit {
                        value,
                        confidence: entry.exact_confidence(),
                        source: HitSource::Exact,
                        bucket,
                        key: key.clone(),
                    }));
                }
            }
        }

        let keys = self.repository.keys(bucket).await?;
        if keys.is_empty() {
            return Ok(None);
        }
        for key in candidates {
            let Some(found) = self.matcher.find_best_match_with(
                key,
                keys.iter().map(String::as_str),
                threshold,
                hint,
            ) else {
                continue;
            };
            let Some(entry) = self.repository.get(bucket, &found.matched_key).await? else {
                continue;
            };
            if let Some(value) = shape_value(field, bucket, &entry.value) {
                log::debug!(
                    "{}: '{key}' matched '{}' ({:?}, {:.2})",
                    field.selector,
                    found.matched_key,
                    found.source,
                    found.similarity
                );
                return Ok(Some(CacheHit {
                    value,
                    confidence: found.similarity.min(entry.exact_confidence()),
                    source: HitSource::Fuzzy,
                    bucket,
                    key: found.matched_key,
                }));
            }
        }
        Ok(None)
    }

    /// Whole-word search over recorded label variants. Keys in `bucket` must share the
    /// candidate's row scope (`scope` is its `SECTION:` context, `None` when unscoped);
    /// sets read across buckets are global.
    async fn match_variant(
        &self,
        field: &FieldDescriptor,
        bucket: Bucket,
        label: &str,
        scope: Option<&str>,
    ) -> Result<Option<CacheHit>> {
        let needle = label.trim_matches(|c: char| !c.is_alphanumeric());
        if needle.len() < MIN_VARIANT_LEN {
            return Ok(None);
        }
        let Ok(needle_re) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(needle))) else {
            return Ok(None);
        };

        let mut buckets = vec![bucket];
        if bucket == Bucket::AtomicSingle {
            buckets.push(Bucket::AtomicMulti);
        }
        for bucket in buckets {
            for (key, entry) in self.repository.entries(bucket).await? {
                if bucket != Bucket::AtomicMulti
                    && split_scoped(&key).map(|(context, _)| context) != scope
                {
                    continue;
                }
                let matched = entry
                    .variants
                    .iter()
                    .any(|variant| needle_re.is_match(variant) || contains_words(needle, variant));
                if !matched {
                    continue;
                }
                if let Some(value) = shape_value(field, bucket, &entry.value) {
                    return Ok(Some(CacheHit {
                        value,
                        confidence: VARIANT_CONFIDENCE,
                        source: HitSource::Variant,
                        bucket,
                        key,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Row lookup for repeaters. Never falls through to the scalar buckets: a miss here is
    /// a miss.
    async fn read_section_row(&self, field: &FieldDescriptor, candidates: &[String]) -> Result<Option<CacheHit>> {
        let Some(index) = self.row_index(field) else {
            return Ok(None);
        };
        let section = resolve_section_name(field);
        let Some(entry) = self.repository.get(Bucket::SectionRepeater, &section).await? else {
            return Ok(None);
        };
        let Some(row) = entry.value.get(index).and_then(Value::as_object) else {
            return Ok(None);
        };
        let columns: Vec<String> = candidates
            .iter()
            .map(|c| get_canonical_key(base_part(c)))
            .filter(|c| !c.is_empty())
            .collect();

        let hit = |value: &Value, confidence, source| CacheHit {
            value: value.clone(),
            confidence,
            source,
            bucket: Bucket::SectionRepeater,
            key: section.clone(),
        };

        for column in &columns {
            if let Some(value) = row.get(column).filter(|v| !is_empty_value(v)) {
                return Ok(Some(hit(value, SECTION_ROW_CONFIDENCE, HitSource::SectionRow)));
            }
        }
        for column in &columns {
            let found = row.iter().find(|(name, value)| {
                !is_empty_value(value)
                    && (name.contains(column.as_str())
                        || column.contains(name.as_str())
                        || get_canonical_key(name) == *column)
            });
            if let Some((_, value)) = found {
                return Ok(Some(hit(value, SECTION_ROW_FUZZY_CONFIDENCE, HitSource::SectionRowFuzzy)));
            }
        }
        Ok(None)
    }

    /// Row position of a repeater field, `None` when implausibly large.
    fn row_index(&self, field: &FieldDescriptor) -> Option<usize> {
        let index = field.field_index.unwrap_or(0);
        (index < self.config.max_row_index).then_some(index as usize)
    }

    async fn touch(&self, bucket: Bucket, key: &str) -> Result<()> {
        let _guard = self.lock.acquire().await;
        if let Some(mut entry) = self.repository.get(bucket, key).await? {
            entry.touch(unix_ms_now());
            self.repository.set(bucket, key, entry).await?;
        }
        Ok(())
    }

    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        self.sweep_expired_at(unix_ms_now()).await
    }

    /// Sweeps as if the current time were `now_ms`.
    pub async fn sweep_expired_at(&self, now_ms: u64) -> Result<SweepReport> {
        let _guard = self.lock.acquire().await;
        let removed = self
            .repository
            .sweep_expired(now_ms, self.config.ttl_ms())
            .await?;
        if removed > 0 {
            log::info!("Swept {removed} expired cache entries");
        }
        Ok(SweepReport {
            removed,
            last_cleanup_ms: now_ms,
        })
    }

    async fn sweep_if_due(&self, now_ms: u64) -> Result<Option<SweepReport>> {
        let metadata = self.repository.metadata().await?;
        if now_ms.saturating_sub(metadata.last_cleanup_ms) < self.config.sweep_interval_ms() {
            return Ok(None);
        }
        self.sweep_expired_at(now_ms).await.map(Some)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let sections = self.repository.entries(Bucket::SectionRepeater).await?;
        Ok(CacheStats {
            atomic_single: self.repository.keys(Bucket::AtomicSingle).await?.len(),
            atomic_multi: self.repository.keys(Bucket::AtomicMulti).await?.len(),
            sections: sections.len(),
            section_rows: sections
                .iter()
                .map(|(_, entry)| entry.value.as_array().map_or(0, Vec::len))
                .sum(),
            metadata: self.repository.metadata().await?,
            lock_wait_ms_last: self.lock.wait_ms_last(),
            lock_wait_ms_max: self.lock.wait_ms_max(),
        })
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.acquire().await;
        self.repository.clear().await
    }

    pub fn lock_wait_ms_last(&self) -> u64 {
        self.lock.wait_ms_last()
    }

    pub fn lock_wait_ms_max(&self) -> u64 {
        self.lock.wait_ms_max()
    }
}

fn variant_label<'a>(field: &'a FieldDescriptor, label: &'a str) -> &'a str {
    let label = label.trim();
    if label.is_empty() {
        field.display_label()
    } else {
        label
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        _ => a == b,
    }
}

/// `needle` contains every word of `variant` as a whole word ("Current employer name"
/// against variant "employer").
fn contains_words(needle: &str, variant: &str) -> bool {
    let variant = variant.trim_matches(|c: char| !c.is_alphanumeric());
    if variant.len() < MIN_VARIANT_LEN {
        return false;
    }
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(variant)))
        .map(|re| re.is_match(needle))
        .unwrap_or(false)
}

/// Empty values read as misses. A set read through a single-valued control that is
/// addressed by index yields the element at that index.
fn shape_value(field: &FieldDescriptor, bucket: Bucket, value: &Value) -> Option<Value> {
    if is_empty_value(value) {
        return None;
    }
    match (bucket, value, field.field_index) {
        (Bucket::AtomicMulti, Value::Array(items), Some(index)) if !field.is_multi_valued() => {
            items.get(index as usize).cloned()
        }
        _ => Some(value.clone()),
    }
}

fn set_row_value(rows: &mut Value, index: usize, column: &str, value: Value) {
    if !rows.is_array() {
        *rows = Value::Array(Vec::new());
    }
    let Value::Array(items) = rows else {
        return;
    };
    while items.len() <= index {
        items.push(Value::Object(Map::new()));
    }
    if !items[index].is_object() {
        items[index] = Value::Object(Map::new());
    }
    if let Value::Object(row) = &mut items[index] {
        row.insert(column.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use fieldmemo_protocol::{Classification, ControlType, IndexSource, InstanceType, SectionType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const DAY_MS: u64 = 86_400_000;

    async fn store() -> (Arc<MemoryRepository>, TieredCacheStore) {
        let repo = Arc::new(MemoryRepository::new());
        let store = TieredCacheStore::open(repo.clone(), StoreConfig::default())
            .await
            .unwrap();
        (repo, store)
    }

    fn classified(mut field: FieldDescriptor, instance_type: InstanceType, scope: Scope) -> FieldDescriptor {
        field
            .assign_classification(Classification {
                instance_type,
                scope,
            })
            .unwrap();
        field
    }

    fn text(label: &str) -> FieldDescriptor {
        classified(
            FieldDescriptor::new(format!("#{}", label.replace(' ', "-"))).with_label(label),
            InstanceType::AtomicSingle,
            Scope::Global,
        )
    }

    fn skills() -> FieldDescriptor {
        classified(
            FieldDescriptor::new("#skills")
                .with_label("Skills")
                .with_control(ControlType::Checkbox),
            InstanceType::AtomicMulti,
            Scope::Global,
        )
    }

    fn school(index: u32) -> FieldDescriptor {
        classified(
            FieldDescriptor::new(format!("#school-{index}"))
                .with_label("School Name")
                .in_section(SectionType::Education, index, IndexSource::Structural),
            InstanceType::SectionRepeater,
            Scope::Section,
        )
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let (_, store) = store().await;
        let field = text("Email");
        let outcome = store.write(&field, "Email", json!("a@b.c")).await.unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::Stored {
                bucket: Bucket::AtomicSingle,
                key: "email".into()
            }
        );

        let hit = store.read(&field, "Email").await.unwrap();
        assert_eq!(hit.value, json!("a@b.c"));
        assert_eq!(hit.source, HitSource::Exact);
        assert!((hit.confidence - 0.77).abs() < 1e-6);
    }

    #[tokio::test]
    async fn repeated_write_is_idempotent_on_value() {
        let (repo, store) = store().await;
        let field = text("Company Name");
        store.write(&field, "", json!("Acme")).await.unwrap();
        store.write(&field, "", json!("Acme")).await.unwrap();

        let snapshot = repo.snapshot().await;
        let entry = &snapshot.atomic_single["employer_name"];
        assert_eq!(entry.value, json!("Acme"));
        assert_eq!(entry.use_count, 2);
        assert_eq!(entry.variants, vec!["Company Name"]);
        assert_eq!(snapshot.total_entries(), 1);
    }

    #[tokio::test]
    async fn alias_and_fuzzy_reads() {
        let (_, store) = store().await;
        store
            .write(&text("Company Name"), "", json!("Acme"))
            .await
            .unwrap();
        let hit = store.read(&text("Employer"), "").await.unwrap();
        assert_eq!(hit.value, json!("Acme"));
        assert_eq!(hit.source, HitSource::Exact);

        store
            .write(&text("Phone Number"), "", json!("555"))
            .await
            .unwrap();
        let hit = store.read(&text("Mobile phone number"), "").await.unwrap();
        assert_eq!(hit.value, json!("555"));
        assert_eq!(hit.source, HitSource::Fuzzy);
        assert_eq!(hit.key, "phone");
    }

    #[tokio::test]
    async fn section_rows_are_isolated() {
        let (_, store) = store().await;
        let row = |index| {
            classified(
                FieldDescriptor::new(format!("#title-{index}"))
                    .with_label("Job Title")
                    .in_section(SectionType::Work, index, IndexSource::Synthetic),
                InstanceType::SectionCandidate,
                Scope::Section,
            )
        };
        store.write(&row(1), "", json!("Engineer")).await.unwrap();
        store.write(&row(2), "", json!("Manager")).await.unwrap();

        assert_eq!(store.read(&row(1), "").await.unwrap().value, json!("Engineer"));
        assert_eq!(store.read(&row(2), "").await.unwrap().value, json!("Manager"));
    }

    #[tokio::test]
    async fn unwritten_row_does_not_borrow_another_rows_value() {
        let (_, store) = store().await;
        let row = |index| {
            classified(
                FieldDescriptor::new(format!("#title-{index}"))
                    .with_label("Job Title")
                    .in_section(SectionType::Work, index, IndexSource::Synthetic),
                InstanceType::SectionCandidate,
                Scope::Section,
            )
        };
        store.write(&row(1), "", json!("Engineer")).await.unwrap();

        assert!(store.read(&row(2), "").await.is_none());
        assert!(store.read(&text("Job Title"), "").await.is_none());
        let hit = store.read(&row(1), "").await.unwrap();
        assert_eq!(hit.key, "SECTION:work_1:job_title");

        // Unscoped values stay visible to unscoped fields only.
        store
            .write(&text("Preferred Nickname"), "", json!("Ada"))
            .await
            .unwrap();
        assert!(store.read(&row(3), "Preferred Nickname").await.is_none());
        let hit = store.read(&text("Nickname"), "Preferred Nickname").await.unwrap();
        assert_eq!(hit.value, json!("Ada"));
    }

    #[tokio::test]
    async fn implausible_row_index_is_not_stored() {
        let (repo, store) = store().await;
        for index in [50, 3_000_000, u32::MAX] {
            let outcome = store.write(&school(index), "", json!("MIT")).await.unwrap();
            assert!(
                matches!(outcome, WriteOutcome::Rejected { .. }),
                "{index}: {outcome:?}"
            );
            assert!(store.read(&school(index), "").await.is_none());
        }
        assert!(repo.snapshot().await.section_repeater.is_empty());

        store.write(&school(49), "", json!("MIT")).await.unwrap();
        let snapshot = repo.snapshot().await;
        assert_eq!(snapshot.section_repeater["education"].value.as_array().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn repeater_rows_pad_and_never_fall_through() {
        let (repo, store) = store().await;
        store.write(&school(2), "", json!("MIT")).await.unwrap();
        store
            .write(&text("School Name"), "", json!("Global U"))
            .await
            .unwrap();

        let snapshot = repo.snapshot().await;
        let rows = snapshot.section_repeater["education"].value.as_array().unwrap().clone();
        assert_eq!(rows, vec![json!({}), json!({}), json!({"school_name": "MIT"})]);

        let hit = store.read(&school(2), "").await.unwrap();
        assert_eq!(hit.value, json!("MIT"));
        assert_eq!(hit.source, HitSource::SectionRow);

        // Row 0 exists but is empty; the scalar "school_name" must not leak in.
        assert!(store.read(&school(0), "").await.is_none());
        assert!(store.read(&school(7), "").await.is_none());
    }

    #[tokio::test]
    async fn intra_row_fuzzy_match() {
        let (_, store) = store().await;
        store.write(&school(0), "", json!("MIT")).await.unwrap();
        let renamed = classified(
            FieldDescriptor::new("#uni")
                .with_label("Name")
                .in_section(SectionType::Education, 0, IndexSource::Structural),
            InstanceType::SectionRepeater,
            Scope::Section,
        );
        let hit = store.read(&renamed, "").await.unwrap();
        assert_eq!(hit.value, json!("MIT"));
        assert_eq!(hit.source, HitSource::SectionRowFuzzy);
    }

    #[tokio::test]
    async fn multi_value_set_semantics() {
        let (_, store) = store().await;
        let field = skills();
        store
            .update_multi_selection(&field, "Skills", json!("Rust"), true)
            .await
            .unwrap();
        let set = store
            .update_multi_selection(&field, "Skills", json!("rust"), true)
            .await
            .unwrap();
        assert_eq!(set, vec![json!("Rust")]);

        store
            .update_multi_selection(&field, "Skills", json!(["Go", "SQL"]), true)
            .await
            .unwrap();
        let set = store
            .update_multi_selection(&field, "Skills", json!("Rust"), false)
            .await
            .unwrap();
        assert_eq!(set, vec![json!("Go"), json!("SQL")]);

        let outcome = store.write(&field, "Skills", json!(["Haskell"])).await.unwrap();
        assert!(matches!(outcome, WriteOutcome::Rejected { .. }));
        assert_eq!(
            store.read(&field, "Skills").await.unwrap().value,
            json!(["Go", "SQL"])
        );
    }

    #[tokio::test]
    async fn scalar_control_reads_set_by_position() {
        let (_, store) = store().await;
        store
            .update_multi_selection(&skills(), "Skills", json!(["Rust", "Go"]), true)
            .await
            .unwrap();

        let second = classified(
            FieldDescriptor::new("#skill-1")
                .with_label("Skills")
                .in_section(SectionType::Other("skills".into()), 1, IndexSource::Synthetic),
            InstanceType::AtomicSingle,
            Scope::Global,
        );
        let hit = store.read(&second, "").await.unwrap();
        assert_eq!(hit.value, json!("Go"));
        assert_eq!(hit.source, HitSource::CrossBucket);

        // Sets never read scalars.
        store.write(&text("Languages"), "", json!("English")).await.unwrap();
        let languages = classified(
            FieldDescriptor::new("#langs")
                .with_label("Languages")
                .with_control(ControlType::MultiSelect),
            InstanceType::AtomicMulti,
            Scope::Global,
        );
        assert!(store.read(&languages, "").await.is_none());
    }

    #[tokio::test]
    async fn variant_whole_word_fallback() {
        let (_, store) = store().await;
        store
            .write(&text("Favourite colour"), "", json!("teal"))
            .await
            .unwrap();
        let hit = store.read(&text("Colour"), "").await.unwrap();
        assert_eq!(hit.value, json!("teal"));
        assert_eq!(hit.source, HitSource::Variant);

        assert!(store.read(&text("Col"), "").await.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_idle_entries() {
        let (_, store) = store().await;
        store.write(&text("Email"), "", json!("a@b.c")).await.unwrap();

        let report = store.sweep_expired_at(unix_ms_now() + DAY_MS).await.unwrap();
        assert_eq!(report.removed, 0);

        let later = unix_ms_now() + 91 * DAY_MS;
        let report = store.sweep_expired_at(later).await.unwrap();
        assert_eq!(report.removed, 1);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.atomic_single, 0);
        assert_eq!(stats.metadata.last_cleanup_ms, later);
    }

    #[tokio::test]
    async fn stats_and_clear() {
        let (_, store) = store().await;
        store.write(&text("Email"), "", json!("a@b.c")).await.unwrap();
        store.write(&school(1), "", json!("MIT")).await.unwrap();
        store
            .update_multi_selection(&skills(), "", json!("Rust"), true)
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(
            (stats.atomic_single, stats.atomic_multi, stats.sections, stats.section_rows),
            (1, 1, 1, 2)
        );
        assert_eq!(stats.metadata.total_entries, 3);

        store.clear().await.unwrap();
        assert_eq!(store.stats().await.unwrap().metadata.total_entries, 0);
    }

    #[test]
    fn unclassified_fields_use_heuristics() {
        let multi = FieldDescriptor::new("#m").with_control(ControlType::MultiSelect);
        assert_eq!(bucket_for(&multi), Bucket::AtomicMulti);

        let row = FieldDescriptor::new("#r")
            .with_label("Company Name")
            .in_section(SectionType::Work, 0, IndexSource::Synthetic);
        assert_eq!(bucket_for(&row), Bucket::SectionRepeater);

        let plain = FieldDescriptor::new("#p").with_label("Company Name");
        assert_eq!(bucket_for(&plain), Bucket::AtomicSingle);
    }
}

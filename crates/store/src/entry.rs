use fieldmemo_protocol::{InstanceType, Scope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SNAPSHOT_VERSION: u32 = 1;

/// The three disjoint partitions of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bucket {
    /// Scalar per key, overwritten on each write.
    AtomicSingle,
    /// Deduplicated set per key.
    AtomicMulti,
    /// Section name -> array of row objects.
    SectionRepeater,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Self::AtomicSingle, Self::AtomicMulti, Self::SectionRepeater];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AtomicSingle => "ATOMIC_SINGLE",
            Self::AtomicMulti => "ATOMIC_MULTI",
            Self::SectionRepeater => "SECTION_REPEATER",
        }
    }

    /// Section candidates carry row-scoped keys and live with the scalars.
    pub const fn for_instance_type(instance_type: InstanceType) -> Self {
        match instance_type {
            InstanceType::AtomicSingle | InstanceType::SectionCandidate => Self::AtomicSingle,
            InstanceType::AtomicMulti => Self::AtomicMulti,
            InstanceType::SectionRepeater => Self::SectionRepeater,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    pub use_count: u32,
    pub confidence: f32,
    /// Labels this entry was written under; append-only, case-insensitively unique.
    #[serde(default)]
    pub variants: Vec<String>,
    pub last_used_ms: u64,
    pub entry_type: Bucket,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

impl CacheEntry {
    pub fn new(value: Value, entry_type: Bucket, scope: Option<Scope>, now_ms: u64) -> Self {
        Self {
            value,
            use_count: 0,
            confidence: 1.0,
            variants: Vec::new(),
            last_used_ms: now_ms,
            entry_type,
            scope,
        }
    }

    /// Returns `false` when an equal variant (ignoring case) is already recorded.
    pub fn add_variant(&mut self, variant: &str) -> bool {
        let variant = variant.trim();
        if variant.is_empty()
            || self
                .variants
                .iter()
                .any(|known| known.to_lowercase() == variant.to_lowercase())
        {
            return false;
        }
        self.variants.push(variant.to_string());
        true
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_used_ms = self.last_used_ms.max(now_ms);
    }

    pub(crate) fn record_write(&mut self, variant: &str, confidence: f32, now_ms: u64) {
        self.use_count = self.use_count.saturating_add(1);
        self.confidence = confidence.clamp(0.0, 1.0);
        self.add_variant(variant);
        self.touch(now_ms);
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_used_ms) > ttl_ms
    }

    /// Confidence of an exact-key hit: grows with use, capped at 0.95.
    #[must_use]
    pub fn exact_confidence(&self) -> f32 {
        (0.75 + self.use_count as f32 * 0.02).min(0.95)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub version: u32,
    #[serde(default)]
    pub last_cleanup_ms: u64,
    #[serde(default)]
    pub total_entries: usize,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            last_cleanup_ms: 0,
            total_entries: 0,
        }
    }
}

/// Whole cache state, as persisted by the file repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    #[serde(default)]
    pub metadata: CacheMetadata,
    #[serde(default)]
    pub atomic_single: BTreeMap<String, CacheEntry>,
    #[serde(default)]
    pub atomic_multi: BTreeMap<String, CacheEntry>,
    #[serde(default)]
    pub section_repeater: BTreeMap<String, CacheEntry>,
}

impl CacheSnapshot {
    pub fn bucket(&self, bucket: Bucket) -> &BTreeMap<String, CacheEntry> {
        match bucket {
            Bucket::AtomicSingle => &self.atomic_single,
            Bucket::AtomicMulti => &self.atomic_multi,
            Bucket::SectionRepeater => &self.section_repeater,
        }
    }

    pub fn bucket_mut(&mut self, bucket: Bucket) -> &mut BTreeMap<String, CacheEntry> {
        match bucket {
            Bucket::AtomicSingle => &mut self.atomic_single,
            Bucket::AtomicMulti => &mut self.atomic_multi,
            Bucket::SectionRepeater => &mut self.section_repeater,
        }
    }

    pub fn total_entries(&self) -> usize {
        Bucket::ALL.iter().map(|b| self.bucket(*b).len()).sum()
    }

    pub(crate) fn get(&self, bucket: Bucket, key: &str) -> Option<CacheEntry> {
        self.bucket(bucket).get(key).cloned()
    }

    pub(crate) fn set(&mut self, bucket: Bucket, key: &str, entry: CacheEntry) {
        self.bucket_mut(bucket).insert(key.to_string(), entry);
        self.metadata.total_entries = self.total_entries();
    }

    pub(crate) fn delete(&mut self, bucket: Bucket, key: &str) -> bool {
        let removed = self.bucket_mut(bucket).remove(key).is_some();
        self.metadata.total_entries = self.total_entries();
        removed
    }

    pub(crate) fn keys(&self, bucket: Bucket) -> Vec<String> {
        self.bucket(bucket).keys().cloned().collect()
    }

    pub(crate) fn entries(&self, bucket: Bucket) -> Vec<(String, CacheEntry)> {
        self.bucket(bucket)
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    pub(crate) fn sweep(&mut self, now_ms: u64, ttl_ms: u64) -> usize {
        let mut removed = 0;
        for bucket in Bucket::ALL {
            let map = self.bucket_mut(bucket);
            let before = map.len();
            map.retain(|_, entry| !entry.is_expired(now_ms, ttl_ms));
            removed += before - map.len();
        }
        self.metadata.last_cleanup_ms = now_ms;
        self.metadata.total_entries = self.total_entries();
        removed
    }

    pub(crate) fn metadata(&self) -> CacheMetadata {
        CacheMetadata {
            total_entries: self.total_entries(),
            ..self.metadata.clone()
        }
    }

    pub(crate) fn clear(&mut self) {
        for bucket in Bucket::ALL {
            self.bucket_mut(bucket).clear();
        }
        self.metadata.total_entries = 0;
    }
}

pub fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

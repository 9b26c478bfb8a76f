use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Replayed from the tiered cache.
    Cache,
    RuleEngine,
    /// Broader, lower-confidence cache lookup.
    Memory,
    SectionHandler,
    CompositeHandler,
    Inference,
}

impl ValueSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::RuleEngine => "rule_engine",
            Self::Memory => "memory",
            Self::SectionHandler => "section_handler",
            Self::CompositeHandler => "composite_handler",
            Self::Inference => "inference",
        }
    }

    /// Values that already live in the cache are never written back.
    #[must_use]
    pub const fn is_cached(self) -> bool {
        matches!(self, Self::Cache | Self::Memory)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedValue {
    pub value: serde_json::Value,
    pub confidence: f32,
    pub source: ValueSource,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_execution: bool,
}

impl ResolvedValue {
    pub fn new(value: serde_json::Value, confidence: f32, source: ValueSource) -> Self {
        Self {
            value,
            confidence,
            source,
            skip_execution: false,
        }
    }
}

/// Field selector -> resolved value.
pub type ResultsMap = HashMap<String, ResolvedValue>;

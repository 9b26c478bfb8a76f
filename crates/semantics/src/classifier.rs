use fieldmemo_protocol::{
    Classification, FieldDescriptor, IndexSource, InstanceType, Result, Scope,
};
use serde::{Deserialize, Serialize};

use crate::keys::derive_base_key;
use crate::lexicon::is_global_fact;
use crate::patterns::{
    ATOMIC_SET_RE, FLAT_SURVEY_RE, PROFILE_QUESTION_RE, REPEATER_CONTAINER_RE,
    SECTION_KEYWORD_RE,
};
use crate::registry::RepeaterRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum sectional score for Tier 2/3.
    pub sectional_score_threshold: i32,
    /// Structural signals (structural index, strong repeater) needed for Tier 1.
    pub structural_signal_threshold: u32,
    /// Indices at or above this are treated as mis-parsed DOM walks.
    pub max_plausible_index: u32,
    /// Observations of one base key in a pass that make it a proven repeater.
    pub repeater_duplicate_threshold: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sectional_score_threshold: 2,
            structural_signal_threshold: 2,
            max_plausible_index: 50,
            repeater_duplicate_threshold: 2,
        }
    }
}

/// Evidence that a field belongs to a repeating section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionalSignals {
    /// Keyword + structural index + plausible index + container − profile question, ≥ 0.
    pub score: i32,
    pub structural_signal_count: u32,
}

/// Decides whether a field is a global value, a global set, or a section row.
#[derive(Debug, Clone, Default)]
pub struct FieldClassifier {
    config: ClassifierConfig,
}

impl FieldClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Structural role of `field`, given how many times its base key was observed in the
    /// current pass. Tier 1 promotions are recorded in `registry`.
    pub fn classify_instance_type(
        &self,
        field: &FieldDescriptor,
        duplicate_count: usize,
        registry: &mut RepeaterRegistry,
    ) -> InstanceType {
        let atomic = if field.is_multi_valued() {
            InstanceType::AtomicMulti
        } else {
            InstanceType::AtomicSingle
        };
        let text = field.combined_text();

        if FLAT_SURVEY_RE.is_match(&text) {
            log::debug!("{}: flat survey guard -> {}", field.selector, atomic.as_str());
            return atomic;
        }

        if field.is_multi_valued() && ATOMIC_SET_RE.is_match(&text) {
            return InstanceType::AtomicMulti;
        }

        let base_key = field
            .base_key
            .clone()
            .unwrap_or_else(|| derive_base_key(field));
        if registry.contains(&base_key) {
            log::debug!("{}: '{base_key}' already proven repeating", field.selector);
            return InstanceType::SectionRepeater;
        }

        if !field.is_multi_valued() && field.field_index.is_none() {
            return atomic;
        }

        let signals = self.sectional_signals(field);
        if signals.structural_signal_count >= self.config.structural_signal_threshold {
            log::debug!(
                "{}: tier 1 promotion of '{base_key}' ({} structural signals)",
                field.selector,
                signals.structural_signal_count
            );
            registry.insert(base_key);
            return InstanceType::SectionRepeater;
        }

        if signals.score >= self.config.sectional_score_threshold {
            if duplicate_count >= self.config.repeater_duplicate_threshold {
                return InstanceType::SectionRepeater;
            }
            return InstanceType::SectionCandidate;
        }

        atomic
    }

    /// Sectional score and structural signal count for `field`.
    pub fn sectional_signals(&self, field: &FieldDescriptor) -> SectionalSignals {
        let text = field.combined_text();
        let mut score = 0;
        let mut structural_signal_count = 0;

        if SECTION_KEYWORD_RE.is_match(&text) {
            score += 1;
        }
        if field.index_source == IndexSource::Structural {
            score += 1;
            structural_signal_count += 1;
        }
        if field.is_strong_repeater {
            structural_signal_count += 1;
        }
        if field
            .field_index
            .is_some_and(|index| index > 0 && index < self.config.max_plausible_index)
        {
            score += 1;
        }
        if field.in_repeater_container || REPEATER_CONTAINER_RE.is_match(&field.parent_context) {
            score += 1;
        }
        if PROFILE_QUESTION_RE.is_match(&text) {
            score -= 1;
        }

        SectionalSignals {
            score: score.max(0),
            structural_signal_count,
        }
    }

    /// Data-sharing boundary for `field` once its instance type is known.
    pub fn classify_scope(&self, field: &FieldDescriptor, instance_type: InstanceType) -> Scope {
        if field.group_id.is_some() {
            return Scope::Group;
        }
        match instance_type {
            InstanceType::AtomicMulti => Scope::Global,
            InstanceType::SectionRepeater => Scope::Section,
            InstanceType::AtomicSingle | InstanceType::SectionCandidate => {
                let base_key = field
                    .base_key
                    .clone()
                    .unwrap_or_else(|| derive_base_key(field));
                if is_global_fact(&base_key) {
                    Scope::Global
                } else if instance_type == InstanceType::SectionCandidate
                    || field.field_index.is_some()
                {
                    Scope::Section
                } else {
                    Scope::Global
                }
            }
        }
    }

    /// Classifies `field` and freezes the result on it.
    pub fn classify(
        &self,
        field: &mut FieldDescriptor,
        duplicate_count: usize,
        registry: &mut RepeaterRegistry,
    ) -> Result<Classification> {
        let instance_type = self.classify_instance_type(field, duplicate_count, registry);
        let scope = self.classify_scope(field, instance_type);
        let classification = Classification {
            instance_type,
            scope,
        };
        field.assign_classification(classification)?;
        Ok(classification)
    }
}

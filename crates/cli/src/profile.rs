use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use fieldmemo_pipeline::{CompositeHandler, EngineConfig, RuleEngine};
use fieldmemo_protocol::key::base_part;
use fieldmemo_protocol::{FieldDescriptor, InstanceType, ResolvedValue, ResultsMap, ValueSource};
use fieldmemo_semantics::{
    get_canonical_key, snake_case, FuzzyKeyMatcher, MatchHint, SemanticKeyGenerator,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

const EXACT_CONFIDENCE: f32 = 0.95;

/// Answers fields from a flat profile document such as
/// `{"email": "ada@example.com", "First Name": "Ada", "skills": ["Rust"]}`.
///
/// Profile keys are canonicalized the same way cache keys are, so "First Name",
/// `first_name` and `given_name` all land on one entry.
pub struct ProfileRuleEngine {
    answers: BTreeMap<String, Value>,
    keys: SemanticKeyGenerator,
    matcher: FuzzyKeyMatcher,
}

impl ProfileRuleEngine {
    pub fn load(path: &Path, config: &EngineConfig) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        let document: Map<String, Value> = serde_json::from_str(&raw)
            .with_context(|| format!("Profile {} is not a JSON object", path.display()))?;
        Ok(Self::from_answers(document, config))
    }

    pub fn from_answers(document: Map<String, Value>, config: &EngineConfig) -> Self {
        let answers = document
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (get_canonical_key(&snake_case(&key)), value))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self {
            answers,
            keys: SemanticKeyGenerator::new(config.keys),
            matcher: FuzzyKeyMatcher::new(config.matcher),
        }
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    fn answer(&self, field: &FieldDescriptor) -> Option<ResolvedValue> {
        let generated = self.keys.generate_key(field, "");
        let key = get_canonical_key(base_part(&generated.key));
        if let Some(value) = self.answers.get(&key) {
            return Some(ResolvedValue::new(
                value.clone(),
                EXACT_CONFIDENCE,
                ValueSource::RuleEngine,
            ));
        }

        let hint = MatchHint {
            label: Some(field.display_label()).filter(|l| !l.is_empty()),
            ml_label: field.ml_prediction.as_ref().map(|p| p.label.as_str()),
        };
        let found = self
            .matcher
            .find_best_match(&key, self.answers.keys().map(String::as_str), &hint)?;
        let value = self.answers.get(&found.matched_key)?;
        log::debug!(
            "{}: profile '{}' matched '{key}' ({:.2})",
            field.selector,
            found.matched_key,
            found.similarity
        );
        Some(ResolvedValue::new(
            value.clone(),
            found.similarity.min(EXACT_CONFIDENCE),
            ValueSource::RuleEngine,
        ))
    }

    fn answer_all(&self, fields: &[FieldDescriptor], source: ValueSource) -> ResultsMap {
        fields
            .iter()
            .filter(|field| field.instance_type() != Some(InstanceType::SectionRepeater))
            .filter_map(|field| {
                self.answer(field).map(|mut value| {
                    value.source = source;
                    (field.selector.clone(), value)
                })
            })
            .collect()
    }
}

#[async_trait]
impl RuleEngine for ProfileRuleEngine {
    async fn resolve(&self, fields: &[FieldDescriptor]) -> fieldmemo_pipeline::Result<ResultsMap> {
        Ok(self.answer_all(fields, ValueSource::RuleEngine))
    }
}

#[async_trait]
impl CompositeHandler for ProfileRuleEngine {
    async fn resolve_sets(
        &self,
        fields: &[FieldDescriptor],
    ) -> fieldmemo_pipeline::Result<ResultsMap> {
        Ok(self.answer_all(fields, ValueSource::CompositeHandler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmemo_protocol::ControlType;
    use serde_json::json;

    fn profile() -> ProfileRuleEngine {
        let document = json!({
            "email": "ada@example.com",
            "First Name": "Ada",
            "skills": ["Rust", "Go"],
            "website": null
        });
        let Value::Object(map) = document else {
            unreachable!()
        };
        ProfileRuleEngine::from_answers(map, &EngineConfig::default())
    }

    #[test]
    fn keys_are_canonicalized_and_nulls_dropped() {
        let profile = profile();
        assert_eq!(profile.len(), 3);
        assert!(profile.answers.contains_key("first_name"));
    }

    #[tokio::test]
    async fn answers_by_semantic_key() {
        let profile = profile();
        let fields = vec![
            FieldDescriptor::new("#fname").with_label("First Name"),
            FieldDescriptor::new("#mail").with_label("Email"),
            FieldDescriptor::new("#pet").with_label("Favourite pet"),
        ];
        let results = RuleEngine::resolve(&profile, &fields).await.unwrap();
        assert_eq!(results["#fname"].value, json!("Ada"));
        assert_eq!(results["#mail"].value, json!("ada@example.com"));
        assert!(!results.contains_key("#pet"));
    }

    #[tokio::test]
    async fn sets_are_answered_as_composites() {
        let profile = profile();
        let fields = vec![FieldDescriptor::new("#skills")
            .with_label("Skills")
            .with_control(ControlType::Checkbox)];
        let results = profile.resolve_sets(&fields).await.unwrap();
        assert_eq!(results["#skills"].value, json!(["Rust", "Go"]));
        assert_eq!(results["#skills"].source, ValueSource::CompositeHandler);
    }
}

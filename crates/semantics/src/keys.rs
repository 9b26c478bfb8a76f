use fieldmemo_protocol::key::{is_scoped, scoped_key, split_scoped, SECTION_PREFIX, UNKNOWN_FIELD_KEY};
use fieldmemo_protocol::{DateRole, FieldDescriptor, InstanceType, Scope};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::lexicon::{is_global_fact, ALIAS_MAP};

/// `work[0].company`, `education-1-school`, `exp_2_title`: the row index embedded in a
/// repeating container's field name.
static CONTAINER_INDEX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(\d+)\]|[-_.](\d+)(?:[-_.]|$)")
        .unwrap_or_else(|err| panic!("invalid container index pattern: {err}"))
});

const DATE_PARTS: &[&str] = &["month", "year", "day"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// ML predictions strictly above this confidence are used verbatim.
    pub ml_confidence_threshold: f32,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            ml_confidence_threshold: 0.80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKey {
    pub key: String,
    /// The key came from a materialized identity or a confident ML prediction.
    pub is_high_confidence: bool,
    /// Tokenized key, scoped like `key`; retried when `key` misses.
    pub fallback_key: String,
}

/// Gives every field a stable identity that survives label drift and index churn.
#[derive(Debug, Clone, Default)]
pub struct SemanticKeyGenerator {
    config: KeyConfig,
}

impl SemanticKeyGenerator {
    pub fn new(config: KeyConfig) -> Self {
        Self { config }
    }

    /// Generates the key for `field`. `label` overrides the field's own label when
    /// non-empty.
    ///
    /// Resolution order: materialized `cache_label` (verbatim), confident ML label,
    /// tokenized fallback. ML and tokenized keys are then namespaced per
    /// [`Self::namespace`].
    pub fn generate_key(&self, field: &FieldDescriptor, label: &str) -> GeneratedKey {
        let fallback_key = self.namespace(field, tokenized_key(field, label));

        if let Some(cache_label) = field
            .cache_label
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return GeneratedKey {
                key: cache_label.to_string(),
                is_high_confidence: true,
                fallback_key,
            };
        }

        if let Some(prediction) = field
            .ml_prediction
            .as_ref()
            .filter(|p| p.confidence > self.config.ml_confidence_threshold)
        {
            return GeneratedKey {
                key: self.namespace(field, prediction.label.clone()),
                is_high_confidence: true,
                fallback_key,
            };
        }

        GeneratedKey {
            key: fallback_key.clone(),
            is_high_confidence: false,
            fallback_key,
        }
    }

    /// Wraps `base` as `SECTION:<section>_<index>:<base>` when the field is section
    /// scoped, single-valued, and `base` is not a person-level fact.
    pub fn namespace(&self, field: &FieldDescriptor, base: String) -> String {
        let wraps = matches!(field.scope(), Some(Scope::Section))
            && matches!(
                field.instance_type(),
                Some(InstanceType::AtomicSingle | InstanceType::SectionCandidate)
            )
            && !is_scoped(&base)
            && !is_global_fact(&base.to_lowercase());
        if !wraps {
            return base;
        }
        let section = field.section_type.as_ref().map_or("section", |s| s.as_str());
        scoped_key(section, field.field_index.unwrap_or(0), &base)
    }
}

/// Maps an alias to its primary form (`company_name` -> `employer_name`). Scoped keys keep
/// their scope and canonicalize the base part only.
#[must_use]
pub fn get_canonical_key(key: &str) -> String {
    if let Some((context, base)) = split_scoped(key) {
        return format!("{SECTION_PREFIX}{context}:{}", canonical_base(base));
    }
    canonical_base(key)
}

fn canonical_base(base: &str) -> String {
    ALIAS_MAP
        .get(base)
        .map_or_else(|| base.to_string(), |primary| (*primary).to_string())
}

/// Section-independent identity used to count duplicates within a pass and to key the
/// repeater registry: canonical snake_case of label, name, context or id, digits dropped.
#[must_use]
pub fn derive_base_key(field: &FieldDescriptor) -> String {
    let text = [
        &field.label,
        &field.name,
        &field.parent_context,
        &field.dom_id,
    ]
    .into_iter()
    .map(|s| s.trim())
    .find(|s| !s.is_empty())
    .unwrap_or("");
    let key = snake_case(&strip_digits(text));
    if key.is_empty() {
        return UNKNOWN_FIELD_KEY.to_string();
    }
    get_canonical_key(&key)
}

/// Tokenized identity of `field`. A non-empty `label` overrides `field.label`; the
/// primary text is then that label, else the cleaned name, else the parent context.
fn tokenized_key(field: &FieldDescriptor, label: &str) -> String {
    let label = if label.trim().is_empty() {
        field.label.as_str()
    } else {
        label
    };
    let sectional = matches!(field.scope(), Some(Scope::Section))
        || field.instance_type().is_some_and(InstanceType::is_sectional);

    let cleaned_name = clean_name(&field.name, sectional);
    let primary = if !label.trim().is_empty() {
        snake_case(&strip_digits(label))
    } else if !cleaned_name.is_empty() {
        cleaned_name
    } else {
        snake_case(&strip_digits(&field.parent_context))
    };
    if primary.is_empty() {
        return UNKNOWN_FIELD_KEY.to_string();
    }

    let mut tokens: Vec<String> = primary.split('_').map(str::to_string).collect();

    // `birth_date` rendered as three selects must not collapse into one key.
    let id_tokens = snake_case(&format!("{} {}", field.name, field.dom_id));
    if let Some(part) = DATE_PARTS
        .iter()
        .find(|part| id_tokens.split('_').any(|t| t == **part))
    {
        if !tokens.iter().any(|t| t == part) {
            tokens.push((*part).to_string());
        }
    }

    match field.date_role {
        Some(role @ (DateRole::Start | DateRole::End)) => {
            let has_bound = tokens
                .iter()
                .any(|t| matches!(t.as_str(), "start" | "end" | "from" | "to"));
            let is_date = tokens
                .iter()
                .any(|t| matches!(t.as_str(), "date" | "month" | "year"));
            if is_date && !has_bound {
                let bound = if role == DateRole::Start { "start" } else { "end" };
                tokens.insert(0, bound.to_string());
            }
        }
        Some(DateRole::Unknown) | None => {}
    }

    tokens.join("_")
}

/// Strips digit runs from a field name. Sectional names keep the repeating-container
/// index (`work[1].title` -> `work_1_title`) so rows stay distinguishable.
fn clean_name(name: &str, sectional: bool) -> String {
    if !sectional {
        return snake_case(&strip_digits(name));
    }
    let mut out = String::with_capacity(name.len() + 4);
    let mut last = 0;
    for caps in CONTAINER_INDEX_RE.captures_iter(name) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let Some(index) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        out.push_str(&strip_digits(&name[last..whole.start()]));
        out.push('_');
        out.push_str(index.as_str());
        out.push('_');
        last = whole.end();
    }
    out.push_str(&strip_digits(&name[last..]));
    snake_case(&out)
}

fn strip_digits(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_digit()).collect()
}

/// `Company Name`, `companyName`, `company-name` -> `company_name`. Adjacent duplicate
/// tokens are dropped.
#[must_use]
pub fn snake_case(text: &str) -> String {
    let mut spaced = String::with_capacity(text.len() + 8);
    let mut prev_lower = false;
    for ch in text.chars() {
        if ch.is_uppercase() && prev_lower {
            spaced.push('_');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        spaced.extend(ch.to_lowercase());
    }

    let mut tokens: Vec<&str> = Vec::new();
    for token in spaced.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() || tokens.last() == Some(&token) {
            continue;
        }
        tokens.push(token);
    }
    tokens.join("_")
}

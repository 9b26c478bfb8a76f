use fieldmemo_protocol::key::{split_scoped, SECTION_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::keys::{get_canonical_key, snake_case};
use crate::lexicon::{normalize_token, token_weight};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Default acceptance threshold for weighted Jaccard candidates.
    pub threshold: f32,
    /// A hinted candidate within this fraction of the top score wins the tie-break.
    pub hint_tie_margin: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            hint_tie_margin: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Exact,
    ExactLabel,
    Alias,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyMatch {
    pub matched_key: String,
    pub similarity: f32,
    pub source: MatchSource,
}

/// Optional context that sharpens a lookup.
#[derive(Debug, Clone, Default)]
pub struct MatchHint<'a> {
    /// Visible label of the field; matched strictly after sanitizing.
    pub label: Option<&'a str>,
    /// ML-predicted key; preferred among near-tied fuzzy candidates.
    pub ml_label: Option<&'a str>,
}

/// Finds the cache key that best identifies a candidate key.
#[derive(Debug, Clone, Default)]
pub struct FuzzyKeyMatcher {
    config: MatcherConfig,
}

impl FuzzyKeyMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// [`Self::find_best_match_with`] at the configured threshold.
    pub fn find_best_match<'k, I>(&self, candidate: &str, keys: I, hint: &MatchHint<'_>) -> Option<KeyMatch>
    where
        I: IntoIterator<Item = &'k str>,
    {
        self.find_best_match_with(candidate, keys, self.config.threshold, hint)
    }

    /// Matches `candidate` against `keys`, in order: exact key, sanitized label, alias
    /// registry, weighted Jaccard at `threshold`.
    ///
    /// Scoped candidates only ever match keys carrying the same `SECTION:<ctx>` prefix,
    /// compared on their base parts; unscoped candidates only match unscoped keys.
    pub fn find_best_match_with<'k, I>(
        &self,
        candidate: &str,
        keys: I,
        threshold: f32,
        hint: &MatchHint<'_>,
    ) -> Option<KeyMatch>
    where
        I: IntoIterator<Item = &'k str>,
    {
        let candidate_scope = split_scoped(candidate).map(|(ctx, _)| ctx);
        let candidate_base = split_scoped(candidate).map_or(candidate, |(_, base)| base);

        // (full key, comparable base)
        let mut pool: Vec<(&str, &str)> = Vec::new();
        for key in keys {
            if key == candidate {
                return Some(KeyMatch {
                    matched_key: key.to_string(),
                    similarity: 1.0,
                    source: MatchSource::Exact,
                });
            }
            let comparable = match (candidate_scope, split_scoped(key)) {
                (Some(ctx), Some((key_ctx, base))) if ctx == key_ctx => base,
                (None, None) if !key.starts_with(SECTION_PREFIX) => key,
                _ => continue,
            };
            pool.push((key, comparable));
        }
        if pool.is_empty() {
            return None;
        }

        if let Some(label) = hint.label.map(snake_case).filter(|l| !l.is_empty()) {
            if let Some((key, _)) = pool.iter().find(|(_, base)| *base == label) {
                return Some(KeyMatch {
                    matched_key: (*key).to_string(),
                    similarity: 0.99,
                    source: MatchSource::ExactLabel,
                });
            }
        }

        let canonical_candidate = get_canonical_key(candidate_base);
        if let Some((key, _)) = pool
            .iter()
            .find(|(_, base)| get_canonical_key(base) == canonical_candidate)
        {
            return Some(KeyMatch {
                matched_key: (*key).to_string(),
                similarity: 0.95,
                source: MatchSource::Alias,
            });
        }

        let candidate_tokens = weighted_tokens(candidate_base);
        let mut scored: Vec<(&str, f32)> = pool
            .iter()
            .map(|(key, base)| (*key, weighted_jaccard(&candidate_tokens, &weighted_tokens(base))))
            .filter(|(_, similarity)| *similarity >= threshold)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let (top_key, top_score) = *scored.first()?;
        let chosen = hint
            .ml_label
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .and_then(|ml_label| {
                scored.iter().find(|(key, score)| {
                    key.contains(ml_label) && *score >= top_score * (1.0 - self.config.hint_tie_margin)
                })
            })
            .copied()
            .unwrap_or((top_key, top_score));

        log::trace!(
            "fuzzy match '{candidate}' -> '{}' ({:.3})",
            chosen.0,
            chosen.1
        );
        Some(KeyMatch {
            matched_key: chosen.0.to_string(),
            similarity: chosen.1,
            source: MatchSource::Fuzzy,
        })
    }

    /// Weighted Jaccard similarity between two keys.
    #[must_use]
    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        weighted_jaccard(&weighted_tokens(a), &weighted_tokens(b))
    }
}

fn weighted_tokens(key: &str) -> HashSet<String> {
    key.split('_')
        .filter(|t| !t.is_empty())
        .map(|t| normalize_token(&t.to_lowercase()))
        .collect()
}

fn weighted_jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union: f32 = a.union(b).map(|t| token_weight(t)).sum();
    if union <= 0.0 {
        return 0.0;
    }
    let intersection: f32 = a.intersection(b).map(|t| token_weight(t)).sum();
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> FuzzyKeyMatcher {
        FuzzyKeyMatcher::default()
    }

    #[test]
    fn exact_match_wins() {
        let found = matcher()
            .find_best_match("email", ["phone", "email"], &MatchHint::default())
            .unwrap();
        assert_eq!(found.source, MatchSource::Exact);
        assert_eq!(found.similarity, 1.0);
    }

    #[test]
    fn alias_equivalence_either_direction() {
        let found = matcher()
            .find_best_match("company_name", ["employer_name"], &MatchHint::default())
            .unwrap();
        assert_eq!(found.matched_key, "employer_name");
        assert!(found.similarity >= 0.95);
        assert_eq!(found.source, MatchSource::Alias);

        let reverse = matcher()
            .find_best_match("employer_name", ["company"], &MatchHint::default())
            .unwrap();
        assert_eq!(reverse.matched_key, "company");
    }

    #[test]
    fn sanitized_label_match() {
        let hint = MatchHint {
            label: Some("Desired Start-Date"),
            ml_label: None,
        };
        let found = matcher()
            .find_best_match("unknown_field", ["desired_start_date"], &hint)
            .unwrap();
        assert_eq!(found.source, MatchSource::ExactLabel);
        assert_eq!(found.similarity, 0.99);
    }

    #[test]
    fn synonyms_and_stems_drive_jaccard() {
        let sim = matcher().similarity("postal_code_number", "zip_code");
        assert!(sim > 0.75, "similarity was {sim}");
        let unrelated = matcher().similarity("zip_code", "phone_number");
        assert!(unrelated < 0.3, "similarity was {unrelated}");
    }

    #[test]
    fn filler_tokens_barely_count() {
        let sim = matcher().similarity("please_enter_your_phone", "phone");
        assert!(sim > 0.8, "similarity was {sim}");
    }

    #[test]
    fn below_threshold_is_none() {
        assert!(matcher()
            .find_best_match("favourite_colour", ["zip_code", "employer_name"], &MatchHint::default())
            .is_none());
    }

    #[test]
    fn scoped_candidates_stay_in_their_row() {
        let keys = ["SECTION:work_0:job_title", "SECTION:work_1:job_title", "job_title"];
        let found = matcher()
            .find_best_match("SECTION:work_1:position_title", keys, &MatchHint::default())
            .unwrap();
        assert_eq!(found.matched_key, "SECTION:work_1:job_title");

        let unscoped = matcher()
            .find_best_match("position_title", ["SECTION:work_1:job_title"], &MatchHint::default());
        assert!(unscoped.is_none());
    }

    #[test]
    fn ml_hint_breaks_near_ties() {
        let hint = MatchHint {
            label: None,
            ml_label: Some("work"),
        };
        let keys = ["work_phone_number", "home_phone_number"];
        let found = matcher()
            .find_best_match_with("phone_number", keys, 0.5, &hint)
            .unwrap();
        assert_eq!(found.matched_key, "work_phone_number");
    }
}

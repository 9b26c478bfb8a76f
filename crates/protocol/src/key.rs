//! Shapes of a semantic key.
//!
//! Unscoped keys are plain snake_case identities (`employer_name`). Section-scoped keys
//! carry the section and row they belong to: `SECTION:work_1:job_title`.

pub const SECTION_PREFIX: &str = "SECTION:";

/// Sentinel used when a field has no usable label, name, or context.
pub const UNKNOWN_FIELD_KEY: &str = "unknown_field";

#[must_use]
pub fn scoped_key(section: &str, index: u32, base: &str) -> String {
    format!("{SECTION_PREFIX}{section}_{index}:{base}")
}

#[must_use]
pub fn is_scoped(key: &str) -> bool {
    key.starts_with(SECTION_PREFIX)
}

/// Splits a scoped key into `(scope_context, base)`, e.g. `("work_1", "job_title")`.
#[must_use]
pub fn split_scoped(key: &str) -> Option<(&str, &str)> {
    key.strip_prefix(SECTION_PREFIX)?.split_once(':')
}

/// Base part of a key: the key itself when unscoped.
#[must_use]
pub fn base_part(key: &str) -> &str {
    split_scoped(key).map_or(key, |(_, base)| base)
}

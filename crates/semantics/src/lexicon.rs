//! Vocabulary tables for key canonicalization and fuzzy matching.
//!
//! - **Aliases**: exact known key equivalences, first entry is the primary form.
//! - **Global facts**: person-level truths that stay unscoped even inside a section.
//! - **Stems / synonyms / weights**: token-level normalization for weighted Jaccard.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Alias groups: `(primary, aliases)`.
pub static ALIAS_GROUPS: &[(&str, &[&str])] = &[
    (
        "employer_name",
        &[
            "company_name",
            "company",
            "employer",
            "organization_name",
            "organisation_name",
            "current_company",
            "current_employer",
            "name_of_employer",
        ],
    ),
    (
        "job_title",
        &["position_title", "title", "position", "job_role", "role", "current_title"],
    ),
    (
        "school_name",
        &[
            "school",
            "university",
            "university_name",
            "institution",
            "institution_name",
            "college_name",
        ],
    ),
    ("degree", &["degree_type", "qualification"]),
    ("field_of_study", &["major", "area_of_study", "discipline"]),
    ("first_name", &["given_name", "fname", "forename"]),
    ("last_name", &["family_name", "surname", "lname"]),
    ("email", &["email_address", "e_mail", "mail"]),
    (
        "phone",
        &["phone_number", "mobile", "mobile_number", "telephone", "cell_phone"],
    ),
    ("zip_code", &["zip", "postal_code", "postcode"]),
    ("linkedin_url", &["linkedin", "linkedin_profile"]),
    ("start_date", &["from_date", "date_from", "employment_start"]),
    ("end_date", &["to_date", "date_to", "employment_end"]),
    ("graduation_year", &["grad_year", "year_of_graduation"]),
    ("notice_period", &["notice"]),
    (
        "years_of_experience",
        &["total_experience", "experience_years", "years_experience"],
    ),
    ("salary_expectation", &["expected_salary", "desired_salary"]),
];

/// alias -> primary, primaries map to themselves.
pub static ALIAS_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(128);
    for (primary, aliases) in ALIAS_GROUPS {
        map.insert(*primary, *primary);
        for alias in *aliases {
            map.insert(*alias, *primary);
        }
    }
    map
});

/// Base keys that are person-level truths.
pub const GLOBAL_FACTS: &[&str] = &[
    r"notice_period",
    r"visa\w*",
    r"sponsor\w*",
    r"work_authori[sz]ation",
    r"authori[sz]ed_to_work",
    r"gender",
    r"race",
    r"ethnicity",
    r"veteran\w*",
    r"disability",
    r"years_of_experience",
    r"total_experience",
    r"experience_years",
    r"education_level",
    r"level_of_education",
    r"highest_(?:education|degree|qualification)",
];

static GLOBAL_FACT_RE: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(r"(?:^|_)(?:{})(?:_|$)", GLOBAL_FACTS.join("|"));
    Regex::new(&pattern).unwrap_or_else(|err| panic!("invalid global fact table: {err}"))
});

#[must_use]
pub fn is_global_fact(base_key: &str) -> bool {
    GLOBAL_FACT_RE.is_match(base_key)
}

/// Irregular stems. Regular plurals are handled by [`stem`].
pub static STEM_MAP: &[(&str, &str)] = &[
    ("employment", "employ"),
    ("employed", "employ"),
    ("employing", "employ"),
    ("graduation", "graduate"),
    ("graduated", "graduate"),
    ("graduating", "graduate"),
    ("universities", "university"),
    ("companies", "company"),
    ("studies", "study"),
    ("studying", "study"),
    ("educational", "education"),
    ("organisation", "organization"),
    ("organisations", "organization"),
    ("authorisation", "authorization"),
    ("authorized", "authorization"),
    ("authorised", "authorization"),
    ("sponsor", "sponsorship"),
    ("sponsored", "sponsorship"),
    ("relocation", "relocate"),
    ("relocating", "relocate"),
    ("certificate", "certification"),
    ("certifications", "certification"),
    ("responsibilities", "responsibility"),
    ("expected", "expect"),
    ("expectation", "expect"),
    ("expectations", "expect"),
    ("addresses", "address"),
];

static STEM_LOOKUP: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| STEM_MAP.iter().copied().collect());

/// Reduces a lower-case token to its stem.
#[must_use]
pub fn stem(token: &str) -> String {
    if let Some(stemmed) = STEM_LOOKUP.get(token) {
        return (*stemmed).to_string();
    }
    let regular_plural = token.len() > 4
        && token.ends_with('s')
        && !token.ends_with("ss")
        && !token.ends_with("us")
        && !token.ends_with("is");
    if regular_plural {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

/// Synonym groups, first entry is the group head every member maps to.
pub static SYNONYM_GROUPS: &[&[&str]] = &[
    &["employer", "company", "organization", "firm", "business"],
    &["title", "position", "role", "designation"],
    &["school", "university", "college", "institution", "academy"],
    &["degree", "qualification", "diploma"],
    &["study", "major", "discipline", "specialization"],
    &["zip", "postal", "postcode"],
    &["phone", "mobile", "telephone", "cell", "tel"],
    &["email", "mail"],
    &["last", "family", "surname"],
    &["first", "given", "forename"],
    &["start", "from", "begin", "commence"],
    &["end", "until", "finish"],
    &["city", "town"],
    &["country", "nation"],
    &["state", "province", "region"],
    &["salary", "compensation", "pay", "wage"],
    &["skill", "competency", "expertise"],
    &["summary", "description", "about", "bio"],
    &["gpa", "grade"],
    &["current", "present"],
    &["url", "link", "website"],
];

/// member -> group head.
pub static SYNONYM_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(128);
    for group in SYNONYM_GROUPS {
        let head = group[0];
        for &member in *group {
            map.insert(member, head);
        }
    }
    map
});

/// Per-token weights keyed by group head. Unlisted tokens weigh 1.0.
pub static TOKEN_WEIGHTS: &[(&str, f32)] = &[
    // Core nouns dominate the similarity.
    ("zip", 3.0),
    ("phone", 3.0),
    ("email", 3.0),
    ("employer", 3.0),
    ("degree", 3.0),
    ("school", 3.0),
    ("salary", 3.0),
    ("title", 3.0),
    ("city", 3.0),
    ("country", 3.0),
    ("state", 3.0),
    ("address", 3.0),
    ("linkedin", 3.0),
    ("gpa", 3.0),
    ("visa", 3.0),
    ("gender", 3.0),
    ("study", 3.0),
    ("skill", 3.0),
    ("first", 1.5),
    ("last", 1.5),
    ("start", 1.5),
    ("end", 1.5),
    ("date", 1.5),
    ("month", 1.5),
    ("year", 1.5),
    ("graduate", 1.5),
    // Generic filler barely counts.
    ("name", 0.5),
    ("number", 0.5),
    ("type", 0.5),
    ("details", 0.5),
    ("info", 0.5),
    ("other", 0.5),
    ("your", 0.2),
    ("you", 0.2),
    ("the", 0.2),
    ("a", 0.2),
    ("an", 0.2),
    ("of", 0.2),
    ("please", 0.2),
    ("enter", 0.2),
    ("select", 0.2),
    ("what", 0.2),
    ("is", 0.2),
    ("are", 0.2),
    ("do", 0.2),
    ("field", 0.2),
    ("input", 0.2),
];

static WEIGHT_LOOKUP: Lazy<HashMap<&'static str, f32>> =
    Lazy::new(|| TOKEN_WEIGHTS.iter().copied().collect());

#[must_use]
pub fn token_weight(token: &str) -> f32 {
    WEIGHT_LOOKUP.get(token).copied().unwrap_or(1.0)
}

/// Stem, then fold into the synonym group head.
#[must_use]
pub fn normalize_token(token: &str) -> String {
    let stemmed = stem(token);
    SYNONYM_MAP
        .get(stemmed.as_str())
        .map_or(stemmed, |head| (*head).to_string())
}

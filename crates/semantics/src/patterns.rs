//! Pattern tables driving structural classification and section inference.
//!
//! Each table is a list of regex fragments; [`word_regex`] joins a table into one
//! case-insensitive alternation anchored on word boundaries. Tables are plain data so they
//! can be tested and tuned without touching control flow.

use once_cell::sync::Lazy;
use regex::Regex;

/// Questions that are answered once per person no matter where they appear. They often
/// contain employment words ("how did you hear about this job") but are never sectional.
pub const FLAT_SURVEY: &[&str] = &[
    r"how did you (?:hear|find|learn) about",
    r"hear about (?:us|this)",
    r"referr(?:al|ed)",
    r"source of (?:application|referral)",
    r"consent",
    r"i agree",
    r"acknowledge\w*",
    r"privacy (?:policy|notice)",
    r"terms (?:and|&) conditions",
    r"availab(?:le|ility)",
    r"earliest start",
    r"willing to (?:relocate|travel)",
    r"relocat\w*",
    r"why (?:do you want|are you interested)",
    r"motivat\w*",
    r"interest(?:ed)? in (?:this|the) (?:role|position|job)",
    r"desired salary",
    r"salary expectations?",
    r"expected (?:salary|compensation)",
    r"notice period",
];

/// Set-like nouns: a multi-valued control about one of these is a global set.
pub const ATOMIC_SET_NOUNS: &[&str] = &[
    r"skills?",
    r"technolog(?:y|ies)",
    r"tools?",
    r"languages?",
    r"interests?",
    r"frameworks?",
    r"certifications?",
    r"hobbies",
];

/// Compound phrases that belong to a repeating work/education block. Kept compound so a
/// loose "title" or "company" in an unrelated question does not score.
pub const SECTION_KEYWORDS: &[&str] = &[
    r"job title",
    r"position title",
    r"company name",
    r"employer name",
    r"name of (?:employer|company)",
    r"dates? of employment",
    r"employment (?:dates?|history)",
    r"(?:start|end) (?:date|month|year)",
    r"(?:from|to) date",
    r"currently (?:work|working|employed) here",
    r"job description",
    r"key responsibilities",
    r"school name",
    r"university name",
    r"institution name",
    r"field of study",
    r"area of study",
    r"degree type",
    r"graduation (?:year|date)",
];

/// Profile/legal questions; these pull the sectional score down.
pub const PROFILE_QUESTIONS: &[&str] = &[
    r"visa",
    r"sponsor\w*",
    r"work authori[sz]ation",
    r"authori[sz]ed to work",
    r"legally (?:eligible|authori[sz]ed)",
    r"citizenship",
    r"security clearance",
];

/// Container headings that mark a repeating block.
pub const REPEATER_CONTAINERS: &[&str] = &[
    r"work experience",
    r"employment history",
    r"education history",
    r"(?:experience|education|employment|position) (?:entry )?#?\d+",
    r"add (?:another|more)",
];

pub const WORK_CONTEXT: &[&str] = &[
    r"work",
    r"employ\w*",
    r"experience",
    r"jobs?",
    r"company",
    r"employer",
    r"position",
    r"occupation",
];

pub const EDUCATION_CONTEXT: &[&str] = &[
    r"education\w*",
    r"school",
    r"universit(?:y|ies)",
    r"college",
    r"degree",
    r"academic",
    r"graduat\w*",
    r"institution",
    r"major",
    r"gpa",
];

pub const DATE_CONTEXT: &[&str] = &[r"dates?", r"months?", r"years?", r"from", r"to", r"start", r"end"];

/// Compiles a fragment table into one word-bounded, case-insensitive regex.
pub fn word_regex(fragments: &[&str]) -> Regex {
    let pattern = format!(r"(?i)\b(?:{})\b", fragments.join("|"));
    Regex::new(&pattern).unwrap_or_else(|err| panic!("invalid pattern table {pattern}: {err}"))
}

pub static FLAT_SURVEY_RE: Lazy<Regex> = Lazy::new(|| word_regex(FLAT_SURVEY));
pub static ATOMIC_SET_RE: Lazy<Regex> = Lazy::new(|| word_regex(ATOMIC_SET_NOUNS));
pub static SECTION_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| word_regex(SECTION_KEYWORDS));
pub static PROFILE_QUESTION_RE: Lazy<Regex> = Lazy::new(|| word_regex(PROFILE_QUESTIONS));
pub static REPEATER_CONTAINER_RE: Lazy<Regex> = Lazy::new(|| word_regex(REPEATER_CONTAINERS));
pub static WORK_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| word_regex(WORK_CONTEXT));
pub static EDUCATION_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| word_regex(EDUCATION_CONTEXT));
pub static DATE_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| word_regex(DATE_CONTEXT));

/// Parent section a context string most likely belongs to (`work_experience` /
/// `education`). Pure date context ("Start date", "From / To") defaults to work
/// experience; anything else yields `None`.
pub fn infer_section_name(context: &str) -> Option<&'static str> {
    let context = context.replace('_', " ");
    if EDUCATION_CONTEXT_RE.is_match(&context) {
        return Some("education");
    }
    if WORK_CONTEXT_RE.is_match(&context) || DATE_CONTEXT_RE.is_match(&context) {
        return Some("work_experience");
    }
    None
}

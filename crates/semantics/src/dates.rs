use fieldmemo_protocol::{ControlType, DateRole, FieldDescriptor};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static DATE_LIKE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:dates?|months?|years?)\b")
        .unwrap_or_else(|err| panic!("invalid date pattern: {err}"))
});
static START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:start|from|began|begin)\b")
        .unwrap_or_else(|err| panic!("invalid start pattern: {err}"))
});
static END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:end|to|until|finish(?:ed)?)\b")
        .unwrap_or_else(|err| panic!("invalid end pattern: {err}"))
});

/// Assigns start/end roles to the unlabeled date fields of each section row.
///
/// Dates come in pairs: the first unlabeled date of a row is the start, the second the
/// end. A third is ambiguous and marked [`DateRole::Unknown`] instead of guessed.
#[derive(Debug, Default)]
pub struct DateRoleSequencer {
    unlabeled_per_row: HashMap<(String, u32), usize>,
}

impl DateRoleSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Role of `field`, or `None` when it is not a sectional date.
    pub fn assign(&mut self, field: &FieldDescriptor) -> Option<DateRole> {
        let section = field.section_type.as_ref()?;
        let index = field.field_index?;
        let text = format!("{} {}", field.label, field.name.replace(['_', '-'], " "));
        if field.control_type != ControlType::Date && !DATE_LIKE_RE.is_match(&text) {
            return None;
        }
        if START_RE.is_match(&text) {
            return Some(DateRole::Start);
        }
        if END_RE.is_match(&text) {
            return Some(DateRole::End);
        }

        let seen = self
            .unlabeled_per_row
            .entry((section.as_str().to_string(), index))
            .or_insert(0);
        *seen += 1;
        let role = match *seen {
            1 => DateRole::Start,
            2 => DateRole::End,
            _ => DateRole::Unknown,
        };
        if role == DateRole::Unknown {
            log::debug!(
                "{}: date #{} in {} row {index} is ambiguous",
                field.selector,
                *seen,
                section.as_str()
            );
        }
        Some(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmemo_protocol::{IndexSource, SectionType};

    fn date(selector: &str, label: &str, index: u32) -> FieldDescriptor {
        FieldDescriptor::new(selector)
            .with_label(label)
            .with_control(ControlType::Date)
            .in_section(SectionType::Work, index, IndexSource::Synthetic)
    }

    #[test]
    fn third_unlabeled_date_is_unknown() {
        let mut sequencer = DateRoleSequencer::new();
        assert_eq!(sequencer.assign(&date("#a", "Date", 0)), Some(DateRole::Start));
        assert_eq!(sequencer.assign(&date("#b", "Date", 0)), Some(DateRole::End));
        assert_eq!(sequencer.assign(&date("#c", "Date", 0)), Some(DateRole::Unknown));
        // Rows are counted independently.
        assert_eq!(sequencer.assign(&date("#d", "Date", 1)), Some(DateRole::Start));
    }

    #[test]
    fn explicit_bounds_win() {
        let mut sequencer = DateRoleSequencer::new();
        assert_eq!(sequencer.assign(&date("#e", "End date", 0)), Some(DateRole::End));
        assert_eq!(sequencer.assign(&date("#s", "Start date", 0)), Some(DateRole::Start));
    }

    #[test]
    fn non_sectional_or_non_date_is_ignored() {
        let mut sequencer = DateRoleSequencer::new();
        let flat = FieldDescriptor::new("#dob").with_label("Date of birth");
        assert_eq!(sequencer.assign(&flat), None);
        let text = FieldDescriptor::new("#t")
            .with_label("Job Title")
            .in_section(SectionType::Work, 0, IndexSource::Synthetic);
        assert_eq!(sequencer.assign(&text), None);
    }
}

use fieldmemo_protocol::{FieldDescriptor, SectionType};
use fieldmemo_semantics::patterns::infer_section_name;
use fieldmemo_semantics::snake_case;

pub const WORK_EXPERIENCE: &str = "work_experience";
pub const EDUCATION: &str = "education";
pub const OTHER_SECTION: &str = "other";

/// Name of the repeater bucket entry a sectional field belongs to.
///
/// Explicit section type first, then the parent context, then the field's own text.
/// Date-only context ("Start date", "From") lands in `work_experience`.
pub fn resolve_section_name(field: &FieldDescriptor) -> String {
    match &field.section_type {
        Some(SectionType::Work) => return WORK_EXPERIENCE.to_string(),
        Some(SectionType::Education) => return EDUCATION.to_string(),
        Some(SectionType::Other(name)) => {
            if let Some(inferred) = infer_section_name(name) {
                return inferred.to_string();
            }
            let name = snake_case(name);
            if !name.is_empty() {
                return name;
            }
        }
        None => {}
    }
    infer_section_name(&field.parent_context)
        .or_else(|| infer_section_name(&field.combined_text()))
        .unwrap_or(OTHER_SECTION)
        .to_string()
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ClassificationError, Result};

/// Structural role of a field within the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceType {
    /// One global scalar value.
    AtomicSingle,
    /// One global set of values (checkbox groups, multi-selects).
    AtomicMulti,
    /// A row inside a proven repeating section.
    SectionRepeater,
    /// Section-scoped, but not yet trusted as a true repeater.
    SectionCandidate,
}

impl InstanceType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AtomicSingle => "ATOMIC_SINGLE",
            Self::AtomicMulti => "ATOMIC_MULTI",
            Self::SectionRepeater => "SECTION_REPEATER",
            Self::SectionCandidate => "SECTION_CANDIDATE",
        }
    }

    #[must_use]
    pub const fn is_sectional(self) -> bool {
        matches!(self, Self::SectionRepeater | Self::SectionCandidate)
    }
}

/// Data-sharing boundary of a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    Global,
    Section,
    Group,
}

/// How a field's position inside a repeating section was obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexSource {
    #[default]
    None,
    /// Inferred by counting (e.g. the nth "Company" label on the page).
    Synthetic,
    /// Read from the document structure (container ids, `[n]` names).
    Structural,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    #[default]
    Text,
    Textarea,
    Radio,
    Checkbox,
    Select,
    MultiSelect,
    Date,
    Number,
    Email,
    Tel,
    File,
    Other,
}

impl ControlType {
    /// Maps loose control-type spellings (`select-one`, `multiselect`, `input`) onto the
    /// closed set. Unknown spellings become [`ControlType::Other`].
    #[must_use]
    pub fn from_str_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "input" | "search" | "url" | "password" => Self::Text,
            "textarea" => Self::Textarea,
            "radio" => Self::Radio,
            "checkbox" => Self::Checkbox,
            "select" | "select-one" | "dropdown" | "combobox" => Self::Select,
            "select-multiple" | "multiselect" | "multi-select" | "multi_select" => {
                Self::MultiSelect
            }
            "date" | "month" | "datetime-local" | "week" => Self::Date,
            "number" | "range" => Self::Number,
            "email" => Self::Email,
            "tel" | "phone" => Self::Tel,
            "file" => Self::File,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub const fn is_multi_valued(self) -> bool {
        matches!(self, Self::Checkbox | Self::MultiSelect)
    }
}

/// Kind of repeating section a field physically sits in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Work,
    Education,
    Other(String),
}

impl SectionType {
    /// Parses a section hint. Empty input yields `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "" | "null" | "none" => None,
            "work" | "work_experience" | "experience" | "employment" | "job" | "jobs" => {
                Some(Self::Work)
            }
            "education" | "school" | "schools" | "academic" => Some(Self::Education),
            _ => Some(Self::Other(lowered)),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Work => "work",
            Self::Education => "education",
            Self::Other(name) => name.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MlPrediction {
    pub label: String,
    pub confidence: f32,
}

impl MlPrediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Position of a date-like field inside its section row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DateRole {
    Start,
    End,
    /// Third or later date in the same row; deliberately not guessed.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Classification {
    pub instance_type: InstanceType,
    pub scope: Scope,
}

/// One detected form control, normalized.
///
/// Built once per scan pass (see [`crate::RawField`]), enriched by the classifier and key
/// generator, then dropped. The classification is write-once.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FieldDescriptor {
    pub selector: String,
    pub name: String,
    pub dom_id: String,
    pub label: String,
    pub control_type: ControlType,
    pub parent_context: String,
    pub section_type: Option<SectionType>,
    pub field_index: Option<u32>,
    pub index_source: IndexSource,
    pub is_strong_repeater: bool,
    pub in_repeater_container: bool,
    pub group_id: Option<String>,
    pub cache_label: Option<String>,
    pub ml_prediction: Option<MlPrediction>,
    pub base_key: Option<String>,
    pub date_role: Option<DateRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) classification: Option<Classification>,
}

impl FieldDescriptor {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_control(mut self, control_type: ControlType) -> Self {
        self.control_type = control_type;
        self
    }

    #[must_use]
    pub fn with_context(mut self, parent_context: impl Into<String>) -> Self {
        self.parent_context = parent_context.into();
        self
    }

    #[must_use]
    pub fn in_section(mut self, section_type: SectionType, index: u32, source: IndexSource) -> Self {
        self.section_type = Some(section_type);
        self.field_index = Some(index);
        self.index_source = source;
        self
    }

    #[must_use]
    pub fn with_prediction(mut self, label: impl Into<String>, confidence: f32) -> Self {
        self.ml_prediction = Some(MlPrediction::new(label, confidence));
        self
    }

    #[must_use]
    pub const fn is_multi_valued(&self) -> bool {
        self.control_type.is_multi_valued()
    }

    /// Lower-cased label, name and parent context joined by spaces; the haystack the
    /// classifier's pattern tables run against.
    #[must_use]
    pub fn combined_text(&self) -> String {
        [
            self.label.as_str(),
            self.name.as_str(),
            self.parent_context.as_str(),
        ]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
    }

    /// Best human-facing label: the visible label, else the name, else the id.
    #[must_use]
    pub fn display_label(&self) -> &str {
        [&self.label, &self.name, &self.dom_id]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }

    #[must_use]
    pub const fn classification(&self) -> Option<Classification> {
        self.classification
    }

    #[must_use]
    pub fn instance_type(&self) -> Option<InstanceType> {
        self.classification.map(|c| c.instance_type)
    }

    #[must_use]
    pub fn scope(&self) -> Option<Scope> {
        self.classification.map(|c| c.scope)
    }

    /// Freezes the classification for the rest of the scan pass.
    pub fn assign_classification(&mut self, classification: Classification) -> Result<()> {
        if let Some(existing) = self.classification {
            return Err(ClassificationError::AlreadyAssigned {
                selector: self.selector.clone(),
                existing: existing.instance_type,
            });
        }
        self.classification = Some(classification);
        Ok(())
    }
}

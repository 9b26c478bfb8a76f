use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClassificationError, Result};
use crate::field::{ControlType, FieldDescriptor, IndexSource, MlPrediction, SectionType};

/// A field record as delivered by the page scanner.
///
/// Every attribute is optional and loosely typed: indices may arrive as strings, control
/// types as arbitrary HTML spellings. [`FieldDescriptor::from_raw`] is the single place
/// those shapes are normalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawField {
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "id")]
    pub dom_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, alias = "type")]
    pub control_type: Option<String>,
    #[serde(default)]
    pub parent_context: Option<String>,
    #[serde(default)]
    pub section_type: Option<String>,
    #[serde(default)]
    #[schemars(with = "Option<u32>")]
    pub field_index: Option<Value>,
    #[serde(default)]
    pub index_source: Option<String>,
    #[serde(default)]
    pub is_strong_repeater: Option<bool>,
    #[serde(default)]
    pub in_repeater_container: Option<bool>,
    #[serde(default, alias = "parentGroupId")]
    pub group_id: Option<String>,
    #[serde(default, alias = "cache_label")]
    pub cache_label: Option<String>,
    #[serde(default)]
    pub ml_prediction: Option<MlPrediction>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_index(value: Option<&Value>) -> Result<Option<u32>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ClassificationError::InvalidRecord(format!("field index {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ClassificationError::InvalidRecord(format!("field index {s:?}"))),
        Some(other) => Err(ClassificationError::InvalidRecord(format!(
            "field index {other}"
        ))),
    }
}

fn parse_index_source(raw: Option<&str>) -> IndexSource {
    match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
        Some("STRUCTURAL") => IndexSource::Structural,
        Some("SYNTHETIC") => IndexSource::Synthetic,
        _ => IndexSource::None,
    }
}

impl FieldDescriptor {
    /// Normalizes one scanner record. `position` is the record's place in the scan and is
    /// only used to mint a selector when the record carries none.
    pub fn from_raw(raw: RawField, position: usize) -> Result<Self> {
        let field_index = parse_index(raw.field_index.as_ref())?;
        let name = non_empty(raw.name).unwrap_or_default();
        let dom_id = non_empty(raw.dom_id).unwrap_or_default();
        let selector = non_empty(raw.selector)
            .or_else(|| (!dom_id.is_empty()).then(|| format!("#{dom_id}")))
            .or_else(|| (!name.is_empty()).then(|| format!("[name=\"{name}\"]")))
            .unwrap_or_else(|| format!("field-{position}"));

        let mut index_source = parse_index_source(raw.index_source.as_deref());
        if field_index.is_none() {
            index_source = IndexSource::None;
        } else if index_source == IndexSource::None {
            index_source = IndexSource::Synthetic;
        }

        let ml_prediction = raw
            .ml_prediction
            .filter(|p| !p.label.trim().is_empty())
            .map(|p| MlPrediction::new(p.label.trim(), p.confidence.clamp(0.0, 1.0)));

        Ok(Self {
            selector,
            name,
            dom_id,
            label: non_empty(raw.label).unwrap_or_default(),
            control_type: raw
                .control_type
                .as_deref()
                .map(ControlType::from_str_lossy)
                .unwrap_or_default(),
            parent_context: non_empty(raw.parent_context).unwrap_or_default(),
            section_type: raw.section_type.as_deref().and_then(SectionType::parse),
            field_index,
            index_source,
            is_strong_repeater: raw.is_strong_repeater.unwrap_or(false),
            in_repeater_container: raw.in_repeater_container.unwrap_or(false),
            group_id: non_empty(raw.group_id),
            cache_label: non_empty(raw.cache_label),
            ml_prediction,
            ..Self::default()
        })
    }

    /// Normalizes a JSON array of scanner records.
    pub fn from_json_records(records: &Value) -> Result<Vec<Self>> {
        let items = records.as_array().ok_or_else(|| {
            ClassificationError::InvalidRecord("expected an array of field records".into())
        })?;
        items
            .iter()
            .enumerate()
            .map(|(position, item)| {
                let raw: RawField = serde_json::from_value(item.clone()).map_err(|err| {
                    ClassificationError::InvalidRecord(format!("record {position}: {err}"))
                })?;
                Self::from_raw(raw, position)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn normalizes_loose_record() {
        let fields = FieldDescriptor::from_json_records(&json!([{
            "id": "company-2",
            "label": "  Company Name ",
            "type": "text",
            "sectionType": "work",
            "fieldIndex": "2",
            "indexSource": "structural",
            "isStrongRepeater": true,
            "mlPrediction": {"label": "employer_name", "confidence": 1.4}
        }]))
        .unwrap();

        let field = &fields[0];
        assert_eq!(field.selector, "#company-2");
        assert_eq!(field.label, "Company Name");
        assert_eq!(field.section_type, Some(SectionType::Work));
        assert_eq!(field.field_index, Some(2));
        assert_eq!(field.index_source, IndexSource::Structural);
        assert!(field.is_strong_repeater);
        assert_eq!(field.ml_prediction.as_ref().unwrap().confidence, 1.0);
        assert_eq!(field.instance_type(), None);
    }

    #[test]
    fn index_source_follows_index_presence() {
        let indexed = FieldDescriptor::from_raw(
            RawField {
                name: Some("school".into()),
                field_index: Some(json!(0)),
                ..RawField::default()
            },
            0,
        )
        .unwrap();
        assert_eq!(indexed.index_source, IndexSource::Synthetic);
        assert_eq!(indexed.selector, "[name=\"school\"]");

        let unindexed = FieldDescriptor::from_raw(
            RawField {
                index_source: Some("STRUCTURAL".into()),
                ..RawField::default()
            },
            7,
        )
        .unwrap();
        assert_eq!(unindexed.index_source, IndexSource::None);
        assert_eq!(unindexed.selector, "field-7");
    }

    #[test]
    fn raw_records_start_unclassified() {
        let mut field = FieldDescriptor::from_raw(
            RawField {
                label: Some("Email".into()),
                ..RawField::default()
            },
            0,
        )
        .unwrap();
        assert_eq!(field.classification(), None);

        let classification = crate::Classification {
            instance_type: crate::InstanceType::AtomicSingle,
            scope: crate::Scope::Global,
        };
        field.assign_classification(classification).unwrap();
        assert!(field.assign_classification(classification).is_err());
    }

    #[test]
    fn rejects_garbage_index() {
        let err = FieldDescriptor::from_json_records(&json!([{ "fieldIndex": "abc" }]));
        assert!(err.is_err());
        assert!(FieldDescriptor::from_json_records(&json!({})).is_err());
    }
}

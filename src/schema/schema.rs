use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use crate::core::error::Result;

/// Declared type of a layer attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Text,
    Categorical,
    Labels,
    Number,
    Dict,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeSpec {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AttributeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(rename = "isGlobal", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_global: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttributeSpec {
    pub fn of_type(kind: AttributeType) -> Self {
        AttributeSpec {
            kind: Some(kind),
            ..AttributeSpec::default()
        }
    }

    pub fn is(&self, kind: AttributeType) -> bool {
        self.kind == Some(kind)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Anchoring {
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub time: bool,
    #[serde(default)]
    pub location: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchoring: Option<Anchoring>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlabels: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LayerSpec {
    pub fn with_attribute(mut self, name: &str, spec: AttributeSpec) -> Self {
        self.attributes.insert(name.to_string(), spec);
        self
    }

    pub fn time_anchored(mut self) -> Self {
        self.anchoring.get_or_insert_with(Anchoring::default).time = true;
        self
    }

    /// Attribute lookup tolerating the `_id` suffix of foreign-key columns
    pub fn attribute_for_column(&self, column: &str) -> Option<(&String, &AttributeSpec)> {
        let column = column.to_lowercase();
        self.attributes.iter().find(|(name, _)| {
            let name = name.to_lowercase();
            name == column || format!("{}_id", name) == column
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirstClass {
    #[serde(default = "FirstClass::default_document")]
    pub document: String,
    #[serde(default = "FirstClass::default_segment")]
    pub segment: String,
    #[serde(default = "FirstClass::default_token")]
    pub token: String,
}

impl FirstClass {
    fn default_document() -> String {
        "Document".to_string()
    }

    fn default_segment() -> String {
        "Segment".to_string()
    }

    fn default_token() -> String {
        "Token".to_string()
    }
}

impl Default for FirstClass {
    fn default() -> Self {
        FirstClass {
            document: FirstClass::default_document(),
            segment: FirstClass::default_segment(),
            token: FirstClass::default_token(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaSlot {
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(rename = "isOptional", default, skip_serializing_if = "Option::is_none")]
    pub is_optional: Option<bool>,
}

impl MediaSlot {
    /// Only an explicit `isOptional: false` makes a slot required
    pub fn is_required(&self) -> bool {
        self.is_optional == Some(false)
    }

    pub fn is_time_based(&self) -> bool {
        matches!(self.media_type.as_deref(), Some("audio") | Some("video"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusMeta {
    #[serde(rename = "mediaSlots", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub media_slots: BTreeMap<String, MediaSlot>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Layer/attribute schema of a corpus (the corpus JSON template)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusSchema {
    #[serde(rename = "firstClass", default)]
    pub first_class: FirstClass,
    #[serde(default)]
    pub layer: BTreeMap<String, LayerSpec>,
    #[serde(default)]
    pub meta: CorpusMeta,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CorpusSchema {
    pub fn new() -> Self {
        CorpusSchema::default()
    }

    pub fn with_layer(mut self, name: &str, layer: LayerSpec) -> Self {
        self.layer.insert(name.to_string(), layer);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Case-insensitive layer name resolution
    pub fn layer_name(&self, name: &str) -> Option<&str> {
        let lower = name.to_lowercase();
        self.layer
            .keys()
            .find(|k| k.to_lowercase() == lower)
            .map(String::as_str)
    }

    pub fn layer_ci(&self, name: &str) -> Option<&LayerSpec> {
        self.layer_name(name).and_then(|n| self.layer.get(n))
    }

    pub fn layer_ci_mut(&mut self, name: &str) -> Option<&mut LayerSpec> {
        let key = self.layer_name(name)?.to_string();
        self.layer.get_mut(&key)
    }

    pub fn attribute(&self, layer: &str, attribute: &str) -> Option<&AttributeSpec> {
        self.layer_ci(layer).and_then(|l| l.attributes.get(attribute))
    }

    /// A layer is time-anchored itself or through the layers it contains
    pub fn is_time_anchored(&self, layer: &str) -> bool {
        let mut current = Some(layer.to_string());
        let mut depth = 0;
        while let Some(name) = current {
            let Some(spec) = self.layer_ci(&name) else {
                return false;
            };
            if spec.anchoring.as_ref().is_some_and(|a| a.time) {
                return true;
            }
            depth += 1;
            if depth > self.layer.len() {
                return false;
            }
            current = spec.contains.clone();
        }
        false
    }

    pub fn has_time_based_media(&self) -> bool {
        self.meta.media_slots.values().any(MediaSlot::is_time_based)
    }

    /// Append newly observed categorical values, skipping global attributes
    pub fn record_categorical_values<'a>(
        &mut self,
        layer: &str,
        attribute: &str,
        observed: impl IntoIterator<Item = &'a String>,
    ) {
        let Some(spec) = self
            .layer_ci_mut(layer)
            .and_then(|l| l.attributes.get_mut(attribute))
        else {
            return;
        };
        if !spec.is(AttributeType::Categorical) || spec.is_global {
            return;
        }
        let values = spec.values.get_or_insert_with(Vec::new);
        for value in observed {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
    }
}

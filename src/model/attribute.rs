use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Categorical(String),
    Text(String),
    Meta(Map<String, Value>),
    Dependency {
        head: Option<String>,   // None marks a tree root
        label: String,
    },
}

/// Named attribute of a document, segment or token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn categorical(name: &str, value: &str) -> Self {
        Attribute {
            name: name.to_string(),
            value: AttributeValue::Categorical(value.to_string()),
        }
    }

    pub fn text(name: &str, value: &str) -> Self {
        Attribute {
            name: name.to_string(),
            value: AttributeValue::Text(value.to_string()),
        }
    }

    pub fn meta(name: &str, value: Map<String, Value>) -> Self {
        Attribute {
            name: name.to_string(),
            value: AttributeValue::Meta(value),
        }
    }

    /// An empty head id is normalized to a root
    pub fn dependency(name: &str, head: Option<&str>, label: &str) -> Self {
        let head = head
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string);
        Attribute {
            name: name.to_string(),
            value: AttributeValue::Dependency {
                head,
                label: label.to_string(),
            },
        }
    }

    /// Null attributes never contribute a column when a schema is frozen
    pub fn is_null(&self) -> bool {
        match &self.value {
            AttributeValue::Categorical(v) | AttributeValue::Text(v) => v.is_empty(),
            AttributeValue::Meta(m) => m.is_empty(),
            AttributeValue::Dependency { .. } => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            AttributeValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Plain rendering used for columns that are written as-is
    pub fn render(&self) -> String {
        match &self.value {
            AttributeValue::Categorical(v) | AttributeValue::Text(v) => v.clone(),
            AttributeValue::Meta(m) => Value::Object(m.clone()).to_string(),
            AttributeValue::Dependency { label, .. } => label.clone(),
        }
    }
}

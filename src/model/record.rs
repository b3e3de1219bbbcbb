use std::sync::Arc;
use serde_json::{Map, Value};
use crate::model::attribute::{Attribute, AttributeValue};

fn find<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|a| a.name == name)
}

/// Document produced by the upstream parser
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub attributes: Vec<Attribute>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        find(&self.attributes, name)
    }

    pub fn meta(&self) -> Option<&Map<String, Value>> {
        match self.attribute("meta").map(|a| &a.value) {
            Some(AttributeValue::Meta(m)) => Some(m),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: String,
    pub attributes: Vec<Attribute>,
    pub tokens: Vec<Token>,
}

impl Segment {
    pub fn new(id: impl Into<String>) -> Self {
        Segment {
            id: id.into(),
            attributes: Vec::new(),
            tokens: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_token(mut self, token: Token) -> Self {
        self.tokens.push(token);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        find(&self.attributes, name)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub id: String,
    pub space_after: bool,
    pub frame_range: Option<(u64, u64)>,   // Document-local
    pub attributes: Vec<Attribute>,
}

impl Token {
    pub fn new(id: impl Into<String>, form: &str) -> Self {
        Token {
            id: id.into(),
            space_after: true,
            frame_range: None,
            attributes: vec![Attribute::text("form", form)],
        }
    }

    pub fn no_space_after(mut self) -> Self {
        self.space_after = false;
        self
    }

    pub fn with_frames(mut self, start: u64, end: u64) -> Self {
        self.frame_range = Some((start, end));
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        find(&self.attributes, name)
    }
}

/// One item of the input stream: a segment and the document it belongs to.
/// Either side may be absent; the same document is shared by all its segments.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub segment: Option<Segment>,
    pub document: Option<Arc<Document>>,
}

impl Record {
    pub fn new(segment: Segment, document: &Arc<Document>) -> Self {
        Record {
            segment: Some(segment),
            document: Some(document.clone()),
        }
    }

    pub fn segment(segment: Segment) -> Self {
        Record {
            segment: Some(segment),
            document: None,
        }
    }
}

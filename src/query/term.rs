use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::{normalize_exact, normalize_number_as_text, normalize_term};
use crate::schema::IndexField;

/// Leaf of a parsed query.
///
/// The text is the raw term as written in the query; normalization happens
/// in [`TermNode::lookup_term`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "term", rename_all = "snake_case")]
pub enum TermNode {
    String(String),
    Prefix(String),
    Suffix(String),
    Substring(String),
    Range(String),
    Location(String),
    Regexp(String),
    Number(String),
    Predicate(String),
}

impl TermNode {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TermNode::String(_) => "string",
            TermNode::Prefix(_) => "prefix",
            TermNode::Suffix(_) => "suffix",
            TermNode::Substring(_) => "substring",
            TermNode::Range(_) => "range",
            TermNode::Location(_) => "location",
            TermNode::Regexp(_) => "regexp",
            TermNode::Number(_) => "number",
            TermNode::Predicate(_) => "predicate",
        }
    }

    /// The dictionary key this node looks up in `field`, or `None` for node
    /// kinds that are not served by a memory index.
    ///
    /// Keys are normalized the way values of `field` are at insertion: numeric
    /// fields take the canonical number form, tokenized fields see numbers as
    /// words.
    pub fn lookup_term(&self, field: &IndexField) -> Option<String> {
        match self {
            TermNode::String(text)
            | TermNode::Prefix(text)
            | TermNode::Suffix(text)
            | TermNode::Substring(text)
            | TermNode::Range(text)
            | TermNode::Location(text)
            | TermNode::Regexp(text) => Some(if field.is_tokenized() {
                normalize_term(text)
            } else {
                normalize_exact(field.data_type, text)
            }),
            TermNode::Number(text) if field.is_tokenized() => {
                Some(normalize_number_as_text(text))
            }
            TermNode::Number(text) => Some(normalize_exact(field.data_type, text)),
            TermNode::Predicate(_) => None,
        }
    }
}

/// The field a term is searched in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Filter fields only need matching doc ids, not positions or weights.
    #[serde(default)]
    pub is_filter: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_filter: false,
        }
    }

    pub fn filter(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_filter: true,
        }
    }
}

/// Per-request information carried into blueprint creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
        }
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request_id {
            Some(id) => write!(f, "request {id}"),
            None => write!(f, "request"),
        }
    }
}

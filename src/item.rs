//! Store items and their concurrency token
//!
//! A value opts into optimistic concurrency by reporting an ETag from
//! [`StoreItem::e_tag`]. `None` means the value does not take part in the
//! check and is always written; `Some("*")` forces the write.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the reserved top-level field carrying the record's ETag
pub const ETAG_FIELD: &str = "eTag";

/// Token that skips the conflict check
pub const WILDCARD_ETAG: &str = "*";

/// A value that can be stored and carries a concurrency token
pub trait StoreItem {
    /// Token declared by this value, if it participates in concurrency control
    fn e_tag(&self) -> Option<&str>;

    /// Receive the stored token after a read
    fn set_e_tag(&mut self, e_tag: Option<String>);
}

/// Schemaless JSON object with an ETag, for hosts without their own types
///
/// Serializes as the bare object; the tag travels through the codec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(skip)]
    pub e_tag: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; `None` if `value` is not an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self {
                e_tag: None,
                fields,
            }),
            _ => None,
        }
    }

    /// Set a field, returning self for chaining
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Declare the token this document expects to overwrite
    pub fn with_e_tag(mut self, e_tag: impl Into<String>) -> Self {
        self.e_tag = Some(e_tag.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl StoreItem for Document {
    fn e_tag(&self) -> Option<&str> {
        self.e_tag.as_deref()
    }

    fn set_e_tag(&mut self, e_tag: Option<String>) {
        self.e_tag = e_tag;
    }
}

/// Is `token` the force-overwrite wildcard?
pub fn is_wildcard(token: &str) -> bool {
    token == WILDCARD_ETAG
}

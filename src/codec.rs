//! Record codecs
//!
//! The store never looks inside a value. A [`Codec`] turns a value plus its
//! assigned ETag into file bytes and back, and can report the stored ETag
//! without decoding the whole value.
//!
//! ## JSON layout
//! ```text
//! { "$type": "Conversation",   <- host-chosen tag (serde internally tagged enum)
//!   "turns": 3,
//!   "eTag": "17" }             <- reserved field, injected by the codec
//! ```
//!
//! ## Binary layout
//! ```text
//! ┌───────────┬─────────────┬────────────────────────────┬──────────┐
//! │ Magic (4) │ Version (2) │ Envelope (bincode)         │ CRC32(4) │
//! │  "FKVB"   │   u16 LE    │ { e_tag, body: bincode(T) }│  u32 LE  │
//! └───────────┴─────────────┴────────────────────────────┴──────────┘
//! ```

use std::marker::PhantomData;

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::item::{StoreItem, ETAG_FIELD};

/// Failure inside a codec; the store attaches the file path
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("{0}")]
    Serialization(String),

    #[error("{0}")]
    Corruption(String),
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Encodes host values into record files
pub trait Codec: Send + Sync + 'static {
    type Value: StoreItem + Send + 'static;

    /// Encode `value`, stamping `e_tag` as the record's token
    fn encode(&self, value: &Self::Value, e_tag: &str) -> CodecResult<Bytes>;

    /// Decode a record, folding its stored token into the value
    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Value>;

    /// The token stored in a record, without building the value
    fn stored_e_tag(&self, bytes: &[u8]) -> CodecResult<Option<String>>;
}

// =============================================================================
// JSON
// =============================================================================

/// JSON codec; values must serialize to a JSON object
pub struct JsonCodec<T> {
    pretty: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            pretty: false,
            _marker: PhantomData,
        }
    }

    /// Indent output for human inspection
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            _marker: PhantomData,
        }
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self {
            pretty: self.pretty,
            _marker: PhantomData,
        }
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: StoreItem + Serialize + DeserializeOwned + Send + 'static,
{
    type Value = T;

    fn encode(&self, value: &T, e_tag: &str) -> CodecResult<Bytes> {
        let mut object = match serde_json::to_value(value) {
            Ok(Value::Object(object)) => object,
            Ok(other) => {
                return Err(CodecError::Serialization(format!(
                    "record must serialize to a JSON object, got {}",
                    json_kind(&other)
                )))
            }
            Err(e) => return Err(CodecError::Serialization(e.to_string())),
        };
        object.insert(ETAG_FIELD.to_string(), Value::String(e_tag.to_string()));

        let document = Value::Object(object);
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&document)
        } else {
            serde_json::to_vec(&document)
        }
        .map_err(|e| CodecError::Serialization(e.to_string()))?;

        Ok(Bytes::from(bytes))
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        let (object, e_tag) = split_record(bytes)?;

        let mut value: T = serde_json::from_value(Value::Object(object))
            .map_err(|e| CodecError::Serialization(e.to_string()))?;
        value.set_e_tag(e_tag);
        Ok(value)
    }

    fn stored_e_tag(&self, bytes: &[u8]) -> CodecResult<Option<String>> {
        split_record(bytes).map(|(_, e_tag)| e_tag)
    }
}

/// Parse a JSON record into its payload object and stored token
///
/// Shared by `decode` and `stored_e_tag` so both accept the same files.
fn split_record(bytes: &[u8]) -> CodecResult<(Map<String, Value>, Option<String>)> {
    let mut object = match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            return Err(CodecError::Corruption(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            )))
        }
        Err(e) => return Err(CodecError::Corruption(e.to_string())),
    };

    let e_tag = match object.remove(ETAG_FIELD) {
        None | Some(Value::Null) => None,
        Some(Value::String(tag)) => Some(tag),
        Some(other) => {
            return Err(CodecError::Corruption(format!(
                "'{}' must be a string, found {}",
                ETAG_FIELD,
                json_kind(&other)
            )))
        }
    };

    Ok((object, e_tag))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// Binary
// =============================================================================

/// Magic bytes opening every binary record
pub const BINARY_MAGIC: [u8; 4] = *b"FKVB";

/// Current binary record version
pub const BINARY_VERSION: u16 = 1;

/// Magic + version
const BINARY_HEADER_SIZE: usize = 6;

const CRC_SIZE: usize = 4;

#[derive(Serialize, Deserialize)]
struct Envelope {
    e_tag: Option<String>,
    body: Vec<u8>,
}

/// Compact bincode codec with a CRC-checked envelope
///
/// bincode is not self-describing: `T` must not rely on
/// `#[serde(flatten)]`, internally tagged enums or `deserialize_any`.
/// Externally tagged enums carry their variant index instead.
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BincodeCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> BincodeCodec<T> {
    /// Check framing and checksum, returning the decoded envelope
    fn open_envelope(bytes: &[u8]) -> CodecResult<Envelope> {
        if bytes.len() < BINARY_HEADER_SIZE + CRC_SIZE {
            return Err(CodecError::Corruption(format!(
                "record too short ({} bytes)",
                bytes.len()
            )));
        }
        if bytes[..4] != BINARY_MAGIC {
            return Err(CodecError::Corruption("bad magic".to_string()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != BINARY_VERSION {
            return Err(CodecError::Corruption(format!(
                "unsupported record version {}",
                version
            )));
        }

        let crc_start = bytes.len() - CRC_SIZE;
        let payload = &bytes[BINARY_HEADER_SIZE..crc_start];
        let mut crc_bytes = [0u8; CRC_SIZE];
        crc_bytes.copy_from_slice(&bytes[crc_start..]);
        let stored_crc = u32::from_le_bytes(crc_bytes);
        let actual_crc = crc32fast::hash(payload);
        if stored_crc != actual_crc {
            return Err(CodecError::Corruption(format!(
                "checksum mismatch (stored {:08x}, computed {:08x})",
                stored_crc, actual_crc
            )));
        }

        bincode::deserialize(payload).map_err(|e| CodecError::Corruption(e.to_string()))
    }
}

impl<T> Codec for BincodeCodec<T>
where
    T: StoreItem + Serialize + DeserializeOwned + Send + 'static,
{
    type Value = T;

    fn encode(&self, value: &T, e_tag: &str) -> CodecResult<Bytes> {
        let body =
            bincode::serialize(value).map_err(|e| CodecError::Serialization(e.to_string()))?;
        let envelope = Envelope {
            e_tag: Some(e_tag.to_string()),
            body,
        };
        let payload =
            bincode::serialize(&envelope).map_err(|e| CodecError::Serialization(e.to_string()))?;

        let mut buf = BytesMut::with_capacity(BINARY_HEADER_SIZE + payload.len() + CRC_SIZE);
        buf.put_slice(&BINARY_MAGIC);
        buf.put_u16_le(BINARY_VERSION);
        buf.put_slice(&payload);
        buf.put_u32_le(crc32fast::hash(&payload));
        Ok(buf.freeze())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        let envelope = Self::open_envelope(bytes)?;
        let mut value: T = bincode::deserialize(&envelope.body)
            .map_err(|e| CodecError::Serialization(e.to_string()))?;
        value.set_e_tag(envelope.e_tag);
        Ok(value)
    }

    fn stored_e_tag(&self, bytes: &[u8]) -> CodecResult<Option<String>> {
        Ok(Self::open_envelope(bytes)?.e_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Document;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "$type")]
    enum Turn {
        Greeting { text: String },
        Handoff { queue: String, priority: u8 },
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Conversation {
        #[serde(skip)]
        e_tag: Option<String>,
        turns: Vec<Turn>,
    }

    impl StoreItem for Conversation {
        fn e_tag(&self) -> Option<&str> {
            self.e_tag.as_deref()
        }

        fn set_e_tag(&mut self, e_tag: Option<String>) {
            self.e_tag = e_tag;
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        e_tag: Option<String>,
        count: u64,
    }

    impl StoreItem for Counter {
        fn e_tag(&self) -> Option<&str> {
            self.e_tag.as_deref()
        }

        fn set_e_tag(&mut self, e_tag: Option<String>) {
            self.e_tag = e_tag;
        }
    }

    #[test]
    fn test_json_injects_etag_at_top_level() {
        let codec = JsonCodec::<Document>::new();
        let doc = Document::new().with("name", "alice");

        let bytes = codec.encode(&doc, "5").unwrap();
        let raw: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(raw, json!({ "name": "alice", "eTag": "5" }));
        assert_eq!(codec.stored_e_tag(&bytes).unwrap(), Some("5".to_string()));
    }

    #[test]
    fn test_json_decode_folds_etag_into_value() {
        let codec = JsonCodec::<Document>::new();
        let decoded = codec.decode(br#"{"name":"bob","eTag":"9"}"#).unwrap();

        assert_eq!(decoded.e_tag, Some("9".to_string()));
        assert_eq!(decoded.get("name"), Some(&json!("bob")));
        assert!(decoded.get(ETAG_FIELD).is_none());
    }

    #[test]
    fn test_json_record_without_etag() {
        let codec = JsonCodec::<Document>::new();
        let bytes = br#"{"name":"legacy"}"#;

        assert_eq!(codec.stored_e_tag(bytes).unwrap(), None);
        assert_eq!(codec.decode(bytes).unwrap().e_tag, None);
    }

    #[test]
    fn test_json_type_tag_reconstructs_variants() {
        let codec = JsonCodec::<Conversation>::new();
        let conversation = Conversation {
            e_tag: None,
            turns: vec![
                Turn::Greeting {
                    text: "hi".to_string(),
                },
                Turn::Handoff {
                    queue: "billing".to_string(),
                    priority: 2,
                },
            ],
        };

        let bytes = codec.encode(&conversation, "0").unwrap();
        let raw: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(raw["turns"][1]["$type"], json!("Handoff"));

        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.turns, conversation.turns);
        assert_eq!(decoded.e_tag, Some("0".to_string()));
    }

    #[test]
    fn test_json_rejects_non_object_values() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper(u32);
        impl StoreItem for Wrapper {
            fn e_tag(&self) -> Option<&str> {
                None
            }
            fn set_e_tag(&mut self, _e_tag: Option<String>) {}
        }

        let codec = JsonCodec::<Wrapper>::new();
        let err = codec.encode(&Wrapper(3), "0").unwrap_err();
        assert!(matches!(err, CodecError::Serialization(_)));
    }

    #[test]
    fn test_json_garbage_is_corruption() {
        let codec = JsonCodec::<Document>::new();
        assert!(matches!(
            codec.decode(b"{\"name\": "),
            Err(CodecError::Corruption(_))
        ));
        assert!(matches!(
            codec.decode(b"[1,2,3]"),
            Err(CodecError::Corruption(_))
        ));
        assert!(matches!(
            codec.decode(br#"{"eTag": 4}"#),
            Err(CodecError::Corruption(_))
        ));
    }

    #[test]
    fn test_json_stored_etag_agrees_with_decode() {
        let codec = JsonCodec::<Document>::new();

        let records: [&[u8]; 3] = [br#"["5"]"#, br#""5""#, br#"{"eTag": 5}"#];
        for bytes in records {
            assert!(matches!(
                codec.stored_e_tag(bytes),
                Err(CodecError::Corruption(_))
            ));
            assert!(matches!(codec.decode(bytes), Err(CodecError::Corruption(_))));
        }
    }

    #[test]
    fn test_json_pretty_output() {
        let codec = JsonCodec::<Document>::pretty();
        let bytes = codec.encode(&Document::new().with("a", 1), "1").unwrap();

        assert!(codec.is_pretty());
        assert!(bytes.contains(&b'\n'));
    }

    #[test]
    fn test_bincode_carries_etag() {
        let codec = BincodeCodec::<Counter>::new();
        let counter = Counter {
            e_tag: Some("stale".to_string()),
            count: 41,
        };

        let bytes = codec.encode(&counter, "12").unwrap();
        assert_eq!(&bytes[..4], &BINARY_MAGIC);
        assert_eq!(codec.stored_e_tag(&bytes).unwrap(), Some("12".to_string()));

        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.count, 41);
        assert_eq!(decoded.e_tag, Some("12".to_string()));
    }

    #[test]
    fn test_bincode_detects_torn_record() {
        let codec = BincodeCodec::<Counter>::new();
        let bytes = codec
            .encode(
                &Counter {
                    e_tag: None,
                    count: 7,
                },
                "3",
            )
            .unwrap();

        let torn = &bytes[..bytes.len() - 3];
        assert!(matches!(codec.decode(torn), Err(CodecError::Corruption(_))));

        let mut flipped = bytes.to_vec();
        flipped[BINARY_HEADER_SIZE] ^= 0xFF;
        assert!(matches!(
            codec.stored_e_tag(&flipped),
            Err(CodecError::Corruption(_))
        ));
    }

    #[test]
    fn test_bincode_rejects_unknown_version() {
        let codec = BincodeCodec::<Counter>::new();
        let mut bytes = codec
            .encode(
                &Counter {
                    e_tag: None,
                    count: 1,
                },
                "0",
            )
            .unwrap()
            .to_vec();
        bytes[4] = 9;

        let err = codec.decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("version"));
    }
}

//! Value codecs used at the cache boundary.
//!
//! A codec turns a value into the bytes stored in the cache and back.
//! Decoding yields `Option<V>`: a payload that decodes to the codec's null
//! (JSON `null`, MessagePack nil) is reported as `None` so the orchestrator
//! can treat it exactly like "nothing found".

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CodecError;

/// Serialization format for cached values.
pub trait Codec: Send + Sync + 'static {
    /// Wire format name, e.g. `"json"`.
    fn name(&self) -> &'static str;

    /// Encode a value to bytes.
    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes into a value, `None` when the payload is the format's null.
    fn decode<V: DeserializeOwned>(&self, data: &[u8]) -> Result<Option<V>, CodecError>;
}

/// Object-safe view of a [`Codec`] fixed to one value type.
///
/// Bindings store `Arc<dyn ValueCodec<V>>` so that they do not carry the
/// codec as a type parameter.
pub trait ValueCodec<V>: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, value: &V) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, data: &[u8]) -> Result<Option<V>, CodecError>;
}

impl<C, V> ValueCodec<V> for C
where
    C: Codec,
    V: Serialize + DeserializeOwned,
{
    fn name(&self) -> &'static str {
        Codec::name(self)
    }

    fn encode(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        Codec::encode(self, value)
    }

    fn decode(&self, data: &[u8]) -> Result<Option<V>, CodecError> {
        Codec::decode(self, data)
    }
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            codec: "json".to_string(),
            reason: e.to_string(),
        })
    }

    fn decode<V: DeserializeOwned>(&self, data: &[u8]) -> Result<Option<V>, CodecError> {
        serde_json::from_slice::<Option<V>>(data).map_err(|e| CodecError::Decode {
            codec: "json".to_string(),
            reason: e.to_string(),
        })
    }
}

/// MessagePack codec backed by `rmp-serde`.
///
/// Structs are written as maps (field names included) so that payloads stay
/// readable by other MessagePack clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(value).map_err(|e| CodecError::Encode {
            codec: "msgpack".to_string(),
            reason: e.to_string(),
        })
    }

    fn decode<V: DeserializeOwned>(&self, data: &[u8]) -> Result<Option<V>, CodecError> {
        rmp_serde::from_slice::<Option<V>>(data).map_err(|e| CodecError::Decode {
            codec: "msgpack".to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: String,
        name: String,
        age: u32,
    }

    fn user() -> User {
        User {
            id: "1".to_string(),
            name: "name1".to_string(),
            age: 20,
        }
    }

    #[test]
    fn test_json_codec_roundtrip() {
        let codec = JsonCodec;
        let bytes = Codec::encode(&codec, &user()).unwrap();
        let decoded: Option<User> = Codec::decode(&codec, &bytes).unwrap();
        assert_eq!(decoded, Some(user()));
    }

    #[test]
    fn test_json_null_decodes_to_none() {
        let decoded: Option<User> = Codec::decode(&JsonCodec, b"null").unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_json_garbage_is_decode_error() {
        let err = Codec::decode::<User>(&JsonCodec, b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode { ref codec, .. } if codec == "json"));
    }

    #[test]
    fn test_msgpack_codec_roundtrip() {
        let codec = MsgPackCodec;
        let bytes = Codec::encode(&codec, &user()).unwrap();
        let decoded: Option<User> = Codec::decode(&codec, &bytes).unwrap();
        assert_eq!(decoded, Some(user()));
    }

    #[test]
    fn test_msgpack_nil_decodes_to_none() {
        let nil = Codec::encode(&MsgPackCodec, &Option::<User>::None).unwrap();
        let decoded: Option<User> = Codec::decode(&MsgPackCodec, &nil).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_codec_names() {
        assert_eq!(Codec::name(&JsonCodec), "json");
        assert_eq!(Codec::name(&MsgPackCodec), "msgpack");
    }

    #[test]
    fn test_value_codec_object() {
        let codec: Arc<dyn ValueCodec<User>> = Arc::new(JsonCodec);
        let bytes = codec.encode(&user()).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), Some(user()));
        assert_eq!(codec.name(), "json");
    }
}

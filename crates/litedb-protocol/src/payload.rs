//! Self-describing typed payloads.
//!
//! A [`TypedPayload`] pairs a type identifier with the encoded bytes of a
//! structure. It can only be unpacked into the structure whose
//! [`Payload::TYPE_ID`] equals the carried identifier.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A structure that can travel inside a [`TypedPayload`].
pub trait Payload: Serialize + DeserializeOwned + Send + 'static {
    /// Wire identifier for this structure (e.g. `"litedb.Collection"`).
    const TYPE_ID: &'static str;
}

/// Type identifier plus raw encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedPayload {
    #[serde(rename = "typeId")]
    pub type_id: String,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("expected payload of type {expected}, given payload with type id {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("payload of type {type_id} is malformed: {source}")]
    Malformed {
        type_id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl TypedPayload {
    pub fn new(type_id: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            type_id: type_id.into(),
            value,
        }
    }

    /// Encode `data` and tag it with its type identifier.
    pub fn pack<T: Payload>(data: &T) -> Result<Self, PayloadError> {
        let value = serde_json::to_vec(data).map_err(|source| PayloadError::Malformed {
            type_id: T::TYPE_ID.to_string(),
            source,
        })?;
        Ok(Self::new(T::TYPE_ID, value))
    }

    pub fn is<T: Payload>(&self) -> bool {
        self.type_id == T::TYPE_ID
    }

    /// Decode into `T`, refusing payloads tagged with another type.
    pub fn unpack<T: Payload>(&self) -> Result<T, PayloadError> {
        if !self.is::<T>() {
            return Err(PayloadError::TypeMismatch {
                expected: T::TYPE_ID.to_string(),
                actual: self.type_id.clone(),
            });
        }
        serde_json::from_slice(&self.value).map_err(|source| PayloadError::Malformed {
            type_id: self.type_id.clone(),
            source,
        })
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

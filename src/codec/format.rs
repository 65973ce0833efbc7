//! Structured formats
//!
//! Two interchangeable serde formats for typed payloads. Struct tokens carry
//! a one-byte format tag ahead of the serialized bytes, inside the sealed
//! plaintext, so decoding with the wrong format fails instead of producing
//! garbage.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Serialization format for typed values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Length-prefixed binary struct encoding (bincode)
    Bincode,

    /// Compact self-describing object encoding (MessagePack, fields by name)
    #[default]
    MessagePack,
}

impl Format {
    /// Human-readable format name
    pub fn name(self) -> &'static str {
        match self {
            Format::Bincode => "bincode",
            Format::MessagePack => "messagepack",
        }
    }

    fn tag(self) -> u8 {
        match self {
            Format::Bincode => 0xB1,
            Format::MessagePack => 0xC7,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xB1 => Some(Format::Bincode),
            0xC7 => Some(Format::MessagePack),
            _ => None,
        }
    }

    /// Serialize a value (untagged)
    pub fn serialize<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Format::Bincode => {
                bincode::serialize(value).map_err(|e| CodecError::Serialize(e.to_string()))
            }
            Format::MessagePack => {
                rmp_serde::to_vec_named(value).map_err(|e| CodecError::Serialize(e.to_string()))
            }
        }
    }

    /// Deserialize a value (untagged)
    pub fn deserialize<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            Format::Bincode => {
                bincode::deserialize(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
            }
            Format::MessagePack => {
                rmp_serde::from_slice(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
            }
        }
    }

    pub(crate) fn serialize_tagged<T: Serialize + ?Sized>(
        self,
        value: &T,
    ) -> Result<Vec<u8>, CodecError> {
        let body = self.serialize(value)?;
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(self.tag());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub(crate) fn deserialize_tagged<T: DeserializeOwned>(
        self,
        bytes: &[u8],
    ) -> Result<T, CodecError> {
        let (&tag, body) = bytes
            .split_first()
            .ok_or_else(|| CodecError::Deserialize("empty payload".to_string()))?;

        match Format::from_tag(tag) {
            Some(found) if found == self => self.deserialize(body),
            Some(found) => Err(CodecError::FormatMismatch {
                expected: self.name(),
                found: found.name(),
            }),
            None => Err(CodecError::FormatMismatch {
                expected: self.name(),
                found: "untagged",
            }),
        }
    }
}

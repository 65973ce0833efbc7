//! Object envelope
//!
//! `put_object` stores a `WrappedPayload`: the object itself, the time it
//! was wrapped, and a sealed codec token of the same object. On disk the
//! envelope is named-field MessagePack compressed with zstd:
//!
//! ```text
//! { "object": {...}, "timestamp": 1700000000000, "data": "3yZe7d..." }
//!   └─ rmp-serde ─▶ zstd ─▶ bucket value
//! ```
//!
//! MessagePack keeps floats bit-exact (NaN and infinities included), so
//! `get_object` returns the object `put_object` was given.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::{self, Codec, Format};
use crate::error::Result;

/// Envelope written by `Store::put_object`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrappedPayload<T> {
    /// The object as given
    pub object: T,

    /// Wrap time, Unix milliseconds
    pub timestamp: i64,

    /// Codec token of `object` (MessagePack, sealed)
    pub data: String,
}

impl<T: Serialize> WrappedPayload<T> {
    /// Wrap `object`, sealing a copy of it with `codec`
    pub fn new(codec: &Codec, object: T) -> Result<Self> {
        let data = codec.encode_struct(&object, Format::MessagePack)?;
        Ok(Self {
            object,
            timestamp: Utc::now().timestamp_millis(),
            data,
        })
    }
}

impl<T: DeserializeOwned> WrappedPayload<T> {
    /// Decode the sealed copy
    ///
    /// Only succeeds with a codec holding the key the payload was sealed with.
    pub fn decode_data(&self, codec: &Codec) -> Result<T> {
        Ok(codec.decode_struct(&self.data, Format::MessagePack)?)
    }
}

impl<T> WrappedPayload<T> {
    /// Wrap time
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

pub(crate) fn wrap<T: Serialize>(payload: &WrappedPayload<T>) -> Result<Vec<u8>> {
    let packed = Format::MessagePack.serialize(payload)?;
    Ok(codec::compress(&packed, codec::DEFAULT_LEVEL)?)
}

pub(crate) fn unwrap_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<WrappedPayload<T>> {
    let packed = codec::decompress(bytes)?;
    Ok(Format::MessagePack.deserialize(&packed)?)
}

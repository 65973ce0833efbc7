//! How a container's value is laid out on disk

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Codec, Format};
use crate::error::Result;

/// Stored representation of a container value
#[derive(Debug, Clone)]
pub enum Encoding {
    /// Serialized bytes, readable by anyone with the type
    Plain(Format),

    /// A codec token (compressed, encrypted, Base58) of the serialized value
    Sealed { codec: Codec, format: Format },
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Plain(Format::default())
    }
}

impl Encoding {
    pub fn format(&self) -> Format {
        match self {
            Encoding::Plain(format) => *format,
            Encoding::Sealed { format, .. } => *format,
        }
    }

    /// Same encoding with a different serialization format
    pub(crate) fn with_format(self, format: Format) -> Self {
        match self {
            Encoding::Plain(_) => Encoding::Plain(format),
            Encoding::Sealed { codec, .. } => Encoding::Sealed { codec, format },
        }
    }

    pub(crate) fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Encoding::Plain(format) => Ok(format.serialize(value)?),
            Encoding::Sealed { codec, format } => {
                Ok(codec.encode_struct(value, *format)?.into_bytes())
            }
        }
    }

    pub(crate) fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Encoding::Plain(format) => Ok(format.deserialize(bytes)?),
            Encoding::Sealed { codec, format } => {
                let token = String::from_utf8_lossy(bytes);
                Ok(codec.decode_struct(&token, *format)?)
            }
        }
    }
}

//! Compression stage (zstd)

use crate::error::CodecError;

/// Default zstd level; favours speed over ratio
pub const DEFAULT_LEVEL: i32 = 3;

/// Compress bytes with zstd
pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
    zstd::stream::encode_all(data, level).map_err(CodecError::Compress)
}

/// Decompress a zstd frame
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    zstd::stream::decode_all(data).map_err(CodecError::Decompress)
}

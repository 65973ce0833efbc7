//! Tests for Codec
//!
//! These tests verify:
//! - Byte and struct round-trips for both formats
//! - Tokens use only the Base58 alphabet
//! - Each decode stage reports its own error
//! - Format mismatches are rejected

use persistkv::codec::{Aes256GcmCipher, Cipher};
use persistkv::error::Stage;
use persistkv::{Codec, CodecError, Format};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Helper Functions
// =============================================================================

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn test_codec() -> Codec {
    Codec::with_passphrase("codec-tests")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Token {
    subject: String,
    scopes: Vec<String>,
    expires_at: i64,
    admin: bool,
}

fn sample_token() -> Token {
    Token {
        subject: "user-42".to_string(),
        scopes: vec!["read".to_string(), "write".to_string()],
        expires_at: 1_700_000_000,
        admin: false,
    }
}

// =============================================================================
// Round-trip Tests
// =============================================================================

#[test]
fn test_codec_bytes_roundtrip() {
    let codec = test_codec();

    let token = codec.encode(b"hello world").unwrap();

    assert_eq!(codec.decode(&token).unwrap(), b"hello world");
}

#[test]
fn test_codec_empty_payload() {
    let codec = test_codec();

    let token = codec.encode(b"").unwrap();

    assert!(!token.is_empty());
    assert_eq!(codec.decode(&token).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_codec_token_alphabet() {
    let codec = test_codec();

    let token = codec.encode(&[0u8; 256]).unwrap();

    assert!(token.chars().all(|c| BASE58_ALPHABET.contains(c)));
    for forbidden in ['0', 'O', 'I', 'l', '+', '/', '='] {
        assert!(!token.contains(forbidden));
    }
}

#[test]
fn test_codec_struct_roundtrip_both_formats() {
    let codec = test_codec();

    for format in [Format::Bincode, Format::MessagePack] {
        let token = codec.encode_struct(&sample_token(), format).unwrap();
        let decoded: Token = codec.decode_struct(&token, format).unwrap();
        assert_eq!(decoded, sample_token(), "format {}", format.name());
    }
}

#[test]
fn test_codec_same_passphrase_decodes() {
    let token = Codec::with_passphrase("shared").encode(b"payload").unwrap();

    let other = Codec::with_passphrase("shared");
    assert_eq!(other.decode(&token).unwrap(), b"payload");
}

#[test]
fn test_codec_compression_level_is_transparent() {
    let fast = Codec::new(Aes256GcmCipher::new([7u8; 32])).compression_level(1);
    let small = Codec::new(Aes256GcmCipher::new([7u8; 32])).compression_level(19);

    let payload = vec![b'a'; 4096];
    let token = small.encode(&payload).unwrap();

    assert_eq!(fast.decode(&token).unwrap(), payload);
    assert_eq!(fast.cipher_name(), "aes-256-gcm");
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_codec_format_mismatch() {
    let codec = test_codec();

    let token = codec.encode_struct(&sample_token(), Format::Bincode).unwrap();
    let err = codec
        .decode_struct::<Token>(&token, Format::MessagePack)
        .unwrap_err();

    assert!(matches!(
        err,
        CodecError::FormatMismatch {
            expected: "messagepack",
            found: "bincode"
        }
    ));
    assert_eq!(err.stage(), Stage::Deserialize);
}

#[test]
fn test_codec_untagged_bytes_are_not_structs() {
    let codec = test_codec();

    let token = codec.encode(&[0x01, 0x02, 0x03]).unwrap();
    let err = codec
        .decode_struct::<Token>(&token, Format::Bincode)
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Deserialize);
}

#[test]
fn test_codec_invalid_alphabet() {
    let err = test_codec().decode("0OIl+/=").unwrap_err();

    assert!(matches!(err, CodecError::Alphabet(_)));
    assert_eq!(err.stage(), Stage::Alphabet);
}

#[test]
fn test_codec_wrong_key_fails_decrypt() {
    let token = Codec::with_passphrase("one").encode(b"secret").unwrap();

    let err = Codec::with_passphrase("two").decode(&token).unwrap_err();

    assert!(matches!(err, CodecError::Decrypt));
}

#[test]
fn test_codec_corrupted_token_never_decodes() {
    let codec = test_codec();
    let token = codec.encode(b"the quick brown fox").unwrap();

    for position in 0..token.len() {
        let mut chars: Vec<char> = token.chars().collect();
        chars[position] = if chars[position] == '2' { '3' } else { '2' };
        let corrupted: String = chars.into_iter().collect();

        assert!(
            codec.decode(&corrupted).is_err(),
            "corruption at {} decoded",
            position
        );
    }
}

#[test]
fn test_codec_truncated_token_fails() {
    let codec = test_codec();
    let token = codec.encode(b"payload").unwrap();

    assert!(codec.decode(&token[..5]).is_err());
    assert!(matches!(codec.decode(""), Err(CodecError::Decrypt)));
}

#[test]
fn test_codec_decompress_stage_error() {
    // Valid seal around bytes that are not a zstd frame
    let cipher = Aes256GcmCipher::from_passphrase("codec-tests");
    let codec = Codec::new(cipher.clone());
    let sealed = cipher.seal(b"not zstd").unwrap();
    let token = bs58::encode(sealed).into_string();

    let err = codec.decode(&token).unwrap_err();

    assert_eq!(err.stage(), Stage::Decompress);
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn prop_bytes_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let codec = test_codec();
        let token = codec.encode(&payload).unwrap();
        prop_assert_eq!(codec.decode(&token).unwrap(), payload);
    }

    #[test]
    fn prop_struct_roundtrip(
        subject in "[a-z0-9-]{0,32}",
        scopes in proptest::collection::vec("[a-z]{1,8}", 0..5),
        expires_at in any::<i64>(),
        admin in any::<bool>(),
        bincode in any::<bool>(),
    ) {
        let codec = test_codec();
        let format = if bincode { Format::Bincode } else { Format::MessagePack };
        let value = Token { subject, scopes, expires_at, admin };

        let token = codec.encode_struct(&value, format).unwrap();
        let decoded: Token = codec.decode_struct(&token, format).unwrap();
        prop_assert_eq!(decoded, value);
    }
}

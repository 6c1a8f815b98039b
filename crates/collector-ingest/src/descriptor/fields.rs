//! Field decoders shared by the grammars

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::str::FromStr;

use super::error::{DescriptorError, Result};

/// Descriptor timestamps, always UTC
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identities and digests appear unpadded, sometimes padded
const UNPADDED_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|source| DescriptorError::Timestamp {
            value: value.to_string(),
            source,
        })
}

pub fn parse_number<T: FromStr>(keyword: &'static str, value: &str) -> Result<T> {
    value.parse().map_err(|_| DescriptorError::Number {
        keyword,
        value: value.to_string(),
    })
}

pub fn decode_base64(value: &str) -> Result<Vec<u8>> {
    UNPADDED_BASE64
        .decode(value)
        .map_err(|source| DescriptorError::Base64 {
            value: value.to_string(),
            source,
        })
}

/// Map raw bytes to text one byte per character
///
/// Non-ASCII bytes become `?`, so character offsets stay equal to byte
/// offsets in the raw buffer.
pub fn ascii_text(data: &[u8]) -> String {
    data.iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

pub fn malformed(keyword: &'static str, line: &str) -> DescriptorError {
    DescriptorError::MalformedLine {
        keyword,
        line: line.to_string(),
    }
}

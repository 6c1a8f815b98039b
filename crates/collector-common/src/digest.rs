//! Content digests
//!
//! Descriptors are content-addressed by the hex SHA-1 of a byte range, so
//! these helpers hash an in-memory slice.

use sha1::{Digest, Sha1};

/// Lowercase hex SHA-1 of `data`
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// Uppercase hex SHA-1 of `data`
///
/// Votes and hashed relay identities are tagged with uppercase digests.
pub fn sha1_hex_upper(data: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_hex_known_value() {
        assert_eq!(sha1_hex(b"hello world"), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn test_sha1_hex_upper() {
        assert_eq!(sha1_hex_upper(b"hello world"), "2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED");
    }
}

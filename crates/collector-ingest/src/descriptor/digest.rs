//! Signed-range digests over raw descriptor bytes
//!
//! A descriptor's identity is the SHA-1 over the bytes from its leading
//! token through the end of its signature token. Both markers are located in
//! a single forward scan over the raw buffer; a range is only produced when
//! both markers exist and the signature token starts after the leading
//! token.

use collector_common::digest::{sha1_hex, sha1_hex_upper};
use std::ops::Range;

use super::kind::DocumentKind;

/// Offsets recorded by [`scan_markers`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkerOffsets {
    /// First byte of the first leading token
    pub start: Option<usize>,
    /// First byte of the first signature token
    pub signature: Option<usize>,
}

/// Find the first occurrence of both markers in one pass over `data`
pub fn scan_markers(data: &[u8], leading: &[u8], signature: &[u8]) -> MarkerOffsets {
    let mut offsets = MarkerOffsets::default();

    for i in 0..data.len() {
        let rest = &data[i..];
        if offsets.start.is_none() && rest.starts_with(leading) {
            offsets.start = Some(i);
        }
        if offsets.signature.is_none() && rest.starts_with(signature) {
            offsets.signature = Some(i);
        }
        if offsets.start.is_some() && offsets.signature.is_some() {
            break;
        }
    }

    offsets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexCase {
    Lower,
    Upper,
}

/// Computes the content digest of one kind of descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestExtractor {
    leading: &'static str,
    signature: &'static str,
    case: HexCase,
}

impl DigestExtractor {
    pub const fn new(leading: &'static str, signature: &'static str, case: HexCase) -> Self {
        Self {
            leading,
            signature,
            case,
        }
    }

    /// Extractor for a document kind; votes use uppercase hex
    pub fn for_kind(kind: DocumentKind) -> Option<Self> {
        let leading = kind.leading_token()?;
        let signature = kind.signature_token()?;
        let case = match kind {
            DocumentKind::NetworkStatus => HexCase::Upper,
            _ => HexCase::Lower,
        };
        Some(Self::new(leading, signature, case))
    }

    /// Byte range covered by the digest, if both markers are in order
    pub fn signed_range(&self, data: &[u8]) -> Option<Range<usize>> {
        let offsets = scan_markers(data, self.leading.as_bytes(), self.signature.as_bytes());
        match (offsets.start, offsets.signature) {
            (Some(start), Some(signature)) if signature > start => {
                Some(start..signature + self.signature.len())
            },
            _ => None,
        }
    }

    /// Hex digest of the signed range
    pub fn digest(&self, data: &[u8]) -> Option<String> {
        let range = self.signed_range(data)?;
        let signed = &data[range];
        Some(match self.case {
            HexCase::Lower => sha1_hex(signed),
            HexCase::Upper => sha1_hex_upper(signed),
        })
    }
}

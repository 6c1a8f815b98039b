//! Document classification by first line

/// First line of version 3 consensuses and votes
pub const NETWORK_STATUS_V3: &str = "network-status-version 3";

/// Kind of a raw descriptor, decided from its first line alone
///
/// Consensuses and votes share a first line, so both classify as
/// `NetworkStatus`; the parsed document becomes `ParsedDescriptor::Consensus`
/// or `ParsedDescriptor::Vote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// A consensus or a vote; `vote-status` later tells which
    NetworkStatus,
    ServerDescriptor,
    ExtraInfoDescriptor,
    Unrecognized,
}

impl DocumentKind {
    /// Classify a document from its first line (without line terminator)
    pub fn classify(first_line: &str) -> Self {
        if first_line == NETWORK_STATUS_V3 {
            DocumentKind::NetworkStatus
        } else if first_line.starts_with("router ") {
            DocumentKind::ServerDescriptor
        } else if first_line.starts_with("extra-info ") {
            DocumentKind::ExtraInfoDescriptor
        } else {
            DocumentKind::Unrecognized
        }
    }

    /// Token the descriptor digest starts at
    pub fn leading_token(&self) -> Option<&'static str> {
        match self {
            DocumentKind::NetworkStatus => Some("network-status-version "),
            DocumentKind::ServerDescriptor => Some("router "),
            DocumentKind::ExtraInfoDescriptor => Some("extra-info "),
            DocumentKind::Unrecognized => None,
        }
    }

    /// Token whose end closes the digested range
    pub fn signature_token(&self) -> Option<&'static str> {
        match self {
            DocumentKind::NetworkStatus => Some("directory-signature "),
            DocumentKind::ServerDescriptor | DocumentKind::ExtraInfoDescriptor => {
                Some("\nrouter-signature\n")
            },
            DocumentKind::Unrecognized => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(DocumentKind::classify("network-status-version 3"), DocumentKind::NetworkStatus);
        assert_eq!(
            DocumentKind::classify("router moria1 128.31.0.34 9101 0 9131"),
            DocumentKind::ServerDescriptor
        );
        assert_eq!(
            DocumentKind::classify("extra-info moria1 9695DFC35FFEB861329B9F1AB04C46397020CE31"),
            DocumentKind::ExtraInfoDescriptor
        );
    }

    #[test]
    fn test_classify_unrecognized() {
        assert_eq!(DocumentKind::classify("network-status-version 2"), DocumentKind::Unrecognized);
        assert_eq!(DocumentKind::classify("@type bridge-network-status 1.0"), DocumentKind::Unrecognized);
        assert_eq!(DocumentKind::classify("router"), DocumentKind::Unrecognized);
        assert_eq!(DocumentKind::classify(""), DocumentKind::Unrecognized);
    }
}

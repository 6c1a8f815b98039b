//! Relay server descriptor grammar

use super::digest::DigestExtractor;
use super::error::{DescriptorError, Result};
use super::fields::{malformed, parse_number, parse_timestamp};
use super::kind::DocumentKind;
use super::models::{BandwidthTriple, ServerDescriptorRecord};

/// `router <nickname> <address> <orport> <socksport> <dirport>`
const ROUTER_LINE_TOKENS: usize = 6;

/// Parse a server descriptor whose first line is `router_line`
///
/// `lines` yields the remaining lines. A descriptor whose signed range cannot
/// be located has no identity and is rejected.
pub fn parse<'a, 'l>(
    data: &'a [u8],
    router_line: &str,
    lines: impl Iterator<Item = &'l str>,
) -> Result<ServerDescriptorRecord<'a>> {
    let parts: Vec<&str> = router_line.split(' ').collect();
    if parts.len() < ROUTER_LINE_TOKENS {
        return Err(malformed("router", router_line));
    }

    let mut record = ServerDescriptorRecord {
        digest: String::new(),
        nickname: parts[1].to_string(),
        address: parts[2].to_string(),
        or_port: parse_number("router", parts[3])?,
        dir_port: parse_number("router", parts[5])?,
        fingerprint: None,
        bandwidth: None,
        platform: None,
        published: None,
        published_time: None,
        uptime: None,
        extra_info_digest: None,
        raw: data,
    };

    for line in lines {
        if let Some(platform) = line.strip_prefix("platform ") {
            record.platform = Some(platform.to_string());
        } else if let Some(time) = line.strip_prefix("published ") {
            record.published = Some(parse_timestamp(time)?);
            record.published_time = Some(time.to_string());
        } else if let Some(fingerprint) = line
            .strip_prefix("opt fingerprint")
            .or_else(|| line.strip_prefix("fingerprint"))
        {
            record.fingerprint = Some(fingerprint.replace(' ', "").to_lowercase());
        } else if line.starts_with("bandwidth ") {
            record.bandwidth = Some(parse_bandwidth(line)?);
        } else if let Some(rest) = line
            .strip_prefix("opt extra-info-digest ")
            .or_else(|| line.strip_prefix("extra-info-digest "))
        {
            let digest = rest
                .split(' ')
                .next()
                .filter(|digest| !digest.is_empty())
                .ok_or_else(|| malformed("extra-info-digest", line))?;
            record.extra_info_digest = Some(digest.to_lowercase());
        } else if let Some(uptime) = line.strip_prefix("uptime ") {
            record.uptime = Some(parse_number("uptime", uptime)?);
        }
    }

    record.digest = DigestExtractor::for_kind(DocumentKind::ServerDescriptor)
        .and_then(|extractor| extractor.digest(data))
        .ok_or(DescriptorError::MissingLine("router-signature"))?;

    Ok(record)
}

fn parse_bandwidth(line: &str) -> Result<BandwidthTriple> {
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() < 4 {
        return Err(malformed("bandwidth", line));
    }
    Ok(BandwidthTriple {
        average: parse_number("bandwidth", parts[1])?,
        burst: parse_number("bandwidth", parts[2])?,
        observed: parse_number("bandwidth", parts[3])?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use collector_common::digest::sha1_hex;

    const DESCRIPTOR: &str = "router moria1 128.31.0.34 9101 0 9131\n\
        platform Tor 0.2.3.12-alpha on Linux\n\
        opt protocols Link 1 2 Circuit 1\n\
        published 2012-03-01 12:30:05\n\
        opt fingerprint 9695 DFC3 5FFE B861 329B 9F1A B04C 4639 7020 CE31\n\
        uptime 3600\n\
        bandwidth 512000 1024000 412831\n\
        opt extra-info-digest E5B6AC4E9DD32A6E1D2E7A8A3D4A8F5EB6C5A1F0\n\
        router-signature\n\
        -----BEGIN SIGNATURE-----\n\
        abc\n\
        -----END SIGNATURE-----\n";

    fn parse_doc(doc: &str) -> Result<ServerDescriptorRecord<'_>> {
        let mut lines = doc.lines();
        let first = lines.next().unwrap();
        parse(doc.as_bytes(), first, lines)
    }

    #[test]
    fn test_parse_fields() {
        let record = parse_doc(DESCRIPTOR).unwrap();
        assert_eq!(record.nickname, "moria1");
        assert_eq!(record.address, "128.31.0.34");
        assert_eq!(record.or_port, 9101);
        assert_eq!(record.dir_port, 9131);
        assert_eq!(record.platform.as_deref(), Some("Tor 0.2.3.12-alpha on Linux"));
        assert_eq!(
            record.fingerprint.as_deref(),
            Some("9695dfc35ffeb861329b9f1ab04c46397020ce31")
        );
        assert_eq!(record.uptime, Some(3600));
        assert_eq!(
            record.bandwidth,
            Some(BandwidthTriple {
                average: 512_000,
                burst: 1_024_000,
                observed: 412_831
            })
        );
        assert_eq!(
            record.extra_info_digest.as_deref(),
            Some("e5b6ac4e9dd32a6e1d2e7a8a3d4a8f5eb6c5a1f0")
        );
        assert_eq!(record.published_time.as_deref(), Some("2012-03-01 12:30:05"));
    }

    #[test]
    fn test_digest_covers_signed_section() {
        let record = parse_doc(DESCRIPTOR).unwrap();
        let end = DESCRIPTOR.find("\nrouter-signature\n").unwrap() + "\nrouter-signature\n".len();
        assert_eq!(record.digest, sha1_hex(&DESCRIPTOR.as_bytes()[..end]));
    }

    #[test]
    fn test_missing_signature_is_rejected() {
        let doc = "router moria1 128.31.0.34 9101 0 9131\nbandwidth 1 2 3\n";
        assert!(matches!(
            parse_doc(doc),
            Err(DescriptorError::MissingLine("router-signature"))
        ));
    }

    #[test]
    fn test_bad_published_aborts() {
        let doc = "router moria1 128.31.0.34 9101 0 9131\npublished yesterday\nrouter-signature\n";
        assert!(matches!(parse_doc(doc), Err(DescriptorError::Timestamp { .. })));
    }

    #[test]
    fn test_short_router_line() {
        let doc = "router moria1 128.31.0.34 9101 0\nrouter-signature\n";
        assert!(matches!(parse_doc(doc), Err(DescriptorError::MalformedLine { .. })));
    }
}

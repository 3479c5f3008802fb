//! Token URI resolution
//!
//! Token URIs written by registrants come in many shapes. Everything is
//! mapped either onto an HTTP URL (content-addressed schemes go through the
//! configured gateways) or onto inline bytes for `data:` URIs.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use cid::Cid;

use crate::config::MetadataSettings;
use crate::error::FetchError;

/// Where a metadata document lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedUri {
    /// Fetch with an HTTP GET
    Http(String),
    /// Already present in the URI itself
    Inline(Vec<u8>),
}

/// Map a token URI onto something fetchable
///
/// | Input                         | Result                               |
/// |-------------------------------|--------------------------------------|
/// | `ipfs://<cid>[/path]`         | `<ipfs_gateway>/ipfs/<cid>[/path]`   |
/// | `ipfs://ipfs/<cid>`           | `<ipfs_gateway>/ipfs/<cid>`          |
/// | `/ipfs/<cid>`                 | `<ipfs_gateway>/ipfs/<cid>`          |
/// | `<cid>[/path]`                | `<ipfs_gateway>/ipfs/<cid>[/path]`   |
/// | `ar://<tx>`                   | `<arweave_gateway>/<tx>`             |
/// | `http(s)://...`               | unchanged                            |
/// | `data:[mime][;base64],<data>` | decoded bytes                        |
pub fn resolve_uri(uri: &str, settings: &MetadataSettings) -> Result<ResolvedUri, FetchError> {
    let uri = uri.trim();
    let ipfs_gateway = settings.ipfs_gateway.trim_end_matches('/');

    if uri.is_empty() {
        return Err(FetchError::UnsupportedUri("empty token URI".to_string()));
    }

    if let Some(rest) = strip_prefix_ignore_case(uri, "data:") {
        return decode_data_uri(rest).map(ResolvedUri::Inline);
    }

    if let Some(rest) = strip_prefix_ignore_case(uri, "ipfs://") {
        let rest = rest.trim_start_matches('/');
        let rest = rest.strip_prefix("ipfs/").unwrap_or(rest);
        if rest.is_empty() {
            return Err(FetchError::UnsupportedUri(uri.to_string()));
        }
        return Ok(ResolvedUri::Http(format!("{}/ipfs/{}", ipfs_gateway, rest)));
    }

    if uri.starts_with("/ipfs/") {
        return Ok(ResolvedUri::Http(format!("{}{}", ipfs_gateway, uri)));
    }

    if let Some(rest) = strip_prefix_ignore_case(uri, "ar://") {
        let arweave = settings.arweave_gateway.trim_end_matches('/');
        return Ok(ResolvedUri::Http(format!("{}/{}", arweave, rest)));
    }

    if strip_prefix_ignore_case(uri, "http://").is_some() || strip_prefix_ignore_case(uri, "https://").is_some() {
        return Ok(ResolvedUri::Http(uri.to_string()));
    }

    let first_segment = uri.split('/').next().unwrap_or_default();
    if Cid::try_from(first_segment).is_ok() {
        return Ok(ResolvedUri::Http(format!("{}/ipfs/{}", ipfs_gateway, uri)));
    }

    Err(FetchError::UnsupportedUri(uri.to_string()))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

// RFC 2397: `data:[<mediatype>][;base64],<data>`
fn decode_data_uri(rest: &str) -> Result<Vec<u8>, FetchError> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::Decode("data URI without payload separator".to_string()))?;

    if header.to_ascii_lowercase().ends_with(";base64") {
        let payload = payload.trim();
        STANDARD
            .decode(payload)
            .or_else(|_| URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')))
            .map_err(|e| FetchError::Decode(format!("invalid base64 in data URI: {}", e)))
    } else {
        Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CID_V0: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
    const CID_V1: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

    fn settings() -> MetadataSettings {
        MetadataSettings {
            ipfs_gateway: "https://gw.example/".to_string(),
            arweave_gateway: "https://ar.example".to_string(),
            timeout_secs: 5,
        }
    }

    fn http(uri: &str) -> String {
        match resolve_uri(uri, &settings()).unwrap() {
            ResolvedUri::Http(url) => url,
            other => panic!("expected HTTP, got {:?}", other),
        }
    }

    #[test]
    fn test_ipfs_variants() {
        let expected = format!("https://gw.example/ipfs/{}", CID_V1);
        assert_eq!(http(&format!("ipfs://{}", CID_V1)), expected);
        assert_eq!(http(&format!("ipfs://ipfs/{}", CID_V1)), expected);
        assert_eq!(http(&format!("/ipfs/{}", CID_V1)), expected);
        assert_eq!(http(CID_V1), expected);
        assert_eq!(
            http(&format!("ipfs://{}/agent.json", CID_V0)),
            format!("https://gw.example/ipfs/{}/agent.json", CID_V0)
        );
    }

    #[test]
    fn test_http_and_arweave() {
        assert_eq!(http("https://agents.example/1.json"), "https://agents.example/1.json");
        assert_eq!(http("ar://abc123"), "https://ar.example/abc123");
    }

    #[test]
    fn test_data_uris() {
        let json = r#"{"name":"Inline"}"#;
        let b64 = format!("data:application/json;base64,{}", STANDARD.encode(json));
        assert_eq!(resolve_uri(&b64, &settings()).unwrap(), ResolvedUri::Inline(json.as_bytes().to_vec()));

        let escaped = "data:application/json,%7B%22name%22%3A%22Inline%22%7D";
        assert_eq!(resolve_uri(escaped, &settings()).unwrap(), ResolvedUri::Inline(json.as_bytes().to_vec()));
    }

    #[test]
    fn test_unsupported() {
        assert!(matches!(resolve_uri("", &settings()), Err(FetchError::UnsupportedUri(_))));
        assert!(matches!(resolve_uri("not-a-cid", &settings()), Err(FetchError::UnsupportedUri(_))));
        assert!(matches!(resolve_uri("ipfs://", &settings()), Err(FetchError::UnsupportedUri(_))));
        assert!(matches!(resolve_uri("data:application/json", &settings()), Err(FetchError::Decode(_))));
    }
}

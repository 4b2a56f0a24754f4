//! Short link identifiers and URL validation
//!
//! The identifier of a link is the 32-bit murmur3 hash (seed 0) of the target
//! URL, written as the hex of its little-endian bytes. The same target always
//! yields the same identifier, which is what makes creation idempotent.

use std::io::Cursor;
use url::Url;

/// Computes the short link identifier of `url`.
pub fn hash_url(url: &str) -> std::io::Result<String> {
    let hash = murmur3::murmur3_32(&mut Cursor::new(url.as_bytes()), 0)?;
    Ok(hash.to_le_bytes().iter().map(|b| format!("{:02x}", b)).collect())
}

/// Accepts absolute `http`/`https` URLs that name a host.
pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_known_identifiers() {
        assert_eq!(hash_url("http://example.com/").unwrap(), "f684a3c4");
        assert_eq!(hash_url("https://www.google.com/").unwrap(), "cac87a2c");
        assert_eq!(hash_url("http://www.unizar.es/").unwrap(), "6bb9db44");
    }

    #[test]
    fn hash_is_deterministic_and_eight_chars() {
        let a = hash_url("https://example.com/some/long/path?x=1").unwrap();
        let b = hash_url("https://example.com/some/long/path?x=1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_ne!(a, hash_url("https://example.com/some/long/path?x=2").unwrap());
    }

    #[test]
    fn empty_input_hashes_to_zero() {
        assert_eq!(hash_url("").unwrap(), "00000000");
    }

    #[test]
    fn validation_accepts_http_and_https_only() {
        assert!(is_valid_url("http://example.com/"));
        assert!(is_valid_url("https://example.com/path?q=1"));
        assert!(!is_valid_url("ftp://example.com/"));
        assert!(!is_valid_url("example.com"));
        assert!(!is_valid_url("http://"));
        assert!(!is_valid_url(""));
    }
}

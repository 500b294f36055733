//! Destination URL normalization and screening.
//!
//! Ensures consistent URL representation by normalizing hostnames, removing
//! fragments, and handling default ports. Destinations that point at private
//! or local infrastructure are rejected outright.

use url::{Host, Url};

/// Maximum accepted length of a destination URL, in characters.
pub const MAX_URL_LEN: usize = 500;

/// Errors that can occur during URL normalization.
#[derive(Debug, thiserror::Error)]
pub enum UrlNormalizationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(String),

    #[error("Only HTTP and HTTPS protocols are allowed")]
    UnsupportedProtocol,

    #[error("URL must be at most {MAX_URL_LEN} characters, got {0}")]
    TooLong(usize),

    #[error("URLs pointing at private or local hosts are not allowed")]
    PrivateHost,

    #[error("Failed to normalize URL: {0}")]
    NormalizationFailed(String),
}

/// Normalizes a destination URL to a canonical form.
///
/// # Normalization Rules
///
/// 1. **Protocol**: Only HTTP and HTTPS are allowed
/// 2. **Hostname**: Converted to lowercase
/// 3. **Default ports**: Removed (80 for HTTP, 443 for HTTPS)
/// 4. **Fragments**: Removed (e.g., `#section`)
/// 5. **Query parameters**: Preserved as-is
/// 6. **Path**: Preserved with case sensitivity
///
/// # Security
///
/// Rejects dangerous protocols like `javascript:`, `data:`, `file:`, and
/// destinations that resolve to private or local hosts (`localhost`,
/// loopback and RFC 1918 addresses, `.local`/`.internal` names).
///
/// # Errors
///
/// Returns [`UrlNormalizationError::InvalidFormat`] for malformed URLs,
/// [`UrlNormalizationError::UnsupportedProtocol`] for non-HTTP(S) schemes,
/// [`UrlNormalizationError::TooLong`] when the input exceeds [`MAX_URL_LEN`],
/// and [`UrlNormalizationError::PrivateHost`] for private/local destinations.
pub fn normalize_url(input: &str) -> Result<String, UrlNormalizationError> {
    let input = input.trim();

    let char_count = input.chars().count();
    if char_count > MAX_URL_LEN {
        return Err(UrlNormalizationError::TooLong(char_count));
    }

    let mut url =
        Url::parse(input).map_err(|e| UrlNormalizationError::InvalidFormat(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(UrlNormalizationError::UnsupportedProtocol),
    }

    match url.host() {
        Some(host) => {
            if is_private_host(&host) {
                return Err(UrlNormalizationError::PrivateHost);
            }
        }
        None => {
            return Err(UrlNormalizationError::InvalidFormat(
                "URL has no host".to_string(),
            ));
        }
    }

    if let Some(host) = url.host_str() {
        let host_lowercase = host.to_ascii_lowercase();
        url.set_host(Some(&host_lowercase)).map_err(|_| {
            UrlNormalizationError::NormalizationFailed("Failed to set normalized host".to_string())
        })?;
    }

    url.set_fragment(None);

    let is_default_port = matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    );
    if is_default_port {
        url.set_port(None).map_err(|_| {
            UrlNormalizationError::NormalizationFailed("Failed to remove default port".to_string())
        })?;
    }

    Ok(url.to_string())
}

/// Builds the key under which a normalized URL competes for uniqueness.
///
/// Comparison is case-insensitive and ignores trailing slashes, so
/// `https://github.com/me` and `https://github.com/me/` collide.
pub fn dedup_key(normalized_url: &str) -> String {
    normalized_url
        .to_lowercase()
        .trim_end_matches('/')
        .to_string()
}

fn is_private_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
        }
        Host::Ipv4(addr) => {
            addr.is_loopback()
                || addr.is_private()
                || addr.is_link_local()
                || addr.is_unspecified()
        }
        Host::Ipv6(addr) => {
            let segments = addr.segments();
            addr.is_loopback()
                || addr.is_unspecified()
                // Unique-local fc00::/7
                || (segments[0] & 0xfe00) == 0xfc00
                // Link-local fe80::/10
                || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

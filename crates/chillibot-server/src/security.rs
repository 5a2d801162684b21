//! Security utilities for the ChilliBot server
//!
//! Webhook signature verification and model source URL validation.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::IpAddr;
use subtle::ConstantTimeEq;
use thiserror::Error;
use url::Url;

/// Header LINE puts the webhook signature in
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Security-related errors
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Signature is not valid base64")]
    MalformedSignature,

    #[error("Signature does not match request body")]
    SignatureMismatch,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("URL scheme '{0}' is not allowed, only HTTPS is permitted")]
    InvalidScheme(String),

    #[error("Host '{0}' is blocked: internal/private IP addresses are not allowed")]
    BlockedHost(String),

    #[error("URL must have a host")]
    MissingHost,
}

/// Verify a LINE webhook signature
///
/// The signature is `base64(HMAC-SHA256(channel_secret, body))`, computed
/// over the raw request bytes. Comparison is constant-time.
pub fn verify_line_signature(
    channel_secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), SecurityError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SecurityError::MissingSignature)?;

    let provided = base64::engine::general_purpose::STANDARD
        .decode(signature)
        .map_err(|_| SecurityError::MalformedSignature)?;

    let expected = compute_signature(channel_secret, body)?;

    if expected.len() == provided.len() && bool::from(expected.ct_eq(&provided)) {
        Ok(())
    } else {
        Err(SecurityError::SignatureMismatch)
    }
}

/// Raw HMAC-SHA256 of `body` keyed with the channel secret
fn compute_signature(channel_secret: &str, body: &[u8]) -> Result<Vec<u8>, SecurityError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(channel_secret.as_bytes())
        .map_err(|_| SecurityError::SignatureMismatch)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Base64 signature for `body`, as LINE would send it
pub fn sign_body(channel_secret: &str, body: &[u8]) -> Result<String, SecurityError> {
    Ok(base64::engine::general_purpose::STANDARD.encode(compute_signature(channel_secret, body)?))
}

/// Blocked hostnames that should never serve model weights
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
    // Cloud metadata services
    "metadata.google.internal",
    "metadata.goog",
    "169.254.169.254",
    "fd00:ec2::254",
];

/// Configuration for URL validation
#[derive(Debug, Clone, Default)]
pub struct UrlValidationConfig {
    /// Allow HTTP scheme
    pub allow_http: bool,
    /// Allow localhost/loopback addresses
    pub allow_localhost: bool,
    /// Allow private/internal IP ranges (RFC 1918, etc.)
    pub allow_private_ips: bool,
    /// If set, only these domains (and their subdomains) are permitted
    pub allowed_domains: Option<Vec<String>>,
}

impl UrlValidationConfig {
    /// Development configuration that allows plain HTTP and local hosts
    pub fn development() -> Self {
        Self {
            allow_http: true,
            allow_localhost: true,
            allow_private_ips: true,
            allowed_domains: None,
        }
    }
}

/// Validate a model download URL
///
/// Checks the scheme, rejects loopback, private, link-local and metadata
/// hosts, and applies the optional domain allowlist.
pub fn validate_model_url(url_str: &str, config: &UrlValidationConfig) -> Result<Url, SecurityError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "https" => {}
        "http" if config.allow_http => {}
        scheme => return Err(SecurityError::InvalidScheme(scheme.to_string())),
    }

    let host = url.host_str().ok_or(SecurityError::MissingHost)?;
    let host_lower = host.trim_start_matches('[').trim_end_matches(']').to_lowercase();

    if !config.allow_localhost
        && BLOCKED_HOSTNAMES
            .iter()
            .any(|blocked| host_lower == *blocked || host_lower.ends_with(&format!(".{}", blocked)))
    {
        return Err(SecurityError::BlockedHost(host.to_string()));
    }

    if let Ok(ip) = host_lower.parse::<IpAddr>() {
        if !config.allow_localhost && ip.is_loopback() {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }
        if !config.allow_private_ips && is_private_ip(&ip) {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }
        if is_link_local(&ip) {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }
    }

    if let Some(ref allowed) = config.allowed_domains {
        let is_allowed = allowed.iter().any(|domain| {
            let domain_lower = domain.to_lowercase();
            host_lower == domain_lower || host_lower.ends_with(&format!(".{}", domain_lower))
        });
        if !is_allowed {
            return Err(SecurityError::BlockedHost(format!(
                "{} is not in the allowed domains list",
                host
            )));
        }
    }

    Ok(url)
}

/// RFC 1918, carrier-grade NAT, 0.0.0.0/8 and IPv6 unique local
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_private() || (octets[0] == 100 && (octets[1] & 0xC0) == 64) || octets[0] == 0
        }
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

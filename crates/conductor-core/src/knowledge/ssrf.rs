//! SSRF guard (C1): scheme/host allow-deny checks before any outbound fetch.
//!
//! Grounded in the SSRF module of the pack's web-scraping crate (private/
//! loopback/link-local/metadata range classification over both IPv4 and
//! IPv6, `*.`-wildcard allowlist matching); re-expressed in this crate's
//! `thiserror`/`tracing` idiom rather than that crate's plain-String errors.

use crate::error::SsrfError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use tracing::warn;
use url::Url;

/// Query parameters stripped unconditionally (prototype-pollution vectors, §4.5).
const DENYLISTED_PARAMS: &[&str] = &["__proto__", "constructor", "prototype"];

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_link_local()
        || ip.is_private()
        || ip.is_broadcast()
        || ip.is_unspecified()
        // 169.254.0.0/16 is covered by is_link_local, restated for clarity with the spec table.
        || ip.octets()[0] == 169 && ip.octets()[1] == 254
}

fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let seg0 = ip.segments()[0];
    // fc00::/7 (unique local) and fe80::/10 (link-local).
    (seg0 & 0xfe00) == 0xfc00 || (seg0 & 0xffc0) == 0xfe80
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

/// An unset allowlist means "no allowlist configured": the range/DNS checks
/// in [`resolve_and_check`] are the only gate. A configured allowlist is
/// enforced strictly, matching "if a host allowlist is configured, the URL
/// must match it" (§4.5).
fn host_matches_allowlist(host: &str, allowed_hosts: &[String]) -> bool {
    if allowed_hosts.is_empty() {
        return true;
    }
    allowed_hosts.iter().any(|pattern| {
        if let Some(suffix) = pattern.strip_prefix("*.") {
            host == suffix || host.ends_with(&format!(".{suffix}"))
        } else {
            host.eq_ignore_ascii_case(pattern)
        }
    })
}

/// Resolves `host` and rejects it if any resolved address falls in a blocked range.
/// DNS resolution is the one suspension point in this guard (§5).
fn resolve_and_check(host: &str) -> Result<(), SsrfError> {
    if host.eq_ignore_ascii_case("localhost") || host == "0.0.0.0" {
        return Err(SsrfError::BlockedHost(host.to_string()));
    }
    // A bare IP literal in the host position; classify directly without DNS.
    if let Ok(ip) = host.parse::<IpAddr>() {
        return if is_blocked_ip(ip) {
            Err(SsrfError::BlockedHost(host.to_string()))
        } else {
            Ok(())
        };
    }
    let lookup = format!("{host}:0");
    let resolved = lookup
        .to_socket_addrs()
        .map_err(|e| SsrfError::Malformed(format!("dns resolution failed for '{host}': {e}")))?;
    for addr in resolved {
        if is_blocked_ip(addr.ip()) {
            return Err(SsrfError::BlockedHost(host.to_string()));
        }
    }
    Ok(())
}

/// Validates and sanitizes `raw_url`, returning the sanitized absolute URL or
/// an `SsrfError` describing the rejection (§4.5 C1). `allowed_hosts` is the
/// `ALLOWED_HOSTS` configuration; an empty allowlist means none is
/// configured, so every host passes this gate and falls through to the
/// private/loopback/link-local/metadata range checks in
/// [`resolve_and_check`], which always apply regardless of the allowlist.
pub fn sanitize_url(raw_url: &str, allowed_hosts: &[String]) -> Result<String, SsrfError> {
    let mut url = Url::parse(raw_url).map_err(|e| SsrfError::Malformed(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SsrfError::UnsupportedScheme(url.scheme().to_string()));
    }
    let host = url.host_str().ok_or(SsrfError::MissingHost)?.to_string();

    if !host_matches_allowlist(&host, allowed_hosts) {
        warn!(target: "conductor::knowledge::ssrf", %host, "host not in allowlist");
        return Err(SsrfError::NotAllowlisted(host));
    }
    resolve_and_check(&host)?;

    let stripped: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !DENYLISTED_PARAMS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if stripped.len() != url.query_pairs().count() {
        url.query_pairs_mut().clear().extend_pairs(&stripped);
    }

    Ok(url.to_string())
}

/// `sanitize(sanitize(u)) == sanitize(u)` for any `u` that first succeeds (§8 closure law).
pub fn sanitize_is_idempotent(raw_url: &str, allowed_hosts: &[String]) -> bool {
    match sanitize_url(raw_url, allowed_hosts) {
        Ok(first) => sanitize_url(&first, allowed_hosts).as_deref() == Ok(first.as_str()),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        let allowed = vec!["example.com".to_string()];
        assert!(matches!(
            sanitize_url("ftp://example.com/x", &allowed),
            Err(SsrfError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_cloud_metadata_ip() {
        let allowed = vec!["169.254.169.254".to_string()];
        assert!(matches!(
            sanitize_url("http://169.254.169.254/meta", &allowed),
            Err(SsrfError::BlockedHost(_))
        ));
    }

    #[test]
    fn rejects_localhost_literal() {
        let allowed = vec!["localhost".to_string()];
        assert!(matches!(
            sanitize_url("http://localhost/x", &allowed),
            Err(SsrfError::BlockedHost(_))
        ));
    }

    #[test]
    fn empty_allowlist_does_not_reject_arbitrary_public_host() {
        // No ALLOWED_HOSTS configured: the gate is a no-op, range checks still run.
        let result = sanitize_url("https://example.com/x", &[]);
        assert!(!matches!(result, Err(SsrfError::NotAllowlisted(_))));
    }

    #[test]
    fn empty_allowlist_still_blocks_metadata_ip() {
        let result = sanitize_url("http://169.254.169.254/meta", &[]);
        assert!(matches!(result, Err(SsrfError::BlockedHost(_))));
    }

    #[test]
    fn rejects_host_not_in_allowlist() {
        let allowed = vec!["trusted.example.com".to_string()];
        assert!(matches!(
            sanitize_url("https://evil.example.org/x", &allowed),
            Err(SsrfError::NotAllowlisted(_))
        ));
    }

    #[test]
    fn wildcard_allowlist_matches_subdomain() {
        let allowed = vec!["*.trusted.org".to_string()];
        // api.trusted.org does not resolve in a sandboxed test environment, so
        // we only assert the allowlist gate passes before DNS is attempted by
        // checking the failure mode is not NotAllowlisted.
        let result = sanitize_url("https://api.trusted.org/v1", &allowed);
        assert!(!matches!(result, Err(SsrfError::NotAllowlisted(_))));
    }

    #[test]
    fn strips_denylisted_query_params() {
        let allowed = vec!["127.0.0.1".to_string()];
        // 127.0.0.1 is itself blocked, so this exercises the allowlist+scheme
        // path while letting BlockedHost short-circuit before DNS.
        let result = sanitize_url("http://127.0.0.1/x?__proto__=1&ok=1", &allowed);
        assert!(matches!(result, Err(SsrfError::BlockedHost(_))));
    }
}

//! Client IP extraction from HTTP headers with trust validation
//!
//! Forwarding headers are only honoured in the proxy mode that expects them.
//! `X-Forwarded-For` is walked from the right so entries appended by trusted
//! proxies are skipped and the first untrusted hop is taken as the client.

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{AnalyticsConfig, TrustedProxyMode};

/// Extract the client IP address from HTTP headers, falling back to the
/// socket peer address when the headers cannot be trusted.
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => {
            extract_standard_ip(headers, socket_addr, config).unwrap_or(socket_addr)
        }
        TrustedProxyMode::None => socket_addr,
    }
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

fn extract_standard_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> Option<IpAddr> {
    // the peer itself must be a proxy we trust before any header is believed
    if !config.trusted_proxies.is_empty() && !is_trusted(socket_addr, config) {
        return None;
    }

    let chain = forwarded_chain(headers).or_else(|| x_forwarded_for_chain(headers))?;
    pick_client(&chain, config)
}

fn is_trusted(ip: IpAddr, config: &AnalyticsConfig) -> bool {
    config.trusted_proxies.iter().any(|net| net.contains(&ip))
}

/// Choose the client from a hop chain ordered client-first
fn pick_client(chain: &[IpAddr], config: &AnalyticsConfig) -> Option<IpAddr> {
    if let Some(num_trusted) = config.num_trusted_proxies {
        // the socket peer is the last proxy, so it counts as one hop
        let skip = num_trusted.saturating_sub(1);
        return if chain.len() > skip {
            chain.get(chain.len() - skip - 1).copied()
        } else {
            chain.first().copied()
        };
    }

    if !config.trusted_proxies.is_empty() {
        return chain
            .iter()
            .rev()
            .find(|ip| !is_trusted(**ip, config))
            .or_else(|| chain.first())
            .copied();
    }

    chain.last().copied()
}

/// `for=` values of an RFC 7239 `Forwarded` header
fn forwarded_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    let chain: Vec<IpAddr> = forwarded
        .split(',')
        .filter_map(|element| {
            element
                .split(';')
                .map(str::trim)
                .find_map(|param| {
                    let (name, value) = param.split_once('=')?;
                    name.eq_ignore_ascii_case("for").then_some(value)
                })
                .and_then(parse_forwarded_node)
        })
        .collect();

    (!chain.is_empty()).then_some(chain)
}

/// Accepts `1.2.3.4`, `1.2.3.4:80`, `"[2001:db8::1]:443"` and bare IPv6
fn parse_forwarded_node(value: &str) -> Option<IpAddr> {
    let value = value.trim().trim_matches('"');

    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }
    value.rsplit_once(':')?.0.parse().ok()
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let chain: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    (!chain.is_empty()).then_some(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn create_config(mode: TrustedProxyMode) -> AnalyticsConfig {
        AnalyticsConfig {
            trusted_proxy_mode: mode,
            ..Default::default()
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_extract_client_ip_none_mode_ignores_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::None);

        let result = extract_client_ip(&headers, ip("192.168.1.1"), &config);
        assert_eq!(result, ip("192.168.1.1"));
    }

    #[test]
    fn test_extract_cloudflare_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::Cloudflare);

        let result = extract_client_ip(&headers, ip("192.168.1.1"), &config);
        assert_eq!(result, ip("203.0.113.1"));
    }

    #[test]
    fn test_cloudflare_without_header_uses_socket() {
        let config = create_config(TrustedProxyMode::Cloudflare);
        let result = extract_client_ip(&HeaderMap::new(), ip("192.168.1.1"), &config);
        assert_eq!(result, ip("192.168.1.1"));
    }

    #[test]
    fn test_extract_x_forwarded_for_rightmost_without_trust_list() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1"),
        );
        let config = create_config(TrustedProxyMode::Standard);

        let result = extract_client_ip(&headers, ip("192.168.1.1"), &config);
        assert_eq!(result, ip("198.51.100.1"));
    }

    #[test]
    fn test_x_forwarded_for_skips_trusted_cidrs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.9, 203.0.113.1, 10.0.0.5"),
        );
        let config = AnalyticsConfig {
            trusted_proxy_mode: TrustedProxyMode::Standard,
            trusted_proxies: vec!["10.0.0.0/8".parse().unwrap()],
            ..Default::default()
        };

        let result = extract_client_ip(&headers, ip("10.0.0.1"), &config);
        assert_eq!(result, ip("203.0.113.1"));
    }

    #[test]
    fn test_untrusted_peer_headers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let config = AnalyticsConfig {
            trusted_proxy_mode: TrustedProxyMode::Standard,
            trusted_proxies: vec!["10.0.0.0/8".parse().unwrap()],
            ..Default::default()
        };

        let result = extract_client_ip(&headers, ip("198.51.100.200"), &config);
        assert_eq!(result, ip("198.51.100.200"));
    }

    #[test]
    fn test_num_trusted_proxies_counts_from_the_right() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.1.1.1, 203.0.113.1, 10.0.0.2"),
        );
        let config = AnalyticsConfig {
            trusted_proxy_mode: TrustedProxyMode::Standard,
            num_trusted_proxies: Some(2),
            ..Default::default()
        };

        let result = extract_client_ip(&headers, ip("10.0.0.1"), &config);
        assert_eq!(result, ip("203.0.113.1"));
    }

    #[test]
    fn test_forwarded_header_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "forwarded",
            HeaderValue::from_static("for=\"[2001:db8::7]:4711\";proto=https, for=192.0.2.60:8080"),
        );
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::Standard);

        let result = extract_client_ip(&headers, ip("10.0.0.1"), &config);
        assert_eq!(result, ip("192.0.2.60"));
    }

    #[test]
    fn test_parse_forwarded_node_forms() {
        assert_eq!(parse_forwarded_node("192.0.2.60"), Some(ip("192.0.2.60")));
        assert_eq!(parse_forwarded_node("\"[2001:db8::1]:443\""), Some(ip("2001:db8::1")));
        assert_eq!(parse_forwarded_node("2001:db8::1"), Some(ip("2001:db8::1")));
        assert_eq!(parse_forwarded_node("unknown"), None);
    }
}

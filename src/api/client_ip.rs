use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Proxy headers consulted for the caller address, in priority order
const CLIENT_IP_HEADERS: [&str; 5] = [
    "x-forwarded-for",
    "cf-connecting-ip",
    "fastly-client-ip",
    "true-client-ip",
    "x-real-ip",
];

const UNKNOWN: &str = "unknown";

fn is_loopback(ip: &str) -> bool {
    ip == "127.0.0.1" || ip == "::1"
}

fn strip_mapped_prefix(ip: &str) -> &str {
    ip.strip_prefix("::ffff:").unwrap_or(ip)
}

fn header_ip(headers: &HeaderMap) -> Option<String> {
    CLIENT_IP_HEADERS.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        // x-forwarded-for is "client, proxy1, proxy2"
        let first = value.split(',').next()?.trim();
        (!first.is_empty()).then(|| first.to_string())
    })
}

/// Derive the caller identity used as the one-allocation-per-caller key.
///
/// Proxy headers win; a loopback value falls back to the socket peer, and a
/// still-loopback or missing value falls back to `server_ip`, else `"unknown"`.
/// Headers are client-controlled, so this is not an authentication boundary.
pub fn resolve_caller(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    server_ip: Option<&str>,
) -> String {
    let mut ip = header_ip(headers).unwrap_or_else(|| UNKNOWN.to_string());
    ip = strip_mapped_prefix(&ip).to_string();

    if is_loopback(&ip) || ip == UNKNOWN {
        if let Some(peer) = peer {
            ip = strip_mapped_prefix(&peer.ip().to_string()).to_string();
        }
    }

    if is_loopback(&ip) || ip == UNKNOWN {
        ip = server_ip.unwrap_or(UNKNOWN).to_string();
    }

    ip
}

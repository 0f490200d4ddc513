//! Domain-name validity check used by the rating endpoint.
//!
//! Mirrors the reference's `getaddrinfo` call: this is a genuine DNS
//! resolution attempt, not a syntactic check. A domain that doesn't resolve
//! is rejected with `invalid domain` regardless of how plausible its shape.

use tokio::net::lookup_host;

/// Resolve `domain` (A/AAAA) and report whether resolution succeeded.
pub async fn resolves(domain: &str) -> bool {
    // Port 0 is a placeholder; lookup_host only needs a resolvable host.
    lookup_host((domain, 0u16)).await.is_ok_and(|mut addrs| addrs.next().is_some())
}

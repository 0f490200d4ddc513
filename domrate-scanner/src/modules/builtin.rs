//! The 18 builtin data-source modules (§4.6, GLOSSARY).
//!
//! None of these make real network calls. Each derives a deterministic,
//! domain-shaped payload from `blake3::hash(domain.as_bytes())` so repeated
//! runs against the same domain are reproducible and so the scheduler's
//! concurrency and retry behavior can be exercised without flakiness from a
//! real DNS resolver, WHOIS server, or search API sitting on the other end.
//! All 18 always succeed; module failure for scheduler testing is injected
//! with fake modules in `super::tests`, not here.

use super::{Module, QueryKind};
use domrate_common::errors::ModuleError;
use domrate_common::persistence::Persistence;
use serde_json::json;
use std::sync::Arc;

/// Stable per-(module, domain) digest, sliced into small integers for
/// payload fields that read like plausible measurements.
fn digest(module: &str, domain: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(module.as_bytes());
    hasher.update(b":");
    hasher.update(domain.as_bytes());
    hasher.finalize()
}

fn digest_u32(module: &str, domain: &str, salt: u8) -> u32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(module.as_bytes());
    hasher.update(&[salt]);
    hasher.update(domain.as_bytes());
    let bytes = hasher.finalize();
    u32::from_le_bytes(bytes.as_bytes()[0..4].try_into().unwrap())
}

fn record(
    persistence: &dyn Persistence,
    request_id: u64,
    module: &str,
    payload: serde_json::Value,
) -> Result<(), ModuleError> {
    persistence
        .insert_module_record(request_id, module, payload)
        .map_err(|e| ModuleError::permanent(format!("persistence write failed: {e}")))
}

macro_rules! leaf_module {
    ($struct_name:ident, $name:literal, $version:literal, $payload:expr) => {
        pub struct $struct_name;

        impl Module for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }
            fn version(&self) -> u64 {
                $version
            }
            fn dependencies(&self) -> &'static [&'static str] {
                &[]
            }
            fn queries(&self, kind: QueryKind) -> Vec<String> {
                default_queries($name, kind)
            }
            fn run(
                &self,
                persistence: &dyn Persistence,
                request_id: u64,
                domain: &str,
                _attempt: u32,
            ) -> Result<(), ModuleError> {
                let payload = $payload(domain);
                record(persistence, request_id, $name, payload)
            }
        }
    };
}

macro_rules! dependent_module {
    ($struct_name:ident, $name:literal, $version:literal, $deps:expr, $payload:expr) => {
        pub struct $struct_name;

        impl Module for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }
            fn version(&self) -> u64 {
                $version
            }
            fn dependencies(&self) -> &'static [&'static str] {
                $deps
            }
            fn queries(&self, kind: QueryKind) -> Vec<String> {
                default_queries($name, kind)
            }
            fn run(
                &self,
                persistence: &dyn Persistence,
                request_id: u64,
                domain: &str,
                _attempt: u32,
            ) -> Result<(), ModuleError> {
                let payload = $payload(domain);
                record(persistence, request_id, $name, payload)
            }
        }
    };
}

fn default_queries(name: &'static str, kind: QueryKind) -> Vec<String> {
    match kind {
        QueryKind::Create => vec![format!(
            "CREATE TABLE IF NOT EXISTS module_{} (request_id INTEGER, payload JSON)",
            name.to_ascii_lowercase()
        )],
        QueryKind::Insert => vec![format!(
            "INSERT INTO module_{} (request_id, payload) VALUES (?, ?)",
            name.to_ascii_lowercase()
        )],
        QueryKind::Select => vec![format!(
            "SELECT payload FROM module_{} WHERE request_id = ?",
            name.to_ascii_lowercase()
        )],
    }
}

// --- Root modules: no dependencies -----------------------------------------

leaf_module!(DnsResolver, "DNSResolver", 1, |domain: &str| {
    let d = digest("DNSResolver", domain);
    json!({
        "resolved": true,
        "ip": format!(
            "{}.{}.{}.{}",
            d.as_bytes()[0], d.as_bytes()[1], d.as_bytes()[2], d.as_bytes()[3]
        ),
        "ttl_seconds": 300 + (digest_u32("DNSResolver", domain, 1) % 3600),
    })
});

leaf_module!(SpellChecker, "SpellChecker", 1, |domain: &str| {
    let misspelled = digest_u32("SpellChecker", domain, 0) % 100 < 5;
    json!({ "likely_misspelled": misspelled })
});

// --- Depend on DNSResolver --------------------------------------------------

dependent_module!(Whois, "Whois", 1, &["DNSResolver"], |domain: &str| {
    let registrar_id = digest_u32("Whois", domain, 0) % 50;
    json!({
        "registrar": format!("Registrar-{registrar_id:02}"),
        "registered_days_ago": 30 + (digest_u32("Whois", domain, 1) % 7300),
    })
});

dependent_module!(Asn, "ASN", 1, &["DNSResolver"], |domain: &str| {
    let asn = 1000 + (digest_u32("ASN", domain, 0) % 64000);
    json!({ "asn": asn, "org": format!("AS{asn} Networks") })
});

dependent_module!(MxToolbox, "MXToolbox", 1, &["DNSResolver"], |domain: &str| {
    let mx_count = 1 + (digest_u32("MXToolbox", domain, 0) % 4);
    json!({ "mx_record_count": mx_count, "blacklisted": digest_u32("MXToolbox", domain, 1) % 100 < 2 })
});

dependent_module!(Nmap, "Nmap", 1, &["DNSResolver"], |domain: &str| {
    let open_ports: Vec<u16> = [80u16, 443, 22, 25, 3306]
        .into_iter()
        .filter(|p| digest_u32("Nmap", domain, *p as u8) % 2 == 0)
        .collect();
    json!({ "open_ports": open_ports })
});

dependent_module!(CertCheck, "CertCheck", 1, &["DNSResolver"], |domain: &str| {
    let valid = digest_u32("CertCheck", domain, 0) % 100 >= 3;
    json!({ "tls_certificate_valid": valid, "days_until_expiry": 1 + (digest_u32("CertCheck", domain, 1) % 365) })
});

dependent_module!(RobotsTxt, "RobotsTxt", 1, &["DNSResolver"], |domain: &str| {
    let present = digest_u32("RobotsTxt", domain, 0) % 100 < 80;
    json!({ "robots_txt_present": present, "disallow_all": present && digest_u32("RobotsTxt", domain, 1) % 100 < 5 })
});

dependent_module!(GoogleSearch, "GoogleSearch", 1, &["DNSResolver"], |domain: &str| {
    let indexed_pages = digest_u32("GoogleSearch", domain, 0) % 5000;
    json!({ "indexed_pages": indexed_pages })
});

dependent_module!(
    GoogleSafeBrowsing,
    "GoogleSafeBrowsing",
    1,
    &["DNSResolver"],
    |domain: &str| {
        let flagged = digest_u32("GoogleSafeBrowsing", domain, 0) % 100 < 4;
        json!({ "flagged": flagged })
    }
);

dependent_module!(VirusTotal, "VirusTotal", 1, &["DNSResolver"], |domain: &str| {
    let detections = digest_u32("VirusTotal", domain, 0) % 70;
    json!({ "engines_flagging": detections, "engines_total": 70 })
});

dependent_module!(Wot, "WOT", 1, &["DNSResolver"], |domain: &str| {
    let trust_score = digest_u32("WOT", domain, 0) % 101;
    json!({ "trust_score": trust_score })
});

// --- Depend on ASN -----------------------------------------------------------

dependent_module!(GeoIp, "GeoIP", 1, &["ASN"], |domain: &str| {
    const COUNTRIES: [&str; 8] = ["US", "DE", "NL", "SG", "JP", "BR", "GB", "FR"];
    let country = COUNTRIES[(digest_u32("GeoIP", domain, 0) as usize) % COUNTRIES.len()];
    json!({ "country": country })
});

dependent_module!(Traceroute, "Traceroute", 1, &["ASN"], |domain: &str| {
    let hops = 3 + (digest_u32("Traceroute", domain, 0) % 20);
    json!({ "hop_count": hops })
});

dependent_module!(IpVoid, "IPVoid", 1, &["ASN"], |domain: &str| {
    let blacklist_hits = digest_u32("IPVoid", domain, 0) % 10;
    json!({ "blacklist_hits": blacklist_hits, "blacklists_checked": 40 })
});

// --- Depend on Whois ----------------------------------------------------------

dependent_module!(DomainAge, "DomainAge", 1, &["Whois"], |domain: &str| {
    let age_days = 1 + (digest_u32("DomainAge", domain, 0) % 10000);
    json!({ "age_days": age_days })
});

// --- Depend on SpellChecker ----------------------------------------------------

dependent_module!(Typo, "Typo", 1, &["SpellChecker"], |domain: &str| {
    let looks_like_typosquat = digest_u32("Typo", domain, 0) % 100 < 6;
    json!({ "looks_like_typosquat": looks_like_typosquat })
});

// --- Depend on GoogleSearch ------------------------------------------------

dependent_module!(GooglePageRank, "GooglePageRank", 1, &["GoogleSearch"], |domain: &str| {
    let rank = digest_u32("GooglePageRank", domain, 0) % 11;
    json!({ "page_rank": rank })
});

/// The full candidate module set, before `norun` exclusion and dependency
/// validation in [`super::ModuleRegistry::new`].
pub fn all() -> Vec<Arc<dyn Module>> {
    vec![
        Arc::new(DnsResolver),
        Arc::new(SpellChecker),
        Arc::new(Whois),
        Arc::new(Asn),
        Arc::new(MxToolbox),
        Arc::new(Nmap),
        Arc::new(CertCheck),
        Arc::new(RobotsTxt),
        Arc::new(GoogleSearch),
        Arc::new(GoogleSafeBrowsing),
        Arc::new(VirusTotal),
        Arc::new(Wot),
        Arc::new(GeoIp),
        Arc::new(Traceroute),
        Arc::new(IpVoid),
        Arc::new(DomainAge),
        Arc::new(Typo),
        Arc::new(GooglePageRank),
    ]
}

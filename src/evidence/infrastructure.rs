//! Infrastructure, geographic and threat-intel correlation
//!
//! Pure scoring over enrichment data. A single repeated source IP is one
//! actor, not coordination, so every score here is 0.0 unless the batch
//! contains at least two distinct sources.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::session::AttackSession;
use crate::tools::types::{AsnInfo, GeoInfo, ThreatIntel};

const ASN_COMPONENT_WEIGHT: f64 = 0.6;
const SUBNET_COMPONENT_WEIGHT: f64 = 0.4;

/// Infrastructure correlation: distinct IPs sharing network ownership
/// and/or close address space. Requires ASN data from enrichment.
pub fn infrastructure_score(
    sessions: &[AttackSession],
    asn_data: &BTreeMap<IpAddr, AsnInfo>,
) -> f64 {
    let sources = unique_sources(sessions);
    if sources.len() < 2 {
        return 0.0;
    }

    let asns: BTreeSet<u32> = sources
        .iter()
        .filter_map(|ip| asn_data.get(ip).map(|info| info.asn))
        .collect();
    let with_asn = sources.iter().filter(|ip| asn_data.contains_key(ip)).count();
    let asn_component = if with_asn >= 2 {
        concentration(with_asn, asns.len())
    } else {
        0.0
    };

    let subnets: BTreeSet<String> = sources.iter().map(|ip| subnet_key(*ip)).collect();
    let subnet_component = concentration(sources.len(), subnets.len());

    (ASN_COMPONENT_WEIGHT * asn_component + SUBNET_COMPONENT_WEIGHT * subnet_component)
        .clamp(0.0, 1.0)
}

/// Geographic distribution: distinct IPs concentrated in few countries.
pub fn geographic_score(sessions: &[AttackSession], geo_data: &BTreeMap<IpAddr, GeoInfo>) -> f64 {
    let sources = unique_sources(sessions);
    if sources.len() < 2 {
        return 0.0;
    }

    let located: Vec<&GeoInfo> = sources.iter().filter_map(|ip| geo_data.get(ip)).collect();
    if located.len() < 2 {
        return 0.0;
    }
    let countries: BTreeSet<&str> = located.iter().map(|g| g.country.as_str()).collect();
    concentration(located.len(), countries.len())
}

/// Threat-intel correlation: mean reputation score across distinct sources.
pub fn threat_intel_score(
    sessions: &[AttackSession],
    intel_data: &BTreeMap<IpAddr, ThreatIntel>,
) -> f64 {
    let sources = unique_sources(sessions);
    if sources.len() < 2 {
        return 0.0;
    }

    let scores: Vec<f64> = sources
        .iter()
        .filter_map(|ip| intel_data.get(ip).map(|t| t.threat_score))
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    (scores.iter().sum::<f64>() / scores.len() as f64).clamp(0.0, 1.0)
}

/// Distinct source IPs from the batch, in deterministic order.
pub fn unique_sources(sessions: &[AttackSession]) -> BTreeSet<IpAddr> {
    sessions.iter().map(|s| s.source_ip).collect()
}

/// How concentrated `n` items are into `groups` buckets: 1.0 when all share
/// one bucket, 0.0 when every item sits alone.
fn concentration(n: usize, groups: usize) -> f64 {
    if n < 2 {
        return 0.0;
    }
    (n - groups) as f64 / (n - 1) as f64
}

/// Collapse an address to its routing-relevant neighbourhood: /24 for IPv4,
/// /48 for IPv6.
fn subnet_key(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.0/24", o[0], o[1], o[2])
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            format!("{:x}:{:x}:{:x}::/48", s[0], s[1], s[2])
        }
    }
}

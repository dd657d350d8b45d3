//! Enrichment tool types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

use crate::session::AnalysisDepth;

/// The external enrichment collaborators the coordinator can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// BGP/ASN network-ownership lookup
    Asn,
    Geolocation,
    ThreatIntel,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [ToolKind::Asn, ToolKind::Geolocation, ToolKind::ThreatIntel];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Asn => "asn_lookup",
            ToolKind::Geolocation => "geolocation",
            ToolKind::ThreatIntel => "threat_intel",
        }
    }

    /// Tools required at a given analysis depth. Minimal analyses skip
    /// enrichment entirely; deeper tiers enable increasing sets.
    pub fn required_for(depth: AnalysisDepth) -> &'static [ToolKind] {
        match depth {
            AnalysisDepth::Minimal => &[],
            AnalysisDepth::Standard => &[ToolKind::Asn, ToolKind::Geolocation],
            AnalysisDepth::Deep | AnalysisDepth::Forensic => {
                &[ToolKind::Asn, ToolKind::Geolocation, ToolKind::ThreatIntel]
            }
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network ownership record for one source IP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsnInfo {
    pub asn: u32,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Geolocation record for one source IP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Reputation record for one source IP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatIntel {
    /// Reputation score in [0,1], higher is worse
    pub threat_score: f64,
    pub reputation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reported: Option<DateTime<Utc>>,
}

/// Payload returned by one tool lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolData {
    Asn(BTreeMap<IpAddr, AsnInfo>),
    Geolocation(BTreeMap<IpAddr, GeoInfo>),
    ThreatIntel(BTreeMap<IpAddr, ThreatIntel>),
}

impl ToolData {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolData::Asn(_) => ToolKind::Asn,
            ToolData::Geolocation(_) => ToolKind::Geolocation,
            ToolData::ThreatIntel(_) => ToolKind::ThreatIntel,
        }
    }
}

/// Merged outcome of one fan-out. A tool that failed or timed out appears
/// in `unavailable` instead of aborting the analysis; an empty report is a
/// valid report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolFanoutReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<BTreeMap<IpAddr, AsnInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<BTreeMap<IpAddr, GeoInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_intel: Option<BTreeMap<IpAddr, ThreatIntel>>,
    #[serde(default)]
    pub unavailable: BTreeSet<String>,
}

impl ToolFanoutReport {
    pub fn merge(&mut self, data: ToolData) {
        match data {
            ToolData::Asn(map) => self.asn = Some(map),
            ToolData::Geolocation(map) => self.geolocation = Some(map),
            ToolData::ThreatIntel(map) => self.threat_intel = Some(map),
        }
    }

    pub fn mark_unavailable(&mut self, kind: ToolKind) {
        self.unavailable.insert(kind.as_str().to_string());
    }
}

/// Tool-call failure modes. Timeouts and network errors are transient and
/// eligible for retry; the rest fail the call outright.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("lookup failed: {0}")]
    Failed(String),
}

impl ToolError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Timeout(_) | ToolError::Network(_))
    }
}

//! Behavioral similarity
//!
//! Payload fingerprinting via token shingles and pairwise Jaccard overlap.
//! The aggregate averages only the top fraction of pair similarities so a
//! single identical pair cannot dominate a large, otherwise dissimilar
//! batch, while a genuinely uniform batch still scores near 1.0.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::session::AttackSession;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9_./-]+").unwrap());

const SHINGLE_WIDTH: usize = 3;

/// Score behavioral similarity across the batch.
///
/// `top_fraction` selects which share of the highest pairwise similarities
/// is averaged (at least one pair is always used).
pub fn similarity_score(sessions: &[AttackSession], top_fraction: f64) -> f64 {
    if sessions.len() < 2 {
        return 0.0;
    }

    let fingerprints: Vec<BTreeSet<String>> = sessions
        .iter()
        .map(|s| fingerprint(&s.payload))
        .collect();

    let mut similarities = Vec::new();
    for i in 0..fingerprints.len() {
        for j in (i + 1)..fingerprints.len() {
            similarities.push(jaccard(&fingerprints[i], &fingerprints[j]));
        }
    }

    similarities.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let take = ((similarities.len() as f64 * top_fraction.clamp(0.0, 1.0)).ceil() as usize).max(1);
    let top = &similarities[..take.min(similarities.len())];

    (top.iter().sum::<f64>() / top.len() as f64).clamp(0.0, 1.0)
}

/// Shingle set for one payload: lowercase tokens, SHINGLE_WIDTH-grams.
/// Payloads too short for a full shingle contribute their token run whole,
/// and token-free payloads fall back to the raw lowercased text.
fn fingerprint(payload: &str) -> BTreeSet<String> {
    let lowered = payload.to_lowercase();
    let tokens: Vec<&str> = TOKEN_RE.find_iter(&lowered).map(|m| m.as_str()).collect();

    let mut shingles = BTreeSet::new();
    if tokens.is_empty() {
        shingles.insert(lowered);
        return shingles;
    }
    if tokens.len() < SHINGLE_WIDTH {
        shingles.insert(tokens.join(" "));
        return shingles;
    }
    for window in tokens.windows(SHINGLE_WIDTH) {
        shingles.insert(window.join(" "));
    }
    shingles
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::net::IpAddr;

    fn session_with(payload: &str) -> AttackSession {
        AttackSession {
            source_ip: "203.0.113.20".parse::<IpAddr>().unwrap(),
            destination_ip: None,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            payload: payload.to_string(),
            target_port: Some(80),
            protocol: Some("HTTP".to_string()),
        }
    }

    #[test]
    fn test_identical_payloads_score_one() {
        let batch = vec![
            session_with("GET /admin/config.php HTTP/1.1 User-Agent: zgrab"),
            session_with("GET /admin/config.php HTTP/1.1 User-Agent: zgrab"),
            session_with("GET /admin/config.php HTTP/1.1 User-Agent: zgrab"),
        ];
        assert!((similarity_score(&batch, 0.5) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_payloads_score_low() {
        let batch = vec![
            session_with("GET /wp-login.php HTTP/1.1"),
            session_with("USER anonymous PASS guest"),
            session_with("\\x16\\x03\\x01 handshake probe"),
        ];
        assert!(similarity_score(&batch, 0.5) < 0.2);
    }

    #[test]
    fn test_top_fraction_limits_single_pair_dominance() {
        // One identical pair among otherwise unrelated payloads
        let batch = vec![
            session_with("GET /admin HTTP/1.1 Host: a Connection: close"),
            session_with("GET /admin HTTP/1.1 Host: a Connection: close"),
            session_with("SSH-2.0-OpenSSH_8.9 probe alpha"),
            session_with("MGLNDD port sweep beta gamma delta"),
            session_with("OPTIONS sip:carol@chicago.com SIP/2.0"),
        ];
        let narrow = similarity_score(&batch, 0.1); // effectively the best pair
        let wide = similarity_score(&batch, 1.0);
        assert!((narrow - 1.0).abs() < 1e-9);
        assert!(wide < 0.3);
    }

    #[test]
    fn test_short_payloads_compare_whole() {
        let batch = vec![session_with("root"), session_with("root")];
        assert!((similarity_score(&batch, 0.5) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_case_insensitive_fingerprints() {
        let batch = vec![
            session_with("GET /Admin HTTP/1.1 Host: target"),
            session_with("get /admin http/1.1 host: target"),
        ];
        assert!((similarity_score(&batch, 0.5) - 1.0).abs() < 1e-9);
    }
}

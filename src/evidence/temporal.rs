//! Temporal correlation
//!
//! Clusters session timestamps with a sliding window and scores how much of
//! the batch lands inside synchronized clusters. Tightly machine-timed
//! bursts score close to 1.0; activity spread beyond the window scores 0.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::session::AttackSession;

/// Score temporal correlation across the batch.
///
/// Timestamps are sorted and grouped single-linkage: an adjacent gap within
/// `window` extends the current cluster. The score is the fraction of
/// sessions inside clusters of size >= 2, scaled by interval regularity
/// (inverse coefficient of variation of intra-cluster gaps).
pub fn correlation_score(sessions: &[AttackSession], window: Duration) -> f64 {
    if sessions.len() < 2 {
        return 0.0;
    }

    let mut times: Vec<DateTime<Utc>> = sessions.iter().map(|s| s.timestamp).collect();
    times.sort_unstable();

    let window_secs = window.as_secs_f64();
    let mut clusters: Vec<Vec<f64>> = Vec::new();
    let mut current: Vec<f64> = vec![epoch_secs(times[0])];

    for ts in &times[1..] {
        let secs = epoch_secs(*ts);
        // `current` is never empty, it always holds at least the seed
        let gap = secs - *current.last().unwrap();
        if gap <= window_secs {
            current.push(secs);
        } else {
            clusters.push(std::mem::replace(&mut current, vec![secs]));
        }
    }
    clusters.push(current);

    let clustered: usize = clusters.iter().filter(|c| c.len() >= 2).map(Vec::len).sum();
    if clustered == 0 {
        return 0.0;
    }
    let ratio = clustered as f64 / times.len() as f64;

    let intervals: Vec<f64> = clusters
        .iter()
        .filter(|c| c.len() >= 2)
        .flat_map(|c| c.windows(2).map(|w| w[1] - w[0]))
        .collect();

    (ratio * tightness(&intervals)).clamp(0.0, 1.0)
}

/// 1.0 for perfectly regular (or simultaneous) intervals, decaying as the
/// coefficient of variation grows.
fn tightness(intervals: &[f64]) -> f64 {
    if intervals.is_empty() {
        return 0.0;
    }
    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if mean == 0.0 {
        return 1.0;
    }
    let variance =
        intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
    let cv = variance.sqrt() / mean;
    1.0 / (1.0 + cv)
}

fn epoch_secs(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::net::IpAddr;

    fn session_at(secs: i64) -> AttackSession {
        AttackSession {
            source_ip: "203.0.113.10".parse::<IpAddr>().unwrap(),
            destination_ip: None,
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            payload: "payload".to_string(),
            target_port: Some(22),
            protocol: Some("SSH".to_string()),
        }
    }

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn test_fewer_than_two_sessions_scores_zero() {
        assert_eq!(correlation_score(&[], WINDOW), 0.0);
        assert_eq!(correlation_score(&[session_at(0)], WINDOW), 0.0);
    }

    #[test]
    fn test_regular_burst_scores_high() {
        let batch: Vec<_> = (0..5).map(|i| session_at(i * 7)).collect();
        let score = correlation_score(&batch, WINDOW);
        // All clustered, perfectly regular intervals
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_simultaneous_sessions_score_one() {
        let batch = vec![session_at(10), session_at(10), session_at(10)];
        assert!((correlation_score(&batch, WINDOW) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_spread_sessions_score_zero() {
        // One session every 6 hours: no two share a 300s window
        let batch: Vec<_> = (0..5).map(|i| session_at(i * 21_600)).collect();
        assert_eq!(correlation_score(&batch, WINDOW), 0.0);
    }

    #[test]
    fn test_partial_cluster_scores_between() {
        // Three in one burst, two stragglers hours apart
        let batch = vec![
            session_at(0),
            session_at(10),
            session_at(20),
            session_at(40_000),
            session_at(80_000),
        ];
        let score = correlation_score(&batch, WINDOW);
        assert!(score > 0.0 && score < 1.0);
        assert!(score <= 3.0 / 5.0);
    }

    #[test]
    fn test_deterministic_under_input_order() {
        let forward: Vec<_> = (0..6).map(|i| session_at(i * 13)).collect();
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(
            correlation_score(&forward, WINDOW),
            correlation_score(&reversed, WINDOW)
        );
    }
}

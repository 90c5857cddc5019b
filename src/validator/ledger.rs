use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use crate::core::types::{ChallengeStatus, LEDGER_WINDOW};

/// One resolved challenge as seen by the validator
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeOutcome {
    pub status: ChallengeStatus,
    pub response_ms: Option<u32>,
    pub recorded_at: DateTime<Utc>,
}

/// Exported per-node statistics for the reward-accounting boundary.
/// Payout semantics live entirely on the other side of that boundary.
#[derive(Debug, Clone, Serialize)]
pub struct NodeChallengeStats {
    pub node: String,
    pub total: u32,
    pub verified: u32,
    pub timed_out: u32,
    pub failed: u32,
    pub success_rate: f64,
    pub average_response_ms: Option<f64>,
    pub last_outcome_at: DateTime<Utc>,
}

/// Rolling per-node outcome history, bounded to the most recent
/// `window` entries per node. Owned by the challenge validator and passed
/// by reference; never ambient process-wide state.
pub struct ChallengeLedger {
    window: usize,
    outcomes: HashMap<String, VecDeque<ChallengeOutcome>>,
}

impl Default for ChallengeLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeLedger {
    pub fn new() -> Self {
        Self::with_window(LEDGER_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
            outcomes: HashMap::new(),
        }
    }

    pub fn record(&mut self, node: &str, status: ChallengeStatus, response_ms: Option<u32>) {
        let history = self.outcomes.entry(node.to_string()).or_default();
        history.push_back(ChallengeOutcome {
            status,
            response_ms,
            recorded_at: Utc::now(),
        });
        while history.len() > self.window {
            history.pop_front();
        }
    }

    /// Success rate over the rolling window; None for an unknown node
    pub fn success_rate(&self, node: &str) -> Option<f64> {
        let history = self.outcomes.get(node)?;
        if history.is_empty() {
            return None;
        }
        let verified = history
            .iter()
            .filter(|o| o.status == ChallengeStatus::Verified)
            .count();
        Some(verified as f64 / history.len() as f64)
    }

    pub fn node_stats(&self, node: &str) -> Option<NodeChallengeStats> {
        let history = self.outcomes.get(node)?;
        let last = history.back()?;

        let mut verified = 0u32;
        let mut timed_out = 0u32;
        let mut failed = 0u32;
        let mut response_total = 0u64;
        let mut response_count = 0u32;

        for outcome in history {
            match outcome.status {
                ChallengeStatus::Verified => verified += 1,
                ChallengeStatus::TimedOut => timed_out += 1,
                ChallengeStatus::Failed => failed += 1,
                ChallengeStatus::Issued | ChallengeStatus::AwaitingResponse => {}
            }
            if let Some(ms) = outcome.response_ms {
                response_total += ms as u64;
                response_count += 1;
            }
        }

        Some(NodeChallengeStats {
            node: node.to_string(),
            total: history.len() as u32,
            verified,
            timed_out,
            failed,
            success_rate: verified as f64 / history.len() as f64,
            average_response_ms: if response_count > 0 {
                Some(response_total as f64 / response_count as f64)
            } else {
                None
            },
            last_outcome_at: last.recorded_at,
        })
    }

    /// Stats for every tracked node, sorted by node id for stable output
    pub fn summary(&self) -> Vec<NodeChallengeStats> {
        let mut nodes: Vec<&String> = self.outcomes.keys().collect();
        nodes.sort();
        nodes
            .into_iter()
            .filter_map(|node| self.node_stats(node))
            .collect()
    }

    pub fn tracked_nodes(&self) -> usize {
        self.outcomes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_over_mixed_outcomes() {
        let mut ledger = ChallengeLedger::new();
        ledger.record("node-a", ChallengeStatus::Verified, Some(40));
        ledger.record("node-a", ChallengeStatus::Verified, Some(60));
        ledger.record("node-a", ChallengeStatus::TimedOut, None);
        ledger.record("node-a", ChallengeStatus::Failed, Some(90));

        assert_eq!(ledger.success_rate("node-a"), Some(0.5));
        assert_eq!(ledger.success_rate("node-b"), None);

        let stats = ledger.node_stats("node-a").unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.verified, 2);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.average_response_ms, Some(190.0 / 3.0));
    }

    #[test]
    fn test_rolling_window_drops_oldest() {
        let mut ledger = ChallengeLedger::with_window(4);
        for _ in 0..4 {
            ledger.record("node-a", ChallengeStatus::Failed, None);
        }
        assert_eq!(ledger.success_rate("node-a"), Some(0.0));

        // Four fresh successes push all the failures out of the window
        for _ in 0..4 {
            ledger.record("node-a", ChallengeStatus::Verified, Some(50));
        }
        assert_eq!(ledger.success_rate("node-a"), Some(1.0));
        assert_eq!(ledger.node_stats("node-a").unwrap().total, 4);
    }

    #[test]
    fn test_summary_is_sorted_and_complete() {
        let mut ledger = ChallengeLedger::new();
        ledger.record("node-b", ChallengeStatus::Verified, Some(10));
        ledger.record("node-a", ChallengeStatus::TimedOut, None);

        let summary = ledger.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].node, "node-a");
        assert_eq!(summary[1].node, "node-b");
        assert_eq!(ledger.tracked_nodes(), 2);
    }

    #[test]
    fn test_stats_serialize_for_export() {
        let mut ledger = ChallengeLedger::new();
        ledger.record("node-a", ChallengeStatus::Verified, Some(25));
        let serialized = serde_json::to_string(&ledger.summary()).unwrap();
        assert!(serialized.contains("node-a"));
        assert!(serialized.contains("success_rate"));
    }
}

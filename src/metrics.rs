//! Settlement counters and Prometheus text export

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point-in-time copy of the engine counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub bets_placed: u64,
    pub bets_rejected: u64,
    pub settlements: u64,
    pub unknown_deliveries: u64,
    pub refunds: u64,
    pub deposits: u64,
    pub withdrawals: u64,
    pub uptime_secs: u64,
}

#[derive(Clone)]
pub struct EngineMetrics {
    start_time: Instant,
    bets_placed: Arc<AtomicU64>,
    bets_rejected: Arc<AtomicU64>,
    settlements: Arc<AtomicU64>,
    unknown_deliveries: Arc<AtomicU64>,
    refunds: Arc<AtomicU64>,
    deposits: Arc<AtomicU64>,
    withdrawals: Arc<AtomicU64>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            bets_placed: Arc::new(AtomicU64::new(0)),
            bets_rejected: Arc::new(AtomicU64::new(0)),
            settlements: Arc::new(AtomicU64::new(0)),
            unknown_deliveries: Arc::new(AtomicU64::new(0)),
            refunds: Arc::new(AtomicU64::new(0)),
            deposits: Arc::new(AtomicU64::new(0)),
            withdrawals: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_bet_placed(&self) {
        self.bets_placed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_bet_rejected(&self) {
        self.bets_rejected.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_settlement(&self) {
        self.settlements.fetch_add(1, Ordering::SeqCst);
    }

    /// Outcome delivered for a handle with no pending bet
    pub fn record_unknown_delivery(&self) {
        self.unknown_deliveries.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_refund(&self) {
        self.refunds.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_deposit(&self) {
        self.deposits.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_withdrawal(&self) {
        self.withdrawals.fetch_add(1, Ordering::SeqCst);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bets_placed: self.bets_placed.load(Ordering::SeqCst),
            bets_rejected: self.bets_rejected.load(Ordering::SeqCst),
            settlements: self.settlements.load(Ordering::SeqCst),
            unknown_deliveries: self.unknown_deliveries.load(Ordering::SeqCst),
            refunds: self.refunds.load(Ordering::SeqCst),
            deposits: self.deposits.load(Ordering::SeqCst),
            withdrawals: self.withdrawals.load(Ordering::SeqCst),
            uptime_secs: self.uptime().as_secs(),
        }
    }

    /// Generate Prometheus metrics format
    pub fn to_prometheus_format(&self, pending_requests: usize) -> String {
        let snapshot = self.snapshot();
        let mut output = String::new();

        let counters = [
            ("roulette_bets_placed_total", "Bets accepted and awaiting or past settlement", snapshot.bets_placed),
            ("roulette_bets_rejected_total", "Bets rejected before any state change", snapshot.bets_rejected),
            ("roulette_settlements_total", "Outcomes applied to a pending bet", snapshot.settlements),
            ("roulette_unknown_deliveries_total", "Outcomes delivered for unknown handles", snapshot.unknown_deliveries),
            ("roulette_refunds_total", "Stale requests refunded by the owner", snapshot.refunds),
            ("roulette_deposits_total", "Accepted deposits", snapshot.deposits),
            ("roulette_withdrawals_total", "Completed withdrawals", snapshot.withdrawals),
        ];

        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n\
                 # TYPE {name} counter\n\
                 {name} {value}\n\n"
            ));
        }

        output.push_str(&format!(
            "# HELP roulette_pending_requests Outcome requests awaiting delivery\n\
             # TYPE roulette_pending_requests gauge\n\
             roulette_pending_requests {}\n\n",
            pending_requests
        ));

        output.push_str(&format!(
            "# HELP roulette_uptime_seconds Engine uptime in seconds\n\
             # TYPE roulette_uptime_seconds gauge\n\
             roulette_uptime_seconds {}\n",
            snapshot.uptime_secs
        ));

        output
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = EngineMetrics::new();
        metrics.record_bet_placed();
        metrics.record_bet_placed();
        metrics.record_bet_rejected();
        metrics.record_settlement();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bets_placed, 2);
        assert_eq!(snapshot.bets_rejected, 1);
        assert_eq!(snapshot.settlements, 1);
        assert_eq!(snapshot.refunds, 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = EngineMetrics::new();
        let clone = metrics.clone();
        clone.record_unknown_delivery();
        assert_eq!(metrics.snapshot().unknown_deliveries, 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = EngineMetrics::new();
        metrics.record_deposit();

        let text = metrics.to_prometheus_format(3);
        assert!(text.contains("# TYPE roulette_deposits_total counter"));
        assert!(text.contains("roulette_deposits_total 1\n"));
        assert!(text.contains("roulette_pending_requests 3\n"));
    }
}

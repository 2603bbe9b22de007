use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier handed to a player or session once it is leased from the pool.
pub type UniqueId = i32;

/// How long a player may stay silent before its registration expires.
pub const PLAYER_TIMEOUT: Duration = Duration::from_secs(90);

/// Random draws allowed per identifier before a generator gives up.
pub const MAX_GENERATION_ATTEMPTS: u32 = 100_000;

/// Upper bound on the size of one generated batch.
pub const DEFAULT_MAX_BATCH: usize = 64;

/// Point-in-time view of the hub, logged periodically and returned to callers.
///
/// `wanted` is signed: delivering more identifiers than were requested
/// drives it below zero.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct HubStats {
    pub wanted: i64,
    pub available: usize,
    pub leased_total: u64,
    pub connected_players: usize,
    pub waiting_players: usize,
}

impl HubStats {
    /// Demand the pool cannot currently cover.
    pub fn shortfall(&self) -> u64 {
        self.wanted.max(0) as u64
    }

    /// True when more identifiers were delivered than were ever asked for.
    pub fn is_over_delivered(&self) -> bool {
        self.wanted < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats() {
        let stats = HubStats::default();
        assert_eq!(stats.wanted, 0);
        assert_eq!(stats.available, 0);
        assert_eq!(stats.shortfall(), 0);
        assert!(!stats.is_over_delivered());
    }

    #[test]
    fn test_shortfall_ignores_negative_demand() {
        let stats = HubStats {
            wanted: -3,
            ..HubStats::default()
        };
        assert_eq!(stats.shortfall(), 0);
        assert!(stats.is_over_delivered());

        let stats = HubStats {
            wanted: 4,
            ..HubStats::default()
        };
        assert_eq!(stats.shortfall(), 4);
    }

    #[test]
    fn test_stats_json_field_names() {
        let stats = HubStats {
            wanted: 2,
            available: 5,
            leased_total: 7,
            connected_players: 3,
            waiting_players: 1,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"wanted\":2"));
        assert!(json.contains("\"leased_total\":7"));

        let parsed: HubStats = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, stats);
    }

    #[test]
    fn test_constants() {
        assert_eq!(PLAYER_TIMEOUT, Duration::from_secs(90));
        assert_eq!(MAX_GENERATION_ATTEMPTS, 100_000);
        assert!(DEFAULT_MAX_BATCH > 0);
    }
}

//! Liveness table of connected preview surfaces.
//!
//! Surfaces heartbeat every interval; the hub sweeps on the same cadence and
//! evicts anything silent for longer than the liveness timeout.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabRecord {
    pub tab_id: String,
    /// Never moves backwards, even if heartbeats arrive out of order.
    pub last_seen: Instant,
    pub url: String,
    /// Loader surfaces host other surfaces; their comings and goings are not
    /// reported as surface open/close events. Follows the latest heartbeat.
    pub is_loader: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// First time this tab was seen.
    New,
    Refreshed,
    /// The tab switched between loader and content.
    KindChanged,
}

#[derive(Debug)]
pub struct TabRegistry {
    tabs: HashMap<String, TabRecord>,
    timeout: Duration,
}

impl TabRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tabs: HashMap::new(),
            timeout,
        }
    }

    /// Create or refresh a tab. A heartbeat stamped earlier than the one
    /// already recorded changes nothing.
    pub fn record_heartbeat(
        &mut self,
        tab_id: &str,
        url: &str,
        is_loader: bool,
        seen_at: Instant,
    ) -> HeartbeatOutcome {
        match self.tabs.get_mut(tab_id) {
            Some(record) => {
                if seen_at < record.last_seen {
                    return HeartbeatOutcome::Refreshed;
                }
                record.last_seen = seen_at;
                record.url = url.to_string();
                if record.is_loader == is_loader {
                    return HeartbeatOutcome::Refreshed;
                }
                debug!(
                    "[REGISTRY] Tab {} is now a {} surface",
                    tab_id,
                    if is_loader { "loader" } else { "content" }
                );
                record.is_loader = is_loader;
                HeartbeatOutcome::KindChanged
            }
            None => {
                debug!(
                    "[REGISTRY] Tab {} online ({}) at {}",
                    tab_id,
                    if is_loader { "loader" } else { "content" },
                    url
                );
                self.tabs.insert(
                    tab_id.to_string(),
                    TabRecord {
                        tab_id: tab_id.to_string(),
                        last_seen: seen_at,
                        url: url.to_string(),
                        is_loader,
                    },
                );
                HeartbeatOutcome::New
            }
        }
    }

    /// Update the URL a known tab is showing without counting as a heartbeat.
    pub fn update_url(&mut self, tab_id: &str, url: &str) -> bool {
        match self.tabs.get_mut(tab_id) {
            Some(record) => {
                record.url = url.to_string();
                true
            }
            None => false,
        }
    }

    /// Evict every tab with `now - last_seen > timeout` and return them.
    pub fn sweep(&mut self, now: Instant) -> Vec<TabRecord> {
        let timeout = self.timeout;
        let stale: Vec<String> = self
            .tabs
            .values()
            .filter(|r| now.saturating_duration_since(r.last_seen) > timeout)
            .map(|r| r.tab_id.clone())
            .collect();

        let mut evicted: Vec<TabRecord> = stale
            .iter()
            .filter_map(|id| self.tabs.remove(id))
            .collect();
        evicted.sort_by(|a, b| a.tab_id.cmp(&b.tab_id));

        for record in &evicted {
            debug!(
                "[REGISTRY] Evicted tab {} (silent {:?})",
                record.tab_id,
                now.saturating_duration_since(record.last_seen)
            );
        }
        evicted
    }

    pub fn get(&self, tab_id: &str) -> Option<&TabRecord> {
        self.tabs.get(tab_id)
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn content_surface_count(&self) -> usize {
        self.tabs.values().filter(|r| !r.is_loader).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: Duration = Duration::from_secs(1);

    fn registry() -> TabRegistry {
        TabRegistry::new(UNIT * 10)
    }

    #[test]
    fn first_heartbeat_creates() {
        let mut reg = registry();
        let t0 = Instant::now();
        assert_eq!(reg.record_heartbeat("a", "u1", false, t0), HeartbeatOutcome::New);
        assert_eq!(reg.record_heartbeat("a", "u2", false, t0 + UNIT), HeartbeatOutcome::Refreshed);
        assert_eq!(reg.get("a").unwrap().url, "u2");
        assert!(!reg.is_empty());
    }

    #[test]
    fn steady_heartbeats_are_never_evicted() {
        let mut reg = registry();
        let t0 = Instant::now();
        for i in 0..100u32 {
            let now = t0 + UNIT * i;
            reg.record_heartbeat("a", "u", false, now);
            reg.record_heartbeat("loader", "l", true, now);
            assert!(reg.sweep(now + UNIT / 2).is_empty());
        }
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn stale_tab_is_evicted_exactly_once() {
        let mut reg = registry();
        let t0 = Instant::now();
        reg.record_heartbeat("a", "u", false, t0 + UNIT * 5);

        let mut evictions = 0;
        for i in 0..30u32 {
            let evicted = reg.sweep(t0 + UNIT * i);
            if i <= 15 {
                assert!(evicted.is_empty(), "evicted too early at {i}");
            }
            evictions += evicted.len();
        }
        assert_eq!(evictions, 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn timeout_boundary_is_exclusive() {
        let mut reg = registry();
        let t0 = Instant::now();
        reg.record_heartbeat("a", "u", false, t0);
        assert!(reg.sweep(t0 + UNIT * 10).is_empty());
        assert_eq!(reg.sweep(t0 + UNIT * 10 + Duration::from_millis(1)).len(), 1);
    }

    #[test]
    fn out_of_order_heartbeat_does_not_rewind() {
        let mut reg = registry();
        let t0 = Instant::now();
        reg.record_heartbeat("a", "new", false, t0 + UNIT * 5);
        reg.record_heartbeat("a", "old", false, t0 + UNIT * 2);

        let record = reg.get("a").unwrap();
        assert_eq!(record.last_seen, t0 + UNIT * 5);
        assert_eq!(record.url, "new");
    }

    #[test]
    fn loader_flag_and_counts() {
        let mut reg = registry();
        let t0 = Instant::now();
        reg.record_heartbeat("loader", "l", true, t0);
        reg.record_heartbeat("c1", "u", false, t0);
        reg.record_heartbeat("c2", "u", false, t0);
        assert_eq!(reg.content_surface_count(), 2);

        let evicted = reg.sweep(t0 + UNIT * 11);
        assert_eq!(evicted.len(), 3);
        assert_eq!(evicted.iter().filter(|r| !r.is_loader).count(), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn latest_heartbeat_decides_the_kind() {
        let mut reg = registry();
        let t0 = Instant::now();
        reg.record_heartbeat("a", "loader", true, t0);
        assert_eq!(reg.content_surface_count(), 0);

        assert_eq!(
            reg.record_heartbeat("a", "page", false, t0 + UNIT),
            HeartbeatOutcome::KindChanged
        );
        assert!(!reg.get("a").unwrap().is_loader);
        assert_eq!(reg.content_surface_count(), 1);

        // A late loader heartbeat does not flip it back.
        assert_eq!(
            reg.record_heartbeat("a", "loader", true, t0),
            HeartbeatOutcome::Refreshed
        );
        assert_eq!(reg.content_surface_count(), 1);

        assert_eq!(
            reg.record_heartbeat("a", "page", false, t0 + UNIT * 2),
            HeartbeatOutcome::Refreshed
        );
    }

    #[test]
    fn update_url_only_for_known_tabs() {
        let mut reg = registry();
        reg.record_heartbeat("a", "u", false, Instant::now());
        assert!(reg.update_url("a", "v"));
        assert!(!reg.update_url("b", "v"));
        assert_eq!(reg.get("a").unwrap().url, "v");
    }
}

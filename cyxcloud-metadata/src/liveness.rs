//! Liveness Tracker: ingests push heartbeats, maintains the ALIVE/DEAD
//! state machine, and runs the periodic timeout-detection loop.
//!
//! The tracker is purely reactive on the write side: nodes push heartbeats
//! in, and the tracker only ever marks a node dead on its own timer when
//! pushes stop arriving.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cyxcloud_core::error::{CoordinatorError, Result};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::events::{CoordinatorEvent, EventSender};
use crate::models::{HeartbeatReport, HeartbeatStatus, LivenessRecord};

pub struct LivenessTracker {
    records: RwLock<HashMap<String, LivenessRecord>>,
    events: EventSender,
    heartbeat_timeout: chrono::Duration,
}

impl LivenessTracker {
    pub fn new(events: EventSender, heartbeat_timeout: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            events,
            heartbeat_timeout: chrono::Duration::from_std(heartbeat_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
        }
    }

    /// Process one heartbeat. Returns an acknowledgement timestamp on
    /// success.
    pub async fn heartbeat(&self, report: HeartbeatReport) -> Result<DateTime<Utc>> {
        if report.url.trim().is_empty() {
            return Err(CoordinatorError::Validation("heartbeat url must not be empty".into()));
        }
        let now = Utc::now();
        let mut guard = self.records.write().await;
        let existed = guard.contains_key(&report.url);
        let record = guard
            .entry(report.url.clone())
            .or_insert_with(|| LivenessRecord::new(report.url.clone(), now));

        if report.status == HeartbeatStatus::Shutdown {
            if record.alive {
                record.alive = false;
                record.downtime_start = Some(now);
                info!(url = %report.url, "node reported shutdown");
            }
            record.last_heartbeat = now;
            return Ok(now);
        }

        let was_dead = !record.alive && existed;
        if was_dead {
            if let Some(start) = record.downtime_start.take() {
                record.downtime = record.downtime + (now - start);
            }
        }
        record.alive = true;
        record.last_heartbeat = now;
        record.total_heartbeats += 1;

        let new_inventory: HashMap<String, HashSet<u32>> = report
            .inventory
            .iter()
            .map(|(file_id, chunks)| (file_id.clone(), chunks.iter().copied().collect()))
            .collect();

        let removed = diff_removed(&record.last_inventory, &new_inventory);
        record.last_inventory = new_inventory;
        drop(guard);

        if was_dead {
            info!(url = %report.url, "node recovered");
            let _ = self.events.send(CoordinatorEvent::NodeRecovered {
                url: report.url.clone(),
            });
        }

        if !removed.is_empty() {
            warn!(url = %report.url, count = removed.len(), "node inventory lost chunks since last heartbeat");
            let _ = self.events.send(CoordinatorEvent::InventoryChanged {
                url: report.url.clone(),
                removed,
            });
        }

        Ok(now)
    }

    pub async fn is_alive(&self, url: &str) -> bool {
        self.records
            .read()
            .await
            .get(url)
            .map(|r| r.alive)
            .unwrap_or(false)
    }

    pub async fn alive_urls(&self) -> Vec<String> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.alive)
            .map(|r| r.url.clone())
            .collect()
    }

    pub async fn record(&self, url: &str) -> Option<LivenessRecord> {
        self.records.read().await.get(url).cloned()
    }

    /// One pass of the timeout detector. Call on a `tokio::time::interval`
    /// tick.
    pub async fn detect_timeouts(&self) {
        let now = Utc::now();
        let mut timed_out = Vec::new();
        {
            let mut guard = self.records.write().await;
            for record in guard.values_mut() {
                if record.alive && now - record.last_heartbeat > self.heartbeat_timeout {
                    record.alive = false;
                    record.downtime_start = Some(now);
                    timed_out.push(record.url.clone());
                }
            }
        }
        for url in timed_out {
            info!(url = %url, "node timed out, marked dead");
            let _ = self.events.send(CoordinatorEvent::NodeDown { url });
        }
    }

    /// Spawn the background timeout-detection loop; returns the join handle
    /// so the caller can hold it for graceful shutdown.
    pub fn spawn_timeout_loop(
        self: std::sync::Arc<Self>,
        cleanup_interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                debug!("running liveness timeout sweep");
                self.detect_timeouts().await;
            }
        })
    }
}

/// Files/chunks present in `before` but absent from `after`.
fn diff_removed(
    before: &HashMap<String, HashSet<u32>>,
    after: &HashMap<String, HashSet<u32>>,
) -> HashSet<(String, u32)> {
    let mut removed = HashSet::new();
    for (file_id, chunks) in before {
        let still_present = after.get(file_id);
        for chunk_index in chunks {
            let present = still_present.map(|s| s.contains(chunk_index)).unwrap_or(false);
            if !present {
                removed.insert((file_id.clone(), *chunk_index));
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::channel;
    use std::collections::HashMap as StdMap;

    fn heartbeat(url: &str, status: HeartbeatStatus, inventory: StdMap<String, Vec<u32>>) -> HeartbeatReport {
        HeartbeatReport {
            id: url.to_string(),
            url: url.to_string(),
            status,
            timestamp: 0,
            inventory,
            total_chunks: 0,
            storage_used_mb: 0.0,
            free_space_mb: 0,
            can_write: true,
        }
    }

    #[tokio::test]
    async fn first_heartbeat_marks_alive() {
        let (tx, _rx) = channel();
        let tracker = LivenessTracker::new(tx, Duration::from_secs(30));
        tracker
            .heartbeat(heartbeat("http://n1", HeartbeatStatus::Up, StdMap::new()))
            .await
            .unwrap();
        assert!(tracker.is_alive("http://n1").await);
        assert_eq!(tracker.alive_urls().await, vec!["http://n1".to_string()]);
    }

    #[tokio::test]
    async fn shutdown_marks_dead_immediately() {
        let (tx, _rx) = channel();
        let tracker = LivenessTracker::new(tx, Duration::from_secs(30));
        tracker
            .heartbeat(heartbeat("http://n1", HeartbeatStatus::Up, StdMap::new()))
            .await
            .unwrap();
        tracker
            .heartbeat(heartbeat("http://n1", HeartbeatStatus::Shutdown, StdMap::new()))
            .await
            .unwrap();
        assert!(!tracker.is_alive("http://n1").await);
    }

    #[tokio::test]
    async fn recovery_emits_event() {
        let (tx, mut rx) = channel();
        let tracker = LivenessTracker::new(tx, Duration::from_secs(30));
        tracker
            .heartbeat(heartbeat("http://n1", HeartbeatStatus::Up, StdMap::new()))
            .await
            .unwrap();
        tracker
            .heartbeat(heartbeat("http://n1", HeartbeatStatus::Shutdown, StdMap::new()))
            .await
            .unwrap();
        tracker
            .heartbeat(heartbeat("http://n1", HeartbeatStatus::Up, StdMap::new()))
            .await
            .unwrap();
        assert!(tracker.is_alive("http://n1").await);
        let mut saw_recovered = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, CoordinatorEvent::NodeRecovered { .. }) {
                saw_recovered = true;
            }
        }
        assert!(saw_recovered);
    }

    #[tokio::test]
    async fn inventory_loss_emits_event() {
        let (tx, mut rx) = channel();
        let tracker = LivenessTracker::new(tx, Duration::from_secs(30));
        let mut first = StdMap::new();
        first.insert("img1".to_string(), vec![0, 1, 2]);
        tracker
            .heartbeat(heartbeat("http://n1", HeartbeatStatus::Up, first))
            .await
            .unwrap();

        let mut second = StdMap::new();
        second.insert("img1".to_string(), vec![0, 1]);
        tracker
            .heartbeat(heartbeat("http://n1", HeartbeatStatus::Up, second))
            .await
            .unwrap();

        let mut found = None;
        while let Ok(ev) = rx.try_recv() {
            if let CoordinatorEvent::InventoryChanged { removed, .. } = ev {
                found = Some(removed);
            }
        }
        let removed = found.expect("expected InventoryChanged event");
        assert!(removed.contains(&("img1".to_string(), 2)));
        assert_eq!(removed.len(), 1);
    }

    #[tokio::test]
    async fn timeout_marks_dead_and_emits_node_down() {
        let (tx, mut rx) = channel();
        let tracker = LivenessTracker::new(tx, Duration::from_millis(1));
        tracker
            .heartbeat(heartbeat("http://n1", HeartbeatStatus::Up, StdMap::new()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        tracker.detect_timeouts().await;
        assert!(!tracker.is_alive("http://n1").await);
        let mut saw_down = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, CoordinatorEvent::NodeDown { .. }) {
                saw_down = true;
            }
        }
        assert!(saw_down);
    }

    #[tokio::test]
    async fn rejects_empty_url() {
        let (tx, _rx) = channel();
        let tracker = LivenessTracker::new(tx, Duration::from_secs(30));
        let err = tracker
            .heartbeat(heartbeat("", HeartbeatStatus::Up, StdMap::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation(_)));
    }
}

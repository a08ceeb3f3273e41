//! Session counters and the recent scans list
//!
//! Counters are cached in a small JSON file so a restarted scanner shows the
//! last known numbers before the first remote refresh completes.

use crate::api::{FestStats, RecentScanRecord};
use chrono::{DateTime, Utc};
use nexus_common::events::{EntryDecision, NexusEvent};
use nexus_common::time::format_clock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Check-in counters for the active fest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub checked_in: u64,
    pub capacity: u64,
}

impl SessionCounters {
    pub fn remaining(&self) -> u64 {
        self.capacity.saturating_sub(self.checked_in)
    }

    pub fn to_event(&self) -> NexusEvent {
        NexusEvent::StatsUpdated {
            checked_in: self.checked_in,
            remaining: self.remaining(),
            capacity: self.capacity,
            timestamp: Utc::now(),
        }
    }
}

/// Where a recent scans line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    /// Operator decision taken in this session
    Decision,
    /// Row of the backend's recent scans list
    Backend,
}

/// One line of the recent scans list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentScanEntry {
    pub name: String,
    pub ticket_id: Option<String>,
    /// `allowed` / `denied`, or a backend status with no decision equivalent
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
    pub source: EntrySource,
}

impl RecentScanEntry {
    pub fn render(&self) -> String {
        match &self.ticket_id {
            Some(id) => format!(
                "{} ({}) • {} • {}",
                self.name,
                id,
                format_clock(self.timestamp),
                self.outcome
            ),
            None => format!("{} • {} • {}", self.name, format_clock(self.timestamp), self.outcome),
        }
    }
}

/// Most-recent-first list capped at a fixed length
#[derive(Debug, Clone)]
pub struct RecentScanLog {
    capacity: usize,
    entries: VecDeque<RecentScanEntry>,
}

impl RecentScanLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, entry: RecentScanEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Merge the backend's view (most recent first) under local decisions
    ///
    /// Decisions newer than every backend row are kept on top unless the
    /// backend already lists them; everything else is replaced.
    pub fn merge_remote(&mut self, records: Vec<RecentScanRecord>) {
        let remote: Vec<(RecentScanEntry, Option<DateTime<Utc>>)> = records
            .into_iter()
            .map(|record| {
                let scanned_at = record
                    .scanned_at
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc));
                let entry = RecentScanEntry {
                    name: record.attendee_name,
                    ticket_id: None,
                    outcome: outcome_label(&record.status),
                    timestamp: scanned_at.unwrap_or_else(Utc::now),
                    source: EntrySource::Backend,
                };
                (entry, scanned_at)
            })
            .collect();
        let newest_remote = remote.iter().filter_map(|(_, at)| *at).max();

        let pending: Vec<RecentScanEntry> = self
            .entries
            .iter()
            .filter(|e| e.source == EntrySource::Decision)
            .filter(|e| newest_remote.map_or(true, |newest| e.timestamp > newest))
            .filter(|e| {
                !remote
                    .iter()
                    .any(|(r, _)| r.name == e.name && r.outcome == e.outcome)
            })
            .cloned()
            .collect();

        self.entries = pending
            .into_iter()
            .chain(remote.into_iter().map(|(entry, _)| entry))
            .take(self.capacity)
            .collect();
    }

    pub fn entries(&self) -> impl Iterator<Item = &RecentScanEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_event(&self) -> NexusEvent {
        NexusEvent::RecentScansUpdated {
            entries: self.entries.iter().map(RecentScanEntry::render).collect(),
            timestamp: Utc::now(),
        }
    }
}

/// Backend scan status → operator-facing outcome
fn outcome_label(status: &str) -> String {
    match status.to_ascii_lowercase().as_str() {
        "valid" | "allowed" | "checked_in" | "success" => EntryDecision::Allowed.to_string(),
        "denied" => EntryDecision::Denied.to_string(),
        _ => status.to_string(),
    }
}

/// On-disk form of the counters cache
#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    fest_id: String,
    counters: SessionCounters,
    saved_at: DateTime<Utc>,
}

/// Counters plus recent scans for one fest
#[derive(Debug)]
pub struct StatsCache {
    fest_id: String,
    counters: SessionCounters,
    recent: RecentScanLog,
    cache_path: Option<PathBuf>,
}

impl StatsCache {
    pub fn new(fest_id: impl Into<String>, recent_capacity: usize) -> Self {
        Self {
            fest_id: fest_id.into(),
            counters: SessionCounters::default(),
            recent: RecentScanLog::new(recent_capacity),
            cache_path: None,
        }
    }

    /// Attach a cache file, restoring counters saved for the same fest
    pub fn with_cache_file(mut self, path: PathBuf) -> Self {
        match load_cached(&path) {
            Ok(Some(cached)) if cached.fest_id == self.fest_id => {
                debug!(fest_id = %self.fest_id, "Restored cached session counters");
                self.counters = cached.counters;
            }
            Ok(_) => {}
            Err(e) => warn!("Ignoring unreadable session cache {}: {}", path.display(), e),
        }
        self.cache_path = Some(path);
        self
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    pub fn recent(&self) -> &RecentScanLog {
        &self.recent
    }

    /// Record an operator decision
    ///
    /// An allowed entry bumps the checked-in count unless `already_counted`:
    /// the backend counts the ticket during verification, so a snapshot taken
    /// after that verification already includes it.
    pub fn record_decision(
        &mut self,
        decision: EntryDecision,
        name: impl Into<String>,
        ticket_id: Option<String>,
        already_counted: bool,
    ) {
        if decision == EntryDecision::Allowed && !already_counted {
            self.counters.checked_in += 1;
        }
        self.recent.push(RecentScanEntry {
            name: name.into(),
            ticket_id,
            outcome: decision.to_string(),
            timestamp: Utc::now(),
            source: EntrySource::Decision,
        });
    }

    pub fn apply_remote_stats(&mut self, stats: FestStats) {
        self.counters = SessionCounters {
            checked_in: stats.scans.valid,
            capacity: stats.fest.capacity,
        };
    }

    pub fn apply_remote_recent(&mut self, records: Vec<RecentScanRecord>) {
        self.recent.merge_remote(records);
    }

    /// Write counters to the cache file, if one is attached
    pub fn persist(&self) -> nexus_common::Result<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };
        let cached = CachedSession {
            fest_id: self.fest_id.clone(),
            counters: self.counters,
            saved_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&cached)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn load_cached(path: &Path) -> nexus_common::Result<Option<CachedSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read(path)?;
    Ok(Some(serde_json::from_slice(&content)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FestCapacity, ScanCounts};
    use tempfile::TempDir;

    #[test]
    fn test_remaining_never_underflows() {
        let counters = SessionCounters {
            checked_in: 510,
            capacity: 500,
        };
        assert_eq!(counters.remaining(), 0);
    }

    #[test]
    fn test_recent_log_caps_and_orders() {
        let mut cache = StatsCache::new("fest-001", 5);
        for i in 0..7 {
            cache.record_decision(EntryDecision::Allowed, format!("Guest {}", i), None, false);
        }
        let names: Vec<_> = cache.recent().entries().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["Guest 6", "Guest 5", "Guest 4", "Guest 3", "Guest 2"]);
        assert_eq!(cache.counters().checked_in, 7);
    }

    #[test]
    fn test_denied_does_not_count() {
        let mut cache = StatsCache::new("fest-001", 5);
        cache.record_decision(
            EntryDecision::Denied,
            "Amit Kumar",
            Some("NX-2024-001236".into()),
            false,
        );
        assert_eq!(cache.counters().checked_in, 0);
        let entry = cache.recent().entries().next().unwrap();
        assert_eq!(entry.outcome, "denied");
        assert!(entry.render().contains("NX-2024-001236"));
    }

    #[test]
    fn test_remote_stats_override_local() {
        let mut cache = StatsCache::new("fest-001", 5);
        cache.record_decision(EntryDecision::Allowed, "A", None, false);
        cache.apply_remote_stats(FestStats {
            scans: ScanCounts { valid: 41 },
            fest: FestCapacity { capacity: 500 },
        });
        assert_eq!(cache.counters(), SessionCounters { checked_in: 41, capacity: 500 });
        assert_eq!(cache.counters().remaining(), 459);
    }

    fn record(name: &str, status: &str, scanned_at: Option<&str>) -> RecentScanRecord {
        RecentScanRecord {
            attendee_name: name.into(),
            status: status.into(),
            scanned_at: scanned_at.map(str::to_string),
        }
    }

    #[test]
    fn test_remote_rows_replace_older_entries() {
        let mut cache = StatsCache::new("fest-001", 2);
        cache.apply_remote_recent(vec![record("Old", "valid", None)]);
        cache.apply_remote_recent(vec![
            record("Rahul Sharma", "valid", Some("2024-02-07T14:30:00Z")),
            record("Priya Patel", "already_used", None),
            record("Dropped", "valid", None),
        ]);

        let lines: Vec<_> = cache
            .recent()
            .entries()
            .map(|e| (e.name.as_str(), e.outcome.as_str()))
            .collect();
        assert_eq!(
            lines,
            vec![("Rahul Sharma", "allowed"), ("Priya Patel", "already_used")]
        );
    }

    #[test]
    fn test_decision_newer_than_remote_survives_merge() {
        let mut cache = StatsCache::new("fest-001", 5);
        cache.record_decision(EntryDecision::Denied, "Amit Kumar", None, false);
        cache.apply_remote_recent(vec![record(
            "Rahul Sharma",
            "valid",
            Some("2024-02-07T14:30:00Z"),
        )]);

        let lines: Vec<_> = cache
            .recent()
            .entries()
            .map(|e| (e.name.as_str(), e.outcome.as_str(), e.source))
            .collect();
        assert_eq!(
            lines,
            vec![
                ("Amit Kumar", "denied", EntrySource::Decision),
                ("Rahul Sharma", "allowed", EntrySource::Backend),
            ]
        );
    }

    #[test]
    fn test_decision_listed_by_backend_is_not_duplicated() {
        let mut cache = StatsCache::new("fest-001", 5);
        cache.record_decision(EntryDecision::Allowed, "Rahul Sharma", None, false);
        cache.apply_remote_recent(vec![record(
            "Rahul Sharma",
            "valid",
            Some("2024-02-07T14:30:00Z"),
        )]);

        assert_eq!(cache.recent().len(), 1);
        let entry = cache.recent().entries().next().unwrap();
        assert_eq!(entry.outcome, "allowed");
        assert_eq!(entry.source, EntrySource::Backend);
    }

    #[test]
    fn test_decision_older_than_remote_is_replaced() {
        let mut cache = StatsCache::new("fest-001", 5);
        cache.record_decision(EntryDecision::Denied, "Amit Kumar", None, false);
        let later = (Utc::now() + chrono::Duration::minutes(5)).to_rfc3339();
        cache.apply_remote_recent(vec![record("Neha Singh", "valid", Some(&later))]);

        let names: Vec<_> = cache.recent().entries().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Neha Singh"]);
    }

    #[test]
    fn test_already_counted_allow_keeps_server_count() {
        let mut cache = StatsCache::new("fest-001", 5);
        cache.apply_remote_stats(FestStats {
            scans: ScanCounts { valid: 1 },
            fest: FestCapacity { capacity: 100 },
        });
        cache.record_decision(EntryDecision::Allowed, "Rahul Sharma", None, true);
        assert_eq!(cache.counters().checked_in, 1);
        assert_eq!(cache.recent().entries().next().unwrap().outcome, "allowed");
    }

    #[test]
    fn test_cache_file_round_trip_same_fest_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan_session.json");

        let mut cache = StatsCache::new("fest-001", 5).with_cache_file(path.clone());
        cache.apply_remote_stats(FestStats {
            scans: ScanCounts { valid: 12 },
            fest: FestCapacity { capacity: 300 },
        });
        cache.persist().unwrap();

        let restored = StatsCache::new("fest-001", 5).with_cache_file(path.clone());
        assert_eq!(restored.counters(), SessionCounters { checked_in: 12, capacity: 300 });

        let other = StatsCache::new("fest-002", 5).with_cache_file(path);
        assert_eq!(other.counters(), SessionCounters::default());
    }

    #[test]
    fn test_corrupt_cache_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan_session.json");
        std::fs::write(&path, "{not json").unwrap();
        let cache = StatsCache::new("fest-001", 5).with_cache_file(path);
        assert_eq!(cache.counters(), SessionCounters::default());
    }
}

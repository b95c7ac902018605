//! SessionTracker data types

use crate::router_registry::ObservedSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Persisted PPPoE session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSession {
    pub id: i64,
    pub router_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub uptime_secs: Option<i64>,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Set difference between stored and observed sessions
#[derive(Debug, Default, PartialEq)]
pub struct SessionDelta {
    /// Observed now, not stored before
    pub connected: Vec<ObservedSession>,
    /// Stored before, not observed now
    pub disconnected: Vec<TrackedSession>,
    /// In both sets: (record id, fresh observation)
    pub retained: Vec<(i64, ObservedSession)>,
}

/// Names per event kind, as reported back to the poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDiff {
    pub connected: Vec<String>,
    pub disconnected: Vec<String>,
    pub refreshed: Vec<String>,
}

impl SessionDiff {
    pub fn is_quiet(&self) -> bool {
        self.connected.is_empty() && self.disconnected.is_empty()
    }
}

/// Compare by session name. Duplicate names in `current` count once.
pub fn diff_sessions(previous: &[TrackedSession], current: &[ObservedSession]) -> SessionDelta {
    let stored: HashMap<&str, &TrackedSession> =
        previous.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut seen = HashSet::new();
    let mut delta = SessionDelta::default();

    for session in current {
        if !seen.insert(session.name.as_str()) {
            continue;
        }
        match stored.get(session.name.as_str()) {
            Some(record) => delta.retained.push((record.id, session.clone())),
            None => delta.connected.push(session.clone()),
        }
    }

    delta.disconnected = previous
        .iter()
        .filter(|s| !seen.contains(s.name.as_str()))
        .cloned()
        .collect();

    delta
}

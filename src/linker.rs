//! Session linker (spec.md §4.5): maps raw device identifiers to stable
//! session IDs resilient to MAC-address randomization.

use std::collections::{HashMap, HashSet};

use crate::scorer::rank_distance;
use crate::types::{Session, SniffVector};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    device_to_session: HashMap<String, String>,
    next_id: u32,
    assignments_since_cleanup: u64,
}

/// Outcome of a link lookup, so callers can log what happened without the
/// registry owning any logging policy itself.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    Known,
    Linked { to_session: String },
    NewSession,
}

/// A session torn down by [`SessionRegistry::maybe_cleanup`], along with
/// every device id that was mapped to it at removal time — the caller needs
/// both to also tear down buffers and transition state.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedSession {
    pub session_id: String,
    pub device_ids: HashSet<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_session_id(&mut self) -> String {
        self.next_id += 1;
        format!("S{:04}", self.next_id)
    }

    /// Resolve `device_id` to a session, linking it to a stale session by
    /// rank-distance similarity if it's new and a close-enough match
    /// exists, otherwise allocating a fresh session.
    pub fn resolve(
        &mut self,
        device_id: &str,
        live_norm: &SniffVector<f64>,
        now: f64,
        stale_mac_sec: f64,
        session_rank_threshold: f64,
    ) -> (String, LinkOutcome) {
        if let Some(session_id) = self.device_to_session.get(device_id).cloned() {
            let session = self.sessions.get_mut(&session_id).unwrap();
            session.last_seen = now;
            session.last_norm_vector = live_norm.clone();
            return (session_id, LinkOutcome::Known);
        }

        // Case 2: unknown device. Consider sessions whose most recent
        // device is stale (gone) as linking candidates.
        let mut best: Option<(String, f64)> = None;
        for session in self.sessions.values() {
            if now - session.last_seen < stale_mac_sec {
                continue;
            }
            if let Some(rd) = rank_distance(live_norm, &session.last_norm_vector) {
                if best.as_ref().map(|(_, best_rd)| rd < *best_rd).unwrap_or(true) {
                    best = Some((session.session_id.clone(), rd));
                }
            }
        }

        if let Some((session_id, rd)) = best {
            if rd <= session_rank_threshold {
                let session = self.sessions.get_mut(&session_id).unwrap();
                session.device_ids.insert(device_id.to_string());
                session.last_seen = now;
                session.last_norm_vector = live_norm.clone();
                self.device_to_session
                    .insert(device_id.to_string(), session_id.clone());
                return (
                    session_id.clone(),
                    LinkOutcome::Linked {
                        to_session: session_id,
                    },
                );
            }
        }

        let session_id = self.allocate_session_id();
        let mut device_ids = std::collections::HashSet::new();
        device_ids.insert(device_id.to_string());
        self.sessions.insert(
            session_id.clone(),
            Session {
                session_id: session_id.clone(),
                device_ids,
                last_seen: now,
                last_norm_vector: live_norm.clone(),
            },
        );
        self.device_to_session
            .insert(device_id.to_string(), session_id.clone());
        (session_id, LinkOutcome::NewSession)
    }

    /// Call once per processed assignment; every `cleanup_interval`
    /// assignments, garbage-collect sessions older than `max_age_sec`.
    /// Returns the removed sessions' ids and device ids so the caller can
    /// also tear down buffers/transition state keyed by them (spec.md
    /// §4.5: cleanup removes "sessions … and their associated device-ID
    /// mappings, transition state, and buffers").
    pub fn maybe_cleanup(
        &mut self,
        now: f64,
        cleanup_interval: u64,
        max_age_sec: f64,
    ) -> Vec<RemovedSession> {
        self.assignments_since_cleanup += 1;
        if self.assignments_since_cleanup < cleanup_interval {
            return Vec::new();
        }
        self.assignments_since_cleanup = 0;

        let stale_ids: Vec<String> = self
            .sessions
            .values()
            .filter(|s| now - s.last_seen >= max_age_sec)
            .map(|s| s.session_id.clone())
            .collect();

        let mut removed = Vec::with_capacity(stale_ids.len());
        for session_id in stale_ids {
            if let Some(session) = self.sessions.remove(&session_id) {
                for device_id in &session.device_ids {
                    self.device_to_session.remove(device_id);
                }
                removed.push(RemovedSession {
                    session_id,
                    device_ids: session.device_ids,
                });
            }
        }

        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

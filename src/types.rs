//! Core data model: samples, vectors, fingerprints, sessions, and the
//! event structs emitted on the output streams.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// One RSSI observation for a single device at a single sniffer, stamped
/// with local receive time. Immutable once created; never mutated after
/// insertion into a [`DeviceWindow`].
#[derive(Debug, Clone, PartialEq)]
pub struct RssiSample {
    pub rx_ts: f64,
    pub sniffer_id: String,
    pub rssi: i32,
}

/// A per-device FIFO of recent samples, insertion-ordered across all
/// sniffers.
///
/// Invariant: every retained sample satisfies `rx_ts >= now - WINDOW_SEC`;
/// pruning happens on each arrival (see [`crate::buffer::DeviceWindowStore`]).
#[derive(Debug, Clone, Default)]
pub struct DeviceWindow {
    pub samples: VecDeque<RssiSample>,
}

/// A live or normalized per-sniffer vector. `BTreeMap` keeps iteration
/// order deterministic, which matters for the dedup key used by the
/// calibration collector and for stable JSON field ordering.
pub type SniffVector<T> = BTreeMap<String, T>;

/// One stored fingerprint entry for a zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub zone_id: u32,
    pub x: i64,
    pub y: i64,
    pub vectors: Vec<SniffVector<f64>>,
}

/// A stable device identity that may span multiple raw device identifiers
/// across MAC-address randomization events.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub device_ids: HashSet<String>,
    pub last_seen: f64,
    pub last_norm_vector: SniffVector<f64>,
}

/// Per-session zone-transition state machine, mirroring spec.md §4.6
/// exactly: `Initial`, `Stable`, `Pending`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionState {
    Initial,
    Stable {
        zone_id: u32,
        enter_ts: f64,
    },
    Pending {
        stable_zone: u32,
        /// When `stable_zone` was entered; carried through so a confirmed
        /// transition can compute the dwell interval correctly.
        stable_enter_ts: f64,
        candidate_zone: u32,
        count: u32,
        first_seen_ts: f64,
    },
}

/// A boundary-output zone assignment, emitted once the margin gate passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneAssignmentEvent {
    pub ts: f64,
    pub ts_kst: String,
    pub phone_id: String,
    pub session_id: String,
    pub zone_id: u32,
    pub x: i64,
    pub y: i64,
    pub confidence: f64,
    pub second_zone_id: Option<u32>,
    pub second_confidence: Option<f64>,
    pub margin: f64,
    pub sources: Vec<String>,
    pub vector: SniffVector<i32>,
    pub timebase: String,
}

/// Emitted instead of a [`ZoneAssignmentEvent`] when the margin gate fails.
/// Same shape, different stream.
pub type UncertainEvent = ZoneAssignmentEvent;

/// A confirmed zone change for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub ts: f64,
    pub phone_id: String,
    pub session_id: String,
    pub from_zone: Option<u32>,
    pub to_zone: u32,
    pub confidence: f64,
}

/// A closed dwell interval for a session in one zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DwellEvent {
    pub phone_id: String,
    pub session_id: String,
    pub zone_id: u32,
    pub enter_ts: f64,
    pub exit_ts: f64,
    pub dwell_sec: f64,
}

/// A persisted calibration record: one synchronized collection run for one
/// zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub created_ts: f64,
    pub created_ts_kst: String,
    pub zone_id: u32,
    pub x: i64,
    pub y: i64,
    pub phone_mac_used: String,
    pub max_samples_per_pi: usize,
    pub sync_window_sec: f64,
    pub min_pis_for_vector: usize,
    pub vectors_collected: usize,
    pub vector_type: String,
    pub timebase: String,
    pub vectors: Vec<SniffVector<f64>>,
}

/// One row of the static zones table (`zone_id,x,y`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ZoneLocation {
    pub zone_id: u32,
    pub x: i64,
    pub y: i64,
}

/// A decoded, validated inbound RSSI observation, ready to enter the
/// buffer/vector pipeline.
#[derive(Debug, Clone)]
pub struct IngestedSample {
    pub rx_ts: f64,
    pub sniffer_id: String,
    pub device_id: String,
    pub rssi: i32,
}

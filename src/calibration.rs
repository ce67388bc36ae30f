//! Calibration collector (spec.md §4.7), grounded directly on
//! `calibrate_interactive_geometry.py`'s sampling loop.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::config::EngineConfig;
use crate::types::SniffVector;
use crate::vector::median_f64;

/// Why a collection run for a zone stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorOutcome {
    AllSniffersFull,
    MaxVectorsReached,
    TimedOut,
}

struct SnifferState {
    recent: VecDeque<f64>,
    latest: Option<(f64, f64)>, // (rx_ts, value)
    sample_count: usize,
}

impl Default for SnifferState {
    fn default() -> Self {
        Self {
            recent: VecDeque::new(),
            latest: None,
            sample_count: 0,
        }
    }
}

/// One interactive calibration run for a single zone.
pub struct CalibrationSession {
    sniffer_states: HashMap<String, SnifferState>,
    expected_sniffers: Vec<String>,
    vectors: Vec<SniffVector<f64>>,
    seen_keys: HashSet<Vec<(String, i64)>>,
    start_ts: Option<f64>,

    max_samples_per_pi: usize,
    timeout_sec: f64,
    sync_window_sec: f64,
    min_pis_for_vector: usize,
    max_vectors_per_zone: usize,
    recent_window: usize,
    outlier_threshold: f64,
}

impl CalibrationSession {
    pub fn new(expected_sniffers: Vec<String>, config: &EngineConfig) -> Self {
        Self {
            sniffer_states: HashMap::new(),
            expected_sniffers,
            vectors: Vec::new(),
            seen_keys: HashSet::new(),
            start_ts: None,
            max_samples_per_pi: config.max_samples_per_pi,
            timeout_sec: config.timeout_sec,
            sync_window_sec: config.sync_window_sec,
            min_pis_for_vector: config.min_pis_for_vector,
            max_vectors_per_zone: config.max_vectors_per_zone,
            recent_window: config.recent_window,
            outlier_threshold: config.outlier_threshold,
        }
    }

    /// Feed one RSSI-like reading for the calibration device at `sniffer_id`.
    /// Returns a termination outcome once one of the three stop conditions
    /// fires; `None` means keep collecting.
    pub fn feed(&mut self, sniffer_id: &str, rx_ts: f64, value: f64) -> Option<CollectorOutcome> {
        if self.start_ts.is_none() {
            self.start_ts = Some(rx_ts);
        }

        let state = self.sniffer_states.entry(sniffer_id.to_string()).or_default();

        if Self::outlier_ok(&state.recent, value, self.recent_window, self.outlier_threshold)
            && state.sample_count < self.max_samples_per_pi
        {
            state.recent.push_back(value);
            if state.recent.len() > self.recent_window {
                state.recent.pop_front();
            }
            state.sample_count += 1;
        }
        state.latest = Some((rx_ts, value));

        self.try_snapshot(rx_ts);

        if self.all_sniffers_full() {
            return Some(CollectorOutcome::AllSniffersFull);
        }
        if self.vectors.len() >= self.max_vectors_per_zone {
            return Some(CollectorOutcome::MaxVectorsReached);
        }
        if let Some(start) = self.start_ts {
            if rx_ts - start > self.timeout_sec {
                return Some(CollectorOutcome::TimedOut);
            }
        }
        None
    }

    fn outlier_ok(recent: &VecDeque<f64>, value: f64, window: usize, threshold: f64) -> bool {
        if recent.len() < window {
            return true;
        }
        let recent_slice: Vec<f64> = recent.iter().rev().take(window).copied().collect();
        let med = median_f64(&recent_slice);
        (value - med).abs() <= threshold
    }

    fn all_sniffers_full(&self) -> bool {
        self.expected_sniffers.iter().all(|s| {
            self.sniffer_states
                .get(s)
                .map(|st| st.sample_count >= self.max_samples_per_pi)
                .unwrap_or(false)
        })
    }

    /// Uses absolute time delta (not ordered delta) so reordering and
    /// jitter don't spuriously drop a sniffer from the active set.
    fn try_snapshot(&mut self, rx_ts: f64) {
        let active: BTreeMap<String, i32> = self
            .sniffer_states
            .iter()
            .filter_map(|(sniffer, state)| {
                state.latest.and_then(|(latest_ts, value)| {
                    if (rx_ts - latest_ts).abs() <= self.sync_window_sec {
                        Some((sniffer.clone(), value as i32))
                    } else {
                        None
                    }
                })
            })
            .collect();

        if active.len() < self.min_pis_for_vector {
            return;
        }

        let normalized = crate::vector::normalize(&active);
        let key: Vec<(String, i64)> = normalized
            .iter()
            .map(|(s, v)| (s.clone(), (v * 10.0).round() as i64))
            .collect();

        if self.seen_keys.insert(key) {
            self.vectors.push(normalized);
        }
    }

    pub fn vectors_collected(&self) -> usize {
        self.vectors.len()
    }

    pub fn vectors(&self) -> &[SniffVector<f64>] {
        &self.vectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        let mut c = EngineConfig::default();
        c.max_samples_per_pi = 3;
        c.sync_window_sec = 3.0;
        c.min_pis_for_vector = 2;
        c.max_vectors_per_zone = 10;
        c.recent_window = 2;
        c.outlier_threshold = 15.0;
        c
    }

    #[test]
    fn boundary_scenario_6_calibration_dedup() {
        let mut session = CalibrationSession::new(vec!["p1".into(), "p2".into()], &config());
        session.feed("p1", 0.0, -60.0);
        session.feed("p2", 0.1, -65.0);
        assert_eq!(session.vectors_collected(), 1);

        // Feed the identical snapshot again.
        session.feed("p1", 1.0, -60.0);
        session.feed("p2", 1.1, -65.0);
        assert_eq!(session.vectors_collected(), 1);
    }

    #[test]
    fn outlier_rejected_beyond_threshold() {
        let mut session = CalibrationSession::new(vec!["p1".into()], &config());
        session.feed("p1", 0.0, -60.0);
        session.feed("p1", 1.0, -62.0);
        // way outside threshold relative to recent median
        session.feed("p1", 2.0, -10.0);

        let state = session.sniffer_states.get("p1").unwrap();
        assert_eq!(state.sample_count, 2);
    }

    #[test]
    fn terminates_when_all_sniffers_reach_sample_cap() {
        let mut cfg = config();
        cfg.max_samples_per_pi = 2;
        let mut session = CalibrationSession::new(vec!["p1".into()], &cfg);
        session.feed("p1", 0.0, -60.0);
        let outcome = session.feed("p1", 1.0, -61.0);
        assert_eq!(outcome, Some(CollectorOutcome::AllSniffersFull));
    }

    #[test]
    fn terminates_on_timeout() {
        let mut cfg = config();
        cfg.timeout_sec = 5.0;
        let mut session = CalibrationSession::new(vec!["p1".into(), "p2".into()], &cfg);
        session.feed("p1", 0.0, -60.0);
        let outcome = session.feed("p1", 10.0, -61.0);
        assert_eq!(outcome, Some(CollectorOutcome::TimedOut));
    }
}

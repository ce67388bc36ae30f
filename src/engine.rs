//! Localization engine orchestrator: wires ingest -> buffer -> vector
//! builder -> zone scorer -> margin gate -> session linker -> transition
//! debouncer -> persistence into one per-message pipeline.
//!
//! Modeled on the teacher's stateful processor shape (a struct owning all
//! pipeline state, exposing one `process` entry point per message).

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{FixedOffset, TimeZone, Utc};

use crate::buffer::DeviceWindowStore;
use crate::config::EngineConfig;
use crate::debounce::Debouncer;
use crate::error::EngineError;
use crate::fingerprint::FingerprintStore;
use crate::ingest::decode;
use crate::linker::SessionRegistry;
use crate::persistence::append_jsonl;
use crate::scorer::{passes_margin_gate, score_zones, ScoreResult, ScorerParams};
use crate::types::{
    DwellEvent, TransitionEvent, TransitionState, UncertainEvent, ZoneAssignmentEvent, ZoneLocation,
};
use crate::vector::{build_live_vector, normalize};

/// Format a unix timestamp as `"YYYY-MM-DD HH:MM:SS KST"` (UTC+9), matching
/// the original source's `now_kst_str` and reused wherever the wire schema
/// carries a `*_kst` field (see DESIGN.md Open Question 4).
pub fn ts_kst(ts: f64) -> String {
    let kst = FixedOffset::east_opt(9 * 3600).unwrap();
    let utc = Utc.timestamp_opt(ts as i64, 0).single().unwrap_or_else(Utc::now);
    utc.with_timezone(&kst).format("%Y-%m-%d %H:%M:%S").to_string() + " KST"
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub assignments: PathBuf,
    pub uncertain: PathBuf,
    pub transitions: PathBuf,
    pub dwells: PathBuf,
}

/// One message's full processing result, returned for callers (CLI,
/// tests) that want to inspect what happened without re-reading the output
/// files.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub assignment: Option<ZoneAssignmentEvent>,
    pub uncertain: Option<UncertainEvent>,
    pub transition: Option<TransitionEvent>,
    pub dwell: Option<DwellEvent>,
}

pub struct LocalizationEngine {
    config: EngineConfig,
    fingerprints: FingerprintStore,
    zones: HashMap<u32, ZoneLocation>,
    buffers: DeviceWindowStore,
    sessions: SessionRegistry,
    debouncer: Debouncer,
    transition_states: HashMap<String, TransitionState>,
    outputs: Option<OutputPaths>,
}

impl LocalizationEngine {
    /// Fails fast with [`EngineError::NoCalibration`] if `fingerprints` is
    /// empty — starting live mode against no calibration data is fatal
    /// per spec.md §7.
    pub fn new(
        config: EngineConfig,
        fingerprints: FingerprintStore,
        zones: HashMap<u32, ZoneLocation>,
        outputs: Option<OutputPaths>,
    ) -> Result<Self, EngineError> {
        if fingerprints.is_empty() {
            return Err(EngineError::NoCalibration);
        }
        let debouncer = Debouncer::new(config.transition_confirm_count);
        let buffers = DeviceWindowStore::new(config.window_sec);
        Ok(Self {
            config,
            fingerprints,
            zones,
            buffers,
            sessions: SessionRegistry::new(),
            debouncer,
            transition_states: HashMap::new(),
            outputs,
        })
    }

    /// Decode and process one raw inbound line, stamped with `rx_ts`
    /// (local receive time — authoritative per spec.md §4.1).
    pub fn process_message(&mut self, raw: &str, rx_ts: f64) -> ProcessOutcome {
        let sample = match decode(
            raw,
            rx_ts,
            self.config.rssi_min_dbm,
            self.config.rssi_max_dbm,
            self.config.mac_hash_enabled,
            &self.config.mac_salt,
        ) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(where_ = "engine::process_message", error = %e, "dropping malformed message");
                return ProcessOutcome::default();
            }
        };

        self.buffers.ingest(
            &sample.device_id,
            crate::types::RssiSample {
                rx_ts: sample.rx_ts,
                sniffer_id: sample.sniffer_id.clone(),
                rssi: sample.rssi,
            },
        );

        let window = match self.buffers.window(&sample.device_id) {
            Some(w) => w,
            None => return ProcessOutcome::default(),
        };

        let live = match build_live_vector(
            window,
            rx_ts,
            self.config.per_pi_fresh_sec,
            self.config.min_sources,
        ) {
            Some(v) => v,
            // InsufficientSources: normal, silent skip, not an error.
            None => return ProcessOutcome::default(),
        };

        let normalized = normalize(&live);

        let params = ScorerParams {
            match_diff_dbm: self.config.match_diff_dbm,
            rank_match_threshold: self.config.rank_match_threshold,
            l1_weight: self.config.l1_weight,
            rank_weight: self.config.rank_weight,
        };

        let score = match score_zones(&normalized, &self.fingerprints, &params) {
            Some(s) => s,
            None => return ProcessOutcome::default(),
        };

        let (session_id, _outcome) = self.sessions.resolve(
            &sample.device_id,
            &normalized,
            rx_ts,
            self.config.stale_mac_sec,
            self.config.session_rank_threshold,
        );

        let removed = self.sessions.maybe_cleanup(
            rx_ts,
            self.config.session_cleanup_interval,
            self.config.session_max_age_sec,
        );
        for stale in &removed {
            self.transition_states.remove(&stale.session_id);
            for device_id in &stale.device_ids {
                self.buffers.remove(device_id);
            }
        }

        let mut outcome = ProcessOutcome::default();

        if !passes_margin_gate(&score, self.config.margin_gate) {
            outcome.uncertain = Some(self.build_event(&sample, &session_id, &live, &score, rx_ts));
            return outcome;
        }

        let zone = self.zones.get(&score.best_zone).copied();
        let assignment = self.build_event(&sample, &session_id, &live, &score, rx_ts);
        if let Some(paths) = &self.outputs {
            append_jsonl(&paths.assignments, &assignment);
        }
        outcome.assignment = Some(assignment);

        let state = self
            .transition_states
            .entry(session_id.clone())
            .or_insert(TransitionState::Initial)
            .clone();
        let (next_state, effects) = self.debouncer.advance(
            &state,
            score.best_zone,
            rx_ts,
            &sample.device_id,
            &session_id,
            score.best_conf,
        );
        self.transition_states.insert(session_id.clone(), next_state);

        if let Some(paths) = &self.outputs {
            if let Some(t) = &effects.transition {
                append_jsonl(&paths.transitions, t);
            }
            if let Some(d) = &effects.dwell {
                append_jsonl(&paths.dwells, d);
            }
        }
        outcome.transition = effects.transition;
        outcome.dwell = effects.dwell;

        let _ = zone; // x/y already folded into `assignment` via build_event

        outcome
    }

    fn build_event(
        &self,
        sample: &crate::types::IngestedSample,
        session_id: &str,
        live: &crate::types::SniffVector<i32>,
        score: &ScoreResult,
        rx_ts: f64,
    ) -> ZoneAssignmentEvent {
        let zone = self.zones.get(&score.best_zone);
        ZoneAssignmentEvent {
            ts: rx_ts,
            ts_kst: ts_kst(rx_ts),
            phone_id: sample.device_id.clone(),
            session_id: session_id.to_string(),
            zone_id: score.best_zone,
            x: zone.map(|z| z.x).unwrap_or(0),
            y: zone.map(|z| z.y).unwrap_or(0),
            confidence: score.best_conf,
            second_zone_id: score.second_zone,
            second_confidence: score.second_conf,
            margin: score.margin(),
            sources: live.keys().cloned().collect(),
            vector: live.clone(),
            timebase: "rx_time_laptop".to_string(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.session_count()
    }

    pub fn device_count(&self) -> usize {
        self.buffers.device_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FingerprintEntry;

    fn store_with_two_zones() -> FingerprintStore {
        let mut v1 = crate::types::SniffVector::new();
        v1.insert("pi1".to_string(), 5.0);
        v1.insert("pi2".to_string(), -5.0);

        let mut v2 = crate::types::SniffVector::new();
        v2.insert("pi1".to_string(), -5.0);
        v2.insert("pi2".to_string(), 5.0);

        FingerprintStore::from_entries(vec![
            FingerprintEntry {
                zone_id: 1,
                x: 0,
                y: 0,
                vectors: vec![v1],
            },
            FingerprintEntry {
                zone_id: 2,
                x: 10,
                y: 10,
                vectors: vec![v2],
            },
        ])
    }

    fn msg(rpi: &str, mac: &str, rssi: i32) -> String {
        format!(
            r#"{{"ts": 0.0, "rpi_id": "{}", "mac": "{}", "rssi": {}}}"#,
            rpi, mac, rssi
        )
    }

    #[test]
    fn refuses_to_start_with_no_calibration() {
        let config = EngineConfig::default();
        let empty_store = FingerprintStore::from_entries(vec![]);
        let result = LocalizationEngine::new(config, empty_store, HashMap::new(), None);
        assert!(matches!(result, Err(EngineError::NoCalibration)));
    }

    #[test]
    fn boundary_scenario_1_insufficient_sources() {
        let mut config = EngineConfig::default();
        config.min_sources = 8;
        let mut engine =
            LocalizationEngine::new(config, store_with_two_zones(), HashMap::new(), None).unwrap();

        // Only 2 distinct sniffers, far short of min_sources=8.
        let o1 = engine.process_message(&msg("pi1", "aa:bb:cc:dd:ee:01", -60), 0.0);
        let o2 = engine.process_message(&msg("pi2", "aa:bb:cc:dd:ee:01", -65), 0.1);

        assert!(o1.assignment.is_none() && o1.uncertain.is_none() && o1.transition.is_none());
        assert!(o2.assignment.is_none() && o2.uncertain.is_none() && o2.transition.is_none());
    }

    #[test]
    fn end_to_end_assignment_with_enough_sources() {
        let mut config = EngineConfig::default();
        config.min_sources = 2;
        config.margin_gate = 0.0;
        let mut engine =
            LocalizationEngine::new(config, store_with_two_zones(), HashMap::new(), None).unwrap();

        engine.process_message(&msg("pi1", "aa:bb:cc:dd:ee:01", -55), 0.0);
        let outcome = engine.process_message(&msg("pi2", "aa:bb:cc:dd:ee:01", -65), 0.1);

        assert!(outcome.assignment.is_some() || outcome.uncertain.is_some());
    }

    #[test]
    fn session_cleanup_also_drops_the_device_window_buffer() {
        // spec.md §4.5: cleanup removes sessions "and their associated
        // device-ID mappings, transition state, and buffers". Force a
        // cleanup sweep on the very first assignment and confirm the
        // device's window buffer is torn down along with the session.
        let mut config = EngineConfig::default();
        config.min_sources = 2;
        config.margin_gate = 0.0;
        config.session_cleanup_interval = 1;
        config.session_max_age_sec = 0.0;
        let mut engine =
            LocalizationEngine::new(config, store_with_two_zones(), HashMap::new(), None).unwrap();

        engine.process_message(&msg("pi1", "aa:bb:cc:dd:ee:01", -55), 0.0);
        engine.process_message(&msg("pi2", "aa:bb:cc:dd:ee:01", -65), 0.1);

        assert_eq!(engine.device_count(), 0);
        assert_eq!(engine.session_count(), 0);
    }

    #[test]
    fn ts_kst_formats_utc_plus_nine_with_suffix() {
        let formatted = ts_kst(0.0);
        assert_eq!(formatted, "1970-01-01 09:00:00 KST");
    }
}

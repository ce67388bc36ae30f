//! Engine configuration, overridable via environment variables.
//!
//! Every field mirrors a row of the configuration table: read the
//! corresponding `NEURALZONE_*` environment variable if present and
//! parseable, otherwise fall back to the documented default. There is no
//! config-file format; this follows the same "env var or default" shape the
//! reference system used per setting.

use std::env;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Tunable parameters for the live localization pipeline and calibration
/// collector. Construct with [`EngineConfig::from_env`] to pick up
/// deployment overrides, or [`EngineConfig::default`] for the documented
/// defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Per-device window buffer horizon, in seconds.
    pub window_sec: f64,
    /// Minimum distinct fresh sniffers required to attempt a prediction.
    pub min_sources: usize,
    /// Maximum staleness, in seconds, for a sniffer's latest sample to
    /// count toward the live vector.
    pub per_pi_fresh_sec: f64,
    /// Weighted-L1 distance threshold below which a fingerprint is
    /// considered an L1 match.
    pub match_diff_dbm: f64,
    /// Minimum top-1/top-2 confidence margin required to emit an
    /// assignment instead of an uncertain record.
    pub margin_gate: f64,
    /// Composite score weight for the L1-match component.
    pub l1_weight: f64,
    /// Composite score weight for the rank-match component.
    pub rank_weight: f64,
    /// Rank-distance threshold below which a fingerprint is a rank match.
    pub rank_match_threshold: f64,
    /// Consecutive confident predictions of a new zone required before the
    /// debouncer confirms a transition.
    pub transition_confirm_count: u32,
    /// Age, in seconds, after which a device is considered gone and
    /// eligible as a session-linking candidate.
    pub stale_mac_sec: f64,
    /// Rank-distance cutoff for linking a reappeared device to a stale
    /// session.
    pub session_rank_threshold: f64,
    /// Number of assignments between session garbage-collection sweeps.
    pub session_cleanup_interval: u64,
    /// Session age, in seconds, after which it is garbage-collected.
    pub session_max_age_sec: f64,
    /// Sanity-band floor for signed dBm RSSI values.
    pub rssi_min_dbm: i32,
    /// Sanity-band ceiling for signed dBm RSSI values.
    pub rssi_max_dbm: i32,
    /// Whether `hash_mac` hashes device identifiers or passes them through.
    pub mac_hash_enabled: bool,
    /// Salt used when `mac_hash_enabled` is true.
    pub mac_salt: String,
    /// Maximum retry attempts for the upload sidecar before a batch is
    /// persisted to the failed-uploads stream.
    pub upload_max_retries: u32,

    // Calibration collector parameters (spec.md §4.7). Not part of the
    // live-mode config table but environment-overridable the same way.
    pub max_samples_per_pi: usize,
    pub timeout_sec: f64,
    pub sync_window_sec: f64,
    pub min_pis_for_vector: usize,
    pub max_vectors_per_zone: usize,
    pub recent_window: usize,
    pub outlier_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_sec: 5.0,
            min_sources: 8,
            per_pi_fresh_sec: 3.0,
            match_diff_dbm: 7.0,
            margin_gate: 0.15,
            l1_weight: 0.6,
            rank_weight: 0.4,
            rank_match_threshold: 1.5,
            transition_confirm_count: 3,
            stale_mac_sec: 30.0,
            session_rank_threshold: 1.5,
            session_cleanup_interval: 500,
            session_max_age_sec: 3600.0,
            rssi_min_dbm: -95,
            rssi_max_dbm: -20,
            mac_hash_enabled: false,
            mac_salt: "neuralzone-dev-salt-change-me".to_string(),
            upload_max_retries: 3,

            max_samples_per_pi: 80,
            timeout_sec: 1200.0,
            sync_window_sec: 3.0,
            min_pis_for_vector: 8,
            max_vectors_per_zone: 2000,
            recent_window: 4,
            outlier_threshold: 15.0,
        }
    }
}

impl EngineConfig {
    /// Build a config starting from defaults and overriding each field with
    /// its `NEURALZONE_*` environment variable when present and parseable.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            window_sec: env_or("NEURALZONE_WINDOW_SEC", d.window_sec),
            min_sources: env_or("NEURALZONE_MIN_SOURCES", d.min_sources),
            per_pi_fresh_sec: env_or("NEURALZONE_PER_PI_FRESH_SEC", d.per_pi_fresh_sec),
            match_diff_dbm: env_or("NEURALZONE_MATCH_DIFF_DBM", d.match_diff_dbm),
            margin_gate: env_or("NEURALZONE_MARGIN_GATE", d.margin_gate),
            l1_weight: env_or("NEURALZONE_L1_WEIGHT", d.l1_weight),
            rank_weight: env_or("NEURALZONE_RANK_WEIGHT", d.rank_weight),
            rank_match_threshold: env_or(
                "NEURALZONE_RANK_MATCH_THRESHOLD",
                d.rank_match_threshold,
            ),
            transition_confirm_count: env_or(
                "NEURALZONE_TRANSITION_CONFIRM_COUNT",
                d.transition_confirm_count,
            ),
            stale_mac_sec: env_or("NEURALZONE_STALE_MAC_SEC", d.stale_mac_sec),
            session_rank_threshold: env_or(
                "NEURALZONE_SESSION_RANK_THRESHOLD",
                d.session_rank_threshold,
            ),
            session_cleanup_interval: env_or(
                "NEURALZONE_SESSION_CLEANUP_INTERVAL",
                d.session_cleanup_interval,
            ),
            session_max_age_sec: env_or("NEURALZONE_SESSION_MAX_AGE_SEC", d.session_max_age_sec),
            rssi_min_dbm: env_or("NEURALZONE_RSSI_MIN_DBM", d.rssi_min_dbm),
            rssi_max_dbm: env_or("NEURALZONE_RSSI_MAX_DBM", d.rssi_max_dbm),
            mac_hash_enabled: env_or("NEURALZONE_MAC_HASH_ENABLED", d.mac_hash_enabled),
            mac_salt: std::env::var("NEURALZONE_MAC_SALT").unwrap_or(d.mac_salt),
            upload_max_retries: env_or("NEURALZONE_UPLOAD_MAX_RETRIES", d.upload_max_retries),

            max_samples_per_pi: env_or("NEURALZONE_MAX_SAMPLES_PER_PI", d.max_samples_per_pi),
            timeout_sec: env_or("NEURALZONE_CAL_TIMEOUT_SEC", d.timeout_sec),
            sync_window_sec: env_or("NEURALZONE_SYNC_WINDOW_SEC", d.sync_window_sec),
            min_pis_for_vector: env_or("NEURALZONE_MIN_PIS_FOR_VECTOR", d.min_pis_for_vector),
            max_vectors_per_zone: env_or(
                "NEURALZONE_MAX_VECTORS_PER_ZONE",
                d.max_vectors_per_zone,
            ),
            recent_window: env_or("NEURALZONE_RECENT_WINDOW", d.recent_window),
            outlier_threshold: env_or("NEURALZONE_OUTLIER_THRESHOLD", d.outlier_threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let c = EngineConfig::default();
        assert_eq!(c.window_sec, 5.0);
        assert_eq!(c.min_sources, 8);
        assert_eq!(c.per_pi_fresh_sec, 3.0);
        assert_eq!(c.match_diff_dbm, 7.0);
        assert_eq!(c.margin_gate, 0.15);
        assert_eq!((c.l1_weight, c.rank_weight), (0.6, 0.4));
        assert_eq!(c.rank_match_threshold, 1.5);
        assert_eq!(c.transition_confirm_count, 3);
        assert_eq!(c.stale_mac_sec, 30.0);
        assert_eq!(c.session_rank_threshold, 1.5);
        assert_eq!(c.session_max_age_sec, 3600.0);
        assert_eq!((c.rssi_min_dbm, c.rssi_max_dbm), (-95, -20));
        assert!(!c.mac_hash_enabled);
    }

    #[test]
    fn from_env_falls_back_to_default_when_unset() {
        std::env::remove_var("NEURALZONE_MARGIN_GATE");
        let c = EngineConfig::from_env();
        assert_eq!(c.margin_gate, EngineConfig::default().margin_gate);
    }

    #[test]
    fn from_env_overrides_when_set_and_parseable() {
        std::env::set_var("NEURALZONE_MIN_SOURCES", "4");
        let c = EngineConfig::from_env();
        assert_eq!(c.min_sources, 4);
        std::env::remove_var("NEURALZONE_MIN_SOURCES");
    }
}

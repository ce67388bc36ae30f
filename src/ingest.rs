//! Ingest adapter (spec.md §4.1): decode inbound messages, normalize RSSI,
//! and optionally hash the MAC identifier for privacy.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::types::IngestedSample;

/// Raw inbound message shape: `{ "ts": <float>, "rpi_id": "<sniffer>", "mac": "<hex>", "rssi": <int> }`.
/// `ts` is publisher time and informational only; the adapter stamps the
/// authoritative `rx_ts` itself.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[allow(dead_code)]
    pub ts: f64,
    pub rpi_id: String,
    pub mac: String,
    pub rssi: i64,
}

/// Signed dBm passes through if within `[rssi_min, rssi_max]`; unsigned
/// 8-bit encodings in `128..=255` are remapped via `v - 256`; anything else
/// is rejected.
pub fn normalize_rssi(v: i64, rssi_min: i32, rssi_max: i32) -> Option<i32> {
    if (rssi_min as i64..=rssi_max as i64).contains(&v) {
        return Some(v as i32);
    }
    if (128..=255).contains(&v) {
        let remapped = v - 256;
        if (rssi_min as i64..=rssi_max as i64).contains(&remapped) {
            return Some(remapped as i32);
        }
    }
    None
}

/// Deterministic SHA-256 hash of a MAC address with salt, truncated to a
/// 16-character hex string — enough uniqueness for this deployment scale
/// while keeping ids short in logs. Passthrough when hashing is disabled.
pub fn hash_mac(mac: &str, enabled: bool, salt: &str) -> String {
    if !enabled {
        return mac.to_string();
    }
    let normalized = mac.trim().to_lowercase().replace([':', '-'], "");
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

/// Decode one raw inbound line, stamping it with local receive time.
/// Parse failures are reported as [`EngineError::ParseError`] for the
/// caller to log and drop; there are no retries at this layer.
pub fn decode(
    raw: &str,
    rx_ts: f64,
    rssi_min: i32,
    rssi_max: i32,
    mac_hash_enabled: bool,
    mac_salt: &str,
) -> Result<IngestedSample, EngineError> {
    let msg: InboundMessage =
        serde_json::from_str(raw).map_err(|e| EngineError::ParseError(e.to_string()))?;

    let rssi = normalize_rssi(msg.rssi, rssi_min, rssi_max)
        .ok_or_else(|| EngineError::ParseError(format!("rssi out of band: {}", msg.rssi)))?;

    let sniffer_id = msg.rpi_id.trim().to_lowercase();
    if sniffer_id.is_empty() {
        return Err(EngineError::ParseError("empty rpi_id".to_string()));
    }

    let device_id = hash_mac(&msg.mac, mac_hash_enabled, mac_salt);

    Ok(IngestedSample {
        rx_ts,
        sniffer_id,
        device_id,
        rssi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_dbm_passes_through_in_band() {
        assert_eq!(normalize_rssi(-60, -95, -20), Some(-60));
    }

    #[test]
    fn unsigned_encoding_remaps() {
        // 256 - 60 = 196 should decode back to -60
        assert_eq!(normalize_rssi(196, -95, -20), Some(-60));
    }

    #[test]
    fn out_of_band_value_is_rejected() {
        assert_eq!(normalize_rssi(5, -95, -20), None);
    }

    #[test]
    fn hash_mac_disabled_passes_through() {
        assert_eq!(hash_mac("AA:BB:CC:DD:EE:FF", false, "salt"), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn hash_mac_is_deterministic_for_same_salt() {
        let a = hash_mac("aa:bb:cc:dd:ee:ff", true, "salt1");
        let b = hash_mac("AA:BB:CC:DD:EE:FF", true, "salt1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn hash_mac_differs_across_salts() {
        let a = hash_mac("aa:bb:cc:dd:ee:ff", true, "salt1");
        let b = hash_mac("aa:bb:cc:dd:ee:ff", true, "salt2");
        assert_ne!(a, b);
    }

    #[test]
    fn decode_rejects_malformed_json() {
        let result = decode("not json", 0.0, -95, -20, false, "");
        assert!(result.is_err());
    }

    #[test]
    fn decode_happy_path() {
        let raw = r#"{"ts": 123.0, "rpi_id": "PI5", "mac": "aa:bb:cc:dd:ee:ff", "rssi": -62}"#;
        let sample = decode(raw, 200.0, -95, -20, false, "").unwrap();
        assert_eq!(sample.rx_ts, 200.0);
        assert_eq!(sample.sniffer_id, "pi5");
        assert_eq!(sample.rssi, -62);
    }
}

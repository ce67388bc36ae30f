//! Fingerprint loader (spec.md §4.8) and per-zone per-sniffer reliability
//! weight precomputation (spec.md §3).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::EngineError;
use crate::types::{CalibrationRecord, FingerprintEntry};

/// Read-only after startup: the calibrated fingerprint set plus
/// precomputed per-zone per-sniffer weights.
#[derive(Debug, Default)]
pub struct FingerprintStore {
    entries: Vec<FingerprintEntry>,
    weights: HashMap<(u32, String), f64>,
}

impl FingerprintStore {
    pub fn from_entries(entries: Vec<FingerprintEntry>) -> Self {
        let weights = compute_weights(&entries);
        Self { entries, weights }
    }

    /// Load calibration JSONL records from `path`. Duplicate `zone_id`
    /// entries keep the record with the latest `created_ts`; records with
    /// an empty vector list are discarded.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path).map_err(EngineError::Io)?;
        let mut latest: HashMap<u32, CalibrationRecord> = HashMap::new();

        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<CalibrationRecord>(line) {
                Ok(record) => {
                    if record.vectors.is_empty() {
                        continue;
                    }
                    let replace = match latest.get(&record.zone_id) {
                        Some(existing) => record.created_ts > existing.created_ts,
                        None => true,
                    };
                    if replace {
                        latest.insert(record.zone_id, record);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        where_ = "fingerprint_loader",
                        line = line_no,
                        error = %e,
                        "skipping corrupt calibration line"
                    );
                }
            }
        }

        let entries = latest
            .into_values()
            .map(|r| FingerprintEntry {
                zone_id: r.zone_id,
                x: r.x,
                y: r.y,
                vectors: r.vectors,
            })
            .collect();

        Ok(Self::from_entries(entries))
    }

    pub fn entries(&self) -> &[FingerprintEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn weights_for_zone(&self, zone_id: u32) -> HashMap<String, f64> {
        self.weights
            .iter()
            .filter(|((z, _), _)| *z == zone_id)
            .map(|((_, sniffer), w)| (sniffer.clone(), *w))
            .collect()
    }
}

/// `w = clamp(1.0 - std/12.5, 0.2, 1.0)`. With fewer than 2 samples, the
/// weight defaults to 0.5 (spec.md §3) since a standard deviation isn't
/// meaningful yet.
fn compute_weights(entries: &[FingerprintEntry]) -> HashMap<(u32, String), f64> {
    let mut per_sniffer: HashMap<(u32, String), Vec<f64>> = HashMap::new();
    for entry in entries {
        for vector in &entry.vectors {
            for (sniffer, value) in vector {
                per_sniffer
                    .entry((entry.zone_id, sniffer.clone()))
                    .or_default()
                    .push(*value);
            }
        }
    }

    per_sniffer
        .into_iter()
        .map(|(key, values)| {
            let weight = if values.len() < 2 {
                0.5
            } else {
                let std = stddev(&values);
                (1.0 - std / 12.5).clamp(0.2, 1.0)
            };
            (key, weight)
        })
        .collect()
}

fn stddev(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_defaults_to_half_under_two_samples() {
        let entries = vec![FingerprintEntry {
            zone_id: 1,
            x: 0,
            y: 0,
            vectors: vec![[("p1".to_string(), 0.0)].into_iter().collect()],
        }];
        let store = FingerprintStore::from_entries(entries);
        let w = store.weights_for_zone(1);
        assert_eq!(w["p1"], 0.5);
    }

    #[test]
    fn weight_clamped_into_0_2_1_0_range() {
        // Huge spread should clamp to the floor, not go negative.
        let entries = vec![FingerprintEntry {
            zone_id: 1,
            x: 0,
            y: 0,
            vectors: vec![
                [("p1".to_string(), -50.0)].into_iter().collect(),
                [("p1".to_string(), 50.0)].into_iter().collect(),
            ],
        }];
        let store = FingerprintStore::from_entries(entries);
        let w = store.weights_for_zone(1)["p1"];
        assert!((0.2..=1.0).contains(&w));
    }

    #[test]
    fn duplicate_zone_keeps_latest_created_ts() {
        use std::io::Write;
        let dir = std::env::temp_dir();
        let path = dir.join(format!("neuralzone_test_fp_{}.jsonl", std::process::id()));
        let mut f = fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"{{"created_ts":1.0,"created_ts_kst":"t","zone_id":1,"x":0,"y":0,"phone_mac_used":"m","max_samples_per_pi":1,"sync_window_sec":1.0,"min_pis_for_vector":1,"vectors_collected":1,"vector_type":"t","timebase":"t","vectors":[{{"p1":1.0}}]}}"#
        )
        .unwrap();
        writeln!(
            f,
            r#"{{"created_ts":2.0,"created_ts_kst":"t","zone_id":1,"x":0,"y":0,"phone_mac_used":"m","max_samples_per_pi":1,"sync_window_sec":1.0,"min_pis_for_vector":1,"vectors_collected":1,"vector_type":"t","timebase":"t","vectors":[{{"p1":2.0}}]}}"#
        )
        .unwrap();
        drop(f);

        let store = FingerprintStore::load(&path).unwrap();
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.entries()[0].vectors[0]["p1"], 2.0);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_vector_records_are_discarded() {
        use std::io::Write;
        let dir = std::env::temp_dir();
        let path = dir.join(format!("neuralzone_test_fp_empty_{}.jsonl", std::process::id()));
        let mut f = fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"{{"created_ts":1.0,"created_ts_kst":"t","zone_id":1,"x":0,"y":0,"phone_mac_used":"m","max_samples_per_pi":1,"sync_window_sec":1.0,"min_pis_for_vector":1,"vectors_collected":0,"vector_type":"t","timebase":"t","vectors":[]}}"#
        )
        .unwrap();
        drop(f);

        let store = FingerprintStore::load(&path).unwrap();
        assert!(store.is_empty());

        fs::remove_file(&path).ok();
    }
}

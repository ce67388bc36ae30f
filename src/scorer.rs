//! Zone scorer and margin gate (spec.md §4.4).
//!
//! Scores a live normalized vector against every calibrated zone's
//! fingerprint set using a composite of weighted-L1 match and rank-order
//! match, then applies the top-1/top-2 margin gate.

use std::collections::HashMap;

use crate::fingerprint::FingerprintStore;
use crate::types::SniffVector;

/// Weighted L1 distance over sniffers common to both vectors. `None` if
/// there is no overlap (infinite distance, no match possible).
fn weighted_l1(
    live: &SniffVector<f64>,
    fingerprint: &SniffVector<f64>,
    weights: &HashMap<String, f64>,
) -> Option<f64> {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (sniffer, live_val) in live {
        if let Some(fp_val) = fingerprint.get(sniffer) {
            let w = weights.get(sniffer).copied().unwrap_or(0.5);
            weighted_sum += w * (live_val - fp_val).abs();
            weight_total += w;
        }
    }
    if weight_total <= 0.0 {
        None
    } else {
        Some(weighted_sum / weight_total)
    }
}

/// Rank each sniffer by descending RSSI-like value (0 = strongest).
fn ranks(vector: &SniffVector<f64>) -> HashMap<String, usize> {
    let mut entries: Vec<(&String, &f64)> = vector.iter().collect();
    entries.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap());
    entries
        .into_iter()
        .enumerate()
        .map(|(rank, (sniffer, _))| (sniffer.clone(), rank))
        .collect()
}

/// Mean absolute rank difference over sniffers common to both vectors.
/// `None` if there is no overlap.
pub fn rank_distance(live: &SniffVector<f64>, other: &SniffVector<f64>) -> Option<f64> {
    let live_ranks = ranks(live);
    let other_ranks = ranks(other);

    let mut total = 0.0;
    let mut count = 0usize;
    for (sniffer, live_rank) in &live_ranks {
        if let Some(other_rank) = other_ranks.get(sniffer) {
            total += (*live_rank as f64 - *other_rank as f64).abs();
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

pub struct ScorerParams {
    pub match_diff_dbm: f64,
    pub rank_match_threshold: f64,
    pub l1_weight: f64,
    pub rank_weight: f64,
}

/// Score a single fingerprint vector against the live vector, producing the
/// composite `fp_score` of spec.md §4.4.
fn score_fingerprint(
    live: &SniffVector<f64>,
    fingerprint: &SniffVector<f64>,
    weights: &HashMap<String, f64>,
    params: &ScorerParams,
) -> f64 {
    let l1_match = match weighted_l1(live, fingerprint, weights) {
        Some(l1) if l1 <= params.match_diff_dbm => 1.0,
        _ => 0.0,
    };
    let rank_match = match rank_distance(live, fingerprint) {
        Some(rd) if rd <= params.rank_match_threshold => 1.0,
        _ => 0.0,
    };
    params.l1_weight * l1_match + params.rank_weight * rank_match
}

/// Top-2 candidate zones with their confidences.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub best_zone: u32,
    pub best_conf: f64,
    pub second_zone: Option<u32>,
    pub second_conf: Option<f64>,
}

impl ScoreResult {
    pub fn margin(&self) -> f64 {
        self.best_conf - self.second_conf.unwrap_or(0.0)
    }
}

/// Score a live normalized vector against every calibrated zone. Returns
/// `None` if no zone has a non-empty fingerprint list.
pub fn score_zones(
    live: &SniffVector<f64>,
    store: &FingerprintStore,
    params: &ScorerParams,
) -> Option<ScoreResult> {
    let mut confidences: Vec<(u32, f64)> = Vec::new();

    for entry in store.entries() {
        if entry.vectors.is_empty() {
            continue;
        }
        let weights = store.weights_for_zone(entry.zone_id);
        let sum: f64 = entry
            .vectors
            .iter()
            .map(|fp| score_fingerprint(live, fp, &weights, params))
            .sum();
        let conf = sum / entry.vectors.len() as f64;
        confidences.push((entry.zone_id, conf));
    }

    if confidences.is_empty() {
        return None;
    }

    // Sort by confidence descending, ties broken by zone_id ascending.
    confidences.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));

    let (best_zone, best_conf) = confidences[0];
    let second = confidences.get(1).copied();

    Some(ScoreResult {
        best_zone,
        best_conf,
        second_zone: second.map(|(z, _)| z),
        second_conf: second.map(|(_, c)| c),
    })
}

/// Whether a [`ScoreResult`] clears the margin gate (spec.md §4.4).
pub fn passes_margin_gate(result: &ScoreResult, margin_gate: f64) -> bool {
    result.margin() >= margin_gate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FingerprintStore;
    use crate::types::FingerprintEntry;

    fn vec_of(pairs: &[(&str, f64)]) -> SniffVector<f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn params() -> ScorerParams {
        ScorerParams {
            match_diff_dbm: 7.0,
            rank_match_threshold: 1.5,
            l1_weight: 0.6,
            rank_weight: 0.4,
        }
    }

    #[test]
    fn rank_order_invariant_to_constant_shift() {
        let a = vec_of(&[("p1", -5.0), ("p2", 0.0), ("p3", 5.0)]);
        let b = vec_of(&[("p1", 5.0), ("p2", 10.0), ("p3", 15.0)]);
        assert_eq!(rank_distance(&a, &b), Some(0.0));
    }

    #[test]
    fn score_zones_ties_break_by_zone_id_ascending() {
        let fp = vec_of(&[("p1", 0.0), ("p2", 0.0)]);
        let store = FingerprintStore::from_entries(vec![
            FingerprintEntry {
                zone_id: 5,
                x: 0,
                y: 0,
                vectors: vec![fp.clone()],
            },
            FingerprintEntry {
                zone_id: 2,
                x: 0,
                y: 0,
                vectors: vec![fp.clone()],
            },
        ]);
        let live = fp;
        let result = score_zones(&live, &store, &params()).unwrap();
        assert_eq!(result.best_zone, 2);
        assert_eq!(result.second_zone, Some(5));
    }

    #[test]
    fn margin_gate_boundary_scenario_4() {
        // spec.md §8 boundary scenario 4: conf 0.6 vs 0.55, gate 0.15
        let result = ScoreResult {
            best_zone: 1,
            best_conf: 0.6,
            second_zone: Some(2),
            second_conf: Some(0.55),
        };
        assert!((result.margin() - 0.05).abs() < 1e-9);
        assert!(!passes_margin_gate(&result, 0.15));
    }

    #[test]
    fn empty_fingerprint_store_yields_no_score() {
        let store = FingerprintStore::from_entries(vec![]);
        let live = vec_of(&[("p1", 0.0)]);
        assert!(score_zones(&live, &store, &params()).is_none());
    }

    #[test]
    fn zones_with_empty_vector_lists_are_skipped() {
        let store = FingerprintStore::from_entries(vec![FingerprintEntry {
            zone_id: 1,
            x: 0,
            y: 0,
            vectors: vec![],
        }]);
        let live = vec_of(&[("p1", 0.0)]);
        assert!(score_zones(&live, &store, &params()).is_none());
    }
}

//! Transition debouncer (spec.md §4.6): per-session state machine that
//! confirms a zone change only after `N` consecutive confident predictions
//! of the new zone.

use crate::types::{DwellEvent, TransitionEvent, TransitionState};

/// Side effects produced by feeding one confident prediction through the
/// debouncer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DebounceEffects {
    pub transition: Option<TransitionEvent>,
    pub dwell: Option<DwellEvent>,
}

pub struct Debouncer {
    pub confirm_count: u32,
}

impl Debouncer {
    pub fn new(confirm_count: u32) -> Self {
        Self { confirm_count }
    }

    /// Advance `state` with one confident prediction `zone_id` observed at
    /// `ts`, for a session belonging to `device_id`/`session_id` with
    /// `confidence` for the logged transition event. Uncertain ticks must
    /// never reach this function — only the margin-gated path calls it.
    pub fn advance(
        &self,
        state: &TransitionState,
        zone_id: u32,
        ts: f64,
        device_id: &str,
        session_id: &str,
        confidence: f64,
    ) -> (TransitionState, DebounceEffects) {
        match state {
            TransitionState::Initial => {
                let transition = TransitionEvent {
                    ts,
                    phone_id: device_id.to_string(),
                    session_id: session_id.to_string(),
                    from_zone: None,
                    to_zone: zone_id,
                    confidence,
                };
                (
                    TransitionState::Stable {
                        zone_id,
                        enter_ts: ts,
                    },
                    DebounceEffects {
                        transition: Some(transition),
                        dwell: None,
                    },
                )
            }

            TransitionState::Stable { zone_id: z, enter_ts } => {
                if zone_id == *z {
                    (state.clone(), DebounceEffects::default())
                } else {
                    (
                        TransitionState::Pending {
                            stable_zone: *z,
                            stable_enter_ts: *enter_ts,
                            candidate_zone: zone_id,
                            count: 1,
                            first_seen_ts: ts,
                        },
                        DebounceEffects::default(),
                    )
                }
            }

            TransitionState::Pending {
                stable_zone,
                stable_enter_ts,
                candidate_zone,
                count,
                first_seen_ts,
            } => {
                if zone_id == *stable_zone {
                    // A revisit to the already-stable zone clears any
                    // in-flight pending candidate unconditionally, even one
                    // confirmation away from firing. Preserved intentionally
                    // (see DESIGN.md Open Question 1).
                    (
                        TransitionState::Stable {
                            zone_id: *stable_zone,
                            enter_ts: *stable_enter_ts,
                        },
                        DebounceEffects::default(),
                    )
                } else if zone_id == *candidate_zone {
                    if count + 1 < self.confirm_count {
                        (
                            TransitionState::Pending {
                                stable_zone: *stable_zone,
                                stable_enter_ts: *stable_enter_ts,
                                candidate_zone: *candidate_zone,
                                count: count + 1,
                                first_seen_ts: *first_seen_ts,
                            },
                            DebounceEffects::default(),
                        )
                    } else {
                        let dwell = DwellEvent {
                            phone_id: device_id.to_string(),
                            session_id: session_id.to_string(),
                            zone_id: *stable_zone,
                            enter_ts: *stable_enter_ts,
                            exit_ts: *first_seen_ts,
                            dwell_sec: *first_seen_ts - *stable_enter_ts,
                        };
                        let transition = TransitionEvent {
                            ts: *first_seen_ts,
                            phone_id: device_id.to_string(),
                            session_id: session_id.to_string(),
                            from_zone: Some(*stable_zone),
                            to_zone: *candidate_zone,
                            confidence,
                        };
                        (
                            TransitionState::Stable {
                                zone_id: *candidate_zone,
                                enter_ts: *first_seen_ts,
                            },
                            DebounceEffects {
                                transition: Some(transition),
                                dwell: Some(dwell),
                            },
                        )
                    }
                } else {
                    (
                        TransitionState::Pending {
                            stable_zone: *stable_zone,
                            stable_enter_ts: *stable_enter_ts,
                            candidate_zone: zone_id,
                            count: 1,
                            first_seen_ts: ts,
                        },
                        DebounceEffects::default(),
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_prediction_emits_null_to_zone_transition() {
        let d = Debouncer::new(3);
        let (state, effects) = d.advance(&TransitionState::Initial, 5, 0.0, "dev", "S0001", 0.8);
        assert_eq!(state, TransitionState::Stable { zone_id: 5, enter_ts: 0.0 });
        let t = effects.transition.unwrap();
        assert_eq!(t.from_zone, None);
        assert_eq!(t.to_zone, 5);
    }

    #[test]
    fn boundary_scenario_2_two_confirmations_not_enough() {
        // TRANSITION_CONFIRM_COUNT=3, STABLE(5), predictions: 5,7,7,5
        let d = Debouncer::new(3);
        let mut state = TransitionState::Stable { zone_id: 5, enter_ts: 0.0 };
        let mut transitions = 0;

        for (i, z) in [5u32, 7, 7, 5].iter().enumerate() {
            let (next, effects) = d.advance(&state, *z, i as f64 + 1.0, "dev", "S0001", 0.8);
            if effects.transition.is_some() {
                transitions += 1;
            }
            state = next;
        }

        assert_eq!(transitions, 0);
        assert_eq!(state, TransitionState::Stable { zone_id: 5, enter_ts: 0.0 });
    }

    #[test]
    fn boundary_scenario_3_confirmed_transition_emits_dwell_and_transition() {
        // predictions 5,7,7,7 -> transition 5->7 at ts of first 7; dwell(5, enter, exit=first_7_ts)
        let d = Debouncer::new(3);
        let mut state = TransitionState::Stable { zone_id: 5, enter_ts: 10.0 };
        let mut last_effects = DebounceEffects::default();

        for (i, z) in [5u32, 7, 7, 7].iter().enumerate() {
            let (next, effects) = d.advance(&state, *z, 20.0 + i as f64, "dev", "S0001", 0.8);
            if effects.transition.is_some() || effects.dwell.is_some() {
                last_effects = effects.clone();
            }
            state = next;
        }

        assert_eq!(state, TransitionState::Stable { zone_id: 7, enter_ts: 21.0 });
        let transition = last_effects.transition.unwrap();
        assert_eq!(transition.from_zone, Some(5));
        assert_eq!(transition.to_zone, 7);
        assert_eq!(transition.ts, 21.0);

        let dwell = last_effects.dwell.unwrap();
        assert_eq!(dwell.zone_id, 5);
        assert_eq!(dwell.enter_ts, 10.0);
        assert_eq!(dwell.exit_ts, 21.0);
        assert!((dwell.dwell_sec - 11.0).abs() < 1e-9);
    }

    #[test]
    fn revisit_to_stable_zone_clears_pending_even_one_away() {
        // documented possible bug: pending at count=N-1, then a revisit to
        // the stable zone clears it unconditionally, preserving the
        // original enter_ts rather than the revisit timestamp.
        let d = Debouncer::new(3);
        let mut state = TransitionState::Stable { zone_id: 5, enter_ts: 0.0 };
        let (next, _) = d.advance(&state, 7, 1.0, "dev", "S0001", 0.8);
        state = next;
        let (next, _) = d.advance(&state, 7, 2.0, "dev", "S0001", 0.8);
        state = next; // Pending(5, 7, count=2, ..) — one away from firing (N=3)

        if let TransitionState::Pending { count, .. } = &state {
            assert_eq!(*count, 2);
        } else {
            panic!("expected pending state");
        }

        let (next, effects) = d.advance(&state, 5, 3.0, "dev", "S0001", 0.8);
        assert_eq!(next, TransitionState::Stable { zone_id: 5, enter_ts: 0.0 });
        assert!(effects.transition.is_none());
        assert!(effects.dwell.is_none());
    }

    #[test]
    fn unrelated_candidate_restarts_pending_count() {
        let d = Debouncer::new(3);
        let state = TransitionState::Pending {
            stable_zone: 5,
            stable_enter_ts: 0.0,
            candidate_zone: 7,
            count: 2,
            first_seen_ts: 1.0,
        };
        let (next, _) = d.advance(&state, 9, 5.0, "dev", "S0001", 0.8);
        assert_eq!(
            next,
            TransitionState::Pending {
                stable_zone: 5,
                stable_enter_ts: 0.0,
                candidate_zone: 9,
                count: 1,
                first_seen_ts: 5.0
            }
        );
    }
}

//! Leading-edge debounce as a pure state machine.
//!
//! ```text
//! Idle ──call──▶ CoolingDown{until}            emit
//! CoolingDown ──call, now < until──▶ same      (trailing: Pending, schedule)
//! CoolingDown ──call, now ≥ until──▶ CoolingDown{now + window}   emit
//! Pending ──deadline──▶ CoolingDown{now + window}                emit
//! CoolingDown ──deadline, now ≥ until──▶ Idle
//! ```
//!
//! Suppressed calls never move `until`: a steady stream of calls yields one
//! emission per window, not one at the end of the stream.

use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    /// An emission happened; calls before `until` are suppressed
    CoolingDown { until: Instant },
    /// A suppressed call is owed a trailing emission at `until`
    Pending { until: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceEvent {
    Call,
    /// A scheduled deadline elapsed
    Deadline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceAction {
    Emit,
    /// Deliver `DebounceEvent::Deadline` at this instant
    Schedule(Instant),
}

/// Next state and side effect for `event` arriving at `now`.
pub fn transition(
    state: DebounceState,
    event: DebounceEvent,
    now: Instant,
    window: Duration,
    trailing: bool,
) -> (DebounceState, Option<DebounceAction>) {
    use DebounceAction::*;
    use DebounceEvent::*;
    use DebounceState::*;

    let open_window = || CoolingDown { until: now + window };

    match (state, event) {
        (Idle, Call) => (open_window(), Some(Emit)),
        (Idle, Deadline) => (Idle, None),

        (CoolingDown { until }, Call) if now >= until => (open_window(), Some(Emit)),
        (CoolingDown { until }, Call) if trailing => (Pending { until }, Some(Schedule(until))),
        (CoolingDown { until }, Call) => (CoolingDown { until }, None),
        (CoolingDown { until }, Deadline) if now >= until => (Idle, None),
        (CoolingDown { until }, Deadline) => (CoolingDown { until }, None),

        // The deadline task may lag behind a call that already crossed `until`
        (Pending { until }, Call) if now >= until => (open_window(), Some(Emit)),
        (Pending { until }, Call) => (Pending { until }, None),
        (Pending { until }, Deadline) if now >= until => (open_window(), Some(Emit)),
        (Pending { until }, Deadline) => (Pending { until }, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DebounceAction::*;
    use DebounceEvent::*;
    use DebounceState::*;

    const WINDOW: Duration = Duration::from_millis(100);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_transition_table_leading_only() {
        let t0 = Instant::now();
        let until = t0 + WINDOW;

        let cases = [
            (Idle, Call, t0, CoolingDown { until }, Some(Emit)),
            (Idle, Deadline, t0, Idle, None),
            (CoolingDown { until }, Call, t0 + ms(50), CoolingDown { until }, None),
            (
                CoolingDown { until },
                Call,
                t0 + ms(100),
                CoolingDown {
                    until: t0 + ms(200),
                },
                Some(Emit),
            ),
            (CoolingDown { until }, Deadline, t0 + ms(100), Idle, None),
            (CoolingDown { until }, Deadline, t0 + ms(99), CoolingDown { until }, None),
        ];

        for (state, event, now, expected_state, expected_action) in cases {
            assert_eq!(
                transition(state, event, now, WINDOW, false),
                (expected_state, expected_action),
                "{state:?} + {event:?}"
            );
        }
    }

    #[test]
    fn test_transition_table_trailing() {
        let t0 = Instant::now();
        let until = t0 + WINDOW;

        let cases = [
            (
                CoolingDown { until },
                Call,
                t0 + ms(10),
                Pending { until },
                Some(Schedule(until)),
            ),
            (Pending { until }, Call, t0 + ms(20), Pending { until }, None),
            (
                Pending { until },
                Deadline,
                until,
                CoolingDown {
                    until: until + WINDOW,
                },
                Some(Emit),
            ),
            (
                Pending { until },
                Call,
                t0 + ms(150),
                CoolingDown {
                    until: t0 + ms(250),
                },
                Some(Emit),
            ),
        ];

        for (state, event, now, expected_state, expected_action) in cases {
            assert_eq!(
                transition(state, event, now, WINDOW, true),
                (expected_state, expected_action),
                "{state:?} + {event:?}"
            );
        }
    }

    #[test]
    fn test_suppressed_calls_do_not_extend_window() {
        let t0 = Instant::now();
        let mut state = Idle;
        let mut emissions = 0;

        // A call every 30ms for 300ms
        for step in 0..10 {
            let (next, action) = transition(state, Call, t0 + ms(step * 30), WINDOW, false);
            state = next;
            if action == Some(Emit) {
                emissions += 1;
            }
        }

        // Emits at 0, 120 and 240
        assert_eq!(emissions, 3);
    }
}

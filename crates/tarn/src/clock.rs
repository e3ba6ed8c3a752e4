use std::time::{SystemTime, UNIX_EPOCH};

///
/// Clock
///
/// Source of the engine's wall-clock reads. Execution snapshots the clock
/// once per query (for `now`, `current_date`, and staging stamps); the
/// commit gate reads it again when applying deltas.
///

pub trait Clock {
    fn now_ms(&self) -> i64;
}

///
/// SystemClock
///

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
            })
    }
}

///
/// FixedClock
///
/// Deterministic clock for tests and replayable runs.
///

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

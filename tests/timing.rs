//! Property tests for call timing and deadlines.

use std::time::Duration;

use callframe::timing::{CallTiming, Deadline};
use proptest::prelude::*;
use tokio::time::Instant;

fn at(base: Instant, offset_ms: i64) -> Instant {
    let magnitude = Duration::from_millis(offset_ms.unsigned_abs());
    if offset_ms >= 0 {
        base + magnitude
    } else {
        base.checked_sub(magnitude).unwrap_or(base)
    }
}

proptest! {
    #[test]
    fn stages_never_go_backwards(
        received in 0_i64..10_000,
        started in -10_000_i64..10_000,
        completed in -10_000_i64..10_000,
    ) {
        let base = Instant::now() + Duration::from_secs(60);
        let mut timing = CallTiming::default();
        timing.mark_received(at(base, received)).expect("receive");
        timing.mark_handling_started(at(base, started)).expect("start");
        timing.mark_handling_completed(at(base, completed)).expect("complete");

        let received = timing.received().expect("received");
        let started = timing.handling_started().expect("started");
        let completed = timing.handling_completed().expect("completed");
        prop_assert!(started >= received);
        prop_assert!(completed >= started);
    }

    #[test]
    fn deadline_passes_exactly_at_the_boundary(
        timeout_ms in 1_u64..100_000,
        probe_ms in 0_u64..200_000,
    ) {
        let start = Instant::now();
        let deadline = Deadline::after(start, Duration::from_millis(timeout_ms));
        let now = start + Duration::from_millis(probe_ms);
        prop_assert_eq!(deadline.has_passed(now), probe_ms >= timeout_ms);
        prop_assert!(!Deadline::infinite().has_passed(now));
    }
}

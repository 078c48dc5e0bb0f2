use chrono::{DateTime, Duration, Utc};

use crate::types::{SchedulerKind, TimedItem};

/// Minimum time between two fires of a periodic policy.
///
/// `None` for policies that are not driven by elapsed time.
pub fn period(kind: SchedulerKind) -> Option<Duration> {
    match kind {
        SchedulerKind::Daily => Some(Duration::days(1)),
        SchedulerKind::Weekly => Some(Duration::days(7)),
        SchedulerKind::Manual | SchedulerKind::Timed => None,
    }
}

/// Whether a periodic policy should fire at `now`.
///
/// A scheduler that never fired is always due. A `triggered_last` in the
/// future (clock moved backwards) is not.
pub fn periodic_due(
    kind: SchedulerKind,
    triggered_last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let Some(every) = period(kind) else {
        return false;
    };
    match triggered_last {
        None => true,
        Some(last) => now - last >= every,
    }
}

/// Earliest instant at which a tick could fire, as far as it can be known.
///
/// Returns `None` for manual schedulers and for timed schedulers with an
/// empty queue.
pub fn next_fire(
    kind: SchedulerKind,
    triggered_last: Option<DateTime<Utc>>,
    items: &[TimedItem],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match kind {
        SchedulerKind::Manual => None,
        SchedulerKind::Daily | SchedulerKind::Weekly => {
            let every = period(kind)?;
            Some(triggered_last.map_or(now, |last| (last + every).max(now)))
        }
        SchedulerKind::Timed => items.iter().map(|i| i.at).min().map(|at| at.max(now)),
    }
}

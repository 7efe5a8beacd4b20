use crate::model::{MachineAggregate, Status};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// A scan this many hours old or newer keeps a machine `Active`.
pub const ACTIVE_WINDOW_HOURS: i64 = 2;

pub fn active_window() -> Duration {
    Duration::hours(ACTIVE_WINDOW_HOURS)
}

/// First match wins: no lots, target met, recent scan, otherwise ready.
/// A machine that met its target is `Done` even if it scanned a minute ago.
pub fn classify(aggregate: &MachineAggregate, now: DateTime<Utc>) -> Status {
    if aggregate.lots.is_empty() {
        return Status::Ready;
    }
    if aggregate.total_target > 0 && aggregate.total_scanned >= aggregate.total_target {
        return Status::Done;
    }
    match aggregate.last_scan {
        Some(ts) if now.signed_duration_since(ts) <= active_window() => Status::Active,
        _ => Status::Ready,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub all: usize,
    pub ready: usize,
    pub active: usize,
    pub done: usize,
}

impl StatusCounts {
    pub fn tally<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = Status>,
    {
        statuses.into_iter().fold(Self::default(), |mut acc, status| {
            acc.all += 1;
            match status {
                Status::Ready => acc.ready += 1,
                Status::Active => acc.active += 1,
                Status::Done => acc.done += 1,
            }
            acc
        })
    }
}

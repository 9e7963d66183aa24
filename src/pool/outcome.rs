//! Request outcome reported back to the pool at release time.
//!
//! Glue layers that learn about a failure before they get to release the
//! connection report it with `ConnectionPool::report_failure`, which parks
//! the outcome in a thread-local slot. The next `ConnectionPool::release` on
//! the same thread consumes it. The two calls must not be separated by an
//! `.await`, since the task may resume on another worker thread.

use std::cell::Cell;

use serde::Serialize;

/// What happened to the request made on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Ok,
    /// The request timed out. The host may be slow or hung.
    Timeout,
    /// Any other failure. The connection is presumed dead.
    OtherError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Timeout => "timeout",
            Outcome::OtherError => "other_error",
        }
    }
}

thread_local! {
    static NEXT_RELEASE_OUTCOME: Cell<Option<Outcome>> = const { Cell::new(None) };
}

pub(crate) fn set_next_release_outcome(outcome: Outcome) {
    NEXT_RELEASE_OUTCOME.with(|slot| slot.set(Some(outcome)));
}

/// Consume the parked outcome, `Ok` when none was reported.
pub(crate) fn take_next_release_outcome() -> Outcome {
    NEXT_RELEASE_OUTCOME
        .with(|slot| slot.take())
        .unwrap_or_default()
}

//! Fail-fast invariant checks.
//!
//! These guard internal invariants only. Anything a peer can cause (empty
//! reads, resets, failed accepts) is handled as an ordinary outcome and must
//! never reach this module.

use tracing::error;

/// Exit status used when an invariant is violated (sysexits `EX_SOFTWARE`).
pub const EXIT_INVARIANT: i32 = 70;

/// Terminate the process if `cond` does not hold.
#[inline]
#[track_caller]
pub fn ensure(cond: bool, msg: &str) {
    if !cond {
        violated(msg);
    }
}

/// Report a violated invariant and terminate with [`EXIT_INVARIANT`].
#[cold]
#[track_caller]
pub fn violated(msg: &str) -> ! {
    let location = std::panic::Location::caller();
    error!(%location, "invariant violated: {msg}");
    eprintln!("ASSERT FAIL: {msg} ({location})");
    std::process::exit(EXIT_INVARIANT)
}

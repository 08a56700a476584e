//! Crate-wide exclusive area.
//!
//! Guards short read-modify-write sequences that must not interleave with
//! interrupt-context deliveries, such as sampling two clocks as one instant.
//! Never call into a collaborator that may itself re-enter the core while
//! holding it.

use std::sync::{Mutex, PoisonError};

static EXCLUSIVE_AREA: Mutex<()> = Mutex::new(());

/// Run `f` inside the exclusive area.
pub(crate) fn with_exclusive_area<R>(f: impl FnOnce() -> R) -> R {
    let _guard = EXCLUSIVE_AREA.lock().unwrap_or_else(PoisonError::into_inner);
    f()
}

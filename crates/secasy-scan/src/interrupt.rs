//! SIGINT/SIGTERM handling.
//!
//! The first signal sets a flag the sweep polls between configurations. A
//! second signal kills the in-flight harness process group and exits
//! immediately with status 130.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the handlers and return the flag they set.
pub fn install() -> &'static AtomicBool {
    #[cfg(unix)]
    unix::install();
    &INTERRUPTED
}

#[cfg(unix)]
mod unix {
    use super::{Ordering, INTERRUPTED};

    extern "C" fn on_signal(_signum: libc::c_int) {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            // Harnesses run in their own process group and outlive us otherwise.
            secasy_scan_core::runner::kill_in_flight();
            // SAFETY: _exit is async-signal-safe.
            unsafe { libc::_exit(130) }
        }
    }

    pub(super) fn install() {
        let handler: extern "C" fn(libc::c_int) = on_signal;
        for signum in [libc::SIGINT, libc::SIGTERM] {
            // SAFETY: the handler only touches lock-free atomics, kill(2) and _exit.
            unsafe {
                libc::signal(signum, handler as libc::sighandler_t);
            }
        }
    }
}

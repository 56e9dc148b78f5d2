//! UI collaboration points: the progress callback and the two fatal screens.
//!
//! The engine never decides how these are rendered; it only calls out to
//! whatever the host injects, exactly as the reference firmware calls into
//! the board's UI module table rather than drawing anything itself.

/// Pumped during PBKDF2 derivation and the pre-verify throttle sleep.
///
/// Returning `true` means the user asked to cancel; the engine aborts the
/// current operation cleanly with no partial mutation of persisted state.
pub trait ProgressCallback {
    fn on_progress(&mut self, remaining_seconds: u32, progress_per_mille: u32, message: &str) -> bool;
}

/// A progress sink that never reports cancellation. Useful for tests and for
/// hosts that drive unlock from a non-interactive context.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn on_progress(&mut self, _remaining_seconds: u32, _progress_per_mille: u32, _message: &str) -> bool {
        false
    }
}

impl<F> ProgressCallback for F
where
    F: FnMut(u32, u32, &str) -> bool,
{
    fn on_progress(&mut self, remaining_seconds: u32, progress_per_mille: u32, message: &str) -> bool {
        (self)(remaining_seconds, progress_per_mille, message)
    }
}

/// The `hal_delay(ms)` downward interface: blocks the calling thread for
/// approximately `ms` milliseconds. The exponential-backoff throttle in the
/// unlock path calls this once per 100 ms tick rather than sleeping for the
/// whole budget in one call, so a cancellable `ProgressCallback` pump can
/// interleave between ticks exactly as the reference firmware's unlock loop
/// interleaves `hal_delay(100)` with its own UI pump.
pub trait Delay {
    fn hal_delay(&mut self, ms: u32);
}

/// Sleeps on the real system clock. The production default.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn hal_delay(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(ms as u64));
    }
}

impl<F> Delay for F
where
    F: FnMut(u32),
{
    fn hal_delay(&mut self, ms: u32) {
        (self)(ms)
    }
}

/// The two screens the fault handler and wipe-code path must show, plus the
/// unconditional fatal error hook. This crate keeps running after a fault
/// (see `StorageError::Fault`) so these are notifications, not process exits.
pub trait FaultScreens {
    fn show_wipe_code_screen(&mut self) {}
    fn show_pin_too_many_screen(&mut self) {}
    fn fatal_error(&mut self, title: &str, message: &str) {
        log::error!("{title}: {message}");
    }
}

/// A `FaultScreens` implementation that only logs. Suitable for tests and
/// for embedding contexts where the screens are wired up separately.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFaultScreens;

impl FaultScreens for LoggingFaultScreens {}

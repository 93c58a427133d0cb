//! Signal bridge: async-signal-safe handlers that only set flags,
//! consumed by the dispatcher at the next pass (§9 Design Notes —
//! replacing the "process-global state reached via a static getter"
//! pattern with an explicit, minimal message-passing surface).
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

static CHLD_PENDING: AtomicBool = AtomicBool::new(false);
static ALARM_PENDING: AtomicBool = AtomicBool::new(false);
static HUP_PENDING: AtomicBool = AtomicBool::new(false);

extern "C" fn on_chld(_: libc::c_int) {
    CHLD_PENDING.store(true, Ordering::SeqCst);
}

extern "C" fn on_alarm(_: libc::c_int) {
    ALARM_PENDING.store(true, Ordering::SeqCst);
}

extern "C" fn on_hup(_: libc::c_int) {
    HUP_PENDING.store(true, Ordering::SeqCst);
}

/// Install `SIGCHLD`, `SIGALRM`, `SIGHUP` handlers. Each handler's mask
/// blocks the other two while it runs (§5 signal handler discipline).
pub fn install() -> nix::Result<()> {
    let mut chld_mask = SigSet::empty();
    chld_mask.add(Signal::SIGALRM);
    chld_mask.add(Signal::SIGHUP);
    unsafe {
        sigaction(
            Signal::SIGCHLD,
            &SigAction::new(SigHandler::Handler(on_chld), SaFlags::SA_RESTART, chld_mask),
        )?;
    }

    let mut alarm_mask = SigSet::empty();
    alarm_mask.add(Signal::SIGCHLD);
    unsafe {
        sigaction(
            Signal::SIGALRM,
            &SigAction::new(SigHandler::Handler(on_alarm), SaFlags::SA_RESTART, alarm_mask),
        )?;
    }

    let mut hup_mask = SigSet::empty();
    hup_mask.add(Signal::SIGALRM);
    hup_mask.add(Signal::SIGCHLD);
    unsafe {
        sigaction(
            Signal::SIGHUP,
            &SigAction::new(SigHandler::Handler(on_hup), SaFlags::SA_RESTART, hup_mask),
        )?;
    }

    Ok(())
}

/// Take and clear the "a child changed status" flag.
pub fn take_chld_pending() -> bool {
    CHLD_PENDING.swap(false, Ordering::SeqCst)
}

/// Take and clear the "a timer may be due" flag.
pub fn take_alarm_pending() -> bool {
    ALARM_PENDING.swap(false, Ordering::SeqCst)
}

/// Take and clear the "reload requested" flag.
pub fn take_hup_pending() -> bool {
    HUP_PENDING.swap(false, Ordering::SeqCst)
}

/// RAII guard that blocks a signal set on construction and restores the
/// previous process signal mask on drop, so the mask invariant holds on
/// every exit path including early returns (§9 Design Notes — "scoped
/// signal masking").
pub struct SigmaskGuard {
    previous: SigSet,
}

impl SigmaskGuard {
    pub fn block(signals: &[Signal]) -> nix::Result<Self> {
        let mut set = SigSet::empty();
        for s in signals {
            set.add(*s);
        }
        let mut previous = SigSet::empty();
        nix::sys::signal::pthread_sigmask(
            nix::sys::signal::SigmaskHow::SIG_BLOCK,
            Some(&set),
            Some(&mut previous),
        )?;
        Ok(SigmaskGuard { previous })
    }
}

impl Drop for SigmaskGuard {
    fn drop(&mut self) {
        let _ = nix::sys::signal::pthread_sigmask(
            nix::sys::signal::SigmaskHow::SIG_SETMASK,
            Some(&self.previous),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_flags_start_clear_and_are_swapped_on_take() {
        // Flags are process-global statics; reset explicitly so this
        // test is independent of run order with other signal tests.
        CHLD_PENDING.store(false, Ordering::SeqCst);
        assert!(!take_chld_pending());
        CHLD_PENDING.store(true, Ordering::SeqCst);
        assert!(take_chld_pending());
        assert!(!take_chld_pending());
    }
}

//! Signal & terminal discipline (C7): foreground acquisition, startup
//! signal posture. Isolated from the core dispatcher so that failure
//! here is a startup-fatal error (§7), not an invariant the rest of the
//! supervisor has to maintain at runtime.
use std::io::{self, IsTerminal};
use std::os::fd::AsFd;

use nix::sys::signal::{kill, killpg, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::termios::{tcgetattr, tcsetattr, SetArg, Termios};
use nix::unistd::{getpgrp, setpgid, tcgetpgrp, tcsetpgrp, Pid};

use crate::error::SupervisorError;

pub struct ForegroundHandle {
    pub pgid: Pid,
    pub saved_modes: Termios,
}

/// Become the foreground process group of the controlling terminal.
/// Fails fast if stdin is not a tty (non-interactive mode unsupported).
pub fn acquire_foreground() -> Result<ForegroundHandle, SupervisorError> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Err(SupervisorError::NotInteractive);
    }
    let fd = stdin.as_fd();

    let mut own_pgid = getpgrp();
    loop {
        match tcgetpgrp(fd) {
            Ok(fg) if fg == own_pgid => break,
            _ => {
                let _ = killpg(own_pgid, Signal::SIGTTIN);
            }
        }
        own_pgid = getpgrp();
    }

    ignore_interactive_signals();

    let pid = nix::unistd::getpid();
    setpgid(pid, pid).map_err(|e| SupervisorError::Foreground(io::Error::from(e)))?;
    tcsetpgrp(fd, pid).map_err(|e| SupervisorError::Foreground(io::Error::from(e)))?;
    let saved_modes =
        tcgetattr(fd).map_err(|e| SupervisorError::Foreground(io::Error::from(e)))?;

    Ok(ForegroundHandle { pgid: pid, saved_modes })
}

/// Ignore the signals that would otherwise stop or background an
/// interactive shell (§4.7).
fn ignore_interactive_signals() {
    for signal in [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
    ] {
        unsafe {
            let _ = sigaction(
                signal,
                &SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty()),
            );
        }
    }
}

/// Restore the terminal modes saved at startup, undoing whatever the
/// exiting operator program left behind.
pub fn restore(handle: &ForegroundHandle) -> Result<(), SupervisorError> {
    let stdin = io::stdin();
    tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &handle.saved_modes)
        .map_err(|e| SupervisorError::Foreground(io::Error::from(e)))
}

/// Deliver `signal` to our own process, used by tests that want to
/// exercise signal-driven paths without a real terminal.
pub fn raise_self(signal: Signal) -> Result<(), SupervisorError> {
    kill(nix::unistd::getpid(), signal).map_err(|e| SupervisorError::Transient("kill", e))
}

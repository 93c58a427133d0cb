//! Child lifecycle (C3): spawn, redirect, group, wait, classify, restart.
use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd};
use std::time::Instant;

use log::info;
use nix::fcntl::{open, OFlag};
use nix::sys::signal::{kill, killpg, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::WaitStatus;
use nix::unistd::{chdir, close, dup2, execve, fork, setpgid, ForkResult, Pid};

use crate::error::SupervisorError;
use crate::supervisor::program::{Process, ProcessState, Program, VisitOutcome};
use crate::supervisor::timer::{ArmOutcome, TimerKind, TimerQueue};

/// What a reaped exit means for the restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Exited { code: i32, expected: bool },
    Signaled { signal: Signal },
    Stopped { signal: Signal },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NoOp,
    Signaled,
}

/// Open (or create) a program's stdio redirection file in append mode,
/// mode 0644, close-on-exec.
fn open_redirect(path: &str) -> Result<OwnedFd, SupervisorError> {
    let mode = Mode::from_bits_truncate(0o644);
    open(
        path,
        OFlag::O_CREAT | OFlag::O_APPEND | OFlag::O_WRONLY | OFlag::O_CLOEXEC,
        mode,
    )
    .map_err(|e| SupervisorError::Redirect(std::io::Error::from(e)))
}

/// Open both stdio redirection fds for `program`, if not already open.
pub fn ensure_redirect_fds(program: &mut Program) -> Result<(), SupervisorError> {
    if program.log_out_fd.is_none() {
        program.log_out_fd = Some(open_redirect(&program.def.std_out)?);
    }
    if program.log_err_fd.is_none() {
        program.log_err_fd = Some(open_redirect(&program.def.std_err)?);
    }
    Ok(())
}

/// Reset the interactive/job-control signals and SIGCHLD to default,
/// mirroring what `execve` would do for signals not otherwise ignored,
/// done explicitly here because the parent ignores them (§4.7).
fn reset_inherited_signals() {
    for signal in [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGCHLD,
    ] {
        unsafe {
            let _ = nix::sys::signal::sigaction(
                signal,
                &nix::sys::signal::SigAction::new(
                    SigHandler::SigDfl,
                    nix::sys::signal::SaFlags::empty(),
                    nix::sys::signal::SigSet::empty(),
                ),
            );
        }
    }
}

fn to_cstring_vec(values: &[String]) -> Vec<CString> {
    values
        .iter()
        .map(|s| CString::new(s.as_str()).unwrap_or_else(|_| CString::new("").unwrap()))
        .collect()
}

/// Fork and exec one child for `program`, joining its existing pgid (or
/// founding a new one if it has none yet). Does not touch `processes` or
/// log anything; callers decide how the new pid is recorded.
///
/// # Safety
/// Calls `fork()`; the child branch only calls async-signal-safe
/// functions before `execve`, aborting via `_exit` on any failure.
fn fork_and_exec(program: &mut Program) -> Result<Pid, SupervisorError> {
    ensure_redirect_fds(program)?;
    let out_fd = program.log_out_fd.as_ref().unwrap().as_raw_fd();
    let err_fd = program.log_err_fd.as_ref().unwrap().as_raw_fd();

    let argv = to_cstring_vec(&program.def.cmd);
    let path = argv[0].clone();
    let envp: Vec<CString> = program
        .def
        .env
        .iter()
        .map(|(k, v)| CString::new(format!("{k}={v}")).unwrap_or_else(|_| CString::new("").unwrap()))
        .collect();
    let workingdir = program.def.workingdir.clone();
    let umask_bits = program.def.umask;
    let join_pgid = program.pgid;

    match unsafe { fork() }.map_err(SupervisorError::Spawn)? {
        ForkResult::Child => {
            let target_pgid = join_pgid.unwrap_or(Pid::from_raw(0));
            let _ = setpgid(Pid::from_raw(0), target_pgid);
            reset_inherited_signals();
            nix::sys::stat::umask(Mode::from_bits_truncate(umask_bits));
            if let Some(dir) = &workingdir {
                if chdir(dir.as_str()).is_err() {
                    unsafe { libc::_exit(1) };
                }
            }
            if dup2(out_fd, 1).is_err() || dup2(err_fd, 2).is_err() {
                unsafe { libc::_exit(1) };
            }
            let _ = close(out_fd);
            let _ = close(err_fd);
            let _ = execve(&path, &argv, &envp);
            // execve only returns on failure.
            unsafe { libc::_exit(1) };
        }
        ForkResult::Parent { child } => Ok(child),
    }
}

/// Spawn one brand-new child for `program`. On success, pushes a new
/// `Process` in `Starting` state and updates `pgid`/`proc_cnt`.
pub fn spawn(program: &mut Program) -> Result<(), SupervisorError> {
    let child = fork_and_exec(program)?;
    if program.pgid.is_none() {
        program.pgid = Some(child);
    }
    program.processes.push(Process {
        pid: child,
        restart_cnt: 1,
        last_status: None,
        status_dirty: false,
        state: ProcessState::Starting,
    });
    info!("({}) {} {} started", pgid_label(program.pgid), program.name(), child);
    Ok(())
}

/// Fork a replacement child for a process that just exited and is being
/// restarted in place (§4.3): same program, joins the existing pgid (or
/// founds one if every prior child is gone), `restart_cnt` set to the
/// caller's count, `state = Running` (no start timer re-armed), logged
/// as `restarted` rather than `started` (§6).
pub fn respawn(program: &mut Program, restart_cnt: u32) -> Result<Process, SupervisorError> {
    let child = fork_and_exec(program)?;
    if program.pgid.is_none() {
        program.pgid = Some(child);
    }
    info!("({}) {} {} restarted", pgid_label(program.pgid), program.name(), child);
    Ok(Process {
        pid: child,
        restart_cnt,
        last_status: None,
        status_dirty: false,
        state: ProcessState::Running,
    })
}

pub fn pgid_label(pgid: Option<Pid>) -> i32 {
    pgid.map(Pid::as_raw).unwrap_or(0)
}

/// Spawn `numprocs - proc_cnt` children, then arm the start timer —
/// unless nothing needed spawning, in which case `start p` at
/// `proc_cnt == numprocs` is a no-op: no spawns, no timer (§8).
pub fn launch_program(program: &mut Program, timers: &mut TimerQueue, now: Instant) {
    let missing = program.def.numprocs as usize - program.proc_cnt().min(program.def.numprocs as usize);
    if missing == 0 {
        return;
    }
    for _ in 0..missing {
        if let Err(e) = spawn(program) {
            log::error!("({}) {}: {e}", pgid_label(program.pgid), program.name());
        }
    }
    arm_start_timer(program, timers, now);
}

pub fn arm_start_timer(program: &Program, timers: &mut TimerQueue, now: Instant) {
    match timers.arm(program.name(), TimerKind::Start, now, program.def.starttime_ms) {
        ArmOutcome::FireNow(_) => {
            // Handled synchronously by the caller via `fire_start` if it
            // chooses to; the common case (starttime_ms > 0) queues.
        }
        ArmOutcome::Queued { .. } => {}
    }
}

/// Send `stopsignal` to the whole process group and transition every
/// live process to `Terminating`.
pub fn signal_stop(program: &mut Program, timers: &mut TimerQueue, now: Instant) -> StopOutcome {
    let Some(pgid) = program.pgid else {
        return StopOutcome::NoOp;
    };
    if program.proc_cnt() == 0 {
        return StopOutcome::NoOp;
    }
    if let Err(e) = killpg(pgid, program.def.stopsignal) {
        log::error!("killpg({pgid}) failed: {e}");
    }
    program.retain_processes(|p| {
        p.state = ProcessState::Terminating;
        VisitOutcome::Keep
    });
    match timers.arm(program.name(), TimerKind::Stop, now, program.def.stoptime_ms) {
        ArmOutcome::FireNow(_) => {}
        ArmOutcome::Queued { .. } => {}
    }
    StopOutcome::Signaled
}

/// Classify a reaped `WaitStatus` against the program's expected exit
/// codes (§4.3).
pub fn classify(status: &WaitStatus, program: &crate::config::ProgramDef) -> Option<Classification> {
    match status {
        WaitStatus::Exited(_, code) => Some(Classification::Exited {
            code: *code,
            expected: program.exitcodes.contains(code),
        }),
        WaitStatus::Signaled(_, signal, _) => Some(Classification::Signaled { signal: *signal }),
        WaitStatus::Stopped(_, signal) => Some(Classification::Stopped { signal: *signal }),
        _ => None,
    }
}

/// Whether a terminated process should be respawned in place (§4.3).
pub fn should_restart(
    autorestart: crate::config::AutoRestart,
    classification: Classification,
    restart_cnt: u32,
    startretries: u32,
) -> bool {
    use crate::config::AutoRestart;
    let expected = matches!(classification, Classification::Exited { expected: true, .. });
    let wants_restart = match autorestart {
        AutoRestart::Always => true,
        AutoRestart::Unexpected => !expected,
        AutoRestart::Never => false,
    };
    wants_restart && restart_cnt <= startretries
}

/// Send `SIGKILL` to the whole group (stop-deadline handler escalation).
pub fn kill_group(pgid: Pid) {
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        log::error!("SIGKILL to group {pgid} failed: {e}");
    }
}

/// Send a signal to a single pid; used by tests and transient-error
/// paths that don't need a whole group.
pub fn signal_pid(pid: Pid, signal: Signal) -> Result<(), SupervisorError> {
    kill(pid, signal).map_err(|e| SupervisorError::Transient("kill", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AutoRestart;

    #[test]
    fn always_restarts_regardless_of_exit_code() {
        let classification = Classification::Exited { code: 1, expected: false };
        assert!(should_restart(AutoRestart::Always, classification, 1, 5));
    }

    #[test]
    fn never_never_restarts() {
        let classification = Classification::Exited { code: 1, expected: false };
        assert!(!should_restart(AutoRestart::Never, classification, 0, 5));
    }

    #[test]
    fn unexpected_restarts_only_on_unexpected_exit() {
        let expected = Classification::Exited { code: 0, expected: true };
        let unexpected = Classification::Exited { code: 1, expected: false };
        assert!(!should_restart(AutoRestart::Unexpected, expected, 1, 5));
        assert!(should_restart(AutoRestart::Unexpected, unexpected, 1, 5));
    }

    #[test]
    fn restart_stops_once_retries_exhausted() {
        let classification = Classification::Exited { code: 1, expected: false };
        assert!(should_restart(AutoRestart::Unexpected, classification, 3, 3));
        assert!(!should_restart(AutoRestart::Unexpected, classification, 4, 3));
    }

    #[test]
    fn signaled_exit_is_always_unexpected() {
        let classification = Classification::Signaled { signal: Signal::SIGSEGV };
        assert!(should_restart(AutoRestart::Unexpected, classification, 1, 1));
    }

    #[test]
    fn classify_exited_checks_exitcodes_set() {
        use std::collections::BTreeSet;
        let def = crate::config::ProgramDef {
            name: "p".into(),
            cmd: vec!["/bin/true".into()],
            env: vec![],
            std_out: "/dev/null".into(),
            std_err: "/dev/null".into(),
            workingdir: None,
            exitcodes: BTreeSet::from([0, 2]),
            numprocs: 1,
            umask: 0,
            autorestart: AutoRestart::Unexpected,
            startretries: 0,
            autostart: true,
            stopsignal: Signal::SIGTERM,
            starttime_ms: 1000,
            stoptime_ms: 10000,
        };
        let status = WaitStatus::Exited(Pid::from_raw(1), 2);
        let classification = classify(&status, &def).unwrap();
        assert_eq!(classification, Classification::Exited { code: 2, expected: true });
    }
}

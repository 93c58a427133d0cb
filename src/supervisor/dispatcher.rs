//! Event loop / dispatcher (C4): drains child-status notifications,
//! reconciles them, fires latched program events, and runs due timers.
use std::time::Instant;

use log::{info, warn};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::supervisor::lifecycle::{self, Classification};
use crate::supervisor::program::{PendingEvent, ProcessState, Program, VisitOutcome};
use crate::supervisor::timer::{TimerEntry, TimerKind, TimerQueue};
use crate::supervisor::Supervisor;

impl Supervisor {
    /// One full dispatcher pass: drain → reconcile → fire events. Called
    /// after every command and from the `SIGCHLD` bridge.
    pub fn pgm_notification(&mut self) {
        self.drain_and_stamp();
        self.reconcile_dirty();
        self.dispatch_pending_events();
    }

    /// `waitpid(-1, WNOHANG | WUNTRACED)` in a loop, stamping the
    /// matching process record dirty.
    fn drain_and_stamp(&mut self) {
        loop {
            let status = match waitpid(
                Pid::from_raw(-1),
                Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
            ) {
                Ok(WaitStatus::StillAlive) | Err(nix::errno::Errno::ECHILD) => break,
                Ok(status) => status,
                Err(e) => {
                    warn!("waitpid failed: {e}");
                    break;
                }
            };
            let Some(pid) = status.pid() else { continue };
            let raw_status = encode_status(&status);
            let mut found = false;
            for program in self.programs.iter_mut() {
                if let Some(process) = program.find_process_mut(pid) {
                    process.status_dirty = true;
                    process.last_status = Some(raw_status);
                    program.dirty = true;
                    found = true;
                    break;
                }
            }
            if !found {
                continue;
            }
        }
    }

    /// For every dirty program, reconcile every dirty process: classify
    /// its exit, apply the restart decision, clear the dirty bits.
    fn reconcile_dirty(&mut self) {
        let now = Instant::now();
        let program_names: Vec<String> = self
            .programs
            .iter()
            .filter(|p| p.dirty)
            .map(|p| p.name().to_string())
            .collect();

        for name in program_names {
            let statuses = self.wait_statuses_for(&name);
            let mut became_idle = false;
            if let Some(program) = self.programs.get_mut(&name) {
                reconcile_program(program, &statuses, &mut became_idle);
                program.dirty = false;
            }
            if became_idle {
                let pgid = lifecycle::pgid_label(self.programs.get(&name).and_then(|p| p.pgid));
                let stoptime_ms = self
                    .programs
                    .get(&name)
                    .map(|p| p.def.stoptime_ms)
                    .unwrap_or(0);
                for entry in self.timers.drain_for(&name) {
                    if entry.kind == TimerKind::Stop {
                        let remaining = entry.deadline.saturating_duration_since(now);
                        let elapsed = (stoptime_ms as f64 / 1000.0) - remaining.as_secs_f64();
                        info!("({pgid}) {name} correctly terminated after {elapsed:.3} seconds");
                    }
                }
            }
        }
    }

    /// Re-derive `WaitStatus` values for a program's dirty processes from
    /// their stored raw status words.
    fn wait_statuses_for(&self, name: &str) -> Vec<(Pid, WaitStatus)> {
        let Some(program) = self.programs.get(name) else {
            return Vec::new();
        };
        program
            .processes
            .iter()
            .filter(|p| p.status_dirty)
            .filter_map(|p| p.last_status.map(|raw| (p.pid, decode_status(p.pid, raw))))
            .collect()
    }

    /// Run every latched program event and clear it (§4.4 step 3).
    fn dispatch_pending_events(&mut self) {
        let now = Instant::now();
        let names: Vec<String> = self.programs.iter().map(|p| p.name().to_string()).collect();
        let mut to_delete = Vec::new();

        for name in names {
            let Some(program) = self.programs.get_mut(&name) else { continue };
            let event = program.pending_event;
            program.pending_event = PendingEvent::None;

            match event {
                PendingEvent::None => {}
                PendingEvent::Restart => {
                    if program.proc_cnt() == 0 {
                        lifecycle::launch_program(program, &mut self.timers, now);
                    } else {
                        // Not idle yet; re-latch so the next pass retries
                        // once the outstanding stop completes.
                        program.pending_event = PendingEvent::Restart;
                    }
                }
                PendingEvent::Add => {
                    if program.proc_cnt() == 0 && program.def.autostart {
                        lifecycle::launch_program(program, &mut self.timers, now);
                    }
                }
                PendingEvent::Delete => {
                    lifecycle::signal_stop(program, &mut self.timers, now);
                    wait_all_children_sync(program);
                    self.timers.drain_for(&name);
                    to_delete.push(name);
                }
            }
        }

        for name in to_delete {
            self.programs.remove(&name);
        }
    }

    /// Run every due start/stop timer handler (§4.2).
    pub fn process_due_timers(&mut self, now: Instant) {
        for entry in self.timers.pop_due(now) {
            self.fire_timer(entry);
        }
    }

    fn fire_timer(&mut self, entry: TimerEntry) {
        let Some(program) = self.programs.get_mut(&entry.program) else {
            warn!("timer fired for unknown program {}", entry.program);
            return;
        };
        match entry.kind {
            TimerKind::Start => fire_start_deadline(program),
            TimerKind::Stop => fire_stop_deadline(program),
        }
    }

    /// `exit` (§4.5): stop every program and synchronously wait for its
    /// children before the command returns, so the operator sees every
    /// program idle before the prompt exits.
    pub fn shutdown_all(&mut self) {
        let now = Instant::now();
        let names: Vec<String> = self.programs.iter().map(|p| p.name().to_string()).collect();
        for name in names {
            if let Some(program) = self.programs.get_mut(&name) {
                lifecycle::signal_stop(program, &mut self.timers, now);
                wait_all_children_sync(program);
            }
            self.timers.drain_for(&name);
        }
    }
}

fn reconcile_program(program: &mut Program, statuses: &[(Pid, WaitStatus)], became_idle: &mut bool) {
    let autorestart = program.def.autorestart;
    let startretries = program.def.startretries;
    let def = program.def.clone();
    let name = program.name().to_string();
    let pgid = lifecycle::pgid_label(program.pgid);

    // Processes due for restart are removed here and forked again below,
    // once `program` is no longer borrowed by `retain_processes` — the
    // closure only ever touches the `Process` it's handed, never `program`
    // itself, so the actual `fork()` has to happen outside of it.
    let mut to_respawn: Vec<u32> = Vec::new();

    program.retain_processes(|process| {
        if !process.status_dirty {
            return VisitOutcome::Keep;
        }
        let Some((_, status)) = statuses.iter().find(|(pid, _)| *pid == process.pid) else {
            return VisitOutcome::Keep;
        };
        process.status_dirty = false;
        process.last_status = None;

        let Some(classification) = lifecycle::classify(status, &def) else {
            return VisitOutcome::Keep;
        };

        log_exit(&name, pgid, process.pid, classification);

        match classification {
            Classification::Stopped { .. } => VisitOutcome::Keep,
            _ => {
                if lifecycle::should_restart(autorestart, classification, process.restart_cnt, startretries) {
                    to_respawn.push(process.restart_cnt + 1);
                }
                VisitOutcome::Remove
            }
        }
    });

    for restart_cnt in to_respawn {
        match lifecycle::respawn(program, restart_cnt) {
            Ok(process) => program.processes.push(process),
            Err(e) => log::error!("({pgid}) {name}: {e}"),
        }
    }

    if program.proc_cnt() == 0 {
        *became_idle = true;
    }
}

fn log_exit(name: &str, pgid: i32, pid: Pid, classification: Classification) {
    match classification {
        Classification::Exited { code, .. } => {
            info!("({pgid}) {name} {pid} exited with status {code}")
        }
        Classification::Signaled { signal } => {
            info!("({pgid}) {name} {pid} terminated with signal {signal}")
        }
        Classification::Stopped { signal } => {
            info!("({pgid}) {name} {pid} stopped with signal {signal}")
        }
    }
}

fn fire_start_deadline(program: &mut Program) {
    let pgid = lifecycle::pgid_label(program.pgid);
    let live = program.proc_cnt();
    let numprocs = program.def.numprocs;
    let elapsed = program.def.starttime_ms as f64 / 1000.0;
    if live >= numprocs as usize {
        info!("({pgid}) {} successfully started. {elapsed} seconds elapsed. {live}/{numprocs} procs", program.name());
    } else {
        warn!("({pgid}) {} failed to start successfully. {elapsed} seconds elapsed. {live}/{numprocs} procs", program.name());
    }
    program.retain_processes(|p| {
        if p.state == ProcessState::Starting {
            p.state = ProcessState::Running;
        }
        VisitOutcome::Keep
    });
}

fn fire_stop_deadline(program: &mut Program) {
    let pgid_for_log = lifecycle::pgid_label(program.pgid);
    let elapsed = program.def.stoptime_ms as f64 / 1000.0;
    if program.proc_cnt() == 0 {
        info!("({pgid_for_log}) {} correctly terminated after {elapsed} seconds", program.name());
        return;
    }
    warn!("({pgid_for_log}) {} didn't terminated correctly after {elapsed} seconds", program.name());
    if let Some(pgid) = program.pgid {
        lifecycle::kill_group(pgid);
    }
}

/// Synchronously wait for every live child of `program`, reconciling as
/// they're reaped. Used by `exit` and reload-delete (§4.5, §4.6).
pub(super) fn wait_all_children_sync(program: &mut Program) {
    let pids: Vec<Pid> = program.processes.iter().map(|p| p.pid).collect();
    for pid in pids {
        match waitpid(pid, None) {
            Ok(_) | Err(nix::errno::Errno::ECHILD) => {}
            Err(e) => warn!("waitpid({pid}) failed: {e}"),
        }
    }
    program.processes.clear();
    program.pgid = None;
}

/// Encode a `WaitStatus` back to a raw status word so it can be stored
/// on the `Process` record and re-decoded later (the record only stores
/// `i32`s, matching the "raw wait status word" field of the data model).
fn encode_status(status: &WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => (*code & 0xff) << 8,
        WaitStatus::Signaled(_, signal, core) => {
            (*signal as i32) | if *core { 0x80 } else { 0 }
        }
        WaitStatus::Stopped(_, signal) => ((*signal as i32) << 8) | 0x7f,
        _ => 0,
    }
}

fn decode_status(pid: Pid, raw: i32) -> WaitStatus {
    if raw & 0x7f == 0 {
        WaitStatus::Exited(pid, (raw >> 8) & 0xff)
    } else if raw & 0xff == 0x7f {
        let signal = nix::sys::signal::Signal::try_from((raw >> 8) & 0xff).unwrap_or(nix::sys::signal::Signal::SIGTERM);
        WaitStatus::Stopped(pid, signal)
    } else {
        let signal = nix::sys::signal::Signal::try_from(raw & 0x7f).unwrap_or(nix::sys::signal::Signal::SIGTERM);
        WaitStatus::Signaled(pid, signal, raw & 0x80 != 0)
    }
}

//! Supervision core: the `Supervisor` aggregate plus its submodules.
//!
//! Each submodule corresponds to one component of the supervision core:
//! [`program`] (C1) is the data model, [`timer`] (C2) the deadline
//! queue, [`lifecycle`] (C3) spawn/stop/classify, [`dispatcher`] (C4)
//! the event loop, [`reload`] (C6) the reconciler, [`term`] (C7)
//! terminal/signal startup discipline, and [`signals`] the
//! async-signal-safe bridge shared by all of them. Command parsing
//! (C5) lives in [`crate::shell::command`].
pub mod dispatcher;
pub mod lifecycle;
pub mod program;
pub mod reload;
pub mod signals;
pub mod term;
pub mod timer;

use std::io;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::time::Instant;

use log::{error, info};
use nix::sys::signal::Signal;

use crate::config::{self, ProgramDef};
use crate::error::SupervisorError;
use crate::shell::command::{self, Command};
use crate::shell::line::LineEditor;
use crate::shell::PROMPT;
use program::{PendingEvent, Program, ProgramList};
use signals::SigmaskGuard;
use term::ForegroundHandle;
use timer::TimerQueue;

/// One command verb plus every live program name: the vocabulary the
/// line editor completes against, refreshed after each dispatcher pass.
const VERBS: [&str; 7] = ["status", "start", "stop", "restart", "reload", "exit", "help"];

/// The whole supervision core: program list, timer queue, and the
/// operator-facing latch that ends the main loop.
pub struct Supervisor {
    programs: ProgramList,
    timers: TimerQueue,
    config_path: PathBuf,
    exit_latch: bool,
    foreground: ForegroundHandle,
}

impl Supervisor {
    /// Build a supervisor from a validated program list. Programs with
    /// `autostart = true` are latched for immediate launch; the first
    /// `pgm_notification()` call (from the caller, typically right
    /// after construction) brings them up.
    pub fn new(config_path: PathBuf, defs: Vec<ProgramDef>, foreground: ForegroundHandle) -> Self {
        let mut programs = ProgramList::new();
        for def in defs {
            let autostart = def.autostart;
            let mut program = Program::new(def);
            if autostart {
                program.pending_event = PendingEvent::Add;
            }
            programs.push(program);
        }
        Supervisor {
            programs,
            timers: TimerQueue::new(),
            config_path,
            exit_latch: false,
            foreground,
        }
    }

    pub fn is_exiting(&self) -> bool {
        self.exit_latch
    }

    /// Program names without a pending delete, for parser validation.
    pub fn known_programs(&self) -> Vec<String> {
        self.programs.live_names()
    }

    /// Completion vocabulary: command verbs plus live program names.
    pub fn vocabulary(&self) -> Vec<String> {
        let mut words: Vec<String> = VERBS.iter().map(|s| s.to_string()).collect();
        words.extend(self.programs.live_names());
        words
    }

    /// Run the interactive main loop to completion (§4.4). Returns once
    /// the `exit` command (or end-of-input) latches `exit_latch`.
    pub fn run(&mut self, editor: &mut LineEditor) -> Result<(), SupervisorError> {
        // Bring up every autostart program before the operator sees the
        // first prompt.
        self.pgm_notification();
        editor.set_vocabulary(self.vocabulary());

        while !self.exit_latch {
            self.process_due_timers(Instant::now());
            if signals::take_hup_pending() {
                self.cmd_reload();
            }

            if let Err(e) = editor.write_prompt(PROMPT) {
                eprintln!("io error: {e}");
                continue;
            }
            self.wait_for_stdin_ready();
            editor.set_vocabulary(self.vocabulary());

            let guard = SigmaskGuard::block(&[Signal::SIGCHLD])
                .map_err(|e| SupervisorError::Transient("sigmask", e))?;
            let line = editor.read_ready_line();
            drop(guard);

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.shutdown_all();
                    break;
                }
                Err(e) => {
                    eprintln!("io error: {e}");
                    continue;
                }
            };

            match command::parse(&line, &self.known_programs()) {
                Ok(cmd) => self.execute(cmd),
                Err(e) => eprintln!("{e}"),
            }

            self.pgm_notification();
            editor.set_vocabulary(self.vocabulary());
        }

        let _ = term::restore(&self.foreground);
        Ok(())
    }

    /// Block until stdin has a line to read, without losing a `SIGCHLD`/
    /// `SIGALRM`/`SIGHUP` that arrives in the meantime (§4.4: asynchronous
    /// exits and due timers must not starve behind a blocked line read).
    /// `poll(2)` always fails with `EINTR` on a signal regardless of
    /// `SA_RESTART`, so every such wakeup runs a dispatcher pass and a
    /// reload check before polling again — the prompt is only printed
    /// once, before this call, so none of that is visible to the operator
    /// until a real line is ready.
    fn wait_for_stdin_ready(&mut self) {
        let stdin_fd = io::stdin().as_raw_fd();
        loop {
            let mut pfd = libc::pollfd { fd: stdin_fd, events: libc::POLLIN, revents: 0 };
            let ret = unsafe { libc::poll(&mut pfd, 1, -1) };
            if ret >= 0 {
                return;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return;
            }
            if signals::take_alarm_pending() {
                self.process_due_timers(Instant::now());
            }
            if signals::take_hup_pending() {
                self.cmd_reload();
            }
            if signals::take_chld_pending() {
                self.pgm_notification();
            }
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Status(names) => self.cmd_status(&names),
            Command::Start(names) => self.cmd_start(&names),
            Command::Stop(names) => self.cmd_stop(&names),
            Command::Restart(names) => self.cmd_restart(&names),
            Command::Reload => self.cmd_reload(),
            Command::Exit => self.cmd_exit(),
            Command::Help => self.cmd_help(),
        }
    }

    fn cmd_status(&self, names: &[String]) {
        let detailed = !names.is_empty();
        let targets: Vec<&Program> = if names.is_empty() {
            self.programs.iter().collect()
        } else {
            names.iter().filter_map(|n| self.programs.get(n)).collect()
        };
        for program in targets {
            let pgid = lifecycle::pgid_label(program.pgid);
            println!(
                "- [{pgid}] {}: {}/{} started",
                program.name(),
                program.proc_cnt(),
                program.def.numprocs
            );
            if detailed {
                for process in &program.processes {
                    println!(
                        "    {} {} restarts={}",
                        process.pid,
                        process.state.label(),
                        process.restart_cnt
                    );
                }
            }
        }
    }

    fn cmd_start(&mut self, names: &[String]) {
        let now = Instant::now();
        for name in names {
            if let Some(program) = self.programs.get_mut(name) {
                lifecycle::launch_program(program, &mut self.timers, now);
            }
        }
    }

    fn cmd_stop(&mut self, names: &[String]) {
        let now = Instant::now();
        for name in names {
            if let Some(program) = self.programs.get_mut(name) {
                lifecycle::signal_stop(program, &mut self.timers, now);
            }
        }
    }

    /// `restart` (§4.5): latch the restart intent, then signal the
    /// current children to stop. The next reconciliation pass relaunches
    /// once the program is idle; if it's already idle, the next
    /// `dispatch_pending_events` call launches it immediately.
    fn cmd_restart(&mut self, names: &[String]) {
        let now = Instant::now();
        for name in names {
            if let Some(program) = self.programs.get_mut(name) {
                program.pending_event = PendingEvent::Restart;
                lifecycle::signal_stop(program, &mut self.timers, now);
            }
        }
    }

    fn cmd_reload(&mut self) {
        match config::load(&self.config_path) {
            Ok(defs) => {
                let summary = reload::reconcile(&mut self.programs, defs);
                info!(
                    "reload: +{} -{} ~{} !{}",
                    summary.added.len(),
                    summary.deleted.len(),
                    summary.soft_updated.len(),
                    summary.hard_replaced.len()
                );
            }
            Err(e) => error!("reload failed: {e}"),
        }
    }

    fn cmd_exit(&mut self) {
        self.shutdown_all();
        self.exit_latch = true;
    }

    fn cmd_help(&self) {
        println!("commands:");
        println!("  status [name ...]    show program status");
        println!("  start name [name ...] start a program");
        println!("  stop name [name ...]  stop a program");
        println!("  restart name [name ...] restart a program");
        println!("  reload               reload the configuration file");
        println!("  exit                 stop every program and quit");
        println!("  help                 show this text");
    }
}

//! Program/Process model (C1): in-memory data types and list operations.
//!
//! No intrusive linked lists: programs live in a plain `Vec<Program>`
//! owned by the [`crate::supervisor::Supervisor`], and processes live in
//! a plain `Vec<Process>` owned by their `Program`. Mid-iteration removal
//! is expressed with a visitor returning [`VisitOutcome`] rather than by
//! smuggling state through raw pointers.
use nix::unistd::Pid;

use crate::config::ProgramDef;

/// One live child of a program.
#[derive(Debug, Clone)]
pub struct Process {
    pub pid: Pid,
    pub restart_cnt: u32,
    pub last_status: Option<i32>,
    pub status_dirty: bool,
    pub state: ProcessState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Terminating,
}

impl ProcessState {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Terminating => "terminating",
        }
    }
}

/// Latched intention on a [`Program`], consumed exactly once by the next
/// dispatcher pass (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingEvent {
    #[default]
    None,
    Restart,
    Add,
    Delete,
}

/// An operator-declared program together with its runtime state.
#[derive(Debug)]
pub struct Program {
    pub def: ProgramDef,
    /// `None` iff no live children (invariant 2 of the expanded data
    /// model; the spec's `pgid == 0` sentinel).
    pub pgid: Option<Pid>,
    pub processes: Vec<Process>,
    pub pending_event: PendingEvent,
    pub dirty: bool,
    /// Owned stdio redirection fds, opened once per program instance.
    pub log_out_fd: Option<std::os::fd::OwnedFd>,
    pub log_err_fd: Option<std::os::fd::OwnedFd>,
}

impl Program {
    pub fn new(def: ProgramDef) -> Self {
        Program {
            def,
            pgid: None,
            processes: Vec::new(),
            pending_event: PendingEvent::None,
            dirty: false,
            log_out_fd: None,
            log_err_fd: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn proc_cnt(&self) -> usize {
        self.processes.len()
    }

    /// Invariant 1: `proc_cnt == len(processes) && proc_cnt <= numprocs`.
    pub fn check_invariants(&self) -> bool {
        let cnt_ok = self.proc_cnt() <= self.def.numprocs as usize;
        let pgid_ok = (self.pgid.is_none()) == self.processes.is_empty();
        cnt_ok && pgid_ok
    }

    pub fn find_process_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.processes.iter_mut().find(|p| p.pid == pid)
    }

    /// Outcome of visiting one process in [`Program::retain_processes`].
    pub fn retain_processes<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Process) -> VisitOutcome,
    {
        let mut i = 0;
        while i < self.processes.len() {
            match f(&mut self.processes[i]) {
                VisitOutcome::Keep => i += 1,
                VisitOutcome::Remove => {
                    self.processes.remove(i);
                }
                VisitOutcome::Replace(new_process) => {
                    self.processes[i] = new_process;
                    i += 1;
                }
            }
        }
        if self.processes.is_empty() {
            self.pgid = None;
        }
    }
}

#[derive(Debug)]
pub enum VisitOutcome {
    Keep,
    Remove,
    Replace(Process),
}

/// Ordered collection of programs, keyed by name.
#[derive(Debug, Default)]
pub struct ProgramList {
    programs: Vec<Program>,
}

impl ProgramList {
    pub fn new() -> Self {
        ProgramList { programs: Vec::new() }
    }

    pub fn push(&mut self, program: Program) {
        self.programs.push(program);
    }

    /// Insert `program` immediately after the program named `after`.
    pub fn insert_after(&mut self, after: &str, program: Program) {
        match self.programs.iter().position(|p| p.name() == after) {
            Some(idx) => self.programs.insert(idx + 1, program),
            None => self.programs.push(program),
        }
    }

    pub fn insert_front(&mut self, program: Program) {
        self.programs.insert(0, program);
    }

    pub fn remove(&mut self, name: &str) -> Option<Program> {
        let idx = self.programs.iter().position(|p| p.name() == name)?;
        Some(self.programs.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<&Program> {
        self.programs.iter().find(|p| p.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Program> {
        self.programs.iter_mut().find(|p| p.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Program> {
        self.programs.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Invariant 6: program names are unique.
    pub fn names_are_unique(&self) -> bool {
        let mut names: Vec<&str> = self.programs.iter().map(Program::name).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        names.len() == before
    }

    /// Completion vocabulary: every program name without a pending delete
    /// (invariant 8).
    pub fn live_names(&self) -> Vec<String> {
        self.programs
            .iter()
            .filter(|p| p.pending_event != PendingEvent::Delete)
            .map(|p| p.name().to_string())
            .collect()
    }
}

//! End-to-end lifecycle scenarios exercised against real children
//! (`/bin/sleep`, `/bin/false`, `/bin/sh`), matching the literal
//! scenarios that drove the restart/stop design.
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};

use supervisor::config::{AutoRestart, ProgramDef};
use supervisor::supervisor::lifecycle::{self, Classification, StopOutcome};
use supervisor::supervisor::program::Program;
use supervisor::supervisor::timer::{TimerKind, TimerQueue};

fn def(name: &str, cmd: &[&str]) -> ProgramDef {
    ProgramDef {
        name: name.to_string(),
        cmd: cmd.iter().map(|s| s.to_string()).collect(),
        env: vec![],
        std_out: "/dev/null".to_string(),
        std_err: "/dev/null".to_string(),
        workingdir: None,
        exitcodes: BTreeSet::from([0]),
        numprocs: 1,
        umask: 0o022,
        autorestart: AutoRestart::Unexpected,
        startretries: 0,
        autostart: false,
        stopsignal: Signal::SIGTERM,
        starttime_ms: 1000,
        stoptime_ms: 10000,
    }
}

#[test]
fn expected_clean_exit_is_not_restarted() {
    let mut program = Program::new(def("sleeper", &["/bin/sleep", "1"]));
    let mut timers = TimerQueue::new();
    lifecycle::launch_program(&mut program, &mut timers, Instant::now());
    assert_eq!(program.proc_cnt(), 1);

    let pid = program.processes[0].pid;
    let status = waitpid(pid, None).expect("sleep 1 should exit on its own");
    let classification = lifecycle::classify(&status, &program.def).unwrap();
    assert_eq!(classification, Classification::Exited { code: 0, expected: true });
    assert!(!lifecycle::should_restart(
        program.def.autorestart,
        classification,
        program.processes[0].restart_cnt,
        program.def.startretries,
    ));
}

#[test]
fn unexpected_crash_retries_exactly_startretries_plus_one_times() {
    let mut program = Program::new({
        let mut d = def("crasher", &["/bin/false"]);
        d.startretries = 2;
        d
    });
    let mut timers = TimerQueue::new();
    lifecycle::launch_program(&mut program, &mut timers, Instant::now());
    let mut launches = 1u32;
    let mut restart_cnt = 1u32;

    loop {
        let pid = program.processes[0].pid;
        let status = waitpid(pid, None).expect("/bin/false should exit");
        let classification = lifecycle::classify(&status, &program.def).unwrap();
        assert_eq!(classification, Classification::Exited { code: 1, expected: false });
        program.processes.remove(0);

        if lifecycle::should_restart(program.def.autorestart, classification, restart_cnt, program.def.startretries) {
            restart_cnt += 1;
            lifecycle::spawn(&mut program).unwrap();
            launches += 1;
        } else {
            break;
        }
    }

    assert_eq!(launches, 3);
    assert_eq!(program.proc_cnt(), 0);
}

#[test]
fn hard_stop_after_timeout_escalates_to_sigkill() {
    let mut program = Program::new({
        let mut d = def("stubborn", &["/bin/sh", "-c", "trap '' TERM; sleep 100"]);
        d.stoptime_ms = 1000;
        d
    });
    let mut timers = TimerQueue::new();
    lifecycle::launch_program(&mut program, &mut timers, Instant::now());
    assert_eq!(program.proc_cnt(), 1);

    // Give the shell time to install its trap before we signal it.
    std::thread::sleep(Duration::from_millis(200));

    let outcome = lifecycle::signal_stop(&mut program, &mut timers, Instant::now());
    assert_eq!(outcome, StopOutcome::Signaled);

    let due = timers.pop_due(Instant::now() + Duration::from_millis(1100));
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].kind, TimerKind::Stop);

    // The child ignores TERM; the stop deadline handler escalates.
    if let Some(pgid) = program.pgid {
        lifecycle::kill_group(pgid);
    }

    let pid = program.processes[0].pid;
    let status = waitpid(pid, None).expect("SIGKILL should reap the child");
    assert!(matches!(status, WaitStatus::Signaled(_, Signal::SIGKILL, _)));
}

#[test]
fn restart_never_exceeds_numprocs_live_children() {
    let mut program = Program::new({
        let mut d = def("pair", &["/bin/sleep", "5"]);
        d.numprocs = 2;
        d
    });
    let mut timers = TimerQueue::new();
    lifecycle::launch_program(&mut program, &mut timers, Instant::now());
    assert_eq!(program.proc_cnt(), 2);

    let outcome = lifecycle::signal_stop(&mut program, &mut timers, Instant::now());
    assert_eq!(outcome, StopOutcome::Signaled);

    let pids: Vec<_> = program.processes.iter().map(|p| p.pid).collect();
    for pid in pids {
        let status = waitpid(pid, None).expect("SIGTERM should reap the child");
        assert!(matches!(status, WaitStatus::Signaled(_, Signal::SIGTERM, _)));
    }
    program.processes.clear();
    program.pgid = None;
    assert_eq!(program.proc_cnt(), 0);

    lifecycle::launch_program(&mut program, &mut timers, Instant::now());
    assert!(program.proc_cnt() <= program.def.numprocs as usize);
    assert_eq!(program.proc_cnt(), 2);
}

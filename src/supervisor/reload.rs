//! Reload reconciler (C6): diffs running state against a freshly loaded
//! configuration and latches add/delete/soft-update events.
use crate::config::ProgramDef;
use crate::supervisor::program::{PendingEvent, Program, ProgramList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    Soft,
    Hard,
    Neither,
}

/// Summary of one reload pass, useful for logging and tests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub soft_updated: Vec<String>,
    pub hard_replaced: Vec<String>,
}

/// Classify the difference between a running program's definition and
/// its freshly loaded counterpart (§4.6 step 3). Hard dominates soft.
pub fn classify_change(old: &ProgramDef, new: &ProgramDef) -> ChangeClass {
    let hard = old.cmd != new.cmd
        || old.numprocs != new.numprocs
        || old.env != new.env
        || old.std_out != new.std_out
        || old.std_err != new.std_err
        || old.workingdir != new.workingdir
        || old.umask != new.umask
        || old.exitcodes.len() != new.exitcodes.len();

    if hard {
        return ChangeClass::Hard;
    }

    let soft = old.autostart != new.autostart
        || old.autorestart != new.autorestart
        || old.starttime_ms != new.starttime_ms
        || old.startretries != new.startretries
        || old.stopsignal != new.stopsignal
        || old.stoptime_ms != new.stoptime_ms
        || old.exitcodes != new.exitcodes;

    if soft {
        ChangeClass::Soft
    } else {
        ChangeClass::Neither
    }
}

/// Copy the runtime-policy-only fields of `new` into `old` in place
/// (§4.6 step 4).
fn apply_soft_update(old: &mut ProgramDef, new: &ProgramDef) {
    old.autostart = new.autostart;
    old.autorestart = new.autorestart;
    old.starttime_ms = new.starttime_ms;
    old.startretries = new.startretries;
    old.stopsignal = new.stopsignal;
    old.stoptime_ms = new.stoptime_ms;
    old.exitcodes = new.exitcodes.clone();
}

/// Run the reconciliation algorithm against `list`, consuming `new_defs`
/// (the freshly loaded `L'`). Events are latched on `list`'s programs;
/// the ordinary dispatcher pass (C4) drains them.
pub fn reconcile(list: &mut ProgramList, new_defs: Vec<ProgramDef>) -> ReloadSummary {
    let mut summary = ReloadSummary::default();
    let mut remaining: Vec<ProgramDef> = new_defs;

    // Step 1: programs absent from the new config are marked for deletion.
    for program in list.iter_mut() {
        if program.pending_event == PendingEvent::Delete {
            continue;
        }
        if !remaining.iter().any(|d| d.name == program.name()) {
            program.pending_event = PendingEvent::Delete;
            summary.deleted.push(program.name().to_string());
        }
    }

    // Step 3-5: programs present in both get soft/hard/neither treatment.
    // Matched entries are removed from `remaining` as they're consumed,
    // so step 2 only sees genuinely new programs.
    let mut i = 0;
    while i < remaining.len() {
        let name = remaining[i].name.clone();
        if let Some(program) = list.get_mut(&name) {
            let new_def = remaining.remove(i);
            match classify_change(&program.def, &new_def) {
                ChangeClass::Soft => {
                    apply_soft_update(&mut program.def, &new_def);
                    summary.soft_updated.push(name);
                }
                ChangeClass::Hard => {
                    program.pending_event = PendingEvent::Delete;
                    let mut replacement = Program::new(new_def);
                    replacement.pending_event = PendingEvent::Add;
                    summary.hard_replaced.push(name.clone());
                    list.insert_after(&name, replacement);
                }
                ChangeClass::Neither => {}
            }
        } else {
            i += 1;
        }
    }

    // Step 2: whatever's left in `remaining` has no counterpart in `L`.
    for new_def in remaining {
        let name = new_def.name.clone();
        let mut program = Program::new(new_def);
        program.pending_event = PendingEvent::Add;
        summary.added.push(name);
        list.insert_front(program);
    }

    summary
}

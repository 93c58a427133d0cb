//! Timer queue (C2): a deadline-ordered list of per-program start/stop
//! timers, driving a single kernel alarm.
//!
//! The queue never owns a program: entries reference programs by name
//! (§9 Design Notes — "cyclic references"), so the queue can be dropped
//! or rebuilt independently of the `ProgramList` it times.
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Start,
    Stop,
}

#[derive(Debug, Clone)]
pub struct TimerEntry {
    pub program: String,
    pub deadline: Instant,
    pub kind: TimerKind,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: Vec<TimerEntry>,
}

impl TimerQueue {
    pub fn new() -> Self {
        TimerQueue { entries: Vec::new() }
    }

    /// Insert `entry` in deadline order, stable on ties (new entries with
    /// an equal deadline go after existing ones). Returns `true` if the
    /// entry landed at the head, meaning the caller must reprogram the
    /// kernel alarm.
    pub fn insert(&mut self, entry: TimerEntry) -> bool {
        let pos = self
            .entries
            .iter()
            .position(|e| e.deadline > entry.deadline)
            .unwrap_or(self.entries.len());
        let became_head = pos == 0;
        self.entries.insert(pos, entry);
        became_head
    }

    /// Arm a timer for `program`, computing the deadline from `now` and
    /// `duration_ms`/1000. If the deadline has already passed, the entry
    /// is handed back immediately instead of being queued (spec: "the
    /// handler fires synchronously... without touching the kernel
    /// timer").
    pub fn arm(
        &mut self,
        program: &str,
        kind: TimerKind,
        now: Instant,
        duration_ms: u64,
    ) -> ArmOutcome {
        let deadline = now + Duration::from_millis(duration_ms);
        if deadline <= now {
            ArmOutcome::FireNow(TimerEntry {
                program: program.to_string(),
                deadline,
                kind,
            })
        } else {
            let became_head = self.insert(TimerEntry {
                program: program.to_string(),
                deadline,
                kind,
            });
            ArmOutcome::Queued { became_head }
        }
    }

    /// Remove and return every entry with `deadline <= now`, in deadline
    /// order (the order they were inserted, for ties).
    pub fn pop_due(&mut self, now: Instant) -> Vec<TimerEntry> {
        let split = self
            .entries
            .iter()
            .position(|e| e.deadline > now)
            .unwrap_or(self.entries.len());
        self.entries.drain(0..split).collect()
    }

    /// Drain every entry referring to `program`, in order (used when the
    /// program becomes idle before its stop deadline).
    pub fn drain_for(&mut self, program: &str) -> Vec<TimerEntry> {
        let mut drained = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].program == program {
                drained.push(self.entries.remove(i));
            } else {
                i += 1;
            }
        }
        drained
    }

    pub fn head_deadline(&self) -> Option<Instant> {
        self.entries.first().map(|e| e.deadline)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Invariant: sorted by deadline ascending. Exposed for tests.
    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].deadline <= w[1].deadline)
    }
}

pub enum ArmOutcome {
    /// Deadline already elapsed; the caller must run the handler inline.
    FireNow(TimerEntry),
    /// Queued normally; `became_head` tells the caller whether to
    /// reprogram the kernel alarm.
    Queued { became_head: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_ascending_order() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.insert(TimerEntry { program: "a".into(), deadline: now + Duration::from_secs(5), kind: TimerKind::Start });
        q.insert(TimerEntry { program: "b".into(), deadline: now + Duration::from_secs(1), kind: TimerKind::Start });
        q.insert(TimerEntry { program: "c".into(), deadline: now + Duration::from_secs(3), kind: TimerKind::Start });
        assert!(q.is_sorted());
        let order: Vec<&str> = q.entries.iter().map(|e| e.program.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn equal_deadlines_preserve_insertion_order() {
        let mut q = TimerQueue::new();
        let deadline = Instant::now() + Duration::from_secs(1);
        q.insert(TimerEntry { program: "first".into(), deadline, kind: TimerKind::Start });
        q.insert(TimerEntry { program: "second".into(), deadline, kind: TimerKind::Start });
        let order: Vec<&str> = q.entries.iter().map(|e| e.program.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);
    }

    #[test]
    fn insert_reports_when_new_head() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        assert!(q.insert(TimerEntry { program: "a".into(), deadline: now + Duration::from_secs(5), kind: TimerKind::Start }));
        assert!(!q.insert(TimerEntry { program: "b".into(), deadline: now + Duration::from_secs(10), kind: TimerKind::Start }));
        assert!(q.insert(TimerEntry { program: "c".into(), deadline: now + Duration::from_secs(1), kind: TimerKind::Start }));
    }

    #[test]
    fn pop_due_drains_only_expired_entries_in_order() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.insert(TimerEntry { program: "late".into(), deadline: now + Duration::from_secs(10), kind: TimerKind::Start });
        q.insert(TimerEntry { program: "early".into(), deadline: now - Duration::from_secs(1), kind: TimerKind::Start });
        let due = q.pop_due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].program, "early");
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn drain_for_removes_only_matching_program() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.insert(TimerEntry { program: "a".into(), deadline: now + Duration::from_secs(1), kind: TimerKind::Stop });
        q.insert(TimerEntry { program: "b".into(), deadline: now + Duration::from_secs(2), kind: TimerKind::Start });
        q.insert(TimerEntry { program: "a".into(), deadline: now + Duration::from_secs(3), kind: TimerKind::Start });
        let drained = q.drain_for("a");
        assert_eq!(drained.len(), 2);
        assert_eq!(q.len(), 1);
        assert_eq!(q.entries[0].program, "b");
    }

    #[test]
    fn arm_past_deadline_fires_synchronously() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        match q.arm("p", TimerKind::Stop, now, 0) {
            ArmOutcome::FireNow(entry) => assert_eq!(entry.program, "p"),
            ArmOutcome::Queued { .. } => panic!("expected immediate fire"),
        }
        assert!(q.is_empty());
    }

    #[test]
    fn arm_future_deadline_queues_and_reports_head() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        match q.arm("p", TimerKind::Start, now, 1000) {
            ArmOutcome::Queued { became_head } => assert!(became_head),
            ArmOutcome::FireNow(_) => panic!("expected queued"),
        }
        assert_eq!(q.len(), 1);
    }
}

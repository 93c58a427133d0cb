//! Line editor / completion provider (A3).
//!
//! This is deliberately the thinnest possible implementation of the
//! "external collaborator" the core spec carves out: a blocking stdin
//! reader with an in-memory history and a pure prefix-completion
//! function over a vocabulary the dispatcher refreshes every pass.
use std::io::{self, Write};

const HISTORY_CAP: usize = 1000;

pub struct LineEditor {
    history: Vec<String>,
    vocabulary: Vec<String>,
}

impl LineEditor {
    pub fn new() -> Self {
        LineEditor {
            history: Vec::new(),
            vocabulary: Vec::new(),
        }
    }

    /// Write `prompt`, block for one line from stdin. Returns `Ok(None)`
    /// on EOF (operator pressed Ctrl-D).
    pub fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.write_prompt(prompt)?;
        self.read_ready_line()
    }

    /// Write `prompt` and flush, without reading anything. Split out from
    /// [`read_line`] so a caller can wait for stdin to become readable
    /// (e.g. via `poll`, interruptible by a signal) before committing to
    /// the blocking read, without the prompt being redrawn on every retry.
    pub fn write_prompt(&self, prompt: &str) -> io::Result<()> {
        print!("{prompt}");
        io::stdout().flush()
    }

    /// Block for one line from stdin, assuming the caller already knows
    /// it won't block indefinitely (stdin ready, or the caller is fine
    /// blocking). Returns `Ok(None)` on EOF.
    pub fn read_ready_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = String::new();
        let n = io::stdin().read_line(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        let line = buf.trim_end_matches(['\n', '\r']).to_string();
        if !line.trim().is_empty() {
            self.push_history(line.clone());
        }
        Ok(Some(line))
    }

    fn push_history(&mut self, line: String) {
        self.history.push(line);
        if self.history.len() > HISTORY_CAP {
            self.history.remove(0);
        }
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Replace the completion vocabulary (command verbs + live program
    /// names), called after every dispatcher pass.
    pub fn set_vocabulary(&mut self, words: Vec<String>) {
        self.vocabulary = words;
    }

    /// Every vocabulary entry that starts with `partial`.
    pub fn complete(&self, partial: &str) -> Vec<String> {
        self.vocabulary
            .iter()
            .filter(|w| w.starts_with(partial))
            .cloned()
            .collect()
    }
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

//! Operator-facing shell: line reading (A3) and command parsing (C5).
pub mod command;
pub mod line;

pub const PROMPT: &str = "supervisor$ ";

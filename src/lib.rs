//! Foreground interactive supervisor for long-running child processes.
//!
//! Owns its children's process groups, reconciles exits against a
//! restart policy, and reloads its configuration on command or on
//! `SIGHUP`, all driven from a single operator shell.
pub mod config;
pub mod error;
pub mod logging;
pub mod shell;
pub mod supervisor;

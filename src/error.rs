//! Error taxonomy for the supervisor core.
//!
//! Kinds are kept as plain enums with hand-written `Display`/`Error` impls,
//! following the rest of this crate rather than pulling in a derive macro
//! for what amounts to a handful of fixed-shape messages.
use std::error::Error;
use std::fmt::{self, Display};
use std::io;

/// Errors surfaced by the supervision core (C1-C7).
///
/// Startup-fatal variants are meant to propagate to `main` and become an
/// exit code; the rest are meant to be logged and absorbed.
#[derive(Debug)]
pub enum SupervisorError {
    /// stdin is not a controlling terminal.
    NotInteractive,
    /// Could not acquire the foreground process group.
    Foreground(io::Error),
    /// `fork()` failed.
    Spawn(nix::Error),
    /// A kernel call that is allowed to fail transiently (`kill`, `waitpid`,
    /// `setitimer`) did so. The caller logs and continues.
    Transient(&'static str, nix::Error),
    /// The named program does not exist.
    UnknownProgram(String),
    /// Could not open a child's stdio redirection file.
    Redirect(io::Error),
}

impl Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SupervisorError::NotInteractive => {
                write!(f, "can't be launched in non-interactive mode")
            }
            SupervisorError::Foreground(e) => write!(f, "couldn't acquire foreground: {e}"),
            SupervisorError::Spawn(e) => write!(f, "fork failed: {e}"),
            SupervisorError::Transient(op, e) => write!(f, "{op} failed: {e}"),
            SupervisorError::UnknownProgram(name) => write!(f, "unknown program: {name}"),
            SupervisorError::Redirect(e) => write!(f, "couldn't open redirection file: {e}"),
        }
    }
}

impl Error for SupervisorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SupervisorError::Foreground(e) | SupervisorError::Redirect(e) => Some(e),
            SupervisorError::Spawn(e) => Some(e),
            SupervisorError::Transient(_, e) => Some(e),
            SupervisorError::NotInteractive | SupervisorError::UnknownProgram(_) => None,
        }
    }
}

/// Errors from loading and validating a configuration document (A1).
#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_yaml::Error),
    Validation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "couldn't read config: {e}"),
            ConfigError::Parse(e) => write!(f, "couldn't parse config: {e}"),
            ConfigError::Validation(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Validation(_) => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e)
    }
}

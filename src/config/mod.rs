//! Configuration loader (A1).
//!
//! Parses an operator-supplied YAML document into validated [`ProgramDef`]
//! values. The supervision core never sees YAML; it only ever receives
//! `Vec<ProgramDef>` produced by [`load`].
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use nix::sys::signal::Signal;
use serde::Deserialize;

use crate::error::ConfigError;

/// Restart policy for a program's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoRestart {
    Never,
    Always,
    Unexpected,
}

/// A validated, defaulted program definition, ready for the supervision
/// core to build a [`crate::supervisor::program::Program`] from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDef {
    pub name: String,
    pub cmd: Vec<String>,
    pub env: Vec<(String, String)>,
    pub std_out: String,
    pub std_err: String,
    pub workingdir: Option<String>,
    pub exitcodes: BTreeSet<i32>,
    pub numprocs: u32,
    pub umask: u32,
    pub autorestart: AutoRestart,
    pub startretries: u32,
    pub autostart: bool,
    pub stopsignal: Signal,
    pub starttime_ms: u64,
    pub stoptime_ms: u64,
}

/// Wire shape of one `programs.<name>` entry. Every field optional so that
/// defaulting happens in one place ([`validate`]) rather than scattered
/// `#[serde(default = ...)]` attributes per field.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProgramDef {
    cmd: Vec<String>,
    #[serde(default)]
    env: Vec<String>,
    std_out: Option<String>,
    std_err: Option<String>,
    workingdir: Option<String>,
    #[serde(default)]
    exitcodes: Option<Vec<i32>>,
    numprocs: Option<u32>,
    umask: Option<u32>,
    autorestart: Option<AutoRestart>,
    startretries: Option<u32>,
    autostart: Option<bool>,
    stopsignal: Option<String>,
    starttime_ms: Option<u64>,
    stoptime_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    programs: HashMap<String, RawProgramDef>,
}

/// Load and validate a configuration document from `path`.
pub fn load(path: &Path) -> Result<Vec<ProgramDef>, ConfigError> {
    let contents = fs::read_to_string(path)?;
    parse(&contents)
}

/// Parse an already-read YAML document. Split out from [`load`] so tests
/// can exercise validation without touching the filesystem.
pub fn parse(contents: &str) -> Result<Vec<ProgramDef>, ConfigError> {
    let doc: RawDocument = serde_yaml::from_str(contents)?;
    let mut defs = Vec::with_capacity(doc.programs.len());
    for (name, raw) in doc.programs {
        defs.push(validate(name, raw)?);
    }
    defs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(defs)
}

fn validate(name: String, raw: RawProgramDef) -> Result<ProgramDef, ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation("program name must not be empty".into()));
    }
    if raw.cmd.is_empty() {
        return Err(ConfigError::Validation(format!("{name}: cmd must not be empty")));
    }
    let numprocs = raw.numprocs.unwrap_or(1);
    if numprocs < 1 {
        return Err(ConfigError::Validation(format!("{name}: numprocs must be >= 1")));
    }

    let stopsignal = match raw.stopsignal {
        Some(s) => parse_signal(&s)
            .ok_or_else(|| ConfigError::Validation(format!("{name}: unknown stopsignal {s:?}")))?,
        None => Signal::SIGTERM,
    };

    let env = raw
        .env
        .into_iter()
        .map(|kv| {
            kv.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| ConfigError::Validation(format!("{name}: malformed env entry {kv:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let exitcodes = raw
        .exitcodes
        .map(|v| v.into_iter().collect())
        .unwrap_or_else(|| BTreeSet::from([0]));

    Ok(ProgramDef {
        name,
        cmd: raw.cmd,
        env,
        std_out: raw.std_out.unwrap_or_else(|| "/dev/null".to_string()),
        std_err: raw.std_err.unwrap_or_else(|| "/dev/null".to_string()),
        workingdir: raw.workingdir,
        exitcodes,
        numprocs,
        umask: raw.umask.unwrap_or(0),
        autorestart: raw.autorestart.unwrap_or(AutoRestart::Unexpected),
        startretries: raw.startretries.unwrap_or(0),
        autostart: raw.autostart.unwrap_or(true),
        stopsignal,
        starttime_ms: raw.starttime_ms.unwrap_or(1000),
        stoptime_ms: raw.stoptime_ms.unwrap_or(10000),
    })
}

/// Accepts `TERM`, `SIGTERM`, `term`, case-insensitively.
fn parse_signal(s: &str) -> Option<Signal> {
    let upper = s.to_ascii_uppercase();
    let candidate = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::iterator().find(|sig| sig.as_str() == candidate)
}

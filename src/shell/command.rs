//! Command surface (C5): parses one normalized operator line into a
//! [`Command`], validating arity and program names before any effect.
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{self, Display};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status(Vec<String>),
    Start(Vec<String>),
    Stop(Vec<String>),
    Restart(Vec<String>),
    Reload,
    Exit,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    EmptyLine,
    CommandNotFound(String),
    TooManyArguments,
    ArgumentMissing,
    BadArgument(String),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::EmptyLine => write!(f, "empty line"),
            ParseError::CommandNotFound(verb) => write!(f, "command not found: {verb}"),
            ParseError::TooManyArguments => write!(f, "too many arguments"),
            ParseError::ArgumentMissing => write!(f, "argument missing"),
            ParseError::BadArgument(name) => write!(f, "bad argument: {name}"),
        }
    }
}

impl Error for ParseError {}

/// Normalize whitespace: collapse runs of whitespace, trim ends.
pub fn normalize(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse one normalized line against the current set of known program
/// names. `known_programs` should exclude programs with a pending
/// `delete` event (invariant 8 of the expanded data model).
pub fn parse(line: &str, known_programs: &[String]) -> Result<Command, ParseError> {
    let normalized = normalize(line);
    let mut tokens = normalized.split(' ').filter(|t| !t.is_empty());
    let verb = tokens.next().ok_or(ParseError::EmptyLine)?;
    let args: Vec<&str> = tokens.collect();

    match verb {
        "status" => Ok(Command::Status(validate_names(&args, known_programs)?)),
        "start" => Ok(Command::Start(validate_nonempty_names(&args, known_programs)?)),
        "stop" => Ok(Command::Stop(validate_nonempty_names(&args, known_programs)?)),
        "restart" => Ok(Command::Restart(validate_nonempty_names(&args, known_programs)?)),
        "reload" => {
            reject_arguments(&args)?;
            Ok(Command::Reload)
        }
        "exit" => {
            reject_arguments(&args)?;
            Ok(Command::Exit)
        }
        "help" => {
            reject_arguments(&args)?;
            Ok(Command::Help)
        }
        other => Err(ParseError::CommandNotFound(other.to_string())),
    }
}

fn reject_arguments(args: &[&str]) -> Result<(), ParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ParseError::TooManyArguments)
    }
}

fn validate_names(args: &[&str], known_programs: &[String]) -> Result<Vec<String>, ParseError> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(args.len());
    for &arg in args {
        if !seen.insert(arg) {
            return Err(ParseError::TooManyArguments);
        }
        if !known_programs.iter().any(|p| p == arg) {
            return Err(ParseError::BadArgument(arg.to_string()));
        }
        names.push(arg.to_string());
    }
    Ok(names)
}

fn validate_nonempty_names(
    args: &[&str],
    known_programs: &[String],
) -> Result<Vec<String>, ParseError> {
    if args.is_empty() {
        return Err(ParseError::ArgumentMissing);
    }
    validate_names(args, known_programs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn programs() -> Vec<String> {
        vec!["sleeper".to_string(), "crasher".to_string()]
    }

    #[test]
    fn empty_line_is_rejected() {
        assert_eq!(parse("", &programs()), Err(ParseError::EmptyLine));
        assert_eq!(parse("   ", &programs()), Err(ParseError::EmptyLine));
    }

    #[test]
    fn status_with_no_args_lists_all() {
        assert_eq!(parse("status", &programs()), Ok(Command::Status(vec![])));
    }

    #[test]
    fn status_with_args_filters() {
        assert_eq!(
            parse("status sleeper", &programs()),
            Ok(Command::Status(vec!["sleeper".to_string()]))
        );
    }

    #[test]
    fn start_requires_at_least_one_name() {
        assert_eq!(parse("start", &programs()), Err(ParseError::ArgumentMissing));
    }

    #[test]
    fn start_rejects_unknown_program() {
        assert_eq!(
            parse("start nope", &programs()),
            Err(ParseError::BadArgument("nope".to_string()))
        );
    }

    #[test]
    fn duplicate_names_are_too_many_arguments() {
        assert_eq!(
            parse("start sleeper sleeper", &programs()),
            Err(ParseError::TooManyArguments)
        );
    }

    #[test]
    fn unknown_verb_is_command_not_found() {
        assert_eq!(
            parse("frobnicate", &programs()),
            Err(ParseError::CommandNotFound("frobnicate".to_string()))
        );
    }

    #[test]
    fn zero_arity_verbs_reject_arguments() {
        assert_eq!(parse("exit now", &programs()), Err(ParseError::TooManyArguments));
        assert_eq!(parse("reload now", &programs()), Err(ParseError::TooManyArguments));
        assert_eq!(parse("help me", &programs()), Err(ParseError::TooManyArguments));
    }

    #[test]
    fn whitespace_is_normalized() {
        assert_eq!(
            parse("  start    sleeper  ", &programs()),
            Ok(Command::Start(vec!["sleeper".to_string()]))
        );
    }

    #[test]
    fn multiple_distinct_names_are_accepted() {
        assert_eq!(
            parse("stop sleeper crasher", &programs()),
            Ok(Command::Stop(vec!["sleeper".to_string(), "crasher".to_string()]))
        );
    }
}

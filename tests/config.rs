//! Config loader exercised against a real file on disk (unlike the
//! crate's own unit tests, which parse in-memory strings).
use std::io::Write;

use supervisor::config;
use supervisor::error::ConfigError;

#[test]
fn load_reads_and_validates_a_real_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
programs:
  sleeper:
    cmd: ["/bin/sleep", "1"]
    numprocs: 2
  crasher:
    cmd: ["/bin/false"]
    autorestart: always
    startretries: 3
"#
    )
    .unwrap();

    let defs = config::load(file.path()).unwrap();
    assert_eq!(defs.len(), 2);

    let sleeper = defs.iter().find(|d| d.name == "sleeper").unwrap();
    assert_eq!(sleeper.numprocs, 2);

    let crasher = defs.iter().find(|d| d.name == "crasher").unwrap();
    assert_eq!(crasher.startretries, 3);
}

#[test]
fn load_surfaces_an_io_error_for_a_missing_path() {
    let err = config::load(std::path::Path::new("/nonexistent/supervisor.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

//! Integration test: drive the control server over a real Unix socket
//! the way the operator tool does -- one connection per exchange, a
//! command token out, a text reply back.
//!
//! Everything lives in one test function: the command handlers mutate
//! the process-wide option word, so independent tests would race.

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;
use std::time::Duration;

use pulse_runtime::{options, set_options, ControlServer, Options, REPORT_PATH_ENV};

fn exchange(path: &Path, command: &str) -> String {
    // The server may not have reached accept() yet right after bind.
    let mut stream = None;
    for _ in 0..50 {
        match UnixStream::connect(path) {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }
    }
    let mut stream = stream.expect("control server did not come up");

    stream.write_all(command.as_bytes()).unwrap();
    stream.shutdown(Shutdown::Write).unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).unwrap();
    reply
}

#[test]
fn command_round_trips() {
    let dir = tempfile::TempDir::new().unwrap();
    let socket = dir.path().join("control.sock");
    let report_path = dir.path().join("report.txt");
    std::env::set_var(REPORT_PATH_ENV, &report_path);

    let server = ControlServer::bind(&socket).expect("bind control socket");
    // The serve loop runs for the process lifetime; the thread is
    // deliberately not joined.
    thread::spawn(move || server.run());

    set_options(Options::empty());

    // Fresh process state reads as None.
    let reply = exchange(&socket, "state");
    assert!(reply.contains("None"), "unexpected state reply: {reply}");

    // enable flips profiling + file output on.
    assert_eq!(exchange(&socket, "enable"), "Enable Success");
    assert_eq!(options(), Options::PROFILER | Options::SAVE_TO_FILE);
    let reply = exchange(&socket, "state");
    assert!(
        reply.contains("Performance Profiler"),
        "state after enable: {reply}"
    );
    assert!(reply.contains("Save To File"), "state after enable: {reply}");

    // save renders a report to the configured file destination.
    assert_eq!(exchange(&socket, "save"), "Save Success");
    let report = std::fs::read_to_string(&report_path).expect("save should write the report file");
    assert!(
        report.contains("Performance Profiler Report"),
        "report content: {report}"
    );

    // Unknown commands are answered, not dropped.
    assert_eq!(exchange(&socket, "bogus"), "Invalid Command");
    // Leading/trailing whitespace around a valid token is tolerated.
    let reply = exchange(&socket, "state\n");
    assert!(reply.starts_with("State:"), "trimmed command reply: {reply}");

    // disable clears every flag.
    assert_eq!(exchange(&socket, "disable"), "Disable Success");
    assert!(options().is_empty());
    let reply = exchange(&socket, "state");
    assert!(reply.contains("None"), "state after disable: {reply}");

    std::env::remove_var(REPORT_PATH_ENV);
}

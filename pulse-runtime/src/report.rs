//! Report rendering and sinks.
//!
//! The report is rendered against any `io::Write` sink. Each configured
//! destination gets its own independent render so a failure writing one
//! (a full disk, a closed stdout) cannot affect the other; sink failures
//! are logged and swallowed -- report generation must never take down
//! the instrumented process.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::options::{options, Options};
use crate::registry::Registry;

/// Environment variable overriding the report file destination.
pub const REPORT_PATH_ENV: &str = "PULSE_REPORT_PATH";

/// Where the file destination writes when no override is set.
pub fn default_report_path() -> PathBuf {
    std::env::temp_dir()
        .join("pulse")
        .join(format!("report-{}.txt", std::process::id()))
}

fn report_path() -> PathBuf {
    match std::env::var_os(REPORT_PATH_ENV) {
        Some(path) => PathBuf::from(path),
        None => default_report_path(),
    }
}

/// Write the report to every destination selected by the current
/// options. Called by the `save` control command and by the process-exit
/// hook; a no-op when no destination bit is set.
pub fn output() {
    let flags = options();

    if flags.contains(Options::SAVE_TO_CONSOLE) {
        let stdout = io::stdout();
        if let Err(err) = render(&mut stdout.lock()) {
            tracing::warn!(error = %err, "failed to write report to console");
        }
    }

    if flags.contains(Options::SAVE_TO_FILE) {
        let path = report_path();
        if let Err(err) = write_file(&path) {
            tracing::warn!(error = %err, path = %path.display(), "failed to write report file");
        }
    }
}

fn write_file(path: &std::path::Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    render(&mut file)
}

/// Render the full report into one sink.
pub fn render(w: &mut dyn Write) -> io::Result<()> {
    let registry = Registry::global();

    writeln!(w, "=============Performance Profiler Report==============")?;
    writeln!(w)?;
    writeln!(
        w,
        "Profiler Begin Time: {}",
        registry.begin_time().format("%Y-%m-%d %H:%M:%S")
    )?;
    writeln!(w)?;

    for (index, (site, section)) in registry.snapshot(options()).iter().enumerate() {
        writeln!(w, "NO{}. Description:{}", index + 1, site.description())?;
        writeln!(w, "{}", site.identity_line())?;
        section.serialize(w)?;
        writeln!(w)?;
    }

    writeln!(w, "==========================end========================")?;
    Ok(())
}

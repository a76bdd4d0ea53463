//! Runtime control channel.
//!
//! A dedicated thread listens on a Unix-domain socket whose name embeds
//! the process id, so several instrumented processes on one host never
//! collide. The protocol is one exchange per connection: the client
//! writes a UTF-8 command token and shuts down its write half, the
//! server replies with a UTF-8 text blob and closes. Command strings are
//! dispatched through a fixed table of handler functions; anything
//! unknown gets the literal `Invalid Command` reply.
//!
//! A failed bind is logged as an error and ends the server thread --
//! profiling itself keeps working. Failures on a single exchange are
//! logged and the loop moves on to the next connection; the loop never
//! exits under normal operation.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::thread;

use crate::options::{merge_options, options, set_options, Options};

type CmdHandler = fn() -> String;

/// Control socket location for the instrumented process `pid`. Client
/// and server must agree on this.
pub fn socket_path(pid: u32) -> PathBuf {
    std::env::temp_dir().join(format!("pulse-{pid}.sock"))
}

/// Command-dispatch server over one Unix-domain socket.
pub struct ControlServer {
    listener: UnixListener,
    commands: HashMap<&'static str, CmdHandler>,
}

impl ControlServer {
    /// Bind the control socket, replacing any stale file left behind by
    /// a previous process with the same path.
    pub fn bind(path: &Path) -> io::Result<Self> {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
        let listener = UnixListener::bind(path)?;

        let mut commands: HashMap<&'static str, CmdHandler> = HashMap::new();
        commands.insert("state", cmd_state);
        commands.insert("save", cmd_save);
        commands.insert("enable", cmd_enable);
        commands.insert("disable", cmd_disable);

        Ok(Self { listener, commands })
    }

    /// Serve exchanges forever.
    pub fn run(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    if let Err(err) = self.handle(stream) {
                        tracing::warn!(error = %err, "control exchange failed");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "control accept failed");
                }
            }
        }
    }

    /// One request/reply exchange.
    fn handle(&self, mut stream: UnixStream) -> io::Result<()> {
        let mut request = String::new();
        stream.read_to_string(&mut request)?;
        let command = request.trim();
        tracing::debug!(command, "received control command");

        let reply = match self.commands.get(command) {
            Some(handler) => handler(),
            None => "Invalid Command".to_owned(),
        };

        stream.write_all(reply.as_bytes())?;
        stream.shutdown(Shutdown::Write)?;
        Ok(())
    }
}

/// Start the control server thread for `pid`. Called once from registry
/// initialization.
pub(crate) fn spawn_server(pid: u32) {
    let path = socket_path(pid);
    let spawned = thread::Builder::new()
        .name("pulse-control".into())
        .spawn(move || match ControlServer::bind(&path) {
            Ok(server) => {
                tracing::info!(path = %path.display(), "control server listening");
                server.run();
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    path = %path.display(),
                    "control server failed to bind; runtime control disabled"
                );
            }
        });
    if let Err(err) = spawned {
        tracing::error!(error = %err, "failed to spawn control server thread");
    }
}

fn cmd_state() -> String {
    let flags = options();
    let mut reply = String::from("State:");

    if flags.is_empty() {
        reply.push_str("None\n");
        return reply;
    }

    if flags.contains(Options::PROFILER) {
        reply.push_str("Performance Profiler\n");
    }
    if flags.contains(Options::SAVE_TO_CONSOLE) {
        reply.push_str("Save To Console\n");
    }
    if flags.contains(Options::SAVE_TO_FILE) {
        reply.push_str("Save To File\n");
    }
    reply
}

fn cmd_enable() -> String {
    set_options(Options::PROFILER | Options::SAVE_TO_FILE);
    "Enable Success".to_owned()
}

fn cmd_disable() -> String {
    set_options(Options::empty());
    "Disable Success".to_owned()
}

fn cmd_save() -> String {
    merge_options(Options::SAVE_TO_FILE);
    crate::report::output();
    "Save Success".to_owned()
}

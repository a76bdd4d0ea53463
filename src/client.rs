//! Thin client side of the control channel: one connection per
//! exchange, command out, reply back.

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;

use pulse_runtime::socket_path;

use crate::error::Error;

/// Send one command to the instrumented process and return its reply.
pub fn send_command(pid: u32, command: &str) -> Result<String, Error> {
    let path = socket_path(pid);
    let mut stream =
        UnixStream::connect(&path).map_err(|source| Error::Connect { pid, source })?;

    let exchange = |stream: &mut UnixStream| -> std::io::Result<String> {
        stream.write_all(command.as_bytes())?;
        // Server reads to EOF; close our write half to delimit the request.
        stream.shutdown(Shutdown::Write)?;
        let mut reply = String::new();
        stream.read_to_string(&mut reply)?;
        Ok(reply)
    };

    exchange(&mut stream).map_err(|source| Error::Exchange { pid, source })
}

use std::io::{self, BufRead, Write};
use std::process;

use clap::Parser;

mod client;
mod error;

use error::Error;

#[derive(Parser)]
#[command(
    name = "pulse",
    about = "Operator tool for the pulse in-process profiler",
    version,
    after_help = "Without COMMAND an interactive shell is opened. \
                  Commands: state, enable, disable, save."
)]
struct Cli {
    /// Process id of the instrumented program.
    #[arg(short, long)]
    pid: u32,

    /// One-shot command to send; omit for an interactive shell.
    command: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let result = match &cli.command {
        Some(command) => run_once(cli.pid, command),
        None => run_shell(cli.pid),
    };
    if let Err(err) = result {
        eprintln!("pulse: {err}");
        process::exit(1);
    }
}

fn run_once(pid: u32, command: &str) -> Result<(), Error> {
    let reply = client::send_command(pid, command)?;
    println!("{reply}");
    Ok(())
}

fn run_shell(pid: u32) -> Result<(), Error> {
    print_help();
    let stdin = io::stdin();

    loop {
        print!("shell:>");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        match line.trim() {
            "" => {}
            "help" => print_help(),
            "exit" => {
                println!("Pulse Client Exit");
                break;
            }
            command => match client::send_command(pid, command) {
                Ok(reply) => println!("{reply}\n"),
                // A failed exchange should not end the shell.
                Err(err) => eprintln!("pulse: {err}"),
            },
        }
    }
    Ok(())
}

fn print_help() {
    println!("    <exit>:    Exit.");
    println!("    <help>:    Show usage help.");
    println!("    <state>:   Show the profiler state of the target process.");
    println!("    <enable>:  Force enable the performance profiler.");
    println!("    <disable>: Force disable the performance profiler.");
    println!("    <save>:    Save the profiling report to file.");
}

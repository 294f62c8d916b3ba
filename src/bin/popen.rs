//! Run a program with its streams wired to the console.

use anyhow::{Context, Result};
use clap::Parser;
use popen_expect::{launch, launch_pty, ExitSignal, StreamConsumer};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Pause after a read that found no data
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for buffered output after the program exits
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "popen")]
#[command(author, version, about = "Run a program over a pseudo-terminal or pipes", long_about = None)]
struct Args {
    /// Use plain pipes instead of a pseudo-terminal
    #[arg(long)]
    pipe: bool,

    /// Program to run
    program: String,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

/// Copies the console to the child and the child to the console.
struct ConsoleConsumer {
    pipe: bool,
    drained: Notify,
}

impl StreamConsumer for ConsoleConsumer {
    fn consume_input(&self, mut stdin: Box<dyn Write + Send>) {
        let mut console = io::stdin().lock();
        let mut buf = [0u8; 1024];
        loop {
            let n = match console.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            };
            if stdin.write_all(&buf[..n]).and_then(|()| stdin.flush()).is_err() {
                break;
            }
        }
    }

    fn consume_output(&self, mut stdout: Box<dyn Read + Send>, exit: ExitSignal) {
        let mut console = io::stdout();
        let mut buf = [0u8; 1024];
        loop {
            match stdout.read(&mut buf) {
                Ok(0) => {
                    if exit.has_exited() {
                        break;
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Ok(n) => {
                    if console.write_all(&buf[..n]).and_then(|()| console.flush()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if exit.has_exited() {
                        break;
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(error = %e, "output closed");
                    break;
                }
            }
        }
        self.drained.notify_one();
    }

    fn consume_error(&self, mut stderr: Box<dyn Read + Send>, _exit: ExitSignal) {
        // a pseudo-terminal's errors arrive through consume_output
        if !self.pipe {
            return;
        }
        if let Err(e) = io::copy(&mut stderr, &mut io::stderr()) {
            tracing::debug!(error = %e, "error stream closed");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let argv: Vec<&str> = args.args.iter().map(String::as_str).collect();

    let consumer = Arc::new(ConsoleConsumer {
        pipe: args.pipe,
        drained: Notify::new(),
    });
    let handle = if args.pipe {
        launch(consumer.clone(), &args.program, &argv)
    } else {
        launch_pty(consumer.clone(), &args.program, &argv)
    }
    .with_context(|| format!("failed to start {}", args.program))?;

    let code = handle.wait().await.context("failed to wait for the program")?;
    let _ = tokio::time::timeout(DRAIN_GRACE, consumer.drained.notified()).await;

    println!("exitCode: {code}");
    Ok(())
}

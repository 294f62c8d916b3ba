//! Plain-pipe launch

use super::{
    spawn_waiter, start_consumers, term, ExitSignal, ExitState, Killer, ProcessHandle,
    StreamConsumer,
};
use crate::result::ExpectError;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Start `program` with three OS pipes as its standard streams.
///
/// The read end of stdout is switched to non-blocking mode, so the output
/// handler sees `WouldBlock` instead of hanging when no data is ready. The
/// consumer's handlers each get one end and run on their own threads.
///
/// # Errors
///
/// Returns [`ExpectError::Spawn`] if the process cannot be started, or
/// [`ExpectError::Io`] if the handler threads cannot be created. No handle
/// is returned on failure.
pub fn launch<C: StreamConsumer>(
    consumer: Arc<C>,
    program: &str,
    args: &[&str],
) -> Result<ProcessHandle, ExpectError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .envs(consumer.environment())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| ExpectError::Spawn(format!("{program}: {e}")))?;
    let pid = child.id();

    let streams = (child.stdin.take(), child.stdout.take(), child.stderr.take());
    let (stdin, stdout, stderr) = match streams {
        (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
        _ => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExpectError::Spawn(format!(
                "{program}: standard streams were not captured"
            )));
        }
    };

    if let Err(e) = term::set_nonblocking(&stdout) {
        debug!(error = %e, "stdout stays blocking");
    }

    let (tx, exit) = ExitSignal::channel();
    let killer = Arc::new(Mutex::new(Killer::Pid(pid)));
    let handle = ProcessHandle {
        pid: Some(pid),
        exit: exit.clone(),
        killer: killer.clone(),
        pty: None,
    };
    debug!(program, pid, "launched with pipes");

    // from here on, dropping `handle` on error kills the child
    spawn_waiter(move || wait_child(child), Some(pid), killer, tx, None)?;
    start_consumers(&consumer, Box::new(stdin), Box::new(stdout), Box::new(stderr), &exit)?;

    Ok(handle)
}

fn wait_child(mut child: Child) -> ExitState {
    match child.wait() {
        Ok(status) => ExitState {
            code: status.code().unwrap_or(-1),
            error: None,
        },
        Err(e) => ExitState {
            code: -1,
            error: Some(e.to_string()),
        },
    }
}

//! Pseudo-terminal launch

use super::{
    spawn_waiter, start_consumers, term, ExitSignal, ExitState, Killer, ProcessHandle, PtyFds,
    StreamConsumer,
};
use crate::result::ExpectError;
use portable_pty::{native_pty_system, Child, CommandBuilder, PtySize};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Default PTY rows
const DEFAULT_PTY_ROWS: u16 = 24;

/// Default PTY columns
const DEFAULT_PTY_COLS: u16 = 80;

pub(crate) const DEFAULT_PTY_SIZE: PtySize = PtySize {
    rows: DEFAULT_PTY_ROWS,
    cols: DEFAULT_PTY_COLS,
    pixel_width: 0,
    pixel_height: 0,
};

/// Start `program` with a fresh pseudo-terminal as its controlling terminal.
///
/// Same as [`launch_pty_sized`] with a 24×80 terminal.
///
/// # Errors
///
/// See [`launch_pty_sized`].
pub fn launch_pty<C: StreamConsumer>(
    consumer: Arc<C>,
    program: &str,
    args: &[&str],
) -> Result<ProcessHandle, ExpectError> {
    launch_pty_sized(consumer, program, args, DEFAULT_PTY_SIZE)
}

/// Start `program` with a fresh pseudo-terminal of the given size as its
/// controlling terminal.
///
/// The terminal is put in raw mode (no line discipline, echo, or signal
/// keys) before the child starts. The child runs in a new session with the
/// slave as its controlling terminal and as all three standard streams. All
/// three consumer handlers receive handles on the master side.
///
/// # Errors
///
/// Returns [`ExpectError::Pty`] if the terminal cannot be allocated or
/// configured, or [`ExpectError::Spawn`] if the process cannot be started.
/// Any descriptors already opened are closed before returning.
pub fn launch_pty_sized<C: StreamConsumer>(
    consumer: Arc<C>,
    program: &str,
    args: &[&str],
    size: PtySize,
) -> Result<ProcessHandle, ExpectError> {
    let pair = native_pty_system()
        .openpty(size)
        .map_err(|e| ExpectError::Pty(e.to_string()))?;
    let fds = PtyFds::new(pair.master, pair.slave);

    if let Err(e) = make_raw(&fds) {
        fds.close();
        return Err(e);
    }

    let mut command = CommandBuilder::new(program);
    command.args(args);
    for (key, value) in consumer.environment() {
        command.env(key, value);
    }

    let spawned = match super::lock(&fds.slave).as_ref() {
        Some(slave) => slave.spawn_command(command),
        None => return Err(ExpectError::Pty("slave side already closed".to_string())),
    };
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            fds.close();
            return Err(ExpectError::Spawn(format!("{program}: {e}")));
        }
    };

    let (stdin, stdout, stderr) = match master_streams(&fds) {
        Ok(streams) => streams,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            fds.close();
            return Err(e);
        }
    };

    let pid = child.process_id();
    let fds = Arc::new(fds);
    let (tx, exit) = ExitSignal::channel();
    let killer = Arc::new(Mutex::new(match pid {
        Some(pid) => Killer::Pid(pid),
        // portable-pty's own killer only sends SIGHUP
        None => Killer::Pty(child.clone_killer()),
    }));
    let handle = ProcessHandle {
        pid,
        exit: exit.clone(),
        killer: killer.clone(),
        pty: Some(fds.clone()),
    };
    debug!(program, pid = ?pid, rows = size.rows, cols = size.cols, "launched in pty");

    spawn_waiter(move || wait_child(child), pid, killer, tx, Some(fds))?;
    start_consumers(&consumer, stdin, stdout, stderr, &exit)?;

    Ok(handle)
}

fn make_raw(fds: &PtyFds) -> Result<(), ExpectError> {
    let master = super::lock(&fds.master);
    let fd = master
        .as_ref()
        .and_then(|m| m.as_raw_fd())
        .ok_or_else(|| ExpectError::Pty("master descriptor unavailable".to_string()))?;
    // termios calls on the master apply to the slave's line discipline
    term::make_raw(fd).map_err(|e| ExpectError::Pty(format!("raw mode: {e}")))
}

type MasterStreams = (Box<dyn Write + Send>, Box<dyn Read + Send>, Box<dyn Read + Send>);

fn master_streams(fds: &PtyFds) -> Result<MasterStreams, ExpectError> {
    let master = super::lock(&fds.master);
    let master = master
        .as_ref()
        .ok_or_else(|| ExpectError::Pty("master side already closed".to_string()))?;
    let pty_err = |e: anyhow::Error| ExpectError::Pty(e.to_string());

    let stdin = master.take_writer().map_err(pty_err)?;
    let stdout = master.try_clone_reader().map_err(pty_err)?;
    let stderr = master.try_clone_reader().map_err(pty_err)?;
    Ok((stdin, stdout, stderr))
}

fn wait_child(mut child: Box<dyn Child + Send + Sync>) -> ExitState {
    match child.wait() {
        Ok(status) if status.signal().is_some() => ExitState {
            code: -1,
            error: None,
        },
        Ok(status) => ExitState {
            code: i32::try_from(status.exit_code()).unwrap_or(-1),
            error: None,
        },
        Err(e) => ExitState {
            code: -1,
            error: Some(e.to_string()),
        },
    }
}

//! Child process launching over pipes or a pseudo-terminal

mod pipe;
mod pty;
mod term;

pub use pipe::launch;
pub use pty::{launch_pty, launch_pty_sized};
pub(crate) use pty::DEFAULT_PTY_SIZE;

use crate::result::ExpectError;
use portable_pty::{ChildKiller, MasterPty, SlavePty};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tokio::sync::watch;
use tracing::debug;

/// The handlers a launched process hands its standard streams to.
///
/// Each `consume_*` method runs on its own thread for the lifetime of the
/// process. In plain-pipe mode the three streams are independent pipes; in
/// pseudo-terminal mode all three are handles on the same master descriptor,
/// so an error handler that reads will steal bytes from the output handler.
///
/// # Examples
///
/// ```no_run
/// use popen_expect::{launch, ExitSignal, StreamConsumer};
/// use std::io::{Read, Write};
/// use std::sync::Arc;
///
/// struct Discard;
///
/// impl StreamConsumer for Discard {
///     fn consume_input(&self, _stdin: Box<dyn Write + Send>) {}
///     fn consume_output(&self, mut stdout: Box<dyn Read + Send>, _exit: ExitSignal) {
///         let _ = std::io::copy(&mut stdout, &mut std::io::sink());
///     }
///     fn consume_error(&self, _stderr: Box<dyn Read + Send>, _exit: ExitSignal) {}
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let handle = launch(Arc::new(Discard), "true", &[])?;
/// let code = handle.wait().await?;
/// # Ok(())
/// # }
/// ```
pub trait StreamConsumer: Send + Sync + 'static {
    /// Feed the child's standard input.
    fn consume_input(&self, stdin: Box<dyn Write + Send>);

    /// Drain the child's standard output.
    fn consume_output(&self, stdout: Box<dyn Read + Send>, exit: ExitSignal);

    /// Drain, route, or ignore the child's standard error.
    fn consume_error(&self, stderr: Box<dyn Read + Send>, exit: ExitSignal);

    /// Variables added on top of the inherited environment.
    fn environment(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitState {
    /// Exit code, or -1 when the process was killed by a signal or could not
    /// be waited on.
    pub code: i32,
    /// Set when waiting on the process failed.
    pub error: Option<String>,
}

impl ExitState {
    fn lost() -> Self {
        Self {
            code: -1,
            error: Some("exit waiter stopped without a status".to_string()),
        }
    }
}

/// Fires exactly once, when the child process has terminated.
///
/// Cheap to clone; every clone observes the same exit.
#[derive(Debug, Clone)]
pub struct ExitSignal {
    rx: watch::Receiver<Option<ExitState>>,
}

impl ExitSignal {
    fn channel() -> (watch::Sender<Option<ExitState>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    /// Whether the process has exited. Never blocks.
    pub fn has_exited(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// The exit state, once the process has exited.
    pub fn state(&self) -> Option<ExitState> {
        self.rx.borrow().clone()
    }

    /// Wait until the process has exited.
    pub async fn exited(&self) -> ExitState {
        let mut rx = self.rx.clone();
        let state = match rx.wait_for(Option::is_some).await {
            Ok(state) => state.clone().unwrap_or_else(ExitState::lost),
            Err(_) => ExitState::lost(),
        };
        state
    }

    #[cfg(test)]
    pub(crate) fn never() -> Self {
        let (_tx, signal) = Self::channel();
        signal
    }
}

/// Terminates the child on `close`.
enum Killer {
    Pid(u32),
    Pty(Box<dyn ChildKiller + Send + Sync>),
    /// The child has been reaped and its pid may already be reused.
    Reaped,
}

impl Killer {
    fn kill(&mut self) -> io::Result<()> {
        match self {
            Killer::Pid(pid) => term::kill(*pid),
            Killer::Pty(killer) => killer.kill(),
            Killer::Reaped => Ok(()),
        }
    }
}

/// The master/slave pair of a pseudo-terminal, closed at most once.
pub(crate) struct PtyFds {
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    slave: Mutex<Option<Box<dyn SlavePty + Send>>>,
}

impl PtyFds {
    fn new(master: Box<dyn MasterPty + Send>, slave: Box<dyn SlavePty + Send>) -> Self {
        Self {
            master: Mutex::new(Some(master)),
            slave: Mutex::new(Some(slave)),
        }
    }

    /// Close both descriptors. Later calls do nothing.
    fn close(&self) {
        let master = lock(&self.master).take();
        let slave = lock(&self.slave).take();
        if master.is_some() || slave.is_some() {
            debug!("closing pseudo-terminal pair");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live child process.
///
/// Dropping the handle closes it, which kills the child if it is still
/// running.
pub struct ProcessHandle {
    pid: Option<u32>,
    exit: ExitSignal,
    killer: Arc<Mutex<Killer>>,
    pty: Option<Arc<PtyFds>>,
}

impl ProcessHandle {
    /// OS process id of the child
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Signal that fires when the child exits.
    pub fn exit_signal(&self) -> &ExitSignal {
        &self.exit
    }

    /// Whether the child has exited.
    pub fn has_exited(&self) -> bool {
        self.exit.has_exited()
    }

    /// Wait for the child to exit and return its exit code.
    ///
    /// # Errors
    ///
    /// Returns [`ExpectError::Wait`] if the OS wait call failed.
    pub async fn wait(&self) -> Result<i32, ExpectError> {
        let state = self.exit.exited().await;
        match state.error {
            Some(error) => Err(ExpectError::Wait(error)),
            None => Ok(state.code),
        }
    }

    /// Kill the child and release its pseudo-terminal, if any.
    ///
    /// Safe to call any number of times, and after the child has already
    /// exited. Failures are logged and otherwise ignored.
    pub fn close(&self) {
        // the waiter reaps under this lock, so a live killer means a live pid
        let mut killer = lock(&self.killer);
        if !matches!(*killer, Killer::Reaped) {
            if let Err(e) = killer.kill() {
                debug!(pid = ?self.pid, error = %e, "kill failed");
            } else {
                debug!(pid = ?self.pid, "process killed");
            }
        }
        drop(killer);
        if let Some(pty) = &self.pty {
            pty.close();
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("exited", &self.exit.has_exited())
            .field("pty", &self.pty.is_some())
            .finish()
    }
}

/// Block on `wait` in a dedicated thread, then publish the exit and close
/// the pseudo-terminal pair.
///
/// With a pid, the thread first waits for the exit without reaping, then
/// runs `wait` while holding `killer` and marks it reaped.
fn spawn_waiter<W>(
    wait: W,
    pid: Option<u32>,
    killer: Arc<Mutex<Killer>>,
    tx: watch::Sender<Option<ExitState>>,
    pty: Option<Arc<PtyFds>>,
) -> io::Result<()>
where
    W: FnOnce() -> ExitState + Send + 'static,
{
    thread::Builder::new()
        .name("popen-waiter".into())
        .spawn(move || {
            let exited = match pid.map(term::wait_exited) {
                Some(Ok(())) => true,
                Some(Err(e)) => {
                    debug!(pid, error = %e, "waiting without reaping failed");
                    false
                }
                None => false,
            };
            let state = if exited {
                let mut killer = lock(&killer);
                let state = wait();
                *killer = Killer::Reaped;
                state
            } else {
                let state = wait();
                *lock(&killer) = Killer::Reaped;
                state
            };
            debug!(code = state.code, error = ?state.error, "process exited");
            tx.send_replace(Some(state));
            if let Some(pty) = pty {
                pty.close();
            }
        })
        .map(drop)
}

/// Run the consumer's three handlers, one thread each.
fn start_consumers<C: StreamConsumer>(
    consumer: &Arc<C>,
    stdin: Box<dyn Write + Send>,
    stdout: Box<dyn Read + Send>,
    stderr: Box<dyn Read + Send>,
    exit: &ExitSignal,
) -> io::Result<()> {
    let c = consumer.clone();
    thread::Builder::new()
        .name("popen-stdin".into())
        .spawn(move || c.consume_input(stdin))?;

    let (c, e) = (consumer.clone(), exit.clone());
    thread::Builder::new()
        .name("popen-stdout".into())
        .spawn(move || c.consume_output(stdout, e))?;

    let (c, e) = (consumer.clone(), exit.clone());
    thread::Builder::new()
        .name("popen-stderr".into())
        .spawn(move || c.consume_error(stderr, e))?;

    Ok(())
}

//! Descriptor-level terminal and process control

use rustix::fs::{fcntl_getfl, fcntl_setfl, OFlags};
use rustix::io::Errno;
use rustix::process::{kill_process, waitid, Pid, Signal, WaitId, WaitIdOptions};
use rustix::termios::{tcgetattr, tcsetattr, OptionalActions};
use std::io;
use std::os::fd::{AsFd, BorrowedFd, RawFd};

/// Put the terminal behind `fd` into raw mode.
pub(crate) fn make_raw(fd: RawFd) -> io::Result<()> {
    // SAFETY: the caller holds the descriptor open for the duration of the call
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut termios = tcgetattr(fd)?;
    termios.make_raw();
    tcsetattr(fd, OptionalActions::Now, &termios)?;
    Ok(())
}

/// Set `O_NONBLOCK` on `fd`, keeping its other status flags.
pub(crate) fn set_nonblocking<Fd: AsFd>(fd: Fd) -> io::Result<()> {
    let flags = fcntl_getfl(&fd)?;
    fcntl_setfl(&fd, flags | OFlags::NONBLOCK)?;
    Ok(())
}

fn to_pid(pid: u32) -> io::Result<Pid> {
    i32::try_from(pid)
        .ok()
        .and_then(Pid::from_raw)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))
}

/// Send SIGKILL to `pid`.
pub(crate) fn kill(pid: u32) -> io::Result<()> {
    kill_process(to_pid(pid)?, Signal::KILL)?;
    Ok(())
}

/// Block until the child `pid` has exited, leaving it unreaped.
pub(crate) fn wait_exited(pid: u32) -> io::Result<()> {
    let pid = to_pid(pid)?;
    loop {
        match waitid(WaitId::Pid(pid), WaitIdOptions::EXITED | WaitIdOptions::NOWAIT) {
            Ok(_) => return Ok(()),
            Err(Errno::INTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

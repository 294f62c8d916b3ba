//! Threads moving bytes between a session and its child process

use crate::buffer::strip_colors;
use crate::process::{ExitSignal, StreamConsumer};
use bytes::Bytes;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// How the child's streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transport {
    /// Three independent pipes
    Pipe,
    /// One pseudo-terminal master shared by all three streams
    Pty,
}

/// The session's [`StreamConsumer`].
///
/// Holds the far ends of the session's queues. Each end is taken by the
/// handler that owns it, so each handler can run only once.
pub(crate) struct Pump {
    outbound: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    inbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    strip_colors: Arc<AtomicBool>,
    env: HashMap<String, String>,
    transport: Transport,
    chunk_size: usize,
    retry_interval: Duration,
}

impl Pump {
    pub(crate) fn new(
        outbound: mpsc::Receiver<Vec<u8>>,
        inbound: mpsc::Sender<Bytes>,
        strip_colors: Arc<AtomicBool>,
        env: HashMap<String, String>,
        transport: Transport,
        chunk_size: usize,
        retry_interval: Duration,
    ) -> Self {
        Self {
            outbound: Mutex::new(Some(outbound)),
            inbound: Mutex::new(Some(inbound)),
            strip_colors,
            env,
            transport,
            chunk_size: chunk_size.max(1),
            retry_interval,
        }
    }
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl StreamConsumer for Pump {
    fn consume_input(&self, mut stdin: Box<dyn Write + Send>) {
        let Some(mut outbound) = take(&self.outbound) else {
            return;
        };
        while let Some(data) = outbound.blocking_recv() {
            if let Err(e) = stdin.write_all(&data).and_then(|()| stdin.flush()) {
                debug!(error = %e, "input stream closed");
                break;
            }
            trace!(len = data.len(), "sent to process");
        }
    }

    fn consume_output(&self, mut stdout: Box<dyn Read + Send>, exit: ExitSignal) {
        // dropping the sender when this returns closes the inbound channel
        let Some(inbound) = take(&self.inbound) else {
            return;
        };
        let mut buf = vec![0u8; self.chunk_size];

        while !exit.has_exited() {
            let n = match stdout.read(&mut buf) {
                Ok(0) => {
                    thread::sleep(self.retry_interval);
                    continue;
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(self.retry_interval);
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "output stream ended");
                    break;
                }
            };

            let chunk = if self.strip_colors.load(Ordering::Relaxed) {
                strip_colors(&buf[..n])
            } else {
                Bytes::copy_from_slice(&buf[..n])
            };
            if chunk.is_empty() {
                continue;
            }

            trace!(len = chunk.len(), "chunk read");
            // blocks while the channel is full
            if inbound.blocking_send(chunk).is_err() {
                debug!("session dropped, output pump stopping");
                break;
            }
        }
    }

    fn consume_error(&self, mut stderr: Box<dyn Read + Send>, _exit: ExitSignal) {
        // the master is already drained by consume_output
        if self.transport == Transport::Pty {
            return;
        }
        match io::copy(&mut stderr, &mut io::sink()) {
            Ok(n) => trace!(discarded = n, "error stream closed"),
            Err(e) => warn!(error = %e, "error stream failed"),
        }
    }

    fn environment(&self) -> HashMap<String, String> {
        self.env.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;

    fn pump(
        transport: Transport,
        strip: bool,
    ) -> (Pump, mpsc::Sender<Vec<u8>>, mpsc::Receiver<Bytes>) {
        let (out_tx, out_rx) = mpsc::channel(4);
        let (in_tx, in_rx) = mpsc::channel(5);
        let pump = Pump::new(
            out_rx,
            in_tx,
            Arc::new(AtomicBool::new(strip)),
            HashMap::from([("KEY".to_string(), "value".to_string())]),
            transport,
            4,
            Duration::from_millis(1),
        );
        (pump, out_tx, in_rx)
    }

    /// Yields its chunks, then fails like a closed PTY master.
    struct Script(Vec<io::Result<Vec<u8>>>);

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                return Err(io::Error::other("EIO"));
            }
            let data = self.0.remove(0)?;
            buf[..data.len()].copy_from_slice(&data);
            Ok(data.len())
        }
    }

    fn exit_signal() -> ExitSignal {
        ExitSignal::never()
    }

    #[test]
    fn test_output_retries_would_block_and_zero_reads() {
        let (pump, _out, mut inbound) = pump(Transport::Pipe, false);
        let script = Script(vec![
            Err(io::ErrorKind::WouldBlock.into()),
            Ok(b"ab".to_vec()),
            Ok(Vec::new()),
            Err(io::ErrorKind::Interrupted.into()),
            Ok(b"cd".to_vec()),
        ]);

        pump.consume_output(Box::new(script), exit_signal());

        assert_eq!(&inbound.blocking_recv().unwrap()[..], b"ab");
        assert_eq!(&inbound.blocking_recv().unwrap()[..], b"cd");
        // the read error closed the channel
        assert!(inbound.blocking_recv().is_none());
    }

    #[test]
    fn test_output_strips_colors() {
        let (pump, _out, mut inbound) = pump(Transport::Pipe, true);
        let script = Script(vec![Ok(b"\x1b[1m".to_vec()), Ok(b"ok".to_vec())]);

        pump.consume_output(Box::new(script), exit_signal());

        // the all-escape chunk is dropped entirely
        assert_eq!(&inbound.blocking_recv().unwrap()[..], b"ok");
        assert!(inbound.blocking_recv().is_none());
    }

    /// Counts reads, yielding `total` one-byte chunks before failing.
    struct Counted {
        reads: Arc<AtomicUsize>,
        total: usize,
    }

    impl Read for Counted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n >= self.total {
                return Err(io::Error::other("EIO"));
            }
            buf[0] = b'a' + n as u8;
            Ok(1)
        }
    }

    #[test]
    fn test_output_blocks_when_inbound_is_full() {
        let (pump, _out, mut inbound) = pump(Transport::Pipe, false);
        let reads = Arc::new(AtomicUsize::new(0));
        let reader = Counted {
            reads: reads.clone(),
            total: 8,
        };

        let worker = thread::spawn(move || pump.consume_output(Box::new(reader), exit_signal()));
        thread::sleep(Duration::from_millis(200));

        // five queued chunks plus one held in the blocked send
        assert_eq!(reads.load(Ordering::SeqCst), 6);

        let mut received = Vec::new();
        while let Some(chunk) = inbound.blocking_recv() {
            received.extend_from_slice(&chunk);
        }
        worker.join().unwrap();
        assert_eq!(received, b"abcdefgh");
    }

    #[test]
    fn test_output_runs_once() {
        let (pump, _out, _inbound) = pump(Transport::Pipe, false);
        pump.consume_output(Box::new(Script(vec![])), exit_signal());
        assert!(take(&pump.inbound).is_none());
    }

    #[test]
    fn test_input_writes_until_queue_closes() {
        let (pump, out, _inbound) = pump(Transport::Pipe, false);
        out.blocking_send(b"ping\n".to_vec()).unwrap();
        out.blocking_send(b"pong\n".to_vec()).unwrap();
        drop(out);

        let written = Arc::new(Mutex::new(Vec::new()));
        pump.consume_input(Box::new(SharedWriter(written.clone())));

        assert_eq!(&written.lock().unwrap()[..], b"ping\npong\n");
    }

    #[test]
    fn test_error_stream_ignored_in_pty_mode() {
        let (pump, _out, _inbound) = pump(Transport::Pty, false);
        let stderr = Cursor::new(b"unread".to_vec());
        // returns immediately without reading
        pump.consume_error(Box::new(stderr), exit_signal());
    }

    #[test]
    fn test_environment() {
        let (pump, _out, _inbound) = pump(Transport::Pipe, false);
        assert_eq!(pump.environment().get("KEY").map(String::as_str), Some("value"));
    }

    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

//! Byte-stream transports the record layer reads from and writes to.

use bytes::{Buf, BytesMut};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// How a read treats the bytes it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Remove the bytes from the stream
    Consume,
    /// Leave the bytes in place for a later consuming read
    Peek,
}

/// A reliable, ordered byte stream.
pub trait Transport {
    /// Fills as much of `buf` as the stream can provide. A count below
    /// `buf.len()` means the stream ended.
    fn read(&mut self, buf: &mut [u8], mode: ReadMode) -> io::Result<usize>;

    /// Writes `buf`, returning how many bytes the stream accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Waits up to `timeout` for data. `Ok(false)` means the wait expired.
    fn wait_readable(&mut self, _timeout: Duration) -> io::Result<bool> {
        Ok(true)
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "memory transport lock poisoned")
}

#[derive(Debug, Default)]
struct PipeState {
    queue: VecDeque<u8>,
    // No more bytes will be written
    closed: bool,
}

#[derive(Debug, Default)]
struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
}

impl Pipe {
    fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        self.readable.notify_all();
    }
}

// Writing side of a pipe, shared by every clone of one end. The pipe reads
// as ended once the last clone is dropped.
#[derive(Debug)]
struct PipeWriter(Arc<Pipe>);

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// One end of an in-process duplex byte stream.
///
/// Reads block until the requested number of bytes is queued or the other
/// end has shut down, so the two ends can be driven from different threads.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    incoming: Arc<Pipe>,
    outgoing: Arc<PipeWriter>,
    write_limit: Option<usize>,
}

impl MemoryTransport {
    /// Two connected ends: what one writes the other reads.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());

        let a = Self {
            incoming: Arc::clone(&b_to_a),
            outgoing: Arc::new(PipeWriter(Arc::clone(&a_to_b))),
            write_limit: None,
        };
        let b = Self {
            incoming: a_to_b,
            outgoing: Arc::new(PipeWriter(b_to_a)),
            write_limit: None,
        };
        (a, b)
    }

    /// Accept only `limit` more bytes; later writes come up short.
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Bytes waiting to be read on this end.
    pub fn pending(&self) -> usize {
        self.incoming.state.lock().map(|state| state.queue.len()).unwrap_or(0)
    }

    /// Queues raw bytes for this end to read, as if the peer had written them.
    pub fn inject(&self, data: &[u8]) -> io::Result<()> {
        let mut state = self.incoming.state.lock().map_err(|_| poisoned())?;
        state.queue.extend(data.iter().copied());
        self.incoming.readable.notify_all();
        Ok(())
    }

    /// Stops writing. Once the other end has drained what is queued its reads
    /// come up short, as on a closed socket.
    pub fn shutdown(&self) {
        self.outgoing.0.close();
    }
}

impl Transport for MemoryTransport {
    fn read(&mut self, buf: &mut [u8], mode: ReadMode) -> io::Result<usize> {
        let wanted = buf.len();
        let state = self.incoming.state.lock().map_err(|_| poisoned())?;
        let mut state = self
            .incoming
            .readable
            .wait_while(state, |state| state.queue.len() < wanted && !state.closed)
            .map_err(|_| poisoned())?;

        let n = wanted.min(state.queue.len());
        match mode {
            ReadMode::Consume => {
                for (dst, src) in buf.iter_mut().zip(state.queue.drain(..n)) {
                    *dst = src;
                }
            }
            ReadMode::Peek => {
                for (dst, src) in buf.iter_mut().zip(state.queue.iter()) {
                    *dst = *src;
                }
            }
        }

        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let pipe = &self.outgoing.0;
        let mut state = pipe.state.lock().map_err(|_| poisoned())?;
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "memory transport shut down"));
        }

        let n = match self.write_limit.as_mut() {
            Some(limit) => {
                let n = buf.len().min(*limit);
                *limit -= n;
                n
            }
            None => buf.len(),
        };

        state.queue.extend(buf[..n].iter().copied());
        pipe.readable.notify_all();
        Ok(n)
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let state = self.incoming.state.lock().map_err(|_| poisoned())?;
        let (state, _) = self
            .incoming
            .readable
            .wait_timeout_while(state, timeout, |state| state.queue.is_empty() && !state.closed)
            .map_err(|_| poisoned())?;
        Ok(!state.queue.is_empty() || state.closed)
    }
}

/// A TCP stream. Peeked bytes are staged locally until consumed.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    staging: BytesMut,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            staging: BytesMut::with_capacity(4096),
        }
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    pub fn into_inner(self) -> TcpStream {
        self.stream
    }

    // Pulls from the socket until `wanted` bytes are staged or the peer hangs up
    fn fill_staging(&mut self, wanted: usize) -> io::Result<()> {
        let mut chunk = [0u8; 4096];
        while self.staging.len() < wanted {
            let n = match self.stream.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                break;
            }
            self.staging.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8], mode: ReadMode) -> io::Result<usize> {
        self.fill_staging(buf.len())?;

        let n = buf.len().min(self.staging.len());
        buf[..n].copy_from_slice(&self.staging[..n]);
        if mode == ReadMode::Consume {
            self.staging.advance(n);
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write_all(buf)?;
        self.stream.flush()?;
        Ok(buf.len())
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        if !self.staging.is_empty() {
            return Ok(true);
        }

        // A zero read timeout means "block forever" to std
        self.stream
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        let mut chunk = [0u8; 4096];
        let result = match self.stream.read(&mut chunk) {
            Ok(n) => {
                self.staging.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(false),
            Err(e) => Err(e),
        };

        self.stream.set_read_timeout(None)?;
        result
    }
}

//! The duplex byte transport the handshake runs over.
//!
//! [`Transport`] is the only seam between protocol logic and the outside
//! world.  Two adapters ship with the crate:
//! - [`crate::socket::TcpTransport`] for a connected network socket.
//! - [`crate::serial::SerialTransport`] for a serial line.
//!
//! [`crate::simulator::Simulator`] implements it in memory for tests.
//!
//! Running out of time is **not** an error at this layer: both I/O methods
//! report how many bytes they moved and the caller compares that against
//! what it asked for.  `Err` is reserved for hard failures (reset
//! connection, unplugged device).

use std::io;
use std::thread;
use std::time::{Duration, Instant};

/// A blocking, exclusively owned duplex byte stream.
pub trait Transport {
    /// Send all of `buf`, retrying partial writes until done or `timeout`
    /// elapses.  Returns the number of bytes actually sent.
    fn write_all(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize>;

    /// Fill all of `buf`, retrying partial reads until done or `timeout`
    /// elapses.  Returns the number of bytes actually read; fewer than
    /// `buf.len()` is a short read.
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Release the underlying resource.  Further I/O is undefined.
    fn close(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_all(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        (**self).write_all(buf, timeout)
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).read_exact(buf, timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        (**self).write_all(buf, timeout)
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).read_exact(buf, timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// What a zero-length read or write means for a given stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnZero {
    /// The stream is finished (closed socket); stop early.
    Stop,
    /// Nothing was ready yet (tty read timeout); try again after a pause.
    Retry,
}

/// Pause between polls of a stream that returned nothing.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Drive `step` until `len` bytes are moved or `timeout` elapses.
///
/// `step(done, remaining)` performs one read or write starting at offset
/// `done` and must not block longer than `remaining`.  Timeouts and
/// interruptions from `step` are swallowed so the deadline alone decides when
/// to give up; any other error is returned.
pub(crate) fn pump<F>(
    len: usize,
    timeout: Duration,
    on_zero: OnZero,
    mut step: F,
) -> io::Result<usize>
where
    F: FnMut(usize, Duration) -> io::Result<usize>,
{
    let deadline = Instant::now() + timeout;
    let mut done = 0;

    while done < len {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match step(done, remaining) {
            Ok(0) => match on_zero {
                OnZero::Stop => break,
                OnZero::Retry => thread::sleep(IDLE_BACKOFF.min(remaining)),
            },
            Ok(n) => done += n,
            Err(e) if is_timeout(&e) => {
                if on_zero == OnZero::Retry {
                    thread::sleep(IDLE_BACKOFF.min(remaining));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(done)
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

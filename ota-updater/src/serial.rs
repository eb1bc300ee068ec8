//! Serial-line adapter for [`Transport`].
//!
//! [`SerialTransport::open`] configures the port itself: the requested baud
//! rate, 8 data bits, no parity, 1 stop bit, no flow control.  Every read and
//! write first re-arms the port timeout with whatever is left of the
//! caller's budget, so a silent device can never block a call past its
//! deadline.
//!
//! The adapter is generic over any [`Line`] so the same code drives a real
//! port or an in-memory stand-in.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::transport::{pump, OnZero, Transport};

/// Baud rate used when none is given.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// A byte line whose blocking time per call can be bounded.
pub trait Line: Read + Write {
    /// Bound how long the next `read` or `write` may block.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl Line for Box<dyn SerialPort> {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        SerialPort::set_timeout(&mut **self, timeout).map_err(io::Error::from)
    }
}

/// An open serial line.
#[derive(Debug)]
pub struct SerialTransport<D = Box<dyn SerialPort>> {
    /// Device path, kept for diagnostics.
    pub path: PathBuf,
    device: Option<D>,
}

impl SerialTransport<Box<dyn SerialPort>> {
    /// Open and configure the port at `path`.
    pub fn open(path: impl AsRef<Path>, baud_rate: u32, timeout: Duration) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let port = serialport::new(path.to_string_lossy(), baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()?;
        log::debug!(
            "opened serial device {} at {baud_rate} baud, 8N1, no flow control",
            path.display()
        );
        Ok(Self::new(path, port))
    }
}

impl<D: Line> SerialTransport<D> {
    pub fn new(path: impl Into<PathBuf>, device: D) -> Self {
        Self {
            path: path.into(),
            device: Some(device),
        }
    }

    fn device(&mut self) -> io::Result<&mut D> {
        self.device
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial line closed"))
    }
}

impl<D: Line> Transport for SerialTransport<D> {
    fn write_all(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        let device = self.device()?;
        let sent = pump(buf.len(), timeout, OnZero::Retry, |done, remaining| {
            device.set_timeout(remaining)?;
            device.write(&buf[done..])
        })?;
        if sent == buf.len() {
            device.flush()?;
        }
        Ok(sent)
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let device = self.device()?;
        pump(buf.len(), timeout, OnZero::Retry, |done, remaining| {
            device.set_timeout(remaining)?;
            device.read(&mut buf[done..])
        })
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut device) = self.device.take() {
            device.flush()?;
            log::debug!("closed serial device {}", self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::thread;
    use std::time::Instant;

    use super::*;

    /// Loopback line that hands out at most `chunk` bytes per call.  Once
    /// `rx` runs dry a read blocks for the armed timeout, like a real port.
    #[derive(Default)]
    struct Trickle {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
        chunk: usize,
        armed: Vec<Duration>,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.rx.is_empty() {
                thread::sleep(self.armed.last().copied().unwrap_or_default());
                return Err(io::ErrorKind::TimedOut.into());
            }
            let n = buf.len().min(self.chunk).min(self.rx.len());
            for slot in &mut buf[..n] {
                *slot = self.rx.pop_front().unwrap_or_default();
            }
            Ok(n)
        }
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.tx.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Line for Trickle {
        fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            self.armed.push(timeout);
            Ok(())
        }
    }

    fn line(rx: &[u8], chunk: usize) -> SerialTransport<Trickle> {
        SerialTransport::new(
            "/dev/null",
            Trickle {
                rx: rx.iter().copied().collect(),
                chunk,
                ..Trickle::default()
            },
        )
    }

    #[test]
    fn partial_writes_are_completed() {
        let mut serial = line(&[], 3);
        let frame = [1u8; 12];
        assert_eq!(serial.write_all(&frame, Duration::from_secs(1)).unwrap(), 12);
        assert_eq!(serial.device().unwrap().tx, frame);
    }

    #[test]
    fn partial_reads_are_completed() {
        let mut serial = line(&[9; 12], 5);
        let mut buf = [0u8; 12];
        assert_eq!(serial.read_exact(&mut buf, Duration::from_secs(1)).unwrap(), 12);
        assert_eq!(buf, [9; 12]);
    }

    #[test]
    fn idle_line_times_out_with_short_count() {
        let mut serial = line(&[1, 2, 3], 8);
        let mut buf = [0u8; 12];
        let got = serial.read_exact(&mut buf, Duration::from_millis(20)).unwrap();
        assert_eq!(got, 3);
    }

    #[test]
    fn silent_device_returns_by_the_deadline() {
        let timeout = Duration::from_millis(200);
        let mut serial = line(&[], 1);
        let mut buf = [0u8; 12];

        let started = Instant::now();
        let got = serial.read_exact(&mut buf, timeout).unwrap();
        let waited = started.elapsed();

        assert_eq!(got, 0);
        assert!(waited >= timeout, "gave up after {waited:?}");
        assert!(waited < Duration::from_secs(2), "blocked for {waited:?}");

        // Every blocking call was bounded by what was left of the budget.
        let armed = &serial.device().unwrap().armed;
        assert!(!armed.is_empty());
        assert!(armed.iter().all(|t| *t <= timeout && !t.is_zero()));
        assert!(armed.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn open_rejects_a_node_that_is_not_a_tty() {
        let name = format!("ota-updater-not-a-tty-{}", std::process::id());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, b"").unwrap();

        let started = Instant::now();
        let opened = SerialTransport::open(&path, DEFAULT_BAUD_RATE, Duration::from_millis(100));
        assert!(opened.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn io_after_close_fails() {
        let mut serial = line(&[], 1);
        serial.close().unwrap();
        serial.close().unwrap();
        let err = serial.write_all(&[0], Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}

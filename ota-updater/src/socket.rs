//! TCP adapter for [`Transport`].
//!
//! [`TcpTransport`] wraps a connected `std::net::TcpStream`.  Each read and
//! write call re-arms the socket timeout with whatever is left of the
//! caller's budget, so one `write_all` or `read_exact` never outlives it.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::transport::{pump, OnZero, Transport};

/// A connected, blocking TCP stream speaking the OTA protocol.
#[derive(Debug)]
pub struct TcpTransport {
    /// Address of the device we are talking to.
    pub peer_addr: SocketAddr,
    inner: TcpStream,
}

impl TcpTransport {
    /// Connect to the first address `addr` resolves to.
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> io::Result<Self> {
        let addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
        })?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        Self::from_stream(stream)
    }

    /// Adopt an already connected stream.
    pub fn from_stream(inner: TcpStream) -> io::Result<Self> {
        // Frames are tiny and strictly alternate with replies.
        inner.set_nodelay(true)?;
        let peer_addr = inner.peer_addr()?;
        Ok(Self { peer_addr, inner })
    }
}

impl Transport for TcpTransport {
    fn write_all(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        let stream = &mut self.inner;
        let sent = pump(buf.len(), timeout, OnZero::Stop, |done, remaining| {
            stream.set_write_timeout(Some(remaining))?;
            stream.write(&buf[done..])
        })?;
        if sent == buf.len() {
            stream.flush()?;
        }
        Ok(sent)
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let stream = &mut self.inner;
        pump(buf.len(), timeout, OnZero::Stop, |done, remaining| {
            stream.set_read_timeout(Some(remaining))?;
            stream.read(&mut buf[done..])
        })
    }

    fn close(&mut self) -> io::Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            // The peer may already have hung up.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn pair() -> (TcpTransport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = thread::spawn(move || listener.accept().unwrap().0);
        let client = TcpTransport::connect(addr, Duration::from_secs(5)).unwrap();
        (client, accept.join().unwrap())
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (mut client, mut server) = pair();
        assert_eq!(client.write_all(b"hello", Duration::from_secs(1)).unwrap(), 5);

        let mut got = [0u8; 5];
        server.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"hello");

        server.write_all(b"ok").unwrap();
        let mut reply = [0u8; 2];
        assert_eq!(client.read_exact(&mut reply, Duration::from_secs(1)).unwrap(), 2);
        assert_eq!(&reply, b"ok");
    }

    #[test]
    fn silent_peer_is_a_short_read() {
        let (mut client, server) = pair();
        server.set_nodelay(true).unwrap();
        (&server).write_all(&[0x02, 0x03]).unwrap();

        let mut reply = [0u8; 12];
        let got = client.read_exact(&mut reply, Duration::from_millis(100)).unwrap();
        assert_eq!(got, 2);
        drop(server);
    }

    #[test]
    fn closed_peer_stops_read_early() {
        let (mut client, server) = pair();
        drop(server);
        let mut reply = [0u8; 12];
        let got = client.read_exact(&mut reply, Duration::from_secs(5)).unwrap();
        assert_eq!(got, 0);
    }

    #[test]
    fn close_twice_is_ok() {
        let (mut client, _server) = pair();
        client.close().unwrap();
        client.close().unwrap();
    }
}

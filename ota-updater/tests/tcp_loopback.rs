//! Transfers over a real TCP connection on loopback.
//!
//! A device emulator thread accepts one connection and answers every frame
//! through the reference [`Receiver`], so these tests exercise the socket
//! adapter, the handshake timing and the transfer sequence together.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ota_updater::{
    error::{HandshakeError, Phase, Step},
    receiver::Receiver,
    send_firmware,
    socket::TcpTransport,
    TransferConfig, Transport,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bind on an OS-chosen loopback port and serve one connection with `serve`.
fn spawn_device<F, R>(serve: F) -> (SocketAddr, JoinHandle<R>)
where
    F: FnOnce(TcpStream) -> R + Send + 'static,
    R: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind device listener");
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept host connection");
        serve(stream)
    });
    (addr, handle)
}

/// Answer frames until the host hangs up.  Returns the reassembled image
/// and whether the device accepted the End command.
fn emulate_device(mut stream: TcpStream) -> (Vec<u8>, bool) {
    let mut receiver = Receiver::new();
    let mut buf = [0u8; 512];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for response in receiver.feed(&buf[..n]) {
            if stream.write_all(&response).is_err() {
                break;
            }
        }
    }
    (receiver.image().to_vec(), receiver.is_complete())
}

fn config(timeout: Duration) -> TransferConfig {
    TransferConfig {
        timeout,
        ..TransferConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn full_transfer_over_tcp() {
    let fw: Vec<u8> = (0..5_000u32).map(|i| (i * 31) as u8).collect();
    let (addr, device) = spawn_device(emulate_device);

    let mut transport = TcpTransport::connect(addr, Duration::from_secs(5)).unwrap();
    let report = send_firmware(&mut transport, &fw, &config(Duration::from_secs(5))).unwrap();
    transport.close().unwrap();

    assert_eq!(report.data_packets, 20);
    let (image, complete) = device.join().expect("device thread panicked");
    assert!(complete);
    assert_eq!(image, fw);
}

/// A device that swallows frames without answering produces a read failure
/// once the timeout runs out, not a hang and not an Ack.
#[test]
fn silent_device_is_a_read_timeout() {
    let (addr, device) = spawn_device(|mut stream| {
        let mut sink = Vec::new();
        // Reads until the host closes its side.
        let _ = stream.read_to_end(&mut sink);
        sink.len()
    });

    let timeout = Duration::from_millis(200);
    let mut transport = TcpTransport::connect(addr, Duration::from_secs(5)).unwrap();
    let started = Instant::now();
    let err = send_firmware(&mut transport, &[1, 2, 3], &config(timeout)).unwrap_err();
    let waited = started.elapsed();
    transport.close().unwrap();

    assert_eq!(err.step(), Some(Step::Start));
    match err.handshake() {
        Some(HandshakeError::Transport(e)) => {
            assert_eq!(e.phase, Phase::Read);
            assert_eq!(e.transferred, 0);
        }
        other => panic!("expected a read timeout, got {other:?}"),
    }
    assert!(waited >= timeout, "gave up after {waited:?}");
    assert!(waited < Duration::from_secs(5), "hung for {waited:?}");

    // Only the Start frame was ever written.
    assert_eq!(device.join().unwrap(), 12);
}

/// A device that hangs up mid-transfer ends it on the step it dropped.
#[test]
fn device_hangup_aborts_transfer() {
    let (addr, device) = spawn_device(|mut stream| {
        let mut receiver = Receiver::new();
        let mut buf = [0u8; 12];
        // Answer the Start command, then disappear.
        stream.read_exact(&mut buf).unwrap();
        let response = receiver.feed(&buf);
        stream.write_all(&response[0]).unwrap();
    });

    let mut transport = TcpTransport::connect(addr, Duration::from_secs(5)).unwrap();
    let err = send_firmware(&mut transport, &[0u8; 300], &config(Duration::from_secs(2)))
        .unwrap_err();
    device.join().unwrap();

    assert_eq!(err.step(), Some(Step::Header));
    let _ = transport.close();
}

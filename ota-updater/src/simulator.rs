//! In-memory device simulator for deterministic testing.
//!
//! Real links stall, drop replies, and talk to devices that say no.  To
//! exercise the abort paths without hardware, [`Simulator`] implements
//! [`Transport`] entirely in memory: frames written to it are delimited,
//! recorded, and handed to a [`Receiver`] whose Ack/Nack becomes the reply.
//! A configurable fault model can override what happens to any frame:
//!
//! | Fault             | Effect on the frame at that index                   |
//! |-------------------|-----------------------------------------------------|
//! | `ShortWrite(n)`   | Only `n` bytes of the frame are ever accepted.      |
//! | `ShortRead(n)`    | Only `n` bytes of the reply are delivered.          |
//! | `Nack`            | Reply Nack without consulting the receiver.         |
//! | `Status(b)`       | Reply with raw status byte `b`.                     |
//! | `Silent`          | The receiver sees the frame, but no reply is sent.  |
//!
//! On top of that, `drop_rate` silently loses replies at random using a
//! seeded RNG, so failures are reproducible.
//!
//! The simulator never sleeps: a read that cannot be satisfied returns
//! immediately as if the timeout had already elapsed.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::{encode_response, Packet, Status};
use crate::receiver::{next_frame, Delimited, Receiver};
use crate::transport::Transport;

/// Offset of the status byte inside a Response frame.
const STATUS_OFFSET: usize = 6;

/// What to do to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    ShortWrite(usize),
    ShortRead(usize),
    Nack,
    Status(u8),
    Silent,
}

/// Configuration for the fault-injection model.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Faults keyed by 0-based frame index (Start is frame 0).
    pub faults: BTreeMap<usize, Fault>,
    /// Probability in `[0.0, 1.0]` that a reply is lost.
    pub drop_rate: f64,
    /// Seed for the reply-loss RNG.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the simulator is a well-behaved device.
        Self {
            faults: BTreeMap::new(),
            drop_rate: 0.0,
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    /// Inject `fault` at frame `index`.
    pub fn with_fault(mut self, index: usize, fault: Fault) -> Self {
        self.faults.insert(index, fault);
        self
    }
}

/// A fault-injecting, in-memory device.
#[derive(Debug)]
pub struct Simulator {
    pub config: SimulatorConfig,
    receiver: Receiver,
    rng: StdRng,
    /// Complete frames received, in order.
    frames: Vec<Vec<u8>>,
    /// Bytes of the frame currently being written.
    partial: Vec<u8>,
    /// Reply bytes waiting to be read.
    outbox: VecDeque<u8>,
    reads: usize,
    closed: bool,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            receiver: Receiver::new(),
            rng,
            frames: Vec::new(),
            partial: Vec::new(),
            outbox: VecDeque::new(),
            reads: 0,
            closed: false,
        }
    }

    /// Every complete frame written so far.
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Every complete frame written so far, decoded.
    pub fn packets(&self) -> Vec<Packet> {
        self.frames
            .iter()
            .filter_map(|f| Packet::decode(f).ok())
            .collect()
    }

    /// The device-side session state.
    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Number of `read_exact` calls made.
    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn current_fault(&self) -> Option<Fault> {
        self.config.faults.get(&self.frames.len()).copied()
    }

    /// Bytes of `buf` the link will take right now.
    fn accept_len(&self, buf: &[u8]) -> usize {
        match self.current_fault() {
            Some(Fault::ShortWrite(cap)) => buf.len().min(cap.saturating_sub(self.partial.len())),
            _ => buf.len(),
        }
    }

    /// Move every complete frame out of `partial` and queue its reply.
    fn drain_frames(&mut self) {
        while let Some(next) = next_frame(&mut self.partial) {
            match next {
                Delimited::Frame(frame) => {
                    let fault = self.current_fault();
                    self.frames.push(frame);
                    self.reply(fault);
                }
                Delimited::Oversized(_) => self.outbox.extend(encode_response(Status::Nack)),
            }
        }
    }

    fn reply(&mut self, fault: Option<Fault>) {
        let frame = self.frames.last().map(Vec::as_slice).unwrap_or_default();
        let mut response = match fault {
            Some(Fault::Nack) => encode_response(Status::Nack),
            Some(Fault::Status(status)) => {
                let mut response = encode_response(Status::Ack);
                response[STATUS_OFFSET] = status;
                response
            }
            _ => encode_response(self.receiver.on_frame(frame)),
        }
        .to_vec();

        let dropped = self.config.drop_rate > 0.0
            && self.rng.random_bool(self.config.drop_rate.clamp(0.0, 1.0));
        match fault {
            Some(Fault::Silent) => response.clear(),
            Some(Fault::ShortRead(n)) => response.truncate(n),
            _ if dropped => {
                log::debug!("simulator dropped reply to frame {}", self.frames.len() - 1);
                response.clear();
            }
            _ => {}
        }
        self.outbox.extend(response);
    }
}

impl Transport for Simulator {
    fn write_all(&mut self, buf: &[u8], _timeout: Duration) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "simulator closed"));
        }
        let n = self.accept_len(buf);
        self.partial.extend_from_slice(&buf[..n]);
        self.drain_frames();
        Ok(n)
    }

    fn read_exact(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "simulator closed"));
        }
        self.reads += 1;
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

//! Scripted transport for driving a session without hardware.
//!
//! Reads are served from a queue of frames in the order they were scripted;
//! every write is recorded. The ready signal (status byte or interrupt line)
//! reports ready unless a stall or busy polls were scripted.

#![allow(dead_code)]

use std::collections::VecDeque;

use pn532_engine::ack::{ACK_FRAME, NACK_FRAME};
use pn532_engine::transport::STATUS_READY;
use pn532_engine::{Command, Frame, Tfi, Transport, TransportError, TransportKind};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug)]
pub struct MockTransport {
    kind: TransportKind,
    irq: bool,
    reads: VecDeque<Vec<u8>>,
    /// Busy polls owed before each queued read becomes ready.
    delays: VecDeque<u32>,
    written: Vec<Vec<u8>>,
    busy_polls: u32,
    /// Ready polls answered before the chip stops responding for good.
    ready_polls_left: Option<usize>,
    polls: usize,
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            irq: false,
            reads: VecDeque::new(),
            delays: VecDeque::new(),
            written: Vec::new(),
            busy_polls: 0,
            ready_polls_left: None,
            polls: 0,
        }
    }

    pub fn i2c() -> Self {
        Self::new(TransportKind::I2c)
    }

    pub fn spi() -> Self {
        Self::new(TransportKind::Spi)
    }

    /// Report readiness through an interrupt line instead of the status byte.
    pub fn with_irq(mut self) -> Self {
        self.irq = true;
        self
    }

    pub fn ack(&mut self) -> &mut Self {
        self.reads.push_back(ACK_FRAME.to_vec());
        self.delays.push_back(0);
        self
    }

    pub fn nack(&mut self) -> &mut Self {
        self.reads.push_back(NACK_FRAME.to_vec());
        self.delays.push_back(0);
        self
    }

    /// Queue a well-formed response to `command`.
    pub fn respond(&mut self, command: Command, data: &[u8]) -> &mut Self {
        let frame = Frame::new(Tfi::Pn532ToHost, command.response_code(), data);
        self.reads.push_back(frame.as_bytes().to_vec());
        self.delays.push_back(0);
        self
    }

    /// Ack followed by a response, the normal shape of an exchange.
    pub fn exchange(&mut self, command: Command, data: &[u8]) -> &mut Self {
        self.ack().respond(command, data)
    }

    pub fn respond_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.reads.push_back(bytes.to_vec());
        self.delays.push_back(0);
        self
    }

    /// The next `n` ready polls report busy.
    pub fn busy(&mut self, n: u32) -> &mut Self {
        self.busy_polls += n;
        self
    }

    /// The most recently queued read reports busy for `n` polls first.
    pub fn delayed(&mut self, n: u32) -> &mut Self {
        if let Some(last) = self.delays.back_mut() {
            *last = n;
        }
        self
    }

    /// Answer `n` more ready polls, then never become ready again.
    pub fn stall_after(&mut self, n: usize) -> &mut Self {
        self.ready_polls_left = Some(n);
        self
    }

    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    fn next_ready(&mut self) -> bool {
        self.polls += 1;
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            return false;
        }
        if let Some(delay) = self.delays.front_mut().filter(|delay| **delay > 0) {
            *delay -= 1;
            return false;
        }
        match &mut self.ready_polls_left {
            Some(0) => false,
            Some(left) => {
                *left -= 1;
                true
            }
            None => true,
        }
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.written.push(bytes.to_vec());
        Ok(())
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let frame = self
            .reads
            .pop_front()
            .ok_or_else(|| TransportError::Io("read with nothing scripted".into()))?;
        self.delays.pop_front();
        let mut out = Vec::with_capacity(len);
        out.push(STATUS_READY);
        out.extend_from_slice(&frame);
        out.resize(len, 0x00);
        Ok(out)
    }

    fn poll_status_byte(&mut self) -> Result<u8, TransportError> {
        if self.irq {
            return Err(TransportError::Io("status byte polled on an IRQ session".into()));
        }
        Ok(if self.next_ready() { STATUS_READY } else { 0x00 })
    }

    fn has_interrupt(&self) -> bool {
        self.irq
    }

    fn interrupt_ready(&mut self) -> Result<Option<bool>, TransportError> {
        if !self.irq {
            return Ok(None);
        }
        Ok(Some(self.next_ready()))
    }
}

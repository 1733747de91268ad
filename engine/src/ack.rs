//! One command exchange: send, wait for ready, check the ack, retry.
//!
//! ```text
//! Idle -> Sending -> AwaitingReady -> AwaitingAck -> Done
//!            ^                            |
//!            +------ retry budget left ---+--> Failed
//! ```

use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::frame::{self, Frame, Payload};
use crate::transport::{Transport, STATUS_READY};
use crate::wait::Wait;

pub const ACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];
pub const NACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00];

/// Status byte followed by the ack frame.
pub const ACK_READ_LEN: usize = 1 + ACK_FRAME.len();

pub const DEFAULT_RETRY_BUDGET: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Sending,
    AwaitingReady,
    AwaitingAck,
    Done,
    Failed,
}

/// How the session learns that the chip is ready. Fixed per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadySource {
    StatusByte,
    Interrupt,
}

/// Acknowledgement failures still allowed for one send.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    remaining: u8,
}

impl RetryBudget {
    pub fn new(retries: u8) -> Self {
        Self { remaining: retries }
    }

    pub fn remaining(&self) -> u8 {
        self.remaining
    }

    /// Take one retry; false once the budget is spent.
    pub fn consume(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(left) => {
                self.remaining = left;
                true
            }
            None => false,
        }
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BUDGET)
    }
}

/// Outcome of an acknowledged send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Resends needed before the ack arrived.
    pub retries: u8,
}

#[derive(Debug, Clone)]
pub struct AckProtocol {
    ready: ReadySource,
    retry_budget: u8,
    poll_interval: Duration,
}

impl AckProtocol {
    pub fn new(ready: ReadySource, retry_budget: u8) -> Self {
        Self {
            ready,
            retry_budget,
            poll_interval: Duration::ZERO,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn ready_source(&self) -> ReadySource {
        self.ready
    }

    pub fn retry_budget(&self) -> u8 {
        self.retry_budget
    }

    /// Deliver `frame` and wait for its acknowledgement.
    ///
    /// The same bytes are resent on every retry. Once the budget is spent
    /// the command counts as not delivered.
    pub fn send<T: Transport>(&self, transport: &mut T, frame: &Frame, wait: &Wait) -> Result<Delivery> {
        let mut budget = RetryBudget::new(self.retry_budget);
        let mut retries = 0u8;
        let mut state = ExchangeState::Idle;

        loop {
            state = match state {
                ExchangeState::Idle => ExchangeState::Sending,
                ExchangeState::Sending => {
                    trace!(bytes = ?frame.as_bytes(), "writing frame");
                    transport.write(frame.as_bytes())?;
                    ExchangeState::AwaitingReady
                }
                ExchangeState::AwaitingReady => {
                    self.wait_ready(transport, wait)?;
                    ExchangeState::AwaitingAck
                }
                ExchangeState::AwaitingAck => {
                    if self.read_ack(transport)? {
                        ExchangeState::Done
                    } else if budget.consume() {
                        retries += 1;
                        warn!(retry = retries, of = self.retry_budget, "no ack from PN532, resending");
                        ExchangeState::Sending
                    } else {
                        ExchangeState::Failed
                    }
                }
                ExchangeState::Done => {
                    debug!(retries, "command acknowledged");
                    return Ok(Delivery { retries });
                }
                ExchangeState::Failed => {
                    let attempts = u32::from(retries) + 1;
                    error!(attempts, "PN532 never acknowledged the command");
                    return Err(Error::AckExhausted { attempts });
                }
            };
        }
    }

    /// Block until the chip signals ready, or `wait` gives up.
    ///
    /// The signal is sampled before the deadline is looked at, so a chip that
    /// is already ready always gets through.
    pub fn wait_ready<T: Transport>(&self, transport: &mut T, wait: &Wait) -> Result<()> {
        loop {
            if self.is_ready(transport)? {
                return Ok(());
            }
            wait.check()?;
            if self.poll_interval.is_zero() {
                std::hint::spin_loop();
            } else {
                std::thread::sleep(self.poll_interval);
            }
        }
    }

    fn is_ready<T: Transport>(&self, transport: &mut T) -> Result<bool> {
        match self.ready {
            ReadySource::StatusByte => Ok(transport.poll_status_byte()? == STATUS_READY),
            ReadySource::Interrupt => transport.interrupt_ready()?.ok_or_else(|| {
                Error::Config("ready source is the interrupt line but the transport has none".into())
            }),
        }
    }

    fn read_ack<T: Transport>(&self, transport: &mut T) -> Result<bool> {
        let raw = transport.read(ACK_READ_LEN)?;
        let frame = raw.get(1..).unwrap_or_default();
        if frame == ACK_FRAME {
            return Ok(true);
        }
        if frame == NACK_FRAME {
            debug!("PN532 sent NACK");
        } else {
            trace!(bytes = ?raw, "ack mismatch");
        }
        Ok(false)
    }

    /// Wait for the response frame, read `read_len` bytes and decode them.
    ///
    /// Malformed responses are returned as errors right away; only
    /// delivery is ever retried.
    pub fn read_response<T: Transport>(
        &self,
        transport: &mut T,
        read_len: usize,
        expected_data_len: usize,
        wait: &Wait,
    ) -> Result<Payload> {
        self.wait_ready(transport, wait)?;
        let raw = transport.read(read_len)?;
        trace!(bytes = ?raw, "response");
        let payload = frame::decode(raw.get(1..).unwrap_or_default(), expected_data_len)?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::TransportError;
    use crate::frame::{encode, Tfi};
    use crate::transport::TransportKind;

    /// Replays a fixed list of reads and counts writes.
    #[derive(Default)]
    struct Replay {
        reads: VecDeque<Vec<u8>>,
        writes: Vec<Vec<u8>>,
        status: VecDeque<u8>,
        irq: Option<VecDeque<bool>>,
    }

    impl Replay {
        fn with_acks(acks: &[bool]) -> Self {
            let mut replay = Self::default();
            for ok in acks {
                let frame = if *ok { ACK_FRAME } else { NACK_FRAME };
                let mut read = vec![STATUS_READY];
                read.extend_from_slice(&frame);
                replay.reads.push_back(read);
            }
            replay
        }
    }

    impl Transport for Replay {
        fn kind(&self) -> TransportKind {
            TransportKind::I2c
        }

        fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
            self.writes.push(bytes.to_vec());
            Ok(())
        }

        fn read(&mut self, len: usize) -> std::result::Result<Vec<u8>, TransportError> {
            let mut read = self
                .reads
                .pop_front()
                .ok_or_else(|| TransportError::Io("no scripted read".into()))?;
            read.resize(len, 0);
            Ok(read)
        }

        fn poll_status_byte(&mut self) -> std::result::Result<u8, TransportError> {
            Ok(self.status.pop_front().unwrap_or(STATUS_READY))
        }

        fn has_interrupt(&self) -> bool {
            self.irq.is_some()
        }

        fn interrupt_ready(&mut self) -> std::result::Result<Option<bool>, TransportError> {
            Ok(self.irq.as_mut().map(|line| line.pop_front().unwrap_or(true)))
        }
    }

    #[test]
    fn budget_allows_exactly_its_size() {
        let mut budget = RetryBudget::new(2);
        assert!(budget.consume());
        assert!(budget.consume());
        assert!(!budget.consume());
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn first_ack_needs_no_retry() {
        let mut replay = Replay::with_acks(&[true]);
        let frame = encode(0x02, &[]);
        let delivery = AckProtocol::new(ReadySource::StatusByte, 5)
            .send(&mut replay, &frame, &Wait::forever())
            .unwrap();
        assert_eq!(delivery.retries, 0);
        assert_eq!(replay.writes, vec![frame.as_bytes().to_vec()]);
    }

    #[test]
    fn exhausts_after_budget_retries() {
        let mut replay = Replay::with_acks(&[false; 6]);
        let frame = encode(0x02, &[]);
        let err = AckProtocol::new(ReadySource::StatusByte, 5)
            .send(&mut replay, &frame, &Wait::forever())
            .unwrap_err();
        assert!(matches!(err, Error::AckExhausted { attempts: 6 }));
        // Initial send plus five identical resends.
        assert_eq!(replay.writes.len(), 6);
        assert!(replay.writes.iter().all(|w| w == frame.as_bytes()));
        assert!(replay.reads.is_empty());
    }

    #[test]
    fn stops_retrying_once_acked() {
        for n in 1..=5u8 {
            let mut acks = vec![false; usize::from(n)];
            acks.push(true);
            // Extra reads that must stay untouched.
            acks.push(true);
            let mut replay = Replay::with_acks(&acks);
            let delivery = AckProtocol::new(ReadySource::StatusByte, 5)
                .send(&mut replay, &encode(0x0C, &[]), &Wait::forever())
                .unwrap();
            assert_eq!(delivery.retries, n);
            assert_eq!(replay.writes.len(), usize::from(n) + 1);
            assert_eq!(replay.reads.len(), 1);
        }
    }

    #[test]
    fn zero_budget_fails_on_first_mismatch() {
        let mut replay = Replay::with_acks(&[false, true]);
        let err = AckProtocol::new(ReadySource::StatusByte, 0)
            .send(&mut replay, &encode(0x02, &[]), &Wait::forever())
            .unwrap_err();
        assert!(matches!(err, Error::AckExhausted { attempts: 1 }));
        assert_eq!(replay.writes.len(), 1);
    }

    #[test]
    fn polls_status_until_ready() {
        let mut replay = Replay::with_acks(&[true]);
        replay.status.extend([0x00, 0x00, 0x00]);
        AckProtocol::new(ReadySource::StatusByte, 5)
            .send(&mut replay, &encode(0x02, &[]), &Wait::forever())
            .unwrap();
        assert!(replay.status.is_empty());
    }

    #[test]
    fn interrupt_line_is_active_low() {
        let mut replay = Replay::with_acks(&[true]);
        // Interrupt reads: not ready, not ready, ready.
        replay.irq = Some(VecDeque::from([false, false, true]));
        // The status byte would never report ready; it must not be consulted.
        replay.status.extend([0x00; 8]);
        AckProtocol::new(ReadySource::Interrupt, 5)
            .send(&mut replay, &encode(0x02, &[]), &Wait::forever())
            .unwrap();
        assert_eq!(replay.status.len(), 8);
    }

    #[test]
    fn interrupt_source_without_line_is_a_config_error() {
        let mut replay = Replay::with_acks(&[true]);
        let err = AckProtocol::new(ReadySource::Interrupt, 5)
            .send(&mut replay, &encode(0x02, &[]), &Wait::forever())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn ready_wait_honours_deadline() {
        let mut replay = Replay::default();
        replay.status.extend([0x00; 4096]);
        let protocol = AckProtocol::new(ReadySource::StatusByte, 5)
            .with_poll_interval(Duration::from_millis(1));
        let err = protocol
            .wait_ready(&mut replay, &Wait::within(Duration::from_millis(5)))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[test]
    fn ready_chip_passes_an_expired_deadline() {
        let mut replay = Replay::default();
        let protocol = AckProtocol::new(ReadySource::StatusByte, 5);
        let expired = Wait::within(Duration::ZERO);

        protocol.wait_ready(&mut replay, &expired).unwrap();

        replay.status.push_back(0x00);
        assert!(matches!(
            protocol.wait_ready(&mut replay, &expired),
            Err(Error::Timeout)
        ));
    }

    #[test]
    fn response_is_decoded_after_status_byte() {
        let mut replay = Replay::default();
        let mut read = vec![STATUS_READY];
        read.extend_from_slice(Frame::new(Tfi::Pn532ToHost, 0x03, &[0x32, 0x01, 0x06, 0x07]).as_bytes());
        replay.reads.push_back(read);

        let payload = AckProtocol::new(ReadySource::StatusByte, 5)
            .read_response(&mut replay, 20, 4, &Wait::forever())
            .unwrap();
        assert_eq!(payload.code, 0x03);
        assert_eq!(payload.data, [0x32, 0x01, 0x06, 0x07]);
    }

    #[test]
    fn malformed_response_is_not_retried() {
        let mut replay = Replay::default();
        let mut read = vec![STATUS_READY];
        let mut frame = Frame::new(Tfi::Pn532ToHost, 0x03, &[0x32, 0x01, 0x06, 0x07])
            .as_bytes()
            .to_vec();
        frame[9] ^= 0x10;
        read.extend_from_slice(&frame);
        replay.reads.push_back(read);

        let err = AckProtocol::new(ReadySource::StatusByte, 5)
            .read_response(&mut replay, 20, 4, &Wait::forever())
            .unwrap_err();
        assert!(matches!(err, Error::Frame(_)));
        assert!(replay.writes.is_empty());
    }
}

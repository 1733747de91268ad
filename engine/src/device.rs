//! A PN532 session over one transport.

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use tracing::{debug, info, instrument};

use crate::ack::{AckProtocol, ReadySource};
use crate::commands::{
    data_exchange_status, response_data, BlockRead, CardCapacity, CardUid, Command,
    FirmwareVersion, GpioState, KeyType, Request, Target, BLOCK_SIZE, GPIO_VALIDATE,
    P3_RESERVED_MASK,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::frame::Payload;
use crate::transport::{pin_error, Transport, TransportKind};
use crate::wait::{CancelToken, Wait};

/// RST held low this long for the chip to reset.
const RESET_PULSE_MS: u32 = 400;
/// Settling time after RST goes high again.
const RESET_SETTLE_MS: u32 = 10;

/// Port 3 at power-up: validate bit plus the reserved pins, everything else low.
const DEFAULT_P3: u8 = GPIO_VALIDATE | P3_RESERVED_MASK;

/// Drives one PN532. Each call is a complete exchange and holds the
/// transport exclusively until it finishes.
pub struct Pn532<T> {
    transport: T,
    protocol: AckProtocol,
    ready_timeout: Option<Duration>,
    card_timeout: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl<T: Transport> Pn532<T> {
    pub fn new(transport: T, config: &Config) -> Result<Self> {
        config.validate()?;
        if transport.kind() != config.transport {
            return Err(Error::Config(format!(
                "configured for {} but the transport is {}",
                config.transport,
                transport.kind()
            )));
        }

        let ready = match (config.irq, transport.has_interrupt()) {
            (true, true) => ReadySource::Interrupt,
            (true, false) => {
                return Err(Error::Config(
                    "irq enabled but the transport has no interrupt line".into(),
                ))
            }
            (false, _) => ReadySource::StatusByte,
        };
        debug!(transport = %config.transport, ?ready, retry_budget = config.retry_budget, "PN532 session");

        Ok(Self {
            transport,
            protocol: AckProtocol::new(ready, config.retry_budget)
                .with_poll_interval(config.poll_interval()),
            ready_timeout: config.ready_timeout(),
            card_timeout: config.card_timeout(),
            cancel: None,
        })
    }

    /// Configure the SAM for normal mode and drive the GPIOs to a known state.
    ///
    /// GPIOs keep their last state across resets of the host.
    pub fn init(&mut self) -> Result<()> {
        let use_irq = self.protocol.ready_source() == ReadySource::Interrupt;
        self.execute(&Request::sam_configuration(use_irq))?;

        let p7 = match self.kind() {
            TransportKind::I2c => GPIO_VALIDATE,
            TransportKind::Spi => 0x00,
        };
        self.write_gpio(DEFAULT_P3, p7)?;
        info!("PN532 ready");
        Ok(())
    }

    /// Pulse the active-low reset line, then [`init`](Self::init).
    pub fn init_with_reset<R, D>(&mut self, rst: &mut R, delay: &mut D) -> Result<()>
    where
        R: OutputPin,
        D: DelayNs,
    {
        debug!("resetting PN532");
        rst.set_high().map_err(pin_error)?;
        rst.set_low().map_err(pin_error)?;
        delay.delay_ms(RESET_PULSE_MS);
        rst.set_high().map_err(pin_error)?;
        delay.delay_ms(RESET_SETTLE_MS);
        self.init()
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Cancel token checked by every blocking wait from now on.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    pub fn set_card_timeout(&mut self, timeout: Option<Duration>) {
        self.card_timeout = timeout;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn release(self) -> T {
        self.transport
    }

    pub fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        let payload = self.execute(&Request::get_firmware_version())?;
        let firmware = FirmwareVersion::parse(&payload)?;
        info!(%firmware, support = firmware.support.bits(), "firmware version");
        Ok(firmware)
    }

    pub fn read_gpio(&mut self) -> Result<GpioState> {
        let payload = self.execute(&Request::read_gpio())?;
        Ok(GpioState::parse(&payload, self.kind())?)
    }

    /// Write both GPIO ports.
    ///
    /// P32 and P34 are always kept high, and port 7 is left alone over SPI.
    /// Set bit 7 (`GPIO_VALIDATE`) of a port byte for the chip to apply it.
    pub fn write_gpio(&mut self, p3: u8, p7: u8) -> Result<()> {
        let request = Request::write_gpio(p3, p7, self.kind());
        self.execute(&request)?;
        Ok(())
    }

    /// Wait for a card and return its UID in canonical 7-byte form.
    pub fn card_uid(&mut self) -> Result<[u8; 7]> {
        Ok(self.wait_for_target()?.uid.canonical())
    }

    /// Block until a card enters the field (bounded by the card timeout).
    #[instrument(skip(self))]
    pub fn wait_for_target(&mut self) -> Result<Target> {
        let frame = Request::in_list_passive_target().encode();
        let ready_wait = self.ready_wait();
        self.protocol.send(&mut self.transport, &frame, &ready_wait)?;

        // The card timeout starts once the chip has taken the command.
        let card_wait = self.card_wait();
        debug!("waiting for a card");
        let payload = self.protocol.read_response(
            &mut self.transport,
            Command::InListPassiveTarget.read_len(),
            Command::InListPassiveTarget.response_data_len(),
            &card_wait,
        )?;
        response_data(&payload, Command::InListPassiveTarget)?;
        let target = Target::parse(&payload)?;
        info!(uid = %target.uid, sak = target.sel_res, "card detected");
        Ok(target)
    }

    /// Read one 16-byte block of the listed card.
    ///
    /// A non-zero status is returned in the result, not as an error; check
    /// [`BlockRead::is_reliable`].
    pub fn read_block(&mut self, block: u8) -> Result<BlockRead> {
        let payload = self.execute(&Request::read_block(block))?;
        Ok(BlockRead::parse(&payload, block)?)
    }

    /// Write one 16-byte block. The card must stay on the reader until
    /// this returns, whatever the outcome.
    pub fn write_block(&mut self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        info!(block, "writing block, keep the card on the reader");
        let result = self
            .execute(&Request::write_block(block, data))
            .and_then(|payload| card_status(&payload));
        info!(block, ok = result.is_ok(), "block write finished, card can be removed");
        result
    }

    /// Read every block of a card of the given size, in order.
    pub fn read_all_blocks(&mut self, capacity: CardCapacity) -> Result<Vec<BlockRead>> {
        info!(?capacity, "reading all blocks, keep the card on the reader");
        let blocks = capacity
            .blocks()
            .map(|block| self.read_block(block))
            .collect::<Result<Vec<_>>>()?;
        info!("card can be removed");
        Ok(blocks)
    }

    /// MIFARE Classic authentication of the sector holding `block`.
    pub fn authenticate(
        &mut self,
        block: u8,
        key_type: KeyType,
        key: &[u8; 6],
        uid: &CardUid,
    ) -> Result<()> {
        let request = Request::authenticate_block(block, key_type, key, uid);
        let payload = self.execute(&request)?;
        card_status(&payload)
    }

    /// Run one command: encode, deliver with retries, read and decode the response.
    #[instrument(skip_all, fields(command = %request.command()))]
    fn execute(&mut self, request: &Request) -> Result<Payload> {
        let frame = request.encode();
        let command = request.command();
        let wait = self.ready_wait();

        self.protocol.send(&mut self.transport, &frame, &wait)?;
        let payload = self.protocol.read_response(
            &mut self.transport,
            command.read_len(),
            command.response_data_len(),
            &wait,
        )?;
        response_data(&payload, command)?;
        Ok(payload)
    }

    fn ready_wait(&self) -> Wait {
        self.wait_for(self.ready_timeout)
    }

    fn card_wait(&self) -> Wait {
        self.wait_for(self.card_timeout)
    }

    fn wait_for(&self, timeout: Option<Duration>) -> Wait {
        let wait = Wait::from_timeout(timeout);
        match &self.cancel {
            Some(token) => wait.with_cancel(token.clone()),
            None => wait,
        }
    }
}

fn card_status(payload: &Payload) -> Result<()> {
    match data_exchange_status(payload)? {
        0 => Ok(()),
        status => Err(Error::CardStatus(status)),
    }
}

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ack::DEFAULT_RETRY_BUDGET;
use crate::error::{Error, Result};
use crate::transport::{TransportKind, DEFAULT_I2C_ADDRESS};

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportKind,
    /// Use the interrupt line instead of polling the status byte.
    pub irq: bool,
    pub i2c_address: u8,
    pub retry_budget: u8,
    /// Limit on the ready waits of one exchange; unbounded when unset.
    pub ready_timeout_ms: Option<u64>,
    /// Limit on waiting for a card to enter the field; unbounded when unset.
    pub card_timeout_ms: Option<u64>,
    /// Pause between ready polls; 0 polls continuously.
    pub poll_interval_us: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportKind::I2c,
            irq: false,
            i2c_address: DEFAULT_I2C_ADDRESS,
            retry_budget: DEFAULT_RETRY_BUDGET,
            ready_timeout_ms: None,
            card_timeout_ms: None,
            poll_interval_us: 0,
        }
    }
}

impl Config {
    /// Read `PN532_*` environment variables, falling back to defaults.
    ///
    /// - `PN532_TRANSPORT`: `i2c` or `spi`
    /// - `PN532_IRQ`: `1`/`true` to wait on the interrupt line
    /// - `PN532_I2C_ADDRESS`: decimal or `0x` hex
    /// - `PN532_RETRY_BUDGET`
    /// - `PN532_READY_TIMEOUT_MS`, `PN532_CARD_TIMEOUT_MS`
    /// - `PN532_POLL_INTERVAL_US`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("PN532_TRANSPORT") {
            config.transport = match value.trim().to_ascii_lowercase().as_str() {
                "i2c" => TransportKind::I2c,
                "spi" => TransportKind::Spi,
                other => return Err(Error::Config(format!("unknown transport {other:?}"))),
            };
        }
        if let Some(value) = lookup("PN532_IRQ") {
            config.irq = parse_flag("PN532_IRQ", &value)?;
        }
        if let Some(value) = lookup("PN532_I2C_ADDRESS") {
            config.i2c_address = parse_int("PN532_I2C_ADDRESS", &value)?;
        }
        if let Some(value) = lookup("PN532_RETRY_BUDGET") {
            config.retry_budget = parse_int("PN532_RETRY_BUDGET", &value)?;
        }
        if let Some(value) = lookup("PN532_READY_TIMEOUT_MS") {
            config.ready_timeout_ms = Some(parse_int("PN532_READY_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = lookup("PN532_CARD_TIMEOUT_MS") {
            config.card_timeout_ms = Some(parse_int("PN532_CARD_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = lookup("PN532_POLL_INTERVAL_US") {
            config.poll_interval_us = parse_int("PN532_POLL_INTERVAL_US", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.i2c_address > 0x7F {
            return Err(Error::Config(format!(
                "I2C address 0x{:02X} is not a 7-bit address",
                self.i2c_address
            )));
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }

    pub fn card_timeout(&self) -> Option<Duration> {
        self.card_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got {other:?}"))),
    }
}

fn parse_int<T>(key: &str, value: &str) -> Result<T>
where
    T: TryFrom<u64>,
{
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    }
    .map_err(|e| Error::Config(format!("{key}: {e}")))?;

    T::try_from(parsed).map_err(|_| Error::Config(format!("{key}: {parsed} is out of range")))
}

//! Serial transport ownership and recovery
//!
//! The supervisor owns the serial connection lifecycle: it holds the live
//! link, detects I/O failures, and drives reconnection with a fixed
//! backoff. A failure surfaces to the server loop as a transport error for
//! the current cycle; the loop re-enters through `ensure_connected` which
//! retries forever — an unattended field device never gives up its bus.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::config::{Parity, ServerConfig};
use crate::error::{Result, RtuError};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link has been opened yet
    Disconnected,
    /// A live link is held
    Connected,
    /// The link was lost; reopen attempts are in progress
    Reconnecting,
}

/// Outcome of a bounded receive
#[derive(Debug)]
pub enum Recv {
    /// `n` bytes were read into the buffer
    Data(usize),
    /// The wait elapsed without any bytes arriving
    Timeout,
}

/// A byte-oriented serial link
#[async_trait]
pub trait RtuLink: Send {
    /// Read available bytes into `buf`; resolves once at least one byte
    /// arrives (or the stream fails)
    async fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Write the full buffer to the line
    async fn write_all_bytes(&mut self, data: &[u8]) -> std::io::Result<()>;
}

/// Opens links; the production opener owns the serial parameters, tests
/// inject channel-backed mocks
#[async_trait]
pub trait PortOpener: Send {
    type Link: RtuLink;

    async fn open(&self) -> Result<Self::Link>;
}

/// Production link over a tokio-serial stream
pub struct SerialLink {
    stream: SerialStream,
}

#[async_trait]
impl RtuLink for SerialLink {
    async fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf).await
    }

    async fn write_all_bytes(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }
}

/// Opens the configured serial device
pub struct SerialOpener {
    device: String,
    baud_rate: u32,
    parity: Parity,
    data_bits: u8,
    stop_bits: u8,
}

impl SerialOpener {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            device: config.device.clone(),
            baud_rate: config.baud_rate,
            parity: config.parity,
            data_bits: config.data_bits,
            stop_bits: config.stop_bits,
        }
    }
}

#[async_trait]
impl PortOpener for SerialOpener {
    type Link = SerialLink;

    async fn open(&self) -> Result<SerialLink> {
        debug!("opening {} @{}baud", self.device, self.baud_rate);

        let parity = match self.parity {
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::None => tokio_serial::Parity::None,
        };

        let data_bits = match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        let stop_bits = match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        match tokio_serial::new(&self.device, self.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .open_native_async()
        {
            Ok(stream) => {
                info!("serial port opened: {}", self.device);
                Ok(SerialLink { stream })
            },
            Err(e) => Err(RtuError::transport(format!(
                "failed to open serial port {}: {e}",
                self.device
            ))),
        }
    }
}

/// Owns the link and the reconnect policy
pub struct TransportSupervisor<O: PortOpener> {
    opener: O,
    link: Option<O::Link>,
    state: ConnectionState,
    retry_interval: Duration,
    reconnects: u64,
}

impl<O: PortOpener> TransportSupervisor<O> {
    pub fn new(opener: O, retry_interval: Duration) -> Self {
        Self {
            opener,
            link: None,
            state: ConnectionState::Disconnected,
            retry_interval,
            reconnects: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of successful recoveries since startup
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Open the link once at startup. Failure here is not recovered:
    /// before any transport exists there is nothing to fall back to.
    pub async fn connect(&mut self) -> Result<()> {
        let link = self.opener.open().await?;
        self.link = Some(link);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Block until a live link is held, reopening with fixed backoff.
    /// Retries are unbounded.
    pub async fn ensure_connected(&mut self) {
        while self.link.is_none() {
            match self.opener.open().await {
                Ok(link) => {
                    self.link = Some(link);
                    if self.state == ConnectionState::Reconnecting {
                        self.reconnects += 1;
                        info!("reconnected successfully");
                    }
                    self.state = ConnectionState::Connected;
                },
                Err(e) => {
                    self.state = ConnectionState::Reconnecting;
                    warn!(
                        "reconnect failed: {e}; retrying in {:?}",
                        self.retry_interval
                    );
                    sleep(self.retry_interval).await;
                },
            }
        }
    }

    /// Read into `buf`, waiting at most `wait`. I/O failure drops the link
    /// and transitions to Reconnecting; the caller skips the cycle.
    pub async fn receive(&mut self, buf: &mut [u8], wait: Duration) -> Result<Recv> {
        let outcome = match self.link.as_mut() {
            Some(link) => timeout(wait, link.read_bytes(buf)).await,
            None => return Err(RtuError::transport("no open link")),
        };

        match outcome {
            Err(_) => Ok(Recv::Timeout),
            // A zero-byte read from a serial stream means the device node
            // went away, not an empty frame
            Ok(Ok(0)) => Err(self.fail_link("serial stream closed")),
            Ok(Ok(n)) => Ok(Recv::Data(n)),
            Ok(Err(e)) => Err(self.fail_link(format!("read failed: {e}"))),
        }
    }

    /// Write a full frame to the line
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let outcome = match self.link.as_mut() {
            Some(link) => link.write_all_bytes(data).await,
            None => return Err(RtuError::transport("no open link")),
        };

        outcome.map_err(|e| self.fail_link(format!("write failed: {e}")))
    }

    fn fail_link(&mut self, context: impl Into<String>) -> RtuError {
        let msg = context.into();
        warn!("transport failure: {msg}; entering recovery");
        self.link = None;
        self.state = ConnectionState::Reconnecting;
        RtuError::Transport(msg)
    }
}

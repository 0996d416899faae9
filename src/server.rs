//! Modbus RTU slave server loop
//!
//! Drives the cycle: assemble → validate CRC → dispatch → encode reply →
//! send → repeat. The loop is intentionally infinite and restart-tolerant:
//! every error path returns control to the top of the loop, because a
//! serial field device must stay available indefinitely. Malformed or
//! CRC-invalid frames are logged and never answered — the master will time
//! out and retry, and answering a corrupted request could be misattributed
//! to the wrong request.
//!
//! A single task owns the store, the assembler and the supervisor for the
//! whole receive→validate→dispatch→send cycle, so no locking is needed
//! (the protocol is half-duplex request/response). Shutdown is checked
//! between cycles only; a cycle always runs to completion or fails as a
//! unit.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::constants::RECV_BUFFER_SIZE;
use crate::dispatch::dispatch;
use crate::error::{Result, RtuError};
use crate::frame::{decode_adu, encode_adu, FrameAssembler};
use crate::store::DataStore;
use crate::transport::{ConnectionState, PortOpener, Recv, TransportSupervisor};

/// Counters kept by the serve loop; purely observational, no protocol
/// decision depends on them
#[derive(Debug, Default, Clone)]
pub struct ServerStats {
    /// Complete frames delivered by the assembler
    pub frames_received: u64,
    /// Replies transmitted (normal and exception)
    pub replies_sent: u64,
    /// Exception replies among those
    pub exception_replies: u64,
    /// Frames rejected by CRC validation
    pub crc_errors: u64,
    /// Oversized bursts and undecodable frames
    pub framing_errors: u64,
    /// Valid frames addressed to another station or broadcast
    pub dropped_frames: u64,
    /// Successful transport recoveries
    pub reconnects: u64,
    /// Raw bytes read from the line
    pub bytes_received: u64,
    /// Raw bytes written to the line
    pub bytes_sent: u64,
}

/// The slave engine: data store, frame assembler and transport supervisor
/// composed into one serve loop
pub struct RtuServer<O: PortOpener> {
    config: ServerConfig,
    store: DataStore,
    assembler: FrameAssembler,
    supervisor: TransportSupervisor<O>,
    stats: ServerStats,
}

impl<O: PortOpener> RtuServer<O> {
    /// Create a server from its configuration and a port opener
    pub fn new(config: ServerConfig, opener: O) -> Self {
        let mut store = DataStore::new(config.table_size);
        if config.seed_demo_values {
            let _ = store.set_holding_register(0, 1234);
            let _ = store.set_coil(0, false);
        }

        let assembler = FrameAssembler::new(config.frame_gap());
        let supervisor = TransportSupervisor::new(opener, config.reconnect_interval());

        Self {
            config,
            store,
            assembler,
            supervisor,
            stats: ServerStats::default(),
        }
    }

    /// Process-side access to the served tables
    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Mutable process-side access to the served tables
    pub fn store_mut(&mut self) -> &mut DataStore {
        &mut self.store
    }

    /// Snapshot of the loop counters
    pub fn stats(&self) -> ServerStats {
        let mut stats = self.stats.clone();
        stats.reconnects = self.supervisor.reconnects();
        stats
    }

    /// Current transport state
    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Open the serial port once. Startup failure is fatal to the caller:
    /// before any transport exists there is nothing to recover.
    pub async fn connect(&mut self) -> Result<()> {
        self.supervisor.connect().await
    }

    /// Serve until cancelled. Never returns an error: framing, CRC,
    /// protocol and transport failures are all absorbed by the loop.
    pub async fn serve(&mut self, cancel: CancellationToken) {
        info!(
            "Modbus RTU server ready on {}, slave ID {}, {} entries per table, frame gap {:?}",
            self.config.device,
            self.config.slave_id,
            self.config.table_size,
            self.assembler.frame_gap()
        );

        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            if cancel.is_cancelled() {
                info!("shutdown requested, leaving serve loop");
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => continue,
                _ = self.supervisor.ensure_connected() => {},
            }

            // Mid-frame the next byte must arrive within the inter-frame
            // gap; otherwise the frame is complete. Idle, wait the
            // configured read timeout.
            let wait = if self.assembler.is_idle() {
                self.config.read_timeout()
            } else {
                self.assembler.frame_gap()
            };

            match self.supervisor.receive(&mut buf, wait).await {
                Ok(Recv::Data(n)) => {
                    self.stats.bytes_received += n as u64;
                    match self.assembler.push(&buf[..n], Instant::now()) {
                        Ok(Some(frame)) => self.handle_frame(frame).await,
                        Ok(None) => {},
                        Err(e) => {
                            self.stats.framing_errors += 1;
                            warn!("{e}");
                        },
                    }
                },
                Ok(Recv::Timeout) => {
                    if let Some(frame) = self.assembler.on_silence(Instant::now()) {
                        self.handle_frame(frame).await;
                    }
                },
                Err(e) => {
                    // Supervisor already entered recovery; a partial frame
                    // from the dead link is worthless
                    warn!("receive failed: {e}");
                    self.assembler.clear();
                },
            }
        }
    }

    /// Validate, dispatch and answer one complete frame
    async fn handle_frame(&mut self, frame: Vec<u8>) {
        self.stats.frames_received += 1;
        debug!("frame rx ({}B): {}", frame.len(), hex::encode_upper(&frame));

        let (frame_slave, request) = match decode_adu(&frame) {
            Ok(parts) => parts,
            Err(e @ RtuError::Crc { .. }) => {
                self.stats.crc_errors += 1;
                warn!("{e}");
                return;
            },
            Err(e) => {
                self.stats.framing_errors += 1;
                warn!("{e}");
                return;
            },
        };

        let Some(reply) = dispatch(frame_slave, request, &mut self.store, self.config.slave_id)
        else {
            self.stats.dropped_frames += 1;
            trace!("no reply for frame addressed to slave {frame_slave}");
            return;
        };

        if reply.is_exception() {
            self.stats.exception_replies += 1;
        }

        let adu = encode_adu(self.config.slave_id, reply.as_slice());
        match self.supervisor.send(&adu).await {
            Ok(()) => {
                self.stats.replies_sent += 1;
                self.stats.bytes_sent += adu.len() as u64;
                debug!("reply tx: {} bytes", adu.len());
            },
            Err(e) => {
                warn!("reply send failed: {e}");
            },
        }
    }
}

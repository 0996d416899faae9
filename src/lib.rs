//! # rtusrv - Modbus RTU Slave Engine
//!
//! A Modbus RTU slave (server) engine for unattended serial field devices:
//! it listens on a serial transport, validates incoming request frames,
//! dispatches them against an in-memory data store and returns correctly
//! framed responses or Modbus exception replies.
//!
//! ## Supported Function Codes
//!
//! | Code | Function |
//! |------|----------|
//! | 0x01 | Read Coils |
//! | 0x02 | Read Discrete Inputs |
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x05 | Write Single Coil |
//! | 0x06 | Write Single Register |
//! | 0x0F | Write Multiple Coils |
//! | 0x10 | Write Multiple Registers |
//!
//! Unsupported function codes are answered with an Illegal Function
//! exception; frames addressed to another station are ignored entirely.
//!
//! ## Design
//!
//! RTU frames carry no length field: end-of-frame is inferred from 3.5
//! character times of line silence, so the [`frame::FrameAssembler`] is a
//! timeout-driven state machine rather than a parser. A single task owns
//! the full request-reply cycle; the [`transport::TransportSupervisor`]
//! recovers lost serial links with fixed-backoff retries that never give
//! up.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rtusrv::{RtuServer, SerialOpener, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::default();
//!     let opener = SerialOpener::new(&config);
//!
//!     let mut server = RtuServer::new(config, opener);
//!     server.store_mut().set_holding_register(0, 1234)?;
//!
//!     server.connect().await?;
//!     server.serve(CancellationToken::new()).await;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants based on the official specification
pub mod constants;

/// Modbus CRC16 checksum
pub mod crc;

/// Stack-allocated PDU buffer
pub mod pdu;

/// The four data tables served by the slave
pub mod store;

/// Silence-delimited RTU frame assembly and ADU encode/decode
pub mod frame;

/// Request decoding and reply building
pub mod dispatch;

/// Serial link ownership and reconnect policy
pub mod transport;

/// Startup configuration
pub mod config;

/// The serve loop
pub mod server;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Core engine API ===
pub use server::{RtuServer, ServerStats};
pub use store::{BitTable, DataStore, WordTable};

// === Error handling ===
pub use error::{ExceptionCode, Result, RtuError};

// === Configuration ===
pub use config::{Parity, ServerConfig};

// === Transport (advanced usage and test doubles) ===
pub use transport::{ConnectionState, PortOpener, RtuLink, SerialOpener, TransportSupervisor};

// === Protocol building blocks ===
pub use crc::crc16;
pub use dispatch::dispatch;
pub use frame::FrameAssembler;
pub use pdu::ModbusPdu;

// === Protocol limits (commonly needed constants) ===
pub use constants::{
    MAX_ADU_SIZE, MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS,
    MAX_WRITE_REGISTERS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

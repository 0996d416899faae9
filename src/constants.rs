//! Modbus RTU protocol constants based on the official specification
//!
//! These constants are derived from the official Modbus specification:
//! - Maximum ADU size: 256 bytes (the RS485 serial-line limit)
//! - Maximum PDU size: 253 bytes (ADU minus address and CRC)
//! - Register/coil limits are calculated to fit within the PDU size constraint

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Maximum RTU ADU (Application Data Unit) size on a serial line
/// Format: Slave Address(1) + PDU(up to 253) + CRC(2) = 256 bytes
pub const MAX_ADU_SIZE: usize = 256;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
/// RTU ADU (256 bytes) - Slave Address (1 byte) - CRC (2 bytes) = 253 bytes
pub const MAX_PDU_SIZE: usize = 253;

/// Minimum viable RTU ADU: Slave Address(1) + Function Code(1) + CRC(2)
/// Anything shorter observed at a silence boundary is line noise.
pub const MIN_ADU_SIZE: usize = 4;

/// Length of the trailing CRC16 field, little-endian on the wire
pub const CRC_LEN: usize = 2;

/// Receive buffer size for raw serial reads
///
/// Theoretical max frame is 256 bytes; 512 provides safety margin for
/// back-to-back frames landing in one read.
pub const RECV_BUFFER_SIZE: usize = 512;

// ============================================================================
// Addressing
// ============================================================================

/// Broadcast slave address: writes are executed by every slave, none replies
pub const BROADCAST_ADDRESS: u8 = 0;

/// Highest assignable station address (1..=247; 248-255 are reserved)
pub const MAX_SLAVE_ADDRESS: u8 = 247;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// Calculation for response PDU:
/// - Function Code: 1 byte
/// - Byte Count: 1 byte
/// - Register Data: N × 2 bytes
/// - Total: 1 + 1 + (N × 2) ≤ 253
/// - Therefore: N ≤ (253 - 2) / 2 = 125.5 → 125 registers
pub const MAX_READ_REGISTERS: usize = 125;

/// Maximum number of registers for FC16 (Write Multiple Registers)
///
/// Calculation for request PDU:
/// - Function Code: 1 byte
/// - Starting Address: 2 bytes
/// - Quantity of Registers: 2 bytes
/// - Byte Count: 1 byte
/// - Register Values: N × 2 bytes
/// - Total: 1 + 2 + 2 + 1 + (N × 2) ≤ 253
/// - Therefore: N ≤ (253 - 6) / 2 = 123.5 → 123 registers
pub const MAX_WRITE_REGISTERS: usize = 123;

// ============================================================================
// Coil Operation Limits
// ============================================================================

/// Maximum number of coils for FC01/FC02 (Read Coils/Discrete Inputs)
///
/// Calculation for response PDU:
/// - Function Code: 1 byte
/// - Byte Count: 1 byte
/// - Coil Data: ceil(N / 8) bytes
/// - Total: 1 + 1 + ceil(N / 8) ≤ 253
/// - Spec defines: N ≤ 2000 (rounded for practical use)
pub const MAX_READ_COILS: usize = 2000;

/// Maximum number of coils for FC15 (Write Multiple Coils)
///
/// Calculation for request PDU:
/// - Function Code: 1 byte
/// - Starting Address: 2 bytes
/// - Quantity of Outputs: 2 bytes
/// - Byte Count: 1 byte
/// - Coil Values: ceil(N / 8) bytes
/// - Total: 1 + 2 + 2 + 1 + ceil(N / 8) ≤ 253
/// - Spec defines: N ≤ 1968 (0x7B0, conservative practical limit)
pub const MAX_WRITE_COILS: usize = 1968;

// ============================================================================
// Single Coil Wire Encodings
// ============================================================================

/// FC05 value encoding for coil ON
pub const COIL_ON: u16 = 0xFF00;

/// FC05 value encoding for coil OFF
pub const COIL_OFF: u16 = 0x0000;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Exception flag OR-ed into the echoed function code of an exception reply
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Data Store Defaults
// ============================================================================

/// Default length of each of the four data-store tables
pub const DEFAULT_TABLE_SIZE: u16 = 100;

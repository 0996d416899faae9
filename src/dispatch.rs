//! PDU dispatch against the data store
//!
//! Decodes a validated request PDU, invokes the corresponding data-store
//! operation and builds the reply PDU. Request faults are mapped to Modbus
//! exception replies; a frame addressed to another station produces no
//! reply at all. Reads never mutate the store.

use tracing::{debug, trace, warn};

use crate::constants::{
    BROADCAST_ADDRESS, COIL_OFF, COIL_ON, EXCEPTION_FLAG, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_COILS,
    FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER,
};
use crate::error::ExceptionCode;
use crate::pdu::{function_code_description, ModbusPdu};
use crate::store::{BitTable, DataStore, WordTable};

/// Dispatch a request PDU received for `frame_slave` against the store.
///
/// Returns `None` when nothing must be sent: the frame is addressed to
/// another station, or it is a broadcast (executed for writes, never
/// answered). Otherwise returns the reply PDU, normal or exception.
pub fn dispatch(
    frame_slave: u8,
    request: &[u8],
    store: &mut DataStore,
    configured_id: u8,
) -> Option<ModbusPdu> {
    if frame_slave != configured_id && frame_slave != BROADCAST_ADDRESS {
        trace!(
            "ignoring frame for slave {} (configured {})",
            frame_slave,
            configured_id
        );
        return None;
    }

    let &fc = request.first()?;

    if frame_slave == BROADCAST_ADDRESS {
        // Broadcast: write requests take effect, nothing is ever answered
        if is_write_function(fc) {
            if let Err(code) = execute(request, store) {
                debug!("broadcast {} rejected: {}", function_code_description(fc), code);
            }
        } else {
            trace!("ignoring broadcast {}", function_code_description(fc));
        }
        return None;
    }

    match execute(request, store) {
        Ok(reply) => Some(reply),
        Err(code) => {
            warn!(
                "{} (FC {:02X}) rejected with exception {}",
                function_code_description(fc),
                fc,
                code
            );
            Some(exception_reply(fc, code))
        },
    }
}

fn is_write_function(fc: u8) -> bool {
    matches!(
        fc,
        FC_WRITE_SINGLE_COIL
            | FC_WRITE_SINGLE_REGISTER
            | FC_WRITE_MULTIPLE_COILS
            | FC_WRITE_MULTIPLE_REGISTERS
    )
}

/// Build an exception reply: echoed function code with the high bit set,
/// followed by the one-byte exception code
fn exception_reply(fc: u8, code: ExceptionCode) -> ModbusPdu {
    let mut pdu = ModbusPdu::new();
    // Two pushes into an empty 253-byte buffer cannot fail
    let _ = pdu.push(fc | EXCEPTION_FLAG);
    let _ = pdu.push(code.as_u8());
    pdu
}

/// Execute a request and build the normal reply PDU
fn execute(request: &[u8], store: &mut DataStore) -> Result<ModbusPdu, ExceptionCode> {
    let fc = request[0];
    match fc {
        FC_READ_COILS => read_bits(request, store, BitTable::Coils),
        FC_READ_DISCRETE_INPUTS => read_bits(request, store, BitTable::DiscreteInputs),
        FC_READ_HOLDING_REGISTERS => read_words(request, store, WordTable::Holding),
        FC_READ_INPUT_REGISTERS => read_words(request, store, WordTable::Input),
        FC_WRITE_SINGLE_COIL => write_single_coil(request, store),
        FC_WRITE_SINGLE_REGISTER => write_single_register(request, store),
        FC_WRITE_MULTIPLE_COILS => write_multiple_coils(request, store),
        FC_WRITE_MULTIPLE_REGISTERS => write_multiple_registers(request, store),
        _ => Err(ExceptionCode::IllegalFunction),
    }
}

// ============================================================================
// Request field access
// ============================================================================

/// Read a big-endian u16 request field; truncation is a value fault
fn be_u16(request: &[u8], at: usize) -> Result<u16, ExceptionCode> {
    request
        .get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(ExceptionCode::IllegalDataValue)
}

/// Require an exact request length; anything else is a malformed body
fn expect_len(request: &[u8], len: usize) -> Result<(), ExceptionCode> {
    if request.len() == len {
        Ok(())
    } else {
        Err(ExceptionCode::IllegalDataValue)
    }
}

fn pdu_fault(_: crate::error::RtuError) -> ExceptionCode {
    ExceptionCode::ServerDeviceFailure
}

// ============================================================================
// Bit packing
// ============================================================================

/// Pack bits into bytes, LSB first, trailing bits zero-padded
fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Unpack `count` bits from bytes, LSB first
fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes[i / 8] & (1 << (i % 8)) != 0)
        .collect()
}

// ============================================================================
// Function code handlers
// ============================================================================

/// FC01/FC02: reply is byte count + packed bits
fn read_bits(
    request: &[u8],
    store: &DataStore,
    table: BitTable,
) -> Result<ModbusPdu, ExceptionCode> {
    expect_len(request, 5)?;
    let start = be_u16(request, 1)?;
    let count = be_u16(request, 3)?;

    let bits = store.read_bits(table, start, count)?;
    let packed = pack_bits(&bits);

    let mut reply = ModbusPdu::new();
    reply.push(request[0]).map_err(pdu_fault)?;
    reply.push(packed.len() as u8).map_err(pdu_fault)?;
    reply.extend(&packed).map_err(pdu_fault)?;
    Ok(reply)
}

/// FC03/FC04: reply is byte count + big-endian words
fn read_words(
    request: &[u8],
    store: &DataStore,
    table: WordTable,
) -> Result<ModbusPdu, ExceptionCode> {
    expect_len(request, 5)?;
    let start = be_u16(request, 1)?;
    let count = be_u16(request, 3)?;

    let words = store.read_words(table, start, count)?;

    let mut reply = ModbusPdu::new();
    reply.push(request[0]).map_err(pdu_fault)?;
    reply.push((words.len() * 2) as u8).map_err(pdu_fault)?;
    for word in words {
        reply.push_u16(word).map_err(pdu_fault)?;
    }
    Ok(reply)
}

/// FC05: value must be one of the two canonical on/off encodings; the
/// reply echoes the request verbatim
fn write_single_coil(request: &[u8], store: &mut DataStore) -> Result<ModbusPdu, ExceptionCode> {
    expect_len(request, 5)?;
    let address = be_u16(request, 1)?;
    let value = be_u16(request, 3)?;

    let bit = match value {
        COIL_ON => true,
        COIL_OFF => false,
        _ => return Err(ExceptionCode::IllegalDataValue),
    };
    store.write_bits(BitTable::Coils, address, &[bit])?;

    ModbusPdu::from_slice(request).map_err(pdu_fault)
}

/// FC06: any 16-bit value is legal; the reply echoes the request
fn write_single_register(
    request: &[u8],
    store: &mut DataStore,
) -> Result<ModbusPdu, ExceptionCode> {
    expect_len(request, 5)?;
    let address = be_u16(request, 1)?;
    let value = be_u16(request, 3)?;

    store.write_words(WordTable::Holding, address, &[value])?;

    ModbusPdu::from_slice(request).map_err(pdu_fault)
}

/// FC15: reply is function code + start address + quantity
fn write_multiple_coils(request: &[u8], store: &mut DataStore) -> Result<ModbusPdu, ExceptionCode> {
    if request.len() < 7 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let start = be_u16(request, 1)?;
    let count = be_u16(request, 3)?;
    let byte_count = request[5] as usize;

    if byte_count != (count as usize).div_ceil(8) || count == 0 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    expect_len(request, 6 + byte_count)?;

    let values = unpack_bits(&request[6..], count as usize);
    store.write_bits(BitTable::Coils, start, &values)?;

    let mut reply = ModbusPdu::new();
    reply.push(request[0]).map_err(pdu_fault)?;
    reply.push_u16(start).map_err(pdu_fault)?;
    reply.push_u16(count).map_err(pdu_fault)?;
    Ok(reply)
}

/// FC16: reply is function code + start address + quantity
fn write_multiple_registers(
    request: &[u8],
    store: &mut DataStore,
) -> Result<ModbusPdu, ExceptionCode> {
    if request.len() < 7 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let start = be_u16(request, 1)?;
    let count = be_u16(request, 3)?;
    let byte_count = request[5] as usize;

    if byte_count != count as usize * 2 || count == 0 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    expect_len(request, 6 + byte_count)?;

    let values: Vec<u16> = request[6..]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    store.write_words(WordTable::Holding, start, &values)?;

    let mut reply = ModbusPdu::new();
    reply.push(request[0]).map_err(pdu_fault)?;
    reply.push_u16(start).map_err(pdu_fault)?;
    reply.push_u16(count).map_err(pdu_fault)?;
    Ok(reply)
}

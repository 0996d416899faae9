//! RTU frame assembly and ADU encode/decode
//!
//! RTU has no length field or delimiter byte: a frame ends when the line
//! has been silent for 3.5 character times. Assembly is therefore a
//! timeout-driven state machine over raw bytes with arrival timestamps,
//! not a parser over a self-describing format.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::constants::{CRC_LEN, MAX_ADU_SIZE, MIN_ADU_SIZE};
use crate::crc::{crc16, validate_trailing_crc};
use crate::error::{Result, RtuError};

/// The 3.5-character inter-frame gap for the given serial parameters.
///
/// One character on the wire is 1 start bit + data bits + optional parity
/// bit + stop bits. Above 19200 baud the specification fixes the gap at
/// 1750 µs instead of scaling it down further.
pub fn inter_frame_gap(baud_rate: u32, data_bits: u8, parity_bit: bool, stop_bits: u8) -> Duration {
    if baud_rate > 19_200 {
        return Duration::from_micros(1750);
    }
    let bits_per_char = 1 + u64::from(data_bits) + u64::from(parity_bit) + u64::from(stop_bits);
    // 3.5 characters, in microseconds, rounded up
    let micros = (bits_per_char * 3_500_000).div_ceil(u64::from(baud_rate.max(1)));
    Duration::from_micros(micros)
}

/// Assembles silence-delimited frames from a raw byte stream
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    last_byte_at: Option<Instant>,
    frame_gap: Duration,
    /// Set after an overflow: ignore input until the next silence gap so the
    /// tail of an oversized burst cannot masquerade as a new frame
    discarding: bool,
}

impl FrameAssembler {
    /// Create an assembler with the given inter-frame silence gap
    pub fn new(frame_gap: Duration) -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_ADU_SIZE),
            last_byte_at: None,
            frame_gap,
            discarding: false,
        }
    }

    /// The configured inter-frame gap
    pub fn frame_gap(&self) -> Duration {
        self.frame_gap
    }

    /// True when no partial frame is buffered
    pub fn is_idle(&self) -> bool {
        self.buf.is_empty() && !self.discarding
    }

    /// Ingest received bytes with their arrival time.
    ///
    /// If a full inter-frame gap elapsed between the previous byte and this
    /// batch, the buffered frame is completed (or dropped as noise) before
    /// the new bytes are accepted, and returned here. Returns a framing
    /// error on ADU overflow.
    pub fn push(&mut self, bytes: &[u8], at: Instant) -> Result<Option<Vec<u8>>> {
        let completed = if self.gap_elapsed(at) {
            self.take_frame()
        } else {
            None
        };

        self.last_byte_at = Some(at);

        if self.discarding {
            trace!("discarding {} bytes after overflow", bytes.len());
            return Ok(completed);
        }

        if self.buf.len() + bytes.len() > MAX_ADU_SIZE {
            let dropped = self.buf.len() + bytes.len();
            self.buf.clear();
            self.discarding = true;
            return Err(RtuError::framing(format!(
                "frame exceeds {MAX_ADU_SIZE}-byte ADU limit ({dropped} bytes), discarding until silence"
            )));
        }

        self.buf.extend_from_slice(bytes);
        Ok(completed)
    }

    /// Observe silence at `now`: returns the completed frame if at least
    /// the minimum ADU is buffered and the inter-frame gap has elapsed.
    pub fn on_silence(&mut self, now: Instant) -> Option<Vec<u8>> {
        if self.gap_elapsed(now) {
            self.take_frame()
        } else {
            None
        }
    }

    /// Drop any partial frame, e.g. after a transport failure
    pub fn clear(&mut self) {
        self.buf.clear();
        self.last_byte_at = None;
        self.discarding = false;
    }

    fn gap_elapsed(&self, now: Instant) -> bool {
        match self.last_byte_at {
            Some(last) => now.saturating_duration_since(last) >= self.frame_gap,
            None => false,
        }
    }

    fn take_frame(&mut self) -> Option<Vec<u8>> {
        self.last_byte_at = None;
        if self.discarding {
            self.discarding = false;
            return None;
        }
        if self.buf.is_empty() {
            return None;
        }
        let run = self.buf.split().to_vec();
        if run.len() < MIN_ADU_SIZE {
            debug!("discarding {} bytes of line noise", run.len());
            return None;
        }
        Some(run)
    }
}

/// Wrap a reply PDU into an RTU ADU: slave address + PDU + CRC16 (little-endian)
pub fn encode_adu(slave_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + pdu.len() + CRC_LEN);
    frame.push(slave_id);
    frame.extend_from_slice(pdu);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Split a received ADU into slave address and PDU after CRC validation
pub fn decode_adu(frame: &[u8]) -> Result<(u8, &[u8])> {
    if frame.len() < MIN_ADU_SIZE {
        return Err(RtuError::framing(format!(
            "ADU too short: {} bytes",
            frame.len()
        )));
    }
    if frame.len() > MAX_ADU_SIZE {
        return Err(RtuError::framing(format!(
            "ADU too long: {} bytes",
            frame.len()
        )));
    }
    validate_trailing_crc(frame).map_err(|(expected, got)| RtuError::Crc { expected, got })?;
    Ok((frame[0], &frame[1..frame.len() - CRC_LEN]))
}

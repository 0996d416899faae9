//! In-memory Modbus data store
//!
//! Owns the four fixed-size tables (coils, discrete inputs, holding
//! registers, input registers) and exposes bounds-checked accessors. The
//! store is exclusively owned by the server loop; the protocol path mutates
//! it only through dispatched write requests, while the embedding
//! application publishes process values through the single-point setters.

use crate::constants::{
    DEFAULT_TABLE_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};
use crate::error::ExceptionCode;

/// Selector for the two single-bit tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitTable {
    /// Read/write discrete outputs (FC01 read, FC05/FC15 write)
    Coils,
    /// Read-only discrete inputs (FC02)
    DiscreteInputs,
}

/// Selector for the two 16-bit register tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordTable {
    /// Read/write registers (FC03 read, FC06/FC16 write)
    Holding,
    /// Read-only registers (FC04)
    Input,
}

/// The four data tables served by the slave
#[derive(Debug)]
pub struct DataStore {
    coils: Vec<bool>,
    discrete_inputs: Vec<bool>,
    holding_registers: Vec<u16>,
    input_registers: Vec<u16>,
}

/// Validate a start/count request against a table of `len` entries.
///
/// Count limits map to Illegal Data Value, range overflow to Illegal Data
/// Address. The range check runs first so an oversized read of a small
/// table reports the address fault the requester can act on.
fn check_range(
    len: usize,
    start: u16,
    count: usize,
    max_count: usize,
) -> Result<std::ops::Range<usize>, ExceptionCode> {
    if count == 0 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let start = start as usize;
    let end = start
        .checked_add(count)
        .ok_or(ExceptionCode::IllegalDataAddress)?;
    if end > len {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    if count > max_count {
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok(start..end)
}

impl DataStore {
    /// Create a store with `size` zero-initialized entries per table
    pub fn new(size: u16) -> Self {
        let size = size as usize;
        Self {
            coils: vec![false; size],
            discrete_inputs: vec![false; size],
            holding_registers: vec![0; size],
            input_registers: vec![0; size],
        }
    }

    /// Number of entries in each table
    pub fn size(&self) -> u16 {
        self.coils.len() as u16
    }

    fn bit_table(&self, table: BitTable) -> &[bool] {
        match table {
            BitTable::Coils => &self.coils,
            BitTable::DiscreteInputs => &self.discrete_inputs,
        }
    }

    fn word_table(&self, table: WordTable) -> &[u16] {
        match table {
            WordTable::Holding => &self.holding_registers,
            WordTable::Input => &self.input_registers,
        }
    }

    /// Read `count` bits starting at `start`
    pub fn read_bits(
        &self,
        table: BitTable,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, ExceptionCode> {
        let bits = self.bit_table(table);
        let range = check_range(bits.len(), start, count as usize, MAX_READ_COILS)?;
        Ok(bits[range].to_vec())
    }

    /// Write a run of bits starting at `start` (coils only on the protocol
    /// path; discrete inputs are writable for the process side)
    pub fn write_bits(
        &mut self,
        table: BitTable,
        start: u16,
        values: &[bool],
    ) -> Result<(), ExceptionCode> {
        let bits = match table {
            BitTable::Coils => &mut self.coils,
            BitTable::DiscreteInputs => &mut self.discrete_inputs,
        };
        let range = check_range(bits.len(), start, values.len(), MAX_WRITE_COILS)?;
        bits[range].copy_from_slice(values);
        Ok(())
    }

    /// Read `count` 16-bit words starting at `start`
    pub fn read_words(
        &self,
        table: WordTable,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ExceptionCode> {
        let words = self.word_table(table);
        let range = check_range(words.len(), start, count as usize, MAX_READ_REGISTERS)?;
        Ok(words[range].to_vec())
    }

    /// Write a run of 16-bit words starting at `start`
    pub fn write_words(
        &mut self,
        table: WordTable,
        start: u16,
        values: &[u16],
    ) -> Result<(), ExceptionCode> {
        let words = match table {
            WordTable::Holding => &mut self.holding_registers,
            WordTable::Input => &mut self.input_registers,
        };
        let range = check_range(words.len(), start, values.len(), MAX_WRITE_REGISTERS)?;
        words[range].copy_from_slice(values);
        Ok(())
    }

    // ========================================================================
    // Single-point process-side access
    // ========================================================================

    /// Set one coil
    pub fn set_coil(&mut self, address: u16, value: bool) -> Result<(), ExceptionCode> {
        self.write_bits(BitTable::Coils, address, &[value])
    }

    /// Set one discrete input
    pub fn set_discrete_input(&mut self, address: u16, value: bool) -> Result<(), ExceptionCode> {
        self.write_bits(BitTable::DiscreteInputs, address, &[value])
    }

    /// Set one holding register
    pub fn set_holding_register(&mut self, address: u16, value: u16) -> Result<(), ExceptionCode> {
        self.write_words(WordTable::Holding, address, &[value])
    }

    /// Set one input register
    pub fn set_input_register(&mut self, address: u16, value: u16) -> Result<(), ExceptionCode> {
        self.write_words(WordTable::Input, address, &[value])
    }

    /// Read one coil
    pub fn coil(&self, address: u16) -> Result<bool, ExceptionCode> {
        Ok(self.read_bits(BitTable::Coils, address, 1)?[0])
    }

    /// Read one holding register
    pub fn holding_register(&self, address: u16) -> Result<u16, ExceptionCode> {
        Ok(self.read_words(WordTable::Holding, address, 1)?[0])
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Bounds checking ==========

    #[test]
    fn test_read_past_end_is_illegal_data_address() {
        let store = DataStore::new(100);
        assert_eq!(
            store.read_words(WordTable::Holding, 0, 200),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            store.read_words(WordTable::Holding, 90, 11),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            store.read_bits(BitTable::Coils, 100, 1),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn test_read_at_table_boundary() {
        let store = DataStore::new(100);
        assert!(store.read_words(WordTable::Holding, 90, 10).is_ok());
        assert!(store.read_bits(BitTable::DiscreteInputs, 99, 1).is_ok());
    }

    #[test]
    fn test_zero_count_read_is_illegal_data_value() {
        let store = DataStore::new(100);
        assert_eq!(
            store.read_words(WordTable::Input, 0, 0),
            Err(ExceptionCode::IllegalDataValue)
        );
        assert_eq!(
            store.read_bits(BitTable::Coils, 0, 0),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn test_count_above_protocol_limit_is_illegal_data_value() {
        // Table large enough that the range itself would be valid
        let store = DataStore::new(3000);
        assert_eq!(
            store.read_bits(BitTable::Coils, 0, 2001),
            Err(ExceptionCode::IllegalDataValue)
        );
        assert_eq!(
            store.read_words(WordTable::Holding, 0, 126),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn test_start_near_u16_max_does_not_overflow() {
        let store = DataStore::new(100);
        assert_eq!(
            store.read_words(WordTable::Holding, u16::MAX, 2),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    // ========== Read/write round trips ==========

    #[test]
    fn test_word_write_then_read() {
        let mut store = DataStore::new(100);
        store
            .write_words(WordTable::Holding, 10, &[0x1234, 0xABCD])
            .unwrap();
        assert_eq!(
            store.read_words(WordTable::Holding, 10, 2).unwrap(),
            vec![0x1234, 0xABCD]
        );
        // Neighbours untouched
        assert_eq!(store.read_words(WordTable::Holding, 9, 1).unwrap(), vec![0]);
        assert_eq!(
            store.read_words(WordTable::Holding, 12, 1).unwrap(),
            vec![0]
        );
    }

    #[test]
    fn test_bit_write_then_read() {
        let mut store = DataStore::new(100);
        store
            .write_bits(BitTable::Coils, 4, &[true, false, true])
            .unwrap();
        assert_eq!(
            store.read_bits(BitTable::Coils, 4, 3).unwrap(),
            vec![true, false, true]
        );
    }

    #[test]
    fn test_tables_are_independent() {
        let mut store = DataStore::new(100);
        store.set_holding_register(0, 42).unwrap();
        store.set_coil(0, true).unwrap();

        assert_eq!(store.read_words(WordTable::Input, 0, 1).unwrap(), vec![0]);
        assert_eq!(
            store.read_bits(BitTable::DiscreteInputs, 0, 1).unwrap(),
            vec![false]
        );
    }

    #[test]
    fn test_empty_write_is_illegal_data_value() {
        let mut store = DataStore::new(100);
        assert_eq!(
            store.write_words(WordTable::Holding, 0, &[]),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn test_single_point_setters() {
        let mut store = DataStore::new(100);
        store.set_input_register(5, 777).unwrap();
        store.set_discrete_input(5, true).unwrap();

        assert_eq!(store.read_words(WordTable::Input, 5, 1).unwrap(), vec![777]);
        assert_eq!(
            store.read_bits(BitTable::DiscreteInputs, 5, 1).unwrap(),
            vec![true]
        );
        assert_eq!(
            store.set_input_register(100, 1),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn test_default_table_size() {
        let store = DataStore::default();
        assert_eq!(store.size(), 100);
    }
}

//! Persistent calibration record.
//!
//! The offsets found by calibration are kept in a small byte-addressed
//! non-volatile memory (typically the MCU's EEPROM) so the search does not have
//! to run on every boot.
//!
//! # Layout
//!
//! ```text
//! base + 0        signature   0xD0 while writing, 0xDD once complete
//! base + 1..13    offsets     6 × i16, big-endian, register order
//! base + 13..17   temperature f32 (°C), big-endian IEEE-754
//! ```
//!
//! The signature is written first as "pending" and switched to "committed" only
//! after every other byte has been written and read back, so a record
//! interrupted by a power loss is never loaded.

use crate::{axis::OffsetVector, temperature::within_drift};
use core::fmt::Debug;

/// Default start address of the record.
pub const BASE_ADDRESS: u16 = 15;
pub const SIGNATURE_PENDING: u8 = 0xD0;
pub const SIGNATURE_COMMITTED: u8 = 0xDD;
/// Bytes after the signature
pub const PAYLOAD_LEN: usize = 16;
/// Bytes in the whole record
pub const RECORD_LEN: usize = PAYLOAD_LEN + 1;
/// Write attempts per byte before giving up on the medium
pub const WRITE_ATTEMPTS: usize = 16;

/// Byte-addressed non-volatile memory.
pub trait Eeprom {
    type Error: Debug;

    fn read(&mut self, address: u16) -> Result<u8, Self::Error>;

    /// Write `value` at `address` (implementations may skip the write when the
    /// byte already holds `value`).
    fn update(&mut self, address: u16, value: u8) -> Result<(), Self::Error>;
}

impl<T: Eeprom> Eeprom for &mut T {
    type Error = T::Error;

    fn read(&mut self, address: u16) -> Result<u8, Self::Error> {
        (**self).read(address)
    }

    fn update(&mut self, address: u16, value: u8) -> Result<(), Self::Error> {
        (**self).update(address, value)
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum StoreError<E> {
    /// The medium reported an error
    Medium(E),
    /// A byte still read back wrong after [`WRITE_ATTEMPTS`] writes
    Verify { address: u16, expected: u8, found: u8 },
}

impl<E: Debug> Debug for StoreError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Medium(e) => f.debug_tuple("Medium").field(e).finish(),
            Self::Verify {
                address,
                expected,
                found,
            } => f
                .debug_struct("Verify")
                .field("address", address)
                .field("expected", expected)
                .field("found", found)
                .finish(),
        }
    }
}

/// Offsets and the die temperature they were found at.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationRecord {
    pub offsets: OffsetVector,
    pub temperature: f32,
}

impl CalibrationRecord {
    pub fn to_bytes(&self) -> [u8; PAYLOAD_LEN] {
        let mut data = [0u8; PAYLOAD_LEN];
        data[..12].copy_from_slice(&self.offsets.to_be_bytes());
        data[12..].copy_from_slice(&self.temperature.to_be_bytes());
        data
    }

    pub fn from_bytes(data: &[u8; PAYLOAD_LEN]) -> Self {
        let mut offsets = [0u8; 12];
        offsets.copy_from_slice(&data[..12]);
        let mut temperature = [0u8; 4];
        temperature.copy_from_slice(&data[12..]);
        Self {
            offsets: OffsetVector::from_be_bytes(offsets),
            temperature: f32::from_be_bytes(temperature),
        }
    }
}

pub struct CalibrationStore<E> {
    eeprom: E,
    base: u16,
}

impl<E> CalibrationStore<E>
where
    E: Eeprom,
{
    pub fn new(eeprom: E) -> Self {
        Self::with_base(eeprom, BASE_ADDRESS)
    }

    pub fn with_base(eeprom: E, base: u16) -> Self {
        Self { eeprom, base }
    }

    /// Returns the underlying memory, consuming the store.
    pub fn release(self) -> E {
        self.eeprom
    }

    /// Read the stored record, `None` unless it was committed.
    pub fn load(&mut self) -> Result<Option<CalibrationRecord>, StoreError<E::Error>> {
        let signature = self.eeprom.read(self.base).map_err(StoreError::Medium)?;
        if signature != SIGNATURE_COMMITTED {
            debug!("no calibration record (signature {:#x})", signature);
            return Ok(None);
        }

        let mut data = [0u8; PAYLOAD_LEN];
        for (address, byte) in (self.base + 1..).zip(data.iter_mut()) {
            *byte = self.eeprom.read(address).map_err(StoreError::Medium)?;
        }
        Ok(Some(CalibrationRecord::from_bytes(&data)))
    }

    /// Read the stored record if it was taken within `max_drift` °C of
    /// `temperature`.
    pub fn load_fresh(
        &mut self,
        temperature: f32,
        max_drift: f32,
    ) -> Result<Option<CalibrationRecord>, StoreError<E::Error>> {
        Ok(self.load()?.filter(|record| {
            let fresh = within_drift(record.temperature, temperature, max_drift);
            if !fresh {
                info!(
                    "stored calibration is stale (taken at {} C, now {} C)",
                    record.temperature,
                    temperature
                );
            }
            fresh
        }))
    }

    /// Write a new record.
    pub fn save(
        &mut self,
        temperature: f32,
        offsets: &OffsetVector,
    ) -> Result<(), StoreError<E::Error>> {
        let record = CalibrationRecord {
            offsets: *offsets,
            temperature,
        };
        self.write_verified(self.base, SIGNATURE_PENDING)?;
        for (address, byte) in (self.base + 1..).zip(record.to_bytes()) {
            self.write_verified(address, byte)?;
        }
        self.write_verified(self.base, SIGNATURE_COMMITTED)?;
        info!("calibration saved at {} C", temperature);
        Ok(())
    }

    fn write_verified(&mut self, address: u16, value: u8) -> Result<(), StoreError<E::Error>> {
        let mut found = 0;
        for _ in 0..WRITE_ATTEMPTS {
            self.eeprom.update(address, value).map_err(StoreError::Medium)?;
            found = self.eeprom.read(address).map_err(StoreError::Medium)?;
            if found == value {
                return Ok(());
            }
        }
        warn!(
            "eeprom byte {} reads {:#x} instead of {:#x}",
            address,
            found,
            value
        );
        Err(StoreError::Verify {
            address,
            expected: value,
            found,
        })
    }
}

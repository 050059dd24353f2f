#![cfg_attr(not(test), no_std)]

//! Power management for the boot stage.
//!
//! The boot code only needs to bring the core supply to a safe voltage before the
//! clocks go up and to switch the board off when there is nothing left to boot.
//! [PowerManager] is that surface, [axp152::Axp152] drives the X-Powers AXP152
//! over any [embedded_hal::i2c::I2c] bus.

// Must be first to share macros across crate
pub(crate) mod fmt;

pub mod axp152;

/// Regulated outputs of a PMIC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rail {
    Dcdc1,
    /// Core supply
    Dcdc2,
    Dcdc3,
    Dcdc4,
}

/// Power management chip as seen by boot code
pub trait PowerManager {
    type Error;

    /// Check that the expected chip answers
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Program `rail` to the nearest supported voltage not above `millivolts`.
    /// Requests outside the rail's range are clamped.
    fn set_voltage(&mut self, rail: Rail, millivolts: u16) -> Result<(), Self::Error>;

    /// Switch the board off. Returns once the supplies had time to drain.
    fn power_off(&mut self) -> Result<(), Self::Error>;
}

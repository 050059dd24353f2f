//! X-Powers AXP152

use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use thiserror::Error;

use crate::{PowerManager, Rail};

pub const I2C_ADDRESS: SevenBitAddress = 0x30;

/// Value of [Register::ChipVersion] on an AXP152
pub const CHIP_ID: u8 = 0x05;

/// Time given to the supplies to drain after power off
pub const POWER_OFF_DRAIN_MS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    ChipVersion = 0x03,
    Dcdc2Voltage = 0x23,
    Shutdown = 0x32,
}

/// Power off request bit of [Register::Shutdown]
pub const SHUTDOWN_POWER_OFF: u8 = 1 << 7;

pub const DCDC2_MIN_MV: u16 = 700;
pub const DCDC2_STEP_MV: u16 = 25;
pub const DCDC2_MAX_CODE: u8 = 63;

/// Register code for a DCDC2 voltage, clamped to 700..=2275 mV
pub const fn dcdc2_code(millivolts: u16) -> u8 {
    if millivolts <= DCDC2_MIN_MV {
        return 0;
    }
    let code = (millivolts - DCDC2_MIN_MV) / DCDC2_STEP_MV;
    if code > DCDC2_MAX_CODE as u16 {
        DCDC2_MAX_CODE
    } else {
        code as u8
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PmicError<E> {
    /// Error from the I2C bus
    #[error("I2c error: {0:?}")]
    I2c(E),
    /// Something other than an AXP152 answered
    #[error("Unexpected chip version {0:#04x}")]
    WrongChip(u8),
    /// The chip has no control over this rail
    #[error("Rail not supported")]
    UnsupportedRail,
}

#[derive(Debug)]
pub struct Axp152<I2C, D> {
    i2c: I2C,
    delay: D,
}

impl<I2C: I2c, D: DelayNs> Axp152<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Axp152 { i2c, delay }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    pub fn read_register(&mut self, register: Register) -> Result<u8, PmicError<I2C::Error>> {
        let mut value = [0];
        self.i2c
            .write_read(I2C_ADDRESS, &[register as u8], &mut value)
            .map_err(PmicError::I2c)?;
        Ok(value[0])
    }

    pub fn write_register(
        &mut self,
        register: Register,
        value: u8,
    ) -> Result<(), PmicError<I2C::Error>> {
        self.i2c
            .write(I2C_ADDRESS, &[register as u8, value])
            .map_err(PmicError::I2c)
    }
}

impl<I2C: I2c, D: DelayNs> PowerManager for Axp152<I2C, D> {
    type Error = PmicError<I2C::Error>;

    fn init(&mut self) -> Result<(), Self::Error> {
        let version = self.read_register(Register::ChipVersion)?;
        if version != CHIP_ID {
            error!("Unexpected PMIC version {:#x}", version);
            return Err(PmicError::WrongChip(version));
        }
        debug!("AXP152 found");
        Ok(())
    }

    fn set_voltage(&mut self, rail: Rail, millivolts: u16) -> Result<(), Self::Error> {
        if rail != Rail::Dcdc2 {
            return Err(PmicError::UnsupportedRail);
        }
        let code = dcdc2_code(millivolts);
        debug!("DCDC2 to {} mV, code {}", millivolts, code);
        self.write_register(Register::Dcdc2Voltage, code)
    }

    fn power_off(&mut self) -> Result<(), Self::Error> {
        let value = self.read_register(Register::Shutdown)?;
        self.write_register(Register::Shutdown, value | SHUTDOWN_POWER_OFF)?;
        info!("Power off");
        self.delay.delay_ms(POWER_OFF_DRAIN_MS);
        Ok(())
    }
}

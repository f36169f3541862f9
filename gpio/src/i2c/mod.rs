//! I2C transports.
//!
//! Drivers in this crate only need two kinds of transfer, matching the register framing of the
//! MCP23017: a plain write (register address followed by data bytes), and a write of the register
//! address followed by a read of N bytes. See [I2cBus].

mod hal;
mod raw;

use crate::GpioResult;
use std::fmt::Debug;
pub use hal::*;
pub use raw::*;

/// A byte-level I2C master.
///
/// Addresses are 7-bit. Implementations report a missing acknowledge as
/// [GpioError::Nack](crate::GpioError::Nack) and a stuck or stretched bus as
/// [GpioError::Timeout](crate::GpioError::Timeout).
pub trait I2cBus: Debug {
    /// Writes `bytes` to the device at `address` in a single transfer.
    fn write(&mut self, address: u8, bytes: &[u8]) -> GpioResult<()>;

    /// Writes `bytes` to the device at `address`, then reads `buffer.len()` bytes back.
    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> GpioResult<()>;
}

impl<T: I2cBus + ?Sized> I2cBus for &mut T {
    fn write(&mut self, address: u8, bytes: &[u8]) -> GpioResult<()> {
        (**self).write(address, bytes)
    }

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> GpioResult<()> {
        (**self).write_read(address, bytes, buffer)
    }
}

impl<T: I2cBus + ?Sized> I2cBus for Box<T> {
    fn write(&mut self, address: u8, bytes: &[u8]) -> GpioResult<()> {
        (**self).write(address, bytes)
    }

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> GpioResult<()> {
        (**self).write_read(address, bytes, buffer)
    }
}

//! MCP23017 16-bit I2C port expander.
//!
//! The chip has two 8-bit ports, A and B. Pins `0..=7` are port A bits `0..=7`, pins `8..=15` are
//! port B bits `0..=7`. Every operation is a whole-byte register transfer; single-pin operations
//! are read-modify-write sequences.
//!
//! The register map used here is the power-on one (`IOCON.BANK = 0`), where each port A register
//! is directly followed by its port B twin, and the register pointer auto-increments. That allows
//! reading or writing both ports in one transfer, see [Mcp23017::read_gpio_ab] and
//! [Mcp23017::write_gpio_ab].
//!
//! There is no locking: the driver is `!Sync`, and callers issuing interleaved read-modify-write
//! sequences from several places must serialize them themselves.
//!
//! # Sources
//!
//! - Microchip Technology Inc., [“MCP23017/MCP23S17 16-Bit I/O Expander with Serial
//!   Interface,”](https://ww1.microchip.com/downloads/en/devicedoc/20001952c.pdf) 2016.

mod gpio;

use crate::i2c::I2cBus;
use crate::{GpioError, GpioResult};
use bitvec::vec::BitVec;
use log::{debug, trace, warn};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicU8;

/// MCP23017 registers, addressed for port A. Port B registers are at `address + 1`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Register {
    /// I/O direction, `1` = input.
    Iodir = 0x00,
    /// Input polarity.
    Ipol = 0x02,
    /// Interrupt-on-change enable.
    Gpinten = 0x04,
    /// Default compare value for interrupt-on-change.
    Defval = 0x06,
    /// Interrupt-on-change control.
    Intcon = 0x08,
    /// Configuration. Shared between both ports.
    Iocon = 0x0A,
    /// Pull-up resistors (100 kΩ), `1` = enabled.
    Gppu = 0x0C,
    /// Interrupt flags.
    Intf = 0x0E,
    /// Port value captured at interrupt time.
    Intcap = 0x10,
    /// Port value. Writing it writes the output latch.
    Gpio = 0x12,
    /// Output latch.
    Olat = 0x14,
}

impl Register {
    /// The register address for the given port.
    pub fn address(self, port: Port) -> u8 {
        self as u8 + port as u8
    }
}

/// One of the two 8-bit ports.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Port {
    A = 0,
    B = 1,
}

/// Pin direction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinMode {
    Input,
    Output,
}

/// Driver for a single MCP23017.
///
/// All operations take `&self`; the bus is kept in a [RefCell] so that pin objects handed out
/// through [GpioDriver](crate::GpioDriver) can share the chip.
pub struct Mcp23017<B> {
    bus: RefCell<B>,
    address: u8,
    used_pins: BitVec<AtomicU8>,
}

impl<B: I2cBus> Mcp23017<B> {
    /// The fixed part of the bus address. The three chip-select bits (A2..A0) are ORed onto it.
    pub const BASE_ADDRESS: u8 = 0x20;

    /// The number of GPIO pins on the chip.
    pub const PIN_COUNT: usize = 16;

    /// Creates a driver for the expander with the given chip-select bits (`0..=7`).
    ///
    /// Nothing is sent to the chip until [Self::begin] is called.
    pub fn new(bus: B, selector: u8) -> Self {
        if selector > 0b111 {
            warn!("MCP23017 selector {} out of range, using {}", selector, selector & 0b111);
        }

        Mcp23017 {
            bus: RefCell::new(bus),
            address: Self::BASE_ADDRESS | (selector & 0b111),
            used_pins: BitVec::repeat(false, Self::PIN_COUNT),
        }
    }

    /// Configures both ports as inputs, which is also the power-on state.
    pub fn begin(&self) -> GpioResult<()> {
        debug!("Initializing MCP23017 @{:#04x}", self.address);
        for port in [Port::A, Port::B] {
            self.write_register(Register::Iodir.address(port), 0xFF)?;
        }
        Ok(())
    }

    /// The 7-bit bus address of the chip.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Borrows the underlying bus.
    ///
    /// # Panics
    /// If called while a transfer is in progress, which can't happen from a single thread.
    pub fn bus(&self) -> Ref<'_, B> {
        self.bus.borrow()
    }

    /// Mutably borrows the underlying bus.
    pub fn bus_mut(&self) -> RefMut<'_, B> {
        self.bus.borrow_mut()
    }

    /// Releases the underlying bus.
    pub fn release(self) -> B {
        self.bus.into_inner()
    }

    /// Reads a single register.
    pub fn read_register(&self, register: u8) -> GpioResult<u8> {
        let mut buffer = [0u8; 1];
        self.bus
            .borrow_mut()
            .write_read(self.address, &[register], &mut buffer)?;
        trace!("MCP23017 read  {:#04x} = {:08b}", register, buffer[0]);
        Ok(buffer[0])
    }

    /// Writes a single register.
    pub fn write_register(&self, register: u8, value: u8) -> GpioResult<()> {
        trace!("MCP23017 write {:#04x} = {:08b}", register, value);
        self.bus.borrow_mut().write(self.address, &[register, value])
    }

    /// Reads a port A register together with its port B twin, A in the low byte.
    pub fn read_register_pair(&self, register: Register) -> GpioResult<u16> {
        let mut buffer = [0u8; 2];
        self.bus
            .borrow_mut()
            .write_read(self.address, &[register.address(Port::A)], &mut buffer)?;
        let value = u16::from_le_bytes(buffer);
        trace!("MCP23017 read  {:?}AB = {:016b}", register, value);
        Ok(value)
    }

    /// Writes a port A register together with its port B twin, A from the low byte.
    pub fn write_register_pair(&self, register: Register, value: u16) -> GpioResult<()> {
        trace!("MCP23017 write {:?}AB = {:016b}", register, value);
        let [a, b] = value.to_le_bytes();
        self.bus
            .borrow_mut()
            .write(self.address, &[register.address(Port::A), a, b])
    }

    /// Splits a chip-relative pin index into its port and bit.
    pub fn split_pin(pin: u8) -> GpioResult<(Port, u8)> {
        match pin {
            0..=7 => Ok((Port::A, pin)),
            8..=15 => Ok((Port::B, pin - 8)),
            _ => Err(GpioError::InvalidPin(pin)),
        }
    }

    /// Sets or clears the pin's bit in `register`, reading the current value from `source`.
    fn update_bit(&self, source: Register, register: Register, pin: u8, set: bool) -> GpioResult<()> {
        let (port, bit) = Self::split_pin(pin)?;
        let mut value = self.read_register(source.address(port))?;
        if set {
            value |= 1 << bit;
        } else {
            value &= !(1 << bit);
        }
        self.write_register(register.address(port), value)
    }

    /// Sets the direction of a single pin.
    pub fn set_pin_mode(&self, pin: u8, mode: PinMode) -> GpioResult<()> {
        self.update_bit(Register::Iodir, Register::Iodir, pin, mode == PinMode::Input)
    }

    /// Drives an output pin high or low.
    ///
    /// The current value is taken from the output latch rather than the port, so that the other
    /// outputs keep their value even if they're loaded externally.
    pub fn digital_write(&self, pin: u8, value: bool) -> GpioResult<()> {
        self.update_bit(Register::Olat, Register::Gpio, pin, value)
    }

    /// Reads the level of a pin.
    pub fn digital_read(&self, pin: u8) -> GpioResult<bool> {
        let (port, bit) = Self::split_pin(pin)?;
        let value = self.read_register(Register::Gpio.address(port))?;
        Ok((value >> bit) & 1 != 0)
    }

    /// Enables or disables the internal pull-up of a pin.
    pub fn pull_up(&self, pin: u8, enabled: bool) -> GpioResult<()> {
        self.update_bit(Register::Gppu, Register::Gppu, pin, enabled)
    }

    /// Reads all 16 pins at once. Port A is in the low byte.
    pub fn read_gpio_ab(&self) -> GpioResult<u16> {
        self.read_register_pair(Register::Gpio)
    }

    /// Writes all 16 output latches at once. Port A is taken from the low byte.
    pub fn write_gpio_ab(&self, value: u16) -> GpioResult<()> {
        self.write_register_pair(Register::Gpio, value)
    }

    /// Replaces the bits selected by `mask` in a register pair, in a single read and a single write.
    pub fn update_register_pair(
        &self,
        source: Register,
        register: Register,
        mask: u16,
        bits: u16,
    ) -> GpioResult<()> {
        let value = self.read_register_pair(source)?;
        self.write_register_pair(register, (value & !mask) | (bits & mask))
    }
}

impl<B> Debug for Mcp23017<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mcp23017({:#04x})", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimTransfer, SimulatedMcp23017};

    fn expander() -> Mcp23017<SimulatedMcp23017> {
        let expander = Mcp23017::new(SimulatedMcp23017::new(0x20), 0);
        expander.begin().unwrap();
        expander
    }

    #[test]
    fn address_ors_selector() {
        let expander = Mcp23017::new(SimulatedMcp23017::new(0x25), 5);
        assert_eq!(expander.address(), 0x25);
        assert_eq!(Mcp23017::new(SimulatedMcp23017::new(0x27), 0xFF).address(), 0x27);
    }

    #[test]
    fn begin_sets_both_ports_to_inputs() {
        let expander = Mcp23017::new(SimulatedMcp23017::new(0x20), 0);
        expander.write_register_pair(Register::Iodir, 0).unwrap();
        expander.bus_mut().clear_log();

        expander.begin().unwrap();

        assert_eq!(
            expander.bus().log(),
            &[
                SimTransfer::Write { register: 0x00, data: vec![0xFF] },
                SimTransfer::Write { register: 0x01, data: vec![0xFF] },
            ]
        );
        assert_eq!(expander.read_register_pair(Register::Iodir).unwrap(), 0xFFFF);
    }

    #[test]
    fn register_addresses_pair_up() {
        assert_eq!(Register::Iodir.address(Port::B), 0x01);
        assert_eq!(Register::Gpio.address(Port::A), 0x12);
        assert_eq!(Register::Olat.address(Port::B), 0x15);
    }

    #[test]
    fn every_pin_round_trips() {
        let expander = expander();
        for pin in 0..16 {
            expander.set_pin_mode(pin, PinMode::Output).unwrap();
            expander.digital_write(pin, true).unwrap();
            assert!(expander.digital_read(pin).unwrap(), "pin {} high", pin);
            expander.digital_write(pin, false).unwrap();
            assert!(!expander.digital_read(pin).unwrap(), "pin {} low", pin);
        }
    }

    #[test]
    fn pin_mode_touches_only_its_bit() {
        let expander = expander();
        expander.set_pin_mode(3, PinMode::Output).unwrap();
        expander.set_pin_mode(12, PinMode::Output).unwrap();
        assert_eq!(expander.read_register(0x00).unwrap(), 0b1111_0111);
        assert_eq!(expander.read_register(0x01).unwrap(), 0b1110_1111);

        expander.set_pin_mode(3, PinMode::Input).unwrap();
        assert_eq!(expander.read_register(0x00).unwrap(), 0xFF);
    }

    #[test]
    fn digital_write_reads_latch_and_writes_port() {
        let expander = expander();
        expander.set_pin_mode(9, PinMode::Output).unwrap();
        expander.bus_mut().clear_log();

        expander.digital_write(9, true).unwrap();

        assert_eq!(
            expander.bus().log(),
            &[
                SimTransfer::Read { register: 0x15, len: 1 },
                SimTransfer::Write { register: 0x13, data: vec![0b10] },
            ]
        );
    }

    #[test]
    fn both_ports_round_trip() {
        let expander = expander();
        expander.write_register_pair(Register::Iodir, 0x0000).unwrap();
        for value in [0x0000, 0xFFFF, 0xA55A, 0x1234, 0x8001] {
            expander.write_gpio_ab(value).unwrap();
            assert_eq!(expander.read_gpio_ab().unwrap(), value);
        }
    }

    #[test]
    fn pull_up_reads_high() {
        let expander = expander();
        assert!(!expander.digital_read(4).unwrap());
        expander.pull_up(4, true).unwrap();
        assert!(expander.digital_read(4).unwrap());
        assert_eq!(expander.read_register(0x0C).unwrap(), 0b1_0000);
    }

    #[test]
    fn invalid_pins_are_rejected() {
        let expander = expander();
        assert_eq!(expander.set_pin_mode(16, PinMode::Output), Err(GpioError::InvalidPin(16)));
        assert_eq!(expander.digital_read(200), Err(GpioError::InvalidPin(200)));
        assert_eq!(expander.pull_up(16, true), Err(GpioError::InvalidPin(16)));
    }

    #[test]
    fn bus_errors_propagate() {
        let expander = expander();
        expander.bus_mut().fail_next(GpioError::Timeout);
        assert_eq!(expander.digital_write(0, true), Err(GpioError::Timeout));

        let wrong = Mcp23017::new(SimulatedMcp23017::new(0x20), 1);
        assert_eq!(wrong.begin(), Err(GpioError::Nack));
    }
}

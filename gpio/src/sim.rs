//! A simulated MCP23017, for running the drivers without hardware.
//!
//! [SimulatedMcp23017] implements [I2cBus] and models the parts of the chip the drivers use:
//! - 22 registers with the `IOCON.BANK = 0` layout and an auto-incrementing register pointer,
//! - writes to `GPIO` land in `OLAT`,
//! - reads of `GPIO` return `OLAT` for outputs, and for inputs the externally driven level, or
//!   the pull-up if nothing drives the pin (low otherwise),
//! - an optional HD44780 attached to some of the pins, which records what it latches on each
//!   falling edge of its E line.
//!
//! Every transfer is logged, and failures can be injected with [SimulatedMcp23017::fail_next].
//! [RecordingDelay] stands in for real waits next to it.

use crate::expander::{Port, Register};
use crate::i2c::I2cBus;
use crate::{GpioError, GpioResult};
use embedded_hal::delay::DelayNs;
use log::trace;

const REGISTER_COUNT: usize = 0x16;

/// A logged transfer. `register` is the register pointer at the start of the transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SimTransfer {
    Write { register: u8, data: Vec<u8> },
    Read { register: u8, len: usize },
}

/// A byte or nibble latched by the simulated display.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LcdLatch {
    /// Level of the RS line: `false` for commands, `true` for data.
    pub rs: bool,
    /// Value of the data lines, D0 (or D4 in 4-bit wiring) in the lowest bit.
    pub value: u8,
}

#[derive(Clone, Debug)]
struct LcdObserver {
    rs: u8,
    enable: u8,
    data: Vec<u8>,
    latches: Vec<LcdLatch>,
}

#[derive(Clone, Debug)]
pub struct SimulatedMcp23017 {
    address: u8,
    registers: [u8; REGISTER_COUNT],
    pointer: u8,
    external_driven: u16,
    external_levels: u16,
    log: Vec<SimTransfer>,
    failure: Option<GpioError>,
    lcd: Option<LcdObserver>,
}

impl SimulatedMcp23017 {
    /// Creates a simulated chip answering at the given 7-bit address, in its power-on state.
    pub fn new(address: u8) -> Self {
        let mut registers = [0u8; REGISTER_COUNT];
        registers[Register::Iodir.address(Port::A) as usize] = 0xFF;
        registers[Register::Iodir.address(Port::B) as usize] = 0xFF;

        SimulatedMcp23017 {
            address,
            registers,
            pointer: 0,
            external_driven: 0,
            external_levels: 0,
            log: Vec::new(),
            failure: None,
            lcd: None,
        }
    }

    /// Attaches a simulated HD44780 to the given pins. `data` lists D0..D7 (or D4..D7).
    pub fn attach_lcd(&mut self, rs: u8, enable: u8, data: &[u8]) {
        self.lcd = Some(LcdObserver {
            rs,
            enable,
            data: data.to_vec(),
            latches: Vec::new(),
        });
    }

    /// Everything the attached display has latched so far.
    pub fn lcd_latches(&self) -> &[LcdLatch] {
        self.lcd.as_ref().map_or(&[][..], |lcd| lcd.latches.as_slice())
    }

    pub fn clear_lcd_latches(&mut self) {
        if let Some(lcd) = &mut self.lcd {
            lcd.latches.clear();
        }
    }

    /// Drives an input pin from outside the chip, e.g. a pressed button pulling it low.
    pub fn set_external(&mut self, pin: u8, level: bool) {
        let bit = 1u16 << (pin & 0x0F);
        self.external_driven |= bit;
        if level {
            self.external_levels |= bit;
        } else {
            self.external_levels &= !bit;
        }
    }

    /// Stops driving a pin from outside, leaving it to its pull-up.
    pub fn release_external(&mut self, pin: u8) {
        self.external_driven &= !(1u16 << (pin & 0x0F));
    }

    /// Makes the next transfer fail with `error` without touching the registers.
    pub fn fail_next(&mut self, error: GpioError) {
        self.failure = Some(error);
    }

    pub fn log(&self) -> &[SimTransfer] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// The raw value of a register.
    pub fn register(&self, address: u8) -> u8 {
        self.registers[address as usize % REGISTER_COUNT]
    }

    fn pair(&self, register: Register) -> u16 {
        u16::from_le_bytes([
            self.registers[register.address(Port::A) as usize],
            self.registers[register.address(Port::B) as usize],
        ])
    }

    /// The levels seen on all 16 pins.
    pub fn pin_levels(&self) -> u16 {
        let inputs = self.pair(Register::Iodir);
        let outside = (self.external_levels & self.external_driven)
            | (self.pair(Register::Gppu) & !self.external_driven);
        (self.pair(Register::Olat) & !inputs) | (outside & inputs)
    }

    fn check(&mut self, address: u8) -> GpioResult<()> {
        if let Some(error) = self.failure.take() {
            return Err(error);
        }
        if address != self.address {
            return Err(GpioError::Nack);
        }
        Ok(())
    }

    fn advance(&mut self) {
        self.pointer = (self.pointer + 1) % REGISTER_COUNT as u8;
    }

    fn store(&mut self, value: u8) {
        let mut target = self.pointer;
        // Writes to the port go to the output latch
        if target == Register::Gpio.address(Port::A) || target == Register::Gpio.address(Port::B) {
            target += 2;
        }
        // IOCON is mirrored at both addresses
        if target == Register::Iocon.address(Port::A) || target == Register::Iocon.address(Port::B) {
            self.registers[Register::Iocon.address(Port::A) as usize] = value;
            self.registers[Register::Iocon.address(Port::B) as usize] = value;
        } else {
            self.registers[target as usize] = value;
        }
        self.advance();
    }

    fn load(&mut self) -> u8 {
        let value = if self.pointer == Register::Gpio.address(Port::A) {
            self.pin_levels().to_le_bytes()[0]
        } else if self.pointer == Register::Gpio.address(Port::B) {
            self.pin_levels().to_le_bytes()[1]
        } else {
            self.registers[self.pointer as usize]
        };
        self.advance();
        value
    }

    fn observe_lcd(&mut self, before: u16) {
        let after = self.pin_levels();
        let Some(lcd) = &mut self.lcd else { return };

        let enable = 1u16 << lcd.enable;
        if before & enable != 0 && after & enable == 0 {
            let value = lcd
                .data
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &pin)| if after & (1 << pin) != 0 { acc | (1 << i) } else { acc });
            let latch = LcdLatch { rs: after & (1 << lcd.rs) != 0, value };
            trace!("Simulated LCD latched {:?}", latch);
            lcd.latches.push(latch);
        }
    }
}

impl I2cBus for SimulatedMcp23017 {
    fn write(&mut self, address: u8, bytes: &[u8]) -> GpioResult<()> {
        self.check(address)?;

        let Some((&register, data)) = bytes.split_first() else {
            return Ok(());
        };
        self.pointer = register % REGISTER_COUNT as u8;
        // Pointer-only writes are the first half of a read, logged as the read itself
        if !data.is_empty() {
            self.log.push(SimTransfer::Write { register: self.pointer, data: data.to_vec() });
        }

        for &value in data {
            let before = self.pin_levels();
            self.store(value);
            self.observe_lcd(before);
        }
        Ok(())
    }

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> GpioResult<()> {
        self.write(address, bytes)?;
        self.log.push(SimTransfer::Read { register: self.pointer, len: buffer.len() });
        for byte in buffer.iter_mut() {
            *byte = self.load();
        }
        Ok(())
    }
}

/// A [DelayNs] that returns immediately and remembers every requested wait, in nanoseconds.
#[derive(Clone, Debug, Default)]
pub struct RecordingDelay {
    waits: Vec<u32>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> &[u32] {
        &self.waits
    }

    /// Sum of all waits, in nanoseconds.
    pub fn total_ns(&self) -> u64 {
        self.waits.iter().map(|&ns| ns as u64).sum()
    }

    pub fn clear(&mut self) {
        self.waits.clear();
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.waits.push(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.waits.push(us.saturating_mul(1_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.waits.push(ms.saturating_mul(1_000_000));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_auto_increments() {
        let mut sim = SimulatedMcp23017::new(0x20);
        sim.write(0x20, &[0x0C, 0xAA, 0x55]).unwrap();
        assert_eq!(sim.register(0x0C), 0xAA);
        assert_eq!(sim.register(0x0D), 0x55);

        let mut buffer = [0u8; 2];
        sim.write_read(0x20, &[0x0C], &mut buffer).unwrap();
        assert_eq!(buffer, [0xAA, 0x55]);
    }

    #[test]
    fn gpio_write_lands_in_latch() {
        let mut sim = SimulatedMcp23017::new(0x20);
        sim.write(0x20, &[0x12, 0x0F]).unwrap();
        assert_eq!(sim.register(0x14), 0x0F);
        assert_eq!(sim.register(0x12), 0x00);
        // Still inputs, nothing drives them
        assert_eq!(sim.pin_levels(), 0);
    }

    #[test]
    fn inputs_follow_pull_ups_and_outside() {
        let mut sim = SimulatedMcp23017::new(0x20);
        sim.write(0x20, &[0x0C, 0b11]).unwrap();
        sim.set_external(1, false);
        sim.set_external(2, true);
        assert_eq!(sim.pin_levels(), 0b101);

        sim.release_external(1);
        assert_eq!(sim.pin_levels(), 0b111);
    }

    #[test]
    fn failures_and_wrong_address() {
        let mut sim = SimulatedMcp23017::new(0x20);
        sim.fail_next(GpioError::Timeout);
        assert_eq!(sim.write(0x20, &[0x00, 0x00]), Err(GpioError::Timeout));
        assert_eq!(sim.register(0x00), 0xFF);
        assert_eq!(sim.write(0x21, &[0x00, 0x00]), Err(GpioError::Nack));
        assert!(sim.log().is_empty());
    }

    #[test]
    fn lcd_latches_on_falling_edge() {
        let mut sim = SimulatedMcp23017::new(0x20);
        sim.attach_lcd(15, 13, &[12, 11, 10, 9]);
        sim.write(0x20, &[0x00, 0x00, 0x00]).unwrap();

        let data = (1 << 12) | (1 << 9) | (1 << 15);
        for value in [data, data | (1 << 13), data] {
            let [a, b] = u16::to_le_bytes(value);
            sim.write(0x20, &[0x12, a, b]).unwrap();
        }

        assert_eq!(sim.lcd_latches(), &[LcdLatch { rs: true, value: 0b1001 }]);
    }

    #[test]
    fn recording_delay_keeps_units() {
        let mut delay = RecordingDelay::new();
        delay.delay_ms(50);
        delay.delay_us(150);
        delay.delay_ns(450);
        assert_eq!(delay.waits(), &[50_000_000, 150_000, 450]);
        assert_eq!(delay.total_ns(), 50_150_450);
    }
}

use crate::expander::{Mcp23017, PinMode, Register};
use crate::i2c::I2cBus;
use crate::lcd::hd44780::driver::{
    LcdInterface, COMMAND_SETTLE_US, ENABLE_PULSE_US, ENABLE_SETUP_US,
};
use crate::lcd::hd44780::flags::DataLength;
use crate::{GpioError, GpioResult};
use embedded_hal::delay::DelayNs;
use log::{debug, trace};
use std::fmt::{Debug, Formatter};

/// Pin assignment of a 4-bit HD44780 hooked up to an MCP23017, plus the buttons and RGB
/// backlight found on the common 16x2 "RGB LCD shield".
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ShieldPins {
    pub rs: u8,
    /// Leave as `None` if RW is tied to ground; reads are unavailable then.
    pub rw: Option<u8>,
    pub enable: u8,
    /// D4, D5, D6, D7.
    pub data: [u8; 4],
    /// Select, right, down, up, left; each shorts its pin to ground when pressed.
    pub buttons: [u8; 5],
    /// Red, green, blue; active low.
    pub backlight: [u8; 3],
}

impl Default for ShieldPins {
    fn default() -> Self {
        ShieldPins {
            rs: 15,
            rw: Some(14),
            enable: 13,
            data: [12, 11, 10, 9],
            buttons: [0, 1, 2, 3, 4],
            backlight: [6, 7, 8],
        }
    }
}

impl ShieldPins {
    fn data_mask(&self) -> u16 {
        self.data.iter().fold(0u16, |acc, &pin| acc | (1 << pin))
    }

    fn validate(&self) -> GpioResult<()> {
        let pins = [self.rs, self.enable]
            .into_iter()
            .chain(self.rw)
            .chain(self.data)
            .chain(self.buttons)
            .chain(self.backlight);
        for pin in pins {
            if pin > 15 {
                return Err(GpioError::InvalidPin(pin));
            }
        }
        Ok(())
    }
}

/// Backlight color, one bit per LED: red (bit 0), green (bit 1), blue (bit 2).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Backlight(pub u8);

impl Backlight {
    pub const OFF: Backlight = Backlight(0x0);
    pub const RED: Backlight = Backlight(0x1);
    pub const GREEN: Backlight = Backlight(0x2);
    pub const YELLOW: Backlight = Backlight(0x3);
    pub const BLUE: Backlight = Backlight(0x4);
    pub const VIOLET: Backlight = Backlight(0x5);
    pub const TEAL: Backlight = Backlight(0x6);
    pub const WHITE: Backlight = Backlight(0x7);
}

/// Button state bitmask; a set bit means the button is pressed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Buttons(pub u8);

impl Buttons {
    pub const SELECT: u8 = 0x01;
    pub const RIGHT: u8 = 0x02;
    pub const DOWN: u8 = 0x04;
    pub const UP: u8 = 0x08;
    pub const LEFT: u8 = 0x10;
    /// All five buttons.
    pub const ALL: u8 = 0x1F;

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_pressed(self, button: u8) -> bool {
        self.0 & button != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Drives the controller through an MCP23017, in 4-bit mode.
///
/// Single-pin expander writes are a read and a write transfer each, so nibbles are sent by
/// reading both ports once and then writing the whole 16-bit image once per E edge.
pub struct ExpanderLcdInterface<'a, B> {
    expander: &'a Mcp23017<B>,
    pins: ShieldPins,
    rs: bool,
}

impl<'a, B: I2cBus> ExpanderLcdInterface<'a, B> {
    pub fn new(expander: &'a Mcp23017<B>, pins: ShieldPins) -> GpioResult<Self> {
        pins.validate()?;
        Ok(ExpanderLcdInterface {
            expander,
            pins,
            rs: false,
        })
    }

    pub fn expander(&self) -> &'a Mcp23017<B> {
        self.expander
    }

    pub fn pins(&self) -> &ShieldPins {
        &self.pins
    }

    /// Applies RS, RW = write and E to a port image.
    fn control_bits(&self, mut out: u16, enable: bool) -> u16 {
        out = set_bit(out, self.pins.rs, self.rs);
        if let Some(rw) = self.pins.rw {
            out = set_bit(out, rw, false);
        }
        set_bit(out, self.pins.enable, enable)
    }
}

fn set_bit(value: u16, pin: u8, set: bool) -> u16 {
    if set {
        value | (1 << pin)
    } else {
        value & !(1 << pin)
    }
}

impl<B> Debug for ExpanderLcdInterface<'_, B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExpanderLcdInterface({:?}, {:?})", self.expander, self.pins)
    }
}

impl<B: I2cBus> LcdInterface for ExpanderLcdInterface<'_, B> {
    fn data_length(&self) -> DataLength {
        DataLength::FourBit
    }

    fn prepare(&mut self) -> GpioResult<()> {
        debug!("Configuring {:?}", self);
        let expander = self.expander;
        expander.begin()?;

        for pin in self.pins.backlight {
            expander.set_pin_mode(pin, PinMode::Output)?;
        }
        self.set_backlight(Backlight::WHITE)?;

        if let Some(rw) = self.pins.rw {
            expander.set_pin_mode(rw, PinMode::Output)?;
        }
        expander.set_pin_mode(self.pins.rs, PinMode::Output)?;
        expander.set_pin_mode(self.pins.enable, PinMode::Output)?;

        for pin in self.pins.data {
            expander.set_pin_mode(pin, PinMode::Output)?;
        }
        for pin in self.pins.buttons {
            expander.set_pin_mode(pin, PinMode::Input)?;
            expander.pull_up(pin, true)?;
        }
        Ok(())
    }

    fn idle(&mut self) -> GpioResult<()> {
        self.rs = false;
        let out = self.expander.read_gpio_ab()?;
        self.expander.write_gpio_ab(self.control_bits(out, false))
    }

    fn select_register(&mut self, rs: bool) -> GpioResult<()> {
        // Applied together with the data lines in write_bits
        self.rs = rs;
        Ok(())
    }

    fn write_bits(&mut self, value: u8, delay: &mut dyn DelayNs) -> GpioResult<()> {
        trace!("Writing nibble: {:04b}, RS: {}", value & 0x0F, self.rs);

        let mut out = self.expander.read_gpio_ab()?;
        for (i, &pin) in self.pins.data.iter().enumerate() {
            out = set_bit(out, pin, (value >> i) & 1 != 0);
        }

        // Make sure enable is low
        out = self.control_bits(out, false);
        self.expander.write_gpio_ab(out)?;
        delay.delay_us(ENABLE_SETUP_US);

        out = set_bit(out, self.pins.enable, true);
        self.expander.write_gpio_ab(out)?;
        delay.delay_us(ENABLE_PULSE_US);

        out = set_bit(out, self.pins.enable, false);
        self.expander.write_gpio_ab(out)?;
        delay.delay_us(COMMAND_SETTLE_US);

        Ok(())
    }

    fn read_byte(&mut self, rs: bool, delay: &mut dyn DelayNs) -> GpioResult<u8> {
        let Some(rw) = self.pins.rw else {
            return Err(GpioError::NotSupported);
        };
        let expander = self.expander;
        let data_mask = self.pins.data_mask();

        expander.update_register_pair(Register::Iodir, Register::Iodir, data_mask, 0xFFFF)?;

        let mut out = expander.read_register_pair(Register::Olat)?;
        out = set_bit(out, self.pins.rs, rs);
        out = set_bit(out, rw, true);
        out = set_bit(out, self.pins.enable, false);
        expander.write_gpio_ab(out)?;
        delay.delay_us(ENABLE_SETUP_US);

        let mut data = 0u8;
        for _ in 0..2 {
            expander.write_gpio_ab(set_bit(out, self.pins.enable, true))?;
            delay.delay_us(ENABLE_PULSE_US);
            let levels = expander.read_gpio_ab()?;
            expander.write_gpio_ab(out)?;
            delay.delay_us(ENABLE_PULSE_US);

            let nibble = self
                .pins
                .data
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &pin)| if levels & (1 << pin) != 0 { acc | (1 << i) } else { acc });
            data = (data << 4) | nibble;
        }

        // RW back to write before the data lines are driven again
        expander.write_gpio_ab(set_bit(out, rw, false))?;
        expander.update_register_pair(Register::Iodir, Register::Iodir, data_mask, 0)?;
        self.rs = rs;

        trace!("Read data: {:08b}, RS: {}", data, rs);

        Ok(data)
    }

    fn read_buttons(&mut self) -> GpioResult<Buttons> {
        // Pressed buttons pull their pin low
        let mut reply = Buttons::ALL;
        for (i, &pin) in self.pins.buttons.iter().enumerate() {
            if self.expander.digital_read(pin)? {
                reply &= !(1 << i);
            }
        }
        Ok(Buttons(reply))
    }

    fn set_backlight(&mut self, color: Backlight) -> GpioResult<()> {
        for (i, &pin) in self.pins.backlight.iter().enumerate() {
            let lit = (color.0 >> i) & 1 != 0;
            self.expander.digital_write(pin, !lit)?;
        }
        Ok(())
    }
}

mod expander;
mod gpio;

use crate::lcd::hd44780::flags::{ControlFlags, DataLength, EntryFlags, FunctionFlags};
use crate::{GpioError, GpioResult};
use embedded_hal::delay::DelayNs;
pub use expander::*;
pub use gpio::*;
use std::fmt::Debug;

/// The raw HD44780 command set.
///
/// Each command is a single byte sent with RS low; the highest set bit selects the command and
/// the bits below it are its arguments.
pub trait HD44780Driver: Debug {
    /// Runs the power-on initialization sequence, see [CharLcd](super::CharLcd) for details.
    fn init(&mut self, columns: u8, lines: u8, font: super::Font) -> GpioResult<()>;

    /// Clears the display and sets the cursor to the home position.
    fn clear_display(&mut self) -> GpioResult<()> {
        self.send_command(0b00000001)
    }

    /// Sets the cursor to the home position.
    fn return_home(&mut self) -> GpioResult<()> {
        self.send_command(0b00000010)
    }

    /// Sets the display to the specified entry mode.
    fn set_entry_mode(&mut self, entry: EntryFlags) -> GpioResult<()> {
        self.send_command(entry.command())
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    fn set_display_control(&mut self, control: ControlFlags) -> GpioResult<()> {
        self.send_command(control.command())
    }

    /// Moves the cursor or shifts the display, without changing DDRAM.
    fn cursor_shift(&mut self, display_shift: bool, direction: CursorDirection) -> GpioResult<()> {
        let mut command = 0b00010000;
        if display_shift {
            command |= 0b00001000;
        }
        if direction == CursorDirection::Right {
            command |= 0b00000100;
        }
        self.send_command(command)
    }

    /// Sets the interface width, number of lines and font.
    fn function_set(&mut self, function: FunctionFlags) -> GpioResult<()> {
        self.send_command(function.command())
    }

    /// Sets the CGRAM address.
    fn set_cgram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > 0b00111111 {
            return Err(GpioError::InvalidArgument);
        }
        let command = 0b01000000 | address;
        self.send_command(command)
    }

    /// Sets the DDRAM address.
    fn set_ddram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > 0b01111111 {
            return Err(GpioError::InvalidArgument);
        }
        let command = 0b10000000 | address;
        self.send_command(command)
    }

    /// Reads the busy flag and address counter.
    fn get_busy_flag_and_address(&mut self) -> GpioResult<(bool, u8)> {
        let command = self.read_command()?;
        let busy_flag = command & 0b10000000 != 0;
        let address = command & 0b01111111;
        Ok((busy_flag, address))
    }

    // Low-level commands
    // These raw commands are used by the high-level functions above.

    /// Sends a command to the HD44780 controller.
    /// Sets the RS pin to 0 (command).
    fn send_command(&mut self, command: u8) -> GpioResult<()>;

    /// Sends data to the HD44780 controller.
    /// Sets the RS pin to 1 (data).
    fn send_data(&mut self, data: u8) -> GpioResult<()>;

    /// Reads the busy flag and address counter.
    /// Sets the RS pin to 0 (command).
    ///
    /// Returns both in a single u8, for easier usage use [Self::get_busy_flag_and_address], which
    /// uses this function internally.
    fn read_command(&mut self) -> GpioResult<u8>;

    /// Reads data from the HD44780 controller.
    /// Sets the RS pin to 1 (data).
    fn read_data(&mut self) -> GpioResult<u8>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing/reading data.
    Left,
    /// Moves the cursor to the right after writing/reading data.
    Right,
}

/// How bits physically reach the controller.
///
/// Chosen once, when constructing [CharLcd](super::CharLcd). Implementations own the pin
/// assignment and the enable-pulse timing; everything above works in whole commands.
pub trait LcdInterface: Debug {
    /// Width of the data bus this interface drives.
    fn data_length(&self) -> DataLength;

    /// Sets up pin directions. Called once at the start of initialization.
    fn prepare(&mut self) -> GpioResult<()>;

    /// Drives RS, RW (if wired) and E low.
    fn idle(&mut self) -> GpioResult<()>;

    /// Selects the command (`false`) or data (`true`) register for the following writes, and puts
    /// RW (if wired) in write mode.
    fn select_register(&mut self, rs: bool) -> GpioResult<()>;

    /// Places the low 4 or 8 bits of `value` on the data lines and pulses E.
    ///
    /// E goes low, high for at least 450 ns, then low again, followed by a settle time long enough
    /// for most commands (37 µs).
    fn write_bits(&mut self, value: u8, delay: &mut dyn DelayNs) -> GpioResult<()>;

    /// Reads a full byte from the command (`false`) or data (`true`) register.
    ///
    /// # Errors
    /// - `GpioError::NotSupported` if the RW line isn't wired.
    fn read_byte(&mut self, _rs: bool, _delay: &mut dyn DelayNs) -> GpioResult<u8> {
        Err(GpioError::NotSupported)
    }

    /// Reads the button bitmask, see [Buttons].
    ///
    /// # Errors
    /// - `GpioError::NotSupported` if the interface has no buttons.
    fn read_buttons(&mut self) -> GpioResult<Buttons> {
        Err(GpioError::NotSupported)
    }

    /// Sets the backlight color.
    ///
    /// # Errors
    /// - `GpioError::NotSupported` if the interface has no backlight control.
    fn set_backlight(&mut self, _color: Backlight) -> GpioResult<()> {
        Err(GpioError::NotSupported)
    }
}

/// Enable pulse shared by the interfaces: E low, high, low.
pub(crate) const ENABLE_SETUP_US: u32 = 1;
pub(crate) const ENABLE_PULSE_US: u32 = 1;
pub(crate) const COMMAND_SETTLE_US: u32 = 100;

use crate::expander::Mcp23017;
use crate::i2c::I2cBus;
use crate::lcd::hd44780::driver::{
    Backlight, Buttons, CursorDirection, ExpanderLcdInterface, HD44780Driver, LcdInterface,
    ShieldPins,
};
use crate::lcd::hd44780::flags::{
    ControlFlags, DataLength, DisplayFlags, EntryFlags, Font, FunctionFlags,
};
use crate::{GpioError, GpioResult};
use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};
use std::fmt::{Debug, Formatter};

/// Lifecycle of a [CharLcd].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LcdState {
    /// No interface bound yet. This is the state before a [CharLcd] exists; [CharLcd::new] leaves
    /// it as soon as the interface is captured, so a constructed display never reports it.
    Uninitialized,
    /// Pins are assigned, but the controller is in an unknown state until [HD44780Driver::init]
    /// completes.
    Initializing,
    /// The controller is in the requested mode and accepts commands.
    Ready,
}

/// A character LCD driven by an HD44780-compatible controller.
///
/// # Initialization
///
/// After power-on (or a host reset without a display reset) the controller can be in 8-bit mode,
/// 4-bit mode, or halfway through a 4-bit transfer. [HD44780Driver::init] forces a known state:
///
/// 1. wait 50 ms for the supply to settle,
/// 2. send "8-bit mode" (`0x3` on D7..D4) three times, waiting 4.5 ms, 1.5 ms and 150 µs,
/// 3. in 4-bit wiring, send `0x2` to switch to 4-bit mode,
/// 4. function set (lines, font), display on, clear, entry mode left-to-right.
///
/// The order and waits are mandated by the datasheet; changing them breaks some controllers.
///
/// # Flags
///
/// Display control and entry mode flags are kept in a [DisplayFlags] snapshot. Every toggle
/// builds a new snapshot, sends it, and only then stores it.
pub struct CharLcd<'a, D> {
    interface: Box<dyn LcdInterface + 'a>,
    delay: D,
    flags: DisplayFlags,
    state: LcdState,
    columns: u8,
    lines: u8,
    current_line: u8,
}

impl<'a, D: DelayNs> CharLcd<'a, D> {
    /// Waits after each "8-bit mode" wake-up nibble, in microseconds.
    pub const WAKE_DELAYS_US: [u32; 3] = [4_500, 1_500, 150];

    /// Wait after power-on before the first command.
    pub const POWER_ON_DELAY_MS: u32 = 50;

    /// Wait after clear and home, which take much longer than other commands.
    pub const SLOW_COMMAND_DELAY_US: u32 = 2_000;

    /// DDRAM address of the first column of each line.
    pub const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

    pub fn new(interface: Box<dyn LcdInterface + 'a>, delay: D) -> Self {
        let lcd = CharLcd {
            flags: DisplayFlags::new(interface.data_length()),
            interface,
            delay,
            state: LcdState::Initializing,
            columns: 0,
            lines: 1,
            current_line: 0,
        };
        trace!("{:?} created", lcd);
        lcd
    }

    /// A display on the RGB LCD shield: HD44780 behind an MCP23017 with the default [ShieldPins].
    pub fn shield<B: I2cBus>(expander: &'a Mcp23017<B>, delay: D) -> GpioResult<Self> {
        let interface = ExpanderLcdInterface::new(expander, ShieldPins::default())?;
        Ok(Self::new(Box::new(interface), delay))
    }

    pub fn state(&self) -> LcdState {
        self.state
    }

    pub fn flags(&self) -> DisplayFlags {
        self.flags
    }

    pub fn columns(&self) -> u8 {
        self.columns
    }

    pub fn lines(&self) -> u8 {
        self.lines
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// The line last selected with [Self::set_cursor].
    pub fn current_line(&self) -> u8 {
        self.current_line
    }

    fn ensure_ready(&self) -> GpioResult<()> {
        match self.state {
            LcdState::Ready => Ok(()),
            _ => Err(GpioError::NotInitialized),
        }
    }

    fn send(&mut self, value: u8, rs: bool) -> GpioResult<()> {
        trace!("Sending data: {:08b}, RS: {}", value, rs);

        self.interface.select_register(rs)?;
        match self.interface.data_length() {
            DataLength::EightBit => self.interface.write_bits(value, &mut self.delay),
            DataLength::FourBit => {
                self.interface.write_bits(value >> 4, &mut self.delay)?;
                self.interface.write_bits(value & 0x0F, &mut self.delay)
            }
        }
    }

    // High-level commands

    /// Clears the display and moves the cursor to the top left.
    pub fn clear(&mut self) -> GpioResult<()> {
        self.ensure_ready()?;
        self.clear_display()
    }

    /// Moves the cursor to the top left and undoes any display shift.
    pub fn home(&mut self) -> GpioResult<()> {
        self.ensure_ready()?;
        self.return_home()
    }

    /// Moves the cursor to `column` on `row`, both counted from 0.
    ///
    /// Rows past the last line are clamped to the last line.
    ///
    /// # Errors
    /// - `GpioError::NotInitialized` before [HD44780Driver::init].
    /// - `GpioError::InvalidArgument` if the resulting DDRAM address is past `0x7F`, e.g. column 45
    ///   on row 3. Nothing is sent and [Self::current_line] is left unchanged.
    pub fn set_cursor(&mut self, column: u8, row: u8) -> GpioResult<()> {
        self.ensure_ready()?;

        let mut row = row;
        if row >= self.lines {
            warn!("Row {} out of range, clamping to {}", row, self.lines - 1);
            row = self.lines - 1;
        }
        let address = column.saturating_add(Self::ROW_OFFSETS[row as usize]);

        self.set_ddram_address(address)?;
        self.current_line = row;
        Ok(())
    }

    fn update_control(&mut self, update: impl FnOnce(ControlFlags) -> ControlFlags) -> GpioResult<()> {
        self.ensure_ready()?;
        let flags = self.flags.with_control(update(self.flags.control));
        self.set_display_control(flags.control)?;
        self.flags = flags;
        Ok(())
    }

    fn update_entry(&mut self, update: impl FnOnce(EntryFlags) -> EntryFlags) -> GpioResult<()> {
        self.ensure_ready()?;
        let flags = self.flags.with_entry(update(self.flags.entry));
        self.set_entry_mode(flags.entry)?;
        self.flags = flags;
        Ok(())
    }

    /// Turns the display on. DDRAM contents are kept while it's off.
    pub fn display(&mut self) -> GpioResult<()> {
        self.update_control(|control| ControlFlags { display: true, ..control })
    }

    /// Turns the display off quickly, without clearing it.
    pub fn no_display(&mut self) -> GpioResult<()> {
        self.update_control(|control| ControlFlags { display: false, ..control })
    }

    /// Shows the underline cursor.
    pub fn cursor(&mut self) -> GpioResult<()> {
        self.update_control(|control| ControlFlags { cursor: true, ..control })
    }

    pub fn no_cursor(&mut self) -> GpioResult<()> {
        self.update_control(|control| ControlFlags { cursor: false, ..control })
    }

    /// Blinks the character under the cursor.
    pub fn blink(&mut self) -> GpioResult<()> {
        self.update_control(|control| ControlFlags { blink: true, ..control })
    }

    pub fn no_blink(&mut self) -> GpioResult<()> {
        self.update_control(|control| ControlFlags { blink: false, ..control })
    }

    /// Shifts the whole display one position left, without changing DDRAM.
    pub fn scroll_display_left(&mut self) -> GpioResult<()> {
        self.ensure_ready()?;
        self.cursor_shift(true, CursorDirection::Left)
    }

    /// Shifts the whole display one position right, without changing DDRAM.
    pub fn scroll_display_right(&mut self) -> GpioResult<()> {
        self.ensure_ready()?;
        self.cursor_shift(true, CursorDirection::Right)
    }

    /// Text flows from left to right.
    pub fn left_to_right(&mut self) -> GpioResult<()> {
        self.update_entry(|entry| EntryFlags { direction: CursorDirection::Right, ..entry })
    }

    /// Text flows from right to left.
    pub fn right_to_left(&mut self) -> GpioResult<()> {
        self.update_entry(|entry| EntryFlags { direction: CursorDirection::Left, ..entry })
    }

    /// Shifts the display on every character instead of moving the cursor, which right-justifies
    /// text at the cursor.
    pub fn autoscroll(&mut self) -> GpioResult<()> {
        self.update_entry(|entry| EntryFlags { shift: true, ..entry })
    }

    pub fn no_autoscroll(&mut self) -> GpioResult<()> {
        self.update_entry(|entry| EntryFlags { shift: false, ..entry })
    }

    /// Defines one of the 8 custom glyphs (`location` `0..=7`, higher bits are ignored).
    ///
    /// Each byte of `charmap` is one pixel row, top first, using the low 5 bits. The glyph is then
    /// printed by writing the byte `location`.
    ///
    /// Leaves the cursor at the top left, since CGRAM writes move the address counter.
    pub fn create_char(&mut self, location: u8, charmap: &[u8; 8]) -> GpioResult<()> {
        self.ensure_ready()?;
        let location = location & 0x7;
        debug!("Defining glyph {}", location);

        self.set_cgram_address(location << 3)?;
        for &row in charmap {
            self.send_data(row)?;
        }
        self.set_ddram_address(0)
    }

    /// Writes a character code at the cursor.
    pub fn write(&mut self, value: u8) -> GpioResult<()> {
        self.ensure_ready()?;
        self.send_data(value)
    }

    /// Writes the bytes of `text` at the cursor; returns how many were written.
    ///
    /// The controller's character ROM is mostly ASCII, so non-ASCII text comes out garbled.
    pub fn print(&mut self, text: &str) -> GpioResult<usize> {
        for byte in text.bytes() {
            self.write(byte)?;
        }
        Ok(text.len())
    }

    /// Reads the button bitmask, pressed buttons set.
    pub fn read_buttons(&mut self) -> GpioResult<Buttons> {
        self.ensure_ready()?;
        self.interface.read_buttons()
    }

    pub fn set_backlight(&mut self, color: Backlight) -> GpioResult<()> {
        self.ensure_ready()?;
        self.interface.set_backlight(color)
    }
}

impl<D> Debug for CharLcd<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CharLcd({:?}, {:?})", self.interface, self.state)
    }
}

impl<D: DelayNs> HD44780Driver for CharLcd<'_, D> {
    fn init(&mut self, columns: u8, lines: u8, font: Font) -> GpioResult<()> {
        self.state = LcdState::Initializing;
        debug!("Initializing {:?}: {}x{}", self.interface, columns, lines);

        self.interface.prepare()?;

        let lines = match lines {
            0 => {
                warn!("0 lines requested, using 1");
                1
            }
            1..=4 => lines,
            _ => {
                warn!("{} lines requested, the controller addresses 4 at most", lines);
                4
            }
        };

        let mut function = FunctionFlags {
            data_length: self.interface.data_length(),
            two_lines: false,
            font: Font::Dots5x8,
        };
        if lines > 1 {
            function.two_lines = true;
        } else if font == Font::Dots5x10 {
            // Only single-line displays have the taller font
            function.font = Font::Dots5x10;
        }

        self.columns = columns;
        self.lines = lines;
        self.current_line = 0;

        self.delay.delay_ms(Self::POWER_ON_DELAY_MS);

        // Pull RS, RW and E low to begin commands
        self.interface.idle()?;

        // Put the controller into 8-bit mode first, whatever state it's in
        match function.data_length {
            DataLength::FourBit => {
                for wait in Self::WAKE_DELAYS_US {
                    self.interface.write_bits(0x03, &mut self.delay)?;
                    self.delay.delay_us(wait);
                }
                // Now switch to 4-bit
                self.interface.write_bits(0x02, &mut self.delay)?;
            }
            DataLength::EightBit => {
                for wait in Self::WAKE_DELAYS_US {
                    self.send_command(function.command())?;
                    self.delay.delay_us(wait);
                }
            }
        }
        debug!("Controller synchronized");

        self.function_set(function)?;
        self.flags = self.flags.with_function(function);

        let control = ControlFlags {
            display: true,
            cursor: false,
            blink: false,
        };
        self.set_display_control(control)?;
        self.flags = self.flags.with_control(control);

        self.clear_display()?;

        let entry = EntryFlags {
            direction: CursorDirection::Right,
            shift: false,
        };
        self.set_entry_mode(entry)?;
        self.flags = self.flags.with_entry(entry);

        self.state = LcdState::Ready;
        debug!("{:?} ready", self);
        Ok(())
    }

    fn clear_display(&mut self) -> GpioResult<()> {
        self.send_command(0b00000001)?;
        self.delay.delay_us(Self::SLOW_COMMAND_DELAY_US);
        Ok(())
    }

    fn return_home(&mut self) -> GpioResult<()> {
        self.send_command(0b00000010)?;
        self.delay.delay_us(Self::SLOW_COMMAND_DELAY_US);
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> GpioResult<()> {
        self.send(command, false)
    }

    fn send_data(&mut self, data: u8) -> GpioResult<()> {
        self.send(data, true)
    }

    fn read_command(&mut self) -> GpioResult<u8> {
        self.interface.read_byte(false, &mut self.delay)
    }

    fn read_data(&mut self) -> GpioResult<u8> {
        self.interface.read_byte(true, &mut self.delay)
    }
}

impl<D: DelayNs> std::fmt::Write for CharLcd<'_, D> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.print(s).map(drop).map_err(|_| std::fmt::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{LcdLatch, RecordingDelay, SimulatedMcp23017};
    use crate::lcd::hd44780::GpioLcdInterface;
    use crate::GpioDriver;
    use std::fmt::Write;

    fn expander() -> Mcp23017<SimulatedMcp23017> {
        let mut sim = SimulatedMcp23017::new(0x20);
        sim.attach_lcd(15, 13, &[12, 11, 10, 9]);
        Mcp23017::new(sim, 0)
    }

    fn ready(expander: &Mcp23017<SimulatedMcp23017>, lines: u8) -> CharLcd<'_, RecordingDelay> {
        let mut lcd = CharLcd::shield(expander, RecordingDelay::new()).unwrap();
        lcd.init(16, lines, Font::Dots5x8).unwrap();
        expander.bus_mut().clear_lcd_latches();
        lcd
    }

    /// Joins nibble pairs, high nibble first.
    fn bytes(latches: &[LcdLatch]) -> Vec<(bool, u8)> {
        latches
            .chunks(2)
            .map(|pair| (pair[0].rs, (pair[0].value << 4) | pair[1].value))
            .collect()
    }

    fn commands(expander: &Mcp23017<SimulatedMcp23017>) -> Vec<u8> {
        bytes(expander.bus().lcd_latches())
            .into_iter()
            .map(|(rs, byte)| {
                assert!(!rs);
                byte
            })
            .collect()
    }

    #[test]
    fn init_sequence() {
        let expander = expander();
        let mut lcd = CharLcd::shield(&expander, RecordingDelay::new()).unwrap();
        assert_eq!(lcd.state(), LcdState::Initializing);

        lcd.init(16, 2, Font::Dots5x8).unwrap();
        assert_eq!(lcd.state(), LcdState::Ready);

        let bus = expander.bus();
        let latches = bus.lcd_latches();
        assert!(latches.iter().all(|latch| !latch.rs));

        let wake: Vec<u8> = latches[..4].iter().map(|latch| latch.value).collect();
        assert_eq!(wake, [0x3, 0x3, 0x3, 0x2]);
        assert_eq!(
            bytes(&latches[4..]),
            [(false, 0x28), (false, 0x0C), (false, 0x01), (false, 0x06)]
        );

        let flags = lcd.flags();
        assert!(flags.function.two_lines);
        assert!(flags.control.display);
        assert!(!flags.control.cursor);
        assert_eq!(flags.entry, EntryFlags::default());
    }

    #[test]
    fn init_waits() {
        let expander = expander();
        let mut lcd = CharLcd::shield(&expander, RecordingDelay::new()).unwrap();
        lcd.init(20, 4, Font::Dots5x8).unwrap();

        let long: Vec<u32> = lcd
            .delay()
            .waits()
            .iter()
            .copied()
            .filter(|&ns| ns >= 150_000)
            .collect();
        assert_eq!(long, [50_000_000, 4_500_000, 1_500_000, 150_000, 2_000_000]);
    }

    #[test]
    fn single_line_keeps_tall_font() {
        let expander = expander();
        let mut lcd = CharLcd::shield(&expander, RecordingDelay::new()).unwrap();
        lcd.init(16, 1, Font::Dots5x10).unwrap();
        assert_eq!(commands(&expander)[2], 0x24);

        let expander = self::expander();
        let mut lcd = CharLcd::shield(&expander, RecordingDelay::new()).unwrap();
        lcd.init(16, 2, Font::Dots5x10).unwrap();
        assert_eq!(lcd.flags().function.font, Font::Dots5x8);
    }

    #[test]
    fn lines_are_clamped() {
        let expander = expander();
        let mut lcd = CharLcd::shield(&expander, RecordingDelay::new()).unwrap();
        lcd.init(16, 0, Font::Dots5x8).unwrap();
        assert_eq!(lcd.lines(), 1);

        lcd.init(20, 9, Font::Dots5x8).unwrap();
        assert_eq!(lcd.lines(), 4);
        assert_eq!(lcd.columns(), 20);
    }

    #[test]
    fn commands_need_init() {
        let expander = expander();
        let mut lcd = CharLcd::shield(&expander, RecordingDelay::new()).unwrap();
        assert_eq!(lcd.state(), LcdState::Initializing);

        assert_eq!(lcd.clear(), Err(GpioError::NotInitialized));
        assert_eq!(lcd.set_cursor(0, 0), Err(GpioError::NotInitialized));
        assert_eq!(lcd.print("hi"), Err(GpioError::NotInitialized));
        assert_eq!(lcd.read_buttons(), Err(GpioError::NotInitialized));
        assert!(expander.bus().log().is_empty());
    }

    #[test]
    fn set_cursor_addresses() {
        let expander = expander();
        let mut lcd = ready(&expander, 4);

        lcd.set_cursor(0, 0).unwrap();
        lcd.set_cursor(5, 1).unwrap();
        lcd.set_cursor(0, 2).unwrap();
        lcd.set_cursor(0, 3).unwrap();
        assert_eq!(lcd.current_line(), 3);
        assert_eq!(commands(&expander), [0x80, 0xC5, 0x94, 0xD4]);
    }

    #[test]
    fn set_cursor_rejects_address_overflow() {
        let expander = expander();
        let mut lcd = ready(&expander, 4);
        lcd.set_cursor(0, 1).unwrap();
        expander.bus_mut().clear_lcd_latches();

        assert_eq!(lcd.set_cursor(45, 3), Err(GpioError::InvalidArgument));
        assert_eq!(lcd.current_line(), 1);
        assert!(expander.bus().lcd_latches().is_empty());
    }

    #[test]
    fn set_cursor_clamps_row() {
        let expander = expander();
        let mut lcd = ready(&expander, 2);

        lcd.set_cursor(3, 2).unwrap();
        lcd.set_cursor(3, 7).unwrap();
        assert_eq!(lcd.current_line(), 1);
        assert_eq!(commands(&expander), [0xC3, 0xC3]);
    }

    #[test]
    fn toggles_send_full_flags() {
        let expander = expander();
        let mut lcd = ready(&expander, 2);

        lcd.cursor().unwrap();
        lcd.blink().unwrap();
        lcd.no_display().unwrap();
        lcd.no_cursor().unwrap();
        lcd.display().unwrap();
        lcd.no_blink().unwrap();
        assert_eq!(commands(&expander), [0x0E, 0x0F, 0x0B, 0x09, 0x0D, 0x0C]);

        expander.bus_mut().clear_lcd_latches();
        lcd.right_to_left().unwrap();
        lcd.autoscroll().unwrap();
        lcd.left_to_right().unwrap();
        lcd.no_autoscroll().unwrap();
        lcd.scroll_display_left().unwrap();
        lcd.scroll_display_right().unwrap();
        assert_eq!(commands(&expander), [0x04, 0x05, 0x07, 0x06, 0x18, 0x1C]);
    }

    #[test]
    fn failed_command_keeps_flags() {
        let expander = expander();
        let mut lcd = ready(&expander, 2);
        let before = lcd.flags();

        expander.bus_mut().fail_next(GpioError::Timeout);
        assert_eq!(lcd.cursor(), Err(GpioError::Timeout));
        assert_eq!(lcd.flags(), before);

        lcd.cursor().unwrap();
        assert!(lcd.flags().control.cursor);
    }

    #[test]
    fn create_char_sends_eight_rows() {
        let expander = expander();
        let mut lcd = ready(&expander, 2);
        let heart = [0x00, 0x0A, 0x1F, 0x1F, 0x0E, 0x04, 0x00, 0x00];

        lcd.create_char(9, &heart).unwrap();

        let sent = bytes(expander.bus().lcd_latches());
        assert_eq!(sent.len(), 10);
        assert_eq!(sent[0], (false, 0x48));
        let rows: Vec<u8> = sent[1..9]
            .iter()
            .map(|&(rs, byte)| {
                assert!(rs);
                byte
            })
            .collect();
        assert_eq!(rows, heart);
        assert_eq!(sent[9], (false, 0x80));
    }

    #[test]
    fn print_sends_data() {
        let expander = expander();
        let mut lcd = ready(&expander, 2);

        assert_eq!(lcd.print("Hi").unwrap(), 2);
        write!(lcd, "{}", 7).unwrap();
        lcd.write(0).unwrap();

        assert_eq!(
            bytes(expander.bus().lcd_latches()),
            [(true, b'H'), (true, b'i'), (true, b'7'), (true, 0)]
        );
    }

    #[test]
    fn buttons() {
        let expander = expander();
        let mut lcd = ready(&expander, 2);

        assert_eq!(lcd.read_buttons().unwrap(), Buttons(0x00));

        for pin in 0..5 {
            expander.bus_mut().set_external(pin, false);
        }
        assert_eq!(lcd.read_buttons().unwrap(), Buttons(Buttons::ALL));

        for pin in 0..5 {
            expander.bus_mut().release_external(pin);
        }
        expander.bus_mut().set_external(3, false);
        let buttons = lcd.read_buttons().unwrap();
        assert!(buttons.is_pressed(Buttons::UP));
        assert!(!buttons.is_pressed(Buttons::SELECT));
    }

    #[test]
    fn backlight_is_active_low() {
        let expander = expander();
        let mut lcd = ready(&expander, 2);

        // Prepared as white: all three LEDs on
        assert_eq!(expander.bus().pin_levels() & 0x1C0, 0);

        lcd.set_backlight(Backlight::RED).unwrap();
        assert_eq!(expander.bus().pin_levels() & 0x1C0, 0x180);

        lcd.set_backlight(Backlight::OFF).unwrap();
        assert_eq!(expander.bus().pin_levels() & 0x1C0, 0x1C0);
    }

    #[test]
    fn busy_flag_and_address() {
        let expander = expander();
        let mut lcd = ready(&expander, 2);

        // D7 high on both nibbles
        expander.bus_mut().set_external(9, true);
        for pin in [10, 11, 12] {
            expander.bus_mut().set_external(pin, false);
        }
        assert_eq!(lcd.get_busy_flag_and_address().unwrap(), (true, 0x08));

        // Data lines are driven again
        assert_eq!(expander.bus().register(0x01) & 0b0001_1110, 0);
        lcd.print("x").unwrap();
    }

    #[test]
    fn errors_propagate() {
        let mut sim = SimulatedMcp23017::new(0x21);
        sim.attach_lcd(15, 13, &[12, 11, 10, 9]);
        let expander = Mcp23017::new(sim, 0);
        let mut lcd = CharLcd::shield(&expander, RecordingDelay::new()).unwrap();

        assert_eq!(lcd.init(16, 2, Font::Dots5x8), Err(GpioError::Nack));
        assert_eq!(lcd.state(), LcdState::Initializing);
    }

    #[test]
    fn invalid_shield_pins() {
        let expander = expander();
        let pins = ShieldPins { enable: 16, ..ShieldPins::default() };
        assert_eq!(
            ExpanderLcdInterface::new(&expander, pins).map(drop),
            Err(GpioError::InvalidPin(16))
        );
    }

    #[test]
    fn gpio_interface_over_expander_pins() {
        let expander = expander();
        expander.begin().unwrap();

        let mut pin_e = expander.get_pin(13).unwrap();
        let mut pin_rs = expander.get_pin(15).unwrap();
        let mut data = expander.get_pin_bus([12, 11, 10, 9]).unwrap();
        let pin_e = pin_e.as_output().unwrap();
        let pin_rs = pin_rs.as_output().unwrap();

        let interface = GpioLcdInterface::new_4bit(&*pin_e, None, &*pin_rs, &mut *data);
        let mut lcd = CharLcd::new(Box::new(interface), RecordingDelay::new());
        lcd.init(16, 2, Font::Dots5x8).unwrap();
        lcd.print("A").unwrap();

        let bus = expander.bus();
        let latches = bus.lcd_latches();
        assert_eq!(latches.len(), 4 + 10);
        assert_eq!(
            bytes(&latches[4..]),
            [(false, 0x28), (false, 0x0C), (false, 0x01), (false, 0x06), (true, b'A')]
        );

        // No RW line, no reads
        drop(bus);
        assert_eq!(lcd.read_data(), Err(GpioError::NotSupported));
        assert_eq!(lcd.read_buttons(), Err(GpioError::NotSupported));
    }

    #[test]
    fn eight_bit_sends_whole_bytes() {
        let mut sim = SimulatedMcp23017::new(0x20);
        sim.attach_lcd(15, 13, &[0, 1, 2, 3, 4, 5, 6, 7]);
        let expander = Mcp23017::new(sim, 0);
        expander.begin().unwrap();

        let mut pin_e = expander.get_pin(13).unwrap();
        let mut pin_rs = expander.get_pin(15).unwrap();
        let mut data = expander.get_pin_bus([0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        let pin_e = pin_e.as_output().unwrap();
        let pin_rs = pin_rs.as_output().unwrap();

        let interface = GpioLcdInterface::new_8bit(&*pin_e, None, &*pin_rs, &mut *data);
        let mut lcd = CharLcd::new(Box::new(interface), RecordingDelay::new());
        lcd.init(16, 2, Font::Dots5x8).unwrap();
        assert_eq!(lcd.flags().function.data_length, DataLength::EightBit);
        lcd.print("Z").unwrap();

        let latched: Vec<(bool, u8)> = expander
            .bus()
            .lcd_latches()
            .iter()
            .map(|latch| (latch.rs, latch.value))
            .collect();
        // Three function sets wake the controller, the fourth configures it
        assert_eq!(
            latched,
            [
                (false, 0x38),
                (false, 0x38),
                (false, 0x38),
                (false, 0x38),
                (false, 0x0C),
                (false, 0x01),
                (false, 0x06),
                (true, b'Z'),
            ]
        );

        let long: Vec<u32> = lcd
            .delay()
            .waits()
            .iter()
            .copied()
            .filter(|&ns| ns >= 150_000)
            .collect();
        assert_eq!(long, [50_000_000, 4_500_000, 1_500_000, 150_000, 2_000_000]);
    }
}

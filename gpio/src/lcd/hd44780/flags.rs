use crate::lcd::hd44780::driver::CursorDirection;

/// Width of the data bus between the host and the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataLength {
    /// D4..D7 only; every byte is sent as two nibbles, high nibble first.
    FourBit,
    /// D0..D7.
    EightBit,
}

/// Character font.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Font {
    #[default]
    Dots5x8,
    /// Only available on single-line displays.
    Dots5x10,
}

/// Flags sent with the function set command (`001DNF??`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FunctionFlags {
    pub data_length: DataLength,
    pub two_lines: bool,
    pub font: Font,
}

impl FunctionFlags {
    pub const COMMAND: u8 = 0b0010_0000;
    pub const EIGHT_BIT: u8 = 0b0001_0000;
    pub const TWO_LINES: u8 = 0b0000_1000;
    pub const DOTS_5X10: u8 = 0b0000_0100;

    pub fn command(self) -> u8 {
        let mut command = Self::COMMAND;
        if self.data_length == DataLength::EightBit {
            command |= Self::EIGHT_BIT;
        }
        if self.two_lines {
            command |= Self::TWO_LINES;
        }
        if self.font == Font::Dots5x10 {
            command |= Self::DOTS_5X10;
        }
        command
    }
}

/// Flags sent with the display control command (`00001DCB`).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ControlFlags {
    pub display: bool,
    pub cursor: bool,
    pub blink: bool,
}

impl ControlFlags {
    pub const COMMAND: u8 = 0b0000_1000;
    pub const DISPLAY_ON: u8 = 0b0000_0100;
    pub const CURSOR_ON: u8 = 0b0000_0010;
    pub const BLINK_ON: u8 = 0b0000_0001;

    pub fn command(self) -> u8 {
        let mut command = Self::COMMAND;
        if self.display {
            command |= Self::DISPLAY_ON;
        }
        if self.cursor {
            command |= Self::CURSOR_ON;
        }
        if self.blink {
            command |= Self::BLINK_ON;
        }
        command
    }
}

/// Flags sent with the entry mode command (`000001IS`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EntryFlags {
    /// Where the cursor moves after each character.
    /// [CursorDirection::Right] is left-to-right text.
    pub direction: CursorDirection,
    /// Shift the whole display instead of moving the cursor ("autoscroll").
    pub shift: bool,
}

impl EntryFlags {
    pub const COMMAND: u8 = 0b0000_0100;
    pub const INCREMENT: u8 = 0b0000_0010;
    pub const SHIFT: u8 = 0b0000_0001;

    pub fn command(self) -> u8 {
        let mut command = Self::COMMAND;
        if self.direction == CursorDirection::Right {
            command |= Self::INCREMENT;
        }
        if self.shift {
            command |= Self::SHIFT;
        }
        command
    }
}

impl Default for EntryFlags {
    fn default() -> Self {
        EntryFlags {
            direction: CursorDirection::Right,
            shift: false,
        }
    }
}

/// Snapshot of everything the controller was told through flag commands.
///
/// Never mutated in place: every change builds a new snapshot, which is only stored after the
/// corresponding command was sent successfully.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DisplayFlags {
    pub function: FunctionFlags,
    pub control: ControlFlags,
    pub entry: EntryFlags,
}

impl DisplayFlags {
    /// The controller's reset state for the given bus width: one line, 5x8 font, display off,
    /// left-to-right without shift.
    pub fn new(data_length: DataLength) -> Self {
        DisplayFlags {
            function: FunctionFlags {
                data_length,
                two_lines: false,
                font: Font::Dots5x8,
            },
            control: ControlFlags::default(),
            entry: EntryFlags::default(),
        }
    }

    pub fn with_function(self, function: FunctionFlags) -> Self {
        DisplayFlags { function, ..self }
    }

    pub fn with_control(self, control: ControlFlags) -> Self {
        DisplayFlags { control, ..self }
    }

    pub fn with_entry(self, entry: EntryFlags) -> Self {
        DisplayFlags { entry, ..self }
    }
}

//! HD44780 character LCD module.
//!
//! The driver is split in three levels:
//! - [CharLcd]: the high-level, Arduino-style API (clear, cursor, toggles, custom glyphs, text),
//!   keeping the controller flags as a [DisplayFlags] snapshot,
//! - [HD44780Driver]: the raw command set, implemented by [CharLcd],
//! - [LcdInterface]: how bits reach the controller: directly through GPIO pins
//!   ([GpioLcdInterface]) or through an MCP23017 port expander ([ExpanderLcdInterface]).
//!
//! # Sources
//!
//! - Hitachi, [“HD44780U (LCD-II) Dot Matrix Liquid Crystal Display Controller/Driver,”](https://www.sparkfun.com/datasheets/LCD/HD44780.pdf)
//!   figures 23 and 24 (pages 45–46) for the initialization sequences.

mod char_lcd;
pub mod driver;
mod flags;

pub use char_lcd::*;
pub use driver::*;
pub use flags::*;

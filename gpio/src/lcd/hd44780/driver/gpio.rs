use crate::lcd::hd44780::driver::{
    LcdInterface, COMMAND_SETTLE_US, ENABLE_PULSE_US, ENABLE_SETUP_US,
};
use crate::lcd::hd44780::flags::DataLength;
use crate::{GpioBus, GpioError, GpioOutput, GpioResult};
use embedded_hal::delay::DelayNs;
use log::trace;

#[derive(Debug)]
pub enum GpioLcdBus<'a> {
    Bus8Bit(&'a mut dyn GpioBus<8>),
    Bus4Bit(&'a mut dyn GpioBus<4>),
}

impl GpioLcdBus<'_> {
    pub fn is_8bit(&self) -> bool {
        matches!(self, GpioLcdBus::Bus8Bit(_))
    }

    pub fn is_4bit(&self) -> bool {
        matches!(self, GpioLcdBus::Bus4Bit(_))
    }
}

/// Drives the controller through individual GPIO pins, one pin write at a time.
///
/// Works with any [GpioDriver](crate::GpioDriver), including the MCP23017 one. The RW pin is
/// optional; without it the controller can only be written to.
#[derive(Debug)]
pub struct GpioLcdInterface<'a> {
    pin_e: &'a dyn GpioOutput,
    pin_rw: Option<&'a dyn GpioOutput>,
    pin_rs: &'a dyn GpioOutput,
    data_bus: GpioLcdBus<'a>,
}

impl<'a> GpioLcdInterface<'a> {
    pub fn new_4bit(
        pin_e: &'a dyn GpioOutput,
        pin_rw: Option<&'a dyn GpioOutput>,
        pin_rs: &'a dyn GpioOutput,
        data_bus: &'a mut dyn GpioBus<4>,
    ) -> Self {
        GpioLcdInterface {
            pin_e,
            pin_rw,
            pin_rs,
            data_bus: GpioLcdBus::Bus4Bit(data_bus),
        }
    }

    pub fn new_8bit(
        pin_e: &'a dyn GpioOutput,
        pin_rw: Option<&'a dyn GpioOutput>,
        pin_rs: &'a dyn GpioOutput,
        data_bus: &'a mut dyn GpioBus<8>,
    ) -> Self {
        GpioLcdInterface {
            pin_e,
            pin_rw,
            pin_rs,
            data_bus: GpioLcdBus::Bus8Bit(data_bus),
        }
    }

    fn pulse_e(pin: &dyn GpioOutput, delay: &mut dyn DelayNs) -> GpioResult<()> {
        pin.write(false)?;
        delay.delay_us(ENABLE_SETUP_US);
        pin.write(true)?;
        delay.delay_us(ENABLE_PULSE_US);
        pin.write(false)?;
        delay.delay_us(COMMAND_SETTLE_US);
        Ok(())
    }

    /// Raises E, samples the bus through `sample`, and lowers E again.
    fn strobe_read<T>(
        pin_e: &dyn GpioOutput,
        delay: &mut dyn DelayNs,
        sample: impl FnOnce() -> GpioResult<T>,
    ) -> GpioResult<T> {
        pin_e.write(true)?;
        delay.delay_us(ENABLE_PULSE_US);
        let value = sample()?;
        pin_e.write(false)?;
        delay.delay_us(ENABLE_PULSE_US);
        Ok(value)
    }
}

impl LcdInterface for GpioLcdInterface<'_> {
    fn data_length(&self) -> DataLength {
        if self.data_bus.is_8bit() {
            DataLength::EightBit
        } else {
            DataLength::FourBit
        }
    }

    fn prepare(&mut self) -> GpioResult<()> {
        // The pins were handed over as outputs already, only the data bus direction is ours
        match &mut self.data_bus {
            GpioLcdBus::Bus8Bit(bus) => bus.as_output().map(drop),
            GpioLcdBus::Bus4Bit(bus) => bus.as_output().map(drop),
        }
    }

    fn idle(&mut self) -> GpioResult<()> {
        self.pin_rs.write(false)?;
        self.pin_e.write(false)?;
        if let Some(rw) = self.pin_rw {
            rw.write(false)?;
        }
        Ok(())
    }

    fn select_register(&mut self, rs: bool) -> GpioResult<()> {
        self.pin_rs.write(rs)?;

        // Set RW pin to write
        if let Some(rw) = self.pin_rw {
            rw.write(false)?;
        }
        Ok(())
    }

    fn write_bits(&mut self, value: u8, delay: &mut dyn DelayNs) -> GpioResult<()> {
        match &mut self.data_bus {
            GpioLcdBus::Bus8Bit(bus) => {
                let bus = bus.as_output()?;
                trace!("Writing byte: {:08b}", value);
                bus.write_byte(value)?;
            }
            GpioLcdBus::Bus4Bit(bus) => {
                let bus = bus.as_output()?;
                trace!("Writing nibble: {:04b}", value & 0x0F);
                bus.write_nibble(value & 0x0F)?;
            }
        }
        Self::pulse_e(self.pin_e, delay)
    }

    fn read_byte(&mut self, rs: bool, delay: &mut dyn DelayNs) -> GpioResult<u8> {
        let Some(rw) = self.pin_rw else {
            return Err(GpioError::NotSupported);
        };

        let data = match &mut self.data_bus {
            GpioLcdBus::Bus8Bit(bus) => {
                let input = bus.as_input()?;

                self.pin_rs.write(rs)?;
                rw.write(true)?;
                delay.delay_us(ENABLE_SETUP_US);

                Self::strobe_read(self.pin_e, delay, || input.read_byte())?
            }
            GpioLcdBus::Bus4Bit(bus) => {
                let input = bus.as_input()?;

                self.pin_rs.write(rs)?;
                rw.write(true)?;
                delay.delay_us(ENABLE_SETUP_US);

                let high_nibble = Self::strobe_read(self.pin_e, delay, || input.read_nibble())?;
                let low_nibble = Self::strobe_read(self.pin_e, delay, || input.read_nibble())?;

                (high_nibble << 4) | low_nibble
            }
        };

        // Set RW pin back to write, before the bus is driven again
        rw.write(false)?;

        trace!("Read data: {:08b}, RS: {}", data, rs);

        Ok(data)
    }
}

use crate::expander::{Mcp23017, PinMode, Register};
use crate::i2c::I2cBus;
use crate::{
    GpioActiveLevel, GpioBias, GpioBus, GpioBusInput, GpioBusOutput, GpioDriver, GpioError,
    GpioInput, GpioOutput, GpioPin, GpioResult,
};
use log::debug;
use std::fmt::{Debug, Formatter};

/// Exposes the expander pins through the generic GPIO traits, so anything written against
/// [GpioDriver] (e.g. [GpioLcdInterface](crate::lcd::hd44780::GpioLcdInterface)) can run over I2C.
///
/// Each pin access is a separate bus transfer, so this is much slower than batching through
/// [Mcp23017::write_gpio_ab].
impl<B: I2cBus> GpioDriver for Mcp23017<B> {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidPin(index.min(u8::MAX as usize) as u8));
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.used_pins.set_aliased(index, true);

        debug!("Using pin {} on {:?}", index, self);

        Ok(Box::new(Mcp23017Pin {
            driver: self,
            pin: index as u8,
            active_level: GpioActiveLevel::High,
            bias: GpioBias::None,
        }))
    }

    fn get_pin_bus<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> GpioResult<Box<dyn GpioBus<N> + '_>> {
        let n = self.count()?;

        if let Some(&index) = indices.iter().find(|&&index| index >= n) {
            return Err(GpioError::InvalidPin(index.min(u8::MAX as usize) as u8));
        }

        if indices.iter().any(|&index| self.used_pins[index]) {
            return Err(GpioError::AlreadyInUse);
        }

        for index in indices {
            self.used_pins.set_aliased(index, true);
        }

        debug!("Using pin bus {:?} on {:?}", indices, self);

        Ok(Box::new(Mcp23017Bus {
            driver: self,
            pins: indices.map(|index| index as u8),
            bias: GpioBias::None,
        }))
    }
}

fn check_bias(bias: GpioBias) -> GpioResult<()> {
    match bias {
        GpioBias::PullDown => Err(GpioError::NotSupported),
        _ => Ok(()),
    }
}

struct Mcp23017Pin<'a, B> {
    driver: &'a Mcp23017<B>,
    pin: u8,
    active_level: GpioActiveLevel,
    bias: GpioBias,
}

impl<B> Debug for Mcp23017Pin<'_, B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin)
    }
}

impl<B: I2cBus> GpioPin for Mcp23017Pin<'_, B> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioInput + '_>> {
        self.driver.set_pin_mode(self.pin, PinMode::Input)?;
        self.driver.pull_up(self.pin, self.bias == GpioBias::PullUp)?;
        Ok(Box::new(Mcp23017Input { pin: self }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        self.driver.set_pin_mode(self.pin, PinMode::Output)?;
        Ok(Box::new(Mcp23017Output { pin: self }))
    }

    fn supports_active_level(&self) -> bool {
        true
    }

    fn active_level(&self) -> GpioActiveLevel {
        self.active_level
    }

    fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
        self.active_level = level;
        Ok(())
    }

    fn supports_bias(&self) -> bool {
        true
    }

    fn bias(&self) -> GpioBias {
        self.bias
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        check_bias(bias)?;
        self.bias = bias;
        Ok(())
    }
}

struct Mcp23017Input<'a, B> {
    pin: &'a Mcp23017Pin<'a, B>,
}

impl<B> Debug for Mcp23017Input<'_, B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}(in)", self.pin)
    }
}

impl<B: I2cBus> GpioInput for Mcp23017Input<'_, B> {
    fn read(&self) -> GpioResult<bool> {
        let value = self.pin.driver.digital_read(self.pin.pin)?;
        Ok(self.pin.active_level.get_state(value))
    }
}

struct Mcp23017Output<'a, B> {
    pin: &'a Mcp23017Pin<'a, B>,
}

impl<B> Debug for Mcp23017Output<'_, B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}(out)", self.pin)
    }
}

impl<B: I2cBus> GpioOutput for Mcp23017Output<'_, B> {
    fn write(&self, value: bool) -> GpioResult<()> {
        let state = self.pin.active_level.get_state(value);
        self.pin.driver.digital_write(self.pin.pin, state)
    }
}

/// A group of expander pins. Reads and writes of the whole group are a single transfer pair.
struct Mcp23017Bus<'a, B, const N: usize> {
    driver: &'a Mcp23017<B>,
    pins: [u8; N],
    bias: GpioBias,
}

impl<B, const N: usize> Mcp23017Bus<'_, B, N> {
    fn mask(&self) -> u16 {
        self.pins.iter().fold(0u16, |acc, &pin| acc | (1 << pin))
    }
}

impl<B, const N: usize> Debug for Mcp23017Bus<'_, B, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.driver, self.pins)
    }
}

impl<B: I2cBus, const N: usize> GpioBus<N> for Mcp23017Bus<'_, B, N> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioBusInput<N> + '_>> {
        let mask = self.mask();
        self.driver
            .update_register_pair(Register::Iodir, Register::Iodir, mask, 0xFFFF)?;
        let pull_up = if self.bias == GpioBias::PullUp { 0xFFFF } else { 0 };
        self.driver
            .update_register_pair(Register::Gppu, Register::Gppu, mask, pull_up)?;
        Ok(Box::new(Mcp23017BusInput { bus: self }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>> {
        self.driver
            .update_register_pair(Register::Iodir, Register::Iodir, self.mask(), 0)?;
        Ok(Box::new(Mcp23017BusOutput { bus: self }))
    }

    fn supports_bias(&self) -> bool {
        true
    }

    fn bias(&self) -> GpioBias {
        self.bias
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        check_bias(bias)?;
        self.bias = bias;
        Ok(())
    }
}

struct Mcp23017BusInput<'a, B, const N: usize> {
    bus: &'a Mcp23017Bus<'a, B, N>,
}

impl<B, const N: usize> Debug for Mcp23017BusInput<'_, B, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}(in)", self.bus)
    }
}

impl<B: I2cBus, const N: usize> GpioBusInput<N> for Mcp23017BusInput<'_, B, N> {
    fn read(&self) -> GpioResult<[bool; N]> {
        let value = self.bus.driver.read_gpio_ab()?;
        Ok(self.bus.pins.map(|pin| value & (1 << pin) != 0))
    }
}

struct Mcp23017BusOutput<'a, B, const N: usize> {
    bus: &'a Mcp23017Bus<'a, B, N>,
}

impl<B, const N: usize> Debug for Mcp23017BusOutput<'_, B, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}(out)", self.bus)
    }
}

impl<B: I2cBus, const N: usize> GpioBusOutput<N> for Mcp23017BusOutput<'_, B, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        let bits = self
            .bus
            .pins
            .iter()
            .zip(values)
            .fold(0u16, |acc, (&pin, &value)| if value { acc | (1 << pin) } else { acc });
        self.bus
            .driver
            .update_register_pair(Register::Olat, Register::Gpio, self.bus.mask(), bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedMcp23017;

    fn expander() -> Mcp23017<SimulatedMcp23017> {
        let expander = Mcp23017::new(SimulatedMcp23017::new(0x20), 0);
        expander.begin().unwrap();
        expander
    }

    #[test]
    fn pins_are_claimed_once() {
        let expander = expander();
        let _pin = expander.get_pin(3).unwrap();
        assert_eq!(expander.get_pin(3).unwrap_err(), GpioError::AlreadyInUse);
        assert_eq!(expander.get_pin_bus([2, 3]).unwrap_err(), GpioError::AlreadyInUse);
        assert_eq!(expander.get_pin(16).unwrap_err(), GpioError::InvalidPin(16));
    }

    #[test]
    fn output_pin_honors_active_level() {
        let expander = expander();
        let mut pin = expander.get_pin(8).unwrap();
        pin.set_active_level(GpioActiveLevel::Low).unwrap();
        let output = pin.as_output().unwrap();

        output.write(true).unwrap();
        assert!(!expander.digital_read(8).unwrap());
        output.write(false).unwrap();
        assert!(expander.digital_read(8).unwrap());
    }

    #[test]
    fn input_pin_uses_pull_up() {
        let expander = expander();
        let mut pin = expander.get_pin(1).unwrap();
        pin.set_bias(GpioBias::PullUp).unwrap();
        assert_eq!(pin.set_bias(GpioBias::PullDown), Err(GpioError::NotSupported));
        let input = pin.as_input().unwrap();
        assert!(input.read().unwrap());

        expander.bus_mut().set_external(1, false);
        assert!(!input.read().unwrap());
    }

    #[test]
    fn bus_writes_only_its_pins() {
        let expander = expander();
        expander.set_pin_mode(0, PinMode::Output).unwrap();
        expander.digital_write(0, true).unwrap();

        let mut bus = expander.get_pin_bus([12, 11, 10, 9]).unwrap();
        let output = bus.as_output().unwrap();
        output.write_nibble(0b0101).unwrap();

        // D0 -> pin 12, D2 -> pin 10, pin 0 untouched
        assert_eq!(expander.read_gpio_ab().unwrap(), (1 << 12) | (1 << 10) | 1);
    }
}

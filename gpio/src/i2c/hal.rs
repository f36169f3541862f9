use crate::i2c::I2cBus;
use crate::{GpioError, GpioResult};
use embedded_hal::i2c::{Error, ErrorKind, I2c};
use log::trace;
use std::fmt::{Debug, Formatter};

/// Adapts any `embedded-hal` I2C implementation to [I2cBus].
///
/// This lets the drivers run on top of other HALs (e.g. `linux-embedded-hal`) without depending on
/// them directly.
pub struct HalI2cBus<T> {
    inner: T,
}

impl<T: I2c> HalI2cBus<T> {
    pub fn new(inner: T) -> Self {
        HalI2cBus { inner }
    }

    /// Releases the wrapped bus.
    pub fn release(self) -> T {
        self.inner
    }
}

impl<T> Debug for HalI2cBus<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "HalI2cBus({})", std::any::type_name::<T>())
    }
}

/// Maps an `embedded-hal` error kind onto [GpioError].
pub fn map_error_kind(kind: ErrorKind) -> GpioError {
    match kind {
        ErrorKind::NoAcknowledge(_) => GpioError::Nack,
        other => GpioError::Other(format!("I2C: {}", other)),
    }
}

impl<T: I2c> I2cBus for HalI2cBus<T> {
    fn write(&mut self, address: u8, bytes: &[u8]) -> GpioResult<()> {
        trace!("I2C write @{:#04x}: {:02x?}", address, bytes);
        I2c::write(&mut self.inner, address, bytes)
            .map_err(|e| map_error_kind(e.kind()))
    }

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> GpioResult<()> {
        I2c::write_read(&mut self.inner, address, bytes, buffer)
            .map_err(|e| map_error_kind(e.kind()))?;
        trace!("I2C read @{:#04x} after {:02x?}: {:02x?}", address, bytes, buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorType, NoAcknowledgeSource, Operation};

    /// Answers every read with an incrementing counter, NACKs address `0x7F`.
    struct CountingI2c {
        next: u8,
        writes: Vec<(u8, Vec<u8>)>,
    }

    impl ErrorType for CountingI2c {
        type Error = ErrorKind;
    }

    impl I2c for CountingI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if address == 0x7F {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for operation in operations {
                match operation {
                    Operation::Write(bytes) => self.writes.push((address, bytes.to_vec())),
                    Operation::Read(buffer) => {
                        for byte in buffer.iter_mut() {
                            *byte = self.next;
                            self.next = self.next.wrapping_add(1);
                        }
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn forwards_transfers() {
        let mut bus = HalI2cBus::new(CountingI2c { next: 7, writes: Vec::new() });
        bus.write(0x20, &[0x00, 0xFF]).unwrap();
        let mut buffer = [0u8; 2];
        bus.write_read(0x20, &[0x12], &mut buffer).unwrap();

        assert_eq!(buffer, [7, 8]);
        let inner = bus.release();
        assert_eq!(inner.writes, vec![(0x20, vec![0x00, 0xFF]), (0x20, vec![0x12])]);
    }

    #[test]
    fn maps_nack() {
        let mut bus = HalI2cBus::new(CountingI2c { next: 0, writes: Vec::new() });
        assert_eq!(bus.write(0x7F, &[0x00]), Err(GpioError::Nack));
        assert!(matches!(map_error_kind(ErrorKind::Bus), GpioError::Other(_)));
    }
}

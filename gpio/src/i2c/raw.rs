use crate::i2c::I2cBus;
use crate::{GpioError, GpioResult};
use log::{debug, trace};
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::time::{Duration, Instant};

/// Raw I2C master for the Raspberry Pi, driving a BSC (Broadcom Serial Controller) directly.
///
/// Requires `/dev/mem` access, so root privileges are needed.
///
/// Requires the SDA/SCL pins to already be set to their I2C function (ALT0 on GPIO2/GPIO3 for
/// BSC1), which is what `dtparam=i2c_arm=on` does at boot.
///
/// # Registers
///
/// Each BSC has the following 32-bit registers, relative to its base address:
/// - `C` (`0x00`): control: `I2CEN` (bit 15) enables the controller, `ST` (bit 7) starts a
///   transfer, `CLEAR` (bits 5:4) clears the FIFO, `READ` (bit 0) selects a read transfer.
/// - `S` (`0x04`): status: `CLKT` (bit 9) slave clock-stretch timeout, `ERR` (bit 8) slave
///   address not acknowledged, `RXD` (bit 5) FIFO has data, `TXD` (bit 4) FIFO can accept data,
///   `DONE` (bit 1) transfer complete, `TA` (bit 0) transfer active. `CLKT`, `ERR` and `DONE` are
///   cleared by writing `1`.
/// - `DLEN` (`0x08`): number of bytes in the transfer.
/// - `A` (`0x0C`): 7-bit slave address.
/// - `FIFO` (`0x10`): 16-byte data FIFO.
/// - `DIV` (`0x14`): core clock divider for SCL.
pub struct RawI2cBus {
    mmap: MmapRaw,
    controller: u8,
    timeout: Duration,
}

impl RawI2cBus {
    // #[cfg(target_pointer_width = "64")]
    // const PERIPHERAL_BASE: u32 = 0xFE000000;
    /// The base address of the peripherals in the Raspberry Pi memory map.
    pub const PERIPHERAL_BASE: u32 = 0x3F000000;

    /// Offsets of BSC0, BSC1 and BSC2 from [Self::PERIPHERAL_BASE].
    const CONTROLLER_OFFSETS: [u32; 3] = [0x205000, 0x804000, 0x805000];

    /// The core clock divider giving 100 kHz with a 250 MHz core clock.
    pub const DEFAULT_DIVIDER: u16 = 2500;

    const REG_C: usize = 0x00;
    const REG_S: usize = 0x04;
    const REG_DLEN: usize = 0x08;
    const REG_A: usize = 0x0C;
    const REG_FIFO: usize = 0x10;
    const REG_DIV: usize = 0x14;

    const C_I2CEN: u32 = 1 << 15;
    const C_ST: u32 = 1 << 7;
    const C_CLEAR: u32 = 0b11 << 4;
    const C_READ: u32 = 1;

    const S_CLKT: u32 = 1 << 9;
    const S_ERR: u32 = 1 << 8;
    const S_RXD: u32 = 1 << 5;
    const S_TXD: u32 = 1 << 4;
    const S_DONE: u32 = 1 << 1;

    fn create(path: &str, controller: usize) -> GpioResult<Self> {
        let Some(&offset) = Self::CONTROLLER_OFFSETS.get(controller) else {
            return Err(GpioError::InvalidArgument);
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let mmap = MmapOptions::new()
            .offset(Self::PERIPHERAL_BASE as u64 + offset as u64)
            .len(0x20)
            .map_raw(&file)?;

        let bus = RawI2cBus {
            mmap,
            controller: controller as u8,
            timeout: Duration::from_millis(100),
        };
        bus.set_divider(Self::DEFAULT_DIVIDER)?;

        debug!("{:?} mapped", bus);

        Ok(bus)
    }

    /// Creates a new `RawI2cBus` for the given BSC controller using `/dev/mem`.
    ///
    /// Controller `1` is the one routed to the 40-pin header.
    pub fn new_mem(controller: usize) -> GpioResult<Self> {
        Self::create("/dev/mem", controller)
    }

    /// Sets how long a single transfer may take before failing with [GpioError::Timeout].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the SCL divider. SCL frequency is the core clock divided by this value.
    ///
    /// The divider is always rounded down to an even number by the hardware; `0` is rejected.
    pub fn set_divider(&self, divider: u16) -> GpioResult<()> {
        if divider == 0 {
            return Err(GpioError::InvalidArgument);
        }
        self.write_reg(Self::REG_DIV, divider as u32);
        Ok(())
    }

    fn read_reg(&self, offset: usize) -> u32 {
        let mmap = self.mmap.as_ptr() as *const u32;
        unsafe { mmap.add(offset / 4).read_volatile() }
    }

    fn write_reg(&self, offset: usize, value: u32) {
        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        unsafe { mmap.add(offset / 4).write_volatile(value) };
    }

    /// Resets the FIFO and the sticky status bits, then programs address and length.
    fn setup(&self, address: u8, len: usize) -> GpioResult<()> {
        if address > 0x7F || len > u16::MAX as usize {
            return Err(GpioError::InvalidArgument);
        }
        self.write_reg(Self::REG_C, Self::C_CLEAR);
        self.write_reg(Self::REG_S, Self::S_CLKT | Self::S_ERR | Self::S_DONE);
        self.write_reg(Self::REG_A, address as u32);
        self.write_reg(Self::REG_DLEN, len as u32);
        Ok(())
    }

    /// Checks the error bits after a transfer and acknowledges `DONE`.
    fn finish(&self, status: u32) -> GpioResult<()> {
        self.write_reg(Self::REG_S, Self::S_CLKT | Self::S_ERR | Self::S_DONE);

        if status & Self::S_ERR != 0 {
            return Err(GpioError::Nack);
        }
        if status & Self::S_CLKT != 0 {
            return Err(GpioError::Timeout);
        }
        Ok(())
    }

    fn transfer_write(&self, address: u8, bytes: &[u8]) -> GpioResult<()> {
        self.setup(address, bytes.len())?;

        let mut remaining = bytes.iter();
        // Pre-fill the FIFO before starting, so short transfers don't underrun
        while self.read_reg(Self::REG_S) & Self::S_TXD != 0 {
            let Some(&byte) = remaining.next() else { break };
            self.write_reg(Self::REG_FIFO, byte as u32);
        }

        self.write_reg(Self::REG_C, Self::C_I2CEN | Self::C_ST);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            let status = self.read_reg(Self::REG_S);
            if status & (Self::S_DONE | Self::S_ERR | Self::S_CLKT) != 0 {
                break status;
            }
            if status & Self::S_TXD != 0 {
                if let Some(&byte) = remaining.next() {
                    self.write_reg(Self::REG_FIFO, byte as u32);
                }
            }
            if Instant::now() > deadline {
                self.write_reg(Self::REG_C, Self::C_CLEAR);
                return Err(GpioError::Timeout);
            }
        };

        self.finish(status)
    }

    fn transfer_read(&self, address: u8, buffer: &mut [u8]) -> GpioResult<()> {
        self.setup(address, buffer.len())?;
        self.write_reg(Self::REG_C, Self::C_I2CEN | Self::C_ST | Self::C_READ);

        let mut received = 0;
        let deadline = Instant::now() + self.timeout;
        let status = loop {
            let status = self.read_reg(Self::REG_S);
            if status & Self::S_RXD != 0 && received < buffer.len() {
                buffer[received] = self.read_reg(Self::REG_FIFO) as u8;
                received += 1;
                continue;
            }
            if status & (Self::S_DONE | Self::S_ERR | Self::S_CLKT) != 0 {
                break status;
            }
            if Instant::now() > deadline {
                self.write_reg(Self::REG_C, Self::C_CLEAR);
                return Err(GpioError::Timeout);
            }
        };

        // Drain whatever arrived between the last poll and DONE
        while received < buffer.len() && self.read_reg(Self::REG_S) & Self::S_RXD != 0 {
            buffer[received] = self.read_reg(Self::REG_FIFO) as u8;
            received += 1;
        }

        self.finish(status)?;

        if received < buffer.len() {
            return Err(GpioError::Other(format!(
                "short read: {} of {} bytes",
                received,
                buffer.len()
            )));
        }
        Ok(())
    }
}

impl Debug for RawI2cBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawI2cBus({:?}, BSC{})", self.mmap.as_ptr().addr(), self.controller)
    }
}

impl I2cBus for RawI2cBus {
    fn write(&mut self, address: u8, bytes: &[u8]) -> GpioResult<()> {
        trace!("BSC{} write @{:#04x}: {:02x?}", self.controller, address, bytes);
        self.transfer_write(address, bytes)
    }

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> GpioResult<()> {
        self.transfer_write(address, bytes)?;
        self.transfer_read(address, buffer)?;
        trace!("BSC{} read @{:#04x}: {:02x?}", self.controller, address, buffer);
        Ok(())
    }
}

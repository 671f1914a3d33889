//! Hardware abstraction layer traits.
//!
//! Peripheral drivers (the SSD1306 display, the PCF8523 clock) talk to an
//! [`I2cBus`] rather than to a concrete bridge. The bus type a driver is
//! built with decides who owns the bridge: a `BridgeDevice` by value (owns),
//! `&BridgeDevice` (borrows), or `Arc<BridgeDevice>` (shares).

use std::sync::Arc;

use crate::bridge::{BridgeDevice, I2cFlags, Mode};
use crate::error::Result;

/// A 7-bit I2C master bus.
pub trait I2cBus {
    /// Whether the bus can carry traffic right now.
    fn is_ready(&self) -> bool;

    /// One complete START..STOP write.
    fn write(&self, address: u8, data: &[u8]) -> Result<()>;

    /// One complete START..STOP read. Returns the number of bytes received;
    /// the rest of `buffer` is left untouched.
    fn read(&self, address: u8, buffer: &mut [u8]) -> Result<usize>;

    /// Register read: write `write` with START, then read with a repeated
    /// START and STOP.
    fn write_read(&self, address: u8, write: &[u8], read: &mut [u8]) -> Result<usize>;

    /// Memory write: `offset` followed by `data` in a single START..STOP
    /// write. With empty `data` this only moves the target's register
    /// pointer.
    fn write_register(&self, address: u8, offset: u8, data: &[u8]) -> Result<()> {
        let mut payload = Vec::with_capacity(data.len() + 1);
        payload.push(offset);
        payload.extend_from_slice(data);
        self.write(address, &payload)
    }
}

fn copy_into(buffer: &mut [u8], data: &[u8]) -> usize {
    let n = data.len().min(buffer.len());
    buffer[..n].copy_from_slice(&data[..n]);
    n
}

impl I2cBus for BridgeDevice {
    fn is_ready(&self) -> bool {
        self.is_open() && self.mode() == Mode::I2cMaster
    }

    fn write(&self, address: u8, data: &[u8]) -> Result<()> {
        self.i2c_master_write(address, data, I2cFlags::START_AND_STOP)
    }

    fn read(&self, address: u8, buffer: &mut [u8]) -> Result<usize> {
        let data = self.i2c_master_read(address, buffer.len(), I2cFlags::START_AND_STOP)?;
        Ok(copy_into(buffer, &data))
    }

    fn write_read(&self, address: u8, write: &[u8], read: &mut [u8]) -> Result<usize> {
        self.i2c_master_write(address, write, I2cFlags::START)?;
        let data = self.i2c_master_read(
            address,
            read.len(),
            I2cFlags::REPEATED_START | I2cFlags::STOP,
        )?;
        Ok(copy_into(read, &data))
    }
}

impl<T: I2cBus + ?Sized> I2cBus for &T {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn write(&self, address: u8, data: &[u8]) -> Result<()> {
        (**self).write(address, data)
    }

    fn read(&self, address: u8, buffer: &mut [u8]) -> Result<usize> {
        (**self).read(address, buffer)
    }

    fn write_read(&self, address: u8, write: &[u8], read: &mut [u8]) -> Result<usize> {
        (**self).write_read(address, write, read)
    }
}

impl<T: I2cBus + ?Sized> I2cBus for Arc<T> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn write(&self, address: u8, data: &[u8]) -> Result<()> {
        (**self).write(address, data)
    }

    fn read(&self, address: u8, buffer: &mut [u8]) -> Result<usize> {
        (**self).read(address, buffer)
    }

    fn write_read(&self, address: u8, write: &[u8], read: &mut [u8]) -> Result<usize> {
        (**self).write_read(address, write, read)
    }
}

impl<T: I2cBus + ?Sized> I2cBus for Box<T> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn write(&self, address: u8, data: &[u8]) -> Result<()> {
        (**self).write(address, data)
    }

    fn read(&self, address: u8, buffer: &mut [u8]) -> Result<usize> {
        (**self).read(address, buffer)
    }

    fn write_read(&self, address: u8, write: &[u8], read: &mut [u8]) -> Result<usize> {
        (**self).write_read(address, write, read)
    }
}

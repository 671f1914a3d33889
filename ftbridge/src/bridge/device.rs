//! The FT4222 bridge device.
//!
//! A [`BridgeDevice`] owns one native handle and serializes every call that
//! touches it behind a per-device lock. Protocol operations are gated on the
//! current [`Mode`]: I2C calls need `initI2CMaster`, SPI calls need
//! `initSPIMaster`. Switching modes is just another init call; the previous
//! mode is simply overwritten.
//!
//! Precondition failures (not open, wrong mode) are returned before the
//! hardware is touched. Nothing is retried here; retry policy belongs to the
//! caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::native::{Driver, NativeHandle, NativeResult};
use super::types::{
    device_type, ClockRate, GpioDir, GpioPort, I2cFlags, I2cSpeed, I2cStatus, Mode, SpiConfig,
};
use crate::error::{Error, Result};
use crate::sink::{self, SharedSink};

/// First address tried by a default bus scan.
pub const SCAN_FIRST_ADDRESS: u8 = 0x03;
/// Last address tried by a default bus scan.
pub const SCAN_LAST_ADDRESS: u8 = 0x77;

const MAX_7BIT_ADDRESS: u8 = 0x7F;

/// Chip-select map used for SPI master: only SS0 is driven.
const SPI_SSO_MAP: u8 = 0x01;

/// One FT4222 bridge chip.
///
/// The device cannot be cloned; moving it moves the handle. Dropping it
/// closes the handle. Share it between threads through `Arc`, or lend it out
/// by reference: every method takes `&self` and locks internally.
pub struct BridgeDevice {
    driver: Arc<dyn Driver>,
    inner: Mutex<Inner>,
    sink: SharedSink,
}

struct Inner {
    handle: Option<Box<dyn NativeHandle>>,
    clock_rate: ClockRate,
    mode: Mode,
    is_ft4222: bool,
    opened_index: Option<u32>,
    version: Option<String>,
}

impl Inner {
    fn new() -> Self {
        Self {
            handle: None,
            clock_rate: ClockRate::default(),
            mode: Mode::Unknown,
            is_ft4222: false,
            opened_index: None,
            version: None,
        }
    }

    fn is_open(&self) -> bool {
        self.handle.is_some() && self.is_ft4222
    }

    fn handle(&mut self) -> Result<&mut (dyn NativeHandle + 'static)> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        self.handle.as_deref_mut().ok_or(Error::NotOpen)
    }

    fn handle_in(&mut self, expected: Mode) -> Result<&mut (dyn NativeHandle + 'static)> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        if self.mode != expected {
            return Err(Error::WrongMode {
                expected,
                actual: self.mode,
            });
        }
        self.handle()
    }
}

fn check<T>(op: &'static str, result: NativeResult<T>) -> Result<T> {
    result.map_err(|status| Error::Device { op, status })
}

impl BridgeDevice {
    /// Create an unopened device.
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            inner: Mutex::new(Inner::new()),
            sink: sink::noop(),
        }
    }

    /// Replace the log sink. Set it before opening to see open diagnostics.
    pub fn with_log_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Create a device and open it by vendor-list index.
    pub fn connect(driver: Arc<dyn Driver>, index: u32) -> Result<Self> {
        let device = Self::new(driver);
        device.open(index)?;
        Ok(device)
    }

    /// Create a device and open it by serial number.
    pub fn connect_serial(driver: Arc<dyn Driver>, serial: &str) -> Result<Self> {
        let device = Self::new(driver);
        device.open_by_serial(serial)?;
        Ok(device)
    }

    fn log(&self, message: impl AsRef<str>) {
        self.sink.emit(message.as_ref());
    }

    /// Open the device at a vendor-list index.
    pub fn open(&self, index: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.handle.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let handle = check("FT_Open", self.driver.open_by_index(index))?;
        self.adopt(&mut inner, handle)?;
        inner.opened_index = Some(index);

        self.log(format!("Device opened index={}", index));
        Ok(())
    }

    /// Open the device with the given serial number.
    pub fn open_by_serial(&self, serial: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.handle.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let handle = check("FT_OpenEx by serial", self.driver.open_by_serial(serial))?;
        self.adopt(&mut inner, handle)?;

        self.log(format!("Device opened by serial: {}", serial));
        Ok(())
    }

    // Verify a freshly opened handle is an FT4222 and take ownership of it.
    // On any failure the handle is closed before returning.
    fn adopt(&self, inner: &mut Inner, mut handle: Box<dyn NativeHandle>) -> Result<()> {
        let info = match handle.device_info() {
            Ok(info) => info,
            Err(status) => {
                if let Err(close_status) = handle.close() {
                    warn!("FT_Close of unidentified device failed with status {}", close_status);
                    self.log(format!("FT_Close failed with status: {}", close_status));
                }
                return Err(Error::Device {
                    op: "FT_GetDeviceInfo",
                    status,
                });
            }
        };

        if !device_type::is_ft4222(info.device_type) {
            if let Err(status) = handle.close() {
                warn!("FT_Close of rejected device failed with status {}", status);
                self.log(format!("FT_Close failed with status: {}", status));
            }
            return Err(Error::WrongDevice {
                device_type: info.device_type,
            });
        }

        inner.version = match handle.version() {
            Ok(version) => {
                let desc = format!("Chip: 0x{:x}, Lib: 0x{:x}", version.chip, version.library);
                self.log(format!("FT4222 {}", desc));
                Some(desc)
            }
            Err(status) => {
                debug!("FT4222_GetVersion failed with status {}", status);
                None
            }
        };

        debug!(serial = %info.serial, description = %info.description, "FT4222 opened");
        inner.handle = Some(handle);
        inner.is_ft4222 = true;
        inner.mode = Mode::Unknown;
        inner.clock_rate = ClockRate::default();
        Ok(())
    }

    /// Close the device. Idempotent and infallible.
    ///
    /// An active protocol mode is uninitialized first. Failures on the way
    /// down are logged, never returned.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        let Some(mut handle) = inner.handle.take() else {
            return;
        };

        if inner.mode != Mode::Unknown {
            if let Err(status) = handle.uninitialize() {
                warn!("FT4222_UnInitialize failed with status {}", status);
                self.log(format!("FT4222_UnInitialize failed with status: {}", status));
            }
        }
        if let Err(status) = handle.close() {
            warn!("FT_Close failed with status {}", status);
            self.log(format!("FT_Close failed with status: {}", status));
        }

        inner.mode = Mode::Unknown;
        inner.is_ft4222 = false;
        inner.opened_index = None;
        inner.version = None;
        inner.clock_rate = ClockRate::default();
        self.log("Device closed");
    }

    /// Whether a verified FT4222 handle is held.
    pub fn is_open(&self) -> bool {
        self.inner.lock().is_open()
    }

    /// The active protocol mode.
    pub fn mode(&self) -> Mode {
        self.inner.lock().mode
    }

    /// Vendor-list index the device was opened with, if opened by index.
    pub fn opened_index(&self) -> Option<u32> {
        self.inner.lock().opened_index
    }

    /// Version string recorded at open, e.g. `Chip: 0x42220400, Lib: 0x1040a`.
    pub fn version_string(&self) -> Option<String> {
        self.inner.lock().version.clone()
    }

    /// Chip mode strapping (0..=3), or 0 when unopened or on failure.
    pub fn chip_mode(&self) -> u8 {
        let mut inner = self.inner.lock();
        match inner.handle() {
            Ok(handle) => handle.chip_mode().unwrap_or(0),
            Err(_) => 0,
        }
    }

    // --- I2C master ---

    /// Enter I2C master mode.
    pub fn init_i2c_master(&self, speed: I2cSpeed) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner.handle()?;
        check("FT4222_I2CMaster_Init", handle.i2c_master_init(speed.kbps()))?;
        inner.mode = Mode::I2cMaster;

        self.log(format!("I2C Master initialized at {} kbps", speed.kbps()));
        Ok(())
    }

    /// Write `data` to a 7-bit address.
    ///
    /// Empty data is a no-op. Transferring fewer bytes than requested is an
    /// error: I2C writes are all-or-nothing.
    pub fn i2c_master_write(&self, address: u8, data: &[u8], flags: I2cFlags) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner.handle_in(Mode::I2cMaster)?;
        if data.is_empty() {
            return Ok(());
        }

        let written = check(
            "FT4222_I2CMaster_WriteEx",
            handle.i2c_master_write(address, flags, data),
        )?;
        if written != data.len() {
            return Err(Error::Incomplete {
                op: "I2C Master Write",
                transferred: written,
                requested: data.len(),
            });
        }

        trace!("I2C W 0x{:02x} [{:02x?}] flags=0x{:02x}", address, data, flags.bits());
        self.log(format!(
            "I2C Write to 0x{:02x}: {} bytes, flag=0x{:02x}",
            address,
            written,
            flags.bits()
        ));
        Ok(())
    }

    /// Read up to `count` bytes from a 7-bit address.
    ///
    /// A short read is not an error; the result holds what the target sent.
    pub fn i2c_master_read(&self, address: u8, count: usize, flags: I2cFlags) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        let handle = inner.handle_in(Mode::I2cMaster)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; count];
        let read = check(
            "FT4222_I2CMaster_ReadEx",
            handle.i2c_master_read(address, flags, &mut buffer),
        )?;
        if read != count {
            buffer.truncate(read);
            self.log(format!("I2C Read incomplete: {}/{} bytes", read, count));
        }

        trace!("I2C R 0x{:02x} [{:02x?}] flags=0x{:02x}", address, buffer, flags.bits());
        self.log(format!(
            "I2C Read from 0x{:02x}: {} bytes, flag=0x{:02x}",
            address,
            read,
            flags.bits()
        ));
        Ok(buffer)
    }

    /// Read the I2C controller status register.
    pub fn i2c_master_status(&self) -> Result<I2cStatus> {
        let mut inner = self.inner.lock();
        let handle = inner.handle_in(Mode::I2cMaster)?;
        let raw = check("FT4222_I2CMaster_GetStatus", handle.i2c_master_status())?;
        Ok(I2cStatus::from_bits_retain(raw))
    }

    /// Recover a stuck bus by clocking out nine pulses.
    pub fn i2c_master_reset_bus(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner.handle_in(Mode::I2cMaster)?;
        check("FT4222_I2CMaster_ResetBus", handle.i2c_master_reset_bus())?;

        self.log("I2C bus reset");
        Ok(())
    }

    /// Try every address in `start..=end` and return the ones that ACK.
    ///
    /// Each address gets a zero-payload transaction followed by a status
    /// read. A reversed range is swapped and both ends are clamped to 7 bits.
    /// The lock is held for the whole scan.
    pub fn scan_i2c_bus(&self, start: u8, end: u8, flags: I2cFlags) -> Result<Vec<u8>> {
        let (mut first, mut last) = (start.min(MAX_7BIT_ADDRESS), end.min(MAX_7BIT_ADDRESS));
        if first > last {
            std::mem::swap(&mut first, &mut last);
        }

        let mut inner = self.inner.lock();
        let handle = inner.handle_in(Mode::I2cMaster)?;

        let mut found = Vec::new();
        for address in first..=last {
            // A failed write only means nobody answered at this address.
            if handle.i2c_master_write(address, flags, &[]).is_err() {
                trace!("scan 0x{:02x}: write failed", address);
                continue;
            }
            let raw = check("FT4222_I2CMaster_GetStatus", handle.i2c_master_status())?;
            let status = I2cStatus::from_bits_retain(raw);
            if status.acknowledged() {
                found.push(address);
            } else {
                trace!("scan 0x{:02x}: {}", address, status.describe().join(", "));
            }
        }

        self.log(format!(
            "I2C scan 0x{:02x}-0x{:02x}: {} device(s)",
            first,
            last,
            found.len()
        ));
        Ok(found)
    }

    // --- SPI master ---

    /// Enter SPI master mode, driving chip select 0.
    pub fn init_spi_master(&self, config: SpiConfig) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner.handle()?;
        check(
            "FT4222_SPIMaster_Init",
            handle.spi_master_init(config, SPI_SSO_MAP),
        )?;
        inner.mode = Mode::SpiMaster;

        self.log(format!(
            "SPI Master initialized ({} IO, clock /{})",
            config.io_mode,
            config.divider.factor()
        ));
        Ok(())
    }

    /// Clock in up to `count` bytes. Short reads are truncated, not errors.
    ///
    /// With `end_transaction` false, chip select stays asserted for the next
    /// call.
    pub fn spi_master_single_read(&self, count: usize, end_transaction: bool) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        let handle = inner.handle_in(Mode::SpiMaster)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; count];
        let read = check(
            "FT4222_SPIMaster_SingleRead",
            handle.spi_single_read(&mut buffer, end_transaction),
        )?;
        buffer.truncate(read);

        self.log(format!("SPI SingleRead: {} bytes", read));
        Ok(buffer)
    }

    /// Clock out `data`. A short write is an error.
    pub fn spi_master_single_write(&self, data: &[u8], end_transaction: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner.handle_in(Mode::SpiMaster)?;
        if data.is_empty() {
            return Ok(());
        }

        let written = check(
            "FT4222_SPIMaster_SingleWrite",
            handle.spi_single_write(data, end_transaction),
        )?;
        if written != data.len() {
            return Err(Error::Incomplete {
                op: "SPI Write",
                transferred: written,
                requested: data.len(),
            });
        }

        self.log(format!("SPI SingleWrite: {} bytes", written));
        Ok(())
    }

    /// Full-duplex transfer. The result is always as long as `data`.
    pub fn spi_master_single_read_write(&self, data: &[u8], end_transaction: bool) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        let handle = inner.handle_in(Mode::SpiMaster)?;
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; data.len()];
        let transferred = check(
            "FT4222_SPIMaster_SingleReadWrite",
            handle.spi_single_read_write(&mut buffer, data, end_transaction),
        )?;
        if transferred != data.len() {
            return Err(Error::Incomplete {
                op: "SPI ReadWrite",
                transferred,
                requested: data.len(),
            });
        }

        self.log(format!("SPI SingleReadWrite: {} bytes", transferred));
        Ok(buffer)
    }

    // --- GPIO ---

    /// Enter GPIO mode with the given pin directions.
    pub fn init_gpio(&self, dirs: [GpioDir; 4]) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner.handle()?;
        check("FT4222_GPIO_Init", handle.gpio_init(dirs))?;
        inner.mode = Mode::Gpio;

        self.log("GPIO initialized");
        Ok(())
    }

    /// Read a pin level.
    ///
    /// Only requires an open device; GPIO is deliberately outside the
    /// I2C/SPI mode gate. Call `init_gpio` first in practice.
    pub fn read_gpio(&self, port: GpioPort) -> Result<bool> {
        let mut inner = self.inner.lock();
        let handle = inner.handle()?;
        check("FT4222_GPIO_Read", handle.gpio_read(port))
    }

    /// Drive a pin level. Same gating as [`read_gpio`](Self::read_gpio).
    pub fn write_gpio(&self, port: GpioPort, level: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner.handle()?;
        check("FT4222_GPIO_Write", handle.gpio_write(port, level))?;

        self.log(format!(
            "GPIO {} set to {}",
            port,
            if level { "HIGH" } else { "LOW" }
        ));
        Ok(())
    }

    // --- Raw channel ---

    /// Read up to `count` raw bytes. The timeout is applied to both
    /// directions first. Short reads are truncated.
    pub fn read(&self, count: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        let handle = inner.handle()?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let ms = timeout_ms(timeout);
        check("FT_SetTimeouts", handle.set_timeouts(ms, ms))?;

        let mut buffer = vec![0u8; count];
        let read = check("FT_Read", handle.read(&mut buffer))?;
        if read != count {
            buffer.truncate(read);
            self.log(format!("Read partial: {}/{} bytes", read, count));
        } else {
            self.log(format!("Read {} bytes", read));
        }
        Ok(buffer)
    }

    /// Write raw bytes. The timeout is applied to both directions first.
    /// A short write is an error.
    pub fn write(&self, data: &[u8], timeout: Duration) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner.handle()?;
        if data.is_empty() {
            return Ok(());
        }

        let ms = timeout_ms(timeout);
        check("FT_SetTimeouts", handle.set_timeouts(ms, ms))?;

        let written = check("FT_Write", handle.write(data))?;
        if written != data.len() {
            return Err(Error::Incomplete {
                op: "Write",
                transferred: written,
                requested: data.len(),
            });
        }

        self.log(format!("Write {} bytes", written));
        Ok(())
    }

    // --- Chip control ---

    /// Change the chip system clock.
    pub fn set_clock_rate(&self, rate: ClockRate) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner.handle()?;
        check("FT4222_SetClock", handle.set_clock(rate))?;
        inner.clock_rate = rate;

        self.log(format!("Clock rate set to {}", rate));
        Ok(())
    }

    /// The current system clock; the chip default when unopened.
    pub fn clock_rate(&self) -> ClockRate {
        let inner = self.inner.lock();
        if inner.is_open() {
            inner.clock_rate
        } else {
            ClockRate::default()
        }
    }

    /// Soft-reset the chip. All protocol state on the chip is lost.
    ///
    /// The tracked mode is left as it was, so it may no longer match the
    /// hardware; re-run the matching init call after a reset.
    pub fn reset_chip(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner.handle()?;
        check("FT4222_ChipReset", handle.chip_reset())?;

        if inner.mode != Mode::Unknown {
            warn!("chip reset while in {} mode; tracked mode kept", inner.mode);
        }
        self.log("Chip reset");
        Ok(())
    }
}

fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

impl Drop for BridgeDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for BridgeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BridgeDevice")
            .field("open", &inner.is_open())
            .field("mode", &inner.mode)
            .field("clock_rate", &inner.clock_rate)
            .field("opened_index", &inner.opened_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::native::NativeStatus;
    use crate::bridge::sim::{SimChip, SimDriver, SimEvent};
    use crate::error::ErrorKind;

    fn sim() -> Arc<SimDriver> {
        Arc::new(SimDriver::new().with_chip(SimChip::ft4222("FT4222 A", "FT0001")))
    }

    fn recording_sink() -> (SharedSink, Arc<Mutex<Vec<String>>>) {
        let messages = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink: SharedSink = {
            let messages = messages.clone();
            Arc::new(move |m: &str| messages.lock().push(m.to_string()))
        };
        (sink, messages)
    }

    fn open_i2c(driver: &Arc<SimDriver>) -> BridgeDevice {
        let device = BridgeDevice::connect(driver.clone(), 0).unwrap();
        device.init_i2c_master(I2cSpeed::S400K).unwrap();
        device
    }

    #[test]
    fn test_open_twice_fails() {
        let driver = sim();
        let device = BridgeDevice::connect(driver, 0).unwrap();
        assert_eq!(device.open(0), Err(Error::AlreadyOpen));
        assert_eq!(device.opened_index(), Some(0));
        assert!(device.version_string().unwrap().starts_with("Chip: 0x"));
    }

    #[test]
    fn test_open_missing_index_reports_status() {
        let device = BridgeDevice::new(sim());
        let err = device.open(7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceIo);
        assert_eq!(err.status(), Some(NativeStatus::DEVICE_NOT_FOUND));
        assert!(!device.is_open());
    }

    #[test]
    fn test_wrong_family_is_rejected_and_released() {
        let driver = Arc::new(SimDriver::new().with_chip(SimChip::other("FT232H", "FTX", 8)));
        let err = BridgeDevice::connect(driver.clone(), 0).unwrap_err();
        assert_eq!(err, Error::WrongDevice { device_type: 8 });
        assert_eq!(driver.open_handles(), 0);
    }

    #[test]
    fn test_open_by_serial() {
        let driver = sim();
        let device = BridgeDevice::connect_serial(driver.clone(), "FT0001").unwrap();
        assert!(device.is_open());
        assert_eq!(device.opened_index(), None);

        let missing = BridgeDevice::new(driver);
        assert_eq!(
            missing.open_by_serial("NOPE").unwrap_err().status(),
            Some(NativeStatus::DEVICE_NOT_FOUND)
        );
    }

    #[test]
    fn test_operations_before_init_are_precondition_errors() {
        let driver = sim();
        let device = BridgeDevice::connect(driver.clone(), 0).unwrap();

        let errs = [
            device.i2c_master_write(0x3C, &[1], I2cFlags::START_AND_STOP).unwrap_err(),
            device.i2c_master_read(0x3C, 1, I2cFlags::START_AND_STOP).unwrap_err(),
            device.i2c_master_status().unwrap_err(),
            device.i2c_master_reset_bus().unwrap_err(),
            device.scan_i2c_bus(0x03, 0x77, I2cFlags::START_AND_STOP).unwrap_err(),
            device.spi_master_single_read(1, true).unwrap_err(),
            device.spi_master_single_write(&[1], true).unwrap_err(),
            device.spi_master_single_read_write(&[1], true).unwrap_err(),
        ];
        for err in errs {
            assert_eq!(err.kind(), ErrorKind::Precondition, "{}", err);
        }
        assert!(driver.transcript().is_empty());
    }

    #[test]
    fn test_unopened_device_rejects_everything() {
        let device = BridgeDevice::new(sim());
        assert_eq!(device.init_i2c_master(I2cSpeed::S100K), Err(Error::NotOpen));
        assert_eq!(device.init_gpio([GpioDir::Input; 4]), Err(Error::NotOpen));
        assert_eq!(device.read_gpio(GpioPort::Port0), Err(Error::NotOpen));
        assert_eq!(device.read(4, Duration::from_millis(10)), Err(Error::NotOpen));
        assert_eq!(device.reset_chip(), Err(Error::NotOpen));
        assert_eq!(device.clock_rate(), ClockRate::Sys60Mhz);
        assert_eq!(device.chip_mode(), 0);
    }

    #[test]
    fn test_mode_switch_overwrites() {
        let driver = sim();
        let device = open_i2c(&driver);
        assert_eq!(device.mode(), Mode::I2cMaster);

        device.init_spi_master(SpiConfig::default()).unwrap();
        assert_eq!(device.mode(), Mode::SpiMaster);
        assert_eq!(
            device.i2c_master_write(0x3C, &[1], I2cFlags::START_AND_STOP),
            Err(Error::WrongMode {
                expected: Mode::I2cMaster,
                actual: Mode::SpiMaster
            })
        );
    }

    #[test]
    fn test_empty_write_and_zero_read_do_not_touch_bus() {
        let driver = sim();
        let device = open_i2c(&driver);

        device.i2c_master_write(0x50, &[], I2cFlags::START_AND_STOP).unwrap();
        assert!(device.i2c_master_read(0x50, 0, I2cFlags::START_AND_STOP).unwrap().is_empty());
        assert!(driver.transcript().is_empty());
    }

    #[test]
    fn test_short_write_is_incomplete() {
        let driver = sim();
        driver.add_i2c_target(0x50);
        let device = open_i2c(&driver);

        driver.force_short_write(2);
        let err = device
            .i2c_master_write(0x50, &[0, 1, 2, 3], I2cFlags::START_AND_STOP)
            .unwrap_err();
        assert_eq!(
            err,
            Error::Incomplete {
                op: "I2C Master Write",
                transferred: 2,
                requested: 4
            }
        );
    }

    #[test]
    fn test_short_read_is_truncated() {
        let driver = sim();
        driver.add_i2c_target(0x50);
        let device = open_i2c(&driver);

        driver.force_short_read(3);
        let data = device.i2c_master_read(0x50, 8, I2cFlags::START_AND_STOP).unwrap();
        assert_eq!(data.len(), 3);
    }

    #[test]
    fn test_flags_reach_the_wire_unmodified() {
        let driver = sim();
        driver.add_i2c_target(0x50);
        let device = open_i2c(&driver);

        device.i2c_master_write(0x50, &[0x10], I2cFlags::from_raw(0x41)).unwrap();
        assert_eq!(
            driver.transcript(),
            vec![SimEvent::I2cWrite {
                address: 0x50,
                flags: 0x41,
                data: vec![0x10]
            }]
        );
    }

    #[test]
    fn test_scan_clamps_and_swaps_range() {
        let driver = sim();
        driver.add_i2c_target(0x10);
        driver.add_i2c_target(0x7F);
        let device = open_i2c(&driver);

        let found = device.scan_i2c_bus(0xFF, 0x08, I2cFlags::START_AND_STOP).unwrap();
        assert_eq!(found, vec![0x10, 0x7F]);
        assert_eq!(driver.scanned_addresses(), (0x08..=0x7F).collect::<Vec<u8>>());
    }

    #[test]
    fn test_status_and_bus_reset() {
        let driver = sim();
        let device = open_i2c(&driver);

        device.i2c_master_write(0x22, &[1], I2cFlags::START_AND_STOP).unwrap_err();
        let status = device.i2c_master_status().unwrap();
        assert!(status.contains(I2cStatus::ADDRESS_NACK));

        device.i2c_master_reset_bus().unwrap();
        assert!(device.i2c_master_status().unwrap().acknowledged());
    }

    #[test]
    fn test_spi_chip_select_held_between_calls() {
        let driver = sim();
        let device = BridgeDevice::connect(driver.clone(), 0).unwrap();
        device.init_spi_master(SpiConfig::default()).unwrap();

        driver.queue_miso(&[0xAA, 0xBB, 0xCC]);
        device.spi_master_single_write(&[0x9F], false).unwrap();
        assert!(driver.chip_select_asserted());

        let id = device.spi_master_single_read(3, true).unwrap();
        assert_eq!(id, vec![0xAA, 0xBB, 0xCC]);
        assert!(!driver.chip_select_asserted());
    }

    #[test]
    fn test_spi_read_write_is_full_duplex() {
        let driver = sim();
        let device = BridgeDevice::connect(driver.clone(), 0).unwrap();
        device.init_spi_master(SpiConfig::default()).unwrap();

        driver.queue_miso(&[1]);
        let rx = device.spi_master_single_read_write(&[0xDE, 0xAD, 0xBE, 0xEF], true).unwrap();
        assert_eq!(rx.len(), 4);
        assert_eq!(rx[0], 1);

        driver.force_short_write(1);
        let err = device.spi_master_single_read_write(&[1, 2], true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteTransfer);
    }

    #[test]
    fn test_gpio_works_outside_gpio_mode() {
        let driver = sim();
        let device = open_i2c(&driver);

        // Not gated by the mode state machine.
        device.write_gpio(GpioPort::Port3, true).unwrap();
        assert!(device.read_gpio(GpioPort::Port3).unwrap());
        assert_eq!(device.mode(), Mode::I2cMaster);

        device
            .init_gpio([GpioDir::Output, GpioDir::Input, GpioDir::Input, GpioDir::Output])
            .unwrap();
        assert_eq!(device.mode(), Mode::Gpio);
        assert_eq!(
            device.write_gpio(GpioPort::Port1, true).unwrap_err().status(),
            Some(NativeStatus::GPIO_WRITE_NOT_SUPPORTED)
        );
    }

    #[test]
    fn test_raw_channel_applies_timeout_and_truncates() {
        let driver = sim();
        let device = BridgeDevice::connect(driver.clone(), 0).unwrap();

        driver.queue_rx(&[1, 2, 3]);
        let data = device.read(10, Duration::from_millis(250)).unwrap();
        assert_eq!(data, vec![1, 2, 3]);

        device.write(&[9, 9], Duration::from_millis(50)).unwrap();
        driver.force_short_write(1);
        assert_eq!(
            device.write(&[1, 2, 3], Duration::from_millis(50)).unwrap_err().kind(),
            ErrorKind::IncompleteTransfer
        );

        assert_eq!(
            driver.transcript(),
            vec![
                SimEvent::Timeouts { read_ms: 250, write_ms: 250 },
                SimEvent::RawRead { requested: 10, data: vec![1, 2, 3] },
                SimEvent::Timeouts { read_ms: 50, write_ms: 50 },
                SimEvent::RawWrite { data: vec![9, 9] },
                SimEvent::Timeouts { read_ms: 50, write_ms: 50 },
                SimEvent::RawWrite { data: vec![1] },
            ]
        );
    }

    #[test]
    fn test_clock_rate_tracking() {
        let driver = sim();
        let device = BridgeDevice::connect(driver, 0).unwrap();
        device.set_clock_rate(ClockRate::Sys80Mhz).unwrap();
        assert_eq!(device.clock_rate(), ClockRate::Sys80Mhz);

        device.close();
        assert_eq!(device.clock_rate(), ClockRate::Sys60Mhz);
    }

    #[test]
    fn test_reset_chip_keeps_tracked_mode() {
        let driver = sim();
        let device = open_i2c(&driver);
        device.reset_chip().unwrap();
        assert_eq!(device.mode(), Mode::I2cMaster);
    }

    #[test]
    fn test_close_is_idempotent_and_logs_failures() {
        let driver = sim();
        let messages = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink: SharedSink = {
            let messages = messages.clone();
            Arc::new(move |m: &str| messages.lock().push(m.to_string()))
        };
        let device = BridgeDevice::new(driver.clone()).with_log_sink(sink);
        device.open(0).unwrap();
        device.init_i2c_master(I2cSpeed::S400K).unwrap();

        driver.fail_close(NativeStatus::IO_ERROR);
        device.close();
        device.close();

        assert!(!device.is_open());
        assert_eq!(device.mode(), Mode::Unknown);
        assert_eq!(driver.open_handles(), 0);
        assert_eq!(driver.uninitialize_count(), 1);

        let messages = messages.lock();
        assert!(messages.iter().any(|m| m.starts_with("FT_Close failed")));
        assert_eq!(messages.iter().filter(|m| *m == "Device closed").count(), 1);
    }

    #[test]
    fn test_close_logs_uninitialize_failure_and_releases() {
        let driver = sim();
        let (sink, messages) = recording_sink();
        let device = BridgeDevice::new(driver.clone()).with_log_sink(sink);
        device.open(0).unwrap();
        device.init_gpio([GpioDir::Input; 4]).unwrap();

        driver.fail_uninitialize(NativeStatus::IO_ERROR);
        device.close();

        assert!(!device.is_open());
        assert_eq!(device.mode(), Mode::Unknown);
        assert_eq!(driver.open_handles(), 0);
        assert_eq!(driver.uninitialize_count(), 1);

        let messages = messages.lock();
        let expected = format!("FT4222_UnInitialize failed with status: {}", NativeStatus::IO_ERROR);
        assert_eq!(messages.iter().filter(|m| **m == expected).count(), 1);
        assert_eq!(messages.last().map(String::as_str), Some("Device closed"));
    }

    #[test]
    fn test_failed_identification_closes_handle() {
        let driver = sim();
        let (sink, messages) = recording_sink();
        let device = BridgeDevice::new(driver.clone()).with_log_sink(sink);

        driver.fail_device_info(NativeStatus::IO_ERROR);
        driver.fail_close(NativeStatus::DEVICE_NOT_OPENED);
        let err = device.open(0).unwrap_err();

        assert_eq!(
            err,
            Error::Device {
                op: "FT_GetDeviceInfo",
                status: NativeStatus::IO_ERROR,
            }
        );
        assert!(!device.is_open());
        assert_eq!(driver.open_handles(), 0);
        let expected = format!("FT_Close failed with status: {}", NativeStatus::DEVICE_NOT_OPENED);
        assert!(messages.lock().contains(&expected));

        // The faults were one-shot.
        device.open(0).unwrap();
        assert!(device.is_open());
    }

    #[test]
    fn test_close_without_mode_skips_uninitialize() {
        let driver = sim();
        let device = BridgeDevice::connect(driver.clone(), 0).unwrap();
        device.close();
        assert_eq!(driver.uninitialize_count(), 0);
    }

    #[test]
    fn test_drop_releases_handle() {
        let driver = sim();
        {
            let _device = open_i2c(&driver);
            assert_eq!(driver.open_handles(), 1);
        }
        assert_eq!(driver.open_handles(), 0);
    }

    #[test]
    fn test_reopen_after_close() {
        let driver = sim();
        let device = open_i2c(&driver);
        device.close();
        device.open(0).unwrap();
        assert_eq!(device.mode(), Mode::Unknown);
    }
}

//! Bindings to the vendor `libft4222` (which bundles the D2XX `ftd2xx` API).
//!
//! Only the calls the bridge device needs are declared. Every wrapper turns
//! a non-zero status into `Err(NativeStatus)` and leaves policy to the
//! device layer.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;

use super::native::{ChipVersion, Driver, HandleInfo, NativeHandle, NativeResult, NativeStatus, RawDeviceNode};
use super::types::{ClockRate, GpioDir, GpioPort, I2cFlags, SpiConfig};

type FtHandle = *mut c_void;
type FtStatus = u32;
type Bool = c_int;

const FT_OPEN_BY_SERIAL_NUMBER: u32 = 1;

#[repr(C)]
struct FtDeviceListInfoNode {
    flags: u32,
    device_type: u32,
    id: u32,
    loc_id: u32,
    serial_number: [c_char; 16],
    description: [c_char; 64],
    handle: FtHandle,
}

#[repr(C)]
#[derive(Default)]
struct Ft4222Version {
    chip_version: u32,
    dll_version: u32,
}

#[link(name = "ft4222")]
extern "C" {
    fn FT_CreateDeviceInfoList(num_devs: *mut u32) -> FtStatus;
    fn FT_GetDeviceInfoList(dest: *mut FtDeviceListInfoNode, num_devs: *mut u32) -> FtStatus;
    fn FT_Open(device_number: c_int, handle: *mut FtHandle) -> FtStatus;
    fn FT_OpenEx(arg: *mut c_void, flags: u32, handle: *mut FtHandle) -> FtStatus;
    fn FT_Close(handle: FtHandle) -> FtStatus;
    fn FT_GetDeviceInfo(
        handle: FtHandle,
        device_type: *mut u32,
        id: *mut u32,
        serial_number: *mut c_char,
        description: *mut c_char,
        dummy: *mut c_void,
    ) -> FtStatus;
    fn FT_SetTimeouts(handle: FtHandle, read_timeout: u32, write_timeout: u32) -> FtStatus;
    fn FT_Read(handle: FtHandle, buffer: *mut c_void, to_read: u32, returned: *mut u32) -> FtStatus;
    fn FT_Write(handle: FtHandle, buffer: *mut c_void, to_write: u32, written: *mut u32) -> FtStatus;

    fn FT4222_UnInitialize(handle: FtHandle) -> FtStatus;
    fn FT4222_SetClock(handle: FtHandle, clock: u32) -> FtStatus;
    fn FT4222_GetVersion(handle: FtHandle, version: *mut Ft4222Version) -> FtStatus;
    fn FT4222_GetChipMode(handle: FtHandle, chip_mode: *mut u8) -> FtStatus;
    fn FT4222_ChipReset(handle: FtHandle) -> FtStatus;

    fn FT4222_I2CMaster_Init(handle: FtHandle, kbps: u32) -> FtStatus;
    fn FT4222_I2CMaster_WriteEx(
        handle: FtHandle,
        address: u16,
        flag: u8,
        buffer: *mut u8,
        size: u16,
        transferred: *mut u16,
    ) -> FtStatus;
    fn FT4222_I2CMaster_ReadEx(
        handle: FtHandle,
        address: u16,
        flag: u8,
        buffer: *mut u8,
        size: u16,
        transferred: *mut u16,
    ) -> FtStatus;
    fn FT4222_I2CMaster_GetStatus(handle: FtHandle, status: *mut u8) -> FtStatus;
    fn FT4222_I2CMaster_ResetBus(handle: FtHandle) -> FtStatus;

    fn FT4222_SPIMaster_Init(
        handle: FtHandle,
        io_line: u32,
        clock: u32,
        cpol: u32,
        cpha: u32,
        sso_map: u8,
    ) -> FtStatus;
    fn FT4222_SPIMaster_SingleRead(
        handle: FtHandle,
        buffer: *mut u8,
        size: u16,
        read: *mut u16,
        end_transaction: Bool,
    ) -> FtStatus;
    fn FT4222_SPIMaster_SingleWrite(
        handle: FtHandle,
        buffer: *mut u8,
        size: u16,
        transferred: *mut u16,
        end_transaction: Bool,
    ) -> FtStatus;
    fn FT4222_SPIMaster_SingleReadWrite(
        handle: FtHandle,
        read_buffer: *mut u8,
        write_buffer: *mut u8,
        size: u16,
        transferred: *mut u16,
        end_transaction: Bool,
    ) -> FtStatus;

    fn FT4222_GPIO_Init(handle: FtHandle, dirs: *mut u32) -> FtStatus;
    fn FT4222_GPIO_Read(handle: FtHandle, port: u32, value: *mut Bool) -> FtStatus;
    fn FT4222_GPIO_Write(handle: FtHandle, port: u32, value: Bool) -> FtStatus;
}

fn status(code: FtStatus) -> NativeResult<()> {
    match NativeStatus(code) {
        NativeStatus::OK => Ok(()),
        failed => Err(failed),
    }
}

fn transfer_size(len: usize) -> NativeResult<u16> {
    u16::try_from(len).map_err(|_| NativeStatus::EXCEEDED_MAX_TRANSFER_SIZE)
}

fn c_string(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().map(|&c| c as u8).collect();
    CStr::from_bytes_until_nul(&bytes)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned())
}

/// The vendor library, linked at build time.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ft4222Driver;

impl Driver for Ft4222Driver {
    fn list_devices(&self) -> NativeResult<Vec<RawDeviceNode>> {
        let mut count = 0u32;
        status(unsafe { FT_CreateDeviceInfoList(&mut count) })?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut nodes: Vec<FtDeviceListInfoNode> = (0..count)
            .map(|_| FtDeviceListInfoNode {
                flags: 0,
                device_type: 0,
                id: 0,
                loc_id: 0,
                serial_number: [0; 16],
                description: [0; 64],
                handle: ptr::null_mut(),
            })
            .collect();
        status(unsafe { FT_GetDeviceInfoList(nodes.as_mut_ptr(), &mut count) })?;
        nodes.truncate(count as usize);

        Ok(nodes
            .iter()
            .map(|node| RawDeviceNode {
                device_type: node.device_type,
                serial: c_string(&node.serial_number),
                description: c_string(&node.description),
                location_id: node.loc_id,
                flags: node.flags,
            })
            .collect())
    }

    fn open_by_index(&self, index: u32) -> NativeResult<Box<dyn NativeHandle>> {
        let index = c_int::try_from(index).map_err(|_| NativeStatus::INVALID_PARAMETER)?;
        let mut handle: FtHandle = ptr::null_mut();
        status(unsafe { FT_Open(index, &mut handle) })?;
        Ok(Box::new(Ft4222Handle { handle }))
    }

    fn open_by_serial(&self, serial: &str) -> NativeResult<Box<dyn NativeHandle>> {
        let serial = CString::new(serial).map_err(|_| NativeStatus::INVALID_PARAMETER)?;
        let mut handle: FtHandle = ptr::null_mut();
        status(unsafe {
            FT_OpenEx(serial.as_ptr() as *mut c_void, FT_OPEN_BY_SERIAL_NUMBER, &mut handle)
        })?;
        Ok(Box::new(Ft4222Handle { handle }))
    }
}

struct Ft4222Handle {
    handle: FtHandle,
}

// SAFETY: the D2XX handle is an opaque token that may be used from any
// thread; BridgeDevice serializes every call made through it.
unsafe impl Send for Ft4222Handle {}

impl NativeHandle for Ft4222Handle {
    fn device_info(&mut self) -> NativeResult<HandleInfo> {
        let mut device_type = 0u32;
        let mut device_id = 0u32;
        let mut serial = [0 as c_char; 16];
        let mut description = [0 as c_char; 64];
        status(unsafe {
            FT_GetDeviceInfo(
                self.handle,
                &mut device_type,
                &mut device_id,
                serial.as_mut_ptr(),
                description.as_mut_ptr(),
                ptr::null_mut(),
            )
        })?;
        Ok(HandleInfo {
            device_type,
            device_id,
            serial: c_string(&serial),
            description: c_string(&description),
        })
    }

    fn version(&mut self) -> NativeResult<ChipVersion> {
        let mut version = Ft4222Version::default();
        status(unsafe { FT4222_GetVersion(self.handle, &mut version) })?;
        Ok(ChipVersion {
            chip: version.chip_version,
            library: version.dll_version,
        })
    }

    fn chip_mode(&mut self) -> NativeResult<u8> {
        let mut mode = 0u8;
        status(unsafe { FT4222_GetChipMode(self.handle, &mut mode) })?;
        Ok(mode)
    }

    fn uninitialize(&mut self) -> NativeResult<()> {
        status(unsafe { FT4222_UnInitialize(self.handle) })
    }

    fn close(&mut self) -> NativeResult<()> {
        if self.handle.is_null() {
            return Ok(());
        }
        let result = status(unsafe { FT_Close(self.handle) });
        self.handle = ptr::null_mut();
        result
    }

    fn i2c_master_init(&mut self, kbps: u32) -> NativeResult<()> {
        status(unsafe { FT4222_I2CMaster_Init(self.handle, kbps) })
    }

    fn i2c_master_write(&mut self, address: u8, flags: I2cFlags, data: &[u8]) -> NativeResult<usize> {
        let size = transfer_size(data.len())?;
        let mut transferred = 0u16;
        status(unsafe {
            FT4222_I2CMaster_WriteEx(
                self.handle,
                address as u16,
                flags.bits(),
                data.as_ptr() as *mut u8,
                size,
                &mut transferred,
            )
        })?;
        Ok(transferred as usize)
    }

    fn i2c_master_read(&mut self, address: u8, flags: I2cFlags, buffer: &mut [u8]) -> NativeResult<usize> {
        let size = transfer_size(buffer.len())?;
        let mut transferred = 0u16;
        status(unsafe {
            FT4222_I2CMaster_ReadEx(
                self.handle,
                address as u16,
                flags.bits(),
                buffer.as_mut_ptr(),
                size,
                &mut transferred,
            )
        })?;
        Ok(transferred as usize)
    }

    fn i2c_master_status(&mut self) -> NativeResult<u8> {
        let mut controller = 0u8;
        status(unsafe { FT4222_I2CMaster_GetStatus(self.handle, &mut controller) })?;
        Ok(controller)
    }

    fn i2c_master_reset_bus(&mut self) -> NativeResult<()> {
        status(unsafe { FT4222_I2CMaster_ResetBus(self.handle) })
    }

    fn spi_master_init(&mut self, config: SpiConfig, sso_map: u8) -> NativeResult<()> {
        status(unsafe {
            FT4222_SPIMaster_Init(
                self.handle,
                config.io_mode as u32,
                config.divider as u32,
                config.polarity as u32,
                config.phase as u32,
                sso_map,
            )
        })
    }

    fn spi_single_read(&mut self, buffer: &mut [u8], end_transaction: bool) -> NativeResult<usize> {
        let size = transfer_size(buffer.len())?;
        let mut read = 0u16;
        status(unsafe {
            FT4222_SPIMaster_SingleRead(
                self.handle,
                buffer.as_mut_ptr(),
                size,
                &mut read,
                Bool::from(end_transaction),
            )
        })?;
        Ok(read as usize)
    }

    fn spi_single_write(&mut self, data: &[u8], end_transaction: bool) -> NativeResult<usize> {
        let size = transfer_size(data.len())?;
        let mut transferred = 0u16;
        status(unsafe {
            FT4222_SPIMaster_SingleWrite(
                self.handle,
                data.as_ptr() as *mut u8,
                size,
                &mut transferred,
                Bool::from(end_transaction),
            )
        })?;
        Ok(transferred as usize)
    }

    fn spi_single_read_write(
        &mut self,
        read: &mut [u8],
        write: &[u8],
        end_transaction: bool,
    ) -> NativeResult<usize> {
        if read.len() != write.len() {
            return Err(NativeStatus::INVALID_PARAMETER);
        }
        let size = transfer_size(write.len())?;
        let mut transferred = 0u16;
        status(unsafe {
            FT4222_SPIMaster_SingleReadWrite(
                self.handle,
                read.as_mut_ptr(),
                write.as_ptr() as *mut u8,
                size,
                &mut transferred,
                Bool::from(end_transaction),
            )
        })?;
        Ok(transferred as usize)
    }

    fn gpio_init(&mut self, dirs: [GpioDir; 4]) -> NativeResult<()> {
        let mut raw = dirs.map(|dir| dir as u32);
        status(unsafe { FT4222_GPIO_Init(self.handle, raw.as_mut_ptr()) })
    }

    fn gpio_read(&mut self, port: GpioPort) -> NativeResult<bool> {
        let mut value: Bool = 0;
        status(unsafe { FT4222_GPIO_Read(self.handle, port as u32, &mut value) })?;
        Ok(value != 0)
    }

    fn gpio_write(&mut self, port: GpioPort, level: bool) -> NativeResult<()> {
        status(unsafe { FT4222_GPIO_Write(self.handle, port as u32, Bool::from(level)) })
    }

    fn set_timeouts(&mut self, read_ms: u32, write_ms: u32) -> NativeResult<()> {
        status(unsafe { FT_SetTimeouts(self.handle, read_ms, write_ms) })
    }

    fn read(&mut self, buffer: &mut [u8]) -> NativeResult<usize> {
        let size = u32::try_from(buffer.len()).map_err(|_| NativeStatus::INVALID_PARAMETER)?;
        let mut returned = 0u32;
        status(unsafe {
            FT_Read(self.handle, buffer.as_mut_ptr() as *mut c_void, size, &mut returned)
        })?;
        Ok(returned as usize)
    }

    fn write(&mut self, data: &[u8]) -> NativeResult<usize> {
        let size = u32::try_from(data.len()).map_err(|_| NativeStatus::INVALID_PARAMETER)?;
        let mut written = 0u32;
        status(unsafe {
            FT_Write(self.handle, data.as_ptr() as *mut c_void, size, &mut written)
        })?;
        Ok(written as usize)
    }

    fn set_clock(&mut self, rate: ClockRate) -> NativeResult<()> {
        status(unsafe { FT4222_SetClock(self.handle, rate as u32) })
    }

    fn chip_reset(&mut self) -> NativeResult<()> {
        status(unsafe { FT4222_ChipReset(self.handle) })
    }
}

impl Drop for Ft4222Handle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

//! Listing attached FT4222 devices.

use serde::Serialize;

use super::native::{Driver, NativeStatus};
use super::types::device_type;
use crate::error::{Error, Result};

/// One attached FT4222, as reported by enumeration. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Serial number
    pub serial: String,
    /// Description string burned into the chip
    pub description: String,
    /// Index in the vendor device list; pass to `BridgeDevice::open`
    pub index: u32,
    /// USB location id
    pub location_id: u32,
    /// Vendor status flags
    pub flags: u32,
}

impl DeviceInfo {
    /// Short label for menus and logs, e.g. `#0 FT4222 A (A1B2C3)`.
    pub fn label(&self) -> String {
        format!("#{} {} ({})", self.index, self.description, self.serial)
    }
}

/// Lists FT4222 devices through a [`Driver`].
pub struct DeviceEnumerator;

impl DeviceEnumerator {
    /// All attached FT4222 devices in vendor order.
    ///
    /// Devices of other FTDI families are skipped; the reported index stays
    /// the position in the unfiltered vendor list, since that is what the
    /// vendor open call takes.
    pub fn list_devices(driver: &dyn Driver) -> Result<Vec<DeviceInfo>> {
        let nodes = driver.list_devices().map_err(|status: NativeStatus| Error::Device {
            op: "FT_GetDeviceInfoList",
            status,
        })?;

        Ok(nodes
            .into_iter()
            .enumerate()
            .filter(|(_, node)| device_type::is_ft4222(node.device_type))
            .map(|(i, node)| DeviceInfo {
                serial: node.serial,
                description: node.description,
                index: i as u32,
                location_id: node.location_id,
                flags: node.flags,
            })
            .collect())
    }
}

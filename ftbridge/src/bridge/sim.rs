//! In-memory FT4222 bench.
//!
//! [`SimDriver`] stands in for the vendor library. It enumerates a fixed set
//! of chips and, once one is opened, behaves like an FT4222 wired to a small
//! bench: I2C targets with register memories or an SSD1306 panel, an SPI
//! slave fed from a MISO queue, four GPIO pins and a raw byte channel.
//!
//! All chips share the one bench. Every bus transaction lands in a
//! transcript, and faults can be queued to exercise error paths.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::native::{ChipVersion, Driver, HandleInfo, NativeHandle, NativeResult, NativeStatus, RawDeviceNode};
use super::types::{device_type, ClockRate, GpioDir, GpioPort, I2cFlags, I2cStatus, SpiConfig};
use crate::display::command;

const SIM_DEVICE_ID: u32 = 0x0403_601c;
const SIM_CHIP_VERSION: u32 = 0x4222_0400;
const SIM_LIBRARY_VERSION: u32 = 0x0104_0a00;

/// Byte clocked in on MISO when the queue is empty.
const MISO_IDLE: u8 = 0xFF;

/// A chip visible to enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimChip {
    pub device_type: u32,
    pub description: String,
    pub serial: String,
    pub location_id: u32,
}

impl SimChip {
    /// An FT4222H in chip mode 0.
    pub fn ft4222(description: &str, serial: &str) -> Self {
        Self::other(description, serial, device_type::FT4222H_0)
    }

    /// Any FTDI device with the given D2XX type.
    pub fn other(description: &str, serial: &str, device_type: u32) -> Self {
        Self {
            device_type,
            description: description.to_string(),
            serial: serial.to_string(),
            location_id: 0,
        }
    }

    pub fn at_location(mut self, location_id: u32) -> Self {
        self.location_id = location_id;
        self
    }
}

/// One recorded bus transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    I2cWrite { address: u8, flags: u8, data: Vec<u8> },
    I2cRead { address: u8, flags: u8, data: Vec<u8> },
    I2cBusReset,
    SpiWrite { data: Vec<u8>, end_transaction: bool },
    SpiRead { data: Vec<u8>, end_transaction: bool },
    SpiTransfer { mosi: Vec<u8>, miso: Vec<u8>, end_transaction: bool },
    GpioWrite { port: GpioPort, level: bool },
    Timeouts { read_ms: u32, write_ms: u32 },
    RawRead { requested: usize, data: Vec<u8> },
    RawWrite { data: Vec<u8> },
    ChipReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeMode {
    None,
    I2c,
    Spi,
    Gpio,
}

#[derive(Debug, Clone)]
enum Target {
    Memory { regs: Box<[u8; 256]>, pointer: u8 },
    Panel(SimPanel),
}

impl Target {
    fn write(&mut self, data: &[u8]) {
        match self {
            Target::Memory { regs, pointer } => {
                let Some((&first, rest)) = data.split_first() else {
                    return;
                };
                *pointer = first;
                for &byte in rest {
                    regs[*pointer as usize] = byte;
                    *pointer = pointer.wrapping_add(1);
                }
            }
            Target::Panel(panel) => panel.receive(data),
        }
    }

    fn read(&mut self, buffer: &mut [u8]) {
        match self {
            Target::Memory { regs, pointer } => {
                for byte in buffer.iter_mut() {
                    *byte = regs[*pointer as usize];
                    *pointer = pointer.wrapping_add(1);
                }
            }
            // Status byte: display on flag in bit 6 is inverted (D6 = 1 when off).
            Target::Panel(panel) => buffer.fill(if panel.on { 0x00 } else { 0x40 }),
        }
    }
}

/// Model of an SSD1306 controller's command decoder and GDDRAM.
#[derive(Debug, Clone)]
pub struct SimPanel {
    gddram: [[u8; command::WIDTH]; command::PAGES],
    page: usize,
    column: usize,
    addressing: u8,
    on: bool,
    inverted: bool,
    contrast: u8,
    charge_pump: bool,
    pending: Option<(u8, Vec<u8>)>,
    commands: Vec<u8>,
}

impl Default for SimPanel {
    fn default() -> Self {
        Self {
            gddram: [[0; command::WIDTH]; command::PAGES],
            page: 0,
            column: 0,
            addressing: command::ADDRESSING_PAGE,
            on: false,
            inverted: false,
            contrast: 0x7F,
            charge_pump: false,
            pending: None,
            commands: Vec::new(),
        }
    }
}

impl SimPanel {
    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn contrast(&self) -> u8 {
        self.contrast
    }

    pub fn charge_pump(&self) -> bool {
        self.charge_pump
    }

    /// Every command byte received, parameters included.
    pub fn commands(&self) -> &[u8] {
        &self.commands
    }

    pub fn page(&self, page: usize) -> &[u8; command::WIDTH] {
        &self.gddram[page % command::PAGES]
    }

    /// Whether a pixel is lit in GDDRAM. Out of range reads as off.
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        if x >= command::WIDTH || y >= command::PAGES * 8 {
            return false;
        }
        self.gddram[y / 8][x] & (1 << (y % 8)) != 0
    }

    fn receive(&mut self, data: &[u8]) {
        let Some((&control, payload)) = data.split_first() else {
            return;
        };
        if control & command::CONTROL_DATA != 0 {
            payload.iter().for_each(|&byte| self.store(byte));
        } else {
            payload.iter().for_each(|&byte| self.command_byte(byte));
        }
    }

    fn command_byte(&mut self, byte: u8) {
        self.commands.push(byte);
        match self.pending.take() {
            Some((opcode, mut params)) => {
                params.push(byte);
                if params.len() == command::parameter_count(opcode) {
                    self.apply(opcode, &params);
                } else {
                    self.pending = Some((opcode, params));
                }
            }
            None if command::parameter_count(byte) > 0 => self.pending = Some((byte, Vec::new())),
            None => self.apply(byte, &[]),
        }
    }

    fn apply(&mut self, opcode: u8, params: &[u8]) {
        match (opcode, params) {
            (command::DISPLAY_OFF, _) => self.on = false,
            (command::DISPLAY_ON, _) => self.on = true,
            (command::NORMAL_DISPLAY, _) => self.inverted = false,
            (command::INVERT_DISPLAY, _) => self.inverted = true,
            (command::SET_CONTRAST, [value]) => self.contrast = *value,
            (command::MEMORY_MODE, [mode]) => self.addressing = mode & 0x03,
            (command::CHARGE_PUMP, [value]) => self.charge_pump = value & 0x04 != 0,
            (0xB0..=0xB7, _) => self.page = (opcode & 0x07) as usize,
            (0x00..=0x0F, _) => self.column = (self.column & 0xF0) | (opcode & 0x0F) as usize,
            (0x10..=0x1F, _) => self.column = ((opcode & 0x0F) as usize) << 4 | (self.column & 0x0F),
            _ => {}
        }
    }

    fn store(&mut self, byte: u8) {
        let column = self.column % command::WIDTH;
        self.gddram[self.page][column] = byte;
        match self.addressing {
            command::ADDRESSING_HORIZONTAL => {
                self.column = column + 1;
                if self.column == command::WIDTH {
                    self.column = 0;
                    self.page = (self.page + 1) % command::PAGES;
                }
            }
            command::ADDRESSING_VERTICAL => {
                self.page += 1;
                if self.page == command::PAGES {
                    self.page = 0;
                    self.column = (column + 1) % command::WIDTH;
                }
            }
            _ => self.column = (column + 1) % command::WIDTH,
        }
    }
}

#[derive(Debug)]
struct Bench {
    chips: Vec<SimChip>,
    opened: Vec<bool>,
    open_handles: usize,

    enumeration_fault: Option<NativeStatus>,
    close_fault: Option<NativeStatus>,
    uninitialize_fault: Option<NativeStatus>,
    device_info_fault: Option<NativeStatus>,
    i2c_write_fault: Option<(usize, NativeStatus)>,
    short_write: Option<usize>,
    short_read: Option<usize>,

    mode: NativeMode,
    clock: ClockRate,
    uninitialize_count: usize,

    i2c_status: I2cStatus,
    targets: BTreeMap<u8, Target>,

    spi_config: Option<SpiConfig>,
    chip_select: bool,
    miso: VecDeque<u8>,

    gpio_dirs: Option<[GpioDir; 4]>,
    gpio_levels: [bool; 4],

    rx: VecDeque<u8>,
    transcript: Vec<SimEvent>,
}

impl Bench {
    fn new() -> Self {
        Self {
            chips: Vec::new(),
            opened: Vec::new(),
            open_handles: 0,
            enumeration_fault: None,
            close_fault: None,
            uninitialize_fault: None,
            device_info_fault: None,
            i2c_write_fault: None,
            short_write: None,
            short_read: None,
            mode: NativeMode::None,
            clock: ClockRate::default(),
            uninitialize_count: 0,
            i2c_status: I2cStatus::IDLE,
            targets: BTreeMap::new(),
            spi_config: None,
            chip_select: false,
            miso: VecDeque::new(),
            gpio_dirs: None,
            gpio_levels: [false; 4],
            rx: VecDeque::new(),
            transcript: Vec::new(),
        }
    }

    fn write_len(&mut self, requested: usize) -> usize {
        self.short_write.take().map_or(requested, |n| n.min(requested))
    }

    fn read_len(&mut self, requested: usize) -> usize {
        self.short_read.take().map_or(requested, |n| n.min(requested))
    }

    fn take_i2c_write_fault(&mut self) -> Option<NativeStatus> {
        match self.i2c_write_fault.take() {
            Some((0, status)) => Some(status),
            Some((remaining, status)) => {
                self.i2c_write_fault = Some((remaining - 1, status));
                None
            }
            None => None,
        }
    }

    fn require(&self, mode: NativeMode) -> NativeResult<()> {
        match (self.mode == mode, mode) {
            (true, _) => Ok(()),
            (false, NativeMode::Spi) => Err(NativeStatus::IS_NOT_SPI_MODE),
            (false, _) => Err(NativeStatus::IS_NOT_I2C_MODE),
        }
    }

    fn release(&mut self, chip: usize) {
        if let Some(opened) = self.opened.get_mut(chip) {
            if *opened {
                *opened = false;
                self.open_handles -= 1;
            }
        }
    }
}

/// Simulated vendor library.
///
/// Clone it freely; clones share the bench.
#[derive(Debug, Clone)]
pub struct SimDriver {
    bench: Arc<Mutex<Bench>>,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    /// A driver with no chips attached.
    pub fn new() -> Self {
        Self {
            bench: Arc::new(Mutex::new(Bench::new())),
        }
    }

    /// A driver with one FT4222, a panel at 0x3C, a memory target at 0x50
    /// and a clock at 0x68 reading 2024-01-01 00:00:00.
    pub fn demo() -> Self {
        let chip = SimChip::ft4222("FT4222 A", "SIM00001").at_location(0x0111);
        let driver = Self::new().with_chip(chip);
        driver.add_ssd1306(0x3C);
        driver.add_i2c_target(0x50);
        // PCF8523 at power-up: control registers, then 2024-01-01 00:00:00.
        driver.set_registers(
            0x68,
            0x00,
            &[0x00, 0x00, 0xE0, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x24],
        );
        driver
    }

    pub fn with_chip(self, chip: SimChip) -> Self {
        {
            let mut bench = self.bench.lock();
            bench.chips.push(chip);
            bench.opened.push(false);
        }
        self
    }

    // --- bench wiring ---

    /// Attach a register-memory target (256 bytes, zeroed).
    pub fn add_i2c_target(&self, address: u8) {
        self.bench.lock().targets.insert(
            address,
            Target::Memory {
                regs: Box::new([0; 256]),
                pointer: 0,
            },
        );
    }

    /// Attach an SSD1306 panel.
    pub fn add_ssd1306(&self, address: u8) {
        self.bench
            .lock()
            .targets
            .insert(address, Target::Panel(SimPanel::default()));
    }

    pub fn remove_i2c_target(&self, address: u8) {
        self.bench.lock().targets.remove(&address);
    }

    /// Preload registers of a memory target, creating it if needed.
    pub fn set_registers(&self, address: u8, start: u8, values: &[u8]) {
        let mut bench = self.bench.lock();
        let target = bench.targets.entry(address).or_insert_with(|| Target::Memory {
            regs: Box::new([0; 256]),
            pointer: 0,
        });
        if let Target::Memory { regs, .. } = target {
            for (offset, &value) in values.iter().enumerate() {
                regs[start.wrapping_add(offset as u8) as usize] = value;
            }
        }
    }

    /// Read back a memory target register.
    pub fn register(&self, address: u8, reg: u8) -> Option<u8> {
        match self.bench.lock().targets.get(&address) {
            Some(Target::Memory { regs, .. }) => Some(regs[reg as usize]),
            _ => None,
        }
    }

    /// Snapshot of a panel's state.
    pub fn panel(&self, address: u8) -> Option<SimPanel> {
        match self.bench.lock().targets.get(&address) {
            Some(Target::Panel(panel)) => Some(panel.clone()),
            _ => None,
        }
    }

    pub fn queue_miso(&self, data: &[u8]) {
        self.bench.lock().miso.extend(data);
    }

    pub fn queue_rx(&self, data: &[u8]) {
        self.bench.lock().rx.extend(data);
    }

    /// Drive an input pin from outside the chip.
    pub fn drive_gpio(&self, port: GpioPort, level: bool) {
        self.bench.lock().gpio_levels[port.index()] = level;
    }

    // --- fault injection ---

    /// Fail enumeration until faults are cleared.
    pub fn fail_enumeration(&self, status: NativeStatus) {
        self.bench.lock().enumeration_fault = Some(status);
    }

    /// Let `skip` I2C writes through, then fail the next one.
    pub fn fail_i2c_write(&self, skip: usize, status: NativeStatus) {
        self.bench.lock().i2c_write_fault = Some((skip, status));
    }

    /// Next close reports failure. The handle is released anyway.
    pub fn fail_close(&self, status: NativeStatus) {
        self.bench.lock().close_fault = Some(status);
    }

    /// Next FT4222_UnInitialize reports failure. The mode is left anyway.
    pub fn fail_uninitialize(&self, status: NativeStatus) {
        self.bench.lock().uninitialize_fault = Some(status);
    }

    /// Next device info query on a fresh handle fails.
    pub fn fail_device_info(&self, status: NativeStatus) {
        self.bench.lock().device_info_fault = Some(status);
    }

    /// Next write-type call (I2C, SPI, raw) moves at most `bytes`.
    pub fn force_short_write(&self, bytes: usize) {
        self.bench.lock().short_write = Some(bytes);
    }

    /// Next read-type call (I2C, SPI, raw) returns at most `bytes`.
    pub fn force_short_read(&self, bytes: usize) {
        self.bench.lock().short_read = Some(bytes);
    }

    pub fn clear_faults(&self) {
        let mut bench = self.bench.lock();
        bench.enumeration_fault = None;
        bench.close_fault = None;
        bench.uninitialize_fault = None;
        bench.device_info_fault = None;
        bench.i2c_write_fault = None;
        bench.short_write = None;
        bench.short_read = None;
    }

    // --- inspection ---

    pub fn transcript(&self) -> Vec<SimEvent> {
        self.bench.lock().transcript.clone()
    }

    pub fn clear_transcript(&self) {
        self.bench.lock().transcript.clear();
    }

    /// Payloads of every I2C write sent to `address`, in order.
    pub fn i2c_writes(&self, address: u8) -> Vec<Vec<u8>> {
        self.bench
            .lock()
            .transcript
            .iter()
            .filter_map(|event| match event {
                SimEvent::I2cWrite { address: a, data, .. } if *a == address => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Addresses that received a zero-length write, in order.
    pub fn scanned_addresses(&self) -> Vec<u8> {
        self.bench
            .lock()
            .transcript
            .iter()
            .filter_map(|event| match event {
                SimEvent::I2cWrite { address, data, .. } if data.is_empty() => Some(*address),
                _ => None,
            })
            .collect()
    }

    pub fn open_handles(&self) -> usize {
        self.bench.lock().open_handles
    }

    pub fn uninitialize_count(&self) -> usize {
        self.bench.lock().uninitialize_count
    }

    pub fn chip_select_asserted(&self) -> bool {
        self.bench.lock().chip_select
    }

    pub fn clock_rate(&self) -> ClockRate {
        self.bench.lock().clock
    }

    pub fn spi_config(&self) -> Option<SpiConfig> {
        self.bench.lock().spi_config
    }

    fn open_chip(&self, chip: usize) -> NativeResult<Box<dyn NativeHandle>> {
        let mut bench = self.bench.lock();
        match bench.opened.get(chip) {
            None => return Err(NativeStatus::DEVICE_NOT_FOUND),
            Some(true) => return Err(NativeStatus::DEVICE_NOT_OPENED),
            Some(false) => {}
        }
        bench.opened[chip] = true;
        bench.open_handles += 1;
        Ok(Box::new(SimHandle {
            bench: self.bench.clone(),
            chip,
            open: true,
        }))
    }
}

impl Driver for SimDriver {
    fn list_devices(&self) -> NativeResult<Vec<RawDeviceNode>> {
        let bench = self.bench.lock();
        if let Some(status) = bench.enumeration_fault {
            return Err(status);
        }
        Ok(bench
            .chips
            .iter()
            .map(|chip| RawDeviceNode {
                device_type: chip.device_type,
                serial: chip.serial.clone(),
                description: chip.description.clone(),
                location_id: chip.location_id,
                flags: 0,
            })
            .collect())
    }

    fn open_by_index(&self, index: u32) -> NativeResult<Box<dyn NativeHandle>> {
        self.open_chip(index as usize)
    }

    fn open_by_serial(&self, serial: &str) -> NativeResult<Box<dyn NativeHandle>> {
        let chip = self
            .bench
            .lock()
            .chips
            .iter()
            .position(|chip| chip.serial == serial)
            .ok_or(NativeStatus::DEVICE_NOT_FOUND)?;
        self.open_chip(chip)
    }
}

struct SimHandle {
    bench: Arc<Mutex<Bench>>,
    chip: usize,
    open: bool,
}

impl SimHandle {
    fn bench(&self) -> NativeResult<parking_lot::MutexGuard<'_, Bench>> {
        if self.open {
            Ok(self.bench.lock())
        } else {
            Err(NativeStatus::INVALID_HANDLE)
        }
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        if self.open {
            self.bench.lock().release(self.chip);
        }
    }
}

impl NativeHandle for SimHandle {
    fn device_info(&mut self) -> NativeResult<HandleInfo> {
        let mut bench = self.bench()?;
        if let Some(status) = bench.device_info_fault.take() {
            return Err(status);
        }
        let chip = bench.chips.get(self.chip).ok_or(NativeStatus::DEVICE_NOT_FOUND)?;
        Ok(HandleInfo {
            device_type: chip.device_type,
            device_id: SIM_DEVICE_ID,
            serial: chip.serial.clone(),
            description: chip.description.clone(),
        })
    }

    fn version(&mut self) -> NativeResult<ChipVersion> {
        self.bench()?;
        Ok(ChipVersion {
            chip: SIM_CHIP_VERSION,
            library: SIM_LIBRARY_VERSION,
        })
    }

    fn chip_mode(&mut self) -> NativeResult<u8> {
        self.bench()?;
        Ok(0)
    }

    fn uninitialize(&mut self) -> NativeResult<()> {
        let mut bench = self.bench()?;
        bench.uninitialize_count += 1;
        bench.mode = NativeMode::None;
        match bench.uninitialize_fault.take() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> NativeResult<()> {
        let mut bench = self.bench()?;
        bench.release(self.chip);
        let fault = bench.close_fault.take();
        drop(bench);
        self.open = false;
        match fault {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn i2c_master_init(&mut self, kbps: u32) -> NativeResult<()> {
        let mut bench = self.bench()?;
        if !(60..=3400).contains(&kbps) {
            return Err(NativeStatus::INVALID_PARAMETER);
        }
        bench.mode = NativeMode::I2c;
        bench.i2c_status = I2cStatus::IDLE;
        Ok(())
    }

    fn i2c_master_write(&mut self, address: u8, flags: I2cFlags, data: &[u8]) -> NativeResult<usize> {
        let mut bench = self.bench()?;
        bench.require(NativeMode::I2c)?;
        if address > 0x7F {
            return Err(NativeStatus::WRONG_I2C_ADDR);
        }
        if data.len() > u16::MAX as usize {
            return Err(NativeStatus::EXCEEDED_MAX_TRANSFER_SIZE);
        }
        if let Some(status) = bench.take_i2c_write_fault() {
            return Err(status);
        }

        let len = bench.write_len(data.len());
        let sent = &data[..len];
        bench.transcript.push(SimEvent::I2cWrite {
            address,
            flags: flags.bits(),
            data: sent.to_vec(),
        });

        match bench.targets.get_mut(&address) {
            Some(target) => {
                target.write(sent);
                bench.i2c_status = I2cStatus::IDLE;
                Ok(len)
            }
            None => {
                bench.i2c_status = I2cStatus::IDLE | I2cStatus::ERROR | I2cStatus::ADDRESS_NACK;
                Ok(0)
            }
        }
    }

    fn i2c_master_read(&mut self, address: u8, flags: I2cFlags, buffer: &mut [u8]) -> NativeResult<usize> {
        let mut bench = self.bench()?;
        bench.require(NativeMode::I2c)?;
        if address > 0x7F {
            return Err(NativeStatus::WRONG_I2C_ADDR);
        }

        let len = bench.read_len(buffer.len());
        let count = match bench.targets.get_mut(&address) {
            Some(target) => {
                target.read(&mut buffer[..len]);
                bench.i2c_status = I2cStatus::IDLE;
                len
            }
            None => {
                bench.i2c_status = I2cStatus::IDLE | I2cStatus::ERROR | I2cStatus::ADDRESS_NACK;
                0
            }
        };
        bench.transcript.push(SimEvent::I2cRead {
            address,
            flags: flags.bits(),
            data: buffer[..count].to_vec(),
        });
        Ok(count)
    }

    fn i2c_master_status(&mut self) -> NativeResult<u8> {
        let bench = self.bench()?;
        bench.require(NativeMode::I2c)?;
        Ok(bench.i2c_status.bits())
    }

    fn i2c_master_reset_bus(&mut self) -> NativeResult<()> {
        let mut bench = self.bench()?;
        bench.require(NativeMode::I2c)?;
        bench.i2c_status = I2cStatus::IDLE;
        bench.transcript.push(SimEvent::I2cBusReset);
        Ok(())
    }

    fn spi_master_init(&mut self, config: SpiConfig, sso_map: u8) -> NativeResult<()> {
        let mut bench = self.bench()?;
        if sso_map == 0 || sso_map > 0x0F {
            return Err(NativeStatus::INVALID_PARAMETER);
        }
        bench.mode = NativeMode::Spi;
        bench.spi_config = Some(config);
        bench.chip_select = false;
        Ok(())
    }

    fn spi_single_read(&mut self, buffer: &mut [u8], end_transaction: bool) -> NativeResult<usize> {
        let mut bench = self.bench()?;
        bench.require(NativeMode::Spi)?;

        let len = bench.read_len(buffer.len());
        for byte in &mut buffer[..len] {
            *byte = bench.miso.pop_front().unwrap_or(MISO_IDLE);
        }
        bench.chip_select = !end_transaction;
        bench.transcript.push(SimEvent::SpiRead {
            data: buffer[..len].to_vec(),
            end_transaction,
        });
        Ok(len)
    }

    fn spi_single_write(&mut self, data: &[u8], end_transaction: bool) -> NativeResult<usize> {
        let mut bench = self.bench()?;
        bench.require(NativeMode::Spi)?;

        let len = bench.write_len(data.len());
        bench.chip_select = !end_transaction;
        bench.transcript.push(SimEvent::SpiWrite {
            data: data[..len].to_vec(),
            end_transaction,
        });
        Ok(len)
    }

    fn spi_single_read_write(
        &mut self,
        read: &mut [u8],
        write: &[u8],
        end_transaction: bool,
    ) -> NativeResult<usize> {
        let mut bench = self.bench()?;
        bench.require(NativeMode::Spi)?;
        if read.len() != write.len() {
            return Err(NativeStatus::INVALID_PARAMETER);
        }

        let len = bench.write_len(write.len());
        for byte in &mut read[..len] {
            *byte = bench.miso.pop_front().unwrap_or(MISO_IDLE);
        }
        bench.chip_select = !end_transaction;
        bench.transcript.push(SimEvent::SpiTransfer {
            mosi: write[..len].to_vec(),
            miso: read[..len].to_vec(),
            end_transaction,
        });
        Ok(len)
    }

    fn gpio_init(&mut self, dirs: [GpioDir; 4]) -> NativeResult<()> {
        let mut bench = self.bench()?;
        bench.mode = NativeMode::Gpio;
        bench.gpio_dirs = Some(dirs);
        Ok(())
    }

    fn gpio_read(&mut self, port: GpioPort) -> NativeResult<bool> {
        let bench = self.bench()?;
        Ok(bench.gpio_levels[port.index()])
    }

    fn gpio_write(&mut self, port: GpioPort, level: bool) -> NativeResult<()> {
        let mut bench = self.bench()?;
        if let Some(dirs) = bench.gpio_dirs {
            if dirs[port.index()] == GpioDir::Input {
                return Err(NativeStatus::GPIO_WRITE_NOT_SUPPORTED);
            }
        }
        bench.gpio_levels[port.index()] = level;
        bench.transcript.push(SimEvent::GpioWrite { port, level });
        Ok(())
    }

    fn set_timeouts(&mut self, read_ms: u32, write_ms: u32) -> NativeResult<()> {
        let mut bench = self.bench()?;
        bench.transcript.push(SimEvent::Timeouts { read_ms, write_ms });
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> NativeResult<usize> {
        let mut bench = self.bench()?;
        let available = bench.rx.len().min(buffer.len());
        let len = bench.read_len(available);
        for byte in &mut buffer[..len] {
            *byte = bench.rx.pop_front().unwrap_or_default();
        }
        bench.transcript.push(SimEvent::RawRead {
            requested: buffer.len(),
            data: buffer[..len].to_vec(),
        });
        Ok(len)
    }

    fn write(&mut self, data: &[u8]) -> NativeResult<usize> {
        let mut bench = self.bench()?;
        let len = bench.write_len(data.len());
        bench.transcript.push(SimEvent::RawWrite {
            data: data[..len].to_vec(),
        });
        Ok(len)
    }

    fn set_clock(&mut self, rate: ClockRate) -> NativeResult<()> {
        let mut bench = self.bench()?;
        bench.clock = rate;
        Ok(())
    }

    fn chip_reset(&mut self) -> NativeResult<()> {
        let mut bench = self.bench()?;
        bench.mode = NativeMode::None;
        bench.i2c_status = I2cStatus::IDLE;
        bench.chip_select = false;
        bench.gpio_dirs = None;
        bench.transcript.push(SimEvent::ChipReset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened() -> (SimDriver, Box<dyn NativeHandle>) {
        let driver = SimDriver::new().with_chip(SimChip::ft4222("FT4222", "S1"));
        let handle = driver.open_by_index(0).unwrap();
        (driver, handle)
    }

    #[test]
    fn test_open_is_exclusive() {
        let (driver, mut handle) = opened();
        assert_eq!(driver.open_by_index(0).err(), Some(NativeStatus::DEVICE_NOT_OPENED));
        assert_eq!(driver.open_by_index(1).err(), Some(NativeStatus::DEVICE_NOT_FOUND));

        handle.close().unwrap();
        assert_eq!(handle.chip_mode(), Err(NativeStatus::INVALID_HANDLE));
        assert!(driver.open_by_serial("S1").is_ok());
    }

    #[test]
    fn test_memory_target_register_pointer() {
        let (driver, mut handle) = opened();
        driver.add_i2c_target(0x50);
        handle.i2c_master_init(400).unwrap();

        handle
            .i2c_master_write(0x50, I2cFlags::START_AND_STOP, &[0x10, 0xAA, 0xBB])
            .unwrap();
        handle.i2c_master_write(0x50, I2cFlags::START, &[0x10]).unwrap();
        let mut buf = [0u8; 2];
        let n = handle
            .i2c_master_read(0x50, I2cFlags::REPEATED_START | I2cFlags::STOP, &mut buf)
            .unwrap();
        assert_eq!((n, buf), (2, [0xAA, 0xBB]));
        assert_eq!(driver.register(0x50, 0x11), Some(0xBB));
    }

    #[test]
    fn test_requires_native_mode() {
        let (_driver, mut handle) = opened();
        assert_eq!(
            handle.i2c_master_write(0x50, I2cFlags::START_AND_STOP, &[0]),
            Err(NativeStatus::IS_NOT_I2C_MODE)
        );
        handle.i2c_master_init(100).unwrap();
        handle.chip_reset().unwrap();
        assert_eq!(handle.i2c_master_status(), Err(NativeStatus::IS_NOT_I2C_MODE));
        assert_eq!(
            handle.spi_single_write(&[0], true),
            Err(NativeStatus::IS_NOT_SPI_MODE)
        );
    }

    #[test]
    fn test_write_fault_counts_down() {
        let (driver, mut handle) = opened();
        driver.add_i2c_target(0x50);
        handle.i2c_master_init(400).unwrap();
        driver.fail_i2c_write(2, NativeStatus::IO_ERROR);

        let write = |h: &mut Box<dyn NativeHandle>| h.i2c_master_write(0x50, I2cFlags::START_AND_STOP, &[0]);
        assert!(write(&mut handle).is_ok());
        assert!(write(&mut handle).is_ok());
        assert_eq!(write(&mut handle), Err(NativeStatus::IO_ERROR));
        assert!(write(&mut handle).is_ok());
        assert_eq!(driver.i2c_writes(0x50).len(), 3);
    }

    #[test]
    fn test_panel_decodes_commands_and_data() {
        let (driver, mut handle) = opened();
        driver.add_ssd1306(0x3C);
        handle.i2c_master_init(400).unwrap();

        for cmd in [0xAF, 0x81, 0x20, 0xA7, 0xB2, 0x05, 0x10] {
            handle.i2c_master_write(0x3C, I2cFlags::START_AND_STOP, &[0x00, cmd]).unwrap();
        }
        handle
            .i2c_master_write(0x3C, I2cFlags::START_AND_STOP, &[0x40, 0x01, 0x80])
            .unwrap();

        let panel = driver.panel(0x3C).unwrap();
        assert!(panel.is_on());
        assert!(panel.is_inverted());
        assert_eq!(panel.contrast(), 0x20);
        assert_eq!(panel.page(2)[5], 0x01);
        assert!(panel.pixel(5, 16));
        assert!(panel.pixel(6, 23));
        assert!(!panel.pixel(6, 16));
    }

    #[test]
    fn test_dropped_handle_is_released() {
        let (driver, handle) = opened();
        assert_eq!(driver.open_handles(), 1);
        drop(handle);
        assert_eq!(driver.open_handles(), 0);
    }
}

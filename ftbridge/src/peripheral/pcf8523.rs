//! PCF8523 real-time clock.
//!
//! The time registers start at 0x03 and hold BCD values: seconds, minutes,
//! hours (24-hour), day, weekday (0 = Sunday), month, year within the
//! century. The clock runs in UTC by convention. Control_1..3 at 0x00..0x02
//! carry the mode bits, interrupt enables and flags, and the battery
//! power-management setting.
//!
//! Datasheet: <https://www.nxp.com/docs/en/data-sheet/PCF8523.pdf>

use std::fmt;

use bitflags::bitflags;
use strum::Display;
use thiserror::Error;
use time::{Date, Month, PrimitiveDateTime, Time};
use tracing::debug;

use crate::error::Error;
use crate::hw_trait::I2cBus;

/// Fixed I2C address of the PCF8523.
pub const DEFAULT_ADDRESS: u8 = 0x68;

/// First control register (Control_1).
pub const REG_CONTROL_1: u8 = 0x00;

/// First time register (seconds).
pub const REG_SECONDS: u8 = 0x03;

const CONTROL_REGISTERS: usize = 3;

const TIME_REGISTERS: usize = 7;

/// Oscillator-stop flag in the seconds register.
const OS_FLAG: u8 = 0x80;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RtcError {
    #[error("RTC bus error: {0}")]
    Bus(#[from] Error),
    #[error("Short read from RTC: {received} of {expected} bytes")]
    ShortRead { received: usize, expected: usize },
    #[error("RTC returned an invalid date/time: {0}")]
    InvalidDateTime(String),
    #[error("Year {0} cannot be stored (2000..=2099)")]
    YearOutOfRange(i32),
}

bitflags! {
    /// Control_1 (0x00).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Control1: u8 {
        /// Countdown timer interrupt enable.
        const CIE = 0x01;
        /// Alarm interrupt enable.
        const AIE = 0x02;
        /// Second interrupt enable.
        const SIE = 0x04;
        /// 12-hour mode (clear for 24-hour).
        const MODE_12H = 0x08;
        /// Software reset.
        const SR = 0x10;
        /// Clock stopped.
        const STOP = 0x20;
        const T = 0x40;
        /// 12.5 pF crystal load (clear for 7 pF).
        const CAP_SEL = 0x80;
    }
}

bitflags! {
    /// Control_2 (0x01): timer and alarm interrupt enables and flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Control2: u8 {
        const CTBIE = 0x01;
        const CTAIE = 0x02;
        const WTAIE = 0x04;
        /// Alarm flag.
        const AF = 0x08;
        /// Second flag.
        const SF = 0x10;
        const CTBF = 0x20;
        const CTAF = 0x40;
        const WTAF = 0x80;
    }
}

bitflags! {
    /// Control_3 (0x02). The top three bits are the power-management
    /// setting, see [`PowerManagement`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Control3: u8 {
        /// Battery low interrupt enable.
        const BLIE = 0x01;
        /// Battery switch-over interrupt enable.
        const BSIE = 0x02;
        /// Battery low.
        const BLF = 0x04;
        /// Switched over to battery.
        const BSF = 0x08;
    }
}

/// How the clock switches between VDD and the backup battery.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOver {
    #[strum(to_string = "standard switch-over")]
    Standard,
    #[strum(to_string = "direct switch-over")]
    Direct,
    #[strum(to_string = "switch-over disabled")]
    Disabled,
}

/// PM[2:0] in Control_3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerManagement {
    Mode {
        switch_over: SwitchOver,
        battery_low_detection: bool,
    },
    /// 0b110, which the chip does not allow.
    Reserved,
}

impl PowerManagement {
    pub fn from_bits(pm: u8) -> Self {
        let mode = |switch_over, battery_low_detection| PowerManagement::Mode {
            switch_over,
            battery_low_detection,
        };
        match pm & 0x07 {
            0b000 => mode(SwitchOver::Standard, true),
            0b001 => mode(SwitchOver::Direct, true),
            0b010 | 0b011 => mode(SwitchOver::Disabled, true),
            0b100 => mode(SwitchOver::Standard, false),
            0b101 => mode(SwitchOver::Direct, false),
            0b110 => PowerManagement::Reserved,
            _ => mode(SwitchOver::Disabled, false),
        }
    }
}

impl fmt::Display for PowerManagement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerManagement::Mode {
                switch_over,
                battery_low_detection,
            } => write!(
                f,
                "{}, battery low detection {}",
                switch_over,
                if *battery_low_detection { "on" } else { "off" }
            ),
            PowerManagement::Reserved => write!(f, "reserved"),
        }
    }
}

/// The three control registers as read in one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRegisters {
    pub control1: Control1,
    pub control2: Control2,
    pub control3: Control3,
}

impl ControlRegisters {
    pub fn from_bytes(regs: [u8; CONTROL_REGISTERS]) -> Self {
        Self {
            control1: Control1::from_bits_retain(regs[0]),
            control2: Control2::from_bits_retain(regs[1]),
            control3: Control3::from_bits_retain(regs[2]),
        }
    }

    pub fn power_management(&self) -> PowerManagement {
        PowerManagement::from_bits(self.control3.bits() >> 5)
    }

    /// Whether the clock runs in 12-hour mode. Time reads assume 24-hour.
    pub fn is_12_hour(&self) -> bool {
        self.control1.contains(Control1::MODE_12H)
    }
}

fn flag_names<T>(names: impl Iterator<Item = (&'static str, T)>) -> String {
    let names: Vec<&str> = names.map(|(name, _)| name).collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(" ")
    }
}

impl fmt::Display for ControlRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("Control_1", self.control1.bits(), flag_names(self.control1.iter_names())),
            ("Control_2", self.control2.bits(), flag_names(self.control2.iter_names())),
            ("Control_3", self.control3.bits(), flag_names(self.control3.iter_names())),
        ];
        for (reg, (name, bits, flags)) in rows.iter().enumerate() {
            writeln!(f, "{} (0x{:02x}): 0x{:02x} 0b{:08b} {}", name, reg, bits, bits, flags)?;
        }
        write!(f, "Power management: {}", self.power_management())
    }
}

fn to_bcd(value: u8) -> u8 {
    let v = value % 100;
    ((v / 10) << 4) | (v % 10)
}

fn from_bcd(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}

/// Decode the seven time registers.
fn decode(regs: &[u8; TIME_REGISTERS]) -> Result<PrimitiveDateTime, RtcError> {
    let second = from_bcd(regs[0] & 0x7F);
    let minute = from_bcd(regs[1] & 0x7F);
    let hour = from_bcd(regs[2] & 0x3F);
    let day = from_bcd(regs[3] & 0x3F);
    // regs[4] is the weekday, implied by the date
    let month = from_bcd(regs[5] & 0x1F);
    let year = 2000 + from_bcd(regs[6]) as i32;

    let invalid = |e: time::error::ComponentRange| RtcError::InvalidDateTime(e.to_string());
    let month = Month::try_from(month).map_err(invalid)?;
    let date = Date::from_calendar_date(year, month, day).map_err(invalid)?;
    let time = Time::from_hms(hour, minute, second).map_err(invalid)?;
    Ok(PrimitiveDateTime::new(date, time))
}

/// Encode a date/time as the seven time registers.
fn encode(dt: PrimitiveDateTime) -> Result<[u8; TIME_REGISTERS], RtcError> {
    if !(2000..=2099).contains(&dt.year()) {
        return Err(RtcError::YearOutOfRange(dt.year()));
    }
    Ok([
        to_bcd(dt.second()) & 0x7F,
        to_bcd(dt.minute()) & 0x7F,
        to_bcd(dt.hour()) & 0x3F,
        to_bcd(dt.day()) & 0x3F,
        dt.weekday().number_days_from_sunday() & 0x07,
        to_bcd(u8::from(dt.month())) & 0x1F,
        to_bcd((dt.year() % 100) as u8),
    ])
}

/// PCF8523 driver.
#[derive(Debug)]
pub struct Pcf8523<B: I2cBus> {
    bus: B,
    address: u8,
}

impl<B: I2cBus> Pcf8523<B> {
    pub fn new(bus: B) -> Self {
        Self::with_address(bus, DEFAULT_ADDRESS)
    }

    pub fn with_address(bus: B, address: u8) -> Self {
        Self {
            bus,
            address: address & 0x7F,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Read the current date and time.
    pub fn read_time(&self) -> Result<PrimitiveDateTime, RtcError> {
        let mut regs = [0u8; TIME_REGISTERS];
        let received = self.bus.write_read(self.address, &[REG_SECONDS], &mut regs)?;
        if received < TIME_REGISTERS {
            return Err(RtcError::ShortRead {
                received,
                expected: TIME_REGISTERS,
            });
        }
        if regs[0] & OS_FLAG != 0 {
            debug!("PCF8523 oscillator stop flag set; time may be unreliable");
        }
        let dt = decode(&regs)?;
        debug!("RTC -> {}", dt);
        Ok(dt)
    }

    /// Write a date and time in one transaction. Clears the
    /// oscillator-stop flag.
    pub fn set_time(&self, dt: PrimitiveDateTime) -> Result<(), RtcError> {
        let regs = encode(dt)?;
        self.bus.write_register(self.address, REG_SECONDS, &regs)?;
        debug!("RTC <- {}", dt);
        Ok(())
    }

    /// Read Control_1..3.
    pub fn read_control(&self) -> Result<ControlRegisters, RtcError> {
        let mut regs = [0u8; CONTROL_REGISTERS];
        let received = self.bus.write_read(self.address, &[REG_CONTROL_1], &mut regs)?;
        if received < CONTROL_REGISTERS {
            return Err(RtcError::ShortRead {
                received,
                expected: CONTROL_REGISTERS,
            });
        }
        let control = ControlRegisters::from_bytes(regs);
        debug!(
            "RTC control 0x{:02x} 0x{:02x} 0x{:02x}",
            regs[0], regs[1], regs[2]
        );
        Ok(control)
    }

    pub fn release(self) -> B {
        self.bus
    }
}

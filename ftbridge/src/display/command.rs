//! SSD1306 command set and panel geometry.

/// Panel width in pixels.
pub const WIDTH: usize = 128;
/// Panel height in pixels.
pub const HEIGHT: usize = 64;
/// 8-pixel pages per column.
pub const PAGES: usize = HEIGHT / 8;
/// Framebuffer size in bytes.
pub const BUFFER_SIZE: usize = WIDTH * PAGES;

/// Control byte announcing command bytes (Co = 0, D/C# = 0).
pub const CONTROL_COMMAND: u8 = 0x00;
/// Control byte announcing display data (Co = 0, D/C# = 1).
pub const CONTROL_DATA: u8 = 0x40;

pub const SET_LOW_COLUMN: u8 = 0x00;
pub const SET_HIGH_COLUMN: u8 = 0x10;
pub const MEMORY_MODE: u8 = 0x20;
pub const COLUMN_ADDRESS: u8 = 0x21;
pub const PAGE_ADDRESS: u8 = 0x22;
pub const SET_START_LINE: u8 = 0x40;
pub const SET_CONTRAST: u8 = 0x81;
pub const CHARGE_PUMP: u8 = 0x8D;
pub const SEGMENT_REMAP_NORMAL: u8 = 0xA0;
pub const SEGMENT_REMAP_REVERSE: u8 = 0xA1;
pub const DISPLAY_ALL_ON_RESUME: u8 = 0xA4;
pub const DISPLAY_ALL_ON: u8 = 0xA5;
pub const NORMAL_DISPLAY: u8 = 0xA6;
pub const INVERT_DISPLAY: u8 = 0xA7;
pub const SET_MULTIPLEX: u8 = 0xA8;
pub const DISPLAY_OFF: u8 = 0xAE;
pub const DISPLAY_ON: u8 = 0xAF;
pub const SET_PAGE_START: u8 = 0xB0;
pub const COM_SCAN_INC: u8 = 0xC0;
pub const COM_SCAN_DEC: u8 = 0xC8;
pub const SET_DISPLAY_OFFSET: u8 = 0xD3;
pub const SET_CLOCK_DIV: u8 = 0xD5;
pub const SET_PRECHARGE: u8 = 0xD9;
pub const SET_COM_PINS: u8 = 0xDA;
pub const SET_VCOM_DETECT: u8 = 0xDB;

pub const ADDRESSING_HORIZONTAL: u8 = 0x00;
pub const ADDRESSING_VERTICAL: u8 = 0x01;
pub const ADDRESSING_PAGE: u8 = 0x02;

pub const CHARGE_PUMP_ENABLE: u8 = 0x14;
pub const CHARGE_PUMP_DISABLE: u8 = 0x10;

/// Power-up configuration for a 128x64 panel, one byte per transaction.
///
/// Parameters follow their opcode as separate command bytes.
#[rustfmt::skip]
pub const INIT_SEQUENCE: [u8; 25] = [
    DISPLAY_OFF,
    MEMORY_MODE, ADDRESSING_HORIZONTAL,
    SET_START_LINE,
    SET_CONTRAST, 0xFF,
    SEGMENT_REMAP_REVERSE,
    SET_MULTIPLEX, 0x3F,
    COM_SCAN_DEC,
    SET_DISPLAY_OFFSET, 0x00,
    SET_CLOCK_DIV, 0x80,
    SET_PRECHARGE, 0xF1,
    SET_COM_PINS, 0x12,
    SET_VCOM_DETECT, 0x40,
    CHARGE_PUMP, CHARGE_PUMP_ENABLE,
    NORMAL_DISPLAY,
    DISPLAY_ALL_ON_RESUME,
    DISPLAY_ON,
];

/// Number of parameter bytes that follow `opcode`.
pub fn parameter_count(opcode: u8) -> usize {
    match opcode {
        MEMORY_MODE | SET_CONTRAST | CHARGE_PUMP | SET_MULTIPLEX | SET_DISPLAY_OFFSET
        | SET_CLOCK_DIV | SET_PRECHARGE | SET_COM_PINS | SET_VCOM_DETECT => 1,
        COLUMN_ADDRESS | PAGE_ADDRESS | 0xA3 => 2,
        0x29 | 0x2A => 5,
        0x26 | 0x27 => 6,
        _ => 0,
    }
}

/// Mnemonic for an opcode.
pub fn name(opcode: u8) -> &'static str {
    match opcode {
        0x00..=0x0F => "SET_LOW_COLUMN",
        0x10..=0x1F => "SET_HIGH_COLUMN",
        MEMORY_MODE => "MEMORY_MODE",
        COLUMN_ADDRESS => "COLUMN_ADDRESS",
        PAGE_ADDRESS => "PAGE_ADDRESS",
        0x26 | 0x27 => "HORIZONTAL_SCROLL",
        0x29 | 0x2A => "VERTICAL_SCROLL",
        0x2E => "DEACTIVATE_SCROLL",
        0x2F => "ACTIVATE_SCROLL",
        0x40..=0x7F => "SET_START_LINE",
        SET_CONTRAST => "SET_CONTRAST",
        CHARGE_PUMP => "CHARGE_PUMP",
        SEGMENT_REMAP_NORMAL => "SEGMENT_REMAP_NORMAL",
        SEGMENT_REMAP_REVERSE => "SEGMENT_REMAP_REVERSE",
        0xA3 => "VERTICAL_SCROLL_AREA",
        DISPLAY_ALL_ON_RESUME => "DISPLAY_ALL_ON_RESUME",
        DISPLAY_ALL_ON => "DISPLAY_ALL_ON",
        NORMAL_DISPLAY => "NORMAL_DISPLAY",
        INVERT_DISPLAY => "INVERT_DISPLAY",
        SET_MULTIPLEX => "SET_MULTIPLEX",
        DISPLAY_OFF => "DISPLAY_OFF",
        DISPLAY_ON => "DISPLAY_ON",
        0xB0..=0xB7 => "SET_PAGE_START",
        COM_SCAN_INC => "COM_SCAN_INC",
        COM_SCAN_DEC => "COM_SCAN_DEC",
        SET_DISPLAY_OFFSET => "SET_DISPLAY_OFFSET",
        SET_CLOCK_DIV => "SET_CLOCK_DIV",
        SET_PRECHARGE => "SET_PRECHARGE",
        SET_COM_PINS => "SET_COM_PINS",
        SET_VCOM_DETECT => "SET_VCOM_DETECT",
        _ => "UNKNOWN",
    }
}

//! SSD1306 128x64 OLED driver.
//!
//! Drawing happens in an in-memory [`Framebuffer`]; nothing reaches the
//! panel until [`Ssd1306::update_screen`] pages the buffer out. Every
//! command byte is its own `[0x00, cmd]` transaction and each page of data
//! goes out as a single `[0x40, ..128 bytes]` transaction.
//!
//! The driver never opens, initializes or closes the bridge. Hand it an
//! open bridge already in I2C master mode, in whatever ownership form suits
//! the caller (see [`crate::hw_trait`]).

pub mod command;
pub mod dissect;
pub mod font;
pub mod framebuffer;

use std::fmt;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use crate::error::Error;
use crate::hw_trait::I2cBus;
use crate::sink::{self, SharedSink};

pub use command::{HEIGHT, PAGES, WIDTH};
pub use font::FontDef;
pub use framebuffer::{Color, Framebuffer};

/// Usual I2C address of an SSD1306 module (0x3D with SA0 high).
pub const DEFAULT_ADDRESS: u8 = 0x3C;

/// Settle time before the first command after power-up.
pub const POWER_ON_DELAY: Duration = Duration::from_millis(100);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    #[error("I2C device is not open")]
    NotReady,
    #[error("Display not initialized")]
    NotInitialized,
    #[error("Failed to write command 0x{command:02X}: {source}")]
    Command { command: u8, source: Error },
    #[error("Failed to write page data {page}: {source}")]
    Page { page: u8, source: Error },
}

/// An SSD1306 panel on an I2C bus.
pub struct Ssd1306<B: I2cBus> {
    bus: B,
    address: u8,
    framebuffer: Framebuffer,
    cursor: (i32, i32),
    inverted: bool,
    initialized: bool,
    power_on_delay: Duration,
    sink: SharedSink,
}

impl<B: I2cBus> fmt::Debug for Ssd1306<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ssd1306")
            .field("address", &format_args!("0x{:02x}", self.address))
            .field("cursor", &self.cursor)
            .field("inverted", &self.inverted)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl<B: I2cBus> Ssd1306<B> {
    pub fn new(bus: B, address: u8) -> Self {
        Self {
            bus,
            address,
            framebuffer: Framebuffer::new(),
            cursor: (0, 0),
            inverted: false,
            initialized: false,
            power_on_delay: POWER_ON_DELAY,
            sink: sink::noop(),
        }
    }

    pub fn with_log_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Override the settle delay `init` waits before talking to the panel.
    pub fn with_power_on_delay(mut self, delay: Duration) -> Self {
        self.power_on_delay = delay;
        self
    }

    fn log(&self, message: impl AsRef<str>) {
        self.sink.emit(&format!("[SSD1306] {}", message.as_ref()));
    }

    // Report a failure through the sink, then hand it back.
    fn fail(&self, err: DisplayError) -> DisplayError {
        self.log(err.to_string());
        err
    }

    fn write_command(&self, opcode: u8) -> Result<(), DisplayError> {
        trace!("ssd1306 0x{:02x} cmd 0x{:02x} {}", self.address, opcode, command::name(opcode));
        self.bus
            .write(self.address, &[command::CONTROL_COMMAND, opcode])
            .map_err(|source| DisplayError::Command {
                command: opcode,
                source,
            })
    }

    fn write_commands(&self, commands: &[u8]) -> Result<(), DisplayError> {
        commands.iter().try_for_each(|&opcode| self.write_command(opcode))
    }

    fn write_data(&self, data: &[u8]) -> Result<(), Error> {
        let mut payload = Vec::with_capacity(data.len() + 1);
        payload.push(command::CONTROL_DATA);
        payload.extend_from_slice(data);
        self.bus.write(self.address, &payload)
    }

    fn require_initialized(&self) -> Result<(), DisplayError> {
        if self.initialized {
            Ok(())
        } else {
            Err(DisplayError::NotInitialized)
        }
    }

    /// Configure the panel, then clear and flush it.
    ///
    /// Calling it again on an initialized display is a no-op. On failure the
    /// display stays uninitialized.
    pub fn init(&mut self) -> Result<(), DisplayError> {
        if self.initialized {
            self.log("Display already initialized");
            return Ok(());
        }
        if !self.bus.is_ready() {
            return Err(self.fail(DisplayError::NotReady));
        }

        if !self.power_on_delay.is_zero() {
            thread::sleep(self.power_on_delay);
        }

        if let Err(err) = self.write_commands(&command::INIT_SEQUENCE) {
            self.log(format!("Initialization failed: {}", err));
            return Err(err);
        }

        self.framebuffer.fill(Color::Black);
        self.inverted = false;
        // flush reports its own failure.
        self.flush()?;

        self.cursor = (0, 0);
        self.initialized = true;
        debug!(address = self.address, "SSD1306 initialized");
        self.log("Display initialized successfully");
        Ok(())
    }

    /// Send the framebuffer to the panel, page 0 through 7.
    ///
    /// Stops at the first failing page; pages already sent stay on the panel.
    pub fn update_screen(&mut self) -> Result<(), DisplayError> {
        if let Err(err) = self.require_initialized() {
            return Err(self.fail(err));
        }
        self.flush()
    }

    fn flush(&self) -> Result<(), DisplayError> {
        for page in 0..PAGES as u8 {
            let page_err = |source| DisplayError::Page { page, source };
            let setup = [
                command::SET_PAGE_START | page,
                command::SET_LOW_COLUMN,
                command::SET_HIGH_COLUMN,
            ];
            for opcode in setup {
                self.bus
                    .write(self.address, &[command::CONTROL_COMMAND, opcode])
                    .map_err(|source| self.fail(page_err(source)))?;
            }
            self.write_data(self.framebuffer.page(page as usize))
                .map_err(|source| self.fail(page_err(source)))?;
        }
        Ok(())
    }

    /// Enable the charge pump and turn the panel on.
    pub fn display_on(&mut self) -> Result<(), DisplayError> {
        self.require_initialized()?;
        self.write_commands(&[
            command::CHARGE_PUMP,
            command::CHARGE_PUMP_ENABLE,
            command::DISPLAY_ON,
        ])
        .map_err(|err| self.fail(err))?;
        self.log("Display turned ON");
        Ok(())
    }

    pub fn display_off(&mut self) -> Result<(), DisplayError> {
        self.require_initialized()?;
        self.write_command(command::DISPLAY_OFF)
            .map_err(|err| self.fail(err))?;
        self.log("Display turned OFF");
        Ok(())
    }

    pub fn set_contrast(&mut self, contrast: u8) -> Result<(), DisplayError> {
        self.require_initialized()?;
        self.write_commands(&[command::SET_CONTRAST, contrast])
            .map_err(|err| self.fail(err))?;
        self.log(format!("Contrast set to {}", contrast));
        Ok(())
    }

    /// Set the inversion state, toggling only if it differs.
    pub fn invert_display(&mut self, invert: bool) -> Result<(), DisplayError> {
        self.require_initialized()?;
        if invert != self.inverted {
            self.toggle_invert()?;
        }
        Ok(())
    }

    /// Flip the inversion state.
    ///
    /// The panel's invert command goes out first; only once it succeeds is
    /// every framebuffer byte complemented and the flag flipped.
    pub fn toggle_invert(&mut self) -> Result<(), DisplayError> {
        self.require_initialized()?;
        let opcode = if self.inverted {
            command::NORMAL_DISPLAY
        } else {
            command::INVERT_DISPLAY
        };
        self.write_command(opcode).map_err(|err| self.fail(err))?;

        self.framebuffer.invert();
        self.inverted = !self.inverted;
        self.log(format!(
            "Display invert {}",
            if self.inverted { "enabled" } else { "disabled" }
        ));
        Ok(())
    }

    pub fn fill(&mut self, color: Color) {
        self.framebuffer.fill(color);
    }

    pub fn clear(&mut self) {
        self.fill(Color::Black);
    }

    /// Move the text cursor, clamped to the last column and row.
    pub fn set_cursor(&mut self, x: i32, y: i32) {
        self.cursor = (x.clamp(0, WIDTH as i32 - 1), y.clamp(0, HEIGHT as i32 - 1));
    }

    pub fn cursor(&self) -> (i32, i32) {
        self.cursor
    }

    pub fn draw_pixel(&mut self, x: i32, y: i32, color: Color) {
        self.framebuffer.draw_pixel(x, y, color);
    }

    pub fn pixel(&self, x: i32, y: i32) -> bool {
        self.framebuffer.pixel(x, y)
    }

    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
        self.framebuffer.draw_line(x0, y0, x1, y1, color);
    }

    pub fn draw_rectangle(&mut self, x: i32, y: i32, width: i32, height: i32, color: Color) {
        self.framebuffer.draw_rectangle(x, y, width, height, color);
    }

    pub fn draw_filled_rectangle(&mut self, x: i32, y: i32, width: i32, height: i32, color: Color) {
        self.framebuffer.draw_filled_rectangle(x, y, width, height, color);
    }

    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: Color) {
        self.framebuffer.draw_circle(cx, cy, radius, color);
    }

    pub fn draw_filled_circle(&mut self, cx: i32, cy: i32, radius: i32, color: Color) {
        self.framebuffer.draw_filled_circle(cx, cy, radius, color);
    }

    pub fn draw_triangle(&mut self, a: (i32, i32), b: (i32, i32), c: (i32, i32), color: Color) {
        self.framebuffer.draw_triangle(a, b, c, color);
    }

    pub fn draw_filled_triangle(&mut self, a: (i32, i32), b: (i32, i32), c: (i32, i32), color: Color) {
        self.framebuffer.draw_filled_triangle(a, b, c, color);
    }

    /// Draw one character at the cursor and advance it by the glyph width.
    ///
    /// Returns false, leaving the cursor alone, when the character is not in
    /// the font or the glyph would not fit in the remaining space.
    pub fn put_char(&mut self, ch: char, font: &FontDef<'_>, color: Color) -> bool {
        let (x, y) = self.cursor;
        if !self.framebuffer.draw_glyph(x, y, ch, font, color) {
            return false;
        }
        self.cursor.0 += font.width() as i32;
        true
    }

    /// Draw a string, stopping at the first character that cannot be drawn.
    ///
    /// `Err` carries that character.
    pub fn put_string(&mut self, text: &str, font: &FontDef<'_>, color: Color) -> Result<(), char> {
        for ch in text.chars() {
            if !self.put_char(ch, font, color) {
                return Err(ch);
            }
        }
        Ok(())
    }

    /// Formatted text at the cursor, e.g.
    /// `oled.print(&font, Color::White, format_args!("{:.1} C", t))`.
    pub fn print(&mut self, font: &FontDef<'_>, color: Color, args: fmt::Arguments<'_>) -> Result<(), char> {
        let text = fmt::format(args);
        self.put_string(&text, font, color)
    }

    pub fn width(&self) -> usize {
        WIDTH
    }

    pub fn height(&self) -> usize {
        HEIGHT
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Give the bus back. The panel is left as it is.
    pub fn release(self) -> B {
        self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::native::NativeStatus;
    use crate::bridge::sim::{SimChip, SimDriver};
    use crate::bridge::{BridgeDevice, I2cSpeed};
    use parking_lot::Mutex;
    use std::sync::Arc;

    const ADDR: u8 = 0x3C;

    fn bench() -> (Arc<SimDriver>, BridgeDevice) {
        let driver = Arc::new(SimDriver::new().with_chip(SimChip::ft4222("FT4222", "S1")));
        driver.add_ssd1306(ADDR);
        let device = BridgeDevice::connect(driver.clone(), 0).unwrap();
        device.init_i2c_master(I2cSpeed::S400K).unwrap();
        (driver, device)
    }

    fn display<B: I2cBus>(bus: B) -> Ssd1306<B> {
        Ssd1306::new(bus, ADDR).with_power_on_delay(Duration::ZERO)
    }

    // Glyphs 4 wide, 2 tall; every glyph is a solid top row.
    fn font_data() -> Vec<u16> {
        let mut data = vec![0u16; font::GLYPH_COUNT * 2];
        for glyph in data.chunks_mut(2) {
            glyph[0] = 0xF000;
        }
        data
    }

    #[test]
    fn test_init_sends_each_command_alone() {
        let (driver, device) = bench();
        let mut oled = display(&device);
        oled.init().unwrap();

        let writes = driver.i2c_writes(ADDR);
        let (init, flush) = writes.split_at(command::INIT_SEQUENCE.len());
        for (payload, &cmd) in init.iter().zip(command::INIT_SEQUENCE.iter()) {
            assert_eq!(payload, &vec![0x00, cmd]);
        }
        assert_eq!(flush.len(), PAGES * 4);

        let panel = driver.panel(ADDR).unwrap();
        assert!(panel.is_on());
        assert!(panel.charge_pump());
        assert_eq!(panel.contrast(), 0xFF);
        assert_eq!(oled.cursor(), (0, 0));
    }

    #[test]
    fn test_init_is_idempotent() {
        let (driver, device) = bench();
        let mut oled = display(&device);
        oled.init().unwrap();
        let sent = driver.i2c_writes(ADDR).len();

        oled.init().unwrap();
        assert_eq!(driver.i2c_writes(ADDR).len(), sent);
    }

    #[test]
    fn test_init_requires_ready_bus() {
        let driver = Arc::new(SimDriver::new().with_chip(SimChip::ft4222("FT4222", "S1")));
        let device = BridgeDevice::connect(driver, 0).unwrap();
        let mut oled = display(&device);
        assert_eq!(oled.init(), Err(DisplayError::NotReady));
        assert!(!oled.is_initialized());
    }

    #[test]
    fn test_failed_init_stays_uninitialized() {
        let (driver, device) = bench();
        driver.fail_i2c_write(4, NativeStatus::IO_ERROR);
        let messages = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink: SharedSink = {
            let messages = messages.clone();
            Arc::new(move |m: &str| messages.lock().push(m.to_string()))
        };

        let mut oled = display(&device).with_log_sink(sink);
        let err = oled.init().unwrap_err();
        assert!(matches!(err, DisplayError::Command { command: 0x81, .. }));
        assert!(!oled.is_initialized());
        assert_eq!(
            messages.lock().iter().filter(|m| m.contains("Initialization failed")).count(),
            1
        );

        assert_eq!(oled.update_screen(), Err(DisplayError::NotInitialized));
    }

    #[test]
    fn test_init_flush_failure_is_logged_once() {
        let (driver, device) = bench();
        // Every init command goes through, then the first page setup fails.
        driver.fail_i2c_write(command::INIT_SEQUENCE.len(), NativeStatus::IO_ERROR);
        let messages = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink: SharedSink = {
            let messages = messages.clone();
            Arc::new(move |m: &str| messages.lock().push(m.to_string()))
        };

        let mut oled = display(&device).with_log_sink(sink);
        let err = oled.init().unwrap_err();
        assert!(matches!(err, DisplayError::Page { page: 0, .. }));
        assert!(!oled.is_initialized());

        let messages = messages.lock();
        assert_eq!(*messages, vec![format!("[SSD1306] {}", err)]);
    }

    #[test]
    fn test_update_screen_matches_panel() {
        let (driver, device) = bench();
        let mut oled = display(&device);
        oled.init().unwrap();

        oled.draw_line(0, 0, 127, 63, Color::White);
        oled.draw_filled_circle(90, 20, 10, Color::White);
        oled.update_screen().unwrap();

        let panel = driver.panel(ADDR).unwrap();
        for page in 0..PAGES {
            assert_eq!(&panel.page(page)[..], oled.framebuffer().page(page));
        }
    }

    #[test]
    fn test_invert_toggles_buffer_and_panel() {
        let (driver, device) = bench();
        let mut oled = display(&device);
        oled.init().unwrap();
        oled.draw_pixel(3, 3, Color::White);

        oled.invert_display(true).unwrap();
        assert!(oled.is_inverted());
        assert!(!oled.pixel(3, 3));
        assert!(oled.pixel(4, 4));
        assert!(driver.panel(ADDR).unwrap().is_inverted());

        // Already inverted: nothing to do.
        let sent = driver.i2c_writes(ADDR).len();
        oled.invert_display(true).unwrap();
        assert_eq!(driver.i2c_writes(ADDR).len(), sent);

        oled.toggle_invert().unwrap();
        assert!(!oled.is_inverted());
        assert!(oled.pixel(3, 3));
        assert!(!driver.panel(ADDR).unwrap().is_inverted());
    }

    #[test]
    fn test_failed_invert_leaves_state() {
        let (driver, device) = bench();
        let mut oled = display(&device);
        oled.init().unwrap();
        oled.draw_pixel(1, 1, Color::White);

        driver.fail_i2c_write(0, NativeStatus::IO_ERROR);
        assert!(oled.toggle_invert().is_err());
        assert!(!oled.is_inverted());
        assert!(oled.pixel(1, 1));
    }

    #[test]
    fn test_power_and_contrast_commands() {
        let (driver, device) = bench();
        let mut oled = display(&device);
        assert_eq!(oled.set_contrast(0x10), Err(DisplayError::NotInitialized));

        oled.init().unwrap();
        driver.clear_transcript();
        oled.display_off().unwrap();
        assert!(!driver.panel(ADDR).unwrap().is_on());
        oled.display_on().unwrap();
        oled.set_contrast(0x10).unwrap();

        assert_eq!(
            driver.i2c_writes(ADDR),
            vec![
                vec![0x00, 0xAE],
                vec![0x00, 0x8D],
                vec![0x00, 0x14],
                vec![0x00, 0xAF],
                vec![0x00, 0x81],
                vec![0x00, 0x10],
            ]
        );
        let panel = driver.panel(ADDR).unwrap();
        assert!(panel.is_on());
        assert_eq!(panel.contrast(), 0x10);
    }

    #[test]
    fn test_drawing_never_flushes() {
        let (driver, device) = bench();
        let mut oled = display(&device);
        oled.init().unwrap();
        driver.clear_transcript();

        oled.fill(Color::White);
        oled.draw_rectangle(0, 0, 10, 10, Color::Black);
        oled.clear();
        assert!(driver.transcript().is_empty());
    }

    #[test]
    fn test_put_string_advances_and_stops() {
        let (_driver, device) = bench();
        let data = font_data();
        let font = FontDef::new(4, 2, &data).unwrap();
        let mut oled = display(&device);

        assert_eq!(oled.put_string("ab", &font, Color::White), Ok(()));
        assert_eq!(oled.cursor(), (8, 0));
        assert!(oled.pixel(0, 0) && oled.pixel(7, 0));
        assert!(!oled.pixel(0, 1));

        assert_eq!(oled.put_string("x\ty", &font, Color::White), Err('\t'));
        assert_eq!(oled.cursor(), (12, 0));

        oled.set_cursor(125, 0);
        assert!(!oled.put_char('z', &font, Color::White));
        assert_eq!(oled.cursor(), (125, 0));

        oled.set_cursor(0, 10);
        assert_eq!(
            oled.print(&font, Color::White, format_args!("{}", 42)),
            Ok(())
        );
        assert_eq!(oled.cursor(), (8, 10));
    }

    #[test]
    fn test_glyph_background_uses_inverse_color() {
        let (_driver, device) = bench();
        let data = font_data();
        let font = FontDef::new(4, 2, &data).unwrap();
        let mut oled = display(&device);
        oled.fill(Color::White);

        assert!(oled.put_char('A', &font, Color::White));
        assert!(oled.pixel(0, 0));
        assert!(!oled.pixel(0, 1));
    }

    #[test]
    fn test_set_cursor_clamps() {
        let (_driver, device) = bench();
        let mut oled = display(&device);
        oled.set_cursor(500, -4);
        assert_eq!(oled.cursor(), (127, 0));
    }

    #[test]
    fn test_ownership_modes() {
        let (driver, device) = bench();

        // Shared owner.
        let shared = Arc::new(device);
        let mut oled = display(shared.clone());
        oled.init().unwrap();
        assert_eq!(Arc::strong_count(&shared), 2);
        drop(oled);
        assert!(shared.is_open());

        // Sole owner; the bridge comes back out intact.
        let device = Arc::try_unwrap(shared).unwrap();
        let mut oled = display(device);
        oled.init().unwrap();
        let device = oled.release();
        assert!(device.is_open());
        drop(device);
        assert_eq!(driver.open_handles(), 0);
    }
}

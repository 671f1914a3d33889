//! Command-line interface for FT4222 bridges.
//!
//! Lists attached bridges, scans and reads the I2C bus, and drives the
//! PCF8523 clock, the GPIO pins and an SSD1306 panel. With `--simulate`
//! everything runs against an in-memory bridge, and OLED commands print the
//! decoded panel traffic.
//!
//! ```bash
//! ftbridge-cli list --json
//! ftbridge-cli scan --start 0x08 --end 0x77
//! ftbridge-cli read --address 0x50 --offset 0x00 --length 32
//! ftbridge-cli write --address 0x50 --offset 0x10 de ad be ef
//! ftbridge-cli rtc control
//! ftbridge-cli rtc set "2024-06-01 12:00:00"
//! ftbridge-cli --simulate oled pattern
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing_subscriber::filter::LevelFilter;

use ftbridge::bridge::sim::SimDriver;
use ftbridge::bridge::{
    BridgeDevice, DeviceEnumerator, Driver, GpioDir, GpioPort, I2cFlags,
};
use ftbridge::config::Config;
use ftbridge::display::dissect::dissect;
use ftbridge::display::{Color, Ssd1306, HEIGHT, WIDTH};
use ftbridge::hw_trait::I2cBus;
use ftbridge::peripheral::pcf8523::Pcf8523;
use ftbridge::sink::{SharedSink, TracingSink};
use ftbridge::tracing::{self, prelude::*};

#[derive(Parser)]
#[command(name = "ftbridge-cli")]
#[command(version)]
#[command(about = "Talk to devices behind an FT4222 USB bridge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: $FTBRIDGE_CONFIG or the per-user file)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Open the bridge at this vendor-list index
    #[arg(long, global = true)]
    index: Option<u32>,

    /// Open the bridge with this serial number
    #[arg(long, global = true, conflicts_with = "index")]
    serial: Option<String>,

    /// Use a simulated bridge instead of hardware
    #[arg(long, global = true)]
    simulate: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached FT4222 bridges
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan the I2C bus for responding addresses
    Scan {
        #[arg(long, value_parser = parse_u8)]
        start: Option<u8>,
        #[arg(long, value_parser = parse_u8)]
        end: Option<u8>,
    },

    /// Read registers from an I2C device
    Read {
        #[arg(short, long, value_parser = parse_u8)]
        address: u8,
        #[arg(short, long, value_parser = parse_u8, default_value = "0")]
        offset: u8,
        #[arg(short, long, default_value_t = 16)]
        length: usize,
    },

    /// Write bytes to an I2C device's registers, starting at an offset
    Write {
        #[arg(short, long, value_parser = parse_u8)]
        address: u8,
        #[arg(short, long, value_parser = parse_u8, default_value = "0")]
        offset: u8,
        /// Hex bytes, e.g. "deadbeef" or "de ad be ef"
        #[arg(required = true)]
        data: Vec<String>,
    },

    /// PCF8523 real-time clock
    #[command(subcommand)]
    Rtc(RtcCommands),

    /// GPIO pins
    #[command(subcommand)]
    Gpio(GpioCommands),

    /// SSD1306 OLED panel
    #[command(subcommand)]
    Oled(OledCommands),
}

#[derive(Subcommand)]
enum RtcCommands {
    /// Print the clock's time (UTC)
    Get,
    /// Set the clock, e.g. "2024-06-01 12:00:00"
    Set { datetime: String },
    /// Set the clock from the system time
    Sync,
    /// Decode the control registers
    Control,
}

#[derive(Subcommand)]
enum GpioCommands {
    /// Read all pins, or one
    Read {
        #[arg(value_parser = clap::value_parser!(u8).range(0..4))]
        port: Option<u8>,
    },
    /// Drive a pin high (1) or low (0)
    Write {
        #[arg(value_parser = clap::value_parser!(u8).range(0..4))]
        port: u8,
        #[arg(value_parser = clap::value_parser!(u8).range(0..2))]
        level: u8,
    },
}

#[derive(Subcommand)]
enum OledCommands {
    /// Draw a test pattern
    Pattern,
    /// Light every pixel
    Fill,
    /// Blank the panel
    Clear,
}

/// Parse a byte given in decimal or `0x` hex.
fn parse_u8(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid byte '{}': {}", s, e))
}

/// Hex bytes from one or more words, with or without `0x`.
fn parse_hex(words: &[String]) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for word in words {
        let digits = word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")).unwrap_or(word);
        bytes.extend(hex::decode(digits).with_context(|| format!("invalid hex '{}'", word))?);
    }
    if bytes.is_empty() {
        bail!("nothing to write");
    }
    Ok(bytes)
}

fn parse_datetime(s: &str) -> Result<PrimitiveDateTime> {
    let normalized = s.trim().replacen('T', " ", 1);
    PrimitiveDateTime::parse(
        &normalized,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .with_context(|| format!("expected YYYY-MM-DD HH:MM:SS, got '{}'", s))
}

/// Driver plus, when simulating, the bench behind it.
struct Backend {
    driver: Arc<dyn Driver>,
    sim: Option<Arc<SimDriver>>,
}

impl Backend {
    fn new(simulate: bool) -> Result<Self> {
        if simulate {
            let sim = Arc::new(SimDriver::demo());
            return Ok(Self {
                driver: sim.clone(),
                sim: Some(sim),
            });
        }
        hardware()
    }
}

#[cfg(feature = "libft4222")]
fn hardware() -> Result<Backend> {
    Ok(Backend {
        driver: Arc::new(ftbridge::bridge::ffi::Ft4222Driver),
        sim: None,
    })
}

#[cfg(not(feature = "libft4222"))]
fn hardware() -> Result<Backend> {
    bail!("built without the libft4222 feature; pass --simulate to use a simulated bridge")
}

struct App {
    config: Config,
    backend: Backend,
    sink: SharedSink,
}

impl App {
    fn open(&self) -> Result<BridgeDevice> {
        let device = BridgeDevice::new(self.backend.driver.clone()).with_log_sink(self.sink.clone());
        match &self.config.device.serial {
            Some(serial) => device
                .open_by_serial(serial)
                .with_context(|| format!("failed to open bridge with serial {}", serial))?,
            None => {
                let index = self.config.device.index;
                device
                    .open(index)
                    .with_context(|| format!("failed to open bridge #{}", index))?
            }
        }
        if let Some(rate) = self.config.device.clock {
            device.set_clock_rate(rate)?;
        }
        Ok(device)
    }

    fn open_i2c(&self) -> Result<BridgeDevice> {
        let device = self.open()?;
        device.init_i2c_master(self.config.i2c.speed)?;
        Ok(device)
    }

    fn list(&self, json: bool) -> Result<()> {
        let devices = DeviceEnumerator::list_devices(self.backend.driver.as_ref())?;
        if json {
            println!("{}", serde_json::to_string_pretty(&devices)?);
        } else if devices.is_empty() {
            println!("No FT4222 devices found");
        } else {
            for device in &devices {
                println!("{}", device.label());
            }
        }
        Ok(())
    }

    fn scan(&self, start: Option<u8>, end: Option<u8>) -> Result<()> {
        let device = self.open_i2c()?;
        let start = start.unwrap_or(self.config.scan.start);
        let end = end.unwrap_or(self.config.scan.end);

        let found = device.scan_i2c_bus(start, end, I2cFlags::START_AND_STOP);
        // Leave the bus idle whatever the scan did to it.
        device.i2c_master_reset_bus()?;

        let found = found?;
        if found.is_empty() {
            println!("No devices found");
        }
        for address in found {
            println!("0x{:02x}", address);
        }
        Ok(())
    }

    fn read(&self, address: u8, offset: u8, length: usize) -> Result<()> {
        let device = self.open_i2c()?;
        let mut buffer = vec![0u8; length];
        let received = I2cBus::write_read(&device, address, &[offset], &mut buffer)?;
        if received < length {
            warn!("Short read: {} of {} bytes", received, length);
        }

        for (row, chunk) in buffer[..received].chunks(16).enumerate() {
            let reg = offset as usize + row * 16;
            println!("{:02x}: {}", reg, hex::encode(chunk));
        }
        Ok(())
    }

    fn write(&self, address: u8, offset: u8, data: &[String]) -> Result<()> {
        let data = parse_hex(data)?;
        let device = self.open_i2c()?;
        device
            .write_register(address, offset, &data)
            .with_context(|| format!("write to 0x{:02x} failed", address))?;
        println!("Wrote {} bytes to 0x{:02x} at 0x{:02x}", data.len(), address, offset);
        Ok(())
    }

    fn rtc(&self, command: RtcCommands) -> Result<()> {
        let device = self.open_i2c()?;
        let rtc = Pcf8523::with_address(&device, self.config.rtc.address);
        match command {
            RtcCommands::Get => {}
            RtcCommands::Control => {
                println!("{}", rtc.read_control()?);
                return Ok(());
            }
            RtcCommands::Set { datetime } => rtc.set_time(parse_datetime(&datetime)?)?,
            RtcCommands::Sync => {
                let now = OffsetDateTime::now_utc();
                rtc.set_time(PrimitiveDateTime::new(now.date(), now.time()))?;
            }
        }
        println!("{} UTC", rtc.read_time()?);
        Ok(())
    }

    fn gpio(&self, command: GpioCommands) -> Result<()> {
        let device = self.open()?;
        match command {
            GpioCommands::Read { port } => {
                device.init_gpio([GpioDir::Input; 4])?;
                let ports: Vec<GpioPort> = match port {
                    Some(p) => GpioPort::from_index(p).into_iter().collect(),
                    None => GpioPort::ALL.to_vec(),
                };
                for port in ports {
                    println!("{}: {}", port, u8::from(device.read_gpio(port)?));
                }
            }
            GpioCommands::Write { port, level } => {
                let Some(port) = GpioPort::from_index(port) else {
                    bail!("no GPIO port {}", port);
                };
                let mut dirs = [GpioDir::Input; 4];
                dirs[port.index()] = GpioDir::Output;
                device.init_gpio(dirs)?;
                device.write_gpio(port, level != 0)?;
                println!("{}: {}", port, level);
            }
        }
        Ok(())
    }

    fn oled(&self, command: OledCommands) -> Result<()> {
        let device = self.open_i2c()?;
        let address = self.config.display.address;
        let mut oled = Ssd1306::new(&device, address).with_log_sink(self.sink.clone());
        oled.init()?;

        match command {
            OledCommands::Pattern => draw_pattern(&mut oled),
            OledCommands::Fill => oled.fill(Color::White),
            OledCommands::Clear => oled.clear(),
        }
        oled.update_screen()?;

        if let Some(sim) = &self.backend.sim {
            for transfer in dissect(sim.i2c_writes(address)) {
                println!("{}", transfer);
            }
        }
        Ok(())
    }
}

fn draw_pattern<B: I2cBus>(oled: &mut Ssd1306<B>) {
    let (w, h) = (WIDTH as i32, HEIGHT as i32);
    oled.draw_rectangle(0, 0, w, h, Color::White);
    oled.draw_line(0, 0, w - 1, h - 1, Color::White);
    oled.draw_line(0, h - 1, w - 1, 0, Color::White);
    oled.draw_circle(w / 4, h / 2, 14, Color::White);
    oled.draw_filled_circle(3 * w / 4, h / 2, 10, Color::White);
    oled.draw_filled_triangle((w / 2 - 8, h - 6), (w / 2 + 8, h - 6), (w / 2, h - 20), Color::White);
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing::init_stdout(LevelFilter::DEBUG);
    } else {
        tracing::init_journald_or_stdout();
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(index) = cli.index {
        config.device.index = index;
        config.device.serial = None;
    }
    if let Some(serial) = cli.serial {
        config.device.serial = Some(serial);
    }
    debug!("Configuration: {:?}", config);

    let app = App {
        config,
        backend: Backend::new(cli.simulate)?,
        sink: Arc::new(TracingSink),
    };

    match cli.command {
        Commands::List { json } => app.list(json),
        Commands::Scan { start, end } => app.scan(start, end),
        Commands::Read {
            address,
            offset,
            length,
        } => app.read(address, offset, length),
        Commands::Write {
            address,
            offset,
            data,
        } => app.write(address, offset, &data),
        Commands::Rtc(command) => app.rtc(command),
        Commands::Gpio(command) => app.gpio(command),
        Commands::Oled(command) => app.oled(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(&["deadbeef"], &[0xDE, 0xAD, 0xBE, 0xEF])]
    #[test_case(&["de", "ad", "0xBE"], &[0xDE, 0xAD, 0xBE])]
    #[test_case(&["00"], &[0x00])]
    fn test_parse_hex(words: &[&str], expected: &[u8]) {
        let words: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        assert_eq!(parse_hex(&words).unwrap(), expected);
    }

    #[test_case(&["abc"]; "odd digits")]
    #[test_case(&["zz"]; "not hex")]
    #[test_case(&["0x"]; "empty")]
    fn test_parse_hex_rejects(words: &[&str]) {
        let words: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        assert!(parse_hex(&words).is_err());
    }

    #[test]
    fn test_write_then_read_back_on_simulated_bridge() {
        let args = ["ftbridge-cli", "--simulate", "write", "-a", "0x50", "-o", "0x10", "cafe"];
        let cli = Cli::try_parse_from(args).unwrap();
        let Commands::Write { address, offset, data } = cli.command else {
            panic!("parsed as another command");
        };
        let app = App {
            config: Config::default(),
            backend: Backend::new(true).unwrap(),
            sink: ftbridge::sink::noop(),
        };
        app.write(address, offset, &data).unwrap();

        let sim = app.backend.sim.as_ref().unwrap();
        assert_eq!(sim.register(0x50, 0x10), Some(0xCA));
        assert_eq!(sim.register(0x50, 0x11), Some(0xFE));
    }

    #[test]
    fn test_rtc_control_parses() {
        let cli = Cli::try_parse_from(["ftbridge-cli", "rtc", "control"]).unwrap();
        assert!(matches!(cli.command, Commands::Rtc(RtcCommands::Control)));
    }
}

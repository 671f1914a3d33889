//! SSD1306 driver and framebuffer behavior against the simulated bridge.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ftbridge::bridge::sim::{SimChip, SimDriver};
use ftbridge::bridge::{BridgeDevice, I2cSpeed, NativeStatus};
use ftbridge::display::dissect::{dissect, Transfer};
use ftbridge::display::{Color, DisplayError, Framebuffer, Ssd1306, DEFAULT_ADDRESS, HEIGHT, WIDTH};
use ftbridge::ErrorKind;
use test_case::test_case;

fn bench() -> (Arc<SimDriver>, BridgeDevice) {
    let driver = Arc::new(SimDriver::new().with_chip(SimChip::ft4222("FT4222 A", "SIM00001")));
    driver.add_ssd1306(DEFAULT_ADDRESS);
    let device = BridgeDevice::connect(driver.clone(), 0).unwrap();
    device.init_i2c_master(I2cSpeed::S400K).unwrap();
    (driver, device)
}

fn lit(fb: &Framebuffer) -> HashSet<(i32, i32)> {
    (0..HEIGHT as i32)
        .flat_map(|y| (0..WIDTH as i32).map(move |x| (x, y)))
        .filter(|&(x, y)| fb.pixel(x, y))
        .collect()
}

#[test]
fn update_screen_sends_eight_pages_in_order() {
    let (driver, device) = bench();
    let mut oled = Ssd1306::new(&device, DEFAULT_ADDRESS).with_power_on_delay(Duration::ZERO);
    oled.init().unwrap();
    driver.clear_transcript();

    oled.draw_filled_rectangle(10, 10, 30, 30, Color::White);
    oled.update_screen().unwrap();

    let writes = driver.i2c_writes(DEFAULT_ADDRESS);
    assert_eq!(writes.len(), 8 * 4);
    for (page, seq) in writes.chunks(4).enumerate() {
        assert_eq!(seq[0], vec![0x00, 0xB0 | page as u8]);
        assert_eq!(seq[1], vec![0x00, 0x00]);
        assert_eq!(seq[2], vec![0x00, 0x10]);
        assert_eq!(seq[3].len(), 129);
        assert_eq!(seq[3][0], 0x40);
        assert_eq!(&seq[3][1..], oled.framebuffer().page(page));
    }

    let panel = driver.panel(DEFAULT_ADDRESS).unwrap();
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            assert_eq!(panel.pixel(x, y), oled.pixel(x as i32, y as i32));
        }
    }
}

#[test]
fn update_screen_stops_at_failing_page() {
    let (driver, device) = bench();
    let mut oled = Ssd1306::new(&device, DEFAULT_ADDRESS).with_power_on_delay(Duration::ZERO);
    oled.init().unwrap();
    driver.clear_transcript();

    // Pages 0..=2 take four writes each; the fifth page-3 write never happens.
    driver.fail_i2c_write(3 * 4, NativeStatus::IO_ERROR);
    let err = oled.update_screen().unwrap_err();

    match &err {
        DisplayError::Page { page, source } => {
            assert_eq!(*page, 3);
            assert_eq!(source.kind(), ErrorKind::DeviceIo);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().starts_with("Failed to write page data 3"));

    let pages: Vec<u8> = driver
        .i2c_writes(DEFAULT_ADDRESS)
        .iter()
        .filter(|w| w.len() == 2 && w[0] == 0x00 && (0xB0..=0xB7).contains(&w[1]))
        .map(|w| w[1] & 0x07)
        .collect();
    assert_eq!(pages, vec![0, 1, 2]);
}

#[test]
fn traffic_dissects_into_commands_and_pages() {
    let (driver, device) = bench();
    let mut oled = Ssd1306::new(&device, DEFAULT_ADDRESS).with_power_on_delay(Duration::ZERO);
    oled.init().unwrap();
    oled.set_contrast(0x20).unwrap();

    let transfers = dissect(driver.i2c_writes(DEFAULT_ADDRESS));
    assert!(!transfers.iter().any(|t| matches!(t, Transfer::Malformed(_))));
    let data = transfers
        .iter()
        .filter(|t| matches!(t, Transfer::Data(d) if d.len() == 128))
        .count();
    assert_eq!(data, 8);
    assert_eq!(transfers.last().map(ToString::to_string).as_deref(), Some("SET_CONTRAST 0x20"));
}

#[test_case(0, 0)]
#[test_case(127, 63)]
#[test_case(64, 31)]
#[test_case(5, 60)]
fn pixel_round_trip(x: i32, y: i32) {
    let mut fb = Framebuffer::new();
    fb.draw_pixel(x, y, Color::White);
    assert!(fb.pixel(x, y));
    assert_eq!(fb.lit_count(), 1);
    fb.draw_pixel(x, y, Color::Black);
    assert!(!fb.pixel(x, y));
    assert_eq!(fb, Framebuffer::new());
}

#[test_case(128, 0)]
#[test_case(0, 64)]
#[test_case(-1, 10)]
#[test_case(500, 500)]
fn out_of_range_pixels_are_ignored(x: i32, y: i32) {
    let mut fb = Framebuffer::new();
    fb.fill(Color::White);
    let before = fb.clone();
    fb.draw_pixel(x, y, Color::Black);
    assert_eq!(fb, before);
}

#[test]
fn fill_white_then_black_restores_blank() {
    let mut fb = Framebuffer::new();
    fb.draw_circle(30, 30, 12, Color::White);
    fb.fill(Color::White);
    assert_eq!(fb.lit_count(), WIDTH * HEIGHT);
    fb.fill(Color::Black);
    assert_eq!(fb, Framebuffer::new());
    assert!(fb.as_bytes().iter().all(|&b| b == 0));
}

#[test_case(0, 0, 127, 63)]
#[test_case(3, 60, 120, 2)]
#[test_case(10, 5, 11, 50)]
fn lines_are_direction_independent(x0: i32, y0: i32, x1: i32, y1: i32) {
    let mut forward = Framebuffer::new();
    forward.draw_line(x0, y0, x1, y1, Color::White);
    let mut backward = Framebuffer::new();
    backward.draw_line(x1, y1, x0, y0, Color::White);

    assert_eq!(lit(&forward), lit(&backward));
    assert!(forward.pixel(x0, y0) && forward.pixel(x1, y1));
}

// Strictly inside: on the same side of all three edges, never on one.
fn strictly_inside(p: (i32, i32), a: (i32, i32), b: (i32, i32), c: (i32, i32)) -> bool {
    let cross = |o: (i32, i32), u: (i32, i32), v: (i32, i32)| {
        (u.0 - o.0) as i64 * (v.1 - o.1) as i64 - (u.1 - o.1) as i64 * (v.0 - o.0) as i64
    };
    let d = [cross(a, b, p), cross(b, c, p), cross(c, a, p)];
    d.iter().all(|&v| v > 0) || d.iter().all(|&v| v < 0)
}

#[test_case((10, 10), (100, 20), (40, 60))]
#[test_case((0, 63), (127, 63), (64, 0))]
#[test_case((5, 5), (6, 50), (120, 30))]
fn filled_triangle_covers_interior(a: (i32, i32), b: (i32, i32), c: (i32, i32)) {
    let mut fb = Framebuffer::new();
    fb.draw_filled_triangle(a, b, c, Color::White);

    for y in 0..HEIGHT as i32 {
        for x in 0..WIDTH as i32 {
            if strictly_inside((x, y), a, b, c) {
                assert!(fb.pixel(x, y), "({x}, {y}) not filled");
            }
        }
    }
}

#[test]
fn filled_triangle_grows_with_area() {
    let shape = [(0, 0), (6, 1), (2, 5)];
    let mut previous = 0;
    for scale in 1..=10 {
        let [a, b, c] = shape.map(|(x, y)| (2 + x * scale, 1 + y * scale));
        let mut fb = Framebuffer::new();
        fb.draw_filled_triangle(a, b, c, Color::White);
        let count = fb.lit_count();
        assert!(count >= previous, "scale {scale}: {count} < {previous}");
        previous = count;
    }
}

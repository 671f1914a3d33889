//! 1-bit framebuffer and rasterization.
//!
//! Pixel `(x, y)` lives in byte `x + (y / 8) * WIDTH`, bit `y % 8`, which is
//! the SSD1306 GDDRAM layout: each byte is a vertical strip of eight pixels
//! and each run of `WIDTH` bytes is one page.
//!
//! Coordinates are signed so shapes may hang off any edge. Whatever falls
//! outside the panel is dropped; nothing here fails.

use std::ops::Not;

use super::command::{BUFFER_SIZE, HEIGHT, PAGES, WIDTH};
use super::font::FontDef;

const W: i32 = WIDTH as i32;
const H: i32 = HEIGHT as i32;

/// Pixel color on a monochrome panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Black,
    White,
}

impl Not for Color {
    type Output = Color;

    fn not(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }
}

/// A 128x64 monochrome framebuffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer {
    buffer: [u8; BUFFER_SIZE],
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("lit", &self.lit_count())
            .finish()
    }
}

impl Framebuffer {
    /// An all-black buffer.
    pub fn new() -> Self {
        Self {
            buffer: [0; BUFFER_SIZE],
        }
    }

    pub fn as_bytes(&self) -> &[u8; BUFFER_SIZE] {
        &self.buffer
    }

    /// The `WIDTH` bytes of one page.
    pub fn page(&self, page: usize) -> &[u8] {
        let start = (page % PAGES) * WIDTH;
        &self.buffer[start..start + WIDTH]
    }

    /// Number of lit pixels.
    pub fn lit_count(&self) -> usize {
        self.buffer.iter().map(|b| b.count_ones() as usize).sum()
    }

    fn locate(x: i32, y: i32) -> Option<(usize, u8)> {
        if !(0..W).contains(&x) || !(0..H).contains(&y) {
            return None;
        }
        let index = x as usize + (y as usize / 8) * WIDTH;
        Some((index, 1 << (y % 8)))
    }

    /// Whether a pixel is lit. Off-panel pixels read as unlit.
    pub fn pixel(&self, x: i32, y: i32) -> bool {
        Self::locate(x, y).is_some_and(|(index, mask)| self.buffer[index] & mask != 0)
    }

    pub fn draw_pixel(&mut self, x: i32, y: i32, color: Color) {
        if let Some((index, mask)) = Self::locate(x, y) {
            match color {
                Color::White => self.buffer[index] |= mask,
                Color::Black => self.buffer[index] &= !mask,
            }
        }
    }

    pub fn fill(&mut self, color: Color) {
        let pattern = match color {
            Color::White => 0xFF,
            Color::Black => 0x00,
        };
        self.buffer.fill(pattern);
    }

    /// Complement every pixel.
    pub fn invert(&mut self) {
        self.buffer.iter_mut().for_each(|b| *b = !*b);
    }

    // Signed 64-bit plot so callers can step past the i32 range.
    fn plot(&mut self, x: i64, y: i64, color: Color) {
        if (0..W as i64).contains(&x) && (0..H as i64).contains(&y) {
            self.draw_pixel(x as i32, y as i32, color);
        }
    }

    fn span(&mut self, x0: i64, x1: i64, y: i64, color: Color) {
        if !(0..H as i64).contains(&y) {
            return;
        }
        let (lo, hi) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        for x in lo.max(0)..=hi.min(W as i64 - 1) {
            self.draw_pixel(x as i32, y as i32, color);
        }
    }

    /// Horizontal span from `x0` to `x1` inclusive, in either order.
    pub fn draw_hline(&mut self, x0: i32, x1: i32, y: i32, color: Color) {
        self.span(x0.into(), x1.into(), y.into(), color);
    }

    /// Integer Bresenham line, endpoints included.
    ///
    /// The endpoints are put in a canonical order before stepping, so a line
    /// and its reverse light exactly the same pixels. Only the steps whose
    /// major coordinate lands on the panel are walked; the decision variable
    /// for the first of them is computed directly.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
        let ((xa, ya), (xb, yb)) = if (x0, y0) <= (x1, y1) {
            ((x0, y0), (x1, y1))
        } else {
            ((x1, y1), (x0, y0))
        };
        let (xa, ya, xb, yb) = (i64::from(xa), i64::from(ya), i64::from(xb), i64::from(yb));

        if (xb - xa).abs() >= (yb - ya).abs() {
            let steps = Steps::new(xa, xb - xa, ya, yb - ya, W as i64);
            steps.for_each(|(x, y)| self.plot(x, y, color));
        } else {
            let steps = Steps::new(ya, yb - ya, xa, xb - xa, H as i64);
            steps.for_each(|(y, x)| self.plot(x, y, color));
        }
    }

    // Clamp a rectangle's far edges to the panel. None when nothing is on it.
    fn clamp_rect(x: i32, y: i32, width: i32, height: i32) -> Option<(i32, i32)> {
        if width <= 0 || height <= 0 || x >= W || y >= H {
            return None;
        }
        let right = x.saturating_add(width - 1).min(W - 1);
        let bottom = y.saturating_add(height - 1).min(H - 1);
        Some((right, bottom))
    }

    /// Outline of a `width` x `height` rectangle with its top-left corner at
    /// `(x, y)`. Edges past the panel are pulled back onto it.
    pub fn draw_rectangle(&mut self, x: i32, y: i32, width: i32, height: i32, color: Color) {
        let Some((right, bottom)) = Self::clamp_rect(x, y, width, height) else {
            return;
        };
        self.draw_line(x, y, right, y, color);
        self.draw_line(x, bottom, right, bottom, color);
        self.draw_line(x, y, x, bottom, color);
        self.draw_line(right, y, right, bottom, color);
    }

    pub fn draw_filled_rectangle(&mut self, x: i32, y: i32, width: i32, height: i32, color: Color) {
        let Some((right, bottom)) = Self::clamp_rect(x, y, width, height) else {
            return;
        };
        for row in y.max(0)..=bottom {
            self.draw_hline(x, right, row, color);
        }
    }

    // Whether a circle can light a panel pixel. Outline points lie between
    // radius - 1 and radius + 1 of the center, so a panel wholly outside that
    // band or wholly inside it sees nothing of the outline.
    fn circle_reach(cx: i64, cy: i64, radius: i64) -> Reach {
        let dist = |dx: i64, dy: i64| i128::from(dx).pow(2) + i128::from(dy).pow(2);
        let (last_x, last_y) = (W as i64 - 1, H as i64 - 1);

        let near = dist(cx - cx.clamp(0, last_x), cy - cy.clamp(0, last_y));
        if near > i128::from(radius + 1).pow(2) {
            return Reach::None;
        }
        let far = dist(cx.abs().max((last_x - cx).abs()), cy.abs().max((last_y - cy).abs()));
        if far < i128::from(radius - 1).pow(2) {
            return Reach::Covers;
        }
        Reach::Edge
    }

    /// Midpoint circle outline.
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: Color) {
        if radius <= 0 {
            return;
        }
        let (cx, cy, r) = (i64::from(cx), i64::from(cy), i64::from(radius));
        if Self::circle_reach(cx, cy, r) != Reach::Edge {
            return;
        }
        self.plot(cx, cy + r, color);
        self.plot(cx, cy - r, color);
        self.plot(cx + r, cy, color);
        self.plot(cx - r, cy, color);

        for (x, y) in Octant::new(r) {
            self.plot(cx + x, cy + y, color);
            self.plot(cx - x, cy + y, color);
            self.plot(cx + x, cy - y, color);
            self.plot(cx - x, cy - y, color);
            self.plot(cx + y, cy + x, color);
            self.plot(cx - y, cy + x, color);
            self.plot(cx + y, cy - x, color);
            self.plot(cx - y, cy - x, color);
        }
    }

    /// Midpoint circle filled with horizontal spans between mirrored points.
    pub fn draw_filled_circle(&mut self, cx: i32, cy: i32, radius: i32, color: Color) {
        if radius <= 0 {
            return;
        }
        let (cx, cy, r) = (i64::from(cx), i64::from(cy), i64::from(radius));
        match Self::circle_reach(cx, cy, r) {
            Reach::None => return,
            Reach::Covers => {
                self.fill(color);
                return;
            }
            Reach::Edge => {}
        }
        self.span(cx - r, cx + r, cy, color);
        self.plot(cx, cy + r, color);
        self.plot(cx, cy - r, color);

        for (x, y) in Octant::new(r) {
            self.span(cx - x, cx + x, cy + y, color);
            self.span(cx - x, cx + x, cy - y, color);
            self.span(cx - y, cx + y, cy + x, color);
            self.span(cx - y, cx + y, cy - x, color);
        }
    }

    pub fn draw_triangle(
        &mut self,
        (x1, y1): (i32, i32),
        (x2, y2): (i32, i32),
        (x3, y3): (i32, i32),
        color: Color,
    ) {
        self.draw_line(x1, y1, x2, y2, color);
        self.draw_line(x2, y2, x3, y3, color);
        self.draw_line(x3, y3, x1, y1, color);
    }

    /// Scanline triangle fill.
    ///
    /// Vertices are sorted by y. Every row between the top and bottom vertex
    /// is spanned from the long edge (top to bottom) to whichever short edge
    /// covers that row, which splits the triangle into a flat-bottom and a
    /// flat-top half at the middle vertex. Edge x positions are interpolated
    /// from the vertices themselves on every row, so no interior pixel is
    /// missed to accumulated rounding.
    pub fn draw_filled_triangle(
        &mut self,
        a: (i32, i32),
        b: (i32, i32),
        c: (i32, i32),
        color: Color,
    ) {
        let mut v = [a, b, c];
        v.sort_by_key(|&(_, y)| y);
        let [(x1, y1), (x2, y2), (x3, y3)] = v;

        if y1 == y3 {
            let lo = x1.min(x2).min(x3);
            let hi = x1.max(x2).max(x3);
            self.draw_hline(lo, hi, y1, color);
            return;
        }

        for y in y1.max(0)..=y3.min(H - 1) {
            let long = edge_x((x1, y1), (x3, y3), y);
            // A flat top never takes the first branch; on a flat bottom the
            // last row reads x2 off the horizontal second edge.
            let short = if y < y2 {
                edge_x((x1, y1), (x2, y2), y)
            } else {
                edge_x((x2, y2), (x3, y3), y)
            };
            self.span(long, short, y.into(), color);
        }
    }

    /// Draw one glyph with its top-left corner at `(x, y)`.
    ///
    /// Set bits take `color`, clear bits the inverse. Returns false, drawing
    /// nothing, for characters outside the font or glyphs that would not fit
    /// on the panel.
    pub fn draw_glyph(&mut self, x: i32, y: i32, ch: char, font: &FontDef<'_>, color: Color) -> bool {
        let Some(rows) = font.glyph(ch) else {
            return false;
        };
        let (width, height) = (font.width() as i32, font.height() as i32);
        if x < 0 || y < 0 || x > W - width || y > H - height {
            return false;
        }

        for (row, &bits) in rows.iter().enumerate() {
            for col in 0..width {
                let on = (bits << col) & 0x8000 != 0;
                self.draw_pixel(x + col, y + row as i32, if on { color } else { !color });
            }
        }
        true
    }
}

/// x of the edge from `a` to `b` at row `y`. `a.1 != b.1` unless the edge
/// is horizontal, in which case `a`'s x is returned.
fn edge_x((xa, ya): (i32, i32), (xb, yb): (i32, i32), y: i32) -> i64 {
    if ya == yb {
        return xa.into();
    }
    let wide = i128::from;
    let (xa, ya, xb, yb, y) = (wide(xa), wide(ya), wide(xb), wide(yb), wide(y));
    // Between xa and xb, so it fits.
    (xa + (xb - xa) * (y - ya) / (yb - ya)) as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reach {
    None,
    Edge,
    Covers,
}

/// Bresenham steps along a major axis, restricted to `0..extent`.
///
/// Step `k` sits at major coordinate `major + k * sign(run)` and minor
/// offset `floor((2k * |rise| + |run|) / (2 |run|))`, ties rounding away
/// from the start. `|run| >= |rise|`.
struct Steps {
    major: i64,
    minor: i64,
    major_step: i64,
    minor_step: i64,
    run: i64,
    rise: i64,
    k: i64,
    last: i64,
    offset: i64,
    err: i64,
}

impl Steps {
    fn new(major: i64, run: i64, minor: i64, rise: i64, extent: i64) -> Self {
        let major_step = if run < 0 { -1 } else { 1 };
        let minor_step = if rise < 0 { -1 } else { 1 };
        let (run, rise) = (run.abs(), rise.abs());

        // Steps whose major coordinate is on the panel.
        let (lo, hi) = if major_step > 0 {
            (-major, extent - 1 - major)
        } else {
            (major - (extent - 1), major)
        };
        let (k, last) = (lo.max(0), hi.min(run));

        let (offset, err) = if run == 0 || k > last {
            (0, 0)
        } else {
            let (k2, run2, rise2) = (i128::from(k), i128::from(run), i128::from(rise));
            let offset = (2 * k2 * rise2 + run2) / (2 * run2);
            let err = 2 * rise2 * (k2 + 1) - run2 - 2 * run2 * offset;
            // offset <= |rise| and -2|run| <= err <= 2|rise|, so both fit.
            (offset as i64, err as i64)
        };

        Self {
            major,
            minor,
            major_step,
            minor_step,
            run,
            rise,
            k,
            last,
            offset,
            err,
        }
    }
}

impl Iterator for Steps {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<(i64, i64)> {
        if self.k > self.last {
            return None;
        }
        let point = (
            self.major + self.k * self.major_step,
            self.minor + self.offset * self.minor_step,
        );
        if self.err >= 0 {
            self.offset += 1;
            self.err -= 2 * self.run;
        }
        self.err += 2 * self.rise;
        self.k += 1;
        Some(point)
    }
}

/// Points of the first octant of a midpoint circle, after the axis points.
struct Octant {
    f: i64,
    ddf_x: i64,
    ddf_y: i64,
    x: i64,
    y: i64,
}

impl Octant {
    fn new(radius: i64) -> Self {
        Self {
            f: 1 - radius,
            ddf_x: 1,
            ddf_y: -2 * radius,
            x: 0,
            y: radius,
        }
    }
}

impl Iterator for Octant {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<(i64, i64)> {
        if self.x >= self.y {
            return None;
        }
        if self.f >= 0 {
            self.y -= 1;
            self.ddf_y += 2;
            self.f += self.ddf_y;
        }
        self.x += 1;
        self.ddf_x += 2;
        self.f += self.ddf_x;
        Some((self.x, self.y))
    }
}

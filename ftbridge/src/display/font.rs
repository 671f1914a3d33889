//! Fixed-width bitmap fonts.

/// First character a font covers.
pub const FIRST_CHAR: char = ' ';
/// Last character a font covers.
pub const LAST_CHAR: char = '~';
/// Glyphs in a complete font (ASCII 32..=126).
pub const GLYPH_COUNT: usize = 95;

/// A fixed-width bitmap font.
///
/// `data` holds `height` row words per glyph, glyphs in ASCII order from
/// space. Within a row word the most significant bit is the leftmost
/// column, so a font can be at most 16 pixels wide.
#[derive(Debug, Clone, Copy)]
pub struct FontDef<'a> {
    width: u8,
    height: u8,
    data: &'a [u16],
}

impl<'a> FontDef<'a> {
    /// None when the width exceeds 16, a dimension is zero, or `data` does
    /// not hold all 95 glyphs.
    pub const fn new(width: u8, height: u8, data: &'a [u16]) -> Option<Self> {
        if width == 0 || width > 16 || height == 0 {
            return None;
        }
        if data.len() < GLYPH_COUNT * height as usize {
            return None;
        }
        Some(Self { width, height, data })
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    /// Row words of one glyph. None outside ASCII 32..=126.
    pub fn glyph(&self, ch: char) -> Option<&'a [u16]> {
        if !(FIRST_CHAR..=LAST_CHAR).contains(&ch) {
            return None;
        }
        let height = self.height as usize;
        let start = (ch as usize - FIRST_CHAR as usize) * height;
        self.data.get(start..start + height)
    }
}

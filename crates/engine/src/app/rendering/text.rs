use super::draw::{FrameBuffer, Rgba};

pub const GLYPH_WIDTH: i32 = 3;
pub const GLYPH_HEIGHT: i32 = 5;

/// Five rows of three bits, most significant bit on the left.
type Glyph = [u8; 5];

const DIGITS: [Glyph; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b001, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

const LETTERS: [Glyph; 26] = [
    [0b010, 0b101, 0b111, 0b101, 0b101],
    [0b110, 0b101, 0b110, 0b101, 0b110],
    [0b011, 0b100, 0b100, 0b100, 0b011],
    [0b110, 0b101, 0b101, 0b101, 0b110],
    [0b111, 0b100, 0b110, 0b100, 0b111],
    [0b111, 0b100, 0b110, 0b100, 0b100],
    [0b011, 0b100, 0b101, 0b101, 0b011],
    [0b101, 0b101, 0b111, 0b101, 0b101],
    [0b111, 0b010, 0b010, 0b010, 0b111],
    [0b001, 0b001, 0b001, 0b101, 0b010],
    [0b101, 0b101, 0b110, 0b101, 0b101],
    [0b100, 0b100, 0b100, 0b100, 0b111],
    [0b101, 0b111, 0b111, 0b101, 0b101],
    [0b110, 0b101, 0b101, 0b101, 0b101],
    [0b010, 0b101, 0b101, 0b101, 0b010],
    [0b110, 0b101, 0b110, 0b100, 0b100],
    [0b010, 0b101, 0b101, 0b110, 0b011],
    [0b110, 0b101, 0b110, 0b101, 0b101],
    [0b011, 0b100, 0b010, 0b001, 0b110],
    [0b111, 0b010, 0b010, 0b010, 0b010],
    [0b101, 0b101, 0b101, 0b101, 0b111],
    [0b101, 0b101, 0b101, 0b101, 0b010],
    [0b101, 0b101, 0b111, 0b111, 0b101],
    [0b101, 0b101, 0b010, 0b101, 0b101],
    [0b101, 0b101, 0b010, 0b010, 0b010],
    [0b111, 0b001, 0b010, 0b100, 0b111],
];

const UNKNOWN: Glyph = [0b111, 0b001, 0b010, 0b000, 0b010];

fn glyph(ch: char) -> Glyph {
    match ch {
        '0'..='9' => DIGITS[ch as usize - '0' as usize],
        'A'..='Z' => LETTERS[ch as usize - 'A' as usize],
        'a'..='z' => LETTERS[ch as usize - 'a' as usize],
        ' ' => [0; 5],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '+' => [0b000, 0b010, 0b111, 0b010, 0b000],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        '(' => [0b001, 0b010, 0b010, 0b010, 0b001],
        ')' => [0b100, 0b010, 0b010, 0b010, 0b100],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        '<' => [0b001, 0b010, 0b100, 0b010, 0b001],
        '>' => [0b100, 0b010, 0b001, 0b010, 0b100],
        _ => UNKNOWN,
    }
}

fn advance(scale: i32) -> i32 {
    (GLYPH_WIDTH + 1) * scale.max(1)
}

pub fn text_width(text: &str, scale: i32) -> i32 {
    let count = text.chars().count() as i32;
    if count == 0 {
        return 0;
    }
    count * advance(scale) - scale.max(1)
}

pub fn line_height(scale: i32) -> i32 {
    (GLYPH_HEIGHT + 2) * scale.max(1)
}

/// Calls `plot` for every lit cell of `text` laid out from `(0, 0)`, each
/// cell being `scale`×`scale` pixels.
pub(crate) fn for_each_lit_pixel(text: &str, scale: i32, mut plot: impl FnMut(i32, i32)) {
    let scale = scale.max(1);
    for (index, ch) in text.chars().enumerate() {
        let origin_x = index as i32 * advance(scale);
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0b100 >> col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        plot(origin_x + col * scale + dx, row as i32 * scale + dy);
                    }
                }
            }
        }
    }
}

pub fn draw_text(buf: &mut FrameBuffer<'_>, x: i32, y: i32, text: &str, scale: i32, color: Rgba) {
    for_each_lit_pixel(text, scale, |px, py| buf.blend(x + px, y + py, color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_excludes_trailing_gap() {
        assert_eq!(text_width("", 2), 0);
        assert_eq!(text_width("7", 1), 3);
        assert_eq!(text_width("12", 2), 14);
    }

    #[test]
    fn lowercase_shares_uppercase_glyphs() {
        assert_eq!(glyph('q'), glyph('Q'));
        assert_eq!(glyph('~'), UNKNOWN);
    }

    #[test]
    fn drawn_digit_stays_inside_its_cell() {
        let mut pixels = vec![0; 16 * 16 * 4];
        let mut buf = FrameBuffer::new(&mut pixels, 16, 16);
        draw_text(&mut buf, 2, 2, "1", 2, [255, 255, 255, 255]);
        // Top-middle of the "1" is lit, top-left is not.
        assert_eq!(buf.pixel(4, 2), Some([255, 255, 255, 255]));
        assert_eq!(buf.pixel(2, 2), Some([0, 0, 0, 0]));
        assert_eq!(buf.pixel(8, 2), Some([0, 0, 0, 0]));
    }
}

use image::RgbaImage;

use super::transform::ScreenRect;

pub type Rgba = [u8; 4];

/// Upper bound on points plotted for one line or circle so a wild zoom can
/// never stall a frame.
const MAX_STROKE_STEPS: u32 = 8192;

/// Borrowed RGBA8 frame with clipped drawing operations. Out-of-frame writes
/// are dropped.
pub struct FrameBuffer<'a> {
    pixels: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> FrameBuffer<'a> {
    pub fn new(pixels: &'a mut [u8], width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self, color: Rgba) {
        for chunk in self.pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&color);
        }
    }

    fn byte_offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        let pixel = (y as usize)
            .checked_mul(self.width as usize)?
            .checked_add(x as usize)?;
        let offset = pixel.checked_mul(4)?;
        (offset.checked_add(4)? <= self.pixels.len()).then_some(offset)
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        let offset = self.byte_offset(x, y)?;
        let mut out = [0; 4];
        out.copy_from_slice(&self.pixels[offset..offset + 4]);
        Some(out)
    }

    pub fn put(&mut self, x: i32, y: i32, color: Rgba) {
        if let Some(offset) = self.byte_offset(x, y) {
            self.pixels[offset..offset + 4].copy_from_slice(&color);
        }
    }

    /// Source-over blend using the alpha channel of `color`.
    pub fn blend(&mut self, x: i32, y: i32, color: Rgba) {
        match color[3] {
            0 => {}
            255 => self.put(x, y, color),
            alpha => {
                let Some(offset) = self.byte_offset(x, y) else {
                    return;
                };
                let dst = &mut self.pixels[offset..offset + 4];
                for (channel, source) in dst.iter_mut().zip(color).take(3) {
                    *channel = mix(*channel, source, alpha);
                }
                dst[3] = 255;
            }
        }
    }

    fn clip(&self, rect: ScreenRect) -> Option<ScreenRect> {
        let clipped = ScreenRect {
            left: rect.left.max(0),
            top: rect.top.max(0),
            right: rect.right.min(self.width.min(i32::MAX as u32) as i32),
            bottom: rect.bottom.min(self.height.min(i32::MAX as u32) as i32),
        };
        (!clipped.is_empty()).then_some(clipped)
    }

    pub fn fill_rect(&mut self, rect: ScreenRect, color: Rgba) {
        let Some(clipped) = self.clip(rect) else {
            return;
        };
        for y in clipped.top..clipped.bottom {
            for x in clipped.left..clipped.right {
                self.blend(x, y, color);
            }
        }
    }

    pub fn outline_rect(&mut self, rect: ScreenRect, thickness: i32, color: Rgba) {
        for ring in 0..thickness.max(1) {
            let edge = rect.inset(ring);
            if edge.is_empty() {
                return;
            }
            self.hline(edge.top, edge.left, edge.right, color);
            self.hline(edge.bottom - 1, edge.left, edge.right, color);
            self.vline(edge.left, edge.top, edge.bottom, color);
            self.vline(edge.right - 1, edge.top, edge.bottom, color);
        }
    }

    /// Horizontal run `x0..x1` on row `y`.
    pub fn hline(&mut self, y: i32, x0: i32, x1: i32, color: Rgba) {
        if y < 0 || y as u32 >= self.height {
            return;
        }
        let start = x0.max(0);
        let end = x1.min(self.width.min(i32::MAX as u32) as i32);
        for x in start..end {
            self.blend(x, y, color);
        }
    }

    /// Vertical run `y0..y1` on column `x`.
    pub fn vline(&mut self, x: i32, y0: i32, y1: i32, color: Rgba) {
        if x < 0 || x as u32 >= self.width {
            return;
        }
        let start = y0.max(0);
        let end = y1.min(self.height.min(i32::MAX as u32) as i32);
        for y in start..end {
            self.blend(x, y, color);
        }
    }

    pub fn line(&mut self, from: (i32, i32), to: (i32, i32), color: Rgba) {
        let dx = (to.0 as i64 - from.0 as i64) as f64;
        let dy = (to.1 as i64 - from.1 as i64) as f64;
        let steps = dx.abs().max(dy.abs()).min(MAX_STROKE_STEPS as f64).max(1.0);
        let mut last = None;
        for step in 0..=steps as u32 {
            let t = step as f64 / steps;
            let x = (from.0 as f64 + dx * t).round() as i32;
            let y = (from.1 as f64 + dy * t).round() as i32;
            if last != Some((x, y)) {
                self.blend(x, y, color);
                last = Some((x, y));
            }
        }
    }

    pub fn circle(&mut self, center: (f32, f32), radius: f32, color: Rgba) {
        if !radius.is_finite() || radius <= 0.0 {
            return;
        }
        let circumference = std::f32::consts::TAU * radius;
        let steps = (circumference.ceil() as u32).clamp(8, MAX_STROKE_STEPS);
        let mut last = None;
        for step in 0..steps {
            let angle = step as f32 / steps as f32 * std::f32::consts::TAU;
            let x = (center.0 + radius * angle.cos()).round() as i32;
            let y = (center.1 + radius * angle.sin()).round() as i32;
            if last != Some((x, y)) {
                self.blend(x, y, color);
                last = Some((x, y));
            }
        }
    }

    /// Nearest-neighbour scale of `image` into `dest`, with per-pixel alpha
    /// multiplied by `opacity`.
    pub fn blit_scaled(&mut self, image: &RgbaImage, dest: ScreenRect, opacity: u8) {
        if image.width() == 0 || image.height() == 0 || opacity == 0 || dest.is_empty() {
            return;
        }
        let Some(clipped) = self.clip(dest) else {
            return;
        };
        let scale_x = image.width() as f64 / dest.width() as f64;
        let scale_y = image.height() as f64 / dest.height() as f64;
        for y in clipped.top..clipped.bottom {
            let src_y = (((y - dest.top) as f64 * scale_y) as u32).min(image.height() - 1);
            for x in clipped.left..clipped.right {
                let src_x = (((x - dest.left) as f64 * scale_x) as u32).min(image.width() - 1);
                let [r, g, b, a] = image.get_pixel(src_x, src_y).0;
                let alpha = (a as u16 * opacity as u16 / 255) as u8;
                self.blend(x, y, [r, g, b, alpha]);
            }
        }
    }
}

fn mix(dst: u8, src: u8, alpha: u8) -> u8 {
    let alpha = alpha as u16;
    ((src as u16 * alpha + dst as u16 * (255 - alpha) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use image::Rgba as Pixel;

    use super::*;

    const RED: Rgba = [255, 0, 0, 255];

    fn frame(width: u32, height: u32) -> Vec<u8> {
        vec![0; width as usize * height as usize * 4]
    }

    #[test]
    fn writes_outside_the_frame_are_ignored() {
        let mut empty = Vec::new();
        let mut buf = FrameBuffer::new(&mut empty, 0, 0);
        buf.put(0, 0, RED);
        buf.line((-5, -5), (5, 5), RED);
        buf.fill_rect(ScreenRect::from_corners((0, 0), (4, 4)), RED);

        let mut tiny = frame(2, 2);
        let mut buf = FrameBuffer::new(&mut tiny, 2, 2);
        buf.put(-1, 0, RED);
        buf.put(2, 1, RED);
        buf.put(1, 1, RED);
        assert_eq!(buf.pixel(1, 1), Some(RED));
        assert_eq!(buf.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(buf.pixel(5, 5), None);
    }

    #[test]
    fn blend_mixes_by_alpha() {
        let mut pixels = frame(1, 1);
        let mut buf = FrameBuffer::new(&mut pixels, 1, 1);
        buf.clear([0, 0, 200, 255]);
        buf.blend(0, 0, [200, 0, 0, 128]);
        assert_eq!(buf.pixel(0, 0), Some([100, 0, 100, 255]));
        buf.blend(0, 0, [9, 9, 9, 0]);
        assert_eq!(buf.pixel(0, 0), Some([100, 0, 100, 255]));
    }

    #[test]
    fn outline_leaves_interior_untouched() {
        let mut pixels = frame(8, 8);
        let mut buf = FrameBuffer::new(&mut pixels, 8, 8);
        buf.outline_rect(ScreenRect::from_corners((1, 1), (7, 7)), 1, RED);
        assert_eq!(buf.pixel(1, 1), Some(RED));
        assert_eq!(buf.pixel(6, 6), Some(RED));
        assert_eq!(buf.pixel(3, 3), Some([0, 0, 0, 0]));
        assert_eq!(buf.pixel(7, 7), Some([0, 0, 0, 0]));
    }

    #[test]
    fn line_hits_both_endpoints() {
        let mut pixels = frame(10, 10);
        let mut buf = FrameBuffer::new(&mut pixels, 10, 10);
        buf.line((1, 1), (8, 5), RED);
        assert_eq!(buf.pixel(1, 1), Some(RED));
        assert_eq!(buf.pixel(8, 5), Some(RED));
    }

    #[test]
    fn blit_scales_and_applies_opacity() {
        let mut image = RgbaImage::from_pixel(2, 2, Pixel([0, 255, 0, 255]));
        image.put_pixel(1, 1, Pixel([0, 0, 255, 255]));
        let mut pixels = frame(4, 4);
        let mut buf = FrameBuffer::new(&mut pixels, 4, 4);

        buf.blit_scaled(&image, ScreenRect::from_corners((0, 0), (4, 4)), 255);
        assert_eq!(buf.pixel(0, 0), Some([0, 255, 0, 255]));
        assert_eq!(buf.pixel(3, 3), Some([0, 0, 255, 255]));

        buf.clear([0, 0, 0, 255]);
        buf.blit_scaled(&image, ScreenRect::from_corners((0, 0), (4, 4)), 128);
        assert_eq!(buf.pixel(0, 0), Some([0, 128, 0, 255]));
    }
}

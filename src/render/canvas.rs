/// 3x5 glyphs for the clock readout, one row per byte (bit 2 = left column).
const CLOCK_GLYPHS: [(char, [u8; 5]); 12] = [
    ('0', [0b111, 0b101, 0b101, 0b101, 0b111]),
    ('1', [0b010, 0b110, 0b010, 0b010, 0b111]),
    ('2', [0b111, 0b001, 0b111, 0b100, 0b111]),
    ('3', [0b111, 0b001, 0b111, 0b001, 0b111]),
    ('4', [0b101, 0b101, 0b111, 0b001, 0b001]),
    ('5', [0b111, 0b100, 0b111, 0b001, 0b111]),
    ('6', [0b111, 0b100, 0b111, 0b101, 0b111]),
    ('7', [0b111, 0b001, 0b010, 0b010, 0b010]),
    ('8', [0b111, 0b101, 0b111, 0b101, 0b111]),
    ('9', [0b111, 0b101, 0b111, 0b001, 0b111]),
    (':', [0b000, 0b010, 0b000, 0b010, 0b000]),
    ('/', [0b001, 0b001, 0b010, 0b100, 0b100]),
];
const GLYPH_WIDTH: u32 = 3;
pub const GLYPH_HEIGHT: u32 = 5;

/// RGBA8 pixel buffer, rows top to bottom.
#[derive(Clone, Debug, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let mut canvas = Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        };
        canvas.clear([0, 0, 0, 255]);
        canvas
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = self.index(x, y);
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.pixels[idx..idx + 4]);
        Some(out)
    }

    pub fn clear(&mut self, color: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: [u8; 4]) {
        self.fill_rect_gradient(x, y, w, h, |_| color);
    }

    /// Fill a rectangle, asking `shade` for the colour of each pixel row
    /// (called with the row's canvas y coordinate).
    pub fn fill_rect_gradient(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        shade: impl Fn(f32) -> [u8; 4],
    ) {
        let Some((x0, y0, x1, y1)) = self.span(x, y, w, h) else {
            return;
        };
        for py in y0..y1 {
            let color = shade(py as f32 + 0.5);
            for px in x0..x1 {
                self.blend(px, py, color);
            }
        }
    }

    /// One-pixel outline just inside the rectangle.
    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: [u8; 4]) {
        let Some((x0, y0, x1, y1)) = self.span(x, y, w, h) else {
            return;
        };
        for px in x0..x1 {
            self.blend(px, y0, color);
            if y1 - 1 > y0 {
                self.blend(px, y1 - 1, color);
            }
        }
        for py in (y0 + 1)..y1.saturating_sub(1) {
            self.blend(x0, py, color);
            if x1 - 1 > x0 {
                self.blend(x1 - 1, py, color);
            }
        }
    }

    /// Filled disc of the given diameter; pixel centres inside are painted.
    pub fn fill_circle(&mut self, cx: f32, cy: f32, diameter: f32, color: [u8; 4]) {
        let r = (diameter / 2.0).max(0.5);
        let Some((x0, y0, x1, y1)) = self.span(cx - r, cy - r, 2.0 * r, 2.0 * r) else {
            return;
        };
        let r2 = r * r;
        for py in y0..y1 {
            let dy = py as f32 + 0.5 - cy;
            for px in x0..x1 {
                let dx = px as f32 + 0.5 - cx;
                if dx * dx + dy * dy <= r2 {
                    self.blend(px, py, color);
                }
            }
        }
    }

    /// Copy `src` with its top-left corner at `(x, y)`, clipped to this canvas.
    pub fn blit(&mut self, src: &Canvas, x: u32, y: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let w = src.width.min(self.width - x) as usize;
        let h = src.height.min(self.height - y);
        for row in 0..h {
            let from = src.index(0, row);
            let to = self.index(x, y + row);
            self.pixels[to..to + w * 4].copy_from_slice(&src.pixels[from..from + w * 4]);
        }
    }

    /// Draw a clock string (`0-9`, `:`, `/`, space) with the built-in bitmap
    /// face, each glyph cell `scale` pixels. Returns the drawn width.
    pub fn draw_clock(&mut self, text: &str, x: u32, y: u32, scale: u32, color: [u8; 4]) -> u32 {
        let scale = scale.max(1);
        let mut cursor = x;
        for ch in text.chars() {
            if let Some((_, rows)) = CLOCK_GLYPHS.iter().find(|(c, _)| *c == ch) {
                for (gy, bits) in rows.iter().enumerate() {
                    for gx in 0..GLYPH_WIDTH {
                        if bits & (1 << (GLYPH_WIDTH - 1 - gx)) == 0 {
                            continue;
                        }
                        self.fill_rect(
                            (cursor + gx * scale) as f32,
                            (y + gy as u32 * scale) as f32,
                            scale as f32,
                            scale as f32,
                            color,
                        );
                    }
                }
            }
            cursor += (GLYPH_WIDTH + 1) * scale;
        }
        cursor - x
    }

    pub fn clock_width(text: &str, scale: u32) -> u32 {
        text.chars().count() as u32 * (GLYPH_WIDTH + 1) * scale.max(1)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Pixel bounds `[x0, x1) x [y0, y1)` covered by a float rectangle,
    /// clipped to the canvas. Any positive extent covers at least one pixel.
    fn span(&self, x: f32, y: f32, w: f32, h: f32) -> Option<(u32, u32, u32, u32)> {
        if !(w > 0.0 && h > 0.0) || !x.is_finite() || !y.is_finite() {
            return None;
        }
        let clip = |lo: f32, hi: f32, max: u32| -> Option<(u32, u32)> {
            let a = lo.floor().max(0.0);
            let b = hi.ceil().min(max as f32);
            (b > a).then(|| (a as u32, b as u32))
        };
        let (x0, x1) = clip(x, x + w, self.width)?;
        let (y0, y1) = clip(y, y + h, self.height)?;
        Some((x0, y0, x1, y1))
    }

    fn blend(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let idx = self.index(x, y);
        let a = color[3] as f32 / 255.0;
        let inv_a = 1.0 - a;
        for c in 0..3 {
            self.pixels[idx + c] =
                (color[c] as f32 * a + self.pixels[idx + c] as f32 * inv_a).round() as u8;
        }
        self.pixels[idx + 3] = 255;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_canvas_is_opaque_black() {
        let canvas = Canvas::new(4, 3);
        assert_eq!(canvas.pixels().len(), 48);
        assert_eq!(canvas.pixel(3, 2), Some([0, 0, 0, 255]));
        assert_eq!(canvas.pixel(4, 0), None);
    }

    #[test]
    fn alpha_blending() {
        let mut canvas = Canvas::new(2, 2);
        canvas.clear([200, 100, 0, 255]);
        canvas.fill_rect(0.0, 0.0, 1.0, 1.0, [0, 0, 200, 128]);
        let [r, g, b, a] = canvas.pixel(0, 0).unwrap();
        assert_eq!((r, g, b, a), (100, 50, 100, 255));
        assert_eq!(canvas.pixel(1, 1), Some([200, 100, 0, 255]));
    }

    #[test]
    fn rects_clip_and_keep_thin_bars() {
        let mut canvas = Canvas::new(10, 10);
        canvas.fill_rect(-5.0, 8.0, 100.0, 100.0, [255, 255, 255, 255]);
        assert_eq!(canvas.pixel(0, 9), Some([255, 255, 255, 255]));
        assert_eq!(canvas.pixel(9, 7), Some([0, 0, 0, 255]));

        canvas.fill_rect(2.3, 0.0, 0.2, 5.0, [255, 0, 0, 255]);
        assert_eq!(canvas.pixel(2, 0), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(3, 0), Some([0, 0, 0, 255]));

        // Zero height draws nothing
        canvas.fill_rect(5.0, 5.0, 3.0, 0.0, [0, 255, 0, 255]);
        assert_eq!(canvas.pixel(5, 5), Some([0, 0, 0, 255]));
    }

    #[test]
    fn gradient_rows() {
        let mut canvas = Canvas::new(1, 4);
        canvas.fill_rect_gradient(0.0, 0.0, 1.0, 4.0, |y| [(y * 10.0) as u8, 0, 0, 255]);
        assert_eq!(canvas.pixel(0, 0).unwrap()[0], 5);
        assert_eq!(canvas.pixel(0, 3).unwrap()[0], 35);
    }

    #[test]
    fn outline_leaves_interior() {
        let mut canvas = Canvas::new(6, 6);
        canvas.stroke_rect(1.0, 1.0, 4.0, 4.0, [255, 255, 255, 255]);
        assert_eq!(canvas.pixel(1, 1).unwrap()[0], 255);
        assert_eq!(canvas.pixel(4, 4).unwrap()[0], 255);
        assert_eq!(canvas.pixel(1, 3).unwrap()[0], 255);
        assert_eq!(canvas.pixel(2, 2).unwrap()[0], 0);
        assert_eq!(canvas.pixel(0, 0).unwrap()[0], 0);
    }

    #[test]
    fn circles() {
        let mut canvas = Canvas::new(9, 9);
        canvas.fill_circle(4.5, 4.5, 5.0, [0, 255, 0, 255]);
        assert_eq!(canvas.pixel(4, 4).unwrap()[1], 255);
        assert_eq!(canvas.pixel(2, 4).unwrap()[1], 255);
        assert_eq!(canvas.pixel(1, 1).unwrap()[1], 0);
        assert_eq!(canvas.pixel(8, 8).unwrap()[1], 0);

        // Tiny sprites still hit their pixel
        canvas.fill_circle(0.5, 0.5, 0.1, [0, 0, 255, 255]);
        assert_eq!(canvas.pixel(0, 0).unwrap()[2], 255);
    }

    #[test]
    fn blit_clips() {
        let mut src = Canvas::new(3, 3);
        src.clear([9, 9, 9, 255]);
        let mut dst = Canvas::new(4, 4);
        dst.blit(&src, 2, 2);
        assert_eq!(dst.pixel(3, 3), Some([9, 9, 9, 255]));
        assert_eq!(dst.pixel(1, 1), Some([0, 0, 0, 255]));
        dst.blit(&src, 10, 0);
    }

    #[test]
    fn clock_glyphs() {
        let mut canvas = Canvas::new(40, 10);
        let width = canvas.draw_clock("1:05", 0, 0, 2, [255, 255, 255, 255]);
        assert_eq!(width, Canvas::clock_width("1:05", 2));
        assert_eq!(width, 32);
        // Top of the "1" stem is its middle column
        assert_eq!(canvas.pixel(2, 0).unwrap()[0], 255);
        assert_eq!(canvas.pixel(0, 0).unwrap()[0], 0);
    }
}

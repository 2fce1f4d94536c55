use crate::engine::FrameOutput;
use crate::playback::format_time;
use crate::spectrum::{Band, Bar, BAR_OUTLINE};

use super::canvas::{Canvas, GLYPH_HEIGHT};

const BACKGROUND: [u8; 4] = [8, 8, 14, 255];
const FIELD_TOP: [u8; 3] = [5, 5, 5];
const FIELD_BOTTOM: [u8; 3] = [30, 30, 30];
const PANEL_BACKGROUND: [u8; 4] = [0, 0, 0, 255];
const TRACK: [u8; 4] = [255, 255, 255, 40];
const PROGRESS: [u8; 4] = [0, 220, 255, 255];
const CLOCK: [u8; 4] = [230, 230, 230, 255];
/// Particles are drawn slightly translucent so dense node lines glow
const SPRITE_ALPHA: u8 = 220;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Placement of the three views inside one output frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneLayout {
    pub width: u32,
    pub height: u32,
    pub field: Rect,
    pub low: Rect,
    pub high: Rect,
    pub progress: Rect,
}

impl SceneLayout {
    pub fn new(width: u32, height: u32) -> Self {
        let progress_h = (height / 24).max(8).min(height);
        let body_h = height - progress_h;
        let field_w = (width * 9 / 16).min(body_h.max(1) * 2).min(width);
        let panel_w = width - field_w;
        let low_h = body_h / 2;

        Self {
            width,
            height,
            field: Rect { x: 0, y: 0, width: field_w, height: body_h },
            low: Rect { x: field_w, y: 0, width: panel_w, height: low_h },
            high: Rect { x: field_w, y: low_h, width: panel_w, height: body_h - low_h },
            progress: Rect { x: 0, y: body_h, width, height: progress_h },
        }
    }

    pub fn field_size(&self) -> (u32, u32) {
        (self.field.width, self.field.height)
    }

    pub fn panel_size(&self) -> (u32, u32) {
        (self.low.width, self.low.height)
    }
}

/// Rasterises engine output into RGBA frames.
pub struct SceneRenderer {
    layout: SceneLayout,
    frame: Canvas,
    field: Canvas,
    panel: Canvas,
}

impl SceneRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        let layout = SceneLayout::new(width, height);
        Self {
            frame: Canvas::new(width, height),
            field: Canvas::new(layout.field.width, layout.field.height),
            panel: Canvas::new(layout.low.width, layout.low.height),
            layout,
        }
    }

    pub fn layout(&self) -> &SceneLayout {
        &self.layout
    }

    pub fn render(&mut self, output: &FrameOutput<'_>) -> &[u8] {
        self.frame.clear(BACKGROUND);

        self.draw_field(output);
        self.frame.blit(&self.field, self.layout.field.x, self.layout.field.y);

        for (band, rect) in [(Band::Low, self.layout.low), (Band::High, self.layout.high)] {
            self.panel.clear(PANEL_BACKGROUND);
            if let Some(view) = output.spectrum {
                draw_bars(&mut self.panel, view.bars(band), band);
            }
            self.frame.blit(&self.panel, rect.x, rect.y);
        }

        self.draw_progress(output.position, output.duration);
        self.frame.pixels()
    }

    fn draw_field(&mut self, output: &FrameOutput<'_>) {
        let h = self.field.height() as f32;
        self.field.fill_rect_gradient(0.0, 0.0, self.field.width() as f32, h, |y| {
            let t = if h > 0.0 { y / h } else { 0.0 };
            let mut c = [0u8, 0, 0, 255];
            for i in 0..3 {
                let (a, b) = (FIELD_TOP[i] as f32, FIELD_BOTTOM[i] as f32);
                c[i] = (a + (b - a) * t).round() as u8;
            }
            c
        });

        for sprite in output.sprites {
            let [r, g, b] = sprite.color;
            self.field
                .fill_circle(sprite.x, sprite.y, sprite.diameter, [r, g, b, SPRITE_ALPHA]);
        }
    }

    fn draw_progress(&mut self, position: f64, duration: f64) {
        let rect = self.layout.progress;
        if rect.height == 0 {
            return;
        }
        let scale = (rect.height / (GLYPH_HEIGHT * 2)).max(1);
        let text = format!("{} / {}", format_time(position), format_time(duration));
        let text_w = Canvas::clock_width(&text, scale);
        let pad = scale * 2;
        let text_y = rect.y + rect.height.saturating_sub(GLYPH_HEIGHT * scale) / 2;
        self.frame.draw_clock(&text, rect.x + pad, text_y, scale, CLOCK);

        let track_x = (rect.x + pad * 2 + text_w) as f32;
        let track_w = (rect.x + rect.width) as f32 - track_x - pad as f32;
        let track_h = (rect.height / 4).max(2) as f32;
        let track_y = rect.y as f32 + (rect.height as f32 - track_h) / 2.0;
        if track_w <= 0.0 {
            return;
        }
        self.frame.fill_rect(track_x, track_y, track_w, track_h, TRACK);
        let done = if duration > 0.0 && duration.is_finite() {
            (position / duration).clamp(0.0, 1.0) as f32
        } else {
            0.0
        };
        self.frame.fill_rect(track_x, track_y, track_w * done, track_h, PROGRESS);
    }
}

fn draw_bars(panel: &mut Canvas, bars: &[Bar], band: Band) {
    let gradient = band.gradient();
    let h = panel.height() as f32;
    for bar in bars {
        panel.fill_rect_gradient(bar.x, bar.y, bar.width, bar.height, |y| {
            gradient.color_at(if h > 0.0 { 1.0 - y / h } else { 0.0 })
        });
        panel.stroke_rect(bar.x, bar.y, bar.width, bar.height, BAR_OUTLINE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analyser::AnalysisFrame;
    use crate::chladni::{FrequencyBands, Sprite};
    use crate::playback::PlaybackState;
    use crate::spectrum::SpectrumAnalyzer;

    #[test]
    fn layout_tiles_the_frame() {
        let layout = SceneLayout::new(1280, 720);
        assert_eq!(layout.progress, Rect { x: 0, y: 690, width: 1280, height: 30 });
        assert_eq!(layout.field, Rect { x: 0, y: 0, width: 720, height: 690 });
        assert_eq!(layout.low.x, 720);
        assert_eq!(layout.low.width, 560);
        assert_eq!(layout.low.height + layout.high.height, 690);
        assert_eq!(layout.high.y, layout.low.height);
    }

    #[test]
    fn layout_survives_tiny_frames() {
        let layout = SceneLayout::new(16, 4);
        assert_eq!(layout.progress.height, 4);
        assert_eq!(layout.field.height, 0);
        assert!(layout.field.width + layout.low.width == 16);
    }

    #[test]
    fn renders_sprites_bars_and_progress() {
        let mut renderer = SceneRenderer::new(320, 180);
        let layout = *renderer.layout();
        let (pw, ph) = layout.panel_size();

        let mut bins = vec![0u8; 1024];
        bins[5] = 255;
        let frame = AnalysisFrame::from_bins(bins, 44100);
        let view = SpectrumAnalyzer::new(pw, ph).analyze(&frame);
        let sprites = [Sprite { x: 20.0, y: 20.0, diameter: 6.0, color: [255, 0, 0] }];
        let output = FrameOutput {
            frame: &frame,
            bands: FrequencyBands::floors(),
            spectrum: Some(&view),
            sprites: &sprites,
            position: 30.0,
            duration: 60.0,
            state: PlaybackState::Playing,
        };

        let pixels = renderer.render(&output).to_vec();
        assert_eq!(pixels.len(), 320 * 180 * 4);
        let at = |x: u32, y: u32| {
            let i = ((y * 320 + x) * 4) as usize;
            [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
        };

        // Red particle over the dark field
        assert!(at(20, 20)[0] > 200);
        // The loud bin reaches the top of the low panel
        let bar = view.low[5];
        let bx = layout.low.x + (bar.x + bar.width / 2.0) as u32;
        assert!(at(bx, layout.low.y + ph / 2)[2] > 120);
        // An empty bin leaves the panel dark
        let quiet = view.low[10];
        let qx = layout.low.x + (quiet.x + quiet.width / 2.0) as u32;
        assert_eq!(at(qx, layout.low.y + ph / 2), PANEL_BACKGROUND);
        assert!(pixels.chunks_exact(4).all(|p| p[3] == 255));
    }

    #[test]
    fn no_spectrum_before_playback() {
        let mut renderer = SceneRenderer::new(200, 100);
        let layout = *renderer.layout();
        let frame = AnalysisFrame::default();
        let output = FrameOutput {
            frame: &frame,
            bands: FrequencyBands::floors(),
            spectrum: None,
            sprites: &[],
            position: 0.0,
            duration: 0.0,
            state: PlaybackState::Ready,
        };
        let pixels = renderer.render(&output);
        let i = (((layout.high.y + 2) * 200 + layout.high.x + 2) * 4) as usize;
        assert_eq!(&pixels[i..i + 4], &PANEL_BACKGROUND);
    }
}

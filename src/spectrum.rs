use std::ops::Range;

use crate::audio::analyser::AnalysisFrame;

pub const LOW_BAND_CUTOFF_HZ: f32 = 500.0;
pub const HIGH_BAND_START_HZ: f32 = 3000.0;
/// Fraction of the per-bin slot a bar occupies
const BAR_FILL: f32 = 0.8;
const BAR_GUTTER_PX: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Band {
    Low,
    High,
}

impl Band {
    pub fn gradient(self) -> Gradient {
        match self {
            Band::Low => Gradient {
                bottom: [0, 180, 255, 102],
                top: [0, 240, 255, 230],
            },
            Band::High => Gradient {
                bottom: [255, 0, 80, 102],
                top: [255, 0, 119, 230],
            },
        }
    }
}

/// Two-stop vertical gradient spanning a whole band panel. Stops sit at 10%
/// and 90% of the panel height, measured from the bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gradient {
    pub bottom: [u8; 4],
    pub top: [u8; 4],
}

impl Gradient {
    const START: f32 = 0.1;
    const END: f32 = 0.9;

    /// RGBA at `t` (0.0 = panel bottom, 1.0 = panel top).
    pub fn color_at(&self, t: f32) -> [u8; 4] {
        let t = ((t - Self::START) / (Self::END - Self::START)).clamp(0.0, 1.0);
        let mut out = [0u8; 4];
        for (i, channel) in out.iter_mut().enumerate() {
            let a = self.bottom[i] as f32;
            let b = self.top[i] as f32;
            *channel = (a + (b - a) * t).round() as u8;
        }
        out
    }
}

/// Outline drawn around every bar.
pub const BAR_OUTLINE: [u8; 4] = [255, 255, 255, 26];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BandRanges {
    pub low: Range<usize>,
    pub high: Range<usize>,
}

impl BandRanges {
    pub fn range(&self, band: Band) -> Range<usize> {
        match band {
            Band::Low => self.low.clone(),
            Band::High => self.high.clone(),
        }
    }
}

/// `floor(freq / nyquist * bin_count)`, clamped to `0..=bin_count`.
pub fn bin_index(freq_hz: f32, sample_rate: u32, bin_count: usize) -> usize {
    let nyquist = sample_rate as f32 / 2.0;
    if nyquist <= 0.0 || !freq_hz.is_finite() || freq_hz <= 0.0 {
        return 0;
    }
    let index = (freq_hz / nyquist * bin_count as f32).floor();
    (index as usize).min(bin_count)
}

/// Low band: bins below 500 Hz. High band: bins from 3 kHz up. The ranges
/// never overlap and stay inside `0..bin_count`.
pub fn band_ranges(sample_rate: u32, bin_count: usize) -> BandRanges {
    let low_end = bin_index(LOW_BAND_CUTOFF_HZ, sample_rate, bin_count);
    let high_start = bin_index(HIGH_BAND_START_HZ, sample_rate, bin_count).max(low_end);
    BandRanges {
        low: 0..low_end,
        high: high_start..bin_count,
    }
}

pub fn bar_height(magnitude: u8, panel_height: f32) -> f32 {
    magnitude as f32 / 255.0 * panel_height.max(0.0)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bar {
    pub x: f32,
    /// Top edge; bars are bottom-aligned in the panel
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub magnitude: u8,
}

/// Lay out one band of `frame` as bars in a `width` x `height` panel.
pub fn layout_band(frame: &AnalysisFrame, band: Band, width: f32, height: f32) -> Vec<Bar> {
    let ranges = band_ranges(frame.sample_rate(), frame.bin_count());
    let range = ranges.range(band);
    if range.is_empty() {
        return Vec::new();
    }

    let bar_width = (width / range.len() as f32 * BAR_FILL).max(1.0);
    let mut x = 0.0;
    range
        .map(|bin| {
            let magnitude = frame.bins()[bin];
            let h = bar_height(magnitude, height);
            let bar = Bar {
                x,
                y: height - h,
                width: bar_width,
                height: h,
                magnitude,
            };
            x += bar_width + BAR_GUTTER_PX;
            bar
        })
        .collect()
}

/// Both band layouts for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectrumView {
    pub low: Vec<Bar>,
    pub high: Vec<Bar>,
    pub timestamp: f64,
}

impl SpectrumView {
    pub fn bars(&self, band: Band) -> &[Bar] {
        match band {
            Band::Low => &self.low,
            Band::High => &self.high,
        }
    }
}

/// Turns each frame into low/high bar charts for fixed-size panels.
///
/// No averaging happens here: every frame is laid out on its own.
pub struct SpectrumAnalyzer {
    panel_width: f32,
    panel_height: f32,
    view: Option<SpectrumView>,
}

impl SpectrumAnalyzer {
    pub fn new(panel_width: u32, panel_height: u32) -> Self {
        Self {
            panel_width: panel_width as f32,
            panel_height: panel_height as f32,
            view: None,
        }
    }

    pub fn panel_size(&self) -> (f32, f32) {
        (self.panel_width, self.panel_height)
    }

    pub fn resize(&mut self, panel_width: u32, panel_height: u32) {
        self.panel_width = panel_width as f32;
        self.panel_height = panel_height as f32;
    }

    pub fn layout(&self, frame: &AnalysisFrame, band: Band, width: f32, height: f32) -> Vec<Bar> {
        layout_band(frame, band, width, height)
    }

    pub fn analyze(&self, frame: &AnalysisFrame) -> SpectrumView {
        SpectrumView {
            low: self.layout(frame, Band::Low, self.panel_width, self.panel_height),
            high: self.layout(frame, Band::High, self.panel_width, self.panel_height),
            timestamp: frame.timestamp(),
        }
    }

    pub fn update(&mut self, frame: &AnalysisFrame) {
        if frame.bin_count() == 0 {
            return;
        }
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "Spectrum at {:.3}s: {} bins, nyquist {}Hz",
                frame.timestamp(),
                frame.bin_count(),
                frame.nyquist()
            );
        }
        self.view = Some(self.analyze(frame));
    }

    /// The latest layout, `None` until a playing session produced a frame.
    pub fn view(&self) -> Option<&SpectrumView> {
        self.view.as_ref()
    }

    pub fn clear(&mut self) {
        self.view = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_never_overlap() {
        for &sample_rate in &[0u32, 1, 800, 6000, 8000, 22050, 44100, 48000, 96000, 192000] {
            for &bins in &[0usize, 1, 2, 16, 128, 1024, 16384] {
                let ranges = band_ranges(sample_rate, bins);
                assert!(ranges.low.start == 0);
                assert!(ranges.low.end <= ranges.high.start, "{} {}", sample_rate, bins);
                assert_eq!(ranges.high.end, bins);
                assert!(ranges.high.start <= bins);
            }
        }
    }

    #[test]
    fn cutoffs_at_cd_rate() {
        let ranges = band_ranges(44100, 1024);
        // 500 / 22050 * 1024 = 23.2, 3000 / 22050 * 1024 = 139.3
        assert_eq!(ranges.low, 0..23);
        assert_eq!(ranges.high, 139..1024);
    }

    #[test]
    fn low_nyquist_collapses_high_band() {
        let ranges = band_ranges(4000, 256);
        assert_eq!(ranges.low, 0..64);
        assert!(ranges.high.is_empty());
    }

    #[test]
    fn bar_heights_follow_magnitude() {
        assert_eq!(bar_height(0, 120.0), 0.0);
        assert_eq!(bar_height(255, 120.0), 120.0);
        let mut last = -1.0;
        for m in 0..=255u8 {
            let h = bar_height(m, 80.0);
            assert!(h > last);
            last = h;
        }
    }

    #[test]
    fn silent_frame_has_flat_bars() {
        let frame = AnalysisFrame::new(1024, 44100);
        let bars = layout_band(&frame, Band::Low, 300.0, 100.0);
        assert_eq!(bars.len(), 23);
        assert!(bars.iter().all(|b| b.height == 0.0 && b.y == 100.0));
    }

    #[test]
    fn bars_have_gutters() {
        let mut bins = vec![0u8; 1024];
        bins[0] = 255;
        bins[1] = 51;
        let frame = AnalysisFrame::from_bins(bins, 44100);
        let bars = layout_band(&frame, Band::Low, 230.0, 50.0);

        let expected_width = 230.0 / 23.0 * 0.8;
        assert!((bars[0].width - expected_width).abs() < 1e-4);
        assert!((bars[1].x - (expected_width + 1.0)).abs() < 1e-4);
        assert_eq!(bars[0].height, 50.0);
        assert_eq!(bars[0].y, 0.0);
        assert!((bars[1].height - 10.0).abs() < 1e-4);
    }

    #[test]
    fn narrow_panel_keeps_one_pixel_bars() {
        let frame = AnalysisFrame::new(1024, 44100);
        let bars = layout_band(&frame, Band::High, 100.0, 40.0);
        assert_eq!(bars.len(), 1024 - 139);
        assert!(bars.iter().all(|b| b.width == 1.0));
    }

    #[test]
    fn empty_frame_has_no_bars() {
        let analyzer = SpectrumAnalyzer::new(200, 100);
        let view = analyzer.analyze(&AnalysisFrame::default());
        assert!(view.low.is_empty() && view.high.is_empty());
    }

    #[test]
    fn gradient_stops() {
        let g = Band::Low.gradient();
        assert_eq!(g.color_at(0.0), g.bottom);
        assert_eq!(g.color_at(1.0), g.top);
        assert_eq!(g.color_at(0.5), [0, 210, 255, 166]);
    }

    #[test]
    fn update_keeps_latest_view() {
        let mut analyzer = SpectrumAnalyzer::new(200, 100);
        assert!(analyzer.view().is_none());
        analyzer.update(&AnalysisFrame::new(1024, 48000));
        assert!(analyzer.view().is_some());
        analyzer.clear();
        assert!(analyzer.view().is_none());
    }
}

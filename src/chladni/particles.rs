use rand::rngs::StdRng;
use rand::Rng;

use super::field::PatternVariant;

/// Share of each batch scattered uniformly; the rest cluster around the centre.
const UNIFORM_SHARE: f32 = 0.7;
const MIN_BASE_SIZE: f32 = 1.5;
const MAX_BASE_SIZE: f32 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    /// Base sprite radius before bass scaling
    pub size: f32,
    pub color: [u8; 3],
}

impl Particle {
    pub fn clamp_to(&mut self, width: f32, height: f32) {
        self.x = self.x.clamp(0.0, width.max(0.0));
        self.y = self.y.clamp(0.0, height.max(0.0));
    }
}

/// HSV ranges a variant draws particle colours from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Palette {
    pub hue: (f32, f32),
    pub saturation: (f32, f32),
    pub value: (f32, f32),
}

impl Palette {
    pub fn for_variant(variant: PatternVariant) -> Self {
        let hue = match variant {
            PatternVariant::Square => (190.0, 230.0),
            PatternVariant::Circle => (0.0, 40.0),
            PatternVariant::Cross => (270.0, 330.0),
        };
        Self {
            hue,
            saturation: (0.7, 1.0),
            value: (0.78, 1.0),
        }
    }

    pub fn sample(&self, rng: &mut StdRng) -> [u8; 3] {
        hsv_to_rgb(
            rng.random_range(self.hue.0..self.hue.1),
            rng.random_range(self.saturation.0..self.saturation.1),
            rng.random_range(self.value.0..self.value.1),
        )
    }
}

pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [u8; 3] {
    let hue = hue.rem_euclid(360.0);
    let c = value * saturation;
    let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
    let m = value - c;

    let (r1, g1, b1) = if hue < 60.0 {
        (c, x, 0.0)
    } else if hue < 120.0 {
        (x, c, 0.0)
    } else if hue < 180.0 {
        (0.0, c, x)
    } else if hue < 240.0 {
        (0.0, x, c)
    } else if hue < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    [
        ((r1 + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((g1 + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((b1 + m) * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

/// Standard normal sample (Box-Muller).
fn standard_normal(rng: &mut StdRng) -> f32 {
    let u1: f32 = rng.random_range(f32::EPSILON..1.0);
    let u2: f32 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

/// A fresh pool of `count` particles on a `width` x `height` canvas.
pub fn spawn_particles(
    count: usize,
    variant: PatternVariant,
    width: f32,
    height: f32,
    rng: &mut StdRng,
) -> Vec<Particle> {
    let palette = Palette::for_variant(variant);
    let uniform = (count as f32 * UNIFORM_SHARE).round() as usize;
    let sigma = 0.5 * width.min(height) / 2.0;
    let (cx, cy) = (width / 2.0, height / 2.0);

    (0..count)
        .map(|i| {
            let (x, y) = if i < uniform {
                (rng.random::<f32>() * width, rng.random::<f32>() * height)
            } else {
                (
                    cx + standard_normal(rng) * sigma,
                    cy + standard_normal(rng) * sigma,
                )
            };
            let mut particle = Particle {
                x,
                y,
                size: rng.random_range(MIN_BASE_SIZE..MAX_BASE_SIZE),
                color: palette.sample(rng),
            };
            particle.clamp_to(width, height);
            particle
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn primary_hues() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [255, 0, 0]);
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), [0, 255, 0]);
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), [0, 0, 255]);
        assert_eq!(hsv_to_rgb(360.0, 0.0, 0.5), [128, 128, 128]);
    }

    #[test]
    fn pool_stays_on_canvas() {
        let mut rng = StdRng::seed_from_u64(7);
        let particles = spawn_particles(5000, PatternVariant::Square, 320.0, 200.0, &mut rng);
        assert_eq!(particles.len(), 5000);
        for p in &particles {
            assert!((0.0..=320.0).contains(&p.x) && (0.0..=200.0).contains(&p.y));
            assert!((1.5..4.0).contains(&p.size));
        }
    }

    #[test]
    fn clustered_share_sits_near_centre() {
        let mut rng = StdRng::seed_from_u64(3);
        let particles = spawn_particles(4000, PatternVariant::Circle, 400.0, 400.0, &mut rng);
        let clustered = &particles[2800..];
        let mean_x = clustered.iter().map(|p| p.x).sum::<f32>() / clustered.len() as f32;
        let mean_y = clustered.iter().map(|p| p.y).sum::<f32>() / clustered.len() as f32;
        assert!((mean_x - 200.0).abs() < 10.0, "mean x {}", mean_x);
        assert!((mean_y - 200.0).abs() < 10.0, "mean y {}", mean_y);
    }

    #[test]
    fn colours_follow_variant_palette() {
        let mut rng = StdRng::seed_from_u64(11);
        // Circle: red/orange, so red dominates and blue is the weakest channel
        for p in spawn_particles(200, PatternVariant::Circle, 100.0, 100.0, &mut rng) {
            let [r, g, b] = p.color;
            assert!(r >= g && g >= b, "{:?}", p.color);
        }
        // Square: cyan/blue, blue dominates
        for p in spawn_particles(200, PatternVariant::Square, 100.0, 100.0, &mut rng) {
            let [r, _, b] = p.color;
            assert!(b > r, "{:?}", p.color);
        }
    }

    #[test]
    fn same_seed_same_pool() {
        let a = spawn_particles(50, PatternVariant::Cross, 64.0, 48.0, &mut StdRng::seed_from_u64(1));
        let b = spawn_particles(50, PatternVariant::Cross, 64.0, 48.0, &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }
}

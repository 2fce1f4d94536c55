pub mod field;
pub mod particles;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::audio::analyser::AnalysisFrame;
pub use field::{FrequencyBands, PatternVariant};
pub use particles::Particle;

pub const MIN_COMPLEXITY: u32 = 2;
pub const MAX_COMPLEXITY: u32 = 20;
pub const DEFAULT_COMPLEXITY: u32 = 10;

/// Chance per tick that an idle particle wanders
const DRIFT_PROBABILITY: f64 = 0.1;
const DRIFT_STEP: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("render target missing (zero-sized canvas)")]
    RenderTargetMissing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternConfig {
    pub variant: PatternVariant,
    pub complexity: u32,
}

impl PatternConfig {
    pub fn new(variant: PatternVariant, complexity: u32) -> Self {
        Self {
            variant,
            complexity: clamp_complexity(complexity),
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self::new(PatternVariant::default(), DEFAULT_COMPLEXITY)
    }
}

pub fn clamp_complexity(complexity: u32) -> u32 {
    complexity.clamp(MIN_COMPLEXITY, MAX_COMPLEXITY)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationSettings {
    pub particle_count: usize,
    /// Particles evaluated against the plate each running tick
    pub active_particles: usize,
    /// Pause after a pattern change before the field runs again (seconds)
    pub settle_secs: f32,
    /// Fixed RNG seed; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            particle_count: 5000,
            active_particles: 2000,
            settle_secs: 0.1,
            seed: None,
        }
    }
}

/// One particle to draw this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sprite {
    pub x: f32,
    pub y: f32,
    /// Diameter in pixels
    pub diameter: f32,
    pub color: [u8; 3],
}

#[derive(Clone, Debug)]
pub struct SimulationState {
    pub particles: Vec<Particle>,
    pub config: PatternConfig,
    pub width: f32,
    pub height: f32,
    /// Simulation clock (seconds), drives the silence fallback
    pub elapsed: f32,
    pub bands: FrequencyBands,
    pub settle_remaining: f32,
}

impl SimulationState {
    pub fn has_target(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn is_settling(&self) -> bool {
        self.settle_remaining > 0.0
    }
}

/// Move node-line particles for one running tick and collect their sprites.
/// Only the first `active` particles are evaluated.
pub fn step_field(
    state: &mut SimulationState,
    active: usize,
    rng: &mut StdRng,
    sprites: &mut Vec<Sprite>,
) {
    let SimulationState {
        particles,
        config,
        width,
        height,
        bands,
        ..
    } = state;
    let (w, h) = (*width, *height);
    let (n, m) = field::mode_numbers(config.complexity, bands);
    let threshold = field::node_threshold(bands.mid);
    let jitter = field::jitter_range(bands.treble);

    let active = active.min(particles.len());
    for p in particles[..active].iter_mut() {
        let z = field::field_value(config.variant, n, m, p.x - w / 2.0, p.y - h / 2.0, w, h);
        if z.abs() >= threshold {
            continue;
        }
        p.x += rng.random_range(-jitter..jitter);
        p.y += rng.random_range(-jitter..jitter);
        p.clamp_to(w, h);
        sprites.push(Sprite {
            x: p.x,
            y: p.y,
            diameter: field::sprite_size(p.size, bands.bass),
            color: p.color,
        });
    }
}

/// Idle motion: a few particles wander, everything is drawn at base size.
pub fn drift(state: &mut SimulationState, rng: &mut StdRng, sprites: &mut Vec<Sprite>) {
    let (w, h) = (state.width, state.height);
    for p in state.particles.iter_mut() {
        if rng.random_bool(DRIFT_PROBABILITY) {
            p.x += rng.random_range(-DRIFT_STEP..DRIFT_STEP);
            p.y += rng.random_range(-DRIFT_STEP..DRIFT_STEP);
            p.clamp_to(w, h);
        }
        sprites.push(Sprite {
            x: p.x,
            y: p.y,
            diameter: p.size,
            color: p.color,
        });
    }
}

pub struct ChladniSimulator {
    settings: SimulationSettings,
    state: SimulationState,
    run_requested: bool,
    rng: StdRng,
    sprites: Vec<Sprite>,
}

impl ChladniSimulator {
    pub fn new(config: PatternConfig, width: u32, height: u32, settings: SimulationSettings) -> Self {
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let (w, h) = (width as f32, height as f32);
        let config = PatternConfig::new(config.variant, config.complexity);
        let particles = particles::spawn_particles(settings.particle_count, config.variant, w, h, &mut rng);

        Self {
            settings,
            state: SimulationState {
                particles,
                config,
                width: w,
                height: h,
                elapsed: 0.0,
                bands: FrequencyBands::floors(),
                settle_remaining: 0.0,
            },
            run_requested: false,
            rng,
            sprites: Vec::new(),
        }
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn config(&self) -> PatternConfig {
        self.state.config
    }

    pub fn particles(&self) -> &[Particle] {
        &self.state.particles
    }

    pub fn bands(&self) -> FrequencyBands {
        self.state.bands
    }

    /// Sprites produced by the last `advance`.
    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    pub fn set_running(&mut self, running: bool) {
        self.run_requested = running;
    }

    /// Running was requested and no pattern change is still settling.
    pub fn is_running(&self) -> bool {
        self.run_requested && !self.state.is_settling()
    }

    /// Advance one tick of `dt` seconds using `frame` (if any).
    pub fn advance(
        &mut self,
        frame: Option<&AnalysisFrame>,
        dt: f32,
    ) -> Result<&[Sprite], SimulationError> {
        if !self.state.has_target() {
            log::debug!("Skipping simulation tick: render target missing");
            return Err(SimulationError::RenderTargetMissing);
        }

        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.sprites.clear();
        self.state.elapsed += dt;
        if self.state.is_settling() {
            self.state.settle_remaining = (self.state.settle_remaining - dt).max(0.0);
            if !self.state.is_settling() {
                log::debug!("Pattern settled");
            }
        }

        if self.is_running() {
            self.state.bands = FrequencyBands::from_frame(frame, self.state.elapsed);
            step_field(
                &mut self.state,
                self.settings.active_particles,
                &mut self.rng,
                &mut self.sprites,
            );
        } else {
            drift(&mut self.state, &mut self.rng, &mut self.sprites);
        }
        Ok(&self.sprites)
    }

    /// Rebuild the particle pool. With `settle`, the field stays idle for the
    /// configured settle delay.
    pub fn reinitialize(&mut self, settle: bool) {
        let state = &mut self.state;
        state.particles = particles::spawn_particles(
            self.settings.particle_count,
            state.config.variant,
            state.width,
            state.height,
            &mut self.rng,
        );
        state.bands = FrequencyBands::floors();
        state.settle_remaining = if settle { self.settings.settle_secs.max(0.0) } else { 0.0 };
        self.sprites.clear();
        log::debug!(
            "Spawned {} particles ({} x{})",
            state.particles.len(),
            state.config.variant,
            state.config.complexity
        );
    }

    pub fn set_pattern_variant(&mut self, variant: PatternVariant) {
        if self.state.config.variant == variant {
            return;
        }
        log::info!("Pattern {} -> {}", self.state.config.variant, variant);
        self.state.config.variant = variant;
        self.reinitialize(true);
    }

    pub fn set_complexity(&mut self, complexity: u32) {
        let complexity = clamp_complexity(complexity);
        if self.state.config.complexity == complexity {
            return;
        }
        log::info!("Complexity {} -> {}", self.state.config.complexity, complexity);
        self.state.config.complexity = complexity;
        self.reinitialize(true);
    }

    /// Follow a canvas size change, scaling particles with it.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (w, h) = (width as f32, height as f32);
        if w == self.state.width && h == self.state.height {
            return;
        }
        let had_target = self.state.has_target();
        let (sx, sy) = (w / self.state.width, h / self.state.height);
        self.state.width = w;
        self.state.height = h;

        if !self.state.has_target() {
            log::debug!("Canvas collapsed to {}x{}", width, height);
            return;
        }
        if !had_target {
            self.reinitialize(false);
            return;
        }
        for p in self.state.particles.iter_mut() {
            p.x *= sx;
            p.y *= sy;
            p.clamp_to(w, h);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(seed: u64) -> SimulationSettings {
        SimulationSettings {
            seed: Some(seed),
            ..SimulationSettings::default()
        }
    }

    fn loud_frame() -> AnalysisFrame {
        let bins = (0..1024).map(|i| (255 - i / 4) as u8).collect();
        AnalysisFrame::from_bins(bins, 44100)
    }

    fn in_bounds(sim: &ChladniSimulator) -> bool {
        let s = sim.state();
        s.particles
            .iter()
            .all(|p| p.x >= 0.0 && p.x <= s.width && p.y >= 0.0 && p.y <= s.height)
    }

    #[test]
    fn particles_stay_on_canvas() {
        let frame = loud_frame();
        for variant in PatternVariant::ALL {
            for complexity in MIN_COMPLEXITY..=MAX_COMPLEXITY {
                let mut sim = ChladniSimulator::new(
                    PatternConfig::new(variant, complexity),
                    120,
                    90,
                    SimulationSettings {
                        particle_count: 400,
                        active_particles: 400,
                        ..settings(complexity as u64)
                    },
                );
                sim.set_running(true);
                for _ in 0..20 {
                    sim.advance(Some(&frame), 1.0 / 60.0).unwrap();
                }
                assert!(in_bounds(&sim), "{} x{}", variant, complexity);
            }
        }
    }

    #[test]
    fn silent_tick_stays_near_floors() {
        let mut sim = ChladniSimulator::new(PatternConfig::default(), 640, 480, settings(1));
        sim.set_running(true);
        let frame = AnalysisFrame::new(1024, 44100);
        sim.advance(Some(&frame), 1.0 / 60.0).unwrap();

        let bands = sim.bands();
        assert!((bands.bass - 0.21).abs() < 0.01);
        assert!((bands.mid - 0.15).abs() < 0.01);
        assert!((bands.treble - 0.09).abs() < 0.01);
    }

    #[test]
    fn only_active_particles_move() {
        let mut sim = ChladniSimulator::new(
            PatternConfig::default(),
            300,
            300,
            SimulationSettings {
                particle_count: 1000,
                active_particles: 100,
                ..settings(5)
            },
        );
        let before: Vec<Particle> = sim.particles()[100..].to_vec();
        sim.set_running(true);
        let sprites = sim.advance(Some(&loud_frame()), 0.016).unwrap().len();
        assert!(sprites <= 100);
        assert_eq!(&sim.particles()[100..], &before[..]);
    }

    #[test]
    fn idle_field_draws_everything_at_base_size() {
        let mut sim = ChladniSimulator::new(
            PatternConfig::default(),
            200,
            100,
            SimulationSettings {
                particle_count: 500,
                ..settings(2)
            },
        );
        let sprites = sim.advance(None, 0.016).unwrap().to_vec();
        assert_eq!(sprites.len(), 500);
        for (sprite, p) in sprites.iter().zip(sim.particles()) {
            assert_eq!(sprite.diameter, p.size);
        }
        assert!(in_bounds(&sim));
    }

    #[test]
    fn idle_drift_is_small() {
        let mut sim = ChladniSimulator::new(PatternConfig::default(), 200, 200, settings(9));
        let before = sim.particles().to_vec();
        sim.advance(None, 0.016).unwrap();
        let moved = sim
            .particles()
            .iter()
            .zip(&before)
            .filter(|(a, b)| a != b)
            .count();
        assert!(moved > 0 && moved < before.len() / 4, "moved {}", moved);
        for (a, b) in sim.particles().iter().zip(&before) {
            assert!((a.x - b.x).abs() <= 0.501 && (a.y - b.y).abs() <= 0.501);
        }
    }

    #[test]
    fn pattern_change_reseeds_and_settles() {
        let mut sim = ChladniSimulator::new(PatternConfig::default(), 200, 200, settings(4));
        sim.set_running(true);
        assert!(sim.is_running());

        let before = sim.particles().to_vec();
        sim.set_complexity(10);
        assert_eq!(sim.particles(), &before[..]);

        sim.set_pattern_variant(PatternVariant::Cross);
        assert_ne!(sim.particles(), &before[..]);
        assert!(!sim.is_running());

        sim.advance(None, 0.05).unwrap();
        assert!(!sim.is_running());
        sim.advance(None, 0.06).unwrap();
        assert!(sim.is_running());

        sim.set_running(false);
        sim.set_complexity(99);
        assert_eq!(sim.config().complexity, MAX_COMPLEXITY);
        sim.advance(None, 0.2).unwrap();
        assert!(!sim.is_running());
    }

    #[test]
    fn missing_target_skips_tick() {
        let mut sim = ChladniSimulator::new(PatternConfig::default(), 0, 100, settings(6));
        let elapsed = sim.state().elapsed;
        assert_eq!(sim.advance(None, 0.1), Err(SimulationError::RenderTargetMissing));
        assert_eq!(sim.state().elapsed, elapsed);

        sim.resize(100, 100);
        assert!(sim.advance(None, 0.1).is_ok());
        assert!(in_bounds(&sim));
    }

    #[test]
    fn resize_scales_positions() {
        let mut sim = ChladniSimulator::new(PatternConfig::default(), 200, 100, settings(8));
        let before = sim.particles().to_vec();
        sim.resize(400, 50);
        for (a, b) in sim.particles().iter().zip(&before) {
            assert!((a.x - b.x * 2.0).abs() < 1e-3);
            assert!((a.y - b.y * 0.5).abs() < 1e-3);
        }
        assert!(in_bounds(&sim));
    }
}

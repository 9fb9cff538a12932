use crate::config::Theme;
use crate::render::{Frame, Rgb, Viewport, WHITE};
use crate::schedule::ms_to_frames;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f32::consts::TAU;

pub(crate) const OVERLAY_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789@#$%&*+=<>[]{}()";
pub(crate) const LOADER_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789@#$%&*+=<>?";

const SLATE: Rgb = Rgb::new(100, 116, 139);

/// What drives a wave's phase along the field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WaveInput {
    Column,
    Row,
    BaseX,
    BaseY,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Wave {
    pub(crate) amplitude: f32,
    pub(crate) frequency: f32,
    pub(crate) input: WaveInput,
    pub(crate) pace: f32,
}

impl Wave {
    fn offset(&self, g: &Glyph, time: f32) -> f32 {
        let coord = match self.input {
            WaveInput::Column => g.col as f32,
            WaveInput::Row => g.row as f32,
            WaveInput::BaseX => g.base_x,
            WaveInput::BaseY => g.base_y,
        };
        self.amplitude * (self.frequency * coord + self.pace * time + g.phase).sin()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tint {
    Themed(Theme),
    Fixed,
}

impl Tint {
    fn color(self, opacity: f32) -> (Rgb, f32) {
        match self {
            Tint::Themed(Theme::Dark) | Tint::Fixed => (WHITE, opacity * 0.15),
            Tint::Themed(Theme::Light) => (SLATE, opacity * 0.25),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct FieldConfig {
    /// Grid spacing in cells.
    pub(crate) spacing: (f32, f32),
    pub(crate) jitter: (f32, f32),
    pub(crate) alphabet: &'static str,
    pub(crate) wave_x: Option<Wave>,
    pub(crate) wave_y: Option<Wave>,
    pub(crate) time_step: f32,
    /// Frames between glyph swaps, inclusive.
    pub(crate) change_every: (u32, u32),
    pub(crate) opacity: (f32, f32),
    pub(crate) size: (f32, f32),
    pub(crate) bold_above: f32,
    pub(crate) tint: Tint,
}

impl FieldConfig {
    /// Floating characters over the page.
    pub(crate) fn overlay(theme: Theme) -> Self {
        Self {
            spacing: (10.0, 5.0),
            jitter: (4.0, 2.0),
            alphabet: OVERLAY_ALPHABET,
            wave_x: Some(Wave {
                amplitude: 5.0,
                frequency: 0.3,
                input: WaveInput::Row,
                pace: 0.3,
            }),
            wave_y: Some(Wave {
                amplitude: 2.5,
                frequency: 0.5,
                input: WaveInput::Column,
                pace: 0.5,
            }),
            time_step: 0.05,
            change_every: (50, 150),
            opacity: (0.3, 0.9),
            size: (12.0, 16.0),
            bold_above: 15.0,
            tint: Tint::Themed(theme),
        }
    }

    /// Drifting letters behind the loader; time runs in seconds.
    pub(crate) fn loader(fps: u32, compact: bool) -> Self {
        let spacing = if compact { (12.5, 6.0) } else { (10.0, 5.0) };
        let size = if compact { 14.0 } else { 16.0 };
        Self {
            spacing,
            jitter: (4.0, 2.0),
            alphabet: LOADER_ALPHABET,
            wave_x: Some(Wave {
                amplitude: 5.0,
                // 0.001 per pixel, at about 16 px per cell
                frequency: 0.016,
                input: WaveInput::BaseY,
                pace: 1.0,
            }),
            wave_y: None,
            time_step: 1.0 / fps.max(1) as f32,
            change_every: (
                ms_to_frames(3000, fps) as u32,
                ms_to_frames(5000, fps) as u32,
            ),
            opacity: (0.5, 1.0),
            size: (size, size),
            bold_above: 15.0,
            tint: Tint::Fixed,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Glyph {
    pub(crate) base_x: f32,
    pub(crate) base_y: f32,
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) col: u32,
    pub(crate) row: u32,
    pub(crate) ch: char,
    pub(crate) countdown: u32,
    pub(crate) swaps: u32,
    pub(crate) opacity: f32,
    pub(crate) size: f32,
    pub(crate) phase: f32,
}

pub(crate) struct ParticleField {
    config: FieldConfig,
    alphabet: Vec<char>,
    glyphs: Vec<Glyph>,
    time: f32,
    rng: StdRng,
}

fn pick(rng: &mut StdRng, (lo, hi): (f32, f32)) -> f32 {
    lo + rng.gen::<f32>() * (hi - lo)
}

fn countdown(rng: &mut StdRng, (lo, hi): (u32, u32)) -> u32 {
    if hi <= lo {
        lo
    } else {
        rng.gen_range(lo..=hi)
    }
}

impl ParticleField {
    pub(crate) fn new(config: FieldConfig, cells: Viewport, seed: u64) -> Self {
        let alphabet: Vec<char> = config.alphabet.chars().collect();
        let mut field = Self {
            config,
            alphabet,
            glyphs: Vec::new(),
            time: 0.0,
            rng: StdRng::seed_from_u64(seed),
        };
        field.resize(cells);
        field
    }

    pub(crate) fn glyphs(&self) -> &[Glyph] {
        &self.glyphs
    }

    fn random_char(&mut self) -> char {
        if self.alphabet.is_empty() {
            return ' ';
        }
        self.alphabet[self.rng.gen_range(0..self.alphabet.len())]
    }

    /// Throws away every glyph and lays out a fresh grid.
    pub(crate) fn resize(&mut self, cells: Viewport) {
        let (sx, sy) = self.config.spacing;
        let (jx, jy) = self.config.jitter;
        let cols = (cells.width / sx).ceil().max(0.0) as u32;
        let rows = (cells.height / sy).ceil().max(0.0) as u32;

        self.glyphs.clear();
        self.glyphs.reserve((cols * rows) as usize);
        for col in 0..cols {
            for row in 0..rows {
                let bx = col as f32 * sx + (self.rng.gen::<f32>() - 0.5) * jx;
                let by = row as f32 * sy + (self.rng.gen::<f32>() - 0.5) * jy;
                let ch = self.random_char();
                let countdown = countdown(&mut self.rng, self.config.change_every);
                let opacity = pick(&mut self.rng, self.config.opacity);
                let size = pick(&mut self.rng, self.config.size);
                let phase = self.rng.gen_range(0.0..TAU);
                self.glyphs.push(Glyph {
                    base_x: bx,
                    base_y: by,
                    x: bx,
                    y: by,
                    col,
                    row,
                    ch,
                    countdown,
                    swaps: 0,
                    opacity,
                    size,
                    phase,
                });
            }
        }
    }

    pub(crate) fn set_theme(&mut self, theme: Theme) {
        if let Tint::Themed(_) = self.config.tint {
            self.config.tint = Tint::Themed(theme);
        }
    }

    pub(crate) fn step(&mut self) {
        self.time += self.config.time_step;
        let time = self.time;
        let (wave_x, wave_y) = (self.config.wave_x, self.config.wave_y);

        for i in 0..self.glyphs.len() {
            let dx = wave_x.map_or(0.0, |w| w.offset(&self.glyphs[i], time));
            let dy = wave_y.map_or(0.0, |w| w.offset(&self.glyphs[i], time));
            let g = &mut self.glyphs[i];
            g.x = g.base_x + dx;
            g.y = g.base_y + dy;

            if g.countdown > 0 {
                g.countdown -= 1;
                continue;
            }
            let ch = self.random_char();
            let next = countdown(&mut self.rng, self.config.change_every);
            let g = &mut self.glyphs[i];
            g.ch = ch;
            g.countdown = next;
            g.swaps += 1;
        }
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        for g in &self.glyphs {
            let (rgb, alpha) = self.config.tint.color(g.opacity);
            frame.glyph(
                g.x.round() as i32,
                g.y.round() as i32,
                g.ch,
                rgb,
                alpha,
                g.size > self.config.bold_above,
            );
        }
    }
}

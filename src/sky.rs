use crate::render::{Frame, Rgb, Viewport, WHITE};
use crate::schedule::{ms_to_frames, Timeline};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f32::consts::TAU;

const PURPLE: Rgb = Rgb::new(147, 112, 219);
const BLUE: Rgb = Rgb::new(102, 126, 234);

#[derive(Clone, Debug)]
pub(crate) struct SkyConfig {
    pub(crate) stars: usize,
    /// Frames between regular shooting-star spawns.
    pub(crate) spawn_every: u64,
    /// The extra early spawn after the first one.
    pub(crate) second_spawn: u64,
    /// Dots per frame.
    pub(crate) speed: (f32, f32),
    pub(crate) length: (f32, f32),
    /// How far outside the viewport a streak may travel before it is culled.
    pub(crate) margin: f32,
    pub(crate) edge_offset: f32,
    pub(crate) life_decay: f32,
}

impl SkyConfig {
    pub(crate) fn new(stars: usize, fps: u32) -> Self {
        Self {
            stars,
            spawn_every: ms_to_frames(1500, fps),
            second_spawn: ms_to_frames(500, fps),
            speed: (0.8, 1.3),
            length: (12.0, 28.0),
            margin: 20.0,
            edge_offset: 2.0,
            life_decay: 0.008,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Star {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) size: f32,
    pub(crate) opacity: f32,
    pub(crate) twinkle_speed: f32,
    pub(crate) phase: f32,
}

impl Star {
    pub(crate) fn alpha(&self) -> f32 {
        self.opacity * (0.7 + 0.3 * self.phase.sin())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

impl Edge {
    const ALL: [Edge; 4] = [Edge::Top, Edge::Right, Edge::Bottom, Edge::Left];

    /// Heading in degrees, always pointing back across the screen.
    fn heading_range(self) -> (f32, f32) {
        match self {
            Edge::Top => (60.0, 120.0),
            Edge::Right => (150.0, 210.0),
            Edge::Bottom => (240.0, 300.0),
            Edge::Left => (330.0, 390.0),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ShootingStar {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) angle: f32,
    pub(crate) speed: f32,
    pub(crate) length: f32,
    pub(crate) life: f32,
}

impl ShootingStar {
    fn direction(&self) -> (f32, f32) {
        let r = self.angle.to_radians();
        (r.cos(), r.sin())
    }

    fn alive_in(&self, vp: Viewport, margin: f32) -> bool {
        self.life > 0.0
            && self.x >= -margin
            && self.x <= vp.width + margin
            && self.y >= -margin
            && self.y <= vp.height + margin
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SkyJob {
    Spawn,
    /// Spawns and queues itself again.
    Interval,
}

pub(crate) struct Sky {
    config: SkyConfig,
    viewport: Viewport,
    stars: Vec<Star>,
    shooting: Vec<ShootingStar>,
    timeline: Timeline<SkyJob>,
    rng: StdRng,
}

impl Sky {
    pub(crate) fn new(config: SkyConfig, dots: Viewport, seed: u64) -> Self {
        let mut sky = Self {
            config,
            viewport: dots,
            stars: Vec::new(),
            shooting: Vec::new(),
            timeline: Timeline::default(),
            rng: StdRng::seed_from_u64(seed),
        };
        sky.create_stars();
        sky.spawn();
        let (second, every) = (sky.config.second_spawn, sky.config.spawn_every);
        sky.timeline.schedule_in(second, SkyJob::Spawn);
        sky.timeline.schedule_in(every, SkyJob::Interval);
        sky
    }

    pub(crate) fn stars(&self) -> &[Star] {
        &self.stars
    }

    pub(crate) fn shooting(&self) -> &[ShootingStar] {
        &self.shooting
    }

    pub(crate) fn resize(&mut self, dots: Viewport) {
        self.viewport = dots;
        self.create_stars();
    }

    fn create_stars(&mut self) {
        let vp = self.viewport;
        self.stars.clear();
        self.stars.reserve(self.config.stars);
        for _ in 0..self.config.stars {
            self.stars.push(Star {
                x: self.rng.gen::<f32>() * vp.width,
                y: self.rng.gen::<f32>() * vp.height,
                size: self.rng.gen_range(0.5..2.5),
                opacity: self.rng.gen_range(0.5..1.0),
                twinkle_speed: self.rng.gen_range(0.01..0.03),
                phase: self.rng.gen_range(0.0..TAU),
            });
        }
    }

    fn spawn(&mut self) {
        let edge = Edge::ALL[self.rng.gen_range(0..Edge::ALL.len())];
        self.spawn_from(edge);
    }

    fn spawn_from(&mut self, edge: Edge) {
        let vp = self.viewport;
        let off = self.config.edge_offset;
        let (x, y) = match edge {
            Edge::Top => (self.rng.gen::<f32>() * vp.width, -off),
            Edge::Right => (vp.width + off, self.rng.gen::<f32>() * vp.height),
            Edge::Bottom => (self.rng.gen::<f32>() * vp.width, vp.height + off),
            Edge::Left => (-off, self.rng.gen::<f32>() * vp.height),
        };
        let (lo, hi) = edge.heading_range();
        let (slo, shi) = self.config.speed;
        let (llo, lhi) = self.config.length;
        self.shooting.push(ShootingStar {
            x,
            y,
            angle: self.rng.gen_range(lo..hi),
            speed: self.rng.gen_range(slo..shi),
            length: self.rng.gen_range(llo..lhi),
            life: 1.0,
        });
    }

    pub(crate) fn step(&mut self) {
        self.timeline.advance();
        for job in self.timeline.take_due() {
            self.spawn();
            if job == SkyJob::Interval {
                self.timeline.schedule_in(self.config.spawn_every.max(1), SkyJob::Interval);
            }
        }

        for s in &mut self.stars {
            s.phase += s.twinkle_speed;
        }

        let (vp, margin, decay) = (self.viewport, self.config.margin, self.config.life_decay);
        self.shooting.retain_mut(|s| {
            let (dx, dy) = s.direction();
            s.x += dx * s.speed;
            s.y += dy * s.speed;
            s.life -= decay;
            s.alive_in(vp, margin)
        });
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let canvas = &mut frame.canvas;
        for s in &self.stars {
            let a = s.alpha();
            canvas.fill_circle(s.x, s.y, s.size * 0.5, WHITE.with_alpha(a));
            // halo goes over the core and tints it
            if s.size > 1.5 {
                canvas.fill_circle(s.x, s.y, s.size * 0.5 + 1.0, PURPLE.with_alpha(a * 0.3));
            }
        }

        for s in &self.shooting {
            let life = s.life.clamp(0.0, 1.0);
            let (dx, dy) = s.direction();
            let end_x = s.x - dx * s.length;
            let end_y = s.y - dy * s.length;
            canvas.line_with(s.x, s.y, end_x, end_y, |t| trail_color(t, life));
            canvas.fill_circle(s.x, s.y, 2.5, PURPLE.with_alpha(life * 0.5));
            canvas.fill_circle(s.x, s.y, 1.0, WHITE.with_alpha(life));
        }
    }
}

/// Gradient along a trail, `t = 0` at the head.
fn trail_color(t: f32, life: f32) -> crate::render::Pixel {
    let stops = [
        (0.0, WHITE, life),
        (0.3, PURPLE, life * 0.8),
        (0.7, BLUE, life * 0.4),
        (1.0, BLUE, 0.0),
    ];
    for w in stops.windows(2) {
        let (t0, c0, a0) = w[0];
        let (t1, c1, a1) = w[1];
        if t <= t1 {
            let k = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
            return c0.mix(c1, k).with_alpha(a0 + (a1 - a0) * k);
        }
    }
    BLUE.with_alpha(0.0)
}

use crate::field::{FieldConfig, ParticleField};
use crate::network::Topology;
use crate::render::{Frame, Rgb, Viewport, WHITE};
use crate::schedule::{ms_to_frames, Timeline};
use crate::sim::{NeuralSim, SimConfig};
use tracing::info;

pub(crate) const FADE_STEP: f32 = 0.015;
const FADE_DELAY_MS: u64 = 300;
const BLINK_MS: u64 = 500;

const BG_CENTER: Rgb = Rgb::hex(0x0f1f3a);
const BG_EDGE: Rgb = Rgb::hex(0x0a1628);
const NEURON: Rgb = Rgb::hex(0x888888);
const NEURON_FILL: Rgb = Rgb::hex(0x1a2a3a);
const EDGE_POSITIVE: Rgb = Rgb::hex(0x4a9eff);
const EDGE_NEGATIVE: Rgb = Rgb::hex(0xff6b6b);
const PULSE: Rgb = Rgb::hex(0x58c8ff);

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Phase {
    Running,
    Fading(f32),
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LoaderEvent {
    /// The overlay is done and should be taken off screen. Sent once.
    Detach,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoaderJob {
    BeginFade,
}

#[derive(Clone, Debug)]
pub(crate) struct LoaderOptions {
    pub(crate) name: String,
    pub(crate) heading: String,
    pub(crate) suffix: String,
    pub(crate) layers: Vec<usize>,
    pub(crate) fps: u32,
    pub(crate) seed: u64,
}

pub(crate) struct Loader {
    opts: LoaderOptions,
    sim: NeuralSim,
    field: ParticleField,
    phase: Phase,
    fade_scheduled: bool,
    timeline: Timeline<LoaderJob>,
    cursor_visible: bool,
    last_blink: u64,
    blink_every: u64,
    rebuilds: u64,
}

fn dots_for(cols: u16, rows: u16) -> Viewport {
    Viewport {
        width: cols as f32 * 2.0,
        height: rows as f32 * 4.0,
    }
}

fn cells_for(cols: u16, rows: u16) -> Viewport {
    Viewport {
        width: cols as f32,
        height: rows as f32,
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

impl Loader {
    pub(crate) fn new(opts: LoaderOptions, cols: u16, rows: u16) -> Self {
        let sim = NeuralSim::new(
            SimConfig::new(opts.layers.clone(), opts.fps),
            &opts.name,
            dots_for(cols, rows),
            opts.seed,
        );
        let field = ParticleField::new(
            FieldConfig::loader(opts.fps, sim.topology().is_compact()),
            cells_for(cols, rows),
            opts.seed ^ 0x5eed_f1e1d,
        );
        let blink_every = ms_to_frames(BLINK_MS, opts.fps);
        Self {
            opts,
            sim,
            field,
            phase: Phase::Running,
            fade_scheduled: false,
            timeline: Timeline::default(),
            cursor_visible: true,
            last_blink: 0,
            blink_every,
            rebuilds: 0,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn sim(&self) -> &NeuralSim {
        &self.sim
    }

    /// Rebuilds canvas-dependent state; the revealed name carries over.
    pub(crate) fn resize(&mut self, cols: u16, rows: u16) {
        if self.phase == Phase::Finished {
            return;
        }
        self.rebuilds += 1;
        self.sim.rebuild(dots_for(cols, rows));
        self.field = ParticleField::new(
            FieldConfig::loader(self.opts.fps, self.sim.topology().is_compact()),
            cells_for(cols, rows),
            self.opts.seed.wrapping_add(self.rebuilds),
        );
    }

    /// Takes the loader off screen right away.
    pub(crate) fn skip(&mut self) -> Option<LoaderEvent> {
        if self.phase == Phase::Finished {
            return None;
        }
        self.phase = Phase::Finished;
        info!(revealed = %self.sim.revealed(), stage = ?self.sim.stage(), "loader skipped");
        Some(LoaderEvent::Detach)
    }

    pub(crate) fn frame(&mut self, out: &mut Frame) -> Option<LoaderEvent> {
        if self.phase == Phase::Finished {
            return None;
        }

        self.timeline.advance();
        for job in self.timeline.take_due() {
            match job {
                LoaderJob::BeginFade => {
                    if self.phase == Phase::Running {
                        self.phase = Phase::Fading(1.0);
                    }
                }
            }
        }

        self.field.step();

        let now = self.timeline.now();
        if now - self.last_blink >= self.blink_every {
            self.cursor_visible = !self.cursor_visible;
            self.last_blink = now;
        }

        let alpha = match self.phase {
            Phase::Fading(a) => {
                let a = a - FADE_STEP;
                if a <= 0.0 {
                    self.phase = Phase::Finished;
                    info!(
                        revealed = %self.sim.revealed(),
                        cycles = self.sim.cycles(),
                        "loader finished"
                    );
                    return Some(LoaderEvent::Detach);
                }
                self.phase = Phase::Fading(a);
                a
            }
            _ => {
                self.sim.step();
                if self.sim.is_complete() && !self.fade_scheduled {
                    self.fade_scheduled = true;
                    self.timeline
                        .schedule_in(ms_to_frames(FADE_DELAY_MS, self.opts.fps), LoaderJob::BeginFade);
                }
                1.0
            }
        };

        self.draw_background(out);
        out.set_alpha(alpha);
        let topo = self.sim.topology();
        draw_edges(out, topo);
        self.draw_pulses(out);
        draw_nodes(out, topo);
        self.draw_caption(out);

        self.sim.decay();
        None
    }

    fn draw_background(&self, out: &mut Frame) {
        out.clear(BG_EDGE);
        let dots = out.dots();
        let (cx, cy) = (dots.width / 2.0, dots.height / 2.0);
        let r = dots.width.max(dots.height) / 2.0;
        out.fill_background(|x, y| {
            let dx = x as f32 * 2.0 + 1.0 - cx;
            let dy = y as f32 * 4.0 + 2.0 - cy;
            let t = if r > 0.0 {
                (dx * dx + dy * dy).sqrt() / r
            } else {
                1.0
            };
            BG_CENTER.mix(BG_EDGE, t)
        });
        self.field.draw(out);
    }

    fn draw_pulses(&self, out: &mut Frame) {
        let topo = self.sim.topology();
        for p in self.sim.pulses() {
            let (Some(a), Some(b)) = (topo.node(p.from), topo.node(p.to)) else {
                continue;
            };
            let x = lerp(a.x, b.x, p.progress);
            let y = lerp(a.y, b.y, p.progress);
            out.canvas.fill_circle(x, y, 1.6, WHITE.with_alpha(1.0));
            out.canvas.fill_circle(x, y, 1.2, PULSE.with_alpha(0.8));
        }
    }

    fn caption_rows(&self, out: &Frame) -> (i32, i32) {
        let rows = out.rows as f32;
        let compact = self.sim.topology().is_compact();
        let y = if compact { rows * 0.75 } else { rows * 0.87 };
        let y = (y as i32).min(out.rows as i32 - 2).max(0);
        let gap = if compact { 1 } else { 2 };
        (y, (y + gap).min(out.rows as i32 - 1))
    }

    fn draw_caption(&self, out: &mut Frame) {
        let (y1, y2) = self.caption_rows(out);
        let show_cursor = self.sim.letters_left() && self.cursor_visible;
        let mut name = self.sim.revealed().to_string();
        if show_cursor {
            name.push('_');
        }
        out.text_centered(y1, &[(self.opts.heading.as_str(), WHITE)], true);
        out.text_centered(y2, &[(name.as_str(), PULSE), (self.opts.suffix.as_str(), WHITE)], true);
    }
}

fn draw_edges(out: &mut Frame, topo: &Topology) {
    for e in topo.edges() {
        let (Some(a), Some(b)) = (topo.node(e.from), topo.node(e.to)) else {
            continue;
        };
        let color = if e.weight > 0.0 {
            EDGE_POSITIVE
        } else {
            EDGE_NEGATIVE
        };
        let alpha = 0.35 + e.weight.abs() * 0.45;
        out.canvas.line(a.x, a.y, b.x, b.y, color.with_alpha(alpha));
    }
}

fn draw_nodes(out: &mut Frame, topo: &Topology) {
    for n in topo.nodes() {
        let a = n.activation.get();
        if a > 0.4 {
            out.canvas.fill_circle(n.x, n.y, n.radius + 3.0, PULSE.with_alpha(a * 0.5));
        }
        let fill = if a > 0.3 {
            WHITE.with_alpha(0.85 + a * 0.15)
        } else if a > 0.05 {
            NEURON.with_alpha(a * 2.5)
        } else {
            NEURON_FILL.with_alpha(1.0)
        };
        out.canvas.fill_circle(n.x, n.y, n.radius, fill);
        out.canvas.ring(n.x, n.y, n.radius, NEURON.with_alpha(1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::Stage;

    fn opts(name: &str, layers: &[usize]) -> LoaderOptions {
        LoaderOptions {
            name: name.to_string(),
            heading: "You Have Entered".to_string(),
            suffix: "'s World!!".to_string(),
            layers: layers.to_vec(),
            fps: 60,
            seed: 42,
        }
    }

    fn row(out: &Frame, y: i32) -> String {
        let w = out.cols as usize;
        out.front[y as usize * w..(y as usize + 1) * w]
            .iter()
            .map(|c| c.map(|c| c.ch).unwrap_or(' '))
            .collect()
    }

    #[test]
    fn runs_to_completion_and_detaches_once() {
        let mut out = Frame::new(100, 30);
        let mut l = Loader::new(opts("ab", &[4, 3, 2]), 100, 30);
        let mut detaches = 0;
        for _ in 0..20_000 {
            if l.frame(&mut out) == Some(LoaderEvent::Detach) {
                detaches += 1;
            }
            if l.phase() == Phase::Finished {
                break;
            }
        }
        assert_eq!(l.phase(), Phase::Finished);
        assert_eq!(l.sim().revealed(), "AB");
        for _ in 0..200 {
            if l.frame(&mut out).is_some() {
                detaches += 1;
            }
        }
        assert_eq!(detaches, 1);
        assert!(l.skip().is_none());
    }

    #[test]
    fn fade_drops_alpha_by_a_fixed_step() {
        let mut out = Frame::new(100, 30);
        let mut l = Loader::new(opts("a", &[3, 2]), 100, 30);
        let mut alphas = Vec::new();
        for _ in 0..20_000 {
            let ev = l.frame(&mut out);
            if let Phase::Fading(a) = l.phase() {
                alphas.push(a);
                assert!((out.alpha() - a).abs() < 1e-6);
            }
            if ev.is_some() {
                break;
            }
        }
        assert_eq!(l.phase(), Phase::Finished);
        assert!((alphas[0] - (1.0 - FADE_STEP)).abs() < 1e-6);
        for w in alphas.windows(2) {
            assert!((w[0] - w[1] - FADE_STEP).abs() < 1e-4);
        }
        assert!(*alphas.last().unwrap() > 0.0);
        assert!(*alphas.last().unwrap() <= FADE_STEP + 1e-4);
    }

    #[test]
    fn fade_waits_for_the_delay_after_completion() {
        let mut out = Frame::new(100, 30);
        let mut l = Loader::new(opts("a", &[3, 2]), 100, 30);
        let mut done_at = None;
        let mut fade_at = None;
        for i in 0..20_000u64 {
            l.frame(&mut out);
            if done_at.is_none() && l.sim().is_complete() {
                done_at = Some(i);
            }
            if matches!(l.phase(), Phase::Fading(_)) {
                fade_at = Some(i);
                break;
            }
        }
        let (done, fade) = (done_at.unwrap(), fade_at.unwrap());
        assert_eq!(fade - done, ms_to_frames(FADE_DELAY_MS, 60));
    }

    #[test]
    fn caption_shows_progress_and_blinking_cursor() {
        let mut out = Frame::new(100, 30);
        let mut l = Loader::new(opts("abc", &[18, 15, 10, 5]), 100, 30);
        let (y1, y2) = l.caption_rows(&out);
        let mut with_cursor = false;
        let mut without_cursor = false;
        for _ in 0..90 {
            l.frame(&mut out);
            assert!(row(&out, y1).contains("You Have Entered"));
            let line = row(&out, y2);
            assert!(line.contains("'s World!!"));
            if line.contains("_'s World!!") {
                with_cursor = true;
            } else {
                without_cursor = true;
            }
        }
        assert!(with_cursor && without_cursor);
    }

    #[test]
    fn network_is_drawn_on_the_canvas() {
        let mut out = Frame::new(100, 30);
        let mut l = Loader::new(opts("abc", &[18, 15, 10, 5]), 100, 30);
        l.frame(&mut out);
        let inked = out.canvas.px.iter().filter(|p| p.a >= 32).count();
        assert!(inked > 100);
        // gradient is brighter in the middle
        let mid = out.back.get(50, 15).unwrap().bg;
        let corner = out.back.get(0, 0).unwrap().bg;
        assert!(mid.b > corner.b);
    }

    #[test]
    fn resize_keeps_revealed_letters() {
        let mut out = Frame::new(100, 30);
        let mut l = Loader::new(opts("abc", &[18, 15, 10, 5]), 100, 30);
        for _ in 0..20_000 {
            l.frame(&mut out);
            if l.sim().revealed() == "A" {
                break;
            }
        }
        assert_eq!(l.sim().revealed(), "A");

        l.resize(40, 20);
        let mut small = Frame::new(40, 20);
        let dots = small.dots();
        assert_eq!(l.sim().revealed(), "A");
        assert!(l.sim().topology().is_compact());
        assert!(l.sim().topology().nodes().all(|n| dots.contains(n.x, n.y)));

        for _ in 0..20_000 {
            l.frame(&mut small);
            if l.sim().stage() == Stage::AllLettersDone {
                break;
            }
        }
        assert_eq!(l.sim().revealed(), "ABC");
    }

    #[test]
    fn skip_detaches_immediately() {
        let mut out = Frame::new(60, 20);
        let mut l = Loader::new(opts("abc", &[4, 2]), 60, 20);
        l.frame(&mut out);
        assert_eq!(l.skip(), Some(LoaderEvent::Detach));
        assert_eq!(l.frame(&mut out), None);
        assert_eq!(l.phase(), Phase::Finished);
    }
}

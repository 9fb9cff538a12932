use crate::config::Theme;
use crate::field::{FieldConfig, ParticleField};
use crate::render::Frame;
use crate::sky::{Sky, SkyConfig};

#[derive(Clone, Debug)]
pub(crate) struct PageOptions {
    pub(crate) theme: Theme,
    pub(crate) stars: usize,
    pub(crate) fps: u32,
    pub(crate) seed: u64,
    pub(crate) stars_enabled: bool,
    pub(crate) glyphs_enabled: bool,
}

/// The themed page under the loader: drifting glyphs with a starfield on top.
pub(crate) struct Page {
    theme: Theme,
    sky: Option<Sky>,
    glyphs: Option<ParticleField>,
}

impl Page {
    pub(crate) fn new(opts: &PageOptions, cols: u16, rows: u16) -> Self {
        let frame = Frame::new(cols, rows);
        let sky = opts.stars_enabled.then(|| {
            Sky::new(
                SkyConfig::new(opts.stars, opts.fps),
                frame.dots(),
                opts.seed,
            )
        });
        let glyphs = opts.glyphs_enabled.then(|| {
            ParticleField::new(
                FieldConfig::overlay(opts.theme),
                frame.cells(),
                opts.seed ^ 0x0f10_a7,
            )
        });
        Self {
            theme: opts.theme,
            sky,
            glyphs,
        }
    }

    pub(crate) fn theme(&self) -> Theme {
        self.theme
    }

    pub(crate) fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        if let Some(g) = self.glyphs.as_mut() {
            g.set_theme(theme);
        }
    }

    pub(crate) fn resize(&mut self, cols: u16, rows: u16) {
        let frame = Frame::new(cols, rows);
        if let Some(s) = self.sky.as_mut() {
            s.resize(frame.dots());
        }
        if let Some(g) = self.glyphs.as_mut() {
            g.resize(frame.cells());
        }
    }

    pub(crate) fn frame(&mut self, out: &mut Frame) {
        out.clear(self.theme.page_background());
        if let Some(g) = self.glyphs.as_mut() {
            g.step();
            g.draw(out);
        }
        if let Some(s) = self.sky.as_mut() {
            s.step();
            s.draw(out);
        }
    }
}

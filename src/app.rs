use crate::config::{Config, Theme};
use crate::input::{collect_input_nonblocking, map_event_to_action, Action};
use crate::loader::{Loader, LoaderEvent, LoaderOptions};
use crate::page::{Page, PageOptions};
use crate::render::{Frame, Terminal};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub(crate) struct App {
    config: Config,
    term: Terminal,
    frame: Frame,
    loader: Option<Loader>,
    page: Page,
    should_quit: bool,
}

fn loader_options(config: &Config) -> LoaderOptions {
    let s = &config.settings;
    LoaderOptions {
        name: s.name.clone(),
        heading: s.heading.clone(),
        suffix: s.suffix.clone(),
        layers: s.layers.clone(),
        fps: s.fps,
        seed: config.seed,
    }
}

fn page_options(config: &Config) -> PageOptions {
    PageOptions {
        theme: config.settings.theme,
        stars: config.settings.stars,
        fps: config.settings.fps,
        seed: config.seed.rotate_left(17) ^ 0xA5A5_5A5A,
        stars_enabled: config.stars_enabled,
        glyphs_enabled: config.glyphs_enabled,
    }
}

impl App {
    fn init(config: Config) -> anyhow::Result<Self> {
        let term = Terminal::begin()?;
        let (cols, rows) = (term.cols, term.rows);

        let loader = (!config.skip_loader).then(|| Loader::new(loader_options(&config), cols, rows));
        let page = Page::new(&page_options(&config), cols, rows);

        info!(
            name = %config.settings.name,
            fps = config.settings.fps,
            seed = config.seed,
            layers = ?config.settings.layers,
            cols,
            rows,
            loader = loader.is_some(),
            "starting"
        );

        Ok(Self {
            config,
            term,
            frame: Frame::new(cols, rows),
            loader,
            page,
            should_quit: false,
        })
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let frame_dt = Duration::from_secs_f32(1.0 / self.config.settings.fps as f32);
        let mut full_repaint = true;

        while !self.should_quit {
            let started = Instant::now();

            if self.term.resize_if_needed()? {
                self.relayout();
            }

            for ev in collect_input_nonblocking(frame_dt)? {
                match map_event_to_action(&ev) {
                    Some(Action::Quit) => {
                        self.should_quit = true;
                        break;
                    }
                    Some(Action::ToggleTheme) => {
                        let theme = self.page.theme().toggled();
                        self.page.set_theme(theme);
                        debug!(?theme, "theme toggled");
                    }
                    Some(Action::SkipLoader) => {
                        if let Some(LoaderEvent::Detach) = self.loader.as_mut().and_then(Loader::skip) {
                            self.loader = None;
                        }
                    }
                    None => {}
                }
            }

            self.tick();

            self.frame.compose(&mut self.term.cur);
            self.term.present(!full_repaint)?;
            full_repaint = false;

            spin_sleep(frame_dt, started);
        }
        Ok(())
    }

    fn relayout(&mut self) {
        let (cols, rows) = (self.term.cols, self.term.rows);
        debug!(cols, rows, "resized");
        self.frame = Frame::new(cols, rows);
        if let Some(l) = self.loader.as_mut() {
            l.resize(cols, rows);
        }
        self.page.resize(cols, rows);
    }

    /// Page first; the loader, while attached, paints over all of it.
    fn tick(&mut self) {
        self.page.frame(&mut self.frame);
        let event = self.loader.as_mut().and_then(|l| l.frame(&mut self.frame));
        if event == Some(LoaderEvent::Detach) {
            self.loader = None;
        }
    }

    fn theme(&self) -> Theme {
        self.page.theme()
    }
}

pub(crate) fn run(config: Config) -> anyhow::Result<()> {
    let mut app = App::init(config)?;
    let result = app.run();
    let ended = app.term.end();
    result?;
    ended?;

    let theme = app.theme();
    if app.config.persist_theme(theme)? {
        info!(?theme, "theme saved");
    }
    info!("bye");
    Ok(())
}

/* -----------------------------
   Frame pacing helper
------------------------------ */

fn spin_sleep(target: Duration, start: Instant) {
    let end = start + target;
    loop {
        let t = Instant::now();
        if t >= end {
            break;
        }
        let left = end - t;
        if left > Duration::from_millis(2) {
            std::thread::sleep(Duration::from_millis(1));
        } else {
            std::hint::spin_loop();
        }
    }
}

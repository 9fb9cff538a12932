use crate::render::Rgb;
use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub(crate) fn toggled(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub(crate) fn page_background(self) -> Rgb {
        match self {
            Theme::Light => Rgb::new(241, 245, 249),
            Theme::Dark => Rgb::new(10, 14, 26),
        }
    }
}

/// Neural-network loading splash, then a starfield page.
#[derive(Parser, Debug, Default)]
#[command(name = "neuralsplash")]
pub(crate) struct Args {
    /// name revealed by the loader, one letter per pass
    #[arg(long)]
    pub(crate) name: Option<String>,

    /// first caption line
    #[arg(long)]
    pub(crate) heading: Option<String>,

    /// text shown after the name
    #[arg(long)]
    pub(crate) suffix: Option<String>,

    /// frames per second
    #[arg(long)]
    pub(crate) fps: Option<u32>,

    /// RNG seed (0 = from the clock)
    #[arg(long)]
    pub(crate) seed: Option<u64>,

    #[arg(long, value_enum)]
    pub(crate) theme: Option<Theme>,

    /// number of background stars
    #[arg(long)]
    pub(crate) stars: Option<usize>,

    /// loader layer sizes, e.g. 18,15,10,5
    #[arg(long, value_delimiter = ',')]
    pub(crate) layers: Option<Vec<usize>>,

    /// start on the page, without the loader
    #[arg(long)]
    pub(crate) skip_loader: bool,

    #[arg(long)]
    pub(crate) no_stars: bool,

    #[arg(long)]
    pub(crate) no_glyphs: bool,

    /// settings file (default: project config dir)
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,

    /// write logs to this file
    #[arg(long)]
    pub(crate) log_file: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) name: String,
    pub(crate) heading: String,
    pub(crate) suffix: String,
    pub(crate) theme: Theme,
    pub(crate) fps: u32,
    pub(crate) stars: usize,
    pub(crate) layers: Vec<usize>,
    pub(crate) seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: "YOUR NAME".to_string(),
            heading: "You Have Entered".to_string(),
            suffix: "'s World!!".to_string(),
            theme: Theme::Dark,
            fps: 60,
            stars: 300,
            layers: vec![18, 15, 10, 5],
            seed: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub(crate) settings: Settings,
    /// What was on disk, so only the theme is written back.
    pub(crate) stored: Settings,
    pub(crate) settings_path: Option<PathBuf>,
    pub(crate) seed: u64,
    pub(crate) skip_loader: bool,
    pub(crate) stars_enabled: bool,
    pub(crate) glyphs_enabled: bool,
    pub(crate) log_file: Option<PathBuf>,
}

impl Config {
    pub(crate) fn resolve(args: Args) -> Result<Config> {
        let settings_path = args.config.clone().or_else(default_settings_path);
        let stored = settings_path
            .as_deref()
            .map(load_settings)
            .unwrap_or_default();

        let mut s = stored.clone();
        if let Some(v) = args.name {
            s.name = v;
        }
        if let Some(v) = args.heading {
            s.heading = v;
        }
        if let Some(v) = args.suffix {
            s.suffix = v;
        }
        if let Some(v) = args.fps {
            s.fps = v;
        }
        if let Some(v) = args.seed {
            s.seed = v;
        }
        if let Some(v) = args.theme {
            s.theme = v;
        }
        if let Some(v) = args.stars {
            s.stars = v;
        }
        if let Some(v) = args.layers {
            s.layers = v;
        }
        validate(&s)?;

        let seed = if s.seed != 0 { s.seed } else { clock_seed() };

        Ok(Config {
            settings: s,
            stored,
            settings_path,
            seed,
            skip_loader: args.skip_loader,
            stars_enabled: !args.no_stars,
            glyphs_enabled: !args.no_glyphs,
            log_file: args.log_file,
        })
    }

    /// Writes the theme back if it was changed during the run. Everything
    /// else on disk is left as it was.
    pub(crate) fn persist_theme(&self, theme: Theme) -> Result<bool> {
        let Some(path) = self.settings_path.as_deref() else {
            return Ok(false);
        };
        if theme == self.settings.theme {
            return Ok(false);
        }
        let s = Settings {
            theme,
            ..self.stored.clone()
        };
        save_settings_atomic(path, &s)?;
        Ok(true)
    }
}

fn validate(s: &Settings) -> Result<()> {
    ensure!(
        s.layers.len() >= 2,
        "need at least two layers, got {:?}",
        s.layers
    );
    ensure!(
        s.layers.iter().all(|&n| n > 0),
        "every layer needs at least one node, got {:?}",
        s.layers
    );
    ensure!(
        (10..=240).contains(&s.fps),
        "fps must be within 10..=240, got {}",
        s.fps
    );
    Ok(())
}

fn clock_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    nanos ^ 0x9E3779B97F4A7C15u64
}

fn default_settings_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "neuralsplash", "Neuralsplash")?;
    Some(proj.config_dir().join("settings.json"))
}

pub(crate) fn load_settings(path: &Path) -> Settings {
    if let Ok(s) = fs::read_to_string(path) {
        if let Ok(v) = serde_json::from_str::<Settings>(&s) {
            return v;
        }
    }
    Settings::default()
}

pub(crate) fn save_settings_atomic(path: &Path, s: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create {}", dir.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(s)?;
    fs::write(&tmp, data).with_context(|| format!("could not write {}", tmp.display()))?;
    if path.exists() {
        let _ = fs::remove_file(path);
    }
    fs::rename(&tmp, path).with_context(|| format!("could not replace {}", path.display()))?;
    Ok(())
}

use crossterm::{
    cursor, execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, Write};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Rgb {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
}

impl Rgb {
    pub(crate) const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub(crate) const fn hex(v: u32) -> Self {
        Self {
            r: ((v >> 16) & 0xff) as u8,
            g: ((v >> 8) & 0xff) as u8,
            b: (v & 0xff) as u8,
        }
    }

    /// `t = 0` keeps `self`, `t = 1` yields `other`.
    pub(crate) fn mix(self, other: Rgb, t: f32) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let ch = |a: u8, b: u8| -> u8 {
            let v = a as f32 + (b as f32 - a as f32) * t;
            (v.clamp(0.0, 255.0) + 0.5) as u8
        };
        Rgb {
            r: ch(self.r, other.r),
            g: ch(self.g, other.g),
            b: ch(self.b, other.b),
        }
    }

    pub(crate) fn with_alpha(self, alpha: f32) -> Pixel {
        Pixel {
            r: self.r,
            g: self.g,
            b: self.b,
            a: (alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
        }
    }

    fn to_color(self) -> Color {
        Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

pub(crate) const WHITE: Rgb = Rgb::new(255, 255, 255);

/// Size of a drawable area, in dots for the canvas or cells for text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Viewport {
    pub(crate) width: f32,
    pub(crate) height: f32,
}

impl Viewport {
    pub(crate) fn contains(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x <= self.width && y <= self.height
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) ch: char,
    pub(crate) fg: Rgb,
    pub(crate) bg: Rgb,
    pub(crate) bold: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: WHITE,
            bg: Rgb::default(),
            bold: false,
        }
    }
}

pub(crate) struct CellBuffer {
    pub(crate) w: u16,
    pub(crate) h: u16,
    pub(crate) cells: Vec<Cell>,
}

impl CellBuffer {
    pub(crate) fn new(w: u16, h: u16) -> Self {
        Self {
            w,
            h,
            cells: vec![Cell::default(); (w as usize) * (h as usize)],
        }
    }
    pub(crate) fn idx(&self, x: u16, y: u16) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn get(&self, x: u16, y: u16) -> Option<Cell> {
        if x < self.w && y < self.h {
            Some(self.cells[self.idx(x, y)])
        } else {
            None
        }
    }
    pub(crate) fn set(&mut self, x: u16, y: u16, c: Cell) {
        if x < self.w && y < self.h {
            let i = self.idx(x, y);
            self.cells[i] = c;
        }
    }
    pub(crate) fn clear(&mut self, bg: Rgb) {
        for c in &mut self.cells {
            *c = Cell {
                bg,
                ..Cell::default()
            };
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Pixel {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

impl Pixel {
    fn rgb(self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }
}

/// Alpha at or above this counts as an inked braille dot.
const INK_ALPHA: u8 = 32;

pub(crate) struct PixelCanvas {
    pub(crate) w: u32,
    pub(crate) h: u32,
    pub(crate) px: Vec<Pixel>,
    /// Multiplies the alpha of everything drawn from now on.
    pub(crate) opacity: f32,
}

impl PixelCanvas {
    pub(crate) fn new(w: u32, h: u32) -> Self {
        Self {
            w,
            h,
            px: vec![Pixel::default(); (w as usize) * (h as usize)],
            opacity: 1.0,
        }
    }
    pub(crate) fn idx(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn at(&self, x: u32, y: u32) -> Pixel {
        if x < self.w && y < self.h {
            self.px[self.idx(x, y)]
        } else {
            Pixel::default()
        }
    }
    pub(crate) fn clear(&mut self) {
        self.px.fill(Pixel::default());
        self.opacity = 1.0;
    }

    pub(crate) fn blend_over(&mut self, x: i32, y: i32, src: Pixel) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.w || y >= self.h {
            return;
        }
        let i = self.idx(x, y);
        let dst = self.px[i];

        let sa = (src.a as f32 / 255.0) * self.opacity.clamp(0.0, 1.0);
        let da = dst.a as f32 / 255.0;

        let out_a = sa + da * (1.0 - sa);
        if out_a <= 1e-6 {
            self.px[i] = Pixel::default();
            return;
        }

        let blend = |sc: u8, dc: u8| -> u8 {
            let sc = sc as f32 / 255.0;
            let dc = dc as f32 / 255.0;
            let out = (sc * sa + dc * da * (1.0 - sa)) / out_a;
            (out.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
        };

        self.px[i] = Pixel {
            r: blend(src.r, dst.r),
            g: blend(src.g, dst.g),
            b: blend(src.b, dst.b),
            a: (out_a.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
        };
    }

    pub(crate) fn fill_circle(&mut self, cx: f32, cy: f32, r: f32, p: Pixel) {
        if r < 0.75 {
            self.blend_over(cx.floor() as i32, cy.floor() as i32, p);
            return;
        }
        let r2 = r * r;
        let x0 = (cx - r).floor() as i32;
        let x1 = (cx + r).ceil() as i32;
        let y0 = (cy - r).floor() as i32;
        let y1 = (cy + r).ceil() as i32;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r2 {
                    self.blend_over(x, y, p);
                }
            }
        }
    }

    /// One-dot outline of a circle.
    pub(crate) fn ring(&mut self, cx: f32, cy: f32, r: f32, p: Pixel) {
        let x0 = (cx - r - 1.0).floor() as i32;
        let x1 = (cx + r + 1.0).ceil() as i32;
        let y0 = (cy - r - 1.0).floor() as i32;
        let y1 = (cy + r + 1.0).ceil() as i32;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                let d = (dx * dx + dy * dy).sqrt();
                if (d - r).abs() <= 0.5 {
                    self.blend_over(x, y, p);
                }
            }
        }
    }

    pub(crate) fn line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, p: Pixel) {
        self.line_with(x0, y0, x1, y1, |_| p);
    }

    /// Line whose colour is sampled along its length, `t` in 0..=1 from the start.
    pub(crate) fn line_with<F: Fn(f32) -> Pixel>(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, f: F) {
        let dx = x1 - x0;
        let dy = y1 - y0;
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as i32;
        let mut last = None;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let x = (x0 + dx * t).floor() as i32;
            let y = (y0 + dy * t).floor() as i32;
            // don't double-blend the same dot
            if last == Some((x, y)) {
                continue;
            }
            last = Some((x, y));
            self.blend_over(x, y, f(t));
        }
    }
}

/* -----------------------------
   Layered frame: back cells, braille canvas, front text
------------------------------ */

pub(crate) struct Frame {
    pub(crate) cols: u16,
    pub(crate) rows: u16,
    /// Background colour per cell plus background glyphs.
    pub(crate) back: CellBuffer,
    pub(crate) canvas: PixelCanvas,
    /// Top-most text, `None` where nothing was written.
    pub(crate) front: Vec<Option<Cell>>,
    alpha: f32,
}

impl Frame {
    pub(crate) fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            back: CellBuffer::new(cols, rows),
            // Braille: 2×4 dots per cell
            canvas: PixelCanvas::new(cols as u32 * 2, rows as u32 * 4),
            front: vec![None; (cols as usize) * (rows as usize)],
            alpha: 1.0,
        }
    }

    pub(crate) fn dots(&self) -> Viewport {
        Viewport {
            width: self.canvas.w as f32,
            height: self.canvas.h as f32,
        }
    }

    pub(crate) fn cells(&self) -> Viewport {
        Viewport {
            width: self.cols as f32,
            height: self.rows as f32,
        }
    }

    pub(crate) fn clear(&mut self, bg: Rgb) {
        self.back.clear(bg);
        self.canvas.clear();
        self.front.fill(None);
        self.alpha = 1.0;
    }

    pub(crate) fn fill_background<F: Fn(u16, u16) -> Rgb>(&mut self, f: F) {
        for y in 0..self.rows {
            for x in 0..self.cols {
                self.back.set(
                    x,
                    y,
                    Cell {
                        bg: f(x, y),
                        ..Cell::default()
                    },
                );
            }
        }
    }

    /// Global alpha for every later canvas and text draw.
    pub(crate) fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 1.0);
        self.canvas.opacity = self.alpha;
    }

    pub(crate) fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Background glyph, mixed into the cell's background at `opacity`.
    pub(crate) fn glyph(&mut self, x: i32, y: i32, ch: char, color: Rgb, opacity: f32, bold: bool) {
        if x < 0 || y < 0 || x >= self.cols as i32 || y >= self.rows as i32 {
            return;
        }
        let (x, y) = (x as u16, y as u16);
        let Some(under) = self.back.get(x, y) else {
            return;
        };
        let fg = under.bg.mix(color, opacity * self.alpha);
        self.back.set(
            x,
            y,
            Cell {
                ch,
                fg,
                bg: under.bg,
                bold,
            },
        );
    }

    pub(crate) fn text(&mut self, x: i32, y: i32, s: &str, color: Rgb, bold: bool) {
        if y < 0 || y >= self.rows as i32 {
            return;
        }
        for (i, ch) in s.chars().enumerate() {
            let xx = x + i as i32;
            if xx < 0 {
                continue;
            }
            if xx >= self.cols as i32 {
                break;
            }
            let i = (y as usize) * (self.cols as usize) + xx as usize;
            let bg = self.back.cells[i].bg;
            self.front[i] = Some(Cell {
                ch,
                fg: bg.mix(color, self.alpha),
                bg,
                bold,
            });
        }
    }

    /// Horizontally centred run of coloured spans on row `y`.
    pub(crate) fn text_centered(&mut self, y: i32, spans: &[(&str, Rgb)], bold: bool) {
        let total: usize = spans.iter().map(|(s, _)| s.chars().count()).sum();
        let mut x = (self.cols as i32 - total as i32) / 2;
        for (s, color) in spans {
            self.text(x, y, s, *color, bold);
            x += s.chars().count() as i32;
        }
    }

    pub(crate) fn compose(&self, out: &mut CellBuffer) {
        for cy in 0..self.rows.min(out.h) {
            for cx in 0..self.cols.min(out.w) {
                let i = self.back.idx(cx, cy);
                let under = self.back.cells[i];
                let cell = match self.front[i] {
                    Some(c) => c,
                    None => braille_cell(&self.canvas, cx as u32, cy as u32, under.bg).unwrap_or(under),
                };
                out.set(cx, cy, cell);
            }
        }
    }
}

/* -----------------------------
   Braille encoding: 2×4 pixels -> U+2800..U+28FF
------------------------------ */

fn braille_bit(dx: u32, dy: u32) -> u8 {
    // Dot mapping:
    // (0,0)=1 (0,1)=2 (0,2)=4 (0,3)=64
    // (1,0)=8 (1,1)=16 (1,2)=32 (1,3)=128
    match (dx, dy) {
        (0, 0) => 0x01,
        (0, 1) => 0x02,
        (0, 2) => 0x04,
        (0, 3) => 0x40,
        (1, 0) => 0x08,
        (1, 1) => 0x10,
        (1, 2) => 0x20,
        (1, 3) => 0x80,
        _ => 0x00,
    }
}

fn braille_cell(canvas: &PixelCanvas, cx: u32, cy: u32, bg: Rgb) -> Option<Cell> {
    let px0 = cx * 2;
    let py0 = cy * 4;

    let mut mask: u8 = 0;
    let mut sum_r: u32 = 0;
    let mut sum_g: u32 = 0;
    let mut sum_b: u32 = 0;
    let mut sum_a: u32 = 0;
    let mut ink_count: u32 = 0;

    for dy in 0..4 {
        for dx in 0..2 {
            let p = canvas.at(px0 + dx, py0 + dy);
            if p.a >= INK_ALPHA {
                mask |= braille_bit(dx, dy);
                sum_r += p.r as u32;
                sum_g += p.g as u32;
                sum_b += p.b as u32;
                sum_a += p.a as u32;
                ink_count += 1;
            }
        }
    }

    if ink_count == 0 {
        return None;
    }

    let avg = Pixel {
        r: (sum_r / ink_count) as u8,
        g: (sum_g / ink_count) as u8,
        b: (sum_b / ink_count) as u8,
        a: (sum_a / ink_count) as u8,
    };
    Some(Cell {
        ch: char::from_u32(0x2800 + (mask as u32)).unwrap_or(' '),
        fg: bg.mix(avg.rgb(), avg.a as f32 / 255.0),
        bg,
        bold: false,
    })
}

/* -----------------------------
   Terminal
------------------------------ */

pub(crate) struct Terminal {
    pub(crate) out: io::Stdout,
    pub(crate) cols: u16,
    pub(crate) rows: u16,
    pub(crate) prev: CellBuffer,
    pub(crate) cur: CellBuffer,
}

impl Terminal {
    pub(crate) fn begin() -> anyhow::Result<Self> {
        let mut out = io::stdout();
        execute!(
            out,
            EnterAlternateScreen,
            cursor::Hide,
            DisableLineWrap,
            terminal::Clear(ClearType::All)
        )?;
        terminal::enable_raw_mode()?;

        let (cols, rows) = terminal::size()?;
        Ok(Self {
            out,
            cols,
            rows,
            prev: CellBuffer::new(cols, rows),
            cur: CellBuffer::new(cols, rows),
        })
    }

    pub(crate) fn end(&mut self) -> anyhow::Result<()> {
        queue!(
            self.out,
            BeginSynchronizedUpdate,
            ResetColor,
            Clear(ClearType::All),
            cursor::Show,
            EnableLineWrap,
            EndSynchronizedUpdate,
            LeaveAlternateScreen
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    pub(crate) fn resize(&mut self, cols: u16, rows: u16) -> bool {
        if cols == self.cols && rows == self.rows {
            return false;
        }
        self.cols = cols;
        self.rows = rows;
        self.prev = CellBuffer::new(cols, rows);
        self.cur = CellBuffer::new(cols, rows);
        // force a full repaint
        for c in &mut self.prev.cells {
            c.ch = '\0';
        }
        true
    }

    pub(crate) fn resize_if_needed(&mut self) -> anyhow::Result<bool> {
        let (c, r) = terminal::size()?;
        Ok(self.resize(c, r))
    }

    pub(crate) fn present(&mut self, diff_only: bool) -> anyhow::Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;

        let mut last_fg = None;
        let mut last_bg = None;
        let mut last_bold = false;

        for y in 0..self.rows {
            for x in 0..self.cols {
                let i = self.cur.idx(x, y);
                let c = self.cur.cells[i];
                if diff_only && c == self.prev.cells[i] {
                    continue;
                }

                queue!(self.out, cursor::MoveTo(x, y))?;

                if last_fg != Some(c.fg) {
                    queue!(self.out, SetForegroundColor(c.fg.to_color()))?;
                    last_fg = Some(c.fg);
                }
                if last_bg != Some(c.bg) {
                    queue!(self.out, SetBackgroundColor(c.bg.to_color()))?;
                    last_bg = Some(c.bg);
                }
                if last_bold != c.bold {
                    let attr = if c.bold {
                        Attribute::Bold
                    } else {
                        Attribute::NormalIntensity
                    };
                    queue!(self.out, SetAttribute(attr))?;
                    last_bold = c.bold;
                }

                queue!(self.out, Print(c.ch))?;
            }
        }

        queue!(self.out, SetAttribute(Attribute::Reset), ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.prev.cells.copy_from_slice(&self.cur.cells);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_over_opaque_replaces_pixel() {
        let mut c = PixelCanvas::new(4, 4);
        c.blend_over(1, 1, Rgb::new(10, 20, 30).with_alpha(1.0));
        assert_eq!(c.at(1, 1), Pixel { r: 10, g: 20, b: 30, a: 255 });
        // out of bounds writes are dropped
        c.blend_over(-1, 9, WHITE.with_alpha(1.0));
        assert_eq!(c.at(0, 0).a, 0);
    }

    #[test]
    fn canvas_opacity_scales_alpha() {
        let mut c = PixelCanvas::new(2, 2);
        c.opacity = 0.5;
        c.blend_over(0, 0, WHITE.with_alpha(1.0));
        let a = c.at(0, 0).a;
        assert!((126..=129).contains(&a), "alpha {a}");
    }

    #[test]
    fn line_reaches_both_endpoints() {
        let mut c = PixelCanvas::new(20, 10);
        c.line(1.2, 1.2, 15.7, 8.4, WHITE.with_alpha(1.0));
        assert_eq!(c.at(1, 1).a, 255);
        assert_eq!(c.at(15, 8).a, 255);
    }

    #[test]
    fn braille_mask_follows_inked_dots() {
        let mut f = Frame::new(2, 1);
        f.clear(Rgb::default());
        f.canvas.blend_over(0, 0, WHITE.with_alpha(1.0));
        f.canvas.blend_over(1, 3, WHITE.with_alpha(1.0));
        // below the ink threshold
        f.canvas.blend_over(2, 0, WHITE.with_alpha(0.05));
        let mut out = CellBuffer::new(2, 1);
        f.compose(&mut out);
        assert_eq!(out.cells[0].ch, char::from_u32(0x2800 + 0x01 + 0x80).unwrap());
        assert_eq!(out.cells[1].ch, ' ');
    }

    #[test]
    fn front_text_wins_over_canvas_and_glyphs() {
        let mut f = Frame::new(3, 1);
        f.clear(Rgb::new(0, 0, 40));
        f.glyph(0, 0, 'x', WHITE, 1.0, false);
        f.glyph(1, 0, 'y', WHITE, 1.0, false);
        f.canvas.fill_circle(3.0, 2.0, 1.5, WHITE.with_alpha(1.0));
        f.text(1, 0, "Z", WHITE, true);
        let mut out = CellBuffer::new(3, 1);
        f.compose(&mut out);
        assert_eq!(out.cells[0].ch, 'x');
        assert_eq!(out.cells[1].ch, 'Z');
        assert!(out.cells[1].bold);
        assert_eq!(out.cells[1].bg, Rgb::new(0, 0, 40));
    }

    #[test]
    fn faded_text_sinks_into_background() {
        let mut f = Frame::new(4, 1);
        f.clear(Rgb::new(0, 0, 0));
        f.set_alpha(0.0);
        f.text(0, 0, "ab", WHITE, false);
        assert_eq!(f.front[0].map(|c| c.fg), Some(Rgb::new(0, 0, 0)));
    }

    #[test]
    fn centered_spans_are_contiguous() {
        let mut f = Frame::new(10, 1);
        f.clear(Rgb::default());
        f.text_centered(0, &[("AB", WHITE), ("cd", Rgb::new(1, 2, 3))], false);
        let row: String = f.front.iter().map(|c| c.map(|c| c.ch).unwrap_or('.')).collect();
        assert_eq!(row, "...ABcd...");
    }
}

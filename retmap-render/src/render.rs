use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont};
use anyhow::{anyhow, Result};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use retmap_core::{ApertureConfig, Contrast, CrossColor, FixationConfig, GridConfig, StimulusFrame};
use retmap_session::{FrameView, Modality, Overlay, SessionConfig, StimulusView};

/// Checker rows/columns of the bar texture.
const BAR_CHECKER_ROWS: usize = 2;
const BAR_CHECKER_COLS: usize = 24;

/// Radial bands and angular sectors of the wedge texture.
const WEDGE_RADIAL_BANDS: usize = 2;
const WEDGE_ANGULAR_SECTORS: usize = 8;

/// Wedge radius relative to the screen half-height.
const WEDGE_RADIUS_SCALE: f32 = 1.3;

/// Everything the renderer needs that does not change per frame.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub modality: Modality,
    pub grid: GridConfig,
    pub aperture: ApertureConfig,
    pub fixation: FixationConfig,
    /// Bar size as a fraction of (screen width, screen height).
    pub bar_size: (f32, f32),
    pub wedge_width_deg: f32,
    pub initial_wedge_deg: f32,
}

impl RenderConfig {
    pub fn from_session(config: &SessionConfig) -> Self {
        Self {
            modality: config.modality,
            grid: config.grid.clone(),
            aperture: config.aperture.clone(),
            fixation: config.fixation.clone(),
            bar_size: config.sweep.bar_size,
            wedge_width_deg: config.rotation.wedge_width_deg,
            initial_wedge_deg: config.rotation.initial_wedge_deg,
        }
    }
}

/// CPU rasterizer for the stimulus frames, drawing into a premultiplied
/// RGBA pixmap that is copied verbatim into the surface buffer.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),
    /// Normalized unit in pixels: half the screen height.
    half_extent: f32,
    canvas: Pixmap,
    config: RenderConfig,
    font: Option<FontVec>,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, config: RenderConfig, font: Option<FontVec>) -> Result<Self> {
        let canvas =
            Pixmap::new(width, height).ok_or_else(|| anyhow!("zero-sized canvas {width}x{height}"))?;
        Ok(Self {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            half_extent: height as f32 / 2.0,
            canvas,
            config,
            font,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.canvas =
            Pixmap::new(width, height).ok_or_else(|| anyhow!("zero-sized canvas {width}x{height}"))?;
        self.width = width;
        self.height = height;
        self.center = (width as f32 / 2.0, height as f32 / 2.0);
        self.half_extent = height as f32 / 2.0;
        Ok(())
    }

    /// Rasterize one frame into the internal canvas.
    pub fn render(&mut self, view: &FrameView<'_>) {
        self.canvas.fill(Color::BLACK);
        match view {
            FrameView::Message(text) => {
                self.draw_grid();
                self.draw_message(text);
                self.draw_fixation(CrossColor::Red, 0.0);
            }
            FrameView::Fixation => {
                self.draw_grid();
                self.draw_fixation(CrossColor::Red, 0.0);
            }
            FrameView::Stimulus(stim) => self.render_stimulus(stim),
        }
    }

    /// Copy the canvas into an RGBA surface buffer of the same size.
    pub fn copy_to(&self, frame: &mut [u8]) {
        let data = self.canvas.data();
        if frame.len() == data.len() {
            frame.copy_from_slice(data);
        }
    }

    fn render_stimulus(&mut self, stim: &StimulusView) {
        self.draw_grid();
        match self.config.modality {
            Modality::Bars => self.draw_bar(&stim.frame),
            Modality::Wedge => self.draw_wedge(&stim.frame),
        }
        if self.config.aperture.enabled {
            self.apply_aperture();
        }
        self.draw_fixation(stim.cross_color, stim.cross_angle_deg);
        if let Some(overlay) = &stim.overlay {
            self.draw_overlay(overlay);
        }
    }

    /// Spider-web background: concentric rings plus the two diameters.
    fn draw_grid(&mut self) {
        if !self.config.grid.enabled {
            return;
        }
        let mut paint = Paint::default();
        paint.set_color(Color::WHITE);
        paint.anti_alias = true;
        let stroke = Stroke {
            width: 1.0,
            ..Stroke::default()
        };
        let (cx, cy) = self.center;

        for ring in 1..=self.config.grid.rings {
            let radius = self.half_extent * ring as f32 / self.config.grid.rings as f32;
            let mut pb = PathBuilder::new();
            pb.push_circle(cx, cy, radius);
            if let Some(path) = pb.finish() {
                self.canvas
                    .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
        }

        let mut pb = PathBuilder::new();
        pb.move_to(0.0, cy);
        pb.line_to(self.width as f32, cy);
        pb.move_to(cx, 0.0);
        pb.line_to(cx, self.height as f32);
        if let Some(path) = pb.finish() {
            self.canvas
                .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    /// Checkerboard bar centered at the frame position, rotated to the
    /// frame orientation. Contrast polarity swaps the two check colors.
    fn draw_bar(&mut self, frame: &StimulusFrame) {
        let (cx, cy) = self.center;
        // Normalized y points up; pixels point down.
        let bar_cx = cx + frame.position[0] * self.half_extent;
        let bar_cy = cy - frame.position[1] * self.half_extent;

        let bar_w = self.config.bar_size.0 * self.width as f32;
        let bar_h = self.config.bar_size.1 * self.height as f32;
        let cell_w = bar_w / BAR_CHECKER_COLS as f32;
        let cell_h = bar_h / BAR_CHECKER_ROWS as f32;

        let transform = Transform::from_rotate_at(frame.orientation_deg, bar_cx, bar_cy);
        let mut paint = Paint::default();
        paint.anti_alias = false;

        for row in 0..BAR_CHECKER_ROWS {
            for col in 0..BAR_CHECKER_COLS {
                let light = (row + col) % 2 == 0;
                let white = match frame.contrast {
                    Contrast::Positive => light,
                    Contrast::Negative => !light,
                };
                paint.set_color(if white { Color::WHITE } else { Color::BLACK });
                let x = bar_cx - bar_w / 2.0 + col as f32 * cell_w;
                let y = bar_cy - bar_h / 2.0 + row as f32 * cell_h;
                if let Some(rect) = Rect::from_xywh(x, y, cell_w, cell_h) {
                    self.canvas.fill_rect(rect, &paint, transform, None);
                }
            }
        }
    }

    /// Radial checkerboard wedge pivoting about fixation.
    fn draw_wedge(&mut self, frame: &StimulusFrame) {
        let radius = self.half_extent * WEDGE_RADIUS_SCALE;
        let base = self.config.initial_wedge_deg + frame.orientation_deg;
        let sector_deg = self.config.wedge_width_deg / WEDGE_ANGULAR_SECTORS as f32;
        let band_r = radius / WEDGE_RADIAL_BANDS as f32;

        let mut paint = Paint::default();
        paint.anti_alias = true;

        for band in 0..WEDGE_RADIAL_BANDS {
            let r_inner = band as f32 * band_r;
            let r_outer = r_inner + band_r;
            for sector in 0..WEDGE_ANGULAR_SECTORS {
                let light = (band + sector) % 2 == 0;
                let white = match frame.contrast {
                    Contrast::Positive => light,
                    Contrast::Negative => !light,
                };
                paint.set_color(if white { Color::WHITE } else { Color::BLACK });
                let a0 = base + sector as f32 * sector_deg;
                let a1 = a0 + sector_deg;
                if let Some(path) = self.annular_sector(r_inner, r_outer, a0, a1) {
                    self.canvas
                        .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
                }
            }
        }
    }

    /// Polygonal approximation of an annular sector between two angles
    /// (degrees, measured clockwise from the upward vertical).
    fn annular_sector(&self, r_inner: f32, r_outer: f32, a0: f32, a1: f32) -> Option<tiny_skia::Path> {
        let (cx, cy) = self.center;
        let steps = 8;
        let at = |deg: f32, r: f32| {
            let rad = (deg - 90.0).to_radians();
            (cx + r * rad.cos(), cy + r * rad.sin())
        };

        let mut pb = PathBuilder::new();
        let (x, y) = at(a0, r_outer);
        pb.move_to(x, y);
        for i in 1..=steps {
            let a = a0 + (a1 - a0) * i as f32 / steps as f32;
            let (x, y) = at(a, r_outer);
            pb.line_to(x, y);
        }
        for i in (0..=steps).rev() {
            let a = a0 + (a1 - a0) * i as f32 / steps as f32;
            let (x, y) = at(a, r_inner);
            pb.line_to(x, y);
        }
        pb.close();
        pb.finish()
    }

    /// Black out everything outside the aperture circle.
    fn apply_aperture(&mut self) {
        let radius = self.config.aperture.diameter / 2.0 * self.half_extent;
        let (cx, cy) = self.center;
        let mut pb = PathBuilder::new();
        pb.push_rect(match Rect::from_xywh(0.0, 0.0, self.width as f32, self.height as f32) {
            Some(r) => r,
            None => return,
        });
        pb.push_circle(cx, cy, radius);
        let Some(path) = pb.finish() else { return };

        let mut paint = Paint::default();
        paint.set_color(Color::BLACK);
        paint.anti_alias = true;
        self.canvas
            .fill_path(&path, &paint, FillRule::EvenOdd, Transform::identity(), None);
    }

    fn draw_fixation(&mut self, color: CrossColor, angle_deg: f32) {
        let (cx, cy) = self.center;
        let half = self.config.fixation.size_px / 2.0;

        let mut pb = PathBuilder::new();
        pb.move_to(cx - half, cy);
        pb.line_to(cx + half, cy);
        pb.move_to(cx, cy - half);
        pb.line_to(cx, cy + half);
        let Some(path) = pb.finish() else { return };

        let mut paint = Paint::default();
        paint.set_color(match color {
            CrossColor::Red => Color::from_rgba8(255, 0, 0, 255),
            CrossColor::Green => Color::from_rgba8(0, 255, 0, 255),
        });
        paint.anti_alias = true;
        let stroke = Stroke {
            width: 4.0,
            ..Stroke::default()
        };
        let transform = Transform::from_rotate_at(angle_deg, cx, cy);
        self.canvas.stroke_path(&path, &paint, &stroke, transform, None);
    }

    fn draw_message(&mut self, text: &str) {
        let (cx, cy) = self.center;
        let y = cy - self.height as f32 * 0.25;
        self.draw_text(text, 32.0, cx, y);
    }

    fn draw_overlay(&mut self, overlay: &Overlay) {
        let fps = format!("{:.2} fps", overlay.fps);
        self.draw_text(&fps, 18.0, 80.0, 24.0);
        let phase = format!(
            "Phase: {}/{} at {:.3} s",
            overlay.phase, overlay.phase_count, overlay.elapsed_secs
        );
        let x = self.width as f32 - 140.0;
        self.draw_text(&phase, 18.0, x, 24.0);
    }

    /// White text centered on (`cx`, `cy`). No-op without a font.
    fn draw_text(&mut self, text: &str, size_px: f32, cx: f32, cy: f32) {
        let Some(font) = &self.font else { return };
        let scale = PxScale::from(size_px);
        let sf = font.as_scaled(scale);

        // Lay out the line to learn its width, then rasterize centered.
        let mut pen_x = 0.0f32;
        let mut glyphs = Vec::<Glyph>::new();
        for ch in text.chars() {
            let id = font.glyph_id(ch);
            if let Some(prev) = glyphs.last() {
                pen_x += sf.kern(prev.id, id);
            }
            glyphs.push(font.glyph_id(ch).with_scale_and_position(
                scale,
                ab_glyph::point(pen_x, 0.0),
            ));
            pen_x += sf.h_advance(id);
        }
        let origin_x = cx - pen_x / 2.0;
        let origin_y = cy + sf.ascent() / 2.0;

        let width = self.width as i32;
        let height = self.height as i32;
        let stride = self.width as usize;
        let pixels = self.canvas.pixels_mut();

        for glyph in &glyphs {
            if let Some(outlined) = font.outline_glyph(glyph.clone()) {
                let bounds = outlined.px_bounds();
                outlined.draw(|x, y, cov| {
                    if cov <= f32::EPSILON {
                        return;
                    }
                    let px = (origin_x + bounds.min.x) as i32 + x as i32;
                    let py = (origin_y + bounds.min.y) as i32 + y as i32;
                    if px < 0 || py < 0 || px >= width || py >= height {
                        return;
                    }
                    let v = (cov * 255.0) as u8;
                    let i = py as usize * stride + px as usize;
                    let existing = pixels[i];
                    if v > existing.red() {
                        if let Some(c) = tiny_skia::PremultipliedColorU8::from_rgba(v, v, v, 255) {
                            pixels[i] = c;
                        }
                    }
                });
            }
        }
    }
}

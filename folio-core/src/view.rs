//! Current view parameters and the discrete zoom ladder.

/// Selectable resolutions, ascending. Zoom stepping walks this list; fit and
/// absolute zoom clamp into its range.
pub const ZOOM_LADDER: [f32; 40] = [
    18.0, 24.0, 36.0, 48.0, 54.0, 64.0, 72.0, 84.0, 96.0, 108.0, 120.0, 132.0, 144.0, 156.0,
    168.0, 180.0, 192.0, 204.0, 216.0, 228.0, 240.0, 252.0, 264.0, 276.0, 288.0, 300.0, 312.0,
    324.0, 336.0, 348.0, 360.0, 372.0, 384.0, 396.0, 408.0, 420.0, 432.0, 446.0, 464.0, 512.0,
];

pub const MIN_ZOOM: f32 = ZOOM_LADDER[0];
pub const MAX_ZOOM: f32 = ZOOM_LADDER[ZOOM_LADDER.len() - 1];
pub const DEFAULT_ZOOM: f32 = 96.0;

/// Crop margins move in 5pt increments.
pub const CROP_STEP: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub page: usize,
    pub zoom: f32,
    /// Degrees, kept normalized to [0, 360).
    pub rotation: f32,
    pub scroll_x: i32,
    pub scroll_y: i32,
    /// Margin cropped from each side, in page points.
    pub crop_x: u32,
    pub crop_y: u32,
    pub invert: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            page: 0,
            zoom: DEFAULT_ZOOM,
            rotation: 0.0,
            scroll_x: 0,
            scroll_y: 0,
            crop_x: 0,
            crop_y: 0,
            invert: false,
        }
    }
}

impl ViewState {
    pub fn clamp_page(&mut self, page_count: usize) {
        if page_count == 0 {
            self.page = 0;
        } else if self.page >= page_count {
            self.page = page_count - 1;
        }
    }

    /// Smallest ladder entry strictly greater than the current zoom, clamped
    /// at the top.
    pub fn zoom_in(&mut self) {
        self.zoom = ZOOM_LADDER
            .iter()
            .copied()
            .find(|&step| step > self.zoom)
            .unwrap_or(MAX_ZOOM);
    }

    /// Largest ladder entry strictly less than the current zoom, clamped at
    /// the bottom.
    pub fn zoom_out(&mut self) {
        self.zoom = ZOOM_LADDER
            .iter()
            .rev()
            .copied()
            .find(|&step| step < self.zoom)
            .unwrap_or(MIN_ZOOM);
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Rescale so content rendered `content_w` pixels wide at the current
    /// zoom fills `canvas_w`.
    pub fn fit_width(&mut self, content_w: u32, canvas_w: u32) {
        if content_w > 0 {
            self.set_zoom(self.zoom * canvas_w as f32 / content_w as f32);
        }
    }

    pub fn fit_height(&mut self, content_h: u32, canvas_h: u32) {
        if content_h > 0 {
            self.set_zoom(self.zoom * canvas_h as f32 / content_h as f32);
        }
    }

    /// Fit whichever axis is proportionally larger than the canvas.
    pub fn fit_page(&mut self, content: (u32, u32), canvas: (u32, u32)) {
        let (content_w, content_h) = content;
        let (canvas_w, canvas_h) = canvas;
        if content_w == 0 || content_h == 0 || canvas_h == 0 {
            return;
        }
        let page_aspect = content_w as f32 / content_h as f32;
        let canvas_aspect = canvas_w as f32 / canvas_h as f32;
        if page_aspect > canvas_aspect {
            self.fit_width(content_w, canvas_w);
        } else {
            self.fit_height(content_h, canvas_h);
        }
    }

    pub fn rotate_by(&mut self, degrees: f32) {
        self.rotation = (self.rotation + degrees).rem_euclid(360.0);
    }

    pub fn adjust_crop_x(&mut self, delta: i32, max_points: u32) {
        self.crop_x = saturating_adjust(self.crop_x, delta).min(max_points);
    }

    pub fn adjust_crop_y(&mut self, delta: i32, max_points: u32) {
        self.crop_y = saturating_adjust(self.crop_y, delta).min(max_points);
    }

    /// Clamp scroll against the content/canvas sizes and return the content
    /// origin relative to the canvas origin. When content fits an axis the
    /// scroll is reset and the content is centered.
    pub fn clamp_scroll(&mut self, content: (u32, u32), canvas: (u32, u32)) -> (i32, i32) {
        let (content_w, content_h) = (content.0 as i32, content.1 as i32);
        let (canvas_w, canvas_h) = (canvas.0 as i32, canvas.1 as i32);

        let x = if content_w <= canvas_w {
            self.scroll_x = 0;
            (canvas_w - content_w) / 2
        } else {
            self.scroll_x = self.scroll_x.clamp(0, content_w - canvas_w);
            -self.scroll_x
        };

        let y = if content_h <= canvas_h {
            self.scroll_y = 0;
            (canvas_h - content_h) / 2
        } else {
            self.scroll_y = self.scroll_y.clamp(0, content_h - canvas_h);
            -self.scroll_y
        };

        (x, y)
    }
}

fn saturating_adjust(value: u32, delta: i32) -> u32 {
    if delta >= 0 {
        value.saturating_add(delta as u32)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

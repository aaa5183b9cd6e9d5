//! Immediate-mode interaction protocol.
//!
//! No widget tree is retained. Every frame re-probes interactive regions in
//! draw order: containment claims the hot slot, a pressed button promotes
//! the hot widget to active, and the active widget keeps receiving pointer
//! motion as a drag until every button is released. Widgets are identified
//! by value-compared ids so "same widget as last frame" is meaningful.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Rect {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> i32 {
        (self.x1 - self.x0).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y1 - self.y0).max(0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x0 && p.x < self.x1 && p.y >= self.y0 && p.y < self.y1
    }

    /// Normalize so the corners are ordered; used by the rubber band, which
    /// may be dragged in any direction.
    pub fn ordered(&self) -> Self {
        Self {
            x0: self.x0.min(self.x1),
            y0: self.y0.min(self.y1),
            x1: self.x0.max(self.x1),
            y1: self.y0.max(self.y1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollbarOwner {
    Outline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetId {
    PageCanvas,
    OutlinePane,
    OutlineEntry(usize),
    ScrollbarThumb(ScrollbarOwner),
    ScrollbarTrack(ScrollbarOwner),
    Link(usize),
    SearchBox,
    SelectionBox,
}

#[derive(Debug, Default)]
pub struct FrameState {
    hot: Option<WidgetId>,
    active: Option<WidgetId>,
    pub pointer: Point,
    pub primary_down: bool,
    pub middle_down: bool,
    pub secondary_down: bool,
    pub scroll_dx: i32,
    pub scroll_dy: i32,
}

impl FrameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hot is recomputed from scratch every frame; active persists.
    pub fn begin_frame(&mut self) {
        self.hot = None;
    }

    /// Release the active slot once every button is up and consume the
    /// per-frame scroll delta.
    pub fn end_frame(&mut self) {
        if !self.any_button_down() {
            self.active = None;
        }
        self.scroll_dx = 0;
        self.scroll_dy = 0;
    }

    pub fn any_button_down(&self) -> bool {
        self.primary_down || self.middle_down || self.secondary_down
    }

    /// Test pointer containment; a contained widget claims hot. Widgets are
    /// probed in draw order, so the last contained probe wins.
    pub fn probe(&mut self, id: WidgetId, bounds: Rect) -> bool {
        if bounds.contains(self.pointer) {
            self.hot = Some(id);
            true
        } else {
            false
        }
    }

    /// Claim the active slot for the hot widget while `down` holds. At most
    /// one widget is active; later claims are ignored until release.
    pub fn try_activate(&mut self, id: WidgetId, down: bool) -> bool {
        if down && self.active.is_none() && self.hot == Some(id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    pub fn is_hot(&self, id: WidgetId) -> bool {
        self.hot == Some(id)
    }

    pub fn is_active(&self, id: WidgetId) -> bool {
        self.active == Some(id)
    }

    /// Detect release for an active widget. Returns `Some(committed)` once
    /// when `down` has gone false: committed is true only if the pointer is
    /// still over the widget (hot and active at release), the click/commit
    /// case; false means the drag ended elsewhere.
    pub fn take_release(&mut self, id: WidgetId, down: bool) -> Option<bool> {
        if self.active == Some(id) && !down {
            self.active = None;
            Some(self.hot == Some(id))
        } else {
            None
        }
    }
}

/// Per-scrollbar drag anchor, analogous to the saved grab offsets of a
/// thumb drag. Persists across frames with the owning pane.
#[derive(Debug, Default)]
pub struct ScrollbarState {
    grab_top: f32,
    grab_pointer_y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollbarLayout {
    pub track: Rect,
    pub thumb: Rect,
}

/// Vertical scrollbar: clicking the track pages by `page_size`, dragging the
/// thumb tracks the pointer even outside the bounds. `value` is clamped to
/// `[0, max - page_size]`.
pub fn scrollbar(
    frame: &mut FrameState,
    state: &mut ScrollbarState,
    owner: ScrollbarOwner,
    track: Rect,
    value: &mut i32,
    page_size: i32,
    max: i32,
) -> ScrollbarLayout {
    let total_h = track.height();
    let thumb_h = if max > 0 {
        (total_h * page_size / max).max(track.width())
    } else {
        total_h
    };
    let avail_h = total_h - thumb_h;
    let limit = max - page_size;

    if limit <= 0 || avail_h <= 0 {
        *value = 0;
        return ScrollbarLayout {
            track,
            thumb: track,
        };
    }

    let thumb_id = WidgetId::ScrollbarThumb(owner);
    let track_id = WidgetId::ScrollbarTrack(owner);

    let mut top = *value as f32 * avail_h as f32 / limit as f32;

    if frame.primary_down && !frame.any_active() && track.contains(frame.pointer) {
        let thumb_y0 = track.y0 + top as i32;
        if frame.pointer.y < thumb_y0 {
            frame.hot = Some(track_id);
            frame.try_activate(track_id, true);
            *value -= page_size;
        } else if frame.pointer.y >= thumb_y0 + thumb_h {
            frame.hot = Some(track_id);
            frame.try_activate(track_id, true);
            *value += page_size;
        } else {
            frame.hot = Some(thumb_id);
            frame.try_activate(thumb_id, true);
            state.grab_top = top;
            state.grab_pointer_y = frame.pointer.y;
        }
    }

    if frame.is_active(thumb_id) {
        let dragged_top = state.grab_top + (frame.pointer.y - state.grab_pointer_y) as f32;
        *value = (dragged_top * limit as f32 / avail_h as f32) as i32;
    }

    *value = (*value).clamp(0, limit);
    top = *value as f32 * avail_h as f32 / limit as f32;

    let thumb_y0 = track.y0 + top as i32;
    ScrollbarLayout {
        track,
        thumb: Rect::new(track.x0, thumb_y0, track.x1, thumb_y0 + thumb_h),
    }
}

impl FrameState {
    fn any_active(&self) -> bool {
        self.active.is_some()
    }
}

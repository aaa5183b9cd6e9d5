//! The viewer aggregate and its per-event evaluation cycle.
//!
//! `App` owns every piece of mutable state. Each input event runs one full
//! cycle before the next is accepted: route the event, advance an in-flight
//! search by one budgeted slice, clamp the view, refresh the raster cache,
//! run the immediate-mode UI pass over the fresh geometry, and assemble the
//! scene the presenter draws.

use anyhow::Result;
use rand::Rng;
use tracing::warn;

use crate::backend::{
    DocumentBackend, LinkRegion, LinkTarget, MetadataKey, NormalizedRect, OutlineEntry, PageImage,
};
use crate::input::{Action, GotoTarget, InputEvent, Key, Modifiers, Router};
use crate::nav::Navigator;
use crate::raster::RasterCache;
use crate::search::{SearchOutcome, SearchSession};
use crate::ui::{
    scrollbar, FrameState, Point, Rect, ScrollbarLayout, ScrollbarOwner, ScrollbarState, WidgetId,
};
use crate::view::{ViewState, DEFAULT_ZOOM};

/// Paper-ish page backgrounds cycled by the shuffle command.
pub const BACKGROUND_PALETTE: [u32; 10] = [
    0xFFFFFF, 0xEEE8D5, 0xFDF6E3, 0xE5DED6, 0xEFEFEF, 0xE6EBEE, 0xF3F6F4, 0xFFF6DA, 0xE6E6E6,
    0xF1FEEE,
];

const OUTLINE_ROW_HEIGHT: i32 = 20;
const SCROLLBAR_WIDTH: i32 = 12;
const WHEEL_STEP: i32 = 40;

/// Maximum crop margin in page points per axis.
const MAX_CROP: u32 = 200;

#[derive(Debug, Clone, Copy)]
pub struct ViewConfig {
    /// Zero-based starting page.
    pub start_page: usize,
    pub zoom: f32,
    pub invert: bool,
    pub background: u32,
    /// Initial canvas size in raster pixels.
    pub canvas: (u32, u32),
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            start_page: 0,
            zoom: DEFAULT_ZOOM,
            invert: false,
            background: 0xFFFFFF,
            canvas: (800, 1000),
        }
    }
}

/// What the outer loop needs to know after a cycle.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub quit: bool,
    /// A search is still scanning; run another cycle without waiting for
    /// input.
    pub needs_another_frame: bool,
    pub needs_redraw: bool,
    /// A URI link was activated; the frontend decides how to open it.
    pub open_uri: Option<String>,
    /// Text captured by a committed selection; the frontend owns the
    /// clipboard.
    pub selected_text: Option<String>,
}

/// One visible raster with its canvas position.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub image: PageImage,
    pub pos: Point,
}

#[derive(Debug, Clone)]
pub struct OutlineRow {
    pub text: String,
    pub page: usize,
    pub bounds: Rect,
    pub hot: bool,
}

#[derive(Debug, Clone)]
pub struct OutlineScene {
    pub pane: Rect,
    pub scrollbar: ScrollbarLayout,
    pub rows: Vec<OutlineRow>,
}

/// Fully assembled presentation data; the presenter draws it without
/// consulting any other state.
#[derive(Debug, Clone)]
pub struct Scene {
    pub canvas: (u32, u32),
    pub background: u32,
    pub page: Overlay,
    pub annotations: Vec<Overlay>,
    /// Search hit rectangles on the displayed page, in canvas coordinates.
    pub highlights: Vec<Rect>,
    /// Link regions, shown while the link toggle is on.
    pub link_rects: Vec<Rect>,
    pub selection: Option<Rect>,
    pub outline: Option<OutlineScene>,
    pub info: Option<Vec<String>>,
    /// Search prompt text while the search box is open.
    pub prompt: Option<String>,
    pub status: String,
}

#[derive(Debug)]
struct SearchPrompt {
    text: String,
    direction: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FitRequest {
    Width,
    Height,
    Page,
}

/// Geometry computed by the UI pass, reused for scene assembly.
#[derive(Debug, Default)]
struct Layout {
    canvas: Rect,
    origin: Point,
    link_rects: Vec<Rect>,
    outline: Option<OutlineScene>,
}

pub struct App {
    backend: Box<dyn DocumentBackend>,
    view: ViewState,
    nav: Navigator,
    cache: RasterCache,
    search: Option<SearchSession>,
    frame: FrameState,
    router: Router,

    canvas: (u32, u32),
    background: u32,
    show_outline: bool,
    show_links: bool,
    show_info: bool,

    outline: Option<Vec<OutlineEntry>>,
    outline_scroll: i32,
    outline_bar: ScrollbarState,

    links: Vec<LinkRegion>,
    links_page: Option<usize>,

    needle: String,
    search_dir: i8,
    prompt: Option<SearchPrompt>,
    hit_page: Option<usize>,
    hits: Vec<NormalizedRect>,

    selection: Option<Rect>,
    selection_anchor: Option<Point>,
    pan_anchor: Option<(Point, i32, i32)>,

    pending_fit: Option<FitRequest>,
    /// Content size from the last cache refresh, for movement commands that
    /// run before the next refresh.
    content: (u32, u32),
    layout: Layout,

    notice: Option<String>,
    open_uri: Option<String>,
    selected_text: Option<String>,
    needs_redraw: bool,
    quit: bool,
}

impl App {
    pub fn new(backend: Box<dyn DocumentBackend>, config: ViewConfig) -> Self {
        let mut view = ViewState {
            zoom: config.zoom,
            invert: config.invert,
            ..ViewState::default()
        };
        view.set_zoom(config.zoom);
        view.page = config.start_page;
        view.clamp_page(backend.page_count());

        Self {
            backend,
            view,
            nav: Navigator::new(),
            cache: RasterCache::new(),
            search: None,
            frame: FrameState::new(),
            router: Router::new(),
            canvas: config.canvas,
            background: config.background,
            show_outline: false,
            show_links: false,
            show_info: false,
            outline: None,
            outline_scroll: 0,
            outline_bar: ScrollbarState::default(),
            links: Vec::new(),
            links_page: None,
            needle: String::new(),
            search_dir: 1,
            prompt: None,
            hit_page: None,
            hits: Vec::new(),
            selection: None,
            selection_anchor: None,
            pan_anchor: None,
            pending_fit: None,
            content: (0, 0),
            layout: Layout::default(),
            notice: None,
            open_uri: None,
            selected_text: None,
            needs_redraw: true,
            quit: false,
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// One-based page number, for progress persistence.
    pub fn current_page_number(&self) -> usize {
        self.view.page + 1
    }

    /// Stage an input event. Keys are routed immediately; pointer state is
    /// latched for the next UI pass.
    pub fn handle_event(&mut self, event: InputEvent) {
        self.needs_redraw = true;
        match event {
            InputEvent::PointerMove { x, y } => {
                self.frame.pointer = Point { x, y };
            }
            InputEvent::Button { button, down } => match button {
                crate::input::PointerButton::Primary => self.frame.primary_down = down,
                crate::input::PointerButton::Middle => self.frame.middle_down = down,
                crate::input::PointerButton::Secondary => self.frame.secondary_down = down,
            },
            InputEvent::Scroll { dx, dy } => {
                self.frame.scroll_dx += dx;
                self.frame.scroll_dy += dy;
            }
            InputEvent::Resize { width, height } => {
                self.canvas = (width, height);
            }
            InputEvent::RefreshRequested => {}
            InputEvent::Key { key, mods } => {
                if self.prompt.is_some() {
                    self.edit_prompt(key, mods);
                } else if let Some(action) = self.router.route(key, mods) {
                    self.apply_action(action);
                }
            }
        }
    }

    /// Run one evaluation cycle. `has_budget` bounds the search slice.
    pub fn evaluate_frame(&mut self, has_budget: impl FnMut() -> bool) -> Result<FrameReport> {
        let mut report = FrameReport {
            quit: self.quit,
            needs_redraw: std::mem::take(&mut self.needs_redraw),
            ..FrameReport::default()
        };

        self.advance_search(has_budget, &mut report);

        self.view.clamp_page(self.backend.page_count());
        if self.hit_page != Some(self.view.page) {
            self.hit_page = None;
            self.hits.clear();
        }

        let entry = self.cache.entry_for(&self.view, self.backend.as_ref())?;
        self.content = (entry.page_image.width, entry.page_image.height);

        if let Some(fit) = self.pending_fit.take() {
            match fit {
                FitRequest::Width => self.view.fit_width(self.content.0, self.canvas.0),
                FitRequest::Height => self.view.fit_height(self.content.1, self.canvas.1),
                FitRequest::Page => self.view.fit_page(self.content, self.canvas),
            }
            let entry = self.cache.entry_for(&self.view, self.backend.as_ref())?;
            self.content = (entry.page_image.width, entry.page_image.height);
        }

        self.refresh_links();
        self.ui_pass();

        report.quit = self.quit;
        report.open_uri = self.open_uri.take();
        report.selected_text = self.selected_text.take();
        Ok(report)
    }

    /// Assemble the scene from the freshly evaluated state.
    pub fn scene(&mut self) -> Result<Scene> {
        let (page_image, annotation_rasters) = {
            let entry = self.cache.entry_for(&self.view, self.backend.as_ref())?;
            (entry.page_image.clone(), entry.annotations.clone())
        };
        let origin = self.layout.origin;
        let (w, h) = (page_image.width as f32, page_image.height as f32);

        let page = Overlay {
            image: page_image,
            pos: origin,
        };
        let annotations = annotation_rasters
            .into_iter()
            .map(|a| Overlay {
                pos: Point {
                    x: origin.x + (a.bounds.left * w) as i32,
                    y: origin.y + (a.bounds.top * h) as i32,
                },
                image: a.image,
            })
            .collect();

        let highlights = self
            .hits
            .iter()
            .map(|rect| page_rect_to_canvas(*rect, origin, w, h))
            .collect();

        let info = if self.show_info {
            Some(self.info_lines())
        } else {
            None
        };

        Ok(Scene {
            canvas: self.canvas,
            background: self.background,
            page,
            annotations,
            highlights,
            link_rects: if self.show_links {
                self.layout.link_rects.clone()
            } else {
                Vec::new()
            },
            selection: self.selection,
            outline: self.layout.outline.clone(),
            info,
            prompt: self.prompt.as_ref().map(|p| {
                let lead = if p.direction >= 0 { '/' } else { '?' };
                format!("{lead}{}", p.text)
            }),
            status: self.status_line(),
        })
    }

    fn status_line(&self) -> String {
        if let Some(notice) = &self.notice {
            return notice.clone();
        }
        let mut status = format!(
            "page {} of {}  {}dpi",
            self.view.page + 1,
            self.backend.page_count(),
            self.view.zoom.round() as i32,
        );
        if let Some(prefix) = self.router.prefix() {
            status.push_str(&format!("  [{prefix}]"));
        }
        status
    }

    fn info_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let fields = [
            (MetadataKey::Title, "Title"),
            (MetadataKey::Author, "Author"),
            (MetadataKey::Format, "Format"),
            (MetadataKey::Encryption, "Encryption"),
        ];
        for (key, label) in fields {
            if let Some(value) = self.backend.metadata(key) {
                lines.push(format!("{label}: {value}"));
            }
        }
        lines.push(format!("Pages: {}", self.backend.page_count()));
        lines
    }

    fn edit_prompt(&mut self, key: Key, _mods: Modifiers) {
        match key {
            Key::Enter => {
                let prompt = self.prompt.take().unwrap_or(SearchPrompt {
                    text: String::new(),
                    direction: 1,
                });
                if prompt.text.is_empty() {
                    return;
                }
                self.needle = prompt.text;
                self.search_dir = prompt.direction;
                self.arm_search(self.search_dir);
            }
            Key::Escape => {
                self.prompt = None;
            }
            Key::Backspace => {
                if let Some(prompt) = &mut self.prompt {
                    prompt.text.pop();
                }
            }
            Key::Char(c) if !c.is_control() => {
                if let Some(prompt) = &mut self.prompt {
                    prompt.text.push(c);
                }
            }
            _ => {}
        }
    }

    fn arm_search(&mut self, direction: i8) {
        if self.needle.is_empty() {
            self.notice = Some("no search term".into());
            return;
        }
        self.search = SearchSession::start(
            &self.needle,
            direction,
            self.view.page,
            self.hit_page,
        );
        self.notice = Some(format!("searching for \"{}\"", self.needle));
    }

    fn advance_search(&mut self, has_budget: impl FnMut() -> bool, report: &mut FrameReport) {
        let Some(session) = &mut self.search else {
            return;
        };
        match session.run_slice(self.backend.as_ref(), has_budget) {
            SearchOutcome::Pending => {
                report.needs_another_frame = true;
            }
            SearchOutcome::Found { page } => {
                // The landing frame may run without fresh input; it still
                // has to reach the screen.
                report.needs_redraw = true;
                self.hits = session.take_hits();
                self.hit_page = Some(page);
                self.search = None;
                let count = self.backend.page_count();
                self.nav.jump_to(&mut self.view.page, page, count);
                self.view.scroll_x = 0;
                self.view.scroll_y = 0;
                self.notice = Some(format!(
                    "{} match{} on page {}",
                    self.hits.len(),
                    if self.hits.len() == 1 { "" } else { "es" },
                    page + 1
                ));
            }
            SearchOutcome::Exhausted => {
                report.needs_redraw = true;
                self.search = None;
                self.notice = Some(format!("\"{}\" not found", self.needle));
            }
        }
    }

    fn refresh_links(&mut self) {
        if self.links_page == Some(self.view.page) {
            return;
        }
        self.links = match self.backend.links(self.view.page) {
            Ok(links) => links.into_iter().filter(|l| l.bounds.is_valid()).collect(),
            Err(err) => {
                warn!(page = self.view.page, error = %err, "failed to load page links");
                Vec::new()
            }
        };
        self.links_page = Some(self.view.page);
    }

    fn apply_action(&mut self, action: Action) {
        self.notice = None;
        let count = self.backend.page_count();
        match action {
            Action::Quit => self.quit = true,

            Action::StepPage(delta) => {
                if count == 0 {
                    return;
                }
                let target = (self.view.page as i64 + delta).clamp(0, count as i64 - 1);
                self.jump(target as usize);
            }
            Action::Goto(target) => {
                let page = match target {
                    GotoTarget::First => 0,
                    GotoTarget::Last => count.saturating_sub(1),
                    GotoTarget::Absolute(page) => page,
                };
                self.jump(page);
            }

            Action::ZoomIn => self.view.zoom_in(),
            Action::ZoomOut => self.view.zoom_out(),
            Action::SetZoom(zoom) => self.view.set_zoom(zoom.unwrap_or(DEFAULT_ZOOM)),
            Action::FitWidth => self.pending_fit = Some(FitRequest::Width),
            Action::FitHeight => self.pending_fit = Some(FitRequest::Height),
            Action::FitPage => self.pending_fit = Some(FitRequest::Page),

            Action::Rotate(degrees) => self.view.rotate_by(degrees),
            Action::AdjustCropX(delta) => self.view.adjust_crop_x(delta, MAX_CROP),
            Action::AdjustCropY(delta) => self.view.adjust_crop_y(delta, MAX_CROP),
            Action::ToggleInvert => self.view.invert = !self.view.invert,

            Action::ShuffleBackground => self.shuffle_background(),
            Action::ResetView => {
                self.view.crop_x = 0;
                self.view.crop_y = 0;
                self.view.rotation = 0.0;
                self.view.invert = false;
                self.view.scroll_x = 0;
                self.view.scroll_y = 0;
                self.background = BACKGROUND_PALETTE[0];
                self.pending_fit = Some(FitRequest::Page);
            }

            Action::ToggleOutline => self.toggle_outline(),
            Action::ToggleLinks => self.show_links = !self.show_links,
            Action::ToggleInfo => self.show_info = !self.show_info,

            Action::SetMark(slot) => self.nav.set_mark(slot, self.view.page),
            Action::RecallMark(slot) => {
                if let Some(page) = self.nav.mark(slot) {
                    self.jump(page);
                }
            }
            Action::PushLocation => self.nav.push_location(self.view.page),
            Action::HistoryBack => self.nav.back(&mut self.view.page),
            Action::HistoryForward => self.nav.forward(&mut self.view.page),

            Action::BeginSearch { direction } => {
                self.prompt = Some(SearchPrompt {
                    text: String::new(),
                    direction,
                });
            }
            Action::FindNext => self.arm_search(self.search_dir),
            Action::FindPrevious => self.arm_search(-self.search_dir),

            Action::SmartForward => self.smart_move(1),
            Action::SmartBackward => self.smart_move(-1),
            Action::CoarseScroll(steps) => {
                let step = (self.canvas.1 as i32 / 2).max(1);
                self.vertical_move(steps * step);
            }
            Action::FineScroll { dx, dy } => {
                let step_x = (self.canvas.0 as i32 / 20).max(10);
                let step_y = (self.canvas.1 as i32 / 20).max(10);
                self.view.scroll_x += dx * step_x;
                if dy != 0 {
                    self.vertical_move(dy * step_y);
                }
            }

            Action::CancelOrClear => {
                if self.search.is_some() {
                    self.search = None;
                    self.notice = Some("search cancelled".into());
                } else {
                    self.selection = None;
                    self.hits.clear();
                    self.hit_page = None;
                }
            }
        }
    }

    fn jump(&mut self, target: usize) {
        let count = self.backend.page_count();
        let before = self.view.page;
        self.nav.jump_to(&mut self.view.page, target, count);
        if self.view.page != before {
            self.view.scroll_x = 0;
            self.view.scroll_y = 0;
        }
    }

    fn shuffle_background(&mut self) {
        let mut rng = rand::thread_rng();
        loop {
            let pick = BACKGROUND_PALETTE[rng.gen_range(0..BACKGROUND_PALETTE.len())];
            if pick != self.background {
                self.background = pick;
                break;
            }
        }
    }

    fn toggle_outline(&mut self) {
        if self.show_outline {
            self.show_outline = false;
            return;
        }
        if self.outline.is_none() {
            let entries = match self.backend.outline() {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(error = %err, "failed to load outline");
                    Vec::new()
                }
            };
            self.outline = Some(entries);
        }
        if self.outline.as_ref().map_or(true, Vec::is_empty) {
            self.notice = Some("no outline".into());
        } else {
            self.show_outline = true;
        }
    }

    /// Vertical movement that crosses pages at the edges.
    fn vertical_move(&mut self, dy: i32) {
        let content_h = self.content.1 as i32;
        let canvas_h = self.canvas.1 as i32;
        let count = self.backend.page_count();
        if dy > 0 && self.view.scroll_y + canvas_h >= content_h {
            if self.view.page + 1 < count {
                self.view.page += 1;
                self.view.scroll_y = 0;
            }
        } else if dy < 0 && self.view.scroll_y <= 0 {
            if self.view.page > 0 {
                self.view.page -= 1;
                self.view.scroll_y = i32::MAX / 2; // clamped to the bottom
            }
        } else {
            self.view.scroll_y += dy;
        }
    }

    /// Reading-flow movement: down the page, then across, then to the next
    /// page (mirrored when `direction` is negative).
    fn smart_move(&mut self, direction: i32) {
        let (content_w, content_h) = (self.content.0 as i32, self.content.1 as i32);
        let (canvas_w, canvas_h) = (self.canvas.0 as i32, self.canvas.1 as i32);
        let count = self.backend.page_count();
        let stride_x = canvas_w * 9 / 10;
        let stride_y = canvas_h * 9 / 10;

        if direction > 0 {
            if self.view.scroll_y + canvas_h >= content_h {
                if self.view.scroll_x + canvas_w >= content_w {
                    if self.view.page + 1 < count {
                        self.view.page += 1;
                        self.view.scroll_x = 0;
                        self.view.scroll_y = 0;
                    }
                } else {
                    self.view.scroll_x += stride_x;
                    self.view.scroll_y = 0;
                }
            } else {
                self.view.scroll_y += stride_y;
            }
        } else if self.view.scroll_y <= 0 {
            if self.view.scroll_x <= 0 {
                if self.view.page > 0 {
                    self.view.page -= 1;
                    self.view.scroll_x = i32::MAX / 2;
                    self.view.scroll_y = i32::MAX / 2;
                }
            } else {
                self.view.scroll_x -= stride_x;
                self.view.scroll_y = i32::MAX / 2;
            }
        } else {
            self.view.scroll_y -= stride_y;
        }
    }

    /// Probe widgets in draw order over the fresh geometry, resolve drags
    /// and commits, and record the layout for scene assembly.
    fn ui_pass(&mut self) {
        self.frame.begin_frame();

        let pane_w = if self.show_outline {
            (self.canvas.0 as i32 / 4).clamp(120, 400)
        } else {
            0
        };
        let canvas_rect = Rect::new(pane_w, 0, self.canvas.0 as i32, self.canvas.1 as i32);

        // Page placement inside the canvas area.
        let area = (canvas_rect.width() as u32, canvas_rect.height() as u32);
        let (ox, oy) = self.view.clamp_scroll(self.content, area);
        let origin = Point {
            x: canvas_rect.x0 + ox,
            y: oy,
        };

        self.frame.probe(WidgetId::PageCanvas, canvas_rect);
        self.canvas_interactions(canvas_rect, origin);

        let link_rects = self.link_pass(origin);
        let outline = if self.show_outline {
            Some(self.outline_pass(Rect::new(0, 0, pane_w, self.canvas.1 as i32)))
        } else {
            None
        };

        self.frame.end_frame();
        self.layout = Layout {
            canvas: canvas_rect,
            origin,
            link_rects,
            outline,
        };
    }

    fn canvas_interactions(&mut self, canvas_rect: Rect, origin: Point) {
        // Wheel scroll over the page.
        if self.frame.is_hot(WidgetId::PageCanvas) {
            self.view.scroll_x -= self.frame.scroll_dx * WHEEL_STEP;
            self.view.scroll_y -= self.frame.scroll_dy * WHEEL_STEP;
        }

        // Middle-drag panning.
        if self.frame.try_activate(WidgetId::PageCanvas, self.frame.middle_down) {
            self.pan_anchor = Some((self.frame.pointer, self.view.scroll_x, self.view.scroll_y));
        }
        if self.frame.is_active(WidgetId::PageCanvas) {
            if let Some((grab, sx, sy)) = self.pan_anchor {
                self.view.scroll_x = sx - (self.frame.pointer.x - grab.x);
                self.view.scroll_y = sy - (self.frame.pointer.y - grab.y);
            }
        }
        self.frame.take_release(WidgetId::PageCanvas, self.frame.middle_down);

        // Right-drag rubber-band selection.
        if self.frame.is_hot(WidgetId::PageCanvas) || self.frame.is_active(WidgetId::SelectionBox) {
            if self.frame.is_hot(WidgetId::PageCanvas) {
                self.frame.probe(WidgetId::SelectionBox, canvas_rect);
            }
            if self.frame.try_activate(WidgetId::SelectionBox, self.frame.secondary_down) {
                self.selection_anchor = Some(self.frame.pointer);
            }
        }
        if self.frame.is_active(WidgetId::SelectionBox) {
            if let Some(anchor) = self.selection_anchor {
                self.selection = Some(
                    Rect::new(anchor.x, anchor.y, self.frame.pointer.x, self.frame.pointer.y)
                        .ordered(),
                );
            }
        }
        if self
            .frame
            .take_release(WidgetId::SelectionBox, self.frame.secondary_down)
            .is_some()
        {
            if let Some(rect) = self.selection {
                self.capture_selection(rect, origin);
            }
            self.selection_anchor = None;
        }
    }

    /// Extract the text under a committed selection rectangle.
    fn capture_selection(&mut self, rect: Rect, origin: Point) {
        let (w, h) = (self.content.0 as f32, self.content.1 as f32);
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let region = NormalizedRect {
            left: (rect.x0 - origin.x) as f32 / w,
            top: (rect.y0 - origin.y) as f32 / h,
            right: (rect.x1 - origin.x) as f32 / w,
            bottom: (rect.y1 - origin.y) as f32 / h,
        }
        .clamp();
        if !region.is_valid() {
            return;
        }
        match self.backend.text_in_region(self.view.page, region) {
            Ok(text) if !text.is_empty() => self.selected_text = Some(text),
            Ok(_) => {}
            Err(err) => {
                warn!(page = self.view.page, error = %err, "failed to extract selected text");
            }
        }
    }

    fn link_pass(&mut self, origin: Point) -> Vec<Rect> {
        let (w, h) = (self.content.0 as f32, self.content.1 as f32);
        let mut rects = Vec::with_capacity(self.links.len());
        let mut jump_to = None;
        let mut open_uri = None;

        for (index, link) in self.links.iter().enumerate() {
            let rect = page_rect_to_canvas(link.bounds, origin, w, h);
            rects.push(rect);

            let id = WidgetId::Link(index);
            self.frame.probe(id, rect);
            self.frame.try_activate(id, self.frame.primary_down);
            if self.frame.take_release(id, self.frame.primary_down) == Some(true) {
                match &link.target {
                    LinkTarget::GotoPage(page) => jump_to = Some(*page),
                    LinkTarget::OpenUri(uri) => open_uri = Some(uri.clone()),
                }
            }
        }

        if open_uri.is_some() {
            self.open_uri = open_uri;
        }

        if let Some(page) = jump_to {
            self.jump(page);
        }
        rects
    }

    fn outline_pass(&mut self, pane: Rect) -> OutlineScene {
        let entries = self.outline.as_deref().unwrap_or(&[]);
        let total_h = entries.len() as i32 * OUTLINE_ROW_HEIGHT;

        self.frame.probe(WidgetId::OutlinePane, pane);
        if self.frame.is_hot(WidgetId::OutlinePane) {
            self.outline_scroll -= self.frame.scroll_dy * OUTLINE_ROW_HEIGHT * 3;
        }

        let track = Rect::new(pane.x1 - SCROLLBAR_WIDTH, pane.y0, pane.x1, pane.y1);
        let bar = scrollbar(
            &mut self.frame,
            &mut self.outline_bar,
            ScrollbarOwner::Outline,
            track,
            &mut self.outline_scroll,
            pane.height(),
            total_h,
        );

        let mut rows = Vec::new();
        let mut commit = None;
        let first = (self.outline_scroll / OUTLINE_ROW_HEIGHT).max(0) as usize;
        let visible = (pane.height() / OUTLINE_ROW_HEIGHT + 2) as usize;

        for (index, entry) in entries.iter().enumerate().skip(first).take(visible) {
            let y0 = pane.y0 + index as i32 * OUTLINE_ROW_HEIGHT - self.outline_scroll;
            let bounds = Rect::new(pane.x0, y0, track.x0, y0 + OUTLINE_ROW_HEIGHT);

            let id = WidgetId::OutlineEntry(index);
            self.frame.probe(id, bounds);
            self.frame.try_activate(id, self.frame.primary_down);
            if self.frame.take_release(id, self.frame.primary_down) == Some(true) {
                commit = Some(entry.page);
            }

            rows.push(OutlineRow {
                text: format!("{}{}", "  ".repeat(entry.depth), entry.title),
                page: entry.page,
                bounds,
                hot: self.frame.is_hot(id),
            });
        }

        if let Some(page) = commit {
            self.jump(page);
        }
        OutlineScene {
            pane,
            scrollbar: bar,
            rows,
        }
    }
}

fn page_rect_to_canvas(rect: NormalizedRect, origin: Point, w: f32, h: f32) -> Rect {
    Rect::new(
        origin.x + (rect.left * w) as i32,
        origin.y + (rect.top * h) as i32,
        origin.x + (rect.right * w) as i32,
        origin.y + (rect.bottom * h) as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AnnotationRaster, RenderTransform};
    use crate::input::PointerButton;
    use anyhow::Result;

    const PAGE_W: u32 = 200;
    const PAGE_H: u32 = 300;

    struct FakeBackend {
        pages: usize,
        match_page: Option<usize>,
        links: Vec<LinkRegion>,
    }

    impl FakeBackend {
        fn new(pages: usize) -> Self {
            Self {
                pages,
                match_page: None,
                links: Vec::new(),
            }
        }
    }

    impl DocumentBackend for FakeBackend {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn render_page(&self, _page: usize, _transform: RenderTransform) -> Result<PageImage> {
            Ok(PageImage {
                width: PAGE_W,
                height: PAGE_H,
                pixels: vec![255; (PAGE_W * PAGE_H * 4) as usize],
            })
        }

        fn annotations(
            &self,
            _page: usize,
            _transform: RenderTransform,
        ) -> Result<Vec<AnnotationRaster>> {
            Ok(Vec::new())
        }

        fn links(&self, page: usize) -> Result<Vec<LinkRegion>> {
            if page == 0 {
                Ok(self.links.clone())
            } else {
                Ok(Vec::new())
            }
        }

        fn outline(&self) -> Result<Vec<crate::backend::OutlineEntry>> {
            Ok(vec![
                OutlineEntry {
                    title: "One".into(),
                    page: 0,
                    depth: 0,
                },
                OutlineEntry {
                    title: "Two".into(),
                    page: 5,
                    depth: 1,
                },
            ])
        }

        fn search_page(&self, page: usize, _needle: &str) -> Result<Vec<NormalizedRect>> {
            if self.match_page == Some(page) {
                Ok(vec![NormalizedRect {
                    left: 0.1,
                    top: 0.1,
                    right: 0.3,
                    bottom: 0.2,
                }])
            } else {
                Ok(Vec::new())
            }
        }

        fn text_in_region(&self, _page: usize, region: NormalizedRect) -> Result<String> {
            if region.is_valid() {
                Ok("lorem ipsum".into())
            } else {
                Ok(String::new())
            }
        }

        fn metadata(&self, key: MetadataKey) -> Option<String> {
            match key {
                MetadataKey::Title => Some("Fake Document".into()),
                _ => None,
            }
        }
    }

    fn app(pages: usize) -> App {
        App::new(Box::new(FakeBackend::new(pages)), ViewConfig::default())
    }

    fn press(app: &mut App, c: char) {
        app.handle_event(InputEvent::Key {
            key: Key::Char(c),
            mods: Modifiers::default(),
        });
        app.evaluate_frame(|| true).unwrap();
    }

    fn key(app: &mut App, key: Key) {
        app.handle_event(InputEvent::Key {
            key,
            mods: Modifiers::default(),
        });
        app.evaluate_frame(|| true).unwrap();
    }

    #[test]
    fn quit_key_reports_quit() {
        let mut app = app(3);
        app.handle_event(InputEvent::Key {
            key: Key::Char('q'),
            mods: Modifiers::default(),
        });
        let report = app.evaluate_frame(|| true).unwrap();
        assert!(report.quit);
    }

    #[test]
    fn page_steps_walk_history_with_collapsed_duplicates() {
        let mut app = app(10);
        press(&mut app, '.');
        press(&mut app, '.');
        press(&mut app, '.');
        assert_eq!(app.view.page, 3);

        press(&mut app, 't');
        assert_eq!(app.view.page, 2);
        press(&mut app, 't');
        assert_eq!(app.view.page, 1);
        press(&mut app, 'T');
        assert_eq!(app.view.page, 2);
    }

    #[test]
    fn prefixed_goto_jumps_and_back_returns() {
        let mut app = app(100);
        press(&mut app, '4');
        press(&mut app, '2');
        press(&mut app, 'g');
        assert_eq!(app.view.page, 41);
        press(&mut app, 't');
        assert_eq!(app.view.page, 0);
    }

    #[test]
    fn marks_set_and_recall() {
        let mut app = app(50);
        press(&mut app, '9');
        press(&mut app, 'g');
        press(&mut app, '3');
        press(&mut app, 'm');
        press(&mut app, 'G');
        assert_eq!(app.view.page, 49);
        press(&mut app, '3');
        press(&mut app, 't');
        assert_eq!(app.view.page, 8);
    }

    #[test]
    fn search_from_page_five_finds_page_eight() {
        let mut backend = FakeBackend::new(20);
        backend.match_page = Some(8);
        let mut app = App::new(Box::new(backend), ViewConfig::default());
        press(&mut app, '6');
        press(&mut app, 'g'); // page index 5

        press(&mut app, '/');
        for c in "term".chars() {
            key(&mut app, Key::Char(c));
        }
        key(&mut app, Key::Enter);

        // Session is armed; drive slices until it lands.
        for _ in 0..10 {
            app.handle_event(InputEvent::RefreshRequested);
            let report = app.evaluate_frame(|| true).unwrap();
            if !report.needs_another_frame {
                break;
            }
        }
        assert_eq!(app.view.page, 8);
        assert_eq!(app.hit_page, Some(8));
        assert!(!app.hits.is_empty());

        // Navigating away clears the highlights.
        press(&mut app, '.');
        assert!(app.hits.is_empty());
        assert_eq!(app.hit_page, None);
    }

    #[test]
    fn exhausted_search_reports_not_found_and_redraws() {
        let mut app = app(5);
        press(&mut app, '/');
        key(&mut app, Key::Char('x'));
        app.handle_event(InputEvent::Key {
            key: Key::Enter,
            mods: Modifiers::default(),
        });
        // First slice covers two pages, then the budget runs out.
        let mut scans = 0;
        let first = app
            .evaluate_frame(|| {
                scans += 1;
                scans <= 2
            })
            .unwrap();
        assert!(first.needs_another_frame);

        // The exhausting frame runs with no input at all; the "not found"
        // notice still has to be drawn.
        let last = app.evaluate_frame(|| true).unwrap();
        assert!(app.search.is_none());
        assert!(app.status_line().contains("not found"));
        assert!(last.needs_redraw);
        assert!(!last.needs_another_frame);
    }

    #[test]
    fn multi_slice_search_redraws_on_the_landing_frame() {
        let mut backend = FakeBackend::new(20);
        backend.match_page = Some(8);
        let mut app = App::new(Box::new(backend), ViewConfig::default());
        press(&mut app, '/');
        key(&mut app, Key::Char('x'));
        app.handle_event(InputEvent::Key {
            key: Key::Enter,
            mods: Modifiers::default(),
        });

        // The arming frame scans three pages and suspends.
        let mut scans = 0;
        let pending = app
            .evaluate_frame(|| {
                scans += 1;
                scans <= 3
            })
            .unwrap();
        assert!(pending.needs_another_frame);
        assert_eq!(app.view.page, 0);

        // The frame that lands on the hit page gets no input, so it must
        // request the redraw itself.
        let landing = app.evaluate_frame(|| true).unwrap();
        assert_eq!(app.view.page, 8);
        assert_eq!(app.hit_page, Some(8));
        assert!(landing.needs_redraw);
        assert!(!landing.needs_another_frame);
    }

    #[test]
    fn page_step_on_an_empty_document_is_a_no_op() {
        let mut app = app(0);
        press(&mut app, '.');
        press(&mut app, ',');
        assert_eq!(app.view.page, 0);
    }

    #[test]
    fn escape_closes_the_search_prompt_without_searching() {
        let mut app = app(5);
        press(&mut app, '/');
        key(&mut app, Key::Char('a'));
        key(&mut app, Key::Escape);
        assert!(app.prompt.is_none());
        assert!(app.search.is_none());
    }

    #[test]
    fn digits_reach_the_prompt_while_it_is_open() {
        let mut app = app(5);
        press(&mut app, '?');
        key(&mut app, Key::Char('4'));
        key(&mut app, Key::Char('2'));
        let scene = app.scene().unwrap();
        assert_eq!(scene.prompt.as_deref(), Some("?42"));
    }

    #[test]
    fn link_click_commits_on_release_over_the_link() {
        let mut backend = FakeBackend::new(10);
        backend.links.push(LinkRegion {
            bounds: NormalizedRect {
                left: 0.0,
                top: 0.0,
                right: 0.5,
                bottom: 0.5,
            },
            target: LinkTarget::GotoPage(7),
        });
        let mut app = App::new(Box::new(backend), ViewConfig::default());
        app.evaluate_frame(|| true).unwrap();

        // Page is centered: origin (300, 350); the link covers its top-left
        // quadrant.
        app.handle_event(InputEvent::PointerMove { x: 350, y: 400 });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Primary,
            down: true,
        });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Primary,
            down: false,
        });
        app.evaluate_frame(|| true).unwrap();
        assert_eq!(app.view.page, 7);
    }

    #[test]
    fn link_release_off_the_link_does_not_commit() {
        let mut backend = FakeBackend::new(10);
        backend.links.push(LinkRegion {
            bounds: NormalizedRect {
                left: 0.0,
                top: 0.0,
                right: 0.5,
                bottom: 0.5,
            },
            target: LinkTarget::GotoPage(7),
        });
        let mut app = App::new(Box::new(backend), ViewConfig::default());
        app.evaluate_frame(|| true).unwrap();

        app.handle_event(InputEvent::PointerMove { x: 350, y: 400 });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Primary,
            down: true,
        });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::PointerMove { x: 10, y: 10 });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Primary,
            down: false,
        });
        app.evaluate_frame(|| true).unwrap();
        assert_eq!(app.view.page, 0);
    }

    #[test]
    fn uri_link_surfaces_through_the_report() {
        let mut backend = FakeBackend::new(10);
        backend.links.push(LinkRegion {
            bounds: NormalizedRect {
                left: 0.0,
                top: 0.0,
                right: 0.5,
                bottom: 0.5,
            },
            target: LinkTarget::OpenUri("https://example.org".into()),
        });
        let mut app = App::new(Box::new(backend), ViewConfig::default());
        app.evaluate_frame(|| true).unwrap();

        app.handle_event(InputEvent::PointerMove { x: 350, y: 400 });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Primary,
            down: true,
        });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Primary,
            down: false,
        });
        let report = app.evaluate_frame(|| true).unwrap();
        assert_eq!(report.open_uri.as_deref(), Some("https://example.org"));
        assert_eq!(app.view.page, 0);
    }

    #[test]
    fn fine_scroll_crosses_pages_at_the_edges() {
        let mut app = App::new(
            Box::new(FakeBackend::new(3)),
            ViewConfig {
                canvas: (100, 100),
                ..ViewConfig::default()
            },
        );
        app.evaluate_frame(|| true).unwrap(); // content 200x300, canvas 100x100

        // Scroll to the bottom, then one more down-step crosses the page.
        for _ in 0..100 {
            press(&mut app, 'j');
            if app.view.page == 1 {
                break;
            }
        }
        assert_eq!(app.view.page, 1);
        assert_eq!(app.view.scroll_y, 0);

        // One up-step from the top goes back, landing at the bottom.
        press(&mut app, 'k');
        assert_eq!(app.view.page, 0);
        assert_eq!(app.view.scroll_y, 200);
    }

    #[test]
    fn smart_forward_walks_page_then_width_then_next_page() {
        let mut app = App::new(
            Box::new(FakeBackend::new(2)),
            ViewConfig {
                canvas: (100, 100),
                ..ViewConfig::default()
            },
        );
        app.evaluate_frame(|| true).unwrap();

        let mut advanced = false;
        for _ in 0..50 {
            press(&mut app, ' ');
            if app.view.page == 1 {
                advanced = true;
                break;
            }
        }
        assert!(advanced, "smart move should eventually reach the next page");
        assert_eq!((app.view.scroll_x, app.view.scroll_y), (0, 0));
    }

    #[test]
    fn reset_restores_crop_rotation_and_background() {
        let mut app = app(5);
        press(&mut app, 'x');
        press(&mut app, 'y');
        press(&mut app, '}');
        press(&mut app, 'v');
        press(&mut app, 'c');
        press(&mut app, 'r');
        assert_eq!(app.view.crop_x, 0);
        assert_eq!(app.view.crop_y, 0);
        assert_eq!(app.view.rotation, 0.0);
        assert!(!app.view.invert);
        assert_eq!(app.background, 0xFFFFFF);
    }

    #[test]
    fn background_shuffle_always_changes_the_color() {
        let mut app = app(5);
        for _ in 0..10 {
            let before = app.background;
            press(&mut app, 'c');
            assert_ne!(app.background, before);
            assert!(BACKGROUND_PALETTE.contains(&app.background));
        }
    }

    #[test]
    fn outline_toggle_loads_entries_and_shifts_the_canvas() {
        let mut app = app(10);
        press(&mut app, 'o');
        assert!(app.show_outline);
        let scene = app.scene().unwrap();
        let outline = scene.outline.expect("outline pane visible");
        assert_eq!(outline.rows.len(), 2);
        assert!(outline.rows[1].text.starts_with("  "));
        assert!(app.layout.canvas.x0 > 0);

        press(&mut app, 'o');
        assert!(!app.show_outline);
    }

    #[test]
    fn outline_entry_click_jumps() {
        let mut app = app(10);
        press(&mut app, 'o');
        let row_bounds = app.layout.outline.as_ref().unwrap().rows[1].bounds;
        let inside = Point {
            x: (row_bounds.x0 + row_bounds.x1) / 2,
            y: (row_bounds.y0 + row_bounds.y1) / 2,
        };

        app.handle_event(InputEvent::PointerMove {
            x: inside.x,
            y: inside.y,
        });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Primary,
            down: true,
        });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Primary,
            down: false,
        });
        app.evaluate_frame(|| true).unwrap();
        assert_eq!(app.view.page, 5);
    }

    #[test]
    fn middle_drag_pans_the_view() {
        let mut app = App::new(
            Box::new(FakeBackend::new(3)),
            ViewConfig {
                canvas: (100, 100),
                ..ViewConfig::default()
            },
        );
        app.evaluate_frame(|| true).unwrap();

        app.handle_event(InputEvent::PointerMove { x: 50, y: 50 });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Middle,
            down: true,
        });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::PointerMove { x: 30, y: 10 });
        app.evaluate_frame(|| true).unwrap();
        assert_eq!(app.view.scroll_x, 20);
        assert_eq!(app.view.scroll_y, 40);
    }

    #[test]
    fn selection_drag_leaves_an_ordered_rect() {
        let mut app = app(3);
        app.handle_event(InputEvent::PointerMove { x: 400, y: 500 });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Secondary,
            down: true,
        });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::PointerMove { x: 350, y: 420 });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Secondary,
            down: false,
        });
        app.evaluate_frame(|| true).unwrap();

        assert_eq!(app.selection, Some(Rect::new(350, 420, 400, 500)));
        key(&mut app, Key::Escape);
        assert_eq!(app.selection, None);
    }

    #[test]
    fn selection_release_surfaces_the_covered_text_once() {
        let mut app = app(3);
        app.handle_event(InputEvent::PointerMove { x: 320, y: 380 });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Secondary,
            down: true,
        });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::PointerMove { x: 420, y: 520 });
        app.evaluate_frame(|| true).unwrap();
        app.handle_event(InputEvent::Button {
            button: PointerButton::Secondary,
            down: false,
        });
        let report = app.evaluate_frame(|| true).unwrap();
        assert_eq!(report.selected_text.as_deref(), Some("lorem ipsum"));

        // The capture is one-shot; the next frame carries nothing.
        app.handle_event(InputEvent::RefreshRequested);
        let report = app.evaluate_frame(|| true).unwrap();
        assert_eq!(report.selected_text, None);
    }

    #[test]
    fn info_panel_lists_metadata() {
        let mut app = app(12);
        press(&mut app, 'i');
        let scene = app.scene().unwrap();
        let info = scene.info.expect("info panel visible");
        assert!(info.contains(&"Title: Fake Document".to_string()));
        assert!(info.contains(&"Pages: 12".to_string()));
    }

    #[test]
    fn fit_page_applies_on_the_next_frame() {
        let mut app = App::new(
            Box::new(FakeBackend::new(3)),
            ViewConfig {
                canvas: (100, 100),
                ..ViewConfig::default()
            },
        );
        // Content is 200x300 regardless of zoom in the fake, so fit scales
        // by the dominant axis ratio: 100/300 of the current zoom.
        press(&mut app, 'Z');
        assert_eq!(app.view.zoom, 32.0);
    }
}

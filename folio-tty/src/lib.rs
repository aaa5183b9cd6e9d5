//! Terminal frontend plumbing: crossterm event normalization and a kitty
//! graphics protocol presenter.
//!
//! The viewer state machines work in raster pixels; the terminal reports
//! cells. The normalizer owns the cell-to-pixel mapping, and the presenter
//! composites the scene into one RGBA canvas before emitting it.

use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind},
    terminal::{Clear, ClearType},
};
use folio_core::{
    InputEvent, Key, Modifiers, OutlineScene, PageImage, Point, PointerButton, Rect, Scene,
};
use png::{BitDepth, ColorType, Encoder};
use tracing::warn;

/// Overlay tints, RGBA.
const HIGHLIGHT_TINT: [u8; 4] = [255, 220, 80, 96];
const LINK_TINT: [u8; 4] = [80, 120, 255, 64];
const SELECTION_TINT: [u8; 4] = [120, 120, 220, 64];

/// Maps crossterm events to normalized viewer events. Pointer coordinates
/// arrive in cells and leave in pixels, centered within the cell.
#[derive(Debug, Clone, Copy)]
pub struct EventNormalizer {
    cell_width: u16,
    cell_height: u16,
}

impl EventNormalizer {
    pub fn new(cell_width: u16, cell_height: u16) -> Self {
        Self {
            cell_width: cell_width.max(1),
            cell_height: cell_height.max(1),
        }
    }

    pub fn cell_size(&self) -> (u16, u16) {
        (self.cell_width, self.cell_height)
    }

    pub fn normalize(&self, event: Event) -> Option<InputEvent> {
        match event {
            Event::Key(key) => self.normalize_key(key),
            Event::Mouse(mouse) => {
                let x = mouse.column as i32 * self.cell_width as i32 + self.cell_width as i32 / 2;
                let y = mouse.row as i32 * self.cell_height as i32 + self.cell_height as i32 / 2;
                match mouse.kind {
                    MouseEventKind::Moved => Some(InputEvent::PointerMove { x, y }),
                    MouseEventKind::Drag(_) => Some(InputEvent::PointerMove { x, y }),
                    MouseEventKind::Down(button) => Some(InputEvent::Button {
                        button: map_button(button)?,
                        down: true,
                    }),
                    MouseEventKind::Up(button) => Some(InputEvent::Button {
                        button: map_button(button)?,
                        down: false,
                    }),
                    MouseEventKind::ScrollUp => Some(InputEvent::Scroll { dx: 0, dy: 1 }),
                    MouseEventKind::ScrollDown => Some(InputEvent::Scroll { dx: 0, dy: -1 }),
                    MouseEventKind::ScrollLeft => Some(InputEvent::Scroll { dx: 1, dy: 0 }),
                    MouseEventKind::ScrollRight => Some(InputEvent::Scroll { dx: -1, dy: 0 }),
                }
            }
            Event::Resize(columns, rows) => Some(InputEvent::Resize {
                width: columns as u32 * self.cell_width as u32,
                height: rows as u32 * self.cell_height as u32,
            }),
            _ => None,
        }
    }

    fn normalize_key(&self, event: KeyEvent) -> Option<InputEvent> {
        if event.kind != KeyEventKind::Press {
            return None;
        }
        let key = match event.code {
            KeyCode::Char(c) => Key::Char(c),
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Left => Key::Left,
            KeyCode::Right => Key::Right,
            KeyCode::PageUp => Key::PageUp,
            KeyCode::PageDown => Key::PageDown,
            KeyCode::Home => Key::Home,
            KeyCode::End => Key::End,
            KeyCode::Enter => Key::Enter,
            KeyCode::Esc => Key::Escape,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::F(n) => Key::F(n),
            _ => return None,
        };
        let mods = Modifiers {
            shift: event.modifiers.contains(KeyModifiers::SHIFT),
            control: event.modifiers.contains(KeyModifiers::CONTROL),
            alt: event.modifiers.contains(KeyModifiers::ALT),
        };
        Some(InputEvent::Key { key, mods })
    }
}

fn map_button(button: crossterm::event::MouseButton) -> Option<PointerButton> {
    use crossterm::event::MouseButton;
    match button {
        MouseButton::Left => Some(PointerButton::Primary),
        MouseButton::Middle => Some(PointerButton::Middle),
        MouseButton::Right => Some(PointerButton::Secondary),
    }
}

/// Draws composed scenes with the kitty graphics protocol and text rows for
/// the panes the raster cannot carry.
pub struct KittyPresenter<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

impl<W: Write> KittyPresenter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Composite and emit a full frame. The image occupies all rows but the
    /// last, which carries the status line (or the search prompt while one
    /// is open).
    pub fn present(&mut self, scene: &Scene, columns: u16, rows: u16) -> Result<()> {
        let image = compose_scene(scene);
        let image_rows = rows.saturating_sub(1).max(1);

        self.begin_sync_update()?;
        crossterm::queue!(&mut self.writer, cursor::MoveTo(0, 0))?;
        if image.is_empty() {
            // A zero-area canvas (mid-resize) cannot be PNG-encoded.
            warn!(
                width = image.width,
                height = image.height,
                "empty frame raster, skipping graphics emission"
            );
        } else {
            self.draw_image(&image, columns, image_rows)?;
        }

        if let Some(outline) = &scene.outline {
            self.draw_outline_rows(outline, scene.canvas, columns, image_rows)?;
        }
        if let Some(info) = &scene.info {
            self.draw_info_rows(info, columns)?;
        }

        let label = scene.prompt.as_deref().unwrap_or(&scene.status);
        crossterm::queue!(
            &mut self.writer,
            cursor::MoveTo(0, rows.saturating_sub(1)),
            Clear(ClearType::CurrentLine)
        )?;
        write_status_line(&mut self.writer, label)?;
        self.end_sync_update()?;
        Ok(())
    }

    fn draw_image(&mut self, image: &PageImage, columns: u16, rows: u16) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    columns,
                    rows,
                    image.width,
                    image.height,
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Outline titles are drawn as terminal text on top of the pane area of
    /// the image, one row per cell row.
    fn draw_outline_rows(
        &mut self,
        outline: &OutlineScene,
        canvas: (u32, u32),
        columns: u16,
        rows: u16,
    ) -> Result<()> {
        if canvas.0 == 0 || canvas.1 == 0 {
            return Ok(());
        }
        let pane_cols =
            ((outline.pane.width() as u64 * columns as u64) / canvas.0 as u64).max(1) as usize;

        for row in &outline.rows {
            if row.bounds.y0 < outline.pane.y0 || row.bounds.y1 > outline.pane.y1 {
                continue;
            }
            let cell_row = (row.bounds.y0 as u64 * rows as u64 / canvas.1 as u64) as u16;
            if cell_row >= rows {
                continue;
            }
            let mut text: String = row.text.chars().take(pane_cols).collect();
            if row.hot {
                text = format!("\u{1b}[7m{text}\u{1b}[0m");
            }
            crossterm::queue!(&mut self.writer, cursor::MoveTo(0, cell_row))?;
            write!(self.writer, "{text}")?;
        }
        Ok(())
    }

    fn draw_info_rows(&mut self, lines: &[String], columns: u16) -> Result<()> {
        for (index, line) in lines.iter().enumerate() {
            let text: String = line.chars().take(columns as usize).collect();
            crossterm::queue!(&mut self.writer, cursor::MoveTo(0, index as u16))?;
            write!(self.writer, "\u{1b}[7m{text}\u{1b}[0m")?;
        }
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates; the terminal renders all buffered
    /// changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

/// Flatten the scene into one RGBA canvas: background, page, annotation
/// rasters, then translucent highlight/link/selection tints.
pub fn compose_scene(scene: &Scene) -> PageImage {
    let (width, height) = scene.canvas;
    let mut canvas = PageImage {
        width,
        height,
        pixels: vec![0; width as usize * height as usize * 4],
    };
    fill_background(&mut canvas, scene.background);

    blit_image(&mut canvas, &scene.page.image, scene.page.pos);
    for annotation in &scene.annotations {
        blit_image(&mut canvas, &annotation.image, annotation.pos);
    }

    for rect in &scene.highlights {
        blend_rect(&mut canvas, *rect, HIGHLIGHT_TINT);
    }
    for rect in &scene.link_rects {
        blend_rect(&mut canvas, *rect, LINK_TINT);
    }
    if let Some(rect) = scene.selection {
        blend_rect(&mut canvas, rect, SELECTION_TINT);
    }

    canvas
}

fn fill_background(canvas: &mut PageImage, color: u32) {
    let r = ((color >> 16) & 0xFF) as u8;
    let g = ((color >> 8) & 0xFF) as u8;
    let b = (color & 0xFF) as u8;
    for chunk in canvas.pixels.chunks_exact_mut(4) {
        chunk[0] = r;
        chunk[1] = g;
        chunk[2] = b;
        chunk[3] = 255;
    }
}

/// Copy `image` onto the canvas at `pos`, clipping to the canvas bounds.
fn blit_image(canvas: &mut PageImage, image: &PageImage, pos: Point) {
    if image.is_empty() || canvas.is_empty() {
        return;
    }
    let x0 = pos.x.max(0);
    let y0 = pos.y.max(0);
    let x1 = (pos.x + image.width as i32).min(canvas.width as i32);
    let y1 = (pos.y + image.height as i32).min(canvas.height as i32);
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    let src_stride = image.width as usize * 4;
    let dst_stride = canvas.width as usize * 4;
    let width_bytes = (x1 - x0) as usize * 4;

    for y in y0..y1 {
        let src_y = (y - pos.y) as usize;
        let src_x = (x0 - pos.x) as usize;
        let src_start = src_y * src_stride + src_x * 4;
        let dst_start = y as usize * dst_stride + x0 as usize * 4;
        canvas.pixels[dst_start..dst_start + width_bytes]
            .copy_from_slice(&image.pixels[src_start..src_start + width_bytes]);
    }
}

/// Alpha-blend a translucent tint over a canvas region.
fn blend_rect(canvas: &mut PageImage, rect: Rect, tint: [u8; 4]) {
    let x0 = rect.x0.max(0);
    let y0 = rect.y0.max(0);
    let x1 = rect.x1.min(canvas.width as i32);
    let y1 = rect.y1.min(canvas.height as i32);
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    let stride = canvas.width as usize * 4;
    for y in y0..y1 {
        for x in x0..x1 {
            let offset = y as usize * stride + x as usize * 4;
            blend_pixel(&mut canvas.pixels[offset..offset + 4], tint);
        }
    }
}

fn blend_pixel(pixel: &mut [u8], tint: [u8; 4]) {
    let alpha = tint[3] as u32;
    let inverse = 255 - alpha;
    for channel in 0..3 {
        let blended = (tint[channel] as u32 * alpha + pixel[channel] as u32 * inverse) / 255;
        pixel[channel] = blended as u8;
    }
    pixel[3] = 255;
}

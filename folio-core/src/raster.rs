//! Single-entry raster cache tied to the render-affecting view fields.

use anyhow::Result;
use tracing::warn;

use crate::backend::{AnnotationRaster, DocumentBackend, PageImage, RenderTransform};
use crate::view::ViewState;

/// Annotation rasters kept per page; the rest are dropped with a diagnostic.
pub const MAX_ANNOTATION_RASTERS: usize = 256;

/// The exact tuple that forces a re-render when any field changes. Float
/// fields are quantized so the comparison is total and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderKey {
    page: usize,
    zoom_milli: u32,
    rotation_deci: u32,
    crop_x: u32,
    crop_y: u32,
    invert: bool,
}

impl RenderKey {
    pub fn of(view: &ViewState) -> Self {
        Self {
            page: view.page,
            zoom_milli: quantize(view.zoom, 1000.0),
            rotation_deci: quantize(view.rotation, 10.0),
            crop_x: view.crop_x,
            crop_y: view.crop_y,
            invert: view.invert,
        }
    }
}

fn quantize(value: f32, scale: f32) -> u32 {
    let scaled = (value * scale).round();
    if !scaled.is_finite() || scaled < 0.0 {
        0
    } else if scaled > u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}

#[derive(Debug)]
pub struct RasterEntry {
    pub key: RenderKey,
    pub page_image: PageImage,
    pub annotations: Vec<AnnotationRaster>,
}

/// Holds the raster for the last rendered view. The entry is either fully
/// fresh or still fully valid; it is replaced whole, never patched.
#[derive(Debug, Default)]
pub struct RasterCache {
    entry: Option<RasterEntry>,
}

impl RasterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the cached entry no longer matches `view`.
    pub fn is_stale(&self, view: &ViewState) -> bool {
        let key = RenderKey::of(view);
        self.entry.as_ref().map_or(true, |entry| entry.key != key)
    }

    pub fn entry(&self) -> Option<&RasterEntry> {
        self.entry.as_ref()
    }

    /// Return the raster for `view`, re-rendering synchronously if any
    /// control field changed since the cached entry was produced.
    pub fn entry_for(
        &mut self,
        view: &ViewState,
        backend: &dyn DocumentBackend,
    ) -> Result<&RasterEntry> {
        if self.is_stale(view) {
            let entry = produce(view, backend)?;
            self.entry = Some(entry);
        }
        Ok(self.entry.as_ref().expect("entry was just produced"))
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

fn produce(view: &ViewState, backend: &dyn DocumentBackend) -> Result<RasterEntry> {
    let transform = RenderTransform {
        zoom: view.zoom,
        rotation: view.rotation,
    };

    let mut page_image = backend.render_page(view.page, transform)?;

    if view.crop_x > 0 || view.crop_y > 0 {
        let crop_px_x = points_to_pixels(view.crop_x, view.zoom);
        let crop_px_y = points_to_pixels(view.crop_y, view.zoom);
        page_image = crop_margins(&page_image, crop_px_x, crop_px_y);
    }

    if view.invert {
        invert_pixels(&mut page_image.pixels);
    }

    let mut annotations = backend.annotations(view.page, transform)?;
    if annotations.len() > MAX_ANNOTATION_RASTERS {
        warn!(
            page = view.page,
            count = annotations.len(),
            cap = MAX_ANNOTATION_RASTERS,
            "too many annotations to display, truncating"
        );
        annotations.truncate(MAX_ANNOTATION_RASTERS);
    }
    if view.invert {
        for annotation in &mut annotations {
            invert_pixels(&mut annotation.image.pixels);
        }
    }

    Ok(RasterEntry {
        key: RenderKey::of(view),
        page_image,
        annotations,
    })
}

fn points_to_pixels(points: u32, zoom: f32) -> u32 {
    (points as f32 * zoom / 72.0).round().max(0.0) as u32
}

/// Cut `margin_x`/`margin_y` pixels off each side, capped so at least one
/// pixel of content survives per axis.
fn crop_margins(image: &PageImage, margin_x: u32, margin_y: u32) -> PageImage {
    if image.is_empty() {
        return image.clone();
    }

    let margin_x = margin_x.min(image.width.saturating_sub(1) / 2);
    let margin_y = margin_y.min(image.height.saturating_sub(1) / 2);
    if margin_x == 0 && margin_y == 0 {
        return image.clone();
    }

    let width = image.width - margin_x * 2;
    let height = image.height - margin_y * 2;
    let stride = image.width as usize * 4;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);

    for row in 0..height {
        let src_y = (margin_y + row) as usize;
        let start = src_y * stride + margin_x as usize * 4;
        let end = start + width as usize * 4;
        pixels.extend_from_slice(&image.pixels[start..end]);
    }

    PageImage {
        width,
        height,
        pixels,
    }
}

fn invert_pixels(pixels: &mut [u8]) {
    for chunk in pixels.chunks_exact_mut(4) {
        chunk[0] = 255 - chunk[0];
        chunk[1] = 255 - chunk[1];
        chunk[2] = 255 - chunk[2];
    }
}

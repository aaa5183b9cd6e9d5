use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;

/// RGBA page raster at a specific transform.
#[derive(Debug, Clone, Default)]
pub struct PageImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PageImage {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Rectangle in page space, each coordinate in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl NormalizedRect {
    pub fn clamp(self) -> Self {
        Self {
            left: self.left.clamp(0.0, 1.0),
            top: self.top.clamp(0.0, 1.0),
            right: self.right.clamp(0.0, 1.0),
            bottom: self.bottom.clamp(0.0, 1.0),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.right > self.left && self.bottom > self.top
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// The render-affecting part of a view handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTransform {
    /// Resolution in dots per inch; page points scale by `zoom / 72`.
    pub zoom: f32,
    /// Clockwise rotation in degrees, normalized to [0, 360).
    pub rotation: f32,
}

impl Default for RenderTransform {
    fn default() -> Self {
        Self {
            zoom: crate::view::DEFAULT_ZOOM,
            rotation: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationRaster {
    pub image: PageImage,
    pub bounds: NormalizedRect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    GotoPage(usize),
    OpenUri(String),
}

#[derive(Debug, Clone)]
pub struct LinkRegion {
    pub bounds: NormalizedRect,
    pub target: LinkTarget,
}

/// Outline tree flattened in pre-order; `depth` restores the nesting.
#[derive(Debug, Clone)]
pub struct OutlineEntry {
    pub title: String,
    pub page: usize,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKey {
    Title,
    Author,
    Format,
    Encryption,
}

/// Document open parameters collected from the CLI.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub password: Option<String>,
    /// Layout width/height in points and base font size for reflowable
    /// formats; fixed-layout backends may ignore these.
    pub layout_width: f32,
    pub layout_height: f32,
    pub layout_em: f32,
    pub stylesheet: Option<PathBuf>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            password: None,
            layout_width: 450.0,
            layout_height: 600.0,
            layout_em: 12.0,
            stylesheet: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("authentication failed for {path}: bad or missing password")]
    Authentication { path: PathBuf },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One open paginated document.
///
/// All methods are synchronous; the interaction loop calls them inline and
/// accepts the stall. Implementations may cache internally but must return
/// fully materialized results.
pub trait DocumentBackend {
    fn page_count(&self) -> usize;

    fn render_page(&self, page: usize, transform: RenderTransform) -> Result<PageImage>;

    /// Annotation rasters for a page, in document order.
    fn annotations(&self, page: usize, transform: RenderTransform)
        -> Result<Vec<AnnotationRaster>>;

    fn links(&self, page: usize) -> Result<Vec<LinkRegion>>;

    fn outline(&self) -> Result<Vec<OutlineEntry>>;

    /// Bounding boxes of every occurrence of `needle` on the page.
    fn search_page(&self, page: usize, needle: &str) -> Result<Vec<NormalizedRect>>;

    /// Text covered by `region` on the page, for selection copy.
    fn text_in_region(&self, page: usize, region: NormalizedRect) -> Result<String>;

    fn metadata(&self, key: MetadataKey) -> Option<String>;
}

pub trait DocumentProvider {
    fn open(&self, path: &Path, options: &OpenOptions) -> Result<Box<dyn DocumentBackend>, OpenError>;
}

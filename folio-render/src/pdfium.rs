use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use folio_core::{
    AnnotationRaster, DocumentBackend, DocumentProvider, LinkRegion, LinkTarget, MetadataKey,
    NormalizedRect, OpenError, OpenOptions, OutlineEntry, PageImage, RenderTransform,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

pub struct PdfiumProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumProvider {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_build_hint() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

impl DocumentProvider for PdfiumProvider {
    fn open(
        &self,
        path: &Path,
        options: &OpenOptions,
    ) -> Result<Box<dyn DocumentBackend>, OpenError> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;

        let password = options.password.clone();
        let details = {
            let document = load_document(&self.pdfium, &absolute, password.as_deref())?;
            build_details(&document, password.is_some())
        };

        Ok(Box::new(PdfiumDocument {
            document: Mutex::new(None),
            pdfium: Arc::clone(&self.pdfium),
            path: absolute,
            password,
            details,
        }))
    }
}

fn load_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, OpenError> {
    match pdfium.load_pdf_from_file(path, password) {
        Ok(document) => Ok(document),
        Err(PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError)) => {
            Err(OpenError::Authentication {
                path: path.to_path_buf(),
            })
        }
        Err(err) => Err(OpenError::Other(
            anyhow!(err).context(format!("failed to open {:?}", path)),
        )),
    }
}

#[derive(Debug, Clone)]
struct DocumentDetails {
    page_count: usize,
    title: Option<String>,
    author: Option<String>,
    encryption: Option<String>,
}

fn build_details(document: &PdfDocument<'_>, password_used: bool) -> DocumentDetails {
    let metadata = document.metadata();
    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_owned())
        .filter(|t| !t.is_empty());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().to_owned())
        .filter(|a| !a.is_empty());

    DocumentDetails {
        page_count: usize::from(document.pages().len()),
        title,
        author,
        encryption: password_used.then(|| "password protected".to_string()),
    }
}

struct PdfiumDocument {
    // Declared before `pdfium` so the cached document drops while the
    // bindings it references are still alive.
    document: Mutex<Option<PdfDocument<'static>>>,
    pdfium: Arc<Pdfium>,
    path: PathBuf,
    password: Option<String>,
    details: DocumentDetails,
}

impl PdfiumDocument {
    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = load_document(&self.pdfium, &self.path, self.password.as_deref())
            .map_err(anyhow::Error::new)?;
        // SAFETY: the returned PdfDocument borrows from the Pdfium bindings
        // behind self.pdfium. The document is only ever stored inside
        // self.document, which is declared before self.pdfium and therefore
        // drops first, so the erased lifetime never outlives the bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            let document = self.open_document()?;
            *guard = Some(document);
        }
        let document = guard.as_ref().expect("document must be loaded");
        f(document)
    }

    fn link_target_from_pdfium(&self, link: &PdfLink<'_>) -> Option<LinkTarget> {
        if let Some(action) = link.action() {
            match action.action_type() {
                PdfActionType::GoToDestinationInSameDocument => {
                    if let Some(local) = action.as_local_destination_action() {
                        if let Ok(destination) = local.destination() {
                            if let Ok(page_index) = destination.page_index() {
                                return Some(LinkTarget::GotoPage(page_index as usize));
                            }
                        }
                    }
                }
                PdfActionType::Uri => {
                    if let Some(uri_action) = action.as_uri_action() {
                        if let Ok(uri) = uri_action.uri() {
                            if !uri.is_empty() {
                                return Some(LinkTarget::OpenUri(uri));
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if let Some(destination) = link.destination() {
            if let Ok(page_index) = destination.page_index() {
                return Some(LinkTarget::GotoPage(page_index as usize));
            }
        }

        None
    }
}

impl DocumentBackend for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.details.page_count
    }

    #[instrument(skip(self))]
    fn render_page(&self, page: usize, transform: RenderTransform) -> Result<PageImage> {
        self.with_document(|document| render_internal(document, page, transform))
    }

    fn annotations(
        &self,
        page: usize,
        transform: RenderTransform,
    ) -> Result<Vec<AnnotationRaster>> {
        let rotation = snap_rotation(transform.rotation);
        if !matches!(rotation, PdfPageRenderRotation::None) {
            // Annotation bounds are reported in unrotated page space; the
            // overlay placement would be wrong for rotated views.
            debug!(page, "skipping annotation overlays for rotated view");
            return Ok(Vec::new());
        }

        self.with_document(|document| {
            let index = page_index(page)?;
            let pdf_page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", page))?;

            let page_width = pdf_page.width().value;
            let page_height = pdf_page.height().value;
            if page_width <= 0.0 || page_height <= 0.0 {
                return Ok(Vec::new());
            }

            let mut regions = Vec::new();
            for annotation in pdf_page.annotations().iter() {
                let bounds = match annotation.bounds() {
                    Ok(bounds) => bounds,
                    Err(err) => {
                        warn!(?err, page, "failed to resolve annotation bounds");
                        continue;
                    }
                };
                let rect = normalize_page_rect(
                    bounds.left().value,
                    bounds.top().value,
                    bounds.right().value,
                    bounds.bottom().value,
                    page_width,
                    page_height,
                );
                if rect.is_valid() {
                    regions.push(rect);
                }
            }
            if regions.is_empty() {
                return Ok(Vec::new());
            }

            let full = render_internal(document, page, transform)?;
            Ok(regions
                .into_iter()
                .filter_map(|bounds| {
                    crop_region(&full, bounds).map(|image| AnnotationRaster { image, bounds })
                })
                .collect())
        })
    }

    fn links(&self, page: usize) -> Result<Vec<LinkRegion>> {
        self.with_document(|document| {
            let index = page_index(page)?;
            let pdf_page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", page))?;

            let page_width = pdf_page.width().value;
            let page_height = pdf_page.height().value;
            if page_width <= 0.0 || page_height <= 0.0 {
                return Ok(Vec::new());
            }

            let mut regions = Vec::new();
            for link in pdf_page.links().iter() {
                let rect = match link.rect() {
                    Ok(rect) => rect,
                    Err(err) => {
                        warn!(
                            ?err,
                            page,
                            path = %self.path.display(),
                            "failed to resolve link rectangle"
                        );
                        continue;
                    }
                };

                let bounds = normalize_page_rect(
                    rect.left().value,
                    rect.top().value,
                    rect.right().value,
                    rect.bottom().value,
                    page_width,
                    page_height,
                );
                if !bounds.is_valid() {
                    continue;
                }

                let Some(target) = self.link_target_from_pdfium(&link) else {
                    continue;
                };

                regions.push(LinkRegion { bounds, target });
            }

            Ok(regions)
        })
    }

    fn outline(&self) -> Result<Vec<OutlineEntry>> {
        self.with_document(|document| {
            let mut outline = Vec::new();
            if let Some(root) = document.bookmarks().root() {
                collect_outline(root, 0, &mut outline);
            }
            Ok(outline)
        })
    }

    fn search_page(&self, page: usize, needle: &str) -> Result<Vec<NormalizedRect>> {
        if needle.trim().is_empty() {
            return Ok(Vec::new());
        }

        self.with_document(|document| {
            let index = page_index(page)?;
            let pdf_page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", page))?;
            let text = pdf_page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page))?;

            let page_width = pdf_page.width().value;
            let page_height = pdf_page.height().value;
            if page_width <= 0.0 || page_height <= 0.0 {
                return Ok(Vec::new());
            }

            let options = PdfSearchOptions::new();
            let search = text
                .search(needle, &options)
                .with_context(|| format!("failed to perform search on page {}", page))?;

            let mut hits = Vec::new();
            while let Some(segments) = search.find_next() {
                for segment in segments.iter() {
                    let bounds = segment.bounds();
                    let rect = normalize_page_rect(
                        bounds.left().value,
                        bounds.top().value,
                        bounds.right().value,
                        bounds.bottom().value,
                        page_width,
                        page_height,
                    );
                    if rect.is_valid() {
                        hits.push(rect);
                    }
                }
            }

            Ok(hits)
        })
    }

    fn text_in_region(&self, page: usize, region: NormalizedRect) -> Result<String> {
        self.with_document(|document| {
            let index = page_index(page)?;
            let pdf_page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", page))?;
            let text = pdf_page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page))?;

            let page_width = pdf_page.width().value;
            let page_height = pdf_page.height().value;
            if page_width <= 0.0 || page_height <= 0.0 {
                return Ok(String::new());
            }

            // Normalized rects are top-left based; pdfium rects use a
            // bottom-left origin in page points.
            let rect = PdfRect::new(
                PdfPoints::new((1.0 - region.bottom) * page_height),
                PdfPoints::new(region.left * page_width),
                PdfPoints::new((1.0 - region.top) * page_height),
                PdfPoints::new(region.right * page_width),
            );
            Ok(text.inside_rect(rect))
        })
    }

    fn metadata(&self, key: MetadataKey) -> Option<String> {
        match key {
            MetadataKey::Title => self.details.title.clone(),
            MetadataKey::Author => self.details.author.clone(),
            MetadataKey::Format => Some("PDF".to_string()),
            MetadataKey::Encryption => self.details.encryption.clone(),
        }
    }
}

fn page_index(page: usize) -> Result<PdfPageIndex> {
    page.try_into()
        .map_err(|_| anyhow!("page {} is out of supported range", page))
}

fn render_internal(
    document: &PdfDocument<'_>,
    page: usize,
    transform: RenderTransform,
) -> Result<PageImage> {
    let index = page_index(page)?;
    let pdf_page = document
        .pages()
        .get(index)
        .with_context(|| format!("page {} out of range", page))?;

    // Zoom is a resolution in dpi; pdfium scales from 72dpi page points.
    let mut config = PdfRenderConfig::new().scale_page_by_factor((transform.zoom / 72.0).max(0.1));
    let rotation = snap_rotation(transform.rotation);
    if !matches!(rotation, PdfPageRenderRotation::None) {
        config = config.rotate(rotation, true);
    }

    let bitmap = pdf_page
        .render_with_config(&config)
        .with_context(|| format!("failed to render page {}", page))?;
    let image = bitmap.as_image().to_rgba8();

    Ok(PageImage {
        width: u32::try_from(bitmap.width()).unwrap_or_default(),
        height: u32::try_from(bitmap.height()).unwrap_or_default(),
        pixels: image.into_raw(),
    })
}

/// Map an arbitrary rotation to the nearest quarter turn pdfium can render.
fn snap_rotation(degrees: f32) -> PdfPageRenderRotation {
    let quarters = ((degrees / 90.0).round() as i32).rem_euclid(4);
    let lost = (degrees - quarters as f32 * 90.0).rem_euclid(360.0);
    if lost.min(360.0 - lost) > 0.05 {
        debug!(degrees, "fine rotation snapped to the nearest quarter turn");
    }
    match quarters {
        1 => PdfPageRenderRotation::Degrees90,
        2 => PdfPageRenderRotation::Degrees180,
        3 => PdfPageRenderRotation::Degrees270,
        _ => PdfPageRenderRotation::None,
    }
}

/// Convert a pdfium page rect (origin bottom-left, points) to a normalized
/// top-left rect.
fn normalize_page_rect(
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
    page_width: f32,
    page_height: f32,
) -> NormalizedRect {
    NormalizedRect {
        left: (left / page_width).clamp(0.0, 1.0),
        top: (1.0 - top / page_height).clamp(0.0, 1.0),
        right: (right / page_width).clamp(0.0, 1.0),
        bottom: (1.0 - bottom / page_height).clamp(0.0, 1.0),
    }
    .clamp()
}

/// Cut the region `bounds` selects out of a rendered page raster.
fn crop_region(image: &PageImage, bounds: NormalizedRect) -> Option<PageImage> {
    if image.is_empty() {
        return None;
    }
    let x0 = ((bounds.left * image.width as f32) as u32).min(image.width - 1);
    let y0 = ((bounds.top * image.height as f32) as u32).min(image.height - 1);
    let x1 = ((bounds.right * image.width as f32).ceil() as u32).clamp(x0 + 1, image.width);
    let y1 = ((bounds.bottom * image.height as f32).ceil() as u32).clamp(y0 + 1, image.height);

    let width = x1 - x0;
    let height = y1 - y0;
    let stride = image.width as usize * 4;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for row in y0..y1 {
        let start = row as usize * stride + x0 as usize * 4;
        pixels.extend_from_slice(&image.pixels[start..start + width as usize * 4]);
    }

    Some(PageImage {
        width,
        height,
        pixels,
    })
}

fn collect_outline(mut bookmark: PdfBookmark<'_>, depth: usize, out: &mut Vec<OutlineEntry>) {
    loop {
        if let Some(title) = bookmark.title() {
            if let Some(destination) = bookmark.destination() {
                if let Ok(page_index) = destination.page_index() {
                    out.push(OutlineEntry {
                        title,
                        page: page_index as usize,
                        depth,
                    });
                }
            }
        }

        if let Some(child) = bookmark.first_child() {
            collect_outline(child, depth + 1, out);
        }

        match bookmark.next_sibling() {
            Some(next) => bookmark = next,
            None => break,
        }
    }
}

fn bind_pdfium_from_build_hint() -> Option<Pdfium> {
    match option_env!("FOLIO_PDFIUM_LIBRARY_PATH") {
        Some(path) if !path.is_empty() => match Pdfium::bind_to_library(path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!(
                    "failed to load pdfium from build-provided path {}: {}",
                    path, err
                );
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({})",
                errors.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_snaps_to_quarter_turns() {
        assert!(matches!(snap_rotation(0.0), PdfPageRenderRotation::None));
        assert!(matches!(snap_rotation(0.3), PdfPageRenderRotation::None));
        assert!(matches!(
            snap_rotation(90.0),
            PdfPageRenderRotation::Degrees90
        ));
        assert!(matches!(
            snap_rotation(134.9),
            PdfPageRenderRotation::Degrees90
        ));
        assert!(matches!(
            snap_rotation(180.0),
            PdfPageRenderRotation::Degrees180
        ));
        assert!(matches!(
            snap_rotation(359.9),
            PdfPageRenderRotation::None
        ));
    }

    #[test]
    fn page_rect_normalization_flips_the_vertical_axis() {
        // A rect near the top of a 100x200pt page.
        let rect = normalize_page_rect(10.0, 190.0, 30.0, 170.0, 100.0, 200.0);
        assert!((rect.left - 0.1).abs() < 1e-6);
        assert!((rect.top - 0.05).abs() < 1e-6);
        assert!((rect.right - 0.3).abs() < 1e-6);
        assert!((rect.bottom - 0.15).abs() < 1e-6);
        assert!(rect.is_valid());
    }

    #[test]
    fn crop_region_extracts_the_selected_pixels() {
        let image = PageImage {
            width: 4,
            height: 4,
            pixels: (0..4 * 4 * 4).map(|i| i as u8).collect(),
        };
        let bounds = NormalizedRect {
            left: 0.5,
            top: 0.5,
            right: 1.0,
            bottom: 1.0,
        };
        let cropped = crop_region(&image, bounds).unwrap();
        assert_eq!(cropped.width, 2);
        assert_eq!(cropped.height, 2);
        // First pixel of the crop is source (2, 2).
        assert_eq!(cropped.pixels[0], ((2 * 4 + 2) * 4) as u8);
    }
}

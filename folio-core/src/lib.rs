//! Viewer state machines for the folio document viewer.
//!
//! Everything in this crate is synchronous and owned by a single interaction
//! loop: one input event triggers one full evaluation cycle (router mutation,
//! search slice, cache refresh, UI pass) before the next event is accepted.
//! The document itself lives behind the [`DocumentBackend`] trait so the
//! state machines are testable against fakes.

pub mod app;
pub mod backend;
pub mod input;
pub mod ledger;
pub mod nav;
pub mod raster;
pub mod search;
pub mod ui;
pub mod view;

pub use app::{App, FrameReport, OutlineRow, OutlineScene, Overlay, Scene, ViewConfig};
pub use backend::{
    AnnotationRaster, DocumentBackend, DocumentProvider, LinkRegion, LinkTarget, MetadataKey,
    NormalizedRect, OpenError, OpenOptions, OutlineEntry, PageImage, RenderTransform,
};
pub use input::{Action, GotoTarget, InputEvent, Key, Modifiers, PointerButton, Router};
pub use ledger::ProgressLedger;
pub use nav::Navigator;
pub use raster::{RasterCache, RasterEntry, RenderKey};
pub use search::{SearchOutcome, SearchSession};
pub use ui::{FrameState, Point, Rect, ScrollbarLayout, WidgetId};
pub use view::ViewState;

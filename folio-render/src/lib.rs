//! Document backends for the folio viewer.
//!
//! The default `pdf` feature provides a pdfium-backed implementation of
//! `folio_core::DocumentBackend`. The pdfium binary is staged by `build.rs`
//! when possible; otherwise the provider binds the system library at
//! runtime.

#[cfg(feature = "pdf")]
mod pdfium;

#[cfg(feature = "pdf")]
pub use pdfium::PdfiumProvider;

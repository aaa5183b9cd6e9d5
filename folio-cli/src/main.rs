use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event;
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use folio_core::{App, DocumentProvider, InputEvent, OpenError, OpenOptions, ViewConfig};
use folio_core::{view::DEFAULT_ZOOM, ProgressLedger};
use folio_render::PdfiumProvider;
use folio_tty::{EventNormalizer, KittyPresenter};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Wall-clock budget for one search slice before the loop checks for input.
const SEARCH_SLICE_BUDGET: Duration = Duration::from_millis(200);

/// Fallback cell size when the terminal does not report pixel dimensions.
const FALLBACK_CELL: (u16, u16) = (8, 16);

#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "kitty-native paginated document viewer"
)]
struct Args {
    /// Path to the document to open
    file: PathBuf,

    /// Page to open on (1-based); defaults to the saved reading position
    page: Option<usize>,

    /// Password for protected documents
    #[arg(short = 'p', long = "password")]
    password: Option<String>,

    /// Initial resolution in dots per inch
    #[arg(short = 'r', long = "resolution")]
    resolution: Option<f32>,

    /// Layout width in points for reflowable formats
    #[arg(short = 'W', long = "layout-width", default_value_t = 450.0)]
    layout_width: f32,

    /// Layout height in points for reflowable formats
    #[arg(short = 'H', long = "layout-height", default_value_t = 600.0)]
    layout_height: f32,

    /// Base font size in points for reflowable formats
    #[arg(short = 'S', long = "layout-em", default_value_t = 12.0)]
    layout_em: f32,

    /// User stylesheet applied to reflowable formats
    #[arg(short = 'U', long = "stylesheet")]
    stylesheet: Option<PathBuf>,

    /// Background color as RRGGBB hex
    #[arg(short = 'C', long = "background")]
    background: Option<String>,

    /// Start with inverted page colors
    #[arg(short = 'I', long = "invert")]
    invert: bool,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, event::DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "folio", "folio")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let provider = PdfiumProvider::new()?;
    let options = OpenOptions {
        password: args.password.clone(),
        layout_width: args.layout_width,
        layout_height: args.layout_height,
        layout_em: args.layout_em,
        stylesheet: args.stylesheet.clone(),
    };
    let backend = match provider.open(&args.file, &options) {
        Ok(backend) => backend,
        Err(OpenError::Authentication { path }) => {
            return Err(anyhow!(
                "authentication failed for {}: bad or missing password",
                path.display()
            ));
        }
        Err(OpenError::Other(err)) => {
            return Err(err.context(format!("failed to open {:?}", args.file)));
        }
    };

    let mut ledger = ProgressLedger::load(project_dirs.data_local_dir().join("recent"));
    let display_name = display_name(&args.file);
    let start_page = match args.page {
        Some(page) => page.saturating_sub(1),
        None => ledger
            .last_page(&display_name)
            .map(|page| page.saturating_sub(1))
            .unwrap_or(0),
    };

    let (cell_w, cell_h) = cell_size()?;
    let (cols, rows) = terminal::size()?;
    let config = ViewConfig {
        start_page,
        zoom: args.resolution.unwrap_or(DEFAULT_ZOOM),
        invert: args.invert,
        background: match &args.background {
            Some(hex) => parse_background(hex)?,
            None => 0xFFFFFF,
        },
        canvas: canvas_pixels(cols, rows, cell_w, cell_h),
    };
    let mut app = App::new(backend, config);
    info!(file = ?args.file, start_page, "document opened");

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(
        stdout,
        cursor::Hide,
        event::EnableMouseCapture,
        Clear(ClearType::All),
        cursor::MoveTo(0, 0)
    )?;
    let mut presenter = KittyPresenter::new(stdout);
    let normalizer = EventNormalizer::new(cell_w, cell_h);

    let exit_page = run_loop(&mut app, &mut presenter, &normalizer)?;

    {
        let writer = presenter.writer();
        crossterm::execute!(writer, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    }

    ledger.record(&display_name, exit_page);
    if let Err(err) = ledger.save() {
        warn!(error = %err, "failed to save reading progress");
    }
    Ok(())
}

/// Drives the evaluate/present/input cycle until the app quits. Returns the
/// 1-based page the viewer was on at exit.
fn run_loop(
    app: &mut App,
    presenter: &mut KittyPresenter<io::Stdout>,
    normalizer: &EventNormalizer,
) -> Result<usize> {
    let (_, cell_h) = normalizer.cell_size();
    let mut clipboard = match arboard::Clipboard::new() {
        Ok(clipboard) => Some(clipboard),
        Err(err) => {
            warn!(error = %err, "clipboard unavailable, selections will not be copied");
            None
        }
    };
    loop {
        let deadline = Instant::now() + SEARCH_SLICE_BUDGET;
        let report = app.evaluate_frame(|| Instant::now() < deadline)?;
        if report.quit {
            break;
        }
        if let Some(uri) = report.open_uri {
            info!(uri = %uri, "link activated");
        }
        if let Some(text) = report.selected_text {
            if let Some(clipboard) = clipboard.as_mut() {
                if let Err(err) = clipboard.set_text(text) {
                    warn!(error = %err, "failed to copy selection to clipboard");
                }
            }
        }
        if report.needs_redraw {
            let scene = app.scene()?;
            let (cols, rows) = terminal::size()?;
            presenter.present(&scene, cols, rows)?;
        }

        if report.needs_another_frame {
            // Keep slicing the pending search but stay responsive to input.
            if event::poll(Duration::ZERO)? {
                feed_event(app, normalizer, cell_h, event::read()?);
            }
            continue;
        }

        if event::poll(Duration::from_millis(100))? {
            feed_event(app, normalizer, cell_h, event::read()?);
        }
    }
    Ok(app.current_page_number())
}

fn feed_event(app: &mut App, normalizer: &EventNormalizer, cell_h: u16, ev: event::Event) {
    if let Some(mut input) = normalizer.normalize(ev) {
        if let InputEvent::Resize { height, .. } = &mut input {
            // The bottom cell row is reserved for the status line.
            *height = height.saturating_sub(u32::from(cell_h));
        }
        app.handle_event(input);
    }
}

fn display_name(path: &std::path::Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn parse_background(hex: &str) -> Result<u32> {
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 {
        return Err(anyhow!("background color must be six hex digits: {hex:?}"));
    }
    u32::from_str_radix(digits, 16)
        .with_context(|| format!("invalid background color {hex:?}"))
}

/// Cell size in pixels, derived from the terminal's reported window size.
fn cell_size() -> Result<(u16, u16)> {
    match terminal::window_size() {
        Ok(size) if size.width > 0 && size.height > 0 && size.columns > 0 && size.rows > 0 => {
            Ok((size.width / size.columns, size.height / size.rows))
        }
        Ok(_) => Ok(FALLBACK_CELL),
        Err(err) => {
            warn!(error = %err, "terminal did not report pixel dimensions");
            Ok(FALLBACK_CELL)
        }
    }
}

fn canvas_pixels(cols: u16, rows: u16, cell_w: u16, cell_h: u16) -> (u32, u32) {
    let width = u32::from(cols) * u32::from(cell_w);
    let height = u32::from(rows.saturating_sub(1)) * u32::from(cell_h);
    (width.max(1), height.max(1))
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "folio.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // No console layer: the terminal is the viewer surface.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_parses_hex_with_optional_hash() {
        assert_eq!(parse_background("ffffff").unwrap(), 0xFFFFFF);
        assert_eq!(parse_background("#EEE8D5").unwrap(), 0xEEE8D5);
        assert!(parse_background("fff").is_err());
        assert!(parse_background("zzzzzz").is_err());
    }

    #[test]
    fn canvas_reserves_the_status_row() {
        assert_eq!(canvas_pixels(80, 24, 8, 16), (640, 368));
        assert_eq!(canvas_pixels(0, 0, 8, 16), (1, 1));
    }

    #[test]
    fn display_name_prefers_the_file_stem() {
        assert_eq!(display_name(std::path::Path::new("/tmp/paper.pdf")), "paper");
    }
}
